// Single-pass grouping of joined records.
//
// Every record lands in exactly one group and in the grand totals; nothing
// is rounded here.

use crate::error::{ReportError, Result};
use crate::types::{GroupKey, LabelCount, MetricsSpec, Record};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Placeholder group value for a record lacking the grouping field.
pub const MISSING_GROUP_VALUE: &str = "(none)";

/// Label frequencies, remembering the order labels were first seen so ties
/// rank deterministically.
#[derive(Debug, Clone, Default)]
pub struct LabelTally {
    counts: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl LabelTally {
    pub fn add(&mut self, label: String) {
        match self.index.get(&label) {
            Some(&i) => self.counts[i].1 += 1,
            None => {
                self.index.insert(label.clone(), self.counts.len());
                self.counts.push((label, 1));
            }
        }
    }

    pub fn get(&self, label: &str) -> u64 {
        self.index.get(label).map(|&i| self.counts[i].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The `n` most frequent labels; equal counts keep first-seen order.
    pub fn top(&self, n: usize) -> Vec<LabelCount> {
        let mut ranked: Vec<&(String, u64)> = self.counts.iter().collect();
        // `sort_by` is stable, which is what keeps ties in insertion order.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(n)
            .map(|(label, count)| LabelCount {
                label: label.clone(),
                count: *count,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupAccumulator {
    pub sum: f64,
    pub count: usize,
    pub entities: HashSet<String>,
    pub labels: LabelTally,
    average_sum: f64,
    average_count: usize,
}

impl GroupAccumulator {
    pub fn distinct_entities(&self) -> usize {
        self.entities.len()
    }

    /// Mean of the metrics spec's `average_field` over records that had one.
    pub fn average(&self) -> Option<f64> {
        if self.average_count == 0 {
            return None;
        }
        Some(self.average_sum / self.average_count as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GrandTotals {
    pub sum: f64,
    pub count: usize,
    pub entities: HashSet<String>,
    /// Records whose sum field was null or not numeric; they add 0.0.
    pub unparsed_metric: usize,
}

impl GrandTotals {
    pub fn distinct_entities(&self) -> usize {
        self.entities.len()
    }
}

/// Finalized result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub groups: HashMap<GroupKey, GroupAccumulator>,
    pub totals: GrandTotals,
}

impl Aggregation {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&GroupAccumulator> {
        self.groups.get(key)
    }
}

/// Key function grouping on the given fields, in order.
pub fn group_by<S: AsRef<str>>(fields: &[S]) -> impl Fn(&Record) -> GroupKey {
    let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
    move |record: &Record| {
        GroupKey(
            fields
                .iter()
                .map(|f| {
                    record
                        .get(f)
                        .and_then(|v| v.as_label())
                        .unwrap_or_else(|| MISSING_GROUP_VALUE.to_string())
                })
                .collect(),
        )
    }
}

/// Fail if any of `fields` is outside the declared record shape.
pub fn check_fields<S: AsRef<str>>(context: &str, fields: &[S], shape: &HashSet<String>) -> Result<()> {
    for field in fields {
        let field = field.as_ref();
        if !shape.contains(field) {
            return Err(ReportError::UnknownField {
                field: field.to_string(),
                context: context.to_string(),
            });
        }
    }
    Ok(())
}

/// Bucket `records` by `key_fn` and accumulate the metrics of `spec`,
/// updating the grand totals in the same pass.
pub fn aggregate<I, R, K>(records: I, key_fn: K, spec: &MetricsSpec) -> Aggregation
where
    I: IntoIterator<Item = R>,
    R: Borrow<Record>,
    K: Fn(&Record) -> GroupKey,
{
    let mut agg = Aggregation::default();

    for record in records {
        let record = record.borrow();
        let key = key_fn(record);
        let amount = match record.get(&spec.sum_field).and_then(|v| v.as_f64()) {
            Some(v) => v,
            None => {
                agg.totals.unparsed_metric += 1;
                0.0
            }
        };
        let entity = record.get(&spec.entity_field).and_then(|v| v.as_key());
        let label = record.get(&spec.label_field).and_then(|v| v.as_label());
        let avg_value = spec
            .average_field
            .as_ref()
            .and_then(|f| record.get(f))
            .and_then(|v| v.as_f64());

        let acc = agg.groups.entry(key).or_default();
        acc.sum += amount;
        acc.count += 1;
        if let Some(e) = &entity {
            acc.entities.insert(e.clone());
        }
        if let Some(l) = label {
            acc.labels.add(l);
        }
        if let Some(v) = avg_value {
            acc.average_sum += v;
            acc.average_count += 1;
        }

        agg.totals.sum += amount;
        agg.totals.count += 1;
        if let Some(e) = entity {
            agg.totals.entities.insert(e);
        }
    }

    info!(
        records = agg.totals.count,
        groups = agg.groups.len(),
        distinct_entities = agg.totals.distinct_entities(),
        "aggregated"
    );
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn rec(segment: &str, customer: i64, item: &str, amount: f64) -> Record {
        let mut r = Record::new();
        r.insert("segment".into(), Value::from(segment));
        r.insert("customer_sk".into(), Value::from(customer));
        r.insert("item_name".into(), Value::from(item));
        r.insert("amount".into(), Value::from(amount));
        r
    }

    fn spec() -> MetricsSpec {
        MetricsSpec::new("amount", "customer_sk", "item_name")
    }

    #[test]
    fn empty_input_yields_empty_aggregation() {
        let agg = aggregate(Vec::<Record>::new(), group_by(&["segment"]), &spec());
        assert!(agg.is_empty());
        assert_eq!(agg.totals.sum, 0.0);
        assert_eq!(agg.totals.count, 0);
        assert_eq!(agg.totals.distinct_entities(), 0);
    }

    #[test]
    fn accumulates_per_group_and_overall() {
        let records = vec![
            rec("VIP", 1, "Latte", 5.0),
            rec("VIP", 1, "Mocha", 3.0),
            rec("VIP", 3, "Latte", 1.5),
            rec("Regular", 2, "Latte", 2.0),
        ];
        let agg = aggregate(&records, group_by(&["segment"]), &spec());

        let vip = agg.get(&GroupKey::new(["VIP"])).unwrap();
        assert_eq!(vip.sum, 9.5);
        assert_eq!(vip.count, 3);
        assert_eq!(vip.distinct_entities(), 2);
        assert_eq!(vip.labels.get("Latte"), 2);

        assert_eq!(agg.totals.sum, 11.5);
        assert_eq!(agg.totals.count, 4);
        assert_eq!(agg.totals.distinct_entities(), 3);
    }

    #[test]
    fn unparsable_amount_counts_but_adds_nothing() {
        let mut bad = rec("VIP", 1, "Latte", 0.0);
        bad.insert("amount".into(), Value::from("n/a"));
        let records = vec![bad, rec("VIP", 2, "Latte", 4.0)];
        let agg = aggregate(&records, group_by(&["segment"]), &spec());
        let vip = agg.get(&GroupKey::new(["VIP"])).unwrap();
        assert_eq!(vip.count, 2);
        assert_eq!(vip.sum, 4.0);
        assert_eq!(agg.totals.unparsed_metric, 1);
    }

    #[test]
    fn average_field_ignores_missing_values() {
        let mut a = rec("VIP", 1, "Latte", 1.0);
        a.insert("margin".into(), Value::from("60"));
        let mut b = rec("VIP", 2, "Mocha", 1.0);
        b.insert("margin".into(), Value::from("70"));
        let c = rec("VIP", 3, "Tea", 1.0);
        let agg = aggregate(
            vec![a, b, c],
            group_by(&["segment"]),
            &spec().with_average("margin"),
        );
        let vip = agg.get(&GroupKey::new(["VIP"])).unwrap();
        assert_eq!(vip.average(), Some(65.0));
    }

    #[test]
    fn missing_group_field_uses_placeholder() {
        let mut r = rec("VIP", 1, "Latte", 1.0);
        r.remove("segment");
        let agg = aggregate(vec![r], group_by(&["segment"]), &spec());
        assert!(agg.get(&GroupKey::new([MISSING_GROUP_VALUE])).is_some());
    }

    #[test]
    fn label_ties_keep_first_seen_order() {
        let mut tally = LabelTally::default();
        for l in ["C", "A", "B", "A", "B", "A", "B"] {
            tally.add(l.to_string());
        }
        let top = tally.top(2);
        assert_eq!(top[0].label, "A");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[1].label, "B");
        assert_eq!(top[1].count, 3);
        assert_eq!(tally.top(10).len(), 3);
    }

    #[test]
    fn check_fields_reports_first_unknown() {
        let shape: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(check_fields("group_by", &["a", "b"], &shape).is_ok());
        let err = check_fields("metrics", &["a", "z"], &shape).unwrap_err();
        assert!(matches!(err, ReportError::UnknownField { ref field, .. } if field == "z"));
    }
}
