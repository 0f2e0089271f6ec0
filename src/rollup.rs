// Converts finalized accumulators into ranked report rows with shares of
// the grand totals.

use crate::aggregate::{GrandTotals, GroupAccumulator};
use crate::types::{GroupKey, ReportRow, ValueRating};
use crate::util::share;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Descending by sum, then ascending by key.
fn by_sum_then_key(a: &ReportRow, b: &ReportRow) -> Ordering {
    b.sum
        .partial_cmp(&a.sum)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.key.cmp(&b.key))
}

/// Build one report row per group, sorted by descending sum with ties
/// broken by key. Pure: the same snapshot always produces the same rows.
///
/// Shares against a zero total are 0.
pub fn rollup(
    groups: &HashMap<GroupKey, GroupAccumulator>,
    totals: &GrandTotals,
    top_n: usize,
) -> Vec<ReportRow> {
    let total_entities = totals.distinct_entities() as f64;

    let mut rows: Vec<ReportRow> = groups
        .iter()
        .map(|(key, acc)| {
            let distinct = acc.distinct_entities();
            let sales_share = share(acc.sum, totals.sum);
            let entity_share = share(distinct as f64, total_entities);
            ReportRow {
                key: key.clone(),
                sum: acc.sum,
                sales_share,
                count: acc.count,
                distinct_entities: distinct,
                entity_share,
                avg_per_entity: share(acc.sum, distinct as f64),
                average: acc.average(),
                parent_share: None,
                rating: ValueRating::from_shares(sales_share, entity_share),
                top_labels: acc.labels.top(top_n),
            }
        })
        .collect();

    rows.sort_by(by_sum_then_key);

    // Summed over the sorted rows so the float result does not depend on
    // hash map iteration order.
    let mut parent_sums: HashMap<GroupKey, f64> = HashMap::new();
    for row in &rows {
        if let Some(parent) = row.key.parent() {
            *parent_sums.entry(parent).or_insert(0.0) += row.sum;
        }
    }
    for row in &mut rows {
        if let Some(parent) = row.key.parent() {
            let parent_sum = parent_sums.get(&parent).copied().unwrap_or(0.0);
            row.parent_share = Some(share(row.sum, parent_sum));
        }
    }

    rows
}

/// Rows whose key starts with `prefix`, keeping their order.
pub fn within<'a>(rows: &'a [ReportRow], prefix: &[&str]) -> Vec<&'a ReportRow> {
    rows.iter()
        .filter(|r| {
            r.key.len() >= prefix.len()
                && r.key.parts().iter().zip(prefix).all(|(a, b)| a == b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, group_by, Aggregation};
    use crate::types::{MetricsSpec, Record, Value};

    fn rec(segment: &str, category: &str, customer: i64, amount: f64) -> Record {
        let mut r = Record::new();
        r.insert("segment".into(), Value::from(segment));
        r.insert("category".into(), Value::from(category));
        r.insert("customer_sk".into(), Value::from(customer));
        r.insert("item".into(), Value::from(format!("{}-item", category)));
        r.insert("amount".into(), Value::from(amount));
        r
    }

    fn run(records: Vec<Record>) -> Aggregation {
        aggregate(
            records,
            group_by(&["segment", "category"]),
            &MetricsSpec::new("amount", "customer_sk", "item"),
        )
    }

    #[test]
    fn zero_total_gives_zero_shares() {
        let agg = run(vec![rec("VIP", "Coffee", 1, 0.0), rec("New", "Tea", 2, 0.0)]);
        let rows = rollup(&agg.groups, &agg.totals, 3);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.sales_share, 0.0);
            assert!(!row.sales_share.is_nan());
            assert_eq!(row.parent_share, Some(0.0));
        }
    }

    #[test]
    fn equal_sums_fall_back_to_key_order() {
        let agg = run(vec![
            rec("VIP", "Tea", 1, 2.0),
            rec("New", "Coffee", 2, 2.0),
            rec("VIP", "Coffee", 3, 2.0),
            rec("Regular", "Cake", 4, 9.0),
        ]);
        let rows = rollup(&agg.groups, &agg.totals, 3);
        let keys: Vec<String> = rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["Regular / Cake", "New / Coffee", "VIP / Coffee", "VIP / Tea"]
        );
    }

    #[test]
    fn parent_share_is_relative_to_key_prefix() {
        let agg = run(vec![
            rec("VIP", "Coffee", 1, 3.0),
            rec("VIP", "Tea", 1, 1.0),
            rec("New", "Coffee", 2, 6.0),
        ]);
        let rows = rollup(&agg.groups, &agg.totals, 3);
        let vip_coffee = rows
            .iter()
            .find(|r| r.key == GroupKey::new(["VIP", "Coffee"]))
            .unwrap();
        assert_eq!(vip_coffee.parent_share, Some(0.75));
        assert!((vip_coffee.sales_share - 0.3).abs() < 1e-12);

        let vip = within(&rows, &["VIP"]);
        assert_eq!(vip.len(), 2);
        assert_eq!(vip[0].key, GroupKey::new(["VIP", "Coffee"]));
    }

    #[test]
    fn single_part_keys_have_no_parent_share() {
        let agg = aggregate(
            vec![rec("VIP", "Coffee", 1, 3.0)],
            group_by(&["segment"]),
            &MetricsSpec::new("amount", "customer_sk", "item"),
        );
        let rows = rollup(&agg.groups, &agg.totals, 3);
        assert_eq!(rows[0].parent_share, None);
        assert_eq!(rows[0].sales_share, 1.0);
        assert_eq!(rows[0].entity_share, 1.0);
        assert_eq!(rows[0].avg_per_entity, 3.0);
    }

    #[test]
    fn rating_compares_sales_and_entity_shares() {
        assert_eq!(ValueRating::from_shares(0.5, 0.25), ValueRating::HighValue);
        assert_eq!(ValueRating::from_shares(0.25, 0.25), ValueRating::Balanced);
        assert_eq!(ValueRating::from_shares(0.1, 0.25), ValueRating::LowValue);
        assert_eq!(ValueRating::from_shares(0.1, 0.0), ValueRating::LowValue);
    }

    #[test]
    fn empty_aggregation_rolls_up_to_nothing() {
        let agg = Aggregation::default();
        assert!(rollup(&agg.groups, &agg.totals, 3).is_empty());
    }
}
