use crate::util::parse_f64_safe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tabled::Tabled;

/// Number of labels kept per group when a job does not say otherwise.
pub const DEFAULT_TOP_N: usize = 3;

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn exact_integer(n: f64) -> Option<String> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT {
        Some((n as i64).to_string())
    } else {
        None
    }
}

/// A single scalar cell of a fact or dimension row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Build a value from a raw CSV cell. Blank cells become `Null`.
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(cell.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(n) => n.is_nan(),
        }
    }

    /// Canonical string used for key comparison, so that `"1"`, `" 01 "`,
    /// `"+1"`, `"1.0"` and `1.0` all resolve to the same dimension row.
    /// Integral floats beyond 2^53 are not exact and keep their text.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                if let Ok(i) = s.parse::<i64>() {
                    return Some(i.to_string());
                }
                let exact = s.parse::<f64>().ok().and_then(exact_integer);
                Some(exact.unwrap_or_else(|| s.to_string()))
            }
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(exact_integer(*n).unwrap_or_else(|| n.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Number(_) => None,
            Value::Text(s) => parse_f64_safe(Some(s.as_str())),
        }
    }

    /// Text used when the value names a group or a label.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(_) => self.as_key(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

/// One fact or dimension row, keyed by column name. A joined record is the
/// same shape with the dimension attributes copied in.
pub type Record = HashMap<String, Value>;

/// Ordered tuple of categorical values partitioning the joined records.
///
/// Ordering is lexicographic over the parts and is used to break ties
/// between groups with equal sums.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupKey(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key without its last component; `None` for keys of one part or less.
    pub fn parent(&self) -> Option<GroupKey> {
        if self.0.len() < 2 {
            return None;
        }
        Some(GroupKey(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}

/// Foreign-key lookup applied to every fact row, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub foreign_key: String,
    pub dimension: String,
    pub attributes: Vec<String>,
}

impl JoinSpec {
    pub fn new(foreign_key: &str, dimension: &str, attributes: &[&str]) -> Self {
        JoinSpec {
            foreign_key: foreign_key.to_string(),
            dimension: dimension.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

/// Which fields feed the per-group accumulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSpec {
    /// Summed per group and overall (e.g. gross sales).
    pub sum_field: String,
    /// Counted distinctly (e.g. customer key).
    pub entity_field: String,
    /// Tallied for the top-N ranking (e.g. item name).
    pub label_field: String,
    /// Optional secondary field averaged per group (e.g. profit margin).
    #[serde(default)]
    pub average_field: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl MetricsSpec {
    pub fn new(sum_field: &str, entity_field: &str, label_field: &str) -> Self {
        MetricsSpec {
            sum_field: sum_field.to_string(),
            entity_field: entity_field.to_string(),
            label_field: label_field.to_string(),
            average_field: None,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_average(mut self, field: &str) -> Self {
        self.average_field = Some(field.to_string());
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Every field name this spec reads from a joined record.
    pub fn fields(&self) -> Vec<&str> {
        let mut v = vec![
            self.sum_field.as_str(),
            self.entity_field.as_str(),
            self.label_field.as_str(),
        ];
        if let Some(avg) = &self.average_field {
            v.push(avg.as_str());
        }
        v
    }
}

/// A label and how many records in the group carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// How a group's share of the total metric compares with its share of
/// the distinct entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueRating {
    HighValue,
    Balanced,
    LowValue,
}

impl ValueRating {
    pub fn from_shares(sales_share: f64, entity_share: f64) -> Self {
        if entity_share <= 0.0 {
            return ValueRating::LowValue;
        }
        if sales_share > entity_share * 1.2 {
            ValueRating::HighValue
        } else if sales_share > entity_share * 0.8 {
            ValueRating::Balanced
        } else {
            ValueRating::LowValue
        }
    }
}

impl fmt::Display for ValueRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueRating::HighValue => "High Value",
            ValueRating::Balanced => "Balanced",
            ValueRating::LowValue => "Low Value",
        };
        write!(f, "{}", s)
    }
}

/// Rollup output for one group. Shares are fractions in `[0, 1]`, unrounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub key: GroupKey,
    pub sum: f64,
    pub sales_share: f64,
    pub count: usize,
    pub distinct_entities: usize,
    pub entity_share: f64,
    pub avg_per_entity: f64,
    pub average: Option<f64>,
    pub parent_share: Option<f64>,
    pub rating: ValueRating,
    pub top_labels: Vec<LabelCount>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GroupSummaryRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "TotalPct")]
    #[tabled(rename = "TotalPct")]
    pub total_pct: String,
    #[serde(rename = "WithinParentPct")]
    #[tabled(rename = "WithinParentPct")]
    pub within_parent_pct: String,
    #[serde(rename = "Entities")]
    #[tabled(rename = "Entities")]
    pub entities: usize,
    #[serde(rename = "EntityPct")]
    #[tabled(rename = "EntityPct")]
    pub entity_pct: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "Average")]
    #[tabled(rename = "Average")]
    pub average: String,
    #[serde(rename = "TopLabels")]
    #[tabled(rename = "TopLabels")]
    pub top_labels: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GroupTotalRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "TotalPct")]
    #[tabled(rename = "TotalPct")]
    pub total_pct: String,
    #[serde(rename = "Entities")]
    #[tabled(rename = "Entities")]
    pub entities: usize,
    #[serde(rename = "EntityPct")]
    #[tabled(rename = "EntityPct")]
    pub entity_pct: String,
    #[serde(rename = "AvgPerEntity")]
    #[tabled(rename = "AvgPerEntity")]
    pub avg_per_entity: String,
    #[serde(rename = "Rating")]
    #[tabled(rename = "Rating")]
    pub rating: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: String,
    pub records_seen: usize,
    pub records_unreadable: usize,
    pub records_joined: usize,
    pub records_dropped: usize,
    pub groups: usize,
    pub grand_total: f64,
    pub distinct_entities: usize,
    pub unparsed_metric: usize,
}
