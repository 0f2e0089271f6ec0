// Report job definition and command-line arguments.
//
// A job names the CSV files of a star schema, how facts join to their
// dimensions, and what to group and measure. The default job is the
// customer segment by category breakdown of gross sales.
use crate::aggregate::check_fields;
use crate::error::Result;
use crate::types::{JoinSpec, MetricsSpec, DEFAULT_TOP_N};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "segment_report")]
#[command(about = "Grouped share-of-total reports over star-schema CSV files")]
pub struct Args {
    /// JSON job definition (defaults to the customer segment x category job)
    #[arg(short, long)]
    pub job: Option<PathBuf>,

    /// Directory holding the fact and dimension CSV files
    #[arg(short, long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Directory the CSV and JSON reports are written to
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Override the job's number of top labels per group
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Load and generate once, without the interactive menu
    #[arg(long)]
    pub batch: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSource {
    pub name: String,
    pub file: String,
    pub key: String,
}

impl DimensionSource {
    fn new(name: &str, file: &str, key: &str) -> Self {
        DimensionSource {
            name: name.to_string(),
            file: file.to_string(),
            key: key.to_string(),
        }
    }
}

/// A coarser grouping reported as its own totals table,
/// written to `report_<name>_totals.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySpec {
    pub name: String,
    pub by: Vec<String>,
}

impl SummarySpec {
    pub fn new(name: &str, by: &[&str]) -> Self {
        SummarySpec {
            name: name.to_string(),
            by: by.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportJob {
    pub facts: String,
    pub dimensions: Vec<DimensionSource>,
    pub joins: Vec<JoinSpec>,
    /// Fields of the detailed breakdown, outermost first.
    pub group_by: Vec<String>,
    /// Coarser groupings, each aggregated independently (e.g. segment
    /// totals, category totals).
    #[serde(default)]
    pub summaries: Vec<SummarySpec>,
    /// Value of the outermost `group_by` field whose inner breakdown is
    /// listed on its own (e.g. the categories bought by VIP customers).
    #[serde(default)]
    pub focus: Option<String>,
    pub metrics: MetricsSpec,
}

impl Default for ReportJob {
    fn default() -> Self {
        ReportJob {
            facts: "fact_sales_transaction.csv".to_string(),
            dimensions: vec![
                DimensionSource::new("customer", "dim_customer.csv", "customer_sk"),
                DimensionSource::new("item", "dim_item.csv", "item_sk"),
                DimensionSource::new("category", "dim_category.csv", "category_sk"),
            ],
            joins: vec![
                JoinSpec::new("customer_sk", "customer", &["customer_segment"]),
                JoinSpec::new(
                    "item_sk",
                    "item",
                    &["item_name", "category_sk", "profit_margin_percent"],
                ),
                JoinSpec::new("category_sk", "category", &["category_name"]),
            ],
            group_by: vec!["customer_segment".to_string(), "category_name".to_string()],
            summaries: vec![
                SummarySpec::new("segment", &["customer_segment"]),
                SummarySpec::new("category", &["category_name"]),
            ],
            focus: Some("VIP".to_string()),
            metrics: MetricsSpec::new("gross_sales_amount", "customer_sk", "item_name")
                .with_average("profit_margin_percent")
                .with_top_n(DEFAULT_TOP_N),
        }
    }
}

impl ReportJob {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let job = serde_json::from_str(&s)?;
        Ok(job)
    }

    /// Fields a joined record can carry: the fact headers plus every
    /// attribute copied by a join.
    pub fn declared_shape(&self, fact_headers: &[String]) -> HashSet<String> {
        let mut shape: HashSet<String> = fact_headers.iter().cloned().collect();
        for join in &self.joins {
            shape.extend(join.attributes.iter().cloned());
        }
        shape
    }

    /// Check grouping and metric fields against the declared record shape.
    pub fn validate(&self, fact_headers: &[String]) -> Result<()> {
        let shape = self.declared_shape(fact_headers);
        check_fields("group_by", &self.group_by, &shape)?;
        for summary in &self.summaries {
            check_fields(&format!("summary '{}'", summary.name), &summary.by, &shape)?;
        }
        check_fields("metrics", &self.metrics.fields(), &shape)?;
        Ok(())
    }
}
