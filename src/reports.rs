use crate::aggregate::{aggregate, group_by, Aggregation};
use crate::config::ReportJob;
use crate::error::Result;
use crate::loader::{load, read_records_from_path, DimensionTable, Dimensions, LoadReport, Table};
use crate::rollup::{rollup, within};
use crate::types::{GroupSummaryRow, GroupTotalRow, LabelCount, Record, ReportRow, SummaryStats};
use crate::util::{format_number, format_pct};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Everything one job run produces before formatting.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub load: LoadReport,
    pub detail: Aggregation,
    pub detail_rows: Vec<ReportRow>,
    pub summaries: Vec<SummaryTable>,
}

/// Rolled-up rows of one coarser grouping, named after its job entry.
#[derive(Debug, Clone)]
pub struct SummaryTable {
    pub name: String,
    pub rows: Vec<ReportRow>,
}

/// Read the job's CSV files from `data_dir` and run it.
pub fn run_job(job: &ReportJob, data_dir: &Path) -> Result<JobOutput> {
    let facts = read_records_from_path(data_dir.join(&job.facts))?;
    let mut dimensions = Dimensions::new();
    for source in &job.dimensions {
        let table = read_records_from_path(data_dir.join(&source.file))?;
        let dim = DimensionTable::from_table(&source.name, &source.key, table)?;
        info!(dimension = %source.name, rows = dim.len(), "dimension ready");
        dimensions.insert(source.name.clone(), dim);
    }
    run_tables(job, facts, &dimensions)
}

/// Run a job over already-read tables.
///
/// The joined records are materialized once and fanned out to the detailed
/// and every summary aggregation, each with its own accumulators.
pub fn run_tables(job: &ReportJob, facts: Table, dimensions: &Dimensions) -> Result<JobOutput> {
    job.validate(&facts.headers)?;

    let mut joined_iter = load(facts.records, dimensions, &job.joins)?;
    let joined: Vec<Record> = joined_iter.by_ref().collect();
    let mut load_report = joined_iter.report().clone();
    load_report.unreadable = facts.parse_errors;
    if load_report.dropped() > 0 {
        warn!(
            dropped = load_report.dropped(),
            null_key = load_report.dropped_null_key,
            unresolved = load_report.dropped_unresolved,
            "fact rows excluded from the report"
        );
    }

    let top_n = job.metrics.top_n;
    let detail = aggregate(&joined, group_by(&job.group_by), &job.metrics);
    let detail_rows = rollup(&detail.groups, &detail.totals, top_n);

    let summaries = job
        .summaries
        .iter()
        .map(|spec| {
            let agg = aggregate(&joined, group_by(&spec.by), &job.metrics);
            SummaryTable {
                name: spec.name.clone(),
                rows: rollup(&agg.groups, &agg.totals, top_n),
            }
        })
        .collect();

    Ok(JobOutput {
        load: load_report,
        detail,
        detail_rows,
        summaries,
    })
}

fn format_labels(labels: &[LabelCount]) -> String {
    labels
        .iter()
        .map(|l| format!("{} ({})", l.label, l.count))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn generate_group_breakdown(rows: &[ReportRow]) -> Vec<GroupSummaryRow> {
    breakdown_rows(rows.iter())
}

/// Breakdown of the groups nested under one outer value (e.g. the
/// categories of the VIP segment), ranked within that value.
pub fn generate_focus_breakdown(rows: &[ReportRow], focus: &str) -> Vec<GroupSummaryRow> {
    breakdown_rows(within(rows, &[focus]).into_iter())
}

fn breakdown_rows<'a, I>(rows: I) -> Vec<GroupSummaryRow>
where
    I: Iterator<Item = &'a ReportRow>,
{
    rows.enumerate()
        .map(|(idx, r)| GroupSummaryRow {
            rank: idx + 1,
            group: r.key.to_string(),
            total: format_number(r.sum, 2),
            total_pct: format_pct(r.sales_share),
            within_parent_pct: r.parent_share.map(format_pct).unwrap_or_default(),
            entities: r.distinct_entities,
            entity_pct: format_pct(r.entity_share),
            records: r.count,
            average: r.average.map(|a| format_number(a, 1)).unwrap_or_default(),
            top_labels: format_labels(&r.top_labels),
        })
        .collect()
}

pub fn generate_group_totals(rows: &[ReportRow]) -> Vec<GroupTotalRow> {
    rows.iter()
        .map(|r| GroupTotalRow {
            group: r.key.to_string(),
            total: format_number(r.sum, 2),
            total_pct: format_pct(r.sales_share),
            entities: r.distinct_entities,
            entity_pct: format_pct(r.entity_share),
            avg_per_entity: format_number(r.avg_per_entity, 2),
            rating: r.rating.to_string(),
        })
        .collect()
}

pub fn generate_summary(output: &JobOutput, generated_at: DateTime<Utc>) -> SummaryStats {
    SummaryStats {
        generated_at: generated_at.to_rfc3339(),
        records_seen: output.load.rows_in_file(),
        records_unreadable: output.load.unreadable,
        records_joined: output.load.joined,
        records_dropped: output.load.dropped(),
        groups: output.detail.len(),
        grand_total: output.detail.totals.sum,
        distinct_entities: output.detail.totals.distinct_entities(),
        unparsed_metric: output.detail.totals.unparsed_metric,
    }
}
