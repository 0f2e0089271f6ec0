// Grouped share-of-total reporting over star-schema CSV data.
//
// Fact rows are joined to their dimension tables by the `loader`,
// bucketed by an arbitrary key in one pass by `aggregate`, and turned
// into ranked rows with percentage shares by `rollup`.
pub mod aggregate;
pub mod config;
pub mod error;
pub mod loader;
pub mod output;
pub mod reports;
pub mod rollup;
pub mod types;
pub mod util;

pub use aggregate::{aggregate, group_by, Aggregation, GrandTotals, GroupAccumulator};
pub use config::ReportJob;
pub use error::{ReportError, Result};
pub use loader::{load, DimensionTable, Dimensions, LoadReport};
pub use rollup::rollup;
pub use types::{GroupKey, JoinSpec, MetricsSpec, Record, ReportRow, Value};
