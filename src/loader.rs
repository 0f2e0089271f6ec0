use crate::error::{ReportError, Result};
use crate::types::{JoinSpec, Record, Value};
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows read from one CSV source, with the header line kept so callers can
/// declare the record shape.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub parse_errors: usize,
}

pub fn read_records<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let mut records = Vec::new();
    let mut parse_errors = 0usize;

    for (line, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(line = line + 2, error = %e, "skipping unreadable row");
                parse_errors += 1;
                continue;
            }
        };
        // Short rows are padded with nulls; extra trailing cells are ignored.
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), row.get(i).map(Value::from_cell).unwrap_or(Value::Null)))
            .collect();
        records.push(record);
    }

    Ok(Table {
        headers,
        records,
        parse_errors,
    })
}

pub fn read_records_from_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let table = read_records(file)?;
    if table.parse_errors > 0 {
        warn!(
            path = %path.display(),
            unreadable = table.parse_errors,
            "rows could not be read"
        );
    }
    info!(
        path = %path.display(),
        rows = table.records.len(),
        parse_errors = table.parse_errors,
        "read table"
    );
    Ok(table)
}

/// Lookup table from surrogate key to descriptive row. Keys are unique.
#[derive(Debug, Clone)]
pub struct DimensionTable {
    name: String,
    key_column: String,
    rows: HashMap<String, Record>,
}

impl DimensionTable {
    pub fn from_records<I>(name: &str, key_column: &str, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut rows = HashMap::new();
        for record in records {
            let Some(value) = record.get(key_column) else {
                return Err(ReportError::MissingKeyColumn {
                    dimension: name.to_string(),
                    column: key_column.to_string(),
                });
            };
            let Some(key) = value.as_key() else {
                debug!(dimension = name, "ignoring dimension row with empty key");
                continue;
            };
            if rows.contains_key(&key) {
                return Err(ReportError::DuplicateKey {
                    dimension: name.to_string(),
                    key,
                });
            }
            rows.insert(key, record);
        }
        Ok(DimensionTable {
            name: name.to_string(),
            key_column: key_column.to_string(),
            rows,
        })
    }

    /// Build from a CSV table, checking the key column against its headers
    /// so that an empty file with the wrong header still fails.
    pub fn from_table(name: &str, key_column: &str, table: Table) -> Result<Self> {
        if !table.headers.iter().any(|h| h == key_column) {
            return Err(ReportError::MissingKeyColumn {
                dimension: name.to_string(),
                column: key_column.to_string(),
            });
        }
        Self::from_records(name, key_column, table.records)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub type Dimensions = HashMap<String, DimensionTable>;

/// Why a fact row did not make it into the joined output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NullKey { field: String },
    Unresolved { dimension: String, key: String },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NullKey { field } => write!(f, "empty foreign key '{}'", field),
            DropReason::Unresolved { dimension, key } => {
                write!(f, "key '{}' not found in '{}'", key, dimension)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows the CSV reader could not decode; they never reach the join.
    pub unreadable: usize,
    pub seen: usize,
    pub joined: usize,
    pub dropped_null_key: usize,
    pub dropped_unresolved: usize,
}

impl LoadReport {
    /// Every data row of the fact file, readable or not.
    pub fn rows_in_file(&self) -> usize {
        self.unreadable + self.seen
    }

    pub fn dropped(&self) -> usize {
        self.dropped_null_key + self.dropped_unresolved
    }
}

type DropHook<'a> = Box<dyn FnMut(&Record, &DropReason) + 'a>;

/// Lazy sequence of joined records. Holds no state across runs beyond the
/// diagnostic counters of the current pass.
pub struct JoinedRecords<'a, I> {
    facts: I,
    joins: Vec<(&'a JoinSpec, &'a DimensionTable)>,
    report: LoadReport,
    on_drop: Option<DropHook<'a>>,
}

impl<'a, I> JoinedRecords<'a, I> {
    /// Called with every fact row that gets dropped, before it is discarded.
    pub fn with_drop_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Record, &DropReason) + 'a,
    {
        self.on_drop = Some(Box::new(hook));
        self
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    fn resolve(&self, mut record: Record) -> std::result::Result<Record, (Record, DropReason)> {
        for (spec, table) in &self.joins {
            let key = match record.get(&spec.foreign_key).and_then(Value::as_key) {
                Some(k) => k,
                None => {
                    let reason = DropReason::NullKey {
                        field: spec.foreign_key.clone(),
                    };
                    return Err((record, reason));
                }
            };
            let Some(row) = table.get(&key) else {
                let reason = DropReason::Unresolved {
                    dimension: table.name().to_string(),
                    key,
                };
                return Err((record, reason));
            };
            for attr in &spec.attributes {
                let value = row.get(attr).cloned().unwrap_or(Value::Null);
                record.insert(attr.clone(), value);
            }
        }
        Ok(record)
    }
}

impl<'a, I> Iterator for JoinedRecords<'a, I>
where
    I: Iterator<Item = Record>,
{
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let fact = self.facts.next()?;
            self.report.seen += 1;
            match self.resolve(fact) {
                Ok(joined) => {
                    self.report.joined += 1;
                    return Some(joined);
                }
                Err((fact, reason)) => {
                    match reason {
                        DropReason::NullKey { .. } => self.report.dropped_null_key += 1,
                        DropReason::Unresolved { .. } => self.report.dropped_unresolved += 1,
                    }
                    debug!(reason = %reason, "dropping fact row");
                    if let Some(hook) = self.on_drop.as_mut() {
                        hook(&fact, &reason);
                    }
                }
            }
        }
    }
}

/// Resolve `joins` for every fact row, lazily.
///
/// Joins run in order against the record built so far, so a join may use an
/// attribute copied by an earlier one as its foreign key. The only failure
/// is a join naming a dimension that was not supplied.
pub fn load<'a, F>(
    facts: F,
    dimensions: &'a Dimensions,
    joins: &'a [JoinSpec],
) -> Result<JoinedRecords<'a, F::IntoIter>>
where
    F: IntoIterator<Item = Record>,
{
    let mut resolved = Vec::with_capacity(joins.len());
    for spec in joins {
        let table = dimensions
            .get(&spec.dimension)
            .ok_or_else(|| ReportError::UnknownDimension(spec.dimension.clone()))?;
        resolved.push((spec, table));
    }
    Ok(JoinedRecords {
        facts: facts.into_iter(),
        joins: resolved,
        report: LoadReport::default(),
        on_drop: None,
    })
}
