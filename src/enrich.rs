//! Row-by-row table enrichment.
//!
//! Each row's address cells go through [`build_query`], one lookup is issued
//! per row, and the flattened result fields are appended as new columns.
//! Column assignment happens after all lookups finish, in row order, so the
//! output header is the same whether rows were fetched sequentially or on a
//! worker pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{Client, EnrichmentResult};
use crate::error::{ClientError, Result};
use crate::query::{build_query, AddressFields};
use crate::table::Table;
use crate::util::cell_text;

pub const DEFAULT_COLLISION_SUFFIX: &str = "_fod";

/// Names the table column that holds each address component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelectors {
    pub free_form_query: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl ColumnSelectors {
    pub fn free_form(column: impl Into<String>) -> Self {
        Self {
            free_form_query: Some(column.into()),
            ..Self::default()
        }
    }

    fn as_fields(&self) -> AddressFields {
        AddressFields {
            free_form_query: self.free_form_query.clone(),
            address1: self.address1.clone(),
            address2: self.address2.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
        }
    }

    /// Resolves selectors to column indices, rejecting conflicting, empty, or unknown selections.
    fn plan(&self, table: &Table) -> Result<RowPlan> {
        // Same rule as a single lookup: free-form or structured, never both.
        build_query(&self.as_fields())?;

        let resolve = |selector: &Option<String>| -> Result<Option<usize>> {
            match selector.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(name) => table
                    .column_index(name)
                    .map(Some)
                    .ok_or_else(|| ClientError::UnknownColumn(name.to_string())),
                None => Ok(None),
            }
        };
        Ok(RowPlan {
            free_form_query: resolve(&self.free_form_query)?,
            address1: resolve(&self.address1)?,
            address2: resolve(&self.address2)?,
            city: resolve(&self.city)?,
            state: resolve(&self.state)?,
            zip_code: resolve(&self.zip_code)?,
        })
    }
}

struct RowPlan {
    free_form_query: Option<usize>,
    address1: Option<usize>,
    address2: Option<usize>,
    city: Option<usize>,
    state: Option<usize>,
    zip_code: Option<usize>,
}

impl RowPlan {
    fn fields(&self, row: &[Value]) -> AddressFields {
        let read = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(cell_text);
        AddressFields {
            free_form_query: read(self.free_form_query),
            address1: read(self.address1),
            address2: read(self.address2),
            city: read(self.city),
            state: read(self.state),
            zip_code: read(self.zip_code),
        }
    }
}

/// What to do when a single row's lookup fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave the row's new columns null and keep going.
    #[default]
    Nullify,
    /// Stop and return the failing row's error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub failure_policy: FailurePolicy,
    /// Rows fetched concurrently. 1 means strictly sequential.
    pub workers: usize,
    pub collision_suffix: String,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            workers: 1,
            collision_suffix: DEFAULT_COLLISION_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub error: String,
}

/// Maps a result field to the column it was written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnAssignment {
    pub field: String,
    pub column: String,
}

impl ColumnAssignment {
    pub fn renamed(&self) -> bool {
        self.field != self.column
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichReport {
    pub table: Table,
    pub columns: Vec<ColumnAssignment>,
    pub failures: Vec<RowFailure>,
}

impl EnrichReport {
    pub fn succeeded(&self) -> usize {
        self.table.len() - self.failures.len()
    }
}

/// Flattens nested objects into dotted field names, keeping traversal order.
///
/// `{"county": {"name": "Leon"}}` becomes `county.name`. Empty objects produce
/// no fields; nulls and arrays are kept as values. A literal `"county.name"` key
/// next to a nested `county.name` yields the name twice; [`enrich`] gives the
/// second one its own column.
pub fn flatten_result(result: &EnrichmentResult) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(None, result, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, map: &EnrichmentResult, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(Some(&name), inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

/// Picks a column name for `field` that is not in `taken`.
///
/// `field` itself if free, then `field{suffix}`, then `field{suffix}_2`, `_3`, ...
pub fn disambiguate(field: &str, taken: &HashSet<String>, suffix: &str) -> String {
    if !taken.contains(field) {
        return field.to_string();
    }
    let base = format!("{field}{suffix}");
    if !taken.contains(&base) {
        return base;
    }
    (2usize..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

/// Looks up every row of `table` and returns a copy with the results appended as columns.
///
/// Selector problems fail before any lookup. Per-row failures follow
/// `options.failure_policy`.
pub fn enrich(
    table: &Table,
    client: &Client,
    selectors: &ColumnSelectors,
    options: &EnrichOptions,
) -> Result<EnrichReport> {
    let plan = selectors.plan(table)?;
    if options.workers == 0 {
        return Err(ClientError::Config("workers must be at least 1".into()));
    }

    if table.is_empty() {
        return Ok(EnrichReport {
            table: table.clone(),
            columns: Vec::new(),
            failures: Vec::new(),
        });
    }

    info!(
        rows = table.len(),
        workers = options.workers,
        "enriching table"
    );

    let progress = Progress::new(table.len());
    let fetch = |row: usize| -> Result<Vec<(String, Value)>> {
        let outcome = (|| -> RowOutcome {
            let fields = plan.fields(&table.rows()[row]);
            let query = build_query(&fields)?;
            let result = client.lookup(&query)?;
            Ok(flatten_result(&result))
        })();
        progress.tick(row);
        outcome
    };

    let outcomes = fetch_rows(table.len(), options, &fetch)?;

    let mut failures = Vec::new();
    let mut results = Vec::with_capacity(outcomes.len());
    for (row, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(fields) => results.push(Some(fields)),
            Err(err) => {
                warn!(row, error = %err, "lookup failed; leaving enrichment columns empty");
                failures.push(RowFailure {
                    row,
                    error: err.to_string(),
                });
                results.push(None);
            }
        }
    }

    let (output, columns) = merge(table, &results, &options.collision_suffix)?;
    info!(
        rows = output.len(),
        new_columns = columns.len(),
        failed = failures.len(),
        "enrichment finished"
    );
    Ok(EnrichReport {
        table: output,
        columns,
        failures,
    })
}

type RowOutcome = Result<Vec<(String, Value)>>;

/// Counts finished rows across workers and logs `done/total`.
struct Progress {
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn tick(&self, row: usize) -> usize {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(row, done, total = self.total, "row finished");
        done
    }
}

/// Runs `fetch` for every row index and returns outcomes in row order.
///
/// Under `Abort`, the lowest failing row's error is returned instead.
fn fetch_rows(
    rows: usize,
    options: &EnrichOptions,
    fetch: &(dyn Fn(usize) -> RowOutcome + Sync),
) -> Result<Vec<RowOutcome>> {
    let abort = options.failure_policy == FailurePolicy::Abort;

    let sequential = || -> Result<Vec<RowOutcome>> {
        let mut outcomes = Vec::with_capacity(rows);
        for row in 0..rows {
            match fetch(row) {
                Err(err) if abort => return Err(row_error(row, err)),
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    };

    if options.workers <= 1 || rows <= 1 {
        return sequential();
    }

    let outcomes: Vec<RowOutcome> = match ThreadPoolBuilder::new()
        .num_threads(options.workers.min(rows))
        .build()
    {
        Ok(pool) => pool.install(|| (0..rows).into_par_iter().map(fetch).collect()),
        Err(err) => {
            warn!(error = %err, "could not start worker pool; enriching sequentially");
            return sequential();
        }
    };

    if !abort {
        return Ok(outcomes);
    }
    let mut checked = Vec::with_capacity(rows);
    for (row, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Err(err) => return Err(row_error(row, err)),
            ok => checked.push(ok),
        }
    }
    Ok(checked)
}

fn row_error(row: usize, err: ClientError) -> ClientError {
    ClientError::Row {
        row,
        source: Box::new(err),
    }
}

/// Appends one column per distinct field, in order of first appearance.
fn merge(
    table: &Table,
    results: &[Option<Vec<(String, Value)>>],
    suffix: &str,
) -> Result<(Table, Vec<ColumnAssignment>)> {
    let mut taken: HashSet<String> = table.columns().iter().cloned().collect();
    let mut assignments: Vec<ColumnAssignment> = Vec::new();
    let mut values: Vec<Vec<Value>> = Vec::new();

    for (row, fields) in results.iter().enumerate() {
        let Some(fields) = fields else {
            continue;
        };
        let mut seen_in_row: HashSet<String> = HashSet::new();
        for (field, value) in fields {
            // Flattening can produce the same name twice within one result.
            let field = &disambiguate(field, &seen_in_row, suffix);
            seen_in_row.insert(field.clone());
            let slot = match assignments.iter().position(|a| &a.field == field) {
                Some(slot) => slot,
                None => {
                    let column = disambiguate(field, &taken, suffix);
                    if column != *field {
                        debug!(field = %field, column = %column, "renamed colliding column");
                    }
                    taken.insert(column.clone());
                    assignments.push(ColumnAssignment {
                        field: field.clone(),
                        column,
                    });
                    values.push(vec![Value::Null; results.len()]);
                    assignments.len() - 1
                }
            };
            values[slot][row] = value.clone();
        }
    }

    let mut output = table.clone();
    for (assignment, column_values) in assignments.iter().zip(values) {
        output.add_column(assignment.column.clone(), column_values)?;
    }
    Ok((output, assignments))
}
