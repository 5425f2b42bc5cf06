// ============================================================================
// Bulk Update Builder
// ============================================================================
//
// One update group (same kind, already stored) becomes one CASE-based UPDATE
// per chunk:
//
//   UPDATE t SET x = (CASE pk WHEN ? THEN ? ... ELSE x END), ... WHERE pk IN (?, ...)
//
// A row registered more than once is merged into a single patch. The first
// registration snapshots every column in the group's dirty union; later ones
// only overwrite the columns they themselves marked dirty.
//
// ============================================================================

use super::sql::{SqlDialect, rows_per_statement};
use crate::core::{Clock, Value};
use crate::entity::EntityRecord;
use crate::transaction::{BatchConfig, KindGroup};
use std::collections::HashMap;

/// Column values to write for one primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPatch {
    key: Value,
    values: Vec<(String, Value)>,
}

impl RowPatch {
    fn new(key: Value) -> Self {
        Self {
            key,
            values: Vec::new(),
        }
    }

    fn set(&mut self, column: &str, value: Value) {
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A CASE-based UPDATE for one chunk of an update group.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    table: String,
    primary_key_name: String,
    columns: Vec<String>,
    patches: Vec<RowPatch>,
    chunk: usize,
    sql: String,
    params: Vec<Value>,
}

impl UpdateStatement {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key_name
    }

    /// SET columns, in statement order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn patches(&self) -> &[RowPatch] {
        &self.patches
    }

    pub fn patch(&self, key: &Value) -> Option<&RowPatch> {
        self.patches.iter().find(|p| p.key() == key)
    }

    pub fn row_count(&self) -> usize {
        self.patches.len()
    }

    /// Zero-based chunk index within the group.
    pub fn chunk_index(&self) -> usize {
        self.chunk
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

pub struct UpdateBuilder<'a> {
    config: &'a BatchConfig,
    clock: &'a dyn Clock,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(config: &'a BatchConfig, clock: &'a dyn Clock) -> Self {
        Self { config, clock }
    }

    /// Statements for `group`, or `None` when no record in it has a dirty
    /// attribute with a loaded value.
    pub fn build(&self, group: &KindGroup) -> Option<Vec<UpdateStatement>> {
        let dirty_union = group.dirty_union();
        if dirty_union.is_empty() {
            return None;
        }

        let patches = self.merge(group, &dirty_union);
        if patches.is_empty() {
            return None;
        }

        let mut ordered_columns = dirty_union;
        for patch in &patches {
            for (name, _) in patch.values() {
                if !ordered_columns.contains(name) {
                    ordered_columns.push(name.clone());
                }
            }
        }

        let per_statement = rows_per_statement(
            self.config.max_batch_size,
            self.config.max_parameters,
            2 * ordered_columns.len() + 1,
        );

        let statements = patches
            .chunks(per_statement)
            .enumerate()
            .map(|(chunk, patches)| {
                let columns: Vec<String> = ordered_columns
                    .iter()
                    .filter(|c| patches.iter().any(|p| p.get(c).is_some()))
                    .cloned()
                    .collect();
                let (sql, params) = render(
                    self.config.dialect,
                    &group.table,
                    &group.primary_key_name,
                    &columns,
                    patches,
                );
                UpdateStatement {
                    table: group.table.clone(),
                    primary_key_name: group.primary_key_name.clone(),
                    columns,
                    patches: patches.to_vec(),
                    chunk,
                    sql,
                    params,
                }
            })
            .collect();

        Some(statements)
    }

    /// One patch per primary key, in first-seen order.
    fn merge(&self, group: &KindGroup, dirty_union: &[String]) -> Vec<RowPatch> {
        let mut index: HashMap<Value, usize> = HashMap::new();
        let mut patches: Vec<RowPatch> = Vec::new();

        for record in &group.records {
            let Some(key) = record.key() else {
                continue;
            };

            let idx = match index.get(key) {
                Some(&idx) => {
                    let patch = &mut patches[idx];
                    for name in record.dirty_set() {
                        if let Some(value) = record.get(name) {
                            patch.set(name, value.clone());
                        }
                    }
                    idx
                }
                None => {
                    let mut patch = RowPatch::new(key.clone());
                    // Columns the record has no loaded value for keep their stored value.
                    for name in dirty_union {
                        if let Some(value) = record.get(name) {
                            patch.set(name, value.clone());
                        }
                    }
                    index.insert(key.clone(), patches.len());
                    patches.push(patch);
                    patches.len() - 1
                }
            };

            if let Some(column) = self.updated_at_column(record) {
                patches[idx].set(column, Value::Timestamp(self.clock.now()));
            }
        }

        patches.retain(|patch| !patch.is_empty());
        patches
    }

    fn updated_at_column<'r>(&self, record: &'r EntityRecord) -> Option<&'r str> {
        if !self.config.touch_timestamps {
            return None;
        }
        record
            .stamp_columns()
            .and_then(|stamps| stamps.updated_at.as_deref())
    }
}

fn render(
    dialect: SqlDialect,
    table: &str,
    key_name: &str,
    columns: &[String],
    patches: &[RowPatch],
) -> (String, Vec<Value>) {
    let key_ident = dialect.quote_ident(key_name);
    let mut placeholders = dialect.placeholders();
    let mut params = Vec::new();

    let cases = columns
        .iter()
        .map(|column| {
            let ident = dialect.quote_ident(column);
            let mut case = format!("{} = (CASE {}", ident, key_ident);
            for patch in patches {
                if let Some(value) = patch.get(column) {
                    case.push_str(&format!(
                        " WHEN {} THEN {}",
                        placeholders.next(),
                        placeholders.next()
                    ));
                    params.push(patch.key().clone());
                    params.push(value.clone());
                }
            }
            case.push_str(&format!(" ELSE {} END)", ident));
            case
        })
        .collect::<Vec<_>>()
        .join(", ");

    let keys = patches
        .iter()
        .map(|patch| {
            params.push(patch.key().clone());
            placeholders.next()
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE {} IN ({})",
        dialect.quote_ident(table),
        cases,
        key_ident,
        keys
    );
    (sql, params)
}
