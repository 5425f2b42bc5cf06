// ============================================================================
// Bulk Insert Builder
// ============================================================================
//
// One insert group (same kind, none stored yet) becomes one multi-row INSERT
// per chunk. Rows may carry different attribute sets, so every row is widened
// to the union of the group's columns with NULL for anything it lacks.
//
// ============================================================================

use super::sql::{SqlDialect, rows_per_statement};
use crate::core::{Clock, Value};
use crate::entity::EntityRecord;
use crate::transaction::{BatchConfig, KindGroup};
use std::collections::HashMap;

/// A multi-row INSERT for one chunk of an insert group.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    chunk: usize,
    sql: String,
}

impl InsertStatement {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column order shared by every row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Zero-based chunk index within the group.
    pub fn chunk_index(&self) -> usize {
        self.chunk
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Positional parameters: row-major, in column order.
    pub fn params(&self) -> Vec<Value> {
        self.rows.iter().flatten().cloned().collect()
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| &r[idx])
    }
}

pub struct InsertBuilder<'a> {
    config: &'a BatchConfig,
    clock: &'a dyn Clock,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(config: &'a BatchConfig, clock: &'a dyn Clock) -> Self {
        Self { config, clock }
    }

    pub fn build(&self, group: &KindGroup) -> Vec<InsertStatement> {
        let columns = self.column_union(&group.records);
        let positions: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        let rows: Vec<Vec<Value>> = group
            .records
            .iter()
            .map(|record| self.row_for(record, &columns, &positions))
            .collect();

        let per_statement = if columns.is_empty() && self.config.dialect != SqlDialect::MySql {
            // DEFAULT VALUES covers a single row only.
            1
        } else {
            rows_per_statement(
                self.config.max_batch_size,
                self.config.max_parameters,
                columns.len(),
            )
        };

        rows.chunks(per_statement)
            .enumerate()
            .map(|(chunk, rows)| {
                let sql = render(self.config.dialect, &group.table, &columns, rows);
                InsertStatement {
                    table: group.table.clone(),
                    columns: columns.clone(),
                    rows: rows.to_vec(),
                    chunk,
                    sql,
                }
            })
            .collect()
    }

    fn stamps(&self, record: &EntityRecord) -> bool {
        self.config.touch_timestamps && record.stamp_columns().is_some()
    }

    fn column_union(&self, records: &[EntityRecord]) -> Vec<String> {
        fn push(columns: &mut Vec<String>, name: &str) {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }

        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for name in record.attribute_map().keys() {
                push(&mut columns, name);
            }
        }
        for record in records.iter().filter(|r| self.stamps(r)) {
            if let Some(stamps) = record.stamp_columns() {
                for name in [&stamps.created_at, &stamps.updated_at].into_iter().flatten() {
                    push(&mut columns, name);
                }
            }
        }
        columns
    }

    fn row_for(
        &self,
        record: &EntityRecord,
        columns: &[String],
        positions: &HashMap<&str, usize>,
    ) -> Vec<Value> {
        let mut row = vec![Value::Null; columns.len()];
        for (name, value) in record.attribute_map() {
            if let Some(&idx) = positions.get(name.as_str()) {
                row[idx] = value.clone();
            }
        }

        if self.stamps(record) {
            if let Some(stamps) = record.stamp_columns() {
                let now = Value::Timestamp(self.clock.now());
                for name in [&stamps.created_at, &stamps.updated_at].into_iter().flatten() {
                    if let Some(&idx) = positions.get(name.as_str()) {
                        row[idx] = now.clone();
                    }
                }
            }
        }
        row
    }
}

fn render(dialect: SqlDialect, table: &str, columns: &[String], rows: &[Vec<Value>]) -> String {
    let table = dialect.quote_ident(table);

    if columns.is_empty() {
        return match dialect {
            SqlDialect::MySql => format!(
                "INSERT INTO {} () VALUES {}",
                table,
                vec!["()"; rows.len()].join(", ")
            ),
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("INSERT INTO {} DEFAULT VALUES", table)
            }
        };
    }

    let column_list = columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = dialect.placeholders();
    let tuples = rows
        .iter()
        .map(|row| {
            let slots: Vec<String> = row.iter().map(|_| placeholders.next()).collect();
            format!("({})", slots.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO {} ({}) VALUES {}", table, column_list, tuples)
}
