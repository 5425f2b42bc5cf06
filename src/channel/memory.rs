use super::ExecutionChannel;
use crate::builder::{InsertStatement, UpdateStatement};
use crate::core::{BatchError, Result, Value};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

pub type StoredRow = BTreeMap<String, Value>;

/// In-memory table store that applies bulk statements structurally.
///
/// Rows are column maps; updates match rows on the statement's primary key
/// column. Each statement is applied under one write lock, so it lands
/// completely or not at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<StoredRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table
    pub async fn create_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(name) {
            return Err(BatchError::Store(format!("Table '{}' already exists", name)));
        }
        tables.insert(name.to_string(), Vec::new());
        Ok(())
    }

    /// Put a row in place directly, bypassing the batching layer
    pub async fn seed<I, K, V>(&self, table: &str, row: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| table_not_found(table))?;
        rows.push(
            row.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        Ok(())
    }

    pub async fn rows(&self, table: &str) -> Result<Vec<StoredRow>> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .cloned()
            .ok_or_else(|| table_not_found(table))
    }

    /// First row whose `key_column` equals `key`
    pub async fn find(&self, table: &str, key_column: &str, key: &Value) -> Result<Option<StoredRow>> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(rows
            .iter()
            .find(|row| row.get(key_column) == Some(key))
            .cloned())
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(Vec::len)
            .ok_or_else(|| table_not_found(table))
    }
}

fn table_not_found(table: &str) -> BatchError {
    BatchError::Store(format!("Table '{}' not found", table))
}

#[async_trait]
impl ExecutionChannel for MemoryStore {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(statement.table())
            .ok_or_else(|| table_not_found(statement.table()))?;

        for values in statement.rows() {
            rows.push(
                statement
                    .columns()
                    .iter()
                    .cloned()
                    .zip(values.iter().cloned())
                    .collect(),
            );
        }
        Ok(statement.row_count() as u64)
    }

    async fn execute_update(&self, statement: &UpdateStatement) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(statement.table())
            .ok_or_else(|| table_not_found(statement.table()))?;

        let key_column = statement.primary_key_name();
        let mut affected = 0;
        for row in rows.iter_mut() {
            let Some(key) = row.get(key_column) else {
                continue;
            };
            let Some(patch) = statement.patch(key) else {
                continue;
            };
            for (column, value) in patch.values() {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }
}
