use super::ExecutionChannel;
use crate::builder::{InsertStatement, UpdateStatement};
use crate::core::{BatchError, Phase, Result, Value};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// One statement as it reached the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub phase: Phase,
    pub table: String,
    pub chunk: usize,
    pub rows: usize,
    pub sql: String,
    pub params: Vec<Value>,
}

/// Channel that keeps every statement it receives instead of running it.
///
/// Useful for dry runs and for asserting on the exact SQL a commit emits.
/// Tables can be marked as failing to exercise error paths.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    statements: Mutex<Vec<RecordedStatement>>,
    failing_tables: Mutex<HashSet<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement against `table` fail with a store error.
    pub fn fail_table(&self, table: impl Into<String>) -> Result<()> {
        self.failing_tables.lock()?.insert(table.into());
        Ok(())
    }

    pub fn statements(&self) -> Result<Vec<RecordedStatement>> {
        Ok(self.statements.lock()?.clone())
    }

    pub fn sql(&self) -> Result<Vec<String>> {
        Ok(self.statements.lock()?.iter().map(|s| s.sql.clone()).collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.statements.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn record(&self, statement: RecordedStatement) -> Result<u64> {
        if self.failing_tables.lock()?.contains(&statement.table) {
            return Err(BatchError::Store(format!(
                "table '{}' rejected the statement",
                statement.table
            )));
        }
        let rows = statement.rows as u64;
        self.statements.lock()?.push(statement);
        Ok(rows)
    }
}

#[async_trait]
impl ExecutionChannel for RecordingChannel {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64> {
        self.record(RecordedStatement {
            phase: Phase::Insert,
            table: statement.table().to_string(),
            chunk: statement.chunk_index(),
            rows: statement.row_count(),
            sql: statement.sql().to_string(),
            params: statement.params(),
        })
    }

    async fn execute_update(&self, statement: &UpdateStatement) -> Result<u64> {
        self.record(RecordedStatement {
            phase: Phase::Update,
            table: statement.table().to_string(),
            chunk: statement.chunk_index(),
            rows: statement.row_count(),
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        })
    }
}
