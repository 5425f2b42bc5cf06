// ============================================================================
// Execution Channel
// ============================================================================
//
// The store-facing side of a commit. Each call must apply its whole statement
// or nothing; the batching layer never retries and never rolls back earlier
// chunks. Hosts that need all-or-nothing commits wrap the channel in a store
// transaction.
//
// ============================================================================

pub mod memory;
pub mod recording;

pub use memory::MemoryStore;
pub use recording::{RecordedStatement, RecordingChannel};

use crate::builder::{InsertStatement, UpdateStatement};
use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs finished bulk statements against a store.
///
/// Both methods return the number of rows the store reports as affected.
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64>;

    async fn execute_update(&self, statement: &UpdateStatement) -> Result<u64>;
}

#[async_trait]
impl<C: ExecutionChannel + ?Sized> ExecutionChannel for Arc<C> {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64> {
        (**self).execute_insert(statement).await
    }

    async fn execute_update(&self, statement: &UpdateStatement) -> Result<u64> {
        (**self).execute_update(statement).await
    }
}
