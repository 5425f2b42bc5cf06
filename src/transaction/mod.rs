// ============================================================================
// Transaction Buffer Module
// ============================================================================
//
// Collects entity saves for one unit of work and turns them into bulk
// statements at commit:
//
//   start -> register* -> commit
//                           ├─ classify: inserts / updates, grouped by kind
//                           ├─ build UPDATEs, then INSERTs (chunked)
//                           └─ execute through the channel, in that order
//
// ============================================================================

pub mod buffer;
pub mod classify;
pub mod config;
pub mod plan;
pub mod state;

pub use buffer::TransactionBuffer;
pub use classify::{Classification, KindGroup, classify};
pub use config::{BatchConfig, DEFAULT_MAX_BATCH_SIZE};
pub use plan::{CommitPlan, CommitReport, PlannedStatement};
pub use state::BufferState;
