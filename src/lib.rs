// ============================================================================
// modelbatch Library
// ============================================================================

pub mod builder;
pub mod channel;
pub mod core;
pub mod entity;
pub mod interceptor;
pub mod transaction;

// Re-export main types for convenience
pub use builder::{InsertStatement, RowPatch, SqlDialect, UpdateStatement};
pub use channel::{ExecutionChannel, MemoryStore, RecordedStatement, RecordingChannel};
pub use self::core::{BatchError, Clock, Phase, Result, SystemClock, Value};
pub use entity::{EntityKind, EntityRecord, EntityView, TimestampColumns};
pub use interceptor::{PreSaveInterceptor, SharedBuffer, persist_or_defer};
pub use transaction::{
    BatchConfig, BufferState, CommitPlan, CommitReport, PlannedStatement, TransactionBuffer,
};

/// Open a unit of work: a buffer that is already collecting
///
/// ```
/// use modelbatch::{EntityRecord, RecordingChannel};
///
/// # #[tokio::main]
/// # async fn main() -> modelbatch::Result<()> {
/// let mut buffer = modelbatch::unit_of_work();
///
/// for name in ["ann", "bob", "cy"] {
///     let user = EntityRecord::new("User", "users").attribute("name", name);
///     // `false`: deferred, the host must not save it now.
///     assert!(!buffer.register(&user)?);
/// }
///
/// let channel = RecordingChannel::new();
/// let report = buffer.commit(&channel).await?;
/// assert_eq!(report.inserted_rows, 3);
/// assert_eq!(
///     channel.sql()?,
///     vec!["INSERT INTO `users` (`name`) VALUES (?), (?), (?)"]
/// );
/// # Ok(())
/// # }
/// ```
pub fn unit_of_work() -> TransactionBuffer {
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer
}
