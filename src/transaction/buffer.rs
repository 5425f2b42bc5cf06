use super::config::BatchConfig;
use super::plan::{CommitPlan, CommitReport};
use super::state::BufferState;
use crate::builder::SqlDialect;
use crate::channel::ExecutionChannel;
use crate::core::{BatchError, Clock, Result, SystemClock};
use crate::entity::{EntityKind, EntityRecord, EntityView};
use std::sync::Arc;
use tracing::{Level, event};

/// Deferred saves for one unit of work
///
/// Between [`start`](Self::start) and [`commit`](Self::commit) every
/// admitted entity passed to [`register`](Self::register) is held back from
/// the host's single-row save path. Commit turns them into bulk UPDATEs
/// (first) and bulk INSERTs (second).
///
/// # Thread Safety
/// All mutation takes `&mut self`. Hosts that can only reach the buffer
/// through a shared reference use [`SharedBuffer`](crate::SharedBuffer).
#[derive(Debug)]
pub struct TransactionBuffer {
    state: BufferState,
    records: Vec<EntityRecord>,
    config: BatchConfig,
    clock: Arc<dyn Clock>,
}

impl Default for TransactionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self {
            state: BufferState::Idle,
            records: Vec::new(),
            config: BatchConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Replace the clock used for created/updated stamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Begin deferring saves. Calling it again while collecting changes nothing.
    pub fn start(&mut self) {
        if !self.state.is_collecting() {
            event!(Level::DEBUG, "transaction buffer collecting");
        }
        self.state = BufferState::Collecting;
    }

    /// Offer an entity that is about to be saved.
    ///
    /// Returns `Ok(true)` when the caller must save it through its normal
    /// path now, `Ok(false)` when it was buffered and must not be saved.
    /// Only buffered entities are inspected, so an incomplete entity the
    /// buffer declines never produces an error.
    pub fn register<V: EntityView + ?Sized>(&mut self, entity: &V) -> Result<bool> {
        if !self.state.is_collecting() {
            return Ok(true);
        }

        let kind = entity.kind();
        if !self.config.admits(&kind) {
            event!(Level::TRACE, kind = %kind, "kind filtered out of batching");
            return Ok(true);
        }

        let record = EntityRecord::capture(entity)?;
        self.records.push(record);
        Ok(false)
    }

    /// Classify and build the commit's statements, then reset to idle.
    ///
    /// Returns `None` when the buffer is not collecting. The buffer is reset
    /// even if building fails.
    pub fn plan(&mut self) -> Result<Option<CommitPlan>> {
        if !self.state.is_collecting() {
            return Ok(None);
        }

        let records = std::mem::take(&mut self.records);
        self.state = BufferState::Idle;

        event!(Level::DEBUG, records = records.len(), "planning bulk commit");
        CommitPlan::build(records, &self.config, self.clock.as_ref()).map(Some)
    }

    /// Flush buffered saves through `channel`.
    ///
    /// A no-op when not collecting. Updates run before inserts. On failure the
    /// buffer is already idle and empty; statements that ran are not undone.
    pub async fn commit<C: ExecutionChannel + ?Sized>(&mut self, channel: &C) -> Result<CommitReport> {
        match self.plan()? {
            Some(plan) => plan.execute(channel).await,
            None => Ok(CommitReport::default()),
        }
    }

    /// Drop buffered saves without running anything. Returns how many were dropped.
    pub fn abort(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        self.state = BufferState::Idle;
        if dropped > 0 {
            event!(Level::DEBUG, dropped, "transaction buffer aborted");
        }
        dropped
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state.is_collecting()
    }

    /// Buffered entities awaiting commit.
    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: BatchConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_max_batch_size(&mut self, rows: usize) -> Result<()> {
        if rows == 0 {
            return Err(BatchError::InvalidConfig(
                "max_batch_size must be > 0".to_string(),
            ));
        }
        self.config.max_batch_size = rows;
        Ok(())
    }

    pub fn set_touch_timestamps(&mut self, enabled: bool) {
        self.config.touch_timestamps = enabled;
    }

    pub fn set_allow_list<I, K>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.config.allow_list = kinds.into_iter().map(Into::into).collect();
    }

    pub fn set_deny_list<I, K>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.config.deny_list = kinds.into_iter().map(Into::into).collect();
    }

    pub fn set_dialect(&mut self, dialect: SqlDialect) {
        self.config.dialect = dialect;
    }

    pub fn set_max_parameters(&mut self, limit: Option<usize>) -> Result<()> {
        if limit == Some(0) {
            return Err(BatchError::InvalidConfig(
                "max_parameters must be > 0".to_string(),
            ));
        }
        self.config.max_parameters = limit;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;
    use crate::core::Phase;

    fn user(name: &str) -> EntityRecord {
        EntityRecord::new("User", "users").attribute("name", name)
    }

    #[test]
    fn test_register_while_idle_declines() {
        let mut buffer = TransactionBuffer::new();
        assert!(buffer.register(&user("a")).unwrap());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_register_while_collecting_buffers() {
        let mut buffer = TransactionBuffer::new();
        buffer.start();
        buffer.start();
        assert_eq!(buffer.state(), BufferState::Collecting);
        assert!(!buffer.register(&user("a")).unwrap());
        assert!(!buffer.register(&user("b")).unwrap());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_filtered_kind_is_not_inspected() {
        let mut buffer = TransactionBuffer::new();
        buffer.set_deny_list(["Broken"]);
        buffer.start();

        // No table: would fail capture if it were buffered.
        let broken = EntityRecord::new("Broken", "");
        assert!(buffer.register(&broken).unwrap());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_entity_fails_fast() {
        let mut buffer = TransactionBuffer::new();
        buffer.start();
        let err = buffer.register(&EntityRecord::new("User", "")).unwrap_err();
        assert!(matches!(err, BatchError::Aggregation(_)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_setters_validate() {
        let mut buffer = TransactionBuffer::new();
        assert!(buffer.set_max_batch_size(0).is_err());
        assert_eq!(buffer.config().max_batch_size, 250);
        buffer.set_max_batch_size(10).unwrap();
        assert_eq!(buffer.config().max_batch_size, 10);
        assert!(buffer.set_max_parameters(Some(0)).is_err());
        assert!(TransactionBuffer::with_config(BatchConfig::new().max_batch_size(0)).is_err());
    }

    #[test]
    fn test_set_config_replaces_settings_after_validation() {
        let mut buffer = TransactionBuffer::new();
        let rejected = BatchConfig::new().max_batch_size(0);
        assert!(matches!(
            buffer.set_config(rejected),
            Err(BatchError::InvalidConfig(_))
        ));
        assert_eq!(buffer.config(), &BatchConfig::default());

        let config = BatchConfig::new()
            .max_batch_size(3)
            .dialect(SqlDialect::Postgres)
            .deny(["Audit"]);
        buffer.set_config(config.clone()).unwrap();
        assert_eq!(buffer.config(), &config);

        buffer.start();
        assert!(buffer.register(&EntityRecord::new("Audit", "audits")).unwrap());
    }

    #[test]
    fn test_abort_discards_and_goes_idle() {
        let mut buffer = TransactionBuffer::new();
        buffer.start();
        buffer.register(&user("a")).unwrap();
        assert_eq!(buffer.abort(), 1);
        assert!(!buffer.is_collecting());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_plan_resets_buffer() {
        let mut buffer = TransactionBuffer::new();
        assert!(buffer.plan().unwrap().is_none());

        buffer.start();
        buffer.register(&user("a")).unwrap();
        let plan = buffer.plan().unwrap().unwrap();
        assert_eq!(plan.len(), 1);
        assert!(!buffer.is_collecting());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_commit_runs_updates_before_inserts() {
        let channel = RecordingChannel::new();
        let mut buffer = TransactionBuffer::new();
        buffer.start();
        buffer.register(&user("new")).unwrap();
        buffer
            .register(&EntityRecord::new("User", "users").existing(1).changed("name", "old"))
            .unwrap();

        let report = buffer.commit(&channel).await.unwrap();
        assert_eq!(report.statements, 2);
        assert_eq!(report.inserted_rows, 1);
        assert_eq!(report.updated_rows, 1);

        let phases: Vec<_> = channel.statements().unwrap().iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![Phase::Update, Phase::Insert]);
    }

    #[tokio::test]
    async fn test_commit_while_idle_is_noop() {
        let channel = RecordingChannel::new();
        let mut buffer = TransactionBuffer::new();
        buffer.set_max_batch_size(7).unwrap();

        let report = buffer.commit(&channel).await.unwrap();
        assert_eq!(report, CommitReport::default());
        assert!(channel.is_empty().unwrap());
        assert_eq!(buffer.config().max_batch_size, 7);
    }
}
