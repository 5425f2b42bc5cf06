use crate::builder::SqlDialect;
use crate::core::{BatchError, Result};
use crate::entity::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Rows per bulk statement unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 250;

/// Batching configuration for a transaction buffer
///
/// Changes take effect on the next commit pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum rows per INSERT/UPDATE statement
    pub max_batch_size: usize,

    /// Stamp created/updated columns on timestamp-aware entities
    pub touch_timestamps: bool,

    /// If non-empty, only these kinds are buffered
    pub allow_list: BTreeSet<EntityKind>,

    /// Kinds that are never buffered, even if allow-listed
    pub deny_list: BTreeSet<EntityKind>,

    /// SQL flavor for identifier quoting and placeholders
    pub dialect: SqlDialect,

    /// Upper bound on bound parameters per statement
    pub max_parameters: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            touch_timestamps: true,
            allow_list: BTreeSet::new(),
            deny_list: BTreeSet::new(),
            dialect: SqlDialect::default(),
            max_parameters: None,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum rows per statement
    pub fn max_batch_size(mut self, rows: usize) -> Self {
        self.max_batch_size = rows;
        self
    }

    /// Enable or disable timestamp stamping
    pub fn touch_timestamps(mut self, enabled: bool) -> Self {
        self.touch_timestamps = enabled;
        self
    }

    /// Replace the allow-list
    pub fn allow<I, K>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.allow_list = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the deny-list
    pub fn deny<I, K>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.deny_list = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Set the SQL dialect
    pub fn dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Cap bound parameters per statement (e.g. 65535 for PostgreSQL)
    pub fn max_parameters(mut self, limit: usize) -> Self {
        self.max_parameters = Some(limit);
        self
    }

    /// Parse a JSON configuration document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BatchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::InvalidConfig(
                "max_batch_size must be > 0".to_string(),
            ));
        }

        if self.max_parameters == Some(0) {
            return Err(BatchError::InvalidConfig(
                "max_parameters must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether records of `kind` may be buffered.
    ///
    /// The allow-list is checked first; the deny-list wins over it.
    pub fn admits(&self, kind: &EntityKind) -> bool {
        if !self.allow_list.is_empty() && !self.allow_list.contains(kind) {
            return false;
        }
        !self.deny_list.contains(kind)
    }
}
