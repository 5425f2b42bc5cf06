// ============================================================================
// Entity Record View
// ============================================================================
//
// Host persistence layers expose their entities through `EntityView`. The
// buffer never holds on to host objects: on registration it captures an owned
// `EntityRecord` snapshot, which lives until the commit pass consumes it.
//
// ============================================================================

use crate::core::{BatchError, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier of an entity type, used for grouping and allow/deny filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Kind named after a Rust type, for hosts that map one struct to one table.
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityKind {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Names of the columns a timestamp-aware entity keeps its create/update instants in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampColumns {
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl TimestampColumns {
    pub fn new(created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            created_at: Some(created_at.into()),
            updated_at: Some(updated_at.into()),
        }
    }

    /// Only an update column, for tables that do not record creation time.
    pub fn updated_only(updated_at: impl Into<String>) -> Self {
        Self {
            created_at: None,
            updated_at: Some(updated_at.into()),
        }
    }
}

impl Default for TimestampColumns {
    fn default() -> Self {
        Self::new("created_at", "updated_at")
    }
}

/// Read-only view of a host entity that is about to be saved.
///
/// Host adapters implement this for their model types. Only the methods
/// needed to build bulk statements are required; `timestamp_columns`
/// defaults to "no timestamps".
pub trait EntityView {
    fn kind(&self) -> EntityKind;
    fn table(&self) -> &str;
    fn primary_key_name(&self) -> &str;
    /// Key of the stored row. Only consulted when `exists()` is true.
    /// Every entity of one kind must report the same `Value` variant.
    fn primary_key_value(&self) -> Option<Value>;
    /// Whether the entity already has a stored row (UPDATE) or not (INSERT).
    fn exists(&self) -> bool;
    fn attributes(&self) -> BTreeMap<String, Value>;
    /// Attributes changed since the entity was loaded.
    fn dirty_attributes(&self) -> BTreeSet<String>;

    fn timestamp_columns(&self) -> Option<TimestampColumns> {
        None
    }
}

/// Owned snapshot of an [`EntityView`] taken at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    kind: EntityKind,
    table: String,
    primary_key_name: String,
    primary_key_value: Option<Value>,
    exists: bool,
    attributes: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    timestamps: Option<TimestampColumns>,
}

impl EntityRecord {
    /// A new (not yet stored) record with primary key column `id`.
    pub fn new(kind: impl Into<EntityKind>, table: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            table: table.into(),
            primary_key_name: "id".to_string(),
            primary_key_value: None,
            exists: false,
            attributes: BTreeMap::new(),
            dirty: BTreeSet::new(),
            timestamps: None,
        }
    }

    /// Snapshot a host entity, failing fast on missing identity data.
    pub fn capture<V: EntityView + ?Sized>(view: &V) -> Result<Self> {
        let exists = view.exists();
        let record = Self {
            kind: view.kind(),
            table: view.table().to_string(),
            primary_key_name: view.primary_key_name().to_string(),
            primary_key_value: if exists {
                view.primary_key_value()
            } else {
                None
            },
            exists,
            attributes: view.attributes(),
            dirty: if exists {
                view.dirty_attributes()
            } else {
                BTreeSet::new()
            },
            timestamps: view.timestamp_columns(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key_name = name.into();
        self
    }

    /// Mark the record as stored under `key`.
    pub fn existing(mut self, key: impl Into<Value>) -> Self {
        self.exists = true;
        self.primary_key_value = Some(key.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set an attribute and flag it dirty.
    pub fn changed(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.dirty.insert(name.clone());
        self.attributes.insert(name, value.into());
        self
    }

    pub fn dirty<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirty.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn timestamps(mut self, columns: TimestampColumns) -> Self {
        self.timestamps = Some(columns);
        self
    }

    /// Use the conventional `created_at` / `updated_at` columns.
    pub fn with_timestamps(self) -> Self {
        self.timestamps(TimestampColumns::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind.as_str().is_empty() {
            return Err(BatchError::Aggregation(format!(
                "record for table '{}' has no entity kind",
                self.table
            )));
        }
        if self.table.is_empty() {
            return Err(BatchError::Aggregation(format!(
                "record of kind '{}' has no table name",
                self.kind
            )));
        }
        if self.exists {
            if self.primary_key_name.is_empty() {
                return Err(BatchError::Aggregation(format!(
                    "existing record in '{}' has no primary key column",
                    self.table
                )));
            }
            match &self.primary_key_value {
                Some(value) if !value.is_null() => {}
                _ => {
                    return Err(BatchError::Aggregation(format!(
                        "existing record in '{}' has no value for primary key '{}'",
                        self.table, self.primary_key_name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn kind_id(&self) -> &EntityKind {
        &self.kind
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.primary_key_name
    }

    pub fn key(&self) -> Option<&Value> {
        self.primary_key_value.as_ref()
    }

    pub fn is_existing(&self) -> bool {
        self.exists
    }

    pub fn attribute_map(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn dirty_set(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn stamp_columns(&self) -> Option<&TimestampColumns> {
        self.timestamps.as_ref()
    }
}

impl EntityView for EntityRecord {
    fn kind(&self) -> EntityKind {
        self.kind.clone()
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn primary_key_name(&self) -> &str {
        &self.primary_key_name
    }

    fn primary_key_value(&self) -> Option<Value> {
        self.primary_key_value.clone()
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        self.attributes.clone()
    }

    fn dirty_attributes(&self) -> BTreeSet<String> {
        self.dirty.clone()
    }

    fn timestamp_columns(&self) -> Option<TimestampColumns> {
        self.timestamps.clone()
    }
}
