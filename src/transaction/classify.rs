use crate::core::{BatchError, Result};
use crate::entity::{EntityKind, EntityRecord};
use std::collections::{HashMap, HashSet};

/// Buffered records of one kind, in registration order.
#[derive(Debug, Clone)]
pub struct KindGroup {
    pub kind: EntityKind,
    pub table: String,
    pub primary_key_name: String,
    pub records: Vec<EntityRecord>,
}

impl KindGroup {
    fn start(record: EntityRecord) -> Self {
        Self {
            kind: record.kind_id().clone(),
            table: record.table_name().to_string(),
            primary_key_name: record.key_name().to_string(),
            records: vec![record],
        }
    }

    fn push(&mut self, record: EntityRecord) -> Result<()> {
        if record.table_name() != self.table {
            return Err(BatchError::Aggregation(format!(
                "kind '{}' maps to both '{}' and '{}'",
                self.kind,
                self.table,
                record.table_name()
            )));
        }
        if record.is_existing() && record.key_name() != self.primary_key_name {
            return Err(BatchError::Aggregation(format!(
                "kind '{}' uses primary keys '{}' and '{}'",
                self.kind,
                self.primary_key_name,
                record.key_name()
            )));
        }
        if let (Some(key), Some(first)) =
            (record.key(), self.records.iter().find_map(EntityRecord::key))
        {
            // `1` and `'1'` would be two patches for one stored row.
            if key.type_name() != first.type_name() {
                return Err(BatchError::Aggregation(format!(
                    "kind '{}' mixes {} and {} primary key values",
                    self.kind,
                    first.type_name(),
                    key.type_name()
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// Union of every record's dirty attributes, in first-seen order.
    pub fn dirty_union(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for record in &self.records {
            for name in record.dirty_set() {
                if seen.insert(name.as_str()) {
                    union.push(name.clone());
                }
            }
        }
        union
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Buffered records split into per-kind insert and update groups.
#[derive(Debug, Default)]
pub struct Classification {
    pub inserts: Vec<KindGroup>,
    pub updates: Vec<KindGroup>,
}

/// Partition records by existence, then by kind. Groups keep first-seen kind order.
pub fn classify(records: Vec<EntityRecord>) -> Result<Classification> {
    let mut inserts = Grouper::default();
    let mut updates = Grouper::default();

    for record in records {
        if record.is_existing() {
            updates.add(record)?;
        } else {
            inserts.add(record)?;
        }
    }

    Ok(Classification {
        inserts: inserts.groups,
        updates: updates.groups,
    })
}

#[derive(Default)]
struct Grouper {
    index: HashMap<EntityKind, usize>,
    groups: Vec<KindGroup>,
}

impl Grouper {
    fn add(&mut self, record: EntityRecord) -> Result<()> {
        match self.index.get(record.kind_id()) {
            Some(&idx) => self.groups[idx].push(record),
            None => {
                self.index
                    .insert(record.kind_id().clone(), self.groups.len());
                self.groups.push(KindGroup::start(record));
                Ok(())
            }
        }
    }
}
