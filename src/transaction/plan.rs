use super::classify::classify;
use super::config::BatchConfig;
use crate::builder::{InsertBuilder, InsertStatement, UpdateBuilder, UpdateStatement};
use crate::channel::ExecutionChannel;
use crate::core::{BatchError, Clock, Phase, Result};
use crate::entity::{EntityKind, EntityRecord};
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// One bulk statement of a commit, tagged with its phase.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedStatement {
    Update(UpdateStatement),
    Insert(InsertStatement),
}

impl PlannedStatement {
    pub fn phase(&self) -> Phase {
        match self {
            PlannedStatement::Update(_) => Phase::Update,
            PlannedStatement::Insert(_) => Phase::Insert,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            PlannedStatement::Update(stmt) => stmt.table(),
            PlannedStatement::Insert(stmt) => stmt.table(),
        }
    }

    pub fn chunk_index(&self) -> usize {
        match self {
            PlannedStatement::Update(stmt) => stmt.chunk_index(),
            PlannedStatement::Insert(stmt) => stmt.chunk_index(),
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            PlannedStatement::Update(stmt) => stmt.row_count(),
            PlannedStatement::Insert(stmt) => stmt.row_count(),
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            PlannedStatement::Update(stmt) => stmt.sql(),
            PlannedStatement::Insert(stmt) => stmt.sql(),
        }
    }
}

/// Outcome of an executed commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Statements the channel accepted
    pub statements: usize,
    /// Rows the channel reported inserted
    pub inserted_rows: u64,
    /// Rows the channel reported updated
    pub updated_rows: u64,
    /// Update groups with nothing dirty
    pub skipped_kinds: Vec<EntityKind>,
}

/// Every statement one commit pass will run: all updates, then all inserts.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    id: Uuid,
    statements: Vec<PlannedStatement>,
    skipped_kinds: Vec<EntityKind>,
}

impl CommitPlan {
    pub fn build(records: Vec<EntityRecord>, config: &BatchConfig, clock: &dyn Clock) -> Result<Self> {
        let classified = classify(records)?;
        let mut statements = Vec::new();
        let mut skipped_kinds = Vec::new();

        let updates = UpdateBuilder::new(config, clock);
        for group in &classified.updates {
            match updates.build(group) {
                Some(built) => statements.extend(built.into_iter().map(PlannedStatement::Update)),
                None => {
                    event!(
                        Level::DEBUG,
                        kind = %group.kind,
                        records = group.len(),
                        "update group has no dirty attributes, skipping"
                    );
                    skipped_kinds.push(group.kind.clone());
                }
            }
        }

        let inserts = InsertBuilder::new(config, clock);
        for group in &classified.inserts {
            statements.extend(inserts.build(group).into_iter().map(PlannedStatement::Insert));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            statements,
            skipped_kinds,
        })
    }

    /// Unit-of-work id carried on commit spans.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn statements(&self) -> &[PlannedStatement] {
        &self.statements
    }

    pub fn skipped_kinds(&self) -> &[EntityKind] {
        &self.skipped_kinds
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Run the statements in order, stopping at the first failure.
    ///
    /// Chunks that already ran stay applied; the error names the phase,
    /// table and chunk that failed.
    pub async fn execute<C: ExecutionChannel + ?Sized>(self, channel: &C) -> Result<CommitReport> {
        let span = info_span!(
            "batch.commit",
            unit_of_work = %self.id,
            statements = self.statements.len()
        );

        async move {
            let mut report = CommitReport {
                skipped_kinds: self.skipped_kinds,
                ..CommitReport::default()
            };

            for statement in &self.statements {
                event!(
                    Level::DEBUG,
                    phase = %statement.phase(),
                    table = statement.table(),
                    chunk = statement.chunk_index(),
                    rows = statement.row_count(),
                    "executing bulk statement"
                );

                let outcome = match statement {
                    PlannedStatement::Update(stmt) => channel.execute_update(stmt).await,
                    PlannedStatement::Insert(stmt) => channel.execute_insert(stmt).await,
                };

                let affected = outcome.map_err(|err| {
                    event!(
                        Level::WARN,
                        phase = %statement.phase(),
                        table = statement.table(),
                        chunk = statement.chunk_index(),
                        error = %err,
                        "bulk statement failed"
                    );
                    BatchError::Execution {
                        phase: statement.phase(),
                        table: statement.table().to_string(),
                        chunk: statement.chunk_index(),
                        source: Box::new(err),
                    }
                })?;

                report.statements += 1;
                match statement.phase() {
                    Phase::Update => report.updated_rows += affected,
                    Phase::Insert => report.inserted_rows += affected,
                }
            }

            event!(
                Level::INFO,
                statements = report.statements,
                inserted = report.inserted_rows,
                updated = report.updated_rows,
                "commit applied"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
