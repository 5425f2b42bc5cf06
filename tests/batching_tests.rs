/// Batching tests
///
/// End-to-end behavior of start / register / commit against the recording
/// channel and the in-memory store.
/// Run with: cargo test --test batching_tests
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use modelbatch::{
    BatchConfig, BatchError, EntityRecord, ExecutionChannel, InsertStatement, MemoryStore, Phase,
    RecordingChannel, TransactionBuffer, UpdateStatement, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn new_user(name: &str) -> EntityRecord {
    EntityRecord::new("User", "users").attribute("name", name)
}

fn stored_user(id: i64) -> EntityRecord {
    EntityRecord::new("User", "users")
        .existing(id)
        .attribute("id", id)
}

#[tokio::test]
async fn test_register_returns_false_only_while_collecting_and_admitted() {
    let mut buffer = TransactionBuffer::new();
    buffer.set_allow_list(["User", "Post"]);
    buffer.set_deny_list(["Post"]);

    assert!(buffer.register(&new_user("idle")).unwrap());

    buffer.start();
    assert!(!buffer.register(&new_user("kept")).unwrap());
    assert!(buffer
        .register(&EntityRecord::new("Post", "posts").attribute("title", "x"))
        .unwrap());
    assert!(buffer
        .register(&EntityRecord::new("Comment", "comments").attribute("body", "x"))
        .unwrap());
    assert_eq!(buffer.len(), 1);

    let channel = RecordingChannel::new();
    buffer.commit(&channel).await.unwrap();
    assert!(buffer.register(&new_user("after")).unwrap());
}

#[test]
fn test_deny_list_wins_over_allow_list() {
    let mut buffer = TransactionBuffer::new();
    buffer.set_allow_list(["A"]);
    buffer.set_deny_list(["A"]);
    buffer.start();

    assert!(buffer.register(&EntityRecord::new("A", "a_table")).unwrap());
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_insert_rows_use_attribute_union() {
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer
        .register(&EntityRecord::new("Item", "items").attribute("a", 1).attribute("b", 2))
        .unwrap();
    buffer
        .register(&EntityRecord::new("Item", "items").attribute("a", 3).attribute("c", 4))
        .unwrap();

    let channel = RecordingChannel::new();
    buffer.commit(&channel).await.unwrap();

    let statements = channel.statements().unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].sql,
        "INSERT INTO `items` (`a`, `b`, `c`) VALUES (?, ?, ?), (?, ?, ?)"
    );
    assert_eq!(
        statements[0].params,
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Null,
            Value::Integer(3),
            Value::Null,
            Value::Integer(4),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_update_registrations_merge() {
    let store = MemoryStore::new();
    store.create_table("rows").await.unwrap();
    store
        .seed("rows", [("id", Value::Integer(1)), ("x", 0.into()), ("y", 0.into())])
        .await
        .unwrap();

    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer
        .register(
            &EntityRecord::new("Row", "rows")
                .existing(1)
                .attribute("y", 0)
                .changed("x", 5),
        )
        .unwrap();
    buffer
        .register(
            &EntityRecord::new("Row", "rows")
                .existing(1)
                .attribute("x", 0)
                .changed("y", 7),
        )
        .unwrap();

    let report = buffer.commit(&store).await.unwrap();
    assert_eq!(report.statements, 1);
    assert_eq!(report.updated_rows, 1);

    let row = store
        .find("rows", "id", &Value::Integer(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("x"), Some(&Value::Integer(5)));
    assert_eq!(row.get("y"), Some(&Value::Integer(7)));
}

#[tokio::test]
async fn test_501_inserts_split_into_three_statements() {
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    for i in 0..501i64 {
        buffer
            .register(&EntityRecord::new("Item", "items").attribute("n", i))
            .unwrap();
    }

    let channel = RecordingChannel::new();
    let report = buffer.commit(&channel).await.unwrap();
    assert_eq!(report.inserted_rows, 501);

    let statements = channel.statements().unwrap();
    let sizes: Vec<_> = statements.iter().map(|s| s.rows).collect();
    assert_eq!(sizes, vec![250, 250, 1]);

    let chunks: Vec<_> = statements.iter().map(|s| s.chunk).collect();
    assert_eq!(chunks, vec![0, 1, 2]);

    let order: Vec<i64> = statements
        .iter()
        .flat_map(|s| s.params.iter().filter_map(Value::as_i64))
        .collect();
    assert_eq!(order, (0..501).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_timestamps_on_insert_and_update() {
    let store = MemoryStore::new();
    store.create_table("posts").await.unwrap();
    let before = Value::Timestamp(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    store
        .seed(
            "posts",
            [
                ("id", Value::Integer(1)),
                ("title", "old".into()),
                ("updated_at", before.clone()),
            ],
        )
        .await
        .unwrap();

    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer
        .register(
            &EntityRecord::new("Post", "posts")
                .attribute("id", 2)
                .attribute("title", "fresh")
                .with_timestamps(),
        )
        .unwrap();
    buffer
        .register(
            &EntityRecord::new("Post", "posts")
                .existing(1)
                .attribute("id", 1)
                .attribute("updated_at", before.clone())
                .changed("title", "edited")
                .with_timestamps(),
        )
        .unwrap();
    buffer.commit(&store).await.unwrap();

    let inserted = store
        .find("posts", "id", &Value::Integer(2))
        .await
        .unwrap()
        .unwrap();
    let created = inserted.get("created_at").unwrap();
    assert!(created.as_timestamp().is_some());
    assert_eq!(Some(created), inserted.get("updated_at"));

    let updated = store
        .find("posts", "id", &Value::Integer(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get("title"), Some(&Value::from("edited")));
    let refreshed = updated.get("updated_at").unwrap();
    assert!(refreshed.as_timestamp().is_some());
    assert_ne!(refreshed, &before);
    assert!(updated.get("created_at").is_none());
}

#[tokio::test]
async fn test_commit_while_idle_executes_nothing() {
    let channel = RecordingChannel::new();
    let mut buffer = TransactionBuffer::with_config(BatchConfig::new().max_batch_size(5)).unwrap();

    let report = buffer.commit(&channel).await.unwrap();
    assert_eq!(report.statements, 0);
    assert!(channel.is_empty().unwrap());
    assert_eq!(buffer.config(), &BatchConfig::new().max_batch_size(5));
}

#[tokio::test]
async fn test_empty_update_group_does_not_block_other_groups() {
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    // Saved without changes: nothing to update for User.
    buffer.register(&stored_user(1)).unwrap();
    buffer
        .register(&EntityRecord::new("Post", "posts").existing(9).changed("title", "t"))
        .unwrap();
    buffer.register(&new_user("n")).unwrap();

    let channel = RecordingChannel::new();
    let report = buffer.commit(&channel).await.unwrap();

    assert_eq!(report.skipped_kinds, vec!["User".into()]);
    let tables: Vec<_> = channel
        .statements()
        .unwrap()
        .into_iter()
        .map(|s| (s.phase, s.table))
        .collect();
    assert_eq!(
        tables,
        vec![
            (Phase::Update, "posts".to_string()),
            (Phase::Insert, "users".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_updates_run_before_inserts_across_kinds() {
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer.register(&new_user("a")).unwrap();
    buffer
        .register(&EntityRecord::new("Post", "posts").attribute("title", "p"))
        .unwrap();
    buffer
        .register(&stored_user(3).changed("name", "renamed"))
        .unwrap();

    let channel = RecordingChannel::new();
    buffer.commit(&channel).await.unwrap();

    let order: Vec<_> = channel
        .statements()
        .unwrap()
        .into_iter()
        .map(|s| (s.phase, s.table))
        .collect();
    assert_eq!(
        order,
        vec![
            (Phase::Update, "users".to_string()),
            (Phase::Insert, "users".to_string()),
            (Phase::Insert, "posts".to_string()),
        ]
    );
}

/// Accepts a fixed number of statements, then fails every one after.
struct FailAfter {
    remaining: AtomicUsize,
}

impl FailAfter {
    fn new(successes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
        }
    }

    fn take(&self, rows: usize) -> modelbatch::Result<u64> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(BatchError::Store("connection reset".into()));
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Ok(rows as u64)
    }
}

#[async_trait]
impl ExecutionChannel for FailAfter {
    async fn execute_insert(&self, statement: &InsertStatement) -> modelbatch::Result<u64> {
        self.take(statement.row_count())
    }

    async fn execute_update(&self, statement: &UpdateStatement) -> modelbatch::Result<u64> {
        self.take(statement.row_count())
    }
}

#[tokio::test]
async fn test_execution_failure_names_table_and_chunk() {
    let mut buffer = TransactionBuffer::new();
    buffer.set_max_batch_size(2).unwrap();
    buffer.start();
    for i in 0..5 {
        buffer
            .register(&EntityRecord::new("Item", "items").attribute("n", i))
            .unwrap();
    }

    let err = buffer.commit(&FailAfter::new(1)).await.unwrap_err();
    match &err {
        BatchError::Execution {
            phase,
            table,
            chunk,
            source,
        } => {
            assert_eq!(*phase, Phase::Insert);
            assert_eq!(table, "items");
            assert_eq!(*chunk, 1);
            assert!(matches!(**source, BatchError::Store(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The buffer does not replay chunks that may already have applied.
    assert!(!buffer.is_collecting());
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_failure_stops_later_statements() {
    let channel = RecordingChannel::new();
    channel.fail_table("posts").unwrap();

    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer
        .register(&EntityRecord::new("Post", "posts").existing(1).changed("title", "t"))
        .unwrap();
    buffer.register(&new_user("never")).unwrap();

    let err = buffer.commit(&channel).await.unwrap_err();
    assert_eq!(err.failed_chunk(), Some(("posts", 0)));
    assert!(channel.is_empty().unwrap());
}

#[tokio::test]
async fn test_insert_into_missing_table_surfaces_store_error() {
    let store = MemoryStore::new();
    let mut buffer = TransactionBuffer::new();
    buffer.start();
    buffer.register(&new_user("a")).unwrap();

    let err = buffer.commit(&store).await.unwrap_err();
    assert!(err.to_string().contains("Table 'users' not found"));
}

#[tokio::test]
async fn test_mixed_round_trip_through_memory_store() {
    let store = MemoryStore::new();
    store.create_table("users").await.unwrap();
    for id in 1..=3i64 {
        store
            .seed("users", [("id", Value::Integer(id)), ("name", format!("user{id}").into())])
            .await
            .unwrap();
    }

    let mut buffer = TransactionBuffer::new();
    buffer.set_touch_timestamps(false);
    buffer.start();
    buffer
        .register(&stored_user(2).changed("name", "second"))
        .unwrap();
    buffer.register(&new_user("fourth").attribute("id", 4)).unwrap();
    buffer
        .register(&stored_user(3).changed("name", "third"))
        .unwrap();

    let report = buffer.commit(&store).await.unwrap();
    assert_eq!(report.updated_rows, 2);
    assert_eq!(report.inserted_rows, 1);
    assert_eq!(store.row_count("users").await.unwrap(), 4);

    let names: Vec<_> = store
        .rows("users")
        .await
        .unwrap()
        .into_iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str().map(str::to_string)))
        .collect();
    assert_eq!(names, vec!["user1", "second", "third", "fourth"]);
}
