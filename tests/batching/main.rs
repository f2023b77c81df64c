//! Integration tests for write buffering against the in-memory store.

mod fixtures;

use std::time::{Duration, Instant};

use dynabatch::{
    record, BufferState, FlushError, KeyProjection, RetryPolicy, StoreError, WriteBuffer,
    WriteBufferConfig, WriteRequest,
};
use thiserror::Error;

use fixtures::{
    init_tracing, store, user, user_key, ScriptedWriter, StuckWriter, Unreachable, ORGS, USERS,
};

#[derive(Debug, Error)]
enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Flush(#[from] FlushError<StoreError>),
}

// =============================================================================
// Threshold flushing
// =============================================================================

#[test]
fn twenty_fifth_put_triggers_flush() {
    init_tracing();
    let store = store();
    let mut buffer = WriteBuffer::new(store.clone());

    for id in 0..24 {
        buffer.put(USERS, user(0, id, "u")).unwrap();
    }
    assert_eq!(store.batch_calls(), 0);
    assert_eq!(buffer.pending_len(), 24);

    buffer.put(USERS, user(0, 24, "u")).unwrap();
    assert_eq!(store.batch_calls(), 1);
    assert_eq!(store.batches()[0].len(), 25);
    assert!(buffer.is_empty());
    assert_eq!(store.item_count(USERS), 25);
}

#[test]
fn threshold_counts_across_tables() {
    let store = store();
    let config = WriteBufferConfig::new().with_flush_threshold(3);
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();

    buffer.put(USERS, user(0, 1, "a")).unwrap();
    buffer.put(ORGS, record! { "id" => 0 }).unwrap();
    assert_eq!(store.batch_calls(), 0);

    buffer.delete(USERS, user_key(0, 9)).unwrap();
    assert_eq!(store.batch_calls(), 1);
    let sent = &store.batches()[0];
    assert_eq!(sent.table_names().collect::<Vec<_>>(), vec![ORGS, USERS]);
}

#[test]
fn automatic_flush_resubmits_until_applied() {
    let store = store();
    store.set_apply_limit(Some(2)).unwrap();
    let config = WriteBufferConfig::new().with_flush_threshold(4);
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();

    for id in 0..4 {
        buffer.put(USERS, user(0, id, "u")).unwrap();
    }

    let sizes: Vec<usize> = store.batches().iter().map(BufferState::len).collect();
    assert_eq!(sizes, vec![4, 2]);
    assert!(buffer.is_empty());
    assert_eq!(store.item_count(USERS), 4);
}

#[test]
fn no_batch_exceeds_threshold_after_throttled_round() {
    let store = store();
    store.set_apply_limit(Some(0)).unwrap();
    let config = WriteBufferConfig::new().with_retry(RetryPolicy::max_rounds(1));
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();

    for id in 0..24 {
        buffer.put(USERS, user(0, id, "u")).unwrap();
    }
    let err = buffer.put(USERS, user(0, 24, "u")).unwrap_err();
    assert!(matches!(
        err,
        FlushError::RetriesExhausted {
            rounds: 1,
            remaining: 25
        }
    ));

    store.set_apply_limit(None).unwrap();
    let err = buffer.put(USERS, user(0, 25, "u")).unwrap_err();
    assert!(matches!(
        err,
        FlushError::RetriesExhausted {
            rounds: 1,
            remaining: 1
        }
    ));
    buffer.drain().unwrap();

    let sizes: Vec<usize> = store.batches().iter().map(BufferState::len).collect();
    assert!(sizes.iter().all(|size| *size <= 25), "batch sizes: {:?}", sizes);
    assert_eq!(sizes, vec![25, 25, 1]);
    assert_eq!(store.item_count(USERS), 26);
}

// =============================================================================
// Deduplication
// =============================================================================

#[test]
fn put_put_delete_collapses_to_delete() {
    let config = WriteBufferConfig::new().with_primary_key(["id"]);
    let mut buffer = WriteBuffer::with_config(store(), config).unwrap();

    buffer.put(ORGS, record! { "id" => 1, "a" => 1 }).unwrap();
    buffer.put(ORGS, record! { "id" => 1, "a" => 2 }).unwrap();
    buffer.delete(ORGS, record! { "id" => 1 }).unwrap();

    assert_eq!(
        buffer.pending(ORGS),
        [WriteRequest::delete(record! { "id" => 1 })]
    );
}

#[test]
fn composite_key_dedup_keeps_distinct_items() {
    let store = store();
    let config = WriteBufferConfig::new().with_primary_key(["organization_id", "id"]);
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();

    buffer.put(USERS, user(0, 1, "first")).unwrap();
    buffer.put(USERS, user(1, 1, "other org")).unwrap();
    buffer.put(USERS, user(0, 1, "second")).unwrap();

    assert_eq!(
        buffer.pending(USERS),
        [
            WriteRequest::put(user(1, 1, "other org")),
            WriteRequest::put(user(0, 1, "second")),
        ]
    );

    buffer.drain().unwrap();
    assert_eq!(
        store.get_item(USERS, &user_key(0, 1)).unwrap(),
        Some(user(0, 1, "second"))
    );
}

#[test]
fn delete_then_put_resurrects_item() {
    let store = store();
    store.insert_item(ORGS, record! { "id" => 5, "name" => "old" }).unwrap();
    let config = WriteBufferConfig::new().with_primary_key(["id"]);
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();

    buffer.delete(ORGS, record! { "id" => 5 }).unwrap();
    buffer.put(ORGS, record! { "id" => 5, "name" => "new" }).unwrap();
    assert_eq!(buffer.pending_len(), 1);

    buffer.drain().unwrap();
    assert_eq!(
        store.get_item(ORGS, &record! { "id" => 5 }).unwrap(),
        Some(record! { "id" => 5, "name" => "new" })
    );
}

// =============================================================================
// Unprocessed items
// =============================================================================

#[test]
fn only_the_unprocessed_request_is_resent() {
    let third = WriteRequest::put(user(0, 3, "c"));
    let writer = ScriptedWriter::new([Ok(BufferState::new().with(USERS, third.clone()))]);
    let mut buffer = WriteBuffer::new(writer);

    for id in 1..=5 {
        buffer.put(USERS, user(0, id, "x")).unwrap();
    }
    buffer.flush().unwrap();
    assert_eq!(buffer.pending(USERS), [third.clone()]);

    buffer.flush().unwrap();
    let received = &buffer.writer().received;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].len(), 5);
    assert_eq!(received[1], BufferState::new().with(USERS, third));
    assert!(buffer.is_empty());
}

#[test]
fn drain_resubmits_until_store_catches_up() {
    let store = store();
    store.set_apply_limit(Some(2)).unwrap();
    let mut buffer = WriteBuffer::new(store.clone());

    for id in 0..7 {
        buffer.put(USERS, user(0, id, "u")).unwrap();
    }
    buffer.drain().unwrap();

    let sizes: Vec<usize> = store.batches().iter().map(BufferState::len).collect();
    assert_eq!(sizes, vec![7, 5, 3, 1]);
    assert_eq!(store.item_count(USERS), 7);
}

#[test]
fn bounded_retry_gives_up() {
    let config = WriteBufferConfig::new().with_retry(RetryPolicy::max_rounds(3));
    let mut buffer = WriteBuffer::with_config(StuckWriter::default(), config).unwrap();
    buffer.put(USERS, user(0, 1, "a")).unwrap();
    buffer.put(USERS, user(0, 2, "b")).unwrap();

    let err = buffer.drain().unwrap_err();

    assert!(matches!(
        err,
        FlushError::RetriesExhausted {
            rounds: 3,
            remaining: 2
        }
    ));
    assert_eq!(buffer.writer().calls, 3);
    assert_eq!(buffer.pending_len(), 2);
}

#[test]
fn backoff_paces_retry_rounds() {
    let policy = RetryPolicy::max_rounds(3).with_backoff(Duration::from_millis(5));
    let config = WriteBufferConfig::new().with_retry(policy);
    let mut buffer = WriteBuffer::with_config(StuckWriter::default(), config).unwrap();
    buffer.put(USERS, user(0, 1, "a")).unwrap();

    let started = Instant::now();
    assert!(buffer.drain().is_err());
    assert!(started.elapsed() >= Duration::from_millis(10));
}

// =============================================================================
// Scopes
// =============================================================================

#[test]
fn scope_drains_on_success() {
    let store = store();
    store.set_apply_limit(Some(1)).unwrap();
    let mut buffer = WriteBuffer::new(store.clone());

    let created = buffer
        .scoped(|batch| {
            batch.put(USERS, user(0, 1, "a"))?;
            batch.put(USERS, user(0, 2, "b"))?;
            batch.put(ORGS, record! { "id" => 0 })?;
            Ok::<_, AppError>(3)
        })
        .unwrap();

    assert_eq!(created, 3);
    assert!(buffer.is_empty());
    assert_eq!(store.item_count(USERS), 2);
    assert_eq!(store.item_count(ORGS), 1);
}

#[test]
fn failed_scope_keeps_pending_and_returns_error() {
    let store = store();
    let mut buffer = WriteBuffer::new(store.clone());

    let result: Result<(), AppError> = buffer.scoped(|batch| {
        batch.put(USERS, user(0, 1, "a"))?;
        Err(AppError::Validation("name taken".into()))
    });

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "validation failed: name taken");
    assert_eq!(buffer.pending_len(), 1);
    assert_eq!(store.batch_calls(), 0);
}

#[test]
fn transport_failure_in_scope_propagates() {
    let store = store();
    let mut buffer = WriteBuffer::new(store.clone());
    store.fail_next_call("connection reset");

    let result: Result<(), AppError> = buffer.scoped(|batch| {
        batch.put(USERS, user(0, 1, "a"))?;
        Ok(())
    });

    match result {
        Err(AppError::Flush(FlushError::Transport(StoreError::Injected(message)))) => {
            assert_eq!(message, "connection reset");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(buffer.pending_len(), 1);

    buffer.drain().unwrap();
    assert_eq!(store.item_count(USERS), 1);
}

#[test]
fn explicit_scope_with_end() {
    let store = store();
    let mut buffer = WriteBuffer::new(store.clone());

    let mut scope = buffer.begin();
    scope.put(USERS, user(0, 1, "a")).unwrap();
    scope.delete(USERS, user_key(0, 2)).unwrap();
    scope.end(true).unwrap();

    assert!(buffer.is_empty());
    assert_eq!(store.batch_calls(), 1);
}

#[test]
fn scope_over_borrowed_writer() {
    let mut writer = ScriptedWriter::new([Err(Unreachable)]);
    {
        let mut buffer = WriteBuffer::new(&mut writer);
        let err = buffer
            .scoped(|batch| batch.put(USERS, user(0, 1, "a")))
            .unwrap_err();
        assert!(err.transport().is_some());
        buffer.drain().unwrap();
    }
    assert_eq!(writer.received.len(), 2);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn buffer_from_json_config() {
    let config = WriteBufferConfig::from_json(
        r#"{ "flush_threshold": 2, "primary_key": ["organization_id", "id"] }"#,
    )
    .unwrap();
    assert_eq!(config.primary_key, KeyProjection::new(["organization_id", "id"]));

    let store = store();
    let mut buffer = WriteBuffer::with_config(store.clone(), config).unwrap();
    buffer.put(USERS, user(0, 1, "a")).unwrap();
    buffer.put(USERS, user(0, 1, "b")).unwrap();
    assert_eq!(store.batch_calls(), 0);

    buffer.put(USERS, user(0, 2, "c")).unwrap();
    assert_eq!(store.batch_calls(), 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = WriteBufferConfig::new().with_flush_threshold(0);
    assert!(WriteBuffer::with_config(store(), config).is_err());
}
