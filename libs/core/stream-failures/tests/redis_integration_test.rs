//! Integration tests against a real Redis
//!
//! These tests use testcontainers to run Redis 8. Docker must be available.
//!
//! Run with: cargo test -p stream-failures --test redis_integration_test

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use redis::AsyncCommands;
use std::sync::{Arc, Mutex};
use stream_failures::{
    FailedMessage, FailedMessagesRepository, FailureCause, FailureHandler, MessageReceiver,
    Range, ReceivedMessage, ReceiverRegistry, RedisFailedMessages, RedisStreamLog, RetryEngine,
    RetryFilter, StreamError, StreamLog,
};
use test_utils::{TestDataBuilder, TestRedis, assertions};

#[derive(Clone, Default)]
struct LocalListener {
    handled: Arc<Mutex<Vec<String>>>,
    fail_with: Option<&'static str>,
}

#[async_trait]
impl MessageReceiver for LocalListener {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), StreamError> {
        if let Some(error) = self.fail_with {
            return Err(StreamError::processing(error));
        }
        self.handled.lock().unwrap().push(message.id().to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "LocalListener"
    }
}

async fn manager(redis: &TestRedis) -> Arc<redis::aio::ConnectionManager> {
    install_color_eyre();
    init_tracing(&Environment::from_env());
    Arc::new(redis.connection_manager().await)
}

async fn xadd(redis: &TestRedis, stream: &str, id: &str, name: &str) {
    let mut conn = redis.connection();
    let _: String = redis::cmd("XADD")
        .arg(stream)
        .arg(id)
        .arg("name")
        .arg(name)
        .arg("data")
        .arg("{\"order\":1}")
        .query_async(&mut conn)
        .await
        .unwrap();
}

fn failure(id: &str, receiver: &str, error: &str) -> FailedMessage {
    FailedMessage::new(id, "foo.bar", receiver, error)
}

#[tokio::test]
async fn test_repository_add_find_and_all() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_add_find_and_all");
    let repo = RedisFailedMessages::new(manager(&redis).await, data.key("failed"));

    let first = repo.add(failure("2-0", "LocalListener", "boom")).await.unwrap();
    let second = repo.add(failure("1-0", "LocalListener", "bang")).await.unwrap();

    assert!(first.date.is_some());
    assert_eq!(repo.count().await.unwrap(), 2);
    assert!(repo.exists("2-0").await.unwrap());
    assert!(!repo.exists("3-0").await.unwrap());

    let found = assertions::assert_some(repo.find("1-0").await.unwrap(), "stored record");
    assert_eq!(found, second);

    let ids: Vec<String> = repo.all().await.unwrap().into_iter().map(|m| m.id).collect();
    assertions::assert_same_items(&ids, &["1-0", "2-0"], "snapshot ids");
}

#[tokio::test]
async fn test_repository_stores_json_document() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_stores_json_document");
    let key = data.key("failed");
    let repo = RedisFailedMessages::new(manager(&redis).await, key.clone())
        .with_clock(|| Utc.with_ymd_and_hms(2021, 12, 12, 12, 12, 12).unwrap());

    repo.add(failure("123", "LocalListener", "error")).await.unwrap();

    let mut conn = redis.connection();
    let raw: String = conn.hget(&key, "123").await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "id": "123",
            "stream": "foo.bar",
            "receiver": "LocalListener",
            "error": "error",
            "date": "2021-12-12T12:12:12Z",
        })
    );
}

#[tokio::test]
async fn test_repository_remove_is_compare_and_delete() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_remove_is_compare_and_delete");
    let repo = RedisFailedMessages::new(manager(&redis).await, data.key("failed"));

    let original = repo.add(failure("1-0", "LocalListener", "boom")).await.unwrap();
    let replacement = repo
        .add(failure("1-0", "LocalListener", "still broken"))
        .await
        .unwrap();

    assert!(!repo.remove(&original).await.unwrap());
    assert_eq!(repo.find("1-0").await.unwrap(), Some(replacement.clone()));

    assert!(repo.remove(&replacement).await.unwrap());
    assert!(!repo.remove(&replacement).await.unwrap());
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_repository_remove_undated_matches_any_date() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_remove_undated_matches_any_date");
    let repo = RedisFailedMessages::new(manager(&redis).await, data.key("failed"));

    repo.add(failure("1-0", "LocalListener", "boom")).await.unwrap();

    assert!(!repo.remove(&failure("1-0", "OtherListener", "boom")).await.unwrap());
    assert!(repo.remove(&failure("1-0", "LocalListener", "boom")).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repository_concurrent_adds_for_same_id() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_concurrent_adds_for_same_id");
    let repo = RedisFailedMessages::new(manager(&redis).await, data.key("failed"));
    let errors: Vec<String> = (0..20).map(|i| format!("error {}", i)).collect();

    let handles: Vec<_> = errors
        .iter()
        .cloned()
        .map(|error| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.add(failure("1-0", "LocalListener", &error)).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = repo.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(errors.contains(&all[0].error));
}

#[tokio::test]
async fn test_repository_flush() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_flush");
    let repo = RedisFailedMessages::new(manager(&redis).await, data.key("failed"));

    assert_eq!(repo.flush().await.unwrap(), 0);

    repo.add(failure("1-0", "LocalListener", "boom")).await.unwrap();
    repo.add(failure("2-0", "LocalListener", "boom")).await.unwrap();

    assert_eq!(repo.flush().await.unwrap(), 2);
    assert!(repo.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repository_rejects_corrupt_record() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_repository_rejects_corrupt_record");
    let key = data.key("failed");
    let repo = RedisFailedMessages::new(manager(&redis).await, key.clone());

    let mut conn = redis.connection();
    conn.hset::<_, _, _, ()>(&key, "1-0", "not json").await.unwrap();

    let err = repo.all().await.unwrap_err();
    assert!(matches!(err, StreamError::Serialization(_)));
}

#[tokio::test]
async fn test_stream_log_point_lookup() {
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("test_stream_log_point_lookup");
    let stream = data.stream("orders");
    let log = RedisStreamLog::new(manager(&redis).await).with_prefix("app:");

    let first = data.entry_id(1);
    let second = data.entry_id(2);
    xadd(&redis, &format!("app:{}", stream), &first, "order.placed").await;
    xadd(&redis, &format!("app:{}", stream), &second, "order.paid").await;

    let entries = log.read_range(&stream, &Range::point(&second), 1).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, second);

    let message = ReceivedMessage::from_fields(entries[0].0.clone(), entries[0].1.clone());
    assert_eq!(message.event_name(), Some("order.paid"));

    let all = log.read_range(&stream, &Range::full(), 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let missing = log.read_range(&stream, &Range::point("1-99"), 1).await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_store_then_retry_all_drains_store() {
    let redis = TestRedis::new().await;
    let conn = manager(&redis).await;
    let data = TestDataBuilder::from_test_name("test_store_then_retry_all_drains_store");
    let repo = Arc::new(RedisFailedMessages::new(conn.clone(), data.key("failed")));

    xadd(&redis, "foo.bar", "123-0", "foo.bar").await;
    xadd(&redis, "foo.bar", "345-0", "foo.bar").await;

    let listener = LocalListener::default();
    let handler = FailureHandler::new(repo.clone());
    for id in ["123-0", "345-0"] {
        let message = ReceivedMessage::from_fields(id, vec![("name".into(), "foo.bar".into())]);
        handler.store(&message, &listener, "error").await.unwrap();
    }
    assert_eq!(repo.count().await.unwrap(), 2);

    let registry = ReceiverRegistry::new().register_instance(Arc::new(listener.clone()));
    let engine = RetryEngine::with_handler(
        handler,
        Arc::new(registry),
        Arc::new(RedisStreamLog::new(conn)),
    );

    let summary = engine.retry_all().await.unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(summary.attempted(), 2);
    assert_eq!(repo.count().await.unwrap(), 0);
    assertions::assert_same_items(
        &listener.handled.lock().unwrap(),
        &["123-0", "345-0"],
        "handled ids",
    );
}

#[tokio::test]
async fn test_unknown_receiver_is_preserved() {
    let redis = TestRedis::new().await;
    let conn = manager(&redis).await;
    let data = TestDataBuilder::from_test_name("test_unknown_receiver_is_preserved");
    let repo = Arc::new(RedisFailedMessages::new(conn.clone(), data.key("failed")));

    xadd(&redis, "foo.bar", "123-0", "foo.bar").await;
    repo.add(failure("123-0", "not a class", "error")).await.unwrap();

    let engine = RetryEngine::new(
        repo.clone(),
        Arc::new(ReceiverRegistry::new()),
        Arc::new(RedisStreamLog::new(conn)),
    );

    let summary = engine.retry_all().await.unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(
        summary.failed[0].cause(),
        Some(FailureCause::UnknownReceiver(_))
    ));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failing_receiver_leaves_single_renewed_record() {
    let redis = TestRedis::new().await;
    let conn = manager(&redis).await;
    let data = TestDataBuilder::from_test_name("test_failing_receiver_leaves_single_renewed_record");
    let repo = Arc::new(RedisFailedMessages::new(conn.clone(), data.key("failed")));

    xadd(&redis, "foo.bar", "123-0", "foo.bar").await;
    let original = repo
        .add(failure("123-0", "LocalListener", "first error"))
        .await
        .unwrap();

    let listener = LocalListener {
        fail_with: Some("second error"),
        ..Default::default()
    };
    let engine = RetryEngine::new(
        repo.clone(),
        Arc::new(ReceiverRegistry::new().register_instance(Arc::new(listener))),
        Arc::new(RedisStreamLog::new(conn)),
    );

    let err = engine.retry(&original).await.unwrap_err();
    assert!(matches!(err.cause(), Some(FailureCause::HandlerFailed(_))));

    let stored = repo.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].error, "second error");
}

#[tokio::test]
async fn test_retry_matching_by_receiver() {
    let redis = TestRedis::new().await;
    let conn = manager(&redis).await;
    let data = TestDataBuilder::from_test_name("test_retry_matching_by_receiver");
    let repo = Arc::new(RedisFailedMessages::new(conn.clone(), data.key("failed")));

    xadd(&redis, "foo.bar", "123-0", "foo.bar").await;
    xadd(&redis, "foo.bar", "345-0", "foo.bar").await;
    repo.add(failure("123-0", "LocalListener", "error")).await.unwrap();
    repo.add(failure("345-0", "OtherListener", "error")).await.unwrap();

    let listener = LocalListener::default();
    let engine = RetryEngine::new(
        repo.clone(),
        Arc::new(ReceiverRegistry::new().register_instance(Arc::new(listener.clone()))),
        Arc::new(RedisStreamLog::new(conn)),
    );

    let summary = engine
        .retry_matching(&RetryFilter::new().with_receiver("LocalListener"))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, vec!["123-0".to_string()]);
    assert!(!repo.exists("123-0").await.unwrap());
    assert!(repo.exists("345-0").await.unwrap());
}
