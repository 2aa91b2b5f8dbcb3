//! Integration tests exercising the four algorithms end-to-end through
//! `Storage` and `Policy`, independent of any particular `Limiter`.

use halt_core::storage::{MemoryStore, Storage, StorageEntry};
use halt_core::{Algorithm, AlgorithmKind, FixedWindow, KeyStrategy, Policy, TokenBucket};
use std::time::Duration;

#[tokio::test]
async fn test_token_bucket_basic_rate_limiting() {
    let storage = MemoryStore::new();
    let algorithm = TokenBucket::new();
    let policy = Policy::new("burst5", 5, 1, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
        .with_burst(5)
        .unwrap();

    for i in 1..=5 {
        let decision = algorithm
            .check_and_record(&storage, "test:user", &policy, 1, 0)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "request {i} should be allowed (burst)");
    }

    let decision = algorithm
        .check_and_record(&storage, "test:user", &policy, 1, 0)
        .await
        .unwrap();
    assert!(decision.is_denied(), "6th request should be denied");
    assert!(decision.retry_after.is_some(), "should have retry_after");
}

#[tokio::test]
async fn test_separate_keys_independent() {
    let storage = MemoryStore::new();
    let algorithm = TokenBucket::new();
    let policy = Policy::new("burst2", 2, 1, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
        .with_burst(2)
        .unwrap();

    for _ in 0..2 {
        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();
    }
    let decision = algorithm
        .check_and_record(&storage, "user:1", &policy, 1, 0)
        .await
        .unwrap();
    assert!(decision.is_denied(), "user:1 should be rate limited");

    let decision = algorithm
        .check_and_record(&storage, "user:2", &policy, 1, 0)
        .await
        .unwrap();
    assert!(decision.is_allowed(), "user:2 should be allowed");
}

#[tokio::test]
async fn test_decision_headers() {
    let storage = MemoryStore::new();
    let algorithm = FixedWindow::new();
    let policy = Policy::new("headers", 100, 60, AlgorithmKind::FixedWindow, KeyStrategy::Ip);

    let decision = algorithm
        .check_and_record(&storage, "test:headers", &policy, 1, 0)
        .await
        .unwrap();

    let headers = decision.to_headers();
    let names: Vec<_> = headers.iter().map(|(k, _)| *k).collect();
    assert!(names.contains(&"RateLimit-Limit"), "missing RateLimit-Limit");
    assert!(names.contains(&"RateLimit-Remaining"), "missing RateLimit-Remaining");
    assert!(names.contains(&"RateLimit-Reset"), "missing RateLimit-Reset");
}

#[tokio::test]
async fn test_reset_clears_algorithm_state() {
    let storage = MemoryStore::new();
    let algorithm = FixedWindow::new();
    let policy = Policy::new("resettable", 1, 60, AlgorithmKind::FixedWindow, KeyStrategy::Ip);

    algorithm
        .check_and_record(&storage, "test:reset", &policy, 1, 0)
        .await
        .unwrap();
    let decision = algorithm
        .check_and_record(&storage, "test:reset", &policy, 1, 0)
        .await
        .unwrap();
    assert!(decision.is_denied());

    algorithm.reset(&storage, "test:reset").await.unwrap();

    let decision = algorithm
        .check_and_record(&storage, "test:reset", &policy, 1, 0)
        .await
        .unwrap();
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn test_storage_operations() {
    let storage = MemoryStore::new();

    let entry = StorageEntry::new(10, 1000);
    storage.set("test:key", entry.clone(), Duration::from_secs(60)).await.unwrap();

    let retrieved = storage.get("test:key").await.unwrap();
    assert_eq!(retrieved, Some(entry));

    storage.delete("test:key").await.unwrap();
    let retrieved = storage.get("test:key").await.unwrap();
    assert!(retrieved.is_none());
}

#[tokio::test]
async fn test_increment_operation() {
    let storage = MemoryStore::new();

    let count = storage.increment("test:counter", 1, 1000, Duration::from_secs(60)).await.unwrap();
    assert_eq!(count, 1);

    let count = storage.increment("test:counter", 5, 1000, Duration::from_secs(60)).await.unwrap();
    assert_eq!(count, 6);
}
