//! 存储契约测试
//!
//! 通过 `dyn Store` 验证内存实现满足存储层的可观察行为。

use std::sync::Arc;
use std::time::Duration;

use kv_store::{MemoryStore, MissingKeyPolicy, Store, StoreError};

fn store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

// ==================== 读写 ====================

#[tokio::test]
async fn test_insert_then_read_round_trip() {
    let store = store();
    store.insert_entry("svc:a", b"payload").await.unwrap();

    let value = store.read_entry("svc:a").await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"payload"[..]));
}

#[tokio::test]
async fn test_absent_key_is_not_an_error() {
    let store = store();
    assert_eq!(store.read_entry("nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_insert_overwrites() {
    let store = store();
    store.insert_entry("k", b"v1").await.unwrap();
    store.insert_entry("k", b"v2").await.unwrap();

    assert_eq!(store.read_entry("k").await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test]
async fn test_delete_reports_count() {
    let store = store();
    store.insert_entry("k", b"v").await.unwrap();

    assert_eq!(store.delete_entry("k").await.unwrap(), 1);
    assert_eq!(store.delete_entry("k").await.unwrap(), 0);
    assert_eq!(store.read_entry("k").await.unwrap(), None);
}

// ==================== TTL ====================

#[tokio::test(start_paused = true)]
async fn test_expire_evicts_after_ttl() {
    let store = store();
    store.insert_entry("lease", b"v").await.unwrap();
    store.expire("lease", Duration::from_secs(3)).await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.read_entry("lease").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.read_entry("lease").await.unwrap().is_none());
    assert!(store.read_keys("lease").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expire_refreshes_ttl() {
    let store = store();
    store.insert_entry("lease", b"v").await.unwrap();
    store.expire("lease", Duration::from_secs(2)).await.unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    store.expire("lease", Duration::from_secs(2)).await.unwrap();

    tokio::time::advance(Duration::from_millis(1_500)).await;
    assert!(store.read_entry("lease").await.unwrap().is_some());
}

#[tokio::test]
async fn test_expire_absent_key_is_noop() {
    let store = store();
    store.expire("missing", Duration::from_secs(10)).await.unwrap();
    assert_eq!(store.read_entry("missing").await.unwrap(), None);
}

// ==================== 扫描 ====================

#[tokio::test]
async fn test_read_keys_is_independent_of_page_size() {
    for page_size in [1, 2, 3, 100] {
        let store = MemoryStore::new().with_page_size(page_size);
        for i in 0..7 {
            store
                .insert_entry(&format!("rules:web:{}", i), b"{}")
                .await
                .unwrap();
        }
        store.insert_entry("registry:web:x", b"{}").await.unwrap();

        let mut keys = store.read_keys("rules:*").await.unwrap();
        keys.sort();
        assert_eq!(keys.len(), 7, "page_size = {}", page_size);
        assert_eq!(keys[0], "rules:web:0");
    }
}

#[tokio::test]
async fn test_read_keys_glob_dialect() {
    let store = store();
    for key in ["a:1", "a:22", "b:1", "a:x"] {
        store.insert_entry(key, b"").await.unwrap();
    }

    let mut single = store.read_keys("a:?").await.unwrap();
    single.sort();
    assert_eq!(single, vec!["a:1", "a:x"]);

    let mut class = store.read_keys("[ab]:1").await.unwrap();
    class.sort();
    assert_eq!(class, vec!["a:1", "b:1"]);
}

#[tokio::test]
async fn test_read_all_entries() {
    let store = store();
    store.insert_entry("rules:a", b"1").await.unwrap();
    store.insert_entry("rules:b", b"2").await.unwrap();
    store.insert_entry("other", b"3").await.unwrap();

    let entries = store.read_all_entries("rules:*").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["rules:a"], b"1");
    assert_eq!(entries["rules:b"], b"2");
}

#[tokio::test]
async fn test_read_all_entries_empty_match() {
    let store = store();
    assert!(store.read_all_entries("nothing:*").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_policy_report() {
    // 过期键在扫描阶段已被排除，因此正常路径下不会触发 MissingKeys
    let store = MemoryStore::new().with_missing_keys(MissingKeyPolicy::Report);
    store.insert_entry("k:1", b"1").await.unwrap();
    store.insert_entry("k:2", b"2").await.unwrap();
    store.expire("k:2", Duration::from_secs(1)).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let entries = store.read_all_entries("k:*").await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_invalid_pattern_rejected() {
    let store = store();
    let err = store.read_keys("bad[").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidPattern { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_writers() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert_entry(&format!("c:{}", i), i.to_string().as_bytes())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.read_keys("c:*").await.unwrap().len(), 16);
}
