//! Ephemeral shared key/value store for cross-agent coordination state.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

/// Process-local, last-write-wins key/value store. Nothing is persisted.
#[derive(Debug, Default)]
pub struct SharedMemory {
    entries: RwLock<HashMap<String, Value>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.write().await.insert(key.into(), value)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Remove `key`, returning the removed value.
    pub async fn delete(&self, key: &str) -> Option<Value> {
        self.entries.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_write_wins() {
        let mem = SharedMemory::new();
        assert!(mem.set("k", json!(1)).await.is_none());
        assert_eq!(mem.set("k", json!(2)).await, Some(json!(1)));
        assert_eq!(mem.get("k").await, Some(json!(2)));
        assert_eq!(mem.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_none() {
        let mem = SharedMemory::new();
        mem.set("k", json!("v")).await;
        assert_eq!(mem.delete("k").await, Some(json!("v")));
        assert!(mem.get("k").await.is_none());
        assert!(mem.is_empty().await);
    }
}
