use async_trait::async_trait;
use hit_counter::prelude::*;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Stands in for redis: increments are serialized by the lock.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.values.lock().unwrap().get(key).copied()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str) -> anyhow::Result<i64> {
        let mut values = self.values.lock().unwrap();
        let value = values.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A store that refuses every call.
pub struct DownStore;

#[async_trait]
impl CounterStore for DownStore {
    async fn increment(&self, _key: &str) -> anyhow::Result<i64> {
        anyhow::bail!("Connection refused (os error 111)")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("Connection refused (os error 111)")
    }
}

pub fn host() -> String {
    hostname::get().unwrap().to_string_lossy().into_owned()
}
