/// Storage for per-tab mute records
///
/// The browser may stop the background process between events, so tab
/// records live in a durable key-value area instead of process memory.
/// Every write is a whole-value read-modify-write of one key, serialized
/// across all tabs.
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::tab_data::{TabId, TabMuteRecord};

/// Key holding the serialized `TabStateMap`
pub const TAB_STATES_KEY: &str = "tabStates";

/// Durable key-value area (chrome.storage.* or an in-memory fake)
#[async_trait(?Send)]
pub trait KeyValueBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait(?Send)]
impl<T: KeyValueBackend + ?Sized> KeyValueBackend for Rc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}

/// All tracked tabs, serialized as a JSON object keyed by tab id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabStateMap {
    tabs: HashMap<TabId, TabMuteRecord>,
}

impl TabStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TabId, record: TabMuteRecord) {
        self.tabs.insert(id, record);
    }

    pub fn remove(&mut self, id: TabId) -> bool {
        self.tabs.remove(&id).is_some()
    }

    pub fn get(&self, id: TabId) -> Option<&TabMuteRecord> {
        self.tabs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

/// `{get, set, delete}` contract for tab mute records
#[async_trait(?Send)]
pub trait TabStateStore {
    async fn get(&self, id: TabId) -> Result<Option<TabMuteRecord>>;
    async fn set(&self, id: TabId, record: &TabMuteRecord) -> Result<()>;
    async fn delete(&self, id: TabId) -> Result<()>;
}

/// Tab records persisted under `TAB_STATES_KEY` in a key-value backend
///
/// All records share one stored value, so writers for different tabs take
/// `writer` for the whole load-change-save cycle.
pub struct PersistedTabStates<B> {
    backend: B,
    writer: Mutex<()>,
}

impl<B: KeyValueBackend> PersistedTabStates<B> {
    pub fn new(backend: B) -> Self {
        PersistedTabStates {
            backend,
            writer: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<TabStateMap> {
        match self.backend.get(TAB_STATES_KEY).await? {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
            _ => Ok(TabStateMap::new()),
        }
    }

    async fn save(&self, map: &TabStateMap) -> Result<()> {
        self.backend.set(TAB_STATES_KEY, serde_json::to_value(map)?).await
    }
}

#[async_trait(?Send)]
impl<B: KeyValueBackend> TabStateStore for PersistedTabStates<B> {
    async fn get(&self, id: TabId) -> Result<Option<TabMuteRecord>> {
        Ok(self.load().await?.get(id).cloned())
    }

    async fn set(&self, id: TabId, record: &TabMuteRecord) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut map = self.load().await?;
        map.insert(id, record.clone());
        self.save(&map).await
    }

    async fn delete(&self, id: TabId) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut map = self.load().await?;
        if map.remove(id) {
            self.save(&map).await?;
        }
        Ok(())
    }
}
