/// In-memory collaborators for unit tests
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{MuteError, Result};
use crate::host::TabHost;
use crate::list_expert::ListExpert;
use crate::options::{
    ENABLED_KEY, RULE_PATTERNS_KEY, Settings, StoredOptions, USE_REGEX_KEY, USING_ALLOW_LIST_KEY,
};
use crate::storage::{KeyValueBackend, PersistedTabStates};
use crate::tab_data::{TabId, TabInfo};
use crate::tab_tracker::TabTracker;

/// In-process key-value area
///
/// With `set_yielding` every call suspends once before touching the map,
/// the way chrome.storage calls do, so concurrent handlers interleave.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RefCell<HashMap<String, Value>>,
    failing: Cell<bool>,
    yielding: Cell<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        MemoryBackend {
            values: RefCell::new(values.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            ..Default::default()
        }
    }

    /// Make every subsequent call fail, simulating a broken storage area
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.set(yielding);
    }

    /// Synchronous peek for assertions
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    async fn enter(&self) -> Result<()> {
        if self.yielding.get() {
            tokio::task::yield_now().await;
        }
        if self.failing.get() {
            Err(MuteError::Storage("storage area unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.enter().await?;
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.enter().await?;
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.enter().await?;
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

/// Browser stand-in that records every mute call
#[derive(Default)]
pub struct FakeTabHost {
    tabs: RefCell<Vec<TabInfo>>,
    active: Cell<Option<TabId>>,
    mute_calls: RefCell<Vec<(TabId, bool)>>,
    vanishing: RefCell<HashSet<TabId>>,
}

impl FakeTabHost {
    pub fn with_tabs(tabs: Vec<TabInfo>) -> Self {
        FakeTabHost {
            tabs: RefCell::new(tabs),
            ..Default::default()
        }
    }

    pub fn open(&self, tab: TabInfo) {
        self.close(tab.id);
        self.tabs.borrow_mut().push(tab);
    }

    pub fn close(&self, id: TabId) {
        self.tabs.borrow_mut().retain(|t| t.id != id);
    }

    pub fn activate(&self, id: TabId) {
        self.active.set(Some(id));
    }

    /// The tab closes right when the extension tries to mute it
    pub fn vanish_on_mute(&self, id: TabId) {
        self.vanishing.borrow_mut().insert(id);
    }

    /// Mute change made by the user through the browser UI
    pub fn user_set_muted(&self, id: TabId, muted: bool) {
        if let Some(tab) = self.tabs.borrow_mut().iter_mut().find(|t| t.id == id) {
            tab.muted = muted;
            tab.muted_by_this_extension = false;
        }
    }

    pub fn navigate(&self, id: TabId, url: &str) {
        if let Some(tab) = self.tabs.borrow_mut().iter_mut().find(|t| t.id == id) {
            tab.url = url.to_string();
        }
    }

    pub fn tab(&self, id: TabId) -> Option<TabInfo> {
        self.tabs.borrow().iter().find(|t| t.id == id).cloned()
    }

    pub fn is_muted(&self, id: TabId) -> bool {
        self.tab(id).is_some_and(|t| t.muted)
    }

    pub fn mute_calls(&self) -> Vec<(TabId, bool)> {
        self.mute_calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.mute_calls.borrow_mut().clear();
    }
}

#[async_trait(?Send)]
impl TabHost for FakeTabHost {
    async fn query_all_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(self.tabs.borrow().clone())
    }

    async fn query_active_tab(&self) -> Result<Option<TabInfo>> {
        Ok(self.active.get().and_then(|id| self.tab(id)))
    }

    async fn get_tab(&self, id: TabId) -> Result<Option<TabInfo>> {
        Ok(self.tab(id))
    }

    async fn set_tab_muted(&self, id: TabId, muted: bool) -> Result<()> {
        if self.vanishing.borrow().contains(&id) {
            self.close(id);
            return Err(MuteError::TabNotFound(id));
        }

        let mut tabs = self.tabs.borrow_mut();
        let tab = tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(MuteError::TabNotFound(id))?;
        tab.muted = muted;
        tab.muted_by_this_extension = true;
        self.mute_calls.borrow_mut().push((id, muted));
        Ok(())
    }
}

pub type TestOptions = StoredOptions<Rc<MemoryBackend>>;
pub type TestStates = PersistedTabStates<Rc<MemoryBackend>>;
pub type TestTracker = TabTracker<Rc<FakeTabHost>, TestOptions, TestStates>;

pub struct Harness {
    pub host: Rc<FakeTabHost>,
    pub settings: Rc<MemoryBackend>,
    pub session: Rc<MemoryBackend>,
    pub tracker: TestTracker,
}

impl Harness {
    pub fn new(settings: Settings, tabs: Vec<TabInfo>) -> Harness {
        let host = Rc::new(FakeTabHost::with_tabs(tabs));
        let settings = Rc::new(settings_backend(&settings));
        let session = Rc::new(MemoryBackend::new());
        let tracker = TabTracker::new(
            host.clone(),
            ListExpert::new(StoredOptions::new(settings.clone())),
            PersistedTabStates::new(session.clone()),
        );

        Harness {
            host,
            settings,
            session,
            tracker,
        }
    }

    /// Make both storage areas suspend on every call
    pub fn yielding(self) -> Harness {
        self.settings.set_yielding(true);
        self.session.set_yielding(true);
        self
    }

    /// Overwrite stored settings without notifying the tracker
    pub async fn store_settings(&self, settings: &Settings) {
        for (key, value) in settings_entries(settings) {
            self.settings.set(key, value).await.unwrap();
        }
    }
}

pub fn settings_backend(settings: &Settings) -> MemoryBackend {
    MemoryBackend::with_values(settings_entries(settings))
}

fn settings_entries(settings: &Settings) -> Vec<(&'static str, Value)> {
    vec![
        (ENABLED_KEY, Value::Bool(settings.enabled)),
        (USING_ALLOW_LIST_KEY, Value::Bool(settings.using_allow_list)),
        (RULE_PATTERNS_KEY, Value::String(settings.rule_patterns.clone())),
        (USE_REGEX_KEY, Value::Bool(settings.use_regex)),
    ]
}

pub fn block_list(patterns: &[&str]) -> Settings {
    Settings {
        using_allow_list: false,
        rule_patterns: patterns.join("\n"),
        ..Settings::default()
    }
}

pub fn allow_list(patterns: &[&str]) -> Settings {
    Settings {
        using_allow_list: true,
        rule_patterns: patterns.join("\n"),
        ..Settings::default()
    }
}

pub fn tab(id: TabId, url: &str) -> TabInfo {
    TabInfo::new(id, url.to_string(), false, false)
}
