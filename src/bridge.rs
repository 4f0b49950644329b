/// Chrome glue: collaborator implementations over `background_bridge.js`
/// and the entry points the service worker calls
use std::cell::OnceCell;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::background::Background;
use crate::error::{MuteError, Result};
use crate::host::TabHost;
use crate::list_expert::ListExpert;
use crate::messages::{Request, TabEvent};
use crate::options::StoredOptions;
use crate::storage::{KeyValueBackend, PersistedTabStates};
use crate::tab_data::{TabId, TabInfo};
use crate::tab_tracker::TabTracker;

// Import JS bridge functions
#[wasm_bindgen(module = "/background_bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn queryAllTabs() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryActiveTab() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTab(id: i32) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setTabMuted(id: i32, muted: bool) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageGet(area: &str, key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(area: &str, key: &str, value: JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(area: &str, key: &str) -> std::result::Result<JsValue, JsValue>;
}

/// Settings written by the options page, synced across devices
const SETTINGS_AREA: &str = "sync";
/// Cleared when the browser restarts, survives service worker suspension
const SESSION_AREA: &str = "session";

fn js_error(err: JsValue) -> String {
    err.dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .unwrap_or_else(|| format!("{:?}", err))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> std::result::Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse: {:?}", e))
}

fn to_js<T: Serialize>(value: &T) -> std::result::Result<JsValue, String> {
    // Plain objects rather than JS Maps, so chrome.storage can persist them
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

fn is_missing(value: &JsValue) -> bool {
    value.is_null() || value.is_undefined()
}

/// chrome.tabs
pub struct ChromeTabHost;

#[async_trait(?Send)]
impl TabHost for ChromeTabHost {
    async fn query_all_tabs(&self) -> Result<Vec<TabInfo>> {
        let tabs = queryAllTabs().await.map_err(|e| MuteError::Host(js_error(e)))?;
        from_js(tabs).map_err(MuteError::Host)
    }

    async fn query_active_tab(&self) -> Result<Option<TabInfo>> {
        let tab = queryActiveTab().await.map_err(|e| MuteError::Host(js_error(e)))?;
        if is_missing(&tab) {
            return Ok(None);
        }
        from_js(tab).map(Some).map_err(MuteError::Host)
    }

    async fn get_tab(&self, id: TabId) -> Result<Option<TabInfo>> {
        let tab = getTab(id).await.map_err(|e| MuteError::Host(js_error(e)))?;
        if is_missing(&tab) {
            return Ok(None);
        }
        from_js(tab).map(Some).map_err(MuteError::Host)
    }

    async fn set_tab_muted(&self, id: TabId, muted: bool) -> Result<()> {
        setTabMuted(id, muted).await.map(|_| ()).map_err(|e| {
            let message = js_error(e);
            if message.contains("No tab with id") {
                MuteError::TabNotFound(id)
            } else {
                MuteError::Host(message)
            }
        })
    }
}

/// One chrome.storage area
#[derive(Debug, Clone, Copy)]
pub struct ChromeStorage {
    area: &'static str,
}

impl ChromeStorage {
    pub fn settings() -> Self {
        ChromeStorage { area: SETTINGS_AREA }
    }

    pub fn session() -> Self {
        ChromeStorage { area: SESSION_AREA }
    }
}

#[async_trait(?Send)]
impl KeyValueBackend for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let value = storageGet(self.area, key)
            .await
            .map_err(|e| MuteError::Storage(js_error(e)))?;
        if is_missing(&value) {
            return Ok(None);
        }
        from_js(value).map(Some).map_err(MuteError::Storage)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let value = to_js(&value).map_err(MuteError::Storage)?;
        storageSet(self.area, key, value)
            .await
            .map(|_| ())
            .map_err(|e| MuteError::Storage(js_error(e)))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        storageRemove(self.area, key)
            .await
            .map(|_| ())
            .map_err(|e| MuteError::Storage(js_error(e)))
    }
}

type ChromeBackground = Background<
    ChromeTabHost,
    StoredOptions<ChromeStorage>,
    PersistedTabStates<ChromeStorage>,
    ChromeStorage,
>;

thread_local! {
    static BACKGROUND: OnceCell<Rc<ChromeBackground>> = const { OnceCell::new() };
}

fn background() -> Rc<ChromeBackground> {
    BACKGROUND.with(|cell| {
        cell.get_or_init(|| {
            let tracker = TabTracker::new(
                ChromeTabHost,
                ListExpert::new(StoredOptions::new(ChromeStorage::settings())),
                PersistedTabStates::new(ChromeStorage::session()),
            );
            Rc::new(Background::new(tracker, ChromeStorage::session()))
        })
        .clone()
    })
}

/// Kick off initialization as soon as the service worker loads
#[wasm_bindgen]
pub async fn start_background() {
    // Failures are logged by the readiness gate and replayed to every handler
    let _ = background().ready().await;
}

#[wasm_bindgen]
pub async fn handle_tab_event(event: JsValue) -> std::result::Result<(), JsValue> {
    let event: TabEvent = from_js(event).map_err(|e| JsValue::from_str(&e))?;
    background().handle_event(event).await;
    Ok(())
}

#[wasm_bindgen]
pub async fn handle_command(name: String) {
    background().handle_command(&name).await;
}

#[wasm_bindgen]
pub async fn handle_request(request: JsValue) -> std::result::Result<JsValue, JsValue> {
    let request: Request = from_js(request).map_err(|e| JsValue::from_str(&e))?;
    match background().handle_request(request).await {
        Some(response) => to_js(&response).map_err(|e| JsValue::from_str(&e)),
        None => Ok(JsValue::UNDEFINED),
    }
}
