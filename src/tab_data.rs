/// Data structures for Tab Muter
use serde::{Deserialize, Serialize};

/// Browser tab identifier
pub type TabId = i32;

/// A browser tab as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub muted: bool,
    /// Whether the host attributes the current mute state (muted or not) to
    /// this extension
    #[serde(default)]
    pub muted_by_this_extension: bool,
}

impl TabInfo {
    pub fn new(id: TabId, url: String, muted: bool, muted_by_this_extension: bool) -> TabInfo {
        TabInfo {
            id,
            url,
            muted,
            muted_by_this_extension,
        }
    }
}

/// The cached mute state of a tracked tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabMuteRecord {
    pub url: String,
    pub muted: bool,
    pub extension_owns_current_mute_state: bool,
}

impl TabMuteRecord {
    pub fn from_tab(tab: &TabInfo) -> TabMuteRecord {
        TabMuteRecord {
            url: tab.url.clone(),
            muted: tab.muted,
            extension_owns_current_mute_state: tab.muted_by_this_extension,
        }
    }
}
