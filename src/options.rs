/// User settings: extension toggle, list type, rule patterns and regex mode
///
/// Settings are always read through to storage. The background process can
/// be suspended at any time, so a cached copy would go stale.
use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::list_info::ListInfo;
use crate::storage::KeyValueBackend;

pub const ENABLED_KEY: &str = "enabled";
pub const USING_ALLOW_LIST_KEY: &str = "usingAllowList";
pub const RULE_PATTERNS_KEY: &str = "rulePatterns";
pub const USE_REGEX_KEY: &str = "useRegex";

// Pre-migration format: one text per list type
pub const LEGACY_ALLOW_LIST_KEY: &str = "whitelist";
pub const LEGACY_BLOCK_LIST_KEY: &str = "blacklist";
pub const LEGACY_LIST_TYPE_KEY: &str = "usingWhitelist";
const LEGACY_KEYS: [&str; 3] = [LEGACY_ALLOW_LIST_KEY, LEGACY_BLOCK_LIST_KEY, LEGACY_LIST_TYPE_KEY];

pub const DEFAULT_ENABLED: bool = true;
pub const DEFAULT_USING_ALLOW_LIST: bool = true;
pub const DEFAULT_USE_REGEX: bool = false;

/// Snapshot of every setting, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub using_allow_list: bool,
    /// Newline separated patterns, as edited on the options page
    pub rule_patterns: String,
    pub use_regex: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: DEFAULT_ENABLED,
            using_allow_list: DEFAULT_USING_ALLOW_LIST,
            rule_patterns: String::new(),
            use_regex: DEFAULT_USE_REGEX,
        }
    }
}

impl Settings {
    pub fn patterns(&self) -> Vec<String> {
        parse_rule_patterns(&self.rule_patterns)
    }

    pub fn list_info(&self) -> ListInfo {
        ListInfo::new(self.using_allow_list, self.patterns())
    }

    /// Whether switching from `self` to `other` can change any mute verdict
    pub fn affects_muting(&self, other: &Settings) -> bool {
        self.enabled != other.enabled
            || self.using_allow_list != other.using_allow_list
            || self.use_regex != other.use_regex
            || self.patterns() != other.patterns()
    }
}

/// Split pattern text into trimmed, non-empty patterns
pub fn parse_rule_patterns(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join patterns back into the stored text form, dropping blanks
pub fn format_rule_patterns(patterns: &[String]) -> String {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fold the legacy two-list format into the single combined list
///
/// The active legacy list (by `usingWhitelist`) becomes `rulePatterns`
/// unless one already exists. Legacy keys are always removed. Returns
/// whether anything changed.
pub fn migrate_legacy_settings(settings: &mut Map<String, Value>) -> bool {
    if !LEGACY_KEYS.iter().any(|key| settings.contains_key(*key)) {
        return false;
    }

    if !settings.contains_key(USING_ALLOW_LIST_KEY) {
        let legacy = settings
            .get(LEGACY_LIST_TYPE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(DEFAULT_USING_ALLOW_LIST);
        settings.insert(USING_ALLOW_LIST_KEY.to_string(), Value::Bool(legacy));
    }

    if !settings.contains_key(RULE_PATTERNS_KEY) {
        let using_allow_list = settings
            .get(USING_ALLOW_LIST_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(DEFAULT_USING_ALLOW_LIST);
        let source = if using_allow_list {
            LEGACY_ALLOW_LIST_KEY
        } else {
            LEGACY_BLOCK_LIST_KEY
        };
        let text = settings.get(source).and_then(Value::as_str).unwrap_or("");
        let patterns = format_rule_patterns(&parse_rule_patterns(text));
        settings.insert(RULE_PATTERNS_KEY.to_string(), Value::String(patterns));
    }

    for key in LEGACY_KEYS {
        settings.remove(key);
    }

    true
}

/// Settings collaborator consumed by the list and tab logic
#[async_trait(?Send)]
pub trait OptionsStore {
    async fn enabled(&self) -> Result<bool>;
    async fn using_allow_list(&self) -> Result<bool>;
    async fn set_using_allow_list(&self, using_allow_list: bool) -> Result<()>;
    async fn rule_patterns(&self) -> Result<Vec<String>>;
    async fn set_rule_patterns(&self, patterns: &[String]) -> Result<()>;
    async fn use_regex(&self) -> Result<bool>;

    /// Rewrite settings stored in an older format; true if anything changed
    async fn migrate_legacy_settings(&self) -> Result<bool>;

    async fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            enabled: self.enabled().await?,
            using_allow_list: self.using_allow_list().await?,
            rule_patterns: format_rule_patterns(&self.rule_patterns().await?),
            use_regex: self.use_regex().await?,
        })
    }
}

/// Settings kept one value per key in a key-value area
pub struct StoredOptions<B> {
    backend: B,
}

impl<B: KeyValueBackend> StoredOptions<B> {
    pub fn new(backend: B) -> Self {
        StoredOptions { backend }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.backend.get(key).await? {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
            _ => Ok(default),
        }
    }
}

#[async_trait(?Send)]
impl<B: KeyValueBackend> OptionsStore for StoredOptions<B> {
    async fn enabled(&self) -> Result<bool> {
        self.read(ENABLED_KEY, DEFAULT_ENABLED).await
    }

    async fn using_allow_list(&self) -> Result<bool> {
        self.read(USING_ALLOW_LIST_KEY, DEFAULT_USING_ALLOW_LIST).await
    }

    async fn set_using_allow_list(&self, using_allow_list: bool) -> Result<()> {
        self.backend
            .set(USING_ALLOW_LIST_KEY, Value::Bool(using_allow_list))
            .await
    }

    async fn rule_patterns(&self) -> Result<Vec<String>> {
        let text: String = self.read(RULE_PATTERNS_KEY, String::new()).await?;
        Ok(parse_rule_patterns(&text))
    }

    async fn set_rule_patterns(&self, patterns: &[String]) -> Result<()> {
        self.backend
            .set(RULE_PATTERNS_KEY, Value::String(format_rule_patterns(patterns)))
            .await
    }

    async fn use_regex(&self) -> Result<bool> {
        self.read(USE_REGEX_KEY, DEFAULT_USE_REGEX).await
    }

    async fn migrate_legacy_settings(&self) -> Result<bool> {
        let mut stored = Map::new();
        for key in LEGACY_KEYS.iter().chain(&[USING_ALLOW_LIST_KEY, RULE_PATTERNS_KEY]) {
            if let Some(value) = self.backend.get(key).await? {
                stored.insert(key.to_string(), value);
            }
        }

        let before = stored.clone();
        if !migrate_legacy_settings(&mut stored) {
            return Ok(false);
        }

        for (key, value) in &stored {
            if before.get(key) != Some(value) {
                self.backend.set(key, value.clone()).await?;
            }
        }
        for key in LEGACY_KEYS {
            self.backend.remove(key).await?;
        }

        info!("Migrated legacy list settings");
        Ok(true)
    }
}
