//! The active rule list and whether it allows or blocks audio

/// Immutable snapshot of the rule list
///
/// Built fresh on every read. Updates produce a new value that is
/// persisted wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListInfo {
    is_allow_list: bool,
    patterns: Vec<String>,
}

impl ListInfo {
    pub fn new(is_allow_list: bool, patterns: Vec<String>) -> ListInfo {
        ListInfo {
            is_allow_list,
            patterns,
        }
    }

    /// Listed pages keep their audio, everything else is muted
    pub fn is_allow_list(&self) -> bool {
        self.is_allow_list
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn with_patterns(&self, patterns: Vec<String>) -> ListInfo {
        ListInfo::new(self.is_allow_list, patterns)
    }

    pub fn with_list_type(&self, is_allow_list: bool) -> ListInfo {
        ListInfo::new(is_allow_list, self.patterns.clone())
    }

    /// Mute verdict for a URL given whether it matched the list
    ///
    /// Allow list: mute unless listed. Block list: mute only if listed.
    pub fn should_mute_when(&self, in_list: bool) -> bool {
        self.is_allow_list != in_list
    }
}
