/// Messages flowing into the background dispatcher
///
/// Browser events, keyboard/menu commands and popup requests all arrive as
/// JSON from the JS glue and are decoded into these types.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MuteError;
use crate::options::Settings;
use crate::tab_data::{TabId, TabInfo};

/// Tab lifecycle and settings events from the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TabEvent {
    Created {
        tab: TabInfo,
    },
    #[serde(rename_all = "camelCase")]
    Replaced {
        added_tab_id: TabId,
        removed_tab_id: TabId,
    },
    #[serde(rename_all = "camelCase")]
    UrlChanged {
        tab_id: TabId,
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    Removed {
        tab_id: TabId,
    },
    #[serde(rename_all = "camelCase")]
    Activated {
        tab_id: TabId,
    },
    #[serde(rename_all = "camelCase")]
    MuteChanged {
        tab_id: TabId,
        muted: bool,
        #[serde(default)]
        muted_by_this_extension: bool,
    },
    SettingsChanged {
        before: Settings,
        after: Settings,
    },
}

/// Named commands bound to keyboard shortcuts and popup buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ApplyMute,
    MuteAll,
    MuteTab,
    MuteOther,
    ListPage,
    ListDomain,
    SwitchListType,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::ApplyMute,
        Command::MuteAll,
        Command::MuteTab,
        Command::MuteOther,
        Command::ListPage,
        Command::ListDomain,
        Command::SwitchListType,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::ApplyMute => "apply-mute",
            Command::MuteAll => "mute-all",
            Command::MuteTab => "mute-tab",
            Command::MuteOther => "mute-other",
            Command::ListPage => "list-page",
            Command::ListDomain => "list-domain",
            Command::SwitchListType => "switch-list-type",
        }
    }
}

impl FromStr for Command {
    type Err = MuteError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.name() == name)
            .ok_or_else(|| MuteError::UnknownCommand(name.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime messages sent by the popup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    QueryCurrentMuted,
    QueryUsingAllowList,
    QueryPageListed,
    QueryDomainListed,
    Command { command: String },
}

impl Request {
    pub fn command(command: Command) -> Request {
        Request::Command {
            command: command.name().to_string(),
        }
    }
}

/// Answers to popup queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Muted {
        muted: bool,
    },
    UsingAllowList {
        #[serde(rename = "usingAllowList")]
        using_allow_list: bool,
    },
    Listed {
        listed: bool,
    },
}
