/// Browser tab collaborator
use std::rc::Rc;

use async_trait::async_trait;

use crate::error::Result;
use crate::tab_data::{TabId, TabInfo};

/// Queries and mutations the core needs from the browser
///
/// Event feeds (created, replaced, url changed, removed, activated, mute
/// changed) are delivered separately as `messages::TabEvent`.
#[async_trait(?Send)]
pub trait TabHost {
    async fn query_all_tabs(&self) -> Result<Vec<TabInfo>>;

    /// The active tab of the focused window, if any
    async fn query_active_tab(&self) -> Result<Option<TabInfo>>;

    /// `None` when the tab has been closed
    async fn get_tab(&self, id: TabId) -> Result<Option<TabInfo>>;

    async fn set_tab_muted(&self, id: TabId, muted: bool) -> Result<()>;
}

#[async_trait(?Send)]
impl<T: TabHost + ?Sized> TabHost for Rc<T> {
    async fn query_all_tabs(&self) -> Result<Vec<TabInfo>> {
        (**self).query_all_tabs().await
    }

    async fn query_active_tab(&self) -> Result<Option<TabInfo>> {
        (**self).query_active_tab().await
    }

    async fn get_tab(&self, id: TabId) -> Result<Option<TabInfo>> {
        (**self).get_tab(id).await
    }

    async fn set_tab_muted(&self, id: TabId, muted: bool) -> Result<()> {
        (**self).set_tab_muted(id, muted).await
    }
}
