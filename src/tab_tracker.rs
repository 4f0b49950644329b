/// Tab mute reconciliation
///
/// Decides per tab whether the rule list wants it muted, applies that through
/// the browser, and keeps each tab's cached record in step with tab lifecycle
/// events. User commands go through the same paths with the enabled check
/// bypassed.
use std::cell::RefCell;

use log::{debug, info, warn};

use crate::error::{MuteError, Result, log_failure};
use crate::host::TabHost;
use crate::list_expert::ListExpert;
use crate::options::{OptionsStore, Settings};
use crate::storage::TabStateStore;
use crate::tab_data::{TabId, TabInfo, TabMuteRecord};
use crate::tab_locks::TabLocks;
use crate::url_matcher;

/// Who asked for a mute change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteRequest {
    /// Rule verdict; ignored while the extension is disabled
    ByRule,
    /// Explicit user command; always applied
    ByUser,
}

/// Whether the browser has to be called to reach `target`
///
/// An unmuted tab has no owner worth protecting, so matching flags mean
/// nothing to do. A mute made by someone else (the user, another extension)
/// is left alone by rule verdicts; an explicit user command re-issues it so
/// the extension owns it afterwards.
pub fn mute_call_needed(tab: &TabInfo, target: bool, request: MuteRequest) -> bool {
    let muted_elsewhere = tab.muted && !tab.muted_by_this_extension;

    if tab.muted == target {
        target && muted_elsewhere && request == MuteRequest::ByUser
    } else {
        !(muted_elsewhere && request == MuteRequest::ByRule)
    }
}

pub struct TabTracker<H, O, S> {
    host: H,
    lists: ListExpert<O>,
    states: S,
    locks: TabLocks,
    /// Settings the last full unmute and re-apply pass ran under
    applied: RefCell<Option<Settings>>,
}

impl<H, O, S> TabTracker<H, O, S>
where
    H: TabHost,
    O: OptionsStore,
    S: TabStateStore,
{
    pub fn new(host: H, lists: ListExpert<O>, states: S) -> Self {
        TabTracker {
            host,
            lists,
            states,
            locks: TabLocks::new(),
            applied: RefCell::new(None),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn lists(&self) -> &ListExpert<O> {
        &self.lists
    }

    pub fn states(&self) -> &S {
        &self.states
    }

    /// Rule verdict for a URL under the current list
    pub async fn should_mute(&self, url: &str) -> Result<bool> {
        let list = self.lists.list_info().await?;
        let in_list = self.lists.is_in_list(&list, url).await?;
        Ok(list.should_mute_when(in_list))
    }

    async fn fetch_tab(&self, id: TabId) -> Result<TabInfo> {
        self.host
            .get_tab(id)
            .await?
            .ok_or(MuteError::TabNotFound(id))
    }

    async fn track(&self, tab: &TabInfo) -> Result<()> {
        self.states.set(tab.id, &TabMuteRecord::from_tab(tab)).await
    }

    // Callers hold the tab's lock for everything below.

    async fn set_muted(&self, tab: &TabInfo, target: bool, request: MuteRequest) -> Result<bool> {
        if request == MuteRequest::ByRule && !self.lists.options().enabled().await? {
            debug!("Extension disabled, leaving tab {} alone", tab.id);
            return Ok(false);
        }

        if !mute_call_needed(tab, target, request) {
            debug!("Tab {} already {}", tab.id, if target { "muted" } else { "unmuted" });
            return Ok(false);
        }

        self.host.set_tab_muted(tab.id, target).await?;

        let mut record = self
            .states
            .get(tab.id)
            .await?
            .unwrap_or_else(|| TabMuteRecord::from_tab(tab));
        record.muted = target;
        record.extension_owns_current_mute_state = true;
        self.states.set(tab.id, &record).await?;

        debug!("{} tab {} ({:?})", if target { "Muted" } else { "Unmuted" }, tab.id, request);
        Ok(true)
    }

    async fn apply_mute_by_rule(&self, tab: &TabInfo) -> Result<bool> {
        let target = self.should_mute(&tab.url).await?;
        self.set_muted(tab, target, MuteRequest::ByRule).await
    }

    // Sweep steps: the tab may have changed while the sweep waited for its lock.

    async fn apply_rule_to(&self, id: TabId) -> Result<bool> {
        let tab = self.fetch_tab(id).await?;
        self.apply_mute_by_rule(&tab).await
    }

    async fn force_mute(&self, id: TabId) -> Result<bool> {
        let tab = self.fetch_tab(id).await?;
        self.set_muted(&tab, true, MuteRequest::ByUser).await
    }

    async fn release_own_mute(&self, id: TabId) -> Result<bool> {
        let tab = self.fetch_tab(id).await?;
        if !(tab.muted && tab.muted_by_this_extension) {
            return Ok(false);
        }
        self.set_muted(&tab, false, MuteRequest::ByUser).await
    }

    pub async fn on_tab_created(&self, tab: &TabInfo) -> Result<()> {
        let _guard = self.locks.lock(tab.id).await;
        self.track(tab).await?;
        self.apply_mute_by_rule(tab).await?;
        Ok(())
    }

    /// A tab was swapped for another (prerender, discard); the new id takes over
    pub async fn on_tab_replaced(&self, added: TabId, removed: TabId) -> Result<()> {
        {
            let _guard = self.locks.lock(removed).await;
            self.states.delete(removed).await?;
        }
        self.locks.release(removed);

        let _guard = self.locks.lock(added).await;
        let tab = self.fetch_tab(added).await?;
        self.track(&tab).await?;
        self.apply_mute_by_rule(&tab).await?;
        Ok(())
    }

    /// Re-evaluate a navigated tab, unless it stayed on the same host
    ///
    /// Same-host navigations (single page app routes, in-site links) keep
    /// whatever mute state the tab has. Returns whether a mute call was made.
    pub async fn on_tab_url_changed(&self, id: TabId, url: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;

        let cached = self.states.get(id).await?;
        if let Some(record) = &cached {
            if url_matcher::same_domain(&record.url, url) {
                debug!("Tab {} stayed on the same site, keeping mute state", id);
                return Ok(false);
            }
        }

        let live = self.fetch_tab(id).await?;
        let tab = TabInfo {
            url: url.to_string(),
            ..live
        };
        let record = match cached {
            Some(record) => TabMuteRecord {
                url: url.to_string(),
                ..record
            },
            None => TabMuteRecord::from_tab(&tab),
        };
        self.states.set(id, &record).await?;

        self.apply_mute_by_rule(&tab).await
    }

    pub async fn on_tab_removed(&self, id: TabId) -> Result<()> {
        {
            let _guard = self.locks.lock(id).await;
            self.states.delete(id).await?;
        }
        self.locks.release(id);
        debug!("Tab {} closed, {} tab locks live", id, self.locks.len());
        Ok(())
    }

    /// Pick up a tab that was never observed being created
    pub async fn on_tab_activated(&self, id: TabId) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        if self.states.get(id).await?.is_some() {
            return Ok(());
        }

        let tab = self.fetch_tab(id).await?;
        self.track(&tab).await?;
        self.apply_mute_by_rule(&tab).await?;
        Ok(())
    }

    /// The browser reports a mute flip, whoever made it
    pub async fn on_mute_changed(
        &self,
        id: TabId,
        muted: bool,
        muted_by_this_extension: bool,
    ) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        let url = match self.states.get(id).await? {
            Some(record) => record.url,
            None => self.fetch_tab(id).await?.url,
        };

        let record = TabMuteRecord {
            url,
            muted,
            extension_owns_current_mute_state: muted_by_this_extension,
        };
        self.states.set(id, &record).await
    }

    /// Record every open tab that has no record yet
    pub async fn backfill_tabs(&self) -> Result<usize> {
        let mut added = 0;
        for tab in self.host.query_all_tabs().await? {
            let _guard = self.locks.lock(tab.id).await;
            if self.states.get(tab.id).await?.is_none() {
                self.track(&tab).await?;
                added += 1;
            }
        }

        debug!("Backfilled {} tabs", added);
        Ok(added)
    }

    /// Apply the rule verdict to every open tab; returns how many changed
    pub async fn mute_all_tabs_by_application_logic(&self) -> Result<usize> {
        if !self.lists.options().enabled().await? {
            debug!("Extension disabled, skipping rule sweep");
            return Ok(0);
        }

        let tabs = self.host.query_all_tabs().await?;
        let mut changed = 0;
        for id in tabs.iter().map(|t| t.id) {
            let _guard = self.locks.lock(id).await;
            match self.apply_rule_to(id).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => log_failure(&format!("Applying rules to tab {}", id), &e),
            }
        }

        info!("Applied mute rules to {} tabs, {} changed", tabs.len(), changed);
        Ok(changed)
    }

    /// Force-mute every open tab except `exclude`
    pub async fn mute_all_tabs_by_user_request(&self, exclude: Option<TabId>) -> Result<usize> {
        let tabs = self.host.query_all_tabs().await?;
        let mut changed = 0;
        for id in tabs.iter().map(|t| t.id).filter(|id| Some(*id) != exclude) {
            let _guard = self.locks.lock(id).await;
            match self.force_mute(id).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => log_failure(&format!("Muting tab {}", id), &e),
            }
        }

        info!("Muted {} tabs on request", changed);
        Ok(changed)
    }

    /// Force-mute everything but the active tab
    pub async fn mute_other_tabs_by_user_request(&self) -> Result<usize> {
        match self.host.query_active_tab().await? {
            Some(active) => self.mute_all_tabs_by_user_request(Some(active.id)).await,
            None => {
                warn!("No active tab, not muting others");
                Ok(0)
            }
        }
    }

    /// Flip the active tab's mute flag; returns the new flag
    pub async fn toggle_mute_on_current_tab_by_user_request(&self) -> Result<Option<bool>> {
        let Some(active) = self.host.query_active_tab().await? else {
            warn!("No active tab to toggle");
            return Ok(None);
        };

        let _guard = self.locks.lock(active.id).await;
        let tab = self.fetch_tab(active.id).await?;
        let target = !tab.muted;
        self.set_muted(&tab, target, MuteRequest::ByUser).await?;
        Ok(Some(target))
    }

    /// Release every mute this extension is responsible for
    pub async fn unmute_all_tabs_owned_by_extension(&self) -> Result<usize> {
        let tabs = self.host.query_all_tabs().await?;
        let mut changed = 0;
        let owned = tabs
            .iter()
            .filter(|t| t.muted && t.muted_by_this_extension)
            .map(|t| t.id);
        for id in owned {
            let _guard = self.locks.lock(id).await;
            match self.release_own_mute(id).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => log_failure(&format!("Unmuting tab {}", id), &e),
            }
        }

        debug!("Unmuted {} extension-owned tabs", changed);
        Ok(changed)
    }

    /// Start over from a clean slate after the rules changed
    async fn reapply_rules(&self) -> Result<()> {
        self.unmute_all_tabs_owned_by_extension().await?;
        self.mute_all_tabs_by_application_logic().await?;

        let settings = self.lists.options().settings().await?;
        *self.applied.borrow_mut() = Some(settings);
        Ok(())
    }

    /// Toggle the active page in the list; returns whether it is now listed
    pub async fn add_or_remove_current_page_in_list(&self) -> Result<Option<bool>> {
        let Some(active) = self.host.query_active_tab().await? else {
            warn!("No active tab to list");
            return Ok(None);
        };

        let listed = self.lists.add_or_remove_url_in_list(&active.url).await?;
        self.reapply_rules().await?;
        Ok(Some(listed))
    }

    /// Toggle the active tab's domain in the list; returns whether it is now listed
    pub async fn add_or_remove_current_domain_in_list(&self) -> Result<Option<bool>> {
        let Some(active) = self.host.query_active_tab().await? else {
            warn!("No active tab to list");
            return Ok(None);
        };

        let listed = self.lists.add_or_remove_domain_in_list(&active.url).await?;
        self.reapply_rules().await?;
        Ok(Some(listed))
    }

    /// React to a settings change between two snapshots
    ///
    /// Disabling only releases the extension's mutes. Any other change that
    /// can alter verdicts releases them and re-applies the rules. A change to
    /// settings the tracker already re-applied (the storage echo of a list
    /// toggle) is skipped.
    pub async fn update_settings(&self, before: &Settings, after: &Settings) -> Result<()> {
        if !before.affects_muting(after) {
            debug!("Settings change does not affect muting");
            return Ok(());
        }

        let already_applied = self
            .applied
            .borrow()
            .as_ref()
            .is_some_and(|applied| !applied.affects_muting(after));
        if already_applied {
            debug!("Rules already applied for these settings");
            return Ok(());
        }

        self.unmute_all_tabs_owned_by_extension().await?;
        if after.enabled {
            self.mute_all_tabs_by_application_logic().await?;
        }
        *self.applied.borrow_mut() = Some(after.clone());
        Ok(())
    }

    /// Flip allow list and block list; returns the new `usingAllowList`
    pub async fn switch_list_type(&self) -> Result<bool> {
        let before = self.lists.options().settings().await?;
        let using_allow_list = self.lists.switch_list_type().await?;
        let after = Settings {
            using_allow_list,
            ..before.clone()
        };

        self.update_settings(&before, &after).await?;
        Ok(using_allow_list)
    }

    pub async fn is_current_tab_muted(&self) -> Result<Option<bool>> {
        Ok(self.host.query_active_tab().await?.map(|tab| tab.muted))
    }

    pub async fn is_current_page_listed(&self) -> Result<Option<bool>> {
        match self.host.query_active_tab().await? {
            Some(tab) => Ok(Some(self.lists.is_exact_match_in_list(&tab.url).await?)),
            None => Ok(None),
        }
    }

    pub async fn is_current_domain_listed(&self) -> Result<Option<bool>> {
        match self.host.query_active_tab().await? {
            Some(tab) => Ok(Some(self.lists.is_domain_in_list(&tab.url).await?)),
            None => Ok(None),
        }
    }
}
