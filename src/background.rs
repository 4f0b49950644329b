/// Background dispatcher
///
/// Single entry point for browser events, commands and popup requests. Every
/// handler first waits for the one-time initialization (legacy settings
/// migration, tab backfill, start-up mute sweep). Failures stop at this
/// boundary: they are logged and the browser carries on.
use log::{debug, info};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{MuteError, Result, log_failure};
use crate::host::TabHost;
use crate::messages::{Command, QueryResponse, Request, TabEvent};
use crate::options::OptionsStore;
use crate::storage::{KeyValueBackend, TabStateStore};
use crate::tab_tracker::TabTracker;

/// Session flag: the start-up mute sweep already ran in this browser session
pub const MUTED_ALL_ON_START_KEY: &str = "mutedAllOnStart";

pub struct Background<H, O, S, B> {
    tracker: TabTracker<H, O, S>,
    session: B,
    ready: OnceCell<std::result::Result<(), String>>,
}

impl<H, O, S, B> Background<H, O, S, B>
where
    H: TabHost,
    O: OptionsStore,
    S: TabStateStore,
    B: KeyValueBackend,
{
    pub fn new(tracker: TabTracker<H, O, S>, session: B) -> Self {
        Background {
            tracker,
            session,
            ready: OnceCell::new(),
        }
    }

    pub fn tracker(&self) -> &TabTracker<H, O, S> {
        &self.tracker
    }

    /// Resolve once initialization has finished
    ///
    /// Runs initialization on first call; later callers wait for that same
    /// run. A failed initialization stays failed for the life of the process.
    pub async fn ready(&self) -> Result<()> {
        let outcome = self
            .ready
            .get_or_init(|| async {
                match self.initialize().await {
                    Ok(()) => {
                        info!("Tab Muter ready");
                        Ok(())
                    }
                    Err(e) => {
                        log_failure("Initialization failed", &e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        outcome.clone().map_err(MuteError::NotInitialized)
    }

    async fn initialize(&self) -> Result<()> {
        if self.tracker.lists().options().migrate_legacy_settings().await? {
            info!("Settings migrated to the combined rule list");
        }

        let added = self.tracker.backfill_tabs().await?;
        debug!("Tracking {} pre-existing tabs", added);

        let swept = self
            .session
            .get(MUTED_ALL_ON_START_KEY)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if swept {
            debug!("Start-up sweep already ran in this session");
        } else {
            self.tracker.mute_all_tabs_by_application_logic().await?;
            self.session
                .set(MUTED_ALL_ON_START_KEY, Value::Bool(true))
                .await?;
        }

        Ok(())
    }

    pub async fn handle_event(&self, event: TabEvent) {
        let context = format!("Handling {:?}", event);
        if let Err(e) = self.dispatch_event(event).await {
            log_failure(&context, &e);
        }
    }

    async fn dispatch_event(&self, event: TabEvent) -> Result<()> {
        self.ready().await?;

        match event {
            TabEvent::Created { tab } => self.tracker.on_tab_created(&tab).await,
            TabEvent::Replaced {
                added_tab_id,
                removed_tab_id,
            } => {
                self.tracker
                    .on_tab_replaced(added_tab_id, removed_tab_id)
                    .await
            }
            TabEvent::UrlChanged { tab_id, url } => {
                self.tracker.on_tab_url_changed(tab_id, &url).await?;
                Ok(())
            }
            TabEvent::Removed { tab_id } => self.tracker.on_tab_removed(tab_id).await,
            TabEvent::Activated { tab_id } => self.tracker.on_tab_activated(tab_id).await,
            TabEvent::MuteChanged {
                tab_id,
                muted,
                muted_by_this_extension,
            } => {
                self.tracker
                    .on_mute_changed(tab_id, muted, muted_by_this_extension)
                    .await
            }
            TabEvent::SettingsChanged { before, after } => {
                self.tracker.update_settings(&before, &after).await
            }
        }
    }

    pub async fn handle_command(&self, name: &str) {
        if let Err(e) = self.dispatch_command(name).await {
            log_failure(&format!("Command {}", name), &e);
        }
    }

    async fn dispatch_command(&self, name: &str) -> Result<()> {
        self.ready().await?;
        self.run_command(name.parse()?).await
    }

    async fn run_command(&self, command: Command) -> Result<()> {
        debug!("Running command {}", command);

        match command {
            Command::ApplyMute => {
                self.tracker.mute_all_tabs_by_application_logic().await?;
            }
            Command::MuteAll => {
                self.tracker.mute_all_tabs_by_user_request(None).await?;
            }
            Command::MuteTab => {
                self.tracker
                    .toggle_mute_on_current_tab_by_user_request()
                    .await?;
            }
            Command::MuteOther => {
                self.tracker.mute_other_tabs_by_user_request().await?;
            }
            Command::ListPage => {
                self.tracker.add_or_remove_current_page_in_list().await?;
            }
            Command::ListDomain => {
                self.tracker.add_or_remove_current_domain_in_list().await?;
            }
            Command::SwitchListType => {
                self.tracker.switch_list_type().await?;
            }
        }
        Ok(())
    }

    /// Answer a popup request; commands and failures produce no answer
    pub async fn handle_request(&self, request: Request) -> Option<QueryResponse> {
        match self.answer(request).await {
            Ok(response) => response,
            Err(e) => {
                log_failure("Answering popup request", &e);
                None
            }
        }
    }

    async fn answer(&self, request: Request) -> Result<Option<QueryResponse>> {
        self.ready().await?;

        let response = match request {
            Request::QueryCurrentMuted => self
                .tracker
                .is_current_tab_muted()
                .await?
                .map(|muted| QueryResponse::Muted { muted }),
            Request::QueryUsingAllowList => Some(QueryResponse::UsingAllowList {
                using_allow_list: self.tracker.lists().options().using_allow_list().await?,
            }),
            Request::QueryPageListed => self
                .tracker
                .is_current_page_listed()
                .await?
                .map(|listed| QueryResponse::Listed { listed }),
            Request::QueryDomainListed => self
                .tracker
                .is_current_domain_listed()
                .await?
                .map(|listed| QueryResponse::Listed { listed }),
            Request::Command { command } => {
                self.run_command(command.parse()?).await?;
                None
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list_expert::ListExpert;
    use crate::options::{LEGACY_BLOCK_LIST_KEY, LEGACY_LIST_TYPE_KEY, Settings, StoredOptions};
    use crate::storage::PersistedTabStates;
    use crate::testing::MemoryBackend;
    use crate::tab_data::TabInfo;
    use crate::testing::{
        FakeTabHost, Harness, TestOptions, TestStates, allow_list, block_list, tab,
    };
    use serde_json::json;
    use std::rc::Rc;

    type TestBackground = Background<Rc<FakeTabHost>, TestOptions, TestStates, Rc<MemoryBackend>>;

    fn background(settings: Settings, tabs: Vec<TabInfo>) -> (TestBackground, Harness) {
        let h = Harness::new(settings, tabs);
        let bg = restarted(&h);
        (bg, h)
    }

    /// A fresh process over the same browser and storage
    fn restarted(h: &Harness) -> TestBackground {
        let tracker = TabTracker::new(
            h.host.clone(),
            ListExpert::new(StoredOptions::new(h.settings.clone())),
            PersistedTabStates::new(h.session.clone()),
        );
        Background::new(tracker, h.session.clone())
    }

    #[tokio::test]
    async fn test_startup_backfills_and_sweeps_once() {
        let (bg, h) = background(
            block_list(&["loud.com/*"]),
            vec![tab(1, "https://loud.com/"), tab(2, "https://quiet.com/")],
        );

        bg.ready().await.unwrap();
        assert!(h.host.is_muted(1));
        assert!(!h.host.is_muted(2));
        assert!(bg.tracker().states().get(2).await.unwrap().is_some());
        assert_eq!(h.session.snapshot(MUTED_ALL_ON_START_KEY), Some(json!(true)));

        // User unmutes; a restarted process must not sweep again
        h.host.user_set_muted(1, false);
        let again = restarted(&h);
        again.ready().await.unwrap();
        assert!(!h.host.is_muted(1));
    }

    #[tokio::test]
    async fn test_concurrent_handlers_share_one_initialization() {
        let (bg, h) = background(allow_list(&[]), vec![tab(1, "https://a.com/")]);

        let (first, second) = tokio::join!(bg.ready(), bg.ready());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(h.host.mute_calls(), vec![(1, true)]);
    }

    #[tokio::test]
    async fn test_startup_migrates_legacy_settings() {
        let h = Harness::new(Settings::default(), vec![tab(1, "https://ads.com/")]);
        let legacy = Rc::new(MemoryBackend::with_values([
            (LEGACY_BLOCK_LIST_KEY, json!("ads.com/*")),
            (LEGACY_LIST_TYPE_KEY, json!(false)),
        ]));
        let tracker = TabTracker::new(
            h.host.clone(),
            ListExpert::new(StoredOptions::new(legacy.clone())),
            PersistedTabStates::new(h.session.clone()),
        );
        let bg = Background::new(tracker, h.session.clone());

        bg.ready().await.unwrap();
        assert!(h.host.is_muted(1));
        assert_eq!(legacy.snapshot(LEGACY_BLOCK_LIST_KEY), None);
    }

    #[tokio::test]
    async fn test_event_before_ready_runs_initialization_first() {
        let (bg, h) = background(block_list(&["a.com/*"]), vec![]);
        let created = tab(4, "https://a.com/");
        h.host.open(created.clone());

        bg.handle_event(TabEvent::Created { tab: created }).await;

        assert_eq!(h.session.snapshot(MUTED_ALL_ON_START_KEY), Some(json!(true)));
        assert!(h.host.is_muted(4));
    }

    #[tokio::test]
    async fn test_failed_initialization_is_contained_and_sticky() {
        let (bg, h) = background(allow_list(&[]), vec![tab(1, "https://a.com/")]);
        h.session.set_failing(true);

        bg.handle_event(TabEvent::Activated { tab_id: 1 }).await;
        assert!(matches!(bg.ready().await, Err(MuteError::NotInitialized(_))));

        h.session.set_failing(false);
        bg.handle_command("mute-all").await;
        assert!(matches!(bg.ready().await, Err(MuteError::NotInitialized(_))));
        assert!(h.host.mute_calls().is_empty());
        assert_eq!(bg.handle_request(Request::QueryUsingAllowList).await, None);
    }

    #[tokio::test]
    async fn test_tab_lifecycle_events() {
        let (bg, h) = background(block_list(&["video.com/*"]), vec![]);
        bg.ready().await.unwrap();

        h.host.open(tab(1, "https://docs.com/"));
        bg.handle_event(TabEvent::Created { tab: tab(1, "https://docs.com/") }).await;
        assert!(!h.host.is_muted(1));

        h.host.navigate(1, "https://video.com/x");
        bg.handle_event(TabEvent::UrlChanged { tab_id: 1, url: "https://video.com/x".to_string() })
            .await;
        assert!(h.host.is_muted(1));

        bg.handle_event(TabEvent::Removed { tab_id: 1 }).await;
        assert_eq!(bg.tracker().states().get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_vanished_tab_event_is_contained() {
        let (bg, h) = background(block_list(&[]), vec![]);

        bg.handle_event(TabEvent::Replaced { added_tab_id: 9, removed_tab_id: 8 }).await;
        bg.handle_event(TabEvent::UrlChanged { tab_id: 9, url: "https://a.com/".to_string() })
            .await;
        assert!(h.host.mute_calls().is_empty());
    }

    #[tokio::test]
    async fn test_settings_changed_event() {
        let before = block_list(&[]);
        let after = block_list(&["a.com/*"]);
        let (bg, h) = background(before.clone(), vec![tab(1, "https://a.com/")]);
        bg.ready().await.unwrap();
        assert!(!h.host.is_muted(1));

        h.store_settings(&after).await;
        bg.handle_event(TabEvent::SettingsChanged { before, after }).await;
        assert!(h.host.is_muted(1));
    }

    #[tokio::test]
    async fn test_commands() {
        let (bg, h) = background(
            block_list(&[]),
            vec![tab(1, "https://a.com/"), tab(2, "https://b.com/")],
        );
        h.host.activate(1);

        bg.handle_command("mute-other").await;
        assert!(!h.host.is_muted(1));
        assert!(h.host.is_muted(2));

        bg.handle_command("mute-tab").await;
        assert!(h.host.is_muted(1));

        bg.handle_command("list-domain").await;
        assert_eq!(bg.tracker().lists().list_info().await.unwrap().patterns(), ["a.com/*"]);
        assert!(h.host.is_muted(1));
        assert!(!h.host.is_muted(2));

        bg.handle_command("switch-list-type").await;
        assert!(bg.tracker().lists().list_info().await.unwrap().is_allow_list());
        assert!(!h.host.is_muted(1));
        assert!(h.host.is_muted(2));
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let (bg, h) = background(block_list(&[]), vec![tab(1, "https://a.com/")]);

        bg.handle_command("make-coffee").await;
        assert!(h.host.mute_calls().is_empty());
        assert!(bg.ready().await.is_ok());
    }

    #[tokio::test]
    async fn test_popup_requests() {
        let (bg, h) = background(
            block_list(&["a.com/page"]),
            vec![tab(1, "https://a.com/page")],
        );

        assert_eq!(bg.handle_request(Request::QueryCurrentMuted).await, None);

        h.host.activate(1);
        assert_eq!(
            bg.handle_request(Request::QueryCurrentMuted).await,
            Some(QueryResponse::Muted { muted: true })
        );
        assert_eq!(
            bg.handle_request(Request::QueryUsingAllowList).await,
            Some(QueryResponse::UsingAllowList { using_allow_list: false })
        );
        assert_eq!(
            bg.handle_request(Request::QueryPageListed).await,
            Some(QueryResponse::Listed { listed: true })
        );
        assert_eq!(
            bg.handle_request(Request::QueryDomainListed).await,
            Some(QueryResponse::Listed { listed: false })
        );

        let toggle = Request::command(Command::ListPage);
        assert_eq!(bg.handle_request(toggle).await, None);
        assert!(!h.host.is_muted(1));
        assert_eq!(
            bg.handle_request(Request::QueryPageListed).await,
            Some(QueryResponse::Listed { listed: false })
        );
    }
}
