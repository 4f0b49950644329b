/// Popup UI for Tab Muter extension

use yew::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use patternfly_yew::prelude::*;
use serde::Serialize;
use crate::messages::{Command, QueryResponse, Request};

// Import JS bridge functions
#[wasm_bindgen(module = "/popup.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn sendRequest(request: JsValue) -> Result<JsValue, JsValue>;
}

/// What the background reports about the active tab
#[derive(Clone, PartialEq, Default)]
struct Status {
    muted: Option<bool>,
    using_allow_list: Option<bool>,
    page_listed: Option<bool>,
    domain_listed: Option<bool>,
}

#[derive(Clone, PartialEq)]
enum AppState {
    Idle,
    Loading(String),
    Error(String),
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Loading("Checking tab...".to_string()));
    let status = use_state(Status::default);

    // Re-query everything the popup shows
    let refresh = {
        let state = state.clone();
        let status = status.clone();

        Callback::from(move |_: ()| {
            let state = state.clone();
            let status = status.clone();

            spawn_local(async move {
                match load_status().await {
                    Ok(loaded) => {
                        status.set(loaded);
                        state.set(AppState::Idle);
                    }
                    Err(e) => {
                        state.set(AppState::Error(format!("Failed to load status: {}", e)));
                    }
                }
            });
        })
    };

    // Load status on mount
    {
        let refresh = refresh.clone();
        use_effect_with((), move |_| {
            refresh.emit(());
            || ()
        });
    }

    let on_command = {
        let state = state.clone();
        let refresh = refresh.clone();

        move |command: Command| {
            let state = state.clone();
            let refresh = refresh.clone();

            Callback::from(move |_| {
                let state = state.clone();
                let refresh = refresh.clone();

                state.set(AppState::Loading(format!("Running {}...", command)));

                spawn_local(async move {
                    match send(&Request::command(command)).await {
                        Ok(_) => refresh.emit(()),
                        Err(e) => {
                            state.set(AppState::Error(format!("{} failed: {}", command, e)));
                        }
                    }
                });
            })
        }
    };

    let is_busy = !matches!(*state, AppState::Idle);
    let mode = list_name(status.using_allow_list);

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Tab Muter"}</h1>

            // Status display
            {match &*state {
                AppState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                AppState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                AppState::Idle => html! {}
            }}

            <div class="stats-box">
                <div class="stat-item">
                    <span class="stat-domain">{"This tab"}</span>
                    <span class="stat-count">{describe(status.muted, "Muted", "Playing")}</span>
                </div>
                <div class="stat-item">
                    <span class="stat-domain">{"Mode"}</span>
                    <span class="stat-count">{mode}</span>
                </div>
                <div class="stat-item">
                    <span class="stat-domain">{"Page listed"}</span>
                    <span class="stat-count">{describe(status.page_listed, "Yes", "No")}</span>
                </div>
                <div class="stat-item">
                    <span class="stat-domain">{"Site listed"}</span>
                    <span class="stat-count">{describe(status.domain_listed, "Yes", "No")}</span>
                </div>
            </div>

            <div class="flex-column-gap">
                <Button onclick={on_command(Command::MuteTab)} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                    {toggle_label(status.muted)}
                </Button>
                <Button onclick={on_command(Command::MuteOther)} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {"Mute Other Tabs"}
                </Button>
                <Button onclick={on_command(Command::MuteAll)} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {"Mute All Tabs"}
                </Button>
                <Button onclick={on_command(Command::ListPage)} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {list_action_label(status.page_listed, "Page", mode)}
                </Button>
                <Button onclick={on_command(Command::ListDomain)} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {list_action_label(status.domain_listed, "Site", mode)}
                </Button>
                <Button onclick={on_command(Command::SwitchListType)} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                    {switch_label(status.using_allow_list)}
                </Button>
            </div>

            <p class="footer-popup">
                {"Tab Muter v0.1.0"}
            </p>
        </div>
    }
}

// Helper functions

fn describe(flag: Option<bool>, yes: &str, no: &str) -> String {
    match flag {
        Some(true) => yes.to_string(),
        Some(false) => no.to_string(),
        None => "Unknown".to_string(),
    }
}

fn list_name(using_allow_list: Option<bool>) -> &'static str {
    match using_allow_list {
        Some(false) => "Block list",
        _ => "Allow list",
    }
}

fn toggle_label(muted: Option<bool>) -> &'static str {
    match muted {
        Some(true) => "Unmute This Tab",
        _ => "Mute This Tab",
    }
}

fn list_action_label(listed: Option<bool>, what: &str, list_name: &str) -> String {
    match listed {
        Some(true) => format!("Remove {} from {}", what, list_name),
        _ => format!("Add {} to {}", what, list_name),
    }
}

fn switch_label(using_allow_list: Option<bool>) -> &'static str {
    match using_allow_list {
        Some(false) => "Switch to Allow List",
        _ => "Switch to Block List",
    }
}

async fn send(request: &Request) -> Result<Option<QueryResponse>, String> {
    let request_js = request
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))?;

    let reply = sendRequest(request_js)
        .await
        .map_err(|e| format!("Request failed: {:?}", e))?;

    if reply.is_null() || reply.is_undefined() {
        return Ok(None);
    }

    serde_wasm_bindgen::from_value(reply)
        .map(Some)
        .map_err(|e| format!("Failed to parse reply: {:?}", e))
}

async fn load_status() -> Result<Status, String> {
    let mut status = Status::default();

    if let Some(QueryResponse::Muted { muted }) = send(&Request::QueryCurrentMuted).await? {
        status.muted = Some(muted);
    }
    if let Some(QueryResponse::UsingAllowList { using_allow_list }) =
        send(&Request::QueryUsingAllowList).await?
    {
        status.using_allow_list = Some(using_allow_list);
    }
    if let Some(QueryResponse::Listed { listed }) = send(&Request::QueryPageListed).await? {
        status.page_listed = Some(listed);
    }
    if let Some(QueryResponse::Listed { listed }) = send(&Request::QueryDomainListed).await? {
        status.domain_listed = Some(listed);
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_follow_list_type() {
        assert_eq!(list_name(Some(false)), "Block list");
        assert_eq!(list_name(None), "Allow list");
        assert_eq!(switch_label(Some(true)), "Switch to Block List");
        assert_eq!(
            list_action_label(Some(true), "Site", list_name(Some(false))),
            "Remove Site from Block list"
        );
        assert_eq!(
            list_action_label(None, "Page", list_name(Some(true))),
            "Add Page to Allow list"
        );
    }

    #[test]
    fn test_toggle_label_and_description() {
        assert_eq!(toggle_label(Some(true)), "Unmute This Tab");
        assert_eq!(toggle_label(None), "Mute This Tab");
        assert_eq!(describe(None, "Muted", "Playing"), "Unknown");
        assert_eq!(describe(Some(false), "Muted", "Playing"), "Playing");
    }
}
