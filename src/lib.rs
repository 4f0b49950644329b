/// Tab Muter - Chrome Extension that mutes tabs by URL rules
/// Built with Rust + WASM + Yew

pub mod background;
mod bridge;
pub mod error;
pub mod host;
pub mod list_expert;
pub mod list_info;
pub mod messages;
pub mod options;
pub mod storage;
pub mod tab_data;
mod tab_locks;
pub mod tab_tracker;
pub mod ui;
pub mod url_matcher;

#[cfg(test)]
mod testing;

use wasm_bindgen::prelude::*;

pub use bridge::{handle_command, handle_request, handle_tab_event, start_background};

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export pattern helpers for the options page preview
#[wasm_bindgen]
pub fn url_pattern_match(pattern: &str, url: &str, use_regex: bool) -> bool {
    url_matcher::url_pattern_match(pattern, url, use_regex)
}

#[wasm_bindgen]
pub fn domain_pattern(url: &str, use_regex: bool) -> String {
    url_matcher::domain_pattern(url, use_regex)
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}
