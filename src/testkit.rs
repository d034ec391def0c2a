//! Scripted fixtures for tests and the simulator binary
//!
//! [`FakePage`] is a scriptable, clonable host page: tests keep one handle
//! and mutate the "rendered" state while the engine owns another.
//! [`ScriptedBackground`] answers the collaborator protocol from canned state
//! and records every envelope it receives.

use crate::background::{BackgroundChannel, BackgroundRequest, BackgroundResponse, Envelope};
use crate::config::{RemoteConfig, Selectors};
use crate::models::{ModelUsage, UsageSnapshot};
use crate::page::{HostPage, Viewport};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct PageState {
    present: HashSet<String>,
    element_texts: HashMap<String, String>,
    selected_options: HashMap<String, String>,
    markers: HashMap<(String, String), String>,
    path: String,
    cookies: HashMap<String, String>,
    viewport: Viewport,
}

/// Scriptable host page backed by shared state.
#[derive(Debug, Clone)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        let state = PageState {
            path: "/".to_string(),
            viewport: Viewport {
                width: 1280,
                height: 800,
            },
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make a selector match without any readable text (anchors, login
    /// screens).
    pub fn add_element(&self, selector: &str) {
        self.state.lock().unwrap().present.insert(selector.to_string());
    }

    pub fn remove_element(&self, selector: &str) {
        let mut state = self.state.lock().unwrap();
        state.present.remove(selector);
        state.element_texts.remove(selector);
        state.selected_options.remove(selector);
    }

    pub fn set_element_text(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .element_texts
            .insert(selector.to_string(), text.to_string());
    }

    pub fn set_selected_option(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .selected_options
            .insert(selector.to_string(), text.to_string());
    }

    pub fn set_path(&self, path: &str) {
        self.state.lock().unwrap().path = path.to_string();
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .cookies
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        self.state.lock().unwrap().viewport = Viewport { width, height };
    }
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPage for FakePage {
    fn has_element(&self, selector: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.present.contains(selector)
            || state.element_texts.contains_key(selector)
            || state.selected_options.contains_key(selector)
    }

    fn element_text(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().element_texts.get(selector).cloned()
    }

    fn selected_option_text(&self, selector: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .selected_options
            .get(selector)
            .cloned()
    }

    fn marker(&self, selector: &str, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .markers
            .get(&(selector.to_string(), name.to_string()))
            .cloned()
    }

    fn set_marker(&self, selector: &str, name: &str, value: &str) -> bool {
        if !self.has_element(selector) {
            return false;
        }
        self.state
            .lock()
            .unwrap()
            .markers
            .insert((selector.to_string(), name.to_string()), value.to_string());
        true
    }

    fn path(&self) -> String {
        self.state.lock().unwrap().path.clone()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().cookies.get(name).cloned()
    }

    fn viewport(&self) -> Viewport {
        self.state.lock().unwrap().viewport
    }
}

#[derive(Debug)]
struct BackgroundState {
    config: RemoteConfig,
    collapsed: bool,
    previous_version: Option<String>,
    default_data: UsageSnapshot,
    data_by_conversation: HashMap<String, UsageSnapshot>,
    sent: Vec<Envelope>,
}

/// Canned background collaborator that records the envelopes it receives.
#[derive(Debug, Clone)]
pub struct ScriptedBackground {
    state: Arc<Mutex<BackgroundState>>,
}

impl ScriptedBackground {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackgroundState {
                config,
                collapsed: false,
                previous_version: None,
                default_data: UsageSnapshot::default(),
                data_by_conversation: HashMap::new(),
                sent: Vec::new(),
            })),
        }
    }

    /// Snapshot returned for `requestData` without a matching conversation.
    pub fn set_data(&self, snapshot: UsageSnapshot) {
        self.state.lock().unwrap().default_data = snapshot;
    }

    pub fn set_conversation_data(&self, conversation_id: &str, snapshot: UsageSnapshot) {
        self.state
            .lock()
            .unwrap()
            .data_by_conversation
            .insert(conversation_id.to_string(), snapshot);
    }

    pub fn set_collapsed(&self, collapsed: bool) {
        self.state.lock().unwrap().collapsed = collapsed;
    }

    pub fn set_previous_version(&self, version: Option<&str>) {
        self.state.lock().unwrap().previous_version = version.map(str::to_string);
    }

    pub fn stored_version(&self) -> Option<String> {
        self.state.lock().unwrap().previous_version.clone()
    }

    pub fn stored_collapsed(&self) -> bool {
        self.state.lock().unwrap().collapsed
    }

    /// Every envelope received so far, in order.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_requests(&self) -> Vec<BackgroundRequest> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|e| e.request.clone())
            .collect()
    }
}

impl BackgroundChannel for ScriptedBackground {
    fn send(&self, envelope: Envelope) -> impl Future<Output = Result<BackgroundResponse>> + Send {
        let state = Arc::clone(&self.state);
        async move {
            let mut state = state.lock().unwrap();
            state.sent.push(envelope.clone());
            let response = match envelope.request {
                BackgroundRequest::GetConfig => {
                    BackgroundResponse::Config(state.config.clone())
                }
                BackgroundRequest::GetCollapsedState => {
                    BackgroundResponse::Collapsed(state.collapsed)
                }
                BackgroundRequest::SetCollapsedState { is_collapsed } => {
                    state.collapsed = is_collapsed;
                    BackgroundResponse::Ack
                }
                BackgroundRequest::GetPreviousVersion => {
                    BackgroundResponse::Version(state.previous_version.clone())
                }
                BackgroundRequest::SetCurrentVersion { version } => {
                    state.previous_version = Some(version);
                    BackgroundResponse::Ack
                }
                BackgroundRequest::RequestData { conversation_id } => {
                    let snapshot = conversation_id
                        .and_then(|id| state.data_by_conversation.get(&id).cloned())
                        .unwrap_or_else(|| state.default_data.clone());
                    BackgroundResponse::Data(snapshot)
                }
                BackgroundRequest::InitOrg => BackgroundResponse::Ack,
            };
            Ok(response)
        }
    }
}

/// A two-model remote configuration most fixtures start from.
pub fn sample_remote_config() -> RemoteConfig {
    RemoteConfig {
        models: vec!["opus".into(), "sonnet".into()],
        model_token_caps: HashMap::from([
            ("opus".into(), 100_000u64),
            ("sonnet".into(), 500_000u64),
            ("default".into(), 100_000u64),
        ]),
        selectors: Selectors {
            model_override: "#model-override".into(),
            model_picker: "#model-picker".into(),
            user_menu_button: "#user-menu".into(),
        },
        warning_threshold: 0.9,
        ui_update_interval_ms: 3000,
    }
}

/// A logged-in page matching [`sample_remote_config`], showing an Opus picker.
pub fn sample_page() -> FakePage {
    let page = FakePage::new();
    page.add_element("#user-menu");
    page.set_element_text("#model-picker", "Claude Opus 4");
    page.set_cookie("lastActiveOrg", "org_test");
    page
}

/// Snapshot with usage for a single model.
pub fn snapshot_for(model: &str, total: u64, length: Option<u64>) -> UsageSnapshot {
    UsageSnapshot {
        conversation_length: length,
        model_data: HashMap::from([(
            model.to_string(),
            ModelUsage {
                total,
                message_count: 3,
                reset_timestamp: None,
            },
        )]),
    }
}
