//! Overlay engine
//!
//! Ties the components together for one page session: the two-tier bootstrap
//! guard, presentation construction, the fixed-interval poll loop, and the
//! request/response handling for messages arriving from the collaborator.
//!
//! Everything runs on one task. Poll ticks and incoming messages interleave
//! only at await points and each runs to completion, so engine state needs no
//! locking.

use crate::background::{BackgroundChannel, BackgroundClient};
use crate::config::RemoteConfig;
use crate::detect::ModelDetector;
use crate::models::{UsageSnapshot, VersionNotice};
use crate::overlay::UpdatePipeline;
use crate::page::{
    conversation_id, is_mobile_view, HostPage, LOADED_MARKER, LOGIN_CODE_MARKER,
    LOGIN_GOOGLE_MARKER, ORG_COOKIE,
};
use crate::storage::PersistenceProxy;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info};

/// Bound on the anchor search while the page is still rendering.
const MAX_ANCHOR_RETRIES: u32 = 15;
const ANCHOR_RETRY_DELAY: Duration = Duration::from_millis(200);
/// Long pause between anchor searches while a login screen is showing.
const LOGIN_CHECK_DELAY: Duration = Duration::from_secs(10);

/// Process-wide half of the bootstrap guard. Set once on the first successful
/// acquire and never cleared; guards against re-execution within the same
/// script context. Tests use isolated instances, production uses
/// [`ProcessFlag::global`].
#[derive(Debug, Default)]
pub struct ProcessFlag(AtomicBool);

impl ProcessFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// True exactly once per flag.
    pub fn acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn global() -> &'static ProcessFlag {
        static GLOBAL: ProcessFlag = ProcessFlag::new();
        &GLOBAL
    }
}

/// Messages the collaborator pushes to (or pulls from) a running engine.
#[derive(Debug)]
pub enum EngineMessage {
    /// Push-style usage update, no response expected.
    UpdateUsage(UsageSnapshot),
    /// Pull: which model is currently active on the page.
    GetActiveModel(oneshot::Sender<String>),
    /// Pull: the organization id from the page cookie.
    GetOrgId(oneshot::Sender<Option<String>>),
}

pub struct OverlayEngine<P, B> {
    page: P,
    client: BackgroundClient<B>,
    remote: RemoteConfig,
    detector: ModelDetector,
    pipeline: UpdatePipeline,
    collapsed: bool,
    version_notice: Option<VersionNotice>,
    current_conversation: Option<String>,
}

impl<P, B> std::fmt::Debug for OverlayEngine<P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayEngine").finish_non_exhaustive()
    }
}

impl<P: HostPage, B: BackgroundChannel> OverlayEngine<P, B> {
    /// Bootstrap one engine instance for the page.
    ///
    /// `Ok(None)` means a duplicate was detected through either guard tier and
    /// nothing was started; that is a silent no-op, not an error. `Err` means
    /// bootstrap failed fatally (no anchor and no login screen, collaborator
    /// failure, invalid configuration) and must not be retried.
    pub async fn bootstrap(page: P, channel: B, flag: &ProcessFlag) -> Result<Option<Self>> {
        if !flag.acquire() {
            debug!("Instance already running in this context, stopping");
            return Ok(None);
        }

        let client = BackgroundClient::new(channel);
        let remote = client
            .get_config(&page)
            .await
            .context("Failed to load remote configuration")?;
        remote.validate().context("Remote configuration rejected")?;

        Self::wait_for_anchor(&page, &remote.selectors.user_menu_button).await?;

        // Second guard tier: an attribute on the anchor survives independent
        // re-injection of this engine into the same page.
        if page
            .marker(&remote.selectors.user_menu_button, LOADED_MARKER)
            .is_some()
        {
            debug!("Overlay already attached to this page, stopping duplicate");
            return Ok(None);
        }
        page.set_marker(&remote.selectors.user_menu_button, LOADED_MARKER, "true");
        info!("Unique instance confirmed, initializing overlay");

        let catalog = remote.catalog();
        let detector = ModelDetector::new(catalog.clone(), remote.selectors.clone());
        let current_model = detector.detect(&page).await;
        debug!(model = %current_model, "Initial model detected");

        let mut pipeline = UpdatePipeline::new(catalog, remote.warning_threshold);
        let mobile = is_mobile_view(&page);
        pipeline.build_sections(&current_model, mobile);

        let proxy = PersistenceProxy::new(&client);
        let collapsed = proxy
            .collapsed_state(&page)
            .await
            .context("Failed to load collapsed state")?;
        let version_notice = proxy
            .check_version_notification(&page, env!("CARGO_PKG_VERSION"))
            .await
            .context("Version check failed")?;

        pipeline.mark_ready(&detector, &page).await;
        let is_home = conversation_id(&page).is_none();
        pipeline.apply_section_policy(is_home, mobile);

        let mut engine = Self {
            page,
            client,
            remote,
            detector,
            pipeline,
            collapsed,
            version_notice,
            current_conversation: None,
        };

        let snapshot = engine
            .client
            .request_data(&engine.page, None)
            .await
            .context("Initial data request failed")?;
        engine
            .pipeline
            .submit_update(snapshot, &engine.detector, &engine.page)
            .await;
        engine
            .client
            .init_org(&engine.page)
            .await
            .context("Organization init failed")?;

        info!("Initialization complete, ready to track usage");
        Ok(Some(engine))
    }

    /// Locate the user-menu anchor: up to 15 probes 200ms apart, then check
    /// for a login screen. A login screen means the user has not authenticated
    /// yet - sleep long and search again, indefinitely. Neither found is
    /// fatal.
    async fn wait_for_anchor(page: &P, anchor: &str) -> Result<()> {
        loop {
            for attempt in 0..MAX_ANCHOR_RETRIES {
                if page.has_element(anchor) {
                    return Ok(());
                }
                debug!(
                    attempt = attempt + 1,
                    max = MAX_ANCHOR_RETRIES,
                    "User menu anchor not found"
                );
                sleep(ANCHOR_RETRY_DELAY).await;
            }
            if page.has_element(anchor) {
                return Ok(());
            }

            if !page.has_element(LOGIN_GOOGLE_MARKER) && !page.has_element(LOGIN_CODE_MARKER) {
                anyhow::bail!("Neither the user menu anchor nor a login screen was found");
            }

            debug!("Login screen detected, waiting before retrying the anchor search");
            sleep(LOGIN_CHECK_DELAY).await;
        }
    }

    /// Run the poll loop until the message channel closes (page teardown).
    /// Started only after bootstrap has completed.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EngineMessage>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.remote.ui_update_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval yields immediately on the first tick; the poll cadence
        // starts one full interval after bootstrap.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_tick().await {
                        error!(error = %e, "Poll tick failed");
                    }
                }
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        info!("Message channel closed, stopping overlay loop");
                        break;
                    }
                }
            }
        }
    }

    /// One poll iteration: re-evaluate model and conversation identity, fetch
    /// fresh data on a conversation switch before adopting the new id, and
    /// re-assert the section policy (the viewport may have changed even when
    /// the identifiers did not).
    pub async fn poll_tick(&mut self) -> Result<()> {
        let new_model = self.detector.detect(&self.page).await;
        let new_conversation = conversation_id(&self.page);
        let is_home = new_conversation.is_none();

        if self.current_conversation != new_conversation && !is_home {
            debug!(
                from = ?self.current_conversation,
                to = ?new_conversation,
                "Conversation changed"
            );
            let snapshot = self
                .client
                .request_data(&self.page, new_conversation.clone())
                .await
                .context("Data request for the new conversation failed")?;
            self.pipeline
                .submit_update(snapshot, &self.detector, &self.page)
                .await;
            self.current_conversation = new_conversation.clone();
        }

        if new_model != self.pipeline.current_model() {
            debug!(
                from = %self.pipeline.current_model(),
                to = %new_model,
                "Model changed"
            );
        }
        self.pipeline.set_current_model(&new_model);

        let mobile = is_mobile_view(&self.page);
        self.pipeline.apply_section_policy(is_home, mobile);
        self.current_conversation = new_conversation;

        if is_home {
            self.pipeline.force_home_display();
        }

        Ok(())
    }

    /// Handle one collaborator message. Each message is processed to
    /// completion before the next is taken from the channel.
    pub async fn handle_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::UpdateUsage(snapshot) => {
                self.pipeline
                    .submit_update(snapshot, &self.detector, &self.page)
                    .await;
            }
            EngineMessage::GetActiveModel(reply) => {
                let model = self.detector.detect(&self.page).await;
                let _ = reply.send(model);
            }
            EngineMessage::GetOrgId(reply) => {
                let _ = reply.send(self.page.cookie(ORG_COOKIE));
            }
        }
    }

    /// User toggle of the whole overlay; the new state is persisted through
    /// the collaborator.
    pub async fn toggle_collapsed(&mut self) -> Result<()> {
        self.collapsed = !self.collapsed;
        let proxy = PersistenceProxy::new(&self.client);
        proxy
            .store_collapsed_state(&self.page, self.collapsed)
            .await
    }

    /// User toggle of a single model section.
    pub fn toggle_section(&mut self, model: &str) -> bool {
        self.pipeline.toggle_section(model)
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn pipeline(&self) -> &UpdatePipeline {
        &self.pipeline
    }

    pub fn version_notice(&self) -> Option<&VersionNotice> {
        self.version_notice.as_ref()
    }

    pub fn current_conversation(&self) -> Option<&str> {
        self.current_conversation.as_deref()
    }

    pub fn remote_config(&self) -> &RemoteConfig {
        &self.remote
    }
}
