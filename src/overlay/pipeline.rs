//! Update pipeline
//!
//! Buffers usage snapshots until the presentation exists, then derives every
//! displayed value from them: the conversation cost line, the remaining-
//! messages estimate, and each model section's bar, tooltip, counter, and
//! reset countdown.
//!
//! Ordering contract: nothing is displayed before [`UpdatePipeline::mark_ready`]
//! runs; snapshots submitted earlier queue in arrival order and replay in that
//! order, each applied to completion before the next. The queue is drained
//! exactly once and never refills.

use crate::detect::ModelDetector;
use crate::format::{format_time_remaining, format_tokens, parse_rendered_cost};
use crate::models::{ModelCatalog, UsageSnapshot, DEFAULT_MODEL};
use crate::overlay::{BarColor, HeaderView, SectionState};
use crate::page::HostPage;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

pub struct UpdatePipeline {
    catalog: ModelCatalog,
    warning_threshold: f64,
    current_model: String,
    sections: HashMap<String, SectionState>,
    header: HeaderView,
    ui_ready: bool,
    pending: VecDeque<UsageSnapshot>,
}

impl UpdatePipeline {
    pub fn new(catalog: ModelCatalog, warning_threshold: f64) -> Self {
        Self {
            catalog,
            warning_threshold,
            current_model: DEFAULT_MODEL.to_string(),
            sections: HashMap::new(),
            header: HeaderView::new(),
            ui_ready: false,
            pending: VecDeque::new(),
        }
    }

    /// Create one section per catalog model, the active one expanded. Part of
    /// presentation construction, before readiness.
    pub fn build_sections(&mut self, active_model: &str, mobile: bool) {
        self.current_model = active_model.to_string();
        for model in self.catalog.models() {
            let section = SectionState::new(model, model == active_model, mobile);
            self.sections.insert(model.clone(), section);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ui_ready
    }

    pub fn current_model(&self) -> &str {
        &self.current_model
    }

    /// Adopted by the poll loop after its own detection pass.
    pub fn set_current_model(&mut self, model: &str) {
        self.current_model = model.to_string();
    }

    pub fn header(&self) -> &HeaderView {
        &self.header
    }

    pub fn section(&self, model: &str) -> Option<&SectionState> {
        self.sections.get(model)
    }

    /// Sections in catalog order, for rendering.
    pub fn sections_ordered(&self) -> Vec<&SectionState> {
        self.catalog
            .models()
            .iter()
            .filter_map(|m| self.sections.get(m))
            .collect()
    }

    /// Submit a snapshot. Before readiness this only queues; afterwards the
    /// update is applied before returning.
    pub async fn submit_update(
        &mut self,
        snapshot: UsageSnapshot,
        detector: &ModelDetector,
        page: &dyn HostPage,
    ) {
        if !self.ui_ready {
            debug!("Presentation not ready, queueing update");
            self.pending.push_back(snapshot);
            return;
        }
        self.apply_update(snapshot, detector, page).await;
    }

    /// Flip readiness (once) and replay queued snapshots in arrival order,
    /// each to completion before the next.
    pub async fn mark_ready(&mut self, detector: &ModelDetector, page: &dyn HostPage) {
        if self.ui_ready {
            return;
        }
        self.ui_ready = true;

        let queued = self.pending.len();
        if queued > 0 {
            debug!(queued, "Presentation ready, replaying queued updates");
        }
        while let Some(snapshot) = self.pending.pop_front() {
            self.apply_update(snapshot, detector, page).await;
        }
    }

    async fn apply_update(
        &mut self,
        snapshot: UsageSnapshot,
        detector: &ModelDetector,
        page: &dyn HostPage,
    ) {
        // Conversation cost line. When the snapshot omits the length, the
        // previously rendered line is parsed back into an integer so the
        // estimate below still has something to divide by. Lossy, see
        // `parse_rendered_cost`.
        let conversation_length = match snapshot.conversation_length {
            Some(length) => {
                self.header.cost_text =
                    format!("Current cost: {} tokens", format_tokens(length));
                Some(length)
            }
            None => parse_rendered_cost(&self.header.cost_text),
        };

        // Detection is not cached across updates; the picker may have moved
        // since the snapshot was produced.
        self.current_model = detector.detect(page).await;

        let cap = self.catalog.cap_for(&self.current_model);
        let total = snapshot
            .model_data
            .get(&self.current_model)
            .map(|usage| usage.total)
            .unwrap_or(0);
        let remaining = cap as i64 - total as i64;

        let estimate = match conversation_length {
            Some(length) if length > 0 && self.current_model != DEFAULT_MODEL => {
                let estimate = (remaining as f64 / length as f64).max(0.0);
                format!("{estimate:.1}")
            }
            _ => "N/A".to_string(),
        };
        self.header.estimate_text = format!("Est. messages left: {estimate}");
        debug!(
            model = %self.current_model,
            cap,
            total,
            estimate = %estimate,
            "Applied header update"
        );

        let now = Utc::now();
        self.refresh_sections(&snapshot, now);
    }

    /// Refresh every catalog section from the snapshot, not just the active
    /// one. A model with no section is skipped with a warning; the rest are
    /// unaffected.
    fn refresh_sections(&mut self, snapshot: &UsageSnapshot, now: DateTime<Utc>) {
        for model in self.catalog.models() {
            let usage = snapshot.model_data.get(model).cloned().unwrap_or_default();
            let cap = self.catalog.cap_for(model);

            let Some(section) = self.sections.get_mut(model) else {
                warn!(model = %model, "Section for model not found, skipping");
                continue;
            };

            let percentage = if cap == 0 {
                0.0
            } else {
                usage.total as f64 / cap as f64 * 100.0
            };

            section.bar_width_pct = percentage.min(100.0);
            section.bar_color = if usage.total as f64 >= cap as f64 * self.warning_threshold {
                BarColor::Warning
            } else {
                BarColor::Normal
            };
            section.last_percentage = percentage;
            section.last_tooltip = format!(
                "{} / {} tokens ({:.1}%)",
                format_tokens(usage.total),
                format_tokens(cap),
                percentage
            );
            section.counter_text = format!("Messages: {}", usage.message_count);
            section.reset_text = usage
                .reset_timestamp
                .and_then(DateTime::from_timestamp_millis)
                .map(|target| format_time_remaining(target, now))
                .unwrap_or_else(|| "Reset in: Not set".to_string());
        }
    }

    /// Re-assert the policy table for every section against the current model
    /// and page context. Exactly one section ends up active.
    pub fn apply_section_policy(&mut self, is_home: bool, mobile: bool) {
        for model in self.catalog.models() {
            let active = *model == self.current_model;
            if let Some(section) = self.sections.get_mut(model) {
                section.set_active(active, is_home, mobile);
            }
        }
    }

    /// Force the header to the home-page literals, bypassing derivations.
    pub fn force_home_display(&mut self) {
        self.header.force_not_applicable();
    }

    /// Manual per-section collapse toggle. Returns false for unknown models.
    pub fn toggle_section(&mut self, model: &str) -> bool {
        match self.sections.get_mut(model) {
            Some(section) => {
                section.toggle_collapsed();
                true
            }
            None => false,
        }
    }
}
