//! Model detection
//!
//! Infers the currently selected model from the rendered page. Detection
//! never fails: any missing element, empty label, or unmatched name resolves
//! to the `default` model.
//!
//! Matching is a case-insensitive substring scan over the catalog in
//! configured order, first match wins. Deliberately not longest-match: the
//! configured order is the tie-break and downstream behavior depends on it.

use crate::config::Selectors;
use crate::models::{ModelCatalog, DEFAULT_MODEL};
use crate::page::{wait_for, HostPage};
use std::time::Duration;
use tracing::debug;

/// Wait budget for the override selector, which is injected quickly when
/// present at all.
const OVERRIDE_WAIT: Duration = Duration::from_millis(1000);

/// Wait budget for the regular model picker, which the page renders late.
const PICKER_WAIT: Duration = Duration::from_millis(3000);

pub struct ModelDetector {
    catalog: ModelCatalog,
    selectors: Selectors,
}

impl ModelDetector {
    pub fn new(catalog: ModelCatalog, selectors: Selectors) -> Self {
        Self { catalog, selectors }
    }

    /// Detect the active model. Override selector first; an override naming
    /// an untracked model falls through to the picker rather than masking it.
    pub async fn detect(&self, page: &dyn HostPage) -> String {
        if let Some(option_text) = wait_for(OVERRIDE_WAIT, || {
            page.selected_option_text(&self.selectors.model_override)
        })
        .await
        {
            if let Some(model) = self.match_catalog(&option_text.to_lowercase()) {
                debug!(model = %model, "Model taken from override selector");
                return model;
            }
        }

        let Some(label) = wait_for(PICKER_WAIT, || {
            page.element_text(&self.selectors.model_picker)
        })
        .await
        else {
            return DEFAULT_MODEL.to_string();
        };

        let label = label.trim();
        if label.is_empty() || label == DEFAULT_MODEL {
            return DEFAULT_MODEL.to_string();
        }

        self.match_catalog(&label.to_lowercase()).unwrap_or_else(|| {
            debug!(label = %label, "No catalog model matches the picker label");
            DEFAULT_MODEL.to_string()
        })
    }

    /// First catalog model whose identifier appears in the lower-cased text.
    fn match_catalog(&self, lowered: &str) -> Option<String> {
        self.catalog
            .detectable_models()
            .find(|model| lowered.contains(&model.to_lowercase()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakePage;
    use std::collections::HashMap;

    fn detector() -> ModelDetector {
        let catalog = ModelCatalog::new(
            vec!["opus".into(), "sonnet".into()],
            HashMap::from([("default".into(), 100_000u64)]),
        );
        let selectors = Selectors {
            model_override: "#override".into(),
            model_picker: "#picker".into(),
            user_menu_button: "#menu".into(),
        };
        ModelDetector::new(catalog, selectors)
    }

    #[tokio::test(start_paused = true)]
    async fn picker_label_matches_catalog_order() {
        let page = FakePage::new();
        page.set_element_text("#picker", "Claude Opus 4");
        assert_eq!(detector().detect(&page).await, "opus");
    }

    #[tokio::test(start_paused = true)]
    async fn literal_default_label_short_circuits() {
        let page = FakePage::new();
        page.set_element_text("#picker", "default");
        assert_eq!(detector().detect(&page).await, "default");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_elements_fall_back_to_default() {
        let page = FakePage::new();
        assert_eq!(detector().detect(&page).await, "default");
    }

    #[tokio::test(start_paused = true)]
    async fn override_takes_precedence_over_picker() {
        let page = FakePage::new();
        page.set_selected_option("#override", "Claude Sonnet 4.5");
        page.set_element_text("#picker", "Claude Opus 4");
        assert_eq!(detector().detect(&page).await, "sonnet");
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_override_falls_through_to_picker() {
        let page = FakePage::new();
        page.set_selected_option("#override", "Experimental Haiku");
        page.set_element_text("#picker", "Claude Sonnet 4.5");
        assert_eq!(detector().detect(&page).await, "sonnet");
    }

    #[tokio::test(start_paused = true)]
    async fn first_configured_match_wins_on_ambiguous_labels() {
        let page = FakePage::new();
        page.set_element_text("#picker", "sonnet-flavored opus build");
        // Not longest or best match: opus comes first in the catalog.
        assert_eq!(detector().detect(&page).await, "opus");
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_picker_label_is_default() {
        let page = FakePage::new();
        page.set_element_text("#picker", "Some Future Model");
        assert_eq!(detector().detect(&page).await, "default");
    }
}
