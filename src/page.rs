//! Host page abstraction
//!
//! The rendered page is an unreliable, asynchronously populated external
//! source. [`HostPage`] exposes the handful of read-only queries the engine
//! needs (plus one write: the idempotency marker) and the engine does all of
//! its own waiting through bounded sleeps - the page never emits events.

use std::time::Duration;

/// Marker rendered on the initial login screen.
pub const LOGIN_GOOGLE_MARKER: &str = r#"button[data-testid="login-with-google"]"#;
/// Marker rendered on the verification-code login screen.
pub const LOGIN_CODE_MARKER: &str = r#"input[data-testid="code"]"#;

/// Attribute name used as the cross-injection idempotency marker.
pub const LOADED_MARKER: &str = "data-overlay-loaded";

/// Cookie carrying the organization identifier, readable because it is not
/// HTTP-only.
pub const ORG_COOKIE: &str = "lastActiveOrg";

/// Interval between element probes while waiting.
pub const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Page viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        // Desktop landscape unless a page says otherwise.
        Viewport {
            width: 1280,
            height: 800,
        }
    }
}

/// Read-mostly view of the host page. Queries are synchronous snapshots of
/// whatever the page currently renders; absence is always a legal answer.
pub trait HostPage: Send + Sync {
    /// Whether any element currently matches the selector.
    fn has_element(&self, selector: &str) -> bool;

    /// Visible label text of the matched element, `None` when absent.
    fn element_text(&self, selector: &str) -> Option<String>;

    /// Display text of the currently selected option of a select-style
    /// element, `None` when the element is absent.
    fn selected_option_text(&self, selector: &str) -> Option<String>;

    /// Read a marker attribute from the matched element.
    fn marker(&self, selector: &str, name: &str) -> Option<String>;

    /// Set a marker attribute on the matched element. Returns false when no
    /// element matches.
    fn set_marker(&self, selector: &str, name: &str, value: &str) -> bool;

    /// Current location path, e.g. `/chat/abc-123`.
    fn path(&self) -> String;

    /// Value of a (non HTTP-only) cookie.
    fn cookie(&self, name: &str) -> Option<String>;

    fn viewport(&self) -> Viewport;
}

/// Poll `probe` every [`ELEMENT_POLL_INTERVAL`] until it yields a value or the
/// wait budget is spent. The first probe happens immediately; a page that
/// never produces the element costs the full budget in sleeps, not CPU.
pub async fn wait_for<T>(max_wait: Duration, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let mut elapsed = Duration::ZERO;
    while elapsed < max_wait {
        if let Some(found) = probe() {
            return Some(found);
        }
        tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        elapsed += ELEMENT_POLL_INTERVAL;
    }
    None
}

/// Extract the conversation id from the page path. `None` means the home page
/// with no conversation selected.
pub fn conversation_id(page: &dyn HostPage) -> Option<String> {
    let path = page.path();
    let rest = path.strip_prefix("/chat/")?;
    let id: String = rest
        .chars()
        .take_while(|c| *c != '/' && *c != '?')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Portrait-orientation heuristic, only meaningful inside a conversation.
/// The home page never counts as mobile regardless of viewport.
pub fn is_mobile_view(page: &dyn HostPage) -> bool {
    if !page.path().starts_with("/chat/") {
        return false;
    }
    let viewport = page.viewport();
    viewport.height > viewport.width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakePage;

    #[test]
    fn conversation_id_from_path() {
        let page = FakePage::new();
        page.set_path("/chat/abc-123");
        assert_eq!(conversation_id(&page), Some("abc-123".to_string()));

        page.set_path("/chat/abc-123?tab=files");
        assert_eq!(conversation_id(&page), Some("abc-123".to_string()));

        page.set_path("/chat/abc/extra");
        assert_eq!(conversation_id(&page), Some("abc".to_string()));

        page.set_path("/");
        assert_eq!(conversation_id(&page), None);

        page.set_path("/chat/");
        assert_eq!(conversation_id(&page), None);
    }

    #[test]
    fn mobile_requires_conversation_page() {
        let page = FakePage::new();
        page.set_viewport(400, 800);

        page.set_path("/");
        assert!(!is_mobile_view(&page));

        page.set_path("/chat/abc");
        assert!(is_mobile_view(&page));

        page.set_viewport(800, 400);
        assert!(!is_mobile_view(&page));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_respects_budget() {
        let mut calls = 0u32;
        let found = wait_for(Duration::from_millis(1000), || {
            calls += 1;
            None::<()>
        })
        .await;
        assert!(found.is_none());
        assert_eq!(calls, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_returns_first_hit() {
        let mut calls = 0u32;
        let found = wait_for(Duration::from_millis(1000), || {
            calls += 1;
            (calls == 3).then_some("here")
        })
        .await;
        assert_eq!(found, Some("here"));
        assert_eq!(calls, 3);
    }
}
