//! End-to-end tests for the overlay engine
//!
//! These drive the engine against a scripted page and collaborator: bootstrap
//! guards, the poll loop's conversation handling, and the collaborator
//! message protocol.

use std::time::Duration;

use usage_overlay::background::BackgroundRequest;
use usage_overlay::engine::{EngineMessage, OverlayEngine, ProcessFlag};
use usage_overlay::page::{HostPage, LOADED_MARKER, LOGIN_GOOGLE_MARKER};
use usage_overlay::testkit::{
    sample_page, sample_remote_config, snapshot_for, FakePage, ScriptedBackground,
};

fn leaked_flag() -> &'static ProcessFlag {
    Box::leak(Box::new(ProcessFlag::new()))
}

#[tokio::test(start_paused = true)]
async fn bootstrap_initializes_and_marks_the_anchor() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    background.set_data(snapshot_for("opus", 40_000, Some(3_000)));
    let flag = ProcessFlag::new();

    let engine = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap()
        .expect("first bootstrap should produce an engine");

    assert_eq!(
        page.marker("#user-menu", LOADED_MARKER),
        Some("true".to_string())
    );

    // Initial snapshot flowed through the pipeline.
    assert_eq!(
        engine.pipeline().header().estimate_text,
        "Est. messages left: 20.0"
    );
    assert_eq!(engine.pipeline().current_model(), "opus");

    // Protocol order: config first, then storage reads, then data and org.
    let requests = background.sent_requests();
    assert_eq!(requests[0], BackgroundRequest::GetConfig);
    assert!(requests.contains(&BackgroundRequest::GetCollapsedState));
    assert!(requests.contains(&BackgroundRequest::GetPreviousVersion));
    assert_eq!(
        requests[requests.len() - 2],
        BackgroundRequest::RequestData {
            conversation_id: None
        }
    );
    assert_eq!(requests[requests.len() - 1], BackgroundRequest::InitOrg);
}

#[tokio::test(start_paused = true)]
async fn every_envelope_is_enriched_with_the_org_cookie() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    OverlayEngine::bootstrap(page, background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    let envelopes = background.sent_envelopes();
    assert!(!envelopes.is_empty());
    for envelope in envelopes {
        assert_eq!(envelope.org_id.as_deref(), Some("org_test"));
    }
}

#[tokio::test(start_paused = true)]
async fn second_bootstrap_in_the_same_context_is_a_silent_no_op() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let first = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap();
    assert!(first.is_some());

    let requests_after_first = background.sent_requests().len();
    let second = OverlayEngine::bootstrap(page, background.clone(), &flag)
        .await
        .unwrap();
    assert!(second.is_none());
    // The duplicate sent nothing, not even getConfig.
    assert_eq!(background.sent_requests().len(), requests_after_first);
}

#[tokio::test(start_paused = true)]
async fn independent_injection_is_stopped_by_the_page_marker() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());

    // Two process flags model two independent script contexts sharing a page.
    let first = OverlayEngine::bootstrap(page.clone(), background.clone(), &ProcessFlag::new())
        .await
        .unwrap();
    assert!(first.is_some());

    let second = OverlayEngine::bootstrap(page, background, &ProcessFlag::new())
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test(start_paused = true)]
async fn bootstrap_fails_fatally_without_anchor_or_login_screen() {
    let page = FakePage::new(); // no user menu, no login markers
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let result = OverlayEngine::bootstrap(page, background, &flag).await;
    let err = result.expect_err("bootstrap must fail fatally");
    assert!(err.to_string().contains("login screen"));
}

#[tokio::test(start_paused = true)]
async fn bootstrap_waits_out_the_login_screen() {
    let page = FakePage::new();
    page.add_element(LOGIN_GOOGLE_MARKER);
    page.set_element_text("#model-picker", "Claude Opus 4");
    page.set_cookie("lastActiveOrg", "org_test");

    let background = ScriptedBackground::new(sample_remote_config());
    let flag = leaked_flag();

    let handle = tokio::spawn(OverlayEngine::bootstrap(page.clone(), background, flag));

    // Still on the login screen after the first search round.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    // The user authenticates; the next search round finds the anchor.
    page.add_element("#user-menu");
    let engine = handle.await.unwrap().unwrap();
    assert!(engine.is_some());
}

#[tokio::test(start_paused = true)]
async fn conversation_change_fetches_before_adopting_the_id() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let mut engine = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    background.set_conversation_data("conv-1", snapshot_for("opus", 40_000, Some(3_000)));
    page.set_path("/chat/conv-1");
    engine.poll_tick().await.unwrap();

    assert_eq!(engine.current_conversation(), Some("conv-1"));
    assert_eq!(
        engine.pipeline().header().estimate_text,
        "Est. messages left: 20.0"
    );
    assert_eq!(
        engine.pipeline().header().cost_text,
        "Current cost: 3,000 tokens"
    );
    assert!(background
        .sent_requests()
        .contains(&BackgroundRequest::RequestData {
            conversation_id: Some("conv-1".to_string())
        }));

    // Same conversation on the next tick: no second fetch.
    let fetches_before = background
        .sent_requests()
        .iter()
        .filter(|r| matches!(r, BackgroundRequest::RequestData { .. }))
        .count();
    engine.poll_tick().await.unwrap();
    let fetches_after = background
        .sent_requests()
        .iter()
        .filter(|r| matches!(r, BackgroundRequest::RequestData { .. }))
        .count();
    assert_eq!(fetches_before, fetches_after);
}

#[tokio::test(start_paused = true)]
async fn returning_home_forces_the_header_literals() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let mut engine = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    background.set_conversation_data("conv-1", snapshot_for("opus", 40_000, Some(3_000)));
    page.set_path("/chat/conv-1");
    engine.poll_tick().await.unwrap();
    assert_eq!(
        engine.pipeline().header().estimate_text,
        "Est. messages left: 20.0"
    );

    page.set_path("/");
    engine.poll_tick().await.unwrap();
    assert_eq!(
        engine.pipeline().header().estimate_text,
        "Est. messages left: N/A"
    );
    assert_eq!(
        engine.pipeline().header().cost_text,
        "Current cost: N/A tokens"
    );

    // Inactive sections are visible but collapsed on the home page.
    let sonnet = engine.pipeline().section("sonnet").unwrap();
    assert!(sonnet.visible);
    assert!(sonnet.is_collapsed);
}

#[tokio::test(start_paused = true)]
async fn portrait_viewport_hides_inactive_sections_in_conversations() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let mut engine = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    page.set_path("/chat/conv-1");
    page.set_viewport(400, 800);
    engine.poll_tick().await.unwrap();

    let opus = engine.pipeline().section("opus").unwrap();
    let sonnet = engine.pipeline().section("sonnet").unwrap();
    assert!(opus.is_active);
    assert!(opus.visible);
    assert!(!sonnet.visible);
}

#[tokio::test(start_paused = true)]
async fn collaborator_messages_are_answered() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    let flag = ProcessFlag::new();

    let mut engine = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    engine
        .handle_message(EngineMessage::GetActiveModel(tx))
        .await;
    assert_eq!(rx.await.unwrap(), "opus");

    let (tx, rx) = tokio::sync::oneshot::channel();
    engine.handle_message(EngineMessage::GetOrgId(tx)).await;
    assert_eq!(rx.await.unwrap(), Some("org_test".to_string()));

    engine
        .handle_message(EngineMessage::UpdateUsage(snapshot_for(
            "opus",
            90_000,
            Some(1_000),
        )))
        .await;
    assert_eq!(
        engine.pipeline().header().estimate_text,
        "Est. messages left: 10.0"
    );
}

#[tokio::test(start_paused = true)]
async fn collapsed_toggle_round_trips_through_the_collaborator() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    background.set_collapsed(false);
    let flag = ProcessFlag::new();

    let mut engine = OverlayEngine::bootstrap(page, background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();
    assert!(!engine.is_collapsed());

    engine.toggle_collapsed().await.unwrap();
    assert!(engine.is_collapsed());
    assert!(background.stored_collapsed());

    engine.toggle_collapsed().await.unwrap();
    assert!(!background.stored_collapsed());
}

#[tokio::test(start_paused = true)]
async fn version_check_advances_the_persisted_marker() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    background.set_previous_version(Some("0.9.0"));
    let flag = ProcessFlag::new();

    let engine = OverlayEngine::bootstrap(page, background.clone(), &flag)
        .await
        .unwrap()
        .unwrap();

    let notice = engine.version_notice().expect("versions differ");
    assert_eq!(notice.previous.as_deref(), Some("0.9.0"));
    assert_eq!(notice.current, env!("CARGO_PKG_VERSION"));
    assert_eq!(
        background.stored_version().as_deref(),
        Some(env!("CARGO_PKG_VERSION"))
    );
}

#[tokio::test(start_paused = true)]
async fn matching_version_produces_no_notice() {
    let page = sample_page();
    let background = ScriptedBackground::new(sample_remote_config());
    background.set_previous_version(Some(env!("CARGO_PKG_VERSION")));
    let flag = ProcessFlag::new();

    let engine = OverlayEngine::bootstrap(page, background, &flag)
        .await
        .unwrap()
        .unwrap();
    assert!(engine.version_notice().is_none());
}
