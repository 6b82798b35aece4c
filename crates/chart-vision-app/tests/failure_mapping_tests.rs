//! Integration tests for request failure mapping at the action boundary.

mod common;

use std::sync::Arc;

use chart_vision_app::{AnalysisFailure, AnalyzeOutcome};
use chart_vision_auth::{
    BootstrapState, Credential, CredentialStrategy, FIXED_KEY_REJECTED_MESSAGE,
    MemoryCredentialStore,
};
use chart_vision_request::{
    INVALID_CREDENTIAL_MESSAGE, MALFORMED_RESPONSE_MESSAGE, RATE_LIMITED_MESSAGE,
};
use chart_vision_ui::{ResultsPanel, Screen, UiCredentialState};
use common::{
    ScriptedPicker, ScriptedTransport, chart_file, env_strategy, error_envelope,
    persisted_strategy, started_app, success_envelope,
};

fn permission_denied() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new(
        403,
        error_envelope(403, "PERMISSION_DENIED", "Requested entity was not found."),
    ))
}

fn error_message(panel: ResultsPanel) -> String {
    match panel {
        ResultsPanel::Error { message } => message,
        other => panic!("expected error panel, got {other:?}"),
    }
}

#[test]
fn failure_mapping_tests_rate_limit_maps_to_fixed_message() {
    let transport = Arc::new(ScriptedTransport::new(
        429,
        error_envelope(429, "RESOURCE_EXHAUSTED", "Quota exceeded"),
    ));
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());

    assert_eq!(
        app.analyze(),
        AnalyzeOutcome::Failed(AnalysisFailure::RateLimited)
    );
    assert_eq!(error_message(app.results_panel()), RATE_LIMITED_MESSAGE);
    assert!(app.session().analysis.is_none());
    assert!(!app.session().is_loading);
}

#[test]
fn failure_mapping_tests_missing_field_is_malformed() {
    let partial = serde_json::json!({
        "candlePatterns": [],
        "marketContext": "",
        "supportResistance": "Levels.",
        "momentumSentiment": { "description": "d", "summary": "Bullish" }
    })
    .to_string();
    let transport = Arc::new(ScriptedTransport::new(200, success_envelope(&partial)));
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());

    assert_eq!(
        app.analyze(),
        AnalyzeOutcome::Failed(AnalysisFailure::MalformedResponse)
    );
    assert_eq!(error_message(app.results_panel()), MALFORMED_RESPONSE_MESSAGE);
}

#[test]
fn failure_mapping_tests_other_api_errors_pass_message_through() {
    let transport = Arc::new(ScriptedTransport::new(
        500,
        error_envelope(500, "INTERNAL", "Internal error encountered."),
    ));
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());

    assert_eq!(app.analyze(), AnalyzeOutcome::Failed(AnalysisFailure::Other));
    assert_eq!(
        error_message(app.results_panel()),
        "Internal error encountered."
    );
}

#[test]
fn failure_mapping_tests_environment_key_stays_ready_on_rejection() {
    let mut app = started_app(env_strategy(), permission_denied());
    app.select_file(chart_file());

    assert_eq!(
        app.analyze(),
        AnalyzeOutcome::Failed(AnalysisFailure::InvalidCredential)
    );
    assert_eq!(app.bootstrap().state(), BootstrapState::Ready);
    assert_eq!(app.screen(), Screen::Main);
    assert_eq!(error_message(app.results_panel()), INVALID_CREDENTIAL_MESSAGE);
}

#[test]
fn failure_mapping_tests_picker_key_rejection_requires_reselect() {
    let picker = Arc::new(ScriptedPicker::new(Some("picked-key"), true));
    let mut app = started_app(CredentialStrategy::HostPicker(picker), permission_denied());
    assert_eq!(app.screen(), Screen::Main);
    app.select_file(chart_file());

    app.analyze();
    assert_eq!(app.session().credential, UiCredentialState::Missing);
    assert!(matches!(app.screen(), Screen::Credential(_)));
}

#[test]
fn failure_mapping_tests_persisted_key_rejection_deletes_saved_key() {
    let store = Arc::new(MemoryCredentialStore::with_value("stale-key"));
    let mut app = started_app(persisted_strategy(Arc::clone(&store)), permission_denied());
    assert_eq!(app.screen(), Screen::Main);
    app.select_file(chart_file());

    app.analyze();
    assert_eq!(app.bootstrap().state(), BootstrapState::Missing);
    assert!(store.snapshot().is_none());
    assert!(matches!(app.screen(), Screen::Credential(_)));
}

#[test]
fn failure_mapping_tests_fixed_key_rejection_is_configuration_error() {
    let strategy = CredentialStrategy::Fixed(Credential::new("baked-key").expect("valid key"));
    let mut app = started_app(strategy, permission_denied());
    app.select_file(chart_file());

    app.analyze();
    assert_eq!(error_message(app.results_panel()), FIXED_KEY_REJECTED_MESSAGE);
    let Screen::Credential(prompt) = app.screen() else {
        panic!("expected credential screen");
    };
    assert_eq!(
        prompt.configuration_error.as_deref(),
        Some(FIXED_KEY_REJECTED_MESSAGE)
    );
}
