//! Integration tests for credential bootstrap through the app controller.

mod common;

use std::sync::Arc;

use chart_vision_app::{AnalysisFailure, AnalyzeOutcome, AppError, MISSING_ENV_KEY_MESSAGE};
use chart_vision_auth::{
    AuthError, CredentialStrategy, EMPTY_KEY_MESSAGE, MemoryCredentialStore,
};
use chart_vision_ui::{KeyEntryMode, ResultsPanel, Screen, UiCredentialState};
use common::{ScriptedPicker, ScriptedTransport, chart_file, persisted_strategy, started_app};

#[test]
fn credential_bootstrap_tests_blank_entry_stays_missing_with_message() {
    let store = Arc::new(MemoryCredentialStore::new());
    let mut app = started_app(
        persisted_strategy(Arc::clone(&store)),
        Arc::new(ScriptedTransport::doji()),
    );
    assert_eq!(app.session().credential, UiCredentialState::Missing);

    let error = app.save_api_key("   ").expect_err("blank key is rejected");
    assert!(matches!(error, AppError::Auth(AuthError::EmptyCredential)));

    let Screen::Credential(prompt) = app.screen() else {
        panic!("expected credential screen");
    };
    assert_eq!(prompt.mode, KeyEntryMode::Manual);
    assert_eq!(prompt.validation_error.as_deref(), Some(EMPTY_KEY_MESSAGE));
    assert!(store.snapshot().is_none());
}

#[test]
fn credential_bootstrap_tests_saved_key_unlocks_main_and_is_sent() {
    let store = Arc::new(MemoryCredentialStore::new());
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(persisted_strategy(Arc::clone(&store)), Arc::clone(&transport));

    app.save_api_key("  user-key  ").expect("key saves");
    assert_eq!(app.screen(), Screen::Main);
    assert_eq!(store.snapshot().as_deref(), Some("user-key"));

    app.select_file(chart_file());
    assert_eq!(app.analyze(), AnalyzeOutcome::Completed);
    assert_eq!(transport.calls()[0].1, "user-key");
}

#[test]
fn credential_bootstrap_tests_clear_returns_to_entry_screen() {
    let store = Arc::new(MemoryCredentialStore::with_value("saved"));
    let mut app = started_app(
        persisted_strategy(Arc::clone(&store)),
        Arc::new(ScriptedTransport::doji()),
    );
    assert_eq!(app.screen(), Screen::Main);

    app.clear_api_key().expect("clear succeeds");
    assert!(matches!(app.screen(), Screen::Credential(_)));
    assert!(store.snapshot().is_none());
}

#[test]
fn credential_bootstrap_tests_picker_selection_is_confirmed_after_dialog() {
    let picker = Arc::new(ScriptedPicker::new(Some("picked-key"), false));
    let mut app = started_app(
        CredentialStrategy::HostPicker(picker),
        Arc::new(ScriptedTransport::doji()),
    );
    let Screen::Credential(prompt) = app.screen() else {
        panic!("expected credential screen");
    };
    assert_eq!(prompt.mode, KeyEntryMode::Picker);

    app.select_api_key().expect("picker opens");
    assert_eq!(app.screen(), Screen::Main);
}

#[test]
fn credential_bootstrap_tests_dismissed_picker_stays_missing() {
    let picker = Arc::new(ScriptedPicker::new(None, false));
    let mut app = started_app(
        CredentialStrategy::HostPicker(picker),
        Arc::new(ScriptedTransport::doji()),
    );

    app.select_api_key().expect("picker opens");
    assert_eq!(app.session().credential, UiCredentialState::Missing);
}

#[test]
fn credential_bootstrap_tests_environment_without_key_fails_inline() {
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(CredentialStrategy::Environment(None), Arc::clone(&transport));
    assert_eq!(app.screen(), Screen::Main);

    app.select_file(chart_file());
    assert_eq!(
        app.analyze(),
        AnalyzeOutcome::Failed(AnalysisFailure::InvalidCredential)
    );
    assert_eq!(
        app.results_panel(),
        ResultsPanel::Error {
            message: MISSING_ENV_KEY_MESSAGE.to_string()
        }
    );
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn credential_bootstrap_tests_manual_actions_rejected_for_environment() {
    let mut app = started_app(
        CredentialStrategy::Environment(None),
        Arc::new(ScriptedTransport::doji()),
    );
    assert!(matches!(
        app.save_api_key("key"),
        Err(AppError::Auth(AuthError::UnsupportedAction { .. }))
    ));
    assert!(matches!(
        app.select_api_key(),
        Err(AppError::Auth(AuthError::UnsupportedAction { .. }))
    ));
}
