//! Integration tests for the select-analyze-render flow.

mod common;

use std::sync::Arc;

use chart_vision_analysis_contract::{MomentumSummary, Tone};
use chart_vision_app::AnalyzeOutcome;
use chart_vision_request::API_KEY_HEADER;
use chart_vision_ui::{NO_PATTERNS_MESSAGE, ResultsPanel, Screen, render_panel_text};
use common::{
    CHART_BYTES, ScriptedTransport, chart_file, env_strategy, started_app, success_envelope,
};

#[test]
fn analysis_flow_tests_doji_chart_populates_results() {
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(env_strategy(), Arc::clone(&transport));
    assert_eq!(app.screen(), Screen::Main);

    assert!(app.select_file(chart_file()));
    assert_eq!(app.analyze(), AnalyzeOutcome::Completed);

    let ResultsPanel::Populated(view) = app.results_panel() else {
        panic!("expected populated panel");
    };
    assert_eq!(view.summary.label, "Neutral");
    assert_eq!(view.summary.tone, Tone::Neutral);
    assert_eq!(view.pattern_tags.len(), 1);
    assert_eq!(view.pattern_tags[0].name, "Doji");
    assert_eq!(view.pattern_tags[0].caption, "Confidence: Medium");
    assert!(view.patterns_fallback.is_none());

    let session = app.session();
    assert!(!session.is_loading);
    assert!(session.error.is_none());
    assert_eq!(
        session
            .analysis
            .as_ref()
            .map(|result| result.momentum_sentiment.summary.clone()),
        Some(MomentumSummary::Neutral)
    );
}

#[test]
fn analysis_flow_tests_request_carries_image_and_key() {
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(env_strategy(), Arc::clone(&transport));
    app.select_file(chart_file());
    app.analyze();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    let (url, key, request) = &calls[0];
    assert!(url.ends_with("/v1beta/models/gemini-2.5-flash:generateContent"));
    assert_eq!(key, "env-key");
    assert_eq!(API_KEY_HEADER, "x-goog-api-key");

    let parts = &request.contents[0].parts;
    let inline = parts[0].inline_data.as_ref().expect("image part first");
    assert_eq!(inline.mime_type, "image/png");
    let decoded = chart_vision_core::ImagePayload {
        data: inline.data.clone(),
        mime_type: inline.mime_type.clone(),
    }
    .decode()
    .expect("valid base64");
    assert_eq!(decoded, CHART_BYTES);
    assert!(parts[1].text.as_deref().is_some_and(|text| !text.is_empty()));
    assert_eq!(request.generation_config.response_mime_type, "application/json");
}

#[test]
fn analysis_flow_tests_empty_pattern_list_shows_fallback() {
    let analysis = serde_json::json!({
        "candlePatterns": [],
        "marketContext": "Flat.",
        "supportResistance": "None.",
        "momentumSentiment": { "description": "Quiet.", "summary": "Reversal Likely" }
    })
    .to_string();
    let transport = Arc::new(ScriptedTransport::new(200, success_envelope(&analysis)));
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());
    assert_eq!(app.analyze(), AnalyzeOutcome::Completed);

    let panel = app.results_panel();
    let ResultsPanel::Populated(view) = &panel else {
        panic!("expected populated panel");
    };
    assert!(view.pattern_tags.is_empty());
    assert_eq!(view.patterns_fallback, Some(NO_PATTERNS_MESSAGE));
    assert_eq!(view.summary.tone, Tone::Neutral);
    assert!(render_panel_text(&panel).contains(NO_PATTERNS_MESSAGE));
}

#[test]
fn analysis_flow_tests_new_selection_clears_previous_result() {
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());
    app.analyze();
    assert!(app.session().analysis.is_some());

    assert!(app.select_file(chart_file()));
    assert!(app.session().analysis.is_none());
    assert_eq!(app.results_panel(), ResultsPanel::Empty);
}

#[test]
fn analysis_flow_tests_remove_image_resets_session() {
    let transport = Arc::new(ScriptedTransport::doji());
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());
    app.analyze();

    app.remove_image();
    assert!(app.session().selected.is_none());
    assert!(app.session().analysis.is_none());
    assert!(app.uploader().current().is_none());
    assert_eq!(app.uploader().previews().live_count(), 0);
    assert!(app.analyze_disabled());
}

#[test]
fn analysis_flow_tests_shows_at_most_three_pattern_tags() {
    let pattern = |name: &str| {
        serde_json::json!({ "name": name, "sentiment": "BULLISH", "confidence": "high" })
    };
    let analysis = serde_json::json!({
        "candlePatterns": [
            pattern("Hammer"),
            pattern("Morning Star"),
            pattern("Bullish Engulfing"),
            pattern("Three White Soldiers")
        ],
        "marketContext": "Rebound off the range low.",
        "supportResistance": "Demand near 100.",
        "momentumSentiment": { "description": "Buyers stepping in.", "summary": "bullish" }
    })
    .to_string();
    let transport = Arc::new(ScriptedTransport::new(200, success_envelope(&analysis)));
    let mut app = started_app(env_strategy(), transport);
    app.select_file(chart_file());
    assert_eq!(app.analyze(), AnalyzeOutcome::Completed);

    let ResultsPanel::Populated(view) = app.results_panel() else {
        panic!("expected populated panel");
    };
    let names: Vec<&str> = view.pattern_tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, ["Hammer", "Morning Star", "Bullish Engulfing"]);
    assert!(view.pattern_tags.iter().all(|tag| tag.tone == Tone::Bullish));
    assert_eq!(view.pattern_tags[0].caption, "Confidence: High");
    assert_eq!(view.summary.label, "Bullish");
}
