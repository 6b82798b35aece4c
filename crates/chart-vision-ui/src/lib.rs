#![warn(missing_docs)]
//! # chart-vision-ui
//!
//! ## Purpose
//! Defines the UI-facing session model and the results view for
//! `chart-vision`.
//!
//! ## Responsibilities
//! - Hold transient session state: selection, result, loading, error,
//!   credential readiness.
//! - Expose the analyze-control predicate.
//! - Project session state into the results panel and an analysis result into
//!   a toned results view.
//! - Render panels and credential prompts as plain text.
//!
//! ## Data flow
//! App actions mutate [`SessionState`] -> [`SessionState::results_panel`] ->
//! [`render_panel_text`] in the terminal shell.
//!
//! ## Ownership and lifetimes
//! `SessionState` owns all strings and the current result, so reducers never
//! borrow from request buffers.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Errors arrive as
//! already user-readable messages.
//!
//! ## Security and privacy notes
//! UI state intentionally excludes secrets (keys) and image bytes.

use chart_vision_analysis_contract::{AnalysisResult, Tone, sentiment_tone};

/// Text shown when no pattern was detected.
pub const NO_PATTERNS_MESSAGE: &str = "No significant patterns detected in the recent price action.";

/// UI projection of the credential bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCredentialState {
    /// Startup check running.
    Checking,
    /// No usable key.
    Missing,
    /// Key available.
    Ready,
}

/// How the credential screen collects a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEntryMode {
    /// Free-text entry persisted locally.
    Manual,
    /// Host picker button.
    Picker,
    /// No interactive entry (environment or fixed key).
    Unavailable,
}

/// UI-safe description of the selected image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    /// File name.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Preview resource URL.
    pub preview_url: String,
}

/// Aggregate session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Credential bootstrap projection.
    pub credential: UiCredentialState,
    /// Current selection.
    pub selected: Option<SelectedImage>,
    /// Last successful analysis.
    pub analysis: Option<AnalysisResult>,
    /// Whether a request is outstanding.
    pub is_loading: bool,
    /// Last user-readable failure.
    pub error: Option<String>,
}

impl SessionState {
    /// Creates empty session state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            credential: UiCredentialState::Checking,
            selected: None,
            analysis: None,
            is_loading: false,
            error: None,
        }
    }

    /// Returns `true` when the main UI may be shown.
    pub fn credential_ready(&self) -> bool {
        self.credential == UiCredentialState::Ready
    }

    /// Adopts a new selection and discards the previous outcome.
    pub fn select_image(&mut self, image: SelectedImage) {
        self.selected = Some(image);
        self.analysis = None;
        self.error = None;
    }

    /// Clears selection, outcome and loading flag.
    pub fn reset(&mut self) {
        self.selected = None;
        self.analysis = None;
        self.error = None;
        self.is_loading = false;
    }

    /// Analyze control is disabled with no file or while loading.
    pub fn analyze_disabled(&self) -> bool {
        self.selected.is_none() || self.is_loading
    }

    /// Enters loading state. Returns `false` when the control is disabled.
    pub fn begin_analysis(&mut self) -> bool {
        if self.analyze_disabled() {
            return false;
        }
        self.is_loading = true;
        self.error = None;
        self.analysis = None;
        true
    }

    /// Stores a successful result.
    pub fn complete_analysis(&mut self, result: AnalysisResult) {
        self.analysis = Some(result);
        self.error = None;
        self.is_loading = false;
    }

    /// Stores a failure message.
    pub fn fail_analysis(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.analysis = None;
        self.is_loading = false;
    }

    /// Projects the results panel.
    pub fn results_panel(&self) -> ResultsPanel {
        if self.is_loading {
            return ResultsPanel::Loading;
        }
        if let Some(message) = &self.error {
            return ResultsPanel::Error {
                message: message.clone(),
            };
        }
        match &self.analysis {
            Some(result) => ResultsPanel::Populated(render_results(result)),
            None => ResultsPanel::Empty,
        }
    }

    /// Projects the top-level screen.
    pub fn screen(&self, prompt: CredentialPrompt) -> Screen {
        match self.credential {
            UiCredentialState::Checking => Screen::Loading,
            UiCredentialState::Missing => Screen::Credential(prompt),
            UiCredentialState::Ready => Screen::Main,
        }
    }
}

/// Inputs for the credential screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPrompt {
    /// Entry style for the active strategy.
    pub mode: KeyEntryMode,
    /// Last validation message.
    pub validation_error: Option<String>,
    /// Configuration problem that blocks entry.
    pub configuration_error: Option<String>,
}

/// Top-level screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Credential check running.
    Loading,
    /// Credential entry, selection or configuration error.
    Credential(CredentialPrompt),
    /// Uploader and results.
    Main,
}

/// Results panel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsPanel {
    /// Request outstanding.
    Loading,
    /// Last request failed.
    Error {
        /// User-readable failure.
        message: String,
    },
    /// Nothing analyzed yet.
    Empty,
    /// Analysis available.
    Populated(ResultsView),
}

/// Banner showing the overall momentum summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentimentBanner {
    /// Summary label as reported.
    pub label: String,
    /// Display tone.
    pub tone: Tone,
}

/// One pattern tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTag {
    /// Pattern name.
    pub name: String,
    /// `Confidence: <level>` caption.
    pub caption: String,
    /// Display tone.
    pub tone: Tone,
}

/// Titled descriptive block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCard {
    /// Card title.
    pub title: &'static str,
    /// Body lines.
    pub lines: Vec<String>,
}

/// Rendered analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsView {
    /// Momentum summary banner.
    pub summary: SentimentBanner,
    /// One tag per detected pattern.
    pub pattern_tags: Vec<PatternTag>,
    /// Fallback text when there are no tags.
    pub patterns_fallback: Option<&'static str>,
    /// Market context, levels and momentum cards.
    pub cards: Vec<ResultCard>,
    /// Trade suggestion card, only when the result has one.
    pub trade_suggestion: Option<ResultCard>,
}

/// Projects an analysis result into a results view.
pub fn render_results(result: &AnalysisResult) -> ResultsView {
    let summary_label = result.momentum_sentiment.summary.as_str();
    let pattern_tags: Vec<PatternTag> = result
        .candle_patterns
        .iter()
        .map(|pattern| PatternTag {
            name: pattern.name.clone(),
            caption: format!("Confidence: {}", pattern.confidence.as_str()),
            tone: sentiment_tone(pattern.sentiment.as_str()),
        })
        .collect();
    let patterns_fallback = pattern_tags.is_empty().then_some(NO_PATTERNS_MESSAGE);

    let cards = vec![
        ResultCard {
            title: "Market Context",
            lines: vec![result.market_context.clone()],
        },
        ResultCard {
            title: "Support & Resistance",
            lines: vec![result.support_resistance.clone()],
        },
        ResultCard {
            title: "Momentum",
            lines: vec![result.momentum_sentiment.description.clone()],
        },
    ];

    let trade_suggestion = result.trade_suggestion.as_ref().map(|trade| ResultCard {
        title: "Trade Suggestion",
        lines: vec![
            format!("Strategy: {}", trade.strategy),
            format!("Entry: {}", trade.entry),
            format!("Stop Loss: {}", trade.stop_loss),
            format!("Exit: {}", trade.exit),
        ],
    });

    ResultsView {
        summary: SentimentBanner {
            label: summary_label.to_string(),
            tone: sentiment_tone(summary_label),
        },
        pattern_tags,
        patterns_fallback,
        cards,
        trade_suggestion,
    }
}

fn tone_marker(tone: Tone) -> &'static str {
    match tone {
        Tone::Bullish => "[+]",
        Tone::Bearish => "[-]",
        Tone::Neutral => "[=]",
    }
}

/// Renders a results panel as terminal text.
pub fn render_panel_text(panel: &ResultsPanel) -> String {
    match panel {
        ResultsPanel::Loading => "Analyzing chart...\nThis may take a moment.\n".to_string(),
        ResultsPanel::Error { message } => format!("Analysis Failed\n{message}\n"),
        ResultsPanel::Empty => {
            "Awaiting Analysis\nUpload a chart screenshot and click \"Analyze Chart\" to see the AI-powered insights here.\n"
                .to_string()
        }
        ResultsPanel::Populated(view) => render_view_text(view),
    }
}

fn render_view_text(view: &ResultsView) -> String {
    let mut lines = vec![
        "Sentiment Summary".to_string(),
        format!("  {} {}", tone_marker(view.summary.tone), view.summary.label),
        String::new(),
        "Candlestick Patterns".to_string(),
    ];
    lines.extend(
        view.pattern_tags
            .iter()
            .map(|tag| format!("  {} {} ({})", tone_marker(tag.tone), tag.name, tag.caption)),
    );
    lines.extend(view.patterns_fallback.map(|fallback| format!("  {fallback}")));

    for card in view.cards.iter().chain(view.trade_suggestion.as_ref()) {
        lines.push(String::new());
        lines.push(card.title.to_string());
        lines.extend(card.lines.iter().map(|line| format!("  {line}")));
    }
    terminate_lines(lines)
}

/// Renders the credential screen as terminal text.
pub fn render_credential_prompt_text(prompt: &CredentialPrompt) -> String {
    if let Some(problem) = &prompt.configuration_error {
        return format!("Configuration Error\n{problem}\n");
    }

    let instruction = match prompt.mode {
        KeyEntryMode::Manual => "Enter your API key to continue.",
        KeyEntryMode::Picker => "Select an API key to continue.",
        KeyEntryMode::Unavailable => "No API key is available in this configuration.",
    };
    let mut lines = vec![
        "Welcome to Chart Vision AI".to_string(),
        "To perform analysis, this application requires a Google AI API key.".to_string(),
        instruction.to_string(),
    ];
    lines.extend(prompt.validation_error.clone());
    terminate_lines(lines)
}

fn terminate_lines(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}
