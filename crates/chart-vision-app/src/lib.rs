#![warn(missing_docs)]
//! # chart-vision-app
//!
//! ## Purpose
//! Orchestrates credential bootstrap, image intake, model requests and UI
//! state for `chart-vision`.
//!
//! ## Responsibilities
//! - Resolve [`AppConfig`] from the environment.
//! - Build the configured credential strategy and analysis client.
//! - Run user actions through [`ChartVisionApp`]: select/drop/remove image,
//!   analyze, enter/select/clear key.
//! - Map request failures to inline messages and credential resets.
//! - Provide log redaction and version display.
//!
//! ## Data flow
//! Config -> credential bootstrap -> uploader selection -> analyze action ->
//! encoder -> request service -> session state -> results panel.
//!
//! ## Ownership and lifetimes
//! The controller owns session, uploader and bootstrap state. Transports,
//! stores, pickers and image sources are shared `Arc` trait objects.
//!
//! ## Error model
//! Setup and credential actions return [`AppError`]. The analyze action never
//! fails: every error becomes an inline message and an [`AnalyzeOutcome`].
//!
//! ## Security and privacy notes
//! - Keys are never logged; [`redact_sensitive`] scrubs free-form messages.
//! - Image bytes are read only inside the analyze action.

use std::io::{BufRead, BufReader, Stdin, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chart_vision_auth::{
    AuthError, BootstrapState, Credential, CredentialBootstrap, CredentialStrategy,
    FileCredentialStore, KeyPicker, StrategyKind,
};
use chart_vision_analysis_contract::ContractVariant;
use chart_vision_core::{CoreError, ImageFile};
use chart_vision_intake::{ImageSource, ImageUploader, IntakeError, encode_image};
use chart_vision_request::{
    AnalysisClient, FailureClass, INVALID_CREDENTIAL_MESSAGE, ModelConfig, ModelTransport,
    RequestError, classify_request_error,
};
use chart_vision_ui::{
    CredentialPrompt, KeyEntryMode, ResultsPanel, Screen, SelectedImage, SessionState,
    UiCredentialState,
};
use thiserror::Error;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("CHART_VISION_VERSION");

/// Build-time key for the fixed strategy, when provided.
pub const BUILD_FIXED_API_KEY: Option<&str> = option_env!("CHART_VISION_FIXED_API_KEY");

/// Inline message when the environment strategy has no key at all.
pub const MISSING_ENV_KEY_MESSAGE: &str =
    "No API key is configured. Set CHART_VISION_API_KEY and restart.";

const SECRET_MARKERS: [&str; 7] = [
    "x-goog-api-key",
    "api_key",
    "key=",
    "password",
    "token",
    "authorization",
    "bearer",
];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Credential strategy.
    pub key_strategy: StrategyKind,
    /// Key for the environment strategy.
    pub api_key: Option<String>,
    /// Key for the fixed strategy.
    pub fixed_api_key: Option<String>,
    /// Key file for the persisted strategy.
    pub key_file: PathBuf,
    /// Model identifier.
    pub model: String,
    /// Model API host.
    pub base_url: String,
    /// Request the trade-suggestion contract variant.
    pub trade_suggestion: bool,
}

impl AppConfig {
    /// Resolves config from process environment.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for an unknown key strategy.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves config through `lookup`.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for an unknown key strategy.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let key_strategy = match non_empty("CHART_VISION_KEY_STRATEGY") {
            Some(raw) => StrategyKind::parse(&raw).ok_or_else(|| {
                AppError::Config(format!(
                    "unknown key strategy '{raw}' (expected environment, picker, persisted or fixed)"
                ))
            })?,
            None => StrategyKind::Environment,
        };

        let key_file = non_empty("CHART_VISION_KEY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = non_empty("HOME").map(PathBuf::from).unwrap_or_default();
                home.join(".chart-vision").join("api_key")
            });

        Ok(Self {
            key_strategy,
            api_key: non_empty("CHART_VISION_API_KEY").or_else(|| non_empty("API_KEY")),
            fixed_api_key: BUILD_FIXED_API_KEY
                .map(str::to_string)
                .or_else(|| non_empty("CHART_VISION_FIXED_API_KEY")),
            key_file,
            model: non_empty("CHART_VISION_MODEL")
                .unwrap_or_else(|| chart_vision_request::DEFAULT_MODEL.to_string()),
            base_url: non_empty("CHART_VISION_BASE_URL")
                .unwrap_or_else(|| chart_vision_request::DEFAULT_BASE_URL.to_string()),
            trade_suggestion: non_empty("CHART_VISION_TRADE_SUGGESTION")
                .map(|raw| flag_enabled(&raw))
                .unwrap_or(false),
        })
    }

    /// Returns the request-layer config.
    pub fn model_config(&self) -> ModelConfig {
        let variant = if self.trade_suggestion {
            ContractVariant::WithTradeSuggestion
        } else {
            ContractVariant::Standard
        };
        ModelConfig::new()
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone())
            .with_variant(variant)
    }

    /// Builds the configured credential strategy.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] when the picker strategy has no picker or
    /// the fixed strategy has no key.
    pub fn credential_strategy(
        &self,
        picker: Option<Arc<dyn KeyPicker>>,
    ) -> Result<CredentialStrategy, AppError> {
        match self.key_strategy {
            StrategyKind::Environment => Ok(CredentialStrategy::Environment(
                self.api_key
                    .as_deref()
                    .and_then(|raw| Credential::new(raw).ok()),
            )),
            StrategyKind::HostPicker => picker.map(CredentialStrategy::HostPicker).ok_or_else(|| {
                AppError::Config("picker key strategy requires a key picker".to_string())
            }),
            StrategyKind::Persisted => Ok(CredentialStrategy::Persisted(Arc::new(
                FileCredentialStore::new(self.key_file.clone()),
            ))),
            StrategyKind::Fixed => self
                .fixed_api_key
                .as_deref()
                .and_then(|raw| Credential::new(raw).ok())
                .map(CredentialStrategy::Fixed)
                .ok_or_else(|| {
                    AppError::Config(
                        "fixed key strategy requires CHART_VISION_FIXED_API_KEY".to_string(),
                    )
                }),
        }
    }
}

/// Reads one line of interactive input without its line terminator.
///
/// # Errors
/// Returns [`AppError::Input`] when the reader fails.
pub fn read_line_from(input: &mut impl BufRead) -> Result<String, AppError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Interprets `1/true/on/yes` (case-insensitive) as enabled.
pub fn flag_enabled(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Key picker that asks for a key on an interactive prompt.
///
/// The chosen key lives only as long as the picker.
pub struct PromptKeyPicker<R: BufRead + Send> {
    input: Mutex<R>,
    selected: Mutex<Option<Credential>>,
}

impl<R: BufRead + Send> PromptKeyPicker<R> {
    /// Creates a picker reading answers from `input`.
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
            selected: Mutex::new(None),
        }
    }
}

impl PromptKeyPicker<BufReader<Stdin>> {
    /// Creates a picker reading from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> KeyPicker for PromptKeyPicker<R> {
    fn has_selected_api_key(&self) -> Result<bool, AuthError> {
        let selected = self
            .selected
            .lock()
            .map_err(|_| AuthError::Picker("selection lock poisoned".to_string()))?;
        Ok(selected.is_some())
    }

    fn open_select_key(&self) -> Result<(), AuthError> {
        eprint!("Select API key: ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        self.input
            .lock()
            .map_err(|_| AuthError::Picker("input lock poisoned".to_string()))?
            .read_line(&mut line)
            .map_err(|error| AuthError::Picker(error.to_string()))?;

        let mut selected = self
            .selected
            .lock()
            .map_err(|_| AuthError::Picker("selection lock poisoned".to_string()))?;
        // A dismissed dialog keeps the previous selection.
        if let Ok(credential) = Credential::new(&line) {
            *selected = Some(credential);
        }
        Ok(())
    }

    fn selected_api_key(&self) -> Option<Credential> {
        self.selected.lock().ok().and_then(|selected| selected.clone())
    }
}

/// Failure category of one analyze action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// Selected file could not be read.
    ReadFailure,
    /// HTTP 429.
    RateLimited,
    /// Key rejected or missing.
    InvalidCredential,
    /// Response broke the contract.
    MalformedResponse,
    /// Anything else.
    Other,
}

impl From<FailureClass> for AnalysisFailure {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::RateLimited => Self::RateLimited,
            FailureClass::InvalidCredential => Self::InvalidCredential,
            FailureClass::MalformedResponse => Self::MalformedResponse,
            FailureClass::Other => Self::Other,
        }
    }
}

/// Result of one analyze action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    /// Control was disabled; nothing happened.
    Disabled,
    /// Result stored in the session.
    Completed,
    /// Message stored in the session.
    Failed(AnalysisFailure),
}

/// Interactive controller shared by every shell.
pub struct ChartVisionApp {
    session: SessionState,
    uploader: ImageUploader,
    bootstrap: CredentialBootstrap,
    client: AnalysisClient,
    source: Arc<dyn ImageSource>,
}

impl ChartVisionApp {
    /// Creates a controller. Call [`Self::start`] before user actions.
    pub fn new(
        bootstrap: CredentialBootstrap,
        client: AnalysisClient,
        source: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            session: SessionState::new(APP_VERSION),
            uploader: ImageUploader::new(),
            bootstrap,
            client,
            source,
        }
    }

    /// Builds a controller from config and injected capabilities.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] / [`AppError::Request`] for invalid config.
    pub fn from_config(
        config: &AppConfig,
        picker: Option<Arc<dyn KeyPicker>>,
        transport: Arc<dyn ModelTransport>,
        source: Arc<dyn ImageSource>,
    ) -> Result<Self, AppError> {
        let strategy = config.credential_strategy(picker)?;
        let client = AnalysisClient::new(config.model_config(), transport)?;
        Ok(Self::new(CredentialBootstrap::new(strategy), client, source))
    }

    /// Runs the startup credential check.
    ///
    /// # Errors
    /// Propagates picker/store failures; the credential screen is shown then.
    pub fn start(&mut self) -> Result<(), AppError> {
        let result = self.bootstrap.initialize();
        self.sync_credential_state();
        result.map(|_| ()).map_err(AppError::from)
    }

    /// Returns session snapshot.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Returns uploader snapshot.
    pub fn uploader(&self) -> &ImageUploader {
        &self.uploader
    }

    /// Returns bootstrap snapshot.
    pub fn bootstrap(&self) -> &CredentialBootstrap {
        &self.bootstrap
    }

    /// Returns `true` when the analyze control is disabled.
    pub fn analyze_disabled(&self) -> bool {
        self.session.analyze_disabled()
    }

    /// Returns the top-level screen.
    pub fn screen(&self) -> Screen {
        self.session.screen(self.credential_prompt())
    }

    /// Returns the results panel.
    pub fn results_panel(&self) -> ResultsPanel {
        self.session.results_panel()
    }

    /// Returns the credential screen inputs.
    pub fn credential_prompt(&self) -> CredentialPrompt {
        let mode = match self.bootstrap.strategy_kind() {
            StrategyKind::Persisted => KeyEntryMode::Manual,
            StrategyKind::HostPicker => KeyEntryMode::Picker,
            StrategyKind::Environment | StrategyKind::Fixed => KeyEntryMode::Unavailable,
        };
        CredentialPrompt {
            mode,
            validation_error: self.bootstrap.validation_error().map(str::to_string),
            configuration_error: self.bootstrap.configuration_error().map(str::to_string),
        }
    }

    /// Click-to-upload path. Non-image files are ignored.
    pub fn select_file(&mut self, file: ImageFile) -> bool {
        let accepted = self.uploader.accept_file(file);
        if accepted {
            self.sync_selection();
        }
        accepted
    }

    /// Pointer entered the drop target.
    pub fn drag_enter(&mut self) {
        self.uploader.drag_enter();
    }

    /// Pointer moves over the drop target.
    pub fn drag_over(&mut self) {
        self.uploader.drag_over();
    }

    /// Pointer left the drop target.
    pub fn drag_leave(&mut self) {
        self.uploader.drag_leave();
    }

    /// Drop path. Only the first file is considered.
    pub fn drop_files(&mut self, files: Vec<ImageFile>) -> bool {
        let accepted = self.uploader.drop_files(files);
        if accepted {
            self.sync_selection();
        }
        accepted
    }

    /// Removes the image and clears the session outcome.
    pub fn remove_image(&mut self) {
        self.uploader.reset();
        self.session.reset();
    }

    /// Runs one analysis of the selected image.
    ///
    /// Disabled unless the credential is ready and a file is selected.
    pub fn analyze(&mut self) -> AnalyzeOutcome {
        if !self.session.credential_ready() {
            log::debug!("app | analyze | credential not ready");
            return AnalyzeOutcome::Disabled;
        }
        if !self.session.begin_analysis() {
            return AnalyzeOutcome::Disabled;
        }
        let Some(upload) = self.uploader.current().cloned() else {
            self.session.reset();
            return AnalyzeOutcome::Disabled;
        };

        let Some(credential) = self.bootstrap.credential().cloned() else {
            log::warn!("app | analyze | no credential available");
            let message = match self.bootstrap.strategy_kind() {
                StrategyKind::Environment => MISSING_ENV_KEY_MESSAGE,
                _ => INVALID_CREDENTIAL_MESSAGE,
            };
            self.session.fail_analysis(message);
            return AnalyzeOutcome::Failed(AnalysisFailure::InvalidCredential);
        };

        let payload = match encode_image(self.source.as_ref(), &upload.file) {
            Ok(payload) => payload,
            Err(error) => {
                log::error!("app | encode_failed | {}", redact_sensitive(&error.to_string()));
                self.session.fail_analysis(read_failure_message(&error));
                return AnalyzeOutcome::Failed(AnalysisFailure::ReadFailure);
            }
        };

        match self.client.analyze(&payload, &credential) {
            Ok(result) => {
                log::info!(
                    "app | analyze_done | patterns={} summary={}",
                    result.candle_patterns.len(),
                    result.momentum_sentiment.summary.as_str()
                );
                self.session.complete_analysis(result);
                AnalyzeOutcome::Completed
            }
            Err(error) => self.handle_request_failure(&error),
        }
    }

    /// Saves a user-entered key (persisted strategy).
    ///
    /// # Errors
    /// Returns [`AppError::Auth`] for blank input, a non-persisted strategy or
    /// store failure. Blank input also sets the prompt's validation error.
    pub fn save_api_key(&mut self, input: &str) -> Result<(), AppError> {
        let result = self.bootstrap.save_credential(input);
        self.sync_credential_state();
        result.map(|_| ()).map_err(AppError::from)
    }

    /// Opens the host picker (picker strategy).
    ///
    /// # Errors
    /// Returns [`AppError::Auth`] for a non-picker strategy or picker failure.
    pub fn select_api_key(&mut self) -> Result<(), AppError> {
        let result = self.bootstrap.select_credential();
        self.sync_credential_state();
        result.map(|_| ()).map_err(AppError::from)
    }

    /// Deletes a persisted key.
    ///
    /// # Errors
    /// Returns [`AppError::Auth`] for a non-persisted strategy or store failure.
    pub fn clear_api_key(&mut self) -> Result<(), AppError> {
        let result = self.bootstrap.clear_credential();
        self.sync_credential_state();
        result.map(|_| ()).map_err(AppError::from)
    }

    fn handle_request_failure(&mut self, error: &RequestError) -> AnalyzeOutcome {
        let class = classify_request_error(error);
        log::error!(
            "app | analyze_failed | class={class:?} detail={}",
            redact_sensitive(&error.to_string())
        );

        let mut message = error.user_message();
        if class == FailureClass::InvalidCredential {
            if let Err(store_error) = self.bootstrap.on_invalid_credential() {
                log::error!("app | invalidate_failed | {store_error}");
            }
            if let Some(problem) = self.bootstrap.configuration_error() {
                message = problem.to_string();
            }
            self.sync_credential_state();
        }

        self.session.fail_analysis(message);
        AnalyzeOutcome::Failed(class.into())
    }

    fn sync_selection(&mut self) {
        if let Some(upload) = self.uploader.current() {
            self.session.select_image(SelectedImage {
                name: upload.file.name.clone(),
                mime_type: upload.file.mime_type.clone(),
                preview_url: upload.preview.url.clone(),
            });
        }
    }

    fn sync_credential_state(&mut self) {
        self.session.credential = match self.bootstrap.state() {
            BootstrapState::Checking => UiCredentialState::Checking,
            BootstrapState::Missing => UiCredentialState::Missing,
            BootstrapState::Ready => UiCredentialState::Ready,
        };
    }
}

fn read_failure_message(error: &IntakeError) -> String {
    match error {
        IntakeError::Read { detail, .. } => {
            format!("Could not read the selected image: {detail}")
        }
    }
}

/// Redacts common secret markers in log-safe output.
///
/// Everything after the first marker is dropped.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for marker in SECRET_MARKERS {
        redacted = redact_after_marker(&redacted, marker);
    }
    redacted
}

fn redact_after_marker(input: &str, marker: &str) -> String {
    let lower = input.to_ascii_lowercase();
    match lower.find(marker) {
        Some(position) => {
            let prefix = &input[..position];
            let marker = marker.trim_end_matches('=');
            format!("{prefix}{marker}=<redacted>")
        }
        None => input.to_string(),
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Interactive input could not be read.
    #[error("input error: {0}")]
    Input(#[from] std::io::Error),
    /// Credential subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Image handle error.
    #[error("image error: {0}")]
    Core(#[from] CoreError),
    /// Image read error.
    #[error("intake error: {0}")]
    Intake(#[from] IntakeError),
    /// Request setup error.
    #[error("request error: {0}")]
    Request(#[from] RequestError),
}
