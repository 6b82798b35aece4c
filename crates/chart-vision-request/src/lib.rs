#![warn(missing_docs)]
//! # chart-vision-request
//!
//! ## Purpose
//! Sends one chart image to the hosted multimodal model and returns the
//! validated analysis.
//!
//! ## Responsibilities
//! - Validate the model endpoint (HTTPS, or plain HTTP on loopback).
//! - Build the `generateContent` request: inline image, fixed prompt,
//!   declared JSON response schema.
//! - Send through an injectable [`ModelTransport`].
//! - Extract and parse the model's JSON text.
//! - Classify failures for the action boundary.
//!
//! ## Data flow
//! [`chart_vision_core::ImagePayload`] + [`chart_vision_auth::Credential`] ->
//! [`AnalysisClient::analyze`] -> [`ModelTransport::post`] -> status/body ->
//! [`chart_vision_analysis_contract::parse_analysis_result`].
//!
//! ## Ownership and lifetimes
//! The client owns its config and shares the transport via `Arc`, so one
//! client can be cloned into the app shell and test harnesses.
//!
//! ## Error model
//! Every failure is a [`RequestError`]. [`classify_request_error`] reduces it
//! to a [`FailureClass`] and [`RequestError::user_message`] gives the inline
//! text. There is exactly one attempt per call; retrying is the caller's
//! decision.
//!
//! ## Security and privacy notes
//! The key travels in the `x-goog-api-key` header, never in the URL, and is
//! never logged.

use std::sync::Arc;

use chart_vision_analysis_contract::{
    AnalysisResult, ContractVariant, analysis_prompt, parse_analysis_result, response_schema,
};
use chart_vision_auth::Credential;
use chart_vision_core::ImagePayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Default model API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default multimodal model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Inline message for rate-limited requests.
pub const RATE_LIMITED_MESSAGE: &str = "API rate limit exceeded. Please try again later.";

/// Inline message for rejected keys.
pub const INVALID_CREDENTIAL_MESSAGE: &str =
    "Your API key is invalid or lacks permission. Please provide a valid key.";

/// Inline message for responses outside the contract.
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Invalid response structure from API.";

const CREDENTIAL_FAILURE_MARKERS: [&str; 4] = [
    "api key not valid",
    "api_key_invalid",
    "permission denied",
    "requested entity was not found",
];

/// Model endpoint and contract selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// API host, without path.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Contract revision to request.
    pub variant: ContractVariant,
}

impl ModelConfig {
    /// Creates config with defaults.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            variant: ContractVariant::Standard,
        }
    }

    /// Overrides API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides contract revision.
    pub fn with_variant(mut self, variant: ContractVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Resolves the `generateContent` URL.
    ///
    /// # Errors
    /// Returns [`RequestError::InvalidEndpoint`] for an invalid base URL or
    /// blank model.
    pub fn generate_content_url(&self) -> Result<Url, RequestError> {
        let base = validate_model_endpoint(&self.base_url)?;
        let model = self.model.trim();
        if model.is_empty() || model.contains('/') {
            return Err(RequestError::InvalidEndpoint(format!(
                "invalid model name '{model}'"
            )));
        }

        let path = format!(
            "{}/v1beta/models/{model}:generateContent",
            base.path().trim_end_matches('/')
        );
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates model endpoint constraints.
///
/// # Errors
/// Returns [`RequestError::InvalidEndpoint`] for unparsable URLs and for
/// non-HTTPS URLs outside loopback.
pub fn validate_model_endpoint(base_url: &str) -> Result<Url, RequestError> {
    let parsed = Url::parse(base_url.trim())
        .map_err(|error| RequestError::InvalidEndpoint(format!("invalid model url: {error}")))?;

    let loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if loopback => Ok(parsed),
        _ => Err(RequestError::InvalidEndpoint(
            "model endpoint must use https".to_string(),
        )),
    }
}

/// `generateContent` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns; a single user turn here.
    pub contents: Vec<Content>,
    /// Output constraints.
    pub generation_config: GenerationConfig,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Ordered parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Text or inline binary part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Inline image data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Inline base64 data with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type of `data`.
    pub mime_type: String,
    /// Base64 bytes.
    pub data: String,
}

/// Output constraints for the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Always `application/json`.
    pub response_mime_type: String,
    /// Declared output schema.
    pub response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Raw HTTP outcome returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Abstract transport used by the analysis client.
pub trait ModelTransport: Send + Sync {
    /// Posts one request and returns the raw outcome.
    ///
    /// # Errors
    /// Returns [`RequestError::Network`] when no HTTP response was received.
    fn post(
        &self,
        url: &Url,
        credential: &Credential,
        request: &GenerateContentRequest,
    ) -> Result<TransportResponse, RequestError>;
}

/// Blocking HTTP transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpModelTransport {
    http: reqwest::blocking::Client,
}

impl HttpModelTransport {
    /// Creates a transport identifying itself with `user_agent`.
    ///
    /// # Errors
    /// Returns [`RequestError::Network`] when the HTTP client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self, RequestError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|error| RequestError::Network(error.to_string()))?;
        Ok(Self { http })
    }
}

impl ModelTransport for HttpModelTransport {
    fn post(
        &self,
        url: &Url,
        credential: &Credential,
        request: &GenerateContentRequest,
    ) -> Result<TransportResponse, RequestError> {
        let response = self
            .http
            .post(url.clone())
            .header(API_KEY_HEADER, credential.expose())
            .json(request)
            .send()
            .map_err(|error| RequestError::Network(error.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| RequestError::Network(error.without_url().to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

/// Analysis client that validates the endpoint and runs one request.
#[derive(Clone)]
pub struct AnalysisClient {
    config: ModelConfig,
    url: Url,
    transport: Arc<dyn ModelTransport>,
}

impl AnalysisClient {
    /// Creates a validated client.
    ///
    /// # Errors
    /// Returns [`RequestError::InvalidEndpoint`] for an invalid config.
    pub fn new(config: ModelConfig, transport: Arc<dyn ModelTransport>) -> Result<Self, RequestError> {
        let url = config.generate_content_url()?;
        Ok(Self {
            config,
            url,
            transport,
        })
    }

    /// Returns the resolved `generateContent` URL.
    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Returns the active config.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Builds the request body for one image.
    pub fn build_request(&self, payload: &ImagePayload) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: payload.mime_type.clone(),
                            data: payload.data.clone(),
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(analysis_prompt(self.config.variant)),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(self.config.variant),
            },
        }
    }

    /// Analyzes one chart image. Single attempt, no retry.
    ///
    /// # Errors
    /// - [`RequestError::RateLimited`] on HTTP 429.
    /// - [`RequestError::InvalidCredential`] on auth/permission failures.
    /// - [`RequestError::Malformed`] when the response breaks the contract.
    /// - [`RequestError::Api`] / [`RequestError::Network`] otherwise.
    pub fn analyze(
        &self,
        payload: &ImagePayload,
        credential: &Credential,
    ) -> Result<AnalysisResult, RequestError> {
        let request = self.build_request(payload);
        log::info!(
            "request | send | model={} mime={} payload_bytes={} key={}",
            self.config.model,
            payload.mime_type,
            payload.encoded_len(),
            credential.fingerprint()
        );

        let response = self
            .transport
            .post(&self.url, credential, &request)
            .inspect_err(|error| log::warn!("request | transport_failed | {error}"))?;
        log::info!("request | response | status={}", response.status);

        if !(200..300).contains(&response.status) {
            let error = classify_http_failure(response.status, &response.body);
            log::warn!(
                "request | failed | class={:?} status={}",
                classify_request_error(&error),
                response.status
            );
            return Err(error);
        }

        let text = extract_response_text(&response.body)?;
        parse_analysis_result(&text).map_err(|error| {
            log::warn!("request | malformed | {error}");
            RequestError::Malformed(error.to_string())
        })
    }
}

/// Maps a non-success HTTP outcome to a request error.
pub fn classify_http_failure(status: u16, body: &str) -> RequestError {
    let (message, status_text) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.trim().to_string(), None),
    };

    if status == 429 {
        return RequestError::RateLimited;
    }

    let lower = message.to_ascii_lowercase();
    let credential_failure = matches!(status, 401 | 403)
        || matches!(
            status_text.as_deref(),
            Some("PERMISSION_DENIED" | "UNAUTHENTICATED")
        )
        || CREDENTIAL_FAILURE_MARKERS
            .iter()
            .any(|marker| lower.contains(marker));
    if credential_failure {
        return RequestError::InvalidCredential(message);
    }

    let message = if message.is_empty() {
        format!("request failed with HTTP status {status}")
    } else {
        message
    };
    RequestError::Api { status, message }
}

/// Concatenates the first candidate's text parts.
///
/// # Errors
/// Returns [`RequestError::Malformed`] when the envelope is not JSON or holds
/// no text.
pub fn extract_response_text(body: &str) -> Result<String, RequestError> {
    let envelope: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|error| RequestError::Malformed(format!("response envelope: {error}")))?;

    let candidate = envelope
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RequestError::Malformed("response has no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(RequestError::Malformed(format!(
            "response has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text.to_string())
}

/// Failure class used by the action boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Back off and let the user retry later.
    RateLimited,
    /// Key rejected; re-authenticate.
    InvalidCredential,
    /// Response broke the contract.
    MalformedResponse,
    /// Anything else; message passed through.
    Other,
}

/// Classifies request errors.
pub fn classify_request_error(error: &RequestError) -> FailureClass {
    match error {
        RequestError::RateLimited => FailureClass::RateLimited,
        RequestError::InvalidCredential(_) => FailureClass::InvalidCredential,
        RequestError::Malformed(_) => FailureClass::MalformedResponse,
        RequestError::Api { .. } | RequestError::Network(_) | RequestError::InvalidEndpoint(_) => {
            FailureClass::Other
        }
    }
}

/// Request layer error type.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Endpoint config violates policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// HTTP 429.
    #[error("rate limited by model API")]
    RateLimited,
    /// Key rejected.
    #[error("credential rejected: {0}")]
    InvalidCredential(String),
    /// Response outside the contract.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Other API error.
    #[error("model API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the API.
        message: String,
    },
    /// No HTTP response received.
    #[error("network failure: {0}")]
    Network(String),
}

impl RequestError {
    /// Returns the text shown inline in the results panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited => RATE_LIMITED_MESSAGE.to_string(),
            Self::InvalidCredential(_) => INVALID_CREDENTIAL_MESSAGE.to_string(),
            Self::Malformed(_) => MALFORMED_RESPONSE_MESSAGE.to_string(),
            Self::Api { message, .. } => message.clone(),
            Self::Network(message) | Self::InvalidEndpoint(message) => message.clone(),
        }
    }
}
