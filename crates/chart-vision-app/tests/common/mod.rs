//! Shared fixtures for app integration tests.

use std::sync::{Arc, Mutex};

use chart_vision_app::ChartVisionApp;
use chart_vision_auth::{
    AuthError, Credential, CredentialBootstrap, CredentialStrategy, KeyPicker,
    MemoryCredentialStore,
};
use chart_vision_core::ImageFile;
use chart_vision_intake::InMemoryImageSource;
use chart_vision_request::{
    AnalysisClient, GenerateContentRequest, ModelConfig, ModelTransport, RequestError,
    TransportResponse,
};
use url::Url;

/// Fake PNG bytes stored for [`chart_file`].
#[allow(dead_code)]
pub const CHART_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nchart";

/// Analysis JSON describing a doji on a neutral chart.
#[allow(dead_code)]
pub fn doji_analysis_json() -> String {
    serde_json::json!({
        "candlePatterns": [
            { "name": "Doji", "sentiment": "neutral", "confidence": "Medium" }
        ],
        "marketContext": "Sideways range after a prolonged uptrend.",
        "supportResistance": "Support near 100, resistance near 120.",
        "momentumSentiment": {
            "description": "Momentum is fading as candles shrink.",
            "summary": "Neutral"
        }
    })
    .to_string()
}

/// Wraps analysis JSON in a `generateContent` success envelope.
#[allow(dead_code)]
pub fn success_envelope(analysis_json: &str) -> String {
    serde_json::json!({
        "candidates": [
            {
                "content": { "parts": [ { "text": analysis_json } ], "role": "model" },
                "finishReason": "STOP"
            }
        ]
    })
    .to_string()
}

/// Builds an API error envelope.
#[allow(dead_code)]
pub fn error_envelope(code: u16, status: &str, message: &str) -> String {
    serde_json::json!({
        "error": { "code": code, "message": message, "status": status }
    })
    .to_string()
}

/// Transport returning a scripted response and recording every request.
#[allow(dead_code)]
pub struct ScriptedTransport {
    response: TransportResponse,
    calls: Mutex<Vec<(String, String, GenerateContentRequest)>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            response: TransportResponse {
                status,
                body: body.into(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn doji() -> Self {
        Self::new(200, success_envelope(&doji_analysis_json()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }

    /// Returns `(url, key, request)` of every call.
    pub fn calls(&self) -> Vec<(String, String, GenerateContentRequest)> {
        self.calls.lock().expect("lock").clone()
    }
}

impl ModelTransport for ScriptedTransport {
    fn post(
        &self,
        url: &Url,
        credential: &Credential,
        request: &GenerateContentRequest,
    ) -> Result<TransportResponse, RequestError> {
        self.calls.lock().expect("lock").push((
            url.to_string(),
            credential.expose().to_string(),
            request.clone(),
        ));
        Ok(self.response.clone())
    }
}

/// Picker that confirms a selection with a fixed key.
#[allow(dead_code)]
pub struct ScriptedPicker {
    key: Option<String>,
    selected: Mutex<bool>,
}

#[allow(dead_code)]
impl ScriptedPicker {
    pub fn new(key: Option<&str>, preselected: bool) -> Self {
        Self {
            key: key.map(str::to_string),
            selected: Mutex::new(preselected),
        }
    }
}

impl KeyPicker for ScriptedPicker {
    fn has_selected_api_key(&self) -> Result<bool, AuthError> {
        Ok(*self.selected.lock().expect("lock"))
    }

    fn open_select_key(&self) -> Result<(), AuthError> {
        *self.selected.lock().expect("lock") = self.key.is_some();
        Ok(())
    }

    fn selected_api_key(&self) -> Option<Credential> {
        self.key.as_deref().and_then(|key| Credential::new(key).ok())
    }
}

/// Handle for `chart.png` backed by [`CHART_BYTES`].
#[allow(dead_code)]
pub fn chart_file() -> ImageFile {
    ImageFile::with_mime_type("/charts/chart.png", "chart.png", "image/png")
}

/// Image source holding [`chart_file`].
#[allow(dead_code)]
pub fn chart_source() -> Arc<InMemoryImageSource> {
    Arc::new(InMemoryImageSource::new().with_file("/charts/chart.png", CHART_BYTES.to_vec()))
}

/// Builds a started app for `strategy` over `transport`.
#[allow(dead_code)]
pub fn started_app(
    strategy: CredentialStrategy,
    transport: Arc<ScriptedTransport>,
) -> ChartVisionApp {
    let client =
        AnalysisClient::new(ModelConfig::new(), transport).expect("default config is valid");
    let mut app = ChartVisionApp::new(CredentialBootstrap::new(strategy), client, chart_source());
    app.start().expect("startup check succeeds");
    app
}

/// Environment strategy with a valid key.
#[allow(dead_code)]
pub fn env_strategy() -> CredentialStrategy {
    CredentialStrategy::Environment(Some(Credential::new("env-key").expect("valid key")))
}

/// Persisted strategy over `store`.
#[allow(dead_code)]
pub fn persisted_strategy(store: Arc<MemoryCredentialStore>) -> CredentialStrategy {
    CredentialStrategy::Persisted(store)
}
