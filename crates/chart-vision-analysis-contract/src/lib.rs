#![warn(missing_docs)]
//! # chart-vision-analysis-contract
//!
//! ## Purpose
//! Defines the chart analysis contract between `chart-vision` and the hosted
//! model: instruction prompt, declared output schema, parsed result model.
//!
//! ## Responsibilities
//! - Provide the fixed instruction prompt and response schema, with an
//!   optional trade-suggestion variant.
//! - Parse model output into [`AnalysisResult`] and reject malformed output.
//! - Classify free-form sentiment labels into display [`Tone`]s.
//!
//! ## Data flow
//! [`analysis_prompt`] + [`response_schema`] -> request service -> model text
//! -> [`parse_analysis_result`] -> results view.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs so they outlive the network buffer.
//!
//! ## Error model
//! Invalid JSON, a non-object document, or a missing/empty required field
//! return [`AnalysisContractError`].
//!
//! ## Security and privacy notes
//! This crate processes only model output; it never sees the API key.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Top-level fields every valid result must carry.
pub const REQUIRED_FIELDS: [&str; 4] = [
    "candlePatterns",
    "marketContext",
    "supportResistance",
    "momentumSentiment",
];

/// Maximum number of patterns kept from a response.
pub const MAX_CANDLE_PATTERNS: usize = 3;

const ANALYSIS_PROMPT: &str = "You are an expert trading chart analyst trained to read candlestick patterns, price structure, and market sentiment from images. Analyze the provided chart screenshot and provide a structured JSON output according to the provided schema.

Based on the image, provide the following:
1.  **candlePatterns**: Identify up to 3 most recent, significant candlestick patterns. For each, specify its name, sentiment (bullish, bearish, or neutral), and your confidence level (High, Medium, or Low).
2.  **marketContext**: Describe the overall trend visible in the chart (e.g., 'uptrend with higher highs and higher lows'). Note any significant events like a pullback to a key moving average, a reversal at a key zone, or a breakout formation.
3.  **supportResistance**: Highlight visible support/demand and resistance/supply zones where the price has reacted multiple times.
4.  **momentumSentiment**: Based on recent candle body sizes, wick lengths, and sequence, describe whether momentum is strengthening or fading. Provide a final, overall sentiment summary: 'Bullish', 'Bearish', 'Neutral', or 'Reversal Likely'.";

const TRADE_SUGGESTION_INSTRUCTION: &str = "
5.  **tradeSuggestion**: If the chart supports a reasonable setup, suggest a trade: the strategy, an entry level, a stop loss level, and an exit/target level. Omit this field when no setup is visible.";

/// Which contract revision to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContractVariant {
    /// Patterns, context, levels and momentum.
    #[default]
    Standard,
    /// Standard fields plus an optional trade suggestion.
    WithTradeSuggestion,
}

/// Parsed analysis returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Up to three recent patterns, most relevant first.
    pub candle_patterns: Vec<CandlePattern>,
    /// Overall trend and context.
    pub market_context: String,
    /// Support/demand and resistance/supply zones.
    pub support_resistance: String,
    /// Momentum description and summary.
    pub momentum_sentiment: MomentumSentiment,
    /// Suggested trade, only in the trade-suggestion variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_suggestion: Option<TradeSuggestion>,
}

/// One detected candlestick pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlePattern {
    /// Pattern name, for example `Bullish Engulfing`.
    pub name: String,
    /// Directional bias of the pattern.
    pub sentiment: PatternSentiment,
    /// Detection confidence.
    pub confidence: Confidence,
}

/// Directional bias of a candlestick pattern.
///
/// Labels match case-insensitively; anything else is kept verbatim as
/// [`PatternSentiment::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternSentiment {
    /// Price-positive.
    Bullish,
    /// Price-negative.
    Bearish,
    /// No directional bias.
    Neutral,
    /// Free-form label reported by the model.
    Other(String),
}

impl PatternSentiment {
    /// Returns the canonical label, or the raw one for [`Self::Other`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
            Self::Other(raw) => raw,
        }
    }

    /// Returns display tone.
    pub fn tone(&self) -> Tone {
        sentiment_tone(self.as_str())
    }
}

impl From<String> for PatternSentiment {
    fn from(raw: String) -> Self {
        match normalize_label(&raw).as_str() {
            "bullish" => Self::Bullish,
            "bearish" => Self::Bearish,
            "neutral" => Self::Neutral,
            _ => Self::Other(raw),
        }
    }
}

impl From<PatternSentiment> for String {
    fn from(value: PatternSentiment) -> Self {
        match value {
            PatternSentiment::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Detection confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Confidence {
    /// High confidence.
    High,
    /// Medium confidence.
    Medium,
    /// Low confidence.
    Low,
    /// Free-form level reported by the model.
    Other(String),
}

impl Confidence {
    /// Returns the canonical label, or the raw one for [`Self::Other`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for Confidence {
    fn from(raw: String) -> Self {
        match normalize_label(&raw).as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Other(raw),
        }
    }
}

impl From<Confidence> for String {
    fn from(value: Confidence) -> Self {
        match value {
            Confidence::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Momentum assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentumSentiment {
    /// Whether momentum is strengthening or fading, and why.
    pub description: String,
    /// Overall sentiment summary.
    pub summary: MomentumSummary,
}

/// Overall sentiment summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MomentumSummary {
    /// Bullish overall.
    Bullish,
    /// Bearish overall.
    Bearish,
    /// Neutral overall.
    Neutral,
    /// Trend reversal expected.
    ReversalLikely,
    /// Free-form summary reported by the model.
    Other(String),
}

impl MomentumSummary {
    /// Returns the canonical label, or the raw one for [`Self::Other`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bullish => "Bullish",
            Self::Bearish => "Bearish",
            Self::Neutral => "Neutral",
            Self::ReversalLikely => "Reversal Likely",
            Self::Other(raw) => raw,
        }
    }

    /// Returns display tone.
    pub fn tone(&self) -> Tone {
        sentiment_tone(self.as_str())
    }
}

impl From<String> for MomentumSummary {
    fn from(raw: String) -> Self {
        match normalize_label(&raw).as_str() {
            "bullish" => Self::Bullish,
            "bearish" => Self::Bearish,
            "neutral" => Self::Neutral,
            "reversal likely" => Self::ReversalLikely,
            _ => Self::Other(raw),
        }
    }
}

impl From<MomentumSummary> for String {
    fn from(value: MomentumSummary) -> Self {
        match value {
            MomentumSummary::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Suggested trade setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSuggestion {
    /// Setup description.
    pub strategy: String,
    /// Entry level.
    pub entry: String,
    /// Stop loss level.
    pub stop_loss: String,
    /// Exit/target level.
    pub exit: String,
}

/// Display tone for sentiment labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Positive styling.
    Bullish,
    /// Negative styling.
    Bearish,
    /// Default styling.
    Neutral,
}

/// Classifies a free-form label by case-insensitive substring match.
///
/// `bullish` wins over `bearish` when both appear.
pub fn sentiment_tone(label: &str) -> Tone {
    let lower = label.to_lowercase();
    if lower.contains("bullish") {
        Tone::Bullish
    } else if lower.contains("bearish") {
        Tone::Bearish
    } else {
        Tone::Neutral
    }
}

/// Returns the instruction prompt for `variant`.
pub fn analysis_prompt(variant: ContractVariant) -> String {
    match variant {
        ContractVariant::Standard => ANALYSIS_PROMPT.to_string(),
        ContractVariant::WithTradeSuggestion => {
            format!("{ANALYSIS_PROMPT}{TRADE_SUGGESTION_INSTRUCTION}")
        }
    }
}

/// Returns the declared response schema in the model's schema dialect.
pub fn response_schema(variant: ContractVariant) -> Value {
    let mut schema = json!({
        "type": "OBJECT",
        "properties": {
            "candlePatterns": {
                "type": "ARRAY",
                "description": "List of up to 3 most recent, significant candlestick patterns.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": {
                            "type": "STRING",
                            "description": "Name of the candlestick pattern (e.g., 'Bullish Engulfing', 'Doji')."
                        },
                        "sentiment": {
                            "type": "STRING",
                            "description": "Sentiment of the pattern.",
                            "enum": ["bullish", "bearish", "neutral"]
                        },
                        "confidence": {
                            "type": "STRING",
                            "description": "Confidence level in the pattern detection.",
                            "enum": ["High", "Medium", "Low"]
                        }
                    },
                    "required": ["name", "sentiment", "confidence"]
                }
            },
            "marketContext": {
                "type": "STRING",
                "description": "A description of the overall market trend and context shown in the chart."
            },
            "supportResistance": {
                "type": "STRING",
                "description": "Analysis of visible support/demand and resistance/supply zones."
            },
            "momentumSentiment": {
                "type": "OBJECT",
                "properties": {
                    "description": {
                        "type": "STRING",
                        "description": "Description of the current momentum based on recent candles."
                    },
                    "summary": {
                        "type": "STRING",
                        "description": "A final, overall sentiment summary.",
                        "enum": ["Bullish", "Bearish", "Neutral", "Reversal Likely"]
                    }
                },
                "required": ["description", "summary"]
            }
        },
        "required": REQUIRED_FIELDS
    });

    if variant == ContractVariant::WithTradeSuggestion
        && let Some(properties) = schema["properties"].as_object_mut()
    {
        properties.insert(
            "tradeSuggestion".to_string(),
            json!({
                "type": "OBJECT",
                "description": "Optional trade setup derived from the chart.",
                "properties": {
                    "strategy": { "type": "STRING", "description": "Setup description." },
                    "entry": { "type": "STRING", "description": "Entry price or zone." },
                    "stopLoss": { "type": "STRING", "description": "Stop loss level." },
                    "exit": { "type": "STRING", "description": "Exit or target level." }
                },
                "required": ["strategy", "entry", "stopLoss", "exit"]
            }),
        );
    }

    schema
}

/// Parses model text into a validated analysis result.
///
/// A required field that is absent, `null`, or an empty string is missing.
/// Patterns beyond [`MAX_CANDLE_PATTERNS`] are dropped.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON or unexpected
/// values, [`AnalysisContractError::NotAnObject`] for non-object documents,
/// and [`AnalysisContractError::MissingField`] for missing required fields.
pub fn parse_analysis_result(raw: &str) -> Result<AnalysisResult, AnalysisContractError> {
    let document: Value =
        serde_json::from_str(raw.trim()).map_err(AnalysisContractError::Decode)?;
    let object = document
        .as_object()
        .ok_or(AnalysisContractError::NotAnObject)?;

    for field in REQUIRED_FIELDS {
        let present = match object.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(AnalysisContractError::MissingField(field));
        }
    }

    let mut result: AnalysisResult =
        serde_json::from_value(document).map_err(AnalysisContractError::Decode)?;
    result.candle_patterns.truncate(MAX_CANDLE_PATTERNS);
    Ok(result)
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure or value outside the contract.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Top-level document is not a JSON object.
    #[error("analysis response is not a JSON object")]
    NotAnObject,
    /// Required field absent or empty.
    #[error("analysis response is missing '{0}'")]
    MissingField(&'static str),
}
