//! The text insight provider trait and its request/response types.
//!
//! Implemented by the `cursus-providers` crate. The evaluator never calls a
//! provider; only [`crate::insight::InsightService`] does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A hosted or local language model that turns a prompt into free text.
#[async_trait]
pub trait TextInsightProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate text from a prompt.
    async fn generate(&self, request: &InsightRequest) -> anyhow::Result<InsightResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRequest {
    /// Model identifier (e.g. "gemini-2.5-flash").
    pub model: String,
    /// The prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl InsightRequest {
    pub fn new(model: &str, prompt: impl Into<String>) -> Self {
        Self {
            model: model.to_string(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 512,
            temperature: 0.4,
        }
    }
}

/// Provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightResponse {
    /// Text as returned by the model.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

/// Default system prompt for insight providers.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an academic advisor assistant for an engineering school. Grades are on a 0-20 scale. Answer concisely in plain text, without markdown headings or code blocks.";

/// Normalise model output for display.
///
/// Strips a single wrapping code fence (models sometimes answer inside
/// ```` ```text ```` blocks despite the system prompt), trims every line's
/// trailing whitespace and collapses runs of blank lines.
pub fn clean_insight_text(response: &str) -> String {
    let trimmed = response.trim();

    let unfenced = if trimmed.starts_with("```") {
        let body = trimmed
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        body.trim_end()
            .strip_suffix("```")
            .unwrap_or(body)
            .trim()
    } else {
        trimmed
    };

    let mut out = String::with_capacity(unfenced.len());
    let mut blank_run = 0usize;
    for line in unfenced.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}
