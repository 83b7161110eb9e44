/// Remote generative model capability
pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Fixed generation parameters sent with every prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Parameters for structured classification output.
    pub const CLASSIFICATION: GenerationParams = GenerationParams {
        temperature: 0.7,
        top_p: 0.85,
        top_k: 40,
        max_output_tokens: 512,
    };

    /// Low-randomness parameters for deletion confirmation.
    pub const SAFETY_REVIEW: GenerationParams = GenerationParams {
        temperature: 0.2,
        top_p: 0.8,
        top_k: 40,
        max_output_tokens: 512,
    };

    /// Parameters for short reply bodies.
    pub const REPLY: GenerationParams = GenerationParams {
        temperature: 0.7,
        top_p: 0.8,
        top_k: 40,
        max_output_tokens: 300,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model API returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
}

impl ModelError {
    /// Rate-limit and quota failures get a longer backoff than other errors.
    pub fn is_rate_limit(&self) -> bool {
        if matches!(self, ModelError::RateLimited(_)) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("rate limit") || message.contains("quota")
    }
}

/// A remote text generator: submit a prompt, receive text.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError>;

    fn model_name(&self) -> &str;
}

static LEADING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)[^{]*").expect("valid leading-noise pattern"));
static TRAILING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)[^}]*$").expect("valid trailing-noise pattern"));

/// Trim any text around the JSON object in a model response.
///
/// Models wrap JSON in prose or code fences; everything before the first
/// `{` and after the last `}` is dropped. Returns `None` when no object-like
/// span exists.
pub fn extract_json(response: &str) -> Option<&str> {
    let start = LEADING_NOISE.find(response).map(|m| m.end()).unwrap_or(0);
    let rest = &response[start..];
    let end = TRAILING_NOISE.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    let candidate = &rest[..end];

    if candidate.starts_with('{') && candidate.ends_with('}') {
        Some(candidate)
    } else {
        None
    }
}
