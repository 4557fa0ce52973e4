pub mod client;
pub mod gemini;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::LlmClient;

/// Decoding parameters attached to every generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub const REPORT: Self = Self {
        temperature: 0.3,
        top_p: 0.95,
        top_k: 40,
        max_output_tokens: 8192,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    pub const ALL: [Self; 4] = [
        Self::Harassment,
        Self::HateSpeech,
        Self::SexuallyExplicit,
        Self::DangerousContent,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Content-filter thresholds sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyPolicy {
    settings: Vec<SafetySetting>,
}

impl SafetyPolicy {
    /// Business reports routinely discuss competition, risk and regulated sectors,
    /// so every recognized category is relaxed to `BLOCK_NONE`.
    pub fn block_none() -> Self {
        Self {
            settings: HarmCategory::ALL
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: HarmBlockThreshold::BlockNone,
                })
                .collect(),
        }
    }

    pub fn settings(&self) -> &[SafetySetting] {
        &self.settings
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub config: GenerationConfig,
    pub safety: SafetyPolicy,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("content blocked by the generation service: {0}")]
    Blocked(String),

    #[error("generation request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Low-cardinality classification recorded as `error.type`.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Api { status, .. } => match status {
                401 | 403 => "auth_error",
                429 => "rate_limit",
                400..=499 => "invalid_request",
                _ => "server_error",
            },
            GenerationError::Blocked(_) => "content_blocked",
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Transport(e) if e.is_timeout() => "timeout",
            GenerationError::Transport(e) if e.is_decode() => "malformed_response",
            GenerationError::Transport(_) => "network_error",
            GenerationError::MalformedResponse(_) => "malformed_response",
        }
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenerationError>;
    fn name(&self) -> &str;
}
