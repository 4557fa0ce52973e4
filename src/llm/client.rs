use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{
    GenerateRequest, GenerateResponse, GenerationConfig, GenerationError, Provider, SafetyPolicy,
};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_TOKEN_USAGE,
};

const PROVIDER_SERVER: &str = "generativelanguage.googleapis.com";

/// The report generator: one provider, one fixed decoding configuration,
/// one fixed safety policy. Built once at startup and shared read-only.
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    model: String,
    config: GenerationConfig,
    safety: SafetyPolicy,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            config: GenerationConfig::REPORT,
            safety: SafetyPolicy::block_none(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issues exactly one request and returns the generated text unmodified.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let req = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            config: self.config,
            safety: self.safety.clone(),
        };

        self.generate_once(&req).await.map(|resp| resp.content)
    }

    async fn generate_once(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        let provider_name = self.provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = PROVIDER_SERVER,
            server.port = 443_i64,
            gen_ai.request.temperature = f64::from(req.config.temperature),
            gen_ai.request.top_p = f64::from(req.config.top_p),
            gen_ai.request.top_k = i64::from(req.config.top_k),
            gen_ai.request.max_tokens = i64::from(req.config.max_output_tokens),
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))],
        );

        let result = match tokio::time::timeout(
            self.timeout,
            self.provider.generate(req).instrument(span.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        };

        let duration = start.elapsed().as_secs_f64();
        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.clone());

        match result {
            Ok(resp) => {
                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", i64::from(resp.input_tokens));
                span.record("gen_ai.usage.output_tokens", i64::from(resp.output_tokens));
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                tracing::info!(
                    parent: &span,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    duration_s = duration,
                    "generation completed"
                );

                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", err.kind());

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", err.kind()),
                    ],
                );

                tracing::warn!(
                    parent: &span,
                    error = %err,
                    error_type = err.kind(),
                    "generation failed"
                );

                Err(err)
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, c)| i + c.len_utf8() <= max)
            .map(|(_, c)| c)
            .collect()
    }
}
