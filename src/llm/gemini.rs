use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{
    GenerateRequest, GenerateResponse, GenerationConfig, GenerationError, Provider, SafetySetting,
};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent>,
    generation_config: &'a GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| GenerationError::Api {
                status: 401,
                message: format!("invalid API key header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(req.prompt.clone()),
                }],
            }],
            generation_config: &req.config,
            safety_settings: req.safety.settings(),
        };

        let response = self
            .client
            .post(self.endpoint(&req.model))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GeminiError>(&error_body) {
                Ok(err) => err.error.message,
                Err(_) => error_body,
            };
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let resp: GeminiResponse = response.json().await?;
        parse_response(resp, &req.model)
    }

    fn name(&self) -> &str {
        "google"
    }
}

fn parse_response(resp: GeminiResponse, model: &str) -> Result<GenerateResponse, GenerationError> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(GenerationError::Blocked(reason));
    };

    let finish_reason = candidate.finish_reason.unwrap_or_default();

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if content.is_empty() {
        if finish_reason == "SAFETY" {
            return Err(GenerationError::Blocked(finish_reason));
        }
        return Err(GenerationError::MalformedResponse(format!(
            "candidate has no text (finish reason: {})",
            if finish_reason.is_empty() {
                "unknown"
            } else {
                finish_reason.as_str()
            }
        )));
    }

    let (input_tokens, output_tokens) = resp
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(GenerateResponse {
        content,
        model: resp.model_version.unwrap_or_else(|| model.to_string()),
        input_tokens,
        output_tokens,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SafetyPolicy;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "gemini-1.5-flash".to_string(),
            prompt: prompt.to_string(),
            config: GenerationConfig::REPORT,
            safety: SafetyPolicy::block_none(),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_generate_sends_config_and_safety() {
        let captured: Arc<Mutex<Option<(Value, Option<String>)>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(move |headers: AxumHeaders, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *sink.lock().unwrap() = Some((body, key));
                    Json(json!({
                        "candidates": [{
                            "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "report"}]},
                            "finishReason": "STOP"
                        }],
                        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 34},
                        "modelVersion": "gemini-1.5-flash-002"
                    }))
                }
            }),
        );
        let base = serve(router).await;

        let provider = GeminiProvider::new("secret-key", &format!("{base}/"));
        let resp = provider.generate(&request("Write a report")).await.unwrap();

        assert_eq!(resp.content, "Hello report");
        assert_eq!(resp.model, "gemini-1.5-flash-002");
        assert_eq!(resp.input_tokens, 12);
        assert_eq!(resp.output_tokens, 34);
        assert_eq!(resp.finish_reason, "STOP");

        let (body, key) = captured.lock().unwrap().take().unwrap();
        assert_eq!(key.as_deref(), Some("secret-key"));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Write a report");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(body["safetySettings"][1]["category"], "HARM_CATEGORY_HATE_SPEECH");
        assert_eq!(body["safetySettings"][1]["threshold"], "BLOCK_NONE");
    }

    #[tokio::test]
    async fn test_generate_maps_api_error() {
        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}})),
                )
            }),
        );
        let base = serve(router).await;

        let provider = GeminiProvider::new("bad", &base);
        let err = provider.generate(&request("x")).await.unwrap_err();

        match &err {
            GenerationError::Api { status, message } => {
                assert_eq!(*status, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(err.kind(), "auth_error");
    }

    #[tokio::test]
    async fn test_generate_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = GeminiProvider::new("k", &format!("http://{addr}"));
        let err = provider.generate(&request("x")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(err.kind(), "network_error");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "OTHER"}
        }))
        .unwrap();
        let err = parse_response(resp, "m").unwrap_err();
        assert!(matches!(err, GenerationError::Blocked(ref r) if r == "OTHER"));
    }

    #[test]
    fn test_parse_safety_finish_without_text() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let err = parse_response(resp, "m").unwrap_err();
        assert!(matches!(err, GenerationError::Blocked(_)));
    }

    #[test]
    fn test_parse_empty_candidate_is_malformed() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": []}}]
        }))
        .unwrap();
        let err = parse_response(resp, "m").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_falls_back_to_requested_model() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
        }))
        .unwrap();
        let out = parse_response(resp, "gemini-1.5-flash").unwrap();
        assert_eq!(out.model, "gemini-1.5-flash");
        assert_eq!(out.input_tokens, 0);
        assert_eq!(out.content, "ok");
    }
}
