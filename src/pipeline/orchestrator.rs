use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::llm::LlmClient;
use crate::session::{SessionStore, SessionView};
use crate::telemetry::metrics::{
    REPORT_GENERATION_DURATION, REPORT_REQUESTED_WORDS, REPORT_VALIDATION_FAILURES,
};

use super::format::{self, GeneratedReport};
use super::prompt::build_prompt;
use super::request::ReportRequest;

/// Validate, build the prompt, generate, format. The generator is never
/// called for a request that fails validation.
#[tracing::instrument(
    name = "pipeline report",
    skip(llm_client, request),
    fields(
        report.type = %request.report_type,
        report.tone = %request.tone,
        report.target_words = request.target_length_words,
        report.duration_ms,
    )
)]
pub async fn generate_report(
    llm_client: &LlmClient,
    request: &ReportRequest,
) -> Result<GeneratedReport, AppError> {
    if let Err(err) = request.validate_for_generation() {
        REPORT_VALIDATION_FAILURES.add(1, &[]);
        return Err(err);
    }

    let start = std::time::Instant::now();

    // Stage 1: Build prompt
    let prompt = build_prompt(request);

    // Stage 2: Generate via the external service
    let raw_text = llm_client.generate(&prompt).await?;

    // Stage 3: Format for display
    let report = format::format_report(request, raw_text, llm_client.model());

    let duration = start.elapsed();
    let type_kv = KeyValue::new("report.type", request.report_type.label());
    REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[type_kv.clone()]);
    REPORT_REQUESTED_WORDS.record(f64::from(request.target_length_words), &[type_kv]);

    tracing::Span::current().record("report.duration_ms", duration.as_millis() as u64);

    Ok(report)
}

/// Handles the generate action for one session. The session lock is released
/// while the service call is in flight; the `Generating` state keeps a second
/// trigger for the same session out.
///
/// The call and its outcome run on their own task, so the session always
/// settles even if the caller is dropped mid-flight.
pub async fn trigger_generation(
    sessions: &SessionStore,
    llm_client: &Arc<LlmClient>,
    session_id: Uuid,
) -> Result<SessionView, AppError> {
    let request = match sessions
        .with_session(session_id, |s| s.begin_generation())
        .await
    {
        Ok(request) => request,
        Err(err) => {
            if matches!(err, AppError::Validation(_)) {
                REPORT_VALIDATION_FAILURES.add(1, &[]);
            }
            return Err(err);
        }
    };

    let sessions = sessions.clone();
    let llm_client = Arc::clone(llm_client);
    let settle = tokio::spawn(
        async move { run_and_settle(&sessions, &llm_client, session_id, request).await }
            .in_current_span(),
    );

    settle
        .await
        .map_err(|e| AppError::Internal(format!("generation task failed: {e}")))?
}

async fn run_and_settle(
    sessions: &SessionStore,
    llm_client: &LlmClient,
    session_id: Uuid,
    request: ReportRequest,
) -> Result<SessionView, AppError> {
    match generate_report(llm_client, &request).await {
        Ok(report) => {
            sessions
                .with_session(session_id, |s| {
                    s.complete(report)?;
                    Ok(s.view())
                })
                .await
        }
        Err(err) => {
            if let Err(e) = sessions.with_session(session_id, |s| s.fail(&err)).await {
                tracing::warn!(session.id = %session_id, error = %e, "could not record failure");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateRequest, GenerateResponse, GenerationError, Provider};
    use crate::pipeline::request::{ReportType, Tone};
    use crate::session::SessionState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeProvider {
        calls: AtomicUsize,
        reply: Result<&'static str, u16>,
        delay: Duration,
    }

    impl FakeProvider {
        fn ok(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Ok(text),
                delay: Duration::ZERO,
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Err(status),
                delay: Duration::ZERO,
            })
        }

        fn slow(status: u16, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Err(status),
                delay,
            })
        }
    }

    #[async_trait::async_trait]
    impl Provider for FakeProvider {
        async fn generate(
            &self,
            req: &GenerateRequest,
        ) -> Result<GenerateResponse, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.reply {
                Ok(text) => Ok(GenerateResponse {
                    content: text.to_string(),
                    model: req.model.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                    finish_reason: "STOP".to_string(),
                }),
                Err(status) => Err(GenerationError::Api {
                    status,
                    message: "simulated failure".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn client(provider: Arc<FakeProvider>) -> Arc<LlmClient> {
        Arc::new(LlmClient::new(
            provider,
            "gemini-1.5-flash",
            Duration::from_secs(5),
        ))
    }

    fn acme() -> ReportRequest {
        ReportRequest {
            company: "Acme".to_string(),
            industry: "Retail".to_string(),
            context: "Launching a loyalty app".to_string(),
            report_type: ReportType::SwotAnalysis,
            tone: Tone::Concise,
            target_length_words: 300,
            include_tables: false,
            include_recommendations: true,
            include_visualizations: false,
        }
    }

    #[tokio::test]
    async fn test_generate_report_formats_output() {
        let provider = FakeProvider::ok("Strengths\n• Brand");
        let report = generate_report(&client(provider.clone()), &acme())
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.raw_text, "Strengths\n• Brand");
        assert_eq!(report.formatted_text, "> Strengths\n>   * Brand");
        assert_eq!(report.title, "SWOT Analysis Report: Acme");
        assert_eq!(report.model, "gemini-1.5-flash");
        assert_eq!(report.export().filename, "Acme_SWOT_Analysis.txt");
    }

    #[tokio::test]
    async fn test_empty_context_never_calls_generator() {
        let provider = FakeProvider::ok("unused");
        let request = ReportRequest {
            context: String::new(),
            ..acme()
        };

        let result = generate_report(&client(provider.clone()), &request).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_is_single_error() {
        let provider = FakeProvider::failing(503);
        let result = generate_report(&client(provider.clone()), &acme()).await;

        match result {
            Err(AppError::Generation(GenerationError::Api { status, .. })) => {
                assert_eq!(status, 503)
            }
            other => panic!("expected generation error, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_without_context_stays_awaiting_input() {
        let provider = FakeProvider::ok("unused");
        let llm = client(provider.clone());
        let sessions = SessionStore::new();
        let view = sessions.create().await.unwrap();

        let err = trigger_generation(&sessions, &llm, view.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let view = sessions.view(view.id).await.unwrap();
        assert_eq!(view.state, SessionState::AwaitingInput);
        assert!(view.warning.is_some());
    }

    #[tokio::test]
    async fn test_trigger_success_then_failure() {
        let sessions = SessionStore::new();
        let view = sessions.create().await.unwrap();
        sessions
            .with_session(view.id, |s| s.update_form(acme()))
            .await
            .unwrap();

        let ok = client(FakeProvider::ok("• insight"));
        let shown = trigger_generation(&sessions, &ok, view.id).await.unwrap();
        assert_eq!(shown.state, SessionState::Displaying);
        assert_eq!(shown.report.unwrap().formatted_text, ">   * insight");

        let failing = FakeProvider::failing(429);
        let err = trigger_generation(&sessions, &client(failing.clone()), view.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

        let after = sessions.view(view.id).await.unwrap();
        assert_eq!(after.state, SessionState::AwaitingInput);
        assert!(after.report.is_none());
        assert!(
            after
                .last_error
                .unwrap()
                .starts_with("Error generating report:")
        );
    }

    #[tokio::test]
    async fn test_dropped_trigger_still_settles_session() {
        let sessions = SessionStore::new();
        let view = sessions.create().await.unwrap();
        sessions
            .with_session(view.id, |s| s.update_form(acme()))
            .await
            .unwrap();

        let slow = FakeProvider::slow(503, Duration::from_millis(200));
        let llm = client(slow.clone());
        let caller = tokio::spawn({
            let sessions = sessions.clone();
            let llm = llm.clone();
            async move { trigger_generation(&sessions, &llm, view.id).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            sessions.view(view.id).await.unwrap().state,
            SessionState::Generating
        );
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let after = sessions.view(view.id).await.unwrap();
        assert_eq!(after.state, SessionState::AwaitingInput);
        assert!(after.last_error.is_some());
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);

        let retry = trigger_generation(&sessions, &client(FakeProvider::ok("• again")), view.id)
            .await
            .unwrap();
        assert_eq!(retry.state, SessionState::Displaying);
    }

    #[tokio::test]
    async fn test_trigger_unknown_session() {
        let llm = client(FakeProvider::ok("x"));
        let err = trigger_generation(&SessionStore::new(), &llm, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
