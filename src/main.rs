use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::{Request, Response, StatusCode};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use strategic_insights::llm::{LlmClient, gemini::GeminiProvider};
use strategic_insights::telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry};
use strategic_insights::{AppState, Config, routes};

const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Names request spans after the matched route template so session ids stay
/// out of span names and metric labels.
#[derive(Clone)]
struct RouteSpan;

impl<B> MakeSpan<B> for RouteSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or("unmatched", MatchedPath::as_str);

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{method} {route}"),
            http.request.method = %method,
            http.route = %route,
            url.path = %request.uri().path(),
            user_agent.original = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();

        span.record("http.response.status_code", i64::from(status.as_u16()));
        span.record(
            "otel.status_code",
            if status.is_server_error() { "ERROR" } else { "OK" },
        );

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let attrs = [
            KeyValue::new("http.status_code", i64::from(status.as_u16())),
            KeyValue::new("http.status_class", format!("{}xx", status.as_u16() / 100)),
        ];
        HTTP_REQUESTS_TOTAL.add(1, &attrs);
        HTTP_REQUEST_DURATION.record(latency_ms, &attrs);

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), latency_ms, "request failed");
        } else {
            tracing::info!(status = status.as_u16(), latency_ms, "request served");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing credential stops the process before anything is served.
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        model = %config.gemini_model,
        timeout_s = config.request_timeout.as_secs(),
        session_ttl_s = config.session_idle_ttl.as_secs(),
        "Starting strategic-insights"
    );

    let provider = Arc::new(GeminiProvider::new(
        &config.gemini_api_key,
        &config.gemini_base_url,
    ));
    let llm_client = Arc::new(LlmClient::new(
        provider,
        config.gemini_model.clone(),
        config.request_timeout,
    ));

    let http_timeout = config.request_timeout + Duration::from_secs(30);
    let state = AppState::new(config.clone(), llm_client);

    let (shutdown_tx, _) = broadcast::channel(1);
    let sweeper = state.sessions.spawn_sweeper(
        config.session_idle_ttl,
        SESSION_SWEEP_PERIOD,
        shutdown_tx.subscribe(),
    );

    let app = routes::build_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RouteSpan)
                .on_response(RecordResponse),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            http_timeout,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    sweeper.await?;

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and treated as never firing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
