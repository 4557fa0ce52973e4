//! Per-client form state and the report lifecycle around it.
//!
//! A session moves through `Idle -> AwaitingInput -> Generating -> Displaying`.
//! A failed generation passes through `Failed` and settles back in
//! `AwaitingInput` in the same step, so the session is always reusable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppError;
use crate::pipeline::{GeneratedReport, ReportRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingInput,
    Generating,
    Displaying,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    form: ReportRequest,
    report: Option<GeneratedReport>,
    last_error: Option<String>,
    warning: Option<String>,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            form: ReportRequest::default(),
            report: None,
            last_error: None,
            warning: None,
            created_at: now,
            last_seen: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn form(&self) -> &ReportRequest {
        &self.form
    }

    pub fn report(&self) -> Option<&GeneratedReport> {
        self.report.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Populates the form with its defaults.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.state != SessionState::Idle {
            return Err(self.illegal("start"));
        }
        self.form = ReportRequest::default();
        self.transition(SessionState::AwaitingInput);
        Ok(())
    }

    pub fn update_form(&mut self, form: ReportRequest) -> Result<(), AppError> {
        if self.state == SessionState::Idle {
            return Err(self.illegal("edit the form"));
        }
        form.validate_fields()?;
        self.form = form;
        self.warning = None;
        Ok(())
    }

    /// Validates the form and moves to `Generating`, returning the request to run.
    /// On a validation failure the session lands in `AwaitingInput` with a warning
    /// and nothing on screen.
    pub fn begin_generation(&mut self) -> Result<ReportRequest, AppError> {
        match self.state {
            SessionState::AwaitingInput | SessionState::Displaying | SessionState::Failed => {}
            SessionState::Generating => {
                return Err(AppError::Conflict(
                    "a report is already being generated for this session".to_string(),
                ));
            }
            SessionState::Idle => return Err(self.illegal("generate")),
        }

        if let Err(err) = self.form.validate_for_generation() {
            self.warning = Some(err.user_message());
            self.report = None;
            if self.state != SessionState::AwaitingInput {
                self.transition(SessionState::AwaitingInput);
            }
            return Err(err);
        }

        self.transition(SessionState::Generating);
        self.warning = None;
        self.last_error = None;
        Ok(self.form.clone())
    }

    /// Replaces any previously displayed report.
    pub fn complete(&mut self, report: GeneratedReport) -> Result<(), AppError> {
        if self.state != SessionState::Generating {
            return Err(self.illegal("complete a generation"));
        }
        self.report = Some(report);
        self.transition(SessionState::Displaying);
        Ok(())
    }

    /// Records the failure, drops whatever report was on screen and returns
    /// to `AwaitingInput`.
    pub fn fail(&mut self, err: &AppError) -> Result<(), AppError> {
        if self.state != SessionState::Generating {
            return Err(self.illegal("fail a generation"));
        }
        self.transition(SessionState::Failed);
        self.report = None;
        self.last_error = Some(err.user_message());
        self.transition(SessionState::AwaitingInput);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            session.id = %self.id,
            from = ?self.state,
            to = ?next,
            "session transition"
        );
        self.state = next;
    }

    fn illegal(&self, action: &str) -> AppError {
        AppError::Conflict(format!(
            "cannot {action} while session is {:?}",
            self.state
        ))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            state: self.state,
            form: self.form.clone(),
            report: self.report.as_ref().map(ReportView::from),
            last_error: self.last_error.clone(),
            warning: self.warning.clone(),
            created_at: self.created_at,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub state: SessionState,
    pub form: ReportRequest,
    pub report: Option<ReportView>,
    pub last_error: Option<String>,
    pub warning: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub title: String,
    pub formatted_text: String,
    pub raw_text: String,
    pub export_filename: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

impl From<&GeneratedReport> for ReportView {
    fn from(report: &GeneratedReport) -> Self {
        Self {
            title: report.title.clone(),
            formatted_text: report.formatted_text.clone(),
            raw_text: report.raw_text.clone(),
            export_filename: report.export().filename,
            model: report.model.clone(),
            generated_at: report.generated_at,
        }
    }
}

/// Sessions keyed by id. Locks are held only for state transitions, never
/// across a generation call.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Result<SessionView, AppError> {
        let mut session = Session::new();
        session.start()?;
        let view = session.view();
        self.inner.write().await.insert(session.id(), session);
        tracing::info!(session.id = %view.id, "session started");
        Ok(view)
    }

    pub async fn view(&self, id: Uuid) -> Result<SessionView, AppError> {
        self.with_session(id, |s| Ok(s.view())).await
    }

    /// Runs `f` against the session under the write lock. Counts as activity.
    pub async fn with_session<T, F>(&self, id: Uuid, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Session) -> Result<T, AppError>,
    {
        let mut sessions = self.inner.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        session.touch();
        f(session)
    }

    /// Drops every session last seen before `cutoff`. Sessions with a generation
    /// in flight are kept; they are touched again when it settles.
    pub async fn evict_seen_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = session.state == SessionState::Generating || session.last_seen >= cutoff;
            if !keep {
                tracing::info!(session.id = %id, "session expired");
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.evict_seen_before(cutoff).await
    }

    /// Sweeps idle sessions every `period` until `shutdown` fires.
    pub fn spawn_sweeper(
        &self,
        ttl: Duration,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = store.evict_idle(ttl).await;
                        if evicted > 0 {
                            let remaining = store.len().await;
                            tracing::info!(evicted, remaining, "idle sessions swept");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("session sweeper stopped");
                        break;
                    }
                }
            }
        })
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        if self.inner.write().await.remove(&id).is_none() {
            return Err(not_found(id));
        }
        tracing::info!(session.id = %id, "session ended");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {id} not found"))
}
