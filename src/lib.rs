pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod telemetry;

use std::sync::Arc;

pub use config::Config;

use session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm_client: Arc<llm::LlmClient>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, llm_client: Arc<llm::LlmClient>) -> Self {
        Self {
            config,
            llm_client,
            sessions: SessionStore::new(),
        }
    }
}
