use std::sync::Arc;

use crate::config::Config;
use crate::db::{Database, VectorStore};
use crate::llm::LmStudioClient;
use crate::processing::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub vectors: Arc<VectorStore>,
    pub lm: Arc<LmStudioClient>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Database,
        vectors: Arc<VectorStore>,
        lm: Arc<LmStudioClient>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            Arc::clone(&vectors),
            Arc::clone(&lm),
            Arc::clone(&config),
        ));
        Self {
            config,
            db,
            vectors,
            lm,
            orchestrator,
        }
    }
}
