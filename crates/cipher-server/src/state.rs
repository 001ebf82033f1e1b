//! The composition root's output: everything a request handler needs,
//! cloned cheaply into every request (an `Arc` and a couple of small
//! copyable fields).

use std::sync::Arc;

use cipher_core::orchestrator::SolverOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SolverOrchestrator>,
    pub api_token: Option<Arc<str>>,
}
