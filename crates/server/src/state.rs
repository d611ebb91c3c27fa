//! Shared handler state.

use std::sync::Arc;

use cag_core::{AppConfig, Orchestrator};

use crate::monitor::Monitor;

/// Cloned into every handler; all fields are shared.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub monitor: Arc<Monitor>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self { orchestrator: Arc::new(orchestrator), monitor: Arc::new(Monitor::new()), config: Arc::new(config) }
    }
}
