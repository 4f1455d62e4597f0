//! Shared application state (`spec.md` §6 expansion, grounded on
//! `ferrex-server::infra::app_state::AppState`).

use std::sync::Arc;

use stats_core::StatsEngine;

use super::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StatsEngine>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(engine: Arc<StatsEngine>, config: Arc<ServerConfig>) -> Self {
        Self { engine, config }
    }

    pub fn is_admin_request(&self, requested: bool, secret_param: Option<&str>) -> bool {
        if !requested {
            return false;
        }
        match &self.config.admin_secret {
            Some(expected) => secret_param.is_some_and(|got| got == expected),
            None => true,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
