pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

use crate::{
    adapters::gateway::GatewayClient, config::AppConfig, services::reconcile::Reconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub reconciler: Arc<Reconciler>,
    pub gateway: Arc<GatewayClient>,
    pub config: Arc<AppConfig>,
}
