//! Watchdesk server - request approval desk and duty handover bot

pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handover;
pub mod membership;
pub mod models;
pub mod store;
pub mod telegram;
pub mod webhook;
pub mod workflow;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::gateway::NotificationGateway;
use crate::handover::{HandoverCoordinator, RosterService};
use crate::store::Store;
use crate::workflow::RequestEngine;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub gateway: Arc<dyn NotificationGateway>,
    pub engine: RequestEngine,
    pub coordinator: HandoverCoordinator,
    pub roster: Arc<RosterService>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<dyn NotificationGateway>,
        webhook_secret: Option<String>,
    ) -> Arc<Self> {
        let store = Store::new(pool);
        let roster = Arc::new(RosterService::new(store.clone(), gateway.clone()));
        Arc::new(Self {
            engine: RequestEngine::new(store.clone(), gateway.clone()),
            coordinator: HandoverCoordinator::new(store.clone(), roster.clone()),
            roster,
            store,
            gateway,
            webhook_secret,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(webhook::health))
        .route("/telegram/webhook", post(webhook::telegram_webhook))
        .route("/requests", post(webhook::submit_request))
        .route("/roster", get(webhook::roster))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
