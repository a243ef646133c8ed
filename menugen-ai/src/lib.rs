//! menugen-ai library interface
//!
//! Exposes the router, application state and pipeline services so the binary
//! and the integration tests wire the same components.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use menugen_common::config::PipelineConfig;
use menugen_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::services::{
    AiServices, IngestionGate, MenuPipeline, PipelineSupervisor, ProgressTracker,
};

/// Room for multipart framing on top of the image itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Detached pipeline tasks, one per in-flight menu
    pub supervisor: PipelineSupervisor,
    pub ingestion: Arc<IngestionGate>,
    /// Progress counters served to pollers
    pub progress: ProgressTracker,
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the pipeline, supervisor and ingestion gate over one pool and bus
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        services: AiServices,
        pipeline_config: &PipelineConfig,
    ) -> Self {
        let supervisor = PipelineSupervisor::new();
        let progress = ProgressTracker::new(db.clone(), event_bus.clone());
        let pipeline = Arc::new(MenuPipeline::new(
            db.clone(),
            event_bus.clone(),
            services,
            progress.clone(),
            pipeline_config,
        ));
        let ingestion = Arc::new(IngestionGate::new(
            db.clone(),
            event_bus.clone(),
            supervisor.clone(),
            pipeline,
            pipeline_config.max_upload_bytes,
        ));

        Self {
            db,
            event_bus,
            supervisor,
            ingestion,
            progress,
            max_upload_bytes: pipeline_config.max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .merge(api::menu_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
