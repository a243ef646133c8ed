//! Menu processing pipeline
//!
//! Extraction → persistence → enrichment → terminal state, for one menu.
//! Extraction and persistence failures fail the menu. Once dishes exist the
//! menu reaches COMPLETE whatever happens to individual dishes, unless the
//! store itself refuses the terminal writes; then it ends FAILED /
//! PERSISTENCE rather than staying PROCESSING.

use chrono::Utc;
use menugen_common::config::PipelineConfig;
use menugen_common::events::{EventBus, MenuEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{dishes, menus};
use crate::error::PipelineError;
use crate::models::{FailureCode, MenuStatus};
use crate::services::description_generator::DescriptionGenerator;
use crate::services::enrichment_scheduler::EnrichmentScheduler;
use crate::services::image_generator::{ImageGenerator, PollPolicy};
use crate::services::persistence_mapper::PersistenceMapper;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::providers::{ImageService, TextService, VisionService};
use crate::services::structure_extractor::StructureExtractor;
use crate::utils::RetryPolicy;

/// External collaborators used by the pipeline
#[derive(Clone)]
pub struct AiServices {
    pub vision: Arc<dyn VisionService>,
    pub text: Arc<dyn TextService>,
    pub image: Arc<dyn ImageService>,
}

/// Pipeline stages wired for one deployment
pub struct MenuPipeline {
    db: SqlitePool,
    event_bus: EventBus,
    extractor: StructureExtractor,
    mapper: PersistenceMapper,
    scheduler: EnrichmentScheduler,
    enrichment_timeout: Duration,
}

impl MenuPipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        services: AiServices,
        progress: ProgressTracker,
        config: &PipelineConfig,
    ) -> Self {
        let retry = RetryPolicy::for_services(config);

        let scheduler = EnrichmentScheduler::new(
            db.clone(),
            Arc::new(DescriptionGenerator::new(services.text, retry)),
            Arc::new(ImageGenerator::new(
                services.image,
                retry,
                PollPolicy::from_config(config),
            )),
            progress,
            config.enrichment_width,
        );

        Self {
            extractor: StructureExtractor::new(services.vision, retry),
            mapper: PersistenceMapper::new(db.clone(), config.base_currency.clone()),
            scheduler,
            enrichment_timeout: Duration::from_secs(config.enrichment_timeout_secs),
            db,
            event_bus,
        }
    }

    /// Drive one PENDING menu to a terminal state
    ///
    /// Returns the status the menu ended in.
    pub async fn run(
        &self,
        menu_id: Uuid,
        image: Vec<u8>,
        content_type: String,
        cancel: CancellationToken,
    ) -> MenuStatus {
        let start = StdInstant::now();
        tracing::info!(menu_id = %menu_id, bytes = image.len(), "Starting menu processing");

        let draft = match self.extractor.extract(&image, &content_type).await {
            Ok(draft) => draft,
            Err(e) => return self.fail(menu_id, e).await,
        };
        drop(image);

        let mapped = match self.mapper.persist(menu_id, &draft).await {
            Ok(mapped) => mapped,
            Err(e) => return self.fail(menu_id, e).await,
        };

        self.event_bus.emit_lossy(MenuEvent::MenuProcessing {
            menu_id,
            total_dishes: mapped.total_dishes(),
            timestamp: Utc::now(),
        });

        let deadline = tokio::time::Instant::now() + self.enrichment_timeout;
        self.scheduler
            .run(menu_id, mapped.dish_ids(), &cancel, deadline)
            .await;

        self.settle_dishes(menu_id).await;

        match menus::mark_complete(&self.db, menu_id).await {
            Ok(true) => {
                tracing::info!(
                    menu_id = %menu_id,
                    total_dishes = mapped.total_dishes(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Menu processing completed"
                );
                self.event_bus.emit_lossy(MenuEvent::MenuCompleted {
                    menu_id,
                    total_dishes: mapped.total_dishes(),
                    timestamp: Utc::now(),
                });
                MenuStatus::Complete
            }
            Ok(false) => {
                self.fail(
                    menu_id,
                    PipelineError::new(
                        FailureCode::Persistence,
                        "menu could not be completed: dish outcomes not recorded",
                    ),
                )
                .await
            }
            Err(e) => {
                self.fail(
                    menu_id,
                    PipelineError::new(
                        FailureCode::Persistence,
                        format!("menu could not be completed: {}", e),
                    ),
                )
                .await
            }
        }
    }

    /// Fail dishes the fan-out left PENDING and repair the progress counter
    async fn settle_dishes(&self, menu_id: Uuid) {
        let reason = PipelineError::new(FailureCode::Persistence, "dish outcome not recorded");
        match dishes::fail_pending_dishes(&self.db, menu_id, &reason.to_string()).await {
            Ok(0) => {}
            Ok(swept) => {
                tracing::warn!(menu_id = %menu_id, swept, "Failed dishes left pending by enrichment")
            }
            Err(e) => {
                tracing::error!(menu_id = %menu_id, error = %e, "Failed to sweep pending dishes")
            }
        }

        match menus::reconcile_processed(&self.db, menu_id).await {
            Ok(Some((processed_dishes, total_dishes))) => {
                tracing::debug!(menu_id = %menu_id, processed_dishes, total_dishes, "Progress reconciled")
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(menu_id = %menu_id, error = %e, "Failed to reconcile progress")
            }
        }
    }

    async fn fail(&self, menu_id: Uuid, err: PipelineError) -> MenuStatus {
        tracing::error!(
            menu_id = %menu_id,
            code = %err.code,
            reason = %err.message,
            "Menu processing failed"
        );

        match menus::mark_failed(&self.db, menu_id, err.code, &err.message).await {
            Ok(true) => {
                self.event_bus.emit_lossy(MenuEvent::MenuFailed {
                    menu_id,
                    code: err.code.as_str().to_string(),
                    reason: err.message,
                    timestamp: Utc::now(),
                });
                MenuStatus::Failed
            }
            Ok(false) => self.current_status(menu_id).await,
            Err(e) => {
                tracing::error!(menu_id = %menu_id, error = %e, "Failed to record menu failure");
                MenuStatus::Failed
            }
        }
    }

    async fn current_status(&self, menu_id: Uuid) -> MenuStatus {
        match menus::load_menu(&self.db, menu_id).await {
            Ok(Some(menu)) => menu.status,
            _ => MenuStatus::Failed,
        }
    }
}
