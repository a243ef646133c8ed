//! Per-dish enrichment fan-out / fan-in
//!
//! One task per dish, at most `width` in flight, joined before the caller
//! decides the menu's terminal state. Each task:
//! 1. generates a description (required, failure fails the dish)
//! 2. generates an image (optional, failure leaves `image_url` null)
//! 3. writes the dish's terminal status and advances progress once
//!
//! A cancelled token or a passed deadline turns every unfinished dish into
//! FAILED / ENRICHMENT_ABORTED. Aborted dishes still count toward progress.

use menugen_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::dishes;
use crate::error::PipelineError;
use crate::models::{DishStatus, FailureCode};
use crate::services::description_generator::DescriptionGenerator;
use crate::services::image_generator::ImageGenerator;
use crate::services::progress_tracker::ProgressTracker;
use crate::utils::BoundedPool;

/// How one dish task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DishOutcome {
    Completed {
        description: String,
        image_url: Option<String>,
    },
    Failed(PipelineError),
}

/// Tally of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub completed: usize,
    pub with_image: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl EnrichmentSummary {
    fn record(&mut self, outcome: &DishOutcome) {
        match outcome {
            DishOutcome::Completed { image_url, .. } => {
                self.completed += 1;
                if image_url.is_some() {
                    self.with_image += 1;
                }
            }
            DishOutcome::Failed(err) if err.code == FailureCode::EnrichmentAborted => {
                self.aborted += 1
            }
            DishOutcome::Failed(_) => self.failed += 1,
        }
    }
}

pub struct EnrichmentScheduler {
    db: SqlitePool,
    descriptions: Arc<DescriptionGenerator>,
    images: Arc<ImageGenerator>,
    progress: ProgressTracker,
    pool: BoundedPool,
}

impl EnrichmentScheduler {
    pub fn new(
        db: SqlitePool,
        descriptions: Arc<DescriptionGenerator>,
        images: Arc<ImageGenerator>,
        progress: ProgressTracker,
        width: usize,
    ) -> Self {
        Self {
            db,
            descriptions,
            images,
            progress,
            pool: BoundedPool::new(width),
        }
    }

    /// Enrich every dish and wait for all of them
    pub async fn run(
        &self,
        menu_id: Uuid,
        dish_ids: Vec<Uuid>,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> EnrichmentSummary {
        let total = dish_ids.len();
        tracing::info!(
            menu_id = %menu_id,
            dishes = total,
            width = self.pool.width(),
            "Starting dish enrichment"
        );

        let outcomes = self
            .pool
            .run_all(dish_ids, |dish_id| {
                self.enrich_dish(menu_id, dish_id, cancel, deadline)
            })
            .await;

        let mut summary = EnrichmentSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }

        tracing::info!(
            menu_id = %menu_id,
            total,
            completed = summary.completed,
            with_image = summary.with_image,
            failed = summary.failed,
            aborted = summary.aborted,
            "Dish enrichment finished"
        );

        summary
    }

    async fn enrich_dish(
        &self,
        menu_id: Uuid,
        dish_id: Uuid,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> DishOutcome {
        let outcome = if cancel.is_cancelled() {
            aborted("enrichment aborted")
        } else if Instant::now() >= deadline {
            aborted("enrichment timed out")
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => aborted("enrichment aborted"),
                _ = tokio::time::sleep_until(deadline) => aborted("enrichment timed out"),
                outcome = self.generate(dish_id) => outcome,
            }
        };

        match self.finish_dish(menu_id, dish_id, &outcome).await {
            Ok(()) => outcome,
            Err(e) => {
                tracing::error!(
                    menu_id = %menu_id,
                    dish_id = %dish_id,
                    error = %e,
                    "Failed to record dish outcome"
                );
                self.fail_after_store_error(menu_id, dish_id, &e.to_string())
                    .await
                    .unwrap_or(outcome)
            }
        }
    }

    /// Second attempt at a terminal write after `finish_dish` errored
    ///
    /// Returns the replacement outcome when the dish was moved to FAILED here.
    /// A dish that is already terminal only missed its progress increment,
    /// which the pipeline reconciles after the fan-out.
    async fn fail_after_store_error(
        &self,
        menu_id: Uuid,
        dish_id: Uuid,
        cause: &str,
    ) -> Option<DishOutcome> {
        let err = PipelineError::new(
            FailureCode::Persistence,
            format!("failed to record dish outcome: {}", cause),
        );

        match dishes::fail_dish(&self.db, dish_id, &err.to_string()).await {
            Ok(true) => {
                if let Err(e) = self
                    .progress
                    .record_terminal(menu_id, dish_id, DishStatus::Failed, false)
                    .await
                {
                    tracing::warn!(dish_id = %dish_id, error = %e, "Progress not advanced after store error");
                }
                Some(DishOutcome::Failed(err))
            }
            Ok(false) => None,
            Err(e) => {
                tracing::error!(
                    menu_id = %menu_id,
                    dish_id = %dish_id,
                    error = %e,
                    "Dish left pending after store error"
                );
                None
            }
        }
    }

    async fn generate(&self, dish_id: Uuid) -> DishOutcome {
        let name = match dishes::load_dish(&self.db, dish_id).await {
            Ok(Some(dish)) => dish.name,
            Ok(None) => {
                return DishOutcome::Failed(PipelineError::new(
                    FailureCode::EnrichmentDescription,
                    format!("Dish {} not found", dish_id),
                ))
            }
            Err(e) => {
                return DishOutcome::Failed(PipelineError::new(
                    FailureCode::EnrichmentDescription,
                    format!("Failed to load dish: {}", e),
                ))
            }
        };

        let description = match self.descriptions.generate(&name).await {
            Ok(description) => description,
            Err(e) => {
                tracing::warn!(dish_id = %dish_id, dish = %name, error = %e, "Description generation failed");
                return DishOutcome::Failed(e);
            }
        };

        let image_url = match self.images.generate(&name).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(
                    dish_id = %dish_id,
                    dish = %name,
                    error = %e,
                    "Image generation failed, completing dish without image"
                );
                None
            }
        };

        DishOutcome::Completed {
            description,
            image_url,
        }
    }

    /// Persist the terminal status, then advance progress exactly once
    async fn finish_dish(&self, menu_id: Uuid, dish_id: Uuid, outcome: &DishOutcome) -> Result<()> {
        let (transitioned, status, has_image) = match outcome {
            DishOutcome::Completed {
                description,
                image_url,
            } => (
                dishes::complete_dish(&self.db, dish_id, description, image_url.as_deref()).await?,
                DishStatus::Complete,
                image_url.is_some(),
            ),
            DishOutcome::Failed(err) => (
                dishes::fail_dish(&self.db, dish_id, &err.to_string()).await?,
                DishStatus::Failed,
                false,
            ),
        };

        if !transitioned {
            tracing::warn!(dish_id = %dish_id, "Dish already terminal, progress not advanced");
            return Ok(());
        }

        self.progress
            .record_terminal(menu_id, dish_id, status, has_image)
            .await?;
        Ok(())
    }
}

fn aborted(message: &str) -> DishOutcome {
    DishOutcome::Failed(PipelineError::new(FailureCode::EnrichmentAborted, message))
}
