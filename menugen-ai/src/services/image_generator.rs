//! Dish image generation with asynchronous polling
//!
//! The image service either answers with an image URL straight away or hands
//! back a poll handle. Polling waits with increasing backoff between
//! attempts, is capped in attempt count and sits under a hard overall
//! timeout. An explicit failed status ends polling immediately.

use menugen_common::config::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;
use crate::models::FailureCode;
use crate::services::providers::{ImageService, ImageSubmission, PollHandle, PollStatus};
use crate::utils::{retry_transient, RetryPolicy};

/// Prompt for a food photo of `dish_name`
pub fn image_prompt(dish_name: &str) -> String {
    format!(
        "A beautiful, appetizing photo of {}, food photography, professional lighting, clean background",
        dish_name
    )
}

/// Poll budget for one pending image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Attempt cap and the delay curve between polls
    pub backoff: RetryPolicy,
    pub overall_timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            backoff: RetryPolicy::new(
                config.image_poll_attempts,
                Duration::from_millis(config.image_poll_initial_ms),
                Duration::from_millis(config.image_poll_max_ms),
            ),
            overall_timeout: Duration::from_secs(config.image_poll_timeout_secs),
        }
    }
}

pub struct ImageGenerator {
    image: Arc<dyn ImageService>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl ImageGenerator {
    pub fn new(image: Arc<dyn ImageService>, retry: RetryPolicy, poll: PollPolicy) -> Self {
        Self { image, retry, poll }
    }

    /// Generate an image and return its URL
    pub async fn generate(&self, dish_name: &str) -> Result<String, PipelineError> {
        let prompt = image_prompt(dish_name);

        let submission = retry_transient("submit_image", &self.retry, || self.image.submit(&prompt))
            .await
            .map_err(|e| image_error(format!("Failed to submit image generation: {}", e)))?;

        match submission {
            ImageSubmission::Ready(url) => Ok(url),
            ImageSubmission::Pending(handle) => {
                match tokio::time::timeout(self.poll.overall_timeout, self.poll_until_done(&handle))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(image_error(format!(
                        "Image generation {} timed out after {}s",
                        handle.id,
                        self.poll.overall_timeout.as_secs()
                    ))),
                }
            }
        }
    }

    async fn poll_until_done(&self, handle: &PollHandle) -> Result<String, PipelineError> {
        let max_attempts = self.poll.backoff.max_attempts;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.poll.backoff.delay_after(attempt)).await;

            let status = retry_transient("poll_image", &self.retry, || self.image.poll(handle))
                .await
                .map_err(|e| image_error(format!("Failed to poll image generation: {}", e)))?;

            tracing::debug!(
                prediction_id = %handle.id,
                attempt,
                max_attempts,
                status = ?status,
                "Polled image generation"
            );

            match status {
                PollStatus::Succeeded(url) => return Ok(url),
                PollStatus::Failed(reason) => {
                    return Err(image_error(format!("Image generation failed: {}", reason)))
                }
                PollStatus::Queued | PollStatus::Processing => {}
            }
        }

        Err(image_error(format!(
            "Image generation {} still pending after {} polls",
            handle.id, max_attempts
        )))
    }
}

fn image_error(message: String) -> PipelineError {
    PipelineError::new(FailureCode::EnrichmentImage, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::ServiceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedImages {
        submission: Result<ImageSubmission, ServiceError>,
        polls: Mutex<Vec<PollStatus>>,
        poll_calls: AtomicU32,
    }

    #[async_trait]
    impl ImageService for ScriptedImages {
        async fn submit(&self, prompt: &str) -> Result<ImageSubmission, ServiceError> {
            assert!(prompt.contains("food photography"));
            self.submission.clone()
        }

        async fn poll(&self, _handle: &PollHandle) -> Result<PollStatus, ServiceError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let mut polls = self.polls.lock().unwrap();
            if polls.is_empty() {
                Ok(PollStatus::Processing)
            } else {
                Ok(polls.remove(0))
            }
        }
    }

    fn pending() -> Result<ImageSubmission, ServiceError> {
        Ok(ImageSubmission::Pending(PollHandle {
            id: "pred-1".into(),
            url: "https://example.invalid/predictions/pred-1".into(),
        }))
    }

    fn generator(images: Arc<ScriptedImages>, attempts: u32, timeout_secs: u64) -> ImageGenerator {
        ImageGenerator::new(
            images,
            RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(10)),
            PollPolicy {
                backoff: RetryPolicy::new(attempts, Duration::from_secs(1), Duration::from_secs(8)),
                overall_timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    fn images(
        submission: Result<ImageSubmission, ServiceError>,
        polls: Vec<PollStatus>,
    ) -> Arc<ScriptedImages> {
        Arc::new(ScriptedImages {
            submission,
            polls: Mutex::new(polls),
            poll_calls: AtomicU32::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_image_needs_no_polling() {
        let svc = images(Ok(ImageSubmission::Ready("https://img/1.webp".into())), vec![]);
        let url = generator(svc.clone(), 5, 60).generate("Ramen").await.unwrap();
        assert_eq!(url, "https://img/1.webp");
        assert_eq!(svc.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_succeeded() {
        let svc = images(
            pending(),
            vec![
                PollStatus::Queued,
                PollStatus::Processing,
                PollStatus::Succeeded("https://img/2.webp".into()),
            ],
        );
        let url = generator(svc.clone(), 5, 60).generate("Ramen").await.unwrap();
        assert_eq!(url, "https://img/2.webp");
        assert_eq!(svc.poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_failure_stops_polling() {
        let svc = images(pending(), vec![PollStatus::Failed("NSFW filter".into())]);
        let err = generator(svc.clone(), 5, 60).generate("Ramen").await.unwrap_err();
        assert_eq!(err.code, FailureCode::EnrichmentImage);
        assert!(err.message.contains("NSFW filter"));
        assert_eq!(svc.poll_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap() {
        let svc = images(pending(), vec![]);
        let err = generator(svc.clone(), 3, 600).generate("Ramen").await.unwrap_err();
        assert!(err.message.contains("after 3 polls"));
        assert_eq!(svc.poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout() {
        // Delays 1+2+4+8+8... exceed 10s well before 50 attempts
        let svc = images(pending(), vec![]);
        let err = generator(svc.clone(), 50, 10).generate("Ramen").await.unwrap_err();
        assert_eq!(err.code, FailureCode::EnrichmentImage);
        assert!(err.message.contains("timed out"));
        assert!(svc.poll_calls.load(Ordering::SeqCst) < 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_error_is_image_failure() {
        let svc = images(
            Err(ServiceError::Api {
                status: 422,
                message: "bad prompt".into(),
            }),
            vec![],
        );
        let err = generator(svc, 5, 60).generate("Ramen").await.unwrap_err();
        assert_eq!(err.code, FailureCode::EnrichmentImage);
    }
}
