//! Test Helper Utilities
//!
//! Fake vision/text/image services, a temp-file database and a fully wired
//! `AppState` for the pipeline and HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use menugen_ai::models::{Menu, MenuStatus};
use menugen_ai::services::{
    AiServices, ExtractionRequest, ImageService, ImageSubmission, PollHandle, PollStatus,
    ServiceError, TextPrompt, TextService, UploadedImage, VisionService,
};
use menugen_ai::AppState;
use menugen_common::config::PipelineConfig;
use menugen_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Bytes that sniff as PNG; `seed` makes the content (and hash) distinct
pub fn png_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[seed; 64]);
    bytes
}

pub fn png_upload(seed: u8) -> UploadedImage {
    UploadedImage {
        bytes: png_bytes(seed),
        content_type: "image/png".to_string(),
        filename: Some("menu.png".to_string()),
    }
}

/// Two named sections, five dishes
pub const TWO_SECTION_MENU: &str = r#"{
    "sections": [
        {"name": "Starters", "dishes": [
            {"name": "Oysters", "price": "Market Price"},
            {"name": "Soup of the Day", "price": "$6.00"}
        ]},
        {"name": "Mains", "dishes": [
            {"name": "Ribeye", "price": "$12.50"},
            {"name": "Roast Chicken", "price": "$18"},
            {"name": "Risotto", "price": null}
        ]}
    ]
}"#;

/// Pipeline tuning with near-zero backoff so retries do not slow tests down
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        enrichment_width: 3,
        service_retry_attempts: 3,
        service_retry_initial_ms: 1,
        service_retry_max_ms: 2,
        image_poll_attempts: 5,
        image_poll_initial_ms: 1,
        image_poll_max_ms: 2,
        image_poll_timeout_secs: 5,
        enrichment_timeout_secs: 30,
        ..PipelineConfig::default()
    }
}

/// Vision service returning a fixed payload
pub struct ScriptedVision {
    response: Result<String, ServiceError>,
    pub calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn returning(payload: &str) -> Self {
        Self {
            response: Ok(payload.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: ServiceError) -> Self {
        Self {
            response: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionService for ScriptedVision {
    async fn extract_structure(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<String, ServiceError> {
        assert!(!request.image.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// Text service with per-dish failures, transient hiccups and in-flight gauge
pub struct FakeText {
    /// Dish names whose description permanently fails
    pub fail_for: HashSet<String>,
    /// Number of leading calls answered with HTTP 503
    transient_failures: AtomicUsize,
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// When set, every call records the menu's `total_dishes` first
    totals_db: Mutex<Option<SqlitePool>>,
    pub observed_totals: Mutex<Vec<i64>>,
}

impl Default for FakeText {
    fn default() -> Self {
        Self {
            fail_for: HashSet::new(),
            transient_failures: AtomicUsize::new(0),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            totals_db: Mutex::new(None),
            observed_totals: Mutex::new(Vec::new()),
        }
    }
}

impl FakeText {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            fail_for: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_transient_failures(count: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn observe_totals(&self, db: SqlitePool) {
        *self.totals_db.lock().unwrap() = Some(db);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextService for FakeText {
    async fn complete(&self, prompt: &TextPrompt) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let observed = self.totals_db.lock().unwrap().clone();
        if let Some(db) = observed {
            let total: i64 = sqlx::query_scalar("SELECT total_dishes FROM menus LIMIT 1")
                .fetch_one(&db)
                .await
                .unwrap();
            self.observed_totals.lock().unwrap().push(total);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let transient = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(ServiceError::Api {
                status: 503,
                message: "overloaded".into(),
            });
        }

        if self.fail_for.iter().any(|name| prompt.user.ends_with(name.as_str())) {
            return Err(ServiceError::Api {
                status: 400,
                message: "content rejected".into(),
            });
        }

        let dish = prompt.user.rsplit(": ").next().unwrap_or_default();
        Ok(format!("  A delicious plate of {}.  ", dish))
    }
}

/// How the fake image service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageBehavior {
    Ready,
    Fail,
    /// Pending on submit, then `n` processing polls before success
    PendingThenReady(usize),
}

pub struct FakeImage {
    behavior: ImageBehavior,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    polls_by_handle: Mutex<HashMap<String, usize>>,
}

impl FakeImage {
    pub fn new(behavior: ImageBehavior) -> Self {
        Self {
            behavior,
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            polls_by_handle: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ImageService for FakeImage {
    async fn submit(&self, prompt: &str) -> Result<ImageSubmission, ServiceError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ImageBehavior::Ready => Ok(ImageSubmission::Ready(format!(
                "https://img.test/{}.webp",
                n
            ))),
            ImageBehavior::Fail => Err(ServiceError::Rejected(format!(
                "refused prompt: {}",
                prompt
            ))),
            ImageBehavior::PendingThenReady(_) => Ok(ImageSubmission::Pending(PollHandle {
                id: format!("pred-{}", n),
                url: format!("https://api.test/predictions/pred-{}", n),
            })),
        }
    }

    async fn poll(&self, handle: &PollHandle) -> Result<PollStatus, ServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let seen = {
            let mut by_handle = self.polls_by_handle.lock().unwrap();
            let count = by_handle.entry(handle.id.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        match self.behavior {
            ImageBehavior::PendingThenReady(processing) if seen < processing => {
                Ok(PollStatus::Processing)
            }
            _ => Ok(PollStatus::Succeeded(format!(
                "https://img.test/{}.webp",
                handle.id
            ))),
        }
    }
}

/// Wired application plus handles on its fakes
///
/// `_dir` must stay alive for the duration of the test.
pub struct TestApp {
    pub _dir: TempDir,
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub state: AppState,
    pub vision: Arc<ScriptedVision>,
    pub text: Arc<FakeText>,
    pub image: Arc<FakeImage>,
}

impl TestApp {
    pub async fn new(vision: ScriptedVision, text: FakeText, image: FakeImage) -> Self {
        Self::with_config(vision, text, image, fast_pipeline_config()).await
    }

    pub async fn with_config(
        vision: ScriptedVision,
        text: FakeText,
        image: FakeImage,
        config: PipelineConfig,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let db = menugen_ai::db::init_database_pool(&dir.path().join("test_menugen.db"))
            .await
            .unwrap();
        let event_bus = EventBus::new(256);

        let vision = Arc::new(vision);
        let text = Arc::new(text);
        let image = Arc::new(image);
        let services = AiServices {
            vision: vision.clone(),
            text: text.clone(),
            image: image.clone(),
        };

        let state = AppState::new(db.clone(), event_bus.clone(), services, &config);

        Self {
            _dir: dir,
            db,
            event_bus,
            state,
            vision,
            text,
            image,
        }
    }

    /// Standard happy-path app over the two-section menu
    pub async fn happy() -> Self {
        Self::new(
            ScriptedVision::returning(TWO_SECTION_MENU),
            FakeText::default(),
            FakeImage::new(ImageBehavior::Ready),
        )
        .await
    }

    /// Upload and wait for the pipeline to finish
    pub async fn ingest_and_join(&self, seed: u8) -> Menu {
        let outcome = self.state.ingestion.ingest(png_upload(seed)).await.unwrap();
        self.state.supervisor.join(outcome.menu.id).await;
        self.menu(outcome.menu.id).await
    }

    pub async fn menu(&self, menu_id: Uuid) -> Menu {
        menugen_ai::db::menus::load_menu(&self.db, menu_id)
            .await
            .unwrap()
            .expect("menu exists")
    }

    /// Poll the store until the menu reaches `status` (5s cap)
    pub async fn wait_for_status(&self, menu_id: Uuid, status: MenuStatus) {
        for _ in 0..500 {
            if self.menu(menu_id).await.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("menu {} never reached {}", menu_id, status);
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.db).await.unwrap()
    }
}
