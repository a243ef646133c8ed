//! Service modules for the menu ingest pipeline
//!
//! Leaf-first: providers and clients, generators, extraction and persistence,
//! progress and enrichment scheduling, then the pipeline, its supervisor and
//! the ingestion gate in front of it.

pub mod description_generator;
pub mod enrichment_scheduler;
pub mod image_generator;
pub mod ingestion_gate;
pub mod openai_client;
pub mod persistence_mapper;
pub mod pipeline;
pub mod price_parser;
pub mod progress_tracker;
pub mod providers;
pub mod replicate_client;
pub mod structure_extractor;
pub mod supervisor;

pub use description_generator::DescriptionGenerator;
pub use enrichment_scheduler::{DishOutcome, EnrichmentScheduler, EnrichmentSummary};
pub use image_generator::{ImageGenerator, PollPolicy};
pub use ingestion_gate::{IngestionError, IngestionGate, IngestionOutcome, UploadedImage};
pub use openai_client::OpenAiClient;
pub use persistence_mapper::{MappedMenu, PersistenceMapper};
pub use pipeline::{AiServices, MenuPipeline};
pub use price_parser::parse_price_cents;
pub use progress_tracker::{Progress, ProgressTracker};
pub use providers::{
    ExtractionRequest, ImageService, ImageSubmission, PollHandle, PollStatus, ServiceError,
    TextPrompt, TextService, VisionService,
};
pub use replicate_client::ReplicateClient;
pub use structure_extractor::StructureExtractor;
pub use supervisor::PipelineSupervisor;
