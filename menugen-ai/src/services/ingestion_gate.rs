//! Upload ingestion
//!
//! The only synchronous part of menu processing: validate the upload,
//! fingerprint the bytes, deduplicate against existing menus and, for new
//! content only, create the PENDING menu and detach its pipeline.

use chrono::Utc;
use menugen_common::events::{EventBus, MenuEvent};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::db::menus;
use crate::models::Menu;
use crate::services::pipeline::MenuPipeline;
use crate::services::supervisor::PipelineSupervisor;

/// Raw upload as received from the client
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Declared content type
    pub content_type: String,
    pub filename: Option<String>,
}

/// Ingestion failure
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Rejected before any menu exists
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] menugen_common::Error),
}

/// Result of an accepted upload
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub menu: Menu,
    /// False when the bytes matched an existing menu
    pub created: bool,
}

/// Hex SHA-256 of the uploaded bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Check size ceiling, declared type and sniffed type
pub fn validate_upload(upload: &UploadedImage, max_upload_bytes: usize) -> Result<(), IngestionError> {
    if upload.bytes.is_empty() {
        return Err(IngestionError::Validation("Uploaded image is empty".to_string()));
    }

    if upload.bytes.len() > max_upload_bytes {
        return Err(IngestionError::Validation(format!(
            "File size {} bytes exceeds the {} byte limit",
            upload.bytes.len(),
            max_upload_bytes
        )));
    }

    if !upload.content_type.to_ascii_lowercase().starts_with("image/") {
        return Err(IngestionError::Validation(format!(
            "File must be an image (declared content type: {})",
            upload.content_type
        )));
    }

    match infer::get(&upload.bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(()),
        Some(kind) => Err(IngestionError::Validation(format!(
            "File content is {}, not an image",
            kind.mime_type()
        ))),
        None => Err(IngestionError::Validation(
            "File content is not a recognized image format".to_string(),
        )),
    }
}

pub struct IngestionGate {
    db: SqlitePool,
    event_bus: EventBus,
    supervisor: PipelineSupervisor,
    pipeline: Arc<MenuPipeline>,
    max_upload_bytes: usize,
}

impl IngestionGate {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        supervisor: PipelineSupervisor,
        pipeline: Arc<MenuPipeline>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            event_bus,
            supervisor,
            pipeline,
            max_upload_bytes,
        }
    }

    /// Accept an upload, returning without waiting on any pipeline stage
    pub async fn ingest(&self, upload: UploadedImage) -> Result<IngestionOutcome, IngestionError> {
        validate_upload(&upload, self.max_upload_bytes)?;

        let image_hash = fingerprint(&upload.bytes);
        let candidate = Menu::new(
            image_hash,
            upload.content_type.clone(),
            upload.filename.clone(),
        );

        let (menu, created) = menus::insert_or_get_by_hash(&self.db, &candidate).await?;

        if !created {
            tracing::info!(
                menu_id = %menu.id,
                status = %menu.status,
                "Duplicate upload, returning existing menu"
            );
            return Ok(IngestionOutcome { menu, created });
        }

        tracing::info!(
            menu_id = %menu.id,
            bytes = upload.bytes.len(),
            content_type = %upload.content_type,
            "Menu created from upload"
        );
        self.event_bus.emit_lossy(MenuEvent::MenuCreated {
            menu_id: menu.id,
            timestamp: Utc::now(),
        });

        let pipeline = self.pipeline.clone();
        let menu_id = menu.id;
        let UploadedImage {
            bytes, content_type, ..
        } = upload;

        self.supervisor
            .spawn(menu_id, move |cancel| async move {
                pipeline.run(menu_id, bytes, content_type, cancel).await;
            })
            .await;

        Ok(IngestionOutcome { menu, created })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn upload(bytes: Vec<u8>, content_type: &str) -> UploadedImage {
        UploadedImage {
            bytes,
            content_type: content_type.to_string(),
            filename: Some("menu.png".into()),
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        bytes
    }

    #[test]
    fn test_fingerprint_is_stable_hex_sha256() {
        let hash = fingerprint(b"menu");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, fingerprint(b"menu"));
        assert_ne!(hash, fingerprint(b"menu2"));
    }

    #[test]
    fn test_valid_png_accepted() {
        assert!(validate_upload(&upload(png(), "image/png"), 1024).is_ok());
    }

    #[test]
    fn test_size_ceiling() {
        let err = validate_upload(&upload(png(), "image/png"), 10).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            validate_upload(&upload(vec![], "image/png"), 1024),
            Err(IngestionError::Validation(_))
        ));
    }

    #[test]
    fn test_declared_type_must_be_image() {
        let err = validate_upload(&upload(png(), "application/pdf"), 1024).unwrap_err();
        assert!(err.to_string().contains("must be an image"));
    }

    #[test]
    fn test_sniffed_type_must_be_image() {
        let pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let err = validate_upload(&upload(pdf, "image/png"), 1024).unwrap_err();
        assert!(err.to_string().contains("application/pdf"));

        let text = b"just some text that is not an image".to_vec();
        let err = validate_upload(&upload(text, "image/jpeg"), 1024).unwrap_err();
        assert!(err.to_string().contains("not a recognized image"));
    }
}
