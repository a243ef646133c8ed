//! Menu API handlers
//!
//! POST /api/menu, GET /api/menu/:menu_id, POST /api/menu/:menu_id/abort
//!
//! Once a menu id exists every failure is reported as data in the status
//! payload; only unknown ids and malformed uploads produce error responses.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{dishes, menus};
use crate::error::{ApiError, ApiResult};
use crate::models::{Dish, DishStatus, Menu, MenuStatus, Section};
use crate::services::{Progress, UploadedImage};
use crate::AppState;

/// Multipart field carrying the menu photo
pub const IMAGE_FIELD: &str = "image";

/// POST /api/menu response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub menu_id: Uuid,
    pub status: MenuStatus,
    /// True when the bytes matched an existing menu
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct FailureView {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DishView {
    pub id: Uuid,
    pub section_id: Option<Uuid>,
    pub name: String,
    pub price_cents: Option<i64>,
    pub currency: String,
    pub raw_price_string: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: DishStatus,
    pub failure_reason: Option<String>,
    pub position: i64,
}

impl From<Dish> for DishView {
    fn from(dish: Dish) -> Self {
        Self {
            id: dish.id,
            section_id: dish.section_id,
            name: dish.name,
            price_cents: dish.price_cents,
            currency: dish.currency,
            raw_price_string: dish.raw_price_string,
            description: dish.description,
            image_url: dish.image_url,
            status: dish.status,
            failure_reason: dish.failure_reason,
            position: dish.position,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub id: Uuid,
    pub name: String,
    pub position: i64,
    pub dishes: Vec<DishView>,
}

/// Structured menu, returned once the menu is COMPLETE
#[derive(Debug, Serialize)]
pub struct MenuView {
    pub sections: Vec<SectionView>,
    /// Dishes extracted without a section heading
    pub ungrouped_dishes: Vec<DishView>,
}

/// GET /api/menu/:menu_id response
#[derive(Debug, Serialize)]
pub struct MenuStatusResponse {
    pub menu_id: Uuid,
    pub status: MenuStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureView>,
}

/// POST /api/menu/:menu_id/abort response
#[derive(Debug, Serialize)]
pub struct AbortResponse {
    pub menu_id: Uuid,
    pub status: MenuStatus,
    pub abort_requested: bool,
}

/// Group dishes under their sections (both already position-ordered)
pub fn assemble_menu(sections: Vec<Section>, dishes: Vec<Dish>) -> MenuView {
    let mut section_views: Vec<SectionView> = sections
        .into_iter()
        .map(|section| SectionView {
            id: section.id,
            name: section.name,
            position: section.position,
            dishes: Vec::new(),
        })
        .collect();
    let mut ungrouped_dishes = Vec::new();

    for dish in dishes {
        let slot = dish
            .section_id
            .and_then(|id| section_views.iter_mut().find(|s| s.id == id));
        match slot {
            Some(section) => section.dishes.push(dish.into()),
            None => ungrouped_dishes.push(dish.into()),
        }
    }

    MenuView {
        sections: section_views,
        ungrouped_dishes,
    }
}

fn not_found(menu_id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Menu not found: {}", menu_id))
}

/// POST /api/menu
///
/// Accept a menu photo. 202 Accepted for new content, 200 OK when the same
/// bytes were uploaded before (the existing menu is returned).
pub async fn upload_menu(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = field.file_name().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Failed to read image field: {}", e)))?;

        upload = Some(UploadedImage {
            bytes: bytes.to_vec(),
            content_type,
            filename,
        });
        break;
    }

    let upload = upload.ok_or_else(|| {
        ApiError::Validation(format!("Missing multipart field '{}'", IMAGE_FIELD))
    })?;

    let outcome = state.ingestion.ingest(upload).await?;
    let status = if outcome.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(UploadResponse {
            menu_id: outcome.menu.id,
            status: outcome.menu.status,
            duplicate: !outcome.created,
        }),
    ))
}

/// GET /api/menu/:menu_id
pub async fn get_menu_status(
    State(state): State<AppState>,
    Path(menu_id): Path<Uuid>,
) -> ApiResult<Json<MenuStatusResponse>> {
    let menu = menus::load_menu(&state.db, menu_id)
        .await?
        .ok_or_else(|| not_found(menu_id))?;

    tracing::debug!(menu_id = %menu_id, status = %menu.status, "Status query");

    let progress = if menu.has_progress() {
        state.progress.snapshot(menu_id).await?
    } else {
        None
    };

    let structured = if menu.status == MenuStatus::Complete {
        let sections = dishes::list_sections(&state.db, menu_id).await?;
        let dishes = dishes::list_dishes(&state.db, menu_id).await?;
        Some(assemble_menu(sections, dishes))
    } else {
        None
    };

    Ok(Json(status_response(menu, progress, structured)))
}

fn status_response(
    menu: Menu,
    progress: Option<Progress>,
    structured: Option<MenuView>,
) -> MenuStatusResponse {
    let error = (menu.status == MenuStatus::Failed).then(|| FailureView {
        code: menu
            .failure_code
            .map(|code| code.as_str().to_string())
            .unwrap_or_else(|| "INTERNAL_ERROR".to_string()),
        message: menu.failure_reason.clone().unwrap_or_default(),
    });

    MenuStatusResponse {
        menu_id: menu.id,
        status: menu.status,
        progress,
        menu: structured,
        error,
    }
}

/// POST /api/menu/:menu_id/abort
///
/// Cancel the enrichment fan-out of a running menu. Unfinished dishes fail
/// with ENRICHMENT_ABORTED and the menu still completes.
pub async fn abort_menu(
    State(state): State<AppState>,
    Path(menu_id): Path<Uuid>,
) -> ApiResult<Json<AbortResponse>> {
    let menu = menus::load_menu(&state.db, menu_id)
        .await?
        .ok_or_else(|| not_found(menu_id))?;

    if !state.supervisor.abort(menu_id).await {
        return Err(ApiError::Conflict(format!(
            "Menu {} has no running pipeline (status {})",
            menu_id, menu.status
        )));
    }

    tracing::info!(menu_id = %menu_id, status = %menu.status, "Menu abort requested");

    Ok(Json(AbortResponse {
        menu_id,
        status: menu.status,
        abort_requested: true,
    }))
}

/// Build menu routes
pub fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/api/menu", post(upload_menu))
        .route("/api/menu/:menu_id", get(get_menu_status))
        .route("/api/menu/:menu_id/abort", post(abort_menu))
}
