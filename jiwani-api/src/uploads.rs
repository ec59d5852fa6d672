use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use jiwani_catalog::menu::{image_extension, ALLOWED_IMAGE_EXTENSIONS};

use crate::error::AppError;
use crate::state::AppState;

// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Name to store as a menu item's `image`.
    pub image: String,
    pub url: String,
}

pub fn routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/uploads/menu-images", post(upload_menu_image))
        .layer(DefaultBodyLimit::max(max_bytes + MULTIPART_OVERHEAD))
}

/// POST /api/uploads/menu-images
async fn upload_menu_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| AppError::ValidationError(e.body_text());

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("image") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let ext = image_extension(&original).ok_or_else(|| {
            AppError::ValidationError(format!("image must be one of: {}", ALLOWED_IMAGE_EXTENSIONS.join(", ")))
        })?;

        let data = field.bytes().await.map_err(bad_request)?;
        if data.is_empty() {
            return Err(AppError::ValidationError("image is empty".to_string()));
        }
        if data.len() > state.uploads.max_bytes {
            return Err(AppError::ValidationError(format!(
                "image exceeds {} bytes",
                state.uploads.max_bytes
            )));
        }

        let name = format!("{}.{}", Uuid::new_v4().simple(), ext);
        tokio::fs::create_dir_all(&state.uploads.dir)
            .await
            .map_err(|e| AppError::Anyhow(e.into()))?;
        tokio::fs::write(state.uploads.dir.join(&name), &data)
            .await
            .map_err(|e| AppError::Anyhow(e.into()))?;

        tracing::info!("Stored menu image {} ({} bytes)", name, data.len());
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse { url: format!("/uploads/{}", name), image: name }),
        ));
    }

    Err(AppError::ValidationError("multipart field 'image' is required".to_string()))
}
