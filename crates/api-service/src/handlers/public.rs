//! Unauthenticated demo endpoint.

use crate::handlers::ApiResponse;
use axum::Json;
use tracing::instrument;

/// Handler for GET /api/public
#[instrument(skip_all, name = "api.handlers.public")]
pub async fn get_public() -> Json<ApiResponse<()>> {
    Json(ApiResponse::success("Public endpoint is working", None))
}
