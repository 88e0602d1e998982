//! Model catalogue endpoint.

use axum::extract::{Json, State};

use crate::state::AppState;
use crate::types::ModelsResponse;

/// List available models.
///
/// Free models from the gateway, or a built-in list when the gateway
/// cannot be reached.
#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "Available models", body = ModelsResponse),
    ),
    tag = "Models"
)]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.gateway().list_models().await;
    tracing::debug!(count = models.len(), "models listed");
    Json(ModelsResponse {
        count: models.len(),
        models,
    })
}
