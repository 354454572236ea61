use axum::extract::{Path, State};
use axum::Json;

use crate::state::AppState;

/// Backlog size for one recipient. Unknown recipients report zero.
pub async fn get_queue(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> Json<serde_json::Value> {
    let pending = state.dispatcher.size_of(&recipient_id);
    Json(serde_json::json!({
        "recipient_id": recipient_id,
        "pending": pending
    }))
}
