use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn banner() -> &'static str {
    "pushrelay command stream server"
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.dispatcher.health();
    Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("RELAY_BUILD_SHA"),
        "recipient_count": snapshot.recipient_count,
        "total_pending_commands": snapshot.total_pending_commands,
        "active_sessions": snapshot.active_sessions,
        "allowed_origins": state.allowed_origins.as_slice(),
        "timestamp": chrono::Utc::now(),
    }))
}
