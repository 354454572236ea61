mod commands;
mod health;
mod queues;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health))
        .route("/sse/{recipient_id}", get(crate::gateway::stream))
        .route("/send_command", post(commands::send_command))
        .route("/operator_reply", post(commands::operator_reply))
        .route("/queues/{recipient_id}", get(queues::get_queue))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("unknown route".to_string())
}

/// Browser clients live on other origins. An explicit allow-list also
/// permits credentials; without one any origin is accepted.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
