pub mod command;
pub mod dispatcher;
pub mod events;
pub mod heartbeat;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod transport;

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use tokio_stream::StreamExt;

use crate::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// `GET /sse/{recipient_id}`: open a command stream for a recipient.
///
/// The session runs on its own task; this handler only hands its frames to
/// the response body. Dropping the body (client gone) is how the session
/// learns the peer has closed.
pub async fn stream(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> impl IntoResponse {
    let source = state.dispatcher.open_stream(&recipient_id);
    let events = source
        .into_stream()
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            // Keep reverse proxies (nginx) from batching frames.
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events),
    )
}
