use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::gateway::command::Command;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendCommand {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OperatorReply {
    pub user_id: Option<String>,
    pub message: Option<String>,
    pub reply_to_message_id: Option<String>,
}

fn require(value: Option<String>, what: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing {what}")))
}

/// `POST /send_command`: queue a bot command for a client.
pub async fn send_command(
    State(state): State<AppState>,
    Json(input): Json<SendCommand>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require(input.user_id, "user_id or action")?;
    let action = require(input.action, "user_id or action")?;
    let command = Command::bot_command(action, input.payment_id)?;
    let pending = state.dispatcher.enqueue(&user_id, command)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "pending": pending
    })))
}

/// `POST /operator_reply`: queue an operator chat message for a client.
pub async fn operator_reply(
    State(state): State<AppState>,
    Json(input): Json<OperatorReply>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require(input.user_id, "user_id or message")?;
    let message = require(input.message, "user_id or message")?;
    let command = Command::operator_reply(message)?;
    let message_id = command
        .message_id()
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal("operator reply without message id".into()))?;

    if let Some(reply_to) = input.reply_to_message_id.as_deref() {
        tracing::debug!(user_id = %user_id, reply_to, "operator reply threads a client message");
    }
    let pending = state.dispatcher.enqueue(&user_id, command)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message_id": message_id,
        "pending": pending
    })))
}
