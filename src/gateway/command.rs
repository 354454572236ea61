use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action carried by every operator chat message.
pub const OPERATOR_REPLY_ACTION: &str = "operator_reply";

/// One unit of push-delivered data queued for a recipient.
///
/// The `type` tag is part of the wire format: a command serializes to the
/// exact JSON object the browser client receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    BotCommand(BotCommand),
    ChatMessage(ChatMessage),
}

/// An action triggered by the operator bot (`sms`, `push`, `success`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotCommand {
    pub action: String,
    pub payment_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A chat line written by an operator for the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub action: String,
    pub message: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A command rejected before it reaches any queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

fn required(field: &'static str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        Err(CommandError::MissingField(field))
    } else {
        Ok(())
    }
}

impl Command {
    pub fn bot_command(
        action: impl Into<String>,
        payment_id: Option<String>,
    ) -> Result<Self, CommandError> {
        let action = action.into();
        required("action", &action)?;
        Ok(Command::BotCommand(BotCommand {
            action,
            payment_id,
            timestamp: Utc::now(),
        }))
    }

    /// Builds an operator reply with a fresh `msg_<unix millis>` id.
    pub fn operator_reply(message: impl Into<String>) -> Result<Self, CommandError> {
        let message = message.into();
        required("message", &message)?;
        let now = Utc::now();
        Ok(Command::ChatMessage(ChatMessage {
            action: OPERATOR_REPLY_ACTION.to_string(),
            message,
            message_id: format!("msg_{}", now.timestamp_millis()),
            timestamp: now,
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::BotCommand(_) => "bot_command",
            Command::ChatMessage(_) => "chat_message",
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Command::BotCommand(c) => &c.action,
            Command::ChatMessage(c) => &c.action,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            Command::BotCommand(_) => None,
            Command::ChatMessage(c) => Some(&c.message_id),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Command::BotCommand(c) => c.timestamp,
            Command::ChatMessage(c) => c.timestamp,
        }
    }
}
