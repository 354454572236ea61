use chrono::{DateTime, Utc};
use serde::Serialize;

use super::command::Command;

/// Message carried by the `connected` event.
pub const CONNECTED_MESSAGE: &str = "stream connected";

/// Events generated by the stream itself rather than by a producer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    Connected { message: String },
    Heartbeat { timestamp: DateTime<Utc> },
}

/// Everything that can appear on an open stream, one JSON object per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Control(ControlEvent),
    Command(Command),
}

impl StreamEvent {
    pub fn connected() -> Self {
        StreamEvent::Control(ControlEvent::Connected {
            message: CONNECTED_MESSAGE.to_string(),
        })
    }

    pub fn heartbeat(timestamp: DateTime<Utc>) -> Self {
        StreamEvent::Control(ControlEvent::Heartbeat { timestamp })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Control(ControlEvent::Connected { .. }) => "connected",
            StreamEvent::Control(ControlEvent::Heartbeat { .. }) => "heartbeat",
            StreamEvent::Command(cmd) => cmd.kind(),
        }
    }

    /// Serialize into the payload of a single stream frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Command> for StreamEvent {
    fn from(cmd: Command) -> Self {
        StreamEvent::Command(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_frame() {
        let frame = StreamEvent::connected().to_frame().unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["message"], CONNECTED_MESSAGE);
    }

    #[test]
    fn test_heartbeat_frame_has_iso_timestamp() {
        let now = Utc::now();
        let frame = StreamEvent::heartbeat(now).to_frame().unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "heartbeat");
        let ts = json["timestamp"].as_str().unwrap();
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), now);
    }

    #[test]
    fn test_command_frame_is_the_command_itself() {
        let cmd = Command::bot_command("push", Some("p9".into())).unwrap();
        let event = StreamEvent::from(cmd.clone());
        assert_eq!(event.kind(), "bot_command");
        let frame = event.to_frame().unwrap();
        assert_eq!(frame, serde_json::to_string(&cmd).unwrap());
    }
}
