// Producer-side client: pushes a command into a running relay over HTTP, the
// same call the operator bot makes when an admin presses a button.
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "relay-send")]
#[command(about = "Queue a command for a pushrelay client")]
struct Args {
    /// Base URL of the relay
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Send a bot command (sms, push, wrong_card, wrong_sms, success, ...)
    Command {
        user_id: String,
        action: String,
        #[arg(long)]
        payment_id: Option<String>,
    },
    /// Send an operator chat reply
    Reply {
        user_id: String,
        message: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
}

impl Action {
    fn request(&self) -> (&'static str, serde_json::Value) {
        match self {
            Action::Command {
                user_id,
                action,
                payment_id,
            } => (
                "send_command",
                json!({ "user_id": user_id, "action": action, "payment_id": payment_id }),
            ),
            Action::Reply {
                user_id,
                message,
                reply_to,
            } => (
                "operator_reply",
                json!({ "user_id": user_id, "message": message, "reply_to_message_id": reply_to }),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (path, body) = args.command.request();
    let url = format!("{}/{path}", args.url.trim_end_matches('/'));

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let response = match client.post(&url).json(&body).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(url = %url, "request failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let status = response.status();
    let reply: serde_json::Value = response.json().await.unwrap_or_default();
    if status.is_success() {
        tracing::info!(url = %url, pending = %reply["pending"], "command queued");
        println!("{reply}");
        ExitCode::SUCCESS
    } else {
        tracing::error!(url = %url, status = %status, "relay rejected command: {reply}");
        ExitCode::FAILURE
    }
}
