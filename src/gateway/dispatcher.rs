use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::command::{Command, CommandError};
use super::registry::QueueRegistry;
use super::session::StreamSession;
use super::transport::{self, EventSource};
use crate::config::StreamSettings;

/// Aggregate view for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub recipient_count: usize,
    pub total_pending_commands: usize,
    pub active_sessions: usize,
}

/// Owns every recipient queue and the stream sessions draining them.
pub struct Dispatcher {
    registry: QueueRegistry,
    settings: StreamSettings,
    backlog_warn_threshold: usize,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    active_sessions: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(settings: StreamSettings, backlog_warn_threshold: usize) -> Self {
        Self {
            registry: QueueRegistry::new(),
            settings,
            backlog_warn_threshold,
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    /// Queue a command for a recipient, connected or not. Returns the
    /// backlog length after the append.
    pub fn enqueue(&self, recipient_id: &str, command: Command) -> Result<usize, CommandError> {
        if recipient_id.trim().is_empty() {
            return Err(CommandError::MissingField("recipient_id"));
        }
        let kind = command.kind();
        let action = command.action().to_string();
        let pending = self.registry.enqueue(recipient_id, command);

        tracing::info!(recipient_id, kind, action = %action, pending, "command queued");
        if pending > self.backlog_warn_threshold {
            tracing::warn!(
                recipient_id,
                pending,
                "large backlog, client is probably offline; commands wait for reconnect"
            );
        }
        Ok(pending)
    }

    /// Start a stream session for the recipient on its own task and return
    /// the frame source the transport should serve.
    pub fn open_stream(&self, recipient_id: &str) -> EventSource {
        let (queue, generation) = self.registry.attach(recipient_id);
        let (sink, source) = transport::channel();
        let session = StreamSession::new(
            uuid::Uuid::new_v4().to_string(),
            queue,
            generation,
            sink,
            self.settings.clone(),
            self.shutdown.child_token(),
        );

        let active = Arc::clone(&self.active_sessions);
        active.fetch_add(1, Ordering::SeqCst);
        self.sessions.spawn(async move {
            session.run().await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
        source
    }

    pub fn size_of(&self, recipient_id: &str) -> usize {
        self.registry.size_of(recipient_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            recipient_count: self.registry.all_keys().len(),
            total_pending_commands: self.registry.total_pending_count(),
            active_sessions: self.active_sessions(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask every session to leave its loop and wait up to `grace` for them.
    /// Returns false if some session was still running when time ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.sessions.close();
        tokio::time::timeout(grace, self.sessions.wait()).await.is_ok()
    }
}
