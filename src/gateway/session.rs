use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::command::Command;
use super::events::StreamEvent;
use super::heartbeat::{heartbeat_timer, poll_timer};
use super::queue::{QueueLease, RecipientQueue};
use super::transport::{EventSink, SendError};
use crate::config::{SessionPolicy, StreamSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Steady,
    Closed,
}

/// Why a session reached `Closed`. None of these touch the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed,
    SendFailed,
    Shutdown,
    Preempted,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::PeerClosed => "peer_closed",
            SessionEnd::SendFailed => "send_failed",
            SessionEnd::Shutdown => "shutdown",
            SessionEnd::Preempted => "preempted",
        }
    }
}

enum Wake {
    Shutdown,
    PeerClosed,
    Heartbeat,
    Poll,
}

/// Drives one open stream: `connected`, backlog replay, then heartbeats and
/// queue polling until the peer goes away.
pub struct StreamSession {
    session_id: String,
    queue: Arc<RecipientQueue>,
    generation: u64,
    sink: EventSink,
    settings: StreamSettings,
    shutdown: CancellationToken,
    state: SessionState,
    lease: Option<QueueLease>,
    last_heartbeat: Instant,
    last_poll: Instant,
    delivered: u64,
}

impl StreamSession {
    pub fn new(
        session_id: String,
        queue: Arc<RecipientQueue>,
        generation: u64,
        sink: EventSink,
        settings: StreamSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            queue,
            generation,
            sink,
            settings,
            shutdown,
            state: SessionState::Open,
            lease: None,
            last_heartbeat: now,
            last_poll: now,
            delivered: 0,
        }
    }

    pub fn recipient_id(&self) -> &str {
        self.queue.recipient_id()
    }

    pub async fn run(mut self) -> SessionEnd {
        let end = match self.open().await {
            Ok(()) => {
                self.state = SessionState::Steady;
                self.steady().await
            }
            Err(end) => end,
        };
        self.state = SessionState::Closed;
        // Any unsent replay is back in the queue by now.
        drop(self.lease.take());
        self.queue.detach();
        tracing::info!(
            recipient_id = %self.recipient_id(),
            session_id = %self.session_id,
            reason = end.as_str(),
            delivered = self.delivered,
            remaining = self.queue.len(),
            since_heartbeat_ms = self.last_heartbeat.elapsed().as_millis() as u64,
            "stream session closed, backlog kept for reconnect"
        );
        end
    }

    async fn open(&mut self) -> Result<(), SessionEnd> {
        self.send_event(&StreamEvent::connected()).await?;
        if self.settings.policy == SessionPolicy::Exclusive {
            self.acquire_lease().await?;
        }

        let backlog = self.queue.drain_all();
        tracing::info!(
            recipient_id = %self.recipient_id(),
            session_id = %self.session_id,
            backlog = backlog.len(),
            "stream session opened"
        );
        self.deliver_batch(backlog).await
    }

    /// Wait for a preempted predecessor to put its unsent replay back before
    /// this session takes the backlog.
    async fn acquire_lease(&mut self) -> Result<(), SessionEnd> {
        let queue = Arc::clone(&self.queue);
        let lease = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(SessionEnd::Shutdown),
            _ = self.sink.closed() => return Err(SessionEnd::PeerClosed),
            lease = queue.lease() => lease,
        };
        self.lease = Some(lease);
        match self.interrupted() {
            Some(end) => Err(end),
            None => Ok(()),
        }
    }

    /// Send an already-dequeued batch in order. Whatever is not sent goes
    /// back to the head of the queue, still in order.
    async fn deliver_batch(&mut self, batch: Vec<Command>) -> Result<(), SessionEnd> {
        let mut pending = VecDeque::from(batch);
        while !pending.is_empty() {
            if let Some(end) = self.interrupted() {
                self.queue.restore(pending.into());
                return Err(end);
            }
            let Some(command) = pending.pop_front() else {
                break;
            };
            if let Err(end) = self.send_command(&command).await {
                pending.push_front(command);
                let restored = pending.len();
                self.queue.restore(pending.into());
                tracing::warn!(
                    recipient_id = %self.recipient_id(),
                    session_id = %self.session_id,
                    restored,
                    "backlog replay interrupted, undelivered commands requeued"
                );
                return Err(end);
            }
        }
        Ok(())
    }

    async fn steady(&mut self) -> SessionEnd {
        let start = Instant::now();
        let mut heartbeat = heartbeat_timer(start, self.settings.heartbeat_interval);
        let mut poll = poll_timer(start, self.settings.poll_interval);
        let queue = Arc::clone(&self.queue);

        // Commands appended between the backlog drain and the first wait
        // would otherwise sit until the first poll tick.
        let mut check_now = true;

        loop {
            let notified = queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(end) = self.interrupted() {
                return end;
            }

            let wake = if std::mem::take(&mut check_now) {
                Wake::Poll
            } else {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Wake::Shutdown,
                    _ = self.sink.closed() => Wake::PeerClosed,
                    _ = heartbeat.tick() => Wake::Heartbeat,
                    _ = &mut notified => Wake::Poll,
                    _ = poll.tick() => Wake::Poll,
                }
            };

            let result = match wake {
                Wake::Shutdown => Err(SessionEnd::Shutdown),
                Wake::PeerClosed => Err(SessionEnd::PeerClosed),
                Wake::Heartbeat => self.send_heartbeat().await,
                Wake::Poll => self.drain_queue().await,
            };
            if let Err(end) = result {
                return end;
            }
        }
    }

    /// Pop and send until the queue is empty.
    async fn drain_queue(&mut self) -> Result<(), SessionEnd> {
        self.last_poll = Instant::now();
        let mut sent = 0usize;
        loop {
            if let Some(end) = self.interrupted() {
                return Err(end);
            }
            let Some(command) = self.queue.pop_front() else {
                break;
            };
            if let Err(end) = self.send_command(&command).await {
                self.queue.push_front(command);
                tracing::warn!(
                    recipient_id = %self.recipient_id(),
                    session_id = %self.session_id,
                    "delivery failed, command requeued at head"
                );
                return Err(end);
            }
            sent += 1;
        }
        if sent > 0 {
            tracing::debug!(
                recipient_id = %self.recipient_id(),
                session_id = %self.session_id,
                sent,
                "delivered queued commands"
            );
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), SessionEnd> {
        self.send_event(&StreamEvent::heartbeat(Utc::now())).await?;
        self.last_heartbeat = Instant::now();
        tracing::trace!(
            session_id = %self.session_id,
            since_poll_ms = self.last_poll.elapsed().as_millis() as u64,
            "heartbeat sent"
        );
        Ok(())
    }

    async fn send_event(&mut self, event: &StreamEvent) -> Result<(), SessionEnd> {
        self.write(event).await.map_err(|e| self.failure(e))?;
        tracing::trace!(session_id = %self.session_id, kind = event.kind(), "event sent");
        Ok(())
    }

    async fn send_command(&mut self, command: &Command) -> Result<(), SessionEnd> {
        let event = StreamEvent::from(command.clone());
        match self.write(&event).await {
            Ok(()) => {
                self.delivered += 1;
                tracing::debug!(
                    recipient_id = %self.recipient_id(),
                    kind = command.kind(),
                    action = command.action(),
                    "command delivered"
                );
                Ok(())
            }
            // Retrying can never succeed, and requeueing would wedge the
            // queue behind it.
            Err(SendError::Serialize(e)) => {
                tracing::error!(
                    recipient_id = %self.recipient_id(),
                    action = command.action(),
                    "dropping command that cannot be serialized: {e}"
                );
                Ok(())
            }
            Err(e) => Err(self.failure(e)),
        }
    }

    async fn write(&self, event: &StreamEvent) -> Result<(), SendError> {
        let frame = event.to_frame()?;
        self.sink.send(frame).await
    }

    fn failure(&self, err: SendError) -> SessionEnd {
        tracing::debug!(
            session_id = %self.session_id,
            state = ?self.state,
            "stream write failed: {err}"
        );
        match err {
            SendError::Closed => SessionEnd::PeerClosed,
            SendError::Timeout(_) | SendError::Serialize(_) => SessionEnd::SendFailed,
        }
    }

    /// Checked between sends, never during one.
    fn interrupted(&self) -> Option<SessionEnd> {
        if self.shutdown.is_cancelled() {
            return Some(SessionEnd::Shutdown);
        }
        if self.settings.policy == SessionPolicy::Exclusive
            && self.queue.current_generation() != self.generation
        {
            return Some(SessionEnd::Preempted);
        }
        None
    }
}
