use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::futures::Notified;
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};
use tokio::time::Instant;

use super::command::Command;

/// Ordered mailbox of pending commands for one recipient.
///
/// Insertion order is delivery order. The queue outlives any stream session
/// reading from it, so a backlog survives disconnects.
#[derive(Debug)]
pub struct RecipientQueue {
    recipient_id: String,
    inner: Mutex<Inner>,
    notify: Notify,
    sessions: AtomicUsize,
    generation: AtomicU64,
    /// Held by the consuming session under the exclusive policy.
    lease: Arc<AsyncMutex<()>>,
}

/// Exclusive right to consume a queue. Released on drop.
pub type QueueLease = OwnedMutexGuard<()>;

#[derive(Debug)]
struct Inner {
    commands: VecDeque<Command>,
    last_activity: Instant,
}

impl RecipientQueue {
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            inner: Mutex::new(Inner {
                commands: VecDeque::new(),
                last_activity: Instant::now(),
            }),
            notify: Notify::new(),
            sessions: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            lease: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    // Critical sections never panic halfway through a mutation, so a
    // poisoned lock still guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add to the tail and wake any session waiting on this queue.
    /// Returns the backlog length after the append.
    pub fn append(&self, command: Command) -> usize {
        let len = {
            let mut inner = self.lock();
            inner.commands.push_back(command);
            inner.last_activity = Instant::now();
            inner.commands.len()
        };
        self.notify.notify_waiters();
        len
    }

    /// Remove and return every queued command, oldest first.
    pub fn drain_all(&self) -> Vec<Command> {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        inner.commands.drain(..).collect()
    }

    pub fn pop_front(&self) -> Option<Command> {
        let mut inner = self.lock();
        let command = inner.commands.pop_front();
        if command.is_some() {
            inner.last_activity = Instant::now();
        }
        command
    }

    /// Put back a command whose delivery failed so it is the next one out.
    pub fn push_front(&self, command: Command) {
        let mut inner = self.lock();
        inner.commands.push_front(command);
        inner.last_activity = Instant::now();
    }

    /// Put back an ordered run of undelivered commands ahead of everything
    /// else. `restore(vec![a, b])` leaves the queue as `a, b, <rest>`.
    pub fn restore(&self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        let mut inner = self.lock();
        for command in commands.into_iter().rev() {
            inner.commands.push_front(command);
        }
        inner.last_activity = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().commands.is_empty()
    }

    /// Future resolved by the next `append` (or session takeover). Enable it
    /// before inspecting the queue to avoid missing a wake-up.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Register a new session. Returns the session's generation; the highest
    /// generation is the most recently opened session.
    pub fn attach(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify.notify_waiters();
        generation
    }

    /// Wait until no other session holds the queue. A preempted session
    /// keeps the lease until its unsent replay is restored, so the next
    /// holder always sees the backlog in order. Waiters are served FIFO.
    pub async fn lease(&self) -> QueueLease {
        Arc::clone(&self.lease).lock_owned().await
    }

    pub fn detach(&self) {
        self.sessions.fetch_sub(1, Ordering::SeqCst);
        self.lock().last_activity = Instant::now();
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether this queue can be dropped without losing anything: empty, no
    /// attached session, and untouched for at least `ttl`.
    pub fn is_evictable(&self, ttl: Duration, now: Instant) -> bool {
        if self.session_count() > 0 {
            return false;
        }
        let inner = self.lock();
        inner.commands.is_empty() && now.saturating_duration_since(inner.last_activity) >= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(action: &str) -> Command {
        Command::bot_command(action, None).unwrap()
    }

    fn actions(commands: &[Command]) -> Vec<&str> {
        commands.iter().map(|c| c.action()).collect()
    }

    #[test]
    fn test_pop_front_is_fifo() {
        let queue = RecipientQueue::new("u1");
        assert_eq!(queue.append(cmd("a")), 1);
        assert_eq!(queue.append(cmd("b")), 2);
        assert_eq!(queue.pop_front().unwrap().action(), "a");
        assert_eq!(queue.pop_front().unwrap().action(), "b");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let queue = RecipientQueue::new("u1");
        queue.append(cmd("a"));
        queue.append(cmd("b"));
        queue.append(cmd("c"));
        let drained = queue.drain_all();
        assert_eq!(actions(&drained), ["a", "b", "c"]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_push_front_becomes_head() {
        let queue = RecipientQueue::new("u1");
        queue.append(cmd("b"));
        queue.push_front(cmd("a"));
        assert_eq!(actions(&queue.drain_all()), ["a", "b"]);
    }

    #[test]
    fn test_restore_keeps_order_ahead_of_newer_commands() {
        let queue = RecipientQueue::new("u1");
        queue.append(cmd("d"));
        queue.restore(vec![cmd("a"), cmd("b"), cmd("c")]);
        assert_eq!(queue.len(), 4);
        assert_eq!(actions(&queue.drain_all()), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_attach_generations_increase() {
        let queue = RecipientQueue::new("u1");
        let first = queue.attach();
        let second = queue.attach();
        assert!(second > first);
        assert_eq!(queue.current_generation(), second);
        assert_eq!(queue.session_count(), 2);
        queue.detach();
        assert_eq!(queue.session_count(), 1);
    }

    #[tokio::test]
    async fn test_append_wakes_waiter() {
        let queue = std::sync::Arc::new(RecipientQueue::new("u1"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let notified = queue.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if queue.is_empty() {
                    notified.await;
                }
                queue.pop_front().map(|c| c.action().to_string())
            })
        };
        tokio::task::yield_now().await;
        queue.append(cmd("wake"));
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.as_deref(), Some("wake"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_requires_empty_unattended_and_idle() {
        let ttl = Duration::from_secs(60);
        let queue = RecipientQueue::new("u1");
        assert!(!queue.is_evictable(ttl, Instant::now()));

        tokio::time::advance(ttl).await;
        assert!(queue.is_evictable(ttl, Instant::now()));

        queue.append(cmd("a"));
        tokio::time::advance(ttl).await;
        assert!(!queue.is_evictable(ttl, Instant::now()));

        queue.drain_all();
        queue.attach();
        tokio::time::advance(ttl).await;
        assert!(!queue.is_evictable(ttl, Instant::now()));
    }

    #[tokio::test]
    async fn test_lease_waits_for_previous_holder() {
        let queue = Arc::new(RecipientQueue::new("u1"));
        let held = queue.lease().await;

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let _lease = queue.lease().await;
                queue.drain_all().len()
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        queue.append(cmd("a"));
        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
