use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::command::Command;
use super::queue::RecipientQueue;

/// Maps recipient ids to their queues.
///
/// Creation is atomic per key (DashMap entry lock), so two producers racing
/// on an unseen recipient always share one queue. Appends on existing queues
/// only take a shard read lock; unrelated recipients never contend on a
/// registry-wide lock.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<RecipientQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the recipient's queue, creating it if needed. The
    /// shard lock is held while `f` runs, which keeps eviction out.
    fn with_queue<R>(&self, recipient_id: &str, f: impl FnOnce(&Arc<RecipientQueue>) -> R) -> R {
        if let Some(queue) = self.queues.get(recipient_id) {
            return f(queue.value());
        }
        let queue = self
            .queues
            .entry(recipient_id.to_string())
            .or_insert_with(|| Arc::new(RecipientQueue::new(recipient_id)));
        f(queue.value())
    }

    pub fn get_or_create(&self, recipient_id: &str) -> Arc<RecipientQueue> {
        self.with_queue(recipient_id, Arc::clone)
    }

    pub fn get(&self, recipient_id: &str) -> Option<Arc<RecipientQueue>> {
        self.queues.get(recipient_id).map(|q| Arc::clone(q.value()))
    }

    /// Append to the recipient's queue. Returns the new backlog length.
    pub fn enqueue(&self, recipient_id: &str, command: Command) -> usize {
        self.with_queue(recipient_id, |queue| queue.append(command))
    }

    /// Get-or-create the queue and register a session on it in one step.
    pub fn attach(&self, recipient_id: &str) -> (Arc<RecipientQueue>, u64) {
        self.with_queue(recipient_id, |queue| (Arc::clone(queue), queue.attach()))
    }

    /// Backlog length; 0 for a recipient that has no queue.
    pub fn size_of(&self, recipient_id: &str) -> usize {
        self.queues
            .get(recipient_id)
            .map(|q| q.value().len())
            .unwrap_or(0)
    }

    /// Every recipient with a queue. Health reports its size as the
    /// recipient count.
    pub fn all_keys(&self) -> HashSet<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn total_pending_count(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }

    /// Drop queues that are empty, unattended and idle for `ttl`.
    /// Returns the evicted recipient ids.
    pub fn evict_idle(&self, ttl: Duration, now: Instant) -> Vec<String> {
        let candidates: Vec<String> = self
            .queues
            .iter()
            .filter(|entry| entry.value().is_evictable(ttl, now))
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the shard write lock; an enqueue or attach may have
        // landed since the scan.
        candidates
            .into_iter()
            .filter_map(|key| {
                self.queues
                    .remove_if(&key, |_, queue| queue.is_evictable(ttl, now))
                    .map(|(key, _)| key)
            })
            .collect()
    }
}
