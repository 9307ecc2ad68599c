use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

/// Ephemeral typing state, keyed by (conversation, user). Nothing here is
/// persisted; an entry that is not refreshed within the idle window is
/// treated as expired without an explicit stop event.
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<Mutex<HashMap<(Uuid, Uuid), Instant>>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Stamp activity; starting an already-active entry refreshes its timer.
    pub async fn start(&self, conversation_id: Uuid, user_id: Uuid) {
        let mut guard = self.inner.lock().await;
        guard.insert((conversation_id, user_id), Instant::now());
    }

    /// Clear the entry. Returns whether it was still live; a stop arriving
    /// after the idle window already did its work and should not fan out.
    pub async fn stop(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.remove(&(conversation_id, user_id)) {
            Some(stamp) => stamp.elapsed() <= self.ttl,
            None => false,
        }
    }

    pub async fn is_typing(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        let guard = self.inner.lock().await;
        guard
            .get(&(conversation_id, user_id))
            .map(|stamp| stamp.elapsed() <= self.ttl)
            .unwrap_or(false)
    }

    /// Drop everything a user had going; used when their connection closes.
    pub async fn clear_user(&self, user_id: Uuid) {
        let mut guard = self.inner.lock().await;
        guard.retain(|(_, user), _| *user != user_id);
    }

    pub async fn prune(&self) {
        let ttl = self.ttl;
        let mut guard = self.inner.lock().await;
        guard.retain(|_, stamp| stamp.elapsed() <= ttl);
    }

    /// Periodically drop expired entries so the map stays bounded.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        let period = tracker.ttl.max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                tracker.prune().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_the_idle_window() {
        let tracker = TypingTracker::new(Duration::from_millis(20));
        let conversation = Uuid::new_v4();
        let user = Uuid::new_v4();

        tracker.start(conversation, user).await;
        assert!(tracker.is_typing(conversation, user).await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!tracker.is_typing(conversation, user).await);

        // A stop that arrives after expiry reports nothing to fan out.
        assert!(!tracker.stop(conversation, user).await);
    }

    #[tokio::test]
    async fn refresh_extends_the_window() {
        let tracker = TypingTracker::new(Duration::from_millis(50));
        let conversation = Uuid::new_v4();
        let user = Uuid::new_v4();

        tracker.start(conversation, user).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tracker.start(conversation, user).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(tracker.is_typing(conversation, user).await);
        assert!(tracker.stop(conversation, user).await);
    }

    #[tokio::test]
    async fn prune_drops_only_expired_entries() {
        let tracker = TypingTracker::new(Duration::from_millis(30));
        let conversation = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        tracker.start(conversation, stale).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.start(conversation, fresh).await;
        tracker.prune().await;

        assert!(!tracker.is_typing(conversation, stale).await);
        assert!(tracker.is_typing(conversation, fresh).await);
    }
}
