use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod typing;

/// Connected clients, keyed by user id. A user may hold several
/// connections (tabs, devices); every one of them gets each event.
///
/// Delivery is best-effort: a user with no live connection is simply
/// skipped, and closed connections are pruned on the next send.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<UnboundedSender<Message>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, user_id: Uuid) -> UnboundedReceiver<Message> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        guard.entry(user_id).or_default().push(tx);
        rx
    }

    pub async fn send_to(&self, user_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&user_id) {
            list.retain(|sender| sender.send(msg.clone()).is_ok());
            if list.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&user_id).map(|list| list.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_connection_of_a_user() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let mut rx1 = registry.attach(user).await;
        let mut rx2 = registry.attach(user).await;

        registry.send_to(user, Message::Text("hello".into())).await;

        assert!(matches!(rx1.recv().await, Some(Message::Text(t)) if t == "hello"));
        assert!(matches!(rx2.recv().await, Some(Message::Text(t)) if t == "hello"));
    }

    #[tokio::test]
    async fn prunes_dropped_connections() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let rx = registry.attach(user).await;
        drop(rx);

        registry.send_to(user, Message::Text("gone".into())).await;
        assert_eq!(registry.connection_count(user).await, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_a_silent_no_op() {
        let registry = ConnectionRegistry::new();
        registry
            .send_to(Uuid::new_v4(), Message::Text("nobody".into()))
            .await;
    }
}
