// Notification fan-out. Fire-and-forget: a failed publish is logged and
// never fails the workflow.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::token::Token;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, room: &str, event: &str, token: &Token) -> Result<()>;
}

/// Default notifier: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, room: &str, event: &str, token: &Token) -> Result<()> {
        info!(
            room = room,
            event = event,
            mint = %token.mint,
            status = %token.status,
            "Published migration event"
        );
        Ok(())
    }
}

/// One published migration event, as seen by in-process subscribers.
#[derive(Debug, Clone)]
pub struct MigrationEvent {
    pub room: String,
    pub event: String,
    pub token: Token,
}

/// Broadcast-channel notifier for in-process observers (and tests).
pub struct ChannelNotifier {
    sender: broadcast::Sender<MigrationEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        ChannelNotifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn publish(&self, room: &str, event: &str, token: &Token) -> Result<()> {
        // Absence of subscribers is not a failure.
        let _ = self.sender.send(MigrationEvent {
            room: room.to_string(),
            event: event.to_string(),
            token: token.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_notifier_delivers_to_subscribers() {
        let notifier = ChannelNotifier::new(8);
        let mut receiver = notifier.subscribe();

        let token = Token::new("MintA", "Token A", "TKA", "creator-1");
        notifier
            .publish(&token.room(), "poolCreated", &token)
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.room, "token-MintA");
        assert_eq!(event.event, "poolCreated");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let notifier = ChannelNotifier::new(8);
        let token = Token::new("MintA", "Token A", "TKA", "creator-1");
        assert!(notifier.publish("room", "event", &token).await.is_ok());
    }
}
