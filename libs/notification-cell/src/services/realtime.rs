use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::{NotificationError, RealtimeEvent};

pub type RealtimeSender = broadcast::Sender<String>;
pub type RealtimeReceiver = broadcast::Receiver<String>;

type ChannelMap = Arc<RwLock<HashMap<Uuid, RealtimeSender>>>;

/// Pushes structured events to a user's live session channel.
#[async_trait]
pub trait RealtimeBroadcaster: Send + Sync {
    async fn broadcast(&self, event: &RealtimeEvent) -> Result<(), NotificationError>;
}

/// In-process per-user broadcast channels backing the `/appointments/events`
/// stream. A user without an open session simply misses the event.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    channels: ChannelMap,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the user's channel, creating it on first use. The channel is
    /// released once its last subscription is dropped.
    pub async fn subscribe(&self, user_id: Uuid) -> RealtimeSubscription {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(100).0);

        debug!("Realtime subscriber joined channel for user {}", user_id);
        RealtimeSubscription {
            user_id,
            receiver: Some(sender.subscribe()),
            channels: Arc::clone(&self.channels),
        }
    }

    pub async fn get_active_channels(&self) -> Vec<Uuid> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

async fn release_if_idle(channels: ChannelMap, user_id: Uuid) {
    let mut channels = channels.write().await;
    let idle = channels
        .get(&user_id)
        .is_some_and(|sender| sender.receiver_count() == 0);

    if idle {
        channels.remove(&user_id);
        debug!("Released realtime channel for user {}", user_id);
    }
}

/// One live session's view of a user channel.
pub struct RealtimeSubscription {
    user_id: Uuid,
    receiver: Option<RealtimeReceiver>,
    channels: ChannelMap,
}

impl RealtimeSubscription {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub async fn recv(&mut self) -> Result<String, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        // The receiver must be gone before the idle check runs.
        drop(self.receiver.take());

        if let Ok(handle) = Handle::try_current() {
            handle.spawn(release_if_idle(Arc::clone(&self.channels), self.user_id));
        }
    }
}

#[async_trait]
impl RealtimeBroadcaster for RealtimeHub {
    async fn broadcast(&self, event: &RealtimeEvent) -> Result<(), NotificationError> {
        let message = serde_json::to_string(event)?;

        let channels = self.channels.read().await;
        match channels.get(&event.recipient_id) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    debug!("No live session for user {}, event {} dropped",
                           event.recipient_id, event.event);
                }
            }
            None => debug!("User {} has no realtime channel", event.recipient_id),
        }

        debug!("Broadcast {} to user {}", event.event, event.recipient_id);
        Ok(())
    }
}
