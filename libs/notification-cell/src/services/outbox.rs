use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{NotificationError, NotificationIntent, OutboxStats};

/// Queue of pending side effects.
///
/// Intents are handed out in enqueue order. A dequeued intent stays "in
/// flight" until it is acknowledged, retried or dead-lettered.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn enqueue(&self, intent: NotificationIntent) -> Result<(), NotificationError>;

    async fn enqueue_all(&self, intents: Vec<NotificationIntent>) -> Result<(), NotificationError> {
        for intent in intents {
            self.enqueue(intent).await?;
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<NotificationIntent>, NotificationError>;

    async fn acknowledge(&self, intent: &NotificationIntent) -> Result<(), NotificationError>;

    /// Puts a failed intent back at the tail of the queue.
    async fn retry(&self, intent: NotificationIntent) -> Result<(), NotificationError>;

    /// Moves an exhausted intent to the dead-letter list. The list keeps
    /// only the most recent entries.
    async fn dead_letter(&self, intent: NotificationIntent) -> Result<(), NotificationError>;

    async fn dead_letters(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError>;

    async fn stats(&self) -> Result<OutboxStats, NotificationError>;

    /// Returns intents left in flight by a dispatcher that stopped before
    /// settling them to the tail of the queue. Call only while no other
    /// dispatcher is running. Returns how many were requeued.
    async fn recover_in_flight(&self) -> Result<usize, NotificationError> {
        Ok(0)
    }
}

pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 1_000;

#[derive(Default)]
struct InMemoryState {
    pending: VecDeque<NotificationIntent>,
    in_flight: HashMap<Uuid, NotificationIntent>,
    dead: VecDeque<NotificationIntent>,
    delivered: u64,
    retried: u64,
}

/// Process-local outbox used when no Redis URL is configured, and in tests.
pub struct InMemoryOutbox {
    state: Mutex<InMemoryState>,
    dead_letter_limit: usize,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::with_dead_letter_limit(DEFAULT_DEAD_LETTER_LIMIT)
    }

    pub fn with_dead_letter_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            dead_letter_limit: limit.max(1),
        }
    }

    pub async fn pending(&self) -> Vec<NotificationIntent> {
        self.state.lock().await.pending.iter().cloned().collect()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn enqueue(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        debug!("Enqueued {} intent {} for appointment {}",
               intent.channel_name(), intent.id, intent.appointment_id);
        self.state.lock().await.pending.push_back(intent);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<NotificationIntent>, NotificationError> {
        let mut state = self.state.lock().await;
        let next = state.pending.pop_front();
        if let Some(intent) = &next {
            state.in_flight.insert(intent.id, intent.clone());
        }
        Ok(next)
    }

    async fn acknowledge(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&intent.id).is_none() {
            warn!("Acknowledged intent {} that was not in flight", intent.id);
        }
        state.delivered += 1;
        Ok(())
    }

    async fn retry(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&intent.id);
        state.retried += 1;
        state.pending.push_back(intent);
        Ok(())
    }

    async fn dead_letter(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&intent.id);
        state.dead.push_back(intent);
        while state.dead.len() > self.dead_letter_limit {
            state.dead.pop_front();
        }
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError> {
        let state = self.state.lock().await;
        Ok(state.dead.iter().rev().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<OutboxStats, NotificationError> {
        let state = self.state.lock().await;
        Ok(OutboxStats {
            pending: state.pending.len() as u64,
            in_flight: state.in_flight.len() as u64,
            delivered: state.delivered,
            retried: state.retried,
            dead_lettered: state.dead.len() as u64,
        })
    }

    async fn recover_in_flight(&self) -> Result<usize, NotificationError> {
        let mut state = self.state.lock().await;
        let stranded: Vec<NotificationIntent> = state.in_flight.drain().map(|(_, intent)| intent).collect();
        let count = stranded.len();
        state.pending.extend(stranded);

        if count > 0 {
            warn!("Requeued {} intents left in flight", count);
        }
        Ok(count)
    }
}

impl Default for InMemoryOutbox {
    fn default() -> Self {
        Self::new()
    }
}
