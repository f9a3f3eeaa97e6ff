use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::{NotificationError, NotificationIntent, OutboxStats, Outbox, DEFAULT_DEAD_LETTER_LIMIT};

const PENDING_KEY: &str = "notification_outbox:pending";
const PROCESSING_KEY: &str = "notification_outbox:processing";
const DEAD_KEY: &str = "notification_outbox:dead";
const DELIVERED_COUNTER: &str = "notification_outbox:delivered";
const RETRIED_COUNTER: &str = "notification_outbox:retried";

/// Durable outbox: intent ids move between Redis lists, bodies live in
/// `notification_intent:{id}` hashes.
///
/// Queued bodies expire after 14 days. Dead-lettered bodies do not expire;
/// they are deleted when their id is trimmed off the dead-letter list.
pub struct RedisOutbox {
    pool: Pool,
    dead_letter_limit: usize,
}

impl RedisOutbox {
    pub async fn new(redis_url: &str) -> Result<Self, NotificationError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            NotificationError::OutboxError(format!("Failed to create Redis pool: {}", e))
        })?;

        let outbox = Self { pool, dead_letter_limit: DEFAULT_DEAD_LETTER_LIMIT };
        let mut conn = outbox.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification outbox initialized");

        Ok(outbox)
    }

    async fn get_connection(&self) -> Result<Connection, NotificationError> {
        self.pool.get().await.map_err(|e| {
            NotificationError::OutboxError(format!("Failed to get Redis connection: {}", e))
        })
    }

    async fn store_intent(
        &self,
        conn: &mut Connection,
        intent: &NotificationIntent,
    ) -> Result<(), NotificationError> {
        let key = intent_key(&intent.id.to_string());
        let data = serde_json::to_string(intent)?;
        let appointment_id = intent.appointment_id.to_string();

        let _: () = conn.hset_multiple(&key, &[
            ("data", data.as_str()),
            ("channel", intent.channel_name()),
            ("appointment_id", appointment_id.as_str()),
        ]).await?;
        let _: () = conn.expire(&key, 1_209_600).await?;

        Ok(())
    }

    async fn load_intent(
        &self,
        conn: &mut Connection,
        id: &str,
    ) -> Result<Option<NotificationIntent>, NotificationError> {
        let data: Option<String> = conn.hget(intent_key(id), "data").await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

fn intent_key(id: &str) -> String {
    format!("notification_intent:{}", id)
}

#[async_trait]
impl Outbox for RedisOutbox {
    async fn enqueue(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        self.store_intent(&mut conn, &intent).await?;
        let _: () = conn.lpush(PENDING_KEY, intent.id.to_string()).await?;

        debug!("Enqueued {} intent {} in Redis outbox", intent.channel_name(), intent.id);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<NotificationIntent>, NotificationError> {
        let mut conn = self.get_connection().await?;

        let id: Option<String> = conn.brpoplpush(PENDING_KEY, PROCESSING_KEY, 1.0).await?;
        let Some(id) = id else {
            return Ok(None);
        };

        match self.load_intent(&mut conn, &id).await? {
            Some(intent) => Ok(Some(intent)),
            None => {
                // Body expired; nothing left to deliver.
                let _: () = conn.lrem(PROCESSING_KEY, 1, &id).await?;
                Ok(None)
            }
        }
    }

    async fn acknowledge(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, intent.id.to_string()).await?;
        let _: () = conn.incr(DELIVERED_COUNTER, 1).await?;
        Ok(())
    }

    async fn retry(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        self.store_intent(&mut conn, &intent).await?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, intent.id.to_string()).await?;
        let _: () = conn.lpush(PENDING_KEY, intent.id.to_string()).await?;
        let _: () = conn.incr(RETRIED_COUNTER, 1).await?;
        Ok(())
    }

    async fn dead_letter(&self, intent: NotificationIntent) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        self.store_intent(&mut conn, &intent).await?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, intent.id.to_string()).await?;
        let _: () = conn.lpush(DEAD_KEY, intent.id.to_string()).await?;
        let _: () = conn.persist(intent_key(&intent.id.to_string())).await?;

        let limit = self.dead_letter_limit as isize;
        let evicted: Vec<String> = conn.lrange(DEAD_KEY, limit, -1).await?;
        if !evicted.is_empty() {
            let keys: Vec<String> = evicted.iter().map(|id| intent_key(id)).collect();
            let _: () = conn.del(keys).await?;
            let _: () = conn.ltrim(DEAD_KEY, 0, limit - 1).await?;
            debug!("Trimmed {} old dead letters", evicted.len());
        }
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.lrange(DEAD_KEY, 0, limit as isize - 1).await?;

        let mut intents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load_intent(&mut conn, &id).await? {
                Some(intent) => intents.push(intent),
                None => {
                    let _: () = conn.lrem(DEAD_KEY, 1, &id).await?;
                }
            }
        }
        Ok(intents)
    }

    async fn stats(&self) -> Result<OutboxStats, NotificationError> {
        let mut conn = self.get_connection().await?;

        let pending: u64 = conn.llen(PENDING_KEY).await?;
        let in_flight: u64 = conn.llen(PROCESSING_KEY).await?;
        let dead_lettered: u64 = conn.llen(DEAD_KEY).await?;
        let delivered: Option<u64> = conn.get(DELIVERED_COUNTER).await?;
        let retried: Option<u64> = conn.get(RETRIED_COUNTER).await?;

        Ok(OutboxStats {
            pending,
            in_flight,
            delivered: delivered.unwrap_or(0),
            retried: retried.unwrap_or(0),
            dead_lettered,
        })
    }

    async fn recover_in_flight(&self) -> Result<usize, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut recovered = 0;

        loop {
            let id: Option<String> = conn.rpoplpush(PROCESSING_KEY, PENDING_KEY).await?;
            if id.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            warn!("Requeued {} intents left in flight", recovered);
        }
        Ok(recovered)
    }
}
