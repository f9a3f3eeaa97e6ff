use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    CalendarAction, CalendarSync, DispatchSummary, DispatcherConfig, EmailSender,
    IntentPayload, NotificationError, NotificationIntent, Outbox, PushSender,
    RealtimeBroadcaster,
};

/// The four delivery channels a dispatcher fans out to.
#[derive(Clone)]
pub struct NotificationChannels {
    pub calendar: Arc<dyn CalendarSync>,
    pub push: Arc<dyn PushSender>,
    pub realtime: Arc<dyn RealtimeBroadcaster>,
    pub email: Arc<dyn EmailSender>,
}

enum Outcome {
    Delivered,
    Retried,
    DeadLettered,
}

/// Background worker draining the outbox.
///
/// Each intent is one external call bounded by `call_timeout_seconds`. A
/// failed intent goes back to the queue until its attempts run out, then to
/// the dead-letter list. Failures never reach the request that produced them.
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    outbox: Arc<dyn Outbox>,
    channels: NotificationChannels,
    is_shutdown: RwLock<bool>,
}

impl NotificationDispatcher {
    pub fn new(
        config: DispatcherConfig,
        outbox: Arc<dyn Outbox>,
        channels: NotificationChannels,
    ) -> Self {
        Self {
            config,
            outbox,
            channels,
            is_shutdown: RwLock::new(false),
        }
    }

    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run(&self) {
        info!("Notification dispatcher {} started", self.config.worker_id);

        if let Err(e) = self.recover().await {
            error!("Dispatcher {} could not recover in-flight intents: {}", self.config.worker_id, e);
        }

        loop {
            if *self.is_shutdown.read().await {
                debug!("Dispatcher {} received shutdown signal", self.config.worker_id);
                break;
            }

            match self.outbox.dequeue().await {
                Ok(Some(intent)) => {
                    if let Outcome::Retried = self.process(intent).await {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
                Err(e) => {
                    error!("Dispatcher {} failed to read outbox: {}", self.config.worker_id, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        info!("Notification dispatcher {} stopped", self.config.worker_id);
    }

    /// Requeues whatever a previous worker left in flight. Delivery is
    /// at-least-once, so a recovered intent may repeat a call that already
    /// went through.
    pub async fn recover(&self) -> Result<usize, NotificationError> {
        self.outbox.recover_in_flight().await
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    /// Processes everything currently queued, including retries, without
    /// sleeping between attempts.
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary, NotificationError> {
        let mut summary = DispatchSummary::default();

        while let Some(intent) = self.outbox.dequeue().await? {
            match self.process(intent).await {
                Outcome::Delivered => summary.delivered += 1,
                Outcome::Retried => summary.retried += 1,
                Outcome::DeadLettered => summary.dead_lettered += 1,
            }
        }

        Ok(summary)
    }

    #[instrument(skip(self, intent), fields(intent_id = %intent.id, channel = intent.channel_name()))]
    async fn process(&self, mut intent: NotificationIntent) -> Outcome {
        intent.attempts += 1;
        let timeout_seconds = self.config.call_timeout_seconds.max(1);
        let call_timeout = Duration::from_secs(timeout_seconds);

        let result = match timeout(call_timeout, self.deliver(&intent.payload)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout {
                channel: intent.channel_name().to_string(),
                timeout_seconds,
            }),
        };

        match result {
            Ok(()) => {
                debug!("Delivered {} intent for appointment {}", intent.channel_name(), intent.appointment_id);
                if let Err(e) = self.outbox.acknowledge(&intent).await {
                    warn!("Failed to acknowledge intent {}: {}", intent.id, e);
                }
                Outcome::Delivered
            }
            Err(e) => {
                intent.last_error = Some(e.to_string());

                if intent.can_retry() {
                    warn!("{} delivery failed (attempt {}/{}): {}",
                          intent.channel_name(), intent.attempts, intent.max_attempts, e);
                    if let Err(err) = self.outbox.retry(intent).await {
                        error!("Failed to requeue intent: {}", err);
                    }
                    Outcome::Retried
                } else {
                    error!("{} delivery for appointment {} gave up after {} attempts: {}",
                           intent.channel_name(), intent.appointment_id, intent.attempts, e);
                    if let Err(err) = self.outbox.dead_letter(intent).await {
                        error!("Failed to dead-letter intent: {}", err);
                    }
                    Outcome::DeadLettered
                }
            }
        }
    }

    async fn deliver(&self, payload: &IntentPayload) -> Result<(), NotificationError> {
        match payload {
            IntentPayload::Calendar(CalendarAction::Update { owner_id, event_id, start, end, summary }) => {
                self.channels.calendar.update_event(*owner_id, event_id, *start, *end, summary).await
            }
            IntentPayload::Calendar(CalendarAction::Remove { owner_id, event_id }) => {
                self.channels.calendar.remove_event(*owner_id, event_id).await
            }
            IntentPayload::Push(message) => self.channels.push.send_push(message).await,
            IntentPayload::Realtime(event) => self.channels.realtime.broadcast(event).await,
            IntentPayload::Email(email) => self.channels.email.send_appointment_email(email).await,
        }
    }
}
