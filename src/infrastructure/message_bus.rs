//! In-process publish/subscribe router with named channels.
//!
//! Each channel is an independent FIFO of `(message, correlation id)` envelopes, created
//! the first time anyone publishes to or consumes from it. A single reader per channel
//! drains it with `consume`, polling while the channel is empty.
//!
//! Delivery is best effort. A handler error is logged and the envelope is dropped, or
//! moved to `<channel>.dead-letter` when dead-lettering is enabled, from where
//! `replay_dead_letters` can put it back in line. Nothing survives a process restart.

use crate::config::{BusConfig, OverflowPolicy};
use crate::domain::ports::MessagePublisher;
use crate::error::{HubError, Result};
use crate::shutdown::{ShutdownSignal, is_cancelled, sleep_or_cancel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{Span, debug, error, info, warn};
use uuid::Uuid;

pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

pub fn dead_letter_channel(channel: &str) -> String {
    format!("{}{}", channel, DEAD_LETTER_SUFFIX)
}

/// A published message together with the correlation id it travels with.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub message: M,
    pub correlation_id: String,
    pub enqueued_at: DateTime<Utc>,
}

struct Channel<M> {
    pending: Mutex<VecDeque<Envelope<M>>>,
    readers: AtomicUsize,
}

impl<M> Channel<M> {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            readers: AtomicUsize::new(0),
        }
    }
}

/// Marks a consumer as attached to a channel for as long as it is alive.
struct ReaderRegistration<M> {
    channel: Arc<Channel<M>>,
}

impl<M> ReaderRegistration<M> {
    /// Returns the registration and the number of readers that were already attached.
    fn register(channel: Arc<Channel<M>>) -> (Self, usize) {
        let existing = channel.readers.fetch_add(1, Ordering::SeqCst);
        (Self { channel }, existing)
    }
}

impl<M> Drop for ReaderRegistration<M> {
    fn drop(&mut self) {
        self.channel.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct InMemoryMessageBus<M> {
    channels: RwLock<HashMap<String, Arc<Channel<M>>>>,
    config: BusConfig,
    span: Span,
}

impl<M> InMemoryMessageBus<M>
where
    M: Clone + Debug + Send + Sync + 'static,
{
    pub fn new(config: BusConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            config,
            span: tracing::info_span!("message_bus"),
        }
    }

    /// Attaches the bus's log output to `span` instead of its own root span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Appends `message` to `channel`, creating the channel on first use.
    ///
    /// Only fails for an empty channel name, or when a bounded channel is full under
    /// `OverflowPolicy::Reject`.
    pub async fn publish(&self, message: M, channel: &str, correlation_id: &str) -> Result<()> {
        validate_channel(channel)?;
        let envelope = Envelope {
            message,
            correlation_id: correlation_id.to_string(),
            enqueued_at: Utc::now(),
        };
        debug!(
            parent: &self.span,
            channel,
            correlation_id,
            message = ?envelope.message,
            "Message payload"
        );
        self.enqueue(channel, envelope).await?;
        info!(
            parent: &self.span,
            channel,
            correlation_id,
            message_type = std::any::type_name::<M>(),
            "Message published"
        );
        Ok(())
    }

    /// Publishes with a freshly generated correlation id, which is returned.
    pub async fn publish_with_new_correlation(&self, message: M, channel: &str) -> Result<String> {
        let correlation_id = Uuid::new_v4().to_string();
        self.publish(message, channel, &correlation_id).await?;
        Ok(correlation_id)
    }

    /// Removes and returns the oldest pending envelope, if any.
    pub async fn try_dequeue(&self, channel: &str) -> Result<Option<Envelope<M>>> {
        validate_channel(channel)?;
        let queue = self.channel(channel).await;
        let next = queue.pending.lock().await.pop_front();
        Ok(next)
    }

    pub async fn pending(&self, channel: &str) -> usize {
        let queue = self.channels.read().await.get(channel).cloned();
        match queue {
            Some(queue) => queue.pending.lock().await.len(),
            None => 0,
        }
    }

    /// Names of every channel created so far, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drains `channel` until `shutdown` fires.
    ///
    /// Envelopes are handed to `handler` one at a time in publish order; the next one is
    /// not dequeued until the handler returns. While the channel is empty the loop waits
    /// for the configured poll interval. Handler errors never stop the loop.
    pub async fn consume<F, Fut>(
        &self,
        channel: &str,
        handler: F,
        mut shutdown: ShutdownSignal,
    ) -> Result<()>
    where
        F: Fn(M, String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        validate_channel(channel)?;
        let queue = self.channel(channel).await;
        let (_registration, existing) = ReaderRegistration::register(queue.clone());
        if existing > 0 {
            warn!(
                parent: &self.span,
                channel,
                readers = existing + 1,
                "Channel already has an active consumer; readers will race for messages"
            );
        }

        info!(parent: &self.span, channel, "Starting to consume messages");
        let poll_interval = self.config.poll_interval();

        while !is_cancelled(&shutdown) {
            let next = queue.pending.lock().await.pop_front();
            match next {
                Some(envelope) => self.dispatch(channel, envelope, &handler).await,
                None => {
                    if !sleep_or_cancel(poll_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(parent: &self.span, channel, "Stopped consuming messages");
        Ok(())
    }

    /// Moves every envelope parked on `<channel>.dead-letter` back onto `channel`, oldest
    /// first, and returns how many were moved.
    ///
    /// Correlation ids are kept. If `channel` refuses an envelope, that envelope and the
    /// ones after it stay parked and the error is returned.
    pub async fn replay_dead_letters(&self, channel: &str) -> Result<usize> {
        validate_channel(channel)?;
        let parked = self.channel(&dead_letter_channel(channel)).await;
        let mut drained = std::mem::take(&mut *parked.pending.lock().await);

        let mut moved = 0;
        while let Some(envelope) = drained.pop_front() {
            let envelope = Envelope {
                enqueued_at: Utc::now(),
                ..envelope
            };
            if let Err(e) = self.enqueue(channel, envelope.clone()).await {
                drained.push_front(envelope);
                let mut pending = parked.pending.lock().await;
                while let Some(rest) = drained.pop_back() {
                    pending.push_front(rest);
                }
                return Err(e);
            }
            moved += 1;
        }

        info!(parent: &self.span, channel, replayed = moved, "Dead-lettered messages replayed");
        Ok(moved)
    }

    async fn dispatch<F, Fut>(&self, channel: &str, envelope: Envelope<M>, handler: &F)
    where
        F: Fn(M, String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        let correlation_id = envelope.correlation_id.clone();
        let queued_ms = (Utc::now() - envelope.enqueued_at).num_milliseconds();
        info!(
            parent: &self.span,
            channel,
            correlation_id = %correlation_id,
            queued_ms,
            "Processing message"
        );

        let retained = self.config.dead_letter.then(|| envelope.clone());
        match handler(envelope.message, envelope.correlation_id).await {
            Ok(()) => {
                info!(
                    parent: &self.span,
                    channel,
                    correlation_id = %correlation_id,
                    "Message processed successfully"
                );
            }
            Err(e) => {
                error!(
                    parent: &self.span,
                    channel,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Error processing message"
                );
                if let Some(envelope) = retained {
                    self.dead_letter(channel, envelope).await;
                }
            }
        }
    }

    async fn dead_letter(&self, channel: &str, envelope: Envelope<M>) {
        let target = dead_letter_channel(channel);
        warn!(
            parent: &self.span,
            channel,
            dead_letter = %target,
            correlation_id = %envelope.correlation_id,
            "Moving message to dead-letter channel"
        );
        // Dead-letter channels are unbounded.
        let queue = self.channel(&target).await;
        queue.pending.lock().await.push_back(envelope);
    }

    async fn enqueue(&self, channel: &str, envelope: Envelope<M>) -> Result<()> {
        let queue = self.channel(channel).await;
        let evicted = {
            let mut pending = queue.pending.lock().await;
            let evicted = match self.config.capacity {
                Some(capacity) if pending.len() >= capacity => match self.config.overflow {
                    OverflowPolicy::Reject => {
                        warn!(
                            parent: &self.span,
                            channel,
                            capacity,
                            "Channel full, rejecting message"
                        );
                        return Err(HubError::ChannelFull {
                            channel: channel.to_string(),
                            capacity,
                        });
                    }
                    OverflowPolicy::DropOldest => pending.pop_front(),
                },
                _ => None,
            };
            pending.push_back(envelope);
            evicted
        };

        if let Some(evicted) = evicted {
            warn!(
                parent: &self.span,
                channel,
                correlation_id = %evicted.correlation_id,
                "Channel full, evicted oldest message"
            );
            if self.config.dead_letter {
                self.dead_letter(channel, evicted).await;
            }
        }
        Ok(())
    }

    async fn channel(&self, name: &str) -> Arc<Channel<M>> {
        if let Some(queue) = self.channels.read().await.get(name) {
            return queue.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Channel::new()))
            .clone()
    }
}

#[async_trait]
impl<M> MessagePublisher<M> for InMemoryMessageBus<M>
where
    M: Clone + Debug + Send + Sync + 'static,
{
    async fn publish(&self, message: M, channel: &str, correlation_id: &str) -> Result<()> {
        InMemoryMessageBus::publish(self, message, channel, correlation_id).await
    }
}

fn validate_channel(channel: &str) -> Result<()> {
    if channel.trim().is_empty() {
        Err(HubError::InvalidArgument(
            "Channel name cannot be empty".to_string(),
        ))
    } else {
        Ok(())
    }
}
