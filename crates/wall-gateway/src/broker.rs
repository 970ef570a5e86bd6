use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::frame;
use crate::queue::{PushOutcome, Recv, SubscriberQueue};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Frames buffered per viewer before the oldest are shed.
    pub queue_capacity: usize,
    /// Optional ceiling on concurrent viewers of one channel.
    pub max_subscribers_per_channel: Option<usize>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_subscribers_per_channel: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("channel {channel} already has {limit} subscribers")]
    ChannelFull { channel: String, limit: usize },
    #[error("broker is shutting down")]
    ShuttingDown,
}

/// A viewer's registration with the broker. Cloning yields another handle to
/// the same queue.
#[derive(Clone)]
pub struct QueueHandle {
    id: u64,
    queue: Arc<SubscriberQueue>,
}

impl QueueHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue(&self) -> &SubscriberQueue {
        &self.queue
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Recv {
        self.queue.recv_timeout(timeout).await
    }
}

type SubscriberSet = HashMap<u64, Arc<SubscriberQueue>>;

/// Registry entry for one channel. Each channel has its own lock so
/// publishes to unrelated channels never contend.
#[derive(Default)]
struct ChannelEntry {
    subscribers: Mutex<SubscriberSet>,
}

impl ChannelEntry {
    fn subscribers(&self) -> MutexGuard<'_, SubscriberSet> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process fanout of rendered frames to live viewers, keyed by channel.
///
/// Delivery is at-most-once and best-effort: only viewers subscribed when a
/// frame is published can receive it, and a slow viewer loses its oldest
/// pending frames rather than holding up anyone else.
#[derive(Clone)]
pub struct FanoutBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    /// channel_id -> subscriber queues. Entries exist only while non-empty.
    channels: RwLock<HashMap<String, Arc<ChannelEntry>>>,
    next_id: AtomicU64,
    config: BrokerConfig,
    shutting_down: AtomicBool,
}

impl FanoutBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                channels: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new bounded queue under `channel_id`.
    pub fn subscribe(&self, channel_id: &str) -> Result<QueueHandle, BrokerError> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(BrokerError::ShuttingDown);
        }

        let handle = QueueHandle {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            queue: Arc::new(SubscriberQueue::new(self.inner.config.queue_capacity)),
        };

        // Holding the read lock keeps the entry from being removed under us.
        {
            let channels = self.read_channels();
            if let Some(entry) = channels.get(channel_id) {
                self.register(entry, channel_id, &handle)?;
                return Ok(handle);
            }
        }

        let mut channels = self.write_channels();
        // Shutdown may have drained the registry since the check above.
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(BrokerError::ShuttingDown);
        }
        let entry = channels.entry(channel_id.to_string()).or_default();
        self.register(entry, channel_id, &handle)?;
        Ok(handle)
    }

    fn register(
        &self,
        entry: &ChannelEntry,
        channel_id: &str,
        handle: &QueueHandle,
    ) -> Result<(), BrokerError> {
        let mut subscribers = entry.subscribers();
        if let Some(limit) = self.inner.config.max_subscribers_per_channel {
            let limit = limit.max(1);
            if subscribers.len() >= limit {
                return Err(BrokerError::ChannelFull {
                    channel: channel_id.to_string(),
                    limit,
                });
            }
        }
        subscribers.insert(handle.id, handle.queue.clone());
        trace!(
            "Queue {} subscribed to {} ({} subscribers)",
            handle.id,
            channel_id,
            subscribers.len()
        );
        Ok(())
    }

    /// Remove `handle` from `channel_id`, dropping the channel entry once it is
    /// empty. Returns whether the handle was registered; repeated calls are no-ops.
    pub fn unsubscribe(&self, channel_id: &str, handle: &QueueHandle) -> bool {
        let now_empty = {
            let channels = self.read_channels();
            let Some(entry) = channels.get(channel_id) else {
                return false;
            };
            let mut subscribers = entry.subscribers();
            if subscribers.remove(&handle.id).is_none() {
                return false;
            }
            handle.queue.close();
            subscribers.is_empty()
        };

        if now_empty {
            let mut channels = self.write_channels();
            // Someone may have subscribed between the two locks.
            let still_empty = channels
                .get(channel_id)
                .is_some_and(|entry| entry.subscribers().is_empty());
            if still_empty {
                channels.remove(channel_id);
                trace!("Channel {} has no subscribers left, removed", channel_id);
            }
        }
        true
    }

    /// Offer `frame` to every queue subscribed to `channel_id` right now.
    /// Never blocks. Returns how many queues the frame was offered to.
    pub fn publish(&self, channel_id: &str, frame: Bytes) -> usize {
        let entry = self.read_channels().get(channel_id).cloned();
        let Some(entry) = entry else {
            trace!("No subscribers on {}, frame discarded", channel_id);
            return 0;
        };

        let snapshot: Vec<(u64, Arc<SubscriberQueue>)> = entry
            .subscribers()
            .iter()
            .map(|(id, queue)| (*id, queue.clone()))
            .collect();

        for (id, queue) in &snapshot {
            match queue.push(frame.clone()) {
                PushOutcome::Queued | PushOutcome::Closed => {}
                PushOutcome::Evicted => {
                    debug!("Queue {} on {} is full, dropped its oldest frame", id, channel_id)
                }
                PushOutcome::Dropped => {
                    debug!("Queue {} on {} is full, frame dropped", id, channel_id)
                }
            }
        }
        snapshot.len()
    }

    /// Encode a rendered payload as a `message` event and publish it.
    pub fn publish_message(&self, channel_id: &str, payload: &str) -> usize {
        self.publish(channel_id, frame::message(payload))
    }

    /// Subscribe and wrap the handle in a guard that unsubscribes on drop.
    pub fn subscribe_scoped(&self, channel_id: &str) -> Result<Subscription, BrokerError> {
        let handle = self.subscribe(channel_id)?;
        Ok(Subscription {
            broker: self.clone(),
            channel_id: channel_id.to_string(),
            handle,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.read_channels().len()
    }

    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.read_channels()
            .get(channel_id)
            .map_or(0, |entry| entry.subscribers().len())
    }

    pub fn total_subscribers(&self) -> usize {
        self.read_channels()
            .values()
            .map(|entry| entry.subscribers().len())
            .sum()
    }

    /// Close every queue and empty the registry. Sessions notice their queue
    /// closing and exit; later subscribes fail.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);

        let drained: Vec<Arc<ChannelEntry>> =
            self.write_channels().drain().map(|(_, entry)| entry).collect();

        let mut closed = 0;
        for entry in drained {
            for queue in entry.subscribers().values() {
                queue.close();
                closed += 1;
            }
        }
        info!("Broker shut down, closed {} subscriber queues", closed);
    }

    fn read_channels(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ChannelEntry>>> {
        self.inner.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_channels(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ChannelEntry>>> {
        self.inner.channels.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped subscription: unsubscribes exactly once when dropped, whichever way
/// the owner exits (return, error, or cancellation).
pub struct Subscription {
    broker: FanoutBroker,
    channel_id: String,
    handle: QueueHandle,
}

impl Subscription {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.channel_id, &self.handle);
    }
}
