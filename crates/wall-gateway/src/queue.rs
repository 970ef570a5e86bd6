use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

/// Result of offering a frame to a [`SubscriberQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; the oldest frame was evicted to make room.
    Evicted,
    /// The frame was discarded.
    Dropped,
    /// The queue has been closed; the frame was ignored.
    Closed,
}

/// Result of waiting on a [`SubscriberQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    Frame(Bytes),
    Timeout,
    Closed,
}

/// Bounded FIFO of pending frames for one viewer.
///
/// Pushing never blocks: a full queue sheds its oldest frame. Written by the
/// broker, read by exactly one stream session.
pub struct SubscriberQueue {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, frame: Bytes) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        let outcome = {
            let mut frames = self.frames();
            let mut outcome = PushOutcome::Queued;
            if frames.len() >= self.capacity {
                frames.pop_front();
                outcome = PushOutcome::Evicted;
            }
            if frames.len() >= self.capacity {
                return PushOutcome::Dropped;
            }
            frames.push_back(frame);
            outcome
        };

        self.notify.notify_one();
        outcome
    }

    pub fn try_pop(&self) -> Option<Bytes> {
        self.frames().pop_front()
    }

    /// Wait for the next frame. Pending frames are still handed out after
    /// close; `None` once closed and drained.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Recv {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(frame)) => Recv::Frame(frame),
            Ok(None) => Recv::Closed,
            Err(_) => Recv::Timeout,
        }
    }

    /// Stop accepting frames and wake the reader.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // A reader between its emptiness check and its await still gets a permit.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of pending frames, oldest first.
    pub fn pending(&self) -> Vec<Bytes> {
        self.frames().iter().cloned().collect()
    }
}
