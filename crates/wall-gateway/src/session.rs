use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::broker::{BrokerError, FanoutBroker, Subscription};
use crate::frame;
use crate::queue::Recv;

/// Idle interval after which a heartbeat comment is sent.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Subscribed,
    Relaying,
    Idle,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The viewer went away (response body dropped).
    Disconnected,
    /// Writing a frame to the transport failed.
    WriteFailed,
    /// The broker closed our queue during shutdown.
    BrokerShutdown,
}

/// One live viewer of a channel: relays queued frames to its transport and
/// keeps the connection alive with heartbeats while idle.
///
/// The subscription is released when the session is dropped, so a session
/// that is cancelled mid-await still leaves the registry clean.
pub struct StreamSession {
    subscription: Subscription,
    heartbeat: Duration,
    state: SessionState,
}

impl StreamSession {
    pub fn open(
        broker: &FanoutBroker,
        channel_id: &str,
        heartbeat: Duration,
    ) -> Result<Self, BrokerError> {
        let subscription = broker.subscribe_scoped(channel_id)?;
        debug!(
            "Stream opened on {} ({} viewers)",
            channel_id,
            broker.subscriber_count(channel_id)
        );
        Ok(Self {
            subscription,
            heartbeat,
            state: SessionState::Subscribed,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn channel_id(&self) -> &str {
        self.subscription.channel_id()
    }

    /// Relay frames into `transport` until the viewer disconnects, a write
    /// fails, or the broker shuts down. Frames already queued at
    /// shutdown are still relayed first.
    pub async fn run(mut self, transport: mpsc::Sender<Bytes>) -> CloseReason {
        self.state = SessionState::Relaying;

        let reason = loop {
            if transport.is_closed() {
                break CloseReason::Disconnected;
            }

            let next = tokio::select! {
                _ = transport.closed() => break CloseReason::Disconnected,
                next = self.subscription.handle().recv_timeout(self.heartbeat) => next,
            };

            let frame = match next {
                Recv::Frame(frame) => frame,
                Recv::Timeout => {
                    self.state = SessionState::Idle;
                    trace!("Stream on {} idle, sending heartbeat", self.channel_id());
                    frame::heartbeat()
                }
                Recv::Closed => break CloseReason::BrokerShutdown,
            };

            if transport.send(frame).await.is_err() {
                break CloseReason::WriteFailed;
            }
            self.state = SessionState::Relaying;
        };

        self.state = SessionState::Closed;
        debug!("Stream on {} closed: {:?}", self.channel_id(), reason);
        reason
    }
}
