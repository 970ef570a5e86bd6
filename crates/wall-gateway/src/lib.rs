//! Live delivery for event walls: a per-process fanout broker that pushes
//! rendered frames to every viewer currently streaming a channel.

pub mod broker;
pub mod frame;
pub mod queue;
pub mod session;

pub use broker::{BrokerConfig, BrokerError, FanoutBroker, QueueHandle, Subscription};
pub use queue::{PushOutcome, Recv, SubscriberQueue};
pub use session::{CloseReason, SessionState, StreamSession};
