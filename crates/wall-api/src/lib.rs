pub mod error;
pub mod events;
pub mod messages;
pub mod middleware;
pub mod pipeline;
pub mod render;
pub mod router;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use router::router;
pub use state::{AppState, AppStateInner, WallSettings};
