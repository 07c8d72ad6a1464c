//! Connection management
//!
//! One [`ConnectionManager`] per process owns the transport. It runs as a
//! single task; commands, socket events and timer expiries all go through
//! its loop, so state transitions never overlap.

pub mod backoff;
pub mod event;
pub mod manager;
pub mod state;
pub mod subscription;

pub use backoff::Backoff;
pub use event::ChannelEvent;
pub use manager::{ConnectionManager, ManagerSnapshot};
pub use state::ConnectionState;
pub use subscription::{SubscriptionPhase, SubscriptionTable};
