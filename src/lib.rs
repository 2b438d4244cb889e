//! # MediMind Realtime
//!
//! Shared realtime channels with visibility-aware throttling.
//!
//! ## Core Concepts
//!
//! - **Topics**: One logical stream of row changes, one transport channel each
//! - **Pool**: Reference-counts listeners per topic; opens on first, closes on last
//! - **Subscriptions**: Per-consumer registration with filtering and clean teardown
//! - **Throttle**: Rate-limits how often a consumer acts, pausing while hidden
//!
//! ## Example
//!
//! ```ignore
//! use medimind_realtime::{
//!     ChangeFilter, ChannelPool, MemoryTransport, PoolConfig, Subscription,
//!     SubscriptionOptions,
//! };
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let pool = Arc::new(ChannelPool::new(Arc::clone(&transport), PoolConfig::default())?);
//!
//! let subscription = Subscription::new(
//!     Arc::clone(&pool),
//!     SubscriptionOptions::for_filter(ChangeFilter::table("sessions")),
//!     |change| println!("{} on {}", change.kind, change.table),
//! )?;
//!
//! // On logout
//! drop(subscription);
//! pool.cleanup_all();
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod subscription;
pub mod throttle;
pub mod transport;
pub mod types;
pub mod visibility;

// Re-exports
pub use config::{PoolConfig, RealtimeConfig, ThrottleConfig, DEFAULT_THROTTLE_INTERVAL};
pub use error::{RealtimeError, Result};
pub use pool::{ChangeHandler, Channel, ChannelPool, ChannelSink};
pub use subscription::{EventReceiver, Subscription, SubscriptionOptions};
pub use throttle::{Clock, ManualClock, SystemClock, ThrottleTimer, ThrottledInvoker};
pub use transport::{MemoryHandle, MemoryTransport, Transport};
pub use types::*;
pub use visibility::{VisibilityListener, VisibilityTracker};
