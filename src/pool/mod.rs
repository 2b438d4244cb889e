//! Shared channel connection pool.
//!
//! Many logical listeners on the same topic share one transport channel:
//! - the first listener opens it
//! - events fan out to every live handler in registration order
//! - the last listener to leave closes it, without blocking the caller
//! - `cleanup_all` tears everything down and waits for the closes to settle
//!
//! # Example
//!
//! ```ignore
//! let pool = ChannelPool::new(Arc::new(MemoryTransport::new()), PoolConfig::default())?;
//!
//! let first = pool.allocate_listener_id();
//! let second = pool.allocate_listener_id();
//! pool.add_listener("sessions", first)?;   // opens the transport channel
//! pool.add_listener("sessions", second)?;  // reuses it
//!
//! pool.remove_listener("sessions", first);
//! pool.remove_listener("sessions", second); // queues the close
//! assert_eq!(pool.active_channel_count(), 0);
//! ```

mod channel;
mod closer;
mod manager;

pub use channel::{ChangeHandler, Channel, ChannelSink};
pub use manager::ChannelPool;
