//! Subscription façade over the channel pool.
//!
//! A [`Subscription`] is what a consumer holds while it wants change events:
//! - registration on creation (when enabled)
//! - filtering by table, column expression and change kind
//! - forwarding to the latest callback
//! - exactly-once removal on drop, disable or re-targeting
//!
//! # Example
//!
//! ```ignore
//! let options = SubscriptionOptions::for_filter(
//!     ChangeFilter::table("patient_cases").with_expression("owner_id=eq.42")?,
//! )
//! .with_event(EventFilter::Insert);
//!
//! let subscription = Subscription::new(Arc::clone(&pool), options, |change| {
//!     println!("new case: {}", change.new);
//! })?;
//!
//! // Pull-style alternative
//! let (_subscription, events) = Subscription::with_receiver(pool, options, 64)?;
//! while let Ok(change) = events.recv() { /* ... */ }
//! ```

mod facade;
mod types;

pub use facade::Subscription;
pub use types::{EventReceiver, SubscriptionOptions};
