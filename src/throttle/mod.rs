//! Visibility-aware throttling.
//!
//! A [`ThrottledInvoker`] gates how often a caller acts on incoming changes:
//! at most once per interval, never while the host is hidden (unless
//! configured otherwise), and once immediately when the host becomes
//! visible again. It is independent of whether any transport channel is
//! open.
//!
//! # Example
//!
//! ```ignore
//! let tracker = VisibilityTracker::new();
//! let invoker = Arc::new(ThrottledInvoker::new(ThrottleConfig::default(), || {
//!     refresh_case_list()
//! }));
//! let _visibility = invoker.follow(&tracker);
//! invoker.start()?;
//! let _timer = ThrottleTimer::spawn(Arc::clone(&invoker), Duration::from_millis(250))?;
//! ```

mod clock;
mod invoker;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use invoker::ThrottledInvoker;
pub use timer::ThrottleTimer;
