//! Host visibility tracking.
//!
//! The host (a UI shell, a window manager bridge, a test) feeds its native
//! visibility signal into [`VisibilityTracker::set_visible`]; interested
//! components read [`VisibilityTracker::is_visible`] or register a change
//! callback. Without a host signal the tracker reports "visible", so
//! throttled consumers degrade to un-throttled behavior instead of stalling.

use parking_lot::{ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type VisibilityCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct TrackerInner {
    visible: AtomicBool,
    callbacks: RwLock<Vec<(u64, VisibilityCallback)>>,
    next_id: AtomicU64,
    /// Held across each flip and its notification, so callbacks observe
    /// flips in the order they were applied. Re-entrant for callbacks that
    /// feed visibility themselves.
    notify: ReentrantMutex<()>,
}

impl TrackerInner {
    fn remove(&self, id: u64) {
        self.callbacks.write().retain(|(cb_id, _)| *cb_id != id);
    }
}

/// Observes whether the host is currently visible. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct VisibilityTracker {
    inner: Arc<TrackerInner>,
}

impl VisibilityTracker {
    /// Create a tracker that starts visible.
    pub fn new() -> Self {
        Self::with_state(true)
    }

    pub fn with_state(visible: bool) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                visible: AtomicBool::new(visible),
                callbacks: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                notify: ReentrantMutex::new(()),
            }),
        }
    }

    /// Create a tracker from an optional host signal. `None` means the host
    /// cannot report visibility, which is treated as visible.
    pub fn from_host_signal(signal: Option<bool>) -> Self {
        Self::with_state(signal.unwrap_or(true))
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    /// Record the host's current visibility. Callbacks run only when the
    /// state actually flips. Returns whether it flipped.
    ///
    /// Concurrent calls are serialized: the last callback delivered always
    /// matches the final state.
    pub fn set_visible(&self, visible: bool) -> bool {
        let _notify = self.inner.notify.lock();
        if self.inner.visible.swap(visible, Ordering::SeqCst) == visible {
            return false;
        }

        // Snapshot so callbacks may register or unregister without deadlocking.
        let callbacks: Vec<VisibilityCallback> = self
            .inner
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        tracing::debug!(visible, listeners = callbacks.len(), "visibility changed");
        for cb in callbacks {
            cb(visible);
        }
        true
    }

    /// Register a callback for visibility flips. The callback stays
    /// registered until the returned listener is dropped or unsubscribed.
    pub fn on_change<F>(&self, callback: F) -> VisibilityListener
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.callbacks.write().push((id, Arc::new(callback)));
        VisibilityListener {
            id,
            tracker: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered change callbacks.
    pub fn listener_count(&self) -> usize {
        self.inner.callbacks.read().len()
    }
}

impl Default for VisibilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration guard returned by [`VisibilityTracker::on_change`].
#[must_use = "dropping the listener unregisters its callback"]
pub struct VisibilityListener {
    id: u64,
    tracker: Weak<TrackerInner>,
}

impl VisibilityListener {
    /// Unregister the callback now.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for VisibilityListener {
    fn drop(&mut self) {
        if let Some(inner) = self.tracker.upgrade() {
            inner.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_defaults_to_visible() {
        assert!(VisibilityTracker::new().is_visible());
        assert!(VisibilityTracker::from_host_signal(None).is_visible());
        assert!(!VisibilityTracker::from_host_signal(Some(false)).is_visible());
    }

    #[test]
    fn test_callbacks_fire_on_flip_only() {
        let tracker = VisibilityTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _listener = tracker.on_change(move |v| sink.lock().push(v));

        assert!(!tracker.set_visible(true)); // no flip
        assert!(tracker.set_visible(false));
        assert!(!tracker.set_visible(false));
        assert!(tracker.set_visible(true));

        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn test_independent_registrations() {
        let tracker = VisibilityTracker::new();
        let a = Arc::new(AtomicU64::new(0));
        let b = Arc::new(AtomicU64::new(0));

        let a2 = Arc::clone(&a);
        let first = tracker.on_change(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let b2 = Arc::clone(&b);
        let _second = tracker.on_change(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(tracker.listener_count(), 2);

        tracker.set_visible(false);
        first.unsubscribe();
        assert_eq!(tracker.listener_count(), 1);
        tracker.set_visible(true);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_flips_deliver_in_order() {
        let tracker = VisibilityTracker::new();
        let last = Arc::new(Mutex::new(true));
        let sink = Arc::clone(&last);
        let _listener = tracker.on_change(move |v| {
            std::thread::yield_now();
            *sink.lock() = v;
        });

        let workers: Vec<_> = [true, false]
            .into_iter()
            .map(|state| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..2000 {
                        tracker.set_visible(if i % 2 == 0 { state } else { !state });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(*last.lock(), tracker.is_visible());
    }

    #[test]
    fn test_callback_may_feed_visibility() {
        let tracker = VisibilityTracker::new();
        let inner = tracker.clone();
        let _listener = tracker.on_change(move |v| {
            // Bounce straight back to visible
            if !v {
                inner.set_visible(true);
            }
        });

        assert!(tracker.set_visible(false));
        assert!(tracker.is_visible());
    }

    #[test]
    fn test_listener_outliving_tracker() {
        let tracker = VisibilityTracker::new();
        let listener = tracker.on_change(|_| {});
        drop(tracker);
        drop(listener); // must not panic
    }
}
