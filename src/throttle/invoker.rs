//! Visibility-aware rate limiting of a caller-supplied action.

use crate::config::ThrottleConfig;
use crate::visibility::{VisibilityListener, VisibilityTracker};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};

/// Internal throttle state.
struct ThrottleState {
    config: ThrottleConfig,
    visible: bool,
    /// Set by `start`, cleared by `stop`.
    started: bool,
    /// Whether the repeating timer is running.
    timer_armed: bool,
    last_invoked: Option<Instant>,
    invocations: u64,
}

impl ThrottleState {
    fn can_run(&self) -> bool {
        self.config.enabled && (self.visible || !self.config.pause_when_hidden)
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        match self.last_invoked {
            Some(last) => now.saturating_duration_since(last) >= self.config.interval,
            None => true,
        }
    }

    fn rearm(&mut self) {
        self.timer_armed = self.started && self.can_run();
    }
}

/// Runs an action at most once per interval, pausing while the host is hidden.
///
/// The action returns `Result<(), E>`; a failure is handed back to whichever
/// call triggered the invocation. Bookkeeping (last invocation, timer) is
/// updated before the action runs, so a failing or panicking action leaves
/// the timer neither stopped nor double-scheduled.
///
/// The action must not call back into its own invoker.
pub struct ThrottledInvoker<F> {
    state: Mutex<ThrottleState>,
    action: Mutex<F>,
    clock: Arc<dyn Clock>,
}

impl<F> ThrottledInvoker<F> {
    pub fn new(config: ThrottleConfig, action: F) -> Self {
        Self::with_clock(config, Arc::new(SystemClock), action)
    }

    pub fn with_clock(config: ThrottleConfig, clock: Arc<dyn Clock>, action: F) -> Self {
        Self {
            state: Mutex::new(ThrottleState {
                config,
                visible: true,
                started: false,
                timer_armed: false,
                last_invoked: None,
                invocations: 0,
            }),
            action: Mutex::new(action),
            clock,
        }
    }

    /// Stop the repeating timer. Manual and throttled calls still work.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.started = false;
        state.timer_armed = false;
    }

    /// Turn the invoker on or off. Disabling clears the timer; enabling
    /// re-arms it, counting the interval from the last invocation.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.config.enabled = enabled;
        state.rearm();
    }

    /// Change the interval. The next scheduling decision uses it.
    pub fn set_interval(&self, interval: Duration) {
        self.state.lock().config.interval = interval;
    }

    pub fn config(&self) -> ThrottleConfig {
        self.state.lock().config.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn is_timer_armed(&self) -> bool {
        self.state.lock().timer_armed
    }

    pub fn last_invoked(&self) -> Option<Instant> {
        self.state.lock().last_invoked
    }

    /// When the timer will next fire, if it is armed.
    pub fn next_due(&self) -> Option<Instant> {
        let state = self.state.lock();
        if !state.timer_armed {
            return None;
        }
        Some(match state.last_invoked {
            Some(last) => last + state.config.interval,
            None => self.clock.now(),
        })
    }

    /// Total number of times the action has run.
    pub fn invocation_count(&self) -> u64 {
        self.state.lock().invocations
    }
}

impl<F, E> ThrottledInvoker<F>
where
    F: FnMut() -> Result<(), E>,
{
    /// Start the repeating timer, running the action immediately when allowed.
    ///
    /// Returns `Ok(true)` if the action ran. Calling `start` twice is a no-op.
    pub fn start(&self) -> Result<bool, E> {
        let mut state = self.state.lock();
        if state.started {
            return Ok(false);
        }
        state.started = true;
        if !state.can_run() {
            state.timer_armed = false;
            return Ok(false);
        }
        let now = self.clock.now();
        self.fire(state, now)
    }

    /// Timer tick: run the action if the timer is armed and the interval
    /// since the last invocation has elapsed.
    pub fn poll(&self) -> Result<bool, E> {
        let state = self.state.lock();
        if !(state.timer_armed && state.can_run()) {
            return Ok(false);
        }
        let now = self.clock.now();
        if !state.interval_elapsed(now) {
            return Ok(false);
        }
        self.fire(state, now)
    }

    /// Throttled call from the caller: runs only if enabled, not paused by
    /// visibility, and a full interval has passed since the last invocation.
    pub fn try_invoke(&self) -> Result<bool, E> {
        let state = self.state.lock();
        if !state.can_run() {
            return Ok(false);
        }
        let now = self.clock.now();
        if !state.interval_elapsed(now) {
            return Ok(false);
        }
        self.fire(state, now)
    }

    /// Run the action now, ignoring the interval. The countdown for the next
    /// automatic run restarts from here. Does nothing while disabled.
    pub fn invoke_now(&self) -> Result<bool, E> {
        let state = self.state.lock();
        if !state.config.enabled {
            return Ok(false);
        }
        let now = self.clock.now();
        self.fire(state, now)
    }

    /// Feed a visibility change.
    ///
    /// Hiding cancels the timer when `pause_when_hidden` is set. Showing
    /// re-arms it and, with `invoke_on_becoming_visible`, runs the action
    /// once immediately regardless of how much of the interval elapsed.
    pub fn set_visible(&self, visible: bool) -> Result<bool, E> {
        let mut state = self.state.lock();
        if state.visible == visible {
            return Ok(false);
        }
        state.visible = visible;

        if !visible {
            if state.config.pause_when_hidden {
                state.timer_armed = false;
            }
            return Ok(false);
        }

        if !(state.started && state.config.enabled) {
            return Ok(false);
        }
        if state.config.invoke_on_becoming_visible {
            let now = self.clock.now();
            return self.fire(state, now);
        }
        state.timer_armed = true;
        Ok(false)
    }

    fn fire(&self, mut state: MutexGuard<'_, ThrottleState>, now: Instant) -> Result<bool, E> {
        state.last_invoked = Some(now);
        state.invocations += 1;
        state.rearm();
        drop(state);

        let mut action = self.action.lock();
        (*action)()?;
        Ok(true)
    }
}

impl<F, E> ThrottledInvoker<F>
where
    F: FnMut() -> Result<(), E> + Send + 'static,
    E: fmt::Display + 'static,
{
    /// Track a [`VisibilityTracker`]: adopt its current state and follow
    /// every flip until the returned listener is dropped. Action failures on
    /// this path have no caller to return to and are logged.
    pub fn follow(self: &Arc<Self>, tracker: &VisibilityTracker) -> VisibilityListener {
        if let Err(e) = self.set_visible(tracker.is_visible()) {
            tracing::warn!(error = %e, "throttled action failed on visibility sync");
        }

        let invoker = Arc::downgrade(self);
        tracker.on_change(move |visible| {
            if let Some(invoker) = invoker.upgrade() {
                if let Err(e) = invoker.set_visible(visible) {
                    tracing::warn!(error = %e, visible, "throttled action failed on visibility change");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::clock::ManualClock;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    type Counter = Arc<AtomicU64>;

    fn counting(
        config: ThrottleConfig,
        clock: &Arc<ManualClock>,
    ) -> (
        ThrottledInvoker<impl FnMut() -> Result<(), String>>,
        Counter,
    ) {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let invoker = ThrottledInvoker::with_clock(config, clock.clone(), move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        (invoker, count)
    }

    #[test]
    fn test_tight_loop_respects_interval() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(1000)), &clock);

        for _ in 0..5000 {
            invoker.try_invoke().unwrap();
            clock.advance(ms(1));
        }

        let n = count.load(Ordering::SeqCst);
        assert!((4..=5).contains(&n), "ran {} times", n);
    }

    #[test]
    fn test_visibility_cycle_timeline() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(2000)), &clock);

        // t=0: immediate first run
        assert!(invoker.start().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // t=500: hide
        clock.set_elapsed(ms(500));
        invoker.set_visible(false).unwrap();
        assert!(!invoker.is_timer_armed());

        // Nothing through t=10000
        for t in (600..=10_000).step_by(100) {
            clock.set_elapsed(ms(t));
            assert!(!invoker.poll().unwrap());
            assert!(!invoker.try_invoke().unwrap());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // t=10000: visible, immediate run
        assert!(invoker.set_visible(true).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(invoker.next_due(), Some(clock.at(ms(12_000))));

        clock.set_elapsed(ms(11_999));
        assert!(!invoker.poll().unwrap());
        clock.set_elapsed(ms(12_000));
        assert!(invoker.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resume_fires_once_not_per_missed_interval() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(100)), &clock);
        invoker.start().unwrap();

        invoker.set_visible(false).unwrap();
        clock.advance(ms(10_000));
        invoker.set_visible(true).unwrap();

        // Polling right after the transition must not catch up missed ticks
        for _ in 0..10 {
            invoker.poll().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_pause_when_configured() {
        let clock = Arc::new(ManualClock::new());
        let config = ThrottleConfig {
            interval: ms(100),
            pause_when_hidden: false,
            invoke_on_becoming_visible: false,
            enabled: true,
        };
        let (invoker, count) = counting(config, &clock);
        invoker.start().unwrap();

        invoker.set_visible(false).unwrap();
        assert!(invoker.is_timer_armed());
        clock.advance(ms(100));
        assert!(invoker.poll().unwrap());

        // Becoming visible without the flag does not fire
        assert!(!invoker.set_visible(true).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_invoke_resets_countdown() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(1000)), &clock);
        invoker.start().unwrap();

        clock.set_elapsed(ms(800));
        assert!(invoker.invoke_now().unwrap());

        // t=1000 would have been due from t=0, but the manual run moved it
        clock.set_elapsed(ms(1000));
        assert!(!invoker.poll().unwrap());
        clock.set_elapsed(ms(1800));
        assert!(invoker.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_disable_clears_timer_and_enable_rearms() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(100)), &clock);
        invoker.start().unwrap();

        invoker.set_enabled(false);
        assert!(!invoker.is_timer_armed());
        clock.advance(ms(500));
        assert!(!invoker.poll().unwrap());
        assert!(!invoker.try_invoke().unwrap());
        assert!(!invoker.invoke_now().unwrap());

        invoker.set_enabled(true);
        assert!(invoker.is_timer_armed());
        assert!(invoker.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_from_the_start() {
        let clock = Arc::new(ManualClock::new());
        let config = ThrottleConfig {
            enabled: false,
            ..ThrottleConfig::with_interval(ms(100))
        };
        let (invoker, count) = counting(config, &clock);

        assert!(!invoker.start().unwrap());
        clock.advance(ms(1000));
        assert!(!invoker.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interval_change_applies_to_next_decision() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(1000)), &clock);
        invoker.start().unwrap();

        clock.set_elapsed(ms(300));
        assert!(!invoker.poll().unwrap());

        invoker.set_interval(ms(200));
        assert!(invoker.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(invoker.config().interval, ms(200));
    }

    #[test]
    fn test_failing_action_keeps_timer_consistent() {
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let invoker = ThrottledInvoker::with_clock(
            ThrottleConfig::with_interval(ms(100)),
            clock.clone(),
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 1 {
                    Err(format!("boom on call {}", n))
                } else {
                    Ok(())
                }
            },
        );

        invoker.start().unwrap();
        clock.advance(ms(100));
        let err = invoker.poll().unwrap_err();
        assert!(err.contains("boom"));

        // Timer is still armed and counts from the failed attempt
        assert!(invoker.is_timer_armed());
        assert!(!invoker.poll().unwrap());
        clock.advance(ms(100));
        assert!(invoker.poll().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_follow_tracker() {
        let clock = Arc::new(ManualClock::new());
        let (invoker, count) = counting(ThrottleConfig::with_interval(ms(1000)), &clock);
        let invoker = Arc::new(invoker);
        let tracker = VisibilityTracker::with_state(false);

        let listener = invoker.follow(&tracker);
        assert!(!invoker.is_visible());
        assert!(!invoker.start().unwrap());

        tracker.set_visible(true);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(listener);
        tracker.set_visible(false);
        assert!(invoker.is_visible());
    }
}
