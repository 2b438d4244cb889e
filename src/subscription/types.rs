//! Subscription parameters and the pull-style receiver.

use crate::types::{ChangeEvent, ChangeFilter, EventFilter, Topic};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Pool topic (one transport channel per topic).
    pub topic: Topic,

    /// Match criteria applied to every event on the topic.
    pub filter: ChangeFilter,

    /// Change kinds to forward.
    /// Default: all
    pub event: EventFilter,

    /// When false, nothing is registered.
    /// Default: true
    pub enabled: bool,
}

impl SubscriptionOptions {
    pub fn new(topic: impl Into<Topic>, filter: ChangeFilter) -> Self {
        Self {
            topic: topic.into(),
            filter,
            event: EventFilter::All,
            enabled: true,
        }
    }

    /// Use the topic derived from the filter, so equal filters share a channel.
    pub fn for_filter(filter: ChangeFilter) -> Self {
        Self::new(Topic::for_filter(&filter), filter)
    }

    pub fn with_event(mut self, event: EventFilter) -> Self {
        self.event = event;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether `other` would register the same thing (ignores `enabled`).
    pub(crate) fn same_target(&self, other: &SubscriptionOptions) -> bool {
        self.topic == other.topic && self.filter == other.filter && self.event == other.event
    }
}

/// Receiving end of [`Subscription::with_receiver`](super::Subscription::with_receiver).
///
/// Matches are buffered up to the configured capacity; events that arrive
/// while the buffer is full are dropped and counted.
pub struct EventReceiver {
    pub(crate) receiver: Receiver<ChangeEvent>,
    pub(crate) dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Buffered events.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Events dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}
