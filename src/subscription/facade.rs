//! Consumer-facing registration lifecycle.

use crate::error::{RealtimeError, Result};
use crate::pool::{ChangeHandler, ChannelPool};
use crate::transport::Transport;
use crate::types::{ChangeEvent, ListenerId, Topic};
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{EventReceiver, SubscriptionOptions};

/// Live registration in the pool.
struct Registration {
    topic: Topic,
    listener: ListenerId,
}

/// One consumer's interest in a (topic, filter, event kind) tuple.
///
/// While active, matching events are forwarded to the latest callback passed
/// to [`new`](Self::new) or [`set_callback`](Self::set_callback). The
/// registration is removed exactly once: on drop, on [`unmount`](Self::unmount),
/// when disabled, or before re-registering with new parameters.
pub struct Subscription<T: Transport> {
    pool: Arc<ChannelPool<T>>,
    options: SubscriptionOptions,
    /// Read at dispatch time, so swapping it never leaves a stale callback.
    callback: Arc<RwLock<ChangeHandler>>,
    registration: Option<Registration>,
}

impl<T: Transport> Subscription<T> {
    /// Create the subscription and, if enabled, register it.
    pub fn new<F>(pool: Arc<ChannelPool<T>>, options: SubscriptionOptions, on_update: F) -> Result<Self>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let on_update: ChangeHandler = Arc::new(on_update);
        let mut subscription = Self {
            pool,
            options,
            callback: Arc::new(RwLock::new(on_update)),
            registration: None,
        };
        subscription.activate()?;
        Ok(subscription)
    }

    /// Subscribe with a bounded buffer instead of a callback. The buffer must
    /// hold at least one event.
    pub fn with_receiver(
        pool: Arc<ChannelPool<T>>,
        options: SubscriptionOptions,
        buffer_size: usize,
    ) -> Result<(Self, EventReceiver)> {
        if buffer_size == 0 {
            return Err(RealtimeError::InvalidConfig(
                "receiver buffer size must be positive".to_string(),
            ));
        }
        let (sender, receiver) = bounded(buffer_size);
        let dropped = Arc::new(AtomicU64::new(0));

        let overflow = Arc::clone(&dropped);
        let subscription = Self::new(pool, options, move |event: &ChangeEvent| {
            if let Err(TrySendError::Full(_)) = sender.try_send(event.clone()) {
                overflow.fetch_add(1, Ordering::SeqCst);
            }
        })?;

        Ok((subscription, EventReceiver { receiver, dropped }))
    }

    /// Replace the callback. Takes effect for the next event, without
    /// touching the registration.
    pub fn set_callback<F>(&self, on_update: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        *self.callback.write() = Arc::new(on_update);
    }

    pub fn options(&self) -> &SubscriptionOptions {
        &self.options
    }

    /// Apply new parameters. A changed topic, filter or event kind tears the
    /// old registration down before the new one is made; unchanged
    /// parameters keep the current registration.
    pub fn reconfigure(&mut self, options: SubscriptionOptions) -> Result<()> {
        let retarget = !self.options.same_target(&options);
        self.options = options;

        if retarget || !self.options.enabled {
            self.deactivate();
        }
        self.activate()
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let options = self.options.clone().with_enabled(enabled);
        self.reconfigure(options)
    }

    /// Remove the registration now. The subscription stays inactive until
    /// reconfigured.
    pub fn unmount(&mut self) {
        self.options.enabled = false;
        self.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Listener id of the current registration.
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.registration.as_ref().map(|r| r.listener)
    }

    pub fn active_channel_count(&self) -> usize {
        self.pool.active_channel_count()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.pool.listener_count(topic)
    }

    fn activate(&mut self) -> Result<()> {
        if !self.options.enabled || self.registration.is_some() {
            return Ok(());
        }

        let listener = self.pool.allocate_listener_id();
        let filter = self.options.filter.clone();
        let event = self.options.event;
        let callback = Arc::clone(&self.callback);
        let handler: ChangeHandler = Arc::new(move |change: &ChangeEvent| {
            if !event.matches(change.kind) || !filter.matches(change) {
                return;
            }
            let on_update = Arc::clone(&*callback.read());
            on_update(change);
        });

        let topic = self.options.topic.clone();
        self.pool.register(topic.as_str(), listener, handler)?;
        tracing::debug!(topic = %topic, listener = %listener, "subscription registered");
        self.registration = Some(Registration { topic, listener });
        Ok(())
    }

    fn deactivate(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.pool
                .remove_listener(registration.topic.as_str(), registration.listener);
            tracing::debug!(
                topic = %registration.topic,
                listener = %registration.listener,
                "subscription removed"
            );
        }
    }
}

impl<T: Transport> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
