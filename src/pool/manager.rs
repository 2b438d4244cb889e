//! Topic-to-channel bookkeeping with reference-counted listeners.

use crate::config::PoolConfig;
use crate::error::{RealtimeError, Result};
use crate::transport::Transport;
use crate::types::{ListenerId, Topic};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::channel::{ChangeHandler, Channel};
use super::closer::Closer;

/// Internal per-topic state.
struct TopicEntry<H> {
    channel: Arc<Channel>,
    /// Registered listeners, in registration order.
    listeners: Vec<ListenerId>,
    /// Open transport subscription. Present iff `listeners` is non-empty.
    handle: Option<H>,
}

type TopicMap<H> = HashMap<Topic, TopicEntry<H>>;

/// Owns at most one transport channel per topic and the listener set of
/// each.
///
/// The first listener on a topic opens the transport channel; removing the
/// last one closes it (on a background thread) and forgets the topic. Open
/// runs under the pool lock, so it happens exactly once per channel
/// lifetime. A failed open leaves no trace, so the next registration tries
/// again; a failed close is logged and otherwise treated as closed.
pub struct ChannelPool<T: Transport> {
    transport: Arc<T>,
    config: PoolConfig,
    topics: Mutex<TopicMap<T::Handle>>,
    next_listener: AtomicU64,
    closer: Closer<T>,
}

impl<T: Transport> ChannelPool<T> {
    pub fn new(transport: Arc<T>, config: PoolConfig) -> Result<Self> {
        let closer = Closer::spawn(Arc::clone(&transport), &config.closer_thread_name)?;
        Ok(Self {
            transport,
            config,
            topics: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            closer,
        })
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Allocate a fresh listener id.
    pub fn allocate_listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst))
    }

    /// Return the channel for `topic`, creating an unopened one if needed.
    /// No transport I/O happens here.
    pub fn get_or_create_channel(&self, topic: &str) -> Result<Arc<Channel>> {
        let mut topics = self.topics.lock();
        Ok(Arc::clone(&self.entry_for(&mut topics, topic).channel))
    }

    /// Record `listener` as interested in `topic`, opening the transport
    /// channel if it is the first. Returns the listener count afterwards.
    /// Adding an already registered listener changes nothing.
    pub fn add_listener(&self, topic: &str, listener: ListenerId) -> Result<usize> {
        let mut topics = self.topics.lock();
        let channel = Arc::clone(&self.entry_for(&mut topics, topic).channel);
        let result = self.add_locked(&mut topics, topic, listener);
        drop(topics);

        if result.is_err() {
            channel.close();
        }
        result
    }

    /// Attach `handler` to the topic's channel and add `listener` in one
    /// step, so a concurrent teardown of the topic cannot strand the handler
    /// on a closed channel. A listener that already has a handler on the
    /// topic is rejected and keeps its original handler.
    pub fn register(&self, topic: &str, listener: ListenerId, handler: ChangeHandler) -> Result<usize> {
        let mut topics = self.topics.lock();
        let channel = Arc::clone(&self.entry_for(&mut topics, topic).channel);
        if !channel.attach(listener, handler) {
            return Err(RealtimeError::DuplicateListener {
                topic: topic.to_string(),
                listener: listener.0,
            });
        }
        let result = self.add_locked(&mut topics, topic, listener);
        drop(topics);

        if result.is_err() {
            channel.close();
        }
        result
    }

    /// Remove `listener` from `topic`. Returns the remaining count; removing
    /// an unknown listener is a no-op.
    ///
    /// When the count reaches zero the topic is forgotten and the transport
    /// close is queued, not awaited. Once this returns the listener's handler
    /// is not entered again; called outside any handler it also waits for a
    /// call already running on another thread.
    pub fn remove_listener(&self, topic: &str, listener: ListenerId) -> usize {
        let (channel, remaining, teardown) = {
            let mut topics = self.topics.lock();
            let Some(entry) = topics.get_mut(topic) else {
                return 0;
            };
            let Some(pos) = entry.listeners.iter().position(|l| *l == listener) else {
                return entry.listeners.len();
            };
            entry.listeners.remove(pos);

            let channel = Arc::clone(&entry.channel);
            let remaining = entry.listeners.len();
            let teardown = if remaining == 0 {
                topics.remove(topic).and_then(|e| e.handle)
            } else {
                None
            };
            (channel, remaining, teardown)
        };

        // Handler gates are taken outside the pool lock: a handler running on
        // another thread may itself be waiting for that lock.
        channel.detach(listener);
        if remaining == 0 {
            channel.close();
            if let Some(handle) = teardown {
                tracing::debug!(topic, "last listener removed, closing channel");
                self.closer.schedule(channel.topic().clone(), handle);
            }
        }
        remaining
    }

    /// Number of topics with at least one listener.
    pub fn active_channel_count(&self) -> usize {
        self.topics
            .lock()
            .values()
            .filter(|e| !e.listeners.is_empty())
            .count()
    }

    /// Number of listeners on `topic`; zero if the topic is unknown.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }

    /// Topics with at least one listener, sorted.
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .topics
            .lock()
            .iter()
            .filter(|(_, e)| !e.listeners.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Transport closes queued but not yet settled.
    pub fn pending_closes(&self) -> usize {
        self.closer.pending()
    }

    /// Transport closes that reported an error since the pool was created.
    pub fn close_failures(&self) -> u64 {
        self.closer.failures()
    }

    /// Block until every transport close queued so far has settled.
    pub fn wait_for_pending_closes(&self) {
        self.closer.flush();
    }

    /// Tear down every channel regardless of listener counts and wait until
    /// all closes, including ones already in flight, have settled. Returns
    /// the number of transport channels this call closed.
    pub fn cleanup_all(&self) -> usize {
        let drained: Vec<(Topic, TopicEntry<T::Handle>)> = self.topics.lock().drain().collect();

        let mut closed = 0;
        for (topic, entry) in drained {
            entry.channel.close();
            if let Some(handle) = entry.handle {
                self.closer.schedule(topic, handle);
                closed += 1;
            }
        }
        self.closer.flush();

        tracing::debug!(channels = closed, "channel pool cleaned up");
        closed
    }

    fn entry_for<'a>(
        &self,
        topics: &'a mut TopicMap<T::Handle>,
        topic: &str,
    ) -> &'a mut TopicEntry<T::Handle> {
        let topic = Topic::from(topic);
        topics.entry(topic.clone()).or_insert_with(|| TopicEntry {
            channel: Channel::new(topic),
            listeners: Vec::new(),
            handle: None,
        })
    }

    /// Add under the pool lock. Only topics with listeners count toward
    /// `max_channels`. When the limit is hit or the open fails the topic is
    /// removed from the map; the caller closes its channel after releasing
    /// the lock.
    fn add_locked(
        &self,
        topics: &mut TopicMap<T::Handle>,
        topic: &str,
        listener: ListenerId,
    ) -> Result<usize> {
        let entry = self.entry_for(topics, topic);
        if entry.listeners.contains(&listener) {
            return Ok(entry.listeners.len());
        }
        let needs_open = entry.handle.is_none();

        if needs_open {
            if let Some(limit) = self.config.max_channels {
                let active = topics.values().filter(|e| !e.listeners.is_empty()).count();
                if active >= limit {
                    topics.remove(topic);
                    return Err(RealtimeError::ChannelLimit { limit });
                }
            }
        }

        let entry = self.entry_for(topics, topic);
        if needs_open {
            match self.transport.open(entry.channel.topic(), entry.channel.sink()) {
                Ok(handle) => {
                    tracing::debug!(topic, "transport channel opened");
                    entry.handle = Some(handle);
                }
                Err(e) => {
                    tracing::warn!(topic, error = %e, "transport open failed");
                    topics.remove(topic);
                    return Err(e);
                }
            }
        }

        entry.listeners.push(listener);
        Ok(entry.listeners.len())
    }
}

impl<T: Transport> Drop for ChannelPool<T> {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
