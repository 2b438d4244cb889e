//! In-process loopback transport.

use crate::error::{RealtimeError, Result};
use crate::pool::ChannelSink;
use crate::types::{ChangeEvent, Topic};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Transport;

/// Handle to a channel opened on a [`MemoryTransport`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MemoryHandle(u64);

/// Internal open-channel state.
struct OpenChannel {
    topic: Topic,
    sink: ChannelSink,
}

/// Transport that keeps channels in memory and delivers whatever is
/// published to them. Useful for tests and for wiring the pool inside a
/// single process.
pub struct MemoryTransport {
    /// Open channels by handle id.
    channels: RwLock<HashMap<u64, OpenChannel>>,
    next_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    /// Deliver `event` to every open channel for `topic`. Returns the number
    /// of handlers that ran.
    pub fn publish(&self, topic: &str, event: &ChangeEvent) -> usize {
        // Snapshot: handlers may close channels while we deliver.
        let sinks: Vec<ChannelSink> = self
            .channels
            .read()
            .values()
            .filter(|c| c.topic.as_str() == topic)
            .map(|c| c.sink.clone())
            .collect();

        sinks.iter().map(|sink| sink.deliver(event)).sum()
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Open channels for one topic.
    pub fn open_count_for(&self, topic: &str) -> usize {
        self.channels
            .read()
            .values()
            .filter(|c| c.topic.as_str() == topic)
            .count()
    }

    /// Total successful opens since creation.
    pub fn total_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Total successful closes since creation.
    pub fn total_closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    type Handle = MemoryHandle;

    fn open(&self, topic: &Topic, sink: ChannelSink) -> Result<MemoryHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.channels.write().insert(
            id,
            OpenChannel {
                topic: topic.clone(),
                sink,
            },
        );
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryHandle(id))
    }

    fn close(&self, handle: MemoryHandle) -> Result<()> {
        match self.channels.write().remove(&handle.0) {
            Some(_) => {
                self.closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(RealtimeError::transport(
                format!("handle {}", handle.0),
                "channel already closed",
            )),
        }
    }
}
