//! Shared test transport.

#![allow(dead_code)]

use medimind_realtime::{
    ChangeEvent, ChannelPool, ChannelSink, MemoryHandle, MemoryTransport, PoolConfig,
    RealtimeError, Result, Topic, Transport,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle remembering which topic it belongs to.
pub struct ScriptedHandle {
    topic: Topic,
    inner: MemoryHandle,
}

/// Memory transport with per-topic counters, injectable failures and
/// optional slow closes.
#[derive(Default)]
pub struct ScriptedTransport {
    inner: MemoryTransport,
    /// Number of upcoming opens that fail.
    pub fail_opens: AtomicUsize,
    /// Number of upcoming closes that report failure.
    pub fail_closes: AtomicUsize,
    close_delay: Mutex<Duration>,
    opens: Mutex<HashMap<String, usize>>,
    closes: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock() = delay;
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_closes(&self, n: usize) {
        self.fail_closes.store(n, Ordering::SeqCst);
    }

    pub fn opens_for(&self, topic: &str) -> usize {
        self.opens.lock().get(topic).copied().unwrap_or(0)
    }

    pub fn closes_for(&self, topic: &str) -> usize {
        self.closes.lock().get(topic).copied().unwrap_or(0)
    }

    /// Channels currently open for `topic`.
    pub fn live_for(&self, topic: &str) -> usize {
        self.inner.open_count_for(topic)
    }

    pub fn live_total(&self) -> usize {
        self.inner.open_channel_count()
    }

    pub fn publish(&self, topic: &str, event: &ChangeEvent) -> usize {
        self.inner.publish(topic, event)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Transport for ScriptedTransport {
    type Handle = ScriptedHandle;

    fn open(&self, topic: &Topic, sink: ChannelSink) -> Result<ScriptedHandle> {
        if take_one(&self.fail_opens) {
            return Err(RealtimeError::transport(topic.as_str(), "subscribe rejected"));
        }
        let inner = self.inner.open(topic, sink)?;
        *self.opens.lock().entry(topic.to_string()).or_default() += 1;
        Ok(ScriptedHandle {
            topic: topic.clone(),
            inner,
        })
    }

    fn close(&self, handle: ScriptedHandle) -> Result<()> {
        let delay = *self.close_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.inner.close(handle.inner)?;
        *self.closes.lock().entry(handle.topic.to_string()).or_default() += 1;
        if take_one(&self.fail_closes) {
            return Err(RealtimeError::transport(handle.topic.as_str(), "unsubscribe timed out"));
        }
        Ok(())
    }
}

pub fn scripted_pool() -> (Arc<ScriptedTransport>, Arc<ChannelPool<ScriptedTransport>>) {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::default());
    let pool = Arc::new(ChannelPool::new(Arc::clone(&transport), PoolConfig::default()).unwrap());
    (transport, pool)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
