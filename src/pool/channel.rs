//! Per-topic event fan-out.

use crate::types::{ChangeEvent, ListenerId, Topic};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback receiving change events for a topic.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

thread_local! {
    /// Handler calls currently on this thread's stack, across all channels.
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a handler until dropped.
struct DispatchScope;

impl DispatchScope {
    fn enter() -> Self {
        DISPATCH_DEPTH.with(|d| d.set(d.get() + 1));
        DispatchScope
    }

    fn active() -> bool {
        DISPATCH_DEPTH.with(|d| d.get() > 0)
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// One attached handler plus its liveness gate.
///
/// The gate is held for the duration of each call and `live` is checked
/// under it. Deactivation clears `live` and then takes the gate, so once it
/// returns the handler is never entered again. When deactivation happens
/// from inside a handler it does not wait: two handlers on different
/// threads removing each other would otherwise block forever. In that case
/// a call already running elsewhere finishes, but no new call starts.
struct HandlerSlot {
    listener: ListenerId,
    live: AtomicBool,
    gate: ReentrantMutex<()>,
    handler: ChangeHandler,
}

impl HandlerSlot {
    fn invoke(&self, event: &ChangeEvent) -> bool {
        let _gate = self.gate.lock();
        if !self.live.load(Ordering::SeqCst) {
            return false;
        }
        let _scope = DispatchScope::enter();
        (self.handler)(event);
        true
    }

    fn deactivate(&self) {
        self.live.store(false, Ordering::SeqCst);
        if !DispatchScope::active() {
            drop(self.gate.lock());
        }
    }
}

/// Dispatch point for one topic's events.
///
/// Handlers run in attach order. A handler detached while a dispatch pass is
/// running is skipped for the rest of that pass.
pub struct Channel {
    topic: Topic,
    slots: RwLock<Vec<Arc<HandlerSlot>>>,
    closed: AtomicBool,
}

impl Channel {
    pub(crate) fn new(topic: Topic) -> Arc<Self> {
        Arc::new(Self {
            topic,
            slots: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Attach a handler for `listener`. Returns false if the listener already
    /// has one or the channel is closed.
    ///
    /// Prefer [`ChannelPool::register`](crate::ChannelPool::register), which
    /// attaches and adds the listener in one step.
    pub fn attach(&self, listener: ListenerId, handler: ChangeHandler) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut slots = self.slots.write();
        if slots.iter().any(|s| s.listener == listener) {
            return false;
        }
        slots.push(Arc::new(HandlerSlot {
            listener,
            live: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
            handler,
        }));
        true
    }

    /// Detach the handler for `listener`. Outside a handler this waits for an
    /// in-flight call on another thread to finish. Returns whether a handler
    /// was attached.
    pub fn detach(&self, listener: ListenerId) -> bool {
        let slot = {
            let mut slots = self.slots.write();
            match slots.iter().position(|s| s.listener == listener) {
                Some(pos) => slots.remove(pos),
                None => return false,
            }
        };
        slot.deactivate();
        true
    }

    /// Deliver an event to every live handler. Returns how many ran.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        if self.is_closed() {
            return 0;
        }
        let slots: Vec<Arc<HandlerSlot>> = self.slots.read().clone();

        let mut delivered = 0;
        for slot in slots {
            if self.is_closed() {
                break;
            }
            if slot.invoke(event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Stop delivering and deactivate every handler.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<Arc<HandlerSlot>> = std::mem::take(&mut *self.slots.write());
        for slot in slots {
            slot.deactivate();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.slots.read().len()
    }

    /// The sink handed to the transport when the channel is opened.
    pub fn sink(self: &Arc<Self>) -> ChannelSink {
        ChannelSink {
            channel: Arc::clone(self),
        }
    }
}

/// Transport-facing end of a [`Channel`]. Events delivered after the channel
/// closed are dropped.
#[derive(Clone)]
pub struct ChannelSink {
    channel: Arc<Channel>,
}

impl ChannelSink {
    pub fn deliver(&self, event: &ChangeEvent) -> usize {
        self.channel.dispatch(event)
    }

    pub fn topic(&self) -> &Topic {
        self.channel.topic()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
