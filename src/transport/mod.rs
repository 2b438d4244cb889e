//! The realtime transport capability the pool depends on.
//!
//! A transport opens one channel per topic and pushes change events for it
//! into the [`ChannelSink`] it was given, until the channel is closed. The
//! pool calls `open` exactly once per channel lifetime and `close` exactly
//! once per opened handle.

mod memory;

pub use memory::{MemoryHandle, MemoryTransport};

use crate::error::Result;
use crate::pool::ChannelSink;
use crate::types::Topic;

pub trait Transport: Send + Sync + 'static {
    /// Live subscription owned by the pool between `open` and `close`.
    type Handle: Send + 'static;

    /// Open a channel for `topic`, delivering its events into `sink`.
    fn open(&self, topic: &Topic, sink: ChannelSink) -> Result<Self::Handle>;

    /// Close a previously opened channel. Errors are logged by the pool and
    /// otherwise ignored.
    fn close(&self, handle: Self::Handle) -> Result<()>;
}
