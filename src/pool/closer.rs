//! Background teardown of transport channels.

use crate::error::Result;
use crate::transport::Transport;
use crate::types::Topic;
use crossbeam_channel::{bounded, unbounded, SendError, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum CloseJob<H> {
    Close { topic: Topic, handle: H },
    /// Acknowledged once every job queued before it has run.
    Flush(Sender<()>),
}

/// Counters shared between the pool and the worker.
#[derive(Default)]
struct CloseStats {
    pending: AtomicUsize,
    failures: AtomicU64,
}

/// Closes transport handles on a dedicated thread so removing the last
/// listener never blocks on transport I/O.
pub(crate) struct Closer<T: Transport> {
    transport: Arc<T>,
    queue: Option<Sender<CloseJob<T::Handle>>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<CloseStats>,
}

impl<T: Transport> Closer<T> {
    pub(crate) fn spawn(transport: Arc<T>, thread_name: &str) -> Result<Self> {
        let (tx, rx) = unbounded::<CloseJob<T::Handle>>();
        let stats = Arc::new(CloseStats::default());

        let worker_transport = Arc::clone(&transport);
        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                for job in rx {
                    match job {
                        CloseJob::Close { topic, handle } => {
                            run_close(&*worker_transport, &worker_stats, &topic, handle);
                        }
                        CloseJob::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })?;

        Ok(Self {
            transport,
            queue: Some(tx),
            worker: Some(worker),
            stats,
        })
    }

    /// Queue `handle` for closing. Returns immediately.
    pub(crate) fn schedule(&self, topic: Topic, handle: T::Handle) {
        self.stats.pending.fetch_add(1, Ordering::SeqCst);
        let job = CloseJob::Close { topic, handle };

        let unsent = match self.queue.as_ref() {
            Some(queue) => match queue.send(job) {
                Ok(()) => None,
                Err(SendError(job)) => Some(job),
            },
            None => Some(job),
        };

        // Worker is gone (it panicked); close on the caller's thread instead.
        if let Some(CloseJob::Close { topic, handle }) = unsent {
            run_close(&*self.transport, &self.stats, &topic, handle);
        }
    }

    /// Block until every close queued so far has settled.
    pub(crate) fn flush(&self) {
        let Some(queue) = self.queue.as_ref() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if queue.send(CloseJob::Flush(ack_tx)).is_ok() {
            // Err means the worker died and dropped the job; nothing left to wait on.
            let _ = ack_rx.recv();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.stats.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::SeqCst)
    }
}

impl<T: Transport> Drop for Closer<T> {
    fn drop(&mut self) {
        // Disconnecting the queue lets the worker drain what is left and exit.
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("channel closer thread panicked");
            }
        }
    }
}

fn run_close<T: Transport>(transport: &T, stats: &CloseStats, topic: &Topic, handle: T::Handle) {
    match transport.close(handle) {
        Ok(()) => tracing::debug!(topic = %topic, "transport channel closed"),
        Err(e) => {
            stats.failures.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(topic = %topic, error = %e, "transport close failed, channel dropped anyway");
        }
    }
    stats.pending.fetch_sub(1, Ordering::SeqCst);
}
