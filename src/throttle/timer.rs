//! Background driver for a throttled invoker's repeating timer.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::invoker::ThrottledInvoker;
use crate::error::Result;

/// Polls a [`ThrottledInvoker`] every `resolution` on its own thread.
///
/// The invoker decides whether a tick actually runs the action, so the
/// resolution only bounds how late an invocation can be. Dropping the timer
/// stops and joins the thread.
pub struct ThrottleTimer {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ThrottleTimer {
    pub fn spawn<F, E>(invoker: Arc<ThrottledInvoker<F>>, resolution: Duration) -> Result<Self>
    where
        F: FnMut() -> std::result::Result<(), E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("throttle-timer".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(resolution) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = invoker.poll() {
                            tracing::warn!(error = %e, "throttled action failed on timer tick");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Stop the timer and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the worker.
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("throttle timer thread panicked");
            }
        }
    }
}

impl Drop for ThrottleTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
