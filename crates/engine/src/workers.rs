//! Background flush and compaction threads.
//!
//! Both workers run for the lifetime of an open [`crate::Engine`] as plain OS
//! threads, coordinated through bounded(1) signal channels rather than
//! shared mutable state. Closing the sender half (done from `Engine::close`)
//! is what tells a worker to stop: its blocking/timed `recv` call returns
//! `Disconnected` and the thread returns.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::Inner;

pub(crate) fn spawn_flush_worker(
    inner: Arc<Inner>,
    flush_rx: Receiver<()>,
    compaction_tx: Sender<()>,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        if flush_rx.recv().is_err() {
            info!("flush worker stopping");
            return;
        }
        loop {
            match inner.flush_oldest_immutable() {
                Ok(true) => {
                    let _ = compaction_tx.try_send(());
                }
                Ok(false) => break,
                Err(e) => {
                    error!(error = %e, "flush failed");
                    inner.set_health(format!("flush failed: {e}"));
                    break;
                }
            }
        }
    })
}

pub(crate) fn spawn_compaction_worker(
    inner: Arc<Inner>,
    compaction_rx: Receiver<()>,
    interval: Duration,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        match compaction_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = inner.compact() {
                    warn!(error = %e, "compaction attempt failed");
                    inner.set_health(format!("compaction failed: {e}"));
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("compaction worker stopping");
                return;
            }
        }
    })
}
