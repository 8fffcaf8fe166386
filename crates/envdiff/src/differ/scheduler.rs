//! Runs reconciliation cycles on a background thread.
//!
//! Cycles run strictly one after another. Between cycles the thread sleeps
//! for the differ's poll interval or until a manual trigger arrives.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::broadcast;

use super::reconciler::ClusterDiffer;

/// Periodic scheduler for a [`ClusterDiffer`].
pub struct DiffScheduler {
    differ: Arc<ClusterDiffer>,
    trigger_tx: broadcast::Sender<()>,
}

impl DiffScheduler {
    pub fn new(differ: Arc<ClusterDiffer>) -> Self {
        let (trigger_tx, _) = broadcast::channel(16);
        Self { differ, trigger_tx }
    }

    pub fn differ(&self) -> &Arc<ClusterDiffer> {
        &self.differ
    }

    /// Starts the loop in a background thread. The first cycle runs
    /// immediately.
    pub fn start(&self) -> std::io::Result<JoinHandle<()>> {
        let differ = Arc::clone(&self.differ);
        let mut trigger_rx = self.trigger_tx.subscribe();

        std::thread::Builder::new()
            .name("envdiff-scheduler".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to build scheduler runtime");
                        differ.mark_stopped();
                        return;
                    }
                };

                rt.block_on(async {
                    loop {
                        if differ.is_stopping() {
                            break;
                        }

                        // failures are recorded in the differ status
                        let _ = differ.reconcile();

                        if differ.is_stopping() {
                            break;
                        }

                        let interval = differ.poll_interval();
                        tracing::debug!(?interval, "Waiting for next cycle");
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {},
                            Ok(()) = trigger_rx.recv() => {
                                tracing::info!("Manual reconcile triggered");
                            },
                        }
                    }
                });

                differ.mark_stopped();
                tracing::info!("Scheduler stopped");
            })
    }

    /// Requests an immediate cycle. Returns `false` if the loop is not running.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.send(()).is_ok()
    }

    /// Signals the loop to stop and wakes it if it is sleeping.
    pub fn stop(&self) {
        self.differ.request_stop();
        let _ = self.trigger_tx.send(());
    }
}
