//! Append-only bounded log sink.
//!
//! Dispatch attempts are recorded through an unbounded channel drained by a
//! single writer task, so the hot path never waits on the database. The
//! writer periodically evicts the oldest rows past the soft cap.

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::store::{NewLogEntry, Store};

/// Trim cadence in inserts; keeps overshoot past the cap bounded.
const TRIM_EVERY: u64 = 32;

#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<NewLogEntry>,
}

impl LogSink {
    /// Starts the writer task. Dropping every clone of the sink ends it.
    pub fn spawn(store: Store, cap: i64) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewLogEntry>();

        tokio::spawn(async move {
            let mut inserts: u64 = 0;
            while let Some(entry) = rx.recv().await {
                if let Err(e) = store.append_log(&entry).await {
                    error!("failed to append request log: {e}");
                    continue;
                }
                inserts += 1;
                if inserts % TRIM_EVERY == 0 {
                    match store.trim_logs(cap).await {
                        Ok(0) => {}
                        Ok(deleted) => debug!("evicted {deleted} log rows past cap {cap}"),
                        Err(e) => error!("failed to trim request logs: {e}"),
                    }
                }
            }
        });

        Self { tx }
    }

    /// Queues one attempt record; never blocks.
    pub fn record(&self, entry: NewLogEntry) {
        let _ = self.tx.send(entry);
    }
}
