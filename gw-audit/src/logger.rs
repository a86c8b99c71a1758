//! Non-blocking append path: `emit` only ever touches a bounded channel
//! (spec §4.10, §5 backpressure rules).

use crate::event::AuditEvent;
use crate::writer::AuditWriter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_CHANNEL_CAPACITY: usize = 4096;
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Handle held by request-path code. Cloning is cheap; cloning the
/// underlying sender and drop counter.
#[derive(Clone)]
pub struct AuditLogger {
    sender: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Spawns the background drain worker and returns the handle callers
    /// use to emit events. `capacity` bounds the channel; exceeding it
    /// drops the event and increments the drop counter rather than
    /// blocking the request path (spec: "availability over completeness").
    pub fn spawn(writer: Arc<dyn AuditWriter>, capacity: Option<usize>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY));
        let dropped = Arc::new(AtomicU64::new(0));
        tokio::spawn(drain_loop(receiver, writer));
        Self { sender, dropped }
    }

    /// Enqueues `event`. Never blocks: a full channel drops the event.
    pub fn emit(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(total_dropped = total, "audit channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("audit drain worker gone, event dropped");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn drain_loop(mut receiver: mpsc::Receiver<AuditEvent>, writer: Arc<dyn AuditWriter>) {
    let mut batch = Vec::with_capacity(DEFAULT_BATCH_SIZE);
    let mut ticker = tokio::time::interval(DEFAULT_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= DEFAULT_BATCH_SIZE {
                            flush(&writer, &mut batch).await;
                        }
                    }
                    None => {
                        flush(&writer, &mut batch).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&writer, &mut batch).await;
            }
        }
    }
}

async fn flush(writer: &Arc<dyn AuditWriter>, batch: &mut Vec<AuditEvent>) {
    if batch.is_empty() {
        return;
    }

    let mut backoff = Duration::from_millis(200);
    loop {
        match writer.write_batch(batch).await {
            Ok(()) => {
                batch.clear();
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, batch_len = batch.len(), "audit batch write failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
            }
        }
    }
}
