//! Channel-backed queue for hosts without an external queue service.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{QueueProcessor, QueueService, QueuedItem, QueuedItemHandle};

/// Queue service over an unbounded channel.
#[derive(Clone)]
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<QueuedItem>,
}

impl MemoryQueue {
    /// Returns the queue and the receiver a worker drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueuedItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl QueueService for MemoryQueue {
    async fn enqueue(&self, item: QueuedItem) -> Result<QueuedItemHandle> {
        let handle = QueuedItemHandle {
            id: item.id,
            reference_key: item.reference_key.clone(),
        };
        self.tx
            .send(item)
            .map_err(|_| anyhow::anyhow!("queue worker has stopped"))?;
        Ok(handle)
    }
}

/// Spawns the queue worker.
///
/// Items run strictly one at a time, no earlier than their scheduled time,
/// routed to the processor whose action matches. The worker stops when
/// `cancel` fires or every queue handle is dropped.
pub fn spawn_queue_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedItem>,
    processors: Vec<Arc<dyn QueueProcessor>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(processors = processors.len(), "Queue worker started");

        loop {
            let item = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("Queue worker cancelled");
                    break;
                }

                item = rx.recv() => match item {
                    Some(item) => item,
                    None => {
                        tracing::debug!("Queue worker shutting down - channel closed");
                        break;
                    }
                },
            };

            let delay = (item.scheduled - Utc::now()).to_std().unwrap_or_default();
            if !delay.is_zero() {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        tracing::debug!("Queue worker cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let Some(processor) = processors.iter().find(|p| p.action() == item.action) else {
                tracing::warn!(
                    item_id = %item.id,
                    action = %item.action,
                    "No processor for queued item, dropping"
                );
                continue;
            };

            match processor.process(&item).await {
                Ok(result) => {
                    tracing::debug!(
                        item_id = %item.id,
                        reference_key = %item.reference_key,
                        processor = processor.name(),
                        complete = result.complete,
                        "Processed queued item"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        item_id = %item.id,
                        processor = processor.name(),
                        error = %e,
                        "Queued item failed"
                    );
                }
            }
        }

        tracing::debug!("Queue worker stopped");
    })
}
