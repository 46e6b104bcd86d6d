//! Queue adapter: runs one invocation per queued item and re-enqueues the
//! token until the operation completes.

mod memory;

pub use memory::{spawn_queue_worker, MemoryQueue};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::notify::{Callbacks, ProgressSink};
use crate::pipeline::{progress_event, OperationMode, Pipeline, ResumptionToken, PROGRESS_EVENT};

/// Action name that routes queued items to [`PackQueueProcessor`].
pub const ACTION: &str = "Exporter_Queued_Action";

/// Priority given to every re-enqueued invocation.
pub const PRIORITY: i32 = 1;

/// Consecutive failed invocations allowed before the queued driver stops re-queueing.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;

/// `additional_data` key holding the count of consecutive failed invocations.
pub const FAILED_ATTEMPTS_KEY: &str = "failedAttempts";

pub const COMPLETE_EVENT: &str = "complete";
pub const FAILED_EVENT: &str = "failed";

/// A unit of work held by a queue service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem {
    pub id: Uuid,
    pub reference_key: String,
    pub action: String,
    /// JSON payload, decoded by the processor registered for `action`.
    pub data: String,
    pub name: String,
    pub priority: i32,
    pub submitted: DateTime<Utc>,
    /// Earliest time the item may run.
    pub scheduled: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<String>,
    pub interactive: bool,
}

/// Returned by a queue service once an item is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItemHandle {
    pub id: Uuid,
    pub reference_key: String,
}

/// External queue that persists items and hands them to processors later.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn enqueue(&self, item: QueuedItem) -> Result<QueuedItemHandle>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProcessingResult {
    pub complete: bool,
    #[serde(default)]
    pub message: String,
}

/// Handles queued items for one action.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn action(&self) -> &str;

    async fn process(&self, item: &QueuedItem) -> Result<QueueProcessingResult>;
}

/// Payload of a queued pack invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPackRequest {
    pub mode: OperationMode,
    pub request: ResumptionToken,
}

impl ResumptionToken {
    /// Wrap the token as a queue item for `mode`.
    ///
    /// The reference key is the operation id, so a queue can tell invocations
    /// of the same operation apart from others.
    pub fn to_queued_item(
        &self,
        mode: OperationMode,
        scheduled: DateTime<Utc>,
        interactive: bool,
    ) -> PipelineResult<QueuedItem> {
        let payload = QueuedPackRequest {
            mode,
            request: self.clone(),
        };

        Ok(QueuedItem {
            id: Uuid::new_v4(),
            reference_key: self.operation_id().to_string(),
            action: ACTION.to_string(),
            data: serde_json::to_string(&payload)?,
            name: self.name.clone(),
            priority: PRIORITY,
            submitted: Utc::now(),
            scheduled,
            user: None,
            interactive,
        })
    }
}

/// Queue the token's next invocation, minting the operation id if needed.
pub async fn enqueue_pack(
    queue: &dyn QueueService,
    mode: OperationMode,
    mut token: ResumptionToken,
) -> PipelineResult<QueuedItemHandle> {
    let id = *token.id.get_or_insert_with(Uuid::new_v4);
    let item = token.to_queued_item(mode, Utc::now(), true)?;

    let handle = queue
        .enqueue(item)
        .await
        .map_err(|source| PipelineError::Enqueue { id, source })?;

    tracing::debug!(
        operation_id = %id,
        mode = %mode,
        step_index = token.step_index,
        page = token.pack.page_number,
        "Queued pack invocation"
    );
    Ok(handle)
}

/// Queued driver: one executor invocation per item.
///
/// Every unfinished token goes back on the queue. A token whose steps keep
/// failing is dropped after `max_failed_attempts` consecutive failures.
pub struct PackQueueProcessor {
    pipeline: Arc<Pipeline>,
    queue: Arc<dyn QueueService>,
    sink: Arc<dyn ProgressSink>,
    max_failed_attempts: u32,
}

impl PackQueueProcessor {
    pub fn new(
        pipeline: Arc<Pipeline>,
        queue: Arc<dyn QueueService>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            pipeline,
            queue,
            sink,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
        }
    }

    /// Re-queue failing operations until they fail `attempts` times in a row.
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts.max(1);
        self
    }
}

fn failed_attempts(token: &ResumptionToken) -> u32 {
    token
        .pack
        .additional_data
        .get(FAILED_ATTEMPTS_KEY)
        .and_then(|value| value.as_u64())
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

#[async_trait]
impl QueueProcessor for PackQueueProcessor {
    fn name(&self) -> &str {
        "Exporter Queue Processor"
    }

    fn action(&self) -> &str {
        ACTION
    }

    async fn process(&self, item: &QueuedItem) -> Result<QueueProcessingResult> {
        if item.action != ACTION {
            return Err(PipelineError::WrongAction(item.id).into());
        }

        let QueuedPackRequest { mode, request } =
            serde_json::from_str(&item.data).map_err(PipelineError::from)?;
        let mut token = request.with_callbacks(Callbacks::new(self.sink.clone()));

        let result = self.pipeline.execute_one_step(mode, &mut token).await;
        token.pack.notify(PROGRESS_EVENT, progress_event(&result));

        if result.complete {
            token.pack.notify(
                COMPLETE_EVENT,
                json!({ "operationId": result.operation_id, "mode": mode }),
            );
            return Ok(QueueProcessingResult {
                complete: true,
                message: result.outcome.message,
            });
        }

        if result.succeeded() {
            token.pack.additional_data.remove(FAILED_ATTEMPTS_KEY);
        } else {
            let attempts = failed_attempts(&token) + 1;
            token
                .pack
                .additional_data
                .insert(FAILED_ATTEMPTS_KEY.to_string(), json!(attempts));

            token.pack.notify(
                FAILED_EVENT,
                json!({
                    "operationId": result.operation_id,
                    "mode": mode,
                    "message": result.outcome.message,
                    "attempts": attempts,
                }),
            );

            if attempts >= self.max_failed_attempts {
                tracing::error!(
                    operation_id = %result.operation_id,
                    step_index = result.step_index,
                    attempts,
                    message = %result.outcome.message,
                    "Queued operation failed too many times, giving up"
                );
                return Ok(QueueProcessingResult {
                    complete: false,
                    message: result.outcome.message,
                });
            }

            tracing::warn!(
                operation_id = %result.operation_id,
                step_index = result.step_index,
                attempts,
                message = %result.outcome.message,
                "Queued step failed, re-queueing"
            );
        }

        enqueue_pack(self.queue.as_ref(), mode, token).await?;

        Ok(QueueProcessingResult {
            complete: false,
            message: result.outcome.message,
        })
    }
}
