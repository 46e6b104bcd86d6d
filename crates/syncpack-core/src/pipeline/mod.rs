//! Resumable step pipeline.
//!
//! # Architecture
//!
//! ```text
//! caller ──► ResumptionToken { id, step_index, pack { page_number, ... } }
//!                 │
//!       ┌─────────┴──────────┐
//!       ▼                    ▼
//! process_batch()      PackQueueProcessor
//! (loop until done)    (one invocation, re-enqueue)
//!       │                    │
//!       └─────────┬──────────┘
//!                 ▼
//!        execute_one_step()
//!                 │
//!     catalog[mode][step_index].run(id, pack)
//!                 │
//!                 ▼
//!   page / step advance ──► progress ──► token written back
//! ```
//!
//! Each invocation runs exactly one page of one step. A step keeps running,
//! page by page, until it reports `all_pages_processed`; only then does the
//! step index move on. Every piece of state needed to continue lives in the
//! token, so a process can stop between invocations and pick up later.

mod catalog;
mod progress;
mod types;

pub use catalog::{standard_layout, step_fn, Step, StepCatalog, StepInfo, StepWork, RESTORE_POINT};
pub use progress::{
    compute_progress, standard_progress, visible_index, ProgressSummary, StepProgress, StepStatus,
};
pub use types::{
    DependencyFlags, ItemRef, OperationMode, PackOptions, PackRequest, ResumptionToken,
    StepOutcome, StepResult, DEFAULT_PACK_NAME, NAME_KEY,
};

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::archive::ArchiveStore;
use crate::config::PackConfig;
use crate::service::PackService;

/// Live-progress event pushed after every invocation.
pub const PROGRESS_EVENT: &str = "progress";

/// Drives tokens through the step catalogs.
///
/// Holds no per-operation state: callers own the tokens, and at most one
/// invocation per operation may be in flight at a time.
pub struct Pipeline {
    config: PackConfig,
    catalog: StepCatalog,
}

impl Pipeline {
    pub fn new(config: PackConfig, catalog: StepCatalog) -> Self {
        Self { config, catalog }
    }

    /// Pipeline over the standard catalogs.
    pub fn standard(
        config: PackConfig,
        service: Arc<dyn PackService>,
        archive: ArchiveStore,
    ) -> Self {
        Self::new(config, StepCatalog::standard(service, archive))
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    /// Run one page of the token's current step and write the new position back.
    ///
    /// A token that has already run every step is left untouched and reported complete.
    pub async fn execute_one_step(
        &self,
        mode: OperationMode,
        token: &mut ResumptionToken,
    ) -> StepResult {
        let steps = self.catalog.steps(mode);
        let create_restore_point = token.create_restore_point;

        let start = first_visible(steps, token.step_index, create_restore_point);
        if start != token.step_index {
            tracing::debug!(
                from = token.step_index,
                to = start,
                "Skipping hidden steps at resume position"
            );
            token.step_index = start;
            token.pack.page_number = 0;
        }

        if token.step_index >= steps.len() {
            let progress = self.progress(mode, token.step_index, create_restore_point);
            return StepResult::completed(token.operation_id(), token.step_index, progress);
        }

        let id = *token.id.get_or_insert_with(Uuid::new_v4);

        self.config.apply(&mut token.pack);

        let name = if token.name.is_empty() {
            DEFAULT_PACK_NAME
        } else {
            token.name.as_str()
        };
        token
            .pack
            .additional_data
            .entry(NAME_KEY.to_string())
            .or_insert_with(|| Value::String(name.to_string()));

        let step = &steps[token.step_index];
        let page = token.pack.page_number;

        tracing::debug!(
            operation_id = %id,
            mode = %mode,
            step = %step.name,
            page,
            "Running step"
        );

        let mut outcome = step.run(id, &token.pack).await;

        if outcome.items.is_empty() {
            outcome.items = token.pack.items.clone();
        }

        if !outcome.success {
            tracing::warn!(
                operation_id = %id,
                step = %step.name,
                page,
                message = %outcome.message,
                "Step reported failure"
            );
        }

        let next_page = next_page(&outcome, page);
        let step_index = next_step_index(steps, token.step_index, &outcome, create_restore_point);
        let complete = step_index >= steps.len();
        let progress = self.progress(mode, step_index, create_restore_point);

        token.step_index = step_index;
        token.pack.page_number = next_page;
        token.pack.handler_folder = outcome.next_folder.clone();
        token.pack.items = outcome.items.clone();
        token
            .pack
            .additional_data
            .extend(outcome.additional_data.iter().map(|(k, v)| (k.clone(), v.clone())));

        if complete {
            tracing::info!(operation_id = %id, mode = %mode, "Operation complete");
        }

        StepResult {
            operation_id: id,
            step_index,
            next_page,
            next_folder: outcome.next_folder.clone(),
            complete,
            progress,
            outcome,
        }
    }

    /// Run a token to completion in one call.
    ///
    /// Stops early, returning the failing result, when a step reports failure.
    /// Blocks the caller for the whole operation.
    pub async fn process_batch(
        &self,
        mode: OperationMode,
        token: &mut ResumptionToken,
    ) -> StepResult {
        loop {
            let result = self.execute_one_step(mode, token).await;
            token.pack.notify(PROGRESS_EVENT, progress_event(&result));

            if result.complete {
                return result;
            }
            if !result.succeeded() {
                tracing::warn!(
                    operation_id = %result.operation_id,
                    step_index = result.step_index,
                    "Stopping inline run after failed step"
                );
                return result;
            }
        }
    }

    fn progress(
        &self,
        mode: OperationMode,
        step_index: usize,
        create_restore_point: bool,
    ) -> ProgressSummary {
        let visible = self.catalog.visible_steps(mode, create_restore_point);
        let current = visible_index(self.catalog.steps(mode), step_index, create_restore_point);
        compute_progress(&visible, current)
    }
}

/// Page to run next: back to zero once a step is done or asks for a reset.
fn next_page(outcome: &StepOutcome, current_page: u32) -> u32 {
    if outcome.all_pages_processed || outcome.reset_paging {
        0
    } else {
        current_page.saturating_add(1)
    }
}

/// Step to run next. Only moves when every page is done, skipping hidden optional steps.
fn next_step_index(
    steps: &[Step],
    current: usize,
    outcome: &StepOutcome,
    create_restore_point: bool,
) -> usize {
    if !outcome.all_pages_processed {
        return current;
    }

    first_visible(steps, current + 1, create_restore_point)
}

/// First index at or after `from` whose step runs for this token.
fn first_visible(steps: &[Step], from: usize, create_restore_point: bool) -> usize {
    let mut index = from;
    while index < steps.len() && !steps[index].is_visible(create_restore_point) {
        index += 1;
    }
    index
}

/// Payload of a live-progress event.
pub fn progress_event(result: &StepResult) -> Value {
    json!({
        "operationId": result.operation_id,
        "stepIndex": result.step_index,
        "complete": result.complete,
        "success": result.outcome.success,
        "message": result.outcome.message,
        "percent": result.progress.percent,
        "step": result.progress.current_step(),
    })
}
