//! SyncPack Core - resumable pack export, import and report pipeline
//!
//! This crate contains the engine behind sync packs:
//! - Step catalogs for the export, import and report modes
//! - A single-step executor driven by a serializable resumption token
//! - Inline and queued drivers
//! - Progress reporting over the visible steps
//! - The archive store for finished packs
//!
//! Business logic for each step is supplied by the host through
//! [`PackService`]; the pipeline only decides what runs next.

pub mod archive;
pub mod config;
pub mod error;
pub mod notify;
pub mod operations;
pub mod pipeline;
pub mod queue;
pub mod service;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveStore, PACK_EXTENSION};
pub use config::{Config, PackConfig};
pub use error::{ArchiveError, PipelineError, PipelineResult};
pub use notify::{Callbacks, MemorySink, NoOpSink, ProgressSink};
pub use operations::PackOperations;
pub use pipeline::{
    OperationMode, Pipeline, ProgressSummary, ResumptionToken, Step, StepCatalog, StepOutcome,
    StepResult,
};
pub use queue::{
    enqueue_pack, spawn_queue_worker, MemoryQueue, PackQueueProcessor, QueueProcessor,
    QueueService, QueuedItem,
};
pub use service::{ContentRepository, ItemMetadata, PackService, ServiceStep};
