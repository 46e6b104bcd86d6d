//! Error types for the pipeline library.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised around the executor: payload decoding, queueing, configuration.
///
/// The executor itself never returns one of these; step failures travel in
/// [`StepOutcome`](crate::pipeline::StepOutcome).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown operation mode: {0}")]
    UnknownMode(String),

    #[error("queued item {0} is not a pack request")]
    WrongAction(Uuid),

    #[error("invalid pack payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to enqueue next step for {id}: {source}")]
    Enqueue {
        id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the archive store.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot find sync pack with id {0}")]
    NotFound(Uuid),

    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
