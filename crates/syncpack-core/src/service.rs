//! Collaborators that live outside the pipeline.
//!
//! The pipeline decides when a step runs; these traits do the actual work.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{DependencyFlags, ItemRef, PackRequest, StepOutcome};

/// Unit of business logic behind a service-backed catalog step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStep {
    // export
    GetAllItems,
    GetDependencies,
    ExportItems,
    ExportFiles,
    ExportSystemFiles,
    ExportMedia,
    // report
    ValidatePack,
    ReportItems,
    ReportFiles,
    GetReport,
    CleanReport,
    // import
    CreateRestorePoint,
    ImportFiles,
    ImportMedia,
    ImportItems,
    ImportFinalize,
    ImportResults,
    Clean,
}

impl fmt::Display for ServiceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Serializes, validates and imports pack content.
///
/// A returned `Err` is turned into a failed [`StepOutcome`] by the catalog step
/// that called it; it never escapes the executor.
#[async_trait]
pub trait PackService: Send + Sync {
    /// Run one page of a service-backed step.
    async fn run(&self, step: ServiceStep, id: Uuid, request: &PackRequest)
        -> Result<StepOutcome>;

    /// Build the final package for an export. `None` means there is nothing to pack.
    async fn pack_export(&self, id: Uuid, request: &PackRequest) -> Result<Option<Vec<u8>>>;

    /// Unpack a fetched package in place so later steps can read it.
    async fn unpack_export(&self, id: Uuid, archive: &Path) -> Result<()>;
}

/// Metadata the content repository knows about an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub id: String,
    pub name: String,
}

/// Resolves items and their dependency graphs.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn resolve(&self, id: &str) -> Result<Option<ItemMetadata>>;

    async fn compute_dependencies(
        &self,
        item: &ItemRef,
        flags: DependencyFlags,
    ) -> Result<Vec<ItemRef>>;
}
