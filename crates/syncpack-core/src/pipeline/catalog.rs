//! Step catalogs: the fixed, ordered step tables for each operation mode.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{OperationMode, PackRequest, StepOutcome};
use crate::archive::ArchiveStore;
use crate::error::ArchiveError;
use crate::service::{PackService, ServiceStep};

/// Name of the import step that only runs when a restore point was requested.
pub const RESTORE_POINT: &str = "RestorePoint";

/// Name, icon and optionality of a step in the standard catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub name: &'static str,
    pub icon: &'static str,
    pub optional: bool,
}

impl StepInfo {
    const fn new(name: &'static str, icon: &'static str) -> Self {
        Self {
            name,
            icon,
            optional: false,
        }
    }

    const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_visible(&self, create_restore_point: bool) -> bool {
        !self.optional || create_restore_point
    }
}

const EXPORT_LAYOUT: &[StepInfo] = &[
    StepInfo::new("Calculate", "icon-settings usync-cogs"),
    StepInfo::new("Dependencies", ""),
    StepInfo::new("Export", "icon-box"),
    StepInfo::new("Files", ""),
    StepInfo::new("System", ""),
    StepInfo::new("Media", "icon-pictures-alt-2"),
    StepInfo::new("Zip", "icon-zip"),
];

const REPORT_LAYOUT: &[StepInfo] = &[
    StepInfo::new("Fetch", "icon-box"),
    StepInfo::new("Validate", "icon-plugin"),
    StepInfo::new("Items", "icon-script-alt"),
    StepInfo::new("Files", "icon-script"),
    StepInfo::new("Check", "icon-slideshow"),
    StepInfo::new("Clean", "icon-brush-alt-2"),
];

const IMPORT_LAYOUT: &[StepInfo] = &[
    StepInfo::new("Fetch", "icon-box"),
    StepInfo::new("Validate", "icon-plugin"),
    StepInfo::new(RESTORE_POINT, "icon-pushpin").optional(),
    StepInfo::new("Files", "icon-script-alt"),
    StepInfo::new("Media", "icon-pictures-alt-2"),
    StepInfo::new("Import", "icon-box"),
    StepInfo::new("Finalize", "icon-box"),
    StepInfo::new("Report", "icon-slideshow"),
    StepInfo::new("Clean", "icon-brush-alt-2"),
];

/// Step layout of the standard catalog for `mode`, without any work attached.
pub fn standard_layout(mode: OperationMode) -> &'static [StepInfo] {
    match mode {
        OperationMode::Export => EXPORT_LAYOUT,
        OperationMode::Import => IMPORT_LAYOUT,
        OperationMode::Report => REPORT_LAYOUT,
    }
}

fn from_layout(layout: &[StepInfo], work: Vec<Arc<dyn StepWork>>) -> Vec<Step> {
    layout
        .iter()
        .zip(work)
        .map(|(info, work)| {
            let step = Step::new(info.name, work).with_icon(info.icon);
            if info.optional {
                step.optional()
            } else {
                step
            }
        })
        .collect()
}

/// One page of work for a step.
#[async_trait]
pub trait StepWork: Send + Sync {
    async fn run(&self, id: Uuid, request: &PackRequest) -> StepOutcome;
}

struct FnStep<F>(F);

#[async_trait]
impl<F> StepWork for FnStep<F>
where
    F: Fn(Uuid, &PackRequest) -> StepOutcome + Send + Sync,
{
    async fn run(&self, id: Uuid, request: &PackRequest) -> StepOutcome {
        (self.0)(id, request)
    }
}

/// Wrap a plain function as step work.
pub fn step_fn<F>(f: F) -> Arc<dyn StepWork>
where
    F: Fn(Uuid, &PackRequest) -> StepOutcome + Send + Sync + 'static,
{
    Arc::new(FnStep(f))
}

/// A named entry in a catalog.
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub icon: String,
    /// Optional steps only run when the token asks for them.
    pub optional: bool,
    work: Arc<dyn StepWork>,
}

impl Step {
    pub fn new(name: impl Into<String>, work: Arc<dyn StepWork>) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
            optional: false,
            work,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Whether this step runs (and is shown) for a token.
    pub fn is_visible(&self, create_restore_point: bool) -> bool {
        !self.optional || create_restore_point
    }

    pub async fn run(&self, id: Uuid, request: &PackRequest) -> StepOutcome {
        self.work.run(id, request).await
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("icon", &self.icon)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// Read-only step tables, one per mode.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    export: Vec<Step>,
    import: Vec<Step>,
    report: Vec<Step>,
}

impl StepCatalog {
    pub fn new(export: Vec<Step>, import: Vec<Step>, report: Vec<Step>) -> Self {
        Self {
            export,
            import,
            report,
        }
    }

    /// The standard catalogs, backed by a pack service and the archive store.
    pub fn standard(service: Arc<dyn PackService>, archive: ArchiveStore) -> Self {
        let svc = |step: ServiceStep| -> Arc<dyn StepWork> {
            Arc::new(ServiceWork {
                service: service.clone(),
                step,
            })
        };
        let zip: Arc<dyn StepWork> = Arc::new(ArchiveExport {
            service: service.clone(),
            archive: archive.clone(),
        });
        let fetch: Arc<dyn StepWork> = Arc::new(RetrieveExport {
            service: service.clone(),
            archive,
        });

        let export = from_layout(
            EXPORT_LAYOUT,
            vec![
                svc(ServiceStep::GetAllItems),
                svc(ServiceStep::GetDependencies),
                svc(ServiceStep::ExportItems),
                svc(ServiceStep::ExportFiles),
                svc(ServiceStep::ExportSystemFiles),
                svc(ServiceStep::ExportMedia),
                zip,
            ],
        );

        let report = from_layout(
            REPORT_LAYOUT,
            vec![
                fetch.clone(),
                svc(ServiceStep::ValidatePack),
                svc(ServiceStep::ReportItems),
                svc(ServiceStep::ReportFiles),
                svc(ServiceStep::GetReport),
                svc(ServiceStep::CleanReport),
            ],
        );

        let import = from_layout(
            IMPORT_LAYOUT,
            vec![
                fetch,
                svc(ServiceStep::ValidatePack),
                svc(ServiceStep::CreateRestorePoint),
                svc(ServiceStep::ImportFiles),
                svc(ServiceStep::ImportMedia),
                svc(ServiceStep::ImportItems),
                svc(ServiceStep::ImportFinalize),
                svc(ServiceStep::ImportResults),
                svc(ServiceStep::Clean),
            ],
        );

        Self::new(export, import, report)
    }

    pub fn steps(&self, mode: OperationMode) -> &[Step] {
        match mode {
            OperationMode::Export => &self.export,
            OperationMode::Import => &self.import,
            OperationMode::Report => &self.report,
        }
    }

    /// Steps shown (and run) for a token, in order.
    pub fn visible_steps(&self, mode: OperationMode, create_restore_point: bool) -> Vec<&Step> {
        self.steps(mode)
            .iter()
            .filter(|step| step.is_visible(create_restore_point))
            .collect()
    }
}

struct ServiceWork {
    service: Arc<dyn PackService>,
    step: ServiceStep,
}

#[async_trait]
impl StepWork for ServiceWork {
    async fn run(&self, id: Uuid, request: &PackRequest) -> StepOutcome {
        match self.service.run(self.step, id, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(operation_id = %id, step = %self.step, "Step failed: {:#}", e);
                StepOutcome::fail(e.to_string())
            }
        }
    }
}

/// Saves the finished export to the archive so it can be fetched later.
struct ArchiveExport {
    service: Arc<dyn PackService>,
    archive: ArchiveStore,
}

#[async_trait]
impl StepWork for ArchiveExport {
    async fn run(&self, id: Uuid, request: &PackRequest) -> StepOutcome {
        let bytes = match self.service.pack_export(id, request).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return StepOutcome::fail("Cannot pack export"),
            Err(e) => {
                tracing::warn!(operation_id = %id, "Packing export failed: {:#}", e);
                return StepOutcome::fail(format!("Cannot pack export: {}", e));
            }
        };

        match self.archive.archive(id, bytes.as_slice()) {
            Ok(_) => StepOutcome::succeed(true),
            Err(e) => {
                tracing::error!(operation_id = %id, "Archiving export failed: {}", e);
                StepOutcome::fail(e.to_string())
            }
        }
    }
}

/// Copies an archived pack into the working area and unpacks it.
struct RetrieveExport {
    service: Arc<dyn PackService>,
    archive: ArchiveStore,
}

#[async_trait]
impl StepWork for RetrieveExport {
    async fn run(&self, id: Uuid, _request: &PackRequest) -> StepOutcome {
        let path = match self.archive.retrieve(id) {
            Ok(path) => path,
            Err(e @ ArchiveError::NotFound(_)) => {
                tracing::warn!(operation_id = %id, "{}", e);
                return StepOutcome::fail(e.to_string());
            }
            Err(e) => {
                tracing::error!(operation_id = %id, "Fetching pack failed: {}", e);
                return StepOutcome::fail(e.to_string());
            }
        };

        match self.service.unpack_export(id, &path).await {
            Ok(()) => StepOutcome::succeed(true),
            Err(e) => {
                tracing::warn!(operation_id = %id, "Unpacking pack failed: {:#}", e);
                StepOutcome::fail(format!("Cannot unpack sync pack {}: {}", id, e))
            }
        }
    }
}
