//! Pipeline types: the resumption token, step outcomes and results.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::progress::ProgressSummary;
use crate::error::PipelineError;
use crate::notify::Callbacks;

/// Key under which the operation's display name is stamped into `additional_data`.
pub const NAME_KEY: &str = "name";

/// Name used when a token carries no display name.
pub const DEFAULT_PACK_NAME: &str = "sync-pack.file";

/// Which step catalog an operation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    Export,
    Import,
    Report,
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Export => write!(f, "export"),
            OperationMode::Import => write!(f, "import"),
            OperationMode::Report => write!(f, "report"),
        }
    }
}

impl FromStr for OperationMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "export" => Ok(OperationMode::Export),
            "import" => Ok(OperationMode::Import),
            "report" => Ok(OperationMode::Report),
            _ => Err(PipelineError::UnknownMode(s.to_string())),
        }
    }
}

/// Inclusion options applied when an item's dependency graph is calculated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyFlags(u32);

impl DependencyFlags {
    pub const NONE: Self = Self(0);
    pub const INCLUDE_CHILDREN: Self = Self(1 << 0);
    pub const INCLUDE_DEPENDENCIES: Self = Self(1 << 1);
    pub const INCLUDE_MEDIA: Self = Self(1 << 2);
    pub const INCLUDE_FILES: Self = Self(1 << 3);
    pub const INCLUDE_ANCESTORS: Self = Self(1 << 4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DependencyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DependencyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A reference to one item in the content graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub id: String,
    #[serde(default)]
    pub flags: DependencyFlags,
    #[serde(default)]
    pub name: String,
}

impl ItemRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, flags: DependencyFlags) -> Self {
        Self {
            id: id.into(),
            flags,
            name: name.into(),
        }
    }
}

/// Folder, exclusion and replacement lists handed to the steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackOptions {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub system_exclusions: Vec<String>,
    #[serde(default)]
    pub file_replacements: Vec<String>,
}

/// What to operate on, and how far the current step has got.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackRequest {
    #[serde(default)]
    pub items: Vec<ItemRef>,
    #[serde(default)]
    pub handler_set: String,
    /// Pagination cursor within the current step.
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub page_size: u32,
    /// Working-folder cursor carried between steps and pages.
    #[serde(default)]
    pub handler_folder: String,
    #[serde(default)]
    pub options: PackOptions,
    /// Side-channel bag shared between steps. Not interpreted by the executor.
    #[serde(default)]
    pub additional_data: HashMap<String, Value>,
    /// Live-progress sink. Reattached by the host on every invocation.
    #[serde(skip)]
    pub callbacks: Option<Callbacks>,
}

impl PackRequest {
    pub fn with_items(items: Vec<ItemRef>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Push a live-progress event if a sink is attached.
    pub fn notify(&self, event: &str, payload: Value) {
        if let Some(callbacks) = &self.callbacks {
            callbacks.push(event, payload);
        }
    }
}

/// The serializable state needed to continue an operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumptionToken {
    /// Minted on the first invocation, stable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    /// Index into the mode's catalog of the next step to run.
    #[serde(default)]
    pub step_index: usize,
    #[serde(default)]
    pub create_restore_point: bool,
    #[serde(default)]
    pub pack: PackRequest,
}

impl ResumptionToken {
    /// Token for a brand new operation over the given items.
    pub fn new(name: impl Into<String>, items: Vec<ItemRef>) -> Self {
        Self {
            name: name.into(),
            pack: PackRequest::with_items(items),
            ..Default::default()
        }
    }

    /// Token that acts on an already archived pack (import or report).
    pub fn for_pack(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_restore_point(mut self, create_restore_point: bool) -> Self {
        self.create_restore_point = create_restore_point;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.pack.callbacks = Some(callbacks);
        self
    }

    /// The operation id, or the nil id before the first invocation.
    pub fn operation_id(&self) -> Uuid {
        self.id.unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a token persisted as JSON.
    pub fn read_from(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// What a single step invocation reports back.
///
/// An empty `items` list means "unchanged": the executor keeps the caller's items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub items: Vec<ItemRef>,
    pub all_pages_processed: bool,
    #[serde(default)]
    pub reset_paging: bool,
    #[serde(default)]
    pub next_folder: String,
    #[serde(default)]
    pub additional_data: HashMap<String, Value>,
}

impl StepOutcome {
    /// A successful invocation. `all_pages_processed` decides whether the step is done.
    pub fn succeed(all_pages_processed: bool) -> Self {
        Self {
            success: true,
            all_pages_processed,
            ..Default::default()
        }
    }

    /// A failed invocation. Paging resets so a retry re-runs the step from its first page.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            reset_paging: true,
            ..Default::default()
        }
    }

    /// One page of a paginated step; `done` on the last page.
    pub fn page(done: bool) -> Self {
        Self::succeed(done)
    }

    pub fn with_items(mut self, items: Vec<ItemRef>) -> Self {
        self.items = items;
        self
    }

    pub fn with_next_folder(mut self, folder: impl Into<String>) -> Self {
        self.next_folder = folder.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_data.insert(key.into(), value);
        self
    }

    pub fn with_reset_paging(mut self) -> Self {
        self.reset_paging = true;
        self
    }
}

/// Result of one executor invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub operation_id: Uuid,
    /// Index of the step the next invocation will run.
    pub step_index: usize,
    pub next_page: u32,
    pub next_folder: String,
    pub complete: bool,
    pub progress: ProgressSummary,
    pub outcome: StepOutcome,
}

impl StepResult {
    /// Result for a token that has already run every step.
    pub(crate) fn completed(
        operation_id: Uuid,
        step_index: usize,
        progress: ProgressSummary,
    ) -> Self {
        Self {
            operation_id,
            step_index,
            complete: true,
            progress,
            outcome: StepOutcome::succeed(true),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Export".parse::<OperationMode>().unwrap(), OperationMode::Export);
        assert_eq!("import".parse::<OperationMode>().unwrap(), OperationMode::Import);
        assert_eq!(OperationMode::Report.to_string(), "report");
        assert!("restore".parse::<OperationMode>().is_err());
    }

    #[test]
    fn test_dependency_flags() {
        let flags = DependencyFlags::INCLUDE_CHILDREN | DependencyFlags::INCLUDE_MEDIA;
        assert!(flags.contains(DependencyFlags::INCLUDE_CHILDREN));
        assert!(flags.contains(DependencyFlags::INCLUDE_MEDIA));
        assert!(!flags.contains(DependencyFlags::INCLUDE_DEPENDENCIES));
        assert!(DependencyFlags::NONE.is_empty());
        assert_eq!(serde_json::to_string(&flags).unwrap(), "5");
    }

    #[test]
    fn test_token_json_keeps_id_and_drops_callbacks() {
        let id = Uuid::new_v4();
        let mut token = ResumptionToken::new(
            "Home",
            vec![ItemRef::new("doc-1", "Home", DependencyFlags::INCLUDE_CHILDREN)],
        )
        .with_callbacks(Callbacks::new(std::sync::Arc::new(crate::notify::NoOpSink)));
        token.id = Some(id);
        token.step_index = 3;
        token.pack.page_number = 2;
        token
            .pack
            .additional_data
            .insert("count".to_string(), serde_json::json!(12));

        let json = token.to_json().unwrap();
        assert!(json.contains("\"stepIndex\":3"));
        assert!(!json.contains("callbacks"));

        let restored = ResumptionToken::from_json(&json).unwrap();
        assert_eq!(restored.id, Some(id));
        assert_eq!(restored.step_index, 3);
        assert_eq!(restored.pack.page_number, 2);
        assert_eq!(restored.pack.items, token.pack.items);
        assert_eq!(restored.pack.additional_data["count"], serde_json::json!(12));
        assert!(restored.pack.callbacks.is_none());
    }

    #[test]
    fn test_fail_outcome_resets_paging() {
        let outcome = StepOutcome::fail("missing");
        assert!(!outcome.success);
        assert!(outcome.reset_paging);
        assert!(!outcome.all_pages_processed);
        assert_eq!(outcome.message, "missing");
    }
}
