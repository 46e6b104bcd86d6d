//! In-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::pipeline::{DependencyFlags, ItemRef, PackRequest, StepOutcome};
use crate::service::{ContentRepository, ItemMetadata, PackService, ServiceStep};

/// Pack service that records every call and finishes each step after a
/// configurable number of pages.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<(ServiceStep, u32)>>,
    pages: Mutex<HashMap<ServiceStep, u32>>,
    failures: Mutex<HashMap<ServiceStep, String>>,
    unpacked: Mutex<Vec<(Uuid, Vec<u8>)>>,
    calculated: Mutex<Vec<ItemRef>>,
    no_package: bool,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_package(mut self) -> Self {
        self.no_package = true;
        self
    }

    /// Make `step` take `count` pages before reporting all pages processed.
    pub fn pages(&self, step: ServiceStep, count: u32) {
        self.pages.lock().unwrap().insert(step, count);
    }

    pub fn fail_on(&self, step: ServiceStep, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(step, message.to_string());
    }

    /// Items the `GetAllItems` step returns.
    pub fn calculate_items(&self, items: Vec<ItemRef>) {
        *self.calculated.lock().unwrap() = items;
    }

    pub fn calls(&self) -> Vec<(ServiceStep, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn steps_called(&self) -> Vec<ServiceStep> {
        self.calls().into_iter().map(|(step, _)| step).collect()
    }

    pub fn unpacked(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.unpacked.lock().unwrap().clone()
    }

    pub fn package_for(id: Uuid) -> Vec<u8> {
        format!("pack:{}", id).into_bytes()
    }
}

#[async_trait]
impl PackService for RecordingService {
    async fn run(
        &self,
        step: ServiceStep,
        _id: Uuid,
        request: &PackRequest,
    ) -> Result<StepOutcome> {
        self.calls.lock().unwrap().push((step, request.page_number));

        if let Some(message) = self.failures.lock().unwrap().get(&step) {
            anyhow::bail!("{}", message);
        }

        let pages = self.pages.lock().unwrap().get(&step).copied().unwrap_or(1);
        let done = request.page_number + 1 >= pages;
        let mut outcome = StepOutcome::succeed(done);

        if step == ServiceStep::GetAllItems {
            outcome = outcome.with_items(self.calculated.lock().unwrap().clone());
        }

        Ok(outcome)
    }

    async fn pack_export(&self, id: Uuid, _request: &PackRequest) -> Result<Option<Vec<u8>>> {
        if self.no_package {
            return Ok(None);
        }
        Ok(Some(Self::package_for(id)))
    }

    async fn unpack_export(&self, id: Uuid, archive: &Path) -> Result<()> {
        let bytes = std::fs::read(archive)?;
        self.unpacked.lock().unwrap().push((id, bytes));
        Ok(())
    }
}

/// Content repository over a fixed set of items.
#[derive(Default)]
pub struct FixedRepository {
    pub items: HashMap<String, ItemMetadata>,
    pub dependencies: HashMap<String, Vec<ItemRef>>,
}

impl FixedRepository {
    pub fn with_item(mut self, id: &str, name: &str) -> Self {
        self.items.insert(
            id.to_string(),
            ItemMetadata {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_dependency(mut self, id: &str, dependency: ItemRef) -> Self {
        self.dependencies
            .entry(id.to_string())
            .or_default()
            .push(dependency);
        self
    }
}

#[async_trait]
impl ContentRepository for FixedRepository {
    async fn resolve(&self, id: &str) -> Result<Option<ItemMetadata>> {
        Ok(self.items.get(id).cloned())
    }

    async fn compute_dependencies(
        &self,
        item: &ItemRef,
        flags: DependencyFlags,
    ) -> Result<Vec<ItemRef>> {
        if !flags.contains(DependencyFlags::INCLUDE_DEPENDENCIES) {
            return Ok(Vec::new());
        }
        Ok(self.dependencies.get(&item.id).cloned().unwrap_or_default())
    }
}
