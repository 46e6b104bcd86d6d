//! High-level pack operations for hosts: start exports and imports, list packs.

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::archive::ArchiveStore;
use crate::notify::{Callbacks, NoOpSink, ProgressSink};
use crate::pipeline::{
    DependencyFlags, ItemRef, OperationMode, Pipeline, ResumptionToken, StepResult,
};
use crate::queue::{enqueue_pack, QueueService};
use crate::service::ContentRepository;

/// Entry points a host exposes to its users.
pub struct PackOperations {
    pipeline: Arc<Pipeline>,
    repository: Arc<dyn ContentRepository>,
    queue: Arc<dyn QueueService>,
    archive: ArchiveStore,
    sink: Arc<dyn ProgressSink>,
}

impl PackOperations {
    pub fn new(
        pipeline: Arc<Pipeline>,
        repository: Arc<dyn ContentRepository>,
        queue: Arc<dyn QueueService>,
        archive: ArchiveStore,
    ) -> Self {
        Self {
            pipeline,
            repository,
            queue,
            archive,
            sink: Arc::new(NoOpSink),
        }
    }

    /// Send live progress of inline runs to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Queue an export of one content item.
    ///
    /// Returns the operation id, or `None` when the item does not exist. The
    /// export runs later, one step per queued invocation.
    pub async fn create_content_export(
        &self,
        content_id: &str,
        include_children: bool,
        include_dependencies: bool,
    ) -> Result<Option<Uuid>> {
        let mut flags = DependencyFlags::NONE;
        if include_children {
            flags |= DependencyFlags::INCLUDE_CHILDREN;
        }
        if include_dependencies {
            flags |= DependencyFlags::INCLUDE_DEPENDENCIES;
        }

        let Some(mut token) = self.export_token(content_id, flags).await? else {
            return Ok(None);
        };
        let id = *token.id.get_or_insert_with(Uuid::new_v4);

        enqueue_pack(self.queue.as_ref(), OperationMode::Export, token).await?;
        tracing::info!(operation_id = %id, content_id, "Queued content export");

        Ok(Some(id))
    }

    /// Export one content item and its children within this call.
    ///
    /// Long exports hold the caller for their whole duration.
    pub async fn create_export(&self, content_id: &str) -> Result<Option<StepResult>> {
        let Some(token) = self
            .export_token(content_id, DependencyFlags::INCLUDE_CHILDREN)
            .await?
        else {
            return Ok(None);
        };

        let mut token = token.with_callbacks(Callbacks::new(self.sink.clone()));
        let result = self
            .pipeline
            .process_batch(OperationMode::Export, &mut token)
            .await;

        tracing::info!(
            operation_id = %result.operation_id,
            complete = result.complete,
            "Inline export finished"
        );
        Ok(Some(result))
    }

    /// Import an archived pack within this call.
    pub async fn import(&self, id: Uuid, create_restore_point: bool) -> StepResult {
        let mut token = ResumptionToken::for_pack(id)
            .with_restore_point(create_restore_point)
            .with_callbacks(Callbacks::new(self.sink.clone()));

        let result = self
            .pipeline
            .process_batch(OperationMode::Import, &mut token)
            .await;

        tracing::info!(
            operation_id = %id,
            complete = result.complete,
            "Inline import finished"
        );
        result
    }

    /// Ids of every archived pack.
    pub fn list_packs(&self) -> Vec<String> {
        self.archive.list().collect()
    }

    /// Items an export of `content_id` would start from: the item itself
    /// followed by its dependencies under `flags`.
    pub async fn preview_export(
        &self,
        content_id: &str,
        flags: DependencyFlags,
    ) -> Result<Vec<ItemRef>> {
        let Some(root) = self.root_item(content_id, flags).await? else {
            return Ok(Vec::new());
        };

        let dependencies = self
            .repository
            .compute_dependencies(&root, flags)
            .await
            .with_context(|| format!("Failed to compute dependencies of {}", content_id))?;

        let mut items = vec![root];
        for dependency in dependencies {
            if !items.iter().any(|item| item.id == dependency.id) {
                items.push(dependency);
            }
        }
        Ok(items)
    }

    async fn root_item(
        &self,
        content_id: &str,
        flags: DependencyFlags,
    ) -> Result<Option<ItemRef>> {
        let item = self
            .repository
            .resolve(content_id)
            .await
            .with_context(|| format!("Failed to resolve content {}", content_id))?;

        match item {
            Some(meta) => Ok(Some(ItemRef::new(meta.id, meta.name, flags))),
            None => {
                tracing::warn!(content_id, "Content item not found");
                Ok(None)
            }
        }
    }

    async fn export_token(
        &self,
        content_id: &str,
        flags: DependencyFlags,
    ) -> Result<Option<ResumptionToken>> {
        let Some(root) = self.root_item(content_id, flags).await? else {
            return Ok(None);
        };

        Ok(Some(ResumptionToken::new(root.name.clone(), vec![root])))
    }
}
