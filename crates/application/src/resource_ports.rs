use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleguard_core::AppResult;
use roleguard_domain::{ResourceDocument, ResourceId, RoleBoundResource};

mod pipeline;
mod query_stage;

pub use pipeline::ResourcePipeline;
pub use query_stage::{QueryStage, ResourceSort, SortDirection, SortKey, StageFilter};

/// Storage port for protected resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persists a new resource. Its role record must already exist.
    async fn insert_resource(&self, document: ResourceDocument) -> AppResult<()>;

    /// Loads one resource with its role populated.
    ///
    /// Returns an invariant violation when the role reference dangles.
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<RoleBoundResource>>;

    /// Soft deletes a resource. The role record is kept.
    async fn mark_deleted(&self, resource_id: ResourceId, deleted_at: DateTime<Utc>)
    -> AppResult<()>;

    /// Hard deletes a resource document.
    async fn delete_resource(&self, resource_id: ResourceId) -> AppResult<()>;

    /// Runs a composed pipeline and returns matching resources in order.
    async fn run_pipeline(&self, pipeline: &ResourcePipeline)
    -> AppResult<Vec<RoleBoundResource>>;

    /// Counts resources matched by a pipeline, ignoring sort and paging stages.
    async fn count_pipeline(&self, pipeline: &ResourcePipeline) -> AppResult<u64>;
}
