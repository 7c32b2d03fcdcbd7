//! Application services and ports.

#![forbid(unsafe_code)]

mod pagination;
mod pipeline_evaluator;
mod resource_ports;
mod resource_service;
mod role_authority;
mod role_ports;

pub use pagination::{DEFAULT_PER_PAGE, MAX_PER_PAGE, Page, PageRequest, paginate};
pub use pipeline_evaluator::evaluate_pipeline;
pub use resource_ports::{
    QueryStage, ResourcePipeline, ResourceSort, ResourceStore, SortDirection, SortKey, StageFilter,
};
pub use resource_service::{ResourceListQuery, ResourceService};
pub use role_authority::{EFFECTIVE_LEVEL_ALIAS, RoleAuthority};
pub use role_ports::{GroupResolver, NoGroupResolver, RoleRepository};

#[cfg(test)]
mod test_support;
