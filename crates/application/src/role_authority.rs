use std::sync::Arc;

use roleguard_core::{AppResult, Principal};

use crate::{GroupResolver, NoGroupResolver, ResourceStore, RoleRepository};

mod decisions;
mod mutations;
mod stages;


pub use stages::EFFECTIVE_LEVEL_ALIAS;

/// Application service owning every resource role decision.
///
/// Stateless per call: all state lives in the role repository and the
/// resource store, so one instance can be shared across request handlers.
#[derive(Clone)]
pub struct RoleAuthority {
    role_repository: Arc<dyn RoleRepository>,
    resource_store: Arc<dyn ResourceStore>,
    group_resolver: Arc<dyn GroupResolver>,
}

impl RoleAuthority {
    /// Creates an authority without group membership resolution.
    #[must_use]
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        resource_store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            role_repository,
            resource_store,
            group_resolver: Arc::new(NoGroupResolver),
        }
    }

    /// Replaces the group resolver consulted by capability decisions.
    #[must_use]
    pub fn with_group_resolver(mut self, group_resolver: Arc<dyn GroupResolver>) -> Self {
        self.group_resolver = group_resolver;
        self
    }

    async fn resolve_groups(&self, principal: &Principal) -> AppResult<Vec<String>> {
        match principal.id() {
            Some(principal_id) => self.group_resolver.groups_for(principal_id).await,
            None => Ok(Vec::new()),
        }
    }
}
