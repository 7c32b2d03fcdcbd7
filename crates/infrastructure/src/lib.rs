//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_resource_store;
mod in_memory_role_repository;
mod postgres_resource_store;
mod postgres_role_repository;

pub use in_memory_resource_store::InMemoryResourceStore;
pub use in_memory_role_repository::InMemoryRoleRepository;
pub use postgres_resource_store::PostgresResourceStore;
pub use postgres_role_repository::PostgresRoleRepository;

