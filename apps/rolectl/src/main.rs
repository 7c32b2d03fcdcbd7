//! Roleguard operator binary.

#![forbid(unsafe_code)]

mod command;
mod rolectl_config;

use std::sync::Arc;

use clap::Parser;
use roleguard_application::{ResourceListQuery, ResourceService, RoleAuthority};
use roleguard_core::{AppError, Principal};
use roleguard_domain::{ProtectedResource, RoleLevel};
use roleguard_infrastructure::{PostgresResourceStore, PostgresRoleRepository};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::command::Command;
use crate::rolectl_config::{RolectlConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = Command::parse();
    let config = RolectlConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    if command == Command::Migrate {
        return run_migrations(&pool).await;
    }

    let role_repository = Arc::new(PostgresRoleRepository::new(pool.clone()));
    let resource_store = Arc::new(PostgresResourceStore::new(pool));
    let authority = RoleAuthority::new(role_repository, resource_store.clone());
    let service = ResourceService::new(authority, resource_store);

    run(command, &service).await
}

async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    info!("database migrations applied");
    Ok(())
}

async fn run(command: Command, service: &ResourceService) -> Result<(), AppError> {
    let authority = service.authority();

    match command {
        Command::Migrate => Ok(()),
        Command::Create {
            creator,
            kind,
            default_level,
            data,
        } => {
            let resource = service
                .create_resource(&Principal::Authenticated(creator), kind, data, default_level)
                .await?;
            info!(resource_id = %resource.resource_id(), kind = kind.as_str(), "resource created");
            print_json(&resource)
        }
        Command::Check {
            principal,
            resource_id,
            threshold,
        } => {
            let allowed = authority
                .authorize(&principal, resource_id, threshold)
                .await?;
            println!("{}", if allowed { "allow" } else { "deny" });
            Ok(())
        }
        Command::Grant {
            requesting,
            target,
            resource_id,
            level,
        } => {
            let role = authority
                .set_user_level(
                    &Principal::Authenticated(requesting),
                    &target,
                    resource_id,
                    level,
                )
                .await?;
            print_json(&role)
        }
        Command::Revoke {
            requesting,
            target,
            resource_id,
        } => {
            let role = authority
                .remove_user_level(&Principal::Authenticated(requesting), &target, resource_id)
                .await?;
            print_json(&role)
        }
        Command::ListOwned { owner, kind, page } => {
            let mut query = ResourceListQuery::new(kind, RoleLevel::Observer);
            query.owned_by = Some(owner.clone());
            query.page = page.request()?;

            let listed = service
                .list_resources(&Principal::Authenticated(owner), query)
                .await?;
            print_json(&listed)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
