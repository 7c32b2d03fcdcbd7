use std::sync::Arc;

use roleguard_application::{
    PageRequest, ResourceListQuery, ResourcePipeline, ResourceService, ResourceSort,
    ResourceStore, RoleAuthority, SortDirection, SortKey, StageFilter,
};
use roleguard_core::{AppError, Principal, PrincipalId};
use roleguard_domain::{ProtectedResource, ResourceDocument, ResourceId, ResourceKind, RoleId, RoleLevel};
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresResourceStore;
use crate::PostgresRoleRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres resource tests: {error}");
    }

    Some(pool)
}

fn service(pool: &PgPool) -> (Arc<PostgresResourceStore>, ResourceService) {
    let roles = Arc::new(PostgresRoleRepository::new(pool.clone()));
    let store = Arc::new(PostgresResourceStore::new(pool.clone()));
    let authority = RoleAuthority::new(roles, store.clone());

    (store.clone(), ResourceService::new(authority, store))
}

fn principal_id(value: &str) -> PrincipalId {
    PrincipalId::new(value).unwrap_or_else(|_| unreachable!())
}

fn principal(value: &str) -> Principal {
    Principal::Authenticated(principal_id(value))
}

// Scopes every listing to rows written by one test run.
fn run_marker() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::test]
async fn bulk_listing_agrees_with_single_resource_checks() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (store, service) = service(&pool);
    let authority = service.authority();
    let run = run_marker();

    let layouts = [
        (RoleLevel::NoRole, Some(("bob", RoleLevel::Observer))),
        (RoleLevel::Discover, None),
        (RoleLevel::Observer, Some(("bob", RoleLevel::NoRole))),
        (RoleLevel::NoRole, None),
        (RoleLevel::Contributor, Some(("carol", RoleLevel::Owner))),
        (RoleLevel::Owner, None),
    ];
    let mut created = Vec::new();
    for (index, (default_level, grant)) in layouts.iter().enumerate() {
        let Ok(resource) = service
            .create_resource(
                &principal("alice"),
                ResourceKind::Asset,
                json!({"run": run, "index": index}),
                *default_level,
            )
            .await
        else {
            panic!("resource creation should succeed");
        };
        if let Some((grantee, level)) = grant {
            let granted = authority
                .set_user_level(
                    &principal("alice"),
                    &principal_id(grantee),
                    resource.resource_id(),
                    *level,
                )
                .await;
            assert!(granted.is_ok());
        }
        created.push(resource.resource_id());
    }

    let callers = [
        principal("alice"),
        principal("bob"),
        principal("carol"),
        Principal::Anonymous,
    ];
    for caller in &callers {
        for threshold in RoleLevel::all() {
            let Ok(stages) = authority.build_authorization_stages(caller, *threshold).await else {
                panic!("stages should build");
            };
            let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset)
                .filter(StageFilter::data_equals("run", json!(run)))
                .with_stages(stages);

            let Ok(listed) = store.run_pipeline(&pipeline).await else {
                panic!("pipeline should run");
            };
            let mut listed: Vec<ResourceId> =
                listed.iter().map(|resource| resource.resource_id()).collect();
            listed.sort();

            let mut expected = Vec::new();
            for resource_id in &created {
                if authority
                    .authorize(caller, *resource_id, *threshold)
                    .await
                    .unwrap_or(false)
                {
                    expected.push(*resource_id);
                }
            }
            expected.sort();

            assert_eq!(listed, expected);
            assert_eq!(
                store.count_pipeline(&pipeline).await.ok(),
                Some(expected.len() as u64)
            );
        }
    }

    for resource_id in created {
        assert!(
            service
                .hard_delete_resource(&principal("alice"), resource_id)
                .await
                .is_ok()
        );
    }
}

#[tokio::test]
async fn pages_cover_the_authorized_set_in_sort_order() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (_, service) = service(&pool);
    let run = run_marker();

    let mut created = Vec::new();
    for index in 0..7 {
        let default_level = if index % 2 == 0 {
            RoleLevel::Discover
        } else {
            RoleLevel::NoRole
        };
        let Ok(resource) = service
            .create_resource(
                &principal("alice"),
                ResourceKind::Space,
                json!({"run": run, "index": index}),
                default_level,
            )
            .await
        else {
            panic!("resource creation should succeed");
        };
        created.push(resource.resource_id());
    }

    let mut indexes = Vec::new();
    for page_number in 1..=3 {
        let mut query = ResourceListQuery::new(ResourceKind::Space, RoleLevel::Discover);
        query.filters = vec![StageFilter::data_equals("run", json!(run))];
        query.sort = vec![ResourceSort::new(
            SortKey::Data("index".to_owned()),
            SortDirection::Desc,
        )];
        query.page = PageRequest::new(page_number, 3).unwrap_or_default();

        let Ok(page) = service.list_resources(&principal("bob"), query).await else {
            panic!("listing should succeed");
        };
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        indexes.extend(
            page.items
                .iter()
                .filter_map(|resource| resource.document().field("index"))
                .filter_map(serde_json::Value::as_i64),
        );
    }
    assert_eq!(indexes, vec![6, 4, 2, 0]);

    for resource_id in created {
        assert!(
            service
                .hard_delete_resource(&principal("alice"), resource_id)
                .await
                .is_ok()
        );
    }
}

#[tokio::test]
async fn soft_delete_keeps_role_and_hides_resource() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (store, service) = service(&pool);

    let Ok(resource) = service
        .create_resource(
            &principal("alice"),
            ResourceKind::UserFeedbackItem,
            json!({"body": "thanks"}),
            RoleLevel::Observer,
        )
        .await
    else {
        panic!("resource creation should succeed");
    };
    let resource_id = resource.resource_id();

    assert!(
        service
            .soft_delete_resource(&principal("alice"), resource_id)
            .await
            .is_ok()
    );
    let Ok(Some(stored)) = store.find_resource(resource_id).await else {
        panic!("soft deleted resource should remain stored");
    };
    assert!(stored.document().is_deleted());

    let fetched = service
        .get_resource(&principal("alice"), resource_id, RoleLevel::Observer)
        .await;
    assert!(matches!(fetched, Err(AppError::NotFound(_))));

    assert!(
        service
            .hard_delete_resource(&principal("alice"), resource_id)
            .await
            .is_ok()
    );
    assert_eq!(store.find_resource(resource_id).await.ok(), Some(None));
}

#[tokio::test]
async fn resource_without_role_violates_foreign_key() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresResourceStore::new(pool);
    let document = ResourceDocument::new(ResourceKind::Asset, RoleId::new(), json!({}))
        .unwrap_or_else(|_| unreachable!());

    let result = store.insert_resource(document).await;
    assert!(matches!(result, Err(AppError::InvariantViolation(_))));
}
