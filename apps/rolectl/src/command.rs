use clap::{Args, Parser};
use roleguard_application::{DEFAULT_PER_PAGE, PageRequest};
use roleguard_core::{AppError, AppResult, Principal, PrincipalId};
use roleguard_domain::{ResourceId, ResourceKind, RoleLevel};
use serde_json::Value;

/// Parsed operator command.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "rolectl")]
#[command(about = "Operator tooling for resource-scoped roles", long_about = None)]
pub enum Command {
    /// Apply pending database migrations
    Migrate,

    /// Create a resource owned by the creator
    Create {
        #[arg(value_parser = parse_principal_id)]
        creator: PrincipalId,

        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,

        #[arg(value_parser = parse_level)]
        default_level: RoleLevel,

        /// Resource data as a JSON document
        #[arg(value_parser = parse_data, default_value = "{}")]
        data: Value,
    },

    /// Check whether a caller reaches a level on a resource
    Check {
        /// Caller id, or `-` for an anonymous caller
        #[arg(value_parser = parse_principal)]
        principal: Principal,

        #[arg(value_parser = parse_resource_id)]
        resource_id: ResourceId,

        #[arg(value_parser = parse_level)]
        threshold: RoleLevel,
    },

    /// Grant a user level on a resource
    Grant {
        #[arg(value_parser = parse_principal_id)]
        requesting: PrincipalId,

        #[arg(value_parser = parse_principal_id)]
        target: PrincipalId,

        #[arg(value_parser = parse_resource_id)]
        resource_id: ResourceId,

        #[arg(value_parser = parse_level)]
        level: RoleLevel,
    },

    /// Remove a user level from a resource
    Revoke {
        #[arg(value_parser = parse_principal_id)]
        requesting: PrincipalId,

        #[arg(value_parser = parse_principal_id)]
        target: PrincipalId,

        #[arg(value_parser = parse_resource_id)]
        resource_id: ResourceId,
    },

    /// List resources of one kind owned by a principal
    ListOwned {
        #[arg(value_parser = parse_principal_id)]
        owner: PrincipalId,

        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,

        #[command(flatten)]
        page: PageArgs,
    },
}

/// Paging flags shared by listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Args)]
pub struct PageArgs {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Page size, between 1 and 100
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: usize,
}

impl PageArgs {
    pub fn request(&self) -> AppResult<PageRequest> {
        PageRequest::new(self.page, self.per_page)
    }
}

// `-` stands for an anonymous caller.
fn parse_principal(value: &str) -> Result<Principal, AppError> {
    if value == "-" {
        return Ok(Principal::Anonymous);
    }

    Principal::authenticated(value)
}

fn parse_principal_id(value: &str) -> Result<PrincipalId, AppError> {
    PrincipalId::new(value)
}

fn parse_resource_id(value: &str) -> Result<ResourceId, AppError> {
    ResourceId::parse(value)
}

fn parse_kind(value: &str) -> Result<ResourceKind, AppError> {
    value.parse()
}

fn parse_level(value: &str) -> Result<RoleLevel, AppError> {
    RoleLevel::from_transport(value)
}

fn parse_data(value: &str) -> Result<Value, AppError> {
    serde_json::from_str(value)
        .map_err(|error| AppError::Validation(format!("invalid resource data: {error}")))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use roleguard_core::Principal;
    use roleguard_domain::{ResourceId, ResourceKind, RoleLevel};
    use serde_json::json;

    use super::Command;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Command::try_parse_from(std::iter::once("rolectl").chain(args.iter().copied()))
    }

    #[test]
    fn parses_check_for_anonymous_caller() {
        let resource_id = ResourceId::new();
        let command = parse(&["check", "-", &resource_id.to_string(), "discover"]);

        assert_eq!(
            command.ok(),
            Some(Command::Check {
                principal: Principal::Anonymous,
                resource_id,
                threshold: RoleLevel::Discover,
            })
        );
    }

    #[test]
    fn parses_create_with_payload() {
        let Ok(Command::Create {
            kind,
            default_level,
            data,
            ..
        }) = parse(&["create", "alice", "space", "manager", r#"{"name":"lab"}"#])
        else {
            panic!("create should parse");
        };

        assert_eq!(kind, ResourceKind::Space);
        assert_eq!(default_level, RoleLevel::Manager);
        assert_eq!(data, json!({"name": "lab"}));
    }

    #[test]
    fn create_defaults_to_empty_document() {
        let Ok(Command::Create { data, .. }) = parse(&["create", "alice", "asset", "no_role"]) else {
            panic!("create should parse");
        };

        assert_eq!(data, json!({}));
        assert!(parse(&["create", "alice", "asset", "no_role", "{broken"]).is_err());
    }

    #[test]
    fn list_owned_applies_page_bounds() {
        let Ok(Command::ListOwned { page, .. }) = parse(&[
            "list-owned",
            "alice",
            "asset",
            "--page",
            "2",
            "--per-page",
            "50",
        ]) else {
            panic!("list-owned should parse");
        };
        let Ok(request) = page.request() else {
            panic!("2/50 is within bounds");
        };
        assert_eq!((request.page(), request.per_page()), (2, 50));

        let Ok(Command::ListOwned { page, .. }) = parse(&["list-owned", "alice", "asset"]) else {
            panic!("list-owned should parse without paging flags");
        };
        assert_eq!(page.request().ok(), Some(Default::default()));

        let Ok(Command::ListOwned { page, .. }) =
            parse(&["list-owned", "alice", "asset", "--per-page", "500"])
        else {
            panic!("per-page is only range-checked when building the request");
        };
        assert!(page.request().is_err());
    }

    #[test]
    fn rejects_unknown_levels_and_commands() {
        let resource_id = ResourceId::new().to_string();

        assert!(parse(&["grant", "alice", "bob", &resource_id, "admin"]).is_err());
        assert!(parse(&["grant", "alice", "bob", "not-a-uuid", "owner"]).is_err());
        assert!(parse(&["list-owned", "alice", "folder"]).is_err());
        assert!(parse(&["promote", "alice"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
