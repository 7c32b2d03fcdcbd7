use std::env;

use roleguard_core::AppError;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct RolectlConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl RolectlConfig {
    pub fn load() -> Result<Self, AppError> {
        let database_url = required_env("DATABASE_URL")?;
        let max_connections = parse_max_connections(env::var("ROLECTL_MAX_CONNECTIONS").ok())?;

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    let value = env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_max_connections(value: Option<String>) -> Result<u32, AppError> {
    let Some(value) = value.filter(|value| !value.trim().is_empty()) else {
        return Ok(DEFAULT_MAX_CONNECTIONS);
    };

    match value.trim().parse::<u32>() {
        Ok(0) => Err(AppError::Validation(
            "ROLECTL_MAX_CONNECTIONS must be at least 1".to_owned(),
        )),
        Ok(count) => Ok(count),
        Err(error) => Err(AppError::Validation(format!(
            "invalid ROLECTL_MAX_CONNECTIONS: {error}"
        ))),
    }
}
