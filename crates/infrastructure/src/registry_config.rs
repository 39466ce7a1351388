//! Environment-driven configuration for building a tenant registry.

use std::env;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::time::Duration;

use tenantry_application::{RotationPolicy, TenantRegistryConfig};
use tenantry_core::{AppError, AppResult};
use tenantry_domain::CredentialPrecedence;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection settings for the PostgreSQL tenant store.
#[derive(Clone)]
pub struct PostgresStorageConfig {
    /// Connection string.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// Hex-encoded AES-256 key for credentials at rest.
    pub secret_encryption_key: String,
}

impl Debug for PostgresStorageConfig {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgresStorageConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("secret_encryption_key", &"<redacted>")
            .finish()
    }
}

/// Storage selected for tenant records.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Process-local map, lost on restart.
    Memory,
    /// PostgreSQL with embedded migrations.
    Postgres(PostgresStorageConfig),
}

impl StorageBackend {
    /// Returns the configuration name of the backend.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Full configuration of a tenant registry instance.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tenant storage backend.
    pub storage: StorageBackend,
    /// Registry service tunables.
    pub registry: TenantRegistryConfig,
}

impl RegistryConfig {
    /// Loads configuration from the process environment and an optional `.env`.
    pub fn load() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_lookup(read_var: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let lookup = |name: &str| read_var(name).filter(|value| !value.trim().is_empty());
        let defaults = TenantRegistryConfig::default();

        let storage = match lookup("TENANT_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "postgres" => {
                let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
                    .map(|value| {
                        value.parse::<u32>().ok().filter(|count| *count > 0).ok_or_else(|| {
                            AppError::Validation(format!(
                                "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{value}'"
                            ))
                        })
                    })
                    .transpose()?
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS);

                StorageBackend::Postgres(PostgresStorageConfig {
                    database_url: required(&lookup, "DATABASE_URL")?,
                    max_connections,
                    secret_encryption_key: required(&lookup, "TENANT_SECRET_ENCRYPTION_KEY")?,
                })
            }
            other => {
                return Err(AppError::Validation(format!(
                    "TENANT_STORAGE must be either 'memory' or 'postgres', got '{other}'"
                )));
            }
        };

        let rotation_policy = lookup("TENANT_ROTATION_POLICY")
            .map(|value| parse_named::<RotationPolicy>("TENANT_ROTATION_POLICY", &value))
            .transpose()?
            .unwrap_or(defaults.rotation_policy);

        let credential_precedence = lookup("TENANT_CREDENTIAL_PRECEDENCE")
            .map(|value| {
                parse_named::<CredentialPrecedence>("TENANT_CREDENTIAL_PRECEDENCE", &value)
            })
            .transpose()?
            .unwrap_or(defaults.credential_precedence);

        let storage_timeout = lookup("TENANT_STORAGE_TIMEOUT_MS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .map(Duration::from_millis)
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "TENANT_STORAGE_TIMEOUT_MS must be a positive integer, got '{value}'"
                        ))
                    })
            })
            .transpose()?
            .unwrap_or(defaults.storage_timeout);

        Ok(Self {
            storage,
            registry: TenantRegistryConfig {
                rotation_policy,
                credential_precedence,
                storage_timeout,
            },
        })
    }
}

/// Installs the global tracing subscriber. Later calls are ignored.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    lookup(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_named<T: FromStr<Err = AppError>>(name: &str, value: &str) -> AppResult<T> {
    T::from_str(value.trim())
        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
}
