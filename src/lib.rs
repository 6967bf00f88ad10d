//! Testdeck
//!
//! A test-case / test-scenario management backend:
//! - Projects with role-based memberships (owner, manager, tester, approver)
//! - Invitations with a pending/accepted/declined/expired lifecycle
//! - Test packages and scenarios, execution records and bug tracking
//! - REST API with JWT authentication, backed by SQLite

pub mod api;
pub mod auth;
pub mod db;
pub mod invitations;
pub mod members;

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub database: DatabaseYamlConfig,
    /// Auth section — if absent, auth_config will be None (deny-by-default)
    pub auth: Option<AuthConfig>,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub url: String,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:testdeck.db".into(),
        }
    }
}

/// Authentication configuration.
///
/// When the `auth` section is missing from the YAML file the API runs in
/// deny-by-default mode: every request behind the auth middleware is
/// rejected with 403.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// JWT signing secret (HS256, minimum 32 characters)
    pub jwt_secret: String,
    /// JWT token lifetime in seconds (default: 28800 = 8h)
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,
    /// Allow new user registration via POST /auth/register (default: false)
    #[serde(default)]
    pub allow_registration: bool,
}

fn default_jwt_expiry() -> u64 {
    28800 // 8 hours
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    /// Auth config — None means deny-by-default (no auth section in YAML)
    pub auth_config: Option<AuthConfig>,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mut auth_config = yaml.auth;
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            match auth_config.as_mut() {
                Some(auth) => auth.jwt_secret = secret,
                None => {
                    auth_config = Some(AuthConfig {
                        jwt_secret: secret,
                        jwt_expiry_secs: default_jwt_expiry(),
                        allow_registration: false,
                    })
                }
            }
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(yaml.database.url),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            auth_config,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Server bootstrap
// ============================================================================

/// Connect to the database, build the router and serve until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let db = db::Db::connect(&config.database_url).await?;
    tracing::info!("Connected to database at {}", config.database_url);

    let port = config.server_port;
    let state = api::handlers::ServerState::shared(db, config);
    let router = api::create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
