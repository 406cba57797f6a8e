// ⚙️ Configuration - explicit settings handed to the binaries at startup
//
// Order of precedence: defaults < TOML file < environment.
//
//   BACKOFFICE_DB           database path
//   BACKOFFICE_LISTEN       listen address
//   BACKOFFICE_ADMIN_TOKEN  plain token, registered as elevated "admin"

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::hash_token;

pub const ENV_DB: &str = "BACKOFFICE_DB";
pub const ENV_LISTEN: &str = "BACKOFFICE_LISTEN";
pub const ENV_ADMIN_TOKEN: &str = "BACKOFFICE_ADMIN_TOKEN";

/// A bearer token the server accepts. Only its SHA-256 digest is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    /// Lowercase hex SHA-256 of the token
    pub sha256: String,
    /// May create, update and delete
    #[serde(default)]
    pub elevated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub listen_addr: String,
    /// CORS allow-list
    pub allow_origins: Vec<String>,
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub log_filter: String,
    pub tokens: Vec<TokenConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("backoffice.db"),
            listen_addr: "0.0.0.0:3000".to_string(),
            allow_origins: vec!["http://localhost:3000".to_string()],
            log_filter: "info".to_string(),
            tokens: Vec::new(),
        }
    }
}

impl Config {
    /// Read the optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(db) = lookup(ENV_DB) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(listen) = lookup(ENV_LISTEN) {
            self.listen_addr = listen;
        }
        if let Some(token) = lookup(ENV_ADMIN_TOKEN).filter(|t| !t.is_empty()) {
            self.tokens.retain(|t| t.name != "admin");
            self.tokens.push(TokenConfig {
                name: "admin".to_string(),
                sha256: hash_token(&token),
                elevated: true,
            });
        }
        self
    }
}
