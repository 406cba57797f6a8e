// 🔑 Authentication - bearer token → principal
//
// Reads need any known principal. Writes need an elevated one, and the
// check happens before anything is touched.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::TokenConfig;
use crate::error::{BackofficeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub elevated: bool,
}

impl Principal {
    pub fn elevated(name: impl Into<String>) -> Self {
        Principal {
            name: name.into(),
            elevated: true,
        }
    }

    pub fn reader(name: impl Into<String>) -> Self {
        Principal {
            name: name.into(),
            elevated: false,
        }
    }

    pub fn require_elevated(&self, action: &str) -> Result<()> {
        if self.elevated {
            Ok(())
        } else {
            Err(BackofficeError::Permission(format!(
                "'{}' is not allowed to {}",
                self.name, action
            )))
        }
    }
}

/// Resolves the bearer token of a request, if any, to a principal
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, bearer: Option<&str>) -> Result<Principal>;
}

/// Lowercase hex SHA-256, the form tokens are stored in
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks tokens against configured digests
pub struct TokenAuthenticator {
    tokens: Vec<TokenConfig>,
}

impl TokenAuthenticator {
    pub fn new(tokens: Vec<TokenConfig>) -> Self {
        TokenAuthenticator { tokens }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, bearer: Option<&str>) -> Result<Principal> {
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackofficeError::Permission("missing bearer token".to_string()))?;

        let digest = hash_token(token);
        let entry = self
            .tokens
            .iter()
            .find(|t| t.sha256.eq_ignore_ascii_case(&digest))
            .ok_or_else(|| BackofficeError::Permission("invalid token".to_string()))?;

        debug!("authenticated '{}'", entry.name);
        Ok(Principal {
            name: entry.name.clone(),
            elevated: entry.elevated,
        })
    }
}

/// Everyone is an elevated principal. For tests and local tooling.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _bearer: Option<&str>) -> Result<Principal> {
        Ok(Principal::elevated("local"))
    }
}
