use std::fmt;

use sha2::{Digest, Sha256};

/// Hex characters of the SHA-256 digest kept in cache keys.
const HASH_LENGTH: usize = 16;
const ANONYMOUS_KEY: &str = "anonymous";

/// Hosting API credential. Only its truncated hash ever leaves this type.
#[derive(Clone)]
pub struct Credential {
    token: Option<String>,
    hash: String,
}

impl Credential {
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        let token = token.into();
        let hash = hash_token(&token);
        Self {
            token: Some(token),
            hash,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            token: None,
            hash: ANONYMOUS_KEY.to_string(),
        }
    }

    /// Builds a credential from an optional token; empty strings count as anonymous.
    #[must_use]
    pub fn from_optional(token: Option<String>) -> Self {
        match token {
            Some(t) if !t.trim().is_empty() => Self::token(t.trim()),
            _ => Self::anonymous(),
        }
    }

    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Stable identifier used to key shared cache entries.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("hash", &self.hash)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LENGTH].to_string()
}

pub(crate) fn snapshot_key(credential_hash: &str) -> String {
    format!("ratelimit:{credential_hash}")
}

pub(crate) fn membership_key(credential_hash: &str) -> String {
    format!("projects:{credential_hash}")
}

pub(crate) fn calls_key(credential_hash: &str, project_id: &str) -> String {
    format!("calls:{credential_hash}:{project_id}")
}
