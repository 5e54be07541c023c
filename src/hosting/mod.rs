//! Boundary to the hosting API.
//!
//! [`HostingTransport`] performs exactly one HTTP exchange per call and hands
//! back the outcome together with whatever quota headers came with it.
//! [`ApiClient`] wraps a transport, records every exchange into the rate
//! budget tracker and applies the single bounded retry on rate limiting.

mod client;
mod github;
mod pagination;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::ApiClient;
pub use github::{GitHubTransport, http_client};
pub use pagination::{PageLink, last_page_from_link};

use crate::budget::RateLimitHeaders;
use crate::error::Error;
use crate::types::{ChangedFile, RepoRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited until {resets_at}: {message}")]
    RateLimited {
        resets_at: DateTime<Utc>,
        message: String,
    },

    #[error("api error: {0}")]
    Api(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl HostingError {
    /// Credential problems end the run instead of being skipped.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Forbidden(_))
    }
}

impl From<HostingError> for Error {
    fn from(err: HostingError) -> Self {
        match err {
            HostingError::NotFound(m) => Error::NotFound(m),
            HostingError::Unauthorized(m) => Error::Unauthorized(m),
            HostingError::Forbidden(m) => Error::Forbidden(m),
            HostingError::RateLimited { resets_at, .. } => Error::RateLimited { resets_at },
            HostingError::Api(m) => Error::Api(m),
            HostingError::Decode(m) => Error::Decode(m),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, HostingError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub head_sha: String,
}

/// Commit summary as returned by list endpoints, without diff statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShallowCommit {
    pub sha: String,
    pub message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// Hosting account linked to the commit author, when the platform knows one.
    pub author_login: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl ShallowCommit {
    /// Identifier stored verbatim on the commit: email, then login, then name.
    #[must_use]
    pub fn raw_author_identifier(&self) -> String {
        [&self.author_email, &self.author_login, &self.author_name]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullCommit {
    pub summary: ShallowCommit,
    pub stats: CommitStats,
    pub changed_files: Vec<ChangedFile>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    /// Last page number according to the pagination metadata.
    pub total_pages: u32,
}

/// Result of a single upstream exchange plus its quota headers, if any.
#[derive(Debug)]
pub struct Exchange<T> {
    pub outcome: ApiResult<T>,
    pub rate: Option<RateLimitHeaders>,
}

impl<T> Exchange<T> {
    #[must_use]
    pub fn new(outcome: ApiResult<T>, rate: Option<RateLimitHeaders>) -> Self {
        Self { outcome, rate }
    }
}

/// The three upstream operations this crate relies on.
pub trait HostingTransport: Send + Sync {
    fn list_branches(
        &self,
        repo: &RepoRef,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Exchange<Page<Branch>>> + Send;

    /// Commits reachable from `git_ref`, newest first.
    fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Exchange<Page<ShallowCommit>>> + Send;

    fn get_commit(
        &self,
        repo: &RepoRef,
        sha: &str,
    ) -> impl Future<Output = Exchange<FullCommit>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(email: Option<&str>, login: Option<&str>, name: Option<&str>) -> ShallowCommit {
        ShallowCommit {
            sha: "abc".to_string(),
            message: "msg".to_string(),
            author_name: name.map(str::to_string),
            author_email: email.map(str::to_string),
            author_login: login.map(str::to_string),
            committed_at: Utc::now(),
        }
    }

    #[test]
    fn test_raw_author_identifier_precedence() {
        assert_eq!(
            summary(Some("a@x.io"), Some("octo"), Some("A")).raw_author_identifier(),
            "a@x.io"
        );
        assert_eq!(
            summary(Some(""), Some("octo"), Some("A")).raw_author_identifier(),
            "octo"
        );
        assert_eq!(summary(None, None, Some("A")).raw_author_identifier(), "A");
        assert_eq!(summary(None, None, None).raw_author_identifier(), "unknown");
    }

    #[test]
    fn test_error_conversion_keeps_kind() {
        let resets_at = Utc::now();
        let err: Error = HostingError::RateLimited {
            resets_at,
            message: "slow down".into(),
        }
        .into();
        assert!(matches!(err, Error::RateLimited { resets_at: r } if r == resets_at));
        assert!(HostingError::Forbidden("x".into()).is_auth());
        assert!(!HostingError::NotFound("x".into()).is_auth());
    }
}
