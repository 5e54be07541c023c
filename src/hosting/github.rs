use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::pagination::last_page_from_link;
use super::{
    ApiResult, Branch, CommitStats, Exchange, FullCommit, HostingError, HostingTransport, Page,
    ShallowCommit,
};
use crate::budget::{Credential, RateLimitHeaders};
use crate::error::{Error, Result};
use crate::types::{ChangedFile, RepoRef};

const API_VERSION: &str = "2022-11-28";
/// Assumed wait when a rate-limit response carries no reset information.
const DEFAULT_RATE_LIMIT_WAIT_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct WireBranch {
    name: String,
    commit: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    sha: String,
    commit: WireCommitDetail,
    author: Option<WireAccount>,
    #[serde(default)]
    stats: Option<WireStats>,
    #[serde(default)]
    files: Option<Vec<WireFile>>,
}

#[derive(Debug, Deserialize)]
struct WireCommitDetail {
    #[serde(default)]
    message: String,
    author: Option<WireSignature>,
    committer: Option<WireSignature>,
}

#[derive(Debug, Deserialize)]
struct WireSignature {
    name: Option<String>,
    email: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireStats {
    #[serde(default)]
    additions: i64,
    #[serde(default)]
    deletions: i64,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    filename: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    additions: i64,
    #[serde(default)]
    deletions: i64,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: Option<String>,
}

impl WireCommit {
    fn into_summary(self) -> ApiResult<(ShallowCommit, Option<WireStats>, Option<Vec<WireFile>>)> {
        let signature = self.commit.author.as_ref();
        let committed_at = signature
            .and_then(|s| s.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|s| s.date))
            .ok_or_else(|| HostingError::Decode(format!("commit {} has no date", self.sha)))?;

        let summary = ShallowCommit {
            author_name: signature.and_then(|s| s.name.clone()),
            author_email: signature.and_then(|s| s.email.clone()),
            author_login: self.author.map(|a| a.login),
            message: self.commit.message,
            sha: self.sha,
            committed_at,
        };
        Ok((summary, self.stats, self.files))
    }
}

/// GitHub REST transport.
pub struct GitHubTransport {
    client: Client,
    base_url: String,
    credential: Credential,
}

/// HTTP client for the hosting API. Clone it to share its connection pool.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("cannot build http client: {e}")))
}

impl GitHubTransport {
    pub fn new(base_url: &str, credential: Credential, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, base_url, credential))
    }

    /// Transport over an existing client, so callers can reuse one pool per process.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str, credential: Credential) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn repo_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name),
            suffix
        )
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("commitsync/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION);
        match self.credential.secret() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends one request and decodes the body on success.
    async fn exchange<W: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> (ApiResult<(W, HeaderMap)>, Option<RateLimitHeaders>) {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return (Err(HostingError::Api(format!("request failed: {e}"))), None),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let rate = RateLimitHeaders::parse(&headers);

        if status.is_success() {
            let outcome = response
                .json::<W>()
                .await
                .map(|body| (body, headers))
                .map_err(|e| HostingError::Decode(format!("invalid response body: {e}")));
            return (outcome, rate);
        }

        let message = response
            .json::<WireErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| status.to_string());

        (Err(classify_failure(status, &headers, rate, message)), rate)
    }
}

fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    rate: Option<RateLimitHeaders>,
    message: String,
) -> HostingError {
    match status {
        StatusCode::UNAUTHORIZED => HostingError::Unauthorized(message),
        StatusCode::NOT_FOUND => HostingError::NotFound(message),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok());
            let exhausted = rate.is_some_and(|r| r.remaining == 0);

            if let Some(secs) = retry_after {
                HostingError::RateLimited {
                    resets_at: Utc::now() + chrono::Duration::seconds(secs.max(0)),
                    message,
                }
            } else if exhausted || status == StatusCode::TOO_MANY_REQUESTS {
                HostingError::RateLimited {
                    resets_at: rate.map_or_else(
                        || Utc::now() + chrono::Duration::seconds(DEFAULT_RATE_LIMIT_WAIT_SECS),
                        |r| r.resets_at,
                    ),
                    message,
                }
            } else {
                HostingError::Forbidden(message)
            }
        }
        _ => HostingError::Api(format!("{status}: {message}")),
    }
}

fn page_of<T>(items: Vec<T>, page: u32, headers: &HeaderMap) -> ApiResult<Page<T>> {
    let link = headers.get(LINK).and_then(|v| v.to_str().ok());
    let total_pages = last_page_from_link(link, page)?;
    Ok(Page {
        items,
        page,
        total_pages,
    })
}

impl HostingTransport for GitHubTransport {
    async fn list_branches(&self, repo: &RepoRef, page: u32, per_page: u32) -> Exchange<Page<Branch>> {
        let request = self
            .get(&self.repo_url(repo, "/branches"))
            .query(&[("page", page), ("per_page", per_page)]);

        let (outcome, rate) = self.exchange::<Vec<WireBranch>>(request).await;
        let outcome = outcome.and_then(|(branches, headers)| {
            let items = branches
                .into_iter()
                .map(|b| Branch {
                    name: b.name,
                    head_sha: b.commit.sha,
                })
                .collect();
            page_of(items, page, &headers)
        });
        Exchange::new(outcome, rate)
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Exchange<Page<ShallowCommit>> {
        let request = self.get(&self.repo_url(repo, "/commits")).query(&[
            ("sha", git_ref.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ]);

        let (outcome, rate) = self.exchange::<Vec<WireCommit>>(request).await;
        let outcome = outcome.and_then(|(commits, headers)| {
            let items = commits
                .into_iter()
                .filter_map(|c| match c.into_summary() {
                    Ok((summary, _, _)) => Some(summary),
                    Err(e) => {
                        tracing::warn!("Skipping commit listed on {} of {}: {e}", git_ref, repo);
                        None
                    }
                })
                .collect();
            page_of(items, page, &headers)
        });
        Exchange::new(outcome, rate)
    }

    async fn get_commit(&self, repo: &RepoRef, sha: &str) -> Exchange<FullCommit> {
        let url = self.repo_url(repo, &format!("/commits/{}", urlencoding::encode(sha)));
        let (outcome, rate) = self.exchange::<WireCommit>(self.get(&url)).await;

        let outcome = outcome.and_then(|(commit, _)| {
            let (summary, stats, files) = commit.into_summary()?;
            let stats = stats.map_or_else(CommitStats::default, |s| CommitStats {
                additions: s.additions,
                deletions: s.deletions,
            });
            let changed_files = files
                .unwrap_or_default()
                .into_iter()
                .map(|f| ChangedFile {
                    filename: f.filename,
                    status: f.status,
                    additions: f.additions,
                    deletions: f.deletions,
                    patch: f.patch,
                })
                .collect();
            Ok(FullCommit {
                summary,
                stats,
                changed_files,
            })
        });
        Exchange::new(outcome, rate)
    }
}
