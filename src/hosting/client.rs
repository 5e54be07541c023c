use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{ApiResult, Branch, Exchange, FullCommit, HostingError, HostingTransport, Page, ShallowCommit};
use crate::budget::{RateBudgetTracker, RateLimitHeaders};
use crate::types::RepoRef;

/// Rate-aware wrapper over a [`HostingTransport`].
pub struct ApiClient<T> {
    transport: T,
    tracker: RateBudgetTracker,
    max_retry_wait: Duration,
}

impl<T: HostingTransport> ApiClient<T> {
    pub fn new(transport: T, tracker: RateBudgetTracker) -> Self {
        let max_retry_wait = tracker.settings().max_retry_wait();
        Self {
            transport,
            tracker,
            max_retry_wait,
        }
    }

    #[must_use]
    pub fn with_max_retry_wait(mut self, max_retry_wait: Duration) -> Self {
        self.max_retry_wait = max_retry_wait;
        self
    }

    pub fn tracker(&self) -> &RateBudgetTracker {
        &self.tracker
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn list_branches_page(
        &self,
        repo: &RepoRef,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Page<Branch>> {
        self.call("list branches", move || {
            self.transport.list_branches(repo, page, per_page)
        })
        .await
    }

    pub async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Page<ShallowCommit>> {
        self.call("list commits", move || {
            self.transport.list_commits(repo, git_ref, page, per_page)
        })
        .await
    }

    pub async fn get_commit(&self, repo: &RepoRef, sha: &str) -> ApiResult<FullCommit> {
        self.call("get commit", move || self.transport.get_commit(repo, sha))
            .await
    }

    /// Runs one exchange, retrying once after a rate-limit wait that fits
    /// within `max_retry_wait`.
    async fn call<R, F, Fut>(&self, operation: &str, mut exchange: F) -> ApiResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Exchange<R>>,
    {
        let first = exchange().await;
        self.observe(first.rate);

        let resets_at = match first.outcome {
            Err(HostingError::RateLimited { resets_at, message }) => {
                let wait = retry_wait(resets_at);
                if wait > self.max_retry_wait {
                    tracing::warn!(
                        "Rate limited on {operation}; reset in {}s exceeds retry window",
                        wait.as_secs()
                    );
                    return Err(HostingError::RateLimited { resets_at, message });
                }
                resets_at
            }
            other => return other,
        };

        let wait = retry_wait(resets_at);
        tracing::info!("Rate limited on {operation}, retrying in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;

        let second = exchange().await;
        self.observe(second.rate);
        if let Err(HostingError::RateLimited { .. }) = &second.outcome {
            tracing::warn!("Still rate limited on {operation} after waiting");
        }
        second.outcome
    }

    fn observe(&self, rate: Option<RateLimitHeaders>) {
        let Some(rate) = rate else {
            return;
        };
        if let Err(e) = self.tracker.record(&rate) {
            tracing::warn!("Failed to record rate budget: {e}");
        }
    }
}

fn retry_wait(resets_at: DateTime<Utc>) -> Duration {
    (resets_at - Utc::now()).to_std().unwrap_or(Duration::ZERO) + Duration::from_secs(1)
}
