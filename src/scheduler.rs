//! One budget-aware sync pass for a project.
//!
//! The scheduler is what callers (HTTP handlers, the CLI, an external cron)
//! drive. It registers the project with the credential's quota allocator,
//! decides whether this run may poll at all, then runs discovery, commit sync
//! and enrichment under a single [`RunBudget`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::budget::{Credential, ProjectQuota, QuotaAllocator, RateBudgetTracker, RunBudget};
use crate::cache::SharedCache;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::hosting::{ApiClient, GitHubTransport, HostingTransport, http_client};
use crate::store::Store;
use crate::sync::{
    BranchDiscovery, CommitSync, DiscoveryReport, EnrichmentReport, StatsEnrichment, SyncReport,
    load_project,
};
use crate::types::RateBudgetSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub project_id: String,
    pub quota: ProjectQuota,
    /// The project's fair share was below the per-project minimum; nothing ran.
    pub deferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryReport>,
    pub branches: Vec<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentReport>,
    pub stopped_for_rate_limit: bool,
    pub calls_spent: u32,
    pub next_poll_after_secs: u64,
}

/// Budget state for one credential as seen from one project.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RateBudgetSnapshot>,
    pub limit: u32,
    pub remaining: u32,
    pub threshold_remaining: u32,
    pub approaching_threshold: bool,
    pub threshold_exceeded: bool,
    pub wait_time_secs: u64,
    pub active_projects: Vec<String>,
    pub calls_made: i64,
    pub quota: ProjectQuota,
    pub next_poll_after_secs: u64,
}

pub struct Scheduler<T> {
    store: Arc<dyn Store>,
    client: ApiClient<T>,
    allocator: QuotaAllocator,
    settings: SyncSettings,
}

impl Scheduler<GitHubTransport> {
    /// Scheduler talking to the configured GitHub-compatible API.
    pub fn github(
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        credential: Credential,
        settings: SyncSettings,
    ) -> Result<Self> {
        let http = http_client(Duration::from_secs(settings.sync.request_timeout_secs))?;
        Ok(Self::github_with_client(store, cache, credential, settings, http))
    }

    /// Like [`Scheduler::github`], reusing `http` instead of building a client.
    #[must_use]
    pub fn github_with_client(
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        credential: Credential,
        settings: SyncSettings,
        http: reqwest::Client,
    ) -> Self {
        let transport =
            GitHubTransport::with_client(http, &settings.sync.api_base_url, credential.clone());
        Self::new(store, cache, &credential, transport, settings)
    }
}

impl<T: HostingTransport> Scheduler<T> {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        credential: &Credential,
        transport: T,
        settings: SyncSettings,
    ) -> Self {
        let tracker = RateBudgetTracker::new(cache, credential, settings.budget.clone());
        Self {
            store,
            client: ApiClient::new(transport, tracker.clone()),
            allocator: QuotaAllocator::new(tracker),
            settings,
        }
    }

    pub fn allocator(&self) -> &QuotaAllocator {
        &self.allocator
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Registers the project and opens a budget capped at its current allowance.
    fn open_budget(&self, project_id: &str) -> Result<RunBudget> {
        self.allocator.register_project(project_id)?;
        RunBudget::for_project(&self.allocator, project_id)
    }

    fn next_poll_after_secs(&self) -> Result<u64> {
        let base = Duration::from_secs(self.settings.sync.base_poll_interval_secs);
        Ok(self.allocator.next_poll_after(base)?.as_secs())
    }

    fn discovery<'a>(&'a self, budget: &'a RunBudget) -> BranchDiscovery<'a, T> {
        BranchDiscovery::new(self.store.as_ref(), &self.client, budget)
            .with_page_size(self.settings.sync.branches_per_page)
    }

    fn commit_sync<'a>(&'a self, budget: &'a RunBudget) -> CommitSync<'a, T> {
        CommitSync::new(self.store.as_ref(), &self.client, budget, &self.settings.sync)
    }

    fn enrichment<'a>(&'a self, budget: &'a RunBudget) -> StatsEnrichment<'a, T> {
        StatsEnrichment::new(
            self.store.as_ref(),
            &self.client,
            budget,
            self.settings.sync.enrichment_batch_size,
        )
    }

    /// Full pass: discover branches, sync one branch (or all known), enrich.
    pub async fn run(&self, project_id: &str, branch: Option<&str>) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        load_project(self.store.as_ref(), project_id)?.repo_ref()?;

        self.allocator.register_project(project_id)?;
        let quota = self.allocator.quota_for(project_id)?;
        let mut report = RunReport {
            run_id,
            project_id: project_id.to_string(),
            quota: quota.clone(),
            deferred: false,
            discovery: None,
            branches: Vec::new(),
            enrichment: None,
            stopped_for_rate_limit: false,
            calls_spent: 0,
            next_poll_after_secs: 0,
        };

        if !quota.can_poll {
            tracing::info!(
                "Run {} deferred for {}: fair share {} below minimum",
                report.run_id,
                project_id,
                quota.fair_share
            );
            report.deferred = true;
            report.next_poll_after_secs = self.next_poll_after_secs()?;
            return Ok(report);
        }

        tracing::info!(
            "Run {} started for {} with allowance of {} call(s)",
            report.run_id,
            project_id,
            quota.allowed_calls
        );
        let budget = RunBudget::for_project(&self.allocator, project_id)?;

        let discovery = self.discovery(&budget).run(project_id).await?;
        report.stopped_for_rate_limit = discovery.stopped_for_rate_limit;
        report.discovery = Some(discovery);

        if !report.stopped_for_rate_limit {
            let targets = match branch {
                Some(name) => vec![name.to_string()],
                None => {
                    // A branch name can have several owners; sync it once.
                    let mut seen = HashSet::new();
                    self.store
                        .list_branches(project_id)?
                        .into_iter()
                        .map(|b| b.branch_name)
                        .filter(|name| seen.insert(name.clone()))
                        .collect()
                }
            };

            for name in targets {
                let synced = self.commit_sync(&budget).run(project_id, &name).await?;
                let exhausted = synced.remaining_work && !budget.has_headroom(1)?;
                report.branches.push(synced);
                if exhausted {
                    report.stopped_for_rate_limit = true;
                    break;
                }
            }
        }

        if !report.stopped_for_rate_limit {
            let enrichment = self.enrichment(&budget).run(project_id).await?;
            report.stopped_for_rate_limit = enrichment.stopped_for_rate_limit;
            report.enrichment = Some(enrichment);
        }

        report.calls_spent = budget.spent();
        report.next_poll_after_secs = self.next_poll_after_secs()?;
        tracing::info!(
            "Run {} finished for {}: {} call(s) spent{}, next poll in {}s",
            report.run_id,
            project_id,
            report.calls_spent,
            if report.stopped_for_rate_limit { ", paused by rate budget" } else { "" },
            report.next_poll_after_secs
        );
        Ok(report)
    }

    pub async fn discover(&self, project_id: &str) -> Result<DiscoveryReport> {
        let budget = self.open_budget(project_id)?;
        self.discovery(&budget).run(project_id).await
    }

    pub async fn sync_branch(&self, project_id: &str, branch: &str) -> Result<SyncReport> {
        let budget = self.open_budget(project_id)?;
        self.commit_sync(&budget).run(project_id, branch).await
    }

    pub async fn enrich(&self, project_id: &str) -> Result<EnrichmentReport> {
        let budget = self.open_budget(project_id)?;
        self.enrichment(&budget).run(project_id).await
    }

    /// Read-only view of the credential's budget; does not register the project.
    pub fn quota_status(&self, project_id: &str) -> Result<QuotaStatus> {
        let tracker = self.allocator.tracker();
        let (limit, remaining) = tracker.effective_budget()?;
        Ok(QuotaStatus {
            project_id: project_id.to_string(),
            snapshot: tracker.snapshot()?,
            limit,
            remaining,
            threshold_remaining: tracker.threshold_remaining(limit),
            approaching_threshold: tracker.approaching_threshold()?,
            threshold_exceeded: tracker.threshold_exceeded()?,
            wait_time_secs: tracker.wait_time()?,
            active_projects: self.allocator.active_projects()?,
            calls_made: self.allocator.calls_made(project_id)?,
            quota: self.allocator.quota_for(project_id)?,
            next_poll_after_secs: self.next_poll_after_secs()?,
        })
    }
}
