use serde::Serialize;

use super::{Failure, load_project, triage};
use crate::budget::RunBudget;
use crate::error::Result;
use crate::hosting::{ApiClient, HostingTransport};
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub enriched_count: usize,
    /// Commits still lacking stats after this run.
    pub remaining_count: i64,
    pub failed_count: usize,
    pub stopped_for_rate_limit: bool,
}

/// Backfills diff statistics for commits stored without them.
pub struct StatsEnrichment<'a, T> {
    store: &'a dyn Store,
    client: &'a ApiClient<T>,
    budget: &'a RunBudget,
    batch_size: u32,
}

impl<'a, T: HostingTransport> StatsEnrichment<'a, T> {
    pub fn new(
        store: &'a dyn Store,
        client: &'a ApiClient<T>,
        budget: &'a RunBudget,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            client,
            budget,
            batch_size,
        }
    }

    pub async fn run(&self, project_id: &str) -> Result<EnrichmentReport> {
        let project = load_project(self.store, project_id)?;
        let repo = project.repo_ref()?;
        let candidates = self
            .store
            .list_unenriched_commits(project_id, self.batch_size)?;

        let mut report = EnrichmentReport::default();
        for commit in &candidates {
            if !self.budget.try_admit(1)? {
                report.stopped_for_rate_limit = true;
                break;
            }

            match self.client.get_commit(&repo, &commit.commit_sha).await {
                Ok(full) => {
                    self.store.update_commit_stats(
                        &commit.commit_sha,
                        full.stats.additions,
                        full.stats.deletions,
                        &full.changed_files,
                    )?;
                    report.enriched_count += 1;
                }
                Err(e) => match triage(e)? {
                    Failure::Exhausted => {
                        report.stopped_for_rate_limit = true;
                        break;
                    }
                    Failure::Skip(e) => {
                        tracing::warn!("Failed to enrich commit {}: {e}", commit.commit_sha);
                        report.failed_count += 1;
                    }
                },
            }
        }

        report.remaining_count = self.store.count_unenriched_commits(project_id)?;
        tracing::info!(
            "Enriched {} of {} candidate commit(s) for {}, {} remaining",
            report.enriched_count,
            candidates.len(),
            project_id,
            report.remaining_count
        );
        Ok(report)
    }
}
