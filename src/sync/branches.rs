use serde::Serialize;

use super::{Failure, IdentityResolver, load_project, triage};
use crate::budget::RunBudget;
use crate::error::Result;
use crate::hosting::{ApiClient, Branch, HostingError, HostingTransport, ShallowCommit};
use crate::store::Store;
use crate::types::{NewBranch, RepoRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Branches returned by the hosting API.
    pub discovered: usize,
    /// Branch records that did not exist before this run.
    pub upserted: usize,
    /// Branches without any commits.
    pub skipped: usize,
    pub failed: usize,
    pub stopped_for_rate_limit: bool,
}

/// Finds the repository's branches and records who owns each one.
///
/// The owner is the author of the branch's oldest commit, falling back to
/// the project owner when the author is not a known user.
pub struct BranchDiscovery<'a, T> {
    store: &'a dyn Store,
    client: &'a ApiClient<T>,
    budget: &'a RunBudget,
    branches_per_page: u32,
}

/// Outcome of looking up a branch's oldest commit.
enum OldestCommit {
    Found(ShallowCommit),
    Empty,
    Stop,
    Failed(HostingError),
}

impl OldestCommit {
    fn from_page(items: Vec<ShallowCommit>) -> Self {
        items.into_iter().last().map_or(Self::Empty, Self::Found)
    }
}

impl<'a, T: HostingTransport> BranchDiscovery<'a, T> {
    pub fn new(store: &'a dyn Store, client: &'a ApiClient<T>, budget: &'a RunBudget) -> Self {
        Self {
            store,
            client,
            budget,
            branches_per_page: 100,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, branches_per_page: u32) -> Self {
        self.branches_per_page = branches_per_page.max(1);
        self
    }

    pub async fn run(&self, project_id: &str) -> Result<DiscoveryReport> {
        let project = load_project(self.store, project_id)?;
        let repo = project.repo_ref()?;
        let resolver = IdentityResolver::for_project(self.store, &project)?;
        let mut report = DiscoveryReport::default();

        let Some(branches) = self.list_all(&repo, &mut report).await? else {
            return Ok(report);
        };
        report.discovered = branches.len();

        for branch in branches {
            let oldest = match self.oldest_commit(&repo, &branch.name).await? {
                OldestCommit::Found(commit) => commit,
                OldestCommit::Empty => {
                    tracing::warn!("Branch {} of {} has no commits, skipping", branch.name, repo);
                    report.skipped += 1;
                    continue;
                }
                OldestCommit::Stop => {
                    report.stopped_for_rate_limit = true;
                    break;
                }
                OldestCommit::Failed(e) => match triage(e)? {
                    Failure::Exhausted => {
                        report.stopped_for_rate_limit = true;
                        break;
                    }
                    Failure::Skip(e) => {
                        tracing::warn!("Failed to inspect branch {} of {}: {e}", branch.name, repo);
                        report.failed += 1;
                        continue;
                    }
                },
            };

            let owner = resolver
                .find_user_id(&oldest.raw_author_identifier(), oldest.author_login.as_deref())
                .unwrap_or(project.owner_id.as_str());

            report.upserted += self.store.upsert_branches(&[NewBranch {
                project_id: project.id.clone(),
                branch_name: branch.name.clone(),
                user_id: owner.to_string(),
            }])?;
        }

        if report.stopped_for_rate_limit {
            tracing::info!(
                "Branch discovery for {} paused by rate budget after {} of {} branch(es)",
                project.id,
                report.upserted + report.skipped + report.failed,
                report.discovered
            );
        } else {
            tracing::info!(
                "Discovered {} branch(es) for {} ({} new)",
                report.discovered,
                project.id,
                report.upserted
            );
        }
        Ok(report)
    }

    /// All branches, or `None` when the budget ran out while listing.
    async fn list_all(&self, repo: &RepoRef, report: &mut DiscoveryReport) -> Result<Option<Vec<Branch>>> {
        let mut branches = Vec::new();
        let mut page = 1;
        loop {
            if !self.budget.try_admit(1)? {
                report.stopped_for_rate_limit = true;
                return Ok(None);
            }
            let current = match self.client.list_branches_page(repo, page, self.branches_per_page).await {
                Ok(current) => current,
                Err(e) => match triage(e)? {
                    Failure::Exhausted => {
                        report.stopped_for_rate_limit = true;
                        return Ok(None);
                    }
                    // Without the listing there is nothing to iterate.
                    Failure::Skip(e) => return Err(e.into()),
                },
            };

            let done = current.page >= current.total_pages || current.items.is_empty();
            branches.extend(current.items);
            if done {
                return Ok(Some(branches));
            }
            page += 1;
        }
    }

    /// Lists with a page size of one so the last page holds the oldest commit.
    async fn oldest_commit(&self, repo: &RepoRef, branch: &str) -> Result<OldestCommit> {
        if !self.budget.try_admit(1)? {
            return Ok(OldestCommit::Stop);
        }
        let first = match self.client.list_commits(repo, branch, 1, 1).await {
            Ok(page) => page,
            Err(e) => return Ok(OldestCommit::Failed(e)),
        };
        if first.total_pages <= 1 {
            return Ok(OldestCommit::from_page(first.items));
        }

        if !self.budget.try_admit(1)? {
            return Ok(OldestCommit::Stop);
        }
        match self
            .client
            .list_commits(repo, branch, first.total_pages, 1)
            .await
        {
            Ok(last) => Ok(OldestCommit::from_page(last.items)),
            Err(e) => Ok(OldestCommit::Failed(e)),
        }
    }
}
