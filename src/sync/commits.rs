use std::collections::HashSet;

use serde::Serialize;

use super::{Failure, IdentityResolver, load_project, triage};
use crate::budget::RunBudget;
use crate::config::{SyncMode, SyncTuning};
use crate::error::{Error, Result};
use crate::hosting::{ApiClient, FullCommit, HostingTransport, ShallowCommit};
use crate::store::Store;
use crate::types::{ChangedFile, CommitRecord, Project, RepoRef};

/// What one fetch pass produced, before anything is written.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub branch_id: i64,
    /// Commits not yet stored for the project, newest first.
    pub new_commits: Vec<CommitRecord>,
    /// Every sha observed on the branch, known or not.
    pub all_shas: Vec<String>,
    /// Detail fetches that failed; those commits are kept in shallow form.
    pub failed_details: usize,
    /// Set when the run stopped early and another run should continue.
    pub remaining_work: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub branch: String,
    pub observed: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub linked: usize,
    pub failed_details: usize,
    pub remaining_work: bool,
}

/// Incremental commit ingestion for one branch.
///
/// Shas already stored for the project, from any branch, are never fetched
/// again; they are only linked to the branch being synced.
pub struct CommitSync<'a, T> {
    store: &'a dyn Store,
    client: &'a ApiClient<T>,
    budget: &'a RunBudget,
    per_page: u32,
    mode: SyncMode,
}

impl<'a, T: HostingTransport> CommitSync<'a, T> {
    pub fn new(
        store: &'a dyn Store,
        client: &'a ApiClient<T>,
        budget: &'a RunBudget,
        tuning: &SyncTuning,
    ) -> Self {
        Self {
            store,
            client,
            budget,
            per_page: tuning.commits_per_page.max(1),
            mode: tuning.mode,
        }
    }

    pub async fn fetch(&self, project_id: &str, branch_name: &str) -> Result<SyncOutcome> {
        let project = load_project(self.store, project_id)?;
        let repo = project.repo_ref()?;
        let branch = self
            .store
            .get_branch(project_id, branch_name)?
            .ok_or_else(|| Error::NotFound(format!("branch {branch_name} in project {project_id}")))?;

        let known = self.store.list_commit_shas(project_id)?;
        let resolver = IdentityResolver::for_project(self.store, &project)?;

        let mut outcome = SyncOutcome {
            branch_id: branch.id,
            ..SyncOutcome::default()
        };
        let pending = self
            .list_new(&repo, branch_name, &known, &mut outcome)
            .await?;

        match self.mode {
            SyncMode::Shallow => {
                outcome.new_commits = pending
                    .iter()
                    .map(|c| build_record(&project, &resolver, c, None))
                    .collect();
            }
            SyncMode::Full => {
                self.fetch_details(&project, &repo, &resolver, &pending, &mut outcome)
                    .await?;
            }
        }

        tracing::debug!(
            "Fetched {} new of {} observed commit(s) on {}/{}",
            outcome.new_commits.len(),
            outcome.all_shas.len(),
            project_id,
            branch_name
        );
        Ok(outcome)
    }

    /// Fetches, stores new commits and links every stored sha to the branch.
    pub async fn run(&self, project_id: &str, branch_name: &str) -> Result<SyncReport> {
        let outcome = self.fetch(project_id, branch_name).await?;

        let inserted = self.store.upsert_commits(&outcome.new_commits)?;
        let linked = self
            .store
            .link_commits_to_branch(outcome.branch_id, &outcome.all_shas)?;

        let report = SyncReport {
            branch: branch_name.to_string(),
            observed: outcome.all_shas.len(),
            fetched: outcome.new_commits.len(),
            inserted,
            linked,
            failed_details: outcome.failed_details,
            remaining_work: outcome.remaining_work,
        };

        tracing::info!(
            "Synced {}/{}: {} new commit(s), {} new link(s){}",
            project_id,
            branch_name,
            report.inserted,
            report.linked,
            if report.remaining_work { ", more work pending" } else { "" }
        );
        Ok(report)
    }

    /// Pages newest-first through the branch, collecting unseen commits.
    async fn list_new(
        &self,
        repo: &RepoRef,
        branch_name: &str,
        known: &HashSet<String>,
        outcome: &mut SyncOutcome,
    ) -> Result<Vec<ShallowCommit>> {
        let mut pending = Vec::new();
        let mut queued = HashSet::new();
        let mut page = 1;

        loop {
            if !self.budget.try_admit(1)? {
                outcome.remaining_work = true;
                break;
            }

            let current = match self
                .client
                .list_commits(repo, branch_name, page, self.per_page)
                .await
            {
                Ok(current) => current,
                Err(e) => {
                    match triage(e)? {
                        Failure::Exhausted => {}
                        Failure::Skip(e) => {
                            tracing::warn!("Listing {branch_name} of {repo} stopped at page {page}: {e}");
                        }
                    }
                    outcome.remaining_work = true;
                    break;
                }
            };

            let short = current.items.len() < self.per_page as usize;
            let last = current.page >= current.total_pages;
            for commit in current.items {
                outcome.all_shas.push(commit.sha.clone());
                if !known.contains(&commit.sha) && queued.insert(commit.sha.clone()) {
                    pending.push(commit);
                }
            }

            if short || last {
                break;
            }
            page += 1;
        }

        Ok(pending)
    }

    async fn fetch_details(
        &self,
        project: &Project,
        repo: &RepoRef,
        resolver: &IdentityResolver,
        pending: &[ShallowCommit],
        outcome: &mut SyncOutcome,
    ) -> Result<()> {
        for commit in pending {
            if !self.budget.try_admit(1)? {
                outcome.remaining_work = true;
                break;
            }

            match self.client.get_commit(repo, &commit.sha).await {
                Ok(full) => {
                    outcome
                        .new_commits
                        .push(build_record(project, resolver, &full.summary, Some(&full)));
                }
                Err(e) => match triage(e)? {
                    Failure::Exhausted => {
                        outcome.remaining_work = true;
                        break;
                    }
                    Failure::Skip(e) => {
                        tracing::warn!("Storing {} without stats: {e}", commit.sha);
                        outcome.failed_details += 1;
                        outcome
                            .new_commits
                            .push(build_record(project, resolver, commit, None));
                    }
                },
            }
        }
        Ok(())
    }
}

fn build_record(
    project: &Project,
    resolver: &IdentityResolver,
    commit: &ShallowCommit,
    detail: Option<&FullCommit>,
) -> CommitRecord {
    let raw_author_identifier = commit.raw_author_identifier();
    let resolved_user_id = resolver
        .find_user_id(&raw_author_identifier, commit.author_login.as_deref())
        .map(str::to_string);
    let agreement_id = resolved_user_id
        .as_deref()
        .and_then(|user| resolver.agreement_for(user))
        .map(|a| a.id.clone());

    let (lines_added, lines_removed, changed_files): (i64, i64, Vec<ChangedFile>) = match detail {
        Some(full) => (
            full.stats.additions,
            full.stats.deletions,
            full.changed_files.clone(),
        ),
        None => (0, 0, Vec::new()),
    };

    CommitRecord {
        commit_sha: commit.sha.clone(),
        project_id: project.id.clone(),
        resolved_user_id,
        raw_author_identifier,
        message: commit.message.clone(),
        lines_added,
        lines_removed,
        changed_files,
        commit_date: commit.committed_at,
        agreement_id,
        stats_fetched: detail.is_some(),
    }
}
