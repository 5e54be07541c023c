//! Scripted hosting API and store fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use commitsync::budget::{Credential, RateLimitHeaders};
use commitsync::cache::{MemoryCache, SharedCache};
use commitsync::config::SyncSettings;
use commitsync::hosting::{
    Branch, CommitStats, Exchange, FullCommit, HostingError, HostingTransport, Page, ShallowCommit,
};
use commitsync::scheduler::Scheduler;
use commitsync::store::{SqliteStore, Store};
use commitsync::types::{
    Agreement, AgreementStatus, ChangedFile, CommitRecord, Project, RepoRef, User,
};

pub const PROJECT: &str = "p1";
pub const OWNER: &str = "owner";
pub const DEV: &str = "dev";
pub const AGREEMENT: &str = "agreement-1";

/// In-memory hosting API. Commit lists are newest first per ref.
pub struct FakeHost {
    branches: Vec<String>,
    commits: HashMap<String, Vec<ShallowCommit>>,
    broken_details: HashSet<String>,
    empty_details: HashSet<String>,
    limit: u32,
    remaining: Mutex<Option<u32>>,
    pub get_commit_calls: AtomicU32,
    pub list_commit_calls: AtomicU32,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            commits: HashMap::new(),
            broken_details: HashSet::new(),
            empty_details: HashSet::new(),
            limit: 5000,
            remaining: Mutex::new(None),
            get_commit_calls: AtomicU32::new(0),
            list_commit_calls: AtomicU32::new(0),
        }
    }

    pub fn with_branch(mut self, name: &str, commits: Vec<ShallowCommit>) -> Self {
        self.branches.push(name.to_string());
        self.commits.insert(name.to_string(), commits);
        self
    }

    /// Reports quota headers on every response, counting down from `remaining`.
    pub fn with_quota(mut self, limit: u32, remaining: u32) -> Self {
        self.limit = limit;
        self.remaining = Mutex::new(Some(remaining));
        self
    }

    /// Detail requests for `sha` fail with a server error.
    pub fn with_broken_detail(mut self, sha: &str) -> Self {
        self.broken_details.insert(sha.to_string());
        self
    }

    /// Detail for `sha` has no changed lines and no files, like a merge commit.
    pub fn with_empty_detail(mut self, sha: &str) -> Self {
        self.empty_details.insert(sha.to_string());
        self
    }

    pub fn get_commit_calls(&self) -> u32 {
        self.get_commit_calls.load(Ordering::SeqCst)
    }

    fn spend(&self) -> Option<RateLimitHeaders> {
        let mut remaining = self.remaining.lock().unwrap();
        let value = remaining.as_mut()?;
        *value = value.saturating_sub(1);
        Some(RateLimitHeaders {
            limit: self.limit,
            remaining: *value,
            resets_at: Utc::now() + Duration::hours(1),
        })
    }

    fn find(&self, sha: &str) -> Option<&ShallowCommit> {
        self.commits.values().flatten().find(|c| c.sha == sha)
    }
}

fn total_pages(len: usize, per_page: u32) -> u32 {
    u32::try_from(len.div_ceil(per_page.max(1) as usize)).unwrap().max(1)
}

impl HostingTransport for FakeHost {
    async fn list_branches(&self, _: &RepoRef, page: u32, per_page: u32) -> Exchange<Page<Branch>> {
        let rate = self.spend();
        let start = ((page - 1) * per_page) as usize;
        let items = self
            .branches
            .iter()
            .skip(start)
            .take(per_page as usize)
            .map(|name| Branch {
                name: name.clone(),
                head_sha: self.commits[name].first().map(|c| c.sha.clone()).unwrap_or_default(),
            })
            .collect();
        Exchange::new(
            Ok(Page {
                items,
                page,
                total_pages: total_pages(self.branches.len(), per_page),
            }),
            rate,
        )
    }

    async fn list_commits(
        &self,
        _: &RepoRef,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Exchange<Page<ShallowCommit>> {
        self.list_commit_calls.fetch_add(1, Ordering::SeqCst);
        let rate = self.spend();
        let Some(commits) = self.commits.get(git_ref) else {
            return Exchange::new(Err(HostingError::NotFound(git_ref.to_string())), rate);
        };
        let start = ((page - 1) * per_page) as usize;
        let items = commits.iter().skip(start).take(per_page as usize).cloned().collect();
        Exchange::new(
            Ok(Page {
                items,
                page,
                total_pages: total_pages(commits.len(), per_page),
            }),
            rate,
        )
    }

    async fn get_commit(&self, _: &RepoRef, sha: &str) -> Exchange<FullCommit> {
        self.get_commit_calls.fetch_add(1, Ordering::SeqCst);
        let rate = self.spend();
        if self.broken_details.contains(sha) {
            return Exchange::new(Err(HostingError::Api("502 Bad Gateway".into())), rate);
        }
        let summary = self
            .find(sha)
            .cloned()
            .unwrap_or_else(|| commit(sha, "ghost@example.com", 0));
        if self.empty_details.contains(sha) {
            let empty = FullCommit {
                summary,
                stats: CommitStats::default(),
                changed_files: Vec::new(),
            };
            return Exchange::new(Ok(empty), rate);
        }
        Exchange::new(Ok(full(summary)), rate)
    }
}

pub fn commit(sha: &str, email: &str, minutes_ago: i64) -> ShallowCommit {
    ShallowCommit {
        sha: sha.to_string(),
        message: format!("change {sha}"),
        author_name: Some(email.split('@').next().unwrap_or("someone").to_string()),
        author_email: Some(email.to_string()),
        author_login: None,
        committed_at: at(minutes_ago),
    }
}

pub fn at(minutes_ago: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes_ago)
}

/// Detail view with non-zero stats so enrichment can tell it apart.
pub fn full(summary: ShallowCommit) -> FullCommit {
    FullCommit {
        stats: CommitStats {
            additions: 10,
            deletions: 2,
        },
        changed_files: vec![ChangedFile {
            filename: format!("src/{}.rs", summary.sha),
            status: "modified".to_string(),
            additions: 10,
            deletions: 2,
            patch: Some("@@ -1 +1 @@".to_string()),
        }],
        summary,
    }
}

pub fn shallow_record(sha: &str, minutes_ago: i64) -> CommitRecord {
    CommitRecord {
        commit_sha: sha.to_string(),
        project_id: PROJECT.to_string(),
        resolved_user_id: None,
        raw_author_identifier: "someone@example.com".to_string(),
        message: format!("change {sha}"),
        lines_added: 0,
        lines_removed: 0,
        changed_files: Vec::new(),
        commit_date: at(minutes_ago),
        agreement_id: None,
        stats_fetched: false,
    }
}

/// Store with an owner, one collaborator under an active agreement, and a
/// project bound to `octo/demo` (or unbound when `repository` is `None`).
pub fn seeded_store(repository: Option<&str>) -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().unwrap();
    store.initialize().unwrap();

    store
        .create_user(&User {
            id: OWNER.to_string(),
            email: Some("owner@example.com".to_string()),
            hosting_username: Some("octo-owner".to_string()),
            created_at: Utc::now(),
        })
        .unwrap();
    store
        .create_user(&User {
            id: DEV.to_string(),
            email: Some("dev@example.com".to_string()),
            hosting_username: Some("dev-gh".to_string()),
            created_at: Utc::now(),
        })
        .unwrap();
    store
        .create_project(&Project {
            id: PROJECT.to_string(),
            name: "demo".to_string(),
            owner_id: OWNER.to_string(),
            repository: repository.map(str::to_string),
            created_at: Utc::now(),
        })
        .unwrap();
    store
        .create_agreement(&Agreement {
            id: AGREEMENT.to_string(),
            project_id: PROJECT.to_string(),
            status: AgreementStatus::Active,
            participant_ids: vec![DEV.to_string()],
            created_at: Utc::now() - Duration::days(7),
        })
        .unwrap();

    Arc::new(store)
}

pub fn scheduler_with(
    store: Arc<SqliteStore>,
    host: FakeHost,
    settings: SyncSettings,
) -> Scheduler<FakeHost> {
    let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
    Scheduler::new(store, cache, &Credential::token("test-token"), host, settings)
}

pub fn scheduler(store: Arc<SqliteStore>, host: FakeHost) -> Scheduler<FakeHost> {
    scheduler_with(store, host, SyncSettings::default())
}

/// Records a quota reading as if an earlier response had carried it.
pub fn observe_quota(scheduler: &Scheduler<FakeHost>, limit: u32, remaining: u32) {
    scheduler
        .allocator()
        .tracker()
        .record(&RateLimitHeaders {
            limit,
            remaining,
            resets_at: Utc::now() + Duration::hours(1),
        })
        .unwrap();
}
