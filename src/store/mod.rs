mod schema;
mod sqlite;

use std::collections::HashSet;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_users(&self, ids: &[String]) -> Result<Vec<User>>;

    // Project operations
    fn create_project(&self, project: &Project) -> Result<()>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn list_projects(&self) -> Result<Vec<Project>>;

    // Agreement operations (read by attribution, written by the host application)
    fn create_agreement(&self, agreement: &Agreement) -> Result<()>;
    /// Active agreements for a project, oldest first.
    fn list_active_agreements(&self, project_id: &str) -> Result<Vec<Agreement>>;

    // Branch operations
    /// Inserts branches unique by (project, branch, user). Returns how many were new.
    fn upsert_branches(&self, branches: &[NewBranch]) -> Result<usize>;
    /// First branch record with this name, by insertion order.
    fn get_branch(&self, project_id: &str, branch_name: &str) -> Result<Option<BranchRecord>>;
    fn list_branches(&self, project_id: &str) -> Result<Vec<BranchRecord>>;

    // Commit operations
    fn list_commit_shas(&self, project_id: &str) -> Result<HashSet<String>>;
    /// Inserts commits unique by sha; existing rows are left untouched. Returns how many were new.
    fn upsert_commits(&self, commits: &[CommitRecord]) -> Result<usize>;
    fn get_commit(&self, sha: &str) -> Result<Option<CommitRecord>>;
    fn count_commits(&self, project_id: &str) -> Result<i64>;
    /// Commits whose detail was never fetched, most recent first.
    fn list_unenriched_commits(&self, project_id: &str, limit: u32) -> Result<Vec<CommitRecord>>;
    fn count_unenriched_commits(&self, project_id: &str) -> Result<i64>;
    /// Marks the detail as fetched. Returns false when nothing changed.
    fn update_commit_stats(
        &self,
        sha: &str,
        lines_added: i64,
        lines_removed: i64,
        changed_files: &[ChangedFile],
    ) -> Result<bool>;

    // Branch-commit links
    /// Links every listed sha that has a commit row. Returns how many links were new.
    fn link_commits_to_branch(&self, branch_id: i64, shas: &[String]) -> Result<usize>;
    fn list_branch_commit_shas(&self, branch_id: i64) -> Result<Vec<String>>;
}
