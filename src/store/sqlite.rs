use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const COMMIT_COLUMNS: &str = "commit_sha, project_id, user_id, raw_author, message, lines_added, \
     lines_removed, changed_files, commit_date, agreement_id, stats_fetched";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width so that commit dates sort lexically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn encode_files(files: &[ChangedFile]) -> Result<String> {
    serde_json::to_string(files).map_err(|e| Error::Decode(format!("changed files: {e}")))
}

fn decode_files(raw: &str) -> Vec<ChangedFile> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::error!("Invalid changed_files JSON in database: {}", e);
        Vec::new()
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<CommitRecord> {
    Ok(CommitRecord {
        commit_sha: row.get(0)?,
        project_id: row.get(1)?,
        resolved_user_id: row.get(2)?,
        raw_author_identifier: row.get(3)?,
        message: row.get(4)?,
        lines_added: row.get(5)?,
        lines_removed: row.get(6)?,
        changed_files: decode_files(&row.get::<_, String>(7)?),
        commit_date: parse_datetime(&row.get::<_, String>(8)?),
        agreement_id: row.get(9)?,
        stats_fetched: row.get(10)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        hosting_username: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        repository: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<BranchRecord> {
    Ok(BranchRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        branch_name: row.get(2)?,
        owning_user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, hosting_username, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id,
                user.email,
                user.hosting_username,
                format_datetime(&user.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, hosting_username, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_users(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, email, hosting_username, created_at FROM users
             WHERE id IN ({placeholders}) ORDER BY id"
        ))?;

        let rows = stmt.query_map(params_from_iter(ids.iter()), user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()> {
        self.conn().execute(
            "INSERT INTO projects (id, name, owner_id, repository, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.name,
                project.owner_id,
                project.repository,
                format_datetime(&project.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, owner_id, repository, created_at FROM projects WHERE id = ?1",
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, owner_id, repository, created_at FROM projects ORDER BY id",
        )?;

        let rows = stmt.query_map([], project_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Agreement operations

    fn create_agreement(&self, agreement: &Agreement) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO agreements (id, project_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                agreement.id,
                agreement.project_id,
                agreement.status.as_str(),
                format_datetime(&agreement.created_at),
            ],
        )?;

        for user_id in &agreement.participant_ids {
            tx.execute(
                "INSERT OR IGNORE INTO agreement_participants (agreement_id, user_id) VALUES (?1, ?2)",
                params![agreement.id, user_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_active_agreements(&self, project_id: &str) -> Result<Vec<Agreement>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, status, created_at FROM agreements
             WHERE project_id = ?1 AND status = 'active'
             ORDER BY created_at, id",
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let headers = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        let mut participants = conn.prepare(
            "SELECT user_id FROM agreement_participants WHERE agreement_id = ?1 ORDER BY user_id",
        )?;

        let mut agreements = Vec::with_capacity(headers.len());
        for (id, project_id, status, created_at) in headers {
            let participant_ids = participants
                .query_map(params![id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            agreements.push(Agreement {
                status: status.parse()?,
                id,
                project_id,
                participant_ids,
                created_at: parse_datetime(&created_at),
            });
        }

        Ok(agreements)
    }

    // Branch operations

    fn upsert_branches(&self, branches: &[NewBranch]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO branches (project_id, branch_name, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(project_id, branch_name, user_id) DO NOTHING",
            )?;
            for branch in branches {
                inserted += stmt.execute(params![
                    branch.project_id,
                    branch.branch_name,
                    branch.user_id,
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn get_branch(&self, project_id: &str, branch_name: &str) -> Result<Option<BranchRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, project_id, branch_name, user_id, created_at, updated_at
             FROM branches WHERE project_id = ?1 AND branch_name = ?2
             ORDER BY id LIMIT 1",
            params![project_id, branch_name],
            branch_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_branches(&self, project_id: &str) -> Result<Vec<BranchRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_name, user_id, created_at, updated_at
             FROM branches WHERE project_id = ?1 ORDER BY branch_name, id",
        )?;

        let rows = stmt.query_map(params![project_id], branch_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Commit operations

    fn list_commit_shas(&self, project_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT commit_sha FROM commits WHERE project_id = ?1")?;

        let rows = stmt.query_map(params![project_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(Error::from)
    }

    fn upsert_commits(&self, commits: &[CommitRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO commits ({COMMIT_COLUMNS}, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                 ON CONFLICT(commit_sha) DO NOTHING"
            ))?;
            for commit in commits {
                inserted += stmt.execute(params![
                    commit.commit_sha,
                    commit.project_id,
                    commit.resolved_user_id,
                    commit.raw_author_identifier,
                    commit.message,
                    commit.lines_added,
                    commit.lines_removed,
                    encode_files(&commit.changed_files)?,
                    format_datetime(&commit.commit_date),
                    commit.agreement_id,
                    commit.stats_fetched,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn get_commit(&self, sha: &str) -> Result<Option<CommitRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE commit_sha = ?1"),
            params![sha],
            commit_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn count_commits(&self, project_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn list_unenriched_commits(&self, project_id: &str, limit: u32) -> Result<Vec<CommitRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits
             WHERE project_id = ?1 AND stats_fetched = 0
             ORDER BY commit_date DESC, commit_sha
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![project_id, limit], commit_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_unenriched_commits(&self, project_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM commits
             WHERE project_id = ?1 AND stats_fetched = 0",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn update_commit_stats(
        &self,
        sha: &str,
        lines_added: i64,
        lines_removed: i64,
        changed_files: &[ChangedFile],
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE commits
             SET lines_added = ?1, lines_removed = ?2, changed_files = ?3, stats_fetched = 1, updated_at = ?4
             WHERE commit_sha = ?5
               AND NOT (stats_fetched = 1 AND lines_added = ?1 AND lines_removed = ?2 AND changed_files = ?3)",
            params![
                lines_added,
                lines_removed,
                encode_files(changed_files)?,
                format_datetime(&Utc::now()),
                sha
            ],
        )?;
        Ok(rows > 0)
    }

    // Branch-commit links

    fn link_commits_to_branch(&self, branch_id: i64, shas: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        let mut linked = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO branch_commits (branch_id, commit_sha, created_at)
                 SELECT ?1, commit_sha, ?3 FROM commits WHERE commit_sha = ?2",
            )?;
            for sha in shas {
                linked += stmt.execute(params![branch_id, sha, now])?;
            }
        }

        tx.commit()?;
        Ok(linked)
    }

    fn list_branch_commit_shas(&self, branch_id: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT commit_sha FROM branch_commits WHERE branch_id = ?1 ORDER BY commit_sha",
        )?;

        let rows = stmt.query_map(params![branch_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();

        for (id, email, login) in [
            ("owner", "owner@example.com", "octo-owner"),
            ("dev", "dev@example.com", "octo-dev"),
        ] {
            store
                .create_user(&User {
                    id: id.to_string(),
                    email: Some(email.to_string()),
                    hosting_username: Some(login.to_string()),
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        store
            .create_project(&Project {
                id: "proj-1".to_string(),
                name: "widgets".to_string(),
                owner_id: "owner".to_string(),
                repository: Some("octo/widgets".to_string()),
                created_at: Utc::now(),
            })
            .unwrap();

        store
    }

    fn commit(sha: &str, day: u32) -> CommitRecord {
        CommitRecord {
            commit_sha: sha.to_string(),
            project_id: "proj-1".to_string(),
            resolved_user_id: None,
            raw_author_identifier: "someone@example.com".to_string(),
            message: format!("commit {sha}"),
            lines_added: 0,
            lines_removed: 0,
            changed_files: Vec::new(),
            commit_date: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            agreement_id: None,
            stats_fetched: false,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "projects",
            "agreements",
            "agreement_participants",
            "branches",
            "commits",
            "branch_commits",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_upsert_commits_is_idempotent() {
        let store = seeded_store();
        let record = commit("c1", 1);

        assert_eq!(store.upsert_commits(&[record.clone()]).unwrap(), 1);
        assert_eq!(store.upsert_commits(&[record.clone()]).unwrap(), 0);
        assert_eq!(store.count_commits("proj-1").unwrap(), 1);
        assert_eq!(store.get_commit("c1").unwrap().unwrap(), record);
    }

    #[test]
    fn test_upsert_never_overwrites_existing_row() {
        let store = seeded_store();
        store.upsert_commits(&[commit("c1", 1)]).unwrap();

        let mut changed = commit("c1", 1);
        changed.message = "rewritten".to_string();
        changed.lines_added = 99;
        store.upsert_commits(&[changed]).unwrap();

        let stored = store.get_commit("c1").unwrap().unwrap();
        assert_eq!(stored.message, "commit c1");
        assert_eq!(stored.lines_added, 0);
    }

    #[test]
    fn test_branch_upsert_unique_per_owner() {
        let store = seeded_store();
        let main_owner = NewBranch {
            project_id: "proj-1".to_string(),
            branch_name: "main".to_string(),
            user_id: "owner".to_string(),
        };
        let main_dev = NewBranch {
            user_id: "dev".to_string(),
            ..main_owner.clone()
        };

        assert_eq!(store.upsert_branches(&[main_owner.clone()]).unwrap(), 1);
        assert_eq!(store.upsert_branches(&[main_owner]).unwrap(), 0);
        assert_eq!(store.upsert_branches(&[main_dev]).unwrap(), 1);

        let branches = store.list_branches("proj-1").unwrap();
        assert_eq!(branches.len(), 2);
        let first = store.get_branch("proj-1", "main").unwrap().unwrap();
        assert_eq!(first.owning_user_id, "owner");
        assert!(store.get_branch("proj-1", "absent").unwrap().is_none());
    }

    #[test]
    fn test_links_skip_unknown_shas_and_dedupe() {
        let store = seeded_store();
        store
            .upsert_branches(&[NewBranch {
                project_id: "proj-1".to_string(),
                branch_name: "main".to_string(),
                user_id: "owner".to_string(),
            }])
            .unwrap();
        let branch = store.get_branch("proj-1", "main").unwrap().unwrap();
        store
            .upsert_commits(&[commit("c1", 1), commit("c2", 2)])
            .unwrap();

        let shas = vec!["c1".to_string(), "c2".to_string(), "ghost".to_string()];
        assert_eq!(store.link_commits_to_branch(branch.id, &shas).unwrap(), 2);
        assert_eq!(store.link_commits_to_branch(branch.id, &shas).unwrap(), 0);
        assert_eq!(
            store.list_branch_commit_shas(branch.id).unwrap(),
            vec!["c1".to_string(), "c2".to_string()]
        );
    }

    #[test]
    fn test_unenriched_selection_orders_newest_first() {
        let store = seeded_store();
        store
            .upsert_commits(&[commit("old", 1), commit("new", 20), commit("mid", 10)])
            .unwrap();

        let mut full = commit("full", 25);
        full.lines_added = 3;
        full.stats_fetched = true;
        store.upsert_commits(&[full]).unwrap();

        let candidates = store.list_unenriched_commits("proj-1", 2).unwrap();
        let shas: Vec<_> = candidates.iter().map(|c| c.commit_sha.as_str()).collect();
        assert_eq!(shas, vec!["new", "mid"]);
        assert_eq!(store.count_unenriched_commits("proj-1").unwrap(), 3);

        let files = vec![ChangedFile {
            filename: "src/lib.rs".to_string(),
            status: "modified".to_string(),
            additions: 4,
            deletions: 1,
            patch: None,
        }];
        assert!(store.update_commit_stats("new", 4, 1, &files).unwrap());
        assert_eq!(store.count_unenriched_commits("proj-1").unwrap(), 2);
        assert_eq!(store.get_commit("new").unwrap().unwrap().changed_files, files);
    }

    #[test]
    fn test_empty_diff_is_fetched_once() {
        let store = seeded_store();
        let mut empty = commit("empty", 2);
        empty.stats_fetched = true;
        store.upsert_commits(&[commit("c1", 1), empty]).unwrap();

        let candidates = store.list_unenriched_commits("proj-1", 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].commit_sha, "c1");

        assert!(store.update_commit_stats("c1", 0, 0, &[]).unwrap());
        assert_eq!(store.count_unenriched_commits("proj-1").unwrap(), 0);
        assert!(!store.get_commit("c1").unwrap().unwrap().is_shallow());

        let updated_at = |store: &SqliteStore| -> String {
            store
                .conn()
                .query_row(
                    "SELECT updated_at FROM commits WHERE commit_sha = 'c1'",
                    [],
                    |row| row.get(0),
                )
                .unwrap()
        };
        let before = updated_at(&store);
        assert!(!store.update_commit_stats("c1", 0, 0, &[]).unwrap());
        assert_eq!(updated_at(&store), before);

        // A real change still lands.
        assert!(store.update_commit_stats("c1", 2, 0, &[]).unwrap());
        assert_eq!(store.get_commit("c1").unwrap().unwrap().lines_added, 2);
    }

    #[test]
    fn test_active_agreements_with_participants() {
        let store = seeded_store();
        store
            .create_agreement(&Agreement {
                id: "agr-1".to_string(),
                project_id: "proj-1".to_string(),
                status: AgreementStatus::Active,
                participant_ids: vec!["dev".to_string(), "owner".to_string()],
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .create_agreement(&Agreement {
                id: "agr-2".to_string(),
                project_id: "proj-1".to_string(),
                status: AgreementStatus::Cancelled,
                participant_ids: vec!["dev".to_string()],
                created_at: Utc::now(),
            })
            .unwrap();

        let active = store.list_active_agreements("proj-1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "agr-1");
        assert_eq!(active[0].participant_ids, vec!["dev", "owner"]);
    }
}
