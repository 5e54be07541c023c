use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Login on the hosting platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Hosting repository as `owner/name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn repo_ref(&self) -> Result<RepoRef, Error> {
        self.repository
            .as_deref()
            .ok_or_else(|| Error::MissingConfig(self.id.clone()))?
            .parse()
            .map_err(|_| Error::MissingConfig(self.id.clone()))
    }
}

/// A hosting repository coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl FromStr for RepoRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        match trimmed.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(Error::Config(format!("invalid repository '{s}', expected owner/name"))),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl AgreementStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AgreementStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::Decode(format!("unknown agreement status '{other}'"))),
        }
    }
}

/// A collaboration agreement on a project, with the ids of its participating users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: String,
    pub project_id: String,
    pub status: AgreementStatus,
    pub participant_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: i64,
    pub project_id: String,
    pub branch_name: String,
    pub owning_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Branch upsert payload, unique by `(project_id, branch_name, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBranch {
    pub project_id: String,
    pub branch_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: String,
    pub additions: i64,
    pub deletions: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_sha: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_user_id: Option<String>,
    pub raw_author_identifier: String,
    pub message: String,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub changed_files: Vec<ChangedFile>,
    pub commit_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<String>,
    /// Stats come from the commit detail. An empty diff is still fetched.
    #[serde(default)]
    pub stats_fetched: bool,
}

impl CommitRecord {
    /// True when the record still waits for its diff statistics.
    #[must_use]
    pub fn is_shallow(&self) -> bool {
        !self.stats_fetched
    }
}

/// Last quota reading observed for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudgetSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl RateBudgetSnapshot {
    /// Percentage of the limit already spent, 0.0 to 100.0.
    #[must_use]
    pub fn consumption_percent(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        f64::from(self.limit.saturating_sub(self.remaining)) * 100.0 / f64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_ref_parse() {
        let repo: RepoRef = "octo/widgets".parse().unwrap();
        assert_eq!(repo, RepoRef::new("octo", "widgets"));
        assert_eq!(repo.to_string(), "octo/widgets");

        let with_suffix: RepoRef = "octo/widgets.git".parse().unwrap();
        assert_eq!(with_suffix.name, "widgets");
    }

    #[test]
    fn test_repo_ref_rejects_malformed() {
        assert!("widgets".parse::<RepoRef>().is_err());
        assert!("/widgets".parse::<RepoRef>().is_err());
        assert!("octo/".parse::<RepoRef>().is_err());
        assert!("a/b/c".parse::<RepoRef>().is_err());
    }

    #[test]
    fn test_project_without_repository_is_missing_config() {
        let project = Project {
            id: "p1".to_string(),
            name: "widgets".to_string(),
            owner_id: "u1".to_string(),
            repository: None,
            created_at: Utc::now(),
        };
        assert!(matches!(project.repo_ref(), Err(Error::MissingConfig(_))));
    }

    #[test]
    fn test_snapshot_consumption() {
        let snapshot = RateBudgetSnapshot {
            limit: 100,
            remaining: 14,
            resets_at: Utc::now(),
            recorded_at: Utc::now(),
        };
        assert!((snapshot.consumption_percent() - 86.0).abs() < 1e-9);
    }
}
