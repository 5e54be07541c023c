use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::MAX_POLL_MULTIPLIER;
use crate::error::{Error, Result};

/// Tunables for admission control and quota division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Consumption percentage at which admission is refused.
    pub stop_at_percent: u8,
    /// Consumption percentage at which the budget counts as "approaching".
    pub warn_at_percent: u8,
    /// How long a recorded snapshot is trusted.
    pub snapshot_ttl_secs: u64,
    /// How long a project stays in a credential's membership set without re-registering.
    /// Must cover the slowest poll interval or idle projects drop out of the share.
    pub membership_ttl_secs: u64,
    pub min_calls_per_project: u32,
    /// Longest wait the API client will sleep before its single retry.
    pub max_retry_wait_secs: u64,
    pub authenticated_limit: u32,
    pub unauthenticated_limit: u32,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            stop_at_percent: 85,
            warn_at_percent: 75,
            snapshot_ttl_secs: 300,
            membership_ttl_secs: 3600,
            min_calls_per_project: 10,
            max_retry_wait_secs: 60,
            authenticated_limit: 5000,
            unauthenticated_limit: 60,
        }
    }
}

impl BudgetSettings {
    #[must_use]
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    #[must_use]
    pub fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_secs)
    }

    #[must_use]
    pub fn max_retry_wait(&self) -> Duration {
        Duration::from_secs(self.max_retry_wait_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stop_at_percent == 0 || self.stop_at_percent > 100 {
            return Err(Error::Config(format!(
                "stop_at_percent must be in 1..=100, got {}",
                self.stop_at_percent
            )));
        }
        if self.warn_at_percent > self.stop_at_percent {
            return Err(Error::Config(format!(
                "warn_at_percent ({}) cannot exceed stop_at_percent ({})",
                self.warn_at_percent, self.stop_at_percent
            )));
        }
        if self.snapshot_ttl_secs == 0 {
            return Err(Error::Config("snapshot_ttl_secs must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch full detail for every new commit during sync.
    #[default]
    Full,
    /// Store list-level summaries only; enrichment backfills stats later.
    Shallow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    pub api_base_url: String,
    pub commits_per_page: u32,
    pub branches_per_page: u32,
    pub enrichment_batch_size: u32,
    pub mode: SyncMode,
    /// Poll interval before the allocator's slowdown multiplier is applied.
    pub base_poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            commits_per_page: 100,
            branches_per_page: 100,
            enrichment_batch_size: 50,
            mode: SyncMode::Full,
            base_poll_interval_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

/// Contents of `commitsync.toml`. Missing tables and keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub budget: BudgetSettings,
    pub sync: SyncTuning,
}

impl SyncSettings {
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;
        if self.sync.commits_per_page == 0 || self.sync.commits_per_page > 100 {
            return Err(Error::Config(
                "commits_per_page must be in 1..=100".to_string(),
            ));
        }
        let slowest_poll = self.sync.base_poll_interval_secs as f64 * MAX_POLL_MULTIPLIER;
        if (self.budget.membership_ttl_secs as f64) < slowest_poll {
            return Err(Error::Config(format!(
                "membership_ttl_secs ({}) must be at least base_poll_interval_secs x {MAX_POLL_MULTIPLIER} ({slowest_poll})",
                self.budget.membership_ttl_secs
            )));
        }
        Ok(())
    }

    /// Loads settings from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("cannot encode settings: {e}")))
    }
}
