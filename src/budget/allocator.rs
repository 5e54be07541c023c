use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::credential::{calls_key, membership_key};
use super::tracker::RateBudgetTracker;
use crate::cache;
use crate::error::Result;

/// Highest slowdown applied to a project's poll interval.
pub const MAX_POLL_MULTIPLIER: f64 = 10.0;

/// Fallback lifetime for call counters when no reset time is known.
const CALL_COUNTER_TTL: Duration = Duration::from_secs(3600);

type Membership = BTreeMap<String, DateTime<Utc>>;

/// One project's slice of a shared credential's budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectQuota {
    pub credential_hash: String,
    pub project_count: usize,
    pub remaining: u32,
    pub fair_share: u32,
    pub allowed_calls: u32,
    pub can_poll: bool,
    pub poll_multiplier: f64,
    pub consumption_percent: f64,
}

/// Divides a credential's remaining budget between the projects polling with it.
#[derive(Clone)]
pub struct QuotaAllocator {
    tracker: RateBudgetTracker,
}

impl QuotaAllocator {
    #[must_use]
    pub fn new(tracker: RateBudgetTracker) -> Self {
        Self { tracker }
    }

    #[must_use]
    pub fn tracker(&self) -> &RateBudgetTracker {
        &self.tracker
    }

    fn membership_ttl(&self) -> Duration {
        self.tracker.settings().membership_ttl()
    }

    /// Live members, with entries older than the membership TTL dropped.
    fn load_membership(&self) -> Result<Membership> {
        let key = membership_key(self.tracker.credential_hash());
        let mut members: Membership =
            cache::get_json(self.tracker.cache().as_ref(), &key)?.unwrap_or_default();

        let ttl = chrono::Duration::from_std(self.membership_ttl()).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        members.retain(|_, registered_at| {
            registered_at
                .checked_add_signed(ttl)
                .is_none_or(|expires| expires > now)
        });
        Ok(members)
    }

    fn store_membership(&self, members: &Membership) -> Result<()> {
        let key = membership_key(self.tracker.credential_hash());
        if members.is_empty() {
            self.tracker.cache().delete(&key)?;
            return Ok(());
        }
        cache::set_json(
            self.tracker.cache().as_ref(),
            &key,
            members,
            self.membership_ttl(),
        )
    }

    /// Adds or refreshes a project in the credential's membership set. Returns the member count.
    pub fn register_project(&self, project_id: &str) -> Result<usize> {
        let mut members = self.load_membership()?;
        members.insert(project_id.to_string(), Utc::now());
        self.store_membership(&members)?;
        Ok(members.len())
    }

    /// Removes a project. Returns whether it was a member.
    pub fn unregister_project(&self, project_id: &str) -> Result<bool> {
        let mut members = self.load_membership()?;
        let removed = members.remove(project_id).is_some();
        if removed {
            self.store_membership(&members)?;
        }
        Ok(removed)
    }

    pub fn active_projects(&self) -> Result<Vec<String>> {
        Ok(self.load_membership()?.into_keys().collect())
    }

    pub fn project_count(&self) -> Result<usize> {
        Ok(self.load_membership()?.len())
    }

    pub fn quota_for(&self, project_id: &str) -> Result<ProjectQuota> {
        let project_count = self.project_count()?;
        let (_, remaining) = self.tracker.effective_budget()?;
        let consumption_percent = self.tracker.consumption_percent()?;
        let min_calls = self.tracker.settings().min_calls_per_project;

        let share = fair_share(remaining, project_count);
        let quota = ProjectQuota {
            credential_hash: self.tracker.credential_hash().to_string(),
            project_count,
            remaining,
            fair_share: share,
            allowed_calls: share.max(min_calls),
            can_poll: share >= min_calls,
            poll_multiplier: poll_multiplier(consumption_percent),
            consumption_percent,
        };

        tracing::debug!(
            "Quota for project {}: share {} of {} across {} project(s), multiplier {:.2}",
            project_id,
            quota.fair_share,
            remaining,
            project_count,
            quota.poll_multiplier
        );

        Ok(quota)
    }

    /// `base` stretched by the current poll multiplier.
    pub fn next_poll_after(&self, base: Duration) -> Result<Duration> {
        let multiplier = poll_multiplier(self.tracker.consumption_percent()?);
        Ok(base.mul_f64(multiplier))
    }

    /// Counts one upstream call against a project until the budget window resets.
    pub fn record_call(&self, project_id: &str) -> Result<i64> {
        let ttl = match self.tracker.snapshot()? {
            Some(snapshot) => (snapshot.resets_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_secs(1)),
            None => CALL_COUNTER_TTL,
        };
        self.tracker.cache().increment(
            &calls_key(self.tracker.credential_hash(), project_id),
            1,
            ttl,
        )
    }

    /// Calls counted against a project in the current window.
    pub fn calls_made(&self, project_id: &str) -> Result<i64> {
        let raw = self
            .tracker
            .cache()
            .get(&calls_key(self.tracker.credential_hash(), project_id))?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }
}

/// `floor(remaining / max(project_count, 1))`.
#[must_use]
pub fn fair_share(remaining: u32, project_count: usize) -> u32 {
    let divisor = u32::try_from(project_count.max(1)).unwrap_or(u32::MAX);
    remaining / divisor
}

/// Slowdown factor for polling at a given consumption percentage.
///
/// Piecewise linear: 1.0 below 50%, 1.0→2.0 up to 70%, 2.0→5.0 up to 85%,
/// then 5.0→10.0 reaching the cap at 100%.
#[must_use]
pub fn poll_multiplier(consumption_percent: f64) -> f64 {
    let p = consumption_percent.clamp(0.0, 100.0);
    let multiplier = if p < 50.0 {
        1.0
    } else if p < 70.0 {
        1.0 + (p - 50.0) / 20.0
    } else if p < 85.0 {
        2.0 + (p - 70.0) / 15.0 * 3.0
    } else {
        5.0 + (p - 85.0) / 15.0 * 5.0
    };
    multiplier.min(MAX_POLL_MULTIPLIER)
}
