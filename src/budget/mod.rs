//! Rate budget bookkeeping for a hosting credential.
//!
//! - [`RateBudgetTracker`]: last quota snapshot and admission control.
//! - [`QuotaAllocator`]: fair division across projects sharing the credential.
//! - [`RunBudget`]: the gate a single sync run consults before each upstream call.

mod allocator;
mod credential;
mod tracker;

use std::sync::atomic::{AtomicU32, Ordering};

pub use allocator::{MAX_POLL_MULTIPLIER, ProjectQuota, QuotaAllocator, fair_share, poll_multiplier};
pub use credential::Credential;
pub use tracker::{RateBudgetTracker, RateLimitHeaders};

use crate::error::Result;

/// Per-invocation admission gate.
///
/// A call is admitted when the tracker's safety margin allows it and, for
/// runs bound to a project, the run has not spent its fair-share allowance.
pub struct RunBudget {
    tracker: RateBudgetTracker,
    accounting: Option<(QuotaAllocator, String)>,
    cap: Option<u32>,
    spent: AtomicU32,
}

impl RunBudget {
    /// Gate limited only by the tracker's threshold.
    #[must_use]
    pub fn unbounded(tracker: RateBudgetTracker) -> Self {
        Self {
            tracker,
            accounting: None,
            cap: None,
            spent: AtomicU32::new(0),
        }
    }

    /// Gate capped at the project's current allowance, counting calls against it.
    pub fn for_project(allocator: &QuotaAllocator, project_id: &str) -> Result<Self> {
        let quota = allocator.quota_for(project_id)?;
        Ok(Self {
            tracker: allocator.tracker().clone(),
            accounting: Some((allocator.clone(), project_id.to_string())),
            cap: Some(quota.allowed_calls),
            spent: AtomicU32::new(0),
        })
    }

    #[must_use]
    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap = Some(cap);
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &RateBudgetTracker {
        &self.tracker
    }

    #[must_use]
    pub fn spent(&self) -> u32 {
        self.spent.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn cap(&self) -> Option<u32> {
        self.cap
    }

    /// Whether `cost` more calls would be admitted, without reserving them.
    pub fn has_headroom(&self, cost: u32) -> Result<bool> {
        if let Some(cap) = self.cap {
            if self.spent().saturating_add(cost) > cap {
                return Ok(false);
            }
        }
        self.tracker.admission_check(cost)
    }

    /// Reserves `cost` calls if admitted. A `false` return is a normal
    /// "stop now, resume later" signal, not an error.
    pub fn try_admit(&self, cost: u32) -> Result<bool> {
        if let Some(cap) = self.cap {
            if self.spent().saturating_add(cost) > cap {
                tracing::debug!("Run allowance of {cap} call(s) used up");
                return Ok(false);
            }
        }

        if !self.tracker.admission_check(cost)? {
            tracing::debug!(
                "Admission denied for credential {}: reserve threshold reached",
                self.tracker.credential_hash()
            );
            return Ok(false);
        }

        self.spent.fetch_add(cost, Ordering::AcqRel);
        if let Some((allocator, project_id)) = &self.accounting {
            for _ in 0..cost {
                allocator.record_call(project_id)?;
            }
        }
        Ok(true)
    }
}
