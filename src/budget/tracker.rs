use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::credential::{Credential, snapshot_key};
use crate::cache::{self, SharedCache};
use crate::config::BudgetSettings;
use crate::error::Result;
use crate::types::RateBudgetSnapshot;

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Quota figures carried by one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

impl RateLimitHeaders {
    /// Reads the `x-ratelimit-*` headers. Returns `None` unless all three are present and numeric.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| -> Option<i64> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        };

        let limit = u32::try_from(number(HEADER_LIMIT)?).ok()?;
        let remaining = u32::try_from(number(HEADER_REMAINING)?).ok()?;
        let resets_at = DateTime::from_timestamp(number(HEADER_RESET)?, 0)?;

        Some(Self {
            limit,
            remaining,
            resets_at,
        })
    }
}

/// Last known quota for one credential, held in the shared cache.
///
/// Every question re-reads the cache, so concurrent runs always act on the
/// freshest snapshot any of them recorded. Snapshots older than the
/// configured TTL are ignored.
#[derive(Clone)]
pub struct RateBudgetTracker {
    cache: Arc<dyn SharedCache>,
    credential_hash: String,
    authenticated: bool,
    settings: BudgetSettings,
}

impl RateBudgetTracker {
    pub fn new(cache: Arc<dyn SharedCache>, credential: &Credential, settings: BudgetSettings) -> Self {
        Self {
            cache,
            credential_hash: credential.hash().to_string(),
            authenticated: credential.is_authenticated(),
            settings,
        }
    }

    #[must_use]
    pub fn credential_hash(&self) -> &str {
        &self.credential_hash
    }

    #[must_use]
    pub fn settings(&self) -> &BudgetSettings {
        &self.settings
    }

    pub(crate) fn cache(&self) -> &Arc<dyn SharedCache> {
        &self.cache
    }

    /// Hourly limit assumed when no fresh snapshot exists.
    #[must_use]
    pub fn default_limit(&self) -> u32 {
        if self.authenticated {
            self.settings.authenticated_limit
        } else {
            self.settings.unauthenticated_limit
        }
    }

    pub fn record(&self, headers: &RateLimitHeaders) -> Result<RateBudgetSnapshot> {
        let snapshot = RateBudgetSnapshot {
            limit: headers.limit,
            remaining: headers.remaining.min(headers.limit),
            resets_at: headers.resets_at,
            recorded_at: Utc::now(),
        };
        cache::set_json(
            self.cache.as_ref(),
            &snapshot_key(&self.credential_hash),
            &snapshot,
            self.settings.snapshot_ttl(),
        )?;
        Ok(snapshot)
    }

    /// Parses and records response headers. Responses without rate headers are ignored.
    pub fn record_headers(&self, headers: &HeaderMap) -> Result<Option<RateBudgetSnapshot>> {
        RateLimitHeaders::parse(headers)
            .map(|parsed| self.record(&parsed))
            .transpose()
    }

    /// The most recent snapshot, if it is still within its TTL.
    pub fn snapshot(&self) -> Result<Option<RateBudgetSnapshot>> {
        let snapshot: Option<RateBudgetSnapshot> =
            cache::get_json(self.cache.as_ref(), &snapshot_key(&self.credential_hash))?;
        let ttl = chrono::Duration::from_std(self.settings.snapshot_ttl())
            .unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        Ok(snapshot.filter(|s| {
            s.recorded_at
                .checked_add_signed(ttl)
                .is_none_or(|expires| expires > now)
        }))
    }

    /// `(limit, remaining)` from the fresh snapshot, or the class default at full budget.
    pub fn effective_budget(&self) -> Result<(u32, u32)> {
        Ok(match self.snapshot()? {
            Some(s) => (s.limit, s.remaining),
            None => (self.default_limit(), self.default_limit()),
        })
    }

    /// Remaining calls that must stay untouched: `ceil(limit * (100 - stop_at) / 100)`.
    #[must_use]
    pub fn threshold_remaining(&self, limit: u32) -> u32 {
        let reserve_percent = 100 - u64::from(self.settings.stop_at_percent.min(100));
        let reserved = (u64::from(limit) * reserve_percent).div_ceil(100);
        u32::try_from(reserved).unwrap_or(u32::MAX)
    }

    /// Whether `cost` more calls keep the remaining budget at or above the reserve.
    /// Without a fresh snapshot the answer is optimistic.
    pub fn admission_check(&self, cost: u32) -> Result<bool> {
        let Some(snapshot) = self.snapshot()? else {
            return Ok(true);
        };
        let after = i64::from(snapshot.remaining) - i64::from(cost);
        Ok(after >= i64::from(self.threshold_remaining(snapshot.limit)))
    }

    /// Seconds until the budget resets, plus one; zero while calls are still admitted.
    pub fn wait_time(&self) -> Result<u64> {
        if self.admission_check(1)? {
            return Ok(0);
        }
        let Some(snapshot) = self.snapshot()? else {
            return Ok(0);
        };
        let until_reset = (snapshot.resets_at - Utc::now()).num_seconds().max(0);
        Ok(until_reset.unsigned_abs() + 1)
    }

    pub fn consumption_percent(&self) -> Result<f64> {
        Ok(self
            .snapshot()?
            .map_or(0.0, |s| s.consumption_percent()))
    }

    pub fn approaching_threshold(&self) -> Result<bool> {
        let consumed = self.consumption_percent()?;
        Ok(consumed >= f64::from(self.settings.warn_at_percent)
            && consumed < f64::from(self.settings.stop_at_percent))
    }

    pub fn threshold_exceeded(&self) -> Result<bool> {
        Ok(self.consumption_percent()? >= f64::from(self.settings.stop_at_percent))
    }
}
