//! Engines that move branch and commit history from the hosting API into the store.
//!
//! Every upstream call made here is preceded by a [`RunBudget`] admission
//! check. A denial ends the engine early with a partial result and a flag
//! telling the caller to resume later; it is never reported as an error.
//!
//! [`RunBudget`]: crate::budget::RunBudget

mod branches;
mod commits;
mod enrichment;
mod identity;

pub use branches::{BranchDiscovery, DiscoveryReport};
pub use commits::{CommitSync, SyncOutcome, SyncReport};
pub use enrichment::{EnrichmentReport, StatsEnrichment};
pub use identity::IdentityResolver;

use crate::error::{Error, Result};
use crate::hosting::HostingError;
use crate::store::Store;
use crate::types::Project;

pub(crate) fn load_project(store: &dyn Store, project_id: &str) -> Result<Project> {
    store
        .get_project(project_id)?
        .ok_or_else(|| Error::NotFound(format!("project {project_id}")))
}

/// How an engine reacts to a failed upstream call inside a batch.
pub(crate) enum Failure {
    /// Budget ran out upstream; stop and resume later.
    Exhausted,
    /// Log, count and move on to the next item.
    Skip(HostingError),
}

/// Authorization failures abort the run; everything else is batch-local.
pub(crate) fn triage(err: HostingError) -> Result<Failure> {
    match err {
        e if e.is_auth() => Err(e.into()),
        HostingError::RateLimited { .. } => Ok(Failure::Exhausted),
        e => Ok(Failure::Skip(e)),
    }
}
