use std::collections::HashMap;

use crate::error::Result;
use crate::store::Store;
use crate::types::{Agreement, Project, User};

/// Maps commit author identifiers onto the users of one project.
///
/// Candidates are the project owner plus every participant of the project's
/// active agreements. Lookups are case-insensitive and the first user to
/// claim an email or login keeps it.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    by_email: HashMap<String, String>,
    by_login: HashMap<String, String>,
    agreements: Vec<Agreement>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl IdentityResolver {
    pub fn for_project(store: &dyn Store, project: &Project) -> Result<Self> {
        let agreements = store.list_active_agreements(&project.id)?;

        let mut ids = vec![project.owner_id.clone()];
        for agreement in &agreements {
            for participant in &agreement.participant_ids {
                if !ids.contains(participant) {
                    ids.push(participant.clone());
                }
            }
        }

        // get_users does not promise an order; keep the owner first.
        let mut users = store.get_users(&ids)?;
        users.sort_by_key(|u| ids.iter().position(|id| *id == u.id));

        Ok(Self::from_parts(&users, agreements))
    }

    /// `agreements` must already be filtered to active ones, oldest first.
    #[must_use]
    pub fn from_parts(users: &[User], agreements: Vec<Agreement>) -> Self {
        let mut resolver = Self {
            agreements,
            ..Self::default()
        };
        for user in users {
            if let Some(email) = user.email.as_deref().filter(|e| !e.trim().is_empty()) {
                resolver
                    .by_email
                    .entry(normalize(email))
                    .or_insert_with(|| user.id.clone());
            }
            if let Some(login) = user.hosting_username.as_deref().filter(|l| !l.trim().is_empty()) {
                resolver
                    .by_login
                    .entry(normalize(login))
                    .or_insert_with(|| user.id.clone());
            }
        }
        resolver
    }

    /// Resolves an author: email first, then the API login, then the raw
    /// identifier read as a login.
    #[must_use]
    pub fn find_user_id(&self, identifier: &str, api_login: Option<&str>) -> Option<&str> {
        let identifier = normalize(identifier);
        self.by_email
            .get(&identifier)
            .or_else(|| api_login.and_then(|login| self.by_login.get(&normalize(login))))
            .or_else(|| self.by_login.get(&identifier))
            .map(String::as_str)
    }

    /// Oldest active agreement the user takes part in.
    #[must_use]
    pub fn agreement_for(&self, user_id: &str) -> Option<&Agreement> {
        self.agreements
            .iter()
            .find(|a| a.participant_ids.iter().any(|p| p == user_id))
    }
}
