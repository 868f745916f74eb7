//! Credential Store: the bearer credential and profile snapshot in storage.

use std::sync::Arc;

use tracing::{debug, warn};

use super::profile::UserProfile;
use super::storage::{KeyValueStore, StorageError};

/// Storage key of the bearer credential
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Storage key of the serialized `UserProfile`
pub const USER_PROFILE_KEY: &str = "userProfile";

pub const TENANT_ID_KEY: &str = "tenantId";
pub const USER_ID_KEY: &str = "userId";
pub const ROLE_KEY: &str = "role";
pub const BRANCH_ID_KEY: &str = "branchId";
pub const WEEK_ID_KEY: &str = "weekId";
pub const TERM_ID_KEY: &str = "termId";
pub const COURSE_ID_KEY: &str = "courseId";

/// Every key the credential store may write. `clear` removes all of them.
pub const SESSION_KEYS: [&str; 9] = [
    AUTH_TOKEN_KEY,
    USER_PROFILE_KEY,
    TENANT_ID_KEY,
    USER_ID_KEY,
    ROLE_KEY,
    BRANCH_ID_KEY,
    WEEK_ID_KEY,
    TERM_ID_KEY,
    COURSE_ID_KEY,
];

/// Holds the bearer credential and the profile snapshot in persistent
/// storage. Performs no validation of what it stores.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// The stored credential, or `None` if absent or unreadable
    pub fn get(&self) -> Option<String> {
        match self.storage.get(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        }
    }

    /// The stored profile, or `None` if absent, unreadable or corrupt
    pub fn profile(&self) -> Option<UserProfile> {
        let raw = match self.storage.get(USER_PROFILE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored profile");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Stored profile is corrupt");
                None
            }
        }
    }

    /// Persist the credential, the profile and its session-context keys.
    ///
    /// Context keys the profile does not carry are removed so a previous
    /// session's values cannot linger. The credential is written last, and if
    /// any step fails the previous contents are put back before the error is
    /// returned, so callers see either the old session or the new one.
    pub fn set(&self, token: &str, profile: &UserProfile) -> Result<(), StorageError> {
        let mut changes: Vec<(&str, Option<String>)> =
            vec![(USER_PROFILE_KEY, Some(serde_json::to_string(profile)?))];
        changes.extend(
            profile
                .context_entries()
                .into_iter()
                .map(|(key, value)| (key, Some(value))),
        );
        let stale: Vec<&str> = SESSION_KEYS
            .iter()
            .copied()
            .filter(|key| *key != AUTH_TOKEN_KEY && !changes.iter().any(|(k, _)| k == key))
            .collect();
        changes.extend(stale.into_iter().map(|key| (key, None)));
        changes.push((AUTH_TOKEN_KEY, Some(token.to_string())));

        let previous = self.snapshot()?;
        if let Err(e) = self.storage.apply(&changes) {
            self.restore(&previous);
            return Err(e);
        }
        debug!(keys = changes.len(), "Credential stored");
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<(&'static str, Option<String>)>, StorageError> {
        SESSION_KEYS
            .iter()
            .map(|key| -> Result<_, StorageError> { Ok((*key, self.storage.get(key)?)) })
            .collect()
    }

    /// Put back every session key that no longer matches `previous`
    fn restore(&self, previous: &[(&'static str, Option<String>)]) {
        let changes: Vec<(&str, Option<String>)> = previous
            .iter()
            .filter(|(key, value)| match self.storage.get(key) {
                Ok(current) => current != *value,
                Err(_) => true,
            })
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        if changes.is_empty() {
            return;
        }
        match self.storage.apply(&changes) {
            Ok(()) => debug!(keys = changes.len(), "Rolled back partial credential write"),
            Err(e) => warn!(error = %e, "Failed to roll back partial credential write"),
        }
    }

    /// Remove the credential, the profile and every session-context key
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_many(&SESSION_KEYS)?;
        debug!("Credential store cleared");
        Ok(())
    }
}
