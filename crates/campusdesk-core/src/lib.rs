//! CampusDesk session core.
//!
//! Decides whether the administrator front end has a logged-in user,
//! persists and validates the bearer credential, derives the session context
//! (tenant, role, branch, week, term, course) the rest of the front end reads,
//! and logs the session out when the credential expires.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, AuthBackend, HttpAuthBackend, LoginCredentials};
pub use auth::{
    CredentialStore, ErrorInfo, SessionAction, SessionError, SessionEvent, SessionManager,
    SessionState, UserProfile,
};
pub use config::{Config, StorageKind};
