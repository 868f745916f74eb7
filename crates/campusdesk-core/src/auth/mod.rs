//! Authentication session management.
//!
//! This module provides:
//! - `CredentialStore`: the bearer credential and profile snapshot in storage
//! - `token`: credential decoding and expiry validation
//! - `ExpiryScheduler`: the single timer that logs the session out at expiry
//! - `SessionState` / `reduce`: the session state machine
//! - `SessionManager`: the façade views call (`initialize`, `login`, `logout`)

pub mod credentials;
pub mod error;
pub mod profile;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;

pub use credentials::CredentialStore;
pub use error::SessionError;
pub use profile::UserProfile;
pub use scheduler::{ArmOutcome, ExpiryScheduler};
pub use session::{SessionEvent, SessionManager, DEFAULT_LANDING_PATH};
pub use state::{reduce, ErrorInfo, SessionAction, SessionState};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError};
