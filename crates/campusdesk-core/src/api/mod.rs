//! REST API access for the CampusDesk backend.
//!
//! Only the login request lives here. Everything else the administrative
//! views fetch goes through their own clients.

pub mod client;
pub mod error;

pub use client::{AuthBackend, HttpAuthBackend, LoginCredentials};
pub use error::ApiError;
