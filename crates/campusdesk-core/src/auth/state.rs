//! Session state and the reducer that drives it.
//!
//! `SessionState` is never mutated in place: `reduce` returns a new `Arc`
//! for every transition that changes something, and the same `Arc` for
//! actions it does not recognize.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::profile::UserProfile;

/// User-displayable description of a failed login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionState {
    pub is_authenticated: bool,
    pub is_initialized: bool,
    pub is_loading: bool,
    pub error_message: Option<ErrorInfo>,
    pub user_profile: Option<UserProfile>,
}

/// Transitions of the session state machine.
///
/// Serialized as `{"type": "LOGIN_SUCCESS", ...}`; type names this build
/// does not know deserialize to `Unknown`, which leaves state untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionAction {
    #[serde(rename_all = "camelCase")]
    Initialize {
        is_authenticated: bool,
        #[serde(default)]
        user_profile: Option<UserProfile>,
    },
    LoginRequest,
    #[serde(rename_all = "camelCase")]
    LoginSuccess { user_profile: UserProfile },
    #[serde(rename_all = "camelCase")]
    LoginError { error_message: ErrorInfo },
    Logout,
    #[serde(other)]
    Unknown,
}

impl SessionAction {
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::Initialize { .. } => "INITIALIZE",
            SessionAction::LoginRequest => "LOGIN_REQUEST",
            SessionAction::LoginSuccess { .. } => "LOGIN_SUCCESS",
            SessionAction::LoginError { .. } => "LOGIN_ERROR",
            SessionAction::Logout => "LOGOUT",
            SessionAction::Unknown => "UNKNOWN",
        }
    }
}

pub fn reduce(state: &Arc<SessionState>, action: &SessionAction) -> Arc<SessionState> {
    let current = state.as_ref();
    let next = match action {
        SessionAction::Initialize {
            is_authenticated,
            user_profile,
        } => {
            // Authenticated without a profile is not a state we represent
            let user_profile = if *is_authenticated {
                user_profile.clone()
            } else {
                None
            };
            SessionState {
                is_initialized: true,
                is_authenticated: user_profile.is_some(),
                user_profile,
                ..current.clone()
            }
        }
        SessionAction::LoginRequest => SessionState {
            is_loading: true,
            ..current.clone()
        },
        SessionAction::LoginSuccess { user_profile } => SessionState {
            is_authenticated: true,
            is_loading: false,
            error_message: None,
            user_profile: Some(user_profile.clone()),
            ..current.clone()
        },
        SessionAction::LoginError { error_message } => SessionState {
            is_loading: false,
            error_message: Some(error_message.clone()),
            ..current.clone()
        },
        SessionAction::Logout => SessionState {
            is_authenticated: false,
            is_loading: false,
            user_profile: None,
            ..current.clone()
        },
        SessionAction::Unknown => return Arc::clone(state),
    };
    Arc::new(next)
}
