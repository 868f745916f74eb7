//! The session façade: the only entry point views use to log in, log out and
//! restore a session at startup.
//!
//! `SessionManager` ties the credential store, validator, expiry scheduler
//! and state machine together. It is cheap to clone; all clones share one
//! session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::credentials::CredentialStore;
use super::error::SessionError;
use super::profile::UserProfile;
use super::scheduler::{ArmOutcome, ExpiryScheduler};
use super::state::{reduce, SessionAction, SessionState};
use super::token;
use crate::api::{AuthBackend, LoginCredentials};

/// Where the presentation layer is sent after logout
pub const DEFAULT_LANDING_PATH: &str = "/login";

/// Side effects the presentation layer reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential's validity window elapsed; a logout follows
    Expired,
    /// Navigate to an unauthenticated route
    Navigate { path: String },
}

/// Why a stored session could not be restored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreMiss {
    NoCredential,
    InvalidCredential,
    MissingProfile,
}

struct Inner {
    store: CredentialStore,
    backend: Arc<dyn AuthBackend>,
    scheduler: ExpiryScheduler,
    state_tx: watch::Sender<Arc<SessionState>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    landing_path: String,
    // Bumped by every login attempt and logout; a login response is only
    // committed if no newer attempt or logout has happened since
    attempts: AtomicU64,
    // Bumped whenever the active session is replaced; expiry timers carry
    // the epoch they were armed for
    session_epoch: AtomicU64,
    // Serializes the commit phase of initialize/login/logout
    commit: Mutex<()>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager and the receiving end of its event stream.
    pub fn new(
        store: CredentialStore,
        backend: Arc<dyn AuthBackend>,
        landing_path: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (state_tx, _) = watch::channel(Arc::new(SessionState::default()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            inner: Arc::new(Inner {
                store,
                backend,
                scheduler: ExpiryScheduler::new(),
                state_tx,
                events_tx,
                landing_path: landing_path.into(),
                attempts: AtomicU64::new(0),
                session_epoch: AtomicU64::new(0),
                commit: Mutex::new(()),
            }),
        };
        (manager, events_rx)
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Current session state
    pub fn state(&self) -> Arc<SessionState> {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionState>> {
        self.inner.state_tx.subscribe()
    }

    /// Whether an expiry timer is currently armed
    pub fn expiry_armed(&self) -> bool {
        self.inner.scheduler.is_armed()
    }

    /// Apply a transition to the state machine.
    /// Actions that change nothing do not notify subscribers.
    pub(crate) fn dispatch(&self, action: SessionAction) {
        self.inner.state_tx.send_if_modified(|state| {
            let next = reduce(state, &action);
            if Arc::ptr_eq(&next, state) {
                debug!(action = action.name(), "Ignoring unrecognized session action");
                return false;
            }
            debug!(action = action.name(), "Session transition");
            *state = next;
            true
        });
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Restore a stored session, if there is a valid one.
    ///
    /// Always leaves the state machine initialized; any problem with the
    /// stored data resolves to a logged-out state without an error message.
    pub async fn initialize(&self) -> Arc<SessionState> {
        let _commit = self.inner.commit.lock().await;
        let epoch = self.inner.session_epoch.load(Ordering::SeqCst);

        match self.restore(epoch) {
            Ok(profile) => {
                info!(user_id = %profile.user_id, role = %profile.role, "Session restored");
                self.dispatch(SessionAction::Initialize {
                    is_authenticated: true,
                    user_profile: Some(profile),
                });
            }
            Err(miss) => {
                debug!(?miss, "No session to restore");
                // Expiries already queued for the dropped session must not
                // log out a second time
                self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
                self.inner.scheduler.cancel();
                if miss != RestoreMiss::NoCredential {
                    if let Err(e) = self.inner.store.clear() {
                        warn!(error = %e, "Failed to clear stale session");
                    }
                }
                self.dispatch(SessionAction::Initialize {
                    is_authenticated: false,
                    user_profile: None,
                });
            }
        }

        self.state()
    }

    fn restore(&self, epoch: u64) -> Result<UserProfile, RestoreMiss> {
        let token = self.inner.store.get().ok_or(RestoreMiss::NoCredential)?;
        if !token::is_valid(&token) {
            return Err(RestoreMiss::InvalidCredential);
        }
        let profile = self.inner.store.profile().ok_or(RestoreMiss::MissingProfile)?;
        self.arm_expiry(&token, epoch);
        Ok(profile)
    }

    // =========================================================================
    // Login / Logout
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// On failure the state records the error and neither the credential
    /// store nor the expiry timer is touched. If a logout or another login
    /// happens while the request is in flight, the response is discarded and
    /// `SessionError::Superseded` is returned.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<UserProfile, SessionError> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatch(SessionAction::LoginRequest);
        info!(username = %credentials.username, "Login requested");

        let response = self.inner.backend.authenticate(credentials).await;

        let _commit = self.inner.commit.lock().await;
        if self.inner.attempts.load(Ordering::SeqCst) != attempt {
            warn!(attempt, "Discarding superseded login response");
            return Err(SessionError::Superseded);
        }

        let outcome = response
            .map_err(SessionError::from)
            .and_then(|payload| self.accept_login(&payload));

        match outcome {
            Ok((token, profile)) => {
                let epoch = self.inner.session_epoch.fetch_add(1, Ordering::SeqCst) + 1;
                self.arm_expiry(&token, epoch);
                info!(user_id = %profile.user_id, role = %profile.role, "Login successful");
                self.dispatch(SessionAction::LoginSuccess {
                    user_profile: profile.clone(),
                });
                Ok(profile)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.dispatch(SessionAction::LoginError {
                    error_message: e.to_error_info(),
                });
                Err(e)
            }
        }
    }

    /// Validate a login payload and persist the session it describes
    fn accept_login(&self, payload: &Value) -> Result<(String, UserProfile), SessionError> {
        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::InvalidResponse("token is missing or not a string".into()))?;

        let claims = token::decode_claims(token)
            .map_err(|e| SessionError::InvalidCredential(e.to_string()))?;
        if !token::is_valid(token) {
            return Err(SessionError::InvalidCredential(format!(
                "credential expired at {}",
                claims.exp
            )));
        }

        let profile = UserProfile::from_login_response(payload)
            .map_err(|e| SessionError::InvalidResponse(format!("profile: {}", e)))?;

        self.inner.store.set(token, &profile)?;
        Ok((token.to_string(), profile))
    }

    /// End the session: disarm the expiry timer, clear stored session data
    /// and send the presentation layer to the landing route.
    pub async fn logout(&self) {
        let _commit = self.inner.commit.lock().await;
        self.logout_locked();
    }

    fn logout_locked(&self) {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.scheduler.cancel();

        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }

        self.dispatch(SessionAction::Logout);
        info!("Logged out");
        self.emit(SessionEvent::Navigate {
            path: self.inner.landing_path.clone(),
        });
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    fn arm_expiry(&self, token: &str, epoch: u64) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let outcome = self.inner.scheduler.arm(token, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SessionManager { inner };
            tokio::spawn(async move { manager.expire(epoch).await });
        });

        match outcome {
            ArmOutcome::Armed { delay, .. } => {
                debug!(secs = delay.as_secs(), "Session expiry scheduled");
            }
            ArmOutcome::AlreadyExpired => debug!("Credential expired before it could be scheduled"),
            ArmOutcome::Undecodable => {}
        }
    }

    /// Timer path into logout. Ignored if the session it was armed for has
    /// since been replaced.
    async fn expire(&self, epoch: u64) {
        let _commit = self.inner.commit.lock().await;
        if self.inner.session_epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "Ignoring expiry of a replaced session");
            return;
        }
        info!("Session expired");
        self.emit(SessionEvent::Expired);
        self.logout_locked();
    }

    fn emit(&self, event: SessionEvent) {
        if self.inner.events_tx.send(event).is_err() {
            debug!("No listener for session events");
        }
    }
}
