//! One-shot expiry timer for the current credential.
//!
//! The scheduler owns a single timer slot. Arming replaces (and aborts)
//! whatever was there; a timer that fires after it has been replaced finds
//! another generation in the slot and does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::token::decode_claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A timer is pending and will fire after `delay`
    Armed { generation: u64, delay: Duration },
    /// The credential had already expired; the callback ran immediately
    AlreadyExpired,
    /// The credential could not be decoded; nothing was armed
    Undecodable,
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<ArmedTimer>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ArmedTimer>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ExpiryScheduler {
    slot: Slot,
    next_generation: AtomicU64,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm a timer that calls `on_expire` once the credential's `exp` passes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, token: &str, on_expire: F) -> ArmOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        self.arm_at(token, Utc::now(), on_expire)
    }

    fn arm_at<F>(&self, token: &str, now: DateTime<Utc>, on_expire: F) -> ArmOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let claims = match decode_claims(token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Cannot schedule expiry for undecodable credential");
                return ArmOutcome::Undecodable;
            }
        };

        let delay_ms = claims.millis_until_expiry(now);
        if delay_ms <= 0 {
            debug!(exp = claims.exp, "Credential already expired");
            on_expire();
            return ArmOutcome::AlreadyExpired;
        }
        let delay = Duration::from_millis(delay_ms as u64);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.take() {
            debug!(generation = previous.generation, "Replacing armed expiry timer");
            previous.handle.abort();
        }

        let task_slot = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let owns_slot = {
                let mut slot = lock(&task_slot);
                match slot.as_ref() {
                    Some(armed) if armed.generation == generation => {
                        slot.take();
                        true
                    }
                    _ => false,
                }
            };

            if owns_slot {
                debug!(generation, "Expiry timer fired");
                on_expire();
            } else {
                debug!(generation, "Superseded expiry timer fired, ignoring");
            }
        });

        *slot = Some(ArmedTimer { generation, handle });
        debug!(generation, delay_ms, "Expiry timer armed");
        ArmOutcome::Armed { generation, delay }
    }

    /// Disarm the pending timer, if any. A timer that has not fired yet never will.
    pub fn cancel(&self) {
        if let Some(armed) = lock(&self.slot).take() {
            armed.handle.abort();
            debug!(generation = armed.generation, "Expiry timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Generation of the pending timer, if any
    pub fn armed_generation(&self) -> Option<u64> {
        lock(&self.slot).as_ref().map(|armed| armed.generation)
    }
}

impl Default for ExpiryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_token;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn exp_in(secs: i64) -> i64 {
        Utc::now().timestamp() + secs
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_expiry() {
        let scheduler = ExpiryScheduler::new();
        let (fired, on_expire) = counter();

        let outcome = scheduler.arm(&test_token(exp_in(2)), on_expire);
        assert!(matches!(outcome, ArmOutcome::Armed { .. }));
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_calls_back_immediately() {
        let scheduler = ExpiryScheduler::new();
        let (fired, on_expire) = counter();

        let outcome = scheduler.arm(&test_token(exp_in(-5)), on_expire);

        assert_eq!(outcome, ArmOutcome::AlreadyExpired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_exactly_now_is_expired() {
        let scheduler = ExpiryScheduler::new();
        let (fired, on_expire) = counter();
        let now = Utc::now();

        let outcome = scheduler.arm_at(&test_token(now.timestamp()), now, on_expire);

        // exp has second precision, so `now` is at or past it
        assert_eq!(outcome, ArmOutcome::AlreadyExpired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_credential_is_noop() {
        let scheduler = ExpiryScheduler::new();
        let (fired, on_expire) = counter();

        assert_eq!(scheduler.arm("not-a-jwt", on_expire), ArmOutcome::Undecodable);
        assert!(!scheduler.is_armed());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = ExpiryScheduler::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();

        scheduler.arm(&test_token(exp_in(2)), first_cb);
        let ArmOutcome::Armed { generation, .. } = scheduler.arm(&test_token(exp_in(5)), second_cb)
        else {
            panic!("second timer should be armed");
        };
        assert_eq!(scheduler.armed_generation(), Some(generation));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let scheduler = ExpiryScheduler::new();
        let (fired, on_expire) = counter();

        scheduler.arm(&test_token(exp_in(2)), on_expire);
        scheduler.cancel();
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelling an empty slot is fine
        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_timer() {
        let (fired, on_expire) = counter();
        {
            let scheduler = ExpiryScheduler::new();
            scheduler.arm(&test_token(exp_in(2)), on_expire);
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generations_increase() {
        let scheduler = ExpiryScheduler::new();
        let (_, a) = counter();
        let (_, b) = counter();

        let ArmOutcome::Armed { generation: g1, .. } = scheduler.arm(&test_token(exp_in(60)), a) else {
            panic!("expected armed");
        };
        let ArmOutcome::Armed { generation: g2, .. } = scheduler.arm(&test_token(exp_in(60)), b) else {
            panic!("expected armed");
        };
        assert!(g2 > g1);
    }
}
