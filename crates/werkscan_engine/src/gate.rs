//! Settle-once gate for a scan session.
//!
//! One monotonic flag pair enforces the session's core guarantees: at most
//! one terminal outcome per attempt, and discard-on-close for completions
//! that resume after the caller asked to stop. Clone is cheap and shares
//! state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    settled: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the session has claimed its terminal outcome or was closed.
    /// Checked at every loop iteration and before honoring any resumed
    /// completion.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// True when the caller explicitly requested close.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Claim the single terminal outcome. Returns true for exactly one
    /// caller per session.
    pub fn try_settle(&self) -> bool {
        let won = self
            .settled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    /// Request close. Idempotent; the closed flag is monotonic. Returns true
    /// if this call claimed the terminal outcome (i.e. the session had not
    /// settled yet).
    pub fn close(&self) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        self.try_settle()
    }

    /// Wait until the gate settles. Used by strategy loops to race platform
    /// operations against cancellation.
    pub async fn wait(&self) {
        loop {
            if self.is_settled() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_is_claimed_exactly_once() {
        let gate = SessionGate::new();
        assert!(gate.try_settle());
        assert!(!gate.try_settle());
        assert!(gate.is_settled());
        assert!(!gate.is_closed());
    }

    #[test]
    fn close_is_idempotent_and_monotonic() {
        let gate = SessionGate::new();
        assert!(gate.close());
        assert!(!gate.close());
        assert!(gate.is_closed());
        assert!(gate.is_settled());
    }

    #[test]
    fn close_after_settle_claims_nothing() {
        let gate = SessionGate::new();
        assert!(gate.try_settle());
        assert!(!gate.close());
        assert!(gate.is_closed());
    }

    #[tokio::test]
    async fn wait_wakes_on_close() {
        let gate = SessionGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::task::yield_now().await;
        gate.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait() did not wake on close")
            .unwrap();
    }
}
