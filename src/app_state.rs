// =============================================================================
// Central Application State — Treasury Ledger service
// =============================================================================
//
// Everything an HTTP handler needs, shared via `Arc<AppState>`:
//   - the ledger itself (serializes its own commands)
//   - the keyring used to authenticate callers
//   - a replay guard remembering recently accepted request signatures
//   - a version counter bumped on every committed command
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ledger::{Clock, TreasuryLedger};
use crate::settings::ServiceSettings;
use crate::types::Identity;

// =============================================================================
// Replay guard
// =============================================================================

/// Signatures accepted within the skew window. A signature seen twice inside
/// the window is a replay.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: Mutex<HashMap<String, u64>>,
}

impl ReplayGuard {
    /// Record `signature` (request timestamp `ts`). Returns false if it was
    /// already recorded. Entries older than `now - window` are evicted first.
    pub fn check_and_record(&self, signature: &str, ts: u64, now: u64, window: u64) -> bool {
        let mut seen = self.seen.lock();
        let horizon = now.saturating_sub(window);
        seen.retain(|_, at| *at >= horizon);
        if seen.contains_key(signature) {
            return false;
        }
        seen.insert(signature.to_string(), ts);
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    pub ledger: Arc<TreasuryLedger>,
    pub clock: Arc<dyn Clock>,

    /// Identity -> shared HMAC secret.
    keyring: HashMap<Identity, String>,
    pub max_clock_skew_secs: u64,
    pub replay_guard: ReplayGuard,

    /// Bumped after every successful command.
    state_version: AtomicU64,
}

impl AppState {
    pub fn new(ledger: Arc<TreasuryLedger>, clock: Arc<dyn Clock>, settings: &ServiceSettings) -> Self {
        let keyring = settings
            .keys
            .iter()
            .map(|(id, secret)| (Identity::new(id.clone()), secret.clone()))
            .collect();
        Self {
            ledger,
            clock,
            keyring,
            max_clock_skew_secs: settings.max_clock_skew_secs,
            replay_guard: ReplayGuard::default(),
            state_version: AtomicU64::new(0),
        }
    }

    pub fn secret_for(&self, identity: &Identity) -> Option<&str> {
        self.keyring.get(identity).map(String::as_str)
    }

    /// Returns the previous value.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::clock::ManualClock;

    #[test]
    fn replay_guard_rejects_duplicates_inside_window() {
        let guard = ReplayGuard::default();
        assert!(guard.check_and_record("abc", 100, 100, 30));
        assert!(!guard.check_and_record("abc", 100, 110, 30));
        assert!(guard.check_and_record("def", 110, 110, 30));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn replay_guard_evicts_expired_entries() {
        let guard = ReplayGuard::default();
        assert!(guard.check_and_record("abc", 100, 100, 30));
        assert!(guard.check_and_record("def", 200, 200, 30));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn keyring_and_version() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at(0));
        let mut settings = ServiceSettings::default();
        settings.keys.insert("GADMIN".into(), "s".into());
        let state = AppState::new(
            Arc::new(TreasuryLedger::in_memory(clock.clone())),
            clock,
            &settings,
        );
        assert_eq!(state.secret_for(&Identity::new("GADMIN")), Some("s"));
        assert_eq!(state.secret_for(&Identity::new("GEVE")), None);
        assert_eq!(state.increment_version(), 0);
        assert_eq!(state.current_state_version(), 1);
    }
}
