//! Portfolio snapshot store.
//!
//! Snapshots are append-only and keyed by their own monotonic id. "Latest"
//! means highest id, never latest timestamp: callers may supply timestamps in
//! any order, and repeated timestamps are accepted.

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;
use crate::ledger::trades::MAX_PAGE;
use crate::types::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub timestamp: u64,
    /// Scaled portfolio value.
    pub total_value: i128,
    pub num_assets: u32,
    pub total_trades: u64,
    /// Cumulative return in bps.
    pub cumulative_return: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub snapshot_id: u64,
    pub timestamp: u64,
    pub total_value: i128,
    pub num_assets: u32,
    pub total_trades: u64,
    pub cumulative_return: i32,
}

impl LedgerState {
    pub(crate) fn plan_create_snapshot(
        &self,
        caller: &Identity,
        req: &SnapshotRequest,
    ) -> LedgerResult<PortfolioSnapshot> {
        self.authorize_operational(caller, &[Role::PaymentAgent])?;
        let snapshot_id = Self::next_id(self.snapshot_counter, "snapshot id")?;
        Ok(PortfolioSnapshot {
            snapshot_id,
            timestamp: req.timestamp,
            total_value: req.total_value,
            num_assets: req.num_assets,
            total_trades: req.total_trades,
            cumulative_return: req.cumulative_return,
        })
    }

    pub fn latest_snapshot(&self) -> LedgerResult<PortfolioSnapshot> {
        self.snapshots
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| LedgerError::not_found("snapshot", "latest"))
    }

    pub fn get_snapshot(&self, snapshot_id: u64) -> LedgerResult<PortfolioSnapshot> {
        self.snapshots
            .get(&snapshot_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("snapshot", snapshot_id))
    }

    pub fn list_snapshots(&self, start_id: u64, limit: usize) -> Vec<PortfolioSnapshot> {
        self.snapshots
            .range(start_id.max(1)..)
            .take(limit.min(MAX_PAGE))
            .map(|(_, s)| s.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::config::{Configuration, InitializeRequest};
    use crate::ledger::state::LedgerEvent;

    fn state() -> LedgerState {
        let mut state = LedgerState::default();
        let config = Configuration::from_request(InitializeRequest {
            admin: Identity::new("GADMIN"),
            trading_agent: Identity::new("GTRADER"),
            risk_agent: Identity::new("GRISK"),
            payment_agent: Identity::new("GPAY"),
            max_single_trade: 1_000,
        })
        .unwrap();
        state.apply(LedgerEvent::Initialized { config });
        state
    }

    fn create(state: &mut LedgerState, timestamp: u64) -> u64 {
        let req = SnapshotRequest {
            timestamp,
            total_value: 10_000 * 10_000_000,
            num_assets: 3,
            total_trades: 7,
            cumulative_return: 120,
        };
        let snapshot = state
            .plan_create_snapshot(&Identity::new("GPAY"), &req)
            .unwrap();
        let id = snapshot.snapshot_id;
        state.apply(LedgerEvent::SnapshotCreated { snapshot });
        id
    }

    #[test]
    fn latest_is_by_id_not_timestamp() {
        let mut state = state();
        create(&mut state, 300);
        create(&mut state, 100);
        let last = create(&mut state, 200);
        assert_eq!(last, 3);
        let latest = state.latest_snapshot().unwrap();
        assert_eq!(latest.snapshot_id, 3);
        assert_eq!(latest.timestamp, 200);
    }

    #[test]
    fn duplicate_timestamps_are_accepted() {
        let mut state = state();
        assert_eq!(create(&mut state, 500), 1);
        assert_eq!(create(&mut state, 500), 2);
        assert_eq!(state.list_snapshots(1, 10).len(), 2);
    }

    #[test]
    fn empty_store_has_no_latest() {
        let state = state();
        assert_eq!(state.latest_snapshot().unwrap_err().code(), "NOT_FOUND");
        assert!(state.get_snapshot(1).is_err());
    }

    #[test]
    fn only_payment_agent_creates() {
        let state = state();
        let req = SnapshotRequest {
            timestamp: 0,
            total_value: 0,
            num_assets: 0,
            total_trades: 0,
            cumulative_return: 0,
        };
        let err = state
            .plan_create_snapshot(&Identity::new("GRISK"), &req)
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
