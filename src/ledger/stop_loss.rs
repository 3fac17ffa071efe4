//! Dynamic stop-loss registry: one overwritable record per asset, owned by the
//! risk agent. Absence of a record means no dynamic stop-loss is active.

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;
use crate::types::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLossRequest {
    /// Threshold in bps.
    pub stop_loss_bps: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicStopLossConfig {
    pub asset: String,
    pub stop_loss_bps: i32,
    pub enabled: bool,
    pub last_updated: u64,
}

impl LedgerState {
    pub(crate) fn plan_set_stop_loss(
        &self,
        caller: &Identity,
        asset: &str,
        req: &StopLossRequest,
        now: u64,
    ) -> LedgerResult<DynamicStopLossConfig> {
        self.authorize_operational(caller, &[Role::RiskAgent])?;
        Ok(DynamicStopLossConfig {
            asset: asset.to_string(),
            stop_loss_bps: req.stop_loss_bps,
            enabled: req.enabled,
            last_updated: now,
        })
    }

    pub fn get_stop_loss(&self, asset: &str) -> LedgerResult<DynamicStopLossConfig> {
        self.stop_losses
            .get(asset)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("stop-loss config", asset))
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

    #[test]
    fn later_settings_overwrite_earlier_ones() {
        let mut state = state();
        let risk = Identity::new("GRISK");
        for (bps, enabled, now) in [(500, true, 10), (250, false, 20)] {
            let config = state
                .plan_set_stop_loss(&risk, "BTC", &StopLossRequest { stop_loss_bps: bps, enabled }, now)
                .unwrap();
            state.apply(LedgerEvent::StopLossSet { config });
        }
        let current = state.get_stop_loss("BTC").unwrap();
        assert_eq!(current.stop_loss_bps, 250);
        assert!(!current.enabled);
        assert_eq!(current.last_updated, 20);
        assert_eq!(state.stop_losses.len(), 1);
    }

    #[test]
    fn payment_agent_cannot_set_stop_loss() {
        let state = state();
        let req = StopLossRequest {
            stop_loss_bps: 100,
            enabled: true,
        };
        let err = state
            .plan_set_stop_loss(&Identity::new("GPAY"), "ETH", &req, 0)
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert!(state.get_stop_loss("ETH").is_err());
    }
}
