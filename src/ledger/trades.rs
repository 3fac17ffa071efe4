// =============================================================================
// Trade ledger — append-only history of executed trades
// =============================================================================
//
// Trade ids start at 1 and never skip, so the counter always equals the
// number of records written. Records are immutable once committed.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;
use crate::types::{Identity, Role, TradeAction};

/// Largest page returned by the listing queries.
pub const MAX_PAGE: usize = 500;

/// Execution confirmation from the payment agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub signal_id: u64,
    pub asset: String,
    pub action: TradeAction,
    /// Scaled amount.
    pub amount: i128,
    /// Scaled execution price.
    pub price: i128,
    pub strategy: String,
    /// Signed scaled realized P&L.
    #[serde(default)]
    pub profit_loss: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: u64,
    pub signal_id: u64,
    pub asset: String,
    pub action: TradeAction,
    pub amount: i128,
    pub price: i128,
    pub strategy: String,
    pub executed_at: u64,
    pub profit_loss: i128,
}

impl LedgerState {
    /// Build the next record. The amount is not re-checked against
    /// `max_single_trade`; a trade against a known signal is bounded by the
    /// approved amount instead.
    pub(crate) fn plan_record_trade(
        &self,
        caller: &Identity,
        req: TradeRequest,
        now: u64,
    ) -> LedgerResult<(TradeRecord, bool)> {
        self.authorize_operational(caller, &[Role::PaymentAgent])?;
        let consumes_signal = self.check_signal_consumable(&req)?;
        let trade_id = Self::next_id(self.trade_counter, "trade id")?;

        let record = TradeRecord {
            trade_id,
            signal_id: req.signal_id,
            asset: req.asset,
            action: req.action,
            amount: req.amount,
            price: req.price,
            strategy: req.strategy,
            executed_at: now,
            profit_loss: req.profit_loss,
        };
        Ok((record, consumes_signal))
    }

    pub fn get_trade(&self, trade_id: u64) -> LedgerResult<TradeRecord> {
        if trade_id == 0 || trade_id > self.trade_counter {
            return Err(LedgerError::not_found("trade", trade_id));
        }
        self.trades
            .get(&trade_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("trade", trade_id))
    }

    pub fn total_trades(&self) -> u64 {
        self.trade_counter
    }

    /// Records with id >= `start_id`, oldest first.
    pub fn list_trades(&self, start_id: u64, limit: usize) -> Vec<TradeRecord> {
        self.trades
            .range(start_id.max(1)..)
            .take(limit.min(MAX_PAGE))
            .map(|(_, r)| r.clone())
            .collect()
    }
}
