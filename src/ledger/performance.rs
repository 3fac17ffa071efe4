// =============================================================================
// Strategy performance aggregator
// =============================================================================
//
// One record per strategy name, updated in place on every reported trade.
// The average return is the running mean `cumulative_return / total_trades`
// computed with integer division, which truncates toward zero: a mean of
// 33.5 bps is reported as 33, and -33.5 bps as -33. The exact sum is kept in
// `cumulative_return`, so truncation never compounds across updates.
//
// The Sharpe ratio is reported by the caller and stored verbatim.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;
use crate::types::{Identity, Role};

/// Outcome of one trade for a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceUpdate {
    pub is_winning_trade: bool,
    /// Signed scaled profit.
    pub profit: i128,
    /// Trade return in bps.
    pub return_bps: i32,
    /// Sharpe ratio scaled by 100, computed off-chain. `None` keeps the
    /// stored value.
    #[serde(default)]
    pub sharpe_ratio: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub total_profit: i128,
    /// Sum of all reported returns in bps.
    pub cumulative_return: i64,
    /// Truncated running mean of reported returns in bps.
    pub average_return: i32,
    pub sharpe_ratio: i32,
    pub last_updated: u64,
}

impl StrategyPerformance {
    fn empty(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            total_trades: 0,
            winning_trades: 0,
            total_profit: 0,
            cumulative_return: 0,
            average_return: 0,
            sharpe_ratio: 0,
            last_updated: 0,
        }
    }

    /// Fold one trade into a copy of this record.
    pub fn updated(&self, update: &PerformanceUpdate, now: u64) -> LedgerResult<Self> {
        let total_trades = self
            .total_trades
            .checked_add(1)
            .ok_or(LedgerError::Overflow("total_trades"))?;
        let winning_trades = if update.is_winning_trade {
            self.winning_trades
                .checked_add(1)
                .ok_or(LedgerError::Overflow("winning_trades"))?
        } else {
            self.winning_trades
        };
        let total_profit = self
            .total_profit
            .checked_add(update.profit)
            .ok_or(LedgerError::Overflow("total_profit"))?;
        let cumulative_return = self
            .cumulative_return
            .checked_add(i64::from(update.return_bps))
            .ok_or(LedgerError::Overflow("cumulative_return"))?;

        let divisor = i64::try_from(total_trades).map_err(|_| LedgerError::Overflow("total_trades"))?;
        let average_return = i32::try_from(cumulative_return / divisor)
            .map_err(|_| LedgerError::Overflow("average_return"))?;

        Ok(Self {
            strategy: self.strategy.clone(),
            total_trades,
            winning_trades,
            total_profit,
            cumulative_return,
            average_return,
            sharpe_ratio: update.sharpe_ratio.unwrap_or(self.sharpe_ratio),
            last_updated: now,
        })
    }

    /// Winning share in bps (0 when no trades).
    pub fn win_rate_bps(&self) -> u32 {
        if self.total_trades == 0 {
            return 0;
        }
        (u128::from(self.winning_trades) * 10_000 / u128::from(self.total_trades)) as u32
    }
}

impl LedgerState {
    pub(crate) fn plan_update_performance(
        &self,
        caller: &Identity,
        strategy: &str,
        update: &PerformanceUpdate,
        now: u64,
    ) -> LedgerResult<StrategyPerformance> {
        self.authorize_operational(caller, &[Role::PaymentAgent])?;
        match self.strategies.get(strategy) {
            Some(existing) => existing.updated(update, now),
            None => StrategyPerformance::empty(strategy).updated(update, now),
        }
    }

    pub fn get_strategy_performance(&self, strategy: &str) -> LedgerResult<StrategyPerformance> {
        self.strategies
            .get(strategy)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("strategy", strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(win: bool, profit: i128, return_bps: i32) -> PerformanceUpdate {
        PerformanceUpdate {
            is_winning_trade: win,
            profit,
            return_bps,
            sharpe_ratio: Some(120),
        }
    }

    #[test]
    fn momentum_win_then_loss() {
        let first = StrategyPerformance::empty("momentum")
            .updated(&update(true, 500, 50), 1)
            .unwrap();
        let second = first.updated(&update(false, -200, -20), 2).unwrap();
        assert_eq!(second.total_trades, 2);
        assert_eq!(second.winning_trades, 1);
        assert_eq!(second.total_profit, 300);
        assert_eq!(second.average_return, 15);
        assert_eq!(second.last_updated, 2);
        assert_eq!(second.win_rate_bps(), 5_000);
    }

    #[test]
    fn average_return_truncates_toward_zero() {
        let p = StrategyPerformance::empty("s")
            .updated(&update(true, 0, 34), 0)
            .unwrap()
            .updated(&update(true, 0, 33), 0)
            .unwrap();
        assert_eq!(p.cumulative_return, 67);
        assert_eq!(p.average_return, 33);

        let n = StrategyPerformance::empty("s")
            .updated(&update(false, 0, -34), 0)
            .unwrap()
            .updated(&update(false, 0, -33), 0)
            .unwrap();
        assert_eq!(n.average_return, -33);
    }

    #[test]
    fn truncation_does_not_compound() {
        let mut p = StrategyPerformance::empty("s");
        for _ in 0..3 {
            p = p.updated(&update(true, 0, 1), 0).unwrap();
        }
        p = p.updated(&update(true, 0, 2), 0).unwrap();
        // exact mean 5/4 = 1.25
        assert_eq!(p.average_return, 1);
        p = p.updated(&update(true, 0, 3), 0).unwrap();
        // exact mean 8/5 = 1.6
        assert_eq!(p.average_return, 1);
        p = p.updated(&update(true, 0, 4), 0).unwrap();
        // exact mean 12/6 = 2
        assert_eq!(p.average_return, 2);
    }

    #[test]
    fn sharpe_is_stored_verbatim() {
        let mut u = update(true, 1, 1);
        u.sharpe_ratio = Some(-45);
        let p = StrategyPerformance::empty("s").updated(&u, 0).unwrap();
        assert_eq!(p.sharpe_ratio, -45);
    }

    #[test]
    fn missing_sharpe_keeps_previous_value() {
        let first = StrategyPerformance::empty("s")
            .updated(&update(true, 1, 1), 0)
            .unwrap();
        let mut u = update(false, -1, -1);
        u.sharpe_ratio = None;
        let second = first.updated(&u, 1).unwrap();
        assert_eq!(second.sharpe_ratio, 120);
        assert_eq!(second.total_trades, 2);

        let parsed: PerformanceUpdate = serde_json::from_str(
            r#"{"is_winning_trade": true, "profit": 5, "return_bps": 3}"#,
        )
        .unwrap();
        assert_eq!(parsed.sharpe_ratio, None);
        assert_eq!(second.updated(&parsed, 2).unwrap().sharpe_ratio, 120);
    }

    #[test]
    fn profit_overflow_is_an_error() {
        let mut p = StrategyPerformance::empty("s");
        p.total_profit = i128::MAX;
        assert_eq!(
            p.updated(&update(true, 1, 0), 0),
            Err(LedgerError::Overflow("total_profit"))
        );
    }
}
