// =============================================================================
// Signal book & risk approval
// =============================================================================
//
// Life-cycle:
//   Submitted  ->  Approved  ->  Executed
//   Submitted  ->  Rejected            (terminal)
//
// `validate_risk_metrics` is the stateless predicate the off-chain pipeline
// calls every cycle. The book adds a durable record on top of it: the trading
// agent submits, the risk agent decides with the same predicate, and the
// payment agent's `record_trade` consumes an approved signal exactly once,
// provided the trade matches what was approved. Signal ids the book has never
// seen are still accepted by `record_trade`.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;
use crate::ledger::trades::TradeRequest;
use crate::types::{format_amount, Identity, Role, TradeAction};

/// Highest accepted confidence score.
pub const MAX_CONFIDENCE: u32 = 100;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Risk evaluation supplied by the risk agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// VaR-95 in bps.
    pub var_95: i32,
    /// Sharpe ratio scaled by 100.
    pub sharpe_ratio: i32,
    /// Max drawdown in bps (negative).
    pub max_drawdown: i32,
    /// Stop-loss level in bps.
    #[serde(default)]
    pub stop_loss: i32,
    /// Portfolio volatility in bps.
    #[serde(default)]
    pub portfolio_volatility: u32,
}

/// Trade proposal from the trading agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub asset: String,
    pub action: TradeAction,
    /// Scaled amount.
    pub amount: i128,
    pub strategy: String,
    /// 0-100.
    pub confidence: u32,
    /// Expected return in bps.
    pub expected_return: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub asset: String,
    pub action: TradeAction,
    pub amount: i128,
    pub strategy: String,
    pub confidence: u32,
    pub expected_return: i32,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Submitted,
    Approved,
    Rejected,
    Executed,
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "Submitted"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Executed => write!(f, "Executed"),
        }
    }
}

/// A signal and where it is in its life-cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub signal_id: u64,
    pub signal: TradingSignal,
    pub status: SignalStatus,
    #[serde(default)]
    pub decided_at: Option<u64>,
    /// Trade that consumed this signal.
    #[serde(default)]
    pub trade_id: Option<u64>,
}

// -----------------------------------------------------------------------------
// Planning
// -----------------------------------------------------------------------------

impl LedgerState {
    /// Stateless risk predicate against the configured limits (defaults before
    /// initialization).
    pub fn validate_risk_metrics(&self, var_95: i32, sharpe_ratio: i32, max_drawdown: i32) -> bool {
        self.config
            .as_ref()
            .map(|c| c.limits())
            .unwrap_or_default()
            .admits(var_95, sharpe_ratio, max_drawdown)
    }

    pub(crate) fn plan_submit_signal(
        &self,
        caller: &Identity,
        req: SignalRequest,
        now: u64,
    ) -> LedgerResult<SignalEntry> {
        let config = self.authorize_operational(caller, &[Role::TradingAgent])?;

        if req.asset.trim().is_empty() {
            return Err(LedgerError::InvalidSignal("asset is empty".into()));
        }
        if req.strategy.trim().is_empty() {
            return Err(LedgerError::InvalidSignal("strategy is empty".into()));
        }
        if req.amount <= 0 {
            return Err(LedgerError::InvalidSignal(format!(
                "amount must be positive, got {}",
                req.amount
            )));
        }
        if req.confidence > MAX_CONFIDENCE {
            return Err(LedgerError::InvalidSignal(format!(
                "confidence {} exceeds {MAX_CONFIDENCE}",
                req.confidence
            )));
        }
        if req.amount > config.max_single_trade {
            return Err(LedgerError::TradeLimitExceeded {
                amount: req.amount,
                limit: config.max_single_trade,
            });
        }

        let signal_id = Self::next_id(self.signal_counter, "signal id")?;
        Ok(SignalEntry {
            signal_id,
            signal: TradingSignal {
                asset: req.asset,
                action: req.action,
                amount: req.amount,
                strategy: req.strategy,
                confidence: req.confidence,
                expected_return: req.expected_return,
                submitted_at: now,
            },
            status: SignalStatus::Submitted,
            decided_at: None,
            trade_id: None,
        })
    }

    /// Decide a submitted signal. Returns the resulting status.
    pub(crate) fn plan_approve_signal(
        &self,
        caller: &Identity,
        signal_id: u64,
        metrics: &RiskMetrics,
    ) -> LedgerResult<SignalStatus> {
        let config = self.authorize_operational(caller, &[Role::RiskAgent])?;

        let entry = self
            .signals
            .get(&signal_id)
            .ok_or_else(|| LedgerError::not_found("signal", signal_id))?;
        if entry.status != SignalStatus::Submitted {
            return Err(LedgerError::InvalidTransition {
                signal_id,
                status: entry.status.to_string(),
            });
        }

        let approved = config
            .limits()
            .admits(metrics.var_95, metrics.sharpe_ratio, metrics.max_drawdown);
        Ok(if approved {
            SignalStatus::Approved
        } else {
            SignalStatus::Rejected
        })
    }

    /// Whether `trade` consumes a book entry. Unknown signal ids are accepted
    /// without consuming anything. A known id must be approved, and the trade
    /// must carry the signal's asset, action and strategy with an amount no
    /// larger than the approved one.
    pub(crate) fn check_signal_consumable(&self, trade: &TradeRequest) -> LedgerResult<bool> {
        let signal_id = trade.signal_id;
        let Some(entry) = self.signals.get(&signal_id) else {
            return Ok(false);
        };
        if entry.status != SignalStatus::Approved {
            return Err(LedgerError::SignalNotApproved {
                signal_id,
                status: entry.status.to_string(),
            });
        }

        let approved = &entry.signal;
        let mismatch = |reason: String| LedgerError::SignalMismatch { signal_id, reason };
        if trade.asset != approved.asset {
            return Err(mismatch(format!("asset {} != {}", trade.asset, approved.asset)));
        }
        if trade.action != approved.action {
            return Err(mismatch(format!("action {} != {}", trade.action, approved.action)));
        }
        if trade.strategy != approved.strategy {
            return Err(mismatch(format!(
                "strategy {} != {}",
                trade.strategy, approved.strategy
            )));
        }
        if trade.amount > approved.amount {
            return Err(mismatch(format!(
                "amount {} exceeds approved {}",
                format_amount(trade.amount),
                format_amount(approved.amount)
            )));
        }
        Ok(true)
    }

    pub fn get_signal(&self, signal_id: u64) -> LedgerResult<SignalEntry> {
        self.signals
            .get(&signal_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("signal", signal_id))
    }

    /// Metrics from the most recent decision, zeros if none yet.
    pub fn risk_metrics(&self) -> RiskMetrics {
        self.last_risk_metrics.unwrap_or_default()
    }
}
