// =============================================================================
// Ledger state & events — the single owned store behind every entry point
// =============================================================================
//
// Every command runs in two phases:
//   1. plan:  checks authorization, the halt switch, lookups and arithmetic
//              against `&LedgerState` and produces a `LedgerEvent`. Nothing is
//              mutated; any failure leaves the state exactly as it was.
//   2. apply: folds the event into the state. `apply` cannot fail, so a
//              committed event is always fully applied.
//
// Events carry the final records (ids already allocated, timestamps already
// read) so replaying the journal reproduces the state bit for bit.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::config::{Configuration, RiskLimits};
use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::performance::StrategyPerformance;
use crate::ledger::signals::{RiskMetrics, SignalEntry, SignalStatus};
use crate::ledger::snapshots::PortfolioSnapshot;
use crate::ledger::stop_loss::DynamicStopLossConfig;
use crate::ledger::trades::TradeRecord;
use crate::types::{Identity, Role};

/// A committed state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Initialized {
        config: Configuration,
    },
    RiskLimitsUpdated {
        limits: RiskLimits,
    },
    MaxSingleTradeUpdated {
        max_single_trade: i128,
    },
    Halted {
        by: Identity,
    },
    Resumed {
        by: Identity,
    },
    SignalSubmitted {
        entry: SignalEntry,
    },
    SignalDecided {
        signal_id: u64,
        status: SignalStatus,
        metrics: RiskMetrics,
        decided_at: u64,
    },
    TradeRecorded {
        record: TradeRecord,
        /// Whether `record.signal_id` names an approved signal in the book.
        consumes_signal: bool,
    },
    PerformanceUpdated {
        performance: StrategyPerformance,
    },
    SnapshotCreated {
        snapshot: PortfolioSnapshot,
    },
    StopLossSet {
        config: DynamicStopLossConfig,
    },
}

impl LedgerEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::RiskLimitsUpdated { .. } => "risk_limits_updated",
            Self::MaxSingleTradeUpdated { .. } => "max_single_trade_updated",
            Self::Halted { .. } => "halted",
            Self::Resumed { .. } => "resumed",
            Self::SignalSubmitted { .. } => "signal_submitted",
            Self::SignalDecided { .. } => "signal_decided",
            Self::TradeRecorded { .. } => "trade_recorded",
            Self::PerformanceUpdated { .. } => "performance_updated",
            Self::SnapshotCreated { .. } => "snapshot_created",
            Self::StopLossSet { .. } => "stop_loss_set",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub(crate) config: Option<Configuration>,
    pub(crate) signal_counter: u64,
    pub(crate) signals: BTreeMap<u64, SignalEntry>,
    pub(crate) last_risk_metrics: Option<RiskMetrics>,
    pub(crate) trade_counter: u64,
    pub(crate) trades: BTreeMap<u64, TradeRecord>,
    pub(crate) strategies: BTreeMap<String, StrategyPerformance>,
    pub(crate) snapshot_counter: u64,
    pub(crate) snapshots: BTreeMap<u64, PortfolioSnapshot>,
    pub(crate) stop_losses: BTreeMap<String, DynamicStopLossConfig>,
}

impl LedgerState {
    // -------------------------------------------------------------------------
    // Guards shared by every command
    // -------------------------------------------------------------------------

    pub(crate) fn config(&self) -> LedgerResult<&Configuration> {
        self.config.as_ref().ok_or(LedgerError::NotInitialized)
    }

    /// Caller must hold one of `accepted`. Not gated by the halt switch.
    pub(crate) fn authorize(
        &self,
        caller: &Identity,
        accepted: &[Role],
    ) -> LedgerResult<&Configuration> {
        let config = self.config()?;
        config.require_role(caller, accepted)?;
        Ok(config)
    }

    /// Authorization first, then the halt switch.
    pub(crate) fn authorize_operational(
        &self,
        caller: &Identity,
        accepted: &[Role],
    ) -> LedgerResult<&Configuration> {
        let config = self.authorize(caller, accepted)?;
        if config.halted {
            return Err(LedgerError::SystemHalted);
        }
        Ok(config)
    }

    /// Next value of a monotonic counter.
    pub(crate) fn next_id(counter: u64, what: &'static str) -> LedgerResult<u64> {
        counter.checked_add(1).ok_or(LedgerError::Overflow(what))
    }

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------

    pub fn apply(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::Initialized { config } => {
                self.config = Some(config);
            }
            LedgerEvent::RiskLimitsUpdated { limits } => {
                if let Some(config) = self.config.as_mut() {
                    config.set_limits(limits);
                }
            }
            LedgerEvent::MaxSingleTradeUpdated { max_single_trade } => {
                if let Some(config) = self.config.as_mut() {
                    config.max_single_trade = max_single_trade;
                }
            }
            LedgerEvent::Halted { .. } => {
                if let Some(config) = self.config.as_mut() {
                    config.halted = true;
                }
            }
            LedgerEvent::Resumed { .. } => {
                if let Some(config) = self.config.as_mut() {
                    config.halted = false;
                }
            }
            LedgerEvent::SignalSubmitted { entry } => {
                self.signal_counter = entry.signal_id;
                self.signals.insert(entry.signal_id, entry);
            }
            LedgerEvent::SignalDecided {
                signal_id,
                status,
                metrics,
                decided_at,
            } => {
                if let Some(entry) = self.signals.get_mut(&signal_id) {
                    entry.status = status;
                    entry.decided_at = Some(decided_at);
                }
                self.last_risk_metrics = Some(metrics);
            }
            LedgerEvent::TradeRecorded {
                record,
                consumes_signal,
            } => {
                if consumes_signal {
                    if let Some(entry) = self.signals.get_mut(&record.signal_id) {
                        entry.status = SignalStatus::Executed;
                        entry.trade_id = Some(record.trade_id);
                    }
                }
                self.trade_counter = record.trade_id;
                self.trades.insert(record.trade_id, record);
            }
            LedgerEvent::PerformanceUpdated { performance } => {
                self.strategies
                    .insert(performance.strategy.clone(), performance);
            }
            LedgerEvent::SnapshotCreated { snapshot } => {
                self.snapshot_counter = snapshot.snapshot_id;
                self.snapshots.insert(snapshot.snapshot_id, snapshot);
            }
            LedgerEvent::StopLossSet { config } => {
                self.stop_losses.insert(config.asset.clone(), config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::config::InitializeRequest;

    fn initialized() -> LedgerState {
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
    fn guards_require_initialization() {
        let state = LedgerState::default();
        assert_eq!(
            state.authorize(&Identity::new("GADMIN"), &[Role::Admin]),
            Err(LedgerError::NotInitialized)
        );
    }

    #[test]
    fn authorization_is_checked_before_halt() {
        let mut state = initialized();
        state.apply(LedgerEvent::Halted {
            by: Identity::new("GADMIN"),
        });

        let outsider = state.authorize_operational(&Identity::new("GEVE"), &[Role::PaymentAgent]);
        assert_eq!(outsider.unwrap_err().code(), "UNAUTHORIZED");

        let payer = state.authorize_operational(&Identity::new("GPAY"), &[Role::PaymentAgent]);
        assert_eq!(payer.unwrap_err(), LedgerError::SystemHalted);
    }

    #[test]
    fn halt_and_resume_toggle_the_flag() {
        let mut state = initialized();
        state.apply(LedgerEvent::Halted {
            by: Identity::new("GRISK"),
        });
        assert!(state.config.as_ref().unwrap().halted);
        state.apply(LedgerEvent::Resumed {
            by: Identity::new("GADMIN"),
        });
        assert!(!state.config.as_ref().unwrap().halted);
    }

    #[test]
    fn next_id_detects_exhaustion() {
        assert_eq!(LedgerState::next_id(0, "trade id"), Ok(1));
        assert_eq!(
            LedgerState::next_id(u64::MAX, "trade id"),
            Err(LedgerError::Overflow("trade id"))
        );
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = LedgerEvent::MaxSingleTradeUpdated {
            max_single_trade: 170_141_183_460_469_231_731_687_303_715_884_105_727,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "max_single_trade_updated");
    }
}
