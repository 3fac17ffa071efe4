// =============================================================================
// Treasury Ledger — serialized, journalled entry points
// =============================================================================
//
// `TreasuryLedger` is the only way to touch ledger state. Commands take the
// write guard for their whole plan → journal → apply cycle, so every call is
// one atomic transaction and calls are totally ordered. Queries take the read
// guard and are never gated by the halt switch.
//
// Every command takes the caller identity explicitly; the host authenticates
// the identity, the ledger decides what that identity may do.
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod journal;
pub mod performance;
pub mod signals;
pub mod snapshots;
pub mod state;
pub mod stop_loss;
pub mod trades;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::types::{format_amount, format_bps, Identity, Role};

pub use clock::{Clock, SystemClock};
pub use config::{Configuration, InitializeRequest, RiskLimits};
pub use error::{LedgerError, LedgerResult};
pub use journal::{EventSink, Journal};
pub use performance::{PerformanceUpdate, StrategyPerformance};
pub use signals::{RiskMetrics, SignalEntry, SignalRequest, SignalStatus};
pub use snapshots::{PortfolioSnapshot, SnapshotRequest};
pub use state::{LedgerEvent, LedgerState};
pub use stop_loss::{DynamicStopLossConfig, StopLossRequest};
pub use trades::{TradeRecord, TradeRequest};

struct Inner {
    state: LedgerState,
    sink: Option<Box<dyn EventSink>>,
}

pub struct TreasuryLedger {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

/// Log a refused command and hand the error back.
fn refused(operation: &'static str, caller: &Identity, err: LedgerError) -> LedgerError {
    warn!(
        operation,
        caller = %caller,
        code = err.code(),
        error = %err,
        "ledger call refused"
    );
    err
}

impl TreasuryLedger {
    /// Ledger without durability.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_sink(LedgerState::default(), None, clock)
    }

    /// Ledger backed by the journal at `path`, replaying what it holds.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let (journal, events) = Journal::open(path)?;
        let mut state = LedgerState::default();
        let replayed = events.len();
        for event in events {
            state.apply(event);
        }
        info!(
            replayed,
            trades = state.total_trades(),
            initialized = state.config.is_some(),
            "ledger state restored from journal"
        );
        Ok(Self::with_sink(state, Some(Box::new(journal)), clock))
    }

    pub fn with_sink(
        state: LedgerState,
        sink: Option<Box<dyn EventSink>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner { state, sink }),
            clock,
        }
    }

    /// Journal then apply. A sink failure leaves the state untouched.
    fn commit(inner: &mut Inner, event: LedgerEvent, now: u64) -> LedgerResult<()> {
        if let Some(sink) = inner.sink.as_mut() {
            sink.append(&event, now)?;
        }
        inner.state.apply(event);
        Ok(())
    }

    #[cfg(test)]
    pub fn state(&self) -> LedgerState {
        self.inner.read().state.clone()
    }

    // =========================================================================
    // Identity & configuration / halt switch
    // =========================================================================

    pub fn initialize(&self, req: InitializeRequest) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if inner.state.config.is_some() {
            warn!(admin = %req.admin, "initialize refused: already initialized");
            return Err(LedgerError::AlreadyInitialized);
        }
        let config = Configuration::from_request(req).map_err(|e| {
            warn!(code = e.code(), error = %e, "initialize refused");
            e
        })?;
        let admin = config.admin.clone();
        let max_single_trade = config.max_single_trade;
        Self::commit(&mut inner, LedgerEvent::Initialized { config }, now)?;
        info!(
            admin = %admin,
            max_single_trade = %format_amount(max_single_trade),
            "ledger initialized"
        );
        Ok(())
    }

    pub fn get_config(&self) -> LedgerResult<Configuration> {
        self.inner.read().state.config().cloned()
    }

    /// True once initialized and while not halted.
    pub fn is_operational(&self) -> bool {
        self.inner
            .read()
            .state
            .config
            .as_ref()
            .map(|c| !c.halted)
            .unwrap_or(false)
    }

    /// Admin only. Not gated by the halt switch, so limits can be tightened
    /// during an emergency halt.
    pub fn update_risk_limits(&self, caller: &Identity, limits: RiskLimits) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        inner
            .state
            .authorize(caller, &[Role::Admin])
            .and_then(|_| limits.validate())
            .map_err(|e| refused("update_risk_limits", caller, e))?;
        Self::commit(&mut inner, LedgerEvent::RiskLimitsUpdated { limits }, now)?;
        info!(
            max_var_95 = %format_bps(limits.max_var_95),
            min_sharpe_ratio = limits.min_sharpe_ratio,
            max_drawdown = %format_bps(limits.max_drawdown),
            "risk limits updated"
        );
        Ok(())
    }

    /// Admin only. Not gated by the halt switch.
    pub fn set_max_single_trade(&self, caller: &Identity, amount: i128) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        inner
            .state
            .authorize(caller, &[Role::Admin])
            .and_then(|_| {
                if amount <= 0 {
                    Err(LedgerError::InvalidAmount(
                        "max_single_trade must be positive".into(),
                    ))
                } else {
                    Ok(())
                }
            })
            .map_err(|e| refused("set_max_single_trade", caller, e))?;
        Self::commit(
            &mut inner,
            LedgerEvent::MaxSingleTradeUpdated {
                max_single_trade: amount,
            },
            now,
        )?;
        info!(max_single_trade = %format_amount(amount), "max single trade updated");
        Ok(())
    }

    /// Admin or risk agent. Idempotent: halting a halted ledger is a no-op.
    pub fn emergency_halt(&self, caller: &Identity) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let config = inner
            .state
            .authorize(caller, &[Role::Admin, Role::RiskAgent])
            .map_err(|e| refused("emergency_halt", caller, e))?;
        if config.halted {
            info!(caller = %caller, "emergency halt requested; already halted");
            return Ok(());
        }
        Self::commit(
            &mut inner,
            LedgerEvent::Halted { by: caller.clone() },
            now,
        )?;
        warn!(caller = %caller, "EMERGENCY HALT: all mutating entry points blocked");
        Ok(())
    }

    /// Admin only. Idempotent.
    pub fn resume_operations(&self, caller: &Identity) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let config = inner
            .state
            .authorize(caller, &[Role::Admin])
            .map_err(|e| refused("resume_operations", caller, e))?;
        if !config.halted {
            info!(caller = %caller, "resume requested; ledger already operational");
            return Ok(());
        }
        Self::commit(
            &mut inner,
            LedgerEvent::Resumed { by: caller.clone() },
            now,
        )?;
        info!(caller = %caller, "operations RESUMED");
        Ok(())
    }

    // =========================================================================
    // Risk validation & signal book
    // =========================================================================

    pub fn validate_risk_metrics(&self, var_95: i32, sharpe_ratio: i32, max_drawdown: i32) -> bool {
        self.inner
            .read()
            .state
            .validate_risk_metrics(var_95, sharpe_ratio, max_drawdown)
    }

    pub fn get_risk_metrics(&self) -> RiskMetrics {
        self.inner.read().state.risk_metrics()
    }

    pub fn submit_signal(&self, caller: &Identity, req: SignalRequest) -> LedgerResult<u64> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let entry = inner
            .state
            .plan_submit_signal(caller, req, now)
            .map_err(|e| refused("submit_signal", caller, e))?;
        let signal_id = entry.signal_id;
        let asset = entry.signal.asset.clone();
        let action = entry.signal.action;
        let amount = entry.signal.amount;
        Self::commit(&mut inner, LedgerEvent::SignalSubmitted { entry }, now)?;
        info!(
            signal_id,
            asset = %asset,
            action = %action,
            amount = %format_amount(amount),
            "signal submitted"
        );
        Ok(signal_id)
    }

    pub fn approve_signal(
        &self,
        caller: &Identity,
        signal_id: u64,
        metrics: RiskMetrics,
    ) -> LedgerResult<SignalStatus> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let status = inner
            .state
            .plan_approve_signal(caller, signal_id, &metrics)
            .map_err(|e| refused("approve_signal", caller, e))?;
        let breaches = inner
            .state
            .config()?
            .limits()
            .breaches(metrics.var_95, metrics.sharpe_ratio, metrics.max_drawdown);
        Self::commit(
            &mut inner,
            LedgerEvent::SignalDecided {
                signal_id,
                status,
                metrics,
                decided_at: now,
            },
            now,
        )?;
        if breaches.is_empty() {
            info!(signal_id, status = %status, "signal decided");
        } else {
            let reasons: Vec<String> = breaches.iter().map(ToString::to_string).collect();
            warn!(signal_id, status = %status, breaches = ?reasons, "signal rejected by risk limits");
        }
        Ok(status)
    }

    pub fn get_signal(&self, signal_id: u64) -> LedgerResult<SignalEntry> {
        self.inner.read().state.get_signal(signal_id)
    }

    // =========================================================================
    // Trade ledger
    // =========================================================================

    pub fn record_trade(&self, caller: &Identity, req: TradeRequest) -> LedgerResult<u64> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let (record, consumes_signal) = inner
            .state
            .plan_record_trade(caller, req, now)
            .map_err(|e| refused("record_trade", caller, e))?;
        let trade_id = record.trade_id;
        let signal_id = record.signal_id;
        let amount = record.amount;
        let profit_loss = record.profit_loss;
        Self::commit(
            &mut inner,
            LedgerEvent::TradeRecorded {
                record,
                consumes_signal,
            },
            now,
        )?;
        info!(
            trade_id,
            signal_id,
            consumes_signal,
            amount = %format_amount(amount),
            profit_loss = %format_amount(profit_loss),
            "trade recorded"
        );
        Ok(trade_id)
    }

    pub fn get_trade(&self, trade_id: u64) -> LedgerResult<TradeRecord> {
        self.inner.read().state.get_trade(trade_id)
    }

    pub fn list_trades(&self, start_id: u64, limit: usize) -> Vec<TradeRecord> {
        self.inner.read().state.list_trades(start_id, limit)
    }

    pub fn get_total_trades(&self) -> u64 {
        self.inner.read().state.total_trades()
    }

    // =========================================================================
    // Strategy performance
    // =========================================================================

    pub fn update_strategy_performance(
        &self,
        caller: &Identity,
        strategy: &str,
        update: PerformanceUpdate,
    ) -> LedgerResult<StrategyPerformance> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let performance = inner
            .state
            .plan_update_performance(caller, strategy, &update, now)
            .map_err(|e| refused("update_strategy_performance", caller, e))?;
        Self::commit(
            &mut inner,
            LedgerEvent::PerformanceUpdated {
                performance: performance.clone(),
            },
            now,
        )?;
        info!(
            strategy,
            total_trades = performance.total_trades,
            winning_trades = performance.winning_trades,
            total_profit = %format_amount(performance.total_profit),
            average_return = %format_bps(performance.average_return),
            win_rate = %format_bps(performance.win_rate_bps() as i32),
            "strategy performance updated"
        );
        Ok(performance)
    }

    pub fn get_strategy_performance(&self, strategy: &str) -> LedgerResult<StrategyPerformance> {
        self.inner.read().state.get_strategy_performance(strategy)
    }

    // =========================================================================
    // Portfolio snapshots
    // =========================================================================

    pub fn create_snapshot(&self, caller: &Identity, req: SnapshotRequest) -> LedgerResult<u64> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let snapshot = inner
            .state
            .plan_create_snapshot(caller, &req)
            .map_err(|e| refused("create_snapshot", caller, e))?;
        let snapshot_id = snapshot.snapshot_id;
        Self::commit(&mut inner, LedgerEvent::SnapshotCreated { snapshot }, now)?;
        info!(
            snapshot_id,
            timestamp = req.timestamp,
            total_value = %format_amount(req.total_value),
            "portfolio snapshot created"
        );
        Ok(snapshot_id)
    }

    pub fn get_latest_snapshot(&self) -> LedgerResult<PortfolioSnapshot> {
        self.inner.read().state.latest_snapshot()
    }

    pub fn get_snapshot(&self, snapshot_id: u64) -> LedgerResult<PortfolioSnapshot> {
        self.inner.read().state.get_snapshot(snapshot_id)
    }

    pub fn list_snapshots(&self, start_id: u64, limit: usize) -> Vec<PortfolioSnapshot> {
        self.inner.read().state.list_snapshots(start_id, limit)
    }

    // =========================================================================
    // Dynamic stop-loss
    // =========================================================================

    pub fn set_dynamic_stop_loss(
        &self,
        caller: &Identity,
        asset: &str,
        req: StopLossRequest,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let config = inner
            .state
            .plan_set_stop_loss(caller, asset, &req, now)
            .map_err(|e| refused("set_dynamic_stop_loss", caller, e))?;
        Self::commit(&mut inner, LedgerEvent::StopLossSet { config }, now)?;
        info!(
            asset,
            stop_loss = %format_bps(req.stop_loss_bps),
            enabled = req.enabled,
            "dynamic stop-loss set"
        );
        Ok(())
    }

    pub fn get_dynamic_stop_loss_config(&self, asset: &str) -> LedgerResult<DynamicStopLossConfig> {
        self.inner.read().state.get_stop_loss(asset)
    }
}

impl std::fmt::Debug for TreasuryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TreasuryLedger")
            .field("initialized", &inner.state.config.is_some())
            .field("total_trades", &inner.state.total_trades())
            .field("durable", &inner.sink.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
