// =============================================================================
// Ledger errors — every entry point fails with exactly one of these
// =============================================================================
//
// Each variant carries a stable machine-readable code so off-chain callers can
// branch on it (e.g. retry `SYSTEM_HALTED` after a resume, but never retry
// `UNAUTHORIZED`).
// =============================================================================

use thiserror::Error;

use crate::types::{format_amount, Identity};

/// Result alias used by every ledger entry point.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("caller {caller} is not authorized (requires {required})")]
    Unauthorized { caller: Identity, required: String },

    #[error("ledger is already initialized")]
    AlreadyInitialized,

    #[error("ledger has not been initialized")]
    NotInitialized,

    #[error("system is halted")]
    SystemHalted,

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("invalid identities: {0}")]
    InvalidIdentities(String),

    #[error("invalid risk limits: {0}")]
    InvalidRiskLimits(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("amount {} exceeds max single trade {}", format_amount(*.amount), format_amount(*.limit))]
    TradeLimitExceeded { amount: i128, limit: i128 },

    #[error("signal {signal_id} cannot be decided in status {status}")]
    InvalidTransition { signal_id: u64, status: String },

    #[error("signal {signal_id} is {status}, not Approved")]
    SignalNotApproved { signal_id: u64, status: String },

    #[error("trade does not match approved signal {signal_id}: {reason}")]
    SignalMismatch { signal_id: u64, reason: String },

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Stable code exposed to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::SystemHalted => "SYSTEM_HALTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidIdentities(_) => "INVALID_IDENTITIES",
            Self::InvalidRiskLimits(_) => "INVALID_RISK_LIMITS",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidSignal(_) => "INVALID_SIGNAL",
            Self::TradeLimitExceeded { .. } => "TRADE_LIMIT_EXCEEDED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::SignalNotApproved { .. } => "SIGNAL_NOT_APPROVED",
            Self::SignalMismatch { .. } => "SIGNAL_MISMATCH",
            Self::Overflow(_) => "ARITHMETIC_OVERFLOW",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// Whether the same call may succeed later without the caller changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SystemHalted | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halted_is_retryable_but_unauthorized_is_not() {
        assert!(LedgerError::SystemHalted.is_retryable());
        let unauthorized = LedgerError::Unauthorized {
            caller: Identity::new("GX"),
            required: "Admin".into(),
        };
        assert!(!unauthorized.is_retryable());
        assert_eq!(unauthorized.code(), "UNAUTHORIZED");
    }

    #[test]
    fn display_formats_scaled_amounts() {
        let err = LedgerError::TradeLimitExceeded {
            amount: 25_000_000,
            limit: 10_000_000,
        };
        assert_eq!(
            err.to_string(),
            "amount 2.5000000 exceeds max single trade 1.0000000"
        );
    }

    #[test]
    fn signal_mismatch_is_final() {
        let err = LedgerError::SignalMismatch {
            signal_id: 3,
            reason: "asset BTC != XLM".into(),
        };
        assert_eq!(err.code(), "SIGNAL_MISMATCH");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "trade does not match approved signal 3: asset BTC != XLM"
        );
    }

    #[test]
    fn not_found_carries_kind_and_key() {
        let err = LedgerError::not_found("trade", 7);
        assert_eq!(err.to_string(), "trade '7' not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
