// =============================================================================
// Shared types used across the treasury ledger
// =============================================================================
//
// Fixed-point convention:
//   - Monetary quantities (amounts, prices, profit/loss, portfolio value) are
//     `i128` scaled by AMOUNT_SCALE (1e7), so 1.5 units is 15_000_000.
//   - Ratios (VaR, drawdown, returns, stop-loss) are basis points in `i32`.
//   - Sharpe ratios are `i32` scaled by 100, so 1.25 is 125.
//
// Nothing in the ledger touches floating point.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Scale factor for monetary quantities.
pub const AMOUNT_SCALE: i128 = 10_000_000;

/// Number of basis points in 100 %.
pub const BPS_SCALE: i32 = 10_000;

/// Render a scaled amount as a decimal string for logs (e.g. `-12.5000000`).
pub fn format_amount(value: i128) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let scale = AMOUNT_SCALE as u128;
    format!("{sign}{}.{:07}", abs / scale, abs % scale)
}

/// Render basis points as a percentage string for logs (e.g. `-20.00%`).
pub fn format_bps(bps: i32) -> String {
    let sign = if bps < 0 { "-" } else { "" };
    let abs = bps.unsigned_abs();
    let per_pct = (BPS_SCALE / 100) as u32;
    format!("{sign}{}.{:02}%", abs / per_pct, abs % per_pct)
}

// -----------------------------------------------------------------------------
// Identity & roles
// -----------------------------------------------------------------------------

/// A caller address. The host authenticates it before the ledger sees it;
/// the ledger only compares identities for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of roles a caller may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    TradingAgent,
    RiskAgent,
    PaymentAgent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "Admin"),
            Self::TradingAgent => write!(f, "TradingAgent"),
            Self::RiskAgent => write!(f, "RiskAgent"),
            Self::PaymentAgent => write!(f, "PaymentAgent"),
        }
    }
}

// -----------------------------------------------------------------------------
// Trade action
// -----------------------------------------------------------------------------

/// Direction proposed by the trading agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_amount_handles_sign_and_fraction() {
        assert_eq!(format_amount(15_000_000), "1.5000000");
        assert_eq!(format_amount(-125_000_000), "-12.5000000");
        assert_eq!(format_amount(1), "0.0000001");
        assert_eq!(format_amount(0), "0.0000000");
    }

    #[test]
    fn format_bps_as_percentage() {
        assert_eq!(format_bps(500), "5.00%");
        assert_eq!(format_bps(-2000), "-20.00%");
        assert_eq!(format_bps(-5), "-0.05%");
    }

    #[test]
    fn trade_action_uses_uppercase_wire_names() {
        let json = serde_json::to_string(&TradeAction::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        let parsed: TradeAction = serde_json::from_str("\"HOLD\"").unwrap();
        assert_eq!(parsed, TradeAction::Hold);
    }

    #[test]
    fn identity_is_transparent_on_the_wire() {
        let id = Identity::new("GADMIN");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"GADMIN\"");
        assert!(Identity::new("  ").is_blank());
    }
}
