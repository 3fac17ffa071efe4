// =============================================================================
// Identity & Configuration store — the ledger's singleton configuration
// =============================================================================
//
// Holds the four role identities, the single-trade ceiling and the risk
// limits, plus the global halt flag. Role checks are plain identity equality
// against the stored addresses; each entry point declares which roles it
// accepts.
// =============================================================================

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::types::{format_bps, Identity, Role};

/// Default maximum VaR-95: 5 %.
pub const DEFAULT_MAX_VAR_95: i32 = 500;
/// Default minimum Sharpe ratio: 1.00.
pub const DEFAULT_MIN_SHARPE_RATIO: i32 = 100;
/// Default drawdown floor: -20 %.
pub const DEFAULT_MAX_DRAWDOWN: i32 = -2000;

// -----------------------------------------------------------------------------
// Risk limits
// -----------------------------------------------------------------------------

/// Thresholds a risk evaluation is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum allowed VaR-95 in bps.
    pub max_var_95: i32,
    /// Minimum required Sharpe ratio (scaled by 100).
    pub min_sharpe_ratio: i32,
    /// Most negative acceptable drawdown in bps (zero or below).
    pub max_drawdown: i32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_var_95: DEFAULT_MAX_VAR_95,
            min_sharpe_ratio: DEFAULT_MIN_SHARPE_RATIO,
            max_drawdown: DEFAULT_MAX_DRAWDOWN,
        }
    }
}

/// One limit an evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBreach {
    VarExceeded { var_95: i32, limit: i32 },
    SharpeBelowMinimum { sharpe_ratio: i32, limit: i32 },
    DrawdownBreached { max_drawdown: i32, limit: i32 },
}

impl std::fmt::Display for RiskBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VarExceeded { var_95, limit } => {
                write!(f, "VaR {} > {}", format_bps(*var_95), format_bps(*limit))
            }
            Self::SharpeBelowMinimum {
                sharpe_ratio,
                limit,
            } => write!(f, "Sharpe {sharpe_ratio} < {limit}"),
            Self::DrawdownBreached {
                max_drawdown,
                limit,
            } => write!(
                f,
                "drawdown {} < {}",
                format_bps(*max_drawdown),
                format_bps(*limit)
            ),
        }
    }
}

impl RiskLimits {
    /// Every limit the given metrics violate, in check order.
    ///
    /// All comparisons are strict: a value exactly at its limit passes.
    pub fn breaches(&self, var_95: i32, sharpe_ratio: i32, max_drawdown: i32) -> Vec<RiskBreach> {
        let mut out = Vec::new();
        if var_95 > self.max_var_95 {
            out.push(RiskBreach::VarExceeded {
                var_95,
                limit: self.max_var_95,
            });
        }
        if sharpe_ratio < self.min_sharpe_ratio {
            out.push(RiskBreach::SharpeBelowMinimum {
                sharpe_ratio,
                limit: self.min_sharpe_ratio,
            });
        }
        if max_drawdown < self.max_drawdown {
            out.push(RiskBreach::DrawdownBreached {
                max_drawdown,
                limit: self.max_drawdown,
            });
        }
        out
    }

    pub fn admits(&self, var_95: i32, sharpe_ratio: i32, max_drawdown: i32) -> bool {
        self.breaches(var_95, sharpe_ratio, max_drawdown).is_empty()
    }

    /// Reject negative magnitudes: VaR must be >= 0 and the drawdown floor <= 0.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_var_95 < 0 {
            return Err(LedgerError::InvalidRiskLimits(format!(
                "max_var_95 must be non-negative, got {}",
                self.max_var_95
            )));
        }
        if self.max_drawdown > 0 {
            return Err(LedgerError::InvalidRiskLimits(format!(
                "max_drawdown must be zero or negative, got {}",
                self.max_drawdown
            )));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Arguments of `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub admin: Identity,
    pub trading_agent: Identity,
    pub risk_agent: Identity,
    pub payment_agent: Identity,
    /// Ceiling for a single signal's amount (scaled).
    pub max_single_trade: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub admin: Identity,
    pub trading_agent: Identity,
    pub risk_agent: Identity,
    pub payment_agent: Identity,
    pub max_single_trade: i128,
    pub max_var_95: i32,
    pub min_sharpe_ratio: i32,
    pub max_drawdown: i32,
    pub halted: bool,
}

impl Configuration {
    /// Build the initial configuration, rejecting blank or repeated identities.
    pub fn from_request(req: InitializeRequest) -> LedgerResult<Self> {
        let identities = [
            (Role::Admin, &req.admin),
            (Role::TradingAgent, &req.trading_agent),
            (Role::RiskAgent, &req.risk_agent),
            (Role::PaymentAgent, &req.payment_agent),
        ];

        if let Some((role, _)) = identities.iter().find(|(_, id)| id.is_blank()) {
            return Err(LedgerError::InvalidIdentities(format!(
                "{role} identity is empty"
            )));
        }

        let mut seen = HashSet::new();
        for (role, id) in &identities {
            if !seen.insert(*id) {
                return Err(LedgerError::InvalidIdentities(format!(
                    "{role} identity {id} is already assigned to another role"
                )));
            }
        }

        if req.max_single_trade <= 0 {
            return Err(LedgerError::InvalidAmount(
                "max_single_trade must be positive".into(),
            ));
        }

        let limits = RiskLimits::default();
        Ok(Self {
            admin: req.admin,
            trading_agent: req.trading_agent,
            risk_agent: req.risk_agent,
            payment_agent: req.payment_agent,
            max_single_trade: req.max_single_trade,
            max_var_95: limits.max_var_95,
            min_sharpe_ratio: limits.min_sharpe_ratio,
            max_drawdown: limits.max_drawdown,
            halted: false,
        })
    }

    pub fn limits(&self) -> RiskLimits {
        RiskLimits {
            max_var_95: self.max_var_95,
            min_sharpe_ratio: self.min_sharpe_ratio,
            max_drawdown: self.max_drawdown,
        }
    }

    pub fn set_limits(&mut self, limits: RiskLimits) {
        self.max_var_95 = limits.max_var_95;
        self.min_sharpe_ratio = limits.min_sharpe_ratio;
        self.max_drawdown = limits.max_drawdown;
    }

    /// Identity currently holding `role`.
    pub fn holder(&self, role: Role) -> &Identity {
        match role {
            Role::Admin => &self.admin,
            Role::TradingAgent => &self.trading_agent,
            Role::RiskAgent => &self.risk_agent,
            Role::PaymentAgent => &self.payment_agent,
        }
    }

    /// Resolve the caller to one of the accepted roles, or fail `Unauthorized`.
    pub fn require_role(&self, caller: &Identity, accepted: &[Role]) -> LedgerResult<Role> {
        accepted
            .iter()
            .copied()
            .find(|role| self.holder(*role) == caller)
            .ok_or_else(|| LedgerError::Unauthorized {
                caller: caller.clone(),
                required: accepted
                    .iter()
                    .map(Role::to_string)
                    .collect::<Vec<_>>()
                    .join(" or "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InitializeRequest {
        InitializeRequest {
            admin: Identity::new("GADMIN"),
            trading_agent: Identity::new("GTRADER"),
            risk_agent: Identity::new("GRISK"),
            payment_agent: Identity::new("GPAY"),
            max_single_trade: 1_000_000,
        }
    }

    #[test]
    fn initial_configuration_uses_default_limits() {
        let cfg = Configuration::from_request(request()).unwrap();
        assert_eq!(cfg.max_var_95, 500);
        assert_eq!(cfg.min_sharpe_ratio, 100);
        assert_eq!(cfg.max_drawdown, -2000);
        assert!(!cfg.halted);
    }

    #[test]
    fn duplicate_identities_are_rejected() {
        let mut req = request();
        req.payment_agent = req.risk_agent.clone();
        let err = Configuration::from_request(req).unwrap_err();
        assert_eq!(err.code(), "INVALID_IDENTITIES");
    }

    #[test]
    fn blank_identity_is_rejected() {
        let mut req = request();
        req.trading_agent = Identity::new("");
        assert!(matches!(
            Configuration::from_request(req),
            Err(LedgerError::InvalidIdentities(_))
        ));
    }

    #[test]
    fn require_role_matches_any_accepted_role() {
        let cfg = Configuration::from_request(request()).unwrap();
        let halters = [Role::Admin, Role::RiskAgent];
        assert_eq!(
            cfg.require_role(&Identity::new("GRISK"), &halters).unwrap(),
            Role::RiskAgent
        );
        let err = cfg
            .require_role(&Identity::new("GPAY"), &halters)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "caller GPAY is not authorized (requires Admin or RiskAgent)"
        );
    }

    #[test]
    fn default_limits_reject_every_breach() {
        let limits = RiskLimits::default();
        let breaches = limits.breaches(600, 80, -2500);
        assert_eq!(breaches.len(), 3);
        assert!(!limits.admits(600, 80, -2500));
        assert!(limits.admits(300, 150, -1000));
    }

    #[test]
    fn limits_are_inclusive_at_the_boundary() {
        let limits = RiskLimits::default();
        assert!(limits.admits(500, 100, -2000));
        assert!(!limits.admits(501, 100, -2000));
        assert!(!limits.admits(500, 99, -2000));
        assert!(!limits.admits(500, 100, -2001));
    }

    #[test]
    fn validate_rejects_negative_magnitudes() {
        let bad_var = RiskLimits {
            max_var_95: -1,
            ..RiskLimits::default()
        };
        assert!(bad_var.validate().is_err());
        let bad_drawdown = RiskLimits {
            max_drawdown: 10,
            ..RiskLimits::default()
        };
        assert!(bad_drawdown.validate().is_err());
        assert!(RiskLimits::default().validate().is_ok());
    }
}
