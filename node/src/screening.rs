//! # Risk Screening
//!
//! Turns an external risk assessment into ledger calls. The classifier itself
//! lives outside the node; `/screen` receives its output (a level or a raw
//! score plus an explanation) and acts on it as the configured relayer:
//!
//! | Level vs. threshold            | Ledger calls                   | Action  |
//! |--------------------------------|--------------------------------|---------|
//! | at or above `hold_threshold`   | submit, hold                   | `hold`  |
//! | `low` with auto-clear enabled  | submit, set_verification(true) | `clear` |
//! | anything else                  | submit                         | `allow` |
//!
//! Each call is its own atomic ledger operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use guard_contracts::{Ledger, LedgerResult};
use guard_protocol::config::{AUTO_CLEAR_REASON, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};
use guard_protocol::{Address, TransactionStatus, TxHash};

use crate::config::ScreeningConfig;

// ---------------------------------------------------------------------------
// Risk levels
// ---------------------------------------------------------------------------

/// Coarse risk classification. Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classifies a fraud probability. `None` unless `score` is in `[0, 1]`.
    pub fn from_score(score: f64) -> Option<Self> {
        if !(0.0..=1.0).contains(&score) {
            return None;
        }
        Some(if score > HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if score > MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// What screening did with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenAction {
    /// Held for owner review.
    Hold,
    /// Verified immediately.
    Clear,
    /// Left pending.
    Allow,
}

/// A classifier verdict for one transaction.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub level: RiskLevel,
    /// Human-readable risk factors. Used as the hold reason when present.
    pub explanation: Option<String>,
}

/// Result of screening one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenOutcome {
    pub tx_hash: TxHash,
    pub risk_level: RiskLevel,
    pub action: ScreenAction,
    /// Ledger status after screening.
    pub status: TransactionStatus,
    /// Reason recorded on the ledger, empty when left pending.
    pub reason: String,
}

impl ScreeningConfig {
    fn action_for(&self, level: RiskLevel) -> ScreenAction {
        if level >= self.hold_threshold {
            ScreenAction::Hold
        } else if self.auto_clear_low_risk && level == RiskLevel::Low {
            ScreenAction::Clear
        } else {
            ScreenAction::Allow
        }
    }
}

/// Submits `tx_hash` and applies the screening policy to it.
///
/// When the policy calls for a hold or clear, the submission itself is
/// relayer-only ([`Ledger::relay_tx_hash`]), so an unauthorized screener
/// creates no record.
///
/// # Errors
///
/// Returns [`guard_contracts::LedgerError::Unauthorized`] with nothing submitted if the policy
/// calls for a hold or clear and `relayer` lacks relayer rights. Otherwise
/// returns whatever the failing ledger call returned; earlier calls in the
/// sequence stay committed.
pub fn screen(
    ledger: &Ledger,
    config: &ScreeningConfig,
    relayer: &Address,
    tx_hash: TxHash,
    sender: Address,
    amount: u64,
    assessment: Assessment,
) -> LedgerResult<ScreenOutcome> {
    let action = config.action_for(assessment.level);

    let submitted = match action {
        ScreenAction::Allow => ledger.submit_tx_hash(tx_hash, sender, amount)?,
        ScreenAction::Hold | ScreenAction::Clear => {
            ledger.relay_tx_hash(relayer, tx_hash, sender, amount)?
        }
    };

    let (last, reason) = match action {
        ScreenAction::Hold => {
            let reason = assessment
                .explanation
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| format!("risk: {}", assessment.level));
            let ev = ledger.hold_transaction(relayer, tx_hash, reason.clone())?;
            (ev, reason)
        }
        ScreenAction::Clear => {
            let ev = ledger.set_verification(relayer, tx_hash, true, AUTO_CLEAR_REASON)?;
            (ev, AUTO_CLEAR_REASON.to_string())
        }
        ScreenAction::Allow => (submitted, String::new()),
    };

    tracing::info!(
        tx_hash = %tx_hash,
        risk = %assessment.level,
        action = ?action,
        "transaction screened"
    );

    Ok(ScreenOutcome {
        tx_hash,
        risk_level: assessment.level,
        action,
        status: last.kind.resulting_status().into(),
        reason,
    })
}
