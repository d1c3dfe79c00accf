//! Connect account domain types
//!
//! A cleaner's sub-account with the payment processor, mirrored locally so
//! payouts can check eligibility without a round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local mirror of a cleaner's payout account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectAccount {
    pub cleaner_id: Uuid,
    pub account_id: String,
    pub country: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub disabled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectAccount {
    pub fn apply_status(&mut self, status: &AccountStatus, now: DateTime<Utc>) {
        self.charges_enabled = status.charges_enabled;
        self.payouts_enabled = status.payouts_enabled;
        self.details_submitted = status.details_submitted;
        self.disabled_reason = status.disabled_reason.clone();
        self.updated_at = now;
    }

    /// Why a transfer to this account would be refused, if it would.
    pub fn payout_blocker(&self) -> Option<String> {
        if let Some(reason) = &self.disabled_reason {
            return Some(format!("payout account disabled: {}", reason));
        }
        if !self.payouts_enabled {
            return Some("payout account onboarding is not finished".to_string());
        }
        None
    }
}

/// Account capabilities as reported by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub disabled_reason: Option<String>,
}

/// Create connect account input
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConnectAccountInput {
    pub email: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "NO".to_string()
}

/// Onboarding link input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnboardingLinkInput {
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Hosted onboarding link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ConnectAccount {
        let now = Utc::now();
        ConnectAccount {
            cleaner_id: Uuid::new_v4(),
            account_id: "acct_123".to_string(),
            country: "NO".to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
            disabled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn enabled_account_has_no_blocker() {
        assert_eq!(account().payout_blocker(), None);
    }

    #[test]
    fn disabled_reason_blocks_payout() {
        let mut acct = account();
        acct.apply_status(
            &AccountStatus {
                account_id: acct.account_id.clone(),
                charges_enabled: false,
                payouts_enabled: false,
                details_submitted: true,
                disabled_reason: Some("requirements.past_due".to_string()),
            },
            Utc::now(),
        );
        assert!(acct
            .payout_blocker()
            .unwrap()
            .contains("requirements.past_due"));
    }
}
