//! Crowdfunding campaigns and their lifecycle.
//!
//! A campaign is `funding` until its deadline passes. From then on the finalizer
//! moves it, exactly once, to `success` (pledged total reached the target) or
//! `fail` (it did not). A failed campaign's orders must be refunded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{DomainError, DomainResult, ProductId};

/// Campaign status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdfundingStatus {
    /// Accepting pledges; the only non-terminal state.
    Funding,
    Success,
    Fail,
}

impl CrowdfundingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdfundingStatus::Funding => "funding",
            CrowdfundingStatus::Success => "success",
            CrowdfundingStatus::Fail => "fail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CrowdfundingStatus::Funding)
    }
}

impl core::fmt::Display for CrowdfundingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for CrowdfundingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "funding" => Ok(CrowdfundingStatus::Funding),
            "success" => Ok(CrowdfundingStatus::Success),
            "fail" => Ok(CrowdfundingStatus::Fail),
            other => Err(DomainError::validation(format!("unknown crowdfunding status: {other}"))),
        }
    }
}

/// Admin-editable campaign terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdfundingTerms {
    pub target_amount: Decimal,
    pub end_at: DateTime<Utc>,
}

/// Crowdfunding campaign attached one-to-one to a crowdfunding product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdfundingProduct {
    pub product_id: ProductId,
    pub target_amount: Decimal,
    /// Sum of paid pledges so far.
    pub total_amount: Decimal,
    pub user_count: u32,
    pub end_at: DateTime<Utc>,
    pub status: CrowdfundingStatus,
}

impl CrowdfundingProduct {
    /// Open a new campaign with nothing pledged yet.
    pub fn open(product_id: ProductId, terms: CrowdfundingTerms) -> Self {
        Self {
            product_id,
            target_amount: terms.target_amount,
            total_amount: Decimal::ZERO,
            user_count: 0,
            end_at: terms.end_at,
            status: CrowdfundingStatus::Funding,
        }
    }

    pub fn terms(&self) -> CrowdfundingTerms {
        CrowdfundingTerms {
            target_amount: self.target_amount,
            end_at: self.end_at,
        }
    }

    /// Replace the terms. Only a campaign that is still funding may change.
    pub fn revise_terms(&mut self, terms: CrowdfundingTerms) -> DomainResult<()> {
        if terms == self.terms() {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "campaign already finished with status '{}'; its terms can no longer change",
                self.status
            )));
        }
        self.target_amount = terms.target_amount;
        self.end_at = terms.end_at;
        Ok(())
    }

    /// Progress towards the target in percent, rounded to two places.
    pub fn percent(&self) -> Decimal {
        if self.target_amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.total_amount / self.target_amount * Decimal::ONE_HUNDRED).round_dp(2)
    }

    /// Deadline reached (inclusive).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.end_at <= now
    }

    pub fn target_reached(&self) -> bool {
        self.total_amount >= self.target_amount
    }
}

/// Outcome of finalizing a due campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// Target reached: mark `success`, nothing else to do.
    Succeeded,
    /// Target missed: mark `fail` and refund the campaign's orders.
    Failed,
}

impl Finalization {
    pub fn status(&self) -> CrowdfundingStatus {
        match self {
            Finalization::Succeeded => CrowdfundingStatus::Success,
            Finalization::Failed => CrowdfundingStatus::Fail,
        }
    }

    pub fn requires_refund(&self) -> bool {
        matches!(self, Finalization::Failed)
    }
}

/// Decide the terminal state of a campaign at `now`.
///
/// Returns `None` while the campaign is still running or once it has already left
/// `funding`; finalization therefore happens at most once per campaign.
pub fn finalize(campaign: &CrowdfundingProduct, now: DateTime<Utc>) -> Option<Finalization> {
    if campaign.status != CrowdfundingStatus::Funding || !campaign.is_due(now) {
        return None;
    }

    if campaign.target_reached() {
        Some(Finalization::Succeeded)
    } else {
        Some(Finalization::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn campaign(target: Decimal, total: Decimal, end_at: DateTime<Utc>) -> CrowdfundingProduct {
        CrowdfundingProduct {
            total_amount: total,
            ..CrowdfundingProduct::open(
                ProductId::new(),
                CrowdfundingTerms {
                    target_amount: target,
                    end_at,
                },
            )
        }
    }

    #[test]
    fn reached_target_succeeds_without_refund() {
        let now = Utc::now();
        let c = campaign(dec!(10000), dec!(12000), now - Duration::days(1));

        let outcome = finalize(&c, now).unwrap();
        assert_eq!(outcome, Finalization::Succeeded);
        assert_eq!(outcome.status(), CrowdfundingStatus::Success);
        assert!(!outcome.requires_refund());
    }

    #[test]
    fn missed_target_fails_and_requires_refund() {
        let now = Utc::now();
        let c = campaign(dec!(10000), dec!(4000), now - Duration::days(1));

        let outcome = finalize(&c, now).unwrap();
        assert_eq!(outcome, Finalization::Failed);
        assert_eq!(outcome.status(), CrowdfundingStatus::Fail);
        assert!(outcome.requires_refund());
    }

    #[test]
    fn exactly_reaching_target_counts_as_success() {
        let now = Utc::now();
        let c = campaign(dec!(500.00), dec!(500.00), now - Duration::minutes(1));
        assert_eq!(finalize(&c, now), Some(Finalization::Succeeded));
    }

    #[test]
    fn deadline_is_inclusive() {
        let now = Utc::now();
        let c = campaign(dec!(100), dec!(0), now);
        assert_eq!(finalize(&c, now), Some(Finalization::Failed));
    }

    #[test]
    fn running_campaign_is_left_alone() {
        let now = Utc::now();
        let c = campaign(dec!(100), dec!(1000), now + Duration::hours(1));
        assert_eq!(finalize(&c, now), None);
    }

    #[test]
    fn finished_campaign_is_never_finalized_again() {
        let now = Utc::now();
        let mut c = campaign(dec!(100), dec!(10), now - Duration::days(3));
        c.status = CrowdfundingStatus::Fail;
        assert_eq!(finalize(&c, now), None);
        c.status = CrowdfundingStatus::Success;
        assert_eq!(finalize(&c, now), None);
    }

    #[test]
    fn percent_is_rounded_to_two_places() {
        let now = Utc::now();
        let c = campaign(dec!(3), dec!(1), now);
        assert_eq!(c.percent(), dec!(33.33));
        let c = campaign(dec!(10000), dec!(12000), now);
        assert_eq!(c.percent(), dec!(120));
    }

    #[test]
    fn terms_cannot_change_after_finish() {
        let now = Utc::now();
        let mut c = campaign(dec!(100), dec!(10), now);
        let same = c.terms();
        let later = CrowdfundingTerms {
            target_amount: dec!(100),
            end_at: now + Duration::days(7),
        };

        c.revise_terms(later).unwrap();
        assert_eq!(c.end_at, later.end_at);

        c.status = CrowdfundingStatus::Fail;
        assert!(c.revise_terms(later).is_ok(), "unchanged terms are accepted");
        assert!(matches!(c.revise_terms(same), Err(DomainError::Conflict(_))));
    }

    proptest! {
        #[test]
        fn due_funding_campaigns_always_resolve_by_comparing_amounts(
            target in 1i64..1_000_000,
            total in 0i64..2_000_000,
            hours_past in 0i64..10_000,
        ) {
            let now = Utc::now();
            let c = campaign(Decimal::from(target), Decimal::from(total), now - Duration::hours(hours_past));
            let outcome = finalize(&c, now).unwrap();
            prop_assert_eq!(outcome.requires_refund(), total < target);
        }

        #[test]
        fn campaigns_before_deadline_never_resolve(
            target in 1i64..1_000_000,
            total in 0i64..2_000_000,
            hours_left in 1i64..10_000,
        ) {
            let now = Utc::now();
            let c = campaign(Decimal::from(target), Decimal::from(total), now + Duration::hours(hours_left));
            prop_assert!(finalize(&c, now).is_none());
        }
    }
}
