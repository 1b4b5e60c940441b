use serde::{Deserialize, Serialize};
use tourbook_core::PriceSplit;

use crate::tour::Tour;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i64 = 10_000;

/// Deposit collected at booking time: 30%.
pub const DEFAULT_DEPOSIT_RATIO_BPS: u32 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("Total price must be positive, got {0}")]
    NonPositiveTotal(i64),

    #[error("Deposit ratio must be within 1..=10000 basis points, got {0}")]
    InvalidRatio(u32),

    #[error("Price arithmetic overflowed")]
    Overflow,
}

/// Splits a total into deposit and remaining balance.
///
/// The deposit is `total * ratio` rounded half-up to the minor unit; the remaining
/// balance is derived by subtraction so the two always sum to the total.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositPolicy {
    ratio_bps: u32,
}

impl Default for DepositPolicy {
    fn default() -> Self {
        Self {
            ratio_bps: DEFAULT_DEPOSIT_RATIO_BPS,
        }
    }
}

impl DepositPolicy {
    pub fn new(ratio_bps: u32) -> Result<Self, PricingError> {
        if ratio_bps == 0 || i64::from(ratio_bps) > BPS_SCALE {
            return Err(PricingError::InvalidRatio(ratio_bps));
        }
        Ok(Self { ratio_bps })
    }

    pub fn ratio_bps(&self) -> u32 {
        self.ratio_bps
    }

    /// The policy that applies to a tour: its own ratio if it has one.
    pub fn for_tour(&self, tour: &Tour) -> Result<Self, PricingError> {
        match tour.deposit_ratio_bps {
            Some(ratio) => Self::new(ratio),
            None => Ok(*self),
        }
    }

    pub fn split(&self, total_cents: i64) -> Result<PriceSplit, PricingError> {
        if total_cents <= 0 {
            return Err(PricingError::NonPositiveTotal(total_cents));
        }

        let scaled = total_cents
            .checked_mul(i64::from(self.ratio_bps))
            .and_then(|v| v.checked_add(BPS_SCALE / 2))
            .ok_or(PricingError::Overflow)?;
        let deposit_cents = scaled / BPS_SCALE;

        Ok(PriceSplit {
            total_cents,
            deposit_cents,
            remaining_cents: total_cents - deposit_cents,
        })
    }
}

/// Split with the default 30% ratio.
pub fn compute_split(total_cents: i64) -> Result<PriceSplit, PricingError> {
    DepositPolicy::default().split(total_cents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::tests::sample_tour;

    #[test]
    fn test_hundred_euros_splits_thirty_seventy() {
        let split = compute_split(10_000).unwrap();
        assert_eq!(split.deposit_cents, 3_000);
        assert_eq!(split.remaining_cents, 7_000);
    }

    #[test]
    fn test_rounds_half_up() {
        // 0.05 * 30% = 0.015 -> 0.02
        assert_eq!(compute_split(5).unwrap().deposit_cents, 2);
        // 0.01 * 30% = 0.003 -> 0.00
        assert_eq!(compute_split(1).unwrap().deposit_cents, 0);
        // 333.33 * 30% = 99.999 -> 100.00
        assert_eq!(compute_split(33_333).unwrap().deposit_cents, 10_000);
    }

    #[test]
    fn test_deposit_plus_remaining_is_total() {
        for policy in [DepositPolicy::default(), DepositPolicy::new(2_500).unwrap(), DepositPolicy::new(3_333).unwrap()] {
            for total in (1..5_000).chain([99_999, 123_457, 1_000_001]) {
                let split = policy.split(total).unwrap();
                assert_eq!(split.deposit_cents + split.remaining_cents, total);
                assert!(split.deposit_cents >= 0 && split.remaining_cents >= 0);
            }
        }
    }

    #[test]
    fn test_rejects_non_positive_totals() {
        assert_eq!(compute_split(0), Err(PricingError::NonPositiveTotal(0)));
        assert_eq!(compute_split(-100), Err(PricingError::NonPositiveTotal(-100)));
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(DepositPolicy::new(0).is_err());
        assert!(DepositPolicy::new(10_001).is_err());
        assert!(DepositPolicy::new(10_000).is_ok());
    }

    #[test]
    fn test_tour_override() {
        let mut tour = sample_tour();
        let base = DepositPolicy::default();
        assert_eq!(base.for_tour(&tour).unwrap().ratio_bps(), 3_000);

        tour.deposit_ratio_bps = Some(5_000);
        let split = base.for_tour(&tour).unwrap().split(10_000).unwrap();
        assert_eq!(split.deposit_cents, 5_000);
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(compute_split(i64::MAX), Err(PricingError::Overflow));
    }
}
