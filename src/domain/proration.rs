//! Advisory pro-ration estimate for mid-cycle seat changes. The payment
//! provider computes the real charge.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use crate::domain::entities::{billing_period::BillingPeriod, subscription_tier::SubscriptionTier};

/// Used when the current period end is unknown.
pub const FALLBACK_REMAINING_DAYS: i64 = 15;
pub const FALLBACK_TOTAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatChange {
    pub tier: SubscriptionTier,
    pub period: BillingPeriod,
    pub current_seats: i32,
    pub new_seats: i32,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProrataEstimate {
    /// Charge in cents. Always 0 for decreases.
    pub amount: i64,
    pub currency: String,
    pub is_adding: bool,
    pub remaining_days: i64,
    pub total_days: i64,
}

/// Whole days from `now` until `period_end`, never negative.
pub fn remaining_days(now: DateTime<Utc>, period_end: DateTime<Utc>) -> i64 {
    (period_end - now).num_days().max(0)
}

/// Length of the cycle ending at `period_end`, found by stepping back one
/// cycle.
pub fn cycle_days(period_end: DateTime<Utc>, period: BillingPeriod) -> i64 {
    period_end
        .checked_sub_months(Months::new(period.months()))
        .map(|start| (period_end - start).num_days())
        .filter(|days| *days > 0)
        .unwrap_or(FALLBACK_TOTAL_DAYS)
}

/// `ceil(|delta| * seat_price * min(1, remaining / total))` for increases.
pub fn estimate(change: &SeatChange, now: DateTime<Utc>) -> ProrataEstimate {
    let (remaining, total) = match change.period_end {
        Some(end) => (remaining_days(now, end), cycle_days(end, change.period)),
        None => (FALLBACK_REMAINING_DAYS, FALLBACK_TOTAL_DAYS),
    };

    let delta = i64::from(change.new_seats) - i64::from(change.current_seats);
    let is_adding = delta > 0;

    let amount = if is_adding {
        let billable_days = remaining.min(total);
        let numerator = delta * change.tier.seat_price_cents(change.period) * billable_days;
        // total > 0 is guaranteed by cycle_days and the fallback
        (numerator + total - 1) / total
    } else {
        0
    };

    ProrataEstimate {
        amount,
        currency: "eur".to_string(),
        is_adding,
        remaining_days: remaining,
        total_days: total,
    }
}
