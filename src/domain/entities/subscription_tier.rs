use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::billing_period::BillingPeriod;

/// Subscription plan a cabinet pays for, priced per seat.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "subscription_tier", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[derive(Default)]
pub enum SubscriptionTier {
    /// Entry tier for a single practitioner.
    #[default]
    Essentiel,
    /// Small practices, 2 to 10 seats.
    Professionnel,
    /// Firms of any size.
    CabinetPlus,
}

/// Inclusive seat bounds of a tier. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeatRange {
    pub min: i32,
    pub max: Option<i32>,
}

impl SeatRange {
    pub fn contains(&self, seats: i32) -> bool {
        seats >= self.min && self.max.is_none_or(|max| seats <= max)
    }
}

impl std::fmt::Display for SeatRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "exactly {}", self.min),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "{} or more", self.min),
        }
    }
}

/// Yearly plans get 10% off twelve monthly payments.
const YEARLY_DISCOUNT_PERCENT: i64 = 10;

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 3] = [
        SubscriptionTier::Essentiel,
        SubscriptionTier::Professionnel,
        SubscriptionTier::CabinetPlus,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Essentiel => "Essentiel",
            SubscriptionTier::Professionnel => "Professionnel",
            SubscriptionTier::CabinetPlus => "Cabinet+",
        }
    }

    pub fn seat_range(&self) -> SeatRange {
        match self {
            SubscriptionTier::Essentiel => SeatRange { min: 1, max: Some(1) },
            SubscriptionTier::Professionnel => SeatRange { min: 2, max: Some(10) },
            SubscriptionTier::CabinetPlus => SeatRange { min: 1, max: None },
        }
    }

    /// Published monthly price per seat, in whole euros.
    fn monthly_price_eur(&self) -> i64 {
        match self {
            SubscriptionTier::Essentiel => 45,
            SubscriptionTier::Professionnel => 69,
            SubscriptionTier::CabinetPlus => 99,
        }
    }

    /// Per-seat price for one cycle of `period`, in cents.
    ///
    /// The yearly price is rounded to whole euros.
    pub fn seat_price_cents(&self, period: BillingPeriod) -> i64 {
        let monthly = self.monthly_price_eur();
        let euros = match period {
            BillingPeriod::Monthly => monthly,
            BillingPeriod::Yearly => {
                let tenths = monthly * 12 * (100 - YEARLY_DISCOUNT_PERCENT) / 10;
                (tenths + 5) / 10
            }
        };
        euros * 100
    }
}
