use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// How often a cabinet is billed.
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
#[sqlx(type_name = "billing_period", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[derive(Default)]
pub enum BillingPeriod {
    #[default]
    Monthly,
    Yearly,
}

impl BillingPeriod {
    /// Length of one billing cycle in calendar months.
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Yearly => 12,
        }
    }

    /// Map a provider recurring interval ("month", "year") to a period.
    pub fn from_interval(interval: &str) -> Self {
        if interval.eq_ignore_ascii_case("year") {
            BillingPeriod::Yearly
        } else {
            BillingPeriod::Monthly
        }
    }
}
