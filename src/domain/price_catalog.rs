//! Mapping between provider price ids and (tier, billing period) pairs.
//!
//! Built once at start-up from configuration and shared read-only. Must
//! match the prices configured at the payment provider.

use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::entities::{billing_period::BillingPeriod, subscription_tier::SubscriptionTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePlan {
    pub tier: SubscriptionTier,
    pub period: BillingPeriod,
}

#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    by_price: HashMap<String, PricePlan>,
    by_plan: HashMap<(SubscriptionTier, BillingPeriod), String>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the price used for new checkouts of `tier`/`period`.
    pub fn with_price(
        mut self,
        tier: SubscriptionTier,
        period: BillingPeriod,
        price_id: impl Into<String>,
    ) -> Self {
        let price_id = price_id.into();
        self.by_price
            .insert(price_id.clone(), PricePlan { tier, period });
        self.by_plan.insert((tier, period), price_id);
        self
    }

    /// Register a price that is recognised on incoming events but never
    /// used for new checkouts (legacy or test-mode prices).
    pub fn with_alias(
        mut self,
        price_id: impl Into<String>,
        tier: SubscriptionTier,
        period: BillingPeriod,
    ) -> Self {
        self.by_price
            .entry(price_id.into())
            .or_insert(PricePlan { tier, period });
        self
    }

    pub fn price_for(&self, tier: SubscriptionTier, period: BillingPeriod) -> Option<&str> {
        self.by_plan.get(&(tier, period)).map(String::as_str)
    }

    pub fn plan_for(&self, price_id: &str) -> Option<PricePlan> {
        self.by_price.get(price_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_price.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_price.len()
    }
}

/// Parse `price_id=tier:period` pairs separated by commas.
///
/// ```text
/// price_123=professionnel:monthly,price_456=cabinet-plus:yearly
/// ```
pub fn parse_price_aliases(raw: &str) -> Result<Vec<(String, PricePlan)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (price_id, plan) = entry
                .split_once('=')
                .ok_or_else(|| format!("missing '=' in price alias '{entry}'"))?;
            let (tier, period) = plan
                .split_once(':')
                .ok_or_else(|| format!("missing ':' in price alias '{entry}'"))?;
            let tier = SubscriptionTier::from_str(tier.trim())
                .map_err(|_| format!("unknown tier '{tier}' in price alias '{entry}'"))?;
            let period = BillingPeriod::from_str(period.trim())
                .map_err(|_| format!("unknown billing period '{period}' in price alias '{entry}'"))?;
            let price_id = price_id.trim();
            if price_id.is_empty() {
                return Err(format!("empty price id in price alias '{entry}'"));
            }
            Ok((price_id.to_string(), PricePlan { tier, period }))
        })
        .collect()
}
