use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    billing_period::BillingPeriod, subscription_status::SubscriptionStatus,
    subscription_tier::SubscriptionTier,
};

/// Billing-relevant part of a cabinet record. This is the state the
/// webhook reducer and the seat adjuster read and write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionState {
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    /// Paid seats, i.e. the maximum number of active members.
    pub seats: i32,
    /// `None` until the first checkout completes.
    pub status: Option<SubscriptionStatus>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_subscription_item_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub commitment_end_date: Option<DateTime<Utc>>,
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self {
            tier: SubscriptionTier::default(),
            billing_period: BillingPeriod::default(),
            seats: 1,
            status: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_subscription_item_id: None,
            started_at: None,
            current_period_end: None,
            commitment_end_date: None,
        }
    }
}

impl SubscriptionState {
    pub fn is_active(&self) -> bool {
        self.status.is_some_and(|s| s.is_active())
    }
}

/// A professional practice: the billing unit.
#[derive(Debug, Clone, Serialize)]
pub struct Cabinet {
    pub id: Uuid,
    pub name: String,
    pub siret: Option<String>,
    pub address: Option<String>,
    #[serde(flatten)]
    pub subscription: SubscriptionState,
    /// Bumped on every billing write; seat changes compare-and-swap on it.
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
