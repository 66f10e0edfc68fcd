//! Pure state transitions driven by payment-provider events.
//!
//! Fetching and persisting the cabinet happens elsewhere; `reduce` only
//! maps the current subscription state and one event to the next state.

use chrono::{DateTime, Months, Utc};

use crate::domain::{
    entities::{
        billing_period::BillingPeriod, cabinet::SubscriptionState,
        subscription_status::SubscriptionStatus, subscription_tier::SubscriptionTier,
    },
    price_catalog::PriceCatalog,
};

/// New subscriptions commit for one year unless the checkout said otherwise.
pub const COMMITMENT_MONTHS: u32 = 12;

/// Provider view of a subscription at the time of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: String,
    pub customer_id: String,
    pub item_id: Option<String>,
    pub price_id: Option<String>,
    /// Recurring interval of the price ("month", "year").
    pub interval: Option<String>,
    pub quantity: Option<i32>,
    pub status: SubscriptionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Billing period written into checkout metadata.
    pub billing_period_hint: Option<BillingPeriod>,
    /// Commitment end written into checkout metadata.
    pub commitment_end_hint: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    /// Tier of the subscription price, or the entry tier when the price is
    /// not in the catalogue.
    pub fn tier(&self, catalog: &PriceCatalog) -> SubscriptionTier {
        self.price_id
            .as_deref()
            .and_then(|price| catalog.plan_for(price))
            .map(|plan| plan.tier)
            .unwrap_or_default()
    }

    pub fn has_known_price(&self, catalog: &PriceCatalog) -> bool {
        self.price_id
            .as_deref()
            .is_some_and(|price| catalog.plan_for(price).is_some())
    }

    pub fn billing_period(&self, catalog: &PriceCatalog) -> Option<BillingPeriod> {
        self.price_id
            .as_deref()
            .and_then(|price| catalog.plan_for(price))
            .map(|plan| plan.period)
            .or(self.billing_period_hint)
            .or_else(|| self.interval.as_deref().map(BillingPeriod::from_interval))
    }

    fn seats(&self) -> i32 {
        self.quantity.filter(|q| *q > 0).unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    CheckoutCompleted(SubscriptionSnapshot),
    /// One-off payment for additional seats outside the subscription.
    SeatsPurchased { seats: i32 },
    SubscriptionUpdated(SubscriptionSnapshot),
    SubscriptionCanceled,
    InvoicePaid,
    InvoicePaymentFailed,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::CheckoutCompleted(_) => "checkout_completed",
            LifecycleEvent::SeatsPurchased { .. } => "seats_purchased",
            LifecycleEvent::SubscriptionUpdated(_) => "subscription_updated",
            LifecycleEvent::SubscriptionCanceled => "subscription_canceled",
            LifecycleEvent::InvoicePaid => "invoice_paid",
            LifecycleEvent::InvoicePaymentFailed => "invoice_payment_failed",
        }
    }
}

pub fn reduce(
    state: &SubscriptionState,
    event: &LifecycleEvent,
    catalog: &PriceCatalog,
) -> SubscriptionState {
    let mut next = state.clone();

    match event {
        LifecycleEvent::CheckoutCompleted(snapshot) => {
            next.status = Some(if snapshot.status == SubscriptionStatus::Trialing {
                SubscriptionStatus::Trialing
            } else {
                SubscriptionStatus::Active
            });
            next.tier = snapshot.tier(catalog);
            next.billing_period = snapshot
                .billing_period(catalog)
                .unwrap_or(state.billing_period);
            next.seats = snapshot.seats();
            next.stripe_customer_id = Some(snapshot.customer_id.clone());
            next.stripe_subscription_id = Some(snapshot.subscription_id.clone());
            next.stripe_subscription_item_id = snapshot.item_id.clone();
            next.started_at = snapshot.started_at.or(state.started_at);
            next.current_period_end = snapshot.current_period_end;
            next.commitment_end_date = snapshot.commitment_end_hint.or_else(|| {
                next.started_at
                    .and_then(|start| start.checked_add_months(Months::new(COMMITMENT_MONTHS)))
            });
        }
        LifecycleEvent::SeatsPurchased { seats } => {
            next.seats = *seats;
        }
        LifecycleEvent::SubscriptionUpdated(snapshot) => {
            next.tier = snapshot.tier(catalog);
            if let Some(period) = snapshot
                .price_id
                .as_deref()
                .and_then(|price| catalog.plan_for(price))
                .map(|plan| plan.period)
            {
                next.billing_period = period;
            }
            next.status = Some(snapshot.status);
            next.current_period_end = snapshot.current_period_end;
            next.seats = snapshot.seats();
            next.stripe_subscription_item_id = snapshot
                .item_id
                .clone()
                .or_else(|| state.stripe_subscription_item_id.clone());
        }
        LifecycleEvent::SubscriptionCanceled => {
            next.status = Some(SubscriptionStatus::Canceled);
        }
        LifecycleEvent::InvoicePaid => {}
        LifecycleEvent::InvoicePaymentFailed => {
            next.status = Some(SubscriptionStatus::PastDue);
        }
    }

    next
}
