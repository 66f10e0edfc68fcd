//! Payment provider abstraction.
//!
//! Use cases talk to the provider only through `PaymentProviderPort`, so
//! tests can substitute an in-memory fake. Incoming webhook payloads are
//! decoded by the adapter into `ProviderEvent` before they reach the
//! reconciler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::{
    entities::{
        billing_period::BillingPeriod, invoice::ProviderInvoice,
        subscription_tier::SubscriptionTier,
    },
    proration::ProrataEstimate,
    reducer::SubscriptionSnapshot,
};

/// Checkout metadata key holding the cabinet id.
pub const METADATA_CABINET_ID: &str = "cabinet_id";
pub const METADATA_BILLING_PERIOD: &str = "billing_period";
pub const METADATA_COMMITMENT_MONTHS: &str = "commitment_months";
pub const METADATA_COMMITMENT_END: &str = "commitment_end_date";
pub const METADATA_PAYMENT_TYPE: &str = "payment_type";
pub const METADATA_NEW_MEMBERS_COUNT: &str = "new_members_count";

/// `payment_type` of a one-off checkout that buys extra seats.
pub const PAYMENT_TYPE_MEMBERS_PRORATA: &str = "members_prorata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub quantity: i32,
    pub cabinet_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// One-off payment for extra seats, charged at the prorated amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatPurchaseRequest {
    pub cabinet_id: Uuid,
    pub cabinet_name: String,
    /// Seat count once the purchase is applied.
    pub seats: i32,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub idempotency_key: String,
}

/// Move a subscription's line item to another price and quantity.
/// Trialing subscriptions keep their trial end and are not prorated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    pub subscription_id: String,
    pub subscription_item_id: String,
    pub price_id: String,
    pub quantity: i32,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdate {
    pub subscription_item_id: String,
    pub quantity: i32,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdateResult {
    pub quantity: i32,
    /// Proration charged by the provider, when it reported one.
    pub prorata: Option<ProrataEstimate>,
}

/// A subscription as fetched from, or pushed by, the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub snapshot: SubscriptionSnapshot,
    /// Cabinet id from the subscription metadata, if it was set at checkout.
    pub cabinet_id: Option<Uuid>,
    pub latest_invoice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub cabinet_id: Option<Uuid>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<String>,
    pub invoice_id: Option<String>,
    pub payment_type: Option<String>,
    /// Seat count bought by a one-off seat purchase.
    pub purchased_seats: Option<i32>,
}

impl CompletedCheckout {
    pub fn is_seat_purchase(&self) -> bool {
        self.payment_type.as_deref() == Some(PAYMENT_TYPE_MEMBERS_PRORATA)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEventKind {
    CheckoutCompleted(CompletedCheckout),
    SubscriptionUpdated(ProviderSubscription),
    SubscriptionDeleted(ProviderSubscription),
    InvoicePaid(ProviderInvoice),
    InvoicePaymentFailed(ProviderInvoice),
    /// Any event type the reconciler does not act on.
    Unhandled(String),
}

impl ProviderEventKind {
    pub fn event_type(&self) -> &str {
        match self {
            ProviderEventKind::CheckoutCompleted(_) => "checkout.session.completed",
            ProviderEventKind::SubscriptionUpdated(_) => "customer.subscription.updated",
            ProviderEventKind::SubscriptionDeleted(_) => "customer.subscription.deleted",
            ProviderEventKind::InvoicePaid(_) => "invoice.paid",
            ProviderEventKind::InvoicePaymentFailed(_) => "invoice.payment_failed",
            ProviderEventKind::Unhandled(event_type) => event_type,
        }
    }
}

/// A verified, decoded webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub kind: ProviderEventKind,
}

#[async_trait]
pub trait PaymentProviderPort: Send + Sync {
    /// Create a hosted checkout session and return its redirect URL.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession>;

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription>;

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice>;

    /// Set the quantity of a subscription line item, invoicing the
    /// proration immediately.
    async fn update_subscription_item_quantity(
        &self,
        update: &QuantityUpdate,
    ) -> AppResult<QuantityUpdateResult>;

    /// Hosted one-off checkout for a seat purchase.
    async fn create_seat_purchase_session(
        &self,
        request: &SeatPurchaseRequest,
    ) -> AppResult<CheckoutSession>;

    /// Schedule cancellation at the end of the current period. Returns when
    /// the subscription will end, if the provider reported it.
    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
        idempotency_key: &str,
    ) -> AppResult<Option<DateTime<Utc>>>;

    /// Apply a plan change and return the subscription as it now stands.
    async fn change_plan(&self, change: &PlanChange) -> AppResult<ProviderSubscription>;
}
