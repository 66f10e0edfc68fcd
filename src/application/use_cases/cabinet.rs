use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::{
    billing_period::BillingPeriod,
    cabinet::{Cabinet, SubscriptionState},
    invoice::{Invoice, ProviderInvoice},
    member::CabinetMember,
    subscription_tier::SubscriptionTier,
};

#[async_trait]
pub trait CabinetRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Cabinet>>;
    async fn find_by_stripe_customer(&self, customer_id: &str) -> AppResult<Option<Cabinet>>;
    async fn find_by_stripe_subscription(&self, subscription_id: &str)
    -> AppResult<Option<Cabinet>>;

    /// Overwrite the billing fields and bump the version.
    async fn save_subscription_state(
        &self,
        id: Uuid,
        state: &SubscriptionState,
    ) -> AppResult<Cabinet>;

    /// Set the seat count and bump the version, only if the version still
    /// equals `expected_version`. `None` means another writer got there first.
    async fn update_seats(
        &self,
        id: Uuid,
        seats: i32,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>>;

    /// Switch plan after a provider-side plan change, under the same
    /// version check as `update_seats`.
    async fn update_plan(
        &self,
        id: Uuid,
        change: &PlanUpdate,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>>;
}

#[async_trait]
pub trait MemberRepo: Send + Sync {
    async fn get_membership(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<CabinetMember>>;
    async fn count_active(&self, cabinet_id: Uuid) -> AppResult<i64>;
    async fn find_founder(&self, cabinet_id: Uuid) -> AppResult<Option<CabinetMember>>;
    /// Cabinet of the member registered with `email`, if any.
    async fn find_cabinet_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>>;
}

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    /// Insert unless a row with the same provider invoice id exists.
    /// Returns true when a row was inserted.
    async fn insert_if_absent(&self, cabinet_id: Uuid, invoice: &ProviderInvoice)
    -> AppResult<bool>;
    /// Stamp the invoice's payment confirmation as sent. Returns true for
    /// the first caller only.
    async fn mark_confirmation_sent(&self, stripe_invoice_id: &str) -> AppResult<bool>;
    async fn list_by_cabinet(&self, cabinet_id: Uuid) -> AppResult<Vec<Invoice>>;
}

#[async_trait]
pub trait WebhookEventRepo: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> AppResult<bool>;
    async fn mark_processed(&self, event_id: &str, event_type: &str) -> AppResult<()>;
}

/// Local fields rewritten by a plan change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanUpdate {
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub seats: i32,
    pub stripe_subscription_item_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingOverview {
    pub cabinet: Cabinet,
    pub active_members: i64,
    pub invoices: Vec<Invoice>,
}

/// Load a cabinet for an operation only its founder may perform.
pub(crate) async fn load_for_founder(
    cabinets: &dyn CabinetRepo,
    members: &dyn MemberRepo,
    cabinet_id: Uuid,
    user_id: Uuid,
) -> AppResult<(Cabinet, CabinetMember)> {
    let cabinet = cabinets
        .get_by_id(cabinet_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let founder = members
        .get_membership(cabinet_id, user_id)
        .await?
        .filter(|m| m.is_founder())
        .ok_or(AppError::Forbidden)?;

    Ok((cabinet, founder))
}

/// Active-member floor first, then the tier's range.
pub(crate) async fn validate_seat_count(
    members: &dyn MemberRepo,
    cabinet_id: Uuid,
    tier: SubscriptionTier,
    seats: i32,
) -> AppResult<()> {
    let active = members.count_active(cabinet_id).await?;
    if i64::from(seats) < active {
        let active = i32::try_from(active).unwrap_or(i32::MAX);
        return Err(AppError::seats_below_active_members(seats, active));
    }

    let range = tier.seat_range();
    if !range.contains(seats) {
        return Err(AppError::SeatsOutOfRange {
            tier,
            range,
            requested: seats,
        });
    }

    Ok(())
}

#[derive(Clone)]
pub struct CabinetUseCases {
    cabinets: Arc<dyn CabinetRepo>,
    members: Arc<dyn MemberRepo>,
    invoices: Arc<dyn InvoiceRepo>,
}

impl CabinetUseCases {
    pub fn new(
        cabinets: Arc<dyn CabinetRepo>,
        members: Arc<dyn MemberRepo>,
        invoices: Arc<dyn InvoiceRepo>,
    ) -> Self {
        Self {
            cabinets,
            members,
            invoices,
        }
    }

    /// Subscription state, seat usage and invoices, visible to any member.
    #[instrument(skip(self))]
    pub async fn billing_overview(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<BillingOverview> {
        let cabinet = self
            .cabinets
            .get_by_id(cabinet_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.members
            .get_membership(cabinet_id, user_id)
            .await?
            .ok_or(AppError::Forbidden)?;

        let active_members = self.members.count_active(cabinet_id).await?;
        let invoices = self.invoices.list_by_cabinet(cabinet_id).await?;

        Ok(BillingOverview {
            cabinet,
            active_members,
            invoices,
        })
    }
}
