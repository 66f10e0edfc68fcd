use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::{
    ports::payment_provider::{
        CheckoutSession, PaymentProviderPort, QuantityUpdate, SeatPurchaseRequest,
    },
    use_cases::{
        cabinet::{CabinetRepo, MemberRepo, load_for_founder, validate_seat_count},
        checkout::{generate_idempotency_key, validate_redirect_url},
    },
};
use crate::domain::{
    entities::cabinet::Cabinet,
    proration::{self, ProrataEstimate, SeatChange},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatChangeResult {
    pub seats: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prorata: Option<ProrataEstimate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPurchaseInput {
    /// Seat count once the purchase is applied.
    pub seats: i32,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPurchaseSession {
    #[serde(flatten)]
    pub session: CheckoutSession,
    pub prorata: ProrataEstimate,
}

/// Seat count changes on an active subscription, made by the cabinet
/// founder. The provider is updated first; the cabinet is only written
/// once the provider accepted the new quantity.
#[derive(Clone)]
pub struct SeatUseCases {
    cabinets: Arc<dyn CabinetRepo>,
    members: Arc<dyn MemberRepo>,
    provider: Arc<dyn PaymentProviderPort>,
}

impl SeatUseCases {
    pub fn new(
        cabinets: Arc<dyn CabinetRepo>,
        members: Arc<dyn MemberRepo>,
        provider: Arc<dyn PaymentProviderPort>,
    ) -> Self {
        Self {
            cabinets,
            members,
            provider,
        }
    }

    /// Advisory cost of moving to `new_seats`, shown before confirming.
    #[instrument(skip(self))]
    pub async fn preview(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
        new_seats: i32,
    ) -> AppResult<ProrataEstimate> {
        let cabinet = self.load_for_founder(cabinet_id, user_id).await?;
        self.validate(&cabinet, new_seats).await?;
        Ok(proration::estimate(&seat_change(&cabinet, new_seats), Utc::now()))
    }

    #[instrument(skip(self))]
    pub async fn change_seats(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
        new_seats: i32,
    ) -> AppResult<SeatChangeResult> {
        let cabinet = self.load_for_founder(cabinet_id, user_id).await?;
        let subscription = &cabinet.subscription;

        if !subscription.is_active() {
            return Err(AppError::InvalidInput(
                "Seats can only be changed on an active subscription".into(),
            ));
        }
        let item_id = subscription
            .stripe_subscription_item_id
            .clone()
            .ok_or_else(|| {
                AppError::InvalidInput("Subscription has no line item to update".into())
            })?;

        self.validate(&cabinet, new_seats).await?;

        if new_seats == subscription.seats {
            return Ok(SeatChangeResult {
                seats: new_seats,
                prorata: None,
            });
        }

        let estimate = proration::estimate(&seat_change(&cabinet, new_seats), Utc::now());

        // The version read above guards the final write. Nothing is held
        // while the provider call is in flight, so a failed call leaves no
        // trace locally.
        let result = self
            .provider
            .update_subscription_item_quantity(&QuantityUpdate {
                subscription_item_id: item_id,
                quantity: new_seats,
                idempotency_key: format!("seats_{}_{}_{}", cabinet.id, cabinet.version, new_seats),
            })
            .await
            .inspect_err(|e| {
                tracing::error!(cabinet_id = %cabinet.id, error = %e, "Provider rejected seat change");
            })?;

        let saved = self
            .cabinets
            .update_seats(cabinet.id, new_seats, cabinet.version)
            .await?
            .ok_or_else(|| {
                // The provider already holds the new quantity; the
                // subscription.updated webhook brings the cabinet in line.
                tracing::warn!(
                    cabinet_id = %cabinet.id,
                    requested = new_seats,
                    "Cabinet changed during seat update, leaving it to the webhook"
                );
                concurrent_change()
            })?;

        tracing::info!(
            cabinet_id = %saved.id,
            from = subscription.seats,
            to = saved.subscription.seats,
            "Seat count changed"
        );

        let prorata = result
            .prorata
            .or_else(|| estimate.is_adding.then_some(estimate));

        Ok(SeatChangeResult {
            seats: saved.subscription.seats,
            prorata,
        })
    }

    /// Start a one-off checkout charging the prorated cost of extra seats.
    /// The seat count is applied when the provider confirms the payment.
    #[instrument(skip(self, input), fields(seats = input.seats))]
    pub async fn purchase_seats(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
        input: SeatPurchaseInput,
    ) -> AppResult<SeatPurchaseSession> {
        let (cabinet, founder) =
            load_for_founder(&*self.cabinets, &*self.members, cabinet_id, user_id).await?;
        let subscription = &cabinet.subscription;

        if !subscription.is_active() {
            return Err(AppError::InvalidInput(
                "Seats can only be purchased on an active subscription".into(),
            ));
        }

        self.validate(&cabinet, input.seats).await?;

        if input.seats <= subscription.seats {
            return Err(AppError::InvalidInput(format!(
                "A seat purchase must add seats: the cabinet already has {}",
                subscription.seats
            )));
        }

        validate_redirect_url(&input.success_url, "successUrl")?;
        validate_redirect_url(&input.cancel_url, "cancelUrl")?;

        let prorata = proration::estimate(&seat_change(&cabinet, input.seats), Utc::now());
        if prorata.amount <= 0 {
            return Err(AppError::InvalidInput(
                "Nothing left to charge in the current period".into(),
            ));
        }

        let session = self
            .provider
            .create_seat_purchase_session(&SeatPurchaseRequest {
                cabinet_id: cabinet.id,
                cabinet_name: cabinet.name.clone(),
                seats: input.seats,
                amount_cents: prorata.amount,
                currency: prorata.currency.clone(),
                customer_id: subscription.stripe_customer_id.clone(),
                customer_email: Some(founder.email),
                success_url: input.success_url,
                cancel_url: input.cancel_url,
                idempotency_key: generate_idempotency_key("seat_purchase"),
            })
            .await?;

        tracing::info!(
            cabinet_id = %cabinet.id,
            session_id = %session.session_id,
            amount = prorata.amount,
            "Seat purchase checkout created"
        );

        Ok(SeatPurchaseSession { session, prorata })
    }

    async fn load_for_founder(&self, cabinet_id: Uuid, user_id: Uuid) -> AppResult<Cabinet> {
        let (cabinet, _) =
            load_for_founder(&*self.cabinets, &*self.members, cabinet_id, user_id).await?;
        Ok(cabinet)
    }

    async fn validate(&self, cabinet: &Cabinet, new_seats: i32) -> AppResult<()> {
        validate_seat_count(
            &*self.members,
            cabinet.id,
            cabinet.subscription.tier,
            new_seats,
        )
        .await
    }
}

pub(crate) fn concurrent_change() -> AppError {
    AppError::Conflict(
        "The subscription changed while this request was processed. Reload and try again.".into(),
    )
}

fn seat_change(cabinet: &Cabinet, new_seats: i32) -> SeatChange {
    SeatChange {
        tier: cabinet.subscription.tier,
        period: cabinet.subscription.billing_period,
        current_seats: cabinet.subscription.seats,
        new_seats,
        period_end: cabinet.subscription.current_period_end,
    }
}
