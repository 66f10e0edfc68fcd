use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::{
    ports::payment_provider::{CheckoutSession, CheckoutSessionRequest, PaymentProviderPort},
    use_cases::cabinet::MemberRepo,
};
use crate::domain::{
    entities::{billing_period::BillingPeriod, subscription_tier::SubscriptionTier},
    price_catalog::PriceCatalog,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub quantity: i32,
    /// Absent for a brand-new signup.
    pub cabinet_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Starts hosted checkouts. Writes nothing locally: the cabinet is updated
/// when the provider confirms the checkout through a webhook.
#[derive(Clone)]
pub struct CheckoutUseCases {
    provider: Arc<dyn PaymentProviderPort>,
    members: Arc<dyn MemberRepo>,
    catalog: Arc<PriceCatalog>,
}

impl CheckoutUseCases {
    pub fn new(
        provider: Arc<dyn PaymentProviderPort>,
        members: Arc<dyn MemberRepo>,
        catalog: Arc<PriceCatalog>,
    ) -> Self {
        Self {
            provider,
            members,
            catalog,
        }
    }

    #[instrument(skip(self, request), fields(tier = %request.tier, quantity = request.quantity))]
    pub async fn start_checkout(
        &self,
        acting_user: Option<Uuid>,
        request: CheckoutRequest,
    ) -> AppResult<CheckoutSession> {
        let range = request.tier.seat_range();
        if !range.contains(request.quantity) {
            return Err(AppError::SeatsOutOfRange {
                tier: request.tier,
                range,
                requested: request.quantity,
            });
        }

        validate_redirect_url(&request.success_url, "successUrl")?;
        validate_redirect_url(&request.cancel_url, "cancelUrl")?;

        let mut customer_email = request
            .customer_email
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty());

        if let Some(cabinet_id) = request.cabinet_id {
            let user_id = acting_user.ok_or(AppError::Unauthorized)?;
            let member = self
                .members
                .get_membership(cabinet_id, user_id)
                .await?
                .filter(|m| m.is_founder())
                .ok_or(AppError::Forbidden)?;
            customer_email.get_or_insert(member.email);
        }

        let price_id = self
            .catalog
            .price_for(request.tier, request.billing_period)
            .ok_or_else(|| {
                tracing::error!(
                    tier = %request.tier,
                    billing_period = %request.billing_period,
                    "No provider price configured for plan"
                );
                AppError::Configuration(format!(
                    "No price configured for the {} {} plan",
                    request.tier, request.billing_period
                ))
            })?
            .to_string();

        let session = self
            .provider
            .create_checkout_session(&CheckoutSessionRequest {
                price_id,
                tier: request.tier,
                billing_period: request.billing_period,
                quantity: request.quantity,
                cabinet_id: request.cabinet_id,
                customer_email,
                success_url: request.success_url,
                cancel_url: request.cancel_url,
                idempotency_key: generate_idempotency_key("checkout"),
            })
            .await?;

        tracing::info!(
            session_id = %session.session_id,
            cabinet_id = ?request.cabinet_id,
            "Checkout session created"
        );

        Ok(session)
    }
}

/// Key sent with mutating provider calls so a retried request is applied
/// once.
pub fn generate_idempotency_key(operation: &str) -> String {
    format!("{}_{}", operation, Uuid::new_v4())
}

pub(crate) fn validate_redirect_url(raw: &str, field: &str) -> AppResult<()> {
    let url = Url::parse(raw)
        .map_err(|_| AppError::InvalidInput(format!("{field} must be an absolute URL")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(AppError::InvalidInput(format!(
            "{field} must use http or https"
        ))),
    }
}
