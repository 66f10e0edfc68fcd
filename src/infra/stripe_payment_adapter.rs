use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        CheckoutSession, CheckoutSessionRequest, CompletedCheckout, METADATA_BILLING_PERIOD,
        METADATA_CABINET_ID, METADATA_COMMITMENT_END, METADATA_COMMITMENT_MONTHS,
        METADATA_NEW_MEMBERS_COUNT, METADATA_PAYMENT_TYPE, PAYMENT_TYPE_MEMBERS_PRORATA,
        PaymentProviderPort, PlanChange, ProviderEvent, ProviderEventKind, ProviderSubscription,
        QuantityUpdate, QuantityUpdateResult, SeatPurchaseRequest,
    },
    domain::{
        entities::{
            billing_period::BillingPeriod, invoice::ProviderInvoice,
            subscription_status::SubscriptionStatus,
        },
        reducer::{COMMITMENT_MONTHS, SubscriptionSnapshot},
    },
    infra::stripe_client::{
        StripeCheckoutSession, StripeClient, StripeInvoice, StripeSubscription,
        StripeWebhookEvent,
    },
};

/// Adapter that wraps StripeClient to implement PaymentProviderPort.
pub struct StripePaymentAdapter {
    client: StripeClient,
}

impl StripePaymentAdapter {
    pub fn new(client: StripeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentProviderPort for StripePaymentAdapter {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let params = checkout_session_params(request);
        let session = self
            .client
            .create_checkout_session(&params, &request.idempotency_key)
            .await?;

        let url = session.url.ok_or_else(|| {
            AppError::PaymentProvider("Checkout session has no redirect URL".into())
        })?;

        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription> {
        let subscription = self.client.get_subscription(subscription_id).await?;
        Ok(to_provider_subscription(subscription))
    }

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice> {
        let invoice = self.client.get_invoice(invoice_id).await?;
        Ok(to_provider_invoice(invoice))
    }

    async fn update_subscription_item_quantity(
        &self,
        update: &QuantityUpdate,
    ) -> AppResult<QuantityUpdateResult> {
        let item = self
            .client
            .update_subscription_item_quantity(
                &update.subscription_item_id,
                update.quantity,
                &update.idempotency_key,
            )
            .await?;

        // The item update does not report the proration invoice; callers
        // fall back to their own estimate.
        Ok(QuantityUpdateResult {
            quantity: item.quantity.unwrap_or(update.quantity),
            prorata: None,
        })
    }

    async fn create_seat_purchase_session(
        &self,
        request: &SeatPurchaseRequest,
    ) -> AppResult<CheckoutSession> {
        let params = seat_purchase_params(request);
        let session = self
            .client
            .create_checkout_session(&params, &request.idempotency_key)
            .await?;

        let url = session.url.ok_or_else(|| {
            AppError::PaymentProvider("Checkout session has no redirect URL".into())
        })?;

        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
        idempotency_key: &str,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let params = vec![("cancel_at_period_end".to_string(), "true".to_string())];
        let subscription = self
            .client
            .update_subscription(subscription_id, &params, idempotency_key)
            .await?;

        let period_end = subscription
            .current_period_end
            .or_else(|| subscription.first_item().and_then(|i| i.current_period_end));
        Ok(subscription
            .cancel_at
            .or(period_end.filter(|_| subscription.cancel_at_period_end))
            .and_then(timestamp_to_datetime))
    }

    async fn change_plan(&self, change: &PlanChange) -> AppResult<ProviderSubscription> {
        let current = self.client.get_subscription(&change.subscription_id).await?;
        let trial_end = trial_end_to_keep(&current);

        self.client
            .update_subscription_item(
                &change.subscription_item_id,
                &plan_item_params(change, trial_end.is_some()),
                &format!("{}_item", change.idempotency_key),
            )
            .await?;

        // The item update alone would end the trial.
        if let Some(trial_end) = trial_end {
            let params = vec![
                ("trial_end".to_string(), trial_end.to_string()),
                ("proration_behavior".to_string(), "none".to_string()),
            ];
            self.client
                .update_subscription(
                    &change.subscription_id,
                    &params,
                    &format!("{}_trial", change.idempotency_key),
                )
                .await?;
        }

        let updated = self.client.get_subscription(&change.subscription_id).await?;
        Ok(to_provider_subscription(updated))
    }
}

// ============================================================================
// Checkout
// ============================================================================

/// Form parameters of a subscription checkout: card and SEPA debit, billing
/// address required, French locale, cabinet and commitment metadata on both
/// the session and the subscription.
pub fn checkout_session_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "subscription".into()),
        ("line_items[0][price]".into(), request.price_id.clone()),
        ("line_items[0][quantity]".into(), request.quantity.to_string()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("payment_method_types[0]".into(), "card".into()),
        ("payment_method_types[1]".into(), "sepa_debit".into()),
        ("billing_address_collection".into(), "required".into()),
        ("locale".into(), "fr".into()),
    ];

    if let Some(email) = &request.customer_email {
        params.push(("customer_email".into(), email.clone()));
    }

    let mut metadata = vec![
        (METADATA_BILLING_PERIOD, request.billing_period.to_string()),
        (METADATA_COMMITMENT_MONTHS, COMMITMENT_MONTHS.to_string()),
    ];
    if let Some(cabinet_id) = request.cabinet_id {
        params.push(("client_reference_id".into(), cabinet_id.to_string()));
        metadata.push((METADATA_CABINET_ID, cabinet_id.to_string()));
    }

    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
        params.push((format!("subscription_data[metadata][{}]", key), value));
    }

    params
}

/// Form parameters of a one-off seat purchase: a single ad-hoc EUR line at
/// the prorated amount, with the new seat count in the session metadata.
pub fn seat_purchase_params(request: &SeatPurchaseRequest) -> Vec<(String, String)> {
    let cabinet_id = request.cabinet_id.to_string();
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        (
            "line_items[0][price_data][currency]".into(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            format!("Ajout de membres - {}", request.cabinet_name),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        ("line_items[0][quantity]".into(), "1".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("locale".into(), "fr".into()),
        ("client_reference_id".into(), cabinet_id.clone()),
        (format!("metadata[{}]", METADATA_CABINET_ID), cabinet_id),
        (
            format!("metadata[{}]", METADATA_NEW_MEMBERS_COUNT),
            request.seats.to_string(),
        ),
        (
            format!("metadata[{}]", METADATA_PAYMENT_TYPE),
            PAYMENT_TYPE_MEMBERS_PRORATA.to_string(),
        ),
    ];

    match (&request.customer_id, &request.customer_email) {
        (Some(customer), _) => params.push(("customer".into(), customer.clone())),
        (None, Some(email)) => params.push(("customer_email".into(), email.clone())),
        (None, None) => {}
    }

    params
}

/// Item parameters of a plan change. Trials are not prorated.
pub fn plan_item_params(change: &PlanChange, in_trial: bool) -> Vec<(String, String)> {
    let proration = if in_trial { "none" } else { "always_invoice" };
    vec![
        ("price".into(), change.price_id.clone()),
        ("quantity".into(), change.quantity.to_string()),
        ("proration_behavior".into(), proration.into()),
    ]
}

fn trial_end_to_keep(subscription: &StripeSubscription) -> Option<i64> {
    if subscription.status == "trialing" {
        subscription.trial_end
    } else {
        None
    }
}

// ============================================================================
// Webhook Events
// ============================================================================

/// Decode a verified webhook payload into a provider event.
pub fn parse_webhook_event(payload: &str) -> AppResult<ProviderEvent> {
    let event: StripeWebhookEvent = serde_json::from_str(payload)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    let kind = match event.event_type.as_str() {
        "checkout.session.completed" => {
            ProviderEventKind::CheckoutCompleted(to_completed_checkout(event.object()?))
        }
        "customer.subscription.updated" => {
            ProviderEventKind::SubscriptionUpdated(to_provider_subscription(event.object()?))
        }
        "customer.subscription.deleted" => {
            ProviderEventKind::SubscriptionDeleted(to_provider_subscription(event.object()?))
        }
        "invoice.paid" => ProviderEventKind::InvoicePaid(to_provider_invoice(event.object()?)),
        "invoice.payment_failed" => {
            ProviderEventKind::InvoicePaymentFailed(to_provider_invoice(event.object()?))
        }
        other => ProviderEventKind::Unhandled(other.to_string()),
    };

    Ok(ProviderEvent { id: event.id, kind })
}

fn to_completed_checkout(session: StripeCheckoutSession) -> CompletedCheckout {
    let cabinet_id = metadata_cabinet_id(&session.metadata).or_else(|| {
        session
            .client_reference_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
    });
    let customer_email = session
        .customer_details
        .and_then(|d| d.email)
        .or(session.customer_email)
        .map(|email| email.trim().to_lowercase());
    let purchased_seats = session
        .metadata
        .get(METADATA_NEW_MEMBERS_COUNT)
        .and_then(|count| count.trim().parse().ok());

    CompletedCheckout {
        session_id: session.id,
        cabinet_id,
        customer_id: session.customer,
        customer_email,
        subscription_id: session.subscription,
        invoice_id: session.invoice,
        payment_type: session.metadata.get(METADATA_PAYMENT_TYPE).cloned(),
        purchased_seats,
    }
}

fn to_provider_subscription(subscription: StripeSubscription) -> ProviderSubscription {
    let item = subscription.first_item();
    let snapshot = SubscriptionSnapshot {
        subscription_id: subscription.id.clone(),
        customer_id: subscription.customer.clone(),
        item_id: item.map(|i| i.id.clone()),
        price_id: item.map(|i| i.price.id.clone()),
        interval: item
            .and_then(|i| i.price.recurring.as_ref())
            .map(|r| r.interval.clone()),
        quantity: item.and_then(|i| i.quantity),
        status: SubscriptionStatus::from_provider(&subscription.status),
        started_at: subscription.start_date.and_then(timestamp_to_datetime),
        current_period_end: subscription
            .current_period_end
            .or_else(|| item.and_then(|i| i.current_period_end))
            .and_then(timestamp_to_datetime),
        billing_period_hint: subscription
            .metadata
            .get(METADATA_BILLING_PERIOD)
            .and_then(|p| BillingPeriod::from_str(p.trim()).ok()),
        commitment_end_hint: subscription
            .metadata
            .get(METADATA_COMMITMENT_END)
            .and_then(|d| parse_metadata_date(d)),
    };

    ProviderSubscription {
        cabinet_id: metadata_cabinet_id(&subscription.metadata),
        latest_invoice_id: subscription.latest_invoice,
        snapshot,
    }
}

fn to_provider_invoice(invoice: StripeInvoice) -> ProviderInvoice {
    let amount_cents = if invoice.amount_paid > 0 {
        invoice.amount_paid
    } else {
        invoice.amount_due
    };

    ProviderInvoice {
        stripe_invoice_id: invoice.id,
        customer_id: invoice.customer,
        amount_cents,
        currency: invoice.currency.to_lowercase(),
        status: invoice.status.unwrap_or_else(|| "open".to_string()),
        hosted_invoice_url: invoice.hosted_invoice_url,
        invoice_pdf_url: invoice.invoice_pdf,
        period_start: invoice.period_start.and_then(timestamp_to_datetime),
        period_end: invoice.period_end.and_then(timestamp_to_datetime),
    }
}

fn metadata_cabinet_id(metadata: &HashMap<String, String>) -> Option<Uuid> {
    metadata
        .get(METADATA_CABINET_ID)
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Commitment end dates are written either as RFC 3339 or as a plain date.
fn parse_metadata_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}
