//! Converges cabinet billing state to the payment provider's view.
//!
//! Each verified webhook event is resolved to a cabinet, folded into its
//! subscription state through [`reduce`], and persisted. Events that match
//! no cabinet are skipped, not failed, so the provider stops redelivering
//! them; they are logged as alertable.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::application::{
    email_templates::{self, PaymentConfirmation},
    ports::{
        email_sender::EmailSender,
        payment_provider::{
            CompletedCheckout, PaymentProviderPort, ProviderEvent, ProviderEventKind,
            ProviderSubscription,
        },
    },
    use_cases::cabinet::{CabinetRepo, InvoiceRepo, MemberRepo, WebhookEventRepo},
};
use crate::domain::{
    entities::{
        cabinet::{Cabinet, SubscriptionState},
        invoice::ProviderInvoice,
        subscription_status::SubscriptionStatus,
    },
    price_catalog::PriceCatalog,
    reducer::{LifecycleEvent, SubscriptionSnapshot, reduce},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No cabinet matches the event's references.
    CabinetNotFound { reference: String },
    /// The event concerns a subscription the cabinet has since replaced.
    StaleSubscription { subscription_id: String },
    /// The event lacks data needed to act on it.
    MissingData(String),
    /// A seat purchase whose count the cabinet cannot hold.
    InvalidSeatCount { requested: i32, reason: String },
    UnhandledEventType(String),
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        cabinet_id: Uuid,
        status: Option<SubscriptionStatus>,
    },
    Skipped(SkipReason),
}

#[derive(Clone)]
pub struct WebhookReconciler {
    cabinets: Arc<dyn CabinetRepo>,
    members: Arc<dyn MemberRepo>,
    invoices: Arc<dyn InvoiceRepo>,
    events: Arc<dyn WebhookEventRepo>,
    provider: Arc<dyn PaymentProviderPort>,
    email: Arc<dyn EmailSender>,
    catalog: Arc<PriceCatalog>,
    app_origin: String,
}

impl WebhookReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cabinets: Arc<dyn CabinetRepo>,
        members: Arc<dyn MemberRepo>,
        invoices: Arc<dyn InvoiceRepo>,
        events: Arc<dyn WebhookEventRepo>,
        provider: Arc<dyn PaymentProviderPort>,
        email: Arc<dyn EmailSender>,
        catalog: Arc<PriceCatalog>,
        app_origin: String,
    ) -> Self {
        Self {
            cabinets,
            members,
            invoices,
            events,
            provider,
            email,
            catalog,
            app_origin,
        }
    }

    /// Process a verified event once. Redeliveries of an event that was
    /// already handled are skipped.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.kind.event_type()))]
    pub async fn handle_event(&self, event: ProviderEvent) -> AppResult<ReconcileOutcome> {
        if self.events.is_processed(&event.id).await? {
            tracing::debug!("Event already processed");
            return Ok(ReconcileOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        let outcome = self.reconcile(&event).await?;

        self.events
            .mark_processed(&event.id, event.kind.event_type())
            .await?;

        match &outcome {
            ReconcileOutcome::Applied { cabinet_id, status } => {
                tracing::info!(cabinet_id = %cabinet_id, status = ?status, "Webhook event applied");
            }
            ReconcileOutcome::Skipped(reason) => {
                tracing::info!(reason = ?reason, "Webhook event skipped");
            }
        }

        Ok(outcome)
    }

    /// Apply one event without the processed-event bookkeeping.
    pub async fn reconcile(&self, event: &ProviderEvent) -> AppResult<ReconcileOutcome> {
        match &event.kind {
            ProviderEventKind::CheckoutCompleted(checkout) => {
                self.on_checkout_completed(checkout).await
            }
            ProviderEventKind::SubscriptionUpdated(subscription) => {
                self.on_subscription_changed(
                    subscription,
                    LifecycleEvent::SubscriptionUpdated(subscription.snapshot.clone()),
                )
                .await
            }
            ProviderEventKind::SubscriptionDeleted(subscription) => {
                self.on_subscription_changed(subscription, LifecycleEvent::SubscriptionCanceled)
                    .await
            }
            ProviderEventKind::InvoicePaid(invoice) => self.on_invoice_paid(invoice).await,
            ProviderEventKind::InvoicePaymentFailed(invoice) => {
                self.on_invoice_payment_failed(invoice).await
            }
            ProviderEventKind::Unhandled(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring unhandled event type");
                Ok(ReconcileOutcome::Skipped(SkipReason::UnhandledEventType(
                    event_type.clone(),
                )))
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        checkout: &CompletedCheckout,
    ) -> AppResult<ReconcileOutcome> {
        let Some(cabinet) = self.cabinet_for_checkout(checkout).await? else {
            let reference = checkout
                .cabinet_id
                .map(|id| id.to_string())
                .or_else(|| checkout.customer_email.clone())
                .unwrap_or_else(|| checkout.session_id.clone());
            return Ok(lookup_miss(reference));
        };

        if checkout.is_seat_purchase() {
            let Some(seats) = checkout.purchased_seats.filter(|s| *s > 0) else {
                return Ok(ReconcileOutcome::Skipped(SkipReason::MissingData(
                    "seat purchase without new_members_count".into(),
                )));
            };
            if let Some(reason) = self.seat_purchase_problem(&cabinet, seats).await? {
                tracing::error!(
                    alert = true,
                    cabinet_id = %cabinet.id,
                    session_id = %checkout.session_id,
                    requested = seats,
                    reason = %reason,
                    "Paid seat purchase not applied"
                );
                return Ok(ReconcileOutcome::Skipped(SkipReason::InvalidSeatCount {
                    requested: seats,
                    reason,
                }));
            }
            let saved = self
                .apply(&cabinet, &LifecycleEvent::SeatsPurchased { seats })
                .await?;
            return Ok(applied(&saved));
        }

        let Some(subscription_id) = checkout.subscription_id.as_deref() else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::MissingData(
                "checkout session has no subscription".into(),
            )));
        };

        let subscription = self.provider.get_subscription(subscription_id).await?;
        self.warn_on_unknown_price(&subscription.snapshot, cabinet.id);

        let saved = self
            .apply(
                &cabinet,
                &LifecycleEvent::CheckoutCompleted(subscription.snapshot.clone()),
            )
            .await?;

        let invoice_id = checkout
            .invoice_id
            .as_deref()
            .or(subscription.latest_invoice_id.as_deref());
        if let Some(invoice_id) = invoice_id {
            let invoice = self.provider.get_invoice(invoice_id).await?;
            // invoice.paid may have recorded the invoice first; the
            // confirmation stamp, not the insert, decides the email.
            self.invoices.insert_if_absent(saved.id, &invoice).await?;
            if self.invoices.mark_confirmation_sent(invoice_id).await? {
                self.send_payment_confirmation(&saved, &invoice).await;
            } else {
                tracing::debug!(invoice_id = %invoice_id, "Confirmation already sent");
            }
        } else {
            tracing::warn!(cabinet_id = %saved.id, "Completed checkout has no invoice");
        }

        Ok(applied(&saved))
    }

    async fn on_subscription_changed(
        &self,
        subscription: &ProviderSubscription,
        event: LifecycleEvent,
    ) -> AppResult<ReconcileOutcome> {
        let snapshot = &subscription.snapshot;
        let Some(cabinet) = self.cabinet_for_subscription(subscription).await? else {
            return Ok(lookup_miss(snapshot.subscription_id.clone()));
        };

        if let Some(current) = cabinet.subscription.stripe_subscription_id.as_deref() {
            if current != snapshot.subscription_id {
                tracing::warn!(
                    cabinet_id = %cabinet.id,
                    current_subscription = %current,
                    event_subscription = %snapshot.subscription_id,
                    "Event for a replaced subscription, ignoring"
                );
                return Ok(ReconcileOutcome::Skipped(SkipReason::StaleSubscription {
                    subscription_id: snapshot.subscription_id.clone(),
                }));
            }
        }

        if matches!(event, LifecycleEvent::SubscriptionUpdated(_)) {
            self.warn_on_unknown_price(snapshot, cabinet.id);
        }

        let saved = self.apply(&cabinet, &event).await?;
        Ok(applied(&saved))
    }

    async fn on_invoice_paid(&self, invoice: &ProviderInvoice) -> AppResult<ReconcileOutcome> {
        let Some(cabinet) = self.cabinet_for_customer(invoice).await? else {
            return Ok(lookup_miss(reference_for_invoice(invoice)));
        };

        // Recorded for the invoice history; status changes arrive through
        // subscription updates.
        let inserted = self.invoices.insert_if_absent(cabinet.id, invoice).await?;
        tracing::debug!(
            cabinet_id = %cabinet.id,
            invoice_id = %invoice.stripe_invoice_id,
            inserted,
            "Invoice paid"
        );

        Ok(applied(&cabinet))
    }

    async fn on_invoice_payment_failed(
        &self,
        invoice: &ProviderInvoice,
    ) -> AppResult<ReconcileOutcome> {
        let Some(cabinet) = self.cabinet_for_customer(invoice).await? else {
            return Ok(lookup_miss(reference_for_invoice(invoice)));
        };

        let saved = self
            .apply(&cabinet, &LifecycleEvent::InvoicePaymentFailed)
            .await?;
        tracing::warn!(
            cabinet_id = %saved.id,
            invoice_id = %invoice.stripe_invoice_id,
            "Invoice payment failed, subscription past due"
        );
        Ok(applied(&saved))
    }

    /// Same floor and range rules as a founder-initiated seat change.
    async fn seat_purchase_problem(&self, cabinet: &Cabinet, seats: i32) -> AppResult<Option<String>> {
        let tier = cabinet.subscription.tier;
        let range = tier.seat_range();
        if !range.contains(seats) {
            return Ok(Some(format!("the {tier} plan allows {range} seats")));
        }
        let active = self.members.count_active(cabinet.id).await?;
        if i64::from(seats) < active {
            return Ok(Some(format!("{active} members are active")));
        }
        Ok(None)
    }

    async fn apply(&self, cabinet: &Cabinet, event: &LifecycleEvent) -> AppResult<Cabinet> {
        let next: SubscriptionState = reduce(&cabinet.subscription, event, &self.catalog);
        if next == cabinet.subscription {
            tracing::debug!(cabinet_id = %cabinet.id, event = event.name(), "No state change");
            return Ok(cabinet.clone());
        }
        self.cabinets.save_subscription_state(cabinet.id, &next).await
    }

    async fn cabinet_for_checkout(
        &self,
        checkout: &CompletedCheckout,
    ) -> AppResult<Option<Cabinet>> {
        if let Some(cabinet_id) = checkout.cabinet_id {
            return self.cabinets.get_by_id(cabinet_id).await;
        }
        let Some(email) = checkout.customer_email.as_deref() else {
            return Ok(None);
        };
        match self.members.find_cabinet_id_by_email(email).await? {
            Some(cabinet_id) => self.cabinets.get_by_id(cabinet_id).await,
            None => Ok(None),
        }
    }

    async fn cabinet_for_subscription(
        &self,
        subscription: &ProviderSubscription,
    ) -> AppResult<Option<Cabinet>> {
        if let Some(cabinet_id) = subscription.cabinet_id {
            if let Some(cabinet) = self.cabinets.get_by_id(cabinet_id).await? {
                return Ok(Some(cabinet));
            }
        }
        if let Some(cabinet) = self
            .cabinets
            .find_by_stripe_subscription(&subscription.snapshot.subscription_id)
            .await?
        {
            return Ok(Some(cabinet));
        }
        self.cabinets
            .find_by_stripe_customer(&subscription.snapshot.customer_id)
            .await
    }

    /// Failed-invoice events may not carry cabinet metadata, so invoices
    /// are matched by customer.
    async fn cabinet_for_customer(&self, invoice: &ProviderInvoice) -> AppResult<Option<Cabinet>> {
        match invoice.customer_id.as_deref() {
            Some(customer_id) => self.cabinets.find_by_stripe_customer(customer_id).await,
            None => Ok(None),
        }
    }

    fn warn_on_unknown_price(&self, snapshot: &SubscriptionSnapshot, cabinet_id: Uuid) {
        if !snapshot.has_known_price(&self.catalog) {
            tracing::error!(
                alert = true,
                cabinet_id = %cabinet_id,
                price_id = ?snapshot.price_id,
                fallback_tier = %snapshot.tier(&self.catalog),
                "Price not in catalogue, using default tier"
            );
        }
    }

    async fn send_payment_confirmation(&self, cabinet: &Cabinet, invoice: &ProviderInvoice) {
        let founder = match self.members.find_founder(cabinet.id).await {
            Ok(Some(founder)) => founder,
            Ok(None) => {
                tracing::warn!(cabinet_id = %cabinet.id, "No founder to notify of payment");
                return;
            }
            Err(e) => {
                tracing::error!(cabinet_id = %cabinet.id, error = %e, "Failed to load founder");
                return;
            }
        };

        let (subject, html) = email_templates::payment_confirmation_email(
            &self.app_origin,
            &PaymentConfirmation {
                recipient_name: founder.greeting_name(),
                cabinet_name: &cabinet.name,
                tier: cabinet.subscription.tier,
                billing_period: cabinet.subscription.billing_period,
                seats: cabinet.subscription.seats,
                invoice,
            },
        );

        // The payment is recorded either way; a lost email is not worth a redelivery.
        if let Err(e) = self.email.send(&founder.email, &subject, &html).await {
            tracing::error!(cabinet_id = %cabinet.id, error = %e, "Failed to send payment confirmation");
        }
    }
}

fn applied(cabinet: &Cabinet) -> ReconcileOutcome {
    ReconcileOutcome::Applied {
        cabinet_id: cabinet.id,
        status: cabinet.subscription.status,
    }
}

fn lookup_miss(reference: String) -> ReconcileOutcome {
    tracing::error!(alert = true, reference = %reference, "No cabinet matches webhook event, dropping");
    ReconcileOutcome::Skipped(SkipReason::CabinetNotFound { reference })
}

fn reference_for_invoice(invoice: &ProviderInvoice) -> String {
    invoice
        .customer_id
        .clone()
        .unwrap_or_else(|| invoice.stripe_invoice_id.clone())
}
