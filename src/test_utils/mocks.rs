//! In-memory implementations of the repository and port traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            email_sender::EmailSender,
            payment_provider::{
                CheckoutSession, CheckoutSessionRequest, PaymentProviderPort, PlanChange,
                ProviderSubscription, QuantityUpdate, QuantityUpdateResult, SeatPurchaseRequest,
            },
        },
        use_cases::cabinet::{CabinetRepo, InvoiceRepo, MemberRepo, PlanUpdate, WebhookEventRepo},
    },
    domain::{
        entities::{
            cabinet::{Cabinet, SubscriptionState},
            invoice::{Invoice, ProviderInvoice},
            member::CabinetMember,
        },
        proration::ProrataEstimate,
    },
};

// ============================================================================
// Cabinets
// ============================================================================

#[derive(Default)]
pub struct InMemoryCabinetRepo {
    pub cabinets: Mutex<HashMap<Uuid, Cabinet>>,
    /// When set, the next versioned write sees a version bumped by another writer.
    concurrent_write: Mutex<bool>,
}

impl InMemoryCabinetRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cabinets(cabinets: Vec<Cabinet>) -> Self {
        let map = cabinets.into_iter().map(|c| (c.id, c)).collect();
        Self {
            cabinets: Mutex::new(map),
            concurrent_write: Mutex::new(false),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Cabinet> {
        self.cabinets.lock().unwrap().get(&id).cloned()
    }

    pub fn simulate_concurrent_write(&self) {
        *self.concurrent_write.lock().unwrap() = true;
    }

    fn modify_if_version(
        &self,
        id: Uuid,
        expected_version: i64,
        f: impl FnOnce(&mut Cabinet),
    ) -> AppResult<Option<Cabinet>> {
        if std::mem::take(&mut *self.concurrent_write.lock().unwrap()) {
            self.modify(id, |_| {})?;
        }
        if self.get(id).map(|c| c.version) != Some(expected_version) {
            return Ok(None);
        }
        self.modify(id, f).map(Some)
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut Cabinet)) -> AppResult<Cabinet> {
        let mut cabinets = self.cabinets.lock().unwrap();
        let cabinet = cabinets.get_mut(&id).ok_or(AppError::NotFound)?;
        f(cabinet);
        cabinet.version += 1;
        cabinet.updated_at = Some(Utc::now());
        Ok(cabinet.clone())
    }
}

#[async_trait]
impl CabinetRepo for InMemoryCabinetRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Cabinet>> {
        Ok(self.get(id))
    }

    async fn find_by_stripe_customer(&self, customer_id: &str) -> AppResult<Option<Cabinet>> {
        Ok(self
            .cabinets
            .lock()
            .unwrap()
            .values()
            .find(|c| c.subscription.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_stripe_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<Cabinet>> {
        Ok(self
            .cabinets
            .lock()
            .unwrap()
            .values()
            .find(|c| c.subscription.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn save_subscription_state(
        &self,
        id: Uuid,
        state: &SubscriptionState,
    ) -> AppResult<Cabinet> {
        self.modify(id, |c| c.subscription = state.clone())
    }

    async fn update_seats(
        &self,
        id: Uuid,
        seats: i32,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>> {
        self.modify_if_version(id, expected_version, |c| c.subscription.seats = seats)
    }

    async fn update_plan(
        &self,
        id: Uuid,
        change: &PlanUpdate,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>> {
        self.modify_if_version(id, expected_version, |c| {
            c.subscription.tier = change.tier;
            c.subscription.billing_period = change.billing_period;
            c.subscription.seats = change.seats;
            c.subscription.stripe_subscription_item_id =
                Some(change.stripe_subscription_item_id.clone());
        })
    }
}

// ============================================================================
// Members
// ============================================================================

#[derive(Default)]
pub struct InMemoryMemberRepo {
    pub members: Mutex<Vec<CabinetMember>>,
}

impl InMemoryMemberRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: Vec<CabinetMember>) -> Self {
        Self {
            members: Mutex::new(members),
        }
    }
}

#[async_trait]
impl MemberRepo for InMemoryMemberRepo {
    async fn get_membership(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<CabinetMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.cabinet_id == cabinet_id && m.user_id == Some(user_id))
            .cloned())
    }

    async fn count_active(&self, cabinet_id: Uuid) -> AppResult<i64> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.cabinet_id == cabinet_id && m.is_active())
            .count() as i64)
    }

    async fn find_founder(&self, cabinet_id: Uuid) -> AppResult<Option<CabinetMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.cabinet_id == cabinet_id && m.is_founder())
            .cloned())
    }

    async fn find_cabinet_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .map(|m| m.cabinet_id))
    }
}

// ============================================================================
// Invoices
// ============================================================================

/// Keyed by provider invoice id, matching the unique constraint in Postgres.
#[derive(Default)]
pub struct InMemoryInvoiceRepo {
    pub invoices: Mutex<HashMap<String, Invoice>>,
    confirmations_sent: Mutex<Vec<String>>,
}

impl InMemoryInvoiceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }
}

#[async_trait]
impl InvoiceRepo for InMemoryInvoiceRepo {
    async fn insert_if_absent(
        &self,
        cabinet_id: Uuid,
        invoice: &ProviderInvoice,
    ) -> AppResult<bool> {
        let mut invoices = self.invoices.lock().unwrap();
        if invoices.contains_key(&invoice.stripe_invoice_id) {
            return Ok(false);
        }
        invoices.insert(
            invoice.stripe_invoice_id.clone(),
            Invoice {
                id: Uuid::new_v4(),
                cabinet_id,
                stripe_invoice_id: invoice.stripe_invoice_id.clone(),
                amount_cents: invoice.amount_cents,
                currency: invoice.currency.clone(),
                status: invoice.status.clone(),
                hosted_invoice_url: invoice.hosted_invoice_url.clone(),
                invoice_pdf_url: invoice.invoice_pdf_url.clone(),
                period_start: invoice.period_start,
                period_end: invoice.period_end,
                created_at: Some(Utc::now()),
            },
        );
        Ok(true)
    }

    async fn mark_confirmation_sent(&self, stripe_invoice_id: &str) -> AppResult<bool> {
        if !self.invoices.lock().unwrap().contains_key(stripe_invoice_id) {
            return Ok(false);
        }
        let mut sent = self.confirmations_sent.lock().unwrap();
        if sent.iter().any(|id| id == stripe_invoice_id) {
            return Ok(false);
        }
        sent.push(stripe_invoice_id.to_string());
        Ok(true)
    }

    async fn list_by_cabinet(&self, cabinet_id: Uuid) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.cabinet_id == cabinet_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invoices)
    }
}

// ============================================================================
// Webhook events
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    pub processed: Mutex<HashMap<String, String>>,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookEventRepo for InMemoryWebhookEventRepo {
    async fn is_processed(&self, event_id: &str) -> AppResult<bool> {
        Ok(self.processed.lock().unwrap().contains_key(event_id))
    }

    async fn mark_processed(&self, event_id: &str, event_type: &str) -> AppResult<()> {
        self.processed
            .lock()
            .unwrap()
            .insert(event_id.to_string(), event_type.to_string());
        Ok(())
    }
}

// ============================================================================
// Email
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct InMemoryEmailSender {
    pub sent: Mutex<Vec<SentEmail>>,
    fail: Mutex<bool>,
}

impl InMemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(vec![]),
            fail: Mutex::new(true),
        }
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for InMemoryEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::Internal("email provider unavailable".into()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Payment provider
// ============================================================================

/// Records every call and serves subscriptions/invoices registered up front.
#[derive(Default)]
pub struct FakePaymentProvider {
    subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
    invoices: Mutex<HashMap<String, ProviderInvoice>>,
    checkout_requests: Mutex<Vec<CheckoutSessionRequest>>,
    quantity_updates: Mutex<Vec<QuantityUpdate>>,
    seat_purchases: Mutex<Vec<SeatPurchaseRequest>>,
    cancellations: Mutex<Vec<String>>,
    plan_changes: Mutex<Vec<PlanChange>>,
    reported_prorata: Mutex<Option<ProrataEstimate>>,
    fail_next: Mutex<Option<String>>,
    quantity_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl FakePaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, subscription: ProviderSubscription) -> Self {
        self.subscriptions.lock().unwrap().insert(
            subscription.snapshot.subscription_id.clone(),
            subscription,
        );
        self
    }

    pub fn with_invoice(self, invoice: ProviderInvoice) -> Self {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.stripe_invoice_id.clone(), invoice);
        self
    }

    pub fn set_reported_prorata(&self, prorata: Option<ProrataEstimate>) {
        *self.reported_prorata.lock().unwrap() = prorata;
    }

    pub fn fail_next_call(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Hold the next quantity update open after it is recorded. The first
    /// receiver fires once the call is in flight; sending on the returned
    /// sender lets it complete.
    pub fn pause_next_quantity_update(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.quantity_gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.checkout_requests.lock().unwrap().clone()
    }

    pub fn quantity_updates(&self) -> Vec<QuantityUpdate> {
        self.quantity_updates.lock().unwrap().clone()
    }

    pub fn seat_purchases(&self) -> Vec<SeatPurchaseRequest> {
        self.seat_purchases.lock().unwrap().clone()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.cancellations.lock().unwrap().clone()
    }

    pub fn plan_changes(&self) -> Vec<PlanChange> {
        self.plan_changes.lock().unwrap().clone()
    }

    fn check_failure(&self) -> AppResult<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(message) => Err(AppError::PaymentProvider(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProviderPort for FakePaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        self.check_failure()?;
        let mut requests = self.checkout_requests.lock().unwrap();
        requests.push(request.clone());
        let session_id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{session_id}"),
            session_id,
        })
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription> {
        self.check_failure()?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| AppError::PaymentProvider(format!("No such subscription: {subscription_id}")))
    }

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice> {
        self.check_failure()?;
        self.invoices
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| AppError::PaymentProvider(format!("No such invoice: {invoice_id}")))
    }

    async fn update_subscription_item_quantity(
        &self,
        update: &QuantityUpdate,
    ) -> AppResult<QuantityUpdateResult> {
        self.check_failure()?;
        self.quantity_updates.lock().unwrap().push(update.clone());
        let gate = self.quantity_gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        Ok(QuantityUpdateResult {
            quantity: update.quantity,
            prorata: self.reported_prorata.lock().unwrap().clone(),
        })
    }

    async fn create_seat_purchase_session(
        &self,
        request: &SeatPurchaseRequest,
    ) -> AppResult<CheckoutSession> {
        self.check_failure()?;
        let mut purchases = self.seat_purchases.lock().unwrap();
        purchases.push(request.clone());
        let session_id = format!("cs_seats_{}", purchases.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{session_id}"),
            session_id,
        })
    }

    /// Ends at the registered subscription's period end, if there is one.
    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
        _idempotency_key: &str,
    ) -> AppResult<Option<DateTime<Utc>>> {
        self.check_failure()?;
        self.cancellations
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .and_then(|s| s.snapshot.current_period_end))
    }

    async fn change_plan(&self, change: &PlanChange) -> AppResult<ProviderSubscription> {
        self.check_failure()?;
        self.plan_changes.lock().unwrap().push(change.clone());
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions.get_mut(&change.subscription_id).ok_or_else(|| {
            AppError::PaymentProvider(format!("No such subscription: {}", change.subscription_id))
        })?;
        subscription.snapshot.price_id = Some(change.price_id.clone());
        subscription.snapshot.quantity = Some(change.quantity);
        subscription.snapshot.item_id = Some(change.subscription_item_id.clone());
        Ok(subscription.clone())
    }
}
