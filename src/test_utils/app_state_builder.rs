//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases to in-memory repositories
//! and a fake payment provider, and keeps handles on them for assertions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    domain::entities::{cabinet::Cabinet, member::CabinetMember},
    infra::config::{AppConfig, StripeConfig},
    test_utils::{
        FakePaymentProvider, InMemoryCabinetRepo, InMemoryEmailSender, InMemoryInvoiceRepo,
        InMemoryMemberRepo, InMemoryWebhookEventRepo, TEST_JWT_SECRET, TEST_WEBHOOK_SECRET,
        test_price_catalog,
    },
    use_cases::{
        cabinet::CabinetUseCases, checkout::CheckoutUseCases, reconciler::WebhookReconciler,
        seats::SeatUseCases, subscription::SubscriptionUseCases,
    },
};

pub const TEST_APP_ORIGIN: &str = "https://app.cabinet.test";

/// Handles on the in-memory dependencies behind a built `AppState`.
pub struct TestMocks {
    pub cabinets: Arc<InMemoryCabinetRepo>,
    pub invoices: Arc<InMemoryInvoiceRepo>,
    pub provider: Arc<FakePaymentProvider>,
    pub email: Arc<InMemoryEmailSender>,
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let cabinet = create_active_cabinet(SubscriptionTier::Pro, 4, |_| {});
/// let founder = create_test_member(cabinet.id, |m| m.role = MemberRole::Founder);
///
/// let (app_state, mocks) = TestAppStateBuilder::new()
///     .with_cabinet(cabinet)
///     .with_member(founder)
///     .build_with_mocks();
/// ```
pub struct TestAppStateBuilder {
    cabinets: Vec<Cabinet>,
    members: Vec<CabinetMember>,
    provider: FakePaymentProvider,
    webhook_secret: Option<String>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            cabinets: vec![],
            members: vec![],
            provider: FakePaymentProvider::new(),
            webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        }
    }

    pub fn with_cabinet(mut self, cabinet: Cabinet) -> Self {
        self.cabinets.push(cabinet);
        self
    }

    pub fn with_member(mut self, member: CabinetMember) -> Self {
        self.members.push(member);
        self
    }

    /// Replace the fake provider, e.g. one pre-loaded with subscriptions.
    pub fn with_provider(mut self, provider: FakePaymentProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Simulate a deployment where the webhook signing secret is not set.
    pub fn without_webhook_secret(mut self) -> Self {
        self.webhook_secret = None;
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    pub fn build_with_mocks(self) -> (AppState, TestMocks) {
        let config = test_config(self.webhook_secret);
        let catalog = Arc::new(config.price_catalog.clone());

        let cabinets = Arc::new(InMemoryCabinetRepo::with_cabinets(self.cabinets));
        let members = Arc::new(InMemoryMemberRepo::with_members(self.members));
        let invoices = Arc::new(InMemoryInvoiceRepo::new());
        let events = Arc::new(InMemoryWebhookEventRepo::new());
        let provider = Arc::new(self.provider);
        let email = Arc::new(InMemoryEmailSender::new());

        let checkout_use_cases = Arc::new(CheckoutUseCases::new(
            provider.clone(),
            members.clone(),
            catalog.clone(),
        ));
        let webhook_reconciler = Arc::new(WebhookReconciler::new(
            cabinets.clone(),
            members.clone(),
            invoices.clone(),
            events,
            provider.clone(),
            email.clone(),
            catalog.clone(),
            TEST_APP_ORIGIN.to_string(),
        ));
        let seat_use_cases = Arc::new(SeatUseCases::new(
            cabinets.clone(),
            members.clone(),
            provider.clone(),
        ));
        let subscription_use_cases = Arc::new(SubscriptionUseCases::new(
            cabinets.clone(),
            members.clone(),
            provider.clone(),
            catalog,
        ));
        let cabinet_use_cases = Arc::new(CabinetUseCases::new(
            cabinets.clone(),
            members,
            invoices.clone(),
        ));

        let app_state = AppState {
            config: Arc::new(config),
            checkout_use_cases,
            webhook_reconciler,
            seat_use_cases,
            subscription_use_cases,
            cabinet_use_cases,
        };

        (
            app_state,
            TestMocks {
                cabinets,
                invoices,
                provider,
                email,
            },
        )
    }
}

fn test_config(webhook_secret: Option<String>) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        app_origin: Url::parse(TEST_APP_ORIGIN).unwrap(),
        jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
        stripe: StripeConfig {
            secret_key: SecretString::new("sk_test_unused".into()),
            webhook_secret: webhook_secret.map(|s| SecretString::new(s.into())),
            webhook_tolerance_secs: 300,
            timeout_secs: 1,
            max_retries: 0,
        },
        resend_api_key: SecretString::new("re_unused".into()),
        email_from: "facturation@cabinet.test".to_string(),
        price_catalog: test_price_catalog(),
    }
}
