use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{email::resend::ResendEmailSender, http::app_state::AppState},
    infra::{
        config::AppConfig,
        http_client::try_build_client,
        postgres_persistence,
        stripe_client::{RetryPolicy, StripeClient},
        stripe_payment_adapter::StripePaymentAdapter,
    },
    use_cases::{
        cabinet::CabinetUseCases, checkout::CheckoutUseCases, reconciler::WebhookReconciler,
        seats::SeatUseCases, subscription::SubscriptionUseCases,
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;

    if config.price_catalog.is_empty() {
        warn!("No STRIPE_PRICE_* variables set, checkout will be unavailable");
    }
    if config.stripe.webhook_secret.is_none() {
        warn!("STRIPE_WEBHOOK_SECRET not set, webhooks will be rejected");
    }

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let http_client = try_build_client()?;

    let stripe = StripeClient::new(
        http_client.clone(),
        config.stripe.secret_key.clone(),
        RetryPolicy {
            timeout: Duration::from_secs(config.stripe.timeout_secs),
            max_retries: config.stripe.max_retries,
        },
    );
    let provider = Arc::new(StripePaymentAdapter::new(stripe));

    let email = Arc::new(ResendEmailSender::new(
        http_client,
        config.resend_api_key.clone(),
        config.email_from.clone(),
    ));

    let catalog = Arc::new(config.price_catalog.clone());

    let checkout_use_cases =
        CheckoutUseCases::new(provider.clone(), postgres_arc.clone(), catalog.clone());
    let webhook_reconciler = WebhookReconciler::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        provider.clone(),
        email,
        catalog.clone(),
        config.app_origin.to_string(),
    );
    let seat_use_cases =
        SeatUseCases::new(postgres_arc.clone(), postgres_arc.clone(), provider.clone());
    let subscription_use_cases = SubscriptionUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        provider,
        catalog,
    );
    let cabinet_use_cases =
        CabinetUseCases::new(postgres_arc.clone(), postgres_arc.clone(), postgres_arc);

    Ok(AppState {
        config: Arc::new(config),
        checkout_use_cases: Arc::new(checkout_use_cases),
        webhook_reconciler: Arc::new(webhook_reconciler),
        seat_use_cases: Arc::new(seat_use_cases),
        subscription_use_cases: Arc::new(subscription_use_cases),
        cabinet_use_cases: Arc::new(cabinet_use_cases),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cabinet_billing=debug,tower_http=info".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs). Skipped when the file can't be created,
    // e.g. on a read-only filesystem.
    let json_layer = File::create("app.log").ok().map(|file| {
        fmt::layer()
            .json()
            .with_writer(file)
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
