//! Provider-facing billing endpoints: hosted checkout and webhooks.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{error, warn};

use crate::{
    adapters::http::{app_state::AppState, auth::optional_user},
    app_error::{AppError, AppResult},
    infra::{stripe_client::StripeClient, stripe_payment_adapter::parse_webhook_event},
    use_cases::{checkout::CheckoutRequest, reconciler::ReconcileOutcome},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/webhook", post(handle_webhook))
}

/// POST /api/billing/checkout
///
/// Anonymous for a new signup. Buying for an existing cabinet requires the
/// founder's bearer token.
async fn create_checkout(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<impl IntoResponse> {
    let acting_user = optional_user(&headers, &app_state)?;
    let session = app_state
        .checkout_use_cases
        .start_checkout(acting_user, payload)
        .await?;
    Ok(Json(session))
}

/// POST /api/billing/webhook
///
/// Events are verified against the raw body before anything is parsed.
/// Failures answer 400 so the provider redelivers the event.
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let stripe = &app_state.config.stripe;
    let Some(secret) = stripe.webhook_secret.as_ref() else {
        error!(alert = true, "Webhook received but STRIPE_WEBHOOK_SECRET is not set");
        return AppError::Configuration("Webhook secret not configured".into()).into_response();
    };

    let result = process_webhook(
        &app_state,
        &headers,
        &body,
        secret.expose_secret(),
        stripe.webhook_tolerance_secs,
    )
    .await;

    match result {
        Ok(_) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e) => {
            let message = match &e {
                AppError::Database(_) | AppError::Internal(_) => {
                    error!(error = %e, "Webhook processing failed");
                    "Webhook processing failed".to_string()
                }
                AppError::InvalidSignature(reason) => {
                    warn!(reason = %reason, "Rejected webhook with invalid signature");
                    "Invalid signature".to_string()
                }
                _ => {
                    warn!(error = %e, "Webhook processing failed");
                    e.to_string()
                }
            };
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
    }
}

async fn process_webhook(
    app_state: &AppState,
    headers: &HeaderMap,
    body: &str,
    secret: &str,
    tolerance_secs: i64,
) -> AppResult<ReconcileOutcome> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("missing stripe-signature header".into()))?;

    StripeClient::verify_webhook_signature(body, signature, secret, tolerance_secs)?;

    let event = parse_webhook_event(body)?;
    app_state.webhook_reconciler.handle_event(event).await
}
