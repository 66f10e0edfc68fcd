use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};

use crate::app_error::{AppError, AppResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 8_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Applied to each attempt separately.
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
        }
    }
}

pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    policy: RetryPolicy,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: SecretString, policy: RetryPolicy) -> Self {
        Self {
            client,
            secret_key,
            policy,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", STRIPE_API_BASE, path))
            .header("Authorization", self.auth_header())
    }

    /// POSTs carry an idempotency key so a retried attempt is applied once.
    fn post(&self, path: &str, params: &[(String, String)], idempotency_key: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", STRIPE_API_BASE, path))
            .header("Authorization", self.auth_header())
            .header("Idempotency-Key", idempotency_key)
            .form(params)
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    pub async fn create_checkout_session(
        &self,
        params: &[(String, String)],
        idempotency_key: &str,
    ) -> AppResult<StripeCheckoutSession> {
        self.execute("create_checkout_session", || {
            self.post("/checkout/sessions", params, idempotency_key)
        })
        .await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        self.execute("get_subscription", || {
            self.get(&format!("/subscriptions/{}", subscription_id))
        })
        .await
    }

    /// Set the quantity of a subscription item and invoice the proration
    /// immediately.
    pub async fn update_subscription_item_quantity(
        &self,
        item_id: &str,
        quantity: i32,
        idempotency_key: &str,
    ) -> AppResult<StripeSubscriptionItem> {
        let params = vec![
            ("quantity".to_string(), quantity.to_string()),
            (
                "proration_behavior".to_string(),
                "always_invoice".to_string(),
            ),
        ];
        self.update_subscription_item(item_id, &params, idempotency_key)
            .await
    }

    pub async fn update_subscription_item(
        &self,
        item_id: &str,
        params: &[(String, String)],
        idempotency_key: &str,
    ) -> AppResult<StripeSubscriptionItem> {
        self.execute("update_subscription_item", || {
            self.post(
                &format!("/subscription_items/{}", item_id),
                params,
                idempotency_key,
            )
        })
        .await
    }

    pub async fn update_subscription(
        &self,
        subscription_id: &str,
        params: &[(String, String)],
        idempotency_key: &str,
    ) -> AppResult<StripeSubscription> {
        self.execute("update_subscription", || {
            self.post(
                &format!("/subscriptions/{}", subscription_id),
                params,
                idempotency_key,
            )
        })
        .await
    }

    // ========================================================================
    // Invoices
    // ========================================================================

    pub async fn get_invoice(&self, invoice_id: &str) -> AppResult<StripeInvoice> {
        self.execute("get_invoice", || {
            self.get(&format!("/invoices/{}", invoice_id))
        })
        .await
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    /// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw
    /// payload. The timestamp must be within `tolerance_secs` of now.
    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidSignature("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(AppError::InvalidSignature("missing v1 signature".into()));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected))
        {
            return Err(AppError::InvalidSignature("signature mismatch".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidSignature("invalid timestamp".into()))?;
        if (chrono::Utc::now().timestamp() - ts).abs() > tolerance_secs {
            return Err(AppError::InvalidSignature(
                "timestamp outside tolerance".into(),
            ));
        }

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Send the request built by `build`, retrying timeouts, connection
    /// failures, 429 and 5xx responses with exponential backoff.
    async fn execute<T, F>(&self, operation: &str, build: F) -> AppResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            let can_retry = attempt < self.policy.max_retries;
            let result = tokio::time::timeout(self.policy.timeout, build().send()).await;

            let reason = match result {
                Ok(Ok(response)) if can_retry && is_retryable_status(response.status()) => {
                    format!("status {}", response.status())
                }
                Ok(Ok(response)) => return self.handle_response(operation, response).await,
                Ok(Err(e)) if can_retry && (e.is_timeout() || e.is_connect()) => e.to_string(),
                Ok(Err(e)) => {
                    return Err(AppError::PaymentProvider(format!(
                        "Stripe request failed: {}",
                        e
                    )));
                }
                Err(_elapsed) if can_retry => "timed out".to_string(),
                Err(_elapsed) => {
                    tracing::error!(
                        operation,
                        timeout_secs = self.policy.timeout.as_secs(),
                        "Stripe request timed out"
                    );
                    return Err(AppError::PaymentProvider(format!(
                        "Stripe request timed out after {} seconds",
                        self.policy.timeout.as_secs()
                    )));
                }
            };

            let delay = calculate_backoff_delay(attempt, BASE_DELAY_MS, MAX_DELAY_MS);
            tracing::warn!(
                operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Retrying Stripe API call after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::PaymentProvider(format!("Failed to read Stripe response: {}", e))
        })?;

        if !status.is_success() {
            tracing::error!(operation, status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::PaymentProvider(
                    error.error.message.unwrap_or(error.error.error_type),
                ));
            }

            return Err(AppError::PaymentProvider(format!(
                "Stripe API error: {}",
                status
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(operation, body = %body, error = %e, "Failed to parse Stripe response");
            AppError::PaymentProvider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `base_ms * 2^attempt`, capped at `max_ms`, plus up to 25% jitter.
fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(max_ms);
    let jitter = rand::random::<u64>() % (delay_ms / 4 + 1);
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub subscription: Option<String>,
    pub invoice: Option<String>,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub recurring: Option<StripePriceRecurring>,
}

#[derive(Debug, Deserialize)]
pub struct StripePriceRecurring {
    pub interval: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub start_date: Option<i64>,
    /// Absent on recent API versions, where it lives on the items.
    pub current_period_end: Option<i64>,
    pub latest_invoice: Option<String>,
    pub trial_end: Option<i64>,
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub items: StripeSubscriptionItems,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeSubscription {
    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.data.first()
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub quantity: Option<i32>,
    pub price: StripePrice,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}

// ============================================================================
// Webhook Event Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeWebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEventData {
    pub object: serde_json::Value,
}

impl StripeWebhookEvent {
    pub fn object<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            AppError::InvalidInput(format!(
                "Malformed {} payload: {}",
                self.event_type, e
            ))
        })
    }
}
