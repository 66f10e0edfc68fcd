//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    application::{
        jwt::Claims,
        ports::payment_provider::ProviderSubscription,
    },
    domain::{
        entities::{
            billing_period::BillingPeriod,
            cabinet::{Cabinet, SubscriptionState},
            invoice::ProviderInvoice,
            member::{CabinetMember, MemberRole, MemberStatus},
            subscription_status::SubscriptionStatus,
            subscription_tier::SubscriptionTier,
        },
        price_catalog::PriceCatalog,
        reducer::SubscriptionSnapshot,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Fixed timestamp for deterministic fixtures.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0)
        .single()
        .unwrap()
}

/// Create a cabinet with no subscription yet.
pub fn create_test_cabinet(overrides: impl FnOnce(&mut Cabinet)) -> Cabinet {
    let mut cabinet = Cabinet {
        id: Uuid::new_v4(),
        name: "Cabinet Martin & Associés".to_string(),
        siret: Some("12345678900012".to_string()),
        address: Some("12 rue de la Paix, 75002 Paris".to_string()),
        subscription: SubscriptionState::default(),
        version: 1,
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut cabinet);
    cabinet
}

/// Create a cabinet with an active monthly subscription linked to the
/// provider fixtures returned by `create_test_subscription`.
pub fn create_active_cabinet(
    tier: SubscriptionTier,
    seats: i32,
    overrides: impl FnOnce(&mut Cabinet),
) -> Cabinet {
    create_test_cabinet(|c| {
        c.subscription = SubscriptionState {
            tier,
            billing_period: BillingPeriod::Monthly,
            seats,
            status: Some(SubscriptionStatus::Active),
            stripe_customer_id: Some("cus_test".to_string()),
            stripe_subscription_id: Some("sub_test".to_string()),
            stripe_subscription_item_id: Some("si_test".to_string()),
            started_at: Some(test_datetime()),
            current_period_end: None,
            commitment_end_date: None,
        };
        overrides(c);
    })
}

/// Create an active, non-founder member of `cabinet_id`.
pub fn create_test_member(
    cabinet_id: Uuid,
    overrides: impl FnOnce(&mut CabinetMember),
) -> CabinetMember {
    let id = Uuid::new_v4();
    let mut member = CabinetMember {
        id,
        cabinet_id,
        user_id: Some(Uuid::new_v4()),
        email: format!("avocat-{}@example.fr", &id.simple().to_string()[..8]),
        display_name: Some("Me Martin".to_string()),
        role: MemberRole::Member,
        status: MemberStatus::Active,
        created_at: Some(test_datetime()),
    };
    overrides(&mut member);
    member
}

/// Create a paid invoice of 69 EUR for customer `cus_test`.
pub fn create_test_provider_invoice(stripe_invoice_id: &str) -> ProviderInvoice {
    ProviderInvoice {
        stripe_invoice_id: stripe_invoice_id.to_string(),
        customer_id: Some("cus_test".to_string()),
        amount_cents: 6_900,
        currency: "eur".to_string(),
        status: "paid".to_string(),
        hosted_invoice_url: Some(format!("https://invoice.test/{stripe_invoice_id}")),
        invoice_pdf_url: Some(format!("https://invoice.test/{stripe_invoice_id}.pdf")),
        period_start: Some(test_datetime()),
        period_end: None,
    }
}

/// Create an active provider subscription `sub_test` on `price_id`.
pub fn create_test_subscription(
    price_id: &str,
    quantity: i32,
    overrides: impl FnOnce(&mut ProviderSubscription),
) -> ProviderSubscription {
    let mut subscription = ProviderSubscription {
        snapshot: SubscriptionSnapshot {
            subscription_id: "sub_test".to_string(),
            customer_id: "cus_test".to_string(),
            item_id: Some("si_test".to_string()),
            price_id: Some(price_id.to_string()),
            interval: Some("month".to_string()),
            quantity: Some(quantity),
            status: SubscriptionStatus::Active,
            started_at: Some(test_datetime()),
            current_period_end: None,
            billing_period_hint: None,
            commitment_end_hint: None,
        },
        cabinet_id: None,
        latest_invoice_id: Some("in_test".to_string()),
    };
    overrides(&mut subscription);
    subscription
}

/// Catalogue with one price per plan, named `price_{ess|pro|plus}_{period}`.
pub fn test_price_catalog() -> PriceCatalog {
    use BillingPeriod::{Monthly, Yearly};
    use SubscriptionTier::{CabinetPlus, Essentiel, Professionnel};

    PriceCatalog::new()
        .with_price(Essentiel, Monthly, "price_ess_monthly")
        .with_price(Essentiel, Yearly, "price_ess_yearly")
        .with_price(Professionnel, Monthly, "price_pro_monthly")
        .with_price(Professionnel, Yearly, "price_pro_yearly")
        .with_price(CabinetPlus, Monthly, "price_plus_monthly")
        .with_price(CabinetPlus, Yearly, "price_plus_yearly")
}

pub fn test_jwt_secret() -> SecretString {
    SecretString::new(TEST_JWT_SECRET.into())
}

/// Sign a one-hour HS256 token for `user_id` with `TEST_JWT_SECRET`.
pub fn issue_test_token(user_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: Some(now),
        email: None,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Build a `Stripe-Signature` header value for `payload`.
pub fn stripe_signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
