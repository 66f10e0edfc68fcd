use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::{
    domain::{
        entities::{billing_period::BillingPeriod, subscription_tier::SubscriptionTier},
        price_catalog::{PriceCatalog, parse_price_aliases},
    },
    infra::error::InfraError,
};

pub struct StripeConfig {
    pub secret_key: SecretString,
    /// Signing secret of the webhook endpoint. Without it every webhook is
    /// answered with a configuration error.
    pub webhook_secret: Option<SecretString>,
    pub webhook_tolerance_secs: i64,
    /// Per-attempt timeout of a REST call.
    pub timeout_secs: u64,
    pub max_retries: u32,
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    /// Front-end origin, used for links in outbound emails.
    pub app_origin: Url,
    /// HS256 key of the bearer tokens issued by the identity service.
    pub jwt_secret: SecretString,
    pub stripe: StripeConfig,
    pub resend_api_key: SecretString,
    pub email_from: String,
    pub price_catalog: PriceCatalog,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default(
            "BIND_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3001)),
        );
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid {
                    var: "CORS_ORIGIN",
                    reason: "not a valid header value".into(),
                })?;
        let app_origin: Url = get_env("APP_ORIGIN");
        let jwt_secret = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let stripe = StripeConfig {
            secret_key: SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into()),
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| SecretString::new(s.into())),
            webhook_tolerance_secs: get_env_default("STRIPE_WEBHOOK_TOLERANCE_SECS", 300),
            timeout_secs: get_env_default("STRIPE_TIMEOUT_SECS", 10),
            max_retries: get_env_default("STRIPE_MAX_RETRIES", 2),
        };

        let resend_api_key = SecretString::new(get_env::<String>("RESEND_API_KEY").into());
        let email_from: String = get_env("EMAIL_FROM");

        let price_catalog = price_catalog_from_env()?;

        Ok(Self {
            database_url,
            bind_addr,
            cors_origin,
            app_origin,
            jwt_secret,
            stripe,
            resend_api_key,
            email_from,
            price_catalog,
        })
    }
}

/// Name of the variable holding the checkout price of a plan, e.g.
/// `STRIPE_PRICE_CABINET_PLUS_YEARLY`.
pub fn price_env_var(tier: SubscriptionTier, period: BillingPeriod) -> String {
    format!(
        "STRIPE_PRICE_{}_{}",
        tier.as_ref().replace('-', "_"),
        period.as_ref()
    )
    .to_uppercase()
}

fn price_catalog_from_env() -> Result<PriceCatalog, InfraError> {
    let mut catalog = PriceCatalog::new();

    for tier in SubscriptionTier::ALL {
        for period in [BillingPeriod::Monthly, BillingPeriod::Yearly] {
            let var = price_env_var(tier, period);
            if let Some(price_id) = std::env::var(&var).ok().filter(|s| !s.trim().is_empty()) {
                catalog = catalog.with_price(tier, period, price_id.trim());
            }
        }
    }

    if let Ok(raw) = std::env::var("STRIPE_PRICE_ALIASES") {
        let aliases = parse_price_aliases(&raw).map_err(|reason| InfraError::ConfigInvalid {
            var: "STRIPE_PRICE_ALIASES",
            reason,
        })?;
        for (price_id, plan) in aliases {
            catalog = catalog.with_alias(price_id, plan.tier, plan.period);
        }
    }

    Ok(catalog)
}
