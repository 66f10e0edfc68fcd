use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        cabinet::CabinetUseCases, checkout::CheckoutUseCases, reconciler::WebhookReconciler,
        seats::SeatUseCases, subscription::SubscriptionUseCases,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub checkout_use_cases: Arc<CheckoutUseCases>,
    pub webhook_reconciler: Arc<WebhookReconciler>,
    pub seat_use_cases: Arc<SeatUseCases>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
    pub cabinet_use_cases: Arc<CabinetUseCases>,
}
