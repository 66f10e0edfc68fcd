pub mod billing_period;
pub mod cabinet;
pub mod invoice;
pub mod member;
pub mod subscription_status;
pub mod subscription_tier;
