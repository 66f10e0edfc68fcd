pub mod email_sender;
pub mod payment_provider;
