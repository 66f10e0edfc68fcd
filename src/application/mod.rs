pub mod app_error;
pub mod email_templates;
pub mod jwt;
pub mod ports;
pub mod use_cases;
