use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::entities::subscription_tier::{SeatRange, SubscriptionTier};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Cannot reduce to {requested} seats: {active} members are active. \
         Remove {to_remove} member(s) first."
    )]
    SeatsBelowActiveMembers {
        requested: i32,
        active: i32,
        to_remove: i32,
    },

    #[error("The {tier} plan allows {range} seats, {requested} requested")]
    SeatsOutOfRange {
        tier: SubscriptionTier,
        range: SeatRange,
        requested: i32,
    },

    #[error(
        "The subscription is committed until {}, {remaining_months} month(s) remaining",
        commitment_end.format("%Y-%m-%d")
    )]
    CommitmentNotCompleted {
        commitment_end: DateTime<Utc>,
        remaining_months: i64,
    },

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn seats_below_active_members(requested: i32, active: i32) -> Self {
        AppError::SeatsBelowActiveMembers {
            requested,
            active,
            to_remove: active - requested,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    ConfigurationError,
    InvalidInput,
    SeatsBelowActiveMembers,
    SeatsOutOfRange,
    EngagementNotCompleted,
    InvalidSignature,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    PaymentProviderError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::SeatsBelowActiveMembers => "SEATS_BELOW_ACTIVE_MEMBERS",
            ErrorCode::SeatsOutOfRange => "SEATS_OUT_OF_RANGE",
            ErrorCode::EngagementNotCompleted => "ENGAGEMENT_NOT_COMPLETED",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PaymentProviderError => "PAYMENT_PROVIDER_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
