//! Test utilities shared by the use case and HTTP tests.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory implementations of the repository and provider ports
//! - An `AppState` builder for exercising the HTTP routes

mod app_state_builder;
mod factories;
mod mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use mocks::*;
