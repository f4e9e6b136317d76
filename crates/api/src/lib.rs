// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Billhook API Library
//!
//! This crate contains the HTTP server components for Billhook: the Paddle
//! webhook endpoint and the read-only billing routes.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::ActiveOrganisation;
pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
