#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Billhook shared primitives
//!
//! Types and database plumbing used by the API server, the billing pipeline
//! and the background worker.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations, PoolSettings};
pub use types::TenantId;
