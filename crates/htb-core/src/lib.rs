//! Shared plumbing for the Hack The Box API client
//!
//! This crate holds the pieces every other crate in the workspace builds on:
//!
//! - [`HtbError`], the single error taxonomy surfaced to callers
//! - [`ClientConfig`] and [`RetryPolicy`]
//! - [`RequestExecutor`], which sends API calls, retries on HTTP 429 and
//!   classifies responses into [`RequestOutcome`]s
//!
//! Authentication is plugged in through the [`Authorizer`] trait, implemented
//! by the session type in `htb-auth`.

pub mod config;
pub mod errors;
pub mod request;

// Re-export main types
pub use config::{ClientConfig, HttpTimeouts, RetryPolicy};
pub use errors::{HtbError, Result};
pub use request::{ApiRequest, Authorizer, Payload, RequestBody, RequestExecutor, RequestOutcome};
