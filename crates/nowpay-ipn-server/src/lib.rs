//! NOWPayments IPN receiver.
//!
//! Accepts the gateway's instant payment notifications, verifies the
//! `x-nowpayments-sig` HMAC over the raw request body with [`nowpay`], and
//! logs the payment status transition. Unverified requests are rejected
//! with 403 before their body is interpreted.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (IPN callback, health, metrics)
//! - [`state`]: shared [`AppState`](state::AppState)
//! - [`webhook`]: handling of verified notifications
//! - [`config`]: environment configuration
//! - [`metrics`]: Prometheus counters

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod webhook;
