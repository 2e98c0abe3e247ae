//! NOWPayments client with IPN verification and bearer-token management.
//!
//! # Webhooks
//!
//! The gateway signs each IPN with HMAC-SHA512 over the exact body bytes.
//! [`IpnVerifier`] checks that signature against the raw body before parsing
//! anything:
//!
//! ```
//! use nowpay::{ipn, IpnVerifier};
//!
//! let body = br#"{"payment_id":123,"payment_status":"finished"}"#;
//! let signature = ipn::sign(body, b"ipn-secret").unwrap();
//!
//! let payload = IpnVerifier::raw("ipn-secret").verify(body, &signature).unwrap();
//! assert_eq!(payload.payment_id(), Some(123));
//! ```
//!
//! # Bearer tokens
//!
//! Payout endpoints need a token from `/auth`, valid for five minutes.
//! [`NowPaymentsClient::ensure_authenticated`] refreshes it when expired;
//! protected calls made without one fail with
//! [`NowPaymentsError::Authentication`].

pub mod canonical;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod hmac;
pub mod ipn;
pub mod security;
pub mod token;

pub use client::{AuthResponse, CreatePayment, Credentials, NowPaymentsClient, Withdrawal};
pub use config::{ClientConfig, ConfigError};
pub use constants::*;
pub use error::NowPaymentsError;
pub use ipn::{IpnPayload, IpnSecret, IpnVerifier, PaymentStatus, SignatureMode};
pub use token::{Clock, ManualClock, SystemClock, TokenManager, TokenStatus};
