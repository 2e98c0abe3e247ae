//! IPN (Instant Payment Notification) signature verification.
//!
//! The gateway signs every webhook with HMAC-SHA512 over the exact bytes it
//! sends, hex-encoded in the `x-nowpayments-sig` header. Those bytes already
//! have sorted keys and keep numbers in their original text form (`1e-7`), so
//! the default [`SignatureMode::RawBody`] hashes the received body untouched
//! and only parses it once the signature has matched.
//!
//! [`SignatureMode::Canonical`] exists for integrations that sign a
//! key-sorted re-encoding instead. It must be selected explicitly; the
//! verifier never falls back from one mode to the other.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::canonical;
use crate::constants::{SIGNATURE_HEADER, SIGNATURE_HEADER_CANDIDATES};
use crate::error::NowPaymentsError;
use crate::hmac::compute_hmac;
use crate::security::constant_time_eq;

/// Shared IPN secret from the merchant dashboard. Never printed.
#[derive(Clone)]
pub struct IpnSecret(Vec<u8>);

impl IpnSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for IpnSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IpnSecret([REDACTED])")
    }
}

impl From<String> for IpnSecret {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for IpnSecret {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for IpnSecret {
    fn from(b: Vec<u8>) -> Self {
        Self(b)
    }
}

impl From<&[u8]> for IpnSecret {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

/// What bytes the expected signature is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// HMAC over the received body, byte for byte.
    #[default]
    RawBody,
    /// HMAC over the key-sorted, whitespace-free re-encoding of the body.
    Canonical,
}

impl SignatureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMode::RawBody => "raw",
            SignatureMode::Canonical => "canonical",
        }
    }
}

impl fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "raw_body" | "raw-body" => Ok(SignatureMode::RawBody),
            "canonical" | "sorted" => Ok(SignatureMode::Canonical),
            other => Err(format!("unknown signature mode '{other}' (expected raw or canonical)")),
        }
    }
}

/// Payment lifecycle states reported in `payment_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    /// A status this version does not know about.
    Unknown(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Confirming => "confirming",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Sending => "sending",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Finished => "finished",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Unknown(s) => s,
        }
    }

    /// No further notifications are expected for this payment.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Finished
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
                | PaymentStatus::Expired
        )
    }
}

impl From<&str> for PaymentStatus {
    fn from(s: &str) -> Self {
        match s {
            "waiting" => PaymentStatus::Waiting,
            "confirming" => PaymentStatus::Confirming,
            "confirmed" => PaymentStatus::Confirmed,
            "sending" => PaymentStatus::Sending,
            "partially_paid" => PaymentStatus::PartiallyPaid,
            "finished" => PaymentStatus::Finished,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            "expired" => PaymentStatus::Expired,
            other => PaymentStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook body whose signature has been verified.
///
/// Only constructed by the verifier, so holding one means the bytes it was
/// parsed from were authentic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IpnPayload(Map<String, Value>);

impl IpnPayload {
    fn from_value(value: Value) -> Result<Self, NowPaymentsError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(NowPaymentsError::InvalidPayload(
                "IPN body is not a JSON object".to_string(),
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric payment id. Accepts a JSON number or a numeric string.
    pub fn payment_id(&self) -> Option<u64> {
        match self.0.get("payment_id")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.0
            .get("payment_status")
            .and_then(Value::as_str)
            .map(PaymentStatus::from)
    }

    pub fn order_id(&self) -> Option<&str> {
        self.0.get("order_id").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Verifies IPN webhooks against a shared secret in one fixed [`SignatureMode`].
#[derive(Debug, Clone)]
pub struct IpnVerifier {
    secret: IpnSecret,
    mode: SignatureMode,
}

impl IpnVerifier {
    pub fn new(secret: impl Into<IpnSecret>, mode: SignatureMode) -> Self {
        tracing::info!(mode = %mode, "IPN verifier initialised");
        Self {
            secret: secret.into(),
            mode,
        }
    }

    /// Verifier for the gateway's documented behaviour (raw body HMAC).
    pub fn raw(secret: impl Into<IpnSecret>) -> Self {
        Self::new(secret, SignatureMode::RawBody)
    }

    pub fn mode(&self) -> SignatureMode {
        self.mode
    }

    /// Check `signature` against `raw_body` and return the parsed payload.
    ///
    /// Fails with `InvalidInput` if any argument is empty and with `Security`
    /// if the signature does not match. In raw mode the body is not parsed
    /// until after the match.
    pub fn verify(&self, raw_body: &[u8], signature: &str) -> Result<IpnPayload, NowPaymentsError> {
        check_inputs(raw_body, signature, &self.secret)?;

        match self.mode {
            SignatureMode::RawBody => {
                let expected = compute_hmac(self.secret.as_bytes(), raw_body)?;
                self.ensure_match(&expected, signature, raw_body.len())?;
                parse_payload(raw_body)
            }
            SignatureMode::Canonical => {
                // The body has to be parsed to re-encode it; a parse failure
                // here is reported as a mismatch so unauthenticated input is
                // never described back to the caller.
                let value: Value = serde_json::from_slice(raw_body).map_err(|_| {
                    tracing::warn!(mode = %self.mode, "IPN body could not be canonicalized");
                    security_failure()
                })?;
                let expected = compute_hmac(self.secret.as_bytes(), &canonical::encode(&value))?;
                self.ensure_match(&expected, signature, raw_body.len())?;
                IpnPayload::from_value(value)
            }
        }
    }

    /// Resolve the signature header and verify.
    pub fn verify_with_headers<'a, I>(
        &self,
        raw_body: &[u8],
        headers: I,
    ) -> Result<IpnPayload, NowPaymentsError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let signature = signature_from_headers(headers)?;
        self.verify(raw_body, signature)
    }

    fn ensure_match(
        &self,
        expected: &str,
        supplied: &str,
        body_len: usize,
    ) -> Result<(), NowPaymentsError> {
        if constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
            Ok(())
        } else {
            tracing::warn!(mode = %self.mode, body_len, "IPN signature mismatch");
            Err(security_failure())
        }
    }
}

/// Verify a webhook in raw-body mode.
pub fn verify(
    raw_body: &[u8],
    signature: &str,
    secret: &[u8],
) -> Result<IpnPayload, NowPaymentsError> {
    // Built directly so one-off checks skip the construction log line.
    let verifier = IpnVerifier {
        secret: IpnSecret::from(secret),
        mode: SignatureMode::RawBody,
    };
    verifier.verify(raw_body, signature)
}

/// The signature the gateway would send for `raw_body` in raw-body mode.
pub fn sign(raw_body: &[u8], secret: &[u8]) -> Result<String, NowPaymentsError> {
    if secret.is_empty() {
        return Err(NowPaymentsError::InvalidInput("secret required"));
    }
    compute_hmac(secret, raw_body)
}

/// Find the IPN signature among request headers.
///
/// Tries each name in [`SIGNATURE_HEADER_CANDIDATES`] in order, matching
/// case-insensitively. A missing header is a security failure, not an input
/// error: it is exactly what an unsigned forgery looks like.
pub fn signature_from_headers<'a, I>(headers: I) -> Result<&'a str, NowPaymentsError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let headers: Vec<(&str, &str)> = headers.into_iter().collect();

    SIGNATURE_HEADER_CANDIDATES
        .iter()
        .find_map(|candidate| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(candidate))
                .map(|(_, value)| *value)
        })
        .ok_or_else(|| NowPaymentsError::Security(format!("missing {SIGNATURE_HEADER} header")))
}

fn check_inputs(
    raw_body: &[u8],
    signature: &str,
    secret: &IpnSecret,
) -> Result<(), NowPaymentsError> {
    if raw_body.is_empty() {
        return Err(NowPaymentsError::InvalidInput("raw body required"));
    }
    if signature.is_empty() {
        return Err(NowPaymentsError::InvalidInput("signature required"));
    }
    if secret.is_empty() {
        return Err(NowPaymentsError::InvalidInput("secret required"));
    }
    Ok(())
}

fn parse_payload(raw_body: &[u8]) -> Result<IpnPayload, NowPaymentsError> {
    let value: Value = serde_json::from_slice(raw_body).map_err(|e| {
        NowPaymentsError::InvalidPayload(format!("IPN body is not valid JSON ({:?})", e.classify()))
    })?;
    IpnPayload::from_value(value)
}

fn security_failure() -> NowPaymentsError {
    NowPaymentsError::Security("invalid IPN signature - webhook verification failed".to_string())
}
