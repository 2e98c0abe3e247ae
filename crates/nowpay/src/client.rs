//! HTTP client for the NOWPayments REST API.
//!
//! Every request carries `x-api-key`. Protected endpoints (payouts) also need
//! a bearer token from `/auth`, which [`TokenManager`] tracks; a protected
//! call made without a usable token fails with `Authentication` before any
//! request is sent.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{Environment, API_KEY_HEADER, DEFAULT_TIMEOUT};
use crate::error::NowPaymentsError;
use crate::token::TokenManager;

/// Dashboard login used by `/auth`. Both fields are case-sensitive.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Successful `/auth` response.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthResponse { token: [REDACTED] }")
    }
}

/// Body for `POST /payment`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatePayment {
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_extra_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fixed_rate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fee_paid_by_user: Option<bool>,
}

impl CreatePayment {
    pub fn new(
        price_amount: f64,
        price_currency: impl Into<String>,
        pay_currency: impl Into<String>,
    ) -> Self {
        Self {
            price_amount,
            price_currency: price_currency.into(),
            pay_currency: pay_currency.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), NowPaymentsError> {
        if self.payout_address.is_some() && self.payout_currency.is_none() {
            return Err(NowPaymentsError::Validation(
                "payout_currency required when payout_address is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// One entry of a `POST /payout` batch.
#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
    pub address: String,
    pub currency: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
}

/// Authenticated transport cached for one token generation.
struct CachedTransport {
    generation: u64,
    client: reqwest::Client,
}

pub struct NowPaymentsClient {
    api_key: String,
    environment: Environment,
    timeout: Duration,
    tokens: Arc<TokenManager>,
    base: Mutex<Option<reqwest::Client>>,
    authed: Mutex<Option<CachedTransport>>,
    /// Serialises re-authentication so concurrent callers share one `/auth` round trip.
    auth_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for NowPaymentsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NowPaymentsClient")
            .field("api_key", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl NowPaymentsClient {
    pub fn new(api_key: impl Into<String>, environment: Environment) -> Self {
        Self {
            api_key: api_key.into(),
            environment,
            timeout: DEFAULT_TIMEOUT,
            tokens: Arc::new(TokenManager::new()),
            base: Mutex::new(None),
            authed: Mutex::new(None),
            auth_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a token manager (e.g. one driven by a test clock).
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.environment.base_url
    }

    pub fn is_sandbox(&self) -> bool {
        self.environment.sandbox
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Forget the bearer token (logout).
    pub fn clear_token(&self) {
        self.tokens.clear();
    }

    // ---- authentication ----

    /// Exchange dashboard credentials for a bearer token.
    ///
    /// On success the token is stored with a five-minute expiry. Any other
    /// outcome (error status, or a 2xx without a token) is an
    /// `Authentication` error and leaves the current token untouched.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthResponse, NowPaymentsError> {
        let issued_at = self.tokens.now();
        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        });

        let resp = self
            .base_transport()?
            .post(self.url("auth"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(transport_error)?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        if !(200..300).contains(&status) {
            let message = error_message(parsed.as_ref(), &text, status);
            if status == 401 || status == 403 {
                tracing::warn!(
                    status,
                    "authentication rejected: check the dashboard email and password \
                     (both case-sensitive) and that API access is enabled for the account"
                );
            } else {
                tracing::warn!(status, "authentication failed");
            }
            return Err(NowPaymentsError::Authentication {
                status: Some(status),
                message,
            });
        }

        let token = parsed
            .as_ref()
            .and_then(|v| v.get("token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        match token {
            Some(token) => {
                self.tokens.store(token.clone(), issued_at);
                tracing::info!("authenticated; bearer token valid for 300s");
                Ok(AuthResponse { token })
            }
            None => {
                tracing::warn!(status, "authentication response did not include a token");
                Err(NowPaymentsError::Authentication {
                    status: Some(status),
                    message: parsed
                        .as_ref()
                        .and_then(|v| v.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("authentication response did not include a token")
                        .to_string(),
                })
            }
        }
    }

    /// Return a usable bearer token, authenticating first if the current one
    /// is missing or expired.
    pub async fn ensure_authenticated(
        &self,
        credentials: &Credentials,
    ) -> Result<String, NowPaymentsError> {
        if let Ok(token) = self.tokens.bearer() {
            return Ok(token);
        }

        let _gate = self.auth_gate.lock().await;
        // Another caller may have refreshed while we waited.
        if let Ok(token) = self.tokens.bearer() {
            return Ok(token);
        }
        tracing::debug!(status = ?self.tokens.status(), "re-authenticating");
        self.authenticate(credentials).await.map(|r| r.token)
    }

    // ---- endpoints ----

    /// `GET /status`
    pub async fn status(&self) -> Result<Value, NowPaymentsError> {
        self.get("status", false).await
    }

    /// `GET /payment/{id}`
    pub async fn payment(&self, payment_id: u64) -> Result<Value, NowPaymentsError> {
        self.get(&format!("payment/{payment_id}"), false).await
    }

    /// `POST /payment`
    pub async fn create_payment(&self, payment: &CreatePayment) -> Result<Value, NowPaymentsError> {
        payment.validate()?;
        self.post("payment", payment, false).await
    }

    /// `POST /payout`. Requires a bearer token.
    pub async fn create_payout(
        &self,
        withdrawals: &[Withdrawal],
    ) -> Result<Value, NowPaymentsError> {
        if withdrawals.is_empty() {
            return Err(NowPaymentsError::Validation(
                "at least one withdrawal required".to_string(),
            ));
        }
        let body = serde_json::json!({ "withdrawals": withdrawals });
        self.post("payout", &body, true).await
    }

    // ---- plumbing ----

    async fn get(&self, path: &str, protected: bool) -> Result<Value, NowPaymentsError> {
        let http = self.transport(protected)?;
        let resp = http
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        read_response(resp).await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        protected: bool,
    ) -> Result<Value, NowPaymentsError> {
        let http = self.transport(protected)?;
        let resp = http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(resp).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.environment.base_url.trim_end_matches('/'), path)
    }

    /// Pick the transport for a call. Protected calls require a live token;
    /// unprotected calls attach one only if it is still valid.
    fn transport(&self, protected: bool) -> Result<reqwest::Client, NowPaymentsError> {
        match self.tokens.bearer_with_generation() {
            Ok((token, generation)) => self.authed_transport(&token, generation),
            Err(e) if protected => {
                tracing::warn!(
                    status = ?self.tokens.status(),
                    "protected call without a valid bearer token"
                );
                Err(e)
            }
            Err(_) => self.base_transport(),
        }
    }

    fn base_transport(&self) -> Result<reqwest::Client, NowPaymentsError> {
        let mut base = self.base.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(client) = base.as_ref() {
            return Ok(client.clone());
        }
        let client = self.build_transport(None)?;
        *base = Some(client.clone());
        Ok(client)
    }

    /// Rebuilt whenever the token generation moves, so a new token is
    /// picked up by the next call. `token` and `generation` must come from
    /// the same [`TokenManager::bearer_with_generation`] read.
    fn authed_transport(
        &self,
        token: &str,
        generation: u64,
    ) -> Result<reqwest::Client, NowPaymentsError> {
        let mut authed = self.authed.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cached) = authed.as_ref() {
            if cached.generation == generation {
                return Ok(cached.client.clone());
            }
        }
        let client = self.build_transport(Some(token))?;
        *authed = Some(CachedTransport {
            generation,
            client: client.clone(),
        });
        Ok(client)
    }

    fn build_transport(&self, bearer: Option<&str>) -> Result<reqwest::Client, NowPaymentsError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| {
                NowPaymentsError::Validation("api key is not a valid header value".to_string())
            })?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);

        if let Some(token) = bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| {
                    NowPaymentsError::Validation(
                        "bearer token is not a valid header value".to_string(),
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .default_headers(headers)
            .build()
            .map_err(|e| NowPaymentsError::Transport(format!("failed to build http client: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> NowPaymentsError {
    tracing::warn!(error = %e, "gateway request failed");
    NowPaymentsError::Transport(e.to_string())
}

async fn read_response(resp: reqwest::Response) -> Result<Value, NowPaymentsError> {
    let status = resp.status().as_u16();
    let text = resp.text().await.map_err(transport_error)?;

    if (200..300).contains(&status) {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text)
            .map_err(|e| NowPaymentsError::InvalidPayload(format!("response parse failed: {e}")));
    }

    let parsed: Option<Value> = serde_json::from_str(&text).ok();
    let err = NowPaymentsError::from_status(status, error_message(parsed.as_ref(), &text, status));
    tracing::debug!(status, error = %err, "gateway returned an error");
    Err(err)
}

/// Prefer the gateway's `message` field, then the raw body, then the bare status.
fn error_message(parsed: Option<&Value>, text: &str, status: u16) -> String {
    if let Some(message) = parsed.and_then(|v| v.get("message")).and_then(Value::as_str) {
        return message.to_string();
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}
