use std::time::Duration;

/// Production API base URL.
pub const BASE_URL: &str = "https://api.nowpayments.io/v1";

/// Sandbox API base URL.
pub const SANDBOX_URL: &str = "https://api-sandbox.nowpayments.io/v1";

/// Header carrying the API key on every outbound request.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the IPN signature on inbound webhooks.
pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Accepted names for the signature header, in lookup order.
///
/// The second entry is the CGI/Rack environment form that some proxies and
/// test harnesses forward instead of the raw header name.
pub const SIGNATURE_HEADER_CANDIDATES: &[&str] = &[SIGNATURE_HEADER, "HTTP_X_NOWPAYMENTS_SIG"];

/// Bearer tokens issued by `/auth` are valid for five minutes.
pub const TOKEN_TTL: Duration = Duration::from_secs(300);

/// Default timeout for outbound requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub base_url: String,
    pub sandbox: bool,
}

impl Environment {
    pub fn production() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            sandbox: false,
        }
    }

    pub fn sandbox() -> Self {
        Self {
            base_url: SANDBOX_URL.to_string(),
            sandbox: true,
        }
    }

    /// Point at an arbitrary base URL (mock servers, proxies).
    pub fn custom(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sandbox: false,
        }
    }
}

impl Default for Environment {
    /// Defaults to production.
    fn default() -> Self {
        Self::production()
    }
}
