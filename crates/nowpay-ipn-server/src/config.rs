use std::env;

use nowpay::config::MIN_RECOMMENDED_SECRET_LEN;
use nowpay::{IpnSecret, IpnVerifier, SignatureMode};

const DEFAULT_PORT: u16 = 4567;
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

#[derive(Clone)]
pub struct ServerConfig {
    /// IPN secret from the merchant dashboard
    pub ipn_secret: IpnSecret,
    /// Which bytes incoming signatures cover
    pub signature_mode: SignatureMode,
    /// Server port
    pub port: u16,
    /// Rate limit requests per minute per IP
    pub rate_limit_rpm: u64,
    /// Bearer token required for /metrics (None = forbidden unless public)
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token
    pub public_metrics: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("ipn_secret", &"[REDACTED]")
            .field("signature_mode", &self.signature_mode)
            .field("port", &self.port)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        // Required: IPN secret. Without it every webhook would be unverifiable.
        let ipn_secret = var("NOWPAYMENTS_IPN_SECRET")
            .map(IpnSecret::from)
            .ok_or(ConfigError::MissingRequired("NOWPAYMENTS_IPN_SECRET"))?;

        let signature_mode = match var("NOWPAYMENTS_SIGNATURE_MODE") {
            Some(mode) => mode.parse().map_err(ConfigError::InvalidSignatureMode)?,
            None => SignatureMode::RawBody,
        };

        let port = match var("PORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::InvalidNumber("PORT", p))?,
            None => DEFAULT_PORT,
        };

        let rate_limit_rpm = match var("RATE_LIMIT_RPM") {
            Some(r) => r
                .parse()
                .ok()
                .filter(|n: &u64| *n > 0)
                .ok_or(ConfigError::InvalidNumber("RATE_LIMIT_RPM", r))?,
            None => DEFAULT_RATE_LIMIT_RPM,
        };

        let metrics_token = var("METRICS_TOKEN").map(String::into_bytes);
        let public_metrics = var("IPN_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if metrics_token.is_none() && !public_metrics {
            tracing::warn!("METRICS_TOKEN not set — /metrics endpoint is disabled");
        }

        Ok(Self {
            ipn_secret,
            signature_mode,
            port,
            rate_limit_rpm,
            metrics_token,
            public_metrics,
        })
    }

    pub fn verifier(&self) -> IpnVerifier {
        IpnVerifier::new(self.ipn_secret.clone(), self.signature_mode)
    }

    /// Accepted, but short enough that it was probably truncated on copy.
    pub fn secret_is_weak(&self) -> bool {
        self.ipn_secret.len() < MIN_RECOMMENDED_SECRET_LEN
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid signature mode: {0}")]
    InvalidSignatureMode(String),

    #[error("invalid value for {0}: {1}")]
    InvalidNumber(&'static str, String),
}
