use std::env;
use std::time::Duration;

use url::Url;

use crate::client::{Credentials, NowPaymentsClient};
use crate::constants::{Environment, DEFAULT_TIMEOUT};
use crate::ipn::{IpnSecret, IpnVerifier, SignatureMode};

/// Secrets shorter than this are accepted but logged as weak.
pub const MIN_RECOMMENDED_SECRET_LEN: usize = 16;

#[derive(Clone)]
pub struct ClientConfig {
    /// API key sent as `x-api-key`
    pub api_key: String,
    /// IPN secret from the dashboard (None = webhooks not verified by this process)
    pub ipn_secret: Option<IpnSecret>,
    /// Endpoint selection (production / sandbox / override)
    pub environment: Environment,
    /// Dashboard login for `/auth` (None = no protected endpoints)
    pub credentials: Option<Credentials>,
    /// Which bytes IPN signatures are computed over
    pub signature_mode: SignatureMode,
    /// Outbound request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[REDACTED]")
            .field("ipn_secret", &self.ipn_secret.as_ref().map(|_| "[REDACTED]"))
            .field("environment", &self.environment)
            .field("credentials", &self.credentials)
            .field("signature_mode", &self.signature_mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        // Required: API key
        let api_key =
            var("NOWPAYMENTS_API_KEY").ok_or(ConfigError::MissingRequired("NOWPAYMENTS_API_KEY"))?;

        // Optional: sandbox flag and base URL override
        let sandbox = var("NOWPAYMENTS_SANDBOX")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let environment = match var("NOWPAYMENTS_BASE_URL") {
            Some(url) => {
                Url::parse(&url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
                Environment::custom(url)
            }
            None if sandbox => Environment::sandbox(),
            None => Environment::production(),
        };

        // Optional: IPN secret
        let ipn_secret = var("NOWPAYMENTS_IPN_SECRET").map(IpnSecret::from);
        match &ipn_secret {
            Some(secret) if secret.len() < MIN_RECOMMENDED_SECRET_LEN => {
                tracing::warn!(
                    "NOWPAYMENTS_IPN_SECRET is only {} bytes — copy the full secret from the dashboard",
                    secret.len()
                );
            }
            Some(_) => {}
            None => tracing::warn!("NOWPAYMENTS_IPN_SECRET not set — IPN webhooks cannot be verified"),
        }

        // Optional: credentials, both or neither
        let credentials = match (var("NOWPAYMENTS_EMAIL"), var("NOWPAYMENTS_PASSWORD")) {
            (Some(email), Some(password)) => Some(Credentials::new(email, password)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingRequired("NOWPAYMENTS_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::MissingRequired("NOWPAYMENTS_EMAIL")),
        };

        // Optional: signature mode
        let signature_mode = match var("NOWPAYMENTS_SIGNATURE_MODE") {
            Some(mode) => mode.parse().map_err(ConfigError::InvalidSignatureMode)?,
            None => SignatureMode::RawBody,
        };
        if signature_mode == SignatureMode::Canonical {
            tracing::warn!(
                "NOWPAYMENTS_SIGNATURE_MODE=canonical — signatures are checked against a \
                 key-sorted re-encoding, not the raw body"
            );
        }

        // Optional: timeout
        let timeout = match var("NOWPAYMENTS_TIMEOUT_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidTimeout(secs))?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            api_key,
            ipn_secret,
            environment,
            credentials,
            signature_mode,
            timeout,
        })
    }

    pub fn client(&self) -> NowPaymentsClient {
        NowPaymentsClient::new(self.api_key.clone(), self.environment.clone())
            .with_timeout(self.timeout)
    }

    /// Verifier for the configured secret and mode, if a secret is set.
    pub fn ipn_verifier(&self) -> Option<IpnVerifier> {
        self.ipn_secret
            .clone()
            .map(|secret| IpnVerifier::new(secret, self.signature_mode))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid signature mode: {0}")]
    InvalidSignatureMode(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::MissingRequired("NOWPAYMENTS_API_KEY"))
        ));
    }

    #[test]
    fn defaults_to_production_raw_mode() {
        let cfg = config(&[("NOWPAYMENTS_API_KEY", "key")]).unwrap();
        assert_eq!(cfg.environment, Environment::production());
        assert_eq!(cfg.signature_mode, SignatureMode::RawBody);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert!(cfg.credentials.is_none());
        assert!(cfg.ipn_verifier().is_none());
    }

    #[test]
    fn sandbox_flag_selects_sandbox_url() {
        let cfg = config(&[("NOWPAYMENTS_API_KEY", "key"), ("NOWPAYMENTS_SANDBOX", "1")]).unwrap();
        assert!(cfg.environment.sandbox);
        assert_eq!(cfg.client().base_url(), crate::constants::SANDBOX_URL);
    }

    #[test]
    fn credentials_must_come_in_pairs() {
        let err = config(&[
            ("NOWPAYMENTS_API_KEY", "key"),
            ("NOWPAYMENTS_EMAIL", "ops@example.com"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("NOWPAYMENTS_PASSWORD")));
    }

    #[test]
    fn canonical_mode_must_be_explicit() {
        let cfg = config(&[
            ("NOWPAYMENTS_API_KEY", "key"),
            ("NOWPAYMENTS_IPN_SECRET", "0123456789abcdef0123"),
            ("NOWPAYMENTS_SIGNATURE_MODE", "canonical"),
        ])
        .unwrap();
        assert_eq!(cfg.ipn_verifier().unwrap().mode(), SignatureMode::Canonical);

        assert!(matches!(
            config(&[("NOWPAYMENTS_API_KEY", "key"), ("NOWPAYMENTS_SIGNATURE_MODE", "both")]),
            Err(ConfigError::InvalidSignatureMode(_))
        ));
    }

    #[test]
    fn invalid_timeout_and_url_rejected() {
        assert!(matches!(
            config(&[("NOWPAYMENTS_API_KEY", "key"), ("NOWPAYMENTS_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            config(&[("NOWPAYMENTS_API_KEY", "key"), ("NOWPAYMENTS_BASE_URL", "not a url")]),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = config(&[
            ("NOWPAYMENTS_API_KEY", "api-key-value"),
            ("NOWPAYMENTS_IPN_SECRET", "ipn-secret-value"),
            ("NOWPAYMENTS_EMAIL", "ops@example.com"),
            ("NOWPAYMENTS_PASSWORD", "pw-value"),
        ])
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("api-key-value"));
        assert!(!dbg.contains("ipn-secret-value"));
        assert!(!dbg.contains("pw-value"));
    }
}
