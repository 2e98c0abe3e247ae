use nowpay::IpnVerifier;

use crate::config::ServerConfig;

/// Shared application state for the IPN receiver.
pub struct AppState {
    /// Verifier bound to the merchant's IPN secret. Mandatory: the server
    /// does not start without a secret.
    pub verifier: IpnVerifier,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            verifier: config.verifier(),
            metrics_token: config.metrics_token.clone(),
            public_metrics: config.public_metrics,
        }
    }
}
