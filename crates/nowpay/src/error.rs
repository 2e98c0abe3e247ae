use thiserror::Error;

/// Errors returned by nowpay operations.
///
/// `Security` always means "reject the request". It is never retryable and
/// never carries payload content.
#[derive(Debug, Error)]
pub enum NowPaymentsError {
    /// The caller passed an empty or missing argument.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("security error: {0}")]
    Security(String),

    #[error("authentication error: {message}{}", status_suffix(.status))]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// Could not reach the gateway (connect failure, timeout, IO).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("bad request: {message} (HTTP {status})")]
    BadRequest { status: u16, message: String },

    #[error("not found: {message} (HTTP {status})")]
    NotFound { status: u16, message: String },

    #[error("rate limited: {message} (HTTP {status})")]
    RateLimited { status: u16, message: String },

    #[error("server error: {message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("api error: {message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("validation error: {0}")]
    Validation(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl NowPaymentsError {
    /// Classify a non-2xx gateway response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => Self::BadRequest { status, message },
            401 | 403 => Self::Authentication {
                status: Some(status),
                message,
            },
            404 => Self::NotFound { status, message },
            429 => Self::RateLimited { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Api { status, message },
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether repeating the same call could succeed without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    /// HTTP status reported by the gateway, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } => *status,
            Self::BadRequest { status, .. }
            | Self::NotFound { status, .. }
            | Self::RateLimited { status, .. }
            | Self::Server { status, .. }
            | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
