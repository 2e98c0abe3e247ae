use actix_web::{HttpResponse, ResponseError};
use nowpay::NowPaymentsError;

/// Failure while handling an inbound IPN request.
#[derive(Debug, thiserror::Error)]
pub enum IpnError {
    /// Signature missing or wrong: possible forgery.
    #[error("IPN rejected: {0}")]
    Rejected(NowPaymentsError),

    /// Malformed request (empty body, empty signature, authentic but unparsable body).
    #[error("invalid IPN request: {0}")]
    BadRequest(NowPaymentsError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<NowPaymentsError> for IpnError {
    fn from(e: NowPaymentsError) -> Self {
        match e {
            NowPaymentsError::Security(_) => IpnError::Rejected(e),
            NowPaymentsError::InvalidInput(_) | NowPaymentsError::InvalidPayload(_) => {
                IpnError::BadRequest(e)
            }
            other => IpnError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for IpnError {
    fn error_response(&self) -> HttpResponse {
        match self {
            IpnError::Rejected(e) => {
                tracing::error!(error = %e, "IPN signature rejected — potential fraud");
                HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "invalid signature"
                }))
            }
            IpnError::BadRequest(e) => {
                tracing::warn!(error = %e, "malformed IPN request");
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid request"
                }))
            }
            IpnError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal error"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_errors_map_to_forbidden() {
        let err = IpnError::from(NowPaymentsError::Security("mismatch".into()));
        assert_eq!(err.error_response().status(), 403);
    }

    #[test]
    fn input_errors_map_to_bad_request() {
        let err = IpnError::from(NowPaymentsError::InvalidInput("raw body required"));
        assert_eq!(err.error_response().status(), 400);
        let err = IpnError::from(NowPaymentsError::InvalidPayload("not an object".into()));
        assert_eq!(err.error_response().status(), 400);
    }

    #[test]
    fn other_errors_map_to_internal() {
        let err = IpnError::from(NowPaymentsError::Transport("down".into()));
        assert_eq!(err.error_response().status(), 500);
    }
}
