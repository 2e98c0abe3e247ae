use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::error::IpnError;
use crate::metrics;
use crate::state::AppState;
use crate::webhook;

/// Receive an IPN callback.
///
/// The body is taken as raw bytes: the signature covers the exact bytes the
/// gateway sent, so nothing may be parsed or re-encoded before verification.
#[post("/webhooks/nowpayments")]
pub async fn ipn_callback(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, IpnError> {
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));

    let payload = match state.verifier.verify_with_headers(&body, headers) {
        Ok(payload) => payload,
        Err(e) => {
            let result = if e.is_security() { "rejected" } else { "invalid" };
            metrics::IPN_REQUESTS.with_label_values(&[result]).inc();
            return Err(e.into());
        }
    };

    metrics::IPN_REQUESTS.with_label_values(&["verified"]).inc();
    webhook::handle_notification(&payload);

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "nowpay-ipn-server",
        "timestamp": timestamp,
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| nowpay::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or IPN_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
