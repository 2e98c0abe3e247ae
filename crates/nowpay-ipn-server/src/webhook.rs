use nowpay::{IpnPayload, PaymentStatus};

use crate::metrics;

/// Record a verified notification.
///
/// Delivery is at-least-once, so anything done here must be idempotent per
/// `payment_id` and `payment_status`.
pub fn handle_notification(payload: &IpnPayload) {
    let payment_id = payload.payment_id();
    let order_id = payload.order_id().unwrap_or("");
    let status = payload
        .payment_status()
        .unwrap_or_else(|| PaymentStatus::Unknown("missing".to_string()));

    metrics::IPN_PAYMENT_STATUS
        .with_label_values(&[status_label(&status)])
        .inc();

    match status {
        PaymentStatus::Finished => {
            tracing::info!(?payment_id, order_id, "payment finished");
        }
        PaymentStatus::Failed => {
            tracing::warn!(?payment_id, order_id, "payment failed");
        }
        PaymentStatus::PartiallyPaid => {
            tracing::warn!(
                ?payment_id,
                order_id,
                pay_amount = %field(payload, "pay_amount"),
                actually_paid = %field(payload, "actually_paid"),
                "payment partially paid"
            );
        }
        PaymentStatus::Expired => {
            tracing::info!(?payment_id, order_id, "payment expired");
        }
        PaymentStatus::Unknown(ref s) => {
            tracing::warn!(?payment_id, order_id, status = %s, "unrecognised payment status");
        }
        other => {
            tracing::info!(?payment_id, order_id, status = %other, "payment status update");
        }
    }
}

/// Label for the status counter. Unknown strings collapse to one label so
/// the series count stays bounded.
fn status_label(status: &PaymentStatus) -> &str {
    match status {
        PaymentStatus::Unknown(_) => "unknown",
        known => known.as_str(),
    }
}

fn field(payload: &IpnPayload, key: &str) -> String {
    match payload.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}
