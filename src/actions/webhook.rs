use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use stripe::EventObject;
use tracing::{error, info, warn};

use crate::web::AppState;

/// POST /api/webhook
/// Stripe payment notifications. Once the signature verifies, the provider
/// gets a 200 acknowledgment regardless of what the business logic does;
/// failures past that point are logged and resolved on redelivery.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    metrics::counter!("stripe.webhook.received").increment(1);

    let signature = match headers.get("stripe-signature").and_then(|sig| sig.to_str().ok()) {
        Some(s) => s.to_string(),
        None => {
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let payload = match std::str::from_utf8(&body) {
        Ok(s) => s,
        Err(_) => {
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let event = match state.stripe.verify_webhook(payload, &signature) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Invalid webhook signature");
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if event.type_ == stripe::EventType::CheckoutSessionCompleted {
        if let EventObject::CheckoutSession(session) = &event.data.object {
            let session_id = session.id.to_string();
            let amount_cents = session.amount_total.unwrap_or(0);
            let customer_email = session
                .customer_details
                .as_ref()
                .and_then(|details| details.email.clone())
                .or_else(|| session.customer_email.clone());

            if let Err(e) = state
                .consultations
                .record_paid_session(&session_id, amount_cents, customer_email)
                .await
            {
                error!(session_id = %session_id, error = %e, "Failed to record paid session");
            }
        }
    } else {
        info!(event_type = %event.type_, "Ignoring webhook event type");
    }

    Json(serde_json::json!({ "received": true })).into_response()
}
