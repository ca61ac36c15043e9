use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect},
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::consultation_service::{FormAccess, SubmitOutcome};
use crate::web::{AppState, serve_embedded_page};

use super::{json_error, views::SubmitRequest};

#[derive(Debug, Deserialize)]
pub struct FormQuery {
    pub session_id: Option<String>,
}

/// GET /form?session_id=…
/// Gate in front of the question form. Any doubt about the session (absent,
/// unpaid, lookup failure) sends the visitor back to the services section.
pub async fn form_gate(
    State(state): State<AppState>,
    Query(query): Query<FormQuery>,
) -> impl IntoResponse {
    let session_id = match query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(s) => s.to_string(),
        None => return Redirect::to("/#services").into_response(),
    };

    match state.consultations.form_access(&session_id).await {
        Ok(FormAccess::Open) => serve_embedded_page("form.html"),
        Ok(FormAccess::AlreadySubmitted) => Redirect::to("/already-submitted.html").into_response(),
        Ok(FormAccess::Denied) => Redirect::to("/#services").into_response(),
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Form access check failed");
            Redirect::to("/#services").into_response()
        }
    }
}

/// POST /api/submit
/// The customer's question for a paid checkout session.
pub async fn submit_question(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    let details = match payload.validate() {
        Ok(details) => details,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message).into_response(),
    };
    let session_id = payload.session_id.trim();

    match state.consultations.submit(session_id, details).await {
        Ok(SubmitOutcome::Accepted(_)) => {
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Ok(SubmitOutcome::AlreadySubmitted) => json_error(
            StatusCode::FORBIDDEN,
            "Une question a déjà été envoyée pour cette consultation",
        )
        .into_response(),
        Ok(SubmitOutcome::PaymentNotVerified) => json_error(
            StatusCode::FORBIDDEN,
            "Le paiement n'a pas pu être vérifié",
        )
        .into_response(),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to store submission");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Une erreur est survenue, veuillez réessayer",
            )
            .into_response()
        }
    }
}
