use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::error;
use uuid::Uuid;

use crate::auth::{AdminSession, SESSION_COOKIE};
use crate::consultation_service::RespondOutcome;
use crate::web::AppState;

use super::{
    json_error,
    views::{ConsultationView, LoginRequest, RespondRequest, RespondResponse, StatsView},
};

/// POST /api/admin/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    if !state.admin.check_password(&payload.password) {
        metrics::counter!("admin.login.rejected").increment(1);
        return json_error(StatusCode::UNAUTHORIZED, "Mot de passe incorrect").into_response();
    }

    let token = match state.admin.session_service().issue_session() {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Failed to issue admin session");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Une erreur est survenue")
                .into_response();
        }
    };

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    metrics::counter!("admin.login.accepted").increment(1);
    (
        jar.add(cookie),
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}

/// POST /api/admin/logout
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");

    (
        jar.remove(cookie),
        Json(serde_json::json!({ "success": true })),
    )
}

/// GET /api/admin/stats
pub async fn admin_stats(_: AdminSession, State(state): State<AppState>) -> impl IntoResponse {
    match state.consultations.stats().await {
        Ok(stats) => Json(StatsView::from(stats)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to load stats");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Une erreur est survenue")
                .into_response()
        }
    }
}

/// GET /api/admin/consultations
pub async fn list_consultations(
    _: AdminSession,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.consultations.list().await {
        Ok(consultations) => {
            let views: Vec<ConsultationView> =
                consultations.into_iter().map(ConsultationView::from).collect();
            Json(views).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list consultations");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Une erreur est survenue")
                .into_response()
        }
    }
}

/// POST /api/admin/respond
/// Stores the answer, then attempts the notification email. The answer is
/// committed even when the email fails; the payload tells the admin which of
/// the two happened.
pub async fn respond(
    _: AdminSession,
    State(state): State<AppState>,
    Json(payload): Json<RespondRequest>,
) -> impl IntoResponse {
    let response_text = payload.response.trim();
    if response_text.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Veuillez écrire une réponse")
            .into_response();
    }

    match state.consultations.respond(payload.id, response_text).await {
        Ok(RespondOutcome::Answered { email_sent, .. }) => {
            let message = if email_sent {
                "Réponse enregistrée et envoyée par email"
            } else {
                "Réponse enregistrée, mais l'email n'a pas pu être envoyé"
            };
            Json(RespondResponse {
                success: true,
                email_sent,
                message: message.to_string(),
            })
            .into_response()
        }
        Ok(RespondOutcome::NotFound) => {
            json_error(StatusCode::NOT_FOUND, "Consultation introuvable").into_response()
        }
        Ok(RespondOutcome::AwaitingQuestion) => json_error(
            StatusCode::BAD_REQUEST,
            "Cette consultation n'a pas encore de question",
        )
        .into_response(),
        Err(e) => {
            error!(consultation_id = %payload.id, error = %e, "Failed to store response");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Une erreur est survenue")
                .into_response()
        }
    }
}

/// DELETE /api/admin/consultations/{id}
pub async fn delete_consultation(
    _: AdminSession,
    State(state): State<AppState>,
    Path(consultation_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.consultations.delete(consultation_id).await {
        // Deleting an id that is already gone still reports success: the row
        // does not exist either way.
        Ok(_) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            error!(consultation_id = %consultation_id, error = %e, "Failed to delete consultation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Une erreur est survenue")
                .into_response()
        }
    }
}
