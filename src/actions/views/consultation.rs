use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consultations::{Consultation, ConsultationStats, SubmissionDetails};

/// Request body for the question form submission.
///
/// Required fields are plain strings defaulting to empty so that missing and
/// blank values get the same localized 400 from `validate`, instead of a
/// deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl SubmitRequest {
    pub fn validate(&self) -> Result<SubmissionDetails, &'static str> {
        if self.session_id.trim().is_empty() {
            return Err("Session de paiement manquante");
        }
        if self.name.trim().is_empty() {
            return Err("Veuillez indiquer votre nom");
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("Veuillez indiquer une adresse email valide");
        }
        if self.message.trim().is_empty() {
            return Err("Veuillez écrire votre question");
        }

        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(SubmissionDetails {
            name: self.name.trim().to_string(),
            email: email.to_string(),
            birthdate: clean(&self.birthdate),
            person_concerned: clean(&self.person_concerned),
            message: self.message.trim().to_string(),
        })
    }
}

/// Request body for the admin response action
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub id: Uuid,
    #[serde(default)]
    pub response: String,
}

/// Response for the admin respond action
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    pub success: bool,
    pub email_sent: bool,
    pub message: String,
}

/// View model for consultations (admin API response)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationView {
    pub id: String,
    pub stripe_session_id: String,
    pub service: String,
    pub amount: Decimal,
    pub status: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    pub message: Option<String>,
    pub response: Option<String>,
    pub submitted_at: Option<String>,
    pub answered_at: Option<String>,
    pub created_at: String,
}

impl From<Consultation> for ConsultationView {
    fn from(c: Consultation) -> Self {
        Self {
            id: c.id.to_string(),
            stripe_session_id: c.stripe_session_id,
            service: c.service,
            amount: Decimal::new(c.amount_cents as i64, 2),
            status: serde_json::to_value(c.status)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default(),
            name: c.name,
            email: c.email,
            birthdate: c.birthdate,
            person_concerned: c.person_concerned,
            message: c.message,
            response: c.response,
            submitted_at: c.submitted_at.map(|t| t.to_rfc3339()),
            answered_at: c.answered_at.map(|t| t.to_rfc3339()),
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Dashboard aggregates (admin API response)
#[derive(Debug, Serialize)]
pub struct StatsView {
    pub total: i64,
    pub pending: i64,
    pub answered: i64,
    pub revenue: Decimal,
}

impl From<ConsultationStats> for StatsView {
    fn from(stats: ConsultationStats) -> Self {
        Self {
            total: stats.total,
            pending: stats.pending,
            answered: stats.answered,
            revenue: Decimal::new(stats.revenue_cents, 2),
        }
    }
}
