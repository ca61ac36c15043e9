use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum amount (in minor currency units) for the premium offering.
pub const PREMIUM_THRESHOLD_CENTS: i64 = 1000;

pub const SERVICE_PREMIUM: &str = "Consultation Ressenti";
pub const SERVICE_STANDARD: &str = "Question Simple";

/// Derive the service label from the amount paid.
///
/// Both creation paths (webhook and submit fallback) go through this function
/// so the same checkout session can never end up with divergent labels.
pub fn service_for_amount(amount_cents: i64) -> &'static str {
    if amount_cents >= PREMIUM_THRESHOLD_CENTS {
        SERVICE_PREMIUM
    } else {
        SERVICE_STANDARD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::ConsultationStatus")]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    #[db_enum(rename = "paid")]
    Paid,
    #[db_enum(rename = "submitted")]
    Submitted,
    #[db_enum(rename = "answered")]
    Answered,
}

/// API model for consultations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub stripe_session_id: String,
    pub service: String,
    pub amount_cents: i32,
    pub status: ConsultationStatus,
    pub customer_email: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    pub message: Option<String>,
    pub response: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    /// Preferred address for the answer email: the address typed into the
    /// question form, falling back to the checkout session's customer email.
    pub fn notification_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.customer_email.as_deref())
            .filter(|e| !e.is_empty())
    }
}

/// Diesel model for the consultations table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::consultations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConsultationModel {
    pub id: Uuid,
    pub stripe_session_id: String,
    pub service: String,
    pub amount_cents: i32,
    pub status: ConsultationStatus,
    pub customer_email: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    pub message: Option<String>,
    pub response: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert model for new consultations
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::consultations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewConsultation {
    pub stripe_session_id: String,
    pub service: String,
    pub amount_cents: i32,
    pub status: ConsultationStatus,
    pub customer_email: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    pub message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl NewConsultation {
    /// Row created by the payment webhook: paid, no question yet.
    pub fn paid(session_id: &str, amount_cents: i64, customer_email: Option<String>) -> Self {
        Self {
            stripe_session_id: session_id.to_string(),
            service: service_for_amount(amount_cents).to_string(),
            amount_cents: amount_cents as i32,
            status: ConsultationStatus::Paid,
            customer_email,
            name: None,
            email: None,
            birthdate: None,
            person_concerned: None,
            message: None,
            submitted_at: None,
        }
    }

    /// Row synthesized by the submit fallback when the webhook has not arrived
    /// yet: created directly in submitted status, question included.
    pub fn submitted(
        session_id: &str,
        amount_cents: i64,
        customer_email: Option<String>,
        details: &SubmissionDetails,
    ) -> Self {
        Self {
            stripe_session_id: session_id.to_string(),
            service: service_for_amount(amount_cents).to_string(),
            amount_cents: amount_cents as i32,
            status: ConsultationStatus::Submitted,
            customer_email,
            name: Some(details.name.clone()),
            email: Some(details.email.clone()),
            birthdate: details.birthdate.clone(),
            person_concerned: details.person_concerned.clone(),
            message: Some(details.message.clone()),
            submitted_at: Some(Utc::now()),
        }
    }
}

/// What the customer types into the question form.
#[derive(Debug, Clone)]
pub struct SubmissionDetails {
    pub name: String,
    pub email: String,
    pub birthdate: Option<String>,
    pub person_concerned: Option<String>,
    pub message: String,
}

/// Aggregates shown on the admin dashboard. Only records that reached
/// submitted status count; paid-but-silent sessions are invisible here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsultationStats {
    pub total: i64,
    pub pending: i64,
    pub answered: i64,
    pub revenue_cents: i64,
}

impl From<ConsultationModel> for Consultation {
    fn from(model: ConsultationModel) -> Self {
        Self {
            id: model.id,
            stripe_session_id: model.stripe_session_id,
            service: model.service,
            amount_cents: model.amount_cents,
            status: model.status,
            customer_email: model.customer_email,
            name: model.name,
            email: model.email,
            birthdate: model.birthdate,
            person_concerned: model.person_concerned,
            message: model.message,
            response: model.response,
            submitted_at: model.submitted_at,
            answered_at: model.answered_at,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_label_at_and_above_threshold() {
        assert_eq!(service_for_amount(1000), SERVICE_PREMIUM);
        assert_eq!(service_for_amount(1500), SERVICE_PREMIUM);
        assert_eq!(service_for_amount(99_000), SERVICE_PREMIUM);
    }

    #[test]
    fn standard_label_below_threshold() {
        assert_eq!(service_for_amount(999), SERVICE_STANDARD);
        assert_eq!(service_for_amount(500), SERVICE_STANDARD);
        assert_eq!(service_for_amount(0), SERVICE_STANDARD);
    }

    #[test]
    fn both_creation_paths_share_the_derivation() {
        let details = SubmissionDetails {
            name: "Claire".to_string(),
            email: "claire@example.com".to_string(),
            birthdate: None,
            person_concerned: None,
            message: "Ma question".to_string(),
        };

        let from_webhook = NewConsultation::paid("cs_123", 1500, None);
        let from_fallback = NewConsultation::submitted("cs_123", 1500, None, &details);
        assert_eq!(from_webhook.service, from_fallback.service);
        assert_eq!(from_webhook.service, SERVICE_PREMIUM);
    }

    #[test]
    fn notification_email_prefers_form_address() {
        let mut c = Consultation {
            id: Uuid::new_v4(),
            stripe_session_id: "cs_1".to_string(),
            service: SERVICE_PREMIUM.to_string(),
            amount_cents: 1500,
            status: ConsultationStatus::Submitted,
            customer_email: Some("checkout@example.com".to_string()),
            name: Some("Claire".to_string()),
            email: Some("form@example.com".to_string()),
            birthdate: None,
            person_concerned: None,
            message: Some("Ma question".to_string()),
            response: None,
            submitted_at: Some(Utc::now()),
            answered_at: None,
            created_at: Utc::now(),
        };

        assert_eq!(c.notification_email(), Some("form@example.com"));
        c.email = None;
        assert_eq!(c.notification_email(), Some("checkout@example.com"));
        c.customer_email = None;
        assert_eq!(c.notification_email(), None);
    }
}
