use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

use crate::consultation_service::ConsultationStore;
use crate::consultations::{
    Consultation, ConsultationModel, ConsultationStats, ConsultationStatus, NewConsultation,
    SubmissionDetails,
};
use crate::web::PgPool;

#[derive(Clone)]
pub struct ConsultationsRepository {
    pool: PgPool,
}

impl ConsultationsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsultationStore for ConsultationsRepository {
    /// Get a consultation by ID
    async fn get_by_id(&self, consultation_id: Uuid) -> Result<Option<Consultation>> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let consultation: Option<ConsultationModel> = dsl::consultations
                .filter(dsl::id.eq(consultation_id))
                .first::<ConsultationModel>(&mut conn)
                .optional()?;

            Ok::<Option<ConsultationModel>, anyhow::Error>(consultation)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Get a consultation by checkout session ID
    async fn get_by_session_id(&self, session_id: &str) -> Result<Option<Consultation>> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let consultation: Option<ConsultationModel> = dsl::consultations
                .filter(dsl::stripe_session_id.eq(&session_id))
                .first::<ConsultationModel>(&mut conn)
                .optional()?;

            Ok::<Option<ConsultationModel>, anyhow::Error>(consultation)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Insert a new consultation keyed by its checkout session.
    ///
    /// The uniqueness constraint on stripe_session_id arbitrates the
    /// webhook/submit race: whoever loses the insert gets `None` back and
    /// must re-read or re-update instead of creating a duplicate row.
    async fn create(&self, new_consultation: NewConsultation) -> Result<Option<Consultation>> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let inserted: Option<ConsultationModel> = diesel::insert_into(dsl::consultations)
                .values(&new_consultation)
                .on_conflict(dsl::stripe_session_id)
                .do_nothing()
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<ConsultationModel>, anyhow::Error>(inserted)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Attach the customer's question to a paid consultation.
    ///
    /// Conditional on the row still being in paid status; returns `None` when
    /// no row matched (absent session or one that already moved on). The
    /// status guard lives in the statement itself, not in a prior read.
    async fn mark_submitted(
        &self,
        session_id: &str,
        details: &SubmissionDetails,
    ) -> Result<Option<Consultation>> {
        use crate::schema::consultations;

        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let details = details.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let updated: Option<ConsultationModel> = diesel::update(consultations::table)
                .filter(consultations::stripe_session_id.eq(&session_id))
                .filter(consultations::status.eq(ConsultationStatus::Paid))
                .set((
                    consultations::status.eq(ConsultationStatus::Submitted),
                    consultations::name.eq(details.name.as_str()),
                    consultations::email.eq(details.email.as_str()),
                    consultations::birthdate.eq(details.birthdate.as_deref()),
                    consultations::person_concerned.eq(details.person_concerned.as_deref()),
                    consultations::message.eq(details.message.as_str()),
                    consultations::submitted_at.eq(diesel::dsl::now),
                ))
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<ConsultationModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Store the admin's answer.
    ///
    /// Conditional on the row having left paid status: a consultation must
    /// carry a question before it can carry an answer. Re-answering an
    /// already answered row is permitted and simply replaces the response.
    async fn mark_answered(
        &self,
        consultation_id: Uuid,
        response: &str,
    ) -> Result<Option<Consultation>> {
        use crate::schema::consultations;

        let pool = self.pool.clone();
        let response = response.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let updated: Option<ConsultationModel> = diesel::update(consultations::table)
                .filter(consultations::id.eq(consultation_id))
                .filter(consultations::status.ne(ConsultationStatus::Paid))
                .set((
                    consultations::status.eq(ConsultationStatus::Answered),
                    consultations::response.eq(response.as_str()),
                    consultations::answered_at.eq(diesel::dsl::now),
                ))
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<ConsultationModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Delete a consultation. Returns whether a row was actually removed.
    async fn delete(&self, consultation_id: Uuid) -> Result<bool> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let deleted =
                diesel::delete(dsl::consultations.filter(dsl::id.eq(consultation_id)))
                    .execute(&mut conn)?;

            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;

        Ok(result > 0)
    }

    /// List submitted and answered consultations, newest submission first
    async fn list_submitted(&self) -> Result<Vec<Consultation>> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let consultations: Vec<ConsultationModel> = dsl::consultations
                .filter(dsl::status.ne(ConsultationStatus::Paid))
                .order_by(dsl::submitted_at.desc())
                .load::<ConsultationModel>(&mut conn)?;

            Ok::<Vec<ConsultationModel>, anyhow::Error>(consultations)
        })
        .await??;

        Ok(result.into_iter().map(|model| model.into()).collect())
    }

    /// Dashboard aggregates over submitted and answered consultations
    async fn stats(&self) -> Result<ConsultationStats> {
        use crate::schema::consultations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let total: i64 = dsl::consultations
                .filter(dsl::status.ne(ConsultationStatus::Paid))
                .count()
                .get_result(&mut conn)?;

            let pending: i64 = dsl::consultations
                .filter(dsl::status.eq(ConsultationStatus::Submitted))
                .count()
                .get_result(&mut conn)?;

            let answered: i64 = dsl::consultations
                .filter(dsl::status.eq(ConsultationStatus::Answered))
                .count()
                .get_result(&mut conn)?;

            let revenue_cents: Option<i64> = dsl::consultations
                .filter(dsl::status.ne(ConsultationStatus::Paid))
                .select(diesel::dsl::sum(dsl::amount_cents))
                .get_result(&mut conn)?;

            Ok::<ConsultationStats, anyhow::Error>(ConsultationStats {
                total,
                pending,
                answered,
                revenue_cents: revenue_cents.unwrap_or(0),
            })
        })
        .await??;

        Ok(result)
    }
}
