use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::consultations::{
    Consultation, ConsultationStats, ConsultationStatus, NewConsultation, SubmissionDetails,
};

/// Durable consultation state. Implemented by the Postgres repository; tests
/// substitute an in-memory double.
///
/// The conditional methods (`create`, `mark_submitted`, `mark_answered`)
/// return `None` when their status guard did not match any row. Implementors
/// must evaluate the guard atomically with the write, not as a prior read.
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    async fn get_by_id(&self, consultation_id: Uuid) -> Result<Option<Consultation>>;
    async fn get_by_session_id(&self, session_id: &str) -> Result<Option<Consultation>>;
    /// Insert keyed by the unique session ID; `None` when the session already
    /// has a row.
    async fn create(&self, new_consultation: NewConsultation) -> Result<Option<Consultation>>;
    /// paid → submitted, guarded on the row still being paid.
    async fn mark_submitted(
        &self,
        session_id: &str,
        details: &SubmissionDetails,
    ) -> Result<Option<Consultation>>;
    /// → answered, guarded on the row having left paid status.
    async fn mark_answered(
        &self,
        consultation_id: Uuid,
        response: &str,
    ) -> Result<Option<Consultation>>;
    async fn delete(&self, consultation_id: Uuid) -> Result<bool>;
    async fn list_submitted(&self) -> Result<Vec<Consultation>>;
    async fn stats(&self) -> Result<ConsultationStats>;
}

/// Paid status of a checkout session as reported by the payment provider.
#[derive(Debug, Clone)]
pub struct CheckoutInfo {
    pub paid: bool,
    pub amount_cents: i64,
    pub customer_email: Option<String>,
}

/// The payment provider. The state machine never trusts client-declared
/// payment status; whenever the local record is missing it re-derives
/// paid/unpaid through this seam.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutInfo>;
}

/// Outbound email. Failure is always a value, never a reason to undo an
/// already-committed transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_response(&self, to: &str, service: &str, response: &str) -> Result<()>;
}

/// Outcome of the webhook's absent → paid transition.
#[derive(Debug)]
pub enum PaidOutcome {
    Created(Consultation),
    /// Redelivered event; the session already has a row.
    AlreadyRecorded,
}

/// What the GET-form gate decides for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAccess {
    /// Paid and still awaiting the question
    Open,
    /// Question already sent; show the already-submitted view
    AlreadySubmitted,
    /// Unknown or unpaid session; turn the visitor away
    Denied,
}

/// Outcome of the customer's paid → submitted transition.
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(Consultation),
    AlreadySubmitted,
    PaymentNotVerified,
}

/// Outcome of the admin's submitted → answered transition.
#[derive(Debug)]
pub enum RespondOutcome {
    Answered {
        consultation: Consultation,
        email_sent: bool,
    },
    NotFound,
    /// Row exists but is still paid; there is no question to answer yet.
    AwaitingQuestion,
}

/// The consultation state machine: paid → submitted → answered over a single
/// record type, driven by the payment webhook, the customer submission and
/// the admin response. All collaborators are injected so tests can run the
/// machine against doubles.
#[derive(Clone)]
pub struct ConsultationService {
    store: Arc<dyn ConsultationStore>,
    verifier: Arc<dyn PaymentVerifier>,
    notifier: Arc<dyn Notifier>,
}

impl ConsultationService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        verifier: Arc<dyn PaymentVerifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            verifier,
            notifier,
        }
    }

    /// absent → paid, triggered by a verified checkout.session.completed
    /// event. Idempotent under webhook redelivery thanks to the session-ID
    /// uniqueness guard in the store.
    pub async fn record_paid_session(
        &self,
        session_id: &str,
        amount_cents: i64,
        customer_email: Option<String>,
    ) -> Result<PaidOutcome> {
        let new_consultation = NewConsultation::paid(session_id, amount_cents, customer_email);

        match self.store.create(new_consultation).await? {
            Some(consultation) => {
                metrics::counter!("consultations.paid.recorded").increment(1);
                info!(
                    session_id = %session_id,
                    service = %consultation.service,
                    amount_cents = amount_cents,
                    "Recorded paid consultation"
                );
                Ok(PaidOutcome::Created(consultation))
            }
            None => {
                info!(session_id = %session_id, "Session already recorded, ignoring redelivery");
                Ok(PaidOutcome::AlreadyRecorded)
            }
        }
    }

    /// Decide what the question form may show for a session. When no local
    /// row exists yet (webhook lag) the provider is asked directly. Callers
    /// must treat an `Err` as `Denied`: the gate fails closed.
    pub async fn form_access(&self, session_id: &str) -> Result<FormAccess> {
        match self.store.get_by_session_id(session_id).await? {
            Some(consultation) if consultation.status == ConsultationStatus::Paid => {
                Ok(FormAccess::Open)
            }
            Some(_) => Ok(FormAccess::AlreadySubmitted),
            None => {
                let info = self.verifier.retrieve_session(session_id).await?;
                if info.paid {
                    Ok(FormAccess::Open)
                } else {
                    Ok(FormAccess::Denied)
                }
            }
        }
    }

    /// paid → submitted, triggered by the question form.
    ///
    /// The normal path is a single guarded update. When the session has no
    /// local row (the webhook has not arrived yet), payment is re-verified
    /// with the provider and the row is synthesized directly in submitted
    /// status; losing the insert race against a concurrent webhook falls
    /// back to one more guarded update.
    pub async fn submit(
        &self,
        session_id: &str,
        details: SubmissionDetails,
    ) -> Result<SubmitOutcome> {
        if let Some(consultation) = self.store.mark_submitted(session_id, &details).await? {
            metrics::counter!("consultations.submitted").increment(1);
            info!(session_id = %session_id, "Consultation question submitted");
            return Ok(SubmitOutcome::Accepted(consultation));
        }

        if let Some(existing) = self.store.get_by_session_id(session_id).await? {
            if existing.status == ConsultationStatus::Paid {
                // The row appeared between the update and the read; try the
                // guarded update once more before giving up.
                if let Some(consultation) =
                    self.store.mark_submitted(session_id, &details).await?
                {
                    metrics::counter!("consultations.submitted").increment(1);
                    return Ok(SubmitOutcome::Accepted(consultation));
                }
            }
            warn!(session_id = %session_id, "Rejected duplicate submission");
            return Ok(SubmitOutcome::AlreadySubmitted);
        }

        // Webhook lag: no local row. Never trust the client; ask the
        // provider whether this session was actually paid.
        let info = match self.verifier.retrieve_session(session_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Payment verification failed on submit");
                return Ok(SubmitOutcome::PaymentNotVerified);
            }
        };
        if !info.paid {
            warn!(session_id = %session_id, "Submission for unpaid session rejected");
            return Ok(SubmitOutcome::PaymentNotVerified);
        }

        let new_consultation = NewConsultation::submitted(
            session_id,
            info.amount_cents,
            info.customer_email,
            &details,
        );
        if let Some(consultation) = self.store.create(new_consultation).await? {
            metrics::counter!("consultations.submitted").increment(1);
            info!(session_id = %session_id, "Consultation synthesized at submit (webhook lag)");
            return Ok(SubmitOutcome::Accepted(consultation));
        }

        // The webhook won the insert race after all; its row is paid, so the
        // guarded update applies.
        if let Some(consultation) = self.store.mark_submitted(session_id, &details).await? {
            metrics::counter!("consultations.submitted").increment(1);
            return Ok(SubmitOutcome::Accepted(consultation));
        }

        Ok(SubmitOutcome::AlreadySubmitted)
    }

    /// submitted → answered, triggered by the admin. The status/response
    /// update commits first; the email is strictly a best-effort side effect
    /// whose outcome only shapes the returned payload.
    pub async fn respond(&self, consultation_id: Uuid, response: &str) -> Result<RespondOutcome> {
        let consultation = match self.store.mark_answered(consultation_id, response).await? {
            Some(consultation) => consultation,
            None => {
                return Ok(match self.store.get_by_id(consultation_id).await? {
                    Some(_) => RespondOutcome::AwaitingQuestion,
                    None => RespondOutcome::NotFound,
                });
            }
        };

        metrics::counter!("consultations.answered").increment(1);

        let email_sent = match consultation.notification_email() {
            Some(to) => {
                match self
                    .notifier
                    .send_response(to, &consultation.service, response)
                    .await
                {
                    Ok(()) => {
                        metrics::counter!("email.response.sent").increment(1);
                        true
                    }
                    Err(e) => {
                        metrics::counter!("email.response.failed").increment(1);
                        error!(
                            consultation_id = %consultation_id,
                            error = %e,
                            "Response saved but email delivery failed"
                        );
                        false
                    }
                }
            }
            None => {
                warn!(
                    consultation_id = %consultation_id,
                    "Response saved but no email address on record"
                );
                false
            }
        };

        Ok(RespondOutcome::Answered {
            consultation,
            email_sent,
        })
    }

    /// Terminal, irreversible removal. Deleting an id that is already gone is
    /// harmless.
    pub async fn delete(&self, consultation_id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(consultation_id).await?;
        if deleted {
            info!(consultation_id = %consultation_id, "Consultation deleted");
        }
        Ok(deleted)
    }

    pub async fn list(&self) -> Result<Vec<Consultation>> {
        self.store.list_submitted().await
    }

    pub async fn stats(&self) -> Result<ConsultationStats> {
        self.store.stats().await
    }
}
