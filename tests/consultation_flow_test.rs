//! Integration tests for the consultation state machine.
//!
//! The machine runs against in-memory doubles for the store, the payment
//! provider and the mailer, so the full paid → submitted → answered flow can
//! be exercised without Postgres, Stripe or SMTP.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use ressenti::consultation_service::{
    CheckoutInfo, ConsultationService, ConsultationStore, FormAccess, Notifier, PaidOutcome,
    PaymentVerifier, RespondOutcome, SubmitOutcome,
};
use ressenti::consultations::{
    Consultation, ConsultationStats, ConsultationStatus, NewConsultation, SERVICE_PREMIUM,
    SERVICE_STANDARD, SubmissionDetails,
};

/// In-memory store mirroring the guard semantics of the Postgres repository:
/// unique session IDs on insert, status conditions evaluated atomically with
/// the write.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<Consultation>>,
}

impl MemoryStore {
    fn row_by_session(&self, session_id: &str) -> Option<Consultation> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.stripe_session_id == session_id)
            .cloned()
    }

    fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ConsultationStore for MemoryStore {
    async fn get_by_id(&self, consultation_id: Uuid) -> Result<Option<Consultation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == consultation_id)
            .cloned())
    }

    async fn get_by_session_id(&self, session_id: &str) -> Result<Option<Consultation>> {
        Ok(self.row_by_session(session_id))
    }

    async fn create(&self, new_consultation: NewConsultation) -> Result<Option<Consultation>> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|c| c.stripe_session_id == new_consultation.stripe_session_id)
        {
            return Ok(None);
        }

        let row = Consultation {
            id: Uuid::new_v4(),
            stripe_session_id: new_consultation.stripe_session_id,
            service: new_consultation.service,
            amount_cents: new_consultation.amount_cents,
            status: new_consultation.status,
            customer_email: new_consultation.customer_email,
            name: new_consultation.name,
            email: new_consultation.email,
            birthdate: new_consultation.birthdate,
            person_concerned: new_consultation.person_concerned,
            message: new_consultation.message,
            response: None,
            submitted_at: new_consultation.submitted_at,
            answered_at: None,
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(Some(row))
    }

    async fn mark_submitted(
        &self,
        session_id: &str,
        details: &SubmissionDetails,
    ) -> Result<Option<Consultation>> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if row.stripe_session_id == session_id && row.status == ConsultationStatus::Paid {
                row.status = ConsultationStatus::Submitted;
                row.name = Some(details.name.clone());
                row.email = Some(details.email.clone());
                row.birthdate = details.birthdate.clone();
                row.person_concerned = details.person_concerned.clone();
                row.message = Some(details.message.clone());
                row.submitted_at = Some(Utc::now());
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn mark_answered(
        &self,
        consultation_id: Uuid,
        response: &str,
    ) -> Result<Option<Consultation>> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if row.id == consultation_id && row.status != ConsultationStatus::Paid {
                row.status = ConsultationStatus::Answered;
                row.response = Some(response.to_string());
                row.answered_at = Some(Utc::now());
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn delete(&self, consultation_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|c| c.id != consultation_id);
        Ok(rows.len() < before)
    }

    async fn list_submitted(&self) -> Result<Vec<Consultation>> {
        let mut listed: Vec<Consultation> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status != ConsultationStatus::Paid)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(listed)
    }

    async fn stats(&self) -> Result<ConsultationStats> {
        let rows = self.rows.lock().unwrap();
        let visible: Vec<_> = rows
            .iter()
            .filter(|c| c.status != ConsultationStatus::Paid)
            .collect();
        Ok(ConsultationStats {
            total: visible.len() as i64,
            pending: visible
                .iter()
                .filter(|c| c.status == ConsultationStatus::Submitted)
                .count() as i64,
            answered: visible
                .iter()
                .filter(|c| c.status == ConsultationStatus::Answered)
                .count() as i64,
            revenue_cents: visible.iter().map(|c| c.amount_cents as i64).sum(),
        })
    }
}

/// Payment provider double: answers every lookup with the configured result,
/// or an error when configured with `None`.
struct StaticVerifier {
    info: Option<CheckoutInfo>,
}

impl StaticVerifier {
    fn paid(amount_cents: i64) -> Self {
        Self {
            info: Some(CheckoutInfo {
                paid: true,
                amount_cents,
                customer_email: Some("checkout@example.com".to_string()),
            }),
        }
    }

    fn unpaid() -> Self {
        Self {
            info: Some(CheckoutInfo {
                paid: false,
                amount_cents: 0,
                customer_email: None,
            }),
        }
    }

    fn unreachable() -> Self {
        Self { info: None }
    }
}

#[async_trait]
impl PaymentVerifier for StaticVerifier {
    async fn retrieve_session(&self, _session_id: &str) -> Result<CheckoutInfo> {
        match &self.info {
            Some(info) => Ok(info.clone()),
            None => Err(anyhow::anyhow!("payment provider unreachable")),
        }
    }
}

/// Mailer double that records every send and can be forced to fail.
#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_response(&self, to: &str, service: &str, response: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("SMTP transport refused the message"));
        }
        self.sent.lock().unwrap().push((
            to.to_string(),
            service.to_string(),
            response.to_string(),
        ));
        Ok(())
    }
}

fn machine(
    store: Arc<MemoryStore>,
    verifier: StaticVerifier,
    notifier: Arc<RecordingNotifier>,
) -> ConsultationService {
    ConsultationService::new(store, Arc::new(verifier), notifier)
}

fn details() -> SubmissionDetails {
    SubmissionDetails {
        name: "Claire".to_string(),
        email: "claire@example.com".to_string(),
        birthdate: Some("12/03/1987".to_string()),
        person_concerned: None,
        message: "Dois-je accepter ce nouveau travail ?".to_string(),
    }
}

#[tokio::test]
async fn webhook_creates_paid_row_with_derived_service() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    let outcome = service
        .record_paid_session("cs_123", 1500, Some("client@example.com".to_string()))
        .await
        .unwrap();

    let consultation = match outcome {
        PaidOutcome::Created(c) => c,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(consultation.service, SERVICE_PREMIUM);
    assert_eq!(consultation.amount_cents, 1500);
    assert_eq!(consultation.status, ConsultationStatus::Paid);

    // Redelivered event is a no-op, not a duplicate row
    let again = service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    assert!(matches!(again, PaidOutcome::AlreadyRecorded));
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn small_amount_gets_standard_service() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(500),
        Arc::new(RecordingNotifier::default()),
    );

    service
        .record_paid_session("cs_small", 500, None)
        .await
        .unwrap();
    assert_eq!(
        store.row_by_session("cs_small").unwrap().service,
        SERVICE_STANDARD
    );
}

#[tokio::test]
async fn full_flow_paid_submitted_answered() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = machine(store.clone(), StaticVerifier::paid(1500), notifier.clone());

    service
        .record_paid_session("cs_123", 1500, Some("client@example.com".to_string()))
        .await
        .unwrap();

    let outcome = service.submit("cs_123", details()).await.unwrap();
    let submitted = match outcome {
        SubmitOutcome::Accepted(c) => c,
        other => panic!("expected Accepted, got {other:?}"),
    };
    assert_eq!(submitted.status, ConsultationStatus::Submitted);
    assert_eq!(
        submitted.message.as_deref(),
        Some("Dois-je accepter ce nouveau travail ?")
    );
    assert!(submitted.submitted_at.is_some());

    let outcome = service
        .respond(submitted.id, "Voici ma guidance")
        .await
        .unwrap();
    match outcome {
        RespondOutcome::Answered {
            consultation,
            email_sent,
        } => {
            assert!(email_sent);
            assert_eq!(consultation.status, ConsultationStatus::Answered);
            assert_eq!(consultation.response.as_deref(), Some("Voici ma guidance"));
            assert!(consultation.answered_at.is_some());
        }
        other => panic!("expected Answered, got {other:?}"),
    }

    // Email went to the address from the form, not the checkout session
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "claire@example.com");
    assert_eq!(sent[0].1, SERVICE_PREMIUM);
}

#[tokio::test]
async fn double_submission_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    service.submit("cs_123", details()).await.unwrap();

    let second = service.submit("cs_123", details()).await.unwrap();
    assert!(matches!(second, SubmitOutcome::AlreadySubmitted));

    // The stored question is the first one, untouched
    let row = store.row_by_session("cs_123").unwrap();
    assert_eq!(row.status, ConsultationStatus::Submitted);
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn submit_fallback_synthesizes_row_when_webhook_lags() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    // No webhook arrived; the provider confirms payment on demand.
    let outcome = service.submit("cs_late", details()).await.unwrap();
    let consultation = match outcome {
        SubmitOutcome::Accepted(c) => c,
        other => panic!("expected Accepted, got {other:?}"),
    };

    // Created directly in submitted status, same label derivation as the
    // webhook path, customer email taken from the provider.
    assert_eq!(consultation.status, ConsultationStatus::Submitted);
    assert_eq!(consultation.service, SERVICE_PREMIUM);
    assert_eq!(
        consultation.customer_email.as_deref(),
        Some("checkout@example.com")
    );
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn submit_rejected_when_provider_says_unpaid() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::unpaid(),
        Arc::new(RecordingNotifier::default()),
    );

    let outcome = service.submit("cs_unpaid", details()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::PaymentNotVerified));
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn submit_fails_closed_when_provider_is_unreachable() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::unreachable(),
        Arc::new(RecordingNotifier::default()),
    );

    let outcome = service.submit("cs_lost", details()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::PaymentNotVerified));
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn answer_commits_even_when_email_fails() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::failing());
    let service = machine(store.clone(), StaticVerifier::paid(1500), notifier.clone());

    service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    let submitted = match service.submit("cs_123", details()).await.unwrap() {
        SubmitOutcome::Accepted(c) => c,
        other => panic!("expected Accepted, got {other:?}"),
    };

    let outcome = service
        .respond(submitted.id, "Voici ma guidance")
        .await
        .unwrap();
    match outcome {
        RespondOutcome::Answered { email_sent, .. } => assert!(!email_sent),
        other => panic!("expected Answered, got {other:?}"),
    }

    // The transition survived the transport failure
    let row = store.row_by_session("cs_123").unwrap();
    assert_eq!(row.status, ConsultationStatus::Answered);
    assert_eq!(row.response.as_deref(), Some("Voici ma guidance"));
    assert!(row.answered_at.is_some());
    assert_eq!(notifier.sent_count(), 0);
}

#[tokio::test]
async fn responding_to_a_paid_row_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    let id = store.row_by_session("cs_123").unwrap().id;

    let outcome = service.respond(id, "Trop tôt").await.unwrap();
    assert!(matches!(outcome, RespondOutcome::AwaitingQuestion));

    // No skipped transition: still paid, no response stored
    let row = store.row_by_session("cs_123").unwrap();
    assert_eq!(row.status, ConsultationStatus::Paid);
    assert_eq!(row.response, None);
}

#[tokio::test]
async fn responding_to_a_missing_row_is_not_found() {
    let service = machine(
        Arc::new(MemoryStore::default()),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    let outcome = service.respond(Uuid::new_v4(), "Perdu").await.unwrap();
    assert!(matches!(outcome, RespondOutcome::NotFound));
}

#[tokio::test]
async fn re_answering_replaces_the_response() {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = machine(store.clone(), StaticVerifier::paid(1500), notifier.clone());

    service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    let submitted = match service.submit("cs_123", details()).await.unwrap() {
        SubmitOutcome::Accepted(c) => c,
        other => panic!("expected Accepted, got {other:?}"),
    };

    service.respond(submitted.id, "Première version").await.unwrap();
    service.respond(submitted.id, "Version corrigée").await.unwrap();

    let row = store.row_by_session("cs_123").unwrap();
    assert_eq!(row.status, ConsultationStatus::Answered);
    assert_eq!(row.response.as_deref(), Some("Version corrigée"));
    assert_eq!(notifier.sent_count(), 2);
}

#[tokio::test]
async fn form_access_follows_the_status() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    // Absent locally but paid at the provider: open (webhook lag)
    assert_eq!(
        service.form_access("cs_123").await.unwrap(),
        FormAccess::Open
    );

    service
        .record_paid_session("cs_123", 1500, None)
        .await
        .unwrap();
    assert_eq!(
        service.form_access("cs_123").await.unwrap(),
        FormAccess::Open
    );

    service.submit("cs_123", details()).await.unwrap();
    assert_eq!(
        service.form_access("cs_123").await.unwrap(),
        FormAccess::AlreadySubmitted
    );
}

#[tokio::test]
async fn form_access_denies_unknown_unpaid_sessions() {
    let service = machine(
        Arc::new(MemoryStore::default()),
        StaticVerifier::unpaid(),
        Arc::new(RecordingNotifier::default()),
    );

    assert_eq!(
        service.form_access("cs_nope").await.unwrap(),
        FormAccess::Denied
    );
}

#[tokio::test]
async fn form_access_surfaces_provider_errors_for_fail_closed_handling() {
    let service = machine(
        Arc::new(MemoryStore::default()),
        StaticVerifier::unreachable(),
        Arc::new(RecordingNotifier::default()),
    );

    // The handler turns this error into a redirect away from the form
    assert!(service.form_access("cs_lost").await.is_err());
}

#[tokio::test]
async fn delete_is_idempotent_and_scoped() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    service
        .record_paid_session("cs_keep", 1500, None)
        .await
        .unwrap();
    service
        .record_paid_session("cs_drop", 500, None)
        .await
        .unwrap();
    let drop_id = store.row_by_session("cs_drop").unwrap().id;

    assert!(service.delete(drop_id).await.unwrap());
    // Second delete of the same id: no error, nothing else touched
    assert!(!service.delete(drop_id).await.unwrap());
    assert!(store.row_by_session("cs_keep").is_some());
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn stats_and_list_cover_submitted_and_answered_only() {
    let store = Arc::new(MemoryStore::default());
    let service = machine(
        store.clone(),
        StaticVerifier::paid(1500),
        Arc::new(RecordingNotifier::default()),
    );

    // One silent payment, one pending question, one answered question
    service
        .record_paid_session("cs_silent", 1500, None)
        .await
        .unwrap();
    service
        .record_paid_session("cs_pending", 500, None)
        .await
        .unwrap();
    service.submit("cs_pending", details()).await.unwrap();
    let answered = match service.submit("cs_answered", details()).await.unwrap() {
        SubmitOutcome::Accepted(c) => c,
        other => panic!("expected Accepted, got {other:?}"),
    };
    service.respond(answered.id, "Voici ma guidance").await.unwrap();

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.answered, 1);
    // 500 (pending) + 1500 (answered, amount from the provider lookup)
    assert_eq!(stats.revenue_cents, 2000);

    let listed = service.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    // Newest submission first
    assert_eq!(listed[0].stripe_session_id, "cs_answered");
    assert!(listed.iter().all(|c| c.status != ConsultationStatus::Paid));
}
