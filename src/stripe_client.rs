use anyhow::{Context, Result};
use async_trait::async_trait;
use stripe::{CheckoutSession, CheckoutSessionPaymentStatus, Client, Event, Webhook};

use crate::consultation_service::{CheckoutInfo, PaymentVerifier};

/// Configuration for Stripe integration
#[derive(Clone)]
pub struct StripeConfig {
    pub client: Client,
    pub webhook_secret: String,
}

impl StripeConfig {
    /// Initialize Stripe configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let webhook_secret =
            std::env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;

        let client = Client::new(secret_key);

        Ok(Self {
            client,
            webhook_secret,
        })
    }

    /// Verify an inbound webhook payload against its `stripe-signature`
    /// header and parse it into an event.
    pub fn verify_webhook(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<Event, stripe::WebhookError> {
        Webhook::construct_event(payload, signature, &self.webhook_secret)
    }
}

#[async_trait]
impl PaymentVerifier for StripeConfig {
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutInfo> {
        let id: stripe::CheckoutSessionId = session_id
            .parse()
            .context("Invalid checkout session ID")?;

        let session = CheckoutSession::retrieve(&self.client, &id, &[]).await?;

        Ok(CheckoutInfo {
            paid: session.payment_status == CheckoutSessionPaymentStatus::Paid,
            amount_cents: session.amount_total.unwrap_or(0),
            customer_email: session
                .customer_details
                .and_then(|details| details.email)
                .or(session.customer_email),
        })
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}
