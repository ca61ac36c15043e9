use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, client::TlsParametersBuilder},
};

use crate::consultation_service::Notifier;

/// Create a properly formatted Mailbox with display name
/// This handles special characters in display names by using lettre's Mailbox type
fn create_mailbox(name: &str, email: &str) -> Result<Mailbox> {
    let address = email.parse()?;
    Ok(Mailbox::new(Some(name.to_string()), address))
}

/// Escape text for inclusion in an HTML body
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the admin's answer as an HTML fragment, newlines as line breaks.
/// The text is escaped first so the response can never inject markup.
pub fn render_response_html(response: &str) -> String {
    escape_html(response)
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new() -> Result<Self> {
        let smtp_server = std::env::var("SMTP_SERVER")
            .map_err(|_| anyhow::anyhow!("SMTP_SERVER environment variable not set"))?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid SMTP_PORT"))?;

        let smtp_username = std::env::var("SMTP_USERNAME")
            .map_err(|_| anyhow::anyhow!("SMTP_USERNAME environment variable not set"))?;

        let smtp_password = std::env::var("SMTP_PASSWORD")
            .map_err(|_| anyhow::anyhow!("SMTP_PASSWORD environment variable not set"))?;

        let from_email = std::env::var("FROM_EMAIL")
            .map_err(|_| anyhow::anyhow!("FROM_EMAIL environment variable not set"))?;

        let from_name = std::env::var("FROM_NAME").unwrap_or_else(|_| "Ressenti".to_string());

        let creds = Credentials::new(smtp_username, smtp_password);

        // Transport depends on the port:
        // - 1025: plain connection (Mailpit for local testing)
        // - 465: implicit TLS (TLS wrapper)
        // - 587 and others: STARTTLS
        let mailer = if smtp_port == 1025 {
            tracing::info!("Using insecure SMTP connection for port 1025 (Mailpit) without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_server)
                .port(smtp_port)
                .tls(lettre::transport::smtp::client::Tls::None)
                .build()
        } else if smtp_port == 465 {
            tracing::info!("Using implicit TLS (SMTPS) for port 465");
            let tls_params = TlsParametersBuilder::new(smtp_server.clone())
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create TLS parameters: {}", e))?;
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_server)?
                .port(smtp_port)
                .credentials(creds)
                .tls(lettre::transport::smtp::client::Tls::Wrapper(tls_params))
                .build()
        } else {
            tracing::info!("Using STARTTLS for port {}", smtp_port);
            let tls_params = TlsParametersBuilder::new(smtp_server.clone())
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create TLS parameters: {}", e))?;
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_server)?
                .port(smtp_port)
                .credentials(creds)
                .tls(lettre::transport::smtp::client::Tls::Required(tls_params))
                .build()
        };

        Ok(Self {
            mailer,
            from_email,
            from_name,
        })
    }

    fn build_text_body(service: &str, response: &str) -> String {
        format!(
            r#"Bonjour,

Voici la réponse à votre demande ({service}) :

{response}

Avec toute ma bienveillance,
Ressenti"#
        )
    }

    fn build_html_body(service: &str, response: &str) -> String {
        format!(
            r#"<html>
  <body style="font-family: Georgia, serif; color: #2d2a32; line-height: 1.6;">
    <p>Bonjour,</p>
    <p>Voici la réponse à votre demande ({service}) :</p>
    <blockquote style="border-left: 3px solid #b794d4; margin: 1em 0; padding: 0.5em 1em;">
      {rendered}
    </blockquote>
    <p>Avec toute ma bienveillance,<br>Ressenti</p>
  </body>
</html>"#,
            service = escape_html(service),
            rendered = render_response_html(response),
        )
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send_response(&self, to: &str, service: &str, response: &str) -> Result<()> {
        let subject = format!("Réponse à votre {service}");

        let email = Message::builder()
            .from(create_mailbox(&self.from_name, &self.from_email)?)
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(Self::build_text_body(service, response)))
                    .singlepart(SinglePart::html(Self::build_html_body(service, response))),
            )?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_become_line_breaks() {
        assert_eq!(
            render_response_html("Voici ma guidance.\nPrenez soin de vous."),
            "Voici ma guidance.<br>Prenez soin de vous."
        );
        assert_eq!(render_response_html("a\r\nb\nc"), "a<br>b<br>c");
    }

    #[test]
    fn markup_in_response_is_escaped() {
        assert_eq!(
            render_response_html("<script>alert(1)</script>\n\"fin\""),
            "&lt;script&gt;alert(1)&lt;/script&gt;<br>&quot;fin&quot;"
        );
    }

    #[test]
    fn html_body_contains_rendered_response() {
        let body = EmailService::build_html_body("Consultation Ressenti", "Ligne 1\nLigne 2");
        assert!(body.contains("Ligne 1<br>Ligne 2"));
        assert!(body.contains("Consultation Ressenti"));
    }

    #[test]
    fn text_body_keeps_raw_newlines() {
        let body = EmailService::build_text_body("Question Simple", "Ligne 1\nLigne 2");
        assert!(body.contains("Ligne 1\nLigne 2"));
        assert!(!body.contains("<br>"));
    }
}
