// src/services/email_service.rs
// DOCUMENTATION: Outgoing email
// PURPOSE: SMTP delivery through lettre, with a log-only sender for local runs

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;
use crate::errors::AppError;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Sends mail through an SMTP relay
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
}

impl SmtpEmailSender {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from_email: &str,
    ) -> Result<Self, AppError> {
        let transport = if username.is_empty() {
            // Local catchers (Mailpit, MailHog) without TLS or auth
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(port)
                .build()
        } else {
            let creds = Credentials::new(username.to_string(), password.to_string());
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::EmailError(format!("Invalid SMTP host {}: {}", host, e)))?
                .port(port)
                .credentials(creds)
                .build()
        };

        Ok(SmtpEmailSender {
            transport,
            from_email: from_email.to_string(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(|e| format!("{:?}", e))?)
            .to(to.parse().map_err(|e| format!("{:?}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| e.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Writes emails to the log instead of sending them
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        log::info!("Email to {} | {}\n{}", to, subject, body);
        Ok(())
    }
}

/// SMTP when EMAIL_HOST is set, log-only otherwise
pub fn sender_from_config(config: &Config) -> Result<Box<dyn EmailSender>, AppError> {
    if config.email_host.is_empty() {
        log::warn!("EMAIL_HOST not set, emails will only be logged");
        return Ok(Box::new(LogEmailSender));
    }

    let sender = SmtpEmailSender::new(
        &config.email_host,
        config.email_port,
        &config.email_username,
        &config.email_password,
        &config.email_from,
    )?;
    Ok(Box::new(sender))
}

/// Compose and send the password reset email
pub async fn send_password_reset(
    sender: &dyn EmailSender,
    to: &str,
    reset_url: &str,
) -> Result<(), AppError> {
    let body = format!(
        "Forgot your password? Submit a PATCH request with your new password and \
         passwordConfirm to: {}.\nIf you didn't forget your password, please ignore this email!",
        reset_url
    );

    sender
        .send_email(to, "Your password reset token (valid for 10 min)", &body)
        .await
        .map_err(|e| {
            log::error!("Failed to send reset email to {}: {}", to, e);
            AppError::EmailError("There was an error sending the email. Try again later!".to_string())
        })
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records emails; fails every send when `failing` is set
    #[derive(Clone, Default)]
    pub struct MockEmailSender {
        pub sent: Arc<Mutex<Vec<(String, String, String)>>>,
        pub failing: bool,
    }

    #[async_trait]
    impl EmailSender for MockEmailSender {
        async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
            if self.failing {
                return Err("connection refused".to_string());
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockEmailSender;
    use super::*;

    #[tokio::test]
    async fn test_reset_email_contains_url() {
        let sender = MockEmailSender::default();
        send_password_reset(&sender, "jonas@example.com", "http://localhost:3000/api/v1/users/reset-password/abc")
            .await
            .unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "jonas@example.com");
        assert!(sent[0].1.contains("valid for 10 min"));
        assert!(sent[0].2.contains("/reset-password/abc"));
    }

    #[tokio::test]
    async fn test_failed_send_maps_to_email_error() {
        let sender = MockEmailSender {
            failing: true,
            ..Default::default()
        };
        let err = send_password_reset(&sender, "jonas@example.com", "http://x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmailError(_)));
        assert_eq!(err.to_string(), "There was an error sending the email. Try again later!");
    }

    #[tokio::test]
    async fn test_smtp_sender_rejects_invalid_recipient() {
        let sender =
            SmtpEmailSender::new("localhost", 1025, "", "", "Tours <hello@tours.local>").unwrap();
        let result = sender.send_email("not-an-email", "Subject", "Body").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_log_sender_without_host() {
        let config = Config::for_tests();
        assert!(config.email_host.is_empty());
        let sender = sender_from_config(&config).unwrap();
        let result = tokio_test::block_on(sender.send_email("jonas@example.com", "Hi", "Body"));
        assert!(result.is_ok());
    }
}
