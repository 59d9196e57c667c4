use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::dispatcher::{MailError, Mailer, OutgoingMail};

/// SMTP connection settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    // SMTP server hostname (e.g., smtp.gmail.com)
    pub host: String,
    // SMTP server port (typically 587 for STARTTLS)
    pub port: u16,
    pub use_tls: bool,
    // Empty username disables authentication
    pub username: String,
    pub password: String,
    // RFC 5322 "From" address
    pub from_address: String,
}

/// Sends mail through an SMTP relay
pub struct SmtpMailer {
    settings: SmtpSettings,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let mut builder = if settings.use_tls {
            SmtpTransport::starttls_relay(&settings.host)?
        } else {
            SmtpTransport::builder_dangerous(&settings.host)
        };
        builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(10)));

        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            settings,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.settings.from_address.parse()?)
            .to(mail.to.parse()?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport.send(&message)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            use_tls: false,
            username: String::new(),
            password: String::new(),
            from_address: "Accounts <noreply@example.com>".to_string(),
        }
    }

    #[test]
    fn test_plain_transport_builds_without_network() {
        assert!(SmtpMailer::new(settings()).is_ok());
    }

    #[test]
    fn test_bad_recipient_is_reported_before_connecting() {
        let mailer = SmtpMailer::new(settings()).unwrap();
        let result = mailer.send(&OutgoingMail {
            to: "not-an-email".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        });
        assert!(matches!(result, Err(MailError::Address(_))));
    }
}
