use log::{info, warn};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Default number of extra attempts after a failed send
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("email build error: {0}")]
    Build(String),
    #[error("mail not sent: {0}")]
    Rejected(String),
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery side channel for account mails
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Retries a failing mailer a fixed number of times with a fixed pause
pub struct RetryingMailer<M> {
    inner: M,
    max_retries: u32,
    delay: Duration,
}

impl<M: Mailer> RetryingMailer<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_secs(5),
        }
    }

    pub fn with_policy(inner: M, max_retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            delay,
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: Mailer> Mailer for RetryingMailer<M> {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let mut attempt = 0;
        loop {
            match self.inner.send(mail) {
                Ok(()) => {
                    info!("Email sent: subject={:?}, attempts={}", mail.subject, attempt + 1);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Failed to send email (attempt {}/{}): {}",
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    thread::sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keeps every message in memory instead of sending it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<OutgoingMail> {
        self.sent().pop()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Rejected("recording mailer poisoned".to_string()))?
            .push(mail.clone());
        Ok(())
    }
}

impl<T: Mailer + ?Sized> Mailer for std::sync::Arc<T> {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        (**self).send(mail)
    }
}
