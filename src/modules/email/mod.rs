pub mod dispatcher;
mod smtp;
pub mod templates;

pub use dispatcher::{MailError, Mailer, OutgoingMail, RecordingMailer, RetryingMailer};
pub use smtp::{SmtpMailer, SmtpSettings};
pub use templates::{password_reset_email, verification_email, MailContext};
