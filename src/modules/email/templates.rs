use super::dispatcher::OutgoingMail;
use crate::modules::utils::time::format_duration;

/// Values shared by every account mail
#[derive(Debug, Clone)]
pub struct MailContext {
    pub site_name: String,
    pub frontend_url: String,
    pub support_email: String,
}

impl MailContext {
    fn link(&self, route: &str, uid: &str, token: &str) -> String {
        format!(
            "{}/{}/{}/{}/",
            self.frontend_url.trim_end_matches('/'),
            route,
            uid,
            token
        )
    }

    pub fn verification_url(&self, uid: &str, token: &str) -> String {
        self.link("verify-email", uid, token)
    }

    pub fn reset_url(&self, uid: &str, token: &str) -> String {
        self.link("reset-password", uid, token)
    }
}

/// Build the email-verification message
pub fn verification_email(
    ctx: &MailContext,
    to: &str,
    display_name: &str,
    uid: &str,
    token: &str,
    valid_for: u64,
) -> OutgoingMail {
    let greeting = if display_name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", display_name)
    };
    let body = format!(
        "{}\n\n\
        Thanks for signing up for {}.\n\n\
        Please confirm your email address by opening the link below:\n\n\
        {}\n\n\
        This link will expire in {}.\n\n\
        If you did not create an account, you can ignore this email.\n\
        Questions? Contact us at {}.\n\n\
        The {} Team",
        greeting,
        ctx.site_name,
        ctx.verification_url(uid, token),
        format_duration(valid_for),
        ctx.support_email,
        ctx.site_name
    );

    OutgoingMail {
        to: to.to_string(),
        subject: format!("Verify your email address - {}", ctx.site_name),
        body,
    }
}

/// Build the password-reset message
pub fn password_reset_email(
    ctx: &MailContext,
    to: &str,
    uid: &str,
    token: &str,
    valid_for: u64,
) -> OutgoingMail {
    let body = format!(
        "Hello,\n\n\
        A password reset was requested for your {} account.\n\n\
        To choose a new password, open the link below:\n\n\
        {}\n\n\
        This link will expire in {} hours and can only be used once.\n\n\
        Security Tips:\n\
        - Choose a password with at least 8 characters\n\
        - Include letters, numbers and special characters\n\n\
        If you did not request this reset, please ignore this email and ensure \
        your account is secure.\n\
        Questions? Contact us at {}.\n\n\
        The {} Team",
        ctx.site_name,
        ctx.reset_url(uid, token),
        valid_for / 3600,
        ctx.support_email,
        ctx.site_name
    );

    OutgoingMail {
        to: to.to_string(),
        subject: format!("Password Reset Request - {}", ctx.site_name),
        body,
    }
}
