use std::sync::Arc;
use thiserror::Error;

use super::password::{check_password, make_password, validate_new_password, PasswordError, DEFAULT_ITERATIONS};
use super::store::{StoreError, User, UserStore};
use super::uid::{decode_uid, encode_uid};
use crate::modules::email::{
    password_reset_email, verification_email, MailContext, Mailer, OutgoingMail,
};
use crate::modules::tokens::{Clock, TokenEngine};
use crate::modules::utils::io::is_valid_email;
use crate::modules::utils::logging::{
    log_auth_event, log_data_operation, log_token_event, TokenAction,
};

#[derive(Debug, Error)]
pub enum FlowError {
    /// Covers every token failure on purpose: callers must not learn which
    /// check failed.
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("this account is inactive")]
    Inactive,
    #[error("no account is registered with this email")]
    UnknownAccount,
    #[error("email already verified")]
    AlreadyVerified,
    #[error("a user with this email already exists")]
    EmailTaken,
    #[error("enter a valid email address")]
    InvalidEmail,
    #[error("{0}")]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FlowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateEmail(_) => FlowError::EmailTaken,
            other => FlowError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// Input for [`AccountService::register`]
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub first_name: String,
    pub last_name: String,
}

/// Registration, email verification, login and password recovery on top
/// of the token engines
pub struct AccountService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    verification: TokenEngine,
    password_reset: TokenEngine,
    mail: MailContext,
    password_iterations: u32,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        verification: TokenEngine,
        password_reset: TokenEngine,
        mail: MailContext,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            verification,
            password_reset,
            mail,
            password_iterations: DEFAULT_ITERATIONS,
        }
    }

    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }

    pub fn verification_engine(&self) -> &TokenEngine {
        &self.verification
    }

    pub fn password_reset_engine(&self) -> &TokenEngine {
        &self.password_reset
    }

    pub fn register(&self, request: Registration) -> Result<User, FlowError> {
        let email = request.email.trim();
        if !is_valid_email(email) {
            return Err(FlowError::InvalidEmail);
        }
        validate_new_password(&request.password, &request.password_confirmation)?;

        let hash = make_password(&request.password, self.password_iterations);
        let mut user = User::new(email, hash, self.clock.now());
        user.first_name = request.first_name.trim().to_string();
        user.last_name = request.last_name.trim().to_string();

        if let Err(e) = self.store.insert(user.clone()) {
            log_auth_event("register", email, false, Some(&e.to_string()));
            return Err(e.into());
        }
        log_auth_event("register", &user.email, true, None);

        self.send_verification(&user);
        Ok(user)
    }

    pub fn resend_verification(&self, email: &str) -> Result<(), FlowError> {
        let user = self
            .store
            .find_by_email(email)?
            .ok_or(FlowError::UnknownAccount)?;
        if user.is_verified {
            return Err(FlowError::AlreadyVerified);
        }
        self.send_verification(&user);
        Ok(())
    }

    pub fn verify_email(&self, uidb64: &str, token: &str) -> Result<VerifyOutcome, FlowError> {
        let user = self.lookup(uidb64)?;
        let now = self.clock.now();

        let accepted = self.verification.check_token(user.as_ref(), token, now);
        let mut user = match (user, accepted) {
            (Some(user), true) => user,
            (user, _) => {
                let account = user.map(|u| u.email).unwrap_or_default();
                log_token_event("email_verification", &account, TokenAction::Rejected);
                return Err(FlowError::InvalidToken);
            }
        };
        log_token_event("email_verification", &user.email, TokenAction::Accepted);

        if user.is_verified {
            return Ok(VerifyOutcome::AlreadyVerified);
        }
        user.is_verified = true;
        self.store.update(&user)?;
        log_auth_event("verify_email", &user.email, true, None);
        Ok(VerifyOutcome::Verified)
    }

    /// Always succeeds for unknown or inactive accounts so that the
    /// response does not reveal which emails are registered
    pub fn request_password_reset(&self, email: &str) -> Result<(), FlowError> {
        match self.store.find_by_email(email)? {
            Some(user) if user.is_active => {
                let token = self.password_reset.make_token(&user, self.clock.now());
                log_token_event("password_reset", &user.email, TokenAction::Issued);
                let mail = password_reset_email(
                    &self.mail,
                    &user.email,
                    &encode_uid(&user.id),
                    &token,
                    self.password_reset.timeout(),
                );
                self.dispatch(&user.email, "password_reset_email", &mail);
            }
            _ => log_auth_event(
                "password_reset_request",
                email,
                false,
                Some("no active account"),
            ),
        }
        Ok(())
    }

    /// Whether a reset link is still usable, without consuming it
    pub fn check_reset_token(&self, uidb64: &str, token: &str) -> Result<bool, FlowError> {
        let user = self.lookup(uidb64)?.filter(|u| u.is_active);
        Ok(self
            .password_reset
            .check_token(user.as_ref(), token, self.clock.now()))
    }

    pub fn confirm_password_reset(
        &self,
        uidb64: &str,
        token: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), FlowError> {
        let user = self.lookup(uidb64)?.filter(|u| u.is_active);
        let now = self.clock.now();

        let mut user = match user {
            Some(user) if self.password_reset.check_token(Some(&user), token, now) => user,
            other => {
                let account = other.map(|u| u.email).unwrap_or_default();
                log_token_event("password_reset", &account, TokenAction::Rejected);
                return Err(FlowError::InvalidToken);
            }
        };
        validate_new_password(new_password, confirmation)?;

        // New hash means a new fingerprint, so this token stops working
        user.password = make_password(new_password, self.password_iterations);
        self.store.update(&user)?;
        log_token_event("password_reset", &user.email, TokenAction::Accepted);
        log_auth_event("password_reset", &user.email, true, None);
        Ok(())
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User, FlowError> {
        let user = match self.store.find_by_email(email)? {
            Some(user) if check_password(password, &user.password) => user,
            _ => {
                log_auth_event("login", email, false, Some("invalid credentials"));
                return Err(FlowError::InvalidCredentials);
            }
        };
        if !user.is_active {
            log_auth_event("login", email, false, Some("inactive"));
            return Err(FlowError::Inactive);
        }
        self.record_login(&user.id)
    }

    /// Stamp `last_login`. This also retires outstanding tokens.
    pub fn record_login(&self, user_id: &str) -> Result<User, FlowError> {
        let mut user = self
            .store
            .get(user_id)?
            .ok_or_else(|| FlowError::Store(StoreError::NotFound(user_id.to_string())))?;
        user.last_login = Some(self.clock.now());
        self.store.update(&user)?;
        log_auth_event("login", &user.email, true, None);
        Ok(user)
    }

    fn lookup(&self, uidb64: &str) -> Result<Option<User>, FlowError> {
        match decode_uid(uidb64) {
            Ok(id) => Ok(self.store.get(&id)?),
            Err(_) => Ok(None),
        }
    }

    fn send_verification(&self, user: &User) -> bool {
        let token = self.verification.make_token(user, self.clock.now());
        log_token_event("email_verification", &user.email, TokenAction::Issued);
        let mail = verification_email(
            &self.mail,
            &user.email,
            &user.full_name(),
            &encode_uid(&user.id),
            &token,
            self.verification.timeout(),
        );
        self.dispatch(&user.email, "verification_email", &mail)
    }

    fn dispatch(&self, account: &str, kind: &str, mail: &OutgoingMail) -> bool {
        match self.mailer.send(mail) {
            Ok(()) => {
                log_data_operation("send_mail", account, kind, true, None);
                true
            }
            Err(e) => {
                log_data_operation("send_mail", account, kind, false, Some(&e.to_string()));
                false
            }
        }
    }
}
