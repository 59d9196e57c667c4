use std::env;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::modules::email::{MailContext, SmtpSettings};
use crate::modules::security::SecretKeyStore;
use crate::modules::tokens::{TokenEngine, EMAIL_VERIFICATION_TIMEOUT, PASSWORD_RESET_TIMEOUT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SECRET_KEY is not set and no secret is stored in the system keyring")]
    MissingSecret,
    #[error("could not read the signing secret from the system keyring: {0}")]
    Keyring(#[source] io::Error),
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Runtime settings, read from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub secret_key_fallbacks: Vec<String>,
    pub frontend_url: String,
    pub site_name: String,
    pub default_from_email: String,
    pub email_verification_timeout: u64,
    pub password_reset_timeout: u64,
    pub token_clock_offset: i64,
    pub token_max_clock_skew: u64,
    pub email_host: String,
    pub email_port: u16,
    pub email_use_tls: bool,
    pub email_host_user: String,
    pub email_host_password: String,
    pub users_file: PathBuf,
    pub log_level: String,
}

/// Read a variable, falling back to `default` when unset
pub fn get_env_variable(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Boolean variable. Unrecognised spellings keep the default.
pub fn get_boolean_env(name: &str, default: bool) -> bool {
    let value = env::var(name).unwrap_or_default().to_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => true,
        "false" | "0" | "no" | "n" => false,
        "" if env::var(name).is_ok() => false,
        _ => default,
    }
}

/// Numeric variable. Unset yields the default; unparsable is an error.
pub fn get_int_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn keyring_error(error: io::Error) -> ConfigError {
    match error.kind() {
        io::ErrorKind::NotFound => ConfigError::MissingSecret,
        _ => ConfigError::Keyring(error),
    }
}

/// Location of the JSON user file. Needs no secret.
pub fn users_file() -> PathBuf {
    PathBuf::from(get_env_variable("USERS_FILE", "users.json"))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Settings {
    /// Load settings from the environment (and `.env`, if present).
    ///
    /// | Variable                      | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `SECRET_KEY`                  | system keyring           |
    /// | `SECRET_KEY_FALLBACKS`        | none                     |
    /// | `FRONTEND_URL`                | `http://localhost:3000`  |
    /// | `SITE_NAME`                   | `Account Service`        |
    /// | `DEFAULT_FROM_EMAIL`          | `webmaster@localhost`    |
    /// | `EMAIL_VERIFICATION_TIMEOUT`  | `604800`                 |
    /// | `PASSWORD_RESET_TIMEOUT`      | `86400`                  |
    /// | `TOKEN_CLOCK_OFFSET_SECONDS`  | `0`                      |
    /// | `TOKEN_MAX_CLOCK_SKEW`        | `0`                      |
    /// | `EMAIL_HOST` / `EMAIL_PORT`   | `localhost` / `25`       |
    /// | `EMAIL_USE_TLS`               | `false`                  |
    /// | `USERS_FILE`                  | `users.json`             |
    /// | `LOG_LEVEL`                   | `info`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let secret_key = match env::var("SECRET_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => SecretKeyStore::new()
                .and_then(|store| store.get())
                .map_err(keyring_error)?,
        };

        Self::from_env_with_secret(secret_key)
    }

    /// Same as [`from_env`](Self::from_env) with the secret supplied by the caller
    pub fn from_env_with_secret(secret_key: String) -> Result<Self, ConfigError> {
        if secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Self {
            secret_key,
            secret_key_fallbacks: split_list(&get_env_variable("SECRET_KEY_FALLBACKS", "")),
            frontend_url: get_env_variable("FRONTEND_URL", "http://localhost:3000"),
            site_name: get_env_variable("SITE_NAME", "Account Service"),
            default_from_email: get_env_variable("DEFAULT_FROM_EMAIL", "webmaster@localhost"),
            email_verification_timeout: get_int_env(
                "EMAIL_VERIFICATION_TIMEOUT",
                EMAIL_VERIFICATION_TIMEOUT,
            )?,
            password_reset_timeout: get_int_env("PASSWORD_RESET_TIMEOUT", PASSWORD_RESET_TIMEOUT)?,
            token_clock_offset: get_int_env("TOKEN_CLOCK_OFFSET_SECONDS", 0)?,
            token_max_clock_skew: get_int_env("TOKEN_MAX_CLOCK_SKEW", 0)?,
            email_host: get_env_variable("EMAIL_HOST", "localhost"),
            email_port: get_int_env("EMAIL_PORT", 25)?,
            email_use_tls: get_boolean_env("EMAIL_USE_TLS", false),
            email_host_user: get_env_variable("EMAIL_HOST_USER", ""),
            email_host_password: get_env_variable("EMAIL_HOST_PASSWORD", ""),
            users_file: users_file(),
            log_level: get_env_variable("LOG_LEVEL", "info"),
        })
    }

    fn engine(&self, timeout: u64) -> TokenEngine {
        TokenEngine::new(&self.secret_key, timeout)
            .with_fallback_secrets(&self.secret_key_fallbacks)
            .with_clock_offset(self.token_clock_offset)
            .with_max_clock_skew(self.token_max_clock_skew)
    }

    pub fn verification_engine(&self) -> TokenEngine {
        self.engine(self.email_verification_timeout)
    }

    pub fn password_reset_engine(&self) -> TokenEngine {
        self.engine(self.password_reset_timeout)
    }

    pub fn mail_context(&self) -> MailContext {
        MailContext {
            site_name: self.site_name.clone(),
            frontend_url: self.frontend_url.clone(),
            support_email: self.default_from_email.clone(),
        }
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.email_host.clone(),
            port: self.email_port,
            use_tls: self.email_use_tls,
            username: self.email_host_user.clone(),
            password: self.email_host_password.clone(),
            from_address: self.default_from_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests in this module mutate process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SECRET_KEY_FALLBACKS",
        "FRONTEND_URL",
        "PASSWORD_RESET_TIMEOUT",
        "EMAIL_USE_TLS",
        "EMAIL_PORT",
        "TOKEN_CLOCK_OFFSET_SECONDS",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();

        let settings = Settings::from_env_with_secret("s3cret".to_string()).unwrap();
        assert_eq!(settings.email_verification_timeout, 604800);
        assert_eq!(settings.password_reset_timeout, 86400);
        assert_eq!(settings.frontend_url, "http://localhost:3000");
        assert!(settings.secret_key_fallbacks.is_empty());
        assert!(!settings.email_use_tls);
        assert_eq!(settings.verification_engine().timeout(), 604800);
        assert_eq!(settings.password_reset_engine().timeout(), 86400);
    }

    #[test]
    fn test_overrides_and_lists() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();
        env::set_var("SECRET_KEY_FALLBACKS", "old-one, older-one,,");
        env::set_var("PASSWORD_RESET_TIMEOUT", "3600");
        env::set_var("EMAIL_USE_TLS", "yes");
        env::set_var("TOKEN_CLOCK_OFFSET_SECONDS", "-3600");

        let settings = Settings::from_env_with_secret("s3cret".to_string()).unwrap();
        assert_eq!(settings.secret_key_fallbacks, ["old-one", "older-one"]);
        assert_eq!(settings.password_reset_timeout, 3600);
        assert!(settings.email_use_tls);
        assert_eq!(settings.token_clock_offset, -3600);
        clear();
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();
        env::set_var("EMAIL_PORT", "not-a-port");

        let err = Settings::from_env_with_secret("s3cret".to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "EMAIL_PORT", .. }));
        clear();
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(
            Settings::from_env_with_secret(String::new()),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn test_keyring_failures_are_not_missing_secrets() {
        let missing = keyring_error(io::Error::new(io::ErrorKind::NotFound, "no entry"));
        assert!(matches!(missing, ConfigError::MissingSecret));

        let locked = keyring_error(io::Error::new(io::ErrorKind::Other, "keychain locked"));
        assert!(matches!(locked, ConfigError::Keyring(_)));
        assert!(locked.to_string().contains("keychain locked"));
    }

    #[test]
    fn test_boolean_parsing() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("EMAIL_USE_TLS", "maybe");
        assert!(get_boolean_env("EMAIL_USE_TLS", true));
        env::set_var("EMAIL_USE_TLS", "N");
        assert!(!get_boolean_env("EMAIL_USE_TLS", true));
        env::set_var("EMAIL_USE_TLS", "");
        assert!(!get_boolean_env("EMAIL_USE_TLS", true));
        env::remove_var("EMAIL_USE_TLS");
        assert!(get_boolean_env("EMAIL_USE_TLS", true));
    }
}
