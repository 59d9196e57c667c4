use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::io;
use subtle::ConstantTimeEq;

use crate::HmacSha256;

pub const HASHER_NAME: &str = "pbkdf2_sha256";
pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Reasons a new password is refused
#[derive(Debug, PartialEq, Eq)]
pub enum PasswordError {
    TooShort,
    NoDigit,
    NoLetter,
    NoSpecialChar,
    Mismatch,
}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PasswordError::TooShort => "Password must be at least 8 characters long.",
            PasswordError::NoDigit => "Password must contain at least one digit.",
            PasswordError::NoLetter => "Password must contain at least one letter.",
            PasswordError::NoSpecialChar => "Password must contain at least one special character.",
            PasswordError::Mismatch => "Password fields didn't match.",
        };
        f.write_str(message)
    }
}

impl std::error::Error for PasswordError {}

/// Function to validate password strength
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < 8 {
        return Err(PasswordError::TooShort);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err(PasswordError::NoDigit);
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordError::NoLetter);
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(PasswordError::NoSpecialChar);
    }
    Ok(())
}

/// Check that both entries agree, then apply the strength rules
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    validate_password(password)
}

/// Hash a password into `pbkdf2_sha256$<iterations>$<salt>$<hash>` form.
/// The encoded string doubles as the token fingerprint.
pub fn make_password(password: &str, iterations: u32) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    encode_password(password, &salt, iterations)
}

fn encode_password(password: &str, salt: &str, iterations: u32) -> String {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    format!("{}${}${}${}", HASHER_NAME, iterations, salt, BASE64.encode(key))
}

/// Compare a candidate password against an encoded hash. Unknown or
/// malformed encodings never match.
pub fn check_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    if parts.len() != 4 || parts[0] != HASHER_NAME {
        return false;
    }
    let iterations: u32 = match parts[1].parse() {
        Ok(n) if n > 0 => n,
        _ => return false,
    };

    let candidate = encode_password(password, parts[2], iterations);
    candidate.as_bytes().ct_eq(encoded.as_bytes()).into()
}

/// Helper function to read a password without echo
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}
