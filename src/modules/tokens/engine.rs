use chrono::{DateTime, Utc};
use hmac::Mac;
use log::debug;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::base36;
use crate::modules::utils::time::normalize_login_timestamp;
use crate::HmacSha256;

/// Salt mixed into every signing key. Changing it invalidates every token
/// already delivered to users.
pub const KEY_SALT: &str = "django.contrib.auth.tokens.PasswordResetTokenGenerator";

/// Unix time of 2001-01-01T00:00:00, the zero point of token timestamps
pub const TOKEN_EPOCH_UNIX: i64 = 978_307_200;

/// Email verification links stay usable for 7 days
pub const EMAIL_VERIFICATION_TIMEOUT: u64 = 60 * 60 * 24 * 7;

/// Password reset links stay usable for 24 hours
pub const PASSWORD_RESET_TIMEOUT: u64 = 60 * 60 * 24;

/// What a token is bound to. Any change to `state_fingerprint` or
/// `last_login` invalidates tokens issued before the change.
pub trait TokenSubject {
    fn subject_id(&self) -> &str;
    fn state_fingerprint(&self) -> &str;
    fn last_login(&self) -> Option<DateTime<Utc>>;
}

/// Why a token was refused. Only used for diagnostics; callers get a bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    NoSubject,
    Malformed,
    BadTimestamp,
    SignatureMismatch,
    Expired,
    FromTheFuture,
}

#[derive(Clone)]
struct SigningKey {
    key: [u8; 32],
}

impl SigningKey {
    fn derive(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_SALT.as_bytes());
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// Hex HMAC-SHA256 of `value`, keeping every second character
    fn sign(&self, value: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any size");
        mac.update(value.as_bytes());
        hex::encode(mac.finalize().into_bytes())
            .chars()
            .step_by(2)
            .collect()
    }
}

/// Issues and checks stateless, time-limited tokens bound to a user's
/// current state. One instance per purpose; the purposes differ only in
/// `timeout`.
#[derive(Clone)]
pub struct TokenEngine {
    primary: SigningKey,
    fallbacks: Vec<SigningKey>,
    timeout: u64,
    max_clock_skew: u64,
    clock_offset: i64,
}

impl TokenEngine {
    pub fn new(secret: &str, timeout: u64) -> Self {
        Self {
            primary: SigningKey::derive(secret),
            fallbacks: Vec::new(),
            timeout,
            max_clock_skew: 0,
            clock_offset: 0,
        }
    }

    pub fn email_verification(secret: &str) -> Self {
        Self::new(secret, EMAIL_VERIFICATION_TIMEOUT)
    }

    pub fn password_reset(secret: &str) -> Self {
        Self::new(secret, PASSWORD_RESET_TIMEOUT)
    }

    /// Older secrets still accepted on check, never used to issue
    pub fn with_fallback_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fallbacks = secrets
            .into_iter()
            .map(|s| SigningKey::derive(s.as_ref()))
            .collect();
        self
    }

    /// How far in the future an embedded timestamp may lie and still pass
    pub fn with_max_clock_skew(mut self, seconds: u64) -> Self {
        self.max_clock_skew = seconds;
        self
    }

    /// Offset in seconds from UTC of the wall clock the timestamps count in
    pub fn with_clock_offset(mut self, seconds: i64) -> Self {
        self.clock_offset = seconds;
        self
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    /// Seconds between the token epoch and `now`, clamped at zero
    pub fn seconds_since_epoch(&self, now: DateTime<Utc>) -> u64 {
        let seconds = now
            .timestamp()
            .saturating_add(self.clock_offset)
            .saturating_sub(TOKEN_EPOCH_UNIX);
        seconds.max(0) as u64
    }

    pub fn make_token<S: TokenSubject>(&self, user: &S, now: DateTime<Utc>) -> String {
        self.make_token_with_timestamp(user, self.seconds_since_epoch(now))
    }

    pub fn make_token_with_timestamp<S: TokenSubject>(&self, user: &S, timestamp: u64) -> String {
        Self::token_for_key(&self.primary, user, timestamp)
    }

    pub fn check_token<S: TokenSubject>(
        &self,
        user: Option<&S>,
        token: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.inspect_token(user, token, now) {
            Ok(()) => true,
            Err(reason) => {
                debug!("Token rejected: reason={:?}", reason);
                false
            }
        }
    }

    /// Same checks as [`check_token`](Self::check_token), keeping the reason
    pub fn inspect_token<S: TokenSubject>(
        &self,
        user: Option<&S>,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TokenRejection> {
        let user = user.ok_or(TokenRejection::NoSubject)?;
        if token.is_empty() {
            return Err(TokenRejection::Malformed);
        }

        let parts: Vec<&str> = token.split('-').collect();
        if parts.len() != 2 {
            return Err(TokenRejection::Malformed);
        }
        let timestamp = base36::decode(parts[0]).map_err(|_| TokenRejection::BadTimestamp)?;

        let signed_by_known_key = std::iter::once(&self.primary)
            .chain(self.fallbacks.iter())
            .any(|key| {
                let expected = Self::token_for_key(key, user, timestamp);
                bool::from(expected.as_bytes().ct_eq(token.as_bytes()))
            });
        if !signed_by_known_key {
            return Err(TokenRejection::SignatureMismatch);
        }

        let now_seconds = self.seconds_since_epoch(now);
        if now_seconds >= timestamp {
            if now_seconds - timestamp > self.timeout {
                return Err(TokenRejection::Expired);
            }
        } else if timestamp - now_seconds > self.max_clock_skew {
            return Err(TokenRejection::FromTheFuture);
        }

        Ok(())
    }

    fn token_for_key<S: TokenSubject>(key: &SigningKey, user: &S, timestamp: u64) -> String {
        let signature = key.sign(&Self::hash_value(user, timestamp));
        format!("{}-{}", base36::encode(timestamp), signature)
    }

    fn hash_value<S: TokenSubject>(user: &S, timestamp: u64) -> String {
        let login = user
            .last_login()
            .map(normalize_login_timestamp)
            .unwrap_or_default();
        format!(
            "{}{}{}{}",
            user.subject_id(),
            user.state_fingerprint(),
            login,
            timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Subject {
        id: String,
        fingerprint: String,
        last_login: Option<DateTime<Utc>>,
    }

    impl TokenSubject for Subject {
        fn subject_id(&self) -> &str {
            &self.id
        }
        fn state_fingerprint(&self) -> &str {
            &self.fingerprint
        }
        fn last_login(&self) -> Option<DateTime<Utc>> {
            self.last_login
        }
    }

    fn user_u1() -> Subject {
        Subject {
            id: "U1".to_string(),
            fingerprint: "H0".to_string(),
            last_login: None,
        }
    }

    /// Instant whose token timestamp is `seconds`
    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(TOKEN_EPOCH_UNIX + seconds, 0).unwrap()
    }

    #[test]
    fn test_matches_reference_tokens() {
        let engine = TokenEngine::password_reset("test-secret");
        let mut user = user_u1();
        assert_eq!(
            engine.make_token(&user, at(1_700_000_000)),
            "s44we8-79f5b5d94079b68b27bad68a26bf087a"
        );

        user.last_login = Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap());
        assert_eq!(
            engine.make_token_with_timestamp(&user, 1_700_000_000),
            "s44we8-162054e8bd677b02f334228f185a3add"
        );
    }

    #[test]
    fn test_fresh_token_verifies() {
        let user = user_u1();
        for engine in [
            TokenEngine::email_verification("k"),
            TokenEngine::password_reset("k"),
            TokenEngine::new("k", 1),
        ] {
            let now = Utc::now();
            let token = engine.make_token(&user, now);
            assert!(engine.check_token(Some(&user), &token, now));
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let engine = TokenEngine::new("test-secret", 86_400);
        let user = user_u1();
        let token = engine.make_token(&user, at(1_700_000_000));

        assert!(engine.check_token(Some(&user), &token, at(1_700_086_399)));
        assert!(engine.check_token(Some(&user), &token, at(1_700_086_400)));
        assert!(!engine.check_token(Some(&user), &token, at(1_700_086_401)));
        assert_eq!(
            engine.inspect_token(Some(&user), &token, at(1_700_086_401)),
            Err(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_fingerprint_change_invalidates() {
        let engine = TokenEngine::password_reset("test-secret");
        let mut user = user_u1();
        let token = engine.make_token(&user, at(1_700_000_000));

        user.fingerprint = "H1".to_string();
        assert_eq!(
            engine.inspect_token(Some(&user), &token, at(1_700_000_010)),
            Err(TokenRejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_login_change_invalidates() {
        let engine = TokenEngine::email_verification("test-secret");
        let mut user = user_u1();
        let token = engine.make_token(&user, at(1_000));

        user.last_login = Some(at(1_005));
        assert!(!engine.check_token(Some(&user), &token, at(1_010)));
    }

    #[test]
    fn test_sub_second_login_precision_ignored() {
        let engine = TokenEngine::password_reset("test-secret");
        let mut user = user_u1();
        user.last_login = Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap());
        let token = engine.make_token(&user, at(1_000));

        user.last_login = user
            .last_login
            .map(|t| t + chrono::Duration::milliseconds(731));
        assert!(engine.check_token(Some(&user), &token, at(1_001)));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let engine = TokenEngine::password_reset("test-secret");
        let user = user_u1();
        let token = engine.make_token(&user, at(1_700_000_000));

        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert!(!engine.check_token(Some(&user), &tampered, at(1_700_000_001)));
    }

    #[test]
    fn test_tampered_timestamp_fails() {
        let engine = TokenEngine::password_reset("test-secret");
        let user = user_u1();
        let token = engine.make_token(&user, at(1_700_000_000));
        let (_, signature) = token.split_once('-').unwrap();
        let forged = format!("{}-{}", base36::encode(1_700_080_000), signature);

        assert!(!engine.check_token(Some(&user), &forged, at(1_700_090_000)));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let engine = TokenEngine::password_reset("test-secret");
        let user = user_u1();
        let now = at(1_700_000_000);
        let good = engine.make_token(&user, now);

        let cases = [
            ("", TokenRejection::Malformed),
            ("s44we879f5b5d94079b68b27bad68a26bf087a", TokenRejection::Malformed),
            ("-", TokenRejection::BadTimestamp),
            ("S44WE8-79f5b5d94079b68b27bad68a26bf087a", TokenRejection::BadTimestamp),
            ("!!-79f5b5d94079b68b27bad68a26bf087a", TokenRejection::BadTimestamp),
            ("s44we8-", TokenRejection::SignatureMismatch),
        ];
        for (token, reason) in cases {
            assert_eq!(engine.inspect_token(Some(&user), token, now), Err(reason), "{token:?}");
        }

        let trailing = format!("{good}-extra");
        assert_eq!(
            engine.inspect_token(Some(&user), &trailing, now),
            Err(TokenRejection::Malformed)
        );
        assert!(!engine.check_token(None::<&Subject>, &good, now));
    }

    #[test]
    fn test_deterministic_within_a_second() {
        let engine = TokenEngine::email_verification("test-secret");
        let user = user_u1();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let first = engine.make_token(&user, base);
        let same_second = engine.make_token(&user, base + chrono::Duration::milliseconds(999));
        let next_second = engine.make_token(&user, base + chrono::Duration::seconds(1));

        assert_eq!(first, same_second);
        assert_ne!(first, next_second);
    }

    #[test]
    fn test_secret_and_fallbacks() {
        let user = user_u1();
        let now = at(5_000);
        let old = TokenEngine::password_reset("old-secret");
        let token = old.make_token(&user, now);

        let rotated = TokenEngine::password_reset("new-secret");
        assert!(!rotated.check_token(Some(&user), &token, now));

        let rotated = rotated.with_fallback_secrets(["old-secret"]);
        assert!(rotated.check_token(Some(&user), &token, now));
        assert_ne!(rotated.make_token(&user, now), token);
    }

    #[test]
    fn test_future_dated_tokens() {
        let user = user_u1();
        let strict = TokenEngine::password_reset("test-secret");
        let token = strict.make_token(&user, at(10_060));

        assert_eq!(
            strict.inspect_token(Some(&user), &token, at(10_000)),
            Err(TokenRejection::FromTheFuture)
        );

        let lenient = strict.clone().with_max_clock_skew(60);
        assert!(lenient.check_token(Some(&user), &token, at(10_000)));
        assert!(!lenient.check_token(Some(&user), &token, at(9_999)));
    }

    #[test]
    fn test_clock_offset_shifts_timestamps() {
        let user = user_u1();
        let utc = TokenEngine::password_reset("test-secret");
        let lagos = utc.clone().with_clock_offset(3_600);
        let now = at(1_000);

        assert_eq!(lagos.seconds_since_epoch(now), utc.seconds_since_epoch(now) + 3_600);
        let token = lagos.make_token(&user, now);
        assert!(lagos.check_token(Some(&user), &token, now));
        assert!(!utc.check_token(Some(&user), &token, now));
    }

    #[test]
    fn test_before_epoch_clamps_to_zero() {
        let engine = TokenEngine::password_reset("test-secret");
        let early = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(engine.seconds_since_epoch(early), 0);
        assert!(engine.make_token(&user_u1(), early).starts_with("0-"));
    }

    #[test]
    fn test_extreme_clock_offsets_saturate() {
        let now = at(1_700_000_000);
        let ahead = TokenEngine::password_reset("test-secret").with_clock_offset(i64::MAX);
        assert_eq!(ahead.seconds_since_epoch(now), (i64::MAX - TOKEN_EPOCH_UNIX) as u64);

        let behind = TokenEngine::password_reset("test-secret").with_clock_offset(i64::MIN);
        assert_eq!(behind.seconds_since_epoch(now), 0);
    }
}
