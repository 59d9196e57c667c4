use keyring::{Entry, Error as KeyringError};
use log::info;
use rand::Rng;
use std::io;

const SERVICE_NAME: &str = "account-tokens";
const ENTRY_NAME: &str = "secret-key";

const SECRET_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*(-_=+)";
pub const SECRET_LENGTH: usize = 50;

/// Generate a random server secret suitable for signing tokens
pub fn generate_secret_key() -> String {
    let mut rng = rand::thread_rng();
    (0..SECRET_LENGTH)
        .map(|_| char::from(SECRET_CHARS[rng.gen_range(0..SECRET_CHARS.len())]))
        .collect()
}

fn to_io_error(error: KeyringError) -> io::Error {
    match error {
        KeyringError::NoEntry => io::Error::new(io::ErrorKind::NotFound, error.to_string()),
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Keep an existing secret, or create and store one when the keyring has
/// no entry. Any other keyring failure is returned untouched so a locked or
/// broken keychain never rotates the signing secret.
fn secret_or_create<F>(existing: Result<String, KeyringError>, store: F) -> Result<String, KeyringError>
where
    F: FnOnce(&str) -> Result<(), KeyringError>,
{
    match existing {
        Ok(secret) => Ok(secret),
        Err(KeyringError::NoEntry) => {
            let secret = generate_secret_key();
            store(&secret)?;
            info!("New signing secret generated and stored in system keyring");
            Ok(secret)
        }
        Err(e) => Err(e),
    }
}

/// Server signing secret kept in the system keyring
pub struct SecretKeyStore {
    keyring: Entry,
}

impl SecretKeyStore {
    pub fn new() -> io::Result<Self> {
        let keyring = Entry::new(SERVICE_NAME, ENTRY_NAME).map_err(to_io_error)?;
        Ok(Self { keyring })
    }

    pub fn store(&self, secret: &str) -> io::Result<()> {
        self.keyring.set_password(secret).map_err(to_io_error)
    }

    /// `ErrorKind::NotFound` means no secret was ever stored; other kinds
    /// are keyring failures.
    pub fn get(&self) -> io::Result<String> {
        self.keyring.get_password().map_err(to_io_error)
    }

    /// Return the stored secret, creating one on first use
    pub fn initialize_if_needed(&self) -> io::Result<String> {
        secret_or_create(self.keyring.get_password(), |secret| {
            self.keyring.set_password(secret)
        })
        .map_err(to_io_error)
    }
}
