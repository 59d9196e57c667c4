pub mod keyring;

pub use self::keyring::{generate_secret_key, SecretKeyStore};
