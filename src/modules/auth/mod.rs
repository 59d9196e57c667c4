pub mod flows;
pub mod password;
pub mod store;
pub mod uid;

// Re-export the main types and functions
pub use flows::{AccountService, FlowError, Registration, VerifyOutcome};
pub use password::{check_password, make_password, validate_password, PasswordError};
pub use store::{JsonUserStore, MemoryUserStore, StoreError, User, UserStore};
pub use uid::{decode_uid, encode_uid};
