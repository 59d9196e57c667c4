mod modules;

pub use modules::{auth, config, email, security, tokens, utils};

pub use modules::auth::flows::{AccountService, FlowError, Registration, VerifyOutcome};
pub use modules::auth::store::{JsonUserStore, MemoryUserStore, User, UserStore};
pub use modules::config::Settings;
pub use modules::tokens::{TokenEngine, TokenRejection, TokenSubject};

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
