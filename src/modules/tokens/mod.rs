pub mod base36;
pub mod clock;
pub mod engine;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    TokenEngine, TokenRejection, TokenSubject, EMAIL_VERIFICATION_TIMEOUT, PASSWORD_RESET_TIMEOUT,
};
