use thiserror::Error;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Longest base-36 string accepted on input. Anything longer cannot be a
/// timestamp we issued.
pub const MAX_ENCODED_LEN: usize = 13;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Base36Error {
    #[error("base36 input is empty")]
    Empty,
    #[error("base36 input too large")]
    TooLong,
    #[error("invalid base36 digit {0:?}")]
    InvalidDigit(char),
    #[error("base36 value overflows u64")]
    Overflow,
}

/// Encode an integer as lowercase base-36 text
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(MAX_ENCODED_LEN);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Decode lowercase base-36 text
pub fn decode(text: &str) -> Result<u64, Base36Error> {
    if text.is_empty() {
        return Err(Base36Error::Empty);
    }
    if text.len() > MAX_ENCODED_LEN {
        return Err(Base36Error::TooLong);
    }

    text.chars().try_fold(0u64, |acc, c| {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'a'..='z' => c as u64 - 'a' as u64 + 10,
            other => return Err(Base36Error::InvalidDigit(other)),
        };
        acc.checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or(Base36Error::Overflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(encode(0), "0");
        assert_eq!(encode(35), "z");
        assert_eq!(encode(36), "10");
        assert_eq!(encode(1_700_000_000), "s44we8");
        assert_eq!(decode("s44we8"), Ok(1_700_000_000));
        assert_eq!(encode(u64::MAX), "3w5e11264sgsf");
        assert_eq!(decode("3w5e11264sgsf"), Ok(u64::MAX));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(decode(""), Err(Base36Error::Empty));
        assert_eq!(decode("12345678901234"), Err(Base36Error::TooLong));
        assert_eq!(decode("ABC"), Err(Base36Error::InvalidDigit('A')));
        assert_eq!(decode(" 1"), Err(Base36Error::InvalidDigit(' ')));
        assert_eq!(decode("-1"), Err(Base36Error::InvalidDigit('-')));
        assert_eq!(decode("zzzzzzzzzzzzz"), Err(Base36Error::Overflow));
    }
}
