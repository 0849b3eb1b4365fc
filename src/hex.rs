use core::fmt;

use crate::error::ParseError;

/// Maximum number of hex digits accepted by [`parse_hex`].
pub const MAX_HEX_DIGITS: usize = 8;

/// Parse a hexadecimal literal with an optional `0x`/`0X` prefix.
///
/// Digits are case-insensitive and at most [`MAX_HEX_DIGITS`] long.
pub fn parse_hex(text: &str) -> Result<u32, ParseError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.len() > MAX_HEX_DIGITS {
        return Err(ParseError::TooLong);
    }
    if digits.is_empty() {
        return Err(ParseError::Empty);
    }

    digits.chars().try_fold(0u32, |value, c| {
        let nybble = c.to_digit(16).ok_or(ParseError::InvalidCharacter(c))?;
        Ok(value << 4 | nybble)
    })
}

/// Hex rendering returned by [`format_hex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hex {
    value: u32,
    min_digits: usize,
}

/// Render `value` as `0x` followed by at least `min_digits` lowercase digits.
///
/// Zero renders as `0x0` when `min_digits` is 0 or 1.
pub fn format_hex(value: u32, min_digits: usize) -> Hex {
    Hex { value, min_digits }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:01$x}", self.value, self.min_digits.max(1))
    }
}

/// Decimal rendering returned by [`format_dec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dec {
    value: u32,
    min_digits: usize,
}

/// Render `value` in decimal, zero-padded to `min_digits`.
pub fn format_dec(value: u32, min_digits: usize) -> Dec {
    Dec { value, min_digits }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:01$}", self.value, self.min_digits.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_prefixed_and_bare_literals() {
        assert_eq!(parse_hex("0x1A"), Ok(0x1a));
        assert_eq!(parse_hex("0X1a"), Ok(0x1a));
        assert_eq!(parse_hex("c"), Ok(0xc));
        assert_eq!(parse_hex("00201000"), Ok(0x201000));
        assert_eq!(parse_hex("0xFFFFFFFF"), Ok(0xffff_ffff));
    }

    #[test]
    fn rejects_bad_characters() {
        assert_eq!(parse_hex("zz"), Err(ParseError::InvalidCharacter('z')));
        assert_eq!(parse_hex("0x12g4"), Err(ParseError::InvalidCharacter('g')));
        assert_eq!(parse_hex("x10"), Err(ParseError::InvalidCharacter('x')));
    }

    #[test]
    fn rejects_too_many_digits() {
        assert_eq!(parse_hex("123456789"), Err(ParseError::TooLong));
        assert_eq!(parse_hex("0x123456789"), Err(ParseError::TooLong));
        // Length is checked before the digits themselves.
        assert_eq!(parse_hex("zzzzzzzzz"), Err(ParseError::TooLong));
    }

    #[test]
    fn rejects_bare_prefix() {
        assert_eq!(parse_hex("0x"), Err(ParseError::Empty));
        assert_eq!(parse_hex(""), Err(ParseError::Empty));
    }

    #[test]
    fn formats_hex() {
        assert_eq!(format_hex(0xab, 4).to_string(), "0x00ab");
        assert_eq!(format_hex(0, 1).to_string(), "0x0");
        assert_eq!(format_hex(0, 0).to_string(), "0x0");
        assert_eq!(format_hex(0x12345, 2).to_string(), "0x12345");
        assert_eq!(format_hex(0xdead_beef, 8).to_string(), "0xdeadbeef");
    }

    #[test]
    fn formats_dec() {
        assert_eq!(format_dec(250, 0).to_string(), "250");
        assert_eq!(format_dec(7, 3).to_string(), "007");
        assert_eq!(format_dec(0, 0).to_string(), "0");
    }

    proptest! {
        #[test]
        fn formatted_values_parse_back(value in any::<u32>(), min_digits in 0usize..8) {
            let text = format_hex(value, min_digits).to_string();
            prop_assert!(text.len() >= 2 + min_digits.max(1));
            prop_assert_eq!(parse_hex(&text), Ok(value));
        }
    }
}
