//! Player name grammar.

use shared::MAX_NAME_LENGTH;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Usernames must be 16 characters or less")]
    TooLong,
    #[error("Invalid player name")]
    Invalid,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+')
}

/// Checks length first, then the character set `[A-Za-z0-9._+]`.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong);
    }
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(NameError::Invalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["Alice", "bob_42", "x", "Player.Two", "cc+", "ABCDEFGHIJKLMNOP"] {
            assert_eq!(validate_name(name), Ok(()), "{}", name);
        }
    }

    #[test]
    fn test_too_long() {
        assert_eq!(validate_name("ABCDEFGHIJKLMNOPQ"), Err(NameError::TooLong));
        assert_eq!(
            NameError::TooLong.to_string(),
            "Usernames must be 16 characters or less"
        );
    }

    #[test]
    fn test_length_checked_before_grammar() {
        assert_eq!(validate_name("!!!!!!!!!!!!!!!!!!"), Err(NameError::TooLong));
    }

    #[test]
    fn test_invalid_characters() {
        for name in ["", "has space", "semi;colon", "ünicode", "tab\t"] {
            assert_eq!(validate_name(name), Err(NameError::Invalid), "{:?}", name);
        }
    }
}
