use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// A normalized sign-language concept: trimmed and lower-cased.
///
/// Construction goes through [`Token::normalize`], so two tokens compare equal
/// exactly when they refer to the same clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Returns `None` for input that is empty after trimming.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased form used by the overlay caption.
    pub fn display_label(&self) -> String {
        self.0.to_uppercase()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let token = Token::normalize("  Hello ").unwrap();
        assert_eq!(token.as_str(), "hello");
        assert_eq!(token.display_label(), "HELLO");
    }

    #[test]
    fn rejects_blank_input() {
        assert!(Token::normalize("").is_none());
        assert!(Token::normalize(" \t\n").is_none());
    }
}
