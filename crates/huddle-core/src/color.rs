//! Participant color value object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Longest color name accepted from a client.
pub const MAX_COLOR_LEN: usize = 32;

/// A color a participant can claim during negotiation.
///
/// Colors are free-form names, normalised to trimmed lowercase so that
/// `"Red"` and `" red "` conflict with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    /// Parses and normalises a color name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidFieldValue` when the name is empty after
    /// trimming, longer than [`MAX_COLOR_LEN`], or contains control characters.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let normalised = raw.trim().to_lowercase();

        let invalid = normalised.is_empty()
            || normalised.chars().count() > MAX_COLOR_LEN
            || normalised.chars().any(char::is_control);

        if invalid {
            return Err(DomainError::InvalidFieldValue {
                field: "color".to_string(),
                value: raw.to_string(),
                expected: format!("1-{MAX_COLOR_LEN} printable characters"),
            });
        }

        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Color {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_normalises_case_and_whitespace() {
        let a = Color::parse(" Red ").unwrap();
        let b = Color::parse("red").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "red");
    }

    #[test]
    fn test_color_rejects_empty() {
        assert!(Color::parse("").is_err());
        assert!(Color::parse("   ").is_err());
    }

    #[test]
    fn test_color_rejects_too_long() {
        let long = "x".repeat(MAX_COLOR_LEN + 1);
        assert!(Color::parse(&long).is_err());
        assert!(Color::parse(&"x".repeat(MAX_COLOR_LEN)).is_ok());
    }

    #[test]
    fn test_color_rejects_control_chars() {
        assert!(Color::parse("re\u{7}d").is_err());
    }

    #[test]
    fn test_color_deserialize_validates() {
        let ok: Result<Color, _> = serde_json::from_str("\"Blue\"");
        assert_eq!(ok.unwrap().as_str(), "blue");

        let bad: Result<Color, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
