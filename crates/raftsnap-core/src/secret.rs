//! Credential strings that must never reach logs.

use serde::Deserialize;
use std::fmt;

/// A token, signature, or client secret. `Debug` and `Display` are redacted;
/// call [`Secret::expose`] at the point of use.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(***)")
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let s = Secret::new("hvs.very-secret");
        assert_eq!(format!("{:?}", s), "Secret(***)");
        assert_eq!(format!("{}", s), "***");
        assert_eq!(s.expose(), "hvs.very-secret");
    }

    #[test]
    fn new_trims_whitespace() {
        let s = Secret::new("  tok\n");
        assert_eq!(s.expose(), "tok");
        assert!(Secret::new("   ").is_empty());
    }

    #[test]
    fn deserializes_from_plain_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            token: Secret,
        }
        let w: Wrapper = toml::from_str("token = \"abc\"").unwrap();
        assert_eq!(w.token.expose(), "abc");
    }
}
