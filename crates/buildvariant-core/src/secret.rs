//! Secret values that never leave the process in clear text.
//!
//! Keystore and key passwords are carried as [`SecretString`]. Formatting or
//! serializing one yields a placeholder instead of the value:
//!
//! - `${NAME}` when the value was read from environment variable `NAME`
//! - `<redacted>` when the value was written inline in the descriptor
//!
//! The value itself is only reachable through [`SecretString::expose`].
//!
//! A `${NAME}` reference whose variable is unset loads as an unresolved
//! secret. It only becomes an error when a variant signs with it.

use serde::{Serialize, Serializer};
use std::fmt;

/// Placeholder rendered for inline secrets.
pub const REDACTED: &str = "<redacted>";

/// Where a secret value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Written directly in the descriptor.
    Inline,
    /// Read from the named environment variable.
    Env(String),
    /// References an environment variable that was not set at load time.
    MissingEnv(String),
}

/// A string whose contents are never logged or serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString {
    value: String,
    source: SecretSource,
}

impl SecretString {
    /// Wraps an inline secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: SecretSource::Inline,
        }
    }

    /// Wraps a secret that was read from environment variable `var`.
    pub fn from_env(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: SecretSource::Env(var.into()),
        }
    }

    /// A reference to environment variable `var`, which was not set.
    pub fn missing_env(var: impl Into<String>) -> Self {
        Self {
            value: String::new(),
            source: SecretSource::MissingEnv(var.into()),
        }
    }

    /// Returns the variable name if this secret could not be read.
    pub fn unresolved_var(&self) -> Option<&str> {
        match &self.source {
            SecretSource::MissingEnv(var) => Some(var),
            _ => None,
        }
    }

    /// Returns the secret value. Callers must not log or persist it.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn source(&self) -> &SecretSource {
        &self.source
    }

    fn placeholder(&self) -> String {
        match &self.source {
            SecretSource::Inline => REDACTED.to_string(),
            SecretSource::Env(var) | SecretSource::MissingEnv(var) => format!("${{{var}}}"),
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.placeholder())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.placeholder())
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.placeholder())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_secret_is_redacted() {
        let secret = SecretString::new("boomverse@123");
        assert_eq!(format!("{:?}", secret), REDACTED);
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"<redacted>\"");
        assert_eq!(secret.expose(), "boomverse@123");
    }

    #[test]
    fn test_env_secret_renders_variable_name() {
        let secret = SecretString::from_env("KEYSTORE_PASSWORD", "hunter2");
        assert_eq!(secret.to_string(), "${KEYSTORE_PASSWORD}");
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            "\"${KEYSTORE_PASSWORD}\""
        );
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_missing_env_secret() {
        let secret = SecretString::missing_env("KEY_PASSWORD");
        assert_eq!(secret.unresolved_var(), Some("KEY_PASSWORD"));
        assert_eq!(secret.to_string(), "${KEY_PASSWORD}");
        assert_eq!(SecretString::new("x").unresolved_var(), None);
    }

    #[test]
    fn test_equal_values_stay_independent() {
        let store = SecretString::new("same");
        let key = SecretString::from_env("KEY_PASSWORD", "same");
        assert_eq!(store.expose(), key.expose());
        assert_ne!(store, key);
    }
}
