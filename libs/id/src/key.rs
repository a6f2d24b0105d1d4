//! The `RunKey` identity type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::IdError;

/// Maximum length of a namespace (DNS-1123 label).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Maximum length of a name (DNS-1123 subdomain).
pub const MAX_NAME_LEN: usize = 253;

/// Identity of a Run: `namespace/name`.
///
/// Both parts are validated on construction, so a `RunKey` in hand is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRunKey")]
pub struct RunKey {
    namespace: String,
    name: String,
}

/// Unvalidated wire form, checked through `TryFrom` on deserialize.
#[derive(Deserialize)]
struct RawRunKey {
    namespace: String,
    name: String,
}

impl TryFrom<RawRunKey> for RunKey {
    type Error = IdError;

    fn try_from(raw: RawRunKey) -> Result<Self, Self::Error> {
        RunKey::new(raw.namespace, raw.name)
    }
}

impl RunKey {
    /// Creates a validated key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();

        if let Err(reason) = check_label(&namespace) {
            return Err(IdError::InvalidNamespace {
                value: namespace,
                reason,
            });
        }
        if let Err(reason) = check_subdomain(&name) {
            return Err(IdError::InvalidName {
                value: name,
                reason,
            });
        }

        Ok(Self { namespace, name })
    }

    /// Parses a key from its canonical `namespace/name` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((namespace, name)) = s.split_once('/') else {
            return Err(IdError::MissingSeparator);
        };

        Self::new(namespace, name)
    }

    /// Returns the namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for RunKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn check_label(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value.len() > MAX_NAMESPACE_LEN {
        return Err("must be at most 63 characters");
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err("must contain only lowercase alphanumerics and '-'");
    }
    check_edges(value)
}

fn check_subdomain(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value.len() > MAX_NAME_LEN {
        return Err("must be at most 253 characters");
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err("must contain only lowercase alphanumerics, '-' and '.'");
    }
    check_edges(value)
}

fn check_edges(value: &str) -> Result<(), &'static str> {
    let bytes = value.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    // Callers reject empty input first.
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err("must start and end with an alphanumeric character");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid() {
        let key = RunKey::parse("default/build-1234").unwrap();
        assert_eq!(key.namespace(), "default");
        assert_eq!(key.name(), "build-1234");
        assert_eq!(key.to_string(), "default/build-1234");
    }

    #[test]
    fn test_name_may_contain_dots() {
        let key: RunKey = "ci/nightly.release-7".parse().unwrap();
        assert_eq!(key.name(), "nightly.release-7");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(RunKey::parse(""), Err(IdError::Empty));
        assert_eq!(RunKey::parse("nope"), Err(IdError::MissingSeparator));
        assert!(RunKey::parse("/name").unwrap_err().is_namespace_error());
        assert!(matches!(
            RunKey::parse("ns/"),
            Err(IdError::InvalidName { .. })
        ));
        assert!(RunKey::parse("Default/x").unwrap_err().is_namespace_error());
        assert!(RunKey::parse("ns.dot/x").unwrap_err().is_namespace_error());
        assert!(matches!(
            RunKey::parse("ns/-leading"),
            Err(IdError::InvalidName { .. })
        ));
        assert!(matches!(
            RunKey::parse("ns/a/b"),
            Err(IdError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_length_limits() {
        let ns = "a".repeat(MAX_NAMESPACE_LEN);
        assert!(RunKey::new(ns.clone(), "x").is_ok());
        assert!(RunKey::new(format!("{ns}a"), "x").is_err());

        let name = "b".repeat(MAX_NAME_LEN);
        assert!(RunKey::new("ns", name.clone()).is_ok());
        assert!(RunKey::new("ns", format!("{name}b")).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let key = RunKey::new("default", "run-1").unwrap();
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({"namespace": "default", "name": "run-1"}));

        let back: RunKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);

        let bad = serde_json::json!({"namespace": "UPPER", "name": "run-1"});
        assert!(serde_json::from_value::<RunKey>(bad).is_err());
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(
            ns in "[a-z0-9]([-a-z0-9]{0,20}[a-z0-9])?",
            name in "[a-z0-9]([-.a-z0-9]{0,40}[a-z0-9])?",
        ) {
            let key = RunKey::new(ns, name).unwrap();
            let parsed = RunKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
