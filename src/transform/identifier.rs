//! Namespaced names of rules and caches.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// A `namespace:name` pair naming a transform rule or a class cache.
///
/// The string form is used in log output, in [`crate::Error::RuleFailed`] and as the persisted
/// `cache` preference in [`crate::config::Configuration`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: String,
    name: String,
}

impl Identifier {
    /// Create an identifier from its two parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Identifier {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The namespace, usually the contributing module
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name within the namespace
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Identifier::new(namespace, name))
            }
            _ => Err(Error::Config(format!(
                "'{}' is not a namespace:name identifier",
                value
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let id = Identifier::new("demo", "strip_markers");
        assert_eq!(id.to_string(), "demo:strip_markers");
        assert_eq!("demo:strip_markers".parse::<Identifier>().unwrap(), id);
        assert_eq!(id.namespace(), "demo");
        assert_eq!(id.name(), "strip_markers");
    }

    #[test]
    fn parse_rejects_incomplete() {
        for value in ["demo", ":name", "demo:", ""] {
            assert!(matches!(value.parse::<Identifier>(), Err(Error::Config(_))));
        }
    }
}
