//! Reading git configuration for housekeeping decisions.
//!
//! Only the read side is implemented: the supervisor consults tunables,
//! it never rewrites config files.

pub mod error;
pub mod parse;
pub mod set;
pub mod types;

pub use error::ConfigError;
pub use set::ConfigSet;
pub use types::{parse_bool, parse_int};

use bstr::BString;

/// Configuration file scope (priority order, low to high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigScope {
    /// System-wide: /etc/gitconfig
    System,
    /// User-global: ~/.gitconfig or XDG
    Global,
    /// Repository-local: .git/config
    Local,
}

/// A normalized configuration key.
///
/// Section and variable names are case-insensitive (stored lowercased);
/// the subsection is case-sensitive and preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub section: String,
    pub subsection: Option<BString>,
    pub name: String,
}

impl ConfigKey {
    /// Parse from `section.name` or `section.subsection.name`.
    ///
    /// The section is everything before the first dot, the name is
    /// everything after the last dot, the subsection (which may itself
    /// contain dots) sits in between.
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let key = key.trim();
        let first_dot = key
            .find('.')
            .ok_or_else(|| ConfigError::InvalidKey(key.into()))?;
        let section = &key[..first_dot];
        let rest = &key[first_dot + 1..];
        if section.is_empty() || rest.is_empty() {
            return Err(ConfigError::InvalidKey(key.into()));
        }

        let (subsection, name) = match rest.rfind('.') {
            Some(last_dot) => {
                let sub = &rest[..last_dot];
                let name = &rest[last_dot + 1..];
                if name.is_empty() {
                    return Err(ConfigError::InvalidKey(key.into()));
                }
                (Some(BString::from(sub)), name)
            }
            None => (None, rest),
        };

        Ok(ConfigKey {
            section: section.to_ascii_lowercase(),
            subsection,
            name: name.to_ascii_lowercase(),
        })
    }

    pub fn matches(&self, other: &ConfigKey) -> bool {
        self.section == other.section
            && self.subsection == other.subsection
            && self.name == other.name
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subsection {
            Some(sub) => write!(f, "{}.{}.{}", self.section, sub, self.name),
            None => write!(f, "{}.{}", self.section, self.name),
        }
    }
}

/// One key/value occurrence from a config file.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    /// `None` for a value-less boolean key (`[gc] auto` style).
    pub value: Option<BString>,
    pub scope: ConfigScope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_part_key() {
        let k = ConfigKey::parse("gc.autoPackLimit").unwrap();
        assert_eq!(k.section, "gc");
        assert_eq!(k.subsection, None);
        assert_eq!(k.name, "autopacklimit");
    }

    #[test]
    fn three_part_key_preserves_subsection_case() {
        let k = ConfigKey::parse("maintenance.commit-graph.Auto").unwrap();
        assert_eq!(k.section, "maintenance");
        assert_eq!(k.subsection, Some(BString::from("commit-graph")));
        assert_eq!(k.name, "auto");

        let k = ConfigKey::parse("remote.Origin.url").unwrap();
        assert_eq!(k.subsection, Some(BString::from("Origin")));
    }

    #[test]
    fn dotted_subsection() {
        let k = ConfigKey::parse("url.https://example.com/.insteadof").unwrap();
        assert_eq!(k.section, "url");
        assert_eq!(k.subsection, Some(BString::from("https://example.com/")));
        assert_eq!(k.name, "insteadof");
    }

    #[test]
    fn malformed_keys() {
        assert!(ConfigKey::parse("gc").is_err());
        assert!(ConfigKey::parse(".auto").is_err());
        assert!(ConfigKey::parse("gc.").is_err());
    }
}
