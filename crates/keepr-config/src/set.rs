//! Merged multi-scope configuration view.

use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use keepr_utils::Expiry;

use crate::error::ConfigError;
use crate::{parse, types, ConfigEntry, ConfigKey, ConfigScope};

/// Configuration merged from all scopes, lowest priority first.
///
/// Lookups scan from the back so the highest-scope, latest occurrence
/// of a key wins, matching git's behavior for single-valued keys.
pub struct ConfigSet {
    entries: Vec<ConfigEntry>,
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSet {
    pub fn new() -> Self {
        ConfigSet {
            entries: Vec::new(),
        }
    }

    /// Load the standard file hierarchy: system, global, repo-local.
    pub fn load(git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut set = ConfigSet::new();

        if std::env::var_os("GIT_CONFIG_NOSYSTEM").is_none() {
            let system_path = std::env::var_os("GIT_CONFIG_SYSTEM")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/etc/gitconfig"));
            set.add_file(&system_path, ConfigScope::System)?;
        }

        if let Some(path) = std::env::var_os("GIT_CONFIG_GLOBAL").map(PathBuf::from) {
            set.add_file(&path, ConfigScope::Global)?;
        } else {
            if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
                set.add_file(&PathBuf::from(xdg).join("git/config"), ConfigScope::Global)?;
            } else if let Some(home) = std::env::var_os("HOME") {
                set.add_file(
                    &PathBuf::from(&home).join(".config/git/config"),
                    ConfigScope::Global,
                )?;
            }
            if let Some(home) = std::env::var_os("HOME") {
                set.add_file(&PathBuf::from(home).join(".gitconfig"), ConfigScope::Global)?;
            }
        }

        if let Some(git_dir) = git_dir {
            set.add_file(&git_dir.join("config"), ConfigScope::Local)?;
        }

        Ok(set)
    }

    /// Parse and append one config file. Missing files are skipped.
    pub fn add_file(&mut self, path: &Path, scope: ConfigScope) -> Result<(), ConfigError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        self.add_bytes(&bytes, &path.display().to_string(), scope)
    }

    /// Parse and append raw config text (used by tests and `add_file`).
    pub fn add_bytes(
        &mut self,
        bytes: &[u8],
        filename: &str,
        scope: ConfigScope,
    ) -> Result<(), ConfigError> {
        let mut entries = parse::parse_bytes(bytes, filename, scope)?;
        self.entries.append(&mut entries);
        Ok(())
    }

    /// Highest-priority raw value. Outer `None` = key absent;
    /// inner `None` = value-less boolean key.
    fn get_raw(&self, key: &ConfigKey) -> Option<Option<&BString>> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key.matches(key))
            .map(|e| e.value.as_ref())
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let key = ConfigKey::parse(key)?;
        Ok(self
            .get_raw(&key)
            .map(|v| v.map(|v| v.to_str_lossy().to_string()).unwrap_or_default()))
    }

    /// Every value for a multi-valued key, in scope then file order.
    pub fn get_all_strings(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let key = ConfigKey::parse(key)?;
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key.matches(&key))
            .map(|e| {
                e.value
                    .as_ref()
                    .map(|v| v.to_str_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let parsed = ConfigKey::parse(key)?;
        match self.get_raw(&parsed) {
            None => Ok(None),
            Some(value) => types::parse_bool(value.map(|v| v.as_slice()))
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidBool {
                    key: key.into(),
                    value: value.map(|v| v.to_string()).unwrap_or_default(),
                }),
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        let parsed = ConfigKey::parse(key)?;
        match self.get_raw(&parsed) {
            None => Ok(None),
            Some(Some(value)) => {
                types::parse_int(value.as_slice())
                    .map(Some)
                    .ok_or_else(|| ConfigError::InvalidInt {
                        key: key.into(),
                        value: value.to_string(),
                    })
            }
            Some(None) => Err(ConfigError::InvalidInt {
                key: key.into(),
                value: String::new(),
            }),
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        Ok(self.get_int(key)?.unwrap_or(default))
    }

    /// Unsigned variant; a negative value is a config error.
    pub fn get_ulong(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.get_int(key)? {
            None => Ok(None),
            Some(v) if v >= 0 => Ok(Some(v as u64)),
            Some(v) => Err(ConfigError::InvalidInt {
                key: key.into(),
                value: v.to_string(),
            }),
        }
    }

    /// Parse an expiry-valued key. An unparseable value is an error,
    /// never a silent default.
    pub fn get_expiry(&self, key: &str) -> Result<Option<Expiry>, ConfigError> {
        match self.get_string(key)? {
            None => Ok(None),
            Some(raw) => Expiry::parse(&raw)
                .map(Some)
                .map_err(|_| ConfigError::InvalidExpiry {
                    key: key.into(),
                    value: raw,
                }),
        }
    }

    /// Subsection names appearing under `section`, in order of first
    /// appearance (e.g. configured remote names).
    pub fn subsections(&self, section: &str) -> Vec<String> {
        let section = section.to_ascii_lowercase();
        let mut seen = Vec::new();
        for e in &self.entries {
            if e.key.section != section {
                continue;
            }
            if let Some(sub) = &e.key.subsection {
                let name = sub.to_str_lossy().to_string();
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }
}
