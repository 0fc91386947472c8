//! The `~/.homeclaw/.env` credential file.
//!
//! `KEY=value` lines holding provider and platform API keys. Values are
//! never logged and never printed by `Debug`. Lookups fall back to the
//! process environment so keys exported in the shell also work.

use std::collections::BTreeMap;
use std::path::Path;
use crate::ConfigError;

#[derive(Clone, Default)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Read the credential file; a missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No credential file");
            return Ok(Self::default());
        }

        let iter = dotenvy::from_path_iter(path).map_err(|_| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: "credential file could not be read".into(),
        })?;

        let mut values = BTreeMap::new();
        for item in iter {
            // The dotenvy error can echo the offending line, so only the
            // path is reported.
            let (key, value) = item.map_err(|_| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: "malformed line in credential file".into(),
            })?;
            values.insert(key, value);
        }

        tracing::debug!(path = %path.display(), count = values.len(), "Loaded credentials");
        Ok(Self { values })
    }

    /// Build from explicit pairs (tests and embedding).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// File value first, then the process environment. Blank values count
    /// as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let present = |v: &String| !v.trim().is_empty();
        self.values
            .get(key)
            .filter(|v| present(*v))
            .cloned()
            .or_else(|| std::env::var(key).ok().filter(present))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key=value` in the file at `path`, updating an existing line in
    /// place and leaving every other line untouched.
    pub fn set(path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let existing = if path.exists() {
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            String::new()
        };

        let mut replaced = false;
        let mut lines: Vec<String> = existing
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
                match trimmed.split_once('=') {
                    Some((k, _)) if k.trim() == key && !replaced => {
                        replaced = true;
                        format!("{key}={value}")
                    }
                    _ => line.to_string(),
                }
            })
            .collect();

        if !replaced {
            lines.push(format!("{key}={value}"));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, lines.join("\n") + "\n").map_err(write_err)?;
        restrict_permissions(path).map_err(write_err)?;

        tracing::info!(path = %path.display(), key = %key, "Credential stored");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let creds = Credentials::load(Path::new("/nonexistent/.env")).unwrap();
        assert!(creds.values.is_empty());
    }

    #[test]
    fn set_appends_then_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# keys\nOPENAI_API_KEY=old\nTAVILY_API_KEY=tv-1\n").unwrap();

        Credentials::set(&path, "OPENAI_API_KEY", "sk-new").unwrap();
        Credentials::set(&path, "TELEGRAM_BOT_TOKEN", "123:abc").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# keys\nOPENAI_API_KEY=sk-new\nTAVILY_API_KEY=tv-1\nTELEGRAM_BOT_TOKEN=123:abc\n"
        );

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.get("OPENAI_API_KEY").as_deref(), Some("sk-new"));
        assert_eq!(creds.get("TELEGRAM_BOT_TOKEN").as_deref(), Some("123:abc"));
    }

    #[cfg(unix)]
    #[test]
    fn credential_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        Credentials::set(&path, "K", "v").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn blank_values_are_absent() {
        let creds = Credentials::from_pairs([("HOMECLAW_TEST_BLANK_KEY", "  ")]);
        assert!(!creds.contains("HOMECLAW_TEST_BLANK_KEY"));
    }

    #[test]
    fn falls_back_to_environment() {
        // PATH is set in every test environment.
        let creds = Credentials::default();
        assert!(creds.get("PATH").is_some());
    }

    #[test]
    fn blank_file_value_does_not_hide_environment() {
        let creds = Credentials::from_pairs([("PATH", "")]);
        assert_eq!(creds.get("PATH"), std::env::var("PATH").ok());
        assert!(creds.contains("PATH"));
    }

    #[test]
    fn debug_hides_values() {
        let creds = Credentials::from_pairs([("OPENAI_API_KEY", "sk-secret-value")]);
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("OPENAI_API_KEY"));
        assert!(!dbg.contains("sk-secret-value"));
    }
}
