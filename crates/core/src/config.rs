//! TOML-based configuration for texmerge.
//!
//! Every section has defaults, so an absent or partial `texmerge.toml` is
//! valid. The author name may come from an environment variable named by
//! `repository.author_env`, resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "texmerge.toml";

pub use crate::db::DATABASE_FILE;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where repository state is stored.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Branch and authorship defaults.
    #[serde(default)]
    pub repository: RepositoryConfig,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".texmerge")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Branch created by `init` and used when a command names none.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Author recorded on commits and merge-request actions.
    #[serde(default = "default_author")]
    pub author: String,

    /// Environment variable that overrides `author` when set.
    #[serde(default)]
    pub author_env: Option<String>,
}

fn default_branch() -> String {
    "main".into()
}

fn default_author() -> String {
    "anonymous".into()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            author: default_author(),
            author_env: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading, resolution, and validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file on disk.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Replace `repository.author` with the value of `repository.author_env`
    /// when that variable is set and non-empty.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.repository.author_env {
            match resolve_optional_env(env_name, "repository.author_env") {
                Some(author) => self.repository.author = author,
                None if self.repository.author.trim().is_empty() => {
                    return Err(ConfigError::EnvVarMissing {
                        var: env_name.clone(),
                        field: "repository.author_env".into(),
                    });
                }
                None => {}
            }
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.default_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.default_branch".into(),
                detail: "default branch must not be empty".into(),
            });
        }
        if self.repository.author.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.author".into(),
                detail: "author must not be empty".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!(
                    "unknown level '{}', expected one of: {}",
                    self.log.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load_and_resolve`](Self::load_and_resolve), but a missing file
    /// yields the (resolved and validated) defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_and_resolve(path);
        }
        debug!(path = %path.display(), "no configuration file, using defaults");
        let mut config = Self::default();
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.store.data_dir.join(DATABASE_FILE)
    }

    /// A commented starter configuration with every default spelled out.
    pub fn template() -> String {
        let defaults = Self::default();
        format!(
            r#"# texmerge configuration

[store]
# Directory holding {db}
data_dir = "{data_dir}"

[log]
# trace, debug, info, warn or error; RUST_LOG takes precedence
level = "{level}"

[repository]
default_branch = "{branch}"
author = "{author}"
# author_env = "TEXMERGE_AUTHOR"
"#,
            db = DATABASE_FILE,
            data_dir = defaults.store.data_dir.display(),
            level = defaults.log.level,
            branch = defaults.repository.default_branch,
            author = defaults.repository.author,
        )
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[store]
data_dir = "/tmp/texmerge"

[log]
level = "debug"

[repository]
default_branch = "trunk"
author = "alice"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/texmerge"));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.repository.default_branch, "trunk");
        assert_eq!(config.repository.author, "alice");
        assert!(config.repository.author_env.is_none());
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/texmerge").join("texmerge.db")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.data_dir, PathBuf::from(".texmerge"));
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.repository.default_branch, "main");
        assert_eq!(config.repository.author, "anonymous");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texmerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load_from_file("/nonexistent/texmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("texmerge.toml")).unwrap();
        assert_eq!(config.repository.default_branch, "main");
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texmerge.toml");
        std::fs::write(&path, "[log\nlevel = ").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.repository.default_branch = " ".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.repository.author = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log.level = "verbose".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log.level"));

        let mut config = AppConfig::default();
        config.log.level = "INFO".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_author_env_overrides_author() {
        let var = "TEXMERGE_TEST_AUTHOR_OVERRIDE";
        std::env::set_var(var, "carol");
        let mut config = AppConfig::default();
        config.repository.author_env = Some(var.into());
        config.resolve_env_vars().unwrap();
        assert_eq!(config.repository.author, "carol");
        std::env::remove_var(var);
    }

    #[test]
    fn test_author_env_unset_keeps_author() {
        let mut config = AppConfig::default();
        config.repository.author_env = Some("TEXMERGE_TEST_AUTHOR_UNSET".into());
        config.resolve_env_vars().unwrap();
        assert_eq!(config.repository.author, "anonymous");
    }

    #[test]
    fn test_author_env_unset_without_fallback() {
        let mut config = AppConfig::default();
        config.repository.author = String::new();
        config.repository.author_env = Some("TEXMERGE_TEST_AUTHOR_MISSING".into());
        assert!(matches!(
            config.resolve_env_vars(),
            Err(ConfigError::EnvVarMissing { .. })
        ));
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: AppConfig = toml::from_str(&AppConfig::template()).unwrap();
        assert_eq!(config.store.data_dir, PathBuf::from(".texmerge"));
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.repository.author, "anonymous");
    }
}
