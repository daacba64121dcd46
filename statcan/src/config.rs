//! Runtime configuration from the environment.
//!
//! | Variable               | Default              | Meaning                          |
//! |------------------------|----------------------|----------------------------------|
//! | `STATCAN_CACHE_DIR`    | `$HOME/.<dotpath>`   | Root of the on-disk repo         |
//! | `STATCAN_DOTPATH`      | `canadadata`         | Dot directory under `$HOME`      |
//! | `STATCAN_TIMEOUT_SECS` | `60`                 | Fetch timeout                    |
//! | `STATCAN_WORKERS`      | `8`                  | Concurrent liveness probes       |
//!
//! A `.env` file in the working directory is loaded first.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_DOTPATH: &str = "canadadata";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Explicit repo root; falls back to `$HOME/<dotpath>`.
    pub cache_dir: Option<PathBuf>,
    /// Always starts with `.`
    pub dotpath: String,
    pub timeout: Duration,
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            dotpath: format!(".{}", DEFAULT_DOTPATH),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let dotpath = match lookup("STATCAN_DOTPATH") {
            Some(p) if p.starts_with('.') => p,
            Some(p) => format!(".{}", p),
            None => defaults.dotpath,
        };

        let timeout = match lookup("STATCAN_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("STATCAN_TIMEOUT_SECS", &v)?),
            None => defaults.timeout,
        };

        let workers = match lookup("STATCAN_WORKERS") {
            Some(v) => match parse_number::<usize>("STATCAN_WORKERS", &v)? {
                0 => return Err(invalid("STATCAN_WORKERS", &v)),
                n => n,
            },
            None => defaults.workers,
        };

        Ok(Self {
            cache_dir: lookup("STATCAN_CACHE_DIR").filter(|d| !d.is_empty()).map(PathBuf::from),
            dotpath,
            timeout,
            workers,
        })
    }

    /// Directory under which the repo is created.
    pub fn repo_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(PathBuf::from(home).join(&self.dotpath))
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dotpath, ".canadadata");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("STATCAN_CACHE_DIR", "/tmp/statcan"),
            ("STATCAN_DOTPATH", "repo_test"),
            ("STATCAN_TIMEOUT_SECS", "5"),
            ("STATCAN_WORKERS", "2"),
        ])
        .unwrap();

        assert_eq!(config.dotpath, ".repo_test");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.workers, 2);
        assert_eq!(config.repo_root().unwrap(), PathBuf::from("/tmp/statcan"));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            config(&[("STATCAN_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(config(&[("STATCAN_WORKERS", "0")]).is_err());
    }
}
