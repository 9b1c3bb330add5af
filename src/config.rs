//! TOML configuration loading (spec.md §6). The original `config.py`
//! read an INI file with `[server]`/`[db]`/`[mpd]`/`[logging]` sections;
//! this redesigns the format to TOML (see SPEC_FULL.md's Open Questions)
//! while keeping the same sections and keys, deserialized with `serde`
//! the way the teacher's own config-adjacent structs do.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub mpd: MpdConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub name: String,
    pub id: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3689
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpdConfig {
    pub host: String,
    #[serde(default = "default_mpd_port")]
    pub port: u16,
}

fn default_mpd_port() -> u16 {
    6600
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// When set, logs are appended to this file instead of stdout. The
    /// verbosity directive itself still comes from `RUST_LOG`, matching
    /// the teacher's `EnvFilter::from_env` in `setup_tracing`.
    pub filename: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn mpd_addr(&self) -> String {
        format!("{}:{}", self.mpd.host, self.mpd.port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "euphonic")
            .map(|dirs| dirs.config_dir().join("euphonic.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [server]
            name = "My Library"
            id = "0000000000000001"

            [mpd]
            host = "127.0.0.1"

            [db]
            path = "/var/lib/euphonic/db.sqlite"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 3689);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.mpd.port, 6600);
        assert!(config.logging.filename.is_none());
        assert_eq!(config.mpd_addr(), "127.0.0.1:6600");
    }
}
