//! Host configuration: `.toolhost/config.toml` plus environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Directory (relative to the working directory) holding `config.toml`.
pub const CONFIG_DIR: &str = ".toolhost";

pub const ENV_WORKDIR: &str = "TOOLHOST_WORKDIR";
pub const ENV_DOWNLOAD_DIR: &str = "TOOLHOST_DOWNLOAD_DIR";

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct HostConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub net: NetConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecConfig {
    /// Timeout for `run_command` when the caller gives none
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Upper bound for caller-supplied timeouts
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// Per-stream capture limit for synchronous commands
    #[serde(default = "default_output_bytes")]
    pub max_output_bytes: usize,
    /// Sliding output window kept per background session
    #[serde(default = "default_output_bytes")]
    pub session_buffer_bytes: usize,
}

fn default_command_timeout_ms() -> u64 {
    60_000
}
fn default_max_timeout_ms() -> u64 {
    600_000
}
fn default_output_bytes() -> usize {
    1024 * 1024
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_output_bytes: default_output_bytes(),
            session_buffer_bytes: default_output_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetConfig {
    /// Whole-request timeout for outbound HTTP (`download_file`)
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    120_000
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct PathsConfig {
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

/// Load configuration from `<config_dir>/config.toml`, falling back to
/// defaults when the file is missing or broken.
pub fn load_config(config_dir: &Path) -> HostConfig {
    let config_path = config_dir.join("config.toml");
    if !config_path.exists() {
        return HostConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse config.toml: {}", e);
            HostConfig::default()
        }),
        Err(e) => {
            tracing::warn!("Failed to read config.toml: {}", e);
            HostConfig::default()
        }
    }
}

impl HostConfig {
    /// Build the startup configuration: the workdir comes from
    /// `TOOLHOST_WORKDIR` or the process cwd, its `.toolhost/config.toml` is
    /// read, and environment overrides win over the file.
    pub fn from_environment() -> Result<Self> {
        let workdir = match std::env::var_os(ENV_WORKDIR) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };

        let mut config = load_config(&workdir.join(CONFIG_DIR));
        config.apply_env_overrides(|key| std::env::var(key).ok());
        if config.paths.workdir.is_none() {
            config.paths.workdir = Some(workdir);
        }
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORKDIR).filter(|v| !v.is_empty()) {
            self.paths.workdir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR).filter(|v| !v.is_empty()) {
            self.paths.download_dir = Some(PathBuf::from(dir));
        }
    }

    /// Initial working directory for tool handlers.
    pub fn workdir(&self) -> PathBuf {
        self.paths
            .workdir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Where `download_file` stores files.
    pub fn download_dir(&self) -> PathBuf {
        self.paths
            .download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| self.workdir().join("downloads"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.exec.command_timeout_ms, 60_000);
        assert_eq!(config.exec.max_output_bytes, 1024 * 1024);
        assert!(config.paths.workdir.is_none());
        assert_eq!(config.net.http_timeout_ms, 120_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[exec]\ncommand_timeout_ms = 1500\n\n[paths]\ndownload_dir = \"/tmp/dl\"\n\n[net]\nhttp_timeout_ms = 5000\n",
        )
        .unwrap();

        let config = load_config(temp.path());
        assert_eq!(config.exec.command_timeout_ms, 1500);
        assert_eq!(config.exec.max_timeout_ms, 600_000);
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/dl"));
        assert_eq!(config.net.http_timeout_ms, 5000);
    }

    #[test]
    fn test_broken_toml_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[exec\nnope").unwrap();
        let config = load_config(temp.path());
        assert_eq!(config.exec.command_timeout_ms, 60_000);
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = HostConfig::default();
        config.paths.download_dir = Some(PathBuf::from("/from/file"));

        let env: HashMap<&str, &str> = [
            (ENV_WORKDIR, "/work"),
            (ENV_DOWNLOAD_DIR, "/downloads"),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.workdir(), PathBuf::from("/work"));
        assert_eq!(config.download_dir(), PathBuf::from("/downloads"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = HostConfig::default();
        config.paths.workdir = Some(PathBuf::from("/kept"));
        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config.workdir(), PathBuf::from("/kept"));
    }
}
