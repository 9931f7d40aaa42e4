use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OpsError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub remote: RemoteConfig,
    pub policy: PolicyConfig,
    pub memory: MemoryConfig,
    pub storage: StorageConfig,
    pub turn: TurnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    pub router_temperature: f32,
    pub summary_temperature: f32,
    pub format_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5-coder:0.5b".to_string(),
            timeout_ms: 60_000,
            router_temperature: 0.0,
            summary_temperature: 0.2,
            format_temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub workspace_root: String,
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    pub max_output_bytes: usize,
    pub control_dir: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: "server".to_string(),
            key_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ssh")
                .join("id_ed25519"),
            workspace_root: "/home/server/ops_workspace".to_string(),
            pool_size: 2,
            connect_timeout_ms: 15_000,
            command_timeout_ms: 30_000,
            acquire_timeout_ms: 45_000,
            max_output_bytes: 16_384,
            control_dir: std::env::temp_dir().join("opsgate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub forbidden_paths: Vec<String>,
    pub destructive_terms: Vec<String>,
    pub disabled_tools: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            forbidden_paths: [
                ".ssh",
                ".gnupg",
                ".aws",
                ".env",
                "id_rsa",
                "id_ed25519",
                "authorized_keys",
                "known_hosts",
                "shadow",
                "passwd",
                "sudoers",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            destructive_terms: [
                "delete",
                "remove",
                "rm",
                "drop",
                "wipe",
                "format",
                "stop",
                "restart",
                "reboot",
                "shutdown",
                "kill",
                "pkill",
                "purge",
                "uninstall",
                "truncate",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            disabled_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub summarize_threshold: usize,
    pub keep_recent: usize,
    pub summary_input_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: 20,
            keep_recent: 10,
            summary_input_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("opsgate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub turn_timeout_ms: u64,
    pub stream_words_per_chunk: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_timeout_ms: 120_000,
            stream_words_per_chunk: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            remote: RemoteConfig::default(),
            policy: PolicyConfig::default(),
            memory: MemoryConfig::default(),
            storage: StorageConfig::default(),
            turn: TurnConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| OpsError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e)))?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse a YAML document; missing sections fall back to defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| OpsError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `OPSGATE_*` overrides from the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OPSGATE_SSH_HOST") {
            self.remote.host = host;
        }
        if let Some(port) = lookup("OPSGATE_SSH_PORT") {
            self.remote.port = port
                .parse()
                .map_err(|_| OpsError::Config(format!("OPSGATE_SSH_PORT is not a port: {}", port)))?;
        }
        if let Some(user) = lookup("OPSGATE_SSH_USER") {
            self.remote.user = user;
        }
        if let Some(key) = lookup("OPSGATE_SSH_KEY_PATH") {
            self.remote.key_path = PathBuf::from(key);
        }
        if let Some(root) = lookup("OPSGATE_WORKSPACE_ROOT") {
            self.remote.workspace_root = root;
        }
        if let Some(url) = lookup("OPSGATE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OPSGATE_LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Reject settings that would weaken containment or deadlock the pool
    pub fn validate(&self) -> Result<()> {
        let root = self.remote.workspace_root.trim_end_matches('/');
        if !self.remote.workspace_root.starts_with('/') {
            return Err(OpsError::Config(format!(
                "workspace_root must be absolute: {}",
                self.remote.workspace_root
            )));
        }
        if root.is_empty() {
            return Err(OpsError::Config("workspace_root cannot be /".to_string()));
        }
        if root.split('/').any(|seg| seg == ".." || seg == ".") {
            return Err(OpsError::Config(format!(
                "workspace_root must be normalized: {}",
                self.remote.workspace_root
            )));
        }
        if self.remote.pool_size == 0 {
            return Err(OpsError::Config("remote.pool_size must be at least 1".to_string()));
        }
        if self.memory.keep_recent > self.memory.summarize_threshold {
            return Err(OpsError::Config(
                "memory.keep_recent cannot exceed memory.summarize_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.remote.workspace_root, "/home/server/ops_workspace");
        assert_eq!(config.memory.summarize_threshold, 20);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
remote:
  host: 192.168.10.56
  pool_size: 3
memory:
  summarize_threshold: 8
  keep_recent: 4
"#,
        )
        .unwrap();
        assert_eq!(config.remote.host, "192.168.10.56");
        assert_eq!(config.remote.pool_size, 3);
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.memory.summarize_threshold, 8);
        assert_eq!(config.llm.timeout_ms, 60_000);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("remote: [not, a, map").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPSGATE_SSH_HOST", "10.0.0.5"),
            ("OPSGATE_SSH_PORT", "2222"),
            ("OPSGATE_WORKSPACE_ROOT", "/srv/ops"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.remote.host, "10.0.0.5");
        assert_eq!(config.remote.port, 2222);
        assert_eq!(config.remote.workspace_root, "/srv/ops");
    }

    #[test]
    fn test_env_override_bad_port() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| (key == "OPSGATE_SSH_PORT").then(|| "ssh".to_string()));
        assert!(matches!(result, Err(OpsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_weak_roots() {
        let mut config = Config::default();
        config.remote.workspace_root = "ops_workspace".to_string();
        assert!(config.validate().is_err());

        config.remote.workspace_root = "/".to_string();
        assert!(config.validate().is_err());

        config.remote.workspace_root = "/home/../etc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = Config::default();
        config.remote.pool_size = 0;
        assert!(config.validate().is_err());
    }
}
