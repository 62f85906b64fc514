//! Configuration structures for the sidecar.
//!
//! Values resolve in order: defaults, JSON config file, environment
//! (`MLX_*` variables), then command-line flags applied by the binary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CAPACITY;
use crate::error::{ReciboError, Result};
use recibo_inference::CommandSpec;

/// Smallest token budget a request may ask for.
pub const MIN_MAX_TOKENS: u32 = 64;

/// Largest token budget a request may ask for.
pub const MAX_MAX_TOKENS: u32 = 4096;

/// Main configuration for recibo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReciboConfig {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Vision model configuration.
    pub model: ModelConfig,

    /// Result cache configuration.
    pub cache: CacheConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes (base64 images are large).
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            cors_origins: vec![
                "http://localhost:3001".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3001".to_string(),
            ],
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Vision model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier passed to the runtime.
    pub model_id: String,

    /// Program hosting the model.
    pub program: String,

    /// Argument template; see [`CommandSpec::args`].
    pub args: Vec<String>,

    /// Load check run once at startup; see [`CommandSpec::load_args`].
    pub load_args: Vec<String>,

    /// Token budget when a request does not specify one.
    pub default_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: "mlx-community/Qwen3-VL-8B-Instruct-4bit".to_string(),
            program: "python3".to_string(),
            args: [
                "-m",
                "mlx_vlm.generate",
                "--model",
                "{model}",
                "--max-tokens",
                "{max_tokens}",
                "--temperature",
                "0.0",
                "--prompt",
                "{prompt}",
                "--image",
                "{image}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            load_args: vec![
                "-c".to_string(),
                "from mlx_vlm import load; load('{model}')".to_string(),
            ],
            default_max_tokens: 1024,
        }
    }
}

impl ModelConfig {
    /// Launch description for the command backend.
    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            model_id: self.model_id.clone(),
            program: self.program.clone(),
            args: self.args.clone(),
            load_args: self.load_args.clone(),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached extractions.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ReciboConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Apply `MLX_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply `MLX_*` overrides from an arbitrary variable source.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("MLX_MODEL") {
            self.model.model_id = model;
        }
        if let Some(command) = lookup("MLX_COMMAND") {
            self.model.program = command;
        }
        if let Some(host) = lookup("MLX_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MLX_PORT") {
            self.server.port = parse_var("MLX_PORT", &port)?;
        }
        if let Some(tokens) = lookup("MLX_MAX_TOKENS") {
            self.model.default_max_tokens = parse_var("MLX_MAX_TOKENS", &tokens)?;
        }
        if let Some(size) = lookup("MLX_CACHE_SIZE") {
            self.cache.capacity = parse_var("MLX_CACHE_SIZE", &size)?;
        }
        Ok(())
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(ReciboError::Config("cache capacity must be at least 1".into()));
        }
        if self.server.port == 0 {
            return Err(ReciboError::Config("port must be non-zero".into()));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.model.default_max_tokens) {
            return Err(ReciboError::Config(format!(
                "default max tokens must be within [{}, {}], got {}",
                MIN_MAX_TOKENS, MAX_MAX_TOKENS, self.model.default_max_tokens
            )));
        }
        if self.model.program.trim().is_empty() {
            return Err(ReciboError::Config("model program is empty".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ReciboError::Config(format!("{} is not a valid number: {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReciboConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.model.default_max_tokens, 1024);
        assert_eq!(config.cache.capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ReciboConfig::default();
        config
            .apply_vars(vars(&[
                ("MLX_MODEL", "org/other-vl"),
                ("MLX_PORT", "9000"),
                ("MLX_MAX_TOKENS", "512"),
                ("MLX_CACHE_SIZE", "16"),
            ]))
            .unwrap();

        assert_eq!(config.model.model_id, "org/other-vl");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.default_max_tokens, 512);
        assert_eq!(config.cache.capacity, 16);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = ReciboConfig::default();
        let err = config.apply_vars(vars(&[("MLX_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ReciboError::Config(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = ReciboConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ReciboConfig::default();
        config.model.default_max_tokens = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recibo.json");
        std::fs::write(&path, r#"{"cache": {"capacity": 8}}"#).unwrap();

        let config = ReciboConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.server, ServerConfig::default());

        config.save(&path).unwrap();
        assert_eq!(ReciboConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_command_spec() {
        let spec = ModelConfig::default().command_spec();
        assert_eq!(spec.program, "python3");
        assert!(spec.args.contains(&"{image}".to_string()));
        assert!(spec.load_args.iter().any(|a| a.contains("{model}")));
    }
}
