use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use serde::Deserialize;

use crate::http::parser::{
    DEFAULT_INITIAL_BUFFER_SIZE, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_HEAD_SIZE, ParseLimits,
};

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "HTTPWIRE_CONFIG";

/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub initial_buffer_size: usize,
    pub max_head_size: usize,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Base URL that `/httpbin/<path>` requests are forwarded to.
    pub upstream_url: String,
    /// File served on `/video`.
    pub video_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:42069".to_string(),
            initial_buffer_size: DEFAULT_INITIAL_BUFFER_SIZE,
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            upstream_url: "https://httpbin.org/".to_string(),
            video_path: PathBuf::from("assets/vim.mp4"),
        }
    }
}

impl ServerConfig {
    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            initial_buffer_size: self.initial_buffer_size,
            max_head_size: self.max_head_size,
            max_body_size: self.max_body_size,
        }
    }
}

impl Config {
    /// Loads the file named by `HTTPWIRE_CONFIG` (or defaults when unset),
    /// then applies the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = listen_addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.server.initial_buffer_size > 0,
            "server.initial_buffer_size must be greater than zero"
        );
        ensure!(
            self.server.max_head_size > 0,
            "server.max_head_size must be greater than zero"
        );
        ensure!(
            !self.server.listen_addr.is_empty(),
            "server.listen_addr must not be empty"
        );
        url::Url::parse(&self.demo.upstream_url).with_context(|| {
            format!("demo.upstream_url {:?} is not a valid URL", self.demo.upstream_url)
        })?;
        Ok(())
    }
}
