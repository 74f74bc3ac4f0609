use anyhow::Context;
use serde::Deserialize;

/// Default listen address when neither `LISTEN` nor a config file sets one.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the origin listens on (e.g. "127.0.0.1:4001")
    pub listen_addr: String,

    /// Bytes pulled from a socket per read call
    pub read_buffer_size: usize,

    /// Path prefix whose remainder is echoed back as the response body
    pub echo_prefix: String,

    /// Readiness events handled per poll
    pub max_events: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            read_buffer_size: 4096,
            echo_prefix: "/echo".to_string(),
            max_events: 1024,
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// `FAULTLINE_CONFIG` may point at a YAML file; `LISTEN` always wins for
    /// the listen address.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("FAULTLINE_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_yaml_str(&raw)
                    .with_context(|| format!("Invalid config file {}", path))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    /// Parses a YAML document; missing keys keep their defaults.
    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let cfg: Config = serde_yaml::from_str(raw).context("Failed to parse YAML config")?;

        if cfg.read_buffer_size == 0 {
            anyhow::bail!("read_buffer_size must be greater than zero");
        }
        if cfg.max_events == 0 {
            anyhow::bail!("max_events must be greater than zero");
        }

        Ok(cfg)
    }
}
