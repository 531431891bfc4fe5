//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level slipstream configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Network/transport settings.
    pub network: NetworkConfig,
    /// Snapshot/delta cadence settings.
    pub sync: SyncConfig,
    /// Spatial index settings.
    pub spatial: SpatialConfig,
    /// Client-side motion smoothing settings.
    pub smoothing: SmoothingConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network and transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server address.
    pub server_address: String,
    /// Server port.
    pub server_port: u16,
    /// Session idle timeout in seconds.
    pub timeout_seconds: u32,
    /// Maximum concurrent connections (server only).
    pub max_connections: usize,
    /// Simulation and broadcast tick rate (Hz).
    pub tick_rate: u32,
    /// Maximum frame payload size in bytes.
    pub max_payload_size: u32,
}

/// Snapshot/delta broadcast cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Ticks between unconditional full snapshots. Deltas are sent on the
    /// ticks in between. The periodic full snapshot bounds how long a
    /// desynchronized client stays wrong even if its resync request is
    /// lost.
    pub full_snapshot_interval: u32,
}

/// Spatial index configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpatialConfig {
    /// Grid cell size in world units.
    pub cell_size: f64,
}

/// Client-side motion smoothing tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Exponential position convergence rate, per second.
    pub position_rate: f64,
    /// Exponential heading convergence rate, per second.
    pub heading_rate: f64,
    /// Speed at which momentum heading is fully trusted.
    pub full_trust_speed: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every received delta's entity counts (very noisy).
    pub trace_deltas: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7654,
            timeout_seconds: 30,
            max_connections: 64,
            tick_rate: 20,
            max_payload_size: 1_048_576,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_snapshot_interval: 60,
        }
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self { cell_size: 10.0 }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            position_rate: 12.0,
            heading_rate: 10.0,
            full_trust_speed: 30.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            trace_deltas: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("server_port: 7654"));
        assert!(ron_str.contains("cell_size: 10.0"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        // Config missing the `smoothing` section entirely.
        let ron_str = "(network: (), sync: (), spatial: (), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.smoothing, SmoothingConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.server_address = "10.0.0.1".to_string();
        config.sync.full_snapshot_interval = 120;
        config.spatial.cell_size = 4.0;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.network.tick_rate = 30;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().network.tick_rate, 30);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
