use std::path::{Path, PathBuf};
use std::time::Duration;

use ambience_core::{Limits, Result};
use ambience_engine::{EngineConfig, PausePolicy};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "ambience.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Directory shared by every process using the file store.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            dir: PathBuf::from("ambience-store"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    #[default]
    Headless,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub kind: SurfaceKind,
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            kind: SurfaceKind::Headless,
            width: 80,
            height: 24,
        }
    }
}

/// Contents of `ambience.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Main loop period.
    pub tick_ms: u64,
    pub pause_policy: PausePolicy,
    pub min_cadence_ms: u64,
    pub max_particles_per_layer: usize,
    pub seed: Option<u64>,
    /// TOML descriptor tables replacing the built-in catalogs.
    pub effects_catalog: Option<PathBuf>,
    pub backgrounds_catalog: Option<PathBuf>,
    pub store: StoreConfig,
    pub surface: SurfaceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            tick_ms: 33,
            pause_policy: PausePolicy::default(),
            min_cadence_ms: limits.min_cadence.as_millis() as u64,
            max_particles_per_layer: limits.max_particles_per_layer,
            seed: None,
            effects_catalog: None,
            backgrounds_catalog: None,
            store: StoreConfig::default(),
            surface: SurfaceConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads `path`, or `ambience.toml` in the working directory when it exists.
    /// No file at all means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let source = std::fs::read_to_string(&path).map_err(|err| {
            ambience_core::EngineError::Config(format!("reading {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            limits: Limits {
                min_cadence: Duration::from_millis(self.min_cadence_ms.max(1)),
                max_particles_per_layer: self.max_particles_per_layer,
            },
            pause_policy: self.pause_policy,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.tick(), Duration::from_millis(33));
        assert_eq!(config.engine_config().limits, Limits::default());
        assert_eq!(config.engine_config().pause_policy, PausePolicy::Suspend);
    }

    #[test]
    fn parses_every_section() {
        let config = AppConfig::from_toml_str(
            r#"
            tick_ms = 16
            pause_policy = "hide"
            min_cadence_ms = 60
            max_particles_per_layer = 100
            seed = 42

            [store]
            kind = "file"
            dir = "/tmp/ambience"

            [surface]
            kind = "terminal"
            width = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.pause_policy, PausePolicy::Hide);
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.surface.kind, SurfaceKind::Terminal);
        assert_eq!(config.surface.width, 120);
        assert_eq!(config.surface.height, 24);
        let engine = config.engine_config();
        assert_eq!(engine.limits.min_cadence, Duration::from_millis(60));
        assert_eq!(engine.limits.max_particles_per_layer, 100);
        assert_eq!(engine.seed, Some(42));
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        assert!(matches!(
            AppConfig::from_toml_str("pause_policy = \"freeze\""),
            Err(ambience_core::EngineError::Config(_))
        ));
    }
}
