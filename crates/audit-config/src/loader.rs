use std::path::{Path, PathBuf};

use audit_core::ScannerConfig;
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::{env, format, validation};

/// Where the effective scanner config came from, mirroring the reference
/// loader's `ScannerConfigSource` for diagnostics/logging at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    File(PathBuf),
}

const DEFAULT_CANDIDATES: &[&str] = &["audit.conf", "config/audit.conf"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolution order, per SPEC_FULL.md §6: `$AUDIT_CONFIG_PATH`, then the
    /// first default candidate path that exists, then built-in defaults.
    /// Environment-variable field overrides apply on top of whichever of
    /// those was found.
    pub fn load_from_env() -> Result<(ScannerConfig, ConfigSource)> {
        if let Ok(path_str) = std::env::var("AUDIT_CONFIG_PATH") {
            if !path_str.trim().is_empty() {
                let path = PathBuf::from(path_str);
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, ConfigSource::EnvPath(path)));
            }
        }

        if let Some(path) = Self::find_default_file() {
            let cfg = Self::load_from_file(&path)?;
            return Ok((cfg, ConfigSource::File(path)));
        }

        let defaults = serde_json::to_value(ScannerConfig::default())
            .expect("ScannerConfig always serializes");
        let mut map = defaults.as_object().cloned().unwrap_or_default();
        env::apply_overlay(&mut map);
        Ok((Self::finish(map)?, ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> Result<ScannerConfig> {
        let contents = std::fs::read_to_string(path)?;
        let mut map = format::parse(&contents)?;
        env::apply_overlay(&mut map);
        Self::finish(map)
    }

    fn finish(map: Map<String, Value>) -> Result<ScannerConfig> {
        let cfg: ScannerConfig = serde_json::from_value(Value::Object(map))
            .map_err(|e| ConfigError::Parse { line: 0, message: e.to_string() })?;
        validation::validate(&cfg)?;
        Ok(cfg)
    }

    fn find_default_file() -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }
}

/// Writes a parsed config map back to the persisted file in the canonical
/// `key=value` form. Used directly by `FileConfigStore` and available for a
/// daemon-side "dump effective config" command.
pub fn write_to_file(path: &Path, config: &Map<String, Value>) -> Result<()> {
    std::fs::write(path, format::render(config))?;
    Ok(())
}

/// [`audit_core::config_sync::ConfigStore`] implementation backing the
/// Config Sync component's "persist new config to local store" step
/// (SPEC_FULL.md §4.G) with the same local file `load_from_env` reads at
/// startup, so a restart picks up the last config a remote apply wrote.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl audit_core::config_sync::ConfigStore for FileConfigStore {
    fn persist(&self, config: &Map<String, Value>) -> audit_core::Result<()> {
        std::fs::write(&self.path, format::render(config)).map_err(audit_core::AuditError::Io)
    }
}
