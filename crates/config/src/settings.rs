// Runtime settings
// Loaded from ~/.config/protolua/settings.toml

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Script execution limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Lua instructions allowed per evaluation
    pub instruction_limit: i64,

    /// Instructions between limit checks
    pub hook_interval: u32,

    /// Wall-clock limit per evaluation
    pub timeout_secs: u64,

    /// Lua heap cap; None = unbounded
    pub memory_limit_bytes: Option<usize>,

    /// Captured print() lines before truncation
    pub max_output_lines: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            instruction_limit: 100_000_000,
            hook_interval: 10_000,
            timeout_secs: 30,
            memory_limit_bytes: None,
            max_output_lines: 5_000,
        }
    }
}

/// Schema sources and map-enumeration resources.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtoSettings {
    /// Serialized FileDescriptorSet files loaded into the registry.
    /// Relative paths are relative to the settings file.
    pub descriptor_sets: Vec<PathBuf>,

    /// Bytes reserved per enumeration producer (also its stack size)
    pub producer_overhead_bytes: u64,

    /// Cap on bytes reserved by concurrent enumerations; None = uncapped
    pub enumeration_budget_bytes: Option<u64>,
}

impl Default for ProtoSettings {
    fn default() -> Self {
        Self {
            descriptor_sets: Vec::new(),
            producer_overhead_bytes: 256 * 1024,
            enumeration_budget_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub proto: ProtoSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("protolua");
        config_dir.join("settings.toml")
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`. A missing file yields defaults; relative
    /// descriptor set paths are resolved against the file's directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        let mut settings = Self::from_toml(&contents)?;
        if let Some(base) = path.parent() {
            for set in &mut settings.proto.descriptor_sets {
                if set.is_relative() {
                    *set = base.join(&*set);
                }
            }
        }
        Ok(settings)
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.instruction_limit <= 0 {
            return Err(ConfigError::Validation(format!(
                "runtime.instruction_limit must be positive, got {}",
                self.runtime.instruction_limit
            )));
        }
        if self.runtime.hook_interval == 0 {
            return Err(ConfigError::Validation(
                "runtime.hook_interval must be at least 1".into(),
            ));
        }
        if self.runtime.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "runtime.timeout_secs must be at least 1".into(),
            ));
        }
        if self.proto.producer_overhead_bytes == 0 {
            return Err(ConfigError::Validation(
                "proto.producer_overhead_bytes must be positive".into(),
            ));
        }
        if let Some(budget) = self.proto.enumeration_budget_bytes {
            if budget < self.proto.producer_overhead_bytes {
                return Err(ConfigError::Validation(format!(
                    "proto.enumeration_budget_bytes ({budget}) cannot fit a single enumeration ({} bytes)",
                    self.proto.producer_overhead_bytes
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
