//! Configuration for the plugin.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Endpoint;

pub const DRIVER_NAME: &str = "localvol.csi.dev";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_ENDPOINT: &str = "tcp://0.0.0.0:9860";

/// Longest plugin name the CSI spec allows.
const NAME_LEN_MAX: usize = 63;

/// Plugin configuration.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Plugin name reported by GetPluginInfo, in domain-name notation.
    pub name: String,
    /// Vendor version reported by GetPluginInfo.
    pub version: String,
    /// Where the gRPC server listens.
    pub endpoint: Endpoint,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            version: DRIVER_VERSION.to_string(),
            endpoint: Endpoint::Tcp(([0, 0, 0, 0], 9860).into()),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.name)?;
        if self.version.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "version",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// CSI plugin names are at most 63 characters of alphanumerics, `-` and `.`,
/// beginning and ending with an alphanumeric.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidValue {
        field: "name",
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > NAME_LEN_MAX {
        return Err(invalid("must be 63 characters or less"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid("may only contain alphanumerics, '-' and '.'"));
    }
    let alnum_edges = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !alnum_edges {
        return Err(invalid("must begin and end with an alphanumeric"));
    }
    Ok(())
}
