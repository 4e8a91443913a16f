//! Configuration
//!
//! Game constants and server endpoints come from JSON tables in the config
//! directory. Process settings come from environment variables (a `.env`
//! file is honored by the binary).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::fixed::WireScale;
use crate::game::weapon::WeaponId;

/// Game constants file name.
pub const GAME_CONFIG_FILE: &str = "game_config.json";
/// Server endpoints file name.
pub const SERVER_CONFIG_FILE: &str = "server_config.json";
/// Weapon table file name.
pub const WEAPON_CONFIG_FILE: &str = "weapon_config.json";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// File or row is not the expected JSON.
    #[error("Invalid JSON in {0}")]
    Json(String, #[source] serde_json::Error),

    /// Table is not a non-empty array.
    #[error("{0}: expected a non-empty array of rows")]
    NotASequence(String),

    /// No endpoint for the selected environment.
    #[error("No server configured for environment {0:?}")]
    UnknownEnvironment(String),

    /// Environment variable could not be parsed.
    #[error("Invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),

    /// A game constant is outside its usable range.
    #[error("{file}: {field} must be positive, got {value}")]
    NotPositive {
        /// File or table name
        file: String,
        /// Field name as written in the table
        field: &'static str,
        /// Offending value
        value: String,
    },
}

// =============================================================================
// GAME CONSTANTS
// =============================================================================

/// Game constants shared by every match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// World units per base unit (body half-height, radius multiplier)
    pub base_number: f64,
    /// Seconds in the command window
    pub wait_command_tick: u32,
    /// Seconds in the action window
    pub wait_action_tick: u32,
    /// Fixed-point factor for wire values
    #[serde(rename = "float2Int")]
    pub wire_scale: WireScale,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            base_number: 35.0,
            wait_command_tick: 10,
            wait_action_tick: 5,
            wire_scale: WireScale::default(),
        }
    }
}

impl GameConfig {
    /// First row of a `game_config.json` table.
    pub fn from_rows(rows: &Value, source: &str) -> Result<Self, ConfigError> {
        let row = first_row(rows, source)?;
        let config: Self =
            serde_json::from_value(row.clone()).map_err(|e| ConfigError::Json(source.to_string(), e))?;
        config.validate(source)?;
        Ok(config)
    }

    fn validate(&self, source: &str) -> Result<(), ConfigError> {
        let not_positive = |field, value: String| ConfigError::NotPositive {
            file: source.to_string(),
            field,
            value,
        };
        if !(self.base_number.is_finite() && self.base_number > 0.0) {
            return Err(not_positive("baseNumber", self.base_number.to_string()));
        }
        if self.wait_command_tick == 0 {
            return Err(not_positive("waitCommandTick", "0".to_string()));
        }
        if self.wait_action_tick == 0 {
            return Err(not_positive("waitActionTick", "0".to_string()));
        }
        Ok(())
    }

    /// Load `game_config.json`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::from_rows(&read_json(path)?, &path.display().to_string())
    }
}

// =============================================================================
// SERVER ENDPOINTS
// =============================================================================

/// One row of `server_config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEndpoint {
    /// Environment name (dev, test, prod)
    pub environment: String,
    /// Host and port, without scheme
    pub server_host: String,
    /// Delay before a reconnect attempt, milliseconds
    pub reconnect_interval: u64,
}

impl ServerEndpoint {
    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.server_host)
    }

    /// Reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval)
    }
}

/// All configured endpoints.
#[derive(Clone, Debug, Default)]
pub struct ServerRegistry {
    endpoints: Vec<ServerEndpoint>,
}

impl ServerRegistry {
    /// Parse a `server_config.json` table.
    pub fn from_rows(rows: &Value, source: &str) -> Result<Self, ConfigError> {
        first_row(rows, source)?;
        let endpoints = parse_rows(rows, source)?;
        Ok(Self { endpoints })
    }

    /// Load `server_config.json`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::from_rows(&read_json(path)?, &path.display().to_string())
    }

    /// Endpoint for `environment`.
    pub fn endpoint(&self, environment: &str) -> Result<&ServerEndpoint, ConfigError> {
        self.endpoints
            .iter()
            .find(|e| e.environment == environment)
            .ok_or_else(|| ConfigError::UnknownEnvironment(environment.to_string()))
    }
}

// =============================================================================
// PROCESS SETTINGS
// =============================================================================

/// Settings read from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Server environment to connect to
    pub environment: String,
    /// Directory holding the JSON tables
    pub config_dir: PathBuf,
    /// Weapon to apply for battle with
    pub weapon: WeaponId,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through `lookup`, with defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let weapon = match lookup("DUEL_WEAPON") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DUEL_WEAPON", raw))?,
            None => 0,
        };

        Ok(Self {
            environment: lookup("DUEL_ENV").unwrap_or_else(|| "dev".to_string()),
            config_dir: lookup("DUEL_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config")),
            weapon,
        })
    }

    /// Path of a file in the config directory.
    pub fn config_path(&self, file: &str) -> PathBuf {
        self.config_dir.join(file)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.display().to_string(), e))
}

fn first_row<'a>(rows: &'a Value, source: &str) -> Result<&'a Value, ConfigError> {
    rows.as_array()
        .and_then(|rows| rows.first())
        .ok_or_else(|| ConfigError::NotASequence(source.to_string()))
}

fn parse_rows<T: DeserializeOwned>(rows: &Value, source: &str) -> Result<Vec<T>, ConfigError> {
    serde_json::from_value(rows.clone()).map_err(|e| ConfigError::Json(source.to_string(), e))
}

// =============================================================================
// TESTS
// =============================================================================
