// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

/// Server settings, loaded from a JSON configuration file with `RDV_*`
/// environment variables layered on top (e.g. `RDV_PORT=5001`).
// The aliases cover the camelCase configuration keys; file sources
// lowercase keys before deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Base path of the storage tree.
    #[serde(alias = "datafolder")]
    pub data_folder: PathBuf,
    /// The notification server clients are expected to register their
    /// devices with. May be empty to disable push entirely.
    #[serde(alias = "notificationserver")]
    pub notification_server: String,
    /// Log sink; stdout when unset.
    #[serde(default, alias = "logfile")]
    pub log_file: Option<PathBuf>,
    /// Enables development-only endpoints such as the full reset.
    #[serde(default)]
    pub development: bool,
    /// Optional directory of static files served at the root path.
    #[serde(default, alias = "staticfiles")]
    pub static_files: Option<PathBuf>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

/// Load the configuration from the given JSON file.
pub fn get_configuration(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::new(path, FileFormat::Json).required(true))
        // Layer on settings from the environment, e.g. `RDV_DATA_FOLDER`.
        .add_source(config::Environment::with_prefix("RDV"));
    builder.build()?.try_deserialize()
}

/// Load the configuration from a JSON string. Used by tests.
pub fn get_configuration_from_str(json: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder().add_source(File::from_str(json, FileFormat::Json));
    builder.build()?.try_deserialize()
}
