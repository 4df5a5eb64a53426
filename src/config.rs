//! Process configuration from environment variables.

use std::env;
use std::path::PathBuf;

pub mod defaults {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 8000;
    pub const MONGODB_URI: &str = "mongodb://localhost:27017";
    pub const DB_NAME: &str = "qse_database";
    pub const TEMPLATE_PATH: &str = "./excel_template.xlsm";
    pub const FILES_DIR: &str = "./generated_files";
}

/// Runtime configuration.
///
/// Environment variables:
/// - `QSE_HOST` / `QSE_PORT`: bind address
/// - `MONGODB_URI` / `DB_NAME`: persistence
/// - `QSE_TEMPLATE_PATH`: the macro-enabled spreadsheet template
/// - `QSE_FILES_DIR`: directory for generated artifacts
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub db_name: String,
    pub template_path: PathBuf,
    pub files_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("QSE_HOST").unwrap_or_else(|_| defaults::HOST.to_string());

        let port = env::var("QSE_PORT")
            .unwrap_or_else(|_| defaults::PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("QSE_PORT must be a valid port number"))?;

        let mongodb_uri =
            env::var("MONGODB_URI").unwrap_or_else(|_| defaults::MONGODB_URI.to_string());
        let db_name = env::var("DB_NAME").unwrap_or_else(|_| defaults::DB_NAME.to_string());

        let template_path = env::var("QSE_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::TEMPLATE_PATH));
        let files_dir = env::var("QSE_FILES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::FILES_DIR));

        Ok(Config {
            host,
            port,
            mongodb_uri,
            db_name,
            template_path,
            files_dir,
        })
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),
}
