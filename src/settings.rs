//! Application settings, read from an optional `config.toml`, the environment, and `.env`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub paths: PathSettings,
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// The socket address the web server listens on.
    pub bind: String,
    /// The externally reachable URL encoded into every QR code.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathSettings {
    pub static_dir: PathBuf,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub sender: String,
    pub username: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings {
                url: "attendance.db".to_string(),
            },
            server: ServerSettings {
                bind: "0.0.0.0:5000".to_string(),
                base_url: "http://localhost:5000".to_string(),
            },
            paths: PathSettings {
                static_dir: PathBuf::from("static"),
                reports_dir: PathBuf::from("reports"),
            },
            smtp: None,
        }
    }
}

impl Settings {
    /// Loads the settings, layering (lowest priority first) the built-in defaults, `config.toml`,
    /// `ATTENDANCE__SECTION__KEY` environment variables, and finally `DATABASE_URL`.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("ATTENDANCE")
                    .prefix_separator("__")
                    .separator("__"),
            );

        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        builder.build()?.try_deserialize()
    }
}
