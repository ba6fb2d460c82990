use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub mode: StorageKind,
    /// Only read when `mode` is `file`.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// An `EnvFilter` directive, e.g. `info` or `livelist=trace`.
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenSettings {
    /// `chrono` format string for lap cells.
    pub time_format: String,
}
impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            time_format: DEFAULT_TIME_FORMAT.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub screen: ScreenSettings,
}

pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S%.3f";

impl Settings {
    /// Load settings. Without `file`, a `livelist.toml` in the working
    /// directory is used if present.
    pub fn load(file: Option<&str>) -> Result<Settings> {
        let builder = Config::builder()
            .set_default("database.mode", "memory")?
            .set_default("database.path", "livelist.db")?
            .set_default("log.filter", "info")?
            .set_default("screen.time_format", DEFAULT_TIME_FORMAT)?;
        let builder = match file {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("livelist").required(false)),
        };
        // later sources override earlier ones
        let settings = builder
            .add_source(Environment::with_prefix("LIVELIST").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        match self.database.mode {
            StorageKind::Memory => PersistenceMode::InMemory,
            StorageKind::File => PersistenceMode::File(self.database.path.clone()),
        }
    }
}
