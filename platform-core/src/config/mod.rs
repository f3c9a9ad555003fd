use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// IANA time zone used for local calendar-day bucketing, e.g. "Europe/London".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
