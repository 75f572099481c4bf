use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

/// Where the application keeps its state files and how often the ticker
/// wakes. Operator-facing transfer settings live in the settings store, not
/// here.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub settings_path: String,
    pub history_path: String,
    pub action_log_path: String,
    pub tick_interval_secs: u64,
    pub startup_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings_path: "move_config.toml".to_string(),
            history_path: "last_run.json".to_string(),
            action_log_path: "action_log.csv".to_string(),
            tick_interval_secs: 60,
            startup_delay_secs: 5,
        }
    }
}

impl AppConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Layer defaults, an optional `Config.toml` and `AUTO_TRANSFER_*`
/// environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("Config")
}

pub fn load_configuration_from(name: &str) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let builder = Config::builder()
        .set_default("settings_path", defaults.settings_path)?
        .set_default("history_path", defaults.history_path)?
        .set_default("action_log_path", defaults.action_log_path)?
        .set_default("tick_interval_secs", defaults.tick_interval_secs)?
        .set_default("startup_delay_secs", defaults.startup_delay_secs)?
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(Environment::with_prefix("AUTO_TRANSFER"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
