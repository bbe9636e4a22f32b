use serde::Deserialize;
use std::fs;
use time::UtcOffset;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub auth_bearer_token: Option<String>,
}

/// Reporting parameters: the household's fixed reference timezone and the
/// default interval granularity for uploaded reports.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: i32,
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_interval_minutes() -> i32 {
    60
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl ReportingConfig {
    pub fn utc_offset(&self) -> anyhow::Result<UtcOffset> {
        let format =
            time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");
        UtcOffset::parse(&self.utc_offset, &format)
            .map_err(|e| anyhow::anyhow!("invalid reporting.utc_offset '{}': {e}", self.utc_offset))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("WATTWATCH_CONFIG").unwrap_or_else(|_| "wattwatch-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}
