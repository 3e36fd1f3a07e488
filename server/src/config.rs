use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level server configuration, loaded from memberlist.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub notify: NotifySection,
    pub view: ViewSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub web_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:4000".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    /// Create the source tables on startup. Development and tests only.
    pub apply_schema: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:memberlist.db?mode=rwc".into(),
            apply_schema: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Address of the change-notification stream.
    pub address: String,
    pub keepalive_secs: u64,
    pub max_line_bytes: usize,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4100".into(),
            keepalive_secs: 60,
            max_line_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ViewSection {
    /// How often queued change events are applied.
    pub tick_interval_ms: u64,
}

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

impl ViewSection {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, String> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read config file {}: {}", path, e))?;
            Self::from_toml(&contents).map_err(|e| format!("failed to parse config file {}: {}", path, e))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = var("APPLY_SCHEMA")
            && let Ok(apply) = v.parse()
        {
            self.database.apply_schema = apply;
        }
        if let Some(v) = var("NOTIFY_ADDRESS") {
            self.notify.address = v;
        }
        if let Some(v) = var("NOTIFY_KEEPALIVE_SECS")
            && let Ok(secs) = v.parse()
        {
            self.notify.keepalive_secs = secs;
        }
        if let Some(v) = var("TICK_INTERVAL_MS")
            && let Ok(ms) = v.parse()
        {
            self.view.tick_interval_ms = ms;
        }
    }
}
