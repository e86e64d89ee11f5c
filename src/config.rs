use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Shared SQLite file the pipeline writes to.
    pub path: String,
    /// Startup only: how many times to try reaching the datastore before giving up.
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/pipeline.db".into(),
            connect_attempts: 1000,
            connect_retry_ms: 10,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub poll_interval_secs: f64,
    /// Size of the "recent" window shown in the report.
    pub recent_samples: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1.0,
            recent_samples: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: String,
    pub prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: "archives".into(),
            prefix: "clone_detector_report".into(),
        }
    }
}

impl AppConfig {
    /// Loads `CONFIG_FILE` (default `config.toml`), then applies `DBHOST` / `LOG_INTERVAL`.
    /// A missing default file means built-in defaults; an explicit `CONFIG_FILE` must exist.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var("CONFIG_FILE").ok();
        let path = explicit.clone().unwrap_or_else(|| "config.toml".into());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
                AppConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("reading {}: {}", path, e)),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides: `DBHOST` (datastore path) and `LOG_INTERVAL` (seconds).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(host) = lookup("DBHOST") {
            self.database.path = host;
        }
        if let Some(raw) = lookup("LOG_INTERVAL") {
            self.monitoring.poll_interval_secs = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("LOG_INTERVAL must be a number, got {:?}: {}", raw, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.connect_attempts > 0,
            "database.connect_attempts must be > 0, got {}",
            self.database.connect_attempts
        );
        anyhow::ensure!(
            self.monitoring.poll_interval_secs.is_finite()
                && self.monitoring.poll_interval_secs > 0.0,
            "monitoring.poll_interval_secs must be > 0, got {}",
            self.monitoring.poll_interval_secs
        );
        self.poll_interval()?;
        anyhow::ensure!(
            self.monitoring.recent_samples > 0,
            "monitoring.recent_samples must be > 0, got {}",
            self.monitoring.recent_samples
        );
        anyhow::ensure!(!self.archive.dir.is_empty(), "archive.dir must be non-empty");
        anyhow::ensure!(
            !self.archive.prefix.is_empty(),
            "archive.prefix must be non-empty"
        );
        Ok(())
    }

    /// Poll interval as a timer period: must be representable and at least 1ns.
    pub fn poll_interval(&self) -> anyhow::Result<std::time::Duration> {
        let secs = self.monitoring.poll_interval_secs;
        let interval = std::time::Duration::try_from_secs_f64(secs).map_err(|e| {
            anyhow::anyhow!("monitoring.poll_interval_secs out of range, got {}: {}", secs, e)
        })?;
        anyhow::ensure!(
            !interval.is_zero(),
            "monitoring.poll_interval_secs rounds to zero, got {}",
            secs
        );
        Ok(interval)
    }
}
