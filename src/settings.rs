use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::collector::Transport;

/// Default template lifetime over UDP, in seconds.
pub const TEMPLATE_TTL: u64 = 1800;

const DEFAULT_MAX_BUFFER_SIZE: u16 = 65535;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_EXPORT_INTERVAL: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct Log {
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Log { level: "info".to_string() }
    }
}

#[derive(Debug, Deserialize)]
pub struct Collector {
    pub address: String,
    pub transport: Transport,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: u16,
    // seconds, only meaningful over udp
    #[serde(default = "default_template_ttl")]
    pub template_ttl: u64,
}

#[derive(Debug, Deserialize)]
pub struct Aggregator {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub correlate_fields: Vec<String>,
    // seconds between flow store walks of the exporter thread
    #[serde(default = "default_export_interval")]
    pub export_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: Log,
    pub collector: Collector,
    pub aggregator: Aggregator,
}

impl Settings {
    /// Reads `./config/default.toml`, then applies `APP_*` environment
    /// overrides (e.g. `APP_COLLECTOR__ADDRESS`).
    pub fn init() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("./config/default"))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn default_max_buffer_size() -> u16 {
    DEFAULT_MAX_BUFFER_SIZE
}

fn default_template_ttl() -> u64 {
    TEMPLATE_TTL
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_export_interval() -> u64 {
    DEFAULT_EXPORT_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn minimal_file_gets_defaults() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(
                "[collector]\naddress = \"0.0.0.0:4739\"\ntransport = \"udp\"\n[aggregator]\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.collector.transport, Transport::Udp);
        assert_eq!(settings.collector.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(settings.collector.template_ttl, TEMPLATE_TTL);
        assert_eq!(settings.aggregator.workers, DEFAULT_WORKERS);
        assert!(settings.aggregator.correlate_fields.is_empty());
    }

    #[test]
    fn transport_parses_lowercase() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(
                "[collector]\naddress = \"0.0.0.0:4739\"\ntransport = \"tcp\"\n[aggregator]\nworkers = 8\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.collector.transport, Transport::Tcp);
        assert_eq!(settings.aggregator.workers, 8);
    }
}
