use std::path::PathBuf;
use std::str::FromStr;

/// Process settings, read from `TIMEBARTER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5480,
            data_dir: PathBuf::from("./data"),
            password: "timebarter".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            bind: lookup("TIMEBARTER_BIND").unwrap_or(d.bind),
            port: parse_var(&lookup, "TIMEBARTER_PORT").unwrap_or(d.port),
            data_dir: lookup("TIMEBARTER_DATA_DIR").map_or(d.data_dir, PathBuf::from),
            password: lookup("TIMEBARTER_PASSWORD").unwrap_or(d.password),
            max_connections: parse_var(&lookup, "TIMEBARTER_MAX_CONNECTIONS")
                .unwrap_or(d.max_connections),
            compact_threshold: parse_var(&lookup, "TIMEBARTER_COMPACT_THRESHOLD")
                .unwrap_or(d.compact_threshold),
            metrics_port: parse_var(&lookup, "TIMEBARTER_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }
}

/// Look up `key` and parse it, treating an unparseable value as unset.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
