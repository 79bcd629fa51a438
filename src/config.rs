use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::model::FacilityLayout;

/// Server settings, read from `PARKADE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// JSON file of facilities to create when the engine starts empty.
    pub layout_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7420,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            layout_file: None,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default, like unset ones.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parse_var(&lookup, "PARKADE_PORT").unwrap_or(defaults.port),
            bind: lookup("PARKADE_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("PARKADE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parse_var(&lookup, "PARKADE_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            compact_threshold: parse_var(&lookup, "PARKADE_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse_var(&lookup, "PARKADE_METRICS_PORT"),
            layout_file: lookup("PARKADE_LAYOUT")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("parkade.wal")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {e}", path.display()),
            ConfigError::Parse(path, e) => write!(f, "invalid layout file {}: {e}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Read a seed file: a JSON array of facility layouts.
pub fn load_layouts(path: &Path) -> Result<Vec<FacilityLayout>, ConfigError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
}

/// Create the given facilities, but only into an engine that has none yet.
/// Returns how many were created.
pub async fn seed_facilities(engine: &Engine, layouts: Vec<FacilityLayout>) -> usize {
    if engine.facility_count() > 0 {
        debug!("engine already holds facilities, seed layout ignored");
        return 0;
    }
    let mut created = 0;
    for layout in layouts {
        let name = layout.name.clone();
        match engine.create_facility(layout).await {
            Ok(_) => created += 1,
            Err(e) => warn!("seed facility {name} rejected: {e}"),
        }
    }
    created
}
