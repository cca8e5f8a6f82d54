use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::cli::GlobalArgs;

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory of uploaded media.
    pub media_root: PathBuf,
    /// SQLite database of the backend.
    pub database: PathBuf,
    /// Delay between two scheduled runs.
    pub clean_interval: Duration,
    /// Whether info level logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    media: FileMedia,
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    schedule: FileSchedule,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize, Default)]
struct FileMedia {
    root: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct FileDatabase {
    path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct FileSchedule {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

fn default_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_logging() -> bool {
    true
}

impl Default for FileSchedule {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &GlobalArgs) -> Result<Self> {
        // built-in defaults
        let data_dir = default_data_dir();
        let mut media_root = data_dir.join("media");
        let mut database = data_dir.join("oser.db");
        let mut interval_secs = default_interval_secs();
        let mut logging = default_logging();

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("OSER_MEDIA_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/oser_media.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", config_path.display()))?;
            if let Some(root) = file_cfg.media.root {
                media_root = root;
            }
            if let Some(path) = file_cfg.database.path {
                database = path;
            }
            interval_secs = file_cfg.schedule.interval_secs;
            logging = file_cfg.logging.enabled;
        }

        // environment overrides
        if let Ok(root) = std::env::var("OSER_MEDIA_ROOT") {
            media_root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("OSER_DATABASE") {
            database = PathBuf::from(path);
        }
        if let Ok(s) = std::env::var("OSER_CLEAN_INTERVAL_SECS") {
            if let Ok(s) = s.parse::<u64>() {
                interval_secs = s;
            }
        }
        if let Ok(l) = std::env::var("OSER_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(root) = &cli.media_root {
            media_root = root.clone();
        }
        if let Some(path) = &cli.database {
            database = path.clone();
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        if interval_secs == 0 {
            anyhow::bail!("invalid_interval");
        }

        Ok(Self {
            media_root,
            database,
            clean_interval: Duration::from_secs(interval_secs),
            logging_enabled: logging,
        })
    }
}

/// Default directory holding the media root and the database.
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("fr", "oser-cs", "oser")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
