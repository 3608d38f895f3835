use crate::document::{RenderError, TocFont, TocStyle};
use crate::tagging::DEFAULT_TAG_CONCURRENCY;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    NotPositive { key: &'static str, value: String },
    #[error("{key}: unknown table of contents font '{value}' (expected cjk or helvetica)")]
    UnknownFont { key: &'static str, value: String },
    #[error("{key} must contain the {{n}} placeholder, got '{value}'")]
    MissingPlaceholder { key: &'static str, value: String },
    #[error("{key} cannot be empty")]
    Empty { key: &'static str },
}

/// Application configuration
///
/// Loaded from the environment, after an optional `.env` file in the
/// working directory. Command-line flags take precedence over these values.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Root where collection folders are created
    pub output_dir: PathBuf,
    /// User agent sent with cover downloads
    pub user_agent: String,
    pub toc_style: TocStyle,
    /// How many tracks are tagged at once
    pub tag_concurrency: usize,
    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,
    /// `.env` file the values were loaded from, if any
    pub env_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: PathBuf::from("."),
            user_agent: default_user_agent(),
            toc_style: TocStyle::default(),
            tag_concurrency: DEFAULT_TAG_CONCURRENCY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            env_file: None,
        }
    }
}

impl Config {
    /// Load configuration from `.env` (if present) and the environment
    ///
    /// Runs before logging is set up, so nothing is logged here; see
    /// [`Config::log_source`].
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();
        let mut config = Self::from_vars(|key| std::env::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    /// Log where the configuration came from
    pub fn log_source(&self) {
        match &self.env_file {
            Some(path) => debug!("Loaded {}", path.display()),
            None => debug!("No .env file found, using environment only"),
        }
    }

    /// Build configuration from a variable lookup, applying defaults for
    /// anything unset
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dir) = non_empty(&lookup, "COLUMN_PRESS_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(agent) = non_empty(&lookup, "COLUMN_PRESS_USER_AGENT") {
            config.user_agent = agent;
        }

        if let Some(font) = non_empty(&lookup, "COLUMN_PRESS_TOC_FONT") {
            config.toc_style.font = font.parse().map_err(|_: RenderError| {
                ConfigError::UnknownFont {
                    key: "COLUMN_PRESS_TOC_FONT",
                    value: font.clone(),
                }
            })?;
        }

        if let Some(label) = lookup("COLUMN_PRESS_TOC_LABEL") {
            config.toc_style.label_template = parse_label(&label)?;
        }

        if let Some(value) = non_empty(&lookup, "COLUMN_PRESS_TAG_CONCURRENCY") {
            config.tag_concurrency = parse_positive("COLUMN_PRESS_TAG_CONCURRENCY", &value)?;
        }

        if let Some(level) = non_empty(&lookup, "COLUMN_PRESS_LOG") {
            config.log_level = level;
        }

        Ok(config)
    }

    pub fn toc_font(&self) -> TocFont {
        self.toc_style.font
    }
}

fn default_user_agent() -> String {
    format!("column-press/{}", env!("CARGO_PKG_VERSION"))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_positive(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::NotPositive {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_label(label: &str) -> Result<String, ConfigError> {
    let key = "COLUMN_PRESS_TOC_LABEL";
    if label.trim().is_empty() {
        return Err(ConfigError::Empty { key });
    }
    if !label.contains("{n}") {
        return Err(ConfigError::MissingPlaceholder {
            key,
            value: label.to_string(),
        });
    }
    Ok(label.to_string())
}
