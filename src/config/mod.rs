//! Configuration
//!
//! The on-disk form ([`RawConfig`]) leaves every field optional. [`resolve`]
//! turns it into fully populated [`Settings`], validating as it goes; there
//! are no process-wide defaults to mutate.
//!
//! ```json
//! {
//!   "fieldExtractors": ["(\\w+)=(\\w+)"],
//!   "store": {"fileName": "loghound.jsonl", "trueBatch": false,
//!             "compression": false, "compressionLevel": 6},
//!   "jobs": {"scanChunkSize": 500}
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codec::CodecKind;
use crate::event_store::{EventStoreConfig, StoreLocation, WriteStrategy};
use crate::extract::FieldExtractor;
use crate::jobs::JobSettings;

/// Field extractors used when the config names none
pub const DEFAULT_FIELD_EXTRACTORS: &[&str] = &[
    r"(\w+)=(\w+)",
    r"^(?P<_time>\d\d\d\d/\d\d/\d\d \d\d:\d\d:\d\d.\d\d\d\d\d\d)",
];

pub const DEFAULT_FILE_NAME: &str = "loghound.jsonl";
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_SCAN_CHUNK_SIZE: usize = 500;

/// Configuration errors, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field extractor #{index}: {source}")]
    InvalidPattern { index: usize, source: regex::Error },

    #[error("store location {} is a directory", .0.display())]
    InvalidLocation(PathBuf),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// A flag that may be left unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Toggle {
    #[default]
    Unset,
    Off,
    On,
}

impl Toggle {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Toggle::Unset => default,
            Toggle::Off => false,
            Toggle::On => true,
        }
    }
}

impl From<Option<bool>> for Toggle {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Toggle::Unset,
            Some(false) => Toggle::Off,
            Some(true) => Toggle::On,
        }
    }
}

impl From<Toggle> for Option<bool> {
    fn from(value: Toggle) -> Self {
        match value {
            Toggle::Unset => None,
            Toggle::Off => Some(false),
            Toggle::On => Some(true),
        }
    }
}

/// Configuration document as written by the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    pub field_extractors: Option<Vec<String>>,
    pub store: RawStoreConfig,
    pub jobs: RawJobConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStoreConfig {
    /// Log file path, or `:memory:`
    pub file_name: Option<String>,
    pub true_batch: Toggle,
    pub compression: Toggle,
    pub compression_level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawJobConfig {
    pub scan_chunk_size: Option<usize>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub extractor: FieldExtractor,
    pub store: EventStoreConfig,
    pub jobs: JobSettings,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        resolve(serde_json::from_str(json)?)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        resolve(serde_json::from_reader(reader)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }
}

/// Fill in defaults and validate
pub fn resolve(raw: RawConfig) -> Result<Settings, ConfigError> {
    let extractor = match &raw.field_extractors {
        Some(patterns) => FieldExtractor::new(patterns.as_slice())?,
        None => {
            debug!("Using default field extractors");
            FieldExtractor::new(DEFAULT_FIELD_EXTRACTORS)?
        }
    };

    let location = StoreLocation::parse(
        raw.store.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME),
    );
    if let StoreLocation::File(path) = &location {
        if path.is_dir() {
            return Err(ConfigError::InvalidLocation(path.clone()));
        }
    }

    let compression_level = raw
        .store
        .compression_level
        .unwrap_or(DEFAULT_COMPRESSION_LEVEL);
    if compression_level > 9 {
        return Err(ConfigError::InvalidValue {
            field: "store.compressionLevel",
            reason: format!("{} is outside 0..=9", compression_level),
        });
    }

    let scan_chunk_size = raw.jobs.scan_chunk_size.unwrap_or(DEFAULT_SCAN_CHUNK_SIZE);
    if scan_chunk_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "jobs.scanChunkSize",
            reason: "must be at least 1".to_string(),
        });
    }

    let write_strategy = if raw.store.true_batch.resolve(false) {
        WriteStrategy::TrueBatch
    } else {
        WriteStrategy::OneByOne
    };
    let codec = if raw.store.compression.resolve(false) {
        CodecKind::Zlib
    } else {
        CodecKind::Plain
    };

    Ok(Settings {
        extractor,
        store: EventStoreConfig {
            location,
            write_strategy,
            codec,
            compression_level,
        },
        jobs: JobSettings { scan_chunk_size },
    })
}
