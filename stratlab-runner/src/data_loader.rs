//! Bar loading for the runner.
//!
//! Bars come from CSV files with a header row:
//!
//! ```text
//! open_time,close_time,open,high,low,close,volume[,is_final]
//! ```
//!
//! Timestamps are RFC3339. `is_final` defaults to `true` when the column is
//! absent. Rows are returned as-is; boundary checks (ordering, sanity,
//! in-progress bars) belong to the `BarFeed` so CSV and live data go through
//! the same path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use stratlab_core::domain::{RawBar, SourceKey};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: no bars", path.display())]
    Empty { path: PathBuf },
}

/// Bars for one subscribed source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceData {
    pub key: SourceKey,
    pub bars: Vec<RawBar>,
    /// Whether the bars were generated rather than loaded.
    pub synthetic: bool,
}

impl SourceData {
    pub fn new(key: SourceKey, bars: Vec<RawBar>) -> Self {
        Self {
            key,
            bars,
            synthetic: false,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: DateTime<Utc>,
    close_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default = "default_final")]
    is_final: bool,
}

fn default_final() -> bool {
    true
}

impl From<CsvRow> for RawBar {
    fn from(row: CsvRow) -> Self {
        RawBar {
            open_time: row.open_time,
            close_time: row.close_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            is_final: row.is_final,
        }
    }
}

/// Load all bars of one source from a CSV file.
pub fn load_bars_csv(path: &Path, key: SourceKey) -> Result<SourceData, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let bars = reader
        .deserialize::<CsvRow>()
        .map(|row| row.map(RawBar::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(source = %key, bars = bars.len(), path = %path.display(), "loaded bars");
    Ok(SourceData::new(key, bars))
}

/// Compute a deterministic BLAKE3 hash over the bar data of several sources.
///
/// Sources are hashed in the order given, so callers pass them in
/// subscription order.
pub fn dataset_hash(feeds: &[&SourceData]) -> String {
    let mut hasher = blake3::Hasher::new();
    for feed in feeds {
        hasher.update(feed.key.to_string().as_bytes());
        for bar in &feed.bars {
            hasher.update(&bar.open_time.timestamp_millis().to_le_bytes());
            hasher.update(&bar.close_time.timestamp_millis().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
            hasher.update(&[bar.is_final as u8]);
        }
    }
    hasher.finalize().to_hex().to_string()
}
