//! Sources of [`Snapshot`]s.
//!
//! The engine never talks to a database; a provider hands it metadata that
//! was captured elsewhere (for example by exporting catalog queries to JSON).

use crate::snapshot::{Snapshot, SnapshotError, SnapshotParts};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Snafu)]
pub enum ProviderError {
    #[snafu(display("Failed to read snapshot file {}: {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse JSON snapshot {}: {}", path.display(), source))]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to parse YAML snapshot {}: {}", path.display(), source))]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display(
        "Unsupported snapshot format for {}: expected .json, .yaml or .yml",
        path.display()
    ))]
    UnsupportedFormat { path: PathBuf },

    #[snafu(display("Invalid snapshot {}: {}", path.display(), source))]
    InvalidSnapshot {
        path: PathBuf,
        source: SnapshotError,
    },
}

type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Anything that can produce a metadata snapshot.
pub trait MetadataProvider {
    fn snapshot(&self) -> Result<Snapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotFormat {
    Json,
    Yaml,
}

/// Reads a snapshot exported to a JSON or YAML file.
#[derive(Debug, Clone)]
pub struct FileMetadataProvider {
    path: PathBuf,
}

impl FileMetadataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> Result<SnapshotFormat> {
        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(SnapshotFormat::Json),
            Some("yaml" | "yml") => Ok(SnapshotFormat::Yaml),
            _ => UnsupportedFormatSnafu {
                path: self.path.clone(),
            }
            .fail(),
        }
    }
}

impl MetadataProvider for FileMetadataProvider {
    fn snapshot(&self) -> Result<Snapshot> {
        let format = self.format()?;
        let path = &self.path;
        debug!("Reading {:?} snapshot from {}", format, path.display());

        let content = fs::read_to_string(path).context(ReadSnafu { path })?;
        let parts: SnapshotParts = match format {
            SnapshotFormat::Json => {
                serde_json::from_str(&content).context(JsonParseSnafu { path })?
            }
            SnapshotFormat::Yaml => {
                serde_yaml::from_str(&content).context(YamlParseSnafu { path })?
            }
        };
        let snapshot = Snapshot::try_from(parts).context(InvalidSnapshotSnafu { path })?;

        info!(
            "Loaded snapshot with {} tables, {} indexes, {} constraints, {} sequences",
            snapshot.tables().len(),
            snapshot.indexes().len(),
            snapshot.constraints().len(),
            snapshot.sequences().len()
        );
        Ok(snapshot)
    }
}
