// src/models.rs

use serde::{Deserialize, Serialize};

use crate::remap::RemapTable;

/// Category of an asset inside a bundle, as listed by the remote manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Scene,
    Background,
    Tile,
    Token,
    Audio,
    Thumbnail,
    #[default]
    #[serde(other)]
    Other,
}

/// A remote file belonging to one bundle. Supplied by the caller, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    /// Remote identifier, unique within a bundle.
    pub path: String,
    /// Advisory size in bytes from the manifest.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub kind: FileKind,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, size: u64, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            size,
            kind,
        }
    }

    /// Last path segment, used for display.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Lifecycle of a single file within one `process` run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Downloading,
    Uploading,
    Completed,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }
}

/// Per-file mutable state owned by the manager for the duration of a run.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub descriptor: FileDescriptor,
    pub destination: String,
    pub status: ItemStatus,
    pub error_message: Option<String>,
}

impl QueueItem {
    pub fn new(descriptor: FileDescriptor, destination: String) -> Self {
        Self {
            descriptor,
            destination,
            status: ItemStatus::Pending,
            error_message: None,
        }
    }
}

/// Aggregate progress, recomputed from the item set on every transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    /// Path of the file most recently picked up by a worker.
    pub current_file: Option<String>,
}

impl ProgressSnapshot {
    pub fn finished_files(&self) -> usize {
        self.completed_files + self.failed_files
    }

    pub fn is_finished(&self) -> bool {
        self.finished_files() == self.total_files
    }

    /// Calculates progress as a fraction from 0.0 to 1.0.
    pub fn fraction(&self) -> f32 {
        if self.total_files == 0 {
            1.0
        } else {
            self.finished_files() as f32 / self.total_files as f32
        }
    }
}

/// Terminal status reported for a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Error,
}

/// The terminal result for one attempted file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub descriptor: FileDescriptor,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The destination already existed, so nothing was transferred.
    #[serde(default)]
    pub skipped: bool,
}

impl Outcome {
    pub fn completed(descriptor: FileDescriptor, skipped: bool) -> Self {
        Self {
            descriptor,
            status: OutcomeStatus::Completed,
            error_message: None,
            skipped,
        }
    }

    pub fn failed(descriptor: FileDescriptor, message: String) -> Self {
        Self {
            descriptor,
            status: OutcomeStatus::Error,
            error_message: Some(message),
            skipped: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Counts over a finished run, plus the subset worth retrying.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_files: Vec<FileDescriptor>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Completed => {
                    summary.completed += 1;
                    if outcome.skipped {
                        summary.skipped += 1;
                    }
                }
                OutcomeStatus::Error => {
                    summary.failed += 1;
                    summary.failed_files.push(outcome.descriptor.clone());
                }
            }
        }
        summary
    }

    /// Input files that have no outcome, i.e. were never claimed before an abort.
    pub fn unattempted<'a>(
        files: &'a [FileDescriptor],
        outcomes: &[Outcome],
    ) -> Vec<&'a FileDescriptor> {
        files
            .iter()
            .filter(|f| !outcomes.iter().any(|o| o.descriptor.path == f.path))
            .collect()
    }
}

/// A downloadable bundle as read from disk by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_id: String,
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub remap: RemapTable,
}
