// src/ports.rs

//! Collaborator contracts the download manager depends on.
//!
//! The manager only ever sees these traits, so the network and storage
//! backends can be swapped for in-memory fakes in tests.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{FileDescriptor, Outcome, OutcomeStatus, ProgressSnapshot};

/// Errors raised while fetching a file from the remote API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid remote path: {0}")]
    InvalidPath(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            },
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Errors raised by the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid destination path: {0}")]
    InvalidPath(String),
}

/// Retrieves raw bytes for a file of a bundle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch_file(&self, bundle_id: &str, path: &str) -> Result<Bytes, FetchError>;
}

/// Persists bytes at a destination path.
///
/// Implementations must tolerate concurrent writes to distinct paths.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StorageError>;
}

/// Receives progress and completion notifications during a run.
///
/// Every method is called synchronously from a worker task. Implementations
/// must return quickly; a slow observer stalls that worker.
pub trait BatchObserver: Send + Sync {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
    fn on_file_complete(&self, _file: &FileDescriptor, _status: OutcomeStatus) {}
    fn on_complete(&self, _outcomes: &[Outcome]) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Observer notifications as values, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Progress(ProgressSnapshot),
    FileComplete(FileDescriptor, OutcomeStatus),
    Complete(Vec<Outcome>),
}

impl BatchObserver for UnboundedSender<BatchEvent> {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let _ = self.send(BatchEvent::Progress(snapshot.clone()));
    }

    fn on_file_complete(&self, file: &FileDescriptor, status: OutcomeStatus) {
        let _ = self.send(BatchEvent::FileComplete(file.clone(), status));
    }

    fn on_complete(&self, outcomes: &[Outcome]) {
        let _ = self.send(BatchEvent::Complete(outcomes.to_vec()));
    }
}
