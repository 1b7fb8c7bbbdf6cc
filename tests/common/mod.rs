//! Shared fakes for the download manager tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};

use bundle_dl::prelude::*;

pub fn files(paths: &[&str]) -> Vec<FileDescriptor> {
    paths
        .iter()
        .map(|p| FileDescriptor::new(*p, 8, FileKind::Tile))
        .collect()
}

/// Serves `contents of <path>` for every path except the ones marked missing.
#[derive(Default)]
pub struct FakeFetcher {
    missing: HashSet<String>,
    slow: HashMap<String, Duration>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(mut self, path: &str) -> Self {
        self.missing.insert(path.to_string());
        self
    }

    pub fn slow(mut self, path: &str, delay: Duration) -> Self {
        self.slow.insert(path.to_string(), delay);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileFetcher for FakeFetcher {
    async fn fetch_file(&self, _bundle_id: &str, path: &str) -> Result<Bytes, FetchError> {
        self.calls.lock().unwrap().push(path.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.slow.get(path).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.missing.contains(path) {
            return Err(FetchError::Status {
                status: 404,
                reason: "Not Found".into(),
            });
        }
        Ok(Bytes::from(format!("contents of {path}")))
    }
}

/// Blocks every fetch until the test releases permits on `gate`, reporting
/// each path on `started` as soon as the fetch begins.
pub struct GatedFetcher {
    pub gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<String>,
}

impl GatedFetcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            gate: Arc::new(Semaphore::new(0)),
            started,
        };
        (fetcher, rx)
    }
}

#[async_trait]
impl FileFetcher for GatedFetcher {
    async fn fetch_file(&self, _bundle_id: &str, path: &str) -> Result<Bytes, FetchError> {
        let _ = self.started.send(path.to_string());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        permit.forget();
        Ok(Bytes::from_static(b"gated"))
    }
}

/// Keeps written files in memory.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
    read_only: HashSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, contents: &'static [u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::from_static(contents));
        self
    }

    pub fn read_only(mut self, path: &str) -> Self {
        self.read_only.insert(path.to_string());
        self
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        if self.read_only.contains(path) {
            return Err(StorageError::Io {
                path: PathBuf::from(path),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.files.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }
}

/// Drains every event currently buffered on the channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
