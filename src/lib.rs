pub mod config;
pub mod downloader;
pub mod manager;
pub mod models;
pub mod ports;
pub mod queue;
pub mod remap;
pub mod storage;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::config::{AppConfig, ConfigError, ManagerConfig};
    pub use crate::downloader::{FetcherOptions, HttpFetcher};
    pub use crate::manager::{DownloadManager, ManagerError};
    pub use crate::models::{
        BatchSummary, BundleManifest, FileDescriptor, FileKind, ItemStatus, Outcome,
        OutcomeStatus, ProgressSnapshot, QueueItem,
    };
    pub use crate::ports::{
        BatchEvent, BatchObserver, FetchError, FileFetcher, FileStorage, NoopObserver,
        StorageError,
    };
    pub use crate::remap::RemapTable;
    pub use crate::storage::FsStorage;
}
