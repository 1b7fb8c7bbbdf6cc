// src/manager.rs

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ManagerConfig};
use crate::models::{FileDescriptor, Outcome, OutcomeStatus};
use crate::ports::{BatchObserver, FetchError, FileFetcher, FileStorage, NoopObserver, StorageError};
use crate::queue::{BatchQueue, ClaimedItem};
use crate::remap::RemapTable;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("a batch is already running on this manager")]
    Busy,
}

/// Failure of a single file. Recorded as that file's outcome, never propagated.
#[derive(Debug, Error)]
enum TransferError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

/// Downloads the files of a bundle with bounded parallelism and stores them.
///
/// Files whose destination already exists are reported as completed without
/// being fetched again. Existence is the only check: a truncated or stale file
/// left by another tool is trusted as-is.
pub struct DownloadManager {
    config: ManagerConfig,
    fetcher: Arc<dyn FileFetcher>,
    storage: Arc<dyn FileStorage>,
    observer: Arc<dyn BatchObserver>,
    // Cancellation token of the run in flight, if any.
    active: Mutex<Option<CancellationToken>>,
}

impl DownloadManager {
    pub fn new(
        config: ManagerConfig,
        fetcher: Arc<dyn FileFetcher>,
        storage: Arc<dyn FileStorage>,
    ) -> Result<Self, ManagerError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            storage,
            observer: Arc::new(NoopObserver),
            active: Mutex::new(None),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Downloads `files` of `bundle_id` into storage and returns one outcome
    /// per attempted file, in completion order.
    ///
    /// Per-file failures end up in the outcome list. Files never claimed
    /// because of [`abort`](Self::abort) have no outcome.
    pub async fn process(
        &self,
        bundle_id: &str,
        files: &[FileDescriptor],
        remap: &RemapTable,
    ) -> Result<Vec<Outcome>, ManagerError> {
        let run = self.begin_run()?;

        if files.is_empty() {
            tracing::debug!(bundle = bundle_id, "empty bundle, nothing to do");
            self.observer.on_complete(&[]);
            return Ok(Vec::new());
        }

        let queue = Arc::new(BatchQueue::new(files, remap, self.observer.clone()));
        let worker_count = self.config.concurrency.min(files.len());
        let bundle: Arc<str> = Arc::from(bundle_id);
        tracing::info!(
            bundle = bundle_id,
            files = files.len(),
            workers = worker_count,
            "starting batch"
        );

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                bundle: bundle.clone(),
                queue: queue.clone(),
                fetcher: self.fetcher.clone(),
                storage: self.storage.clone(),
                observer: self.observer.clone(),
                cancel: run.token.clone(),
                timeout: self.config.transfer_timeout,
            };
            workers.spawn(worker.run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(bundle = bundle_id, "download worker panicked: {}", e);
            }
        }

        let outcomes = queue.take_outcomes().await;
        let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
        tracing::info!(
            bundle = bundle_id,
            attempted = outcomes.len(),
            failed,
            aborted = run.token.is_cancelled(),
            "batch finished"
        );
        self.observer.on_complete(&outcomes);
        Ok(outcomes)
    }

    /// Stops workers from claiming further files. Transfers already underway
    /// run to completion. Does nothing when no batch is running.
    pub fn abort(&self) {
        if let Some(token) = self.active().as_ref() {
            tracing::info!("abort requested");
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    fn active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_run(&self) -> Result<RunGuard<'_>, ManagerError> {
        let mut active = self.active();
        if active.is_some() {
            return Err(ManagerError::Busy);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(RunGuard {
            slot: &self.active,
            token,
        })
    }
}

/// Clears the active run when `process` returns or its future is dropped.
struct RunGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One slot of the worker pool. Pulls items until the queue is empty or the
/// batch is aborted.
struct Worker {
    id: usize,
    bundle: Arc<str>,
    queue: Arc<BatchQueue>,
    fetcher: Arc<dyn FileFetcher>,
    storage: Arc<dyn FileStorage>,
    observer: Arc<dyn BatchObserver>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker = self.id, "batch aborted, worker stopping");
                break;
            }
            let Some((item, _)) = self.queue.claim().await else {
                break;
            };
            self.handle(item).await;
        }
    }

    async fn handle(&self, item: ClaimedItem) {
        let status = match self.transfer(&item).await {
            Ok(skipped) => {
                tracing::debug!(
                    worker = self.id,
                    path = %item.descriptor.path,
                    dest = %item.destination,
                    skipped,
                    "file completed"
                );
                self.queue.mark_completed(item.index, skipped).await;
                OutcomeStatus::Completed
            }
            Err(e) => {
                tracing::warn!(
                    worker = self.id,
                    bundle = %self.bundle,
                    path = %item.descriptor.path,
                    "file failed: {}",
                    e
                );
                self.queue.mark_failed(item.index, e.to_string()).await;
                OutcomeStatus::Error
            }
        };
        self.observer.on_file_complete(&item.descriptor, status);
    }

    /// Returns `Ok(true)` when the destination already existed.
    async fn transfer(&self, item: &ClaimedItem) -> Result<bool, TransferError> {
        if self
            .bounded("existence check", self.storage.exists(&item.destination))
            .await?
        {
            return Ok(true);
        }

        let bytes = self
            .bounded("fetch", self.fetcher.fetch_file(&self.bundle, &item.descriptor.path))
            .await?;

        self.queue.mark_uploading(item.index).await;

        self.bounded("write", self.storage.write(&item.destination, bytes))
            .await?;
        Ok(false)
    }

    async fn bounded<T, E>(
        &self,
        stage: &'static str,
        op: impl Future<Output = Result<T, E>>,
    ) -> Result<T, TransferError>
    where
        TransferError: From<E>,
    {
        match self.timeout {
            Some(after) => match tokio::time::timeout(after, op).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(TransferError::Timeout { stage, after }),
            },
            None => Ok(op.await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use crate::ports::{MockFileFetcher, MockFileStorage};
    use bytes::Bytes;

    fn files(paths: &[&str]) -> Vec<FileDescriptor> {
        paths
            .iter()
            .map(|p| FileDescriptor::new(*p, 4, FileKind::Tile))
            .collect()
    }

    #[test]
    fn zero_concurrency_rejected() {
        let result = DownloadManager::new(
            ManagerConfig::with_concurrency(0),
            Arc::new(MockFileFetcher::new()),
            Arc::new(MockFileStorage::new()),
        );
        assert!(matches!(result, Err(ManagerError::Configuration(_))));
    }

    #[tokio::test]
    async fn empty_bundle_touches_no_collaborator() {
        // Mocks without expectations panic if called.
        let manager = DownloadManager::new(
            ManagerConfig::default(),
            Arc::new(MockFileFetcher::new()),
            Arc::new(MockFileStorage::new()),
        )
        .unwrap();
        let outcomes = manager.process("b", &[], &RemapTable::new()).await.unwrap();
        assert!(outcomes.is_empty());
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn existing_destination_is_not_fetched() {
        let mut fetcher = MockFileFetcher::new();
        fetcher.expect_fetch_file().never();
        let mut storage = MockFileStorage::new();
        storage.expect_exists().returning(|_| Ok(true));
        storage.expect_write().never();

        let manager =
            DownloadManager::new(ManagerConfig::default(), Arc::new(fetcher), Arc::new(storage))
                .unwrap();
        let outcomes = manager
            .process("b", &files(&["a.png", "b.png"]), &RemapTable::new())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_completed() && o.skipped));
    }

    #[tokio::test]
    async fn writes_to_remapped_destination() {
        let mut fetcher = MockFileFetcher::new();
        fetcher
            .expect_fetch_file()
            .withf(|bundle, path| bundle == "forest" && path == "maps/a b.png")
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"png!")));
        let mut storage = MockFileStorage::new();
        storage
            .expect_exists()
            .withf(|path| path == "worlds/w/a b.png")
            .returning(|_| Ok(false));
        storage
            .expect_write()
            .withf(|path, bytes| path == "worlds/w/a b.png" && &bytes[..] == b"png!")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut remap = RemapTable::new();
        remap.insert("maps/a%20b.png", "worlds/w/a b.png");

        let manager =
            DownloadManager::new(ManagerConfig::default(), Arc::new(fetcher), Arc::new(storage))
                .unwrap();
        let outcomes = manager
            .process("forest", &files(&["maps/a b.png"]), &remap)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_completed());
        assert!(!outcomes[0].skipped);
    }

    #[tokio::test]
    async fn storage_error_becomes_outcome() {
        let mut fetcher = MockFileFetcher::new();
        fetcher
            .expect_fetch_file()
            .returning(|_, _| Ok(Bytes::from_static(b"x")));
        let mut storage = MockFileStorage::new();
        storage.expect_exists().returning(|_| Ok(false));
        storage
            .expect_write()
            .returning(|path, _| Err(StorageError::InvalidPath(path.to_string())));

        let manager =
            DownloadManager::new(ManagerConfig::default(), Arc::new(fetcher), Arc::new(storage))
                .unwrap();
        let outcomes = manager
            .process("b", &files(&["a.png"]), &RemapTable::new())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Error);
        assert_eq!(
            outcomes[0].error_message.as_deref(),
            Some("invalid destination path: a.png")
        );
    }

    #[test]
    fn abort_when_idle_is_noop() {
        let manager = DownloadManager::new(
            ManagerConfig::default(),
            Arc::new(MockFileFetcher::new()),
            Arc::new(MockFileStorage::new()),
        )
        .unwrap();
        manager.abort();
        assert!(!manager.is_running());
    }
}
