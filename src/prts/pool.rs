use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::prts::io::directory::DirectoryManager;
use crate::prts::resolver::{DetailResolver, Resolution};
use crate::prts::sender::HttpFetch;
use crate::prts::{DetailPageLink, DownloadError, DownloadOutcome};

/// A finished work item as reported by a worker.
pub(crate) type PoolEvent = (DetailPageLink, DownloadOutcome);

/// Fixed-size pool of workers that resolve detail pages and download their images.
pub(crate) struct DownloadPool<F> {
    resolver: Arc<DetailResolver<F>>,
    directory: Arc<DirectoryManager>,
    size: usize,
    image_timeout: Duration,
}

/// Handle to a running pool.
pub(crate) struct PoolRun {
    workers: Vec<JoinHandle<()>>,
    queue: flume::Receiver<DetailPageLink>,
}

impl PoolRun {
    /// Waits for every worker to stop and discards the work nobody started.
    ///
    /// Returns the number of discarded items.
    pub(crate) async fn finish(self) -> usize {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Download worker stopped abnormally: {}", e);
            }
        }

        let discarded = self.queue.drain().count();
        if discarded > 0 {
            info!("Discarded {} queued downloads that were never started.", discarded);
        }
        discarded
    }
}

impl<F: HttpFetch + 'static> DownloadPool<F> {
    pub(crate) fn new(
        resolver: DetailResolver<F>,
        directory: DirectoryManager,
        size: usize,
        image_timeout: Duration,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            directory: Arc::new(directory),
            size: size.max(1),
            image_timeout,
        }
    }

    /// Starts the workers on `work_list`.
    ///
    /// Outcomes arrive on the returned channel in the order the workers finish them. Once
    /// `cancel` fires no new item is started and outcomes of items still in flight are dropped.
    pub(crate) fn run(
        &self,
        work_list: Vec<DetailPageLink>,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<PoolEvent>, PoolRun) {
        let (queue_tx, queue_rx) = flume::unbounded();
        for link in work_list {
            // The receiver is held right here, so the queue cannot be disconnected.
            let _ = queue_tx.send(link);
        }
        drop(queue_tx);

        let (outcome_tx, outcome_rx) = mpsc::channel(self.size * 2);
        let workers = (0..self.size)
            .map(|id| {
                let worker = Worker {
                    id,
                    resolver: self.resolver.clone(),
                    directory: self.directory.clone(),
                    image_timeout: self.image_timeout,
                };
                tokio::spawn(worker.run(queue_rx.clone(), outcome_tx.clone(), cancel.clone()))
            })
            .collect();

        (outcome_rx, PoolRun { workers, queue: queue_rx })
    }
}

struct Worker<F> {
    id: usize,
    resolver: Arc<DetailResolver<F>>,
    directory: Arc<DirectoryManager>,
    image_timeout: Duration,
}

impl<F: HttpFetch> Worker<F> {
    async fn run(
        self,
        queue: flume::Receiver<DetailPageLink>,
        outcomes: mpsc::Sender<PoolEvent>,
        cancel: CancellationToken,
    ) {
        trace!("Worker {} started", self.id);

        loop {
            let link = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv_async() => match next {
                    Ok(link) => link,
                    Err(_) => break,
                },
            };

            let outcome = match self.download(&link).await {
                Ok(outcome) => outcome,
                Err(e) => DownloadOutcome::HardFail(e),
            };

            if cancel.is_cancelled() {
                debug!("Worker {} dropping outcome for {} after cancellation", self.id, link);
                break;
            }
            if outcomes.send((link, outcome)).await.is_err() {
                break;
            }
        }

        trace!("Worker {} stopped", self.id);
    }

    async fn download(&self, link: &DetailPageLink) -> Result<DownloadOutcome, DownloadError> {
        let asset = match self.resolver.resolve(link).await? {
            Resolution::Asset(asset) => asset,
            Resolution::Skipped(reason) => {
                debug!("Nothing to download on {}: {}", link, reason);
                return Ok(DownloadOutcome::SoftFail(reason));
            }
        };

        let file_name = self.directory.file_name(&asset.subject_name);
        if self.directory.file_exists(&file_name) {
            info!("Image already exists, skipping download: {}", file_name);
            return Ok(DownloadOutcome::Success { file_name, already_present: true });
        }

        let bytes = self.resolver.fetcher().get(&asset.image_url, self.image_timeout).await?;
        self.directory.save(&file_name, &bytes).await?;
        info!("Downloaded image: {} ({} bytes)", file_name, bytes.len());

        Ok(DownloadOutcome::Success { file_name, already_present: false })
    }
}
