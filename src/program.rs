use std::env::current_dir;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Error};
use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info, trace};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::prts::io::directory::DirectoryManager;
use crate::prts::io::{Config, CONFIG_NAME};
use crate::prts::monitor::{FailureMonitor, RunStatus};
use crate::prts::paginator::IndexPaginator;
use crate::prts::pool::DownloadPool;
use crate::prts::renderer::StaticPageRenderer;
use crate::prts::resolver::DetailResolver;
use crate::prts::sender::RequestSender;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Handles the flow of one run: discover the detail pages, then download them.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("PRTS portrait downloader");
        trace!("Starting PRTS portrait downloader...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        let working_dir = current_dir().context("Unable to get working directory")?;
        trace!("Program Working Directory: {}", working_dir.display());

        let config = Config::load_or_create(Path::new(CONFIG_NAME))?;
        let base_url = Url::parse(config.base_url())
            .with_context(|| format!("Invalid base URL \"{}\"", config.base_url()))?;
        let request_sender = RequestSender::new(config.user_agent()).context("Failed to build HTTP client")?;

        info!("Discovering image pages...");
        let paginator = IndexPaginator::new(
            StaticPageRenderer::new(request_sender.clone()),
            config.page_size(),
            config.page_delay(),
            config.render_wait(),
        );
        let links = paginator.paginate(&base_url).await;
        if links.is_empty() {
            info!("No image links were found, nothing to download.");
            return Ok(());
        }

        let directory = DirectoryManager::new(config.output_directory(), config.image_extension())?;
        info!(
            "Downloading {} images to {} with {} workers...",
            links.len(),
            directory.root_dir().display(),
            config.pool_size()
        );

        let pool = DownloadPool::new(
            DetailResolver::new(request_sender.clone(), config.detail_timeout()),
            directory,
            config.pool_size(),
            config.image_timeout(),
        );
        let progress_bar = Self::progress_bar(links.len() as u64);
        let cancel = CancellationToken::new();

        let (outcomes, run) = pool.run(links, cancel.clone());
        let report = FailureMonitor::new(config.failure_threshold())
            .watch(outcomes, &cancel, &progress_bar)
            .await;
        run.finish().await;

        info!("Processed {} images: {}", report.summary.processed(), report.summary.format_stats());
        info!("{}", request_sender.stats().format_stats());
        match report.status {
            RunStatus::CompletedFully => info!("All download tasks have been processed ({}).", report.status),
            RunStatus::AbortedOnFailures => error!(
                "Stopped after {} consecutive failures ({}).",
                config.failure_threshold(),
                report.status
            ),
        }

        Ok(())
    }

    fn progress_bar(len: u64) -> ProgressBar {
        const PROGRESS_TEMPLATE: &str = "{spinner} {bar:40} {pos}/{len} {wide_msg}";

        let progress_style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let progress_bar = ProgressBar::new(len);
        progress_bar.set_style(progress_style);
        progress_bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        progress_bar.enable_steady_tick(Duration::from_millis(200));
        progress_bar
    }
}
