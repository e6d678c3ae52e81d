use std::fmt;

use indicatif::ProgressBar;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::prts::DownloadOutcome;
use crate::prts::pool::PoolEvent;

/// How the download phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    CompletedFully,
    AbortedOnFailures,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::CompletedFully => write!(f, "completed-fully"),
            RunStatus::AbortedOnFailures => write!(f, "aborted-on-failures"),
        }
    }
}

/// Counts of every outcome the monitor accepted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) downloaded: usize,
    pub(crate) already_present: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

impl RunSummary {
    pub(crate) fn processed(&self) -> usize {
        self.downloaded + self.already_present + self.skipped + self.failed
    }

    pub(crate) fn format_stats(&self) -> String {
        format!(
            "Downloaded: {} | Already present: {} | Skipped: {} | Failed: {}",
            self.downloaded, self.already_present, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunReport {
    pub(crate) status: RunStatus,
    pub(crate) summary: RunSummary,
}

/// What the monitor decided after seeing an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Continue,
    Abort,
}

/// Tracks the run of consecutive hard failures and decides when to give up.
///
/// The monitor is the only owner of the streak; workers report to it over a channel.
#[derive(Debug)]
pub(crate) struct FailureMonitor {
    threshold: usize,
    streak: usize,
    summary: RunSummary,
}

impl FailureMonitor {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: 0,
            summary: RunSummary::default(),
        }
    }

    pub(crate) fn streak(&self) -> usize {
        self.streak
    }

    /// Records one outcome. Any success or soft failure resets the streak.
    pub(crate) fn observe(&mut self, outcome: &DownloadOutcome) -> Verdict {
        match outcome {
            DownloadOutcome::Success { already_present: true, .. } => self.summary.already_present += 1,
            DownloadOutcome::Success { already_present: false, .. } => self.summary.downloaded += 1,
            DownloadOutcome::SoftFail(_) => self.summary.skipped += 1,
            DownloadOutcome::HardFail(_) => self.summary.failed += 1,
        }

        if outcome.is_hard_fail() {
            self.streak += 1;
        } else {
            self.streak = 0;
        }

        if self.streak >= self.threshold {
            Verdict::Abort
        } else {
            Verdict::Continue
        }
    }

    /// Consumes outcomes until the pool is done or the streak hits the threshold.
    ///
    /// On abort `cancel` is fired once and the channel is closed, so nothing finished
    /// afterwards is counted.
    pub(crate) async fn watch(
        mut self,
        mut outcomes: mpsc::Receiver<PoolEvent>,
        cancel: &CancellationToken,
        progress: &ProgressBar,
    ) -> RunReport {
        while let Some((link, outcome)) = outcomes.recv().await {
            progress.inc(1);
            match &outcome {
                DownloadOutcome::Success { file_name, .. } => progress.set_message(file_name.clone()),
                DownloadOutcome::SoftFail(reason) => info!("Skipped {}: {}", link, reason),
                DownloadOutcome::HardFail(e) => warn!("Failed to download {}: {}", link, e),
            }

            if self.observe(&outcome) == Verdict::Abort {
                error!("{} consecutive failures, cancelling all remaining downloads...", self.streak());
                cancel.cancel();
                outcomes.close();
                progress.abandon_with_message("aborted");
                return RunReport {
                    status: RunStatus::AbortedOnFailures,
                    summary: self.summary,
                };
            }
        }

        progress.finish_with_message("done");
        RunReport {
            status: RunStatus::CompletedFully,
            summary: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::prts::io::directory::DirectoryManager;
    use crate::prts::pool::DownloadPool;
    use crate::prts::resolver::{DetailResolver, ResolveError};
    use crate::prts::test_support::{FakeWiki, portrait_page};
    use crate::prts::{DetailPageLink, DownloadError, SkipReason};

    fn success() -> DownloadOutcome {
        DownloadOutcome::Success { file_name: "a.png".to_string(), already_present: false }
    }

    fn hard_fail() -> DownloadOutcome {
        DownloadOutcome::HardFail(DownloadError::Resolve(ResolveError::MissingImageLink {
            url: "https://wiki.test/w/x".to_string(),
        }))
    }

    fn soft_fail() -> DownloadOutcome {
        DownloadOutcome::SoftFail(SkipReason::NoSubject)
    }

    #[test]
    fn test_streak_aborts_at_threshold() {
        let mut monitor = FailureMonitor::new(3);

        assert_eq!(monitor.observe(&hard_fail()), Verdict::Continue);
        assert_eq!(monitor.observe(&hard_fail()), Verdict::Continue);
        assert_eq!(monitor.observe(&hard_fail()), Verdict::Abort);
        assert_eq!(monitor.streak(), 3);
    }

    #[test]
    fn test_success_and_soft_fail_reset_streak() {
        let mut monitor = FailureMonitor::new(3);

        monitor.observe(&hard_fail());
        monitor.observe(&hard_fail());
        assert_eq!(monitor.observe(&success()), Verdict::Continue);
        assert_eq!(monitor.streak(), 0);

        monitor.observe(&hard_fail());
        monitor.observe(&hard_fail());
        assert_eq!(monitor.observe(&soft_fail()), Verdict::Continue);
        assert_eq!(monitor.streak(), 0);

        assert_eq!(monitor.observe(&hard_fail()), Verdict::Continue);
        assert_eq!(monitor.summary.failed, 5);
        assert_eq!(monitor.summary.skipped, 1);
        assert_eq!(monitor.summary.downloaded, 1);
    }

    #[tokio::test]
    async fn test_watch_stops_accepting_after_abort() {
        let (tx, rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send((DetailPageLink::new(format!("https://wiki.test/w/{}", i)), hard_fail())).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let report = FailureMonitor::new(3).watch(rx, &cancel, &ProgressBar::hidden()).await;

        assert_eq!(report.status, RunStatus::AbortedOnFailures);
        assert_eq!(report.summary.failed, 3);
        assert!(cancel.is_cancelled());
        assert!(tx.send((DetailPageLink::new("https://wiki.test/w/late"), success())).await.is_err());
    }

    #[tokio::test]
    async fn test_watch_completes_when_channel_closes() {
        let (tx, rx) = mpsc::channel(16);
        tx.send((DetailPageLink::new("https://wiki.test/w/a"), hard_fail())).await.unwrap();
        tx.send((DetailPageLink::new("https://wiki.test/w/b"), hard_fail())).await.unwrap();
        tx.send((DetailPageLink::new("https://wiki.test/w/c"), success())).await.unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        let report = FailureMonitor::new(3).watch(rx, &cancel, &ProgressBar::hidden()).await;

        assert_eq!(report.status, RunStatus::CompletedFully);
        assert_eq!(report.summary.processed(), 3);
        assert!(!cancel.is_cancelled());
    }

    fn link(name: &str) -> DetailPageLink {
        DetailPageLink::new(format!("https://wiki.test/w/{}", name))
    }

    #[tokio::test]
    async fn test_run_aborts_after_three_failures_and_keeps_earlier_files() {
        let wiki = FakeWiki::new();
        let dir = tempfile::tempdir().unwrap();
        for name in ["A", "B"] {
            let image = format!("https://media.test/{}.png", name);
            wiki.page(link(name).as_str(), &portrait_page(name, &image));
            wiki.bytes(&image, name.as_bytes());
        }
        for name in ["C", "D", "E"] {
            wiki.status(link(name).as_str(), 500);
        }

        let pool = DownloadPool::new(
            DetailResolver::new(wiki.clone(), Duration::from_secs(5)),
            DirectoryManager::new(dir.path(), "png").unwrap(),
            1,
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let work = ["A", "B", "C", "D", "E"].into_iter().map(link).collect();
        let (outcomes, run) = pool.run(work, cancel.clone());
        let report = FailureMonitor::new(3).watch(outcomes, &cancel, &ProgressBar::hidden()).await;
        run.finish().await;

        assert_eq!(report.status, RunStatus::AbortedOnFailures);
        assert_eq!(report.summary.downloaded, 2);
        assert!(dir.path().join("A.png").exists());
        assert!(dir.path().join("B.png").exists());
        for name in ["C", "D", "E"] {
            assert!(!dir.path().join(format!("{}.png", name)).exists());
        }
    }

    #[tokio::test]
    async fn test_nothing_is_dispatched_after_cancellation() {
        let wiki = FakeWiki::new();
        let dir = tempfile::tempdir().unwrap();
        for name in ["1", "2", "3"] {
            wiki.status(link(name).as_str(), 503);
        }
        for name in ["4", "5", "6"] {
            let image = format!("https://media.test/{}.png", name);
            wiki.page(link(name).as_str(), &portrait_page(name, &image));
            wiki.bytes(&image, b"late");
            wiki.delay_for(link(name).as_str(), Duration::from_millis(200));
        }

        let pool = DownloadPool::new(
            DetailResolver::new(wiki.clone(), Duration::from_secs(5)),
            DirectoryManager::new(dir.path(), "png").unwrap(),
            1,
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let work = ["1", "2", "3", "4", "5", "6"].into_iter().map(link).collect();
        let (outcomes, run) = pool.run(work, cancel.clone());
        let report = FailureMonitor::new(3).watch(outcomes, &cancel, &ProgressBar::hidden()).await;
        let discarded = run.finish().await;

        assert_eq!(report.status, RunStatus::AbortedOnFailures);
        assert_eq!(report.summary.processed(), 3);
        // Item 4 may or may not have been picked up before the signal landed.
        assert!(discarded >= 2);
        assert_eq!(wiki.request_count(link("5").as_str()), 0);
        assert_eq!(wiki.request_count(link("6").as_str()), 0);
    }

    #[tokio::test]
    async fn test_success_between_failures_lets_the_run_complete() {
        let wiki = FakeWiki::new();
        let dir = tempfile::tempdir().unwrap();
        for name in ["A", "B", "D", "E"] {
            wiki.status(link(name).as_str(), 500);
        }
        wiki.page(link("C").as_str(), &portrait_page("C", "https://media.test/C.png"));
        wiki.bytes("https://media.test/C.png", b"c");

        let pool = DownloadPool::new(
            DetailResolver::new(wiki.clone(), Duration::from_secs(5)),
            DirectoryManager::new(dir.path(), "png").unwrap(),
            1,
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let work = ["A", "B", "C", "D", "E"].into_iter().map(link).collect();
        let (outcomes, run) = pool.run(work, cancel.clone());
        let report = FailureMonitor::new(3).watch(outcomes, &cancel, &ProgressBar::hidden()).await;
        run.finish().await;

        assert_eq!(report.status, RunStatus::CompletedFully);
        assert_eq!(report.summary.failed, 4);
        assert_eq!(report.summary.downloaded, 1);
    }
}
