use std::fmt;

use thiserror::Error;

use crate::prts::resolver::ResolveError;
use crate::prts::sender::FetchError;

pub(crate) mod io;
pub(crate) mod monitor;
pub(crate) mod paginator;
pub(crate) mod pool;
pub(crate) mod renderer;
pub(crate) mod resolver;
pub(crate) mod sender;

#[cfg(test)]
pub(crate) mod test_support;

/// An absolute URL pointing at one image detail page on the wiki.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct DetailPageLink(String);

impl DetailPageLink {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        DetailPageLink(url.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetailPageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a detail page was resolved without anything to download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// Neither the categories nor the heading named an operator.
    NoSubject,
    /// The subject is a reserve operator placeholder.
    ReserveOperator(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSubject => write!(f, "no operator name found"),
            SkipReason::ReserveOperator(name) => write!(f, "reserve operator \"{}\"", name),
        }
    }
}

/// Errors that turn a single work item into a hard failure.
#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    #[error("Failed to resolve detail page: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to fetch image: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The result of processing one detail page.
#[derive(Debug)]
pub(crate) enum DownloadOutcome {
    /// The image is on disk, either freshly written or left over from an earlier run.
    Success { file_name: String, already_present: bool },
    /// Nothing to download. Not counted as a failure.
    SoftFail(SkipReason),
    /// Network or parse failure.
    HardFail(DownloadError),
}

impl DownloadOutcome {
    pub(crate) fn is_hard_fail(&self) -> bool {
        matches!(self, DownloadOutcome::HardFail(_))
    }
}
