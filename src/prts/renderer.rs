use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::prts::sender::{FetchError, HttpFetch};

/// Errors produced while rendering a result page.
#[derive(Error, Debug)]
pub(crate) enum RenderError {
    #[error("Navigation failed: {0}")]
    Navigation(#[from] FetchError),

    #[error("Content marker \"{marker}\" never appeared on {url}")]
    MarkerMissing { url: String, marker: String },

    #[error("Gave up waiting for {url} after {waited:?}")]
    WaitExceeded { url: String, waited: Duration },

    #[error("Invalid content marker \"{0}\"")]
    InvalidMarker(String),
}

/// Produces the final HTML of a page once a named piece of content is present.
///
/// Discovery drives a single renderer sequentially, so implementations are free to hold
/// a stateful session internally.
#[async_trait]
pub(crate) trait PageRenderer: Send + Sync {
    /// Renders `url` and returns its HTML once an element matching the CSS selector
    /// `marker` exists, failing if that takes longer than `max_wait`.
    async fn render(&self, url: &str, marker: &str, max_wait: Duration) -> Result<String, RenderError>;
}

/// Renderer for pages whose search results are present in the served HTML.
pub(crate) struct StaticPageRenderer<F> {
    fetcher: F,
}

impl<F: HttpFetch> StaticPageRenderer<F> {
    pub(crate) fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

/// Checks whether `html` contains an element matching `marker`.
fn contains_marker(html: &str, marker: &str) -> Result<bool, RenderError> {
    let selector = Selector::parse(marker).map_err(|_| RenderError::InvalidMarker(marker.to_string()))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

#[async_trait]
impl<F: HttpFetch> PageRenderer for StaticPageRenderer<F> {
    async fn render(&self, url: &str, marker: &str, max_wait: Duration) -> Result<String, RenderError> {
        let html = tokio::time::timeout(max_wait, self.fetcher.get_text(url, max_wait))
            .await
            .map_err(|_| RenderError::WaitExceeded { url: url.to_string(), waited: max_wait })??;

        if !contains_marker(&html, marker)? {
            return Err(RenderError::MarkerMissing { url: url.to_string(), marker: marker.to_string() });
        }

        debug!("Rendered {} ({} bytes)", url, html.len());
        Ok(html)
    }
}
