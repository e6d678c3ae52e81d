//! In-memory stand-in for the wiki used by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::prts::sender::{FetchError, HttpFetch};

/// A detail page naming `name` through both its category and its heading.
pub(crate) fn portrait_page(name: &str, image_url: &str) -> String {
    format!(
        r#"<html><body>
             <h1 id="firstHeading">文件:立绘_{name}_1.png</h1>
             <div class="fullImageLink" id="file"><a href="{image_url}"><img></a></div>
             <div id="mw-normal-catlinks"><ul><li><a>{name}立绘</a></li></ul></div>
           </body></html>"#
    )
}

#[derive(Default)]
struct WikiState {
    bodies: HashMap<String, Vec<u8>>,
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    requests: Vec<String>,
}

/// Serves canned bodies by URL and records every request made against it.
/// Unknown URLs answer with HTTP 404.
#[derive(Clone, Default)]
pub(crate) struct FakeWiki {
    state: Arc<Mutex<WikiState>>,
}

impl FakeWiki {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(&self, url: &str, html: &str) {
        self.bytes(url, html.as_bytes());
    }

    pub(crate) fn bytes(&self, url: &str, body: &[u8]) {
        self.state.lock().bodies.insert(url.to_string(), body.to_vec());
    }

    pub(crate) fn status(&self, url: &str, status: u16) {
        self.state.lock().statuses.insert(url.to_string(), status);
    }

    /// Delays every response. A delay longer than the caller's timeout ends in
    /// [FetchError::Timeout] once the delay has passed.
    pub(crate) fn delay(&self, delay: Duration) {
        self.state.lock().default_delay = Some(delay);
    }

    /// Delays responses for one URL only.
    pub(crate) fn delay_for(&self, url: &str, delay: Duration) {
        self.state.lock().delays.insert(url.to_string(), delay);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.state.lock().requests.iter().filter(|r| r.as_str() == url).count()
    }
}

#[async_trait]
impl HttpFetch for FakeWiki {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(url.to_string());
            state.delays.get(url).copied().or(state.default_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            if delay > timeout {
                return Err(FetchError::Timeout { url: url.to_string() });
            }
        }

        let state = self.state.lock();
        if let Some(status) = state.statuses.get(url) {
            return Err(FetchError::Status { url: url.to_string(), status: *status });
        }
        state
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })
    }
}
