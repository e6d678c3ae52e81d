use std::collections::HashSet;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use crate::prts::DetailPageLink;
use crate::prts::renderer::PageRenderer;

/// Marker that tells the renderer the search results have loaded.
pub(crate) const RESULTS_MARKER: &str = "div.searchresults";

static RESULTS: Lazy<Selector> = Lazy::new(|| Selector::parse(RESULTS_MARKER).unwrap());
static RESULT_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("li.mw-search-result").unwrap());
static RESULT_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("table.searchResultImage").unwrap());
static THUMBNAIL_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"td[style="vertical-align: top"]"#).unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// What one page of search results contained.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PageLinks {
    Links(Vec<DetailPageLink>),
    /// The results container was not on the page at all.
    MissingContainer,
}

/// Extracts the detail page links from a rendered search result page.
///
/// Hrefs are resolved against `page_url`, so site-relative links come back absolute.
pub(crate) fn parse_image_links(html: &str, page_url: &Url) -> PageLinks {
    let document = Html::parse_document(html);
    let Some(results) = document.select(&RESULTS).next() else {
        return PageLinks::MissingContainer;
    };

    let links = results
        .select(&RESULT_ROW)
        .filter_map(|row| {
            let table = row.select(&RESULT_IMAGE).next()?;
            let cell = table.select(&THUMBNAIL_CELL).next()?;
            let href = cell.select(&ANCHOR).next()?.value().attr("href")?;
            match page_url.join(href) {
                Ok(url) => Some(DetailPageLink::new(url.to_string())),
                Err(e) => {
                    warn!("Skipping unusable result link \"{}\": {}", href, e);
                    None
                }
            }
        })
        .collect();

    PageLinks::Links(links)
}

/// Builds the URL of the result page starting at `offset`.
pub(crate) fn page_url(base_url: &Url, offset: usize) -> Url {
    let mut url = base_url.clone();
    url.query_pairs_mut().append_pair("offset", &offset.to_string());
    url
}

/// Walks the search index page by page and collects every detail page link.
pub(crate) struct IndexPaginator<R> {
    renderer: R,
    page_size: usize,
    page_delay: Duration,
    render_wait: Duration,
}

impl<R: PageRenderer> IndexPaginator<R> {
    pub(crate) fn new(renderer: R, page_size: usize, page_delay: Duration, render_wait: Duration) -> Self {
        Self {
            renderer,
            page_size,
            page_delay,
            render_wait,
        }
    }

    /// Collects links until a page yields nothing new or a page cannot be rendered.
    ///
    /// A render failure is not an error for the run: whatever was collected before it is returned.
    pub(crate) async fn paginate(&self, base_url: &Url) -> Vec<DetailPageLink> {
        let mut all_links = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;

        loop {
            let url = page_url(base_url, offset);
            info!("Processing search results at offset {}...", offset);

            let html = match self.renderer.render(url.as_str(), RESULTS_MARKER, self.render_wait).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Unable to render {}: {}", url, e);
                    error!("Stopping discovery with {} links collected.", all_links.len());
                    break;
                }
            };

            let links = match parse_image_links(&html, &url) {
                PageLinks::Links(links) => links,
                PageLinks::MissingContainer => {
                    warn!("No search results container on {}, check the page structure or URL.", url);
                    break;
                }
            };

            let found = links.len();
            let before = all_links.len();
            for link in links {
                if seen.insert(link.clone()) {
                    all_links.push(link);
                }
            }

            let new_links = all_links.len() - before;
            if new_links == 0 {
                if found == 0 {
                    info!("No more image links at offset {}, discovery complete.", offset);
                } else {
                    info!("All {} links at offset {} were already collected, discovery complete.", found, offset);
                }
                break;
            }

            info!("Found {} new links, {} in total.", new_links, all_links.len());
            trace!("Sleeping {:?} before the next page", self.page_delay);
            offset += self.page_size;
            tokio::time::sleep(self.page_delay).await;
        }

        debug!("Discovery finished after offset {}", offset);
        all_links
    }
}
