use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::prts::sender::{FetchError, HttpFetch};
use crate::prts::{DetailPageLink, SkipReason};

/// Marks categories and file names that hold an operator's full artwork.
pub(crate) const PORTRAIT_MARKER: &str = "立绘";

/// Present in the names of category index pages, which never name a single operator.
const CATEGORY_LABEL: &str = "分类";

/// Reserve operators share placeholder artwork and are never downloaded.
const RESERVE_PREFIX: &str = "预备干员";

const HEADING_PREFIX: &str = "文件:";
const HEADING_SUFFIX: &str = ".png";

lazy_static! {
    /// `立绘_<name>_...` as used in portrait file names.
    static ref PORTRAIT_SEGMENT: Regex = Regex::new(r"立绘_([^_]+)").unwrap();

    /// Everything before the first parenthesis, e.g. the name in `阿米娅(近卫)`.
    static ref BEFORE_PARENTHESIS: Regex = Regex::new(r"([^(]+)").unwrap();

    /// Characters that are not allowed in file names on common file systems.
    static ref RESERVED_CHARACTERS: Regex = Regex::new(r#"[\\/*?:"<>|]"#).unwrap();
}

static CATEGORY_LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("#mw-normal-catlinks ul li a").unwrap());
static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1#firstHeading").unwrap());
static FULL_IMAGE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("div.fullImageLink#file").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Errors produced while resolving a detail page.
#[derive(Error, Debug)]
pub(crate) enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("No full image link on {url}")]
    MissingImageLink { url: String },
}

/// The operator name and the direct image URL found on a detail page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedAsset {
    /// Already sanitized for use as a file name.
    pub(crate) subject_name: String,
    pub(crate) image_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    Asset(ResolvedAsset),
    Skipped(SkipReason),
}

/// One way of finding the operator name on a detail page.
pub(crate) trait NameExtractor: Send + Sync {
    fn label(&self) -> &'static str;

    fn extract(&self, page: &Html) -> Option<String>;
}

/// Takes the name from the first portrait category, e.g. `阿米娅立绘`.
pub(crate) struct CategoryNameExtractor;

impl NameExtractor for CategoryNameExtractor {
    fn label(&self) -> &'static str {
        "category"
    }

    fn extract(&self, page: &Html) -> Option<String> {
        page.select(&CATEGORY_LINKS)
            .map(|link| element_text(&link))
            .find(|text| text.contains(PORTRAIT_MARKER) && !text.contains(CATEGORY_LABEL))
            .map(|text| text.replace(PORTRAIT_MARKER, "").trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// Parses the name out of the page heading, e.g. `文件:立绘_阿米娅_1.png`.
pub(crate) struct HeadingNameExtractor;

impl HeadingNameExtractor {
    fn name_from_heading(heading: &str) -> Option<String> {
        let base_name = heading.replace(HEADING_PREFIX, "");
        let base_name = match base_name.rsplit_once(HEADING_SUFFIX) {
            Some((stem, _)) => stem,
            None => base_name.as_str(),
        };

        PORTRAIT_SEGMENT
            .captures(base_name)
            .or_else(|| BEFORE_PARENTHESIS.captures(base_name))
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

impl NameExtractor for HeadingNameExtractor {
    fn label(&self) -> &'static str {
        "heading"
    }

    fn extract(&self, page: &Html) -> Option<String> {
        let heading = page.select(&HEADING).next()?;
        Self::name_from_heading(&element_text(&heading))
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Strips characters that cannot appear in a file name.
pub(crate) fn sanitize_name(name: &str) -> String {
    RESERVED_CHARACTERS.replace_all(name, "").into_owned()
}

/// The extractors in priority order.
pub(crate) fn default_extractors() -> Vec<Box<dyn NameExtractor>> {
    vec![Box::new(CategoryNameExtractor), Box::new(HeadingNameExtractor)]
}

/// Works out what a detail page points at without touching the network.
pub(crate) fn parse_detail_page(
    html: &str,
    page_url: &str,
    extractors: &[Box<dyn NameExtractor>],
) -> Result<Resolution, ResolveError> {
    let page = Html::parse_document(html);

    let found = extractors.iter().find_map(|extractor| {
        let name = extractor.extract(&page)?;
        trace!("Name \"{}\" found by {} extractor on {}", name, extractor.label(), page_url);
        Some(name)
    });

    let Some(name) = found else {
        return Ok(Resolution::Skipped(SkipReason::NoSubject));
    };
    if name.starts_with(RESERVE_PREFIX) {
        return Ok(Resolution::Skipped(SkipReason::ReserveOperator(name)));
    }

    let subject_name = sanitize_name(&name);
    if subject_name.trim().is_empty() {
        debug!("Name \"{}\" on {} is empty once sanitized", name, page_url);
        return Ok(Resolution::Skipped(SkipReason::NoSubject));
    }

    let href = page
        .select(&FULL_IMAGE_LINK)
        .next()
        .and_then(|container| container.select(&ANCHOR).next())
        .and_then(|anchor| anchor.value().attr("href"))
        .ok_or_else(|| ResolveError::MissingImageLink { url: page_url.to_string() })?;

    let image_url = Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string());

    Ok(Resolution::Asset(ResolvedAsset { subject_name, image_url }))
}

/// Fetches detail pages and resolves them into downloadable assets.
pub(crate) struct DetailResolver<F> {
    fetcher: F,
    timeout: Duration,
    extractors: Vec<Box<dyn NameExtractor>>,
}

impl<F: HttpFetch> DetailResolver<F> {
    pub(crate) fn new(fetcher: F, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            extractors: default_extractors(),
        }
    }

    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub(crate) async fn resolve(&self, link: &DetailPageLink) -> Result<Resolution, ResolveError> {
        let html = self.fetcher.get_text(link.as_str(), self.timeout).await?;
        parse_detail_page(&html, link.as_str(), &self.extractors)
    }
}
