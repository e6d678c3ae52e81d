use std::fs::{read_to_string, write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Error};
use log::{info, trace};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

pub(crate) mod directory;

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.json";

/// Config read once at startup and used unchanged for the whole run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Config {
    /// Search index listing the portrait files.
    #[serde(rename = "baseUrl", default = "default_base_url")]
    base_url: String,
    /// Identification sent with every request.
    #[serde(rename = "userAgent", default = "default_user_agent")]
    user_agent: String,
    /// Where the images are saved.
    #[serde(rename = "outputDirectory", default = "default_output_directory")]
    output_directory: String,
    /// Extension given to every saved image.
    #[serde(rename = "imageExtension", default = "default_image_extension")]
    image_extension: String,
    /// Number of results requested per search page.
    #[serde(rename = "pageSize", default = "default_page_size")]
    page_size: usize,
    #[serde(rename = "pageDelaySecs", default = "default_page_delay_secs")]
    page_delay_secs: u64,
    #[serde(rename = "renderWaitSecs", default = "default_render_wait_secs")]
    render_wait_secs: u64,
    #[serde(rename = "detailTimeoutSecs", default = "default_detail_timeout_secs")]
    detail_timeout_secs: u64,
    #[serde(rename = "imageTimeoutSecs", default = "default_image_timeout_secs")]
    image_timeout_secs: u64,
    /// Number of concurrent download workers.
    #[serde(rename = "poolSize", default = "default_pool_size")]
    pool_size: usize,
    /// Consecutive failures that abort the download phase.
    #[serde(rename = "failureThreshold", default = "default_failure_threshold")]
    failure_threshold: usize,
}

fn default_base_url() -> String {
    "https://prts.wiki/index.php?title=%E7%89%B9%E6%AE%8A:%E6%90%9C%E7%B4%A2&limit=500&profile=images&search=%E7%AB%8B%E7%BB%98".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}
fn default_output_directory() -> String { "Arknights_PRTS".to_string() }
fn default_image_extension() -> String { "png".to_string() }
fn default_page_size() -> usize { 500 }
fn default_page_delay_secs() -> u64 { 2 }
fn default_render_wait_secs() -> u64 { 30 }
fn default_detail_timeout_secs() -> u64 { 20 }
fn default_image_timeout_secs() -> u64 { 25 }
fn default_pool_size() -> usize { 10 }
fn default_failure_threshold() -> usize { 3 }

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            output_directory: default_output_directory(),
            image_extension: default_image_extension(),
            page_size: default_page_size(),
            page_delay_secs: default_page_delay_secs(),
            render_wait_secs: default_render_wait_secs(),
            detail_timeout_secs: default_detail_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            pool_size: default_pool_size(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Config {
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn output_directory(&self) -> &str {
        &self.output_directory
    }

    pub(crate) fn image_extension(&self) -> &str {
        &self.image_extension
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size.max(1)
    }

    pub(crate) fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub(crate) fn render_wait(&self) -> Duration {
        Duration::from_secs(self.render_wait_secs)
    }

    pub(crate) fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    pub(crate) fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub(crate) fn pool_size(&self) -> usize {
        self.pool_size.max(1)
    }

    pub(crate) fn failure_threshold(&self) -> usize {
        self.failure_threshold.max(1)
    }

    /// Loads the config at `path`, writing the defaults there first if it does not exist.
    pub(crate) fn load_or_create(path: &Path) -> Result<Config, Error> {
        if !path.exists() {
            trace!("{}: does not exist!", path.display());
            info!("Creating config file with default settings...");
            let json = to_string_pretty(&Config::default())?;
            write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let json = read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = from_str(&json).with_context(|| format!("{} is not valid config JSON", path.display()))?;
        trace!("Loaded config: {:?}", config);

        Ok(config)
    }
}
