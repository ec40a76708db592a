use crate::job::{
    filename_from_url, DownloadJob, PostAction, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
    DEFAULT_WORKERS,
};
use crate::Result;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Persisted application configuration.
///
/// Field names match the `config.json` layout of earlier releases, so an
/// existing file keeps loading. `max_download_speed` and `max_retry_count`
/// are parsed for compatibility but carry no behavior: the core neither
/// throttles nor retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_save_path: String,
    pub default_agent_num: u8,
    /// KB/s cap kept from older config files, not enforced
    pub max_download_speed: u64,
    pub auto_start: bool,
    pub enable_log_file: bool,
    pub proxy: String,
    /// Retry budget kept from older config files, not enforced
    pub max_retry_count: u32,
    /// Per-request timeout in seconds
    pub download_timeout: u64,
    pub post_download_action: PostAction,
    pub custom_user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_save_path: String::new(),
            default_agent_num: DEFAULT_WORKERS,
            max_download_speed: 0,
            auto_start: false,
            enable_log_file: false,
            proxy: String::new(),
            max_retry_count: 3,
            download_timeout: DEFAULT_TIMEOUT_SECS,
            post_download_action: PostAction::None,
            custom_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Read the configuration from `path`, writing and returning the defaults
    /// when the file doesn't exist yet
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {:?}, writing defaults", path);
            let cfg = Self::default();
            cfg.save(path)?;
            return Ok(cfg);
        }
        let file = fs::File::open(path)?;
        serde_json::from_reader(file).map_err(Into::into)
    }

    /// Write the configuration to `path` as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(Into::into)
    }

    /// Derive a [`DownloadJob`] for `url`, saved under the configured
    /// directory. `filename` overrides the name taken from the URL path.
    pub fn job(&self, url: Url, filename: Option<&str>) -> Result<DownloadJob> {
        let name = match filename {
            Some(n) => n.to_string(),
            None => filename_from_url(&url)?,
        };
        let output = Path::new(&self.default_save_path).join(name);
        let mut builder = DownloadJob::builder();
        builder
            .url(url)
            .output(output)
            .workers(self.default_agent_num)
            .timeout(Duration::from_secs(self.download_timeout))
            .user_agent(self.custom_user_agent.clone())
            .post_action(self.post_download_action);
        if !self.proxy.is_empty() {
            builder.proxy(Url::parse(&self.proxy)?);
        }
        builder.build().map_err(Into::into)
    }
}
