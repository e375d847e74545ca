//! Input acquisition seam.
//!
//! The executor obtains its two inputs through [`SourceFetcher`] and
//! [`BackgroundFetcher`]. Implementations own their timeout and retry
//! policy; the executor treats any error as fatal for the job.
//!
//! [`AutoFetcher`] routes by locator: plain paths are used in place, direct
//! media URLs are downloaded over HTTP, and other URLs (video pages) go
//! through yt-dlp.

mod http;
mod local;
pub mod retry;
mod ytdlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use smv_core::{BackgroundSpec, Result};

pub use self::http::HttpFetcher;
pub use self::local::LocalFetcher;
pub use self::retry::RetryPolicy;
pub use self::ytdlp::YtDlpFetcher;

/// An obtained input file.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub path: PathBuf,
    /// Whether the file was created for this job and must be cleaned up.
    pub ephemeral: bool,
    /// Title reported by the source, when there is one.
    pub title: Option<String>,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Obtain the source media, writing any download into `dest_dir`.
    async fn fetch_source(&self, locator: &str, dest_dir: &Path) -> Result<Fetched>;
}

#[async_trait]
pub trait BackgroundFetcher: Send + Sync {
    /// Obtain the background asset, writing any download into `dest_dir`.
    async fn fetch_background(&self, spec: &BackgroundSpec, dest_dir: &Path) -> Result<Fetched>;
}

/// Extensions that mark a URL as a direct media download.
const DIRECT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "wav", "flac", "ogg", "opus", "webm", "mp4", "mkv", "mov", "gif", "png",
    "jpg", "jpeg", "webp", "bmp",
];

pub fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Whether `url` points straight at a media file rather than a page.
pub fn is_direct_media(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    Path::new(last)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DIRECT_MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Default routing fetcher.
#[derive(Clone)]
pub struct AutoFetcher {
    local: LocalFetcher,
    http: HttpFetcher,
    ytdlp: Option<YtDlpFetcher>,
}

impl AutoFetcher {
    pub fn new(http: HttpFetcher, ytdlp: Option<YtDlpFetcher>) -> Self {
        Self {
            local: LocalFetcher,
            http,
            ytdlp,
        }
    }
}

#[async_trait]
impl SourceFetcher for AutoFetcher {
    async fn fetch_source(&self, locator: &str, dest_dir: &Path) -> Result<Fetched> {
        if !is_url(locator) {
            return self.local.fetch_source(locator, dest_dir).await;
        }
        if is_direct_media(locator) {
            return self.http.fetch_source(locator, dest_dir).await;
        }
        match &self.ytdlp {
            Some(ytdlp) => ytdlp.fetch_source(locator, dest_dir).await,
            None => Err(smv_core::Error::fetch(
                "source",
                format!("{locator} is not a direct media URL and yt-dlp is not available"),
            )),
        }
    }
}

#[async_trait]
impl BackgroundFetcher for AutoFetcher {
    async fn fetch_background(&self, spec: &BackgroundSpec, dest_dir: &Path) -> Result<Fetched> {
        if is_url(&spec.locator) {
            self.http.fetch_background(spec, dest_dir).await
        } else {
            self.local.fetch_background(spec, dest_dir).await
        }
    }
}

/// The pair of fetchers a job uses.
#[derive(Clone)]
pub struct Fetchers {
    pub source: Arc<dyn SourceFetcher>,
    pub background: Arc<dyn BackgroundFetcher>,
}

impl Fetchers {
    pub fn new(source: Arc<dyn SourceFetcher>, background: Arc<dyn BackgroundFetcher>) -> Self {
        Self { source, background }
    }

    /// Use one routing fetcher for both inputs.
    pub fn auto(fetcher: AutoFetcher) -> Self {
        let shared = Arc::new(fetcher);
        Self {
            source: shared.clone(),
            background: shared,
        }
    }
}
