//! Direct HTTP downloads with a request timeout and bounded retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use smv_core::{BackgroundKind, BackgroundSpec, Error, Result};
use tokio::io::AsyncWriteExt;

use super::retry::{Attempt, RetryPolicy};
use super::{BackgroundFetcher, Fetched, SourceFetcher};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Client with the default timeout and user agent.
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        Self::build(policy, DEFAULT_TIMEOUT, concat!("spedup-mv/", env!("CARGO_PKG_VERSION")))
    }

    pub fn from_config(cfg: &smv_core::config::FetchConfig) -> Result<Self> {
        Self::build(
            RetryPolicy::from(cfg),
            Duration::from_secs(cfg.timeout_secs),
            &cfg.user_agent,
        )
    }

    fn build(policy: RetryPolicy, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, policy })
    }

    /// Download `url` to `dest`, retrying transient failures.
    pub async fn download(&self, what: &str, url: &str, dest: &Path) -> Result<u64> {
        self.policy
            .run(what, |attempt| async move {
                tracing::debug!(what, url, attempt, "downloading");
                self.attempt(what, url, dest).await
            })
            .await
    }

    async fn attempt(&self, what: &str, url: &str, dest: &Path) -> Attempt<u64> {
        let mut resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Retry(Error::fetch(what, format!("request failed: {e}"))),
        };

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry(Error::fetch(what, format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Attempt::Fatal(Error::fetch(what, format!("{url} returned {status}")));
        }

        let mut file = match tokio::fs::File::create(dest).await {
            Ok(f) => f,
            Err(e) => return Attempt::Fatal(Error::fetch(what, format!("cannot create {}: {e}", dest.display()))),
        };

        let mut written = 0u64;
        loop {
            match resp.chunk().await {
                Ok(Some(bytes)) => {
                    if let Err(e) = file.write_all(&bytes).await {
                        return Attempt::Fatal(Error::fetch(what, format!("write failed: {e}")));
                    }
                    written += bytes.len() as u64;
                }
                Ok(None) => break,
                Err(e) => return Attempt::Retry(Error::fetch(what, format!("body read failed: {e}"))),
            }
        }
        if let Err(e) = file.flush().await {
            return Attempt::Fatal(Error::fetch(what, format!("write failed: {e}")));
        }

        if written == 0 {
            let _ = tokio::fs::remove_file(dest).await;
            return Attempt::Fatal(Error::fetch(what, format!("downloaded payload from {url} is empty")));
        }
        Attempt::Done(written)
    }
}

/// `<prefix>.<ext>` inside `dir`, taking the extension from the URL path.
fn download_path(dir: &Path, prefix: &str, url: &str, fallback_ext: &str) -> PathBuf {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let ext = Path::new(path.rsplit('/').next().unwrap_or_default())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| fallback_ext.to_string());
    dir.join(format!("{prefix}.{ext}"))
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_source(&self, locator: &str, dest_dir: &Path) -> Result<Fetched> {
        let dest = download_path(dest_dir, "source", locator, "mp3");
        let bytes = self.download("source", locator, &dest).await?;
        tracing::info!(url = locator, bytes, "source downloaded");
        Ok(Fetched {
            path: dest,
            ephemeral: true,
            title: None,
        })
    }
}

#[async_trait]
impl BackgroundFetcher for HttpFetcher {
    async fn fetch_background(&self, spec: &BackgroundSpec, dest_dir: &Path) -> Result<Fetched> {
        let fallback = match spec.kind {
            BackgroundKind::Static => "png",
            BackgroundKind::Looping => "gif",
        };
        let dest = download_path(dest_dir, "background", &spec.locator, fallback);
        let bytes = self.download("background", &spec.locator, &dest).await?;
        tracing::info!(url = %spec.locator, bytes, "background downloaded");
        Ok(Fetched {
            path: dest,
            ephemeral: true,
            title: None,
        })
    }
}
