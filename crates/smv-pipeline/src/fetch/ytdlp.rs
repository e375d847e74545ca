//! Source audio from video pages through yt-dlp.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use smv_av::tools::YTDLP;
use smv_av::{ToolRegistry, ToolRunner};
use smv_core::{Error, Result};

use super::retry::{Attempt, RetryPolicy};
use super::{Fetched, SourceFetcher};

const OUTPUT_STEM: &str = "source";

#[derive(Clone)]
pub struct YtDlpFetcher {
    runner: Arc<dyn ToolRunner>,
    tools: ToolRegistry,
    policy: RetryPolicy,
}

impl YtDlpFetcher {
    /// `None` when yt-dlp was not discovered.
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolRegistry, policy: RetryPolicy) -> Option<Self> {
        tools.is_available(YTDLP).then(|| Self {
            runner,
            tools,
            policy,
        })
    }

    async fn attempt(&self, locator: &str, dest_dir: &Path) -> Attempt<Fetched> {
        let mut cmd = match self.tools.command(YTDLP) {
            Ok(cmd) => cmd,
            Err(e) => return Attempt::Fatal(Error::fetch("source", e.to_string())),
        };
        let template = dest_dir.join(format!("{OUTPUT_STEM}.%(ext)s"));
        cmd.args([
            "--no-playlist",
            "--no-progress",
            "-f",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            "mp3",
            "--no-simulate",
            "--print",
            "title",
            "-o",
        ])
        .path_arg(&template)
        .arg(locator);

        let output = match self.runner.run(&cmd).await {
            Ok(out) => out,
            Err(e) => return Attempt::Retry(Error::fetch("source", e.to_string())),
        };

        match find_download(dest_dir) {
            Some(path) => Attempt::Done(Fetched {
                path,
                ephemeral: true,
                title: output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string),
            }),
            None => Attempt::Fatal(Error::fetch(
                "source",
                format!("yt-dlp produced no audio for {locator}"),
            )),
        }
    }
}

/// The nonempty `source.*` file yt-dlp left in `dir`.
fn find_download(dir: &Path) -> Option<PathBuf> {
    let prefix = format!("{OUTPUT_STEM}.");
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .filter(|e| e.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false))
        .map(|e| e.path())
        .find(|p| !p.to_string_lossy().ends_with(".part"))
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    async fn fetch_source(&self, locator: &str, dest_dir: &Path) -> Result<Fetched> {
        let fetched = self
            .policy
            .run("source", |_| self.attempt(locator, dest_dir))
            .await?;
        tracing::info!(url = locator, path = %fetched.path.display(), title = ?fetched.title, "source downloaded");
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smv_av::testing::ScriptedRunner;

    fn registry() -> ToolRegistry {
        ToolRegistry::with_paths([(YTDLP, PathBuf::from("yt-dlp"))])
    }

    #[test]
    fn unavailable_without_binary() {
        let runner: Arc<dyn ToolRunner> = Arc::new(ScriptedRunner::new());
        assert!(YtDlpFetcher::new(runner, ToolRegistry::default(), RetryPolicy::once()).is_none());
    }

    #[tokio::test]
    async fn downloads_into_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = YtDlpFetcher::new(runner.clone(), registry(), RetryPolicy::once()).unwrap();
        let got = fetcher
            .fetch_source("https://www.youtube.com/watch?v=abc", dir.path())
            .await
            .unwrap();
        assert!(got.ephemeral);
        assert!(got.path.starts_with(dir.path()));

        let call = &runner.calls()[0];
        assert!(call.get_args().contains(&"--no-playlist".to_string()));
        assert_eq!(call.get_args().last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[tokio::test]
    async fn tool_failure_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().fail_when("yt-dlp"));
        let fetcher = YtDlpFetcher::new(runner, registry(), RetryPolicy::once()).unwrap();
        let err = fetcher
            .fetch_source("https://www.youtube.com/watch?v=abc", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[test]
    fn part_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("source.webm.part"), b"x").unwrap();
        assert_eq!(find_download(dir.path()), None);
        std::fs::write(dir.path().join("source.mp3"), b"x").unwrap();
        assert_eq!(find_download(dir.path()), Some(dir.path().join("source.mp3")));
    }
}
