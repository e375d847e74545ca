//! Application context shared by route handlers through Axum state.

use std::sync::Arc;
use std::time::Duration;

use smv_av::{SystemRunner, ToolInfo, ToolRegistry, ToolRunner};
use smv_core::config::Config;
use smv_pipeline::fetch::RetryPolicy;
use smv_pipeline::{AutoFetcher, Fetchers, HttpFetcher, JobExecutor, JobRegistry, PipelineContext, YtDlpFetcher};

/// Cheaply cloneable: everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration snapshot.
    pub config: Arc<Config>,
    pub executor: JobExecutor,
}

impl AppContext {
    pub fn new(config: Config, executor: JobExecutor) -> Self {
        Self {
            config: Arc::new(config),
            executor,
        }
    }

    /// Discover tools, probe hardware and wire the production fetchers.
    pub async fn initialize(config: Config) -> smv_core::Result<Self> {
        let timeout = Duration::from_secs(config.encoding.tool_timeout_secs);
        let tools = ToolRegistry::discover(&config.tools, timeout);
        report_tools(&tools).await;

        let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner);
        let http = HttpFetcher::from_config(&config.fetch)?;
        let ytdlp = YtDlpFetcher::new(runner.clone(), tools.clone(), RetryPolicy::from(&config.fetch));
        let fetchers = Fetchers::auto(AutoFetcher::new(http, ytdlp));

        let pipeline = PipelineContext::detect(&config, runner, tools, fetchers).await;
        let executor = JobExecutor::new(Arc::new(pipeline), JobRegistry::new());
        Ok(Self::new(config, executor))
    }

    pub fn pipeline(&self) -> &PipelineContext {
        self.executor.context()
    }
}

/// Log tool availability. Version checks spawn the tools, so they run on
/// the blocking pool.
async fn report_tools(tools: &ToolRegistry) -> Vec<ToolInfo> {
    let registry = tools.clone();
    let infos = tokio::task::spawn_blocking(move || registry.check_all())
        .await
        .unwrap_or_default();
    for info in &infos {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use smv_av::tools::{FFMPEG, YTDLP};
    use std::path::PathBuf;

    #[tokio::test(flavor = "current_thread")]
    async fn tool_report_runs_off_the_runtime_thread() {
        let tools = ToolRegistry::with_paths([(FFMPEG, PathBuf::from("/nonexistent/ffmpeg"))]);
        let infos = report_tools(&tools).await;

        assert_eq!(infos.len(), 3);
        let ffmpeg = infos.iter().find(|i| i.name == FFMPEG).unwrap();
        assert!(ffmpeg.available);
        assert_eq!(ffmpeg.version, None);
        let ytdlp = infos.iter().find(|i| i.name == YTDLP).unwrap();
        assert!(!ytdlp.available);
    }
}
