//! Job executor: the Fetching -> Preparing -> Encoding -> Muxing ->
//! Finalizing state machine.
//!
//! A job runs on a worker task that owns the claimed [`JobSlot`]. Progress is
//! reported at fixed checkpoints, cancellation is honoured between stages
//! only, and every exit path writes a terminal state before the slot is
//! released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use smv_av::actions::{
    extract_frame, frame_path, loop_levels, mux_template, overlay_template, speed_transform_levels,
    static_levels, transformed_duration,
};
use smv_av::{Manifest, OutputResolver, ToolCommand, Workspace};
use smv_core::{
    BackgroundKind, Error, JobId, JobRequest, JobStatus, MediaKind, PipelineStage, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::PipelineContext;
use crate::fallback::{run_with_fallback, verify_artifact, Attempted};
use crate::fetch::Fetched;
use crate::registry::{JobRegistry, JobSlot};
use crate::stage::StageLadder;
use crate::tracker::{checkpoint, ProgressTracker};

/// Target length used when neither the transformed audio nor the source
/// can be probed.
pub const FALLBACK_TARGET_SECS: f64 = 180.0;

/// How much shorter than the target a background track may be.
const DURATION_TOLERANCE_SECS: f64 = 1.0;

/// Target multiplier for the single background redo.
const REPAIR_FACTOR: f64 = 1.5;

/// Submits jobs and runs them against a shared [`PipelineContext`].
#[derive(Clone)]
pub struct JobExecutor {
    ctx: Arc<PipelineContext>,
    registry: Arc<JobRegistry>,
}

impl JobExecutor {
    pub fn new(ctx: Arc<PipelineContext>, registry: Arc<JobRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn status(&self) -> JobStatus {
        self.registry.tracker().snapshot()
    }

    /// Validate `request`, claim the slot and start the job on a background
    /// task. Returns as soon as the job is accepted.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a bad request and [`Error::Conflict`] when a
    /// job is already running. Neither touches the running job.
    pub fn submit(&self, request: JobRequest) -> Result<JobId> {
        request.validate()?;
        let slot = self.registry.try_claim(JobId::new())?;
        let job_id = slot.job_id();
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            run_claimed(&ctx, slot, request).await;
        });
        Ok(job_id)
    }

    /// Run a job to completion on the current task and return its terminal
    /// status.
    pub async fn run(&self, request: JobRequest) -> Result<JobStatus> {
        request.validate()?;
        let slot = self.registry.try_claim(JobId::new())?;
        run_claimed(&self.ctx, slot, request).await;
        Ok(self.status())
    }
}

async fn run_claimed(ctx: &PipelineContext, slot: JobSlot, request: JobRequest) {
    let job_id = slot.job_id();
    let span = tracing::info_span!("job", job_id = %job_id);

    async {
        let tracker = slot.tracker();
        let mut workspace = match new_workspace(ctx, job_id) {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!("job failed before start: {e}");
                tracker.fail(failure_message(&e));
                return;
            }
        };

        let result = Job {
            ctx,
            request,
            tracker,
            cancel: slot.cancellation(),
            ws: &mut workspace,
        }
        .execute()
        .await;

        match result {
            Ok(output) => {
                tracing::info!(output = %output.display(), "job complete");
                tracker.complete(output);
            }
            Err(e) => {
                let message = failure_message(&e);
                tracing::error!("job failed: {message}");
                let removed = workspace.cleanup();
                tracing::debug!(removed, "ephemeral assets removed after failure");
                if ctx.output.keep_failed_scratch {
                    if let Some(dir) = workspace.persist() {
                        tracing::warn!(dir = %dir.display(), "scratch directory kept for diagnosis");
                    }
                }
                tracker.fail(message);
            }
        }
    }
    .instrument(span)
    .await;

    drop(slot);
}

fn new_workspace(ctx: &PipelineContext, job_id: JobId) -> Result<Workspace> {
    match &ctx.scratch_root {
        Some(root) => Workspace::new_in(root, job_id),
        None => Workspace::new(job_id),
    }
}

/// Human-readable status message for a fatal error.
fn failure_message(err: &Error) -> String {
    match err {
        Error::Cancelled => "cancelled".into(),
        Error::Fetch { what, message } => format!("{what} could not be obtained: {message}"),
        other => other.to_string(),
    }
}

fn as_fetch_error(what: &str, err: Error) -> Error {
    match err {
        Error::Fetch { .. } => err,
        other => Error::fetch(what, other.to_string()),
    }
}

/// What the background track is rendered from.
#[derive(Debug, Clone)]
enum TrackSource {
    Looping { path: PathBuf, loop_secs: Option<f64> },
    Still(PathBuf),
}

/// One running job.
struct Job<'a> {
    ctx: &'a PipelineContext,
    request: JobRequest,
    tracker: &'a ProgressTracker,
    cancel: CancellationToken,
    ws: &'a mut Workspace,
}

impl Job<'_> {
    async fn execute(&mut self) -> Result<PathBuf> {
        let base = self.ctx.ffmpeg()?;

        // -- Fetching -------------------------------------------------------
        self.ensure_active()?;
        let fetched = self
            .ctx
            .fetchers
            .background
            .fetch_background(&self.request.background, self.ws.path())
            .await
            .map_err(|e| as_fetch_error("background", e))?;
        let fallback_kind = match self.request.background.kind {
            BackgroundKind::Static => MediaKind::Image,
            BackgroundKind::Looping => MediaKind::Video,
        };
        let background = self.adopt(fetched, fallback_kind);
        self.progress(checkpoint::BACKGROUND_FETCHED, PipelineStage::Fetching, "Background fetched");

        self.ensure_active()?;
        let fetched = self
            .ctx
            .fetchers
            .source
            .fetch_source(&self.request.source_locator, self.ws.path())
            .await
            .map_err(|e| as_fetch_error("source", e))?;
        if self.request.title.is_none() {
            self.request.title = fetched.title.clone();
        }
        let source = self.adopt(fetched, MediaKind::Audio);
        self.progress(checkpoint::SOURCE_FETCHED, PipelineStage::Fetching, "Source fetched");

        // -- Preparing ------------------------------------------------------
        self.ensure_active()?;
        verify_artifact(&background).map_err(|e| Error::fetch("background", e.to_string()))?;
        self.ctx
            .prober
            .video_stream(&background)
            .await
            .map_err(|e| Error::fetch("background", e.to_string()))?;
        verify_artifact(&source).map_err(|e| Error::fetch("source", e.to_string()))?;
        let source_secs = self.duration_of(&source).await;
        self.progress(checkpoint::INPUTS_VALIDATED, PipelineStage::Preparing, "Inputs validated");

        self.ensure_active()?;
        let ratio = self.request.speed.ratio;
        let speed = StageLadder::new(
            "speed",
            speed_transform_levels(
                &source,
                self.ws.path(),
                "speed",
                ratio,
                self.ctx.encoding.sample_rate,
            ),
        )
        .run(self.ctx.runner.as_ref(), &base, &self.ctx.encoders)
        .await?;
        tracing::debug!(level = speed.level, attempts = speed.attempted.attempts, "speed transform done");
        let audio = self.ws.register(speed.attempted.output, MediaKind::Audio).path;
        self.progress(
            checkpoint::SPEED_TRANSFORMED,
            PipelineStage::Preparing,
            format!("Audio transformed at {ratio}x"),
        );

        self.ensure_active()?;
        let target = self.target_duration(&audio, source_secs).await;
        self.progress(
            checkpoint::DURATION_PROBED,
            PipelineStage::Preparing,
            format!("Target duration {target:.1}s"),
        );

        // -- Encoding -------------------------------------------------------
        self.ensure_active()?;
        let video = self.background_track(&background, target, &base).await?;
        self.progress(checkpoint::BACKGROUND_ENCODED, PipelineStage::Encoding, "Background video ready");

        // -- Muxing ---------------------------------------------------------
        self.ensure_active()?;
        let ext = self
            .request
            .output_options
            .extension
            .clone()
            .unwrap_or_else(|| self.ctx.output.extension.clone());
        let template = mux_template(
            &video.output,
            &audio,
            &self.ws.file(&format!("final.{ext}")),
            &self.ctx.encoding.audio_bitrate,
        );
        let ladder = self.ctx.selector.mux_ladder(video.profile.as_ref());
        let muxed = run_with_fallback(self.ctx.runner.as_ref(), &base, "mux", &template, &ladder).await?;
        self.ws.register(&muxed.output, MediaKind::Video);
        tracing::debug!(attempts = muxed.attempts, "mux done");
        let via = muxed.profile.as_ref().map_or("none", |p| p.id.as_str());
        self.progress(checkpoint::MUXED, PipelineStage::Muxing, format!("Muxed ({via})"));

        // -- Finalizing -----------------------------------------------------
        self.ensure_active()?;
        let output = self.finalize(&muxed.output, &ext)?;
        let removed = self.ws.cleanup();
        tracing::debug!(removed, "ephemeral assets removed");
        self.progress(checkpoint::CLEANED_UP, PipelineStage::Finalizing, "Cleaned up");

        Ok(output)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!("cancellation observed between stages");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn progress(&self, pct: u8, stage: PipelineStage, message: impl Into<String>) {
        self.tracker.advance(pct, stage, message);
    }

    /// Track a fetched input. Only inputs created for this job are removed
    /// at cleanup.
    fn adopt(&mut self, fetched: Fetched, fallback: MediaKind) -> PathBuf {
        let kind = MediaKind::from_path(&fetched.path).unwrap_or(fallback);
        if fetched.ephemeral {
            self.ws.register(&fetched.path, kind);
        } else {
            self.ws.adopt(&fetched.path, kind);
        }
        fetched.path
    }

    /// Duration of a tracked asset, measured on first use.
    async fn duration_of(&mut self, path: &Path) -> Option<f64> {
        if let Some(secs) = self.ws.duration(path) {
            return Some(secs);
        }
        let secs = self.ctx.prober.duration_or_none(path).await?;
        self.ws.record_duration(path, secs);
        Some(secs)
    }

    /// Length the background track must cover.
    async fn target_duration(&mut self, audio: &Path, source_secs: Option<f64>) -> f64 {
        if let Some(secs) = self.duration_of(audio).await {
            return secs;
        }
        match source_secs {
            Some(secs) => transformed_duration(secs, self.request.speed.ratio),
            None => {
                tracing::warn!(secs = FALLBACK_TARGET_SECS, "no duration known; using fallback target");
                FALLBACK_TARGET_SECS
            }
        }
    }

    /// Render the background into a silent video track covering `target`,
    /// with the single duration repair and the optional overlay.
    async fn background_track(
        &mut self,
        background: &Path,
        target: f64,
        base: &ToolCommand,
    ) -> Result<Attempted> {
        let output = self.ws.file("background.mp4");
        let (source, mut track) = self.render_background(background, &output, target, base).await?;

        let probed = self.ctx.prober.duration(&track.output).await;
        if let Ok(actual) = probed {
            self.ws.record_duration(&track.output, actual);
        }
        match probed {
            Ok(actual) if actual < target - DURATION_TOLERANCE_SECS => {
                let extended = target * REPAIR_FACTOR;
                tracing::warn!(actual, target, extended, "background track too short; redoing once");
                let redo_output = self.ws.file("background_extended.mp4");
                match self.render(&source, &redo_output, extended, base).await {
                    Ok(redo) => {
                        self.ws.discard(&track.output);
                        track = redo;
                    }
                    Err(e) => tracing::warn!("background redo failed; keeping the short track: {e}"),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("background duration check skipped: {e}"),
        }

        let overlay = self
            .request
            .output_options
            .overlay_text
            .clone()
            .filter(|t| !t.trim().is_empty());
        if let Some(text) = overlay {
            let annotated = self.ws.file("background_overlay.mp4");
            let template = overlay_template(&track.output, &text, &annotated);
            match run_with_fallback(self.ctx.runner.as_ref(), base, "overlay", &template, &self.ctx.encoders).await {
                Ok(done) => {
                    self.ws.register(&done.output, MediaKind::Video);
                    self.ws.discard(&track.output);
                    track = done;
                }
                Err(e) => {
                    tracing::warn!("overlay skipped: {e}");
                    self.ws.discard(&annotated);
                }
            }
        }

        Ok(track)
    }

    /// First render of the background. A looping asset whose loop
    /// strategies are all exhausted is re-entered as a still frame.
    async fn render_background(
        &mut self,
        background: &Path,
        output: &Path,
        target: f64,
        base: &ToolCommand,
    ) -> Result<(TrackSource, Attempted)> {
        if self.request.background.kind == BackgroundKind::Static {
            let source = TrackSource::Still(background.to_path_buf());
            let track = self.render(&source, output, target, base).await?;
            return Ok((source, track));
        }

        let source = TrackSource::Looping {
            path: background.to_path_buf(),
            loop_secs: self.duration_of(background).await,
        };
        match self.render(&source, output, target, base).await {
            Ok(track) => Ok((source, track)),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("loop strategies exhausted; falling back to a still frame: {e}");
                let frame = frame_path(self.ws.path());
                StageLadder::new("background", vec![extract_frame(background, &frame)])
                    .run(self.ctx.runner.as_ref(), base, &self.ctx.encoders)
                    .await?;
                self.ws.register(&frame, MediaKind::Image);

                let still = TrackSource::Still(frame);
                let track = self.render(&still, output, target, base).await?;
                Ok((still, track))
            }
            Err(e) => Err(e),
        }
    }

    async fn render(
        &mut self,
        source: &TrackSource,
        output: &Path,
        target: f64,
        base: &ToolCommand,
    ) -> Result<Attempted> {
        let fps = self.ctx.encoding.frame_rate;
        let levels = match source {
            TrackSource::Looping { path, loop_secs } => loop_levels(path, output, target, *loop_secs, fps),
            TrackSource::Still(path) => static_levels(path, output, target, fps),
        };
        let outcome = StageLadder::new("background", levels)
            .run(self.ctx.runner.as_ref(), base, &self.ctx.encoders)
            .await?;
        tracing::debug!(
            level = outcome.level,
            attempts = outcome.attempted.attempts,
            output = %outcome.attempted.output.display(),
            "background rendered"
        );
        self.ws.register(&outcome.attempted.output, MediaKind::Video);
        Ok(outcome.attempted)
    }

    /// Move the artifact into the outputs directory and write the manifest.
    fn finalize(&mut self, artifact: &Path, ext: &str) -> Result<PathBuf> {
        let dir = self
            .request
            .output_options
            .output_dir
            .clone()
            .unwrap_or_else(|| self.ctx.output.dir.clone());
        let resolver = OutputResolver::new(dir);
        let placed = resolver.place(artifact, &self.request.output_stem(), ext)?;
        self.ws.release(artifact);

        if self.request.output_options.keep_manifest {
            let manifest = Manifest {
                title: self.request.title.clone(),
                source_locator: self.request.source_locator.clone(),
                background_kind: self.request.background.kind,
                background_locator: self.request.background.locator.clone(),
                ratio: self.request.speed.ratio,
                created: Local::now(),
            };
            if let Some(path) = resolver.write_manifest(&placed, &manifest) {
                tracing::debug!(path = %path.display(), "manifest written");
            }
        }
        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{AutoFetcher, Fetchers, HttpFetcher, LocalFetcher, RetryPolicy, SourceFetcher};
    use async_trait::async_trait;
    use smv_av::testing::{Outcome, ScriptedRunner};
    use smv_av::tools::{FFMPEG, FFPROBE};
    use smv_av::{CapabilitySet, ToolRegistry};
    use smv_core::config::Config;
    use smv_core::{BackgroundSpec, JobState, OutputOptions, SpeedSpec};
    use tempfile::TempDir;

    struct Harness {
        root: TempDir,
        runner: Arc<ScriptedRunner>,
        executor: JobExecutor,
    }

    impl Harness {
        fn new(runner: ScriptedRunner) -> Self {
            Self::with_fetchers(runner, |_| auto_fetchers())
        }

        fn with_fetchers(runner: ScriptedRunner, fetchers: impl FnOnce(&Arc<JobRegistry>) -> Fetchers) -> Self {
            let root = tempfile::tempdir().unwrap();
            std::fs::create_dir(root.path().join("scratch")).unwrap();
            std::fs::write(root.path().join("song.mp3"), b"ID3-audio").unwrap();
            std::fs::write(root.path().join("cover.png"), b"PNG-image").unwrap();
            std::fs::write(root.path().join("loop.gif"), b"GIF89a").unwrap();

            let mut config = Config::default();
            config.output.dir = root.path().join("outputs");

            let runner = Arc::new(runner);
            let tools = ToolRegistry::with_paths([
                (FFMPEG, PathBuf::from("ffmpeg")),
                (FFPROBE, PathBuf::from("ffprobe")),
            ]);
            let registry = JobRegistry::new();
            let ctx = PipelineContext::new(
                &config,
                runner.clone(),
                tools,
                fetchers(&registry),
                CapabilitySet::default(),
            )
            .with_scratch_root(root.path().join("scratch"));

            Self {
                executor: JobExecutor::new(Arc::new(ctx), registry),
                runner,
                root,
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        fn request(&self, kind: BackgroundKind, background: &str, ratio: f64) -> JobRequest {
            JobRequest {
                source_locator: self.path("song.mp3").to_string_lossy().into_owned(),
                title: None,
                background: BackgroundSpec {
                    kind,
                    locator: background.to_string(),
                },
                speed: SpeedSpec { ratio },
                output_options: OutputOptions::default(),
            }
        }

        fn static_request(&self) -> JobRequest {
            let cover = self.path("cover.png");
            self.request(BackgroundKind::Static, &cover.to_string_lossy(), SpeedSpec::NIGHTCORE)
        }

        fn scratch_entries(&self) -> Vec<PathBuf> {
            std::fs::read_dir(self.path("scratch"))
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect()
        }
    }

    fn auto_fetchers() -> Fetchers {
        Fetchers::auto(AutoFetcher::new(
            HttpFetcher::new(RetryPolicy::once()).unwrap(),
            None,
        ))
    }

    /// 180 s source at 1.4x, background track long enough.
    fn nightcore_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .with_duration("song.mp3", Some(180.0))
            .with_duration("speed.mp3", Some(128.571))
            .with_duration("background.mp4", Some(128.6))
    }

    #[tokio::test]
    async fn static_nightcore_job_completes() {
        let h = Harness::new(nightcore_runner());
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        assert_eq!(status.progress, 100);
        let output = status.output_path.unwrap();
        assert!(output.starts_with(h.path("outputs")));
        assert_eq!(output.file_name().unwrap(), "nightcore_song.mp4");
        assert!(output.is_file());

        let calls = h.runner.ffmpeg_calls();
        assert_eq!(calls.len(), 3, "{calls:#?}");
        assert!(calls[0].contains("asetrate=61740,aresample=44100"));
        assert!(calls[1].contains("-loop 1") && calls[1].contains("-t 128.571"));
        assert!(calls[2].contains("-shortest") && calls[2].contains("-c:v copy"));

        // Local inputs are untouched, scratch is gone.
        assert!(h.path("song.mp3").is_file());
        assert!(h.scratch_entries().is_empty());
        assert!(!h.executor.registry().is_busy());
    }

    #[tokio::test]
    async fn empty_background_payload_fails_cleanly() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = Harness::new(nightcore_runner());
        let locator = format!("{}/cover.png", server.uri());
        let status = h
            .executor
            .run(h.request(BackgroundKind::Static, &locator, SpeedSpec::NIGHTCORE))
            .await
            .unwrap();

        assert_eq!(status.state, JobState::Failed);
        assert!(status.message.contains("background could not be obtained"), "{}", status.message);
        assert!(status.output_path.is_none());
        assert!(h.scratch_entries().is_empty());
        assert!(h.runner.ffmpeg_calls().is_empty());
    }

    #[tokio::test]
    async fn background_without_video_stream_fails_as_fetch() {
        let h = Harness::new(nightcore_runner().with_video_stream("cover.png", None));
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Failed);
        assert!(
            status.message.starts_with("background could not be obtained"),
            "{}",
            status.message
        );
        assert_eq!(status.progress, checkpoint::SOURCE_FETCHED);
        assert!(h.runner.ffmpeg_calls().is_empty());
        assert!(h.scratch_entries().is_empty());
    }

    #[tokio::test]
    async fn failing_stream_read_fails_as_fetch() {
        let h = Harness::new(nightcore_runner().fail_when("-select_streams v:0"));
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Failed);
        assert!(status.message.starts_with("background could not be obtained"), "{}", status.message);
        assert!(h.runner.ffmpeg_calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_ladder_fails_and_keeps_partial() {
        let runner = nightcore_runner().rule("-loop 1", Outcome::FailWithPartial, None);
        let h = Harness::new(runner);
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Failed);
        assert!(!status.message.is_empty());
        assert!(status.message.contains("background"), "{}", status.message);
        assert!(status.output_path.is_none());
        assert_eq!(status.progress, checkpoint::DURATION_PROBED);

        // The exhausting partial survives; the transformed audio does not.
        let kept = h.scratch_entries();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].join("background.mp4").is_file());
        assert!(!kept[0].join("speed.mp3").exists());
        std::fs::remove_dir_all(&kept[0]).unwrap();
    }

    #[tokio::test]
    async fn submission_while_running_conflicts() {
        let h = Harness::new(nightcore_runner());
        let running = h.executor.registry().try_claim(JobId::new()).unwrap();

        let err = h.executor.submit(h.static_request()).unwrap_err();
        assert_eq!(err.http_status(), 409);
        let status = h.executor.status();
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.job_id, Some(running.job_id()));
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_claim() {
        let h = Harness::new(nightcore_runner());
        let mut request = h.static_request();
        request.speed.ratio = 0.0;
        let err = h.executor.submit(request).unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(!h.executor.registry().is_busy());
        assert_eq!(h.executor.status().state, JobState::Idle);
    }

    #[tokio::test]
    async fn identical_jobs_produce_distinct_outputs() {
        let h = Harness::new(nightcore_runner());
        let first = h.executor.run(h.static_request()).await.unwrap();
        let second = h.executor.run(h.static_request()).await.unwrap();

        let a = first.output_path.unwrap();
        let b = second.output_path.unwrap();
        assert_ne!(a, b);
        assert!(a.is_file() && b.is_file());
        assert_ne!(first.job_id, second.job_id);
    }

    #[tokio::test]
    async fn submitted_job_runs_in_background() {
        let h = Harness::new(nightcore_runner());
        let job_id = h.executor.submit(h.static_request()).unwrap();

        let mut status = h.executor.status();
        for _ in 0..500 {
            if status.state.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            status = h.executor.status();
        }
        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        assert_eq!(status.job_id, Some(job_id));
    }

    #[tokio::test]
    async fn failed_stream_copy_mux_reencodes_on_cpu() {
        let h = Harness::new(nightcore_runner().fail_when("-c:v copy"));
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        let mux: Vec<_> = h
            .runner
            .ffmpeg_calls()
            .into_iter()
            .filter(|c| c.contains("-shortest"))
            .collect();
        assert_eq!(mux.len(), 2, "{mux:#?}");
        assert!(mux[0].contains("-c:v copy"));
        assert!(mux[1].contains("-c:v libx264"));
        assert!(status.output_path.unwrap().is_file());
    }

    #[tokio::test]
    async fn each_file_is_timed_once() {
        let h = Harness::new(nightcore_runner());
        let gif = h.path("loop.gif");
        let status = h
            .executor
            .run(h.request(BackgroundKind::Looping, &gif.to_string_lossy(), SpeedSpec::NIGHTCORE))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Complete, "{}", status.message);

        let timed: Vec<String> = h
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.tool_name().contains("ffprobe"))
            .filter(|c| c.get_args().iter().any(|a| a == "format=duration"))
            .filter_map(|c| c.get_args().last().cloned())
            .collect();
        for name in ["song.mp3", "loop.gif", "speed.mp3", "background.mp4"] {
            let n = timed.iter().filter(|p| p.ends_with(name)).count();
            assert_eq!(n, 1, "{name}: {timed:#?}");
        }
    }

    #[tokio::test]
    async fn short_background_is_redone_once() {
        let runner = ScriptedRunner::new()
            .with_duration("speed.mp3", Some(100.0))
            .with_duration("background.mp4", Some(50.0));
        let h = Harness::new(runner);
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        let calls = h.runner.ffmpeg_calls();
        let redo: Vec<_> = calls.iter().filter(|c| c.contains("background_extended.mp4")).collect();
        assert_eq!(redo.len(), 2, "{calls:#?}");
        assert!(redo[0].contains("-t 150.000"));
    }

    #[tokio::test]
    async fn unprobeable_background_skips_the_check() {
        let runner = ScriptedRunner::new()
            .with_duration("speed.mp3", Some(100.0))
            .with_duration("background.mp4", None);
        let h = Harness::new(runner);
        let status = h.executor.run(h.static_request()).await.unwrap();
        assert_eq!(status.state, JobState::Complete);
        assert!(!h.runner.ffmpeg_calls().iter().any(|c| c.contains("background_extended")));
    }

    #[tokio::test]
    async fn looping_background_falls_back_to_still_frame() {
        let runner = nightcore_runner()
            .fail_when("-stream_loop")
            .fail_when("-ignore_loop");
        let h = Harness::new(runner);
        let gif = h.path("loop.gif");
        let status = h
            .executor
            .run(h.request(BackgroundKind::Looping, &gif.to_string_lossy(), SpeedSpec::NIGHTCORE))
            .await
            .unwrap();

        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        let calls = h.runner.ffmpeg_calls();
        assert!(calls.iter().any(|c| c.contains("-frames:v 1")));
        assert!(calls.iter().any(|c| c.contains("-loop 1") && c.contains("background_frame.png")));
    }

    #[tokio::test]
    async fn failed_overlay_is_skipped() {
        let h = Harness::new(nightcore_runner().fail_when("drawtext"));
        let mut request = h.static_request();
        request.output_options.overlay_text = Some("nightcore".into());
        request.output_options.keep_manifest = true;
        let status = h.executor.run(request).await.unwrap();

        assert_eq!(status.state, JobState::Complete, "{}", status.message);
        let output = status.output_path.unwrap();
        let manifest = output.with_file_name("nightcore_song.credits.txt");
        assert!(std::fs::read_to_string(manifest).unwrap().contains("Speed ratio: 1.4"));
    }

    struct CancellingSource {
        registry: Arc<JobRegistry>,
    }

    #[async_trait]
    impl SourceFetcher for CancellingSource {
        async fn fetch_source(&self, locator: &str, dest_dir: &Path) -> Result<Fetched> {
            self.registry.cancel();
            LocalFetcher.fetch_source(locator, dest_dir).await
        }
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_stages() {
        let h = Harness::with_fetchers(nightcore_runner(), |registry| {
            Fetchers::new(
                Arc::new(CancellingSource {
                    registry: Arc::clone(registry),
                }),
                Arc::new(LocalFetcher),
            )
        });
        let status = h.executor.run(h.static_request()).await.unwrap();

        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.message, "cancelled");
        assert_eq!(status.progress, checkpoint::SOURCE_FETCHED);
        assert!(h.runner.ffmpeg_calls().is_empty());
        assert!(!h.executor.registry().is_busy());
    }
}
