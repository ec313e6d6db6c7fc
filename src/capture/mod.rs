//! Continuous screen capture.
//!
//! One loop runs per monitor. Every tick grabs the monitor, asks the
//! [`ChangeDetector`] whether anything moved, and only then pays for window
//! OCR and persistence. The tick interval adapts through [`Backoff`].

pub mod backoff;
pub mod change_detection;
pub mod platform;
pub mod window;

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub use backoff::Backoff;
pub use change_detection::{ChangeDecision, ChangeDetector};
pub use platform::{default_source, resolve_monitors, FrameSource, MonitorInfo, RawCapture};
pub use window::{extract_browser_url, CapturedWindow, WindowFilters};

use crate::config::MemriConfig;
use crate::ocr::{OcrContext, OcrEngine};
use crate::storage::{now_ms, CaptureBatch, CaptureSink, CapturedWindowRecord};

/// Per-monitor loop settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub monitor_id: u32,
    pub interval: Duration,
    pub max_interval: Duration,
    pub capture_unfocused_windows: bool,
    pub languages: Vec<String>,
    pub filters: WindowFilters,
    pub image_dir: PathBuf,
}

impl CaptureConfig {
    pub fn from_config(config: &MemriConfig, monitor_id: u32) -> Self {
        let capture = &config.capture;
        Self {
            monitor_id,
            interval: Duration::from_millis(capture.interval_ms),
            max_interval: Duration::from_millis(capture.max_interval_ms),
            capture_unfocused_windows: capture.capture_unfocused_windows,
            languages: capture.languages.clone(),
            filters: WindowFilters::new(&capture.window_ignore, &capture.window_include),
            image_dir: config.resolved_image_dir(),
        }
    }
}

/// Monitors the source can see.
pub async fn list_monitors(source: &dyn FrameSource) -> Result<Vec<MonitorInfo>> {
    source.monitors().await
}

/// Result of one capture iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub decision: ChangeDecision,
    pub captured: bool,
    pub capture_id: Option<i64>,
}

/// State of a single monitor's capture loop.
pub struct CaptureWorker {
    config: CaptureConfig,
    source: Arc<dyn FrameSource>,
    ocr: Arc<dyn OcrEngine>,
    sink: Arc<dyn CaptureSink>,
    detector: ChangeDetector,
    backoff: Backoff,
    frame_number: u64,
}

impl CaptureWorker {
    pub fn new(
        config: CaptureConfig,
        source: Arc<dyn FrameSource>,
        ocr: Arc<dyn OcrEngine>,
        sink: Arc<dyn CaptureSink>,
    ) -> Self {
        let backoff = Backoff::new(config.interval, config.max_interval);
        Self {
            config,
            source,
            ocr,
            sink,
            detector: ChangeDetector::new(),
            backoff,
            frame_number: 0,
        }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn current_delay(&self) -> Duration {
        self.backoff.current_delay()
    }

    /// Run one iteration and feed its outcome to the backoff.
    pub async fn tick(&mut self) -> Result<IterationOutcome> {
        match self.iterate().await {
            Ok(outcome) => {
                self.backoff.record(&outcome.decision);
                if outcome.captured {
                    self.frame_number = self.frame_number.saturating_add(1);
                }
                Ok(outcome)
            }
            Err(err) => {
                self.backoff.on_error();
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(monitor = self.config.monitor_id, frame = self.frame_number))]
    async fn iterate(&mut self) -> Result<IterationOutcome> {
        let raw = self
            .source
            .grab(
                self.config.monitor_id,
                self.config.capture_unfocused_windows,
                &self.config.filters,
            )
            .await
            .with_context(|| format!("{} capture failed", self.source.name()))?;

        let decision = self.detector.evaluate(&raw.monitor_image);
        match decision {
            ChangeDecision::FirstFrame => debug!("capturing baseline frame"),
            ChangeDecision::Significant { histogram_delta, ssim_score } => {
                debug!(histogram_delta, ssim_score, "significant change detected");
            }
            ChangeDecision::Insignificant { histogram_delta, ssim_score } => {
                debug!(histogram_delta, ssim_score, "frame unchanged, skipping");
                return Ok(IterationOutcome {
                    decision,
                    captured: false,
                    capture_id: None,
                });
            }
        }

        let timestamp_ms = now_ms();
        let ocr_start = Instant::now();
        let windows = self.process_windows(&raw.windows, timestamp_ms).await;
        let ocr_ms = ocr_start.elapsed().as_millis();

        let batch = CaptureBatch {
            frame_number: self.frame_number,
            timestamp_ms,
            monitor_id: Some(self.config.monitor_id),
            windows,
        };
        let persist_start = Instant::now();
        let capture_id = self.sink.persist_batch(batch).await?;

        debug!(
            capture_id,
            ocr_ms,
            persist_ms = persist_start.elapsed().as_millis(),
            "capture iteration completed"
        );
        Ok(IterationOutcome {
            decision,
            captured: true,
            capture_id: Some(capture_id),
        })
    }

    /// Save each window image and OCR it. Failures degrade the record
    /// instead of dropping the window.
    #[instrument(skip_all, fields(windows = windows.len()))]
    async fn process_windows(
        &self,
        windows: &[CapturedWindow],
        timestamp_ms: i64,
    ) -> Vec<CapturedWindowRecord> {
        let image_dir = &self.config.image_dir;
        if let Err(err) = std::fs::create_dir_all(image_dir) {
            warn!("failed to create image dir {}: {err}", image_dir.display());
        }

        let mut records = Vec::with_capacity(windows.len());
        for (idx, window) in windows.iter().enumerate() {
            let mut record = CapturedWindowRecord {
                window_name: window.window_name.clone(),
                app_name: window.app_name.clone(),
                ..Default::default()
            };

            let (png, path) = match write_window_image(
                &window.image,
                image_dir,
                self.frame_number,
                timestamp_ms,
                idx,
            ) {
                Ok(saved) => saved,
                Err(err) => {
                    warn!(window = %window.window_name, "failed to write window image: {err:#}");
                    records.push(record);
                    continue;
                }
            };

            let context = OcrContext {
                window_name: window.window_name.clone(),
                app_name: window.app_name.clone(),
                is_focused: window.is_focused,
                languages: self.config.languages.clone(),
            };
            match self.ocr.recognize(&png, &context).await {
                Ok(payload) => {
                    record.text = payload.text;
                    record.confidence = payload.confidence;
                    record.ocr_json = payload.json;
                }
                Err(err) => {
                    warn!(window = %window.window_name, engine = self.ocr.name(), "OCR failed: {err:#}");
                }
            }

            record.browser_url =
                extract_browser_url(window.is_focused, &window.app_name, &window.window_name);
            record.image_path = Some(path);
            records.push(record);
        }
        records
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(bytes)
}

/// Encode and write `frame_{ts}_{frame}_{idx}.png`, returning the bytes and path.
fn write_window_image(
    image: &DynamicImage,
    dir: &Path,
    frame_number: u64,
    timestamp_ms: i64,
    idx: usize,
) -> Result<(Vec<u8>, String)> {
    let png = encode_png(image)?;
    let path = dir.join(format!("frame_{timestamp_ms}_{frame_number}_{idx}.png"));
    std::fs::write(&path, &png).with_context(|| format!("failed to write {}", path.display()))?;
    Ok((png, path.to_string_lossy().into_owned()))
}

/// Handle for stopping a running capture loop.
#[derive(Clone)]
pub struct CaptureHandle {
    monitor_id: u32,
    shutdown_tx: mpsc::Sender<()>,
}

impl CaptureHandle {
    pub fn monitor_id(&self) -> u32 {
        self.monitor_id
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!(monitor = self.monitor_id, "capture loop already stopped");
        }
    }
}

/// Spawn the capture loop for one monitor.
pub fn start_capture(
    config: CaptureConfig,
    source: Arc<dyn FrameSource>,
    ocr: Arc<dyn OcrEngine>,
    sink: Arc<dyn CaptureSink>,
) -> Result<CaptureHandle> {
    std::fs::create_dir_all(&config.image_dir)
        .with_context(|| format!("failed to create image dir {}", config.image_dir.display()))?;

    let monitor_id = config.monitor_id;
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let mut worker = CaptureWorker::new(config, source, ocr, sink);

    tokio::spawn(async move {
        info!(monitor = monitor_id, source = worker.source.name(), "capture loop starting");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(monitor = monitor_id, "capture loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(worker.current_delay()) => {
                    if let Err(err) = worker.tick().await {
                        warn!(
                            monitor = monitor_id,
                            next_delay_ms = worker.current_delay().as_millis() as u64,
                            "capture iteration failed: {err:#}"
                        );
                    }
                }
            }
        }
    });

    Ok(CaptureHandle {
        monitor_id,
        shutdown_tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::StubOcr;
    use anyhow::bail;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn solid(value: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([value, value, value, 255])))
    }

    fn window(app: &str, title: &str) -> CapturedWindow {
        CapturedWindow {
            image: solid(200),
            app_name: app.into(),
            window_name: title.into(),
            process_id: 42,
            is_focused: true,
        }
    }

    /// Replays a fixed list of frames; `None` simulates a grab failure.
    struct ScriptedSource {
        frames: Mutex<VecDeque<Option<RawCapture>>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Option<RawCapture>>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn grab(&self, _: u32, _: bool, _: &WindowFilters) -> Result<RawCapture> {
            match self.frames.lock().unwrap().pop_front() {
                Some(Some(frame)) => Ok(frame),
                _ => bail!("no frame"),
            }
        }

        async fn monitors(&self) -> Result<Vec<MonitorInfo>> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<CaptureBatch>>,
    }

    #[async_trait]
    impl CaptureSink for RecordingSink {
        async fn persist_batch(&self, batch: CaptureBatch) -> Result<i64> {
            let mut batches = self.batches.lock().unwrap();
            batches.push(batch);
            Ok(batches.len() as i64)
        }
    }

    fn frame(value: u8, windows: Vec<CapturedWindow>) -> Option<RawCapture> {
        Some(RawCapture {
            monitor_image: solid(value),
            windows,
        })
    }

    fn worker(
        frames: Vec<Option<RawCapture>>,
        image_dir: &Path,
    ) -> (CaptureWorker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = CaptureConfig {
            monitor_id: 3,
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
            capture_unfocused_windows: false,
            languages: vec!["en".into()],
            filters: WindowFilters::default(),
            image_dir: image_dir.to_path_buf(),
        };
        let worker = CaptureWorker::new(
            config,
            Arc::new(ScriptedSource::new(frames)),
            Arc::new(StubOcr),
            sink.clone(),
        );
        (worker, sink)
    }

    #[tokio::test]
    async fn captures_first_frame_and_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let windows = vec![window("Google Chrome", "Docs https://docs.rs/ - Chrome"), window("Terminal", "zsh")];
        let (mut worker, sink) = worker(
            vec![frame(10, windows.clone()), frame(10, windows.clone()), frame(240, windows)],
            dir.path(),
        );

        let first = worker.tick().await.unwrap();
        assert_eq!(first.decision, ChangeDecision::FirstFrame);
        assert_eq!(first.capture_id, Some(1));
        assert_eq!(worker.frame_number(), 1);

        let second = worker.tick().await.unwrap();
        assert!(!second.captured);
        assert_eq!(worker.frame_number(), 1);
        assert_eq!(worker.current_delay(), Duration::from_millis(150));

        let third = worker.tick().await.unwrap();
        assert!(third.captured);
        assert_eq!(worker.current_delay(), Duration::from_millis(100));

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].frame_number, 0);
        assert_eq!(batches[1].frame_number, 1);
        assert_eq!(batches[0].monitor_id, Some(3));

        let chrome = &batches[0].windows[0];
        assert_eq!(chrome.text, "[stub ocr for Docs https://docs.rs/ - Chrome]");
        assert_eq!(chrome.browser_url.as_deref(), Some("https://docs.rs/"));
        let path = chrome.image_path.as_deref().unwrap();
        assert!(Path::new(path).exists());
        let file_name = Path::new(path).file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("frame_") && file_name.ends_with("_0_0.png"), "{file_name}");
        assert!(batches[0].windows[1].browser_url.is_none());
    }

    #[tokio::test]
    async fn grab_errors_grow_the_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (mut worker, sink) = worker(vec![None, None], dir.path());

        assert!(worker.tick().await.is_err());
        assert_eq!(worker.current_delay(), Duration::from_millis(200));
        assert!(worker.tick().await.is_err());
        assert_eq!(worker.current_delay(), Duration::from_millis(300));
        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(worker.frame_number(), 0);
    }

    #[tokio::test]
    async fn unwritable_image_dir_keeps_window_without_text() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let (mut worker, sink) = worker(vec![frame(50, vec![window("Editor", "main.rs")])], &blocker);

        worker.tick().await.unwrap();
        let batches = sink.batches.lock().unwrap();
        let record = &batches[0].windows[0];
        assert_eq!(record.window_name, "main.rs");
        assert!(record.text.is_empty());
        assert!(record.image_path.is_none());
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut config = CaptureConfig::from_config(&MemriConfig::default(), 0);
        config.interval = Duration::from_millis(5);
        config.image_dir = dir.path().to_path_buf();

        let handle = start_capture(
            config,
            Arc::new(ScriptedSource::new(vec![frame(90, vec![])])),
            Arc::new(StubOcr),
            sink.clone(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.monitor_id(), 0);
        handle.shutdown().await;

        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }
}
