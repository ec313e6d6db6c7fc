//! Where frames come from.
//!
//! [`FrameSource`] abstracts the native grab so the capture loop can run
//! against scripted frames in tests. The xcap-backed source is compiled only
//! with the `screen-capture` feature.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

use super::window::{CapturedWindow, WindowFilters};

/// Monitor grab plus the eligible windows on it.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub monitor_image: DynamicImage,
    pub windows: Vec<CapturedWindow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab monitor `monitor_id` and every window that passes `filters`.
    async fn grab(
        &self,
        monitor_id: u32,
        capture_unfocused: bool,
        filters: &WindowFilters,
    ) -> Result<RawCapture>;

    async fn monitors(&self) -> Result<Vec<MonitorInfo>>;

    fn name(&self) -> &'static str;
}

/// The best source this build supports.
pub fn default_source() -> Arc<dyn FrameSource> {
    #[cfg(feature = "screen-capture")]
    {
        Arc::new(xcap_source::XcapSource)
    }
    #[cfg(not(feature = "screen-capture"))]
    {
        Arc::new(UnsupportedSource)
    }
}

/// Keep the requested monitors that exist; fall back to the first available
/// one when none match.
pub fn resolve_monitors(requested: &[u32], available: &[u32]) -> Result<Vec<u32>> {
    let Some(&fallback) = available.first() else {
        bail!("no monitors detected");
    };

    let mut resolved: Vec<u32> = requested
        .iter()
        .copied()
        .filter(|id| available.contains(id))
        .collect();
    resolved.dedup();

    if resolved.is_empty() {
        tracing::warn!(
            ?requested,
            fallback,
            "configured monitor(s) not found; falling back to primary monitor"
        );
        resolved.push(fallback);
    }
    Ok(resolved)
}

/// Source for builds without native capture support.
pub struct UnsupportedSource;

#[async_trait]
impl FrameSource for UnsupportedSource {
    async fn grab(&self, monitor_id: u32, _: bool, _: &WindowFilters) -> Result<RawCapture> {
        bail!("screen capture unavailable for monitor {monitor_id}: built without the `screen-capture` feature")
    }

    async fn monitors(&self) -> Result<Vec<MonitorInfo>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "unsupported"
    }
}

#[cfg(feature = "screen-capture")]
mod xcap_source {
    use anyhow::{anyhow, Context, Result};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Rgba};
    use tokio::task;
    use tracing::{debug, error, trace};
    use xcap::{Monitor, Window};

    use super::{FrameSource, MonitorInfo, RawCapture};
    use crate::capture::window::{is_system_window, CapturedWindow, WindowFilters};

    pub struct XcapSource;

    #[async_trait]
    impl FrameSource for XcapSource {
        async fn grab(
            &self,
            monitor_id: u32,
            capture_unfocused: bool,
            filters: &WindowFilters,
        ) -> Result<RawCapture> {
            let filters = filters.clone();
            task::spawn_blocking(move || grab_blocking(monitor_id, capture_unfocused, &filters))
                .await?
        }

        async fn monitors(&self) -> Result<Vec<MonitorInfo>> {
            task::spawn_blocking(|| -> Result<Vec<MonitorInfo>> {
                Monitor::all()
                    .map_err(anyhow::Error::from)?
                    .iter()
                    .map(monitor_info)
                    .collect()
            })
            .await?
        }

        fn name(&self) -> &'static str {
            "xcap"
        }
    }

    fn monitor_info(monitor: &Monitor) -> Result<MonitorInfo> {
        Ok(MonitorInfo {
            id: monitor.id().context("missing monitor id")?,
            name: monitor.name().unwrap_or_default(),
            width: monitor.width().context("missing monitor width")?,
            height: monitor.height().context("missing monitor height")?,
            is_primary: monitor.is_primary().unwrap_or(false),
        })
    }

    fn to_dynamic(width: u32, height: u32, raw: Vec<u8>) -> Option<DynamicImage> {
        ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgba8)
    }

    fn grab_blocking(
        monitor_id: u32,
        capture_unfocused: bool,
        filters: &WindowFilters,
    ) -> Result<RawCapture> {
        let monitor = Monitor::all()
            .map_err(anyhow::Error::from)?
            .into_iter()
            .find(|m| m.id().unwrap_or_default() == monitor_id)
            .ok_or_else(|| anyhow!("monitor {monitor_id} not found"))?;

        let buffer = monitor.capture_image().map_err(anyhow::Error::from)?;
        let monitor_image = to_dynamic(buffer.width(), buffer.height(), buffer.into_raw())
            .ok_or_else(|| anyhow!("failed to convert monitor buffer"))?;

        let mut windows = Vec::new();
        trace!(monitor_id, "processing visible windows");
        for window in Window::all().map_err(anyhow::Error::from)? {
            let app_name = match window.app_name() {
                Ok(name) => name,
                Err(err) => {
                    debug!("skipping window without app name: {err}");
                    continue;
                }
            };
            let title = window.title().unwrap_or_default();

            if is_system_window(&app_name, &title) || !filters.is_valid(&app_name, &title) {
                continue;
            }
            // Each monitor's loop only takes the windows it shows
            if let Ok(on) = window.current_monitor() {
                if on.id().unwrap_or_default() != monitor_id {
                    continue;
                }
            }
            if window.is_minimized().unwrap_or(true) {
                debug!("skipping minimized window {app_name} ({title})");
                continue;
            }
            let is_focused = window.is_focused().unwrap_or(false);
            if !capture_unfocused && !is_focused {
                continue;
            }

            let buffer = match window.capture_image() {
                Ok(buffer) => buffer,
                Err(err) => {
                    error!("failed to capture window image for {app_name}: {err}");
                    continue;
                }
            };
            let Some(image) = to_dynamic(buffer.width(), buffer.height(), buffer.into_raw()) else {
                error!("invalid buffer size for window {app_name}");
                continue;
            };

            windows.push(CapturedWindow {
                image,
                app_name,
                window_name: title,
                process_id: window.pid().unwrap_or_default(),
                is_focused,
            });
        }

        Ok(RawCapture { monitor_image, windows })
    }
}
