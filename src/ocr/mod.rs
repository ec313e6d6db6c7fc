//! Text recognition for captured windows.
//!
//! Engines implement [`OcrEngine`]; [`create_engine`] picks one by the
//! configured name.

pub mod stub;
pub mod tesseract;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::MemriConfig;

pub use stub::StubOcr;
pub use tesseract::TesseractOcr;

/// Recognized text plus optional engine-specific detail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPayload {
    pub text: String,
    /// Mean word confidence in `[0, 1]`, when the engine reports one.
    pub confidence: Option<f32>,
    /// Word boxes serialized as JSON.
    pub json: Option<String>,
}

/// What is known about the window being recognized.
#[derive(Debug, Clone)]
pub struct OcrContext {
    pub window_name: String,
    pub app_name: String,
    pub is_focused: bool,
    /// ISO-639-1 codes, e.g. `["en", "de"]`.
    pub languages: Vec<String>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a PNG-encoded image.
    async fn recognize(&self, image_png: &[u8], context: &OcrContext) -> Result<OcrPayload>;

    fn name(&self) -> &'static str;
}

pub fn create_engine(config: &MemriConfig) -> Result<Arc<dyn OcrEngine>> {
    match config.ocr.engine.trim().to_lowercase().as_str() {
        "tesseract" => Ok(Arc::new(TesseractOcr::new(&config.ocr.tesseract_bin))),
        "stub" => Ok(Arc::new(StubOcr)),
        other => bail!("unknown OCR engine: {other} (expected \"tesseract\" or \"stub\")"),
    }
}
