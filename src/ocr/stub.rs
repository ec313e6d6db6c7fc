use anyhow::Result;
use async_trait::async_trait;

use super::{OcrContext, OcrEngine, OcrPayload};

/// Engine that echoes the window name. Useful without a tesseract install.
pub struct StubOcr;

#[async_trait]
impl OcrEngine for StubOcr {
    async fn recognize(&self, _image_png: &[u8], context: &OcrContext) -> Result<OcrPayload> {
        Ok(OcrPayload {
            text: format!("[stub ocr for {}]", context.window_name),
            confidence: None,
            json: None,
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
