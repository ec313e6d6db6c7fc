//! OCR through the `tesseract` command-line tool.
//!
//! The image is written to a temp file and recognized with TSV output, which
//! carries per-word boxes and confidences.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{OcrContext, OcrEngine, OcrPayload};

pub struct TesseractOcr {
    binary: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    #[instrument(skip(self, image_png, context), fields(window = %context.window_name))]
    async fn recognize(&self, image_png: &[u8], context: &OcrContext) -> Result<OcrPayload> {
        let mut file = tempfile::Builder::new()
            .prefix("memri-ocr-")
            .suffix(".png")
            .tempfile()
            .context("failed to create temp image")?;
        file.write_all(image_png).context("failed to write temp image")?;
        file.flush()?;

        let langs = tesseract_languages(&context.languages);
        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &langs])
            .arg("tsv")
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let payload = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        debug!(chars = payload.text.len(), confidence = ?payload.confidence, "tesseract done");
        Ok(payload)
    }

    fn name(&self) -> &'static str {
        "tesseract"
    }
}

/// Map ISO-639-1 codes to tesseract traineddata names, joined with `+`.
pub fn tesseract_languages(languages: &[String]) -> String {
    let mapped: Vec<&str> = languages
        .iter()
        .map(|code| match code.trim().to_lowercase().as_str() {
            "en" => "eng",
            "de" => "deu",
            "fr" => "fra",
            "es" => "spa",
            "it" => "ita",
            "pt" => "por",
            "nl" => "nld",
            "ja" => "jpn",
            "zh" => "chi_sim",
            "ko" => "kor",
            "ru" => "rus",
            _ => code.trim(),
        })
        .filter(|code| !code.is_empty())
        .collect();

    if mapped.is_empty() {
        "eng".to_string()
    } else {
        mapped.join("+")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct OcrWord {
    text: String,
    conf: f32,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
}

/// Parse `tesseract ... tsv` output into text, mean confidence, and word boxes.
pub fn parse_tsv(tsv: &str) -> Result<OcrPayload> {
    // (block, paragraph, line) -> words, in reading order
    let mut lines: BTreeMap<(u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut words = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].parse::<u32>().unwrap_or_default();
        let px = |i: usize| cols[i].parse::<i32>().unwrap_or_default();

        lines
            .entry((num(2), num(3), num(4)))
            .or_default()
            .push(text.to_string());
        words.push(OcrWord {
            text: text.to_string(),
            conf,
            left: px(6),
            top: px(7),
            width: px(8),
            height: px(9),
        });
    }

    if words.is_empty() {
        return Ok(OcrPayload::default());
    }

    let text = lines
        .values()
        .map(|w| w.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let mean = words.iter().map(|w| w.conf).sum::<f32>() / words.len() as f32;
    let json = serde_json::to_string(&words).context("failed to serialize OCR words")?;

    Ok(OcrPayload {
        text,
        confidence: Some((mean / 100.0).clamp(0.0, 1.0)),
        json: Some(json),
    })
}
