//! Perceptual frame comparison used to skip OCR on static screens.
//!
//! Each frame is reduced to a 256-bin grayscale histogram plus a small
//! grayscale sample. A frame counts as changed when the histogram moved by
//! at least [`HISTOGRAM_THRESHOLD`] (total variation distance) or the
//! structural similarity of the samples dropped to [`SSIM_THRESHOLD`].

use image::{imageops::FilterType, DynamicImage, GrayImage};
use tracing::trace;

const HISTOGRAM_BINS: usize = 256;
pub const HISTOGRAM_THRESHOLD: f32 = 0.08;
pub const SSIM_THRESHOLD: f32 = 0.92;
/// Edge length the SSIM sample is resized to.
const SSIM_SAMPLE_SIZE: u32 = 96;

#[derive(Clone)]
struct FrameSignature {
    histogram: [u32; HISTOGRAM_BINS],
    ssim_sample: Vec<u8>,
}

impl FrameSignature {
    fn from_image(image: &DynamicImage) -> Self {
        let grayscale = image.to_luma8();
        Self {
            histogram: build_histogram(&grayscale),
            ssim_sample: downsample_for_ssim(&grayscale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeDecision {
    FirstFrame,
    Significant { histogram_delta: f32, ssim_score: f32 },
    Insignificant { histogram_delta: f32, ssim_score: f32 },
}

impl ChangeDecision {
    /// Whether the frame should be OCR'd and persisted.
    pub fn should_capture(&self) -> bool {
        !matches!(self, Self::Insignificant { .. })
    }
}

/// Remembers the previous frame's signature and classifies each new frame.
#[derive(Default)]
pub struct ChangeDetector {
    previous: Option<FrameSignature>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `image` against the last evaluated frame. The current frame
    /// always becomes the new baseline.
    pub fn evaluate(&mut self, image: &DynamicImage) -> ChangeDecision {
        let signature = FrameSignature::from_image(image);

        let decision = match &self.previous {
            None => ChangeDecision::FirstFrame,
            Some(previous) => {
                let histogram_delta =
                    histogram_distance(&signature.histogram, &previous.histogram);
                let ssim_score = compute_ssim(&signature.ssim_sample, &previous.ssim_sample);
                trace!(histogram_delta, ssim_score, "frame diff metrics computed");

                if histogram_delta >= HISTOGRAM_THRESHOLD || ssim_score <= SSIM_THRESHOLD {
                    ChangeDecision::Significant { histogram_delta, ssim_score }
                } else {
                    ChangeDecision::Insignificant { histogram_delta, ssim_score }
                }
            }
        };

        self.previous = Some(signature);
        decision
    }
}

/// Total variation distance between two normalized histograms, in `[0, 1]`.
fn histogram_distance(current: &[u32; HISTOGRAM_BINS], previous: &[u32; HISTOGRAM_BINS]) -> f32 {
    let current_total = current.iter().sum::<u32>().max(1) as f32;
    let previous_total = previous.iter().sum::<u32>().max(1) as f32;

    current
        .iter()
        .zip(previous.iter())
        .map(|(c, p)| (*c as f32 / current_total - *p as f32 / previous_total).abs())
        .sum::<f32>()
        * 0.5
}

/// Single-window SSIM over the whole sample.
fn compute_ssim(current: &[u8], previous: &[u8]) -> f32 {
    if current.is_empty() || current.len() != previous.len() {
        return 1.0;
    }

    let n = current.len() as f64;
    let mean = |s: &[u8]| s.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_current = mean(current);
    let mean_previous = mean(previous);

    let variance = |s: &[u8], m: f64| {
        s.iter()
            .map(|&v| {
                let d = v as f64 - m;
                d * d
            })
            .sum::<f64>()
            / n
    };
    let variance_current = variance(current, mean_current);
    let variance_previous = variance(previous, mean_previous);

    let covariance = current
        .iter()
        .zip(previous.iter())
        .map(|(&a, &b)| (a as f64 - mean_current) * (b as f64 - mean_previous))
        .sum::<f64>()
        / n;

    let c1 = (0.01f64 * 255.0).powi(2);
    let c2 = (0.03f64 * 255.0).powi(2);

    let numerator = (2.0 * mean_current * mean_previous + c1) * (2.0 * covariance + c2);
    let denominator = (mean_current.powi(2) + mean_previous.powi(2) + c1)
        * (variance_current + variance_previous + c2);

    if denominator.abs() < f64::EPSILON {
        1.0
    } else {
        (numerator / denominator).clamp(-1.0, 1.0) as f32
    }
}

fn build_histogram(image: &GrayImage) -> [u32; HISTOGRAM_BINS] {
    let mut bins = [0u32; HISTOGRAM_BINS];
    for pixel in image.iter() {
        bins[*pixel as usize] += 1;
    }
    bins
}

fn downsample_for_ssim(image: &GrayImage) -> Vec<u8> {
    if image.width() <= SSIM_SAMPLE_SIZE && image.height() <= SSIM_SAMPLE_SIZE {
        return image.as_raw().clone();
    }

    image::imageops::resize(image, SSIM_SAMPLE_SIZE, SSIM_SAMPLE_SIZE, FilterType::Triangle)
        .into_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn flat(value: u8, size: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_pixel(size, size, Luma([value])))
    }

    fn gradient(size: u32, offset: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(size, size, |x, y| {
            Luma([((x + y) as u8).wrapping_add(offset)])
        }))
    }

    #[test]
    fn first_frame_then_identical_frame() {
        let mut detector = ChangeDetector::new();
        assert_eq!(detector.evaluate(&gradient(64, 0)), ChangeDecision::FirstFrame);

        match detector.evaluate(&gradient(64, 0)) {
            ChangeDecision::Insignificant { histogram_delta, ssim_score } => {
                assert_eq!(histogram_delta, 0.0);
                assert!((ssim_score - 1.0).abs() < 1e-6);
            }
            other => panic!("expected insignificant, got {other:?}"),
        }
    }

    #[test]
    fn brightness_flip_is_significant() {
        let mut detector = ChangeDetector::new();
        detector.evaluate(&flat(10, 32));
        let decision = detector.evaluate(&flat(240, 32));
        assert!(decision.should_capture());
        if let ChangeDecision::Significant { histogram_delta, .. } = decision {
            assert!((histogram_delta - 1.0).abs() < 1e-6);
        } else {
            panic!("expected significant change");
        }
    }

    #[test]
    fn large_frames_are_downsampled() {
        let gray = gradient(300, 0).to_luma8();
        let sample = downsample_for_ssim(&gray);
        assert_eq!(sample.len(), (SSIM_SAMPLE_SIZE * SSIM_SAMPLE_SIZE) as usize);
    }

    #[test]
    fn ssim_degenerate_inputs() {
        assert_eq!(compute_ssim(&[], &[]), 1.0);
        assert_eq!(compute_ssim(&[1, 2], &[1, 2, 3]), 1.0);
    }

    #[test]
    fn baseline_advances_each_frame() {
        let mut detector = ChangeDetector::new();
        detector.evaluate(&flat(10, 16));
        assert!(detector.evaluate(&flat(240, 16)).should_capture());
        // compared against the bright frame, not the first dark one
        assert!(!detector.evaluate(&flat(240, 16)).should_capture());
    }
}
