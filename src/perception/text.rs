//! OCR cue recognition for direction overlays and the catch banner

use rusty_tesseract::{image_to_data, Args, Image as TessImage};

use super::base::{Frame, StateLabel, TextReader};

/// Fraction of the frame height/width where the overlay cues render.
/// The cue band sits in the middle of the screen on every supported layout.
const CUE_BAND_X: f32 = 0.30;
const CUE_BAND_Y: f32 = 0.38;
const CUE_BAND_W: f32 = 0.40;
const CUE_BAND_H: f32 = 0.22;

/// Reads overlay cues with Tesseract.
///
/// The cue band is cropped out of the frame and run through single-line
/// OCR; the recognized words are matched against the known cue phrases.
/// Confidence is the mean word confidence normalized to `[0, 1]`.
pub struct TesseractReader {
    lang: String,
}

impl TesseractReader {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }

    fn crop_cue_band(frame: &Frame) -> Option<Frame> {
        let (w, h) = (frame.width(), frame.height());
        let x = (w as f32 * CUE_BAND_X) as u32;
        let y = (h as f32 * CUE_BAND_Y) as u32;
        let cw = (w as f32 * CUE_BAND_W) as u32;
        let ch = (h as f32 * CUE_BAND_H) as u32;

        if cw == 0 || ch == 0 || x + cw > w || y + ch > h {
            return None;
        }
        Some(image::imageops::crop_imm(frame, x, y, cw, ch).to_image())
    }

    fn cue_from_text(text: &str) -> Option<StateLabel> {
        let text = text.to_lowercase();
        if text.contains("right") {
            Some(StateLabel::PullRight)
        } else if text.contains("left") {
            Some(StateLabel::PullLeft)
        } else if text.contains("success") || text.contains("caught") {
            Some(StateLabel::Caught)
        } else {
            None
        }
    }
}

impl TextReader for TesseractReader {
    fn read(&self, frame: &Frame) -> Option<(StateLabel, f32)> {
        let crop = Self::crop_cue_band(frame)?;
        let dynamic = image::DynamicImage::ImageLuma8(crop);

        let tess_image = match TessImage::from_dynamic_image(&dynamic) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!("[OCR] Failed to build Tesseract image: {:?}", e);
                return None;
            }
        };

        let args = Args {
            lang: self.lang.clone(),
            config_variables: std::collections::HashMap::new(),
            dpi: Some(150),
            psm: Some(7), // single line, cues never wrap
            oem: Some(3),
        };

        let output = match image_to_data(&tess_image, &args) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("[OCR] Recognition failed: {:?}", e);
                return None;
            }
        };

        let mut words = Vec::new();
        let mut conf_sum = 0.0f32;
        for record in &output.data {
            let word = record.text.trim();
            if word.is_empty() || record.conf < 0.0 {
                continue;
            }
            conf_sum += record.conf;
            words.push(word.to_string());
        }

        if words.is_empty() {
            return None;
        }

        let text = words.join(" ");
        let confidence = (conf_sum / words.len() as f32 / 100.0).clamp(0.0, 1.0);
        let label = Self::cue_from_text(&text)?;

        tracing::debug!(
            "[OCR] Cue '{}' -> {} (conf {:.2})",
            text,
            label.name(),
            confidence
        );
        Some((label, confidence))
    }
}
