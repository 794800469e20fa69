//! Template-matching phase classifier

use std::path::Path;

use opencv::{
    core::{min_max_loc, no_array, Mat, MatTraitConst},
    imgcodecs, imgproc,
    prelude::*,
};

use super::base::{Frame, StateClassifier, StateLabel};

/// Labels the classifier is trained on. Direction cues are text-only.
const CLASSIFIER_LABELS: [StateLabel; 5] = [
    StateLabel::WaitingBite,
    StateLabel::FishHooked,
    StateLabel::ReelingLow,
    StateLabel::ReelingHigh,
    StateLabel::Caught,
];

/// Classifies frames by matching one reference template per label.
///
/// Templates live as `<label>.png` files in the template folder and are
/// loaded once at construction. Matching uses TM_CCOEFF_NORMED, so the
/// score doubles as the confidence.
pub struct TemplateClassifier {
    templates: Vec<(StateLabel, Frame)>,
}

impl TemplateClassifier {
    /// Load the templates from `dir`. Missing files are skipped with a
    /// warning; at least one template must load.
    pub fn new(dir: &Path) -> Result<Self, String> {
        let mut templates = Vec::new();
        for label in CLASSIFIER_LABELS {
            let path = dir.join(format!("{}.png", label.name()));
            match load_template(&path) {
                Some(template) => templates.push((label, template)),
                None => tracing::warn!("[CLASSIFY] Template missing or unreadable: {:?}", path),
            }
        }

        if templates.is_empty() {
            return Err(format!("no usable templates in {:?}", dir));
        }

        tracing::info!(
            "[CLASSIFY] Loaded {} phase templates from {:?}",
            templates.len(),
            dir
        );
        Ok(Self { templates })
    }

    fn match_score(frame: &Mat, template: &Frame) -> Option<f32> {
        let template = frame_to_mat(template).ok()?;

        // A template larger than the frame cannot match.
        if template.cols() >= frame.cols() || template.rows() >= frame.rows() {
            return None;
        }

        let mut result = Mat::default();
        imgproc::match_template(
            frame,
            &template,
            &mut result,
            imgproc::TM_CCOEFF_NORMED,
            &no_array(),
        )
        .ok()?;

        let mut max_val = 0.0;
        min_max_loc(&result, None, Some(&mut max_val), None, None, &no_array()).ok()?;
        Some(max_val as f32)
    }
}

impl StateClassifier for TemplateClassifier {
    fn classify(&self, frame: &Frame) -> Option<(StateLabel, f32)> {
        let frame_mat = match frame_to_mat(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("[CLASSIFY] Frame conversion failed: {:?}", e);
                return None;
            }
        };

        let mut best: Option<(StateLabel, f32)> = None;
        for (label, template) in &self.templates {
            if let Some(score) = Self::match_score(&frame_mat, template) {
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((*label, score.clamp(0.0, 1.0)));
                }
            }
        }

        if let Some((label, score)) = best {
            tracing::trace!("[CLASSIFY] Top label {} score={:.3}", label.name(), score);
        }
        best
    }

    fn warm_up(&self) -> Result<(), String> {
        if self.templates.is_empty() {
            return Err("classifier has no templates".to_string());
        }
        Ok(())
    }
}

/// Convert a grayscale frame into an owned OpenCV Mat.
pub(crate) fn frame_to_mat(img: &Frame) -> opencv::Result<Mat> {
    // Luma frames are contiguous row-major, one byte per pixel.
    let flat = Mat::from_slice(img.as_raw())?;
    let shaped = flat.reshape(1, img.height() as i32)?;
    shaped.try_clone()
}

fn load_template(path: &Path) -> Option<Frame> {
    if !path.exists() {
        return None;
    }
    let path_str: &str = path.to_str()?;
    let mat = imgcodecs::imread(path_str, imgcodecs::IMREAD_GRAYSCALE).ok()?;
    if mat.empty() {
        return None;
    }
    mat_to_gray_image(&mat)
}

fn mat_to_gray_image(mat: &Mat) -> Option<Frame> {
    let (rows, cols) = (mat.rows(), mat.cols());
    let mut pixels = Vec::with_capacity((rows * cols) as usize);
    for row in 0..rows {
        for col in 0..cols {
            pixels.push(*mat.at_2d::<u8>(row, col).ok()?);
        }
    }
    Frame::from_raw(cols as u32, rows as u32, pixels)
}
