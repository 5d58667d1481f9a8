#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GenericImageView;
use tract_onnx::prelude::*;

use super::coco::COCO_CLASSES;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Candidates below this score are dropped before NMS. The classifier applies
/// the request's own threshold afterwards.
const SCORE_FLOOR: f32 = 0.05;
const MAX_DETECTIONS: usize = 100;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a single `[1, 4 + classes, anchors]` output where the first four
/// rows are `cx, cy, w, h` in input pixels and the remaining rows are per-class
/// scores. Class ids map to the COCO label set.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for square `input_size` inputs.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.45,
        })
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn build_input(&self, image: &[u8]) -> Result<(Tensor, u32, u32)> {
        let decoded = image::load_from_memory(image).context("cannot decode image")?;
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("image has no pixels"));
        }
        let rgb = decoded
            .resize_exact(self.input_size, self.input_size, FilterType::Triangle)
            .into_rgb8();
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok((input.into_tensor(), width, height))
    }

    fn decode_output(
        &self,
        outputs: TVec<TValue>,
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [1, 4 + classes, anchors]")?;
        let (_, rows, anchors) = view.dim();
        if rows <= 4 {
            return Err(anyhow!("model output has {} rows, expected > 4", rows));
        }
        let classes = (rows - 4).min(COCO_CLASSES.len());
        let scale_x = width as f32 / self.input_size as f32;
        let scale_y = height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..classes {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if !best_score.is_finite() || best_score < SCORE_FLOOR {
                continue;
            }
            let cx = view[[0, 0, anchor]];
            let cy = view[[0, 1, anchor]];
            let w = view[[0, 2, anchor]];
            let h = view[[0, 3, anchor]];
            let bbox = BoundingBox {
                x1: ((cx - w / 2.0) * scale_x).clamp(0.0, width as f32),
                y1: ((cy - h / 2.0) * scale_y).clamp(0.0, height as f32),
                x2: ((cx + w / 2.0) * scale_x).clamp(0.0, width as f32),
                y2: ((cy + h / 2.0) * scale_y).clamp(0.0, height as f32),
            };
            candidates.push((best_class, best_score.min(1.0), bbox));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold)
            .into_iter()
            .map(|(class, score, bbox)| Detection::new(COCO_CLASSES[class], score).with_bbox(bbox))
            .collect())
    }
}

/// Greedy per-class NMS. Output is ordered by descending score.
fn non_max_suppression(
    mut candidates: Vec<(usize, f32, BoundingBox)>,
    iou_threshold: f32,
) -> Vec<(usize, f32, BoundingBox)> {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut kept: Vec<(usize, f32, BoundingBox)> = Vec::new();
    for candidate in candidates {
        if kept.len() >= MAX_DETECTIONS {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.0 == candidate.0 && k.2.iou(&candidate.2) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &[u8]) -> Result<Vec<Detection>> {
        let (input, width, height) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let blank = Tensor::zero::<f32>(&[1, 3, side, side])?;
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}
