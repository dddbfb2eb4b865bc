// src/detector.rs

use crate::types::{DetectorConfig, Frame, InferenceConfig};
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const NMS_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// A frame is fire-positive when any detection's class name contains
/// "fire", case-insensitive ("fire", "Fire", "wildfire" all match).
pub fn contains_fire(detections: &[Detection]) -> bool {
    detections
        .iter()
        .any(|d| d.class_name.to_lowercase().contains("fire"))
}

pub struct Detector {
    session: Session,
    input_size: usize,
    class_names: Vec<String>,
    confidence_threshold: f32,
}

impl Detector {
    pub fn new(config: &DetectorConfig, inference: &InferenceConfig) -> Result<Self> {
        info!("Loading detection model: {}", config.path);

        let mut session_builder = Session::builder()?;

        if inference.use_cuda {
            info!("Enabling CUDA execution provider");
            session_builder = session_builder.with_execution_providers([
                CUDAExecutionProvider::default().with_device_id(0).build(),
            ])?;
        }

        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(inference.num_threads)?
            .commit_from_file(&config.path)
            .with_context(|| format!("Failed to load model {}", config.path))?;

        info!(
            "✓ Detector ready ({} classes, {}x{} input)",
            config.class_names.len(),
            config.input_size,
            config.input_size
        );

        Ok(Self {
            session,
            input_size: config.input_size,
            class_names: config.class_names.clone(),
            confidence_threshold: config.confidence_threshold,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        // 1. Preprocess (letterbox + normalize)
        let (input, scale, pad_x, pad_y) = self.preprocess(&frame.data, frame.width, frame.height);

        // 2. Run inference
        let output = self.infer(&input)?;

        // 3. Postprocess (parse detections + NMS)
        let detections = parse_detections(
            &output,
            &self.class_names,
            scale,
            pad_x,
            pad_y,
            self.confidence_threshold,
        );

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }

    fn preprocess(&self, src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
        let target_size = self.input_size;

        // Scale to fit inside the model input while keeping aspect ratio
        let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;

        // Padding to center the image
        let pad_x = (target_size - scaled_w) as f32 / 2.0;
        let pad_y = (target_size - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

        // Padded canvas, gray background
        let mut canvas = vec![114u8; target_size * target_size * 3];

        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_x = x + pad_x as usize;
                let dst_y = y + pad_y as usize;
                let dst_idx = (dst_y * target_size + dst_x) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        // Normalize [0, 255] -> [0, 1] and convert HWC -> CHW
        let mut input = vec![0.0f32; 3 * target_size * target_size];
        for c in 0..3 {
            for h in 0..target_size {
                for w in 0..target_size {
                    let hwc_idx = (h * target_size + w) * 3 + c;
                    let chw_idx = c * target_size * target_size + h * target_size + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

/// Parse raw YOLO output `[1, 4 + num_classes, anchors]` into detections
/// in original image coordinates, with confidence filtering and NMS.
fn parse_detections(
    output: &[f32],
    class_names: &[String],
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    conf_thresh: f32,
) -> Vec<Detection> {
    let num_classes = class_names.len();
    let stride = 4 + num_classes;
    if stride == 4 || output.len() % stride != 0 {
        return Vec::new();
    }
    let anchors = output.len() / stride;

    let mut detections = Vec::new();

    for i in 0..anchors {
        // Bbox in center format
        let cx = output[i];
        let cy = output[anchors + i];
        let w = output[anchors * 2 + i];
        let h = output[anchors * 3 + i];

        // Best class
        let mut max_conf = 0.0f32;
        let mut best_class = 0;

        for c in 0..num_classes {
            let conf = output[anchors * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh {
            continue;
        }

        // Center format -> corner format
        let x1 = cx - w / 2.0;
        let y1 = cy - h / 2.0;
        let x2 = cx + w / 2.0;
        let y2 = cy + h / 2.0;

        // Reverse the letterbox transform
        let x1 = (x1 - pad_x) / scale;
        let y1 = (y1 - pad_y) / scale;
        let x2 = (x2 - pad_x) / scale;
        let y2 = (y2 - pad_y) / scale;

        detections.push(Detection {
            bbox: [x1, y1, x2, y2],
            confidence: max_conf,
            class_id: best_class,
            class_name: class_names[best_class].clone(),
        });
    }

    nms(detections, NMS_IOU_THRESHOLD)
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();

    while !detections.is_empty() {
        let current = detections.remove(0);
        keep.push(current.clone());

        detections.retain(|det| {
            let iou = calculate_iou(&current.bbox, &det.bbox);
            iou < iou_threshold
        });
    }

    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_name: &str, confidence: f32) -> Detection {
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            confidence,
            class_id: 0,
            class_name: class_name.to_string(),
        }
    }

    #[test]
    fn test_contains_fire_is_case_insensitive_substring() {
        assert!(contains_fire(&[det("fire", 0.9)]));
        assert!(contains_fire(&[det("Fire", 0.9)]));
        assert!(contains_fire(&[det("WILDFIRE", 0.9)]));
        assert!(contains_fire(&[det("smoke", 0.9), det("fire", 0.5)]));
        assert!(!contains_fire(&[det("smoke", 0.9)]));
        assert!(!contains_fire(&[]));
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let a = Detection {
            bbox: [0.0, 0.0, 100.0, 100.0],
            confidence: 0.9,
            class_id: 0,
            class_name: "fire".to_string(),
        };
        let b = Detection {
            bbox: [5.0, 5.0, 105.0, 105.0], // heavy overlap with a
            confidence: 0.6,
            class_id: 0,
            class_name: "fire".to_string(),
        };
        let c = Detection {
            bbox: [300.0, 300.0, 400.0, 400.0], // disjoint
            confidence: 0.7,
            class_id: 0,
            class_name: "fire".to_string(),
        };

        let kept = nms(vec![a, b, c], 0.45);
        assert_eq!(kept.len(), 2);
        // Highest confidence survives first
        assert!((kept[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_iou_of_identical_boxes_is_one() {
        let b = [10.0, 10.0, 50.0, 50.0];
        assert!((calculate_iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_parse_detections_filters_by_confidence() {
        // One class, two anchors: output layout [cx, cx, cy, cy, w, w, h, h, conf, conf]
        let class_names = vec!["fire".to_string()];
        let output = vec![
            320.0, 100.0, // cx
            320.0, 100.0, // cy
            40.0, 40.0, // w
            40.0, 40.0, // h
            0.9, 0.1, // class confidence
        ];

        let dets = parse_detections(&output, &class_names, 1.0, 0.0, 0.0, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "fire");
        // Center 320, size 40 -> corners 300..340
        assert!((dets[0].bbox[0] - 300.0).abs() < 1e-3);
        assert!((dets[0].bbox[2] - 340.0).abs() < 1e-3);
    }

    #[test]
    fn test_parse_detections_reverses_letterbox() {
        let class_names = vec!["fire".to_string()];
        // Single anchor at model coords (120, 220), 20x20, conf 0.8
        let output = vec![120.0, 220.0, 20.0, 20.0, 0.8];

        // scale 0.5, pad (20, 120): original = (model - pad) / scale
        let dets = parse_detections(&output, &class_names, 0.5, 20.0, 120.0, 0.5);
        assert_eq!(dets.len(), 1);
        let [x1, y1, x2, y2] = dets[0].bbox;
        assert!((x1 - 180.0).abs() < 1e-3); // (110 - 20) / 0.5
        assert!((y1 - 180.0).abs() < 1e-3); // (210 - 120) / 0.5
        assert!((x2 - 220.0).abs() < 1e-3);
        assert!((y2 - 220.0).abs() < 1e-3);
    }

    #[test]
    fn test_parse_detections_rejects_malformed_output() {
        let class_names = vec!["fire".to_string(), "smoke".to_string()];
        // Length 7 is not divisible by stride 6
        let output = vec![0.0; 7];
        assert!(parse_detections(&output, &class_names, 1.0, 0.0, 0.0, 0.5).is_empty());
    }

    #[test]
    fn test_resize_bilinear_preserves_flat_color() {
        let src = vec![200u8; 4 * 4 * 3];
        let dst = resize_bilinear(&src, 4, 4, 8, 8);
        assert_eq!(dst.len(), 8 * 8 * 3);
        assert!(dst.iter().all(|&b| b == 200));
    }
}
