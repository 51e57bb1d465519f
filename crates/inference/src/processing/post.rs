use crate::detection::DetectionRecord;
use ndarray::{ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2};
use preprocess::LetterboxTransform;
use std::cmp::Ordering;

/// Upper bound on boxes entering NMS.
const MAX_NMS_CANDIDATES: usize = 30_000;

/// Columns of an end-to-end row: `x1, y1, x2, y2, confidence, class`.
const END_TO_END_COLUMNS: usize = 6;

/// Shape of the first model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, 4 + nc, N]`, boxes as `cx, cy, w, h` followed by class scores
    ChannelsFirst,
    /// `[1, N, 4 + nc]`
    ChannelsLast,
    /// `[1, N, 6]`, already suppressed by the graph
    EndToEnd,
}

impl OutputLayout {
    /// Infer the layout of a detection output.
    ///
    /// With two classes `[1, N, 6]` fits both channels-last and end-to-end.
    /// It is read as end-to-end only when every row carries an integral
    /// class id and an ordered `x1 <= x2, y1 <= y2` box.
    pub fn detect(output: &ArrayViewD<f32>, num_classes: usize) -> anyhow::Result<Self> {
        let shape = output.shape();
        let &[batch, a, b] = shape else {
            anyhow::bail!("Expected a 3-D detection output, got shape {:?}", shape);
        };
        if batch != 1 {
            anyhow::bail!("Expected batch size 1, got {}", batch);
        }

        let channels = 4 + num_classes;
        if a == channels {
            Ok(OutputLayout::ChannelsFirst)
        } else if b == END_TO_END_COLUMNS && b == channels {
            let rows = output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;
            if rows.outer_iter().all(|row| is_end_to_end_row(&row)) {
                Ok(OutputLayout::EndToEnd)
            } else {
                Ok(OutputLayout::ChannelsLast)
            }
        } else if b == END_TO_END_COLUMNS {
            Ok(OutputLayout::EndToEnd)
        } else if b == channels {
            Ok(OutputLayout::ChannelsLast)
        } else {
            anyhow::bail!(
                "Output shape {:?} does not match {} classes",
                shape,
                num_classes
            )
        }
    }
}

fn is_end_to_end_row(row: &ArrayView1<f32>) -> bool {
    let class = row[5];
    class.fract() == 0.0 && class >= 0.0 && row[0] <= row[2] && row[1] <= row[3]
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
        }
    }

    /// Decode YOLO output into detections on the source image, best first.
    #[tracing::instrument(skip(self, output, transform), fields(shape = ?output.shape()))]
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        num_classes: usize,
        transform: &LetterboxTransform,
    ) -> anyhow::Result<Vec<DetectionRecord>> {
        let layout = OutputLayout::detect(output, num_classes)?;
        let predictions = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()?;

        let mut candidates = match layout {
            OutputLayout::ChannelsFirst => self.decode_raw(&predictions.t(), num_classes),
            OutputLayout::ChannelsLast => self.decode_raw(&predictions.view(), num_classes),
            OutputLayout::EndToEnd => self.decode_end_to_end(&predictions.view(), num_classes),
        };

        sort_by_confidence(&mut candidates);

        let mut kept = if layout == OutputLayout::EndToEnd {
            candidates.truncate(self.max_detections);
            candidates
        } else {
            candidates.truncate(MAX_NMS_CANDIDATES);
            non_max_suppression(&candidates, self.iou_threshold, self.max_detections)
        };

        for record in &mut kept {
            record.bbox = transform.box_to_source(record.bbox);
        }

        tracing::debug!(layout = ?layout, detections = kept.len(), "Decoded detections");
        Ok(kept)
    }

    /// Rows of `cx, cy, w, h, score_0 .. score_nc` in input pixels.
    fn decode_raw(
        &self,
        rows: &ArrayView2<f32>,
        num_classes: usize,
    ) -> Vec<DetectionRecord> {
        let mut records = Vec::new();

        for row in rows.outer_iter() {
            let Some((class_index, confidence)) = argmax(row.iter().skip(4).take(num_classes))
            else {
                continue;
            };
            if confidence.is_nan() || confidence <= self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(row[0], row[1], row[2], row[3]);
            records.push(DetectionRecord {
                class_index: class_index as u32,
                confidence,
                bbox: [x1, y1, x2, y2],
            });
        }

        records
    }

    fn decode_end_to_end(
        &self,
        rows: &ArrayView2<f32>,
        num_classes: usize,
    ) -> Vec<DetectionRecord> {
        rows.outer_iter()
            .filter_map(|row| {
                let confidence = row[4];
                let class = row[5].round();
                if confidence.is_nan()
                    || confidence <= self.confidence_threshold
                    || !(0.0..num_classes as f32).contains(&class)
                {
                    return None;
                }
                Some(DetectionRecord {
                    class_index: class as u32,
                    confidence,
                    bbox: [row[0], row[1], row[2], row[3]],
                })
            })
            .collect()
    }
}

fn argmax<'a>(scores: impl Iterator<Item = &'a f32>) -> Option<(usize, f32)> {
    scores
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

fn sort_by_confidence(records: &mut [DetectionRecord]) {
    records.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
}

/// Greedy class-aware NMS over confidence-sorted records.
fn non_max_suppression(
    sorted: &[DetectionRecord],
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<DetectionRecord> {
    let mut keep: Vec<DetectionRecord> = Vec::with_capacity(max_detections.min(sorted.len()));

    for candidate in sorted {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep.iter().any(|kept| {
            kept.class_index == candidate.class_index
                && iou(&kept.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(*candidate);
        }
    }

    keep
}

#[inline]
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn test_postprocessor() -> PostProcessor {
        PostProcessor::new(0.25, 0.7, 300)
    }

    fn test_transform(
        orig_width: u32,
        orig_height: u32,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> LetterboxTransform {
        LetterboxTransform {
            orig_width,
            orig_height,
            input_width: 512,
            input_height: 512,
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Build a `[1, 4 + nc, N]` tensor from `(cxcywh, class, score)` triples.
    fn yolo_output(
        predictions: &[([f32; 4], usize, f32)],
        num_classes: usize,
    ) -> Array<f32, IxDyn> {
        let n = predictions.len();
        let channels = 4 + num_classes;
        let mut data = vec![0.0f32; channels * n];
        for (i, (bbox, class, score)) in predictions.iter().enumerate() {
            for (c, value) in bbox.iter().enumerate() {
                data[c * n + i] = *value;
            }
            data[(4 + class) * n + i] = *score;
        }
        Array::from_shape_vec(IxDyn(&[1, channels, n]), data).unwrap()
    }

    fn identity() -> LetterboxTransform {
        test_transform(512, 512, 1.0, 0.0, 0.0)
    }

    #[test]
    fn test_cxcywh_to_xyxy() {
        let (x1, y1, x2, y2) = cxcywh_to_xyxy(0.5, 0.5, 0.4, 0.2);
        assert!((x1 - 0.3).abs() < 1e-6);
        assert!((y1 - 0.4).abs() < 1e-6);
        assert!((x2 - 0.7).abs() < 1e-6);
        assert!((y2 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        // Half overlap: 50 / 150
        assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(iou(&[0.0; 4], &[0.0; 4]), 0.0);
    }

    fn layout_of(shape: &[usize], num_classes: usize) -> anyhow::Result<OutputLayout> {
        OutputLayout::detect(&Array::zeros(IxDyn(shape)).view(), num_classes)
    }

    #[test]
    fn test_layout_detection() {
        assert_eq!(layout_of(&[1, 84, 8400], 80).unwrap(), OutputLayout::ChannelsFirst);
        assert_eq!(layout_of(&[1, 8400, 84], 80).unwrap(), OutputLayout::ChannelsLast);
        assert_eq!(layout_of(&[1, 300, 6], 80).unwrap(), OutputLayout::EndToEnd);
        assert!(layout_of(&[1, 10, 10], 80).is_err());
        assert!(layout_of(&[84, 8400], 80).is_err());
        assert!(layout_of(&[2, 84, 8400], 80).is_err());
    }

    #[test]
    fn test_two_class_layout_is_resolved_from_rows() {
        // Raw rows: cx, cy, w, h, score_0, score_1
        let raw = Array::from_shape_vec(
            IxDyn(&[1, 2, 6]),
            vec![
                100.0, 120.0, 40.0, 30.0, 0.0, 0.9, //
                300.0, 200.0, 60.0, 60.0, 0.6, 0.0,
            ],
        )
        .unwrap();
        assert_eq!(
            OutputLayout::detect(&raw.view(), 2).unwrap(),
            OutputLayout::ChannelsLast
        );

        // End-to-end rows: x1, y1, x2, y2, confidence, class
        let end_to_end = Array::from_shape_vec(
            IxDyn(&[1, 3, 6]),
            vec![
                80.0, 105.0, 120.0, 135.0, 0.9, 1.0, //
                270.0, 170.0, 330.0, 230.0, 0.6, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ],
        )
        .unwrap();
        assert_eq!(
            OutputLayout::detect(&end_to_end.view(), 2).unwrap(),
            OutputLayout::EndToEnd
        );

        let detections = test_postprocessor()
            .parse_detections(&end_to_end.view(), 2, &identity())
            .unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_index, 1);
        assert_eq!(detections[0].bbox, [80.0, 105.0, 120.0, 135.0]);
    }

    #[test]
    fn test_confidence_threshold_filtering() {
        let output = yolo_output(
            &[
                ([50.0, 50.0, 20.0, 20.0], 0, 0.20),
                ([150.0, 150.0, 20.0, 20.0], 1, 0.25),
                ([250.0, 250.0, 20.0, 20.0], 2, 0.80),
            ],
            3,
        );

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 3, &identity())
            .unwrap();

        // The threshold itself is exclusive
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_index, 2);
        assert!((detections[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_coordinate_inverse_transformation() {
        // 800x600 source letterboxed into 512x512: scale 0.64, 64px top padding.
        // Box (204.8, 204.8, 307.2, 307.2) in input space maps to (320, 220, 480, 380).
        let output = yolo_output(&[([256.0, 256.0, 102.4, 102.4], 0, 0.9)], 1);
        let transform = test_transform(800, 600, 0.64, 0.0, 64.0);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 1, &transform)
            .unwrap();

        assert_eq!(detections.len(), 1);
        let [x1, y1, x2, y2] = detections[0].bbox;
        assert!((x1 - 320.0).abs() < 0.1, "x1 transformation incorrect: {}", x1);
        assert!((y1 - 220.0).abs() < 0.1, "y1 transformation incorrect: {}", y1);
        assert!((x2 - 480.0).abs() < 0.1, "x2 transformation incorrect: {}", x2);
        assert!((y2 - 380.0).abs() < 0.1, "y2 transformation incorrect: {}", y2);
    }

    #[test]
    fn test_coordinates_clamped_to_image_bounds() {
        let output = yolo_output(
            &[
                ([30.0, 30.0, 100.0, 100.0], 0, 0.9),
                ([480.0, 480.0, 100.0, 100.0], 1, 0.9),
            ],
            2,
        );
        let transform = test_transform(400, 400, 1.0, 50.0, 50.0);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 2, &transform)
            .unwrap();

        assert_eq!(detections.len(), 2);
        let top_left = detections.iter().find(|d| d.class_index == 0).unwrap();
        assert_eq!(top_left.bbox[0], 0.0, "Negative x1 should be clamped to 0");
        assert_eq!(top_left.bbox[1], 0.0, "Negative y1 should be clamped to 0");

        let bottom_right = detections.iter().find(|d| d.class_index == 1).unwrap();
        assert_eq!(bottom_right.bbox[2], 400.0, "x2 exceeding width should be clamped");
        assert_eq!(bottom_right.bbox[3], 400.0, "y2 exceeding height should be clamped");
    }

    #[test]
    fn test_nms_is_class_aware() {
        let output = yolo_output(
            &[
                ([100.0, 100.0, 50.0, 50.0], 0, 0.9),
                // Same place, same class, lower score: suppressed
                ([102.0, 101.0, 50.0, 50.0], 0, 0.8),
                // Same place, different class: kept
                ([101.0, 100.0, 50.0, 50.0], 1, 0.7),
                // Same class, far away: kept
                ([400.0, 400.0, 50.0, 50.0], 0, 0.6),
            ],
            2,
        );

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 2, &identity())
            .unwrap();

        let confidences: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7, 0.6]);
    }

    #[test]
    fn test_max_detections_cap() {
        let predictions: Vec<_> = (0..20)
            .map(|i| {
                let offset = i as f32 * 25.0;
                ([offset + 10.0, 10.0, 10.0, 10.0], 0, 0.5 + i as f32 * 0.01)
            })
            .collect();
        let output = yolo_output(&predictions, 1);

        let detections = PostProcessor::new(0.25, 0.7, 5)
            .parse_detections(&output.view(), 1, &identity())
            .unwrap();

        assert_eq!(detections.len(), 5);
        assert!(
            detections
                .windows(2)
                .all(|w| w[0].confidence >= w[1].confidence),
            "Detections should be sorted by confidence"
        );
    }

    #[test]
    fn test_channels_last_matches_channels_first() {
        let predictions = [
            ([100.0, 120.0, 40.0, 30.0], 1, 0.9),
            ([300.0, 200.0, 60.0, 60.0], 0, 0.6),
        ];
        let first = yolo_output(&predictions, 2);
        let mut last = first.clone();
        last.swap_axes(1, 2);

        let post = test_postprocessor();
        let a = post.parse_detections(&first.view(), 2, &identity()).unwrap();
        let b = post.parse_detections(&last.view(), 2, &identity()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].class_index, 1);
        assert_eq!(a[0].bbox, [80.0, 105.0, 120.0, 135.0]);
        assert_eq!(a[1].bbox, [270.0, 170.0, 330.0, 230.0]);
    }

    #[test]
    fn test_end_to_end_output() {
        let rows = vec![
            10.0, 20.0, 110.0, 120.0, 0.9, 1.0, // kept
            0.0, 0.0, 5.0, 5.0, 0.1, 0.0, // below threshold
            0.0, 0.0, 5.0, 5.0, 0.9, 7.0, // class out of range
        ];
        let output = Array::from_shape_vec(IxDyn(&[1, 3, 6]), rows).unwrap();

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 3, &identity())
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_index, 1);
        assert_eq!(detections[0].bbox, [10.0, 20.0, 110.0, 120.0]);
    }

    #[test]
    fn test_empty_input() {
        let output = Array::from_shape_vec(IxDyn(&[1, 84, 0]), vec![]).unwrap();

        let detections = test_postprocessor()
            .parse_detections(&output.view(), 80, &identity())
            .unwrap();

        assert!(detections.is_empty(), "Empty input should return no detections");
    }

    #[test]
    fn test_realistic_yolo_output() {
        // 8400 anchors, 80 classes, three real objects each predicted twice
        let num_anchors = 8400;
        let num_classes = 80;
        let channels = 4 + num_classes;
        let mut data = vec![0.0f32; channels * num_anchors];

        let objects = [
            (0usize, [100.0f32, 150.0, 80.0, 160.0], 0.92f32), // person
            (16, [300.0, 300.0, 120.0, 90.0], 0.85),           // dog
            (2, [420.0, 400.0, 150.0, 100.0], 0.55),           // car
        ];
        for (k, (class, bbox, score)) in objects.iter().enumerate() {
            for duplicate in 0..2 {
                let anchor = k * 100 + duplicate;
                let jitter = duplicate as f32;
                for c in 0..4 {
                    data[c * num_anchors + anchor] = bbox[c] + jitter;
                }
                data[(4 + class) * num_anchors + anchor] = score - 0.05 * jitter;
            }
        }
        let output = Array::from_shape_vec(IxDyn(&[1, channels, num_anchors]), data).unwrap();

        let detections = test_postprocessor()
            .parse_detections(&output.view(), num_classes, &identity())
            .unwrap();

        let classes: Vec<u32> = detections.iter().map(|d| d.class_index).collect();
        assert_eq!(classes, vec![0, 16, 2]);
    }
}
