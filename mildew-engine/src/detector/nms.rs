/// Intersection-over-union and class-wise non-maximum suppression

use super::{number, Detection};

/// Intersection over union of two `[x1, y1, x2, y2]` boxes
///
/// Returns 0 when either box is degenerate.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Class-wise NMS
///
/// Boxes are visited in descending confidence; a box is dropped when it
/// overlaps an already kept box of the same class by more than `threshold`.
/// The survivors come back in descending confidence, renumbered from 1.
pub fn nms(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.conf.total_cmp(&a.conf));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.cls == candidate.cls && iou(&k.xyxy, &candidate.xyxy) > threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    number(kept)
}
