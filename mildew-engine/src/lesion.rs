/// Frogeye lesion analysis
///
/// Given frogeye detections on a leaf photo, measures how much of each leaf
/// is covered by lesions and grades it.
///
/// # Classes
///
/// - `4`: leaf
/// - `1..=3`: lesion
///
/// # Per Leaf
///
/// 1. The leaf area is the ellipse inscribed in the leaf box, with both
///    semi-axes shrunk by 2 px.
/// 2. Every lesion box strictly overlapping the leaf box is counted. Its
///    ellipse (inscribed in the part inside the leaf box) is added to the
///    lesion mask.
/// 3. `lesion_area` is the part of the lesion mask inside the leaf ellipse.
/// 4. Each lesion's mean gray level is taken over its own full box under its
///    ellipse; `avg_gray_value` averages those.
///
/// The annotated image tints leaves green (alpha 0.1), lesions red
/// (alpha 0.3) and outlines every leaf box.

use crate::detector::Detection;
use crate::imaging::{self, clamp_box, EllipseMask};
use crate::tier::distinguish_tier;
use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Leaf class index
pub const LEAF_CLASS: u32 = 4;

/// Lesion class indices
pub const LESION_CLASSES: std::ops::RangeInclusive<u32> = 1..=3;

const LEAF_TINT: Rgb<u8> = Rgb([0, 255, 0]);
const LEAF_ALPHA: f32 = 0.1;
const LESION_TINT: Rgb<u8> = Rgb([255, 0, 0]);
const LESION_ALPHA: f32 = 0.3;
const LEAF_OUTLINE: Rgb<u8> = Rgb([0, 230, 0]);
const LEAF_OUTLINE_THICKNESS: u32 = 3;
const LEAF_INSET: i64 = 2;

/// Measurements for one leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafInfo {
    /// Position among the leaves, in detection order
    pub leaf_index: usize,

    /// Leaf ellipse area in pixels
    pub leaf_area: usize,

    /// Lesion pixels inside the leaf ellipse
    pub lesion_area: usize,

    /// `lesion_area / leaf_area`, rounded to 4 decimals
    pub lesion_ratio: f64,

    /// Lesions overlapping the leaf box
    pub lesion_count: u32,

    /// Mean lesion gray level, rounded to 4 decimals
    pub avg_gray_value: f64,

    /// Severity grade (1, 3, 5, 7 or 9)
    pub tier: u8,
}

/// Result of lesion analysis
#[derive(Debug, Clone)]
pub struct LesionReport {
    pub leaves: Vec<LeafInfo>,

    /// Input image with leaf and lesion overlays
    pub annotated: RgbImage,
}

impl LesionReport {
    pub fn annotated_jpeg(&self, quality: u8) -> Result<Vec<u8>, imaging::ImageError> {
        imaging::encode_jpeg(&self.annotated, quality)
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Analyses every leaf in `detections`
pub fn analyze(detections: &[Detection], image: &RgbImage) -> LesionReport {
    let gray = imaging::to_gray(image);
    let mut canvas = image.clone();
    let (width, height) = image.dimensions();

    let leaves: Vec<[i64; 4]> = detections
        .iter()
        .filter(|d| d.cls == LEAF_CLASS)
        .map(|d| clamp_box(d.xyxy, width, height))
        .collect();
    let lesions: Vec<[i64; 4]> = detections
        .iter()
        .filter(|d| LESION_CLASSES.contains(&d.cls))
        .map(|d| clamp_box(d.xyxy, width, height))
        .filter(|b| b[2] > b[0] && b[3] > b[1])
        .collect();

    let mut infos = Vec::with_capacity(leaves.len());
    for (leaf_index, leaf) in leaves.iter().enumerate() {
        let info = analyze_leaf(leaf_index, *leaf, &lesions, &gray, &mut canvas);
        infos.push(info);
    }

    LesionReport {
        leaves: infos,
        annotated: canvas,
    }
}

fn analyze_leaf(
    leaf_index: usize,
    leaf: [i64; 4],
    lesions: &[[i64; 4]],
    gray: &GrayImage,
    canvas: &mut RgbImage,
) -> LeafInfo {
    let [lx, ly, rx, ry] = leaf;
    let lw = (rx - lx).max(0);
    let lh = (ry - ly).max(0);

    let leaf_mask = EllipseMask::inscribed(lw as u32, lh as u32, LEAF_INSET);
    let leaf_area = leaf_mask.count_nonzero();
    imaging::fill_mask(canvas, (lx, ly), &leaf_mask, LEAF_TINT, LEAF_ALPHA);

    let mut lesion_mask = EllipseMask::empty(lw as u32, lh as u32);
    let mut paint = EllipseMask::empty(canvas.width(), canvas.height());
    let mut gray_values = Vec::new();
    let mut lesion_count = 0u32;

    for &[x1, y1, x2, y2] in lesions {
        if x1 >= rx || x2 <= lx || y1 >= ry || y2 <= ly {
            continue;
        }
        lesion_count += 1;

        let rel_x1 = (x1 - lx).max(0);
        let rel_y1 = (y1 - ly).max(0);
        let rel_x2 = (x2 - lx).min(lw);
        let rel_y2 = (y2 - ly).min(lh);
        let clipped = EllipseMask::inscribed((rel_x2 - rel_x1) as u32, (rel_y2 - rel_y1) as u32, 0);
        lesion_mask.or_at(&clipped, rel_x1, rel_y1);

        let full = clipped.resized((x2 - x1) as u32, (y2 - y1) as u32);
        if let Some(mean) = masked_mean(gray, &full, x1, y1) {
            gray_values.push(mean);
        }
        paint.or_at(&full, x1, y1);
    }

    lesion_mask.and(&leaf_mask);
    let lesion_area = lesion_mask.count_nonzero();

    let lesion_ratio = if leaf_area == 0 {
        0.0
    } else {
        round4(lesion_area as f64 / leaf_area as f64)
    };
    let avg_gray_value = if gray_values.is_empty() {
        0.0
    } else {
        round4(gray_values.iter().sum::<f64>() / gray_values.len() as f64)
    };

    imaging::fill_mask(canvas, (0, 0), &paint, LESION_TINT, LESION_ALPHA);
    imaging::draw_rect(canvas, leaf, LEAF_OUTLINE, LEAF_OUTLINE_THICKNESS);

    LeafInfo {
        leaf_index,
        leaf_area,
        lesion_area,
        lesion_ratio,
        lesion_count,
        avg_gray_value,
        tier: distinguish_tier(lesion_ratio, lesion_count),
    }
}

/// Mean of `gray` under `mask` placed at `(ox, oy)`; None when nothing is covered
fn masked_mean(gray: &GrayImage, mask: &EllipseMask, ox: i64, oy: i64) -> Option<f64> {
    let mut sum = 0u64;
    let mut n = 0u64;
    for my in 0..mask.height() {
        for mx in 0..mask.width() {
            if !mask.get(mx, my) {
                continue;
            }
            let x = ox + mx as i64;
            let y = oy + my as i64;
            if x < 0 || y < 0 || x as u32 >= gray.width() || y as u32 >= gray.height() {
                continue;
            }
            sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            n += 1;
        }
    }
    (n > 0).then(|| sum as f64 / n as f64)
}
