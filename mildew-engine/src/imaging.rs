/// Image decoding, encoding and drawing primitives
///
/// Everything here works on 8-bit RGB buffers from the `image` crate. Nothing
/// touches a display, so the whole pipeline runs headless.
///
/// # Drawing
///
/// - [`draw_rect`]: Hollow rectangle with a given stroke thickness
/// - [`fill_mask`]: Alpha-blend a colour through a binary mask
/// - [`to_gray`]: BT.601 luma conversion
///
/// # Masks
///
/// [`EllipseMask`] is a binary mask holding the filled axis-aligned ellipse
/// inscribed in a box. Lesion analysis combines them with [`EllipseMask::or_at`]
/// and [`EllipseMask::and`].
///
/// # Example
///
/// ```no_run
/// use mildew_engine::imaging::{decode, encode_jpeg, draw_rect};
/// use image::Rgb;
///
/// # fn example(bytes: &[u8]) -> Result<(), mildew_engine::imaging::ImageError> {
/// let mut img = decode(bytes)?;
/// draw_rect(&mut img, [10, 10, 100, 80], Rgb([0, 230, 0]), 3);
/// let jpeg = encode_jpeg(&img, 95)?;
/// # Ok(())
/// # }
/// ```

use chrono::Local;
use image::{codecs::jpeg::JpegEncoder, GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;

/// JPEG quality for annotated result images
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// JPEG quality for images stored under the static directory
pub const COMPRESS_QUALITY: u8 = 25;

/// Error type for image operations
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Bytes are not a decodable image
    #[error("无法读取图片: {0}")]
    Decode(String),

    /// Encoding failed
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Writing to disk failed
    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes JPEG, PNG or BMP bytes into an RGB buffer
///
/// # Errors
///
/// Returns `ImageError::Decode` for empty or undecodable input
pub fn decode(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Decode("empty image".to_string()));
    }

    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| ImageError::Decode(e.to_string()))
}

/// Encodes an RGB buffer as JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder
            .encode_image(img)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
    }
    Ok(buf)
}

/// Re-encodes any supported image as a JPEG of the given quality
pub fn compress(bytes: &[u8], quality: u8) -> Result<Vec<u8>, ImageError> {
    let img = decode(bytes)?;
    encode_jpeg(&img, quality)
}

/// Writes a result image under `root/results/<kind>/`
///
/// The file is named `ID<user>-<YYYYmmddHHMMSS>-<8 hex>.jpg`. Missing
/// directories are created.
///
/// # Returns
///
/// The public path of the file, `static/results/<kind>/<name>`, which is
/// also the URL path it is served under.
pub async fn save_static(
    root: &Path,
    user_id: i64,
    kind: &str,
    bytes: &[u8],
) -> Result<String, ImageError> {
    let file_name = format!(
        "ID{}-{}-{}.jpg",
        user_id,
        Local::now().format("%Y%m%d%H%M%S"),
        short_hex()
    );

    let dir = root.join("results").join(kind);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&file_name), bytes).await?;

    Ok(format!("static/results/{}/{}", kind, file_name))
}

/// First 8 hex digits of a random UUID
pub(crate) fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Clamps an `[x1, y1, x2, y2]` box to the image, truncating towards zero
pub fn clamp_box(xyxy: [f32; 4], width: u32, height: u32) -> [i64; 4] {
    let w = width as i64;
    let h = height as i64;
    [
        (xyxy[0] as i64).clamp(0, w),
        (xyxy[1] as i64).clamp(0, h),
        (xyxy[2] as i64).clamp(0, w),
        (xyxy[3] as i64).clamp(0, h),
    ]
}

fn put_pixel_checked(img: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, colour);
    }
}

/// Draws a hollow rectangle with corners `(x1, y1)` and `(x2, y2)` inclusive
///
/// The stroke is centred on the box edge. Pixels outside the image are skipped.
pub fn draw_rect(img: &mut RgbImage, xyxy: [i64; 4], colour: Rgb<u8>, thickness: u32) {
    let [x1, y1, x2, y2] = xyxy;
    let t = thickness.max(1) as i64;
    let inner = t / 2;
    let outer = t - inner - 1;

    for offset in -outer..=inner {
        let (left, top, right, bottom) = (x1 + offset, y1 + offset, x2 - offset, y2 - offset);
        if left > right || top > bottom {
            break;
        }
        for x in left..=right {
            put_pixel_checked(img, x, top, colour);
            put_pixel_checked(img, x, bottom, colour);
        }
        for y in top..=bottom {
            put_pixel_checked(img, left, y, colour);
            put_pixel_checked(img, right, y, colour);
        }
    }
}

/// Alpha-blends `colour` into every pixel set in `mask`
///
/// `origin` is where the mask's top-left corner lands on the image.
pub fn fill_mask(
    img: &mut RgbImage,
    origin: (i64, i64),
    mask: &EllipseMask,
    colour: Rgb<u8>,
    alpha: f32,
) {
    let alpha = alpha.clamp(0.0, 1.0);
    for my in 0..mask.height() {
        for mx in 0..mask.width() {
            if !mask.get(mx, my) {
                continue;
            }
            let x = origin.0 + mx as i64;
            let y = origin.1 + my as i64;
            if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
                continue;
            }
            let px = img.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let blended = colour[c] as f32 * alpha + px[c] as f32 * (1.0 - alpha);
                px[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Converts to grayscale with BT.601 weights (0.299 R + 0.587 G + 0.114 B)
pub fn to_gray(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = *img.get_pixel(x, y);
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binary mask of a filled axis-aligned ellipse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EllipseMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl EllipseMask {
    /// Creates an all-clear mask
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Creates a `width` x `height` mask holding the ellipse with the given
    /// centre and semi-axes
    ///
    /// A pixel is set when `(dx*b)^2 + (dy*a)^2 <= (a*b)^2` with `|dx| <= a`
    /// and `|dy| <= b`. Negative semi-axes give an empty mask.
    pub fn ellipse(width: u32, height: u32, centre: (i64, i64), axes: (i64, i64)) -> Self {
        let mut mask = Self::empty(width, height);
        let (a, b) = axes;
        if a < 0 || b < 0 {
            return mask;
        }

        let limit = (a * b) * (a * b);
        for y in 0..height {
            let dy = y as i64 - centre.1;
            if dy.abs() > b {
                continue;
            }
            for x in 0..width {
                let dx = x as i64 - centre.0;
                if dx.abs() > a {
                    continue;
                }
                if (dx * b) * (dx * b) + (dy * a) * (dy * a) <= limit {
                    mask.set(x, y);
                }
            }
        }
        mask
    }

    /// Ellipse inscribed in a `width` x `height` box, shrunk by `inset` pixels
    /// on each semi-axis
    pub fn inscribed(width: u32, height: u32, inset: i64) -> Self {
        let (w, h) = (width as i64, height as i64);
        Self::ellipse(width, height, (w / 2, h / 2), (w / 2 - inset, h / 2 - inset))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether `(x, y)` is set; out-of-range coordinates read as clear
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[self.index(x, y)]
    }

    fn set(&mut self, x: u32, y: u32) {
        let idx = self.index(x, y);
        self.bits[idx] = true;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Number of set pixels
    pub fn count_nonzero(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// ORs `other` into this mask with its top-left corner at `(ox, oy)`
    ///
    /// Parts of `other` falling outside this mask are ignored.
    pub fn or_at(&mut self, other: &EllipseMask, ox: i64, oy: i64) {
        for y in 0..other.height {
            for x in 0..other.width {
                if !other.get(x, y) {
                    continue;
                }
                let tx = ox + x as i64;
                let ty = oy + y as i64;
                if tx >= 0 && ty >= 0 && (tx as u32) < self.width && (ty as u32) < self.height {
                    self.set(tx as u32, ty as u32);
                }
            }
        }
    }

    /// Keeps only pixels also set in `other` (compared at the same coordinates)
    pub fn and(&mut self, other: &EllipseMask) {
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = self.index(x, y);
                self.bits[idx] = self.bits[idx] && other.get(x, y);
            }
        }
    }

    /// Nearest-neighbour resize
    pub fn resized(&self, width: u32, height: u32) -> EllipseMask {
        let mut out = EllipseMask::empty(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width as u64) as u32;
                if self.get(sx, sy) {
                    out.set(x, y);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png_and_reject_garbage() {
        let img = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));
        let decoded = decode(&png_bytes(&img)).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(*decoded.get_pixel(3, 3), Rgb([10, 20, 30]));

        assert!(matches!(decode(b"not an image"), Err(ImageError::Decode(_))));
        assert!(matches!(decode(&[]), Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_encode_and_compress_jpeg() {
        let img = RgbImage::from_pixel(32, 32, Rgb([200, 100, 50]));
        let jpeg = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let small = compress(&png_bytes(&img), COMPRESS_QUALITY).unwrap();
        assert_eq!(&small[..2], &[0xFF, 0xD8]);
        assert_eq!(decode(&small).unwrap().dimensions(), (32, 32));
    }

    #[tokio::test]
    async fn test_save_static_layout() {
        let dir = tempfile::tempdir().unwrap();
        let public = save_static(dir.path(), 7, "frogeye", b"jpeg").await.unwrap();

        assert!(public.starts_with("static/results/frogeye/ID7-"));
        assert!(public.ends_with(".jpg"));

        let name = public.rsplit('/').next().unwrap();
        // ID7-YYYYmmddHHMMSS-xxxxxxxx.jpg
        assert_eq!(name.len(), "ID7-".len() + 14 + 1 + 8 + ".jpg".len());

        let on_disk = dir.path().join("results").join("frogeye").join(name);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"jpeg");
    }

    #[test]
    fn test_draw_rect_thickness() {
        let mut img = RgbImage::new(20, 20);
        let green = Rgb([0, 230, 0]);
        draw_rect(&mut img, [5, 5, 14, 14], green, 3);

        assert_eq!(*img.get_pixel(5, 10), green);
        assert_eq!(*img.get_pixel(4, 10), green);
        assert_eq!(*img.get_pixel(6, 10), green);
        assert_eq!(*img.get_pixel(3, 10), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_rect_clips_to_image() {
        let mut img = RgbImage::new(10, 10);
        draw_rect(&mut img, [-5, -5, 50, 50], Rgb([255, 0, 0]), 1);
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_fill_mask_blends() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let mask = EllipseMask::ellipse(4, 4, (1, 1), (0, 0));
        fill_mask(&mut img, (0, 0), &mask, Rgb([0, 255, 0]), 0.5);

        assert_eq!(*img.get_pixel(1, 1), Rgb([50, 178, 50]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_to_gray_weights() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));

        let gray = to_gray(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn test_ellipse_mask_shape() {
        let mask = EllipseMask::ellipse(11, 7, (5, 3), (5, 3));
        assert!(mask.get(5, 3));
        assert!(mask.get(0, 3));
        assert!(mask.get(10, 3));
        assert!(mask.get(5, 0));
        assert!(!mask.get(0, 0));
        assert!(!mask.get(10, 6));

        // Single pixel when both axes are zero
        assert_eq!(EllipseMask::ellipse(5, 5, (2, 2), (0, 0)).count_nonzero(), 1);
        assert_eq!(EllipseMask::ellipse(5, 5, (2, 2), (-1, 2)).count_nonzero(), 0);
    }

    #[test]
    fn test_inscribed_inset() {
        let full = EllipseMask::inscribed(20, 20, 0);
        let inset = EllipseMask::inscribed(20, 20, 2);
        assert!(inset.count_nonzero() < full.count_nonzero());

        // Tiny boxes collapse to nothing once inset
        assert_eq!(EllipseMask::inscribed(2, 2, 2).count_nonzero(), 0);
    }

    #[test]
    fn test_mask_or_and() {
        let mut a = EllipseMask::empty(6, 6);
        let dot = EllipseMask::ellipse(1, 1, (0, 0), (0, 0));
        a.or_at(&dot, 2, 2);
        a.or_at(&dot, 4, 4);
        a.or_at(&dot, 9, 9);
        assert_eq!(a.count_nonzero(), 2);

        let mut b = EllipseMask::empty(6, 6);
        b.or_at(&dot, 2, 2);
        a.and(&b);
        assert_eq!(a.count_nonzero(), 1);
        assert!(a.get(2, 2));
    }

    #[test]
    fn test_mask_resize() {
        let mask = EllipseMask::inscribed(10, 10, 0);
        let big = mask.resized(20, 20);
        assert_eq!((big.width(), big.height()), (20, 20));
        assert!(big.get(10, 10));
        assert!(!big.get(0, 0));
        assert_eq!(EllipseMask::empty(0, 0).resized(3, 3).count_nonzero(), 0);
    }

    #[test]
    fn test_clamp_box() {
        assert_eq!(clamp_box([-3.7, 2.9, 50.2, 9.9], 40, 30), [0, 2, 40, 9]);
    }
}
