//! Contrast-Limited Adaptive Histogram Equalization.
//!
//! Standard CLAHE: partition the image into a grid of `kernel_size`-square
//! (edge-clipped) context regions, compute a clip-and-redistribute
//! histogram equalization mapping per region, then bilinearly interpolate
//! between the four nearest region mappings for each pixel.
//!
//! Both call sites in this crate (the per-super-block thumbnail and each
//! producer tile) invoke this with `kernel_size = 1024` and run it
//! independently per image, so there is no blending across separate calls
//! and adjacent producer tiles can show an equalization seam at their
//! shared edge. This is a known, preserved limitation, not a bug in this
//! module.

use image::{GrayImage, Luma};

#[derive(Debug, Clone, Copy)]
pub struct ClaheParams {
    pub kernel_size: u32,
    /// Fraction of a region's pixel count, divided across 256 bins, above
    /// which a histogram bin is clipped and the excess redistributed.
    /// `0.01` matches the conventional adaptive-histogram-equalization
    /// default.
    pub clip_limit: f64,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self { kernel_size: 1024, clip_limit: 0.01 }
    }
}

fn block_bounds(dim: u32, kernel: u32) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < dim {
        let end = (start + kernel).min(dim);
        out.push((start, end));
        start += kernel;
    }
    out
}

fn region_mapping(image: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f64) -> [u8; 256] {
    let mut hist = [0u32; 256];
    let mut count = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y).0[0] as usize] += 1;
            count += 1;
        }
    }
    if count == 0 {
        return std::array::from_fn(|i| i as u8);
    }

    let clip = ((clip_limit * count as f64 / 256.0).round() as u32).max(1);
    let mut excess = 0u32;
    for h in hist.iter_mut() {
        if *h > clip {
            excess += *h - clip;
            *h = clip;
        }
    }
    let share = excess / 256;
    let remainder = excess % 256;
    for (i, h) in hist.iter_mut().enumerate() {
        *h += share + if (i as u32) < remainder { 1 } else { 0 };
    }

    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, h) in hist.iter().enumerate() {
        running += h;
        cdf[i] = running;
    }
    let total = cdf[255].max(1) as f64;
    std::array::from_fn(|i| (cdf[i] as f64 * 255.0 / total).round().clamp(0.0, 255.0) as u8)
}

/// Bracket `v` between the two nearest entries of `centers`, returning
/// their indices and the interpolation weight toward the upper one.
/// Clamps at the ends instead of extrapolating.
fn bracket(centers: &[f64], v: f64) -> (usize, usize, f64) {
    let n = centers.len();
    if v <= centers[0] {
        return (0, 0, 0.0);
    }
    if v >= centers[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    for i in 0..n - 1 {
        if v >= centers[i] && v <= centers[i + 1] {
            let t = (v - centers[i]) / (centers[i + 1] - centers[i]);
            return (i, i + 1, t);
        }
    }
    (n - 1, n - 1, 0.0)
}

pub fn clahe(image: &GrayImage, params: &ClaheParams) -> GrayImage {
    let (width, height) = image.dimensions();
    let kernel = params.kernel_size.max(1);
    let bounds_x = block_bounds(width, kernel);
    let bounds_y = block_bounds(height, kernel);

    let mappings: Vec<Vec<[u8; 256]>> = bounds_y
        .iter()
        .map(|&(y0, y1)| {
            bounds_x
                .iter()
                .map(|&(x0, x1)| region_mapping(image, x0, x1, y0, y1, params.clip_limit))
                .collect()
        })
        .collect();

    let centers_x: Vec<f64> = bounds_x.iter().map(|&(x0, x1)| (x0 + x1 - 1) as f64 / 2.0).collect();
    let centers_y: Vec<f64> = bounds_y.iter().map(|&(y0, y1)| (y0 + y1 - 1) as f64 / 2.0).collect();

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (by0, by1, ty) = bracket(&centers_y, y as f64);
        for x in 0..width {
            let (bx0, bx1, tx) = bracket(&centers_x, x as f64);
            let value = image.get_pixel(x, y).0[0] as usize;
            let m00 = mappings[by0][bx0][value] as f64;
            let m01 = mappings[by0][bx1][value] as f64;
            let m10 = mappings[by1][bx0][value] as f64;
            let m11 = mappings[by1][bx1][value] as f64;
            let top = m00 + (m01 - m00) * tx;
            let bottom = m10 + (m11 - m10) * tx;
            let mapped = (top + (bottom - top) * ty).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(x, y, Luma([mapped]));
        }
    }
    out
}
