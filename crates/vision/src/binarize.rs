//! Binarization strategies: local-mean adaptive thresholding and global
//! Otsu thresholding.

use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};

/// Adaptive binarization: each pixel is compared against the mean of its
/// `block_size` neighbourhood minus the constant `c`. Pixels darker than
/// the local threshold become black, all others white.
///
/// Uses a summed-area table so the cost is independent of the block size.
pub fn adaptive_mean_threshold(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = block_size / 2;
    let integral = integral_image(gray);

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mean = region_mean(&integral, width, height, x, y, radius);
            let cut = (mean as i32 - c).clamp(0, 255) as u8;
            let value = if gray.get_pixel(x, y).0[0] < cut { 0u8 } else { 255u8 };
            out.put_pixel(x, y, Luma([value]));
        }
    }
    out
}

/// Global binarization at the Otsu level: the cut value minimizing
/// intra-class variance of the dark and bright pixel populations.
pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    threshold(gray, level, ThresholdType::Binary)
}

/// Summed-area table with a zero-padded border: entry `(x+1, y+1)` holds
/// the sum over the rectangle `[0,0)..(x,y)` inclusive.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[y as usize * stride + (x + 1) as usize];
        }
    }
    table
}

fn region_mean(integral: &[u64], width: u32, height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (width + 1) as usize;
    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(width as usize);
    let y2 = ((cy + radius + 1) as usize).min(height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }
    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;
    sum / area
}
