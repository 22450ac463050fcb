//! Contrast-limited adaptive histogram equalization over grayscale images.
//!
//! `imageproc` only ships global histogram equalization, so the
//! tile-based, clip-limited variant is ported here: per-tile clipped
//! histogram, CDF lookup table, bilinear interpolation between the four
//! surrounding tile tables.

use image::{GrayImage, Luma};

/// Apply CLAHE with the given clip limit and an NxN tile grid.
///
/// The clip limit is expressed as a multiple of the uniform histogram
/// height (2.0 means a bin may hold at most twice the average count);
/// clipped mass is redistributed evenly across all bins. Grids larger than
/// the image collapse to one tile per pixel row/column.
pub fn clahe(image: &GrayImage, clip_limit: f32, tile_grid: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let tiles_x = tile_grid.clamp(1, w);
    let tiles_y = tile_grid.clamp(1, h);

    // One clipped-CDF lookup table per tile. Tile bounds use even division
    // so no tile is ever empty.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * w / tiles_x;
            let x1 = (tx + 1) * w / tiles_x;
            let y0 = ty * h / tiles_y;
            let y1 = (ty + 1) * h / tiles_y;

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let pixels = (x1 - x0) * (y1 - y0);
            luts[(ty * tiles_x + tx) as usize] = clipped_cdf_lut(&mut hist, pixels, clip_limit);
        }
    }

    // Each output pixel blends the tables of its four nearest tile centers.
    let xs: Vec<(u32, u32, f32)> = (0..w)
        .map(|x| tile_blend(x, w, tiles_x))
        .collect();

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, wy) = tile_blend(y, h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, wx) = xs[x as usize];
            let v = image.get_pixel(x, y).0[0] as usize;
            let l00 = luts[(ty0 * tiles_x + tx0) as usize][v] as f32;
            let l01 = luts[(ty0 * tiles_x + tx1) as usize][v] as f32;
            let l10 = luts[(ty1 * tiles_x + tx0) as usize][v] as f32;
            let l11 = luts[(ty1 * tiles_x + tx1) as usize][v] as f32;
            let top = l00 + (l01 - l00) * wx;
            let bottom = l10 + (l11 - l10) * wx;
            let blended = top + (bottom - top) * wy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Map a pixel coordinate to its two surrounding tile indices and the
/// interpolation weight toward the second one. Coordinates beyond the
/// outermost tile centers clamp to the border tile.
fn tile_blend(coord: u32, extent: u32, tiles: u32) -> (u32, u32, f32) {
    let pos = (coord as f32 + 0.5) * tiles as f32 / extent as f32 - 0.5;
    let base = pos.floor();
    let weight = pos - base;
    let t0 = base.max(0.0) as u32;
    let t1 = ((base as i64) + 1).clamp(0, (tiles - 1) as i64) as u32;
    (t0.min(tiles - 1), t1, weight)
}

/// Clip the histogram at `clip_limit` times the average bin height,
/// redistribute the excess evenly, and fold the result into a 0–255 CDF
/// lookup table.
fn clipped_cdf_lut(hist: &mut [u32; 256], pixels: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if pixels == 0 {
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = v as u8;
        }
        return lut;
    }

    let limit = ((clip_limit * pixels as f32 / 256.0).max(1.0)) as u32;
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    for bin in hist.iter_mut() {
        *bin += bonus;
    }
    // Spread the leftover over evenly stepped bins so a narrow histogram
    // doesn't collect the entire residue below its own peak.
    let mut residual = (excess % 256) as usize;
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            i += step;
            residual -= 1;
        }
    }

    let mut cumulative = 0u32;
    for (v, &count) in hist.iter().enumerate() {
        cumulative += count;
        lut[v] = (cumulative as f32 * 255.0 / pixels as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    lut
}
