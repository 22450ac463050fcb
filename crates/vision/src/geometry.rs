use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Order four corner points as `[top-left, top-right, bottom-right,
/// bottom-left]`.
///
/// Top-left minimizes x+y, bottom-right maximizes it; top-right minimizes
/// y−x, bottom-left maximizes it. Deterministic; callers must pass the four
/// corners of an actual quadrilateral.
pub fn order_corners(points: [(f32, f32); 4]) -> [(f32, f32); 4] {
    let mut tl = points[0];
    let mut tr = points[0];
    let mut br = points[0];
    let mut bl = points[0];
    for p in points {
        if p.0 + p.1 < tl.0 + tl.1 {
            tl = p;
        }
        if p.0 + p.1 > br.0 + br.1 {
            br = p;
        }
        if p.1 - p.0 < tr.1 - tr.0 {
            tr = p;
        }
        if p.1 - p.0 > bl.1 - bl.0 {
            bl = p;
        }
    }
    [tl, tr, br, bl]
}

/// Warp the quadrilateral spanned by `points` into an axis-aligned
/// rectangle.
///
/// Target width is the longer of the two horizontal edges, target height
/// the longer of the two vertical edges, both floored. Returns `None` for
/// degenerate quadrilaterals (zero-sized target or no invertible
/// projection) — callers must fall back to the uncorrected image rather
/// than propagate an empty one.
pub fn four_point_transform(image: &GrayImage, points: [(f32, f32); 4]) -> Option<GrayImage> {
    let [tl, tr, br, bl] = order_corners(points);

    let dist = |a: (f32, f32), b: (f32, f32)| (a.0 - b.0).hypot(a.1 - b.1);
    let width = dist(br, bl).max(dist(tr, tl)) as u32;
    let height = dist(tr, br).max(dist(tl, bl)) as u32;
    if width == 0 || height == 0 {
        return None;
    }

    let dst = [
        (0.0, 0.0),
        ((width - 1) as f32, 0.0),
        ((width - 1) as f32, (height - 1) as f32),
        (0.0, (height - 1) as f32),
    ];
    let projection = Projection::from_control_points([tl, tr, br, bl], dst)?;

    let mut out = GrayImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Luma([255u8]), &mut out);
    Some(out)
}
