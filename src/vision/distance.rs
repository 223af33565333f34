//! Distance transform and per-row ridge extraction.

use super::image::{FloatImage, GrayImage};

/// Orthogonal step of the 3x3 chamfer mask approximating L2.
pub const STEP_ORTHO: f32 = 0.955;
/// Diagonal step of the 3x3 chamfer mask approximating L2.
pub const STEP_DIAG: f32 = 1.3693;

/// Value of pixels with no seed anywhere in the image.
pub const UNREACHED: f32 = 1.0e7;

/// Two-pass 3x3 chamfer distance transform.
///
/// Zero pixels in `mask` are seeds; every other pixel gets its approximate
/// Euclidean distance to the nearest seed. Pixels outside the image are not
/// seeds.
pub fn distance_transform(mask: &GrayImage, dist: &mut FloatImage) {
    debug_assert!(mask.same_size(dist));
    let (w, h) = (mask.width, mask.height);

    for (d, &m) in dist.data.iter_mut().zip(&mask.data) {
        *d = if m == 0 { 0.0 } else { UNREACHED };
    }

    // Forward pass: up-left, up, up-right, left
    for y in 0..h {
        for x in 0..w {
            let mut best = dist.get(x, y);
            if best == 0.0 {
                continue;
            }
            if y > 0 {
                if x > 0 {
                    best = best.min(dist.get(x - 1, y - 1) + STEP_DIAG);
                }
                best = best.min(dist.get(x, y - 1) + STEP_ORTHO);
                if x + 1 < w {
                    best = best.min(dist.get(x + 1, y - 1) + STEP_DIAG);
                }
            }
            if x > 0 {
                best = best.min(dist.get(x - 1, y) + STEP_ORTHO);
            }
            dist.set(x, y, best);
        }
    }

    // Backward pass: down-right, down, down-left, right
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let mut best = dist.get(x, y);
            if best == 0.0 {
                continue;
            }
            if y + 1 < h {
                if x + 1 < w {
                    best = best.min(dist.get(x + 1, y + 1) + STEP_DIAG);
                }
                best = best.min(dist.get(x, y + 1) + STEP_ORTHO);
                if x > 0 {
                    best = best.min(dist.get(x - 1, y + 1) + STEP_DIAG);
                }
            }
            if x + 1 < w {
                best = best.min(dist.get(x + 1, y) + STEP_ORTHO);
            }
            dist.set(x, y, best);
        }
    }
}

/// Column of the first maximum in `row`.
#[inline]
pub fn row_argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (x, &value) in row.iter().enumerate().skip(1) {
        if value > row[best] {
            best = x;
        }
    }
    best
}

/// Keep only the per-row maximum of `dist`, boosted by `boost`.
///
/// Rows are walked bottom to top; ties go to the lowest column. `ridge` ends
/// up all zero except for one pixel per row.
pub fn trace_ridge(dist: &FloatImage, ridge: &mut FloatImage, boost: f32) {
    debug_assert!(dist.same_size(ridge));
    ridge.fill(0.0);
    if dist.width == 0 {
        return;
    }
    for y in (0..dist.height).rev() {
        let x = row_argmax(dist.row(y));
        ridge.set(x, y, dist.get(x, y) + boost);
    }
}

/// Min-max normalize `src` into `[0, 1]`. A flat image maps to all zero.
pub fn normalize_min_max(src: &FloatImage, dst: &mut FloatImage) {
    debug_assert!(src.same_size(dst));
    let (min, max) = src
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        dst.fill(0.0);
        return;
    }
    for (d, &s) in dst.data.iter_mut().zip(&src.data) {
        *d = (s - min) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn distance_grows_from_single_seed() {
        let mut mask = GrayImage::from_vec(5, 5, vec![255; 25]);
        mask.set(2, 2, 0);
        let mut dist = FloatImage::new(5, 5);
        distance_transform(&mask, &mut dist);

        assert_eq!(dist.get(2, 2), 0.0);
        assert_relative_eq!(dist.get(3, 2), STEP_ORTHO);
        assert_relative_eq!(dist.get(2, 0), 2.0 * STEP_ORTHO);
        assert_relative_eq!(dist.get(3, 3), STEP_DIAG);
        assert_relative_eq!(dist.get(4, 4), 2.0 * STEP_DIAG);
        assert_relative_eq!(dist.get(4, 3), STEP_DIAG + STEP_ORTHO);
    }

    #[test]
    fn no_seed_leaves_everything_unreached() {
        let mask = GrayImage::from_vec(3, 2, vec![255; 6]);
        let mut dist = FloatImage::new(3, 2);
        distance_transform(&mask, &mut dist);
        assert!(dist.data.iter().all(|&d| d == UNREACHED));
    }

    #[test]
    fn ridge_has_one_boosted_pixel_per_row() {
        #[rustfmt::skip]
        let dist = FloatImage::from_vec(4, 3, vec![
            1.0, 5.0, 2.0, 0.0,
            0.0, 0.5, 0.25, 3.0,
            9.0, 8.0, 7.0, 6.0,
        ]);
        let mut ridge = FloatImage::new(4, 3);
        trace_ridge(&dist, &mut ridge, 1000.0);

        for y in 0..3 {
            let nonzero: Vec<_> = (0..4).filter(|&x| ridge.get(x, y) != 0.0).collect();
            assert_eq!(nonzero.len(), 1, "row {y}");
        }
        assert_eq!(ridge.get(1, 0), 1005.0);
        assert_eq!(ridge.get(3, 1), 1003.0);
        assert_eq!(ridge.get(0, 2), 1009.0);
    }

    #[test]
    fn ridge_ties_go_to_lowest_column() {
        let dist = FloatImage::from_vec(4, 1, vec![2.0, 4.0, 4.0, 1.0]);
        let mut ridge = FloatImage::new(4, 1);
        trace_ridge(&dist, &mut ridge, 1000.0);
        assert_eq!(ridge.data, vec![0.0, 1004.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_row_still_marks_column_zero() {
        let dist = FloatImage::new(3, 2);
        let mut ridge = FloatImage::from_vec(3, 2, vec![7.0; 6]);
        trace_ridge(&dist, &mut ridge, 1000.0);
        assert_eq!(ridge.data, vec![1000.0, 0.0, 0.0, 1000.0, 0.0, 0.0]);
    }

    #[test]
    fn ridge_follows_lane_center() {
        // Seeds along both edges, the lane between them is widest at x = 4
        let mut mask = GrayImage::from_vec(9, 4, vec![255; 36]);
        for y in 0..4 {
            mask.set(0, y, 0);
            mask.set(8, y, 0);
        }
        let mut dist = FloatImage::new(9, 4);
        let mut ridge = FloatImage::new(9, 4);
        distance_transform(&mask, &mut dist);
        trace_ridge(&dist, &mut ridge, 1000.0);
        for y in 0..4 {
            assert_eq!(row_argmax(ridge.row(y)), 4);
        }
    }

    #[test]
    fn normalize_spans_unit_range() {
        let src = FloatImage::from_vec(3, 1, vec![2.0, 4.0, 6.0]);
        let mut dst = FloatImage::new(3, 1);
        normalize_min_max(&src, &mut dst);
        assert_eq!(dst.data, vec![0.0, 0.5, 1.0]);

        let flat = FloatImage::from_vec(3, 1, vec![5.0; 3]);
        normalize_min_max(&flat, &mut dst);
        assert_eq!(dst.data, vec![0.0; 3]);
    }
}
