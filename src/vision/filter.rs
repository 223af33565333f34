//! Smoothing and pyramid downsampling. Borders mirror without repeating the
//! edge pixel.

use super::image::{reflect101, GrayImage};

const GAUSS3: [u32; 3] = [1, 2, 1];
const GAUSS5: [u32; 5] = [1, 4, 6, 4, 1];

/// 3x3 Gaussian blur of `src` into `dst` (same size).
pub fn gaussian_blur_3x3(src: &GrayImage, dst: &mut GrayImage) {
    debug_assert!(src.same_size(dst));
    let (w, h) = (src.width, src.height);

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (ky, wy) in GAUSS3.iter().enumerate() {
                let sy = reflect101(y as isize + ky as isize - 1, h);
                let row = src.row(sy);
                for (kx, wx) in GAUSS3.iter().enumerate() {
                    let sx = reflect101(x as isize + kx as isize - 1, w);
                    acc += wy * wx * row[sx] as u32;
                }
            }
            dst.set(x, y, ((acc + 8) >> 4) as u8);
        }
    }
}

/// Size of the level produced by [`pyr_down`].
pub fn pyr_down_size(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

/// 5x5 Gaussian smoothing followed by dropping every other row and column.
pub fn pyr_down(src: &GrayImage, dst: &mut GrayImage) {
    debug_assert_eq!(
        (dst.width, dst.height),
        pyr_down_size(src.width, src.height)
    );
    let (w, h) = (src.width, src.height);

    for y in 0..dst.height {
        for x in 0..dst.width {
            let mut acc = 0u32;
            for (ky, wy) in GAUSS5.iter().enumerate() {
                let sy = reflect101(2 * y as isize + ky as isize - 2, h);
                let row = src.row(sy);
                for (kx, wx) in GAUSS5.iter().enumerate() {
                    let sx = reflect101(2 * x as isize + kx as isize - 2, w);
                    acc += wy * wx * row[sx] as u32;
                }
            }
            dst.set(x, y, ((acc + 128) >> 8) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_keeps_flat_image() {
        let src = GrayImage::from_vec(4, 3, vec![77; 12]);
        let mut dst = GrayImage::new(4, 3);
        gaussian_blur_3x3(&src, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn blur_softens_a_step() {
        // Columns: 0 0 | 255 255
        let src = GrayImage::from_vec(4, 1, vec![0, 0, 255, 255]);
        let mut dst = GrayImage::new(4, 1);
        gaussian_blur_3x3(&src, &mut dst);
        // Single row: vertical taps mirror onto the same row (weight 4x)
        assert_eq!(dst.data, vec![0, 64, 191, 255]);
    }

    #[test]
    fn pyr_down_halves_and_averages() {
        let src = GrayImage::from_vec(4, 4, vec![200; 16]);
        let (w, h) = pyr_down_size(4, 4);
        let mut dst = GrayImage::new(w, h);
        pyr_down(&src, &mut dst);
        assert_eq!((dst.width, dst.height), (2, 2));
        assert!(dst.data.iter().all(|&v| v == 200));
        assert_eq!(pyr_down_size(5, 3), (3, 2));
    }
}
