//! Owned row-major images reused across frames.

use crate::PatchRect;

#[derive(Clone, Debug, PartialEq)]
pub struct Image<T> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>, // row-major, len = w*h
}

pub type GrayImage = Image<u8>;
pub type FloatImage = Image<f32>;

impl<T: Copy + Default> Image<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height, "image data doesn't match size");
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn same_size<U>(&self, other: &Image<U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Interleaved three-channel image.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<[u8; 3]>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![[0; 3]; width * height],
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8; 3]> {
        self.data.iter()
    }
}

/// Axis-aligned region, half-open on the far edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    /// Intersect with a `width` x `height` image. `None` when nothing is left.
    pub fn clip(self, width: usize, height: usize) -> Option<Rect> {
        let x1 = (self.x + self.width).min(width);
        let y1 = (self.y + self.height).min(height);
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Rect {
            x: self.x,
            y: self.y,
            width: x1 - self.x,
            height: y1 - self.y,
        })
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl From<PatchRect> for Rect {
    fn from(p: PatchRect) -> Self {
        Rect {
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
        }
    }
}

/// Mirror an out-of-range index back into `0..n` without repeating the edge.
#[inline]
pub(crate) fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}
