//! Offset and heading from two samples of the ridge field.

use crate::error::PipelineError;
use crate::SteeringConfig;

use super::distance::row_argmax;
use super::image::FloatImage;

/// Angle reported when both ridge samples share a column.
pub const VERTICAL_ANGLE: f64 = 90.0;

/// Lateral offset (pixels, positive when the ridge is left of the midline)
/// and heading angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteerResult {
    pub offset: f64,
    pub angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RidgePoint {
    pub x: i32,
    pub y: i32,
}

/// Steering from ridge points. `near` is lower in the image than `far`.
pub fn steer_from_points(near: RidgePoint, far: RidgePoint, midline_x: i32) -> SteerResult {
    let offset = (midline_x - near.x) as f64;
    let angle = if far.x == near.x {
        VERTICAL_ANGLE
    } else {
        let dy = (near.y - far.y) as f64;
        let dx = (far.x - near.x) as f64;
        dy.atan2(dx).to_degrees()
    };
    SteerResult { offset, angle }
}

pub struct Steering {
    near_row: usize,
    far_row: usize,
    midline_x: i32,
}

impl Steering {
    pub fn new(config: &SteeringConfig) -> Self {
        Self {
            near_row: config.near_row,
            far_row: config.far_row,
            midline_x: config.midline_x,
        }
    }

    /// Brightest column of `row`.
    pub fn row_peak(ridge: &FloatImage, row: usize) -> Result<RidgePoint, PipelineError> {
        if row >= ridge.height {
            return Err(PipelineError::RowOutOfRange {
                row,
                height: ridge.height,
            });
        }
        Ok(RidgePoint {
            x: row_argmax(ridge.row(row)) as i32,
            y: row as i32,
        })
    }

    pub fn estimate(&self, ridge: &FloatImage) -> Result<SteerResult, PipelineError> {
        let near = Self::row_peak(ridge, self.near_row)?;
        let far = Self::row_peak(ridge, self.far_row)?;
        Ok(steer_from_points(near, far, self.midline_x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pt(x: i32, y: i32) -> RidgePoint {
        RidgePoint { x, y }
    }

    #[test]
    fn straight_ridge_on_midline() {
        let s = steer_from_points(pt(160, 200), pt(160, 100), 160);
        assert_eq!(s.offset, 0.0);
        assert_eq!(s.angle, 90.0);
    }

    #[test]
    fn leaning_ridge() {
        let s = steer_from_points(pt(150, 200), pt(170, 100), 160);
        assert_eq!(s.offset, 10.0);
        assert_relative_eq!(s.angle, 78.690_067_525_979_8, epsilon = 1e-9);
    }

    #[test]
    fn ridge_leaning_left_is_past_vertical() {
        let s = steer_from_points(pt(170, 200), pt(150, 100), 160);
        assert_eq!(s.offset, -10.0);
        assert_relative_eq!(s.angle, 101.309_932_474_020_2, epsilon = 1e-9);
        assert_relative_eq!(s.angle, 180.0 - 78.690_067_525_979_8, epsilon = 1e-9);
    }

    #[test]
    fn vertical_ridge_is_exactly_90_anywhere() {
        for (y1, y2) in [(200, 100), (50, 10), (0, 0), (10, 200)] {
            assert_eq!(steer_from_points(pt(37, y1), pt(37, y2), 160).angle, 90.0);
        }
    }

    #[test]
    fn repeated_estimates_are_identical() {
        let a = steer_from_points(pt(143, 200), pt(181, 100), 160);
        for _ in 0..10 {
            assert_eq!(steer_from_points(pt(143, 200), pt(181, 100), 160), a);
        }
    }

    #[test]
    fn estimate_samples_configured_rows() {
        let config = SteeringConfig {
            near_row: 3,
            far_row: 1,
            midline_x: 4,
            ridge_boost: 1000.0,
        };
        let mut ridge = FloatImage::new(8, 5);
        ridge.set(2, 3, 1001.0);
        ridge.set(6, 1, 1002.0);
        let s = Steering::new(&config).estimate(&ridge).unwrap();
        assert_eq!(s.offset, 2.0);
        assert_relative_eq!(s.angle, 2f64.atan2(4.0).to_degrees());
    }

    #[test]
    fn row_outside_ridge_is_an_error() {
        let ridge = FloatImage::new(4, 4);
        assert_eq!(
            Steering::row_peak(&ridge, 4),
            Err(PipelineError::RowOutOfRange { row: 4, height: 4 })
        );
    }
}
