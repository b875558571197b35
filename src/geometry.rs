use crate::errors::{Result, SuperpixelError};

/// How source rasters are resized before segmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryPolicy {
    FixedScale(f64),
    MaxSideLength(f64),
}

impl GeometryPolicy {
    pub fn fixed_scale(factor: f64) -> Result<Self> {
        check_positive("scale", factor)?;
        Ok(Self::FixedScale(factor))
    }

    pub fn max_side_length(length: f64) -> Result<Self> {
        check_positive("max_sidelen", length)?;
        Ok(Self::MaxSideLength(length))
    }

    /// Target dimensions for a `width` x `height` raster.
    ///
    /// Both branches keep the aspect ratio and round to the nearest pixel, never
    /// going below 1. Under `MaxSideLength` a square raster takes the
    /// height-bound branch: the height is assigned the length first.
    pub fn normalize(&self, width: i64, height: i64) -> Result<(u32, u32)> {
        if width <= 0 || height <= 0 {
            return Err(SuperpixelError::InvalidAsset {
                width,
                height,
                reason: "dimensions must be positive".to_string(),
            });
        }
        let (w, h) = (width as f64, height as f64);

        let (target_w, target_h) = match *self {
            GeometryPolicy::FixedScale(s) => (s * w, s * h),
            GeometryPolicy::MaxSideLength(l) if width <= height => (w * (l / h), l),
            GeometryPolicy::MaxSideLength(l) => (l, h * (l / w)),
        };

        Ok((to_dimension(target_w, width, height)?, to_dimension(target_h, width, height)?))
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SuperpixelError::configuration(format!(
            "{name} must be a finite positive number, got {value}"
        )))
    }
}

fn to_dimension(value: f64, width: i64, height: i64) -> Result<u32> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded > f64::from(u32::MAX) {
        return Err(SuperpixelError::InvalidAsset {
            width,
            height,
            reason: format!("normalized side {value} is out of range"),
        });
    }
    Ok((rounded as u32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_scale_rounds_each_side() {
        let policy = GeometryPolicy::fixed_scale(0.5).unwrap();
        assert_eq!(policy.normalize(101, 51).unwrap(), (51, 26));
        assert_eq!(policy.normalize(640, 480).unwrap(), (320, 240));

        let policy = GeometryPolicy::fixed_scale(1.0 / 3.0).unwrap();
        assert_eq!(policy.normalize(100, 10).unwrap(), (33, 3));
    }

    #[test]
    fn test_fixed_scale_property() {
        for s in [0.1, 0.25, 0.75, 1.0, 1.5, 2.0] {
            let policy = GeometryPolicy::fixed_scale(s).unwrap();
            for (w, h) in [(1, 1), (7, 3), (100, 50), (333, 1000), (1920, 1080)] {
                let (nw, nh) = policy.normalize(w, h).unwrap();
                assert_eq!(nw, ((s * w as f64).round() as u32).max(1));
                assert_eq!(nh, ((s * h as f64).round() as u32).max(1));
            }
        }
    }

    #[test]
    fn test_max_side_length_keeps_aspect_ratio() {
        let policy = GeometryPolicy::max_side_length(50.0).unwrap();
        assert_eq!(policy.normalize(100, 50).unwrap(), (50, 25));
        assert_eq!(policy.normalize(50, 100).unwrap(), (25, 50));

        for l in [16.0, 50.0, 480.0, 333.3] {
            let policy = GeometryPolicy::max_side_length(l).unwrap();
            for (w, h) in [(100, 50), (37, 91), (1920, 1080), (400, 300)] {
                let (nw, nh) = policy.normalize(w, h).unwrap();
                assert_eq!(nw.max(nh), (l as f64).round() as u32);
                let expected = w as f64 / h as f64;
                let actual = nw as f64 / nh as f64;
                // half a pixel of rounding on the short side
                let tolerance = 0.5 / (nw.min(nh) as f64 - 0.5);
                assert!((actual - expected).abs() / expected <= tolerance);
            }
        }
    }

    #[test]
    fn test_square_takes_height_bound_branch() {
        let policy = GeometryPolicy::max_side_length(99.6).unwrap();
        assert_eq!(policy.normalize(10, 10).unwrap(), (100, 100));
    }

    #[test]
    fn test_never_below_one_pixel() {
        let policy = GeometryPolicy::max_side_length(10.0).unwrap();
        assert_eq!(policy.normalize(10_000, 1).unwrap(), (10, 1));

        let policy = GeometryPolicy::fixed_scale(0.001).unwrap();
        assert_eq!(policy.normalize(20, 20).unwrap(), (1, 1));
    }

    #[test]
    fn test_degenerate_input_is_rejected() {
        let policy = GeometryPolicy::fixed_scale(1.0).unwrap();
        assert!(matches!(
            policy.normalize(0, 10),
            Err(SuperpixelError::InvalidAsset { .. })
        ));
        assert!(matches!(
            policy.normalize(10, -3),
            Err(SuperpixelError::InvalidAsset { .. })
        ));
    }

    #[test]
    fn test_invalid_policy_values() {
        assert!(GeometryPolicy::fixed_scale(0.0).is_err());
        assert!(GeometryPolicy::fixed_scale(f64::INFINITY).is_err());
        assert!(GeometryPolicy::max_side_length(-1.0).is_err());
    }
}
