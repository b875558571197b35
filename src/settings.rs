use std::fmt;
use std::str::FromStr;

use crate::config::SlicOptions;
use crate::errors::{Result, SuperpixelError};

/// Color space the engine clusters in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Xyz,
    CieLab,
}

impl ColorSpace {
    /// Column header of the superpixel summary for this space.
    pub const fn summary_columns(self) -> &'static str {
        match self {
            ColorSpace::Rgb => "# ID NUM_PIX CX CY R G B A",
            ColorSpace::Xyz => "# ID NUM_PIX CX CY X Y Z A",
            ColorSpace::CieLab => "# ID NUM_PIX CX CY L A B A",
        }
    }
}

impl FromStr for ColorSpace {
    type Err = SuperpixelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RGB" => Ok(ColorSpace::Rgb),
            "XYZ" => Ok(ColorSpace::Xyz),
            "CIELAB" => Ok(ColorSpace::CieLab),
            other => Err(SuperpixelError::configuration(format!(
                "unrecognized color space `{other}` (expected RGB, XYZ or CIELAB)"
            ))),
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorSpace::Rgb => "RGB",
            ColorSpace::Xyz => "XYZ",
            ColorSpace::CieLab => "CIELAB",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegMethod {
    GivenSize,
    GivenNum,
}

impl FromStr for SegMethod {
    type Err = SuperpixelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GIVEN_SIZE" => Ok(SegMethod::GivenSize),
            "GIVEN_NUM" => Ok(SegMethod::GivenNum),
            other => Err(SuperpixelError::configuration(format!(
                "unrecognized segmentation method `{other}` (expected GIVEN_SIZE or GIVEN_NUM)"
            ))),
        }
    }
}

/// How many superpixels the engine should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeConstraint {
    /// Target superpixel size in pixels.
    GivenSize(u32),
    /// Target total number of superpixels.
    GivenNum(u32),
}

impl SizeConstraint {
    pub const fn method(self) -> SegMethod {
        match self {
            SizeConstraint::GivenSize(_) => SegMethod::GivenSize,
            SizeConstraint::GivenNum(_) => SegMethod::GivenNum,
        }
    }

    pub const fn value(self) -> u32 {
        match self {
            SizeConstraint::GivenSize(v) | SizeConstraint::GivenNum(v) => v,
        }
    }
}

/// Engine configuration. Built once per distinct configuration and shared
/// read-only between workers; there are no setters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub constraint: SizeConstraint,
    pub color_space: ColorSpace,
    pub coh_weight: f32,
    pub iterations: u32,
    pub enforce_connectivity: bool,
}

impl EngineSettings {
    /// Translates user-facing options. Unknown enum strings and out-of-range
    /// numbers are rejected instead of falling back to a default.
    pub fn from_options(options: &SlicOptions) -> Result<Self> {
        let method: SegMethod = options.seg_method.parse()?;
        let color_space: ColorSpace = options.color_space.parse()?;

        let constraint = match method {
            SegMethod::GivenNum => SizeConstraint::GivenNum(positive("num_segs", options.num_segs)?),
            SegMethod::GivenSize => {
                SizeConstraint::GivenSize(positive("spixel_size", options.spixel_size)?)
            }
        };

        if !options.coh_weight.is_finite() || options.coh_weight < 0.0 {
            return Err(SuperpixelError::configuration(format!(
                "coh_weight must be a finite non-negative number, got {}",
                options.coh_weight
            )));
        }

        Ok(Self {
            constraint,
            color_space,
            coh_weight: options.coh_weight,
            iterations: positive("num_iters", options.num_iters)?,
            enforce_connectivity: !options.no_enforce,
        })
    }
}

fn positive(field: &str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            SuperpixelError::configuration(format!("{field} must be positive, got {value}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(color_space: &str, seg_method: &str) -> SlicOptions {
        SlicOptions {
            color_space: color_space.to_string(),
            seg_method: seg_method.to_string(),
            ..SlicOptions::default()
        }
    }

    #[test]
    fn test_translates_defaults() {
        let settings = EngineSettings::from_options(&SlicOptions::default()).unwrap();
        assert_eq!(settings.constraint, SizeConstraint::GivenSize(256));
        assert_eq!(settings.color_space, ColorSpace::Xyz);
        assert_eq!(settings.iterations, 5);
        assert!(settings.enforce_connectivity);
    }

    #[test]
    fn test_given_num_uses_num_segs() {
        let mut opts = options("CIELAB", "GIVEN_NUM");
        opts.num_segs = 16;
        opts.no_enforce = true;

        let settings = EngineSettings::from_options(&opts).unwrap();
        assert_eq!(settings.constraint, SizeConstraint::GivenNum(16));
        assert_eq!(settings.constraint.method(), SegMethod::GivenNum);
        assert_eq!(settings.color_space, ColorSpace::CieLab);
        assert!(!settings.enforce_connectivity);
    }

    #[test]
    fn test_rejects_unknown_enum_strings() {
        for (space, method) in [("HSV", "GIVEN_NUM"), ("RGB", "GIVEN_AREA"), ("xyz", "GIVEN_SIZE")] {
            let err = EngineSettings::from_options(&options(space, method)).unwrap_err();
            assert!(err.is_configuration(), "{space}/{method} should be rejected");
        }
    }

    #[test]
    fn test_rejects_non_positive_numbers() {
        let mut opts = options("RGB", "GIVEN_NUM");
        opts.num_segs = 0;
        assert!(EngineSettings::from_options(&opts).is_err());

        let mut opts = options("RGB", "GIVEN_SIZE");
        opts.num_iters = -1;
        assert!(EngineSettings::from_options(&opts).is_err());

        let mut opts = options("RGB", "GIVEN_SIZE");
        opts.coh_weight = f32::NAN;
        assert!(EngineSettings::from_options(&opts).is_err());
    }

    #[test]
    fn test_translation_is_independent_per_call() {
        let first = EngineSettings::from_options(&options("RGB", "GIVEN_SIZE")).unwrap();
        let second = EngineSettings::from_options(&options("XYZ", "GIVEN_SIZE")).unwrap();
        assert_eq!(first.color_space, ColorSpace::Rgb);
        assert_eq!(second.color_space, ColorSpace::Xyz);
    }
}
