use crate::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A named colour representation a descriptor can sample from.
///
/// Hue channels are expressed in turns, `[0, 1)`, so that they can be used
/// directly as the phase of a weighted histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Colorspace {
    Rgb,
    /// Ohta's `I1 = (R + G + B) / 3`, `I2 = (R - B) / 2`, `I3 = (2G - R - B) / 4`.
    Ohta,
    Hsv,
    Hsl,
}

impl Colorspace {
    pub fn convert(self, [r, g, b]: [f32; 3]) -> [f32; 3] {
        match self {
            Colorspace::Rgb => [r, g, b],
            Colorspace::Ohta => [
                (r + g + b) / 3.0,
                (r - b) / 2.0,
                (2.0 * g - r - b) / 4.0,
            ],
            Colorspace::Hsv => {
                let (max, min, hue) = hue(r, g, b);
                let saturation = if max > 0.0 { (max - min) / max } else { 0.0 };
                [hue, saturation, max]
            }
            Colorspace::Hsl => {
                let (max, min, hue) = hue(r, g, b);
                let lightness = 0.5 * (max + min);
                let delta = max - min;
                let denominator = 1.0 - (2.0 * lightness - 1.0).abs();
                let saturation = if delta > 0.0 && denominator > 0.0 {
                    (delta / denominator).min(1.0)
                } else {
                    0.0
                };
                [hue, saturation, lightness]
            }
        }
    }
}

/// Max, min and hue in turns. Hue is zero for achromatic colours.
fn hue(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta <= 0.0 {
        return (max, min, 0.0);
    }
    let sextant = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    let turns = sextant / 6.0;
    (max, min, if turns >= 1.0 { 0.0 } else { turns })
}

impl FromStr for Colorspace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(Colorspace::Rgb),
            "OHTA" => Ok(Colorspace::Ohta),
            "HSV" => Ok(Colorspace::Hsv),
            "HSL" => Ok(Colorspace::Hsl),
            _ => Err(Error::UnknownColorspace(s.to_owned())),
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Colorspace::Rgb => "RGB",
            Colorspace::Ohta => "Ohta",
            Colorspace::Hsv => "HSV",
            Colorspace::Hsl => "HSL",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn ohta_first_channel_is_intensity() {
        let out = Colorspace::Ohta.convert([0.3, 0.6, 0.9]);
        assert!(close(out, [0.6, -0.3, 0.0]));
    }

    #[test]
    fn hsv_primaries() {
        assert!(close(Colorspace::Hsv.convert([1.0, 0.0, 0.0]), [0.0, 1.0, 1.0]));
        assert!(close(
            Colorspace::Hsv.convert([0.0, 1.0, 0.0]),
            [1.0 / 3.0, 1.0, 1.0]
        ));
        assert!(close(
            Colorspace::Hsv.convert([0.0, 0.0, 0.5]),
            [2.0 / 3.0, 1.0, 0.5]
        ));
    }

    #[test]
    fn hsl_gray_has_no_saturation() {
        assert!(close(Colorspace::Hsl.convert([0.4, 0.4, 0.4]), [0.0, 0.0, 0.4]));
    }

    #[test]
    fn magenta_hue_wraps() {
        let [h, _, _] = Colorspace::Hsv.convert([1.0, 0.0, 0.5]);
        assert!((h - 11.0 / 12.0).abs() < 1e-5);
    }

    #[test]
    fn parse_names() {
        assert_eq!("ohta".parse::<Colorspace>().unwrap(), Colorspace::Ohta);
        assert_eq!("HSL".parse::<Colorspace>().unwrap(), Colorspace::Hsl);
        assert!(matches!(
            "Lab".parse::<Colorspace>(),
            Err(Error::UnknownColorspace(name)) if name == "Lab"
        ));
    }
}
