//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. The parsers build
//! them from query strings, store their canonical string form in the
//! parameter store, and the processors parse them back before handing them to
//! [`operations`](super::operations).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90).
//! - [`Interpolation`]: Pixel interpolation for rotation.
//! - [`Resampling`]: Filter used when resizing.
//! - [`ResizeMode`]: How both dimensions combine: exact, fit or fill.
//! - [`CropSpec`]: Explicit rectangle or anchored window.
//! - [`Background`]: RGBA fill for the corners exposed by rotation.

use image::imageops::FilterType;
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// Strict constructor for request input: out-of-range is an error, not
    /// a clamp.
    pub fn try_from_i64(value: i64) -> Option<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Interpolation used by the rotate processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
}

impl Interpolation {
    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
            Interpolation::Cubic => "cubic",
        }
    }

    pub(crate) fn to_imageproc(self) -> imageproc::geometric_transformations::Interpolation {
        use imageproc::geometric_transformations::Interpolation as Ip;
        match self {
            Interpolation::Nearest => Ip::Nearest,
            Interpolation::Linear => Ip::Bilinear,
            Interpolation::Cubic => Ip::Bicubic,
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" | "nearest_neighbor" => Ok(Interpolation::Nearest),
            "linear" | "bilinear" => Ok(Interpolation::Linear),
            "cubic" | "bicubic" => Ok(Interpolation::Cubic),
            other => Err(format!(
                "unknown interpolation '{other}' (expected nearest, linear or cubic)"
            )),
        }
    }
}

/// Resampling filter used by the resize processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Linear,
    Cubic,
    Gaussian,
    Lanczos,
}

impl Resampling {
    pub fn name(self) -> &'static str {
        match self {
            Resampling::Nearest => "nearest",
            Resampling::Linear => "linear",
            Resampling::Cubic => "cubic",
            Resampling::Gaussian => "gaussian",
            Resampling::Lanczos => "lanczos",
        }
    }

    pub(crate) fn filter(self) -> FilterType {
        match self {
            Resampling::Nearest => FilterType::Nearest,
            Resampling::Linear => FilterType::Triangle,
            Resampling::Cubic => FilterType::CatmullRom,
            Resampling::Gaussian => FilterType::Gaussian,
            Resampling::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" | "nearest_neighbor" => Ok(Resampling::Nearest),
            "linear" | "triangle" => Ok(Resampling::Linear),
            "cubic" | "catmull_rom" => Ok(Resampling::Cubic),
            "gaussian" => Ok(Resampling::Gaussian),
            "lanczos" | "lanczos3" => Ok(Resampling::Lanczos),
            other => Err(format!(
                "unknown resampling '{other}' (expected nearest, linear, cubic, gaussian or lanczos)"
            )),
        }
    }
}

/// How a resize treats requests that give both dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Stretch to exactly `width × height`.
    #[default]
    Exact,
    /// Largest size that fits inside `width × height`, aspect preserved.
    Fit,
    /// Cover `width × height`, aspect preserved, then center-crop.
    Fill,
}

impl FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ResizeMode::Exact),
            "fit" => Ok(ResizeMode::Fit),
            "fill" => Ok(ResizeMode::Fill),
            other => Err(format!("unknown mode '{other}' (expected fit or fill)")),
        }
    }
}

impl ResizeMode {
    pub fn name(self) -> &'static str {
        match self {
            ResizeMode::Exact => "exact",
            ResizeMode::Fit => "fit",
            ResizeMode::Fill => "fill",
        }
    }
}

/// Where an anchored crop window sits inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Anchor {
    pub fn name(self) -> &'static str {
        match self {
            Anchor::TopLeft => "top-left",
            Anchor::Top => "top",
            Anchor::TopRight => "top-right",
            Anchor::Left => "left",
            Anchor::Center => "center",
            Anchor::Right => "right",
            Anchor::BottomLeft => "bottom-left",
            Anchor::Bottom => "bottom",
            Anchor::BottomRight => "bottom-right",
        }
    }

    /// Horizontal and vertical placement factors: 0 = start, 1 = middle,
    /// 2 = end.
    pub(crate) fn factors(self) -> (u32, u32) {
        match self {
            Anchor::TopLeft => (0, 0),
            Anchor::Top => (1, 0),
            Anchor::TopRight => (2, 0),
            Anchor::Left => (0, 1),
            Anchor::Center => (1, 1),
            Anchor::Right => (2, 1),
            Anchor::BottomLeft => (0, 2),
            Anchor::Bottom => (1, 2),
            Anchor::BottomRight => (2, 2),
        }
    }
}

impl FromStr for Anchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top-left" => Ok(Anchor::TopLeft),
            "top" => Ok(Anchor::Top),
            "top-right" => Ok(Anchor::TopRight),
            "left" => Ok(Anchor::Left),
            "center" => Ok(Anchor::Center),
            "right" => Ok(Anchor::Right),
            "bottom-left" => Ok(Anchor::BottomLeft),
            "bottom" => Ok(Anchor::Bottom),
            "bottom-right" => Ok(Anchor::BottomRight),
            other => Err(format!("unknown anchor '{other}'")),
        }
    }
}

/// A crop request.
///
/// Canonical text forms (what the parameter store holds):
/// - rectangle: `x0,y0|x1,y1` (half-open, `x1 > x0`, `y1 > y0`)
/// - anchored window: `WxH@anchor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropSpec {
    Rect { x0: u32, y0: u32, x1: u32, y1: u32 },
    Anchored { width: u32, height: u32, anchor: Anchor },
}

impl fmt::Display for CropSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropSpec::Rect { x0, y0, x1, y1 } => write!(f, "{x0},{y0}|{x1},{y1}"),
            CropSpec::Anchored {
                width,
                height,
                anchor,
            } => write!(f, "{width}x{height}@{}", anchor.name()),
        }
    }
}

impl FromStr for CropSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((min, max)) = s.split_once('|') {
            let (x0, y0) = parse_point(min)?;
            let (x1, y1) = parse_point(max)?;
            if x1 <= x0 || y1 <= y0 {
                return Err(format!("empty crop rectangle '{s}'"));
            }
            return Ok(CropSpec::Rect { x0, y0, x1, y1 });
        }

        let (dims, anchor) = match s.split_once('@') {
            Some((dims, anchor)) => (dims, anchor.parse::<Anchor>()?),
            None => (s, Anchor::default()),
        };
        let (w, h) = dims
            .split_once('x')
            .ok_or_else(|| format!("expected 'x0,y0|x1,y1' or 'WxH', got '{s}'"))?;
        let width = parse_u32(w)?;
        let height = parse_u32(h)?;
        if width == 0 || height == 0 {
            return Err(format!("crop dimensions must be positive, got '{dims}'"));
        }
        Ok(CropSpec::Anchored {
            width,
            height,
            anchor,
        })
    }
}

fn parse_point(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'x,y', got '{s}'"))?;
    Ok((parse_u32(x)?, parse_u32(y)?))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| format!("'{s}' is not a non-negative integer"))
}

/// RGBA background color, parsed from `RRGGBB` or `RRGGBBAA` hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Background(pub [u8; 4]);

impl Background {
    /// Widen to the 16-bit pixel the rotate operation works in.
    pub(crate) fn to_rgba16(self) -> image::Rgba<u16> {
        let [r, g, b, a] = self.0;
        let widen = |c: u8| u16::from(c) * 257;
        image::Rgba([widen(r), widen(g), widen(b), widen(a)])
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl FromStr for Background {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("expected RRGGBB or RRGGBBAA hex color, got '{s}'"));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        let alpha = if hex.len() == 8 { channel(6) } else { 0xff };
        Ok(Background([channel(0), channel(2), channel(4), alpha]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_strict_constructor_rejects_out_of_range() {
        assert_eq!(Quality::try_from_i64(1), Some(Quality(1)));
        assert_eq!(Quality::try_from_i64(100), Some(Quality(100)));
        assert_eq!(Quality::try_from_i64(0), None);
        assert_eq!(Quality::try_from_i64(101), None);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn crop_rect_roundtrips_through_canonical_form() {
        let spec: CropSpec = " 10,20|110,220 ".parse().unwrap();
        assert_eq!(
            spec,
            CropSpec::Rect {
                x0: 10,
                y0: 20,
                x1: 110,
                y1: 220
            }
        );
        assert_eq!(spec.to_string(), "10,20|110,220");
    }

    #[test]
    fn crop_anchored_defaults_to_center() {
        let spec: CropSpec = "100x50".parse().unwrap();
        assert_eq!(spec.to_string(), "100x50@center");
        let spec: CropSpec = "100x50@bottom-right".parse().unwrap();
        assert_eq!(spec.to_string(), "100x50@bottom-right");
    }

    #[test]
    fn crop_rejects_malformed_input() {
        assert!("10,10|5,20".parse::<CropSpec>().is_err());
        assert!("10,10|10,20".parse::<CropSpec>().is_err());
        assert!("0x10".parse::<CropSpec>().is_err());
        assert!("10x10@middle".parse::<CropSpec>().is_err());
        assert!("-1,0|5,5".parse::<CropSpec>().is_err());
        assert!("banana".parse::<CropSpec>().is_err());
    }

    #[test]
    fn background_parses_rgb_and_rgba() {
        assert_eq!(
            "ff8000".parse::<Background>().unwrap(),
            Background([0xff, 0x80, 0x00, 0xff])
        );
        assert_eq!(
            "#00000080".parse::<Background>().unwrap(),
            Background([0, 0, 0, 0x80])
        );
        assert!("fff".parse::<Background>().is_err());
        assert!("gggggg".parse::<Background>().is_err());
    }

    #[test]
    fn background_display_is_lowercase_rgba() {
        assert_eq!(Background([0xAB, 0, 1, 0xff]).to_string(), "ab0001ff");
    }

    #[test]
    fn resampling_and_interpolation_names_roundtrip() {
        for r in [
            Resampling::Nearest,
            Resampling::Linear,
            Resampling::Cubic,
            Resampling::Gaussian,
            Resampling::Lanczos,
        ] {
            assert_eq!(r.name().parse::<Resampling>().unwrap(), r);
        }
        for i in [
            Interpolation::Nearest,
            Interpolation::Linear,
            Interpolation::Cubic,
        ] {
            assert_eq!(i.name().parse::<Interpolation>().unwrap(), i);
        }
    }
}
