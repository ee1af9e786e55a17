//! Shared types passed between the pipeline stages.
//!
//! An [`Image`] is what every server layer produces and consumes: encoded
//! bytes plus the format they are encoded in. It is immutable; stages that
//! transform an image build a new one.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Encoded image formats the server reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Jpeg,
        Format::Png,
        Format::Gif,
        Format::Bmp,
        Format::Tiff,
    ];

    /// Canonical lowercase name, as stored in the parameter store.
    pub fn name(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Bmp => "bmp",
            Format::Tiff => "tiff",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Gif => "image/gif",
            Format::Bmp => "image/bmp",
            Format::Tiff => "image/tiff",
        }
    }

    /// Whether the format can carry more than one frame.
    pub fn is_animated(self) -> bool {
        matches!(self, Format::Gif)
    }

    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            Format::Jpeg => image::ImageFormat::Jpeg,
            Format::Png => image::ImageFormat::Png,
            Format::Gif => image::ImageFormat::Gif,
            Format::Bmp => image::ImageFormat::Bmp,
            Format::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// Map a detected `image` crate format onto ours. `None` for formats we
    /// don't serve (WebP, ICO, ...).
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Format::Jpeg),
            image::ImageFormat::Png => Some(Format::Png),
            image::ImageFormat::Gif => Some(Format::Gif),
            image::ImageFormat::Bmp => Some(Format::Bmp),
            image::ImageFormat::Tiff => Some(Format::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Format::Jpeg),
            "png" => Ok(Format::Png),
            "gif" => Ok(Format::Gif),
            "bmp" => Ok(Format::Bmp),
            "tiff" | "tif" => Ok(Format::Tiff),
            other => Err(format!("unsupported format '{other}'")),
        }
    }
}

/// An encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: Format,
    pub data: Bytes,
}

impl Image {
    pub fn new(format: Format, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    /// Size in bytes of the encoded data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_aliases() {
        assert_eq!("jpg".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!("JPEG".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!("tif".parse::<Format>().unwrap(), Format::Tiff);
        assert!("webp".parse::<Format>().is_err());
    }

    #[test]
    fn format_name_roundtrips() {
        for format in Format::ALL {
            assert_eq!(format.name().parse::<Format>().unwrap(), format);
        }
    }

    #[test]
    fn only_gif_is_animated() {
        let animated: Vec<Format> = Format::ALL.into_iter().filter(|f| f.is_animated()).collect();
        assert_eq!(animated, vec![Format::Gif]);
    }

    #[test]
    fn image_format_mapping_rejects_unsupported() {
        assert_eq!(
            Format::from_image_format(image::ImageFormat::Png),
            Some(Format::Png)
        );
        assert_eq!(Format::from_image_format(image::ImageFormat::WebP), None);
    }
}
