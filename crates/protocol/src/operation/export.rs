use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DocumentId, ServiceError};

/// Default rendering resolution for image conversion.
pub const DEFAULT_DPI: u32 = 150;

/// Highest accepted rendering resolution. A US-Letter page at this
/// resolution is 5100x6600 pixels.
pub const MAX_DPI: u32 = 600;

/// Raster format for page images.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Portable Network Graphics.
    #[default]
    Png,
    /// JPEG.
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    /// File extension for generated images, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("png"),
            Self::Jpeg => f.write_str("jpeg"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(ServiceError::invalid_argument(format!(
                "unsupported image format: {other}"
            ))),
        }
    }
}

const fn default_dpi() -> u32 {
    DEFAULT_DPI
}

/// Render the document to a PDF file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConvertToPdf {
    /// Target session.
    pub document_id: DocumentId,

    /// Destination file.
    pub output_path: PathBuf,
}

/// Render every page to an image file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConvertToImages {
    /// Target session.
    pub document_id: DocumentId,

    /// Existing directory that receives one file per page.
    pub output_dir: PathBuf,

    /// Raster format.
    #[serde(default)]
    pub format: ImageFormat,

    /// Resolution in dots per inch.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

/// Write the document as Markdown.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExportToMarkdown {
    /// Target session.
    pub document_id: DocumentId,

    /// Destination file.
    pub output_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);

        let err = "gif".parse::<ImageFormat>().unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::InvalidArgument);
        assert!(err.message.contains("gif"));
    }

    #[test]
    fn test_convert_to_images_defaults() {
        let request: ConvertToImages =
            serde_json::from_str(r#"{"document_id": "d", "output_dir": "./images/"}"#).unwrap();

        assert_eq!(request.format, ImageFormat::Png);
        assert_eq!(request.dpi, DEFAULT_DPI);
    }
}
