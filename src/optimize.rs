//! Lossless image optimization.
//!
//! - PNG: decoded and re-encoded with compression chosen by the optimization
//!   level and adaptive filtering; the smaller of the two encodings is kept
//! - SVG: declarations, comments, metadata and whitespace between tags removed;
//!   element IDs are left untouched
//! - JPEG, GIF and anything else: passed through unchanged

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static SVG_REMOVALS: OnceLock<Vec<Regex>> = OnceLock::new();
static SVG_INTER_TAG: OnceLock<Regex> = OnceLock::new();

/// Error while optimizing an image.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OptimizeError {
    /// The image could not be decoded or re-encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// SVG sources must be UTF-8
    #[error("SVG is not valid UTF-8")]
    InvalidSvg,
}

/// Image optimizer for one optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Optimizer {
    level: u8,
}

impl Optimizer {
    /// Create an optimizer; levels above 7 behave like 7.
    pub fn new(level: u8) -> Self {
        Self { level: level.min(7) }
    }

    /// Identifies the optimizer settings in cache keys.
    ///
    /// Changing the level or upgrading the tool invalidates cached results.
    pub fn fingerprint(&self) -> String {
        format!("assetflow-imagemin/{}/level={}", env!("CARGO_PKG_VERSION"), self.level)
    }

    /// Optimize `bytes`, choosing the method by the extension of `path`.
    pub fn optimize(&self, path: &Path, bytes: &[u8]) -> Result<Vec<u8>, OptimizeError> {
        let extension = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("png") => self.optimize_png(bytes),
            Some("svg") => minify_svg(bytes),
            _ => Ok(bytes.to_vec()),
        }
    }

    fn compression(&self) -> CompressionType {
        match self.level {
            0 | 1 => CompressionType::Fast,
            2 | 3 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }

    fn optimize_png(&self, bytes: &[u8]) -> Result<Vec<u8>, OptimizeError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;

        let mut encoded = Vec::new();
        PngEncoder::new_with_quality(&mut encoded, self.compression(), FilterType::Adaptive).write_image(
            img.as_bytes(),
            img.width(),
            img.height(),
            img.color(),
        )?;

        if encoded.len() < bytes.len() {
            Ok(encoded)
        } else {
            Ok(bytes.to_vec())
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Strip an SVG document of content that does not affect rendering.
pub fn minify_svg(bytes: &[u8]) -> Result<Vec<u8>, OptimizeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| OptimizeError::InvalidSvg)?;

    let removals = SVG_REMOVALS.get_or_init(|| {
        [r"(?s)<\?xml.*?\?>", r"(?s)<!--.*?-->", r"(?is)<!DOCTYPE[^>]*>", r"(?s)<metadata\b.*?</metadata>"]
            .iter()
            .map(|p| Regex::new(p).expect("Invalid regex pattern"))
            .collect()
    });
    let inter_tag = SVG_INTER_TAG.get_or_init(|| Regex::new(r">\s+<").expect("Invalid regex pattern"));

    let mut svg = text.to_string();
    for regex in removals {
        svg = regex.replace_all(&svg, "").into_owned();
    }
    let svg = inter_tag.replace_all(svg.trim(), "><").into_owned();
    Ok(svg.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn loose_png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(64, 64, Rgba([200, 10, 10, 255]));
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), 64, 64, image::ColorType::Rgba8)
            .unwrap();
        out
    }

    #[test]
    fn test_png_never_grows_and_keeps_pixels() {
        let input = loose_png();
        let output = Optimizer::new(7).optimize(Path::new("a.png"), &input).unwrap();

        assert!(output.len() <= input.len());
        let before = image::load_from_memory(&input).unwrap().to_rgba8();
        let after = image::load_from_memory(&output).unwrap().to_rgba8();
        assert_eq!(before, after);
    }

    #[test]
    fn test_invalid_png_is_an_error() {
        let result = Optimizer::default().optimize(Path::new("broken.PNG"), b"not a png");
        assert!(matches!(result, Err(OptimizeError::Image(_))));
    }

    #[test]
    fn test_passthrough_formats() {
        let bytes = b"\xff\xd8\xff\xe0 jpeg-ish".to_vec();
        assert_eq!(Optimizer::default().optimize(Path::new("a.jpg"), &bytes).unwrap(), bytes);
        assert_eq!(Optimizer::default().optimize(Path::new("a.gif"), b"GIF89a").unwrap(), b"GIF89a");
    }

    #[test]
    fn test_minify_svg() {
        let svg = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!-- Generator: Editor -->\n",
            "<svg xmlns=\"http://www.w3.org/2000/svg\">\n",
            "  <metadata>\n    <rdf:RDF/>\n  </metadata>\n",
            "  <g id=\"layer1\">\n    <rect id=\"r\" width=\"1\" height=\"1\"/>\n  </g>\n",
            "</svg>\n"
        );
        let out = String::from_utf8(minify_svg(svg.as_bytes()).unwrap()).unwrap();
        assert_eq!(
            out,
            "<svg xmlns=\"http://www.w3.org/2000/svg\"><g id=\"layer1\"><rect id=\"r\" width=\"1\" height=\"1\"/></g></svg>"
        );
    }

    #[test]
    fn test_fingerprint_tracks_level() {
        assert_ne!(Optimizer::new(1).fingerprint(), Optimizer::new(4).fingerprint());
        assert_eq!(Optimizer::new(9).fingerprint(), Optimizer::new(7).fingerprint());
    }
}
