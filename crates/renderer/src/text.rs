//! CPU text rasterization for the ticker and the FPS overlay.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fontdue::{Font, FontSettings};
use thiserror::Error;

/// Horizontal padding added on each side of a rasterized line, in pixels.
pub const TEXT_PADDING_X: u32 = 100;

/// Fonts tried, in order, when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

#[derive(Debug, Error)]
pub enum TextError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse font {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("no usable font found; set ticker.font in the configuration")]
    NoFont,
    #[error("target pixel height must be non-zero")]
    ZeroHeight,
}

/// Straight-alpha RGBA8 bitmap of one line of text.
///
/// `width` is the measured width including padding; the tiling math relies
/// on it matching the uploaded texture exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedText {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub trait TextRasterizer: Send {
    /// Renders `text` as a single line exactly `pixel_height` pixels tall.
    /// Identical input yields identical output.
    fn rasterize(&self, text: &str, pixel_height: u32) -> Result<RasterizedText, TextError>;
}

/// White text rendered through `fontdue`.
pub struct FontdueRasterizer {
    font: Font,
    path: PathBuf,
}

impl FontdueRasterizer {
    pub fn from_file(path: &Path) -> Result<Self, TextError> {
        let bytes = std::fs::read(path).map_err(|source| TextError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| {
            TextError::Parse {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            }
        })?;
        Ok(Self {
            font,
            path: path.to_path_buf(),
        })
    }

    /// Loads `preferred` when given, otherwise the first system font that parses.
    pub fn discover(preferred: Option<&Path>) -> Result<Self, TextError> {
        if let Some(path) = preferred {
            return Self::from_file(path);
        }
        for candidate in SYSTEM_FONTS {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match Self::from_file(path) {
                Ok(rasterizer) => return Ok(rasterizer),
                Err(err) => tracing::debug!(font = candidate, error = %err, "skipping font"),
            }
        }
        Err(TextError::NoFont)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pixel size at which one line spans exactly `pixel_height` rows.
    fn px_for_height(&self, pixel_height: u32) -> (f32, f32) {
        let target = pixel_height as f32;
        match self.font.horizontal_line_metrics(target) {
            Some(metrics) if metrics.ascent - metrics.descent > 0.0 => {
                let scale = target / (metrics.ascent - metrics.descent);
                (target * scale, metrics.ascent * scale)
            }
            _ => (target, target * 0.8),
        }
    }
}

impl TextRasterizer for FontdueRasterizer {
    fn rasterize(&self, text: &str, pixel_height: u32) -> Result<RasterizedText, TextError> {
        if pixel_height == 0 {
            return Err(TextError::ZeroHeight);
        }
        let (px, ascent) = self.px_for_height(pixel_height);

        let advance: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, px).advance_width)
            .sum();
        let width = advance.ceil() as u32 + TEXT_PADDING_X * 2;
        let height = pixel_height;
        let mut pixels = vec![0u8; width as usize * height as usize * 4];

        let mut pen_x = TEXT_PADDING_X as f32;
        for ch in text.chars() {
            let (metrics, coverage) = self.font.rasterize(ch, px);
            let glyph_x = (pen_x + metrics.xmin as f32).round() as i32;
            let glyph_y = (ascent - (metrics.height as i32 + metrics.ymin) as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = coverage[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }
                    let x = glyph_x + gx as i32;
                    let y = glyph_y + gy as i32;
                    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                        continue;
                    }
                    let offset = (y as usize * width as usize + x as usize) * 4;
                    let pixel = &mut pixels[offset..offset + 4];
                    pixel[0] = 255;
                    pixel[1] = 255;
                    pixel[2] = 255;
                    pixel[3] = pixel[3].max(alpha);
                }
            }
            pen_x += metrics.advance_width;
        }

        Ok(RasterizedText {
            pixels,
            width,
            height,
        })
    }
}

/// File name for a bitmap dumped at `at`, e.g. `ticker_20250101_093000.png`.
pub fn dump_file_name(at: DateTime<Local>) -> String {
    format!("ticker_{}.png", at.format("%Y%m%d_%H%M%S"))
}

/// Writes `text` to `dir` as a timestamped PNG and returns its path.
pub fn dump_png(
    text: &RasterizedText,
    dir: &Path,
    at: DateTime<Local>,
) -> Result<PathBuf, image::ImageError> {
    std::fs::create_dir_all(dir).map_err(image::ImageError::IoError)?;
    let path = dir.join(dump_file_name(at));
    image::save_buffer(
        &path,
        &text.pixels,
        text.width,
        text.height,
        image::ColorType::Rgba8,
    )?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dump_name_uses_local_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(dump_file_name(at), "ticker_20240309_070501.png");
    }

    #[test]
    fn dump_writes_a_readable_png() {
        let dir = tempfile::tempdir().unwrap();
        let text = RasterizedText {
            pixels: vec![255; 6 * 2 * 4],
            width: 6,
            height: 2,
        };
        let path = dump_png(&text, &dir.path().join("dumps"), Local::now()).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 2));
    }

    #[test]
    fn missing_font_file_is_reported() {
        let err = FontdueRasterizer::discover(Some(Path::new("/nonexistent/font.ttf")))
            .err()
            .unwrap();
        assert!(matches!(err, TextError::Read { .. }));
    }

    #[test]
    fn rasterized_line_is_padded_and_deterministic() {
        // Depends on a system font; hosts without one skip silently.
        let Ok(rasterizer) = FontdueRasterizer::discover(None) else {
            return;
        };
        let first = rasterizer.rasterize("Hello ticker", 64).unwrap();
        let second = rasterizer.rasterize("Hello ticker", 64).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.height, 64);
        assert!(first.width > TEXT_PADDING_X * 2);
        assert_eq!(first.pixels.len(), (first.width * first.height * 4) as usize);

        // Padding columns stay transparent.
        let row = first.width as usize * 4;
        for y in 0..first.height as usize {
            for x in 0..(TEXT_PADDING_X as usize - 2) {
                assert_eq!(first.pixels[y * row + x * 4 + 3], 0);
            }
        }
        assert!(first.pixels.chunks(4).any(|px| px[3] > 0));

        let empty = rasterizer.rasterize("", 64).unwrap();
        assert_eq!(empty.width, TEXT_PADDING_X * 2);
    }
}
