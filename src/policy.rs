use crate::remap::DitherMode;
use std::fmt;

/// Selects how aggressively large images are simplified before clustering
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum QualityMode {
    /// Keeps processing time of multi-megapixel images low
    #[default]
    Normal,
    /// Allows more colors and finer pixelation, at the cost of longer runs
    Heavy,
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Heavy => "heavy",
        })
    }
}

/// Effective parameters of a run, after clamping by image size
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QualityProfile {
    pub num_colors: u32,
    pub block_size: u32,
    pub dither: DitherMode,
    pub mode: QualityMode,
}

impl QualityProfile {
    #[must_use]
    pub fn new(num_colors: u32, block_size: u32, total_pixels: usize, mode: QualityMode, dither: DitherMode) -> Self {
        let (num_colors, block_size) = clamp_parameters(num_colors, block_size, total_pixels, mode);
        Self { num_colors, block_size, dither, mode }
    }

    /// Dimensions after block averaging. Partial blocks at the right and bottom edge are dropped.
    #[must_use]
    pub fn working_size(&self, width: usize, height: usize) -> (usize, usize) {
        let block = self.block_size.max(1) as usize;
        (width / block, height / block)
    }

    /// Number of input pixels per pixel that is actually clustered and dithered
    #[must_use]
    pub fn compression_ratio(&self, width: usize, height: usize) -> f64 {
        let (w, h) = self.working_size(width, height);
        if w * h == 0 {
            return 0.;
        }
        (width * height) as f64 / (w * h) as f64
    }
}

/// Returns effective `(num_colors, block_size)`.
///
/// Only ever raises the block size and lowers the color count, so a tighter request is kept as-is.
#[must_use]
pub fn clamp_parameters(num_colors: u32, block_size: u32, total_pixels: usize, mode: QualityMode) -> (u32, u32) {
    let (min_block, max_colors) = match mode {
        QualityMode::Normal => match total_pixels {
            p if p > 4_000_000 => (8, Some(32)),
            p if p > 2_000_000 => (6, Some(32)),
            p if p > 1_000_000 => (3, None),
            _ => (1, None),
        },
        QualityMode::Heavy => match total_pixels {
            p if p > 8_000_000 => (2, Some(96)),
            p if p > 2_000_000 => (1, Some(128)),
            _ => (1, None),
        },
    };
    (
        max_colors.map_or(num_colors, |max| num_colors.min(max)),
        block_size.max(min_block),
    )
}

#[test]
fn normal_table() {
    let n = QualityMode::Normal;
    assert_eq!((32, 8), clamp_parameters(64, 1, 5_000_000, n));
    assert_eq!((16, 10), clamp_parameters(16, 10, 5_000_000, n));
    assert_eq!((32, 6), clamp_parameters(128, 2, 3_000_000, n));
    assert_eq!((32, 6), clamp_parameters(128, 2, 4_000_000, n));
    assert_eq!((128, 3), clamp_parameters(128, 1, 1_500_000, n));
    assert_eq!((128, 3), clamp_parameters(128, 1, 2_000_000, n));
    assert_eq!((128, 1), clamp_parameters(128, 1, 1_000_000, n));
    assert_eq!((5, 4), clamp_parameters(5, 4, 100, n));
}

#[test]
fn heavy_table() {
    let h = QualityMode::Heavy;
    assert_eq!((96, 2), clamp_parameters(200, 1, 9_000_000, h));
    assert_eq!((16, 5), clamp_parameters(16, 5, 9_000_000, h));
    assert_eq!((128, 1), clamp_parameters(200, 1, 8_000_000, h));
    assert_eq!((128, 1), clamp_parameters(256, 1, 4_500_000, h));
    assert_eq!((128, 1), clamp_parameters(256, 1, 2_000_001, h));
    assert_eq!((256, 1), clamp_parameters(256, 1, 2_000_000, h));
}

#[test]
fn profile() {
    let p = QualityProfile::new(64, 1, 5_000_000, QualityMode::Normal, DitherMode::Floyd);
    assert_eq!(32, p.num_colors);
    assert_eq!(8, p.block_size);
    assert_eq!((312, 250), p.working_size(2500, 2000));
    assert_eq!(DitherMode::Floyd, p.dither);

    let p = QualityProfile::new(4, 2, 16, QualityMode::Heavy, DitherMode::None);
    assert_eq!((2, 2), p.working_size(5, 4));
    assert_eq!(5., p.compression_ratio(5, 4));
    assert_eq!("heavy", p.mode.to_string());
}
