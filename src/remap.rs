use crate::error::*;
use crate::image::Image;
use crate::nearest::Nearest;
use crate::pal::{rgb_of, Color, RGBA};
#[cfg(not(feature = "threads"))]
use crate::rayoff::*;
#[cfg(feature = "threads")]
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// How quantization error of a pixel is spread to its neighbors
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum DitherMode {
    /// Every pixel gets its nearest palette color, independently
    #[default]
    None,
    /// Floyd-Steinberg, 4 neighbors
    Floyd,
    /// Jarvis-Judice-Ninke, 12 neighbors over 3 rows
    Jarvis,
    /// Stucki, same footprint as Jarvis with sharper weights
    Stucki,
}

/// One entry of an error diffusion kernel: `numerator / denominator` of the error goes to the pixel at `(x + dx, y + dy)`
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tap {
    pub dx: i8,
    pub dy: i8,
    pub numerator: u8,
    pub denominator: u8,
}

impl Tap {
    #[inline]
    #[must_use]
    pub fn weight(self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

const fn tap(dx: i8, dy: i8, numerator: u8, denominator: u8) -> Tap {
    Tap { dx, dy, numerator, denominator }
}

const FLOYD: [Tap; 4] = [
    tap(1, 0, 7, 16),
    tap(-1, 1, 3, 16), tap(0, 1, 5, 16), tap(1, 1, 1, 16),
];

const JARVIS: [Tap; 12] = [
    tap(1, 0, 7, 48), tap(2, 0, 5, 48),
    tap(-2, 1, 3, 48), tap(-1, 1, 5, 48), tap(0, 1, 7, 48), tap(1, 1, 5, 48), tap(2, 1, 3, 48),
    tap(-2, 2, 1, 48), tap(-1, 2, 3, 48), tap(0, 2, 5, 48), tap(1, 2, 3, 48), tap(2, 2, 1, 48),
];

const STUCKI: [Tap; 12] = [
    tap(1, 0, 8, 42), tap(2, 0, 4, 42),
    tap(-2, 1, 2, 42), tap(-1, 1, 4, 42), tap(0, 1, 8, 42), tap(1, 1, 4, 42), tap(2, 1, 2, 42),
    tap(-2, 2, 1, 42), tap(-1, 2, 2, 42), tap(0, 2, 4, 42), tap(1, 2, 2, 42), tap(2, 2, 1, 42),
];

impl DitherMode {
    /// Error diffusion taps. Empty for [`DitherMode::None`].
    #[must_use]
    pub fn kernel(self) -> &'static [Tap] {
        match self {
            Self::None => &[],
            Self::Floyd => &FLOYD,
            Self::Jarvis => &JARVIS,
            Self::Stucki => &STUCKI,
        }
    }

    /// The name used in requests: `none`, `floyd`, `jarvis` or `stucki`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Floyd => "floyd",
            Self::Jarvis => "jarvis",
            Self::Stucki => "stucki",
        }
    }
}

impl fmt::Display for DitherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DitherMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match s {
            "none" => Self::None,
            "floyd" => Self::Floyd,
            "jarvis" => Self::Jarvis,
            "stucki" => Self::Stucki,
            _ => return Err(ValueOutOfRange),
        })
    }
}

/// Replaces RGB of every pixel with the nearest palette color. Alpha is kept.
#[inline(never)]
pub(crate) fn remap_to_palette(image: &mut Image, palette: &[Color]) {
    let n = Nearest::new(palette);
    let width = image.width();
    image.pixels_mut().par_chunks_mut(width).for_each(|row| {
        for px in row {
            let (matched, _) = n.search(rgb_of(*px));
            set_rgb(px, n.color(matched));
        }
    });
}

/// Error diffusion in scan order.
///
/// Error is added straight into the pixels of `image` that haven't been visited yet,
/// so each pixel is matched with all the error it has received so far.
/// Neighbors outside the image are skipped.
///
/// `progress` gets 0-1 fraction of rows done, and returns `true` to abort.
#[inline(never)]
pub(crate) fn remap_to_palette_diffused(image: &mut Image, palette: &[Color], kernel: &[Tap], mut progress: impl FnMut(f32) -> bool) -> Result<(), Error> {
    let n = Nearest::new(palette);
    let width = image.width();
    let height = image.height();
    let pixels = image.pixels_mut();

    for y in 0..height {
        if y % 32 == 0 && progress(y as f32 / height as f32) {
            return Err(Aborted);
        }
        for x in 0..width {
            let px = &mut pixels[y * width + x];
            let old = rgb_of(*px);
            let (matched, _) = n.search(old);
            let new = n.color(matched);
            set_rgb(px, new);

            let err = [
                i16::from(old.r) - i16::from(new.r),
                i16::from(old.g) - i16::from(new.g),
                i16::from(old.b) - i16::from(new.b),
            ];
            if err == [0; 3] {
                continue;
            }
            for t in kernel {
                let (Some(nx), Some(ny)) = (x.checked_add_signed(t.dx.into()), y.checked_add_signed(t.dy.into())) else {
                    continue;
                };
                if nx >= width || ny >= height {
                    continue;
                }
                let target = &mut pixels[ny * width + nx];
                target.r = add_error(target.r, err[0], t);
                target.g = add_error(target.g, err[1], t);
                target.b = add_error(target.b, err[2], t);
            }
        }
    }
    Ok(())
}

/// `channel + err * weight`, rounded half up and clamped. Exact, so ties like 31.5 always go up.
#[inline(always)]
fn add_error(channel: u8, err: i16, t: &Tap) -> u8 {
    let den = i32::from(t.denominator);
    let scaled = i32::from(channel) * den + i32::from(err) * i32::from(t.numerator);
    (2 * scaled + den).div_euclid(2 * den).clamp(0, 255) as u8
}

#[inline(always)]
fn set_rgb(px: &mut RGBA, c: Color) {
    px.r = c.r;
    px.g = c.g;
    px.b = c.b;
}

#[cfg(test)]
fn gray_image(values: &[u8], width: usize) -> Image {
    let px: Vec<_> = values.iter().map(|&v| RGBA::new(v, v, v, 255)).collect();
    Image::new(px, width, values.len() / width).unwrap()
}

#[cfg(test)]
fn grays(image: &Image) -> Vec<u8> {
    image.pixels().iter().map(|px| px.r).collect()
}

#[cfg(test)]
const BW: [Color; 2] = [Color { r: 0, g: 0, b: 0 }, Color { r: 255, g: 255, b: 255 }];

#[test]
fn kernels_sum_to_one() {
    for mode in [DitherMode::Floyd, DitherMode::Jarvis, DitherMode::Stucki] {
        let den = mode.kernel()[0].denominator;
        assert!(mode.kernel().iter().all(|t| t.denominator == den), "{mode}");
        assert_eq!(u32::from(den), mode.kernel().iter().map(|t| u32::from(t.numerator)).sum::<u32>(), "{mode}");
        assert!(mode.kernel().iter().all(|t| t.dy > 0 || t.dx > 0));
    }
    assert!(DitherMode::None.kernel().is_empty());
    assert_eq!(12, DitherMode::Jarvis.kernel().len());
    assert_eq!(tap(0, 1, 8, 42), DitherMode::Stucki.kernel()[4]);
    assert_eq!(0.4375, DitherMode::Floyd.kernel()[0].weight());
}

#[test]
fn names() {
    for mode in [DitherMode::None, DitherMode::Floyd, DitherMode::Jarvis, DitherMode::Stucki] {
        assert_eq!(Ok(mode), mode.to_string().parse());
    }
    assert_eq!(Err(ValueOutOfRange), "atkinson".parse::<DitherMode>());
}

#[test]
fn undithered_is_idempotent() {
    let mut img = gray_image(&[0, 40, 127, 128, 200, 255], 3);
    img.pixels_mut()[0].a = 9;
    remap_to_palette(&mut img, &BW);
    assert_eq!(vec![0, 0, 0, 255, 255, 255], grays(&img));
    assert_eq!(9, img.pixels()[0].a);

    let once = img.clone();
    remap_to_palette(&mut img, &BW);
    assert_eq!(once, img);
}

#[test]
fn floyd_single_row() {
    // 128 -> white, err -127: next gets -55.5625 => 72
    // 72 -> black, err 72: next gets 31.5 => 159.5 => 160
    // 160 -> white, err -95: next gets -41.5625 => 86.4375 => 86
    let mut img = gray_image(&[128, 128, 128, 128], 4);
    remap_to_palette_diffused(&mut img, &BW, DitherMode::Floyd.kernel(), |_| false).unwrap();
    assert_eq!(vec![255, 0, 255, 0], grays(&img));

    // 85 -> black, err 85: 170 + 37.1875 => 207
    // 207 -> white, err -48: 255 - 21 => 234
    let mut img = gray_image(&[0, 85, 170, 255], 4);
    remap_to_palette_diffused(&mut img, &BW, DitherMode::Floyd.kernel(), |_| false).unwrap();
    assert_eq!(vec![0, 0, 255, 255], grays(&img));
}

#[test]
fn floyd_two_rows_checkerboard() {
    // (0,0) 128 -> white, err -127: (1,0) => 72, (0,1) => 88, (1,1) => 120
    // (1,0) 72 -> black, err 72: (0,1) += 13.5 => 102, (1,1) += 22.5 => 143
    // (0,1) 102 -> black, err 102: (1,1) += 44.625 => 188
    let mut img = gray_image(&[128, 128, 128, 128], 2);
    remap_to_palette_diffused(&mut img, &BW, DitherMode::Floyd.kernel(), |_| false).unwrap();
    assert_eq!(vec![255, 0, 0, 255], grays(&img));
}

#[test]
fn diffusion_clamps_and_aborts() {
    // the error pushes the neighbor above 255, which must saturate
    let pal = [Color::new(0, 0, 0), Color::new(200, 200, 200)];
    let mut img = gray_image(&[100, 255, 255, 255, 255, 255], 3);
    remap_to_palette_diffused(&mut img, &pal, DitherMode::Stucki.kernel(), |_| false).unwrap();
    assert!(grays(&img).iter().all(|&v| v == 0 || v == 200));

    let mut img = gray_image(&[128; 64], 1);
    let mut calls = 0;
    let res = remap_to_palette_diffused(&mut img, &BW, DitherMode::Jarvis.kernel(), |done| {
        calls += 1;
        done > 0.
    });
    assert_eq!(Err(Aborted), res);
    assert_eq!(2, calls);
}

#[test]
fn half_values_round_up() {
    // 216 * 7/48 = 31.5
    assert_eq!(32, add_error(0, 216, &JARVIS[0]));
    // 100 - 24/16 = 98.5
    assert_eq!(99, add_error(100, -24, &FLOYD[3]));
    // 10 - 21 * 8/42 = 6
    assert_eq!(6, add_error(10, -21, &STUCKI[0]));
    assert_eq!(0, add_error(3, -255, &FLOYD[0]));
    assert_eq!(255, add_error(250, 255, &FLOYD[0]));

    // 31.5 => 32 is closer to 63 than to 0
    let pal = [Color::new(0, 0, 0), Color::new(63, 200, 200), Color::new(0, 200, 200)];
    let mut img = Image::new(vec![RGBA::new(216, 0, 0, 255), RGBA::new(0, 200, 200, 255)], 2, 1).unwrap();
    remap_to_palette_diffused(&mut img, &pal, DitherMode::Jarvis.kernel(), |_| false).unwrap();
    assert_eq!(RGBA::new(0, 0, 0, 255), img.pixels()[0]);
    assert_eq!(RGBA::new(63, 200, 200, 255), img.pixels()[1]);
}

#[cfg(test)]
fn low_grays() -> Vec<Color> {
    // neighbors that get at most 40 stay exactly in the palette and spread no error further
    (0..=40).chain([255]).map(|v| Color::new(v, v, v)).collect()
}

#[test]
fn jarvis_reaches_two_rows() {
    // the center of the top row is 88 => 40 with error 48, so every neighbor gets its numerator
    let mut values = [0; 15];
    values[2] = 88;
    let mut img = gray_image(&values, 5);
    remap_to_palette_diffused(&mut img, &low_grays(), DitherMode::Jarvis.kernel(), |_| false).unwrap();
    assert_eq!(vec![
        0, 0, 40, 7, 5,
        3, 5, 7, 5, 3,
        1, 3, 5, 3, 1,
    ], grays(&img));
}

#[test]
fn stucki_reaches_two_rows() {
    // 82 => 40 with error 42
    let mut values = [0; 15];
    values[2] = 82;
    let mut img = gray_image(&values, 5);
    remap_to_palette_diffused(&mut img, &low_grays(), DitherMode::Stucki.kernel(), |_| false).unwrap();
    assert_eq!(vec![
        0, 0, 40, 8, 4,
        2, 4, 8, 4, 2,
        1, 2, 4, 2, 1,
    ], grays(&img));

    // error 21 halves every share, 0.5s round up
    let mut values = [0; 15];
    values[2] = 61;
    let mut img = gray_image(&values, 5);
    remap_to_palette_diffused(&mut img, &low_grays(), DitherMode::Stucki.kernel(), |_| false).unwrap();
    assert_eq!(vec![
        0, 0, 40, 4, 2,
        1, 2, 4, 2, 1,
        1, 1, 2, 1, 1,
    ], grays(&img));
}
