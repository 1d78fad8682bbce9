use arrayvec::ArrayVec;
use std::ops::Deref;

/// 8-bit RGBA. This is the pixel format of [`Image`](crate::Image).
pub type RGBA = rgb::RGBA<u8>;

/// 8-bit RGB. Palette entries and cluster centroids use it, alpha plays no part in matching.
pub type Color = rgb::RGB<u8>;

pub type PalIndex = u8;

/// Palettes are stored inline, so this is also the largest color count a request may ask for
pub const MAX_COLORS: usize = 256;

/// Squared Euclidean distance in RGB
#[inline(always)]
#[must_use]
pub fn diff(a: Color, b: Color) -> u32 {
    let dr = i32::from(a.r) - i32::from(b.r);
    let dg = i32::from(a.g) - i32::from(b.g);
    let db = i32::from(a.b) - i32::from(b.b);
    (dr * dr + dg * dg + db * db) as u32
}

#[inline(always)]
pub(crate) fn rgb_of(px: RGBA) -> Color {
    Color::new(px.r, px.g, px.b)
}

/// Colors produced by clustering, in cluster order.
///
/// Always holds exactly as many entries as colors were requested,
/// even when some clusters ended up empty or identical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    entries: ArrayVec<Color, MAX_COLORS>,
}

impl Palette {
    /// Fails if there are no colors, or more than [`MAX_COLORS`]
    pub fn new(colors: &[Color]) -> Result<Self, crate::Error> {
        if colors.is_empty() {
            return Err(crate::Error::ValueOutOfRange);
        }
        Ok(Self {
            entries: ArrayVec::try_from(colors).map_err(|_| crate::Error::ValueOutOfRange)?,
        })
    }

    pub(crate) fn from_centroids(centroids: ArrayVec<Color, MAX_COLORS>) -> Self {
        debug_assert!(!centroids.is_empty());
        Self { entries: centroids }
    }

    /// Palette colors
    #[inline(always)]
    #[must_use]
    pub fn as_slice(&self) -> &[Color] {
        &self.entries
    }

    /// Copy of the colors
    #[must_use]
    pub fn to_vec(&self) -> Vec<Color> {
        self.entries.to_vec()
    }
}

impl Deref for Palette {
    type Target = [Color];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

#[test]
fn diff_test() {
    let black = Color::new(0, 0, 0);
    let white = Color::new(255, 255, 255);
    assert_eq!(0, diff(black, black));
    assert_eq!(3 * 255 * 255, diff(black, white));
    assert_eq!(diff(white, black), diff(black, white));
    assert_eq!(1 + 4 + 9, diff(Color::new(10, 20, 30), Color::new(11, 18, 33)));
}

#[test]
fn pal_test() {
    assert!(Palette::new(&[]).is_err());
    assert!(Palette::new(&vec![Color::new(1, 2, 3); MAX_COLORS + 1]).is_err());

    let p = Palette::new(&[Color::new(1, 2, 3), Color::new(1, 2, 3), Color::new(9, 9, 9)]).unwrap();
    assert_eq!(3, p.len());
    assert_eq!(Color::new(9, 9, 9), p[2]);
    assert_eq!(p.to_vec(), p.as_slice());
}
