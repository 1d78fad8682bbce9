use crate::error::*;
use crate::pal::RGBA;
use std::fmt;

/// RGBA pixels with their dimensions. Rows are contiguous, without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Box<[RGBA]>,
}

impl Image {
    /// Takes ownership of `width * height` pixels.
    ///
    /// The `pixels` argument can be `Vec<RGBA>`, or `Box<[RGBA]>` or `&[RGBA]`.
    pub fn new<VecRGBA>(pixels: VecRGBA, width: usize, height: usize) -> Result<Self, Error> where VecRGBA: Into<Box<[RGBA]>> {
        Self::check_image_size(width, height)?;
        let pixels = pixels.into();
        if pixels.len() != width * height {
            return Err(BufferSizeMismatch);
        }
        Ok(Self { width, height, pixels })
    }

    /// Copies interleaved R,G,B,A bytes. The slice must be exactly `width * height * 4` long.
    pub fn from_bytes(bytes: &[u8], width: usize, height: usize) -> Result<Self, Error> {
        Self::check_image_size(width, height)?;
        if Some(bytes.len()) != width.checked_mul(height).and_then(|n| n.checked_mul(4)) {
            return Err(BufferSizeMismatch);
        }
        let pixels = bytes.chunks_exact(4).map(|px| RGBA::new(px[0], px[1], px[2], px[3])).collect();
        Ok(Self { width, height, pixels })
    }

    fn check_image_size(width: usize, height: usize) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Err(EmptyImage);
        }
        if width.checked_mul(height).map_or(true, |n| n > isize::MAX as usize / 4) {
            return Err(ValueOutOfRange);
        }
        Ok(())
    }

    /// Width of the image in pixels
    #[inline(always)]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the image in pixels
    #[inline(always)]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels in row-major order
    #[inline(always)]
    #[must_use]
    pub fn pixels(&self) -> &[RGBA] {
        &self.pixels
    }

    #[inline(always)]
    pub(crate) fn pixels_mut(&mut self) -> &mut [RGBA] {
        &mut self.pixels
    }

    #[must_use]
    pub fn into_pixels(self) -> Box<[RGBA]> {
        self.pixels
    }

    /// Interleaved R,G,B,A bytes
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|px| [px.r, px.g, px.b, px.a]).collect()
    }

    #[inline]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> RGBA {
        self.pixels[y * self.width + x]
    }

    /// Averages every `block_size`×`block_size` square into one opaque pixel.
    ///
    /// Channel averages are truncated. Pixels of partial blocks at the right and bottom edge are dropped.
    pub fn downsampled(&self, block_size: usize) -> Result<Image, Error> {
        if block_size == 0 {
            return Err(ValueOutOfRange);
        }
        if block_size == 1 {
            return Ok(self.clone());
        }
        let new_width = self.width / block_size;
        let new_height = self.height / block_size;
        if new_width == 0 || new_height == 0 {
            return Err(ValueOutOfRange);
        }

        let count = (block_size * block_size) as u32;
        let mut out = Vec::with_capacity(new_width * new_height);
        for y in 0..new_height {
            let rows = &self.pixels[y * block_size * self.width..][..block_size * self.width];
            for x in 0..new_width {
                let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
                for row in rows.chunks_exact(self.width) {
                    for px in &row[x * block_size..][..block_size] {
                        r += u32::from(px.r);
                        g += u32::from(px.g);
                        b += u32::from(px.b);
                    }
                }
                out.push(RGBA::new((r / count) as u8, (g / count) as u8, (b / count) as u8, 255));
            }
        }
        Image::new(out, new_width, new_height)
    }

    /// Scales with nearest-neighbor sampling (no smoothing), so blocks stay crisp
    pub fn resized_nearest(&self, width: usize, height: usize) -> Result<Image, Error> {
        Self::check_image_size(width, height)?;
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let src_x: Vec<usize> = (0..width).map(|x| nearest_source(x, width, self.width)).collect();
        let mut out = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = &self.pixels[nearest_source(y, height, self.height) * self.width..][..self.width];
            out.extend(src_x.iter().map(|&sx| row[sx]));
        }
        Image::new(out, width, height)
    }
}

/// Source coordinate whose pixel covers the center of destination pixel `dst`
#[inline]
fn nearest_source(dst: usize, dst_len: usize, src_len: usize) -> usize {
    ((2 * dst + 1) * src_len / (2 * dst_len)).min(src_len - 1)
}

impl fmt::Debug for Image {
    #[cold]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({}x{})", self.width, self.height)
    }
}

#[test]
fn takes_rgba() {
    let img = vec![RGBA::new(0, 0, 0, 0); 8];
    Image::new(&img[..], 1, 8).unwrap();
    Image::new(&img[..], 4, 2).unwrap();
    Image::new(&img[..], 8, 1).unwrap();
    assert_eq!(Err(BufferSizeMismatch), Image::new(&img[..], 9, 1));
    assert_eq!(Err(BufferSizeMismatch), Image::new(&img[..], 4, 3));
    assert_eq!(Err(EmptyImage), Image::new(Vec::<RGBA>::new(), 0, 3));

    let bytes = vec![7u8; 4 * 6];
    let img = Image::from_bytes(&bytes, 3, 2).unwrap();
    assert_eq!(RGBA::new(7, 7, 7, 7), img.pixel(2, 1));
    assert_eq!(bytes, img.to_bytes());
    assert_eq!(Err(BufferSizeMismatch), Image::from_bytes(&bytes[1..], 3, 2));
    assert_eq!(Err(BufferSizeMismatch), Image::from_bytes(&bytes, 2, 2));
    assert_eq!(Err(EmptyImage), Image::from_bytes(&[], 0, 0));
}

#[test]
fn downsample_truncates_and_drops_partial_blocks() {
    // 5x3 image, block 2 => 2x1, column 4 and row 2 are dropped
    let mut px = vec![RGBA::new(250, 250, 250, 7); 15];
    px[0] = RGBA::new(1, 2, 3, 0);
    px[1] = RGBA::new(2, 2, 3, 0);
    px[5] = RGBA::new(2, 3, 3, 0);
    px[6] = RGBA::new(2, 3, 4, 0);
    px[2] = RGBA::new(0, 0, 0, 0);
    px[3] = RGBA::new(0, 0, 0, 0);
    px[7] = RGBA::new(0, 0, 0, 0);
    px[8] = RGBA::new(0, 0, 1, 0);
    let img = Image::new(px, 5, 3).unwrap();

    let small = img.downsampled(2).unwrap();
    assert_eq!((2, 1), (small.width(), small.height()));
    // (1+2+2+2)/4, (2+2+3+3)/4, (3+3+3+4)/4
    assert_eq!(RGBA::new(1, 2, 3, 255), small.pixel(0, 0));
    assert_eq!(RGBA::new(0, 0, 0, 255), small.pixel(1, 0));

    assert_eq!(img, img.downsampled(1).unwrap());
    assert_eq!(Err(ValueOutOfRange), img.downsampled(0));
    assert_eq!(Err(ValueOutOfRange), img.downsampled(4));
}

#[test]
fn nearest_upscale() {
    let img = Image::new(vec![
        RGBA::new(1, 0, 0, 255), RGBA::new(2, 0, 0, 255),
        RGBA::new(3, 0, 0, 255), RGBA::new(4, 0, 0, 255),
    ], 2, 2).unwrap();
    let big = img.resized_nearest(5, 4).unwrap();
    assert_eq!((5, 4), (big.width(), big.height()));
    let reds: Vec<u8> = big.pixels().iter().map(|px| px.r).collect();
    assert_eq!(vec![
        1, 1, 2, 2, 2,
        1, 1, 2, 2, 2,
        3, 3, 4, 4, 4,
        3, 3, 4, 4, 4,
    ], reds);
    assert_eq!(img, img.resized_nearest(2, 2).unwrap());
}
