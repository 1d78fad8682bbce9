use crate::attr::{Attributes, ControlFlow, ProgressCallback};
use crate::error::*;
use crate::image::Image;
use crate::pal::Palette;
use crate::remap::{remap_to_palette, remap_to_palette_diffused, DitherMode};
use std::fmt;
use std::sync::Arc;

/// Remapping step, computed from [`Attributes::quantize()`]
pub struct QuantizationResult {
    palette: Palette,
    iterations: u16,
    dither: DitherMode,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl QuantizationResult {
    pub(crate) fn new(attr: &Attributes, palette: Palette, iterations: u16) -> Self {
        Self {
            palette,
            iterations,
            dither: DitherMode::None,
            progress_callback: attr.progress_callback(),
        }
    }

    /// Error diffusion used by [`QuantizationResult::remapped()`]. The default is [`DitherMode::None`].
    #[inline]
    pub fn set_dither_mode(&mut self, mode: DitherMode) {
        self.dither = mode;
    }

    #[inline(always)]
    #[must_use]
    pub fn dither_mode(&self) -> DitherMode {
        self.dither
    }

    /// The generated palette, in cluster order
    #[inline(always)]
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Number of k-means rounds that were run
    #[inline(always)]
    #[must_use]
    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    /// Set callback function to be called every time the library makes a progress.
    /// It gets percentage 0-100 and a status message. It can be used to cancel operation early.
    ///
    /// Replaces the callback inherited from [`Attributes`].
    pub fn set_progress_callback<F: Fn(f32, &str) -> ControlFlow + Send + Sync + 'static>(&mut self, callback: F) {
        self.progress_callback = Some(Arc::new(callback));
    }

    /// Copy of the image with every pixel replaced by a palette color. Alpha is unchanged.
    pub fn remapped(&self, image: &Image) -> Result<Image, Error> {
        self.remap_image(image.clone())
    }

    /// Like [`QuantizationResult::remapped()`], but reuses the image's pixel buffer
    pub fn remap_image(&self, mut image: Image) -> Result<Image, Error> {
        let kernel = self.dither.kernel();
        if kernel.is_empty() {
            remap_to_palette(&mut image, &self.palette);
        } else {
            let message = format!("Applying {} dithering...", self.dither);
            remap_to_palette_diffused(&mut image, &self.palette, kernel, |done| {
                self.remap_progress(70. + done * 30., &message)
            })?;
        }
        Ok(image)
    }

    // true == abort
    fn remap_progress(&self, percent: f32, message: &str) -> bool {
        if let Some(cb) = &self.progress_callback {
            cb(percent, message) == ControlFlow::Break
        } else {
            false
        }
    }
}

impl fmt::Debug for QuantizationResult {
    #[cold]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuantizationResult({} colors, {} rounds, {} dithering)", self.palette.len(), self.iterations, self.dither)
    }
}

#[cfg(test)]
use crate::pal::{Color, RGBA};

#[test]
fn remaps_with_palette() {
    use rand::{rngs::StdRng, SeedableRng};

    let mut px = vec![RGBA::new(250, 10, 10, 255); 8];
    px[4..].fill(RGBA::new(10, 10, 250, 100));
    let img = Image::new(px, 4, 2).unwrap();

    let attr = Attributes::new();
    let mut res = attr.quantize_with_rng(&img, 2, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(2, res.palette().len());
    assert!(res.iterations() >= 1 && res.iterations() <= 8);

    for mode in [DitherMode::None, DitherMode::Floyd, DitherMode::Stucki] {
        res.set_dither_mode(mode);
        let out = res.remapped(&img).unwrap();
        assert_eq!((4, 2), (out.width(), out.height()));
        for (o, i) in out.pixels().iter().zip(img.pixels()) {
            assert!(res.palette().contains(&Color::new(o.r, o.g, o.b)));
            assert_eq!(i.a, o.a);
        }
    }
}

#[test]
fn dithering_reports_progress() {
    use std::sync::Mutex;

    let img = Image::new(vec![RGBA::new(128, 128, 128, 255); 100], 1, 100).unwrap();
    let mut res = QuantizationResult::new(&Attributes::new(), Palette::new(&[Color::new(0, 0, 0), Color::new(255, 255, 255)]).unwrap(), 1);
    res.set_dither_mode(DitherMode::Floyd);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    res.set_progress_callback(move |p, msg| {
        assert_eq!("Applying floyd dithering...", msg);
        s.lock().unwrap().push(p);
        ControlFlow::Continue
    });
    res.remapped(&img).unwrap();
    // rows 0, 32, 64, 96
    let seen = seen.lock().unwrap();
    assert_eq!(4, seen.len());
    assert_eq!(70., seen[0]);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(seen.iter().all(|&p| p < 100.));

    res.set_progress_callback(|_, _| ControlFlow::Break);
    assert_eq!(Err(Aborted), res.remapped(&img));
    res.set_dither_mode(DitherMode::None);
    assert!(res.remapped(&img).is_ok());
}
