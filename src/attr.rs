use crate::error::Error;
use crate::image::Image;
use crate::kmeans::{initial_centroids, refine, sample_pixels, MAX_ITERATIONS};
use crate::pal::{Palette, MAX_COLORS};
use crate::policy::QualityMode;
use crate::quant::QuantizationResult;
use crate::worker::{self, Completed, Job, Request};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub(crate) type ProgressCallback = dyn Fn(f32, &str) -> ControlFlow + Send + Sync;

/// Starting point and settings for the quantization process
#[derive(Clone)]
pub struct Attributes {
    quality_mode: QualityMode,
    kmeans_iterations: u16,
    seed: Option<u64>,

    progress_callback: Option<Arc<ProgressCallback>>,
    log_callback: Option<Arc<dyn Fn(&Attributes, &str) + Send + Sync>>,
    log_flush_callback: Option<Arc<dyn Fn(&Attributes) + Send + Sync>>,
}

impl Attributes {
    /// New handle for library configuration
    ///
    /// See also [`Attributes::process()`] and [`Attributes::spawn()`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            quality_mode: QualityMode::Normal,
            kmeans_iterations: 15,
            seed: None,
            progress_callback: None,
            log_callback: None,
            log_flush_callback: None,
        }
    }

    /// Run the whole pipeline on the current thread.
    ///
    /// Progress is reported to the callback set with [`Attributes::set_progress_callback()`],
    /// which can also abort the run.
    pub fn process(&self, request: Request) -> Result<Completed, Error> {
        worker::process(self, request, |_, _| {})
    }

    /// Run the whole pipeline on a new worker thread.
    ///
    /// The returned [`Job`] receives progress, palette and completion events, and can cancel the run.
    #[must_use]
    pub fn spawn(&self, request: Request) -> Job {
        Job::spawn(self, request)
    }

    /// Generate a palette of exactly `num_colors` colors for the image.
    ///
    /// Uses a generator seeded with [`Attributes::set_seed()`], or from OS entropy if no seed was set.
    pub fn quantize(&self, image: &Image, num_colors: u32) -> Result<QuantizationResult, Error> {
        match self.seed {
            Some(seed) => self.quantize_with_rng(image, num_colors, &mut StdRng::seed_from_u64(seed)),
            None => self.quantize_with_rng(image, num_colors, &mut StdRng::from_entropy()),
        }
    }

    /// Like [`Attributes::quantize()`], but picks initial centroids with the given random generator
    pub fn quantize_with_rng<R: Rng + ?Sized>(&self, image: &Image, num_colors: u32, rng: &mut R) -> Result<QuantizationResult, Error> {
        if !(1..=MAX_COLORS as u32).contains(&num_colors) {
            return Err(Error::ValueOutOfRange);
        }
        let samples = sample_pixels(image.pixels());
        let mut centroids = initial_centroids(&samples, num_colors as usize, rng);

        let max_iterations = self.kmeans_iterations();
        let iterations = refine(&samples, &mut centroids, max_iterations, |i| {
            self.progress(
                10. + f32::from(i) / f32::from(max_iterations) * 60.,
                &format!("K-means iteration {}/{}", i + 1, max_iterations),
            )
        }).ok_or(Error::Aborted)?;

        self.verbose_print(format!("  clustered {} samples into {} colors in {}/{} rounds", samples.len(), num_colors, iterations, max_iterations));
        Ok(QuantizationResult::new(self, Palette::from_centroids(centroids), iterations))
    }

    /// Selects the table used to clamp colors and block size of large images.
    ///
    /// The default is [`QualityMode::Normal`].
    #[inline]
    pub fn set_quality_mode(&mut self, mode: QualityMode) {
        self.quality_mode = mode;
    }

    #[inline(always)]
    #[must_use]
    pub fn quality_mode(&self) -> QualityMode {
        self.quality_mode
    }

    /// 1-100. Requested number of k-means rounds.
    ///
    /// At most 8 rounds are run regardless, so this only matters for values below 8.
    /// The default is 15.
    #[inline]
    pub fn set_kmeans_iterations(&mut self, value: u16) -> Result<(), Error> {
        if !(1..=100).contains(&value) {
            return Err(Error::ValueOutOfRange);
        }
        self.kmeans_iterations = value;
        Ok(())
    }

    /// Number of k-means rounds that will actually be allowed
    #[inline(always)]
    #[must_use]
    pub fn kmeans_iterations(&self) -> u16 {
        self.kmeans_iterations.min(MAX_ITERATIONS)
    }

    /// Fixes the seed of centroid initialization, making runs reproducible.
    ///
    /// `None` (the default) seeds from OS entropy on every run.
    #[inline]
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    #[inline(always)]
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Set callback function to be called every time the library wants to print a message.
    ///
    /// To share data with the callback, use `Arc` or `Atomic*` types and `move ||` closures.
    #[inline]
    pub fn set_log_callback<F: Fn(&Attributes, &str) + Send + Sync + 'static>(&mut self, callback: F) {
        self.verbose_printf_flush();
        self.log_callback = Some(Arc::new(callback));
    }

    /// Callback for flushing output (if you buffer messages, that's the time to flush those buffers)
    #[inline]
    pub fn set_log_flush_callback<F: Fn(&Attributes) + Send + Sync + 'static>(&mut self, callback: F) {
        self.verbose_printf_flush();
        self.log_flush_callback = Some(Arc::new(callback));
    }

    /// Set callback function to be called every time the library makes a progress.
    /// It gets percentage 0-100 and a status message. It can be used to cancel operation early.
    ///
    /// To share data with the callback, use `Arc` or `Atomic*` types and `move ||` closures.
    #[inline]
    pub fn set_progress_callback<F: Fn(f32, &str) -> ControlFlow + Send + Sync + 'static>(&mut self, callback: F) {
        self.progress_callback = Some(Arc::new(callback));
    }

    pub(crate) fn progress_callback(&self) -> Option<Arc<ProgressCallback>> {
        self.progress_callback.clone()
    }

    // true == abort
    #[inline]
    #[must_use]
    pub(crate) fn progress(self: &Attributes, percent: f32, message: &str) -> bool {
        if let Some(f) = &self.progress_callback {
            f(percent, message) == ControlFlow::Break
        } else {
            false
        }
    }

    #[inline(always)]
    pub(crate) fn verbose_print(self: &Attributes, msg: impl AsRef<str>) {
        fn _print(a: &Attributes, msg: &str) {
            if let Some(f) = &a.log_callback {
                f(a, msg);
            }
        }
        _print(self, msg.as_ref());
    }

    #[inline]
    pub(crate) fn verbose_printf_flush(self: &Attributes) {
        if let Some(f) = &self.log_flush_callback {
            f(self);
        }
    }
}

impl Drop for Attributes {
    fn drop(&mut self) {
        self.verbose_printf_flush();
    }
}

impl Default for Attributes {
    #[inline(always)]
    fn default() -> Attributes {
        Attributes::new()
    }
}

/// Result of callback in [`Attributes::set_progress_callback`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlFlow {
    /// Continue processing as normal
    Continue,
    /// Abort processing and fail
    Break,
}

#[test]
fn getset() {
    let mut a = Attributes::new();
    assert_eq!(QualityMode::Normal, a.quality_mode());
    assert_eq!(8, a.kmeans_iterations());
    assert_eq!(None, a.seed());

    a.set_kmeans_iterations(3).unwrap();
    assert_eq!(3, a.kmeans_iterations());
    a.set_kmeans_iterations(100).unwrap();
    assert_eq!(8, a.kmeans_iterations());
    assert!(a.set_kmeans_iterations(0).is_err());
    assert!(a.set_kmeans_iterations(101).is_err());

    a.set_quality_mode(QualityMode::Heavy);
    assert_eq!(QualityMode::Heavy, a.quality_mode());
    a.set_seed(Some(3));
    assert_eq!(Some(3), a.seed());
}

#[test]
fn quantize_checks_colors() {
    let img = Image::new(vec![crate::RGBA::new(1, 2, 3, 255); 4], 2, 2).unwrap();
    let a = Attributes::new();
    assert_eq!(Some(Error::ValueOutOfRange), a.quantize(&img, 0).err());
    assert_eq!(Some(Error::ValueOutOfRange), a.quantize(&img, 257).err());
    assert_eq!(256, a.quantize(&img, 256).unwrap().palette().len());
}

#[test]
fn progress_can_abort_clustering() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let px: Vec<_> = (0..64u8).map(|v| crate::RGBA::new(v * 4, 255 - v, v, 255)).collect();
    let img = Image::new(px, 8, 8).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut a = Attributes::new();
    a.set_seed(Some(0));
    let c = calls.clone();
    a.set_progress_callback(move |percent, msg| {
        c.fetch_add(1, Ordering::SeqCst);
        assert!((10. ..70.).contains(&percent));
        assert!(msg.starts_with("K-means iteration 1/8"));
        ControlFlow::Break
    });
    assert_eq!(Some(Error::Aborted), a.quantize(&img, 4).err());
    assert_eq!(1, calls.load(Ordering::SeqCst));
}

#[test]
fn log_callback() {
    use std::sync::Mutex;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut a = Attributes::new();
    let l = log.clone();
    a.set_log_callback(move |_, msg| l.lock().unwrap().push(msg.to_string()));
    let img = Image::new(vec![crate::RGBA::new(9, 9, 9, 255); 9], 3, 3).unwrap();
    a.quantize(&img, 2).unwrap();
    assert!(log.lock().unwrap().iter().any(|m| m.contains("9 samples into 2 colors")));
}
