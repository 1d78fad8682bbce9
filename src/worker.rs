//! End-to-end runs: downscale, cluster, remap and upscale, either inline or on a worker thread.

use crate::attr::{Attributes, ControlFlow};
use crate::error::*;
use crate::image::Image;
use crate::pal::{Palette, MAX_COLORS};
use crate::policy::QualityProfile;
use crate::remap::DitherMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What to process and how
#[derive(Clone, Debug)]
pub struct Request {
    pub image: Image,
    /// 1-256. May be lowered for large images.
    pub num_colors: u32,
    /// Side of the square averaged into one working pixel. 1 disables pixelation. May be raised for large images.
    pub block_size: u32,
    pub dither: DitherMode,
}

impl Request {
    #[must_use]
    pub fn new(image: Image, num_colors: u32, block_size: u32, dither: DitherMode) -> Self {
        Self { image, num_colors, block_size, dither }
    }
}

/// Output of a successful run
#[derive(Clone, Debug)]
pub struct Completed {
    /// Remapped image, scaled back to the input dimensions
    pub image: Image,
    /// Remapped image at the working (block-averaged) resolution
    pub working_image: Image,
    pub palette: Palette,
    /// Number of k-means rounds that were run
    pub iterations: u16,
    /// Time from the start of downscaling to the end of remapping. Upscaling isn't included.
    pub algorithm_time: Duration,
    /// Effective parameters, after clamping for the image size
    pub profile: QualityProfile,
}

impl Completed {
    #[must_use]
    pub fn algorithm_time_ms(&self) -> f64 {
        self.algorithm_time.as_secs_f64() * 1000.
    }

    /// Number of working-resolution pixels that were remapped
    #[must_use]
    pub fn pixels_processed(&self) -> usize {
        self.working_image.width() * self.working_image.height()
    }

    /// Processed pixels per millisecond of algorithm time
    #[must_use]
    pub fn throughput(&self) -> f64 {
        self.pixels_processed() as f64 / self.algorithm_time_ms().max(0.001)
    }
}

/// Messages sent by a [`Job`], in the order they happen.
///
/// A run ends with exactly one `Complete` or `Error`, and nothing is sent after it.
#[derive(Clone, Debug)]
pub enum Event {
    /// `percent` never decreases within a run
    Progress { percent: f32, message: String },
    /// Clustering has finished
    Palette { palette: Palette, iterations: u16 },
    Complete(Box<Completed>),
    Error(Error),
}

/// Shared flag that stops a [`Job`] at its next progress check
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle of a run on a worker thread, from [`Attributes::spawn()`].
///
/// Dropping it cancels the run.
pub struct Job {
    events: Receiver<Event>,
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
    finished: bool,
}

impl Job {
    pub(crate) fn spawn(attr: &Attributes, request: Request) -> Self {
        let (tx, events) = mpsc::channel();
        let token = CancellationToken::new();

        let mut attr = attr.clone();
        let user_callback = attr.progress_callback();
        let progress_tx = tx.clone();
        let progress_token = token.clone();
        attr.set_progress_callback(move |percent, message| {
            if progress_token.is_cancelled() {
                return ControlFlow::Break;
            }
            if let Some(cb) = &user_callback {
                if cb(percent, message) == ControlFlow::Break {
                    return ControlFlow::Break;
                }
            }
            // nobody is listening anymore
            if progress_tx.send(Event::Progress { percent, message: message.into() }).is_err() {
                return ControlFlow::Break;
            }
            ControlFlow::Continue
        });

        let worker_tx = tx.clone();
        let thread = thread::Builder::new()
            .name("pixquant-worker".into())
            .spawn(move || run_job(&attr, request, &worker_tx));

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(_) => {
                let _ = tx.send(Event::Error(InternalError));
                None
            },
        };
        Self { events, token, thread, finished: false }
    }

    /// Blocks until the next event. Returns `None` once the final `Complete` or `Error` has been received.
    pub fn recv(&mut self) -> Option<Event> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().unwrap_or(Event::Error(InternalError));
        Some(self.track(event))
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.finished {
            return None;
        }
        let event = match self.events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Event::Error(InternalError),
        };
        Some(self.track(event))
    }

    /// All remaining events, blocking between them
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    /// Skips to the end of the run
    pub fn wait(mut self) -> Result<Completed, Error> {
        let mut outcome = Err(InternalError);
        while let Some(event) = self.recv() {
            match event {
                Event::Complete(done) => outcome = Ok(*done),
                Event::Error(err) => outcome = Err(err),
                Event::Progress { .. } | Event::Palette { .. } => {},
            }
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(InternalError);
            }
        }
        outcome
    }

    /// Asks the worker to stop. It ends with [`Error::Aborted`] unless it has already finished.
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that can cancel this job from elsewhere
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the final event has been received
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn track(&mut self, event: Event) -> Event {
        if matches!(event, Event::Complete(_) | Event::Error(_)) {
            self.finished = true;
        }
        event
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn run_job(attr: &Attributes, request: Request, tx: &Sender<Event>) {
    let outcome = process(attr, request, |palette, iterations| {
        let _ = tx.send(Event::Palette { palette: palette.clone(), iterations });
    });
    let _ = tx.send(match outcome {
        Ok(done) => Event::Complete(Box::new(done)),
        Err(err) => Event::Error(err),
    });
}

pub(crate) fn process(attr: &Attributes, request: Request, mut on_palette: impl FnMut(&Palette, u16)) -> Result<Completed, Error> {
    let Request { image, num_colors, block_size, dither } = request;
    if num_colors == 0 || num_colors as usize > MAX_COLORS || block_size == 0 {
        return Err(ValueOutOfRange);
    }

    let (width, height) = (image.width(), image.height());
    let profile = QualityProfile::new(num_colors, block_size, width * height, attr.quality_mode(), dither);
    let (working_width, working_height) = profile.working_size(width, height);
    if working_width == 0 || working_height == 0 {
        attr.verbose_print(format!("  block size {} doesn't fit in {}x{} image", profile.block_size, width, height));
        return Err(ValueOutOfRange);
    }
    attr.verbose_print(format!(
        "  {} mode: {}x{} ({} px) -> {}x{} ({} px), block {}, {} colors, {} dithering, {:.2}x compression",
        profile.mode, width, height, width * height,
        working_width, working_height, working_width * working_height,
        profile.block_size, profile.num_colors, profile.dither, profile.compression_ratio(width, height),
    ));

    let start = Instant::now();
    let working = if profile.block_size > 1 {
        if attr.progress(5., "Downscaling image...") {
            return Err(Aborted);
        }
        image.downsampled(profile.block_size as usize)?
    } else {
        image
    };

    if attr.progress(10., "Running K-means clustering...") {
        return Err(Aborted);
    }
    let mut res = attr.quantize(&working, profile.num_colors)?;
    on_palette(res.palette(), res.iterations());

    if attr.progress(70., &format!("Applying {dither} dithering...")) {
        return Err(Aborted);
    }
    res.set_dither_mode(dither);
    let working_image = res.remap_image(working)?;
    let algorithm_time = start.elapsed();

    if attr.progress(100., "Complete!") {
        return Err(Aborted);
    }

    let image = working_image.resized_nearest(width, height)?;
    let done = Completed {
        image,
        working_image,
        palette: res.palette().clone(),
        iterations: res.iterations(),
        algorithm_time,
        profile,
    };
    attr.verbose_print(format!(
        "  {:.2} ms, {} px processed, {:.1} px/ms",
        done.algorithm_time_ms(), done.pixels_processed(), done.throughput()
    ));
    Ok(done)
}

#[cfg(test)]
use crate::pal::{Color, RGBA};

#[cfg(test)]
fn stripes(width: usize, height: usize) -> Image {
    let px: Vec<_> = (0..width * height).map(|i| {
        if (i % width) < width / 2 { RGBA::new(230, 20, 20, 255) } else { RGBA::new(20, 20, 230, 255) }
    }).collect();
    Image::new(px, width, height).unwrap()
}

#[test]
fn process_inline() {
    use std::sync::Mutex;

    let mut attr = Attributes::new();
    attr.set_seed(Some(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    attr.set_progress_callback(move |p, msg| {
        s.lock().unwrap().push((p, msg.to_string()));
        ControlFlow::Continue
    });

    let done = attr.process(Request::new(stripes(9, 7), 2, 2, DitherMode::Floyd)).unwrap();
    assert_eq!((9, 7), (done.image.width(), done.image.height()));
    assert_eq!((4, 3), (done.working_image.width(), done.working_image.height()));
    assert_eq!(12, done.pixels_processed());
    assert_eq!(2, done.palette.len());
    assert!(done.palette.contains(&Color::new(230, 20, 20)));
    assert!(done.palette.contains(&Color::new(20, 20, 230)));

    let seen = seen.lock().unwrap();
    assert_eq!((5., "Downscaling image...".to_string()), seen[0]);
    assert_eq!((10., "Running K-means clustering...".to_string()), seen[1]);
    assert!(seen.iter().any(|(p, m)| *p == 70. && m == "Applying floyd dithering..."));
    assert_eq!((100., "Complete!".to_string()), seen[seen.len() - 1]);
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn rejects_bad_requests() {
    let attr = Attributes::new();
    for (colors, block) in [(0, 1), (257, 1), (4, 0), (4, 7)] {
        let err = attr.process(Request::new(stripes(6, 6), colors, block, DitherMode::None)).unwrap_err();
        assert_eq!(ErrorKind::InvalidParameter, err.kind());
    }
}

#[test]
fn job_events() {
    let mut attr = Attributes::new();
    attr.set_seed(Some(2));
    let mut job = attr.spawn(Request::new(stripes(8, 8), 2, 1, DitherMode::None));

    let events: Vec<_> = job.events().collect();
    assert!(job.is_finished());
    assert!(job.recv().is_none());
    // no downscaling step at block size 1
    assert!(matches!(&events[0], Event::Progress { percent, .. } if *percent == 10.));
    let palette_at = events.iter().position(|e| matches!(e, Event::Palette { .. })).unwrap();
    assert!(matches!(&events[palette_at + 1], Event::Progress { percent, .. } if *percent == 70.));
    match events.last() {
        Some(Event::Complete(done)) => assert_eq!(stripes(8, 8), done.image),
        other => panic!("{other:?}"),
    }
}

#[test]
fn job_cancel() {
    let job = Attributes::new().spawn(Request::new(stripes(64, 64), 8, 1, DitherMode::Jarvis));
    job.cancellation_token().cancel();
    // the run may have finished before the flag was seen, but it can't end any other way
    match job.wait() {
        Ok(done) => assert_eq!(64 * 64, done.pixels_processed()),
        Err(err) => assert_eq!(Aborted, err),
    }

    let mut attr = Attributes::new();
    attr.set_progress_callback(|_, _| ControlFlow::Break);
    let mut job = attr.spawn(Request::new(stripes(8, 8), 2, 1, DitherMode::None));
    let events: Vec<_> = job.events().collect();
    assert!(!events.iter().any(|e| matches!(e, Event::Complete(_) | Event::Palette { .. })));
    assert!(matches!(events.last(), Some(Event::Error(Aborted))));
}
