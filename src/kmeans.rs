use crate::nearest::Nearest;
use crate::pal::{rgb_of, Color, PalIndex, MAX_COLORS, RGBA};
#[cfg(not(feature = "threads"))]
use crate::rayoff::*;
use arrayvec::ArrayVec;
use rand::Rng;
#[cfg(feature = "threads")]
use rayon::prelude::*;
use rgb::{ComponentMap, RGB};
use std::cell::RefCell;
#[cfg(feature = "threads")]
use thread_local::ThreadLocal;

/// Clustering never looks at more than this many pixels
pub(crate) const MAX_SAMPLES: usize = 5000;

/// Hard cap on rounds, regardless of how many were requested
pub(crate) const MAX_ITERATIONS: u16 = 8;

/// Every `step`-th pixel in scan order, with `step` chosen so that there are roughly [`MAX_SAMPLES`] of them
pub(crate) fn sample_pixels(pixels: &[RGBA]) -> Vec<Color> {
    let step = (pixels.len() / MAX_SAMPLES).max(1);
    pixels.iter().step_by(step).copied().map(rgb_of).collect()
}

/// `k` samples drawn uniformly with replacement. Duplicates are kept.
pub(crate) fn initial_centroids<R: Rng + ?Sized>(samples: &[Color], k: usize, rng: &mut R) -> ArrayVec<Color, MAX_COLORS> {
    debug_assert!(!samples.is_empty());
    debug_assert!(k <= MAX_COLORS);
    (0..k).map(|_| samples[rng.gen_range(0..samples.len())]).collect()
}

pub(crate) struct Kmeans {
    averages: Vec<ColorAvg>,
}

#[derive(Copy, Clone, Default)]
struct ColorAvg {
    pub sum: RGB<u64>,
    pub total: u64,
}

/// K-Means iteration: new centroid is the rounded average of the samples that map best to it.
impl Kmeans {
    #[inline]
    pub fn new(pal_len: usize) -> Self {
        Self {
            averages: vec![ColorAvg::default(); pal_len],
        }
    }

    #[inline]
    pub fn update_color(&mut self, px: Color, matched: PalIndex) {
        let c = &mut self.averages[matched as usize];
        c.sum += px.map(u64::from);
        c.total += 1;
    }

    /// Moves centroids to their averages. Centroids that got no samples stay where they were.
    ///
    /// Returns whether any centroid moved by more than 1 in any channel.
    pub fn finalize(self, centroids: &mut [Color]) -> bool {
        let mut changed = false;
        for (avg, color) in self.averages.iter().zip(centroids.iter_mut()).filter(|(avg, _)| avg.total > 0) {
            let total = avg.total;
            let new_color = avg.sum.map(move |c| ((2 * c + total) / (2 * total)) as u8);
            changed |= moved_more_than_one(*color, new_color);
            *color = new_color;
        }
        changed
    }

    /// One assignment + update round over all samples. Returns whether it hasn't converged yet.
    #[inline(never)]
    pub(crate) fn iteration(samples: &[Color], centroids: &mut [Color]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let len = centroids.len();
        let n = Nearest::new(centroids);
        let tls = ThreadLocal::new();

        // chunk size is a trade-off between parallelization and overhead
        samples.par_chunks(256).for_each(|batch| {
            let kmeans = tls.get_or(move || RefCell::new(Kmeans::new(len)));
            kmeans.borrow_mut().iterate_batch(batch, &n);
        });

        // sums are integers, so merge order doesn't affect the result
        tls.into_iter()
            .map(RefCell::into_inner)
            .reduce(Kmeans::merge)
            .map_or(false, |kmeans| kmeans.finalize(centroids))
    }

    fn iterate_batch(&mut self, batch: &[Color], n: &Nearest<'_>) {
        for &px in batch {
            let (matched, _) = n.search(px);
            self.update_color(px, matched);
        }
    }

    #[inline]
    pub fn merge(mut self, new: Kmeans) -> Kmeans {
        self.averages.iter_mut().zip(new.averages).for_each(|(p, n)| {
            p.sum += n.sum;
            p.total += n.total;
        });
        self
    }
}

#[inline]
fn moved_more_than_one(old: Color, new: Color) -> bool {
    old.r.abs_diff(new.r) > 1 || old.g.abs_diff(new.g) > 1 || old.b.abs_diff(new.b) > 1
}

/// Runs up to `max_iterations` rounds, stopping early once centroids settle.
///
/// `progress` is called after every round with the 0-based round number, and returns `true` to abort.
/// Returns number of rounds executed, or `None` if aborted.
pub(crate) fn refine(samples: &[Color], centroids: &mut [Color], max_iterations: u16, mut progress: impl FnMut(u16) -> bool) -> Option<u16> {
    let mut iterations = 0;
    for i in 0..max_iterations {
        iterations += 1;
        let changed = Kmeans::iteration(samples, centroids);
        if progress(i) {
            return None;
        }
        if !changed {
            break;
        }
    }
    Some(iterations)
}

#[cfg(test)]
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn sampling_step() {
    let px = vec![RGBA::new(1, 2, 3, 4); 12_000];
    // step 2
    assert_eq!(6000, sample_pixels(&px).len());
    assert_eq!(Color::new(1, 2, 3), sample_pixels(&px)[0]);

    let px: Vec<_> = (0..4999u32).map(|i| RGBA::new(i as u8, 0, 0, 255)).collect();
    let s = sample_pixels(&px);
    assert_eq!(4999, s.len());
    assert_eq!(Color::new(10, 0, 0), s[10]);

    let px: Vec<_> = (0..15_000u32).map(|i| RGBA::new((i % 3) as u8, 0, 0, 255)).collect();
    // step 3 always lands on the first of each triple
    assert!(sample_pixels(&px).iter().all(|c| c.r == 0));
}

#[test]
fn init_draws_from_samples() {
    let samples = [Color::new(1, 1, 1), Color::new(2, 2, 2), Color::new(3, 3, 3)];
    let mut rng = StdRng::seed_from_u64(7);
    let c = initial_centroids(&samples, 40, &mut rng);
    assert_eq!(40, c.len());
    assert!(c.iter().all(|c| samples.contains(c)));

    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(c, initial_centroids(&samples, 40, &mut rng));
}

#[test]
fn converges_in_one_round() {
    let samples = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
    let mut centroids = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
    let mut rounds = Vec::new();
    let iterations = refine(&samples, &mut centroids, MAX_ITERATIONS, |i| { rounds.push(i); false });
    assert_eq!(Some(1), iterations);
    assert_eq!(vec![0], rounds);
    assert_eq!([Color::new(0, 0, 0), Color::new(255, 255, 255)], centroids);
}

#[test]
fn empty_cluster_is_kept() {
    let samples = [Color::new(10, 10, 10), Color::new(20, 20, 20), Color::new(31, 30, 30)];
    // the second centroid is farther than the first from every sample
    let mut centroids = [Color::new(0, 0, 0), Color::new(255, 0, 255)];
    assert!(Kmeans::iteration(&samples, &mut centroids));
    // (10+20+31)/3 = 20.33, (10+20+30)/3 = 20
    assert_eq!([Color::new(20, 20, 20), Color::new(255, 0, 255)], centroids);
    assert!(!Kmeans::iteration(&samples, &mut centroids));
    assert_eq!(Color::new(255, 0, 255), centroids[1]);
}

#[test]
fn ties_go_to_lowest_index() {
    let samples = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
    let mut centroids = [Color::new(0, 0, 0), Color::new(0, 0, 0)];
    assert!(Kmeans::iteration(&samples, &mut centroids));
    // everything went to centroid 0, 127.5 rounds up
    assert_eq!([Color::new(128, 128, 128), Color::new(0, 0, 0)], centroids);
}

#[test]
fn bounded_rounds_and_abort() {
    let samples: Vec<_> = (0..=255u8).map(|v| Color::new(v, v / 2, 255 - v)).collect();
    let mut rng = StdRng::seed_from_u64(1);
    let mut centroids = initial_centroids(&samples, 16, &mut rng);
    let iterations = refine(&samples, &mut centroids, 100, |_| false).unwrap();
    assert!(iterations >= 1 && iterations <= 100);

    let mut centroids = [Color::new(0, 0, 0), Color::new(1, 1, 1)];
    assert_eq!(None, refine(&samples, &mut centroids, MAX_ITERATIONS, |i| i == 1));
}

#[test]
fn parallel_matches_sequential() {
    let samples: Vec<_> = (0..MAX_SAMPLES as u32).map(|i| Color::new((i * 7) as u8, (i * 13) as u8, (i / 20) as u8)).collect();
    let start = [Color::new(0, 0, 0), Color::new(128, 0, 0), Color::new(0, 200, 50), Color::new(255, 255, 255)];

    let mut par = start;
    Kmeans::iteration(&samples, &mut par);

    let n = Nearest::new(&start);
    let mut seq = Kmeans::new(start.len());
    seq.iterate_batch(&samples, &n);
    let mut expected = start;
    seq.finalize(&mut expected);
    assert_eq!(expected, par);
}
