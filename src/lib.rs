//! Reduces RGBA images to a small palette found with k-means clustering,
//! optionally pixelated by block averaging and remapped with error-diffusion dithering.
//!
//! Start with [`new()`], then either [`Attributes::process()`] a [`Request`] on the current thread,
//! or [`Attributes::spawn()`] it as a [`Job`] and receive its [`Event`]s.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::wildcard_imports)]

mod attr;
mod error;
mod image;
mod kmeans;
mod nearest;
mod pal;
mod policy;
mod quant;
mod remap;
mod worker;

#[cfg(not(feature = "threads"))]
mod rayoff;

pub use attr::{Attributes, ControlFlow};
pub use error::{Error, ErrorKind};
pub use image::Image;
pub use pal::{diff, Color, Palette, MAX_COLORS, RGBA};
pub use policy::{clamp_parameters, QualityMode, QualityProfile};
pub use quant::QuantizationResult;
pub use remap::{DitherMode, Tap};
pub use worker::{CancellationToken, Completed, Event, Job, Request};

/// [Start here][Attributes]: creates new handle for library configuration
///
/// See [`Attributes`]
#[inline(always)]
#[must_use]
pub fn new() -> Attributes {
    Attributes::new()
}

#[doc(hidden)]
pub fn _unstable_internal_kmeans_bench() -> impl FnMut() {
    let samples: Vec<_> = (0..kmeans::MAX_SAMPLES as u32).map(|i| Color::new((i * 7) as u8, (i * 13) as u8, (i / 20) as u8)).collect();
    let start: Vec<_> = (0..64u8).map(|i| Color::new(i * 4, 255 - i * 4, i)).collect();
    move || {
        let mut centroids = start.clone();
        let _ = kmeans::refine(&samples, &mut centroids, kmeans::MAX_ITERATIONS, |_| false);
    }
}

#[test]
fn error_display() {
    assert_eq!("VALUE_OUT_OF_RANGE", Error::ValueOutOfRange.to_string());
    assert_eq!(ErrorKind::Cancelled, Error::Aborted.kind());
}
