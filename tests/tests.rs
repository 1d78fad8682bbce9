use pixquant::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

fn gradient(width: usize, height: usize) -> Image {
    let px: Vec<_> = (0..width * height).map(|i| {
        let (x, y) = (i % width, i / width);
        RGBA::new((x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) * 3) as u8, 200)
    }).collect();
    Image::new(px, width, height).unwrap()
}

#[test]
fn all_red() {
    let mut attr = new();
    attr.set_seed(Some(11));
    let img = Image::from_bytes(&[255u8, 0, 0, 255].repeat(16), 4, 4).unwrap();
    let mut job = attr.spawn(Request::new(img, 2, 1, DitherMode::Floyd));

    let mut palette_events = 0;
    let mut last = None;
    for event in job.events() {
        if let Event::Palette { palette, .. } = &event {
            palette_events += 1;
            assert!(palette.iter().all(|&c| c == Color::new(255, 0, 0)));
        }
        last = Some(event);
    }
    assert_eq!(1, palette_events);
    let Some(Event::Complete(done)) = &last else { panic!("{last:?}") };
    assert_eq!(&[255u8, 0, 0, 255].repeat(16), &done.image.to_bytes());
}

#[test]
fn zero_colors_is_invalid() {
    let mut job = new().spawn(Request::new(gradient(8, 8), 0, 1, DitherMode::None));
    let events: Vec<_> = job.events().collect();
    assert_eq!(1, events.len());
    let Event::Error(err) = &events[0] else { panic!("{events:?}") };
    assert_eq!(ErrorKind::InvalidParameter, err.kind());
}

#[test]
fn output_matches_input_dimensions() {
    let mut attr = new();
    attr.set_seed(Some(3));
    for (block, dither) in [(1, DitherMode::None), (3, DitherMode::Floyd), (4, DitherMode::Jarvis), (5, DitherMode::Stucki)] {
        let img = gradient(23, 17);
        let done = attr.process(Request::new(img.clone(), 6, block, dither)).unwrap();
        assert_eq!((23, 17), (done.image.width(), done.image.height()));
        assert_eq!((23 / block as usize, 17 / block as usize), (done.working_image.width(), done.working_image.height()));
        assert_eq!(6, done.palette.len());
        assert!(done.iterations >= 1 && done.iterations <= 8);
        for px in done.image.pixels() {
            assert!(done.palette.contains(&Color::new(px.r, px.g, px.b)));
        }
        // downscaling makes pixels opaque
        let alpha = if block == 1 { 200 } else { 255 };
        assert!(done.image.pixels().iter().all(|px| px.a == alpha));
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let mut attr = new();
    attr.set_seed(Some(1234));
    let a = attr.process(Request::new(gradient(40, 30), 16, 2, DitherMode::Stucki)).unwrap();
    let b = attr.process(Request::new(gradient(40, 30), 16, 2, DitherMode::Stucki)).unwrap();
    assert_eq!(a.palette, b.palette);
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.image, b.image);
}

#[test]
fn progress_never_goes_back() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut attr = new();
    let s = seen.clone();
    attr.set_progress_callback(move |percent, message| {
        s.lock().unwrap().push((percent, message.to_string()));
        ControlFlow::Continue
    });
    let mut job = attr.spawn(Request::new(gradient(50, 70), 8, 2, DitherMode::Jarvis));

    let mut percents = Vec::new();
    let mut palette_at = None;
    while let Some(event) = job.recv() {
        match event {
            Event::Progress { percent, .. } => percents.push(percent),
            Event::Palette { iterations, .. } => {
                assert!(iterations <= 8);
                palette_at = Some(percents.len());
            },
            Event::Complete(done) => assert_eq!(8, done.profile.num_colors),
            Event::Error(err) => panic!("{err}"),
        }
    }
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(Some(&5.), percents.first());
    assert_eq!(Some(&100.), percents.last());
    // clustering is done before dithering starts
    assert_eq!(70., percents[palette_at.unwrap()]);

    // the user's callback sees the same stream
    let seen: Vec<f32> = seen.lock().unwrap().iter().map(|s| s.0).collect();
    assert_eq!(percents, seen);
}

#[test]
fn cancel_before_work_starts() {
    let token = CancellationToken::new();
    let mut attr = new();
    let t = token.clone();
    attr.set_progress_callback(move |_, _| if t.is_cancelled() { ControlFlow::Break } else { ControlFlow::Continue });
    token.cancel();

    let mut job = attr.spawn(Request::new(gradient(16, 16), 4, 1, DitherMode::Floyd));
    let events: Vec<_> = job.events().collect();
    assert!(events.iter().all(|e| !matches!(e, Event::Complete(_))));
    let Some(Event::Error(err)) = events.last() else { panic!("{events:?}") };
    assert_eq!(ErrorKind::Cancelled, err.kind());
    assert!(job.try_recv().is_none());
}

#[test]
fn large_images_are_clamped() {
    let attr = new();
    let img = Image::new(vec![RGBA::new(7, 8, 9, 255); 2100 * 1000], 2100, 1000).unwrap();
    let done = attr.process(Request::new(img, 200, 1, DitherMode::None)).unwrap();
    assert_eq!(QualityProfile { num_colors: 32, block_size: 6, dither: DitherMode::None, mode: QualityMode::Normal }, done.profile);
    assert_eq!((350, 166), (done.working_image.width(), done.working_image.height()));
    assert_eq!((2100, 1000), (done.image.width(), done.image.height()));
    assert_eq!(32, done.palette.len());
}

#[test]
fn single_color_is_exact() {
    let img = Image::from_bytes(&[255u8, 0, 0, 255].repeat(16), 4, 4).unwrap();
    let done = new().process(Request::new(img.clone(), 1, 1, DitherMode::None)).unwrap();
    assert_eq!(&[Color::new(255, 0, 0)], done.palette.as_slice());
    assert_eq!(1, done.iterations);
    assert_eq!(img, done.image);
}

#[test]
fn black_and_white() {
    let img = Image::from_bytes(&[0, 0, 0, 255, 255, 255, 255, 255], 2, 1).unwrap();
    let mut distinct_seeds = 0;
    for seed in 0..20 {
        let mut attr = new();
        attr.set_seed(Some(seed));
        let done = attr.process(Request::new(img.clone(), 2, 1, DitherMode::Floyd)).unwrap();
        let mut colors = done.palette.to_vec();
        colors.sort_by_key(|c| c.r);
        assert_eq!(vec![Color::new(0, 0, 0), Color::new(255, 255, 255)], colors);
        assert_eq!(img, done.image);

        // both pixels are samples, and each initial centroid is one draw from them
        let mut rng = StdRng::seed_from_u64(seed);
        let first = rng.gen_range(0..2usize);
        let second = rng.gen_range(0..2usize);
        if first == second {
            // both start on the same pixel: split off in round 1, settle in round 2, stable in round 3
            assert_eq!(3, done.iterations, "seed {seed}");
        } else {
            distinct_seeds += 1;
            assert_eq!(1, done.iterations, "seed {seed}");
        }
    }
    assert!(distinct_seeds > 0);
}
