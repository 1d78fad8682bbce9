#![feature(test)]

extern crate test;
use test::Bencher;

use pixquant::*;

fn noise(width: usize, height: usize) -> Image {
    let px: Vec<_> = (0..(width * height) as u32).map(|i| {
        let h = i.wrapping_mul(2_654_435_761);
        RGBA::new((h >> 24) as u8, (h >> 16) as u8, (i / 7) as u8, 255)
    }).collect();
    Image::new(px, width, height).unwrap()
}

#[bench]
fn downsample(b: &mut Bencher) {
    let img = noise(1024, 768);
    b.iter(|| img.downsampled(4).unwrap());
}

#[bench]
fn remap_ord(b: &mut Bencher) {
    let img = noise(512, 512);
    let mut liq = Attributes::new();
    liq.set_seed(Some(1));
    let res = liq.quantize(&img, 64).unwrap();
    b.iter(|| res.remapped(&img).unwrap());
}

#[bench]
fn remap_floyd(b: &mut Bencher) {
    let img = noise(512, 512);
    let mut liq = Attributes::new();
    liq.set_seed(Some(1));
    let mut res = liq.quantize(&img, 64).unwrap();
    res.set_dither_mode(DitherMode::Floyd);
    b.iter(|| res.remapped(&img).unwrap());
}

#[bench]
fn kmeans(b: &mut Bencher) {
    b.iter(_unstable_internal_kmeans_bench());
}

#[bench]
fn process_pixelated(b: &mut Bencher) {
    let img = noise(800, 600);
    let mut liq = Attributes::new();
    liq.set_seed(Some(1));
    b.iter(|| liq.process(Request::new(img.clone(), 32, 4, DitherMode::Stucki)).unwrap());
}
