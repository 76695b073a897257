//! The striped executor must reproduce a single-worker run pixel for pixel:
//! every window only depends on the input images, never on stripe placement.

use std::sync::Arc;

use fusion::{Algorithm, Parallelizer, ParallelizerOptions, StarfmFusor, StarfmOptions};
use raster::{AnyImage, DenseImage, ImageCollection, Mask};
use test_log::test;

const SIZE: usize = 64;

/// Small deterministic congruential generator for reproducible pixel noise.
fn noise(seed: &mut u32) -> u8 {
    *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    (*seed >> 24) as u8
}

fn collection() -> Arc<ImageCollection> {
    let mut seed = 42u32;
    let mut high1 = DenseImage::<u8>::zeros(SIZE, SIZE, 1).unwrap();
    let mut low1 = DenseImage::<u8>::zeros(SIZE, SIZE, 1).unwrap();
    let mut low2 = DenseImage::<u8>::zeros(SIZE, SIZE, 1).unwrap();
    for y in 0..SIZE {
        for x in 0..SIZE {
            let base = noise(&mut seed) / 2;
            high1.set(x, y, 0, base);
            low1.set(x, y, 0, base.saturating_add(noise(&mut seed) % 16));
            low2.set(x, y, 0, base.saturating_add(noise(&mut seed) % 32));
        }
    }

    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::U8(high1));
    col.set("low", 1, AnyImage::U8(low1));
    col.set("low", 2, AnyImage::U8(low2));
    Arc::new(col)
}

fn starfm_options() -> StarfmOptions {
    let mut opt = StarfmOptions::default();
    opt.set_single_pair_date(1);
    opt.set_window_size(11).unwrap();
    opt
}

#[test]
fn four_workers_match_one_worker() {
    let imgs = collection();

    let run = |threads: usize| {
        let mut par_opt = ParallelizerOptions::default();
        par_opt.set_number_threads(threads);
        let parallelizer = Parallelizer::new(par_opt);
        parallelizer
            .predict(&Algorithm::Starfm(starfm_options()), &imgs, 2, &Mask::none(), &Mask::none())
            .unwrap()
    };

    let serial: DenseImage<u8> = run(1).try_into().unwrap();
    let parallel: DenseImage<u8> = run(4).try_into().unwrap();
    assert_eq!(serial.as_slice(), parallel.as_slice());
}

#[test]
fn striped_run_matches_a_direct_prediction() {
    let imgs = collection();

    let mut par_opt = ParallelizerOptions::default();
    par_opt.set_number_threads(3);
    let parallelizer = Parallelizer::new(par_opt);
    let striped: DenseImage<u8> = parallelizer
        .predict(&Algorithm::Starfm(starfm_options()), &imgs, 2, &Mask::none(), &Mask::none())
        .unwrap()
        .try_into()
        .unwrap();

    let mut fusor = StarfmFusor::new(imgs, starfm_options()).unwrap();
    fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
    let direct: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

    assert_eq!(striped.as_slice(), direct.as_slice());
}
