//! End-to-end prediction scenarios over tiny rasters with hand-computed
//! expectations.

use std::sync::Arc;

use fusion::{StarfmFusor, StarfmOptions};
use raster::{AnyImage, DenseImage, ImageCollection, Interval, IntervalSet, Mask, Rect};

fn single_channel<T: raster::PixelNum>(values: Vec<T>) -> DenseImage<T> {
    let width = values.len();
    DenseImage::from_vec(width, 1, 1, values).unwrap()
}

/// Two pairs bracketing the prediction date, low resolution exactly halfway:
/// the prediction lands on the halfway high resolution values.
#[test]
fn two_pair_interpolation() {
    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::U8(single_channel::<u8>(vec![0, 10, 50])));
    col.set("high", 3, AnyImage::U8(single_channel::<u8>(vec![20, 50, 150])));
    col.set("low", 1, AnyImage::U8(single_channel::<u8>(vec![0, 10, 50])));
    col.set("low", 3, AnyImage::U8(single_channel::<u8>(vec![20, 50, 150])));
    col.set("low", 2, AnyImage::U8(single_channel::<u8>(vec![10, 30, 100])));

    let mut opt = StarfmOptions::default();
    opt.set_double_pair_dates(1, 3).unwrap();

    let mut fusor = StarfmFusor::new(Arc::new(col), opt).unwrap();
    fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
    let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

    assert_eq!(out.as_slice(), &[10, 30, 100]);
    assert_eq!(out.size(), (3, 1));
    assert_eq!(out.channels(), 1);
}

/// The same inputs with a "do not interpolate" prediction mask at position
/// 0: the skipped position carries the low resolution value of the
/// prediction date, the others are unchanged.
#[test]
fn prediction_mask_skips_positions() {
    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::U8(single_channel::<u8>(vec![0, 10, 50])));
    col.set("high", 3, AnyImage::U8(single_channel::<u8>(vec![20, 50, 150])));
    col.set("low", 1, AnyImage::U8(single_channel::<u8>(vec![0, 10, 50])));
    col.set("low", 3, AnyImage::U8(single_channel::<u8>(vec![20, 50, 150])));
    col.set("low", 2, AnyImage::U8(single_channel::<u8>(vec![10, 30, 100])));

    let mut opt = StarfmOptions::default();
    opt.set_double_pair_dates(1, 3).unwrap();

    let pred = Mask::from_vec(3, 1, 1, vec![0, 255, 255]).unwrap();
    let mut fusor = StarfmFusor::new(Arc::new(col), opt).unwrap();
    fusor.predict(2, &Mask::none(), &pred).unwrap();
    let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

    assert_eq!(out.at(0, 0, 0), 10); // the low resolution value
    assert_eq!(out.at(1, 0, 0), 30);
    assert_eq!(out.at(2, 0, 0), 100);
}

/// Signed byte inputs with a nodata sentinel (-100) and a cloud value (-50)
/// that stays valid. The validity mask is synthesised from the punctured
/// range [-127, -100) u (-100, 127]. With the uncertainty slack removed no
/// candidate qualifies anywhere and every valid pixel falls back to the
/// local estimates.
#[test]
fn sentinel_masking_and_fallback() {
    let h1: Vec<i8> = vec![10, 20, 30, 40, 50];
    let l1: Vec<i8> = vec![10, 20, 30, 40, 50];
    let l2: Vec<i8> = vec![12, 22, -100, 42, -50];
    let h5: Vec<i8> = vec![20, 30, 40, 50, 60];
    let l5: Vec<i8> = vec![20, 30, 40, 45, 60];

    let mut valid_set = IntervalSet::from(Interval::right_open(-127.0, -100.0));
    valid_set.insert(Interval::left_open(-100.0, 127.0));
    let l2_img = single_channel::<i8>(l2.clone());
    let valid = l2_img.create_single_channel_mask_from_range(&[valid_set]).unwrap();
    assert_eq!(valid.as_slice(), &[255, 255, 0, 255, 255]);

    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::I8(single_channel(h1)));
    col.set("low", 1, AnyImage::I8(single_channel(l1)));
    col.set("low", 2, AnyImage::I8(l2_img));
    col.set("high", 5, AnyImage::I8(single_channel(h5)));
    col.set("low", 5, AnyImage::I8(single_channel(l5)));
    let col = Arc::new(col);

    let mut opt = StarfmOptions::default();
    opt.set_double_pair_dates(1, 5).unwrap();
    opt.set_window_size(3).unwrap();
    opt.set_temporal_uncertainty(0.0).unwrap();
    opt.set_spectral_uncertainty(0.0).unwrap();

    let mut fusor = StarfmFusor::new(col.clone(), opt.clone()).unwrap();
    fusor.predict(2, &valid, &Mask::none()).unwrap();
    let out: DenseImage<i8> = fusor.into_output().unwrap().try_into().unwrap();

    // both local estimates averaged; the masked pixel keeps the sentinel
    assert_eq!(out.as_slice(), &[12, 22, -100, 45, -50]);

    // copying on zero central difference prefers the pair with the smaller
    // central magnitudes, which carries the left local estimate at x = 3
    opt.set_copy_on_zero_diff(true);
    let mut fusor = StarfmFusor::new(col, opt).unwrap();
    fusor.predict(2, &valid, &Mask::none()).unwrap();
    let out: DenseImage<i8> = fusor.into_output().unwrap().try_into().unwrap();
    assert_eq!(out.as_slice(), &[12, 22, -100, 42, -50]);
}

/// A multi-channel validity mask gates candidates per channel: a neighbour
/// that is invalid in one channel still contributes in the other.
#[test]
fn per_channel_validity_independence() {
    let mut h1 = DenseImage::<i16>::zeros(3, 1, 2).unwrap();
    let mut l1 = DenseImage::<i16>::zeros(3, 1, 2).unwrap();
    let mut l2 = DenseImage::<i16>::zeros(3, 1, 2).unwrap();
    for c in 0..2 {
        for (x, v) in [100, 100, 100].into_iter().enumerate() {
            h1.set(x, 0, c, v);
        }
        for (x, v) in [100, 90, 100].into_iter().enumerate() {
            l1.set(x, 0, c, v);
        }
        for (x, v) in [110, 80, 110].into_iter().enumerate() {
            l2.set(x, 0, c, v);
        }
    }

    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::I16(h1));
    col.set("low", 1, AnyImage::I16(l1));
    col.set("low", 2, AnyImage::I16(l2));

    // channel 0 loses the left neighbour, channel 1 sees all three pixels
    let valid = Mask::from_vec(3, 1, 2, vec![0, 255, 255, 255, 255, 255]).unwrap();
    let pred = Mask::from_vec(3, 1, 1, vec![0, 255, 0]).unwrap();

    let mut opt = StarfmOptions::default();
    opt.set_single_pair_date(1);
    opt.set_window_size(3).unwrap();

    let mut fusor = StarfmFusor::new(Arc::new(col), opt).unwrap();
    fusor.predict(2, &valid, &pred).unwrap();
    let out: DenseImage<i16> = fusor.into_output().unwrap().try_into().unwrap();

    // channel 0 averages the centre and right candidates, channel 1
    // additionally includes the left neighbour
    assert_eq!(out.at(1, 0, 0), 100);
    assert_eq!(out.at(1, 0, 1), 103);
}

/// Turning validity off for a pixel leaves far-away predictions untouched
/// and never changes a skipped position.
#[test]
fn validity_shrink_only_affects_windows_that_saw_the_pixel() {
    let h1: Vec<u8> = vec![10, 10, 10, 10, 10, 10];
    let l1: Vec<u8> = vec![12, 14, 12, 14, 12, 14];
    let l2: Vec<u8> = vec![20, 26, 24, 22, 26, 20];

    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::U8(single_channel(h1)));
    col.set("low", 1, AnyImage::U8(single_channel(l1)));
    col.set("low", 2, AnyImage::U8(single_channel(l2)));
    let col = Arc::new(col);

    let mut opt = StarfmOptions::default();
    opt.set_single_pair_date(1);
    opt.set_window_size(3).unwrap();

    let mut fusor = StarfmFusor::new(col.clone(), opt.clone()).unwrap();
    fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
    let full: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

    let mut shrunk = Mask::all_valid(6, 1);
    shrunk.set(0, 0, 0, 0);
    let mut fusor = StarfmFusor::new(col, opt).unwrap();
    fusor.predict(2, &shrunk, &Mask::none()).unwrap();
    let masked: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

    // windows beyond x = 1 never contained the masked pixel
    for x in 2..6 {
        assert_eq!(full.at(x, 0, 0), masked.at(x, 0, 0), "pixel {x} changed");
    }
    // the masked position itself is no longer predicted
    assert_eq!(masked.at(0, 0, 0), 20);
}

/// The output raster keeps the extent, channel count and element type of the
/// high resolution reference, also when predicting a sub-rectangle.
#[test]
fn extent_and_type_preservation() {
    let mut col = ImageCollection::new();
    col.set("high", 1, AnyImage::I16(DenseImage::filled_with(7, 5, 4, 2).unwrap()));
    col.set("low", 1, AnyImage::I16(DenseImage::filled_with(9, 5, 4, 2).unwrap()));
    col.set("low", 2, AnyImage::I16(DenseImage::filled_with(11, 5, 4, 2).unwrap()));

    let mut opt = StarfmOptions::default();
    opt.set_single_pair_date(1);
    opt.set_window_size(3).unwrap();
    opt.set_prediction_area(Some(Rect::new(1, 1, 3, 2)));

    let mut fusor = StarfmFusor::new(Arc::new(col), opt).unwrap();
    fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
    let out = fusor.into_output().unwrap();

    assert_eq!(out.size(), (5, 4));
    assert_eq!(out.channels(), 2);
    assert_eq!(out.data_type(), raster::PixelDataType::Int16);
}
