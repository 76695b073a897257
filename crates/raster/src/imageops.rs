//! Element-wise arithmetic and per-channel statistics on [`DenseImage`].
//!
//! Binary operations validate the geometry of both operands. The optional
//! mask gates which locations are updated; forbidden locations keep the left
//! operand's value. Integer arithmetic saturates.

use std::collections::BTreeSet;

use crate::{DenseImage, Mask, PixelInt, PixelNum, Result, mask};

impl<T: PixelNum> DenseImage<T> {
    fn binary_masked(&self, other: &Self, mask: &Mask, what: &str, op: impl Fn(T, T) -> T) -> Result<Self> {
        self.check_same_geometry(other, what)?;
        if !mask.is_empty() {
            mask::check_compatibility(self.width(), self.height(), self.channels(), mask)?;
        }

        let mut result = self.clone();
        let channels = self.channels();
        for y in 0..self.height() {
            for x in 0..self.width() {
                for c in 0..channels {
                    if mask::allows(mask, x, y, c) {
                        result.set(x, y, c, op(self.at(x, y, c), other.at(x, y, c)));
                    }
                }
            }
        }
        Ok(result)
    }

    fn unary_masked(&self, mask: &Mask, op: impl Fn(T) -> T) -> Result<Self> {
        if !mask.is_empty() {
            mask::check_compatibility(self.width(), self.height(), self.channels(), mask)?;
        }

        let mut result = self.clone();
        let channels = self.channels();
        for y in 0..self.height() {
            for x in 0..self.width() {
                for c in 0..channels {
                    if mask::allows(mask, x, y, c) {
                        result.set(x, y, c, op(self.at(x, y, c)));
                    }
                }
            }
        }
        Ok(result)
    }

    pub fn add(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "add", |a, b| a.sat_add(b))
    }

    pub fn subtract(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "subtract", |a, b| a.sat_sub(b))
    }

    pub fn multiply(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "multiply", |a, b| a.sat_mul(b))
    }

    pub fn minimum(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "minimum", |a, b| a.min_value(b))
    }

    pub fn maximum(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "maximum", |a, b| a.max_value(b))
    }

    pub fn abs(&self, mask: &Mask) -> Result<Self> {
        self.unary_masked(mask, |a| a.sat_abs())
    }

    /// Per-channel mean and population standard deviation over the locations
    /// the mask allows. Channels without any allowed location yield
    /// `(NaN, NaN)`.
    pub fn mean_stddev(&self, mask: &Mask) -> Result<Vec<(f64, f64)>> {
        if !mask.is_empty() {
            mask::check_compatibility(self.width(), self.height(), self.channels(), mask)?;
        }

        let channels = self.channels();
        let mut sums = vec![0.0f64; channels];
        let mut squares = vec![0.0f64; channels];
        let mut counts = vec![0usize; channels];

        for y in 0..self.height() {
            for x in 0..self.width() {
                for c in 0..channels {
                    if mask::allows(mask, x, y, c) {
                        let v = self.at(x, y, c).as_f64();
                        sums[c] += v;
                        squares[c] += v * v;
                        counts[c] += 1;
                    }
                }
            }
        }

        Ok((0..channels)
            .map(|c| {
                if counts[c] == 0 {
                    return (f64::NAN, f64::NAN);
                }
                let n = counts[c] as f64;
                let mean = sums[c] / n;
                let variance = (squares[c] / n - mean * mean).max(0.0);
                (mean, variance.sqrt())
            })
            .collect())
    }
}

impl<T: PixelInt> DenseImage<T> {
    pub fn bitwise_and(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "bitwise_and", |a, b| a.bit_and(b))
    }

    pub fn bitwise_or(&self, other: &Self, mask: &Mask) -> Result<Self> {
        self.binary_masked(other, mask, "bitwise_or", |a, b| a.bit_or(b))
    }

    pub fn bitwise_not(&self, mask: &Mask) -> Result<Self> {
        self.unary_masked(mask, |a| a.bit_not())
    }

    /// Sorted distinct values, available for integer element types only.
    pub fn unique(&self) -> Vec<T> {
        let set: BTreeSet<T> = self.as_slice().iter().copied().collect();
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn saturating_add_with_promotion_left_to_caller() {
        let a = DenseImage::<u8>::from_vec(2, 1, 1, vec![250, 1]).unwrap();
        let b = DenseImage::<u8>::from_vec(2, 1, 1, vec![10, 2]).unwrap();
        let sum = a.add(&b, &Mask::none()).unwrap();
        assert_eq!(sum.as_slice(), &[255, 3]);
    }

    #[test]
    fn masked_minimum_keeps_forbidden_pixels() {
        let a = DenseImage::<f32>::from_vec(2, 1, 1, vec![5.0, 5.0]).unwrap();
        let b = DenseImage::<f32>::from_vec(2, 1, 1, vec![1.0, 1.0]).unwrap();
        let m = DenseImage::from_vec(2, 1, 1, vec![0, 255]).unwrap();
        let out = a.minimum(&b, &m).unwrap();
        assert_eq!(out.as_slice(), &[5.0, 1.0]);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let a = DenseImage::<u8>::zeros(2, 2, 1).unwrap();
        let b = DenseImage::<u8>::zeros(2, 3, 1).unwrap();
        assert!(matches!(a.add(&b, &Mask::none()), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn channel_mismatch_is_an_image_type_error() {
        let a = DenseImage::<u8>::zeros(2, 2, 2).unwrap();
        let b = DenseImage::<u8>::zeros(2, 2, 1).unwrap();
        assert!(matches!(a.add(&b, &Mask::none()), Err(Error::ImageType(_))));
    }

    #[test]
    fn mean_stddev_population() {
        let img = DenseImage::<f64>::from_vec(3, 2, 1, vec![3.0, 1.0, 4.0, 7.0, 1.0, 2.0]).unwrap();
        let stats = img.mean_stddev(&Mask::none()).unwrap();
        assert_eq!(stats.len(), 1);
        let (mean, stddev) = stats[0];
        assert!((mean - 3.0).abs() < 1e-12);
        // population variance of [3,1,4,7,1,2] around 3 is 26/6
        assert!((stddev - (26.0f64 / 6.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mean_stddev_fully_masked_channel_is_nan() {
        let img = DenseImage::<u8>::from_vec(2, 1, 2, vec![1, 9, 2, 9]).unwrap();
        let mask = DenseImage::from_vec(2, 1, 2, vec![255, 0, 255, 0]).unwrap();
        let stats = img.mean_stddev(&mask).unwrap();
        assert!((stats[0].0 - 1.5).abs() < 1e-12);
        assert!(stats[1].0.is_nan() && stats[1].1.is_nan());
    }

    #[test]
    fn abs_saturates_on_signed_minimum() {
        let img = DenseImage::<i8>::from_vec(3, 1, 1, vec![-128, -4, 3]).unwrap();
        let out = img.abs(&Mask::none()).unwrap();
        assert_eq!(out.as_slice(), &[127, 4, 3]);
    }

    #[test]
    fn bitwise_roundtrip() {
        let a = DenseImage::<u8>::from_vec(2, 1, 1, vec![0b1100, 0xFF]).unwrap();
        let b = DenseImage::<u8>::from_vec(2, 1, 1, vec![0b1010, 0x0F]).unwrap();
        assert_eq!(a.bitwise_and(&b, &Mask::none()).unwrap().as_slice(), &[0b1000, 0x0F]);
        assert_eq!(a.bitwise_or(&b, &Mask::none()).unwrap().as_slice(), &[0b1110, 0xFF]);
        assert_eq!(a.bitwise_not(&Mask::none()).unwrap().as_slice(), &[0xF3, 0x00]);
    }

    #[test]
    fn unique_is_sorted() {
        let img = DenseImage::<i32>::from_vec(3, 2, 1, vec![5, -1, 5, 0, -1, 7]).unwrap();
        assert_eq!(img.unique(), vec![-1, 0, 5, 7]);
    }
}
