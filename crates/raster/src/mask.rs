//! Mask synthesis from value ranges and bit patterns.
//!
//! A mask is an 8-bit image whose values are exactly 0 (invalid) or 255
//! (valid), either single-channel (applying to every channel of the image it
//! masks) or matching the channel count of that image. The empty image stands
//! for "no mask" and allows everything.

use crate::{DenseImage, Error, IntervalSet, Mask, PixelInt, PixelNum, Result};

/// Whether the mask allows channel `c` of pixel (x, y). Empty masks allow
/// everything; single-channel masks broadcast across channels.
#[inline]
pub fn allows(mask: &Mask, x: usize, y: usize, c: usize) -> bool {
    if mask.is_empty() {
        return true;
    }
    let mc = if mask.channels() == 1 { 0 } else { c };
    mask.at(x, y, mc) != 0
}

/// Validates that a mask fits an image of the given geometry: equal extent
/// and either one channel or the image's channel count.
pub fn check_compatibility(width: usize, height: usize, channels: usize, mask: &Mask) -> Result<()> {
    if mask.is_empty() {
        return Ok(());
    }
    if mask.size() != (width, height) {
        return Err(Error::size_mismatch("mask", (width, height), mask.size()));
    }
    if mask.channels() != 1 && mask.channels() != channels {
        return Err(Error::ImageType(format!(
            "Mask has {} channels, expected 1 or {}",
            mask.channels(),
            channels
        )));
    }
    Ok(())
}

/// Combines two masks with AND. Empty operands count as all-valid, so the
/// other operand is returned unchanged.
pub fn and(a: &Mask, b: &Mask) -> Result<Mask> {
    if a.is_empty() {
        return Ok(b.clone());
    }
    if b.is_empty() {
        return Ok(a.clone());
    }
    a.bitwise_and(b, &Mask::none())
}

/// Combines two masks with OR. An empty operand means all-valid, which
/// absorbs the other operand.
pub fn or(a: &Mask, b: &Mask) -> Result<Mask> {
    if a.is_empty() || b.is_empty() {
        return Ok(Mask::none());
    }
    a.bitwise_or(b, &Mask::none())
}

pub fn not(a: &Mask) -> Result<Mask> {
    a.bitwise_not(&Mask::none())
}

fn range_for_channel<'a>(sets: &'a [IntervalSet], channels: usize, c: usize) -> Result<&'a IntervalSet> {
    match sets.len() {
        1 => Ok(&sets[0]),
        n if n == channels => Ok(&sets[c]),
        n => Err(Error::InvalidArgument(format!(
            "Expected one valid range set or one per channel ({channels}), got {n}"
        ))),
    }
}

impl<T: PixelNum> DenseImage<T> {
    #[inline]
    fn value_in_set(v: T, set: &IntervalSet) -> bool {
        if T::TYPE.is_float() {
            set.contains_float(v.as_f64())
        } else {
            set.contains_int(v.as_f64())
        }
    }

    /// Single-channel mask: a pixel maps to 255 iff the value of every
    /// channel lies in its corresponding set.
    pub fn create_single_channel_mask_from_range(&self, sets: &[IntervalSet]) -> Result<Mask> {
        range_for_channel(sets, self.channels(), 0)?;

        let mut mask = DenseImage::zeros(self.width(), self.height(), 1)?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let valid = (0..self.channels()).all(|c| {
                    let set = range_for_channel(sets, self.channels(), c).expect("set count was validated");
                    Self::value_in_set(self.at(x, y, c), set)
                });
                if valid {
                    mask.set(x, y, 0, 255);
                }
            }
        }
        Ok(mask)
    }

    /// Multi-channel mask: each channel is tested against its own set.
    pub fn create_multi_channel_mask_from_range(&self, sets: &[IntervalSet]) -> Result<Mask> {
        range_for_channel(sets, self.channels(), 0)?;

        let mut mask = DenseImage::zeros(self.width(), self.height(), self.channels())?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                for c in 0..self.channels() {
                    let set = range_for_channel(sets, self.channels(), c).expect("set count was validated");
                    if Self::value_in_set(self.at(x, y, c), set) {
                        mask.set(x, y, c, 255);
                    }
                }
            }
        }
        Ok(mask)
    }
}

impl<T: PixelInt> DenseImage<T> {
    /// Mask from a bit pattern: the listed bits are extracted from each
    /// value, packed into least-significant contiguous positions in list
    /// order, and the packed number is tested against the set.
    pub fn create_mask_from_bits(&self, bits: &[i32], set: &IntervalSet) -> Result<Mask> {
        if bits.is_empty() {
            return Err(Error::InvalidArgument("At least one bit position is required".to_string()));
        }
        for &b in bits {
            if b < 0 || b as u32 >= T::BITS {
                return Err(Error::InvalidArgument(format!(
                    "Bit position {b} is outside the element width of {} bits",
                    T::BITS
                )));
            }
        }

        let mut mask = DenseImage::zeros(self.width(), self.height(), self.channels())?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                for c in 0..self.channels() {
                    let v = self.at(x, y, c);
                    let mut packed: i64 = 0;
                    for (i, &b) in bits.iter().enumerate() {
                        packed |= (v.extract_bit(b as u32) as i64) << i;
                    }
                    if set.contains_int(packed as f64) {
                        mask.set(x, y, c, 255);
                    }
                }
            }
        }
        Ok(mask)
    }
}
