//! Fixed catalogue of linear channel combinations used by the disturbance
//! detection pipeline.

use crate::{AnyImage, DenseImage, Error, PixelDataType, PixelNum, Result};

/// Brightness/greenness/wetness coefficients for the seven MODIS land bands
/// in their natural order: red, nir, blue, green, swir3, swir1, swir2
/// (Lobser & Cohen, 2007).
const MODIS_TASSELED_CAP: [[f64; 7]; 3] = [
    [0.4395, 0.5945, 0.2460, 0.3918, 0.3506, 0.2136, 0.2678],
    [-0.4064, 0.5129, -0.2744, -0.2893, 0.4882, -0.0036, -0.4169],
    [0.1147, 0.2489, 0.2408, 0.3132, -0.3122, -0.6416, -0.5087],
];

/// Brightness/greenness/wetness coefficients for the six Landsat reflective
/// bands in their natural order: blue, green, red, nir, swir1, swir2
/// (Crist, 1985, reflectance factors).
const LANDSAT_TASSELED_CAP: [[f64; 6]; 3] = [
    [0.2043, 0.4158, 0.5524, 0.5741, 0.3124, 0.2303],
    [-0.1603, -0.2819, -0.4934, 0.7940, -0.0002, -0.1446],
    [0.0315, 0.2021, 0.3102, 0.1594, -0.6806, -0.6109],
];

/// A channel combination applicable through [`AnyImage::convert_color`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMapping {
    /// 7 MODIS bands to brightness, greenness, wetness.
    ModisTasseledCap,
    /// 6 Landsat bands to brightness, greenness, wetness.
    LandsatTasseledCap,
    /// `(A - B) / (A + B)` from two channels; used for NDVI with (nir, red).
    NormalizedDifference,
    /// Built-up discrimination from (red, nir, swir): the normalised
    /// built-up difference of swir and nir minus the NDVI of nir and red.
    BuildUpIndex,
}

impl ColorMapping {
    pub fn source_channels(self) -> usize {
        match self {
            ColorMapping::ModisTasseledCap => 7,
            ColorMapping::LandsatTasseledCap => 6,
            ColorMapping::NormalizedDifference => 2,
            ColorMapping::BuildUpIndex => 3,
        }
    }

    pub fn result_channels(self) -> usize {
        match self {
            ColorMapping::ModisTasseledCap | ColorMapping::LandsatTasseledCap => 3,
            ColorMapping::NormalizedDifference | ColorMapping::BuildUpIndex => 1,
        }
    }
}

fn normalized_difference(a: f64, b: f64) -> f64 {
    let denominator = a + b;
    if denominator == 0.0 { 0.0 } else { (a - b) / denominator }
}

pub(crate) fn convert_color_typed<T: PixelNum, U: PixelNum>(
    img: &DenseImage<T>,
    mapping: ColorMapping,
    source_channel_order: &[usize],
) -> Result<DenseImage<U>> {
    let needed = mapping.source_channels();
    let order: Vec<usize> = if source_channel_order.is_empty() {
        if img.channels() != needed {
            return Err(Error::ImageType(format!(
                "{mapping:?} needs {needed} source channels, the image has {}",
                img.channels()
            )));
        }
        (0..needed).collect()
    } else {
        // an explicit order may also select the bands from a wider image
        if source_channel_order.len() != needed {
            return Err(Error::InvalidArgument(format!(
                "Source channel order must list all {needed} channels, got {}",
                source_channel_order.len()
            )));
        }
        if source_channel_order.iter().any(|&c| c >= img.channels()) {
            return Err(Error::InvalidArgument(format!(
                "Source channel order {source_channel_order:?} references a channel outside 0..{}",
                img.channels()
            )));
        }
        source_channel_order.to_vec()
    };

    let mut out = DenseImage::<U>::zeros(img.width(), img.height(), mapping.result_channels())?;
    let mut bands = vec![0.0f64; needed];
    for y in 0..img.height() {
        for x in 0..img.width() {
            for (slot, &src) in order.iter().enumerate() {
                bands[slot] = img.at(x, y, src).as_f64();
            }
            match mapping {
                ColorMapping::ModisTasseledCap => {
                    for (component, row) in MODIS_TASSELED_CAP.iter().enumerate() {
                        let v = row.iter().zip(bands.iter()).map(|(k, b)| k * b).sum::<f64>();
                        out.set(x, y, component, U::from_f64_clamped(v));
                    }
                }
                ColorMapping::LandsatTasseledCap => {
                    for (component, row) in LANDSAT_TASSELED_CAP.iter().enumerate() {
                        let v = row.iter().zip(bands.iter()).map(|(k, b)| k * b).sum::<f64>();
                        out.set(x, y, component, U::from_f64_clamped(v));
                    }
                }
                ColorMapping::NormalizedDifference => {
                    out.set(x, y, 0, U::from_f64_clamped(normalized_difference(bands[0], bands[1])));
                }
                ColorMapping::BuildUpIndex => {
                    let (red, nir, swir) = (bands[0], bands[1], bands[2]);
                    let ndbi = normalized_difference(swir, nir);
                    let ndvi = normalized_difference(nir, red);
                    out.set(x, y, 0, U::from_f64_clamped(ndbi - ndvi));
                }
            }
        }
    }
    Ok(out)
}

impl AnyImage {
    /// Applies one of the fixed channel combinations, producing an image of
    /// the requested floating point element type.
    pub fn convert_color(&self, mapping: ColorMapping, result_type: PixelDataType, source_channel_order: &[usize]) -> Result<AnyImage> {
        if !result_type.is_float() {
            return Err(Error::ImageType(format!(
                "Color conversion results are floating point, {result_type} was requested"
            )));
        }

        macro_rules! convert {
            ( $img:expr ) => {
                match result_type {
                    PixelDataType::Float32 => Ok(AnyImage::F32(convert_color_typed($img, mapping, source_channel_order)?)),
                    _ => Ok(AnyImage::F64(convert_color_typed($img, mapping, source_channel_order)?)),
                }
            };
        }

        match self {
            AnyImage::U8(img) => convert!(img),
            AnyImage::I8(img) => convert!(img),
            AnyImage::U16(img) => convert!(img),
            AnyImage::I16(img) => convert!(img),
            AnyImage::U32(img) => convert!(img),
            AnyImage::I32(img) => convert!(img),
            AnyImage::F32(img) => convert!(img),
            AnyImage::F64(img) => convert!(img),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndvi_from_reordered_channels() {
        // channels laid out as (red, nir); NDVI needs (nir, red)
        let img = DenseImage::<u16>::from_vec(2, 1, 2, vec![25, 75, 50, 50]).unwrap();
        let ndvi: DenseImage<f32> = convert_color_typed(&img, ColorMapping::NormalizedDifference, &[1, 0]).unwrap();
        assert!((ndvi.at(0, 0, 0) - 0.5).abs() < 1e-6);
        assert!((ndvi.at(1, 0, 0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn ndvi_zero_denominator() {
        let img = DenseImage::<i16>::from_vec(1, 1, 2, vec![0, 0]).unwrap();
        let ndvi: DenseImage<f64> = convert_color_typed(&img, ColorMapping::NormalizedDifference, &[]).unwrap();
        assert_eq!(ndvi.at(0, 0, 0), 0.0);
    }

    #[test]
    fn landsat_tasseled_cap_brightness_of_unit_bands() {
        let img = DenseImage::<f32>::from_vec(1, 1, 6, vec![1.0; 6]).unwrap();
        let tc: DenseImage<f32> = convert_color_typed(&img, ColorMapping::LandsatTasseledCap, &[]).unwrap();
        let expected: f64 = LANDSAT_TASSELED_CAP[0].iter().sum();
        assert!((tc.at(0, 0, 0) as f64 - expected).abs() < 1e-6);
        assert_eq!(tc.channels(), 3);
    }

    #[test]
    fn channel_count_is_validated() {
        let img = AnyImage::U8(DenseImage::zeros(1, 1, 5).unwrap());
        assert!(img.convert_color(ColorMapping::ModisTasseledCap, PixelDataType::Float32, &[]).is_err());
        let img = AnyImage::U8(DenseImage::zeros(1, 1, 7).unwrap());
        assert!(img.convert_color(ColorMapping::ModisTasseledCap, PixelDataType::Float32, &[]).is_ok());
        assert!(img.convert_color(ColorMapping::ModisTasseledCap, PixelDataType::Int16, &[]).is_err());
    }

    #[test]
    fn build_up_index_sign() {
        // bare swir-heavy pixel scores positive, vegetated nir-heavy negative
        let img = DenseImage::<f32>::from_vec(2, 1, 3, vec![10.0, 20.0, 80.0, 10.0, 80.0, 20.0]).unwrap();
        let bu: DenseImage<f32> = convert_color_typed(&img, ColorMapping::BuildUpIndex, &[]).unwrap();
        assert!(bu.at(0, 0, 0) > 0.0);
        assert!(bu.at(1, 0, 0) < 0.0);
    }
}
