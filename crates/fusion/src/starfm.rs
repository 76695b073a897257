//! The spatio-temporal adaptive reflectance estimator.
//!
//! One or two reference pairs of co-registered high and low resolution images
//! bracket a prediction date for which only a low resolution image exists.
//! Every output pixel is estimated from similar pixels inside a square search
//! window, weighted by their spectral difference, temporal difference and
//! distance to the window centre.

use std::sync::Arc;

use log::debug;
use raster::{AnyImage, DenseImage, Error, ImageCollection, Mask, PixelDataType, PixelNum, Rect, Result, mask};

/// Whether the temporal difference participates in candidate weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempDiffWeighting {
    /// Use the temporal difference in double pair mode only.
    #[default]
    OnDoublePair,
    Enable,
    Disable,
}

/// Reference pair configuration: one pair or two pairs bracketing the
/// prediction date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairDates {
    Single(i32),
    Double(i32, i32),
}

impl PairDates {
    pub fn dates(&self) -> Vec<i32> {
        match *self {
            PairDates::Single(d) => vec![d],
            PairDates::Double(d1, d3) => vec![d1, d3],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StarfmOptions {
    pair_dates: Option<PairDates>,
    high_res_tag: String,
    low_res_tag: String,
    window_size: u32,
    number_classes: f64,
    temporal_uncertainty: Option<f64>,
    spectral_uncertainty: Option<f64>,
    use_strict_filtering: bool,
    copy_on_zero_diff: bool,
    temp_diff_weighting: TempDiffWeighting,
    log_scale_factor: f64,
    prediction_area: Option<Rect>,
}

impl Default for StarfmOptions {
    fn default() -> Self {
        StarfmOptions {
            pair_dates: None,
            high_res_tag: "high".to_string(),
            low_res_tag: "low".to_string(),
            window_size: 51,
            number_classes: 40.0,
            temporal_uncertainty: None,
            spectral_uncertainty: None,
            use_strict_filtering: false,
            copy_on_zero_diff: false,
            temp_diff_weighting: TempDiffWeighting::default(),
            log_scale_factor: 0.0,
            prediction_area: None,
        }
    }
}

impl StarfmOptions {
    pub fn set_single_pair_date(&mut self, date: i32) {
        self.pair_dates = Some(PairDates::Single(date));
    }

    pub fn set_double_pair_dates(&mut self, d1: i32, d3: i32) -> Result {
        if d1 == d3 {
            return Err(Error::InvalidArgument(format!(
                "Double pair mode needs two different dates, got {d1} for both pairs"
            )));
        }
        self.pair_dates = Some(PairDates::Double(d1, d3));
        Ok(())
    }

    pub fn pair_dates(&self) -> Result<PairDates> {
        self.pair_dates
            .ok_or_else(|| Error::InvalidArgument("No reference pair dates have been set".to_string()))
    }

    pub fn set_high_res_tag(&mut self, tag: &str) {
        self.high_res_tag = tag.to_string();
    }

    pub fn high_res_tag(&self) -> &str {
        &self.high_res_tag
    }

    pub fn set_low_res_tag(&mut self, tag: &str) {
        self.low_res_tag = tag.to_string();
    }

    pub fn low_res_tag(&self) -> &str {
        &self.low_res_tag
    }

    /// Side length of the square search window. Must be odd; the default of
    /// 51 searches 25 pixels in every direction around the centre.
    pub fn set_window_size(&mut self, size: u32) -> Result {
        if size % 2 == 0 {
            return Err(Error::InvalidArgument(format!("The window size must be odd, got {size}")));
        }
        self.window_size = size;
        Ok(())
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// The class count n in the similarity tolerance 2 sigma / n.
    pub fn set_number_classes(&mut self, classes: f64) -> Result {
        if !(classes > 0.0) {
            return Err(Error::InvalidArgument(format!("The number of classes must be positive, got {classes}")));
        }
        self.number_classes = classes;
        Ok(())
    }

    pub fn number_classes(&self) -> f64 {
        self.number_classes
    }

    pub fn set_temporal_uncertainty(&mut self, sigma: f64) -> Result {
        if sigma < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "The temporal uncertainty must be non-negative, got {sigma}"
            )));
        }
        self.temporal_uncertainty = Some(sigma);
        Ok(())
    }

    pub fn set_spectral_uncertainty(&mut self, sigma: f64) -> Result {
        if sigma < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "The spectral uncertainty must be non-negative, got {sigma}"
            )));
        }
        self.spectral_uncertainty = Some(sigma);
        Ok(())
    }

    /// The uncertainties default to 1 for 8-bit images and 50 for wider
    /// element types, matching the data ranges those types usually carry.
    pub fn resolved_uncertainties(&self, data_type: PixelDataType) -> (f64, f64) {
        let default = if data_type.bits() <= 8 { 1.0 } else { 50.0 };
        (
            self.temporal_uncertainty.unwrap_or(default),
            self.spectral_uncertainty.unwrap_or(default),
        )
    }

    pub fn set_use_strict_filtering(&mut self, strict: bool) {
        self.use_strict_filtering = strict;
    }

    pub fn use_strict_filtering(&self) -> bool {
        self.use_strict_filtering
    }

    pub fn set_copy_on_zero_diff(&mut self, copy: bool) {
        self.copy_on_zero_diff = copy;
    }

    pub fn copy_on_zero_diff(&self) -> bool {
        self.copy_on_zero_diff
    }

    pub fn set_temp_diff_weighting(&mut self, weighting: TempDiffWeighting) {
        self.temp_diff_weighting = weighting;
    }

    pub fn temp_diff_weighting(&self) -> TempDiffWeighting {
        self.temp_diff_weighting
    }

    /// Logarithmic weighting scale. Zero keeps the linear `(S + 1) (T + 1)`
    /// composite; a positive factor b switches to `ln(S b + 2) ln(T b + 2)`.
    pub fn set_log_scale_factor(&mut self, b: f64) -> Result {
        if b < 0.0 {
            return Err(Error::InvalidArgument(format!("The log scale factor cannot be negative, got {b}")));
        }
        self.log_scale_factor = b;
        Ok(())
    }

    pub fn log_scale_factor(&self) -> f64 {
        self.log_scale_factor
    }

    /// Restricts prediction to a rectangle. `None` predicts the full extent.
    pub fn set_prediction_area(&mut self, area: Option<Rect>) {
        self.prediction_area = area;
    }

    pub fn prediction_area(&self) -> Option<Rect> {
        self.prediction_area
    }
}

/// The STARFM estimator over a shared image collection.
pub struct StarfmFusor {
    imgs: Arc<ImageCollection>,
    opt: StarfmOptions,
    output: Option<AnyImage>,
}

impl StarfmFusor {
    pub fn new(imgs: Arc<ImageCollection>, opt: StarfmOptions) -> Result<Self> {
        if opt.high_res_tag == opt.low_res_tag {
            return Err(Error::InvalidArgument(format!(
                "The high and low resolution tags must differ, both are '{}'",
                opt.high_res_tag
            )));
        }

        Ok(StarfmFusor {
            imgs,
            opt,
            output: None,
        })
    }

    pub fn options(&self) -> &StarfmOptions {
        &self.opt
    }

    pub fn source_images(&self) -> &Arc<ImageCollection> {
        &self.imgs
    }

    /// The result of the last prediction.
    pub fn output(&self) -> Option<&AnyImage> {
        self.output.as_ref()
    }

    pub fn into_output(self) -> Option<AnyImage> {
        self.output
    }

    /// Predicts the high resolution image at `date2`.
    ///
    /// `valid_mask` (empty, single- or multi-channel) gates which input
    /// pixels may participate. `pred_mask` (empty or single-channel) gates
    /// which output pixels are computed; everywhere else the output carries
    /// the low resolution value of the prediction date.
    pub fn predict(&mut self, date2: i32, valid_mask: &Mask, pred_mask: &Mask) -> Result {
        let dates = self.opt.pair_dates()?.dates();
        self.check_inputs(date2, &dates, valid_mask, pred_mask)?;

        let probe = self.imgs.get(&self.opt.high_res_tag, dates[0])?;
        debug!(
            "starfm: predicting date {date2} from {} pair(s) over {}x{} pixels",
            dates.len(),
            probe.width(),
            probe.height()
        );

        let output = match probe.data_type() {
            PixelDataType::Uint8 => predict_typed::<u8>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Int8 => predict_typed::<i8>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Uint16 => predict_typed::<u16>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Int16 => predict_typed::<i16>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Uint32 => predict_typed::<u32>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Int32 => predict_typed::<i32>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Float32 => predict_typed::<f32>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
            PixelDataType::Float64 => predict_typed::<f64>(&self.imgs, &self.opt, &dates, date2, valid_mask, pred_mask)?,
        };
        self.output = Some(output);
        Ok(())
    }

    /// Exhaustive pre-flight validation; once this passes the per-pixel loop
    /// cannot fail.
    fn check_inputs(&self, date2: i32, dates: &[i32], valid_mask: &Mask, pred_mask: &Mask) -> Result {
        let high_tag = &self.opt.high_res_tag;
        let low_tag = &self.opt.low_res_tag;

        for &d in dates {
            if d == date2 {
                return Err(Error::InvalidArgument(format!(
                    "The prediction date {date2} must differ from the reference pair dates"
                )));
            }
        }

        let reference = self.imgs.get(high_tag, dates[0])?;
        let size = reference.size();
        let channels = reference.channels();
        let data_type = reference.data_type();

        let mut check = |tag: &str, date: i32| -> Result {
            let img = self.imgs.get(tag, date)?;
            if img.size() != size {
                return Err(Error::size_mismatch(
                    format!("image (tag: {tag}, date: {date})"),
                    size,
                    img.size(),
                ));
            }
            if img.channels() != channels {
                return Err(Error::ImageType(format!(
                    "Image (tag: {tag}, date: {date}) has {} channels, expected {channels}",
                    img.channels()
                )));
            }
            if img.data_type() != data_type {
                return Err(Error::ImageType(format!(
                    "Image (tag: {tag}, date: {date}) has element type {}, expected {data_type}",
                    img.data_type()
                )));
            }
            Ok(())
        };

        for &d in dates {
            check(high_tag, d)?;
            check(low_tag, d)?;
        }
        check(low_tag, date2)?;

        mask::check_compatibility(size.0, size.1, channels, valid_mask)?;
        mask::check_compatibility(size.0, size.1, channels, pred_mask)?;
        if !pred_mask.is_empty() && pred_mask.channels() != 1 {
            return Err(Error::ImageType(format!(
                "The prediction mask must be single-channel, it has {} channels",
                pred_mask.channels()
            )));
        }
        Ok(())
    }
}

struct Pair<'a, T: PixelNum> {
    high: &'a DenseImage<T>,
    low: &'a DenseImage<T>,
}

impl<T: PixelNum> Pair<'_, T> {
    #[inline]
    fn temporal_diff(&self, l2: &DenseImage<T>, x: usize, y: usize, c: usize) -> f64 {
        (self.low.at(x, y, c).as_f64() - l2.at(x, y, c).as_f64()).abs()
    }

    #[inline]
    fn spectral_diff(&self, x: usize, y: usize, c: usize) -> f64 {
        (self.high.at(x, y, c).as_f64() - self.low.at(x, y, c).as_f64()).abs()
    }

    #[inline]
    fn local_estimate(&self, l2: &DenseImage<T>, x: usize, y: usize, c: usize) -> f64 {
        self.high.at(x, y, c).as_f64() + l2.at(x, y, c).as_f64() - self.low.at(x, y, c).as_f64()
    }
}

/// Similarity tolerance for one pair and channel: twice the standard
/// deviation of the high resolution values inside the window (over unmasked
/// locations), divided by the class count.
#[allow(clippy::too_many_arguments)]
fn window_tolerance<T: PixelNum>(
    high: &DenseImage<T>,
    c: usize,
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
    valid_mask: &Mask,
    number_classes: f64,
) -> f64 {
    let mut sum = 0.0;
    let mut squares = 0.0;
    let mut count = 0usize;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if mask::allows(valid_mask, x, y, c) {
                let v = high.at(x, y, c).as_f64();
                sum += v;
                squares += v * v;
                count += 1;
            }
        }
    }
    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let stddev = (squares / count as f64 - mean * mean).max(0.0).sqrt();
    2.0 * stddev / number_classes
}

fn predict_typed<T: PixelNum>(
    imgs: &ImageCollection,
    opt: &StarfmOptions,
    dates: &[i32],
    date2: i32,
    valid_mask: &Mask,
    pred_mask: &Mask,
) -> Result<AnyImage>
where
    AnyImage: From<DenseImage<T>>,
{
    let pairs: Vec<Pair<'_, T>> = dates
        .iter()
        .map(|&d| {
            Ok(Pair {
                high: imgs.get(&opt.high_res_tag, d)?.try_into()?,
                low: imgs.get(&opt.low_res_tag, d)?.try_into()?,
            })
        })
        .collect::<Result<_>>()?;
    let l2: &DenseImage<T> = imgs.get(&opt.low_res_tag, date2)?.try_into()?;

    let width = l2.width() as i32;
    let height = l2.height() as i32;
    let channels = l2.channels();
    let full = Rect::with_size(width, height);
    let pred_area = opt
        .prediction_area
        .map(|r| r.intersection(&full))
        .filter(|r| !r.is_empty())
        .unwrap_or(full);

    let window = opt.window_size as i32;
    let half = window / 2;
    let half_window = opt.window_size as f64 / 2.0;

    let (sigma_t, sigma_s) = opt.resolved_uncertainties(T::TYPE);
    let sigma_c = (sigma_t * sigma_t + sigma_s * sigma_s).sqrt();
    let use_temporal = match opt.temp_diff_weighting {
        TempDiffWeighting::Enable => true,
        TempDiffWeighting::Disable => false,
        TempDiffWeighting::OnDoublePair => pairs.len() == 2,
    };
    let log_b = opt.log_scale_factor;

    // distance factor per window offset, reused for every centre
    let mut distance = vec![0.0f64; (window * window) as usize];
    for dy in -half..=half {
        for dx in -half..=half {
            let offset = ((dy + half) * window + dx + half) as usize;
            distance[offset] = 1.0 + ((dx * dx + dy * dy) as f64).sqrt() / half_window;
        }
    }

    // positions excluded from prediction keep the low resolution value
    let mut out = l2.clone();

    for yc in pred_area.y..pred_area.bottom() {
        for xc in pred_area.x..pred_area.right() {
            let (xcu, ycu) = (xc as usize, yc as usize);
            if !mask::allows(pred_mask, xcu, ycu, 0) {
                continue;
            }

            let x0 = (xc - half).max(0) as usize;
            let x1 = ((xc + half).min(width - 1)) as usize;
            let y0 = (yc - half).max(0) as usize;
            let y1 = ((yc + half).min(height - 1)) as usize;

            for c in 0..channels {
                if !mask::allows(valid_mask, xcu, ycu, c) {
                    continue;
                }

                let mut central = [(0.0f64, 0.0f64); 2];
                let mut central_temporal = f64::INFINITY;
                let mut central_spectral = f64::INFINITY;
                let mut best_pair = 0usize;
                let mut best_magnitude = f64::INFINITY;
                for (k, pair) in pairs.iter().enumerate() {
                    let t = pair.temporal_diff(l2, xcu, ycu, c);
                    let s = pair.spectral_diff(xcu, ycu, c);
                    central[k] = (t, s);
                    central_temporal = central_temporal.min(t);
                    central_spectral = central_spectral.min(s);
                    if t + s < best_magnitude {
                        best_magnitude = t + s;
                        best_pair = k;
                    }
                }

                // with an unchanged centre the trivial estimate of the
                // unchanged pair is the answer
                if opt.copy_on_zero_diff && (central_temporal == 0.0 || central_spectral == 0.0) {
                    let mut copy_pair = best_pair;
                    let mut copy_magnitude = f64::INFINITY;
                    for (k, &(t, s)) in central.iter().take(pairs.len()).enumerate() {
                        if (t == 0.0 || s == 0.0) && t + s < copy_magnitude {
                            copy_magnitude = t + s;
                            copy_pair = k;
                        }
                    }
                    let value = pairs[copy_pair].local_estimate(l2, xcu, ycu, c);
                    out.set(xcu, ycu, c, T::from_f64_clamped(value));
                    continue;
                }

                let max_temporal = central_temporal + std::f64::consts::SQRT_2 * sigma_t;
                let max_spectral = central_spectral + sigma_c;

                let mut weight_sum = 0.0;
                let mut value_sum = 0.0;
                let mut candidates = 0usize;
                for pair in &pairs {
                    let tolerance = window_tolerance(pair.high, c, x0, x1, y0, y1, valid_mask, opt.number_classes);
                    let center_high = pair.high.at(xcu, ycu, c).as_f64();

                    for yw in y0..=y1 {
                        for xw in x0..=x1 {
                            if !mask::allows(valid_mask, xw, yw, c) {
                                continue;
                            }
                            if (pair.high.at(xw, yw, c).as_f64() - center_high).abs() > tolerance {
                                continue;
                            }

                            let temporal = pair.temporal_diff(l2, xw, yw, c);
                            let spectral = pair.spectral_diff(xw, yw, c);
                            let temporal_ok = temporal < max_temporal;
                            let spectral_ok = spectral < max_spectral;
                            let accepted = if opt.use_strict_filtering {
                                temporal_ok && spectral_ok
                            } else {
                                temporal_ok || spectral_ok
                            };
                            if !accepted {
                                continue;
                            }

                            let temporal_weighted = if use_temporal { temporal } else { 0.0 };
                            let (s_factor, t_factor) = if log_b > 0.0 {
                                ((spectral * log_b + 2.0).ln(), (temporal_weighted * log_b + 2.0).ln())
                            } else {
                                (spectral + 1.0, temporal_weighted + 1.0)
                            };

                            let offset = ((yw as i32 - yc + half) * window + xw as i32 - xc + half) as usize;
                            // near-perfect candidates get full weight instead
                            // of exploding through a tiny denominator
                            let product = s_factor * t_factor;
                            let composite = if product < sigma_c { 1.0 } else { product * distance[offset] };
                            let weight = 1.0 / composite;

                            weight_sum += weight;
                            value_sum += weight * pair.local_estimate(l2, xw, yw, c);
                            candidates += 1;
                        }
                    }
                }

                let value = if candidates > 0 {
                    value_sum / weight_sum
                } else if opt.copy_on_zero_diff || pairs.len() == 1 {
                    pairs[best_pair].local_estimate(l2, xcu, ycu, c)
                } else {
                    pairs.iter().map(|p| p.local_estimate(l2, xcu, ycu, c)).sum::<f64>() / pairs.len() as f64
                };
                out.set(xcu, ycu, c, T::from_f64_clamped(value));
            }
        }
    }

    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection_u8(high1: Vec<u8>, low1: Vec<u8>, low2: Vec<u8>) -> Arc<ImageCollection> {
        let mut col = ImageCollection::new();
        let w = high1.len();
        col.set("high", 1, AnyImage::U8(DenseImage::from_vec(w, 1, 1, high1).unwrap()));
        col.set("low", 1, AnyImage::U8(DenseImage::from_vec(w, 1, 1, low1).unwrap()));
        col.set("low", 2, AnyImage::U8(DenseImage::from_vec(w, 1, 1, low2).unwrap()));
        Arc::new(col)
    }

    #[test]
    fn window_size_must_be_odd() {
        let mut opt = StarfmOptions::default();
        assert!(opt.set_window_size(50).is_err());
        assert!(opt.set_window_size(51).is_ok());
    }

    #[test]
    fn double_pair_dates_must_differ() {
        let mut opt = StarfmOptions::default();
        assert!(opt.set_double_pair_dates(3, 3).is_err());
        assert!(opt.set_double_pair_dates(1, 3).is_ok());
    }

    #[test]
    fn negative_uncertainties_are_rejected() {
        let mut opt = StarfmOptions::default();
        assert!(opt.set_temporal_uncertainty(-0.1).is_err());
        assert!(opt.set_spectral_uncertainty(-1.0).is_err());
        assert!(opt.set_log_scale_factor(-1.0).is_err());
    }

    #[test]
    fn resolved_uncertainty_defaults_depend_on_type() {
        let opt = StarfmOptions::default();
        assert_eq!(opt.resolved_uncertainties(PixelDataType::Uint8), (1.0, 1.0));
        assert_eq!(opt.resolved_uncertainties(PixelDataType::Int16), (50.0, 50.0));
    }

    #[test]
    fn missing_images_fail_fast() {
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        let imgs = collection_u8(vec![1, 2], vec![1, 2], vec![1, 2]);
        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        let err = fusor.predict(3, &Mask::none(), &Mask::none()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn prediction_date_must_differ_from_pair_date() {
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(2);
        let imgs = collection_u8(vec![1, 2], vec![1, 2], vec![1, 2]);
        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        assert!(matches!(
            fusor.predict(2, &Mask::none(), &Mask::none()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn self_copy_identity_with_copy_on_zero_diff() {
        // predicting with L2 = L1 reproduces H1 exactly where valid
        let high: Vec<u8> = vec![17, 3, 250, 128, 9, 77, 42, 0];
        let low: Vec<u8> = vec![20, 5, 240, 120, 19, 70, 40, 3];
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_copy_on_zero_diff(true);
        let imgs = collection_u8(high.clone(), low.clone(), low.clone());
        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
        let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();
        assert_eq!(out.as_slice(), high.as_slice());
    }

    #[test]
    fn self_copy_identity_with_zero_uncertainty() {
        // without any uncertainty slack and with a flat spectral difference
        // no candidate qualifies, so every pixel falls back to the local
        // estimate, which is H1 when L2 = L1
        let high: Vec<u8> = vec![17, 3, 250, 128];
        let low: Vec<u8> = vec![19, 5, 252, 130];
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_temporal_uncertainty(0.0).unwrap();
        opt.set_spectral_uncertainty(0.0).unwrap();
        let imgs = collection_u8(high.clone(), low.clone(), low.clone());
        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
        let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();
        assert_eq!(out.as_slice(), high.as_slice());
    }

    #[test]
    fn strict_filtering_is_a_subset_of_loose() {
        // the neighbour at x=0 satisfies only the spectral condition, so it
        // contributes under loose filtering and is dropped under strict
        let mut col = ImageCollection::new();
        col.set("high", 1, AnyImage::U8(DenseImage::from_vec(3, 1, 1, vec![100, 100, 100]).unwrap()));
        col.set("low", 1, AnyImage::U8(DenseImage::from_vec(3, 1, 1, vec![100, 100, 100]).unwrap()));
        col.set("low", 2, AnyImage::U8(DenseImage::from_vec(3, 1, 1, vec![130, 110, 110]).unwrap()));
        let imgs = Arc::new(col);

        let pred = Mask::from_vec(3, 1, 1, vec![0, 255, 0]).unwrap();

        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_window_size(3).unwrap();
        opt.set_temp_diff_weighting(TempDiffWeighting::Enable);

        let mut loose = StarfmFusor::new(imgs.clone(), opt.clone()).unwrap();
        loose.predict(2, &Mask::none(), &pred).unwrap();
        let loose_out: DenseImage<u8> = loose.into_output().unwrap().try_into().unwrap();

        opt.set_use_strict_filtering(true);
        let mut strict = StarfmFusor::new(imgs, opt).unwrap();
        strict.predict(2, &Mask::none(), &pred).unwrap();
        let strict_out: DenseImage<u8> = strict.into_output().unwrap().try_into().unwrap();

        // loose averages the centre (T=10) with both neighbours, one of which
        // carries T=30; strict keeps the candidates with T=10 only
        assert_eq!(strict_out.at(1, 0, 0), 110);
        assert!(loose_out.at(1, 0, 0) > strict_out.at(1, 0, 0));
    }

    #[test]
    fn disabled_temporal_weighting_equals_constant_temporal_difference() {
        // T = 8 at every candidate, so enabling the temporal factor scales
        // every weight by the same 1 / 9 and the weighted averages agree
        let high: Vec<u8> = vec![50, 50, 50, 50];
        let low1: Vec<u8> = vec![22, 22, 22, 22];
        let low2: Vec<u8> = vec![30, 14, 30, 14];
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_window_size(3).unwrap();

        opt.set_temp_diff_weighting(TempDiffWeighting::Disable);
        let mut fusor = StarfmFusor::new(collection_u8(high.clone(), low1.clone(), low2.clone()), opt.clone()).unwrap();
        fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
        let disabled: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

        opt.set_temp_diff_weighting(TempDiffWeighting::Enable);
        let mut fusor = StarfmFusor::new(collection_u8(high, low1, low2), opt).unwrap();
        fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
        let enabled: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

        assert_eq!(disabled.as_slice(), enabled.as_slice());
    }

    #[test]
    fn prediction_mask_gates_output_pixels() {
        let high: Vec<u8> = vec![10, 20, 30];
        let low: Vec<u8> = vec![10, 20, 30];
        let low2: Vec<u8> = vec![15, 25, 35];
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_window_size(3).unwrap();
        let imgs = collection_u8(high, low, low2.clone());

        let pred = Mask::from_vec(3, 1, 1, vec![0, 255, 255]).unwrap();
        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        fusor.predict(2, &Mask::none(), &pred).unwrap();
        let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();

        // the skipped position carries the low resolution value unchanged
        assert_eq!(out.at(0, 0, 0), low2[0]);
        assert_ne!(out.at(1, 0, 0), 0);
    }

    #[test]
    fn prediction_area_limits_writes() {
        let high: Vec<u8> = vec![10, 20, 30, 40];
        let low: Vec<u8> = vec![10, 20, 30, 40];
        let low2: Vec<u8> = vec![15, 25, 35, 45];
        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        opt.set_window_size(3).unwrap();
        opt.set_prediction_area(Some(Rect::new(1, 0, 2, 1)));
        let imgs = collection_u8(high, low, low2.clone());

        let mut fusor = StarfmFusor::new(imgs, opt).unwrap();
        fusor.predict(2, &Mask::none(), &Mask::none()).unwrap();
        let out: DenseImage<u8> = fusor.into_output().unwrap().try_into().unwrap();
        assert_eq!(out.at(0, 0, 0), low2[0]);
        assert_eq!(out.at(3, 0, 0), low2[3]);
    }
}
