//! Change-aware fusion: detects the per-pixel date of disturbance (DoD)
//! between two high resolution reference dates and routes every output pixel
//! through a left-only, right-only or two-sided reflectance prediction.

use std::sync::Arc;

use itertools::izip;
use log::debug;

use raster::{
    AnyImage, ColorMapping, DenseImage, Error, ImageCollection, Interval, IntervalSet, Mask, PixelDataType, PixelNum, Rect,
    Result, mask,
};

use crate::{Algorithm, Parallelizer, ParallelizerOptions, StarfmOptions, kmeans};

/// Sentinel in the date-of-disturbance raster for pixels that never crossed
/// the disturbance threshold inside the interval.
pub const NEVER_DISTURBED: i32 = i32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorType {
    #[default]
    Modis,
    Landsat,
    Sentinel2,
    Sentinel3,
    Unsupported,
}

impl SensorType {
    pub fn tasseled_cap(self) -> Result<ColorMapping> {
        match self {
            SensorType::Modis => Ok(ColorMapping::ModisTasseledCap),
            SensorType::Landsat => Ok(ColorMapping::LandsatTasseledCap),
            other => Err(Error::InvalidArgument(format!(
                "No tasseled cap transform is available for sensor type {other:?}"
            ))),
        }
    }

    /// Number of source channels the tasseled cap transform expects.
    pub fn channel_count(self) -> Result<usize> {
        Ok(self.tasseled_cap()?.source_channels())
    }

    /// (nir, red) positions within the sensor's natural band order.
    fn ndvi_channels(self) -> Result<[usize; 2]> {
        match self {
            SensorType::Modis => Ok([1, 0]),
            SensorType::Landsat => Ok([3, 2]),
            other => Err(Error::InvalidArgument(format!(
                "The band layout of sensor type {other:?} is not known"
            ))),
        }
    }

    /// Default band name to channel index mapping.
    fn band_index(self, name: &str) -> Result<usize> {
        let index = match self {
            SensorType::Modis => match name {
                "red" => 0,
                "nir" => 1,
                "blue" => 2,
                "green" => 3,
                "swir3" => 4,
                "swir1" => 5,
                "swir2" => 6,
                _ => return Err(Error::InvalidArgument(format!("Unknown MODIS band name '{name}'"))),
            },
            SensorType::Landsat => match name {
                "blue" => 0,
                "green" => 1,
                "red" => 2,
                "nir" => 3,
                "swir1" => 4,
                "swir2" => 5,
                _ => return Err(Error::InvalidArgument(format!("Unknown Landsat band name '{name}'"))),
            },
            other => {
                return Err(Error::InvalidArgument(format!(
                    "The band layout of sensor type {other:?} is not known"
                )));
            }
        };
        Ok(index)
    }
}

/// Neighbourhood used when requiring a disturbed neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborShape {
    /// The four edge-connected neighbours.
    #[default]
    Cross,
    /// All eight surrounding pixels.
    Square,
}

/// Alignment of the moving average window over the low resolution stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovingAverageAlignment {
    /// Average dates i, i+1, .., i+n-1 onto date i.
    #[default]
    Forward,
    Center,
    Backward,
}

#[derive(Debug, Clone)]
pub struct StaarchOptions {
    starfm: StarfmOptions,
    interval_dates: Option<(i32, i32)>,
    high_res_mask_tag: Option<String>,
    low_res_mask_tag: Option<String>,
    moving_average_alignment: MovingAverageAlignment,
    n_images_for_averaging: u32,
    number_land_classes: u32,
    cluster_image: Option<DenseImage<i32>>,
    cluster_seed: u64,
    neighbor_shape: NeighborShape,
    low_res_di_ratio: f64,
    high_res_di_range: Interval,
    high_res_brightness_range: Interval,
    high_res_greenness_range: Interval,
    high_res_wetness_range: Interval,
    high_res_ndvi_range: Interval,
    low_res_sensor: SensorType,
    high_res_sensor: SensorType,
    low_res_source_channels: Vec<usize>,
    high_res_source_channels: Vec<usize>,
    output_bands: Vec<String>,
    prediction_area: Option<Rect>,
}

impl Default for StaarchOptions {
    fn default() -> Self {
        StaarchOptions {
            starfm: StarfmOptions::default(),
            interval_dates: None,
            high_res_mask_tag: None,
            low_res_mask_tag: None,
            moving_average_alignment: MovingAverageAlignment::default(),
            n_images_for_averaging: 3,
            number_land_classes: 10,
            cluster_image: None,
            cluster_seed: 0,
            neighbor_shape: NeighborShape::default(),
            low_res_di_ratio: 2.0 / 3.0,
            high_res_di_range: Interval::closed(2.0, f64::INFINITY),
            high_res_brightness_range: Interval::closed(-3.0, f64::INFINITY),
            high_res_greenness_range: Interval::closed(f64::NEG_INFINITY, f64::INFINITY),
            high_res_wetness_range: Interval::closed(f64::NEG_INFINITY, -1.0),
            high_res_ndvi_range: Interval::closed(f64::NEG_INFINITY, 0.0),
            low_res_sensor: SensorType::Modis,
            high_res_sensor: SensorType::Landsat,
            low_res_source_channels: Vec::new(),
            high_res_source_channels: Vec::new(),
            output_bands: vec!["red".to_string(), "green".to_string(), "blue".to_string()],
            prediction_area: None,
        }
    }
}

impl StaarchOptions {
    /// The nested reflectance estimator options applied inside every routed
    /// prediction. Pair dates and the prediction area are managed by the
    /// outer loop and overridden there.
    pub fn starfm_options(&self) -> &StarfmOptions {
        &self.starfm
    }

    pub fn starfm_options_mut(&mut self) -> &mut StarfmOptions {
        &mut self.starfm
    }

    pub fn set_interval_dates(&mut self, left: i32, right: i32) -> Result {
        if left >= right {
            return Err(Error::InvalidArgument(format!(
                "The left interval date must be smaller than the right one, got [{left}, {right}]"
            )));
        }
        self.interval_dates = Some((left, right));
        Ok(())
    }

    pub fn interval_dates(&self) -> Result<(i32, i32)> {
        self.interval_dates
            .ok_or_else(|| Error::InvalidArgument("The interval dates have not been set".to_string()))
    }

    pub fn set_high_res_tag(&mut self, tag: &str) {
        self.starfm.set_high_res_tag(tag);
    }

    pub fn high_res_tag(&self) -> &str {
        self.starfm.high_res_tag()
    }

    pub fn set_low_res_tag(&mut self, tag: &str) {
        self.starfm.set_low_res_tag(tag);
    }

    pub fn low_res_tag(&self) -> &str {
        self.starfm.low_res_tag()
    }

    pub fn set_high_res_mask_tag(&mut self, tag: &str) {
        self.high_res_mask_tag = Some(tag.to_string());
    }

    /// Tag of the per-image masks for the high resolution images; derived
    /// from the resolution tag unless set explicitly.
    pub fn high_res_mask_tag(&self) -> String {
        self.high_res_mask_tag
            .clone()
            .unwrap_or_else(|| format!("{}_mask", self.high_res_tag()))
    }

    pub fn set_low_res_mask_tag(&mut self, tag: &str) {
        self.low_res_mask_tag = Some(tag.to_string());
    }

    pub fn low_res_mask_tag(&self) -> String {
        self.low_res_mask_tag
            .clone()
            .unwrap_or_else(|| format!("{}_mask", self.low_res_tag()))
    }

    pub fn set_moving_average_alignment(&mut self, alignment: MovingAverageAlignment) {
        self.moving_average_alignment = alignment;
    }

    pub fn set_n_images_for_averaging(&mut self, n: u32) -> Result {
        if n == 0 {
            return Err(Error::InvalidArgument("At least one image is needed for averaging".to_string()));
        }
        self.n_images_for_averaging = n;
        Ok(())
    }

    pub fn set_number_land_classes(&mut self, classes: u32) -> Result {
        if classes == 0 {
            return Err(Error::InvalidArgument("At least one land class is required".to_string()));
        }
        self.number_land_classes = classes;
        Ok(())
    }

    /// Overrides the clustering step with a precomputed label image;
    /// negative labels mark invalid pixels. The class count is then ignored.
    pub fn set_cluster_image(&mut self, labels: DenseImage<i32>) -> Result {
        if labels.channels() != 1 {
            return Err(Error::InvalidArgument(format!(
                "The cluster image must be single-channel, it has {} channels",
                labels.channels()
            )));
        }
        self.cluster_image = Some(labels);
        Ok(())
    }

    pub fn cluster_image(&self) -> Option<&DenseImage<i32>> {
        self.cluster_image.as_ref()
    }

    /// Seed of the k-means++ initialisation, so that repeated runs produce
    /// the same land classes.
    pub fn set_cluster_seed(&mut self, seed: u64) {
        self.cluster_seed = seed;
    }

    pub fn set_neighbor_shape(&mut self, shape: NeighborShape) {
        self.neighbor_shape = shape;
    }

    /// Ratio t of the pixel-wise threshold `min + t (max - min)` between the
    /// temporal extremes of the averaged disturbance index.
    pub fn set_low_res_di_ratio(&mut self, ratio: f64) -> Result {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "The disturbance index ratio must lie in (0, 1), got {ratio}"
            )));
        }
        self.low_res_di_ratio = ratio;
        Ok(())
    }

    pub fn set_high_res_di_range(&mut self, range: Interval) {
        self.high_res_di_range = range;
    }

    pub fn set_high_res_brightness_range(&mut self, range: Interval) {
        self.high_res_brightness_range = range;
    }

    pub fn set_high_res_greenness_range(&mut self, range: Interval) {
        self.high_res_greenness_range = range;
    }

    pub fn set_high_res_wetness_range(&mut self, range: Interval) {
        self.high_res_wetness_range = range;
    }

    pub fn set_high_res_ndvi_range(&mut self, range: Interval) {
        self.high_res_ndvi_range = range;
    }

    pub fn set_low_res_sensor(&mut self, sensor: SensorType) {
        self.low_res_sensor = sensor;
    }

    pub fn set_high_res_sensor(&mut self, sensor: SensorType) {
        self.high_res_sensor = sensor;
    }

    /// Channel permutation telling the tasseled cap transform which channel
    /// of the input carries which band. Empty keeps the natural order.
    pub fn set_low_res_source_channels(&mut self, channels: Vec<usize>) {
        self.low_res_source_channels = channels;
    }

    pub fn set_high_res_source_channels(&mut self, channels: Vec<usize>) {
        self.high_res_source_channels = channels;
    }

    /// The band names extracted from both resolutions for prediction.
    pub fn set_output_bands(&mut self, bands: Vec<String>) -> Result {
        if bands.is_empty() {
            return Err(Error::InvalidArgument("At least one output band is required".to_string()));
        }
        self.output_bands = bands;
        Ok(())
    }

    pub fn output_bands(&self) -> &[String] {
        &self.output_bands
    }

    pub fn set_prediction_area(&mut self, area: Option<Rect>) {
        self.prediction_area = area;
    }

    pub fn prediction_area(&self) -> Option<Rect> {
        self.prediction_area
    }

    fn validate(&self) -> Result {
        if self.high_res_tag() == self.low_res_tag() {
            return Err(Error::InvalidArgument(format!(
                "The high and low resolution tags must differ, both are '{}'",
                self.high_res_tag()
            )));
        }
        for (channels, sensor, what) in [
            (&self.high_res_source_channels, self.high_res_sensor, "high"),
            (&self.low_res_source_channels, self.low_res_sensor, "low"),
        ] {
            if !channels.is_empty() {
                let expected = sensor.channel_count()?;
                if channels.len() != expected {
                    return Err(Error::InvalidArgument(format!(
                        "The {what} resolution source channel order must list {expected} channels for {sensor:?}, got {}",
                        channels.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The STAARCH fusor: date-of-disturbance detection plus routed prediction.
#[derive(Debug)]
pub struct StaarchFusor {
    imgs: Arc<ImageCollection>,
    opt: StaarchOptions,
    dod: Option<DenseImage<i32>>,
    predict_src: Arc<ImageCollection>,
    output: Option<AnyImage>,
}

impl StaarchFusor {
    pub fn new(imgs: Arc<ImageCollection>, opt: StaarchOptions) -> Result<Self> {
        opt.interval_dates()?;
        opt.validate()?;
        Ok(StaarchFusor {
            imgs,
            opt,
            dod: None,
            predict_src: Arc::new(ImageCollection::new()),
            output: None,
        })
    }

    /// Replaces the source collection. The disturbance state depends on the
    /// sources, so the DoD raster and the band extraction cache are dropped.
    pub fn set_source_images(&mut self, imgs: Arc<ImageCollection>) {
        self.imgs = imgs;
        self.predict_src = Arc::new(ImageCollection::new());
        self.dod = None;
    }

    /// Replaces the options. Changing the interval dates invalidates the DoD
    /// raster.
    pub fn set_options(&mut self, opt: StaarchOptions) -> Result {
        opt.interval_dates()?;
        opt.validate()?;
        if self.opt.interval_dates().ok() != opt.interval_dates().ok() {
            self.dod = None;
        }
        self.opt = opt;
        Ok(())
    }

    pub fn options(&self) -> &StaarchOptions {
        &self.opt
    }

    /// The date-of-disturbance raster of the last [`generate_dod_image`]
    /// call, sized to the prediction area. Pixels hold the first low
    /// resolution date crossing the threshold or [`NEVER_DISTURBED`].
    ///
    /// [`generate_dod_image`]: StaarchFusor::generate_dod_image
    pub fn dod_image(&self) -> Option<&DenseImage<i32>> {
        self.dod.as_ref()
    }

    pub fn output(&self) -> Option<&AnyImage> {
        self.output.as_ref()
    }

    pub fn into_output(self) -> Option<AnyImage> {
        self.output
    }

    /// The sorted low resolution dates inside the interval.
    fn low_dates(&self) -> Result<Vec<i32>> {
        let (left, right) = self.opt.interval_dates()?;
        Ok(self
            .imgs
            .dates(self.opt.low_res_tag())
            .into_iter()
            .filter(|&d| d >= left && d <= right)
            .collect())
    }

    fn prediction_area(&self, full: Rect) -> Rect {
        self.opt
            .prediction_area
            .map(|r| r.intersection(&full))
            .filter(|r| !r.is_empty())
            .unwrap_or(full)
    }

    /// Builds the date-of-disturbance raster from the high resolution change
    /// mask and the thresholded low resolution disturbance index stack.
    pub fn generate_dod_image(&mut self, base_mask: &Mask) -> Result<&DenseImage<i32>> {
        self.check_inputs(base_mask)?;

        let (w, h) = self.imgs.get(self.opt.high_res_tag(), self.opt.interval_dates()?.0)?.size();
        let pred_area = self.prediction_area(Rect::with_size(w as i32, h as i32));

        let low_dates = self.low_dates()?;
        debug!(
            "staarch: building the DoD raster over {}x{} pixels from {} low resolution dates",
            pred_area.width,
            pred_area.height,
            low_dates.len()
        );

        let mut low_di = self.low_standardized_di(pred_area, base_mask)?;
        let mut low_masks = self.low_masks(pred_area, base_mask)?;
        moving_average(
            &mut low_di,
            &mut low_masks,
            self.opt.n_images_for_averaging as usize,
            self.opt.moving_average_alignment,
        )?;
        let threshold = di_threshold(&low_di, &low_masks, self.opt.low_res_di_ratio)?;

        let change_mask = self.generate_change_mask(pred_area, base_mask)?;

        let mut dod = DenseImage::filled_with(NEVER_DISTURBED, pred_area.width as usize, pred_area.height as usize, 1)?;
        let positive = IntervalSet::from(Interval::closed(0.0, f64::INFINITY));
        let mut pixels_left = change_mask;
        for (di, date, low_mask) in izip!(&low_di, &low_dates, &low_masks) {
            let above = di.subtract(&threshold, &Mask::none())?.create_single_channel_mask_from_range(&[positive.clone()])?;
            let disturbed = mask::and(&mask::and(&above, &pixels_left)?, low_mask)?;
            dod.set_masked(*date, &disturbed)?;
            // the first qualifying date wins, later dates must not overwrite
            pixels_left = mask::and(&pixels_left, &mask::not(&disturbed)?)?;
        }

        self.dod = Some(dod);
        Ok(self.dod.as_ref().expect("stored above"))
    }

    /// Predicts the high resolution image at `date` by running the
    /// reflectance estimator once per routing class and overlaying the
    /// results according to the DoD raster.
    pub fn predict(&mut self, date: i32, base_mask: &Mask, pred_mask: &Mask) -> Result {
        self.check_inputs_for_prediction(date, base_mask, pred_mask)?;
        if self.dod.is_none() {
            self.generate_dod_image(base_mask)?;
        }
        self.extract_channels_for_prediction(date)?;

        let (d_left, d_right) = self.opt.interval_dates()?;
        let (w, h) = self.imgs.get(self.opt.high_res_tag(), d_left)?.size();
        let full = Rect::with_size(w as i32, h as i32);
        let pred_area = self.prediction_area(full);
        let dod = self.dod.as_ref().expect("the DoD raster was generated above");

        // routing masks in prediction area coordinates
        let never = NEVER_DISTURBED as f64;
        let both_area = dod.create_single_channel_mask_from_range(&[IntervalSet::from(Interval::closed(never, never))])?;
        let left_area =
            dod.create_single_channel_mask_from_range(&[IntervalSet::from(Interval::closed(date as f64 + 1.0, never - 1.0))])?;
        let right_area =
            dod.create_single_channel_mask_from_range(&[IntervalSet::from(Interval::closed(i32::MIN as f64, date as f64))])?;

        let expand = |area_mask: &Mask| -> Result<Mask> {
            let mut full_mask = DenseImage::zeros(w, h, 1)?;
            full_mask.paste(area_mask, pred_area.x as usize, pred_area.y as usize)?;
            if pred_mask.is_empty() {
                Ok(full_mask)
            } else {
                mask::and(&full_mask, pred_mask)
            }
        };
        let both_pred = expand(&both_area)?;
        let left_pred = expand(&left_area)?;
        let right_pred = expand(&right_area)?;

        let mut starfm_opt = self.opt.starfm.clone();
        starfm_opt.set_prediction_area(None);
        let mut parallel_opt = ParallelizerOptions::default();
        parallel_opt.set_prediction_area(Some(pred_area));
        let parallelizer = Parallelizer::new(parallel_opt);

        debug!("staarch: predicting date {date} between {d_left} and {d_right}");

        // not disturbed inside the interval: use both reference pairs
        let mut opt_both = starfm_opt.clone();
        opt_both.set_double_pair_dates(d_left, d_right)?;
        let valid = self.starfm_valid_mask(base_mask, &[d_left, d_right], date)?;
        let mut output = parallelizer.predict(&Algorithm::Starfm(opt_both), &self.predict_src, date, &valid, &both_pred)?;

        // disturbance still ahead: predict from the left reference only
        let mut opt_left = starfm_opt.clone();
        opt_left.set_single_pair_date(d_left);
        let valid = self.starfm_valid_mask(base_mask, &[d_left], date)?;
        let from_left = parallelizer.predict(&Algorithm::Starfm(opt_left), &self.predict_src, date, &valid, &left_pred)?;
        output.copy_values_from(&from_left, &left_pred)?;

        // disturbance already happened: the right reference carries the new state
        let mut opt_right = starfm_opt;
        opt_right.set_single_pair_date(d_right);
        let valid = self.starfm_valid_mask(base_mask, &[d_right], date)?;
        let from_right = parallelizer.predict(&Algorithm::Starfm(opt_right), &self.predict_src, date, &valid, &right_pred)?;
        output.copy_values_from(&from_right, &right_pred)?;

        self.output = Some(output);
        Ok(())
    }

    /// Intersection of the base mask with the per-image masks of every
    /// participating image.
    fn starfm_valid_mask(&self, base_mask: &Mask, pair_dates: &[i32], pred_date: i32) -> Result<Mask> {
        let high_mask_tag = self.opt.high_res_mask_tag();
        let low_mask_tag = self.opt.low_res_mask_tag();

        let mut combined = base_mask.clone();
        for &d in pair_dates {
            if self.imgs.has(&high_mask_tag, d) {
                combined = mask::and(&combined, self.imgs.get(&high_mask_tag, d)?.try_into()?)?;
            }
            if self.imgs.has(&low_mask_tag, d) {
                combined = mask::and(&combined, self.imgs.get(&low_mask_tag, d)?.try_into()?)?;
            }
        }
        if self.imgs.has(&low_mask_tag, pred_date) {
            combined = mask::and(&combined, self.imgs.get(&low_mask_tag, pred_date)?.try_into()?)?;
        }
        Ok(combined)
    }

    /// Converts every low resolution image in the interval to its
    /// standardised disturbance index, cropped to the prediction area.
    fn low_standardized_di(&self, pred_area: Rect, base_mask: &Mask) -> Result<Vec<DenseImage<f32>>> {
        let mapping = self.opt.low_res_sensor.tasseled_cap()?;
        let low_mask_tag = self.opt.low_res_mask_tag();

        let mut stack = Vec::new();
        for &d in &self.low_dates()? {
            let img = self.imgs.get(self.opt.low_res_tag(), d)?;
            let mut tc: DenseImage<f32> = img
                .convert_color(mapping, PixelDataType::Float32, &self.opt.low_res_source_channels)?
                .try_into()?;

            // each image is standardised with its own validity mask; overall
            // brightness varies too much between acquisitions to share moments
            let own_mask: Mask = if self.imgs.has(&low_mask_tag, d) {
                let m: &Mask = self.imgs.get(&low_mask_tag, d)?.try_into()?;
                m.clone()
            } else {
                base_mask.clone()
            };
            standardize(&mut tc, &own_mask)?;
            stack.push(disturbance_index(&tc.crop(pred_area)?));
        }
        Ok(stack)
    }

    fn low_masks(&self, pred_area: Rect, base_mask: &Mask) -> Result<Vec<Mask>> {
        let low_mask_tag = self.opt.low_res_mask_tag();
        let mut masks = Vec::new();
        for &d in &self.low_dates()? {
            if self.imgs.has(&low_mask_tag, d) {
                let m: &Mask = self.imgs.get(&low_mask_tag, d)?.try_into()?;
                masks.push(m.crop(pred_area)?);
            } else if !base_mask.is_empty() {
                masks.push(base_mask.crop(pred_area)?);
            } else {
                masks.push(Mask::none());
            }
        }
        Ok(masks)
    }

    /// Pixels disturbed at the right interval date but not at the left one.
    fn generate_change_mask(&self, pred_area: Rect, base_mask: &Mask) -> Result<Mask> {
        let (d_left, d_right) = self.opt.interval_dates()?;
        let high_tag = self.opt.high_res_tag();
        let sensor = self.opt.high_res_sensor;
        let mapping = sensor.tasseled_cap()?;

        let src_order = &self.opt.high_res_source_channels;
        let mut ndvi_order = sensor.ndvi_channels()?;
        if !src_order.is_empty() {
            ndvi_order = [src_order[ndvi_order[0]], src_order[ndvi_order[1]]];
        }

        let left = self.imgs.get(high_tag, d_left)?;
        let right = self.imgs.get(high_tag, d_right)?;
        let mut tc_left: DenseImage<f32> = left.convert_color(mapping, PixelDataType::Float32, src_order)?.try_into()?;
        let mut tc_right: DenseImage<f32> = right.convert_color(mapping, PixelDataType::Float32, src_order)?.try_into()?;
        let mut ndvi_left: DenseImage<f32> = left
            .convert_color(ColorMapping::NormalizedDifference, PixelDataType::Float32, &ndvi_order)?
            .try_into()?;
        let mut ndvi_right: DenseImage<f32> = right
            .convert_color(ColorMapping::NormalizedDifference, PixelDataType::Float32, &ndvi_order)?
            .try_into()?;

        let high_mask_tag = self.opt.high_res_mask_tag();
        let mut high_mask = base_mask.clone();
        for d in [d_left, d_right] {
            if self.imgs.has(&high_mask_tag, d) {
                high_mask = mask::and(&high_mask, self.imgs.get(&high_mask_tag, d)?.try_into()?)?;
            }
        }

        // standardise per land class so that class-typical brightness does
        // not drown the change signal
        let labels = match self.opt.cluster_image() {
            Some(labels) => Some(labels.clone()),
            None if self.opt.number_land_classes >= 2 => {
                debug!("staarch: clustering {} land classes", self.opt.number_land_classes);
                Some(kmeans::cluster(
                    &tc_left,
                    &high_mask,
                    self.opt.number_land_classes,
                    self.opt.cluster_seed,
                ))
            }
            None => None,
        };
        match labels {
            Some(labels) => {
                for class in unique_land_classes(&labels) {
                    let class_set = IntervalSet::from(Interval::closed(class as f64, class as f64));
                    let land = labels.create_single_channel_mask_from_range(&[class_set])?;
                    standardize(&mut tc_left, &land)?;
                    standardize(&mut tc_right, &land)?;
                    standardize(&mut ndvi_left, &land)?;
                    standardize(&mut ndvi_right, &land)?;
                }
            }
            None => {
                standardize(&mut tc_left, &high_mask)?;
                standardize(&mut tc_right, &high_mask)?;
                standardize(&mut ndvi_left, &high_mask)?;
                standardize(&mut ndvi_right, &high_mask)?;
            }
        }

        // the neighbour test needs one extra pixel around the prediction
        // area so that border pixels see the same neighbourhood as in a
        // full-raster run
        let full = tc_left.full_rect();
        let extended = pred_area.padded(1).intersection(&full);
        let local = Rect::new(pred_area.x - extended.x, pred_area.y - extended.y, pred_area.width, pred_area.height);

        let tc_left_ext = tc_left.crop(extended)?;
        let tc_right_ext = tc_right.crop(extended)?;
        let high_mask_ext = if high_mask.is_empty() {
            Mask::none()
        } else {
            high_mask.crop(extended)?
        };

        let four_neighbors = self.opt.neighbor_shape == NeighborShape::Cross;
        let di_range = self.opt.high_res_di_range;
        let disturbed_left = exceed_di_with_neighbor(
            &disturbance_index(&tc_left_ext),
            &high_mask_ext,
            di_range,
            four_neighbors,
        )?
        .crop(local)?;
        let disturbed_right = exceed_di_with_neighbor(
            &disturbance_index(&tc_right_ext),
            &high_mask_ext,
            di_range,
            four_neighbors,
        )?
        .crop(local)?;

        let tc_ranges = [
            IntervalSet::from(self.opt.high_res_brightness_range),
            IntervalSet::from(self.opt.high_res_greenness_range),
            IntervalSet::from(self.opt.high_res_wetness_range),
        ];
        let ndvi_range = [IntervalSet::from(self.opt.high_res_ndvi_range)];

        let left_in_ranges = mask::and(
            &tc_left_ext.crop(local)?.create_single_channel_mask_from_range(&tc_ranges)?,
            &ndvi_left.crop(pred_area)?.create_single_channel_mask_from_range(&ndvi_range)?,
        )?;
        let right_in_ranges = mask::and(
            &tc_right_ext.crop(local)?.create_single_channel_mask_from_range(&tc_ranges)?,
            &ndvi_right.crop(pred_area)?.create_single_channel_mask_from_range(&ndvi_range)?,
        )?;

        let disturbed_left = mask::and(&disturbed_left, &left_in_ranges)?;
        let disturbed_right = mask::and(&disturbed_right, &right_in_ranges)?;
        mask::and(&mask::not(&disturbed_left)?, &disturbed_right)
    }

    /// Caches the band-extracted images needed for predicting `date` and
    /// drops cached dates that are no longer required.
    fn extract_channels_for_prediction(&mut self, date: i32) -> Result {
        let (d_left, d_right) = self.opt.interval_dates()?;
        let keep = [date, d_left, d_right];

        let high_tag = self.opt.high_res_tag().to_string();
        let low_tag = self.opt.low_res_tag().to_string();
        let cache = Arc::make_mut(&mut self.predict_src);
        for tag in [&high_tag, &low_tag] {
            for d in cache.dates(tag) {
                if !keep.contains(&d) {
                    cache.remove(tag, d);
                }
            }
        }

        let jobs = [
            (low_tag.clone(), date, self.opt.low_res_sensor),
            (low_tag.clone(), d_left, self.opt.low_res_sensor),
            (low_tag.clone(), d_right, self.opt.low_res_sensor),
            (high_tag.clone(), d_left, self.opt.high_res_sensor),
            (high_tag.clone(), d_right, self.opt.high_res_sensor),
        ];
        for (tag, d, sensor) in jobs {
            if self.predict_src.has(&tag, d) {
                continue;
            }
            let channels: Vec<usize> = self
                .opt
                .output_bands
                .iter()
                .map(|name| sensor.band_index(name))
                .collect::<Result<_>>()?;
            let extracted = extract_channels(self.imgs.get(&tag, d)?, &channels)?;
            Arc::make_mut(&mut self.predict_src).set(&tag, d, extracted);
        }
        Ok(())
    }

    fn check_inputs(&self, base_mask: &Mask) -> Result {
        let (d_left, d_right) = self.opt.interval_dates()?;
        let high_tag = self.opt.high_res_tag();
        let low_tag = self.opt.low_res_tag();

        let high_left = self.imgs.get(high_tag, d_left)?;
        let high_right = self.imgs.get(high_tag, d_right)?;
        if high_left.data_type() != high_right.data_type() {
            return Err(Error::ImageType(format!(
                "The high resolution images have different element types: {} at {d_left}, {} at {d_right}",
                high_left.data_type(),
                high_right.data_type()
            )));
        }
        if high_left.size() != high_right.size() {
            return Err(Error::size_mismatch(
                "high resolution images",
                high_left.size(),
                high_right.size(),
            ));
        }

        let low_dates = self.low_dates()?;
        if low_dates.is_empty() {
            return Err(Error::not_found(low_tag, d_left));
        }
        let low_probe = self.imgs.get(low_tag, low_dates[0])?;
        for &d in &low_dates {
            let low = self.imgs.get(low_tag, d)?;
            if low.data_type() != low_probe.data_type() {
                return Err(Error::ImageType(format!(
                    "The low resolution images have different element types: {} at {}, {} at {d}",
                    low_probe.data_type(),
                    low_dates[0],
                    low.data_type()
                )));
            }
            if low.size() != low_probe.size() {
                return Err(Error::size_mismatch("low resolution images", low_probe.size(), low.size()));
            }
        }
        if low_probe.size() != high_left.size() {
            return Err(Error::size_mismatch(
                "low versus high resolution images",
                high_left.size(),
                low_probe.size(),
            ));
        }

        let high_channels = self.opt.high_res_sensor.channel_count()?;
        if high_left.channels() != high_channels {
            return Err(Error::ImageType(format!(
                "{:?} needs {high_channels} channels in their natural band order, the high resolution images have {}",
                self.opt.high_res_sensor,
                high_left.channels()
            )));
        }
        let low_channels = self.opt.low_res_sensor.channel_count()?;
        if low_probe.channels() != low_channels {
            return Err(Error::ImageType(format!(
                "{:?} needs {low_channels} channels in their natural band order, the low resolution images have {}",
                self.opt.low_res_sensor,
                low_probe.channels()
            )));
        }

        check_single_channel_mask(base_mask, high_left.size(), "base mask")?;

        if let Some(labels) = self.opt.cluster_image() {
            if labels.size() != high_left.size() {
                return Err(Error::size_mismatch("cluster image", high_left.size(), labels.size()));
            }
        }
        Ok(())
    }

    fn check_inputs_for_prediction(&self, date: i32, base_mask: &Mask, pred_mask: &Mask) -> Result {
        let (d_left, d_right) = self.opt.interval_dates()?;
        if date <= d_left || date >= d_right {
            return Err(Error::InvalidArgument(format!(
                "The prediction date {date} must lie strictly inside the interval [{d_left}, {d_right}]"
            )));
        }

        let low_dates = self.low_dates()?;
        if low_dates.len() < 3 {
            return Err(Error::InvalidArgument(format!(
                "At least three low resolution images are needed for a prediction, only {} lie inside the interval",
                low_dates.len()
            )));
        }
        self.imgs.get(self.opt.low_res_tag(), d_left)?;
        self.imgs.get(self.opt.low_res_tag(), d_right)?;

        let size = self.imgs.get(self.opt.high_res_tag(), d_left)?.size();
        check_single_channel_mask(base_mask, size, "base mask")?;
        check_single_channel_mask(pred_mask, size, "prediction mask")?;
        Ok(())
    }
}

fn check_single_channel_mask(m: &Mask, size: (usize, usize), what: &str) -> Result {
    if m.is_empty() {
        return Ok(());
    }
    if m.size() != size {
        return Err(Error::size_mismatch(what, size, m.size()));
    }
    if m.channels() != 1 {
        return Err(Error::ImageType(format!(
            "The {what} must be single-channel, it has {} channels",
            m.channels()
        )));
    }
    Ok(())
}

/// Z-scores each channel over the locations the mask allows, in place.
/// A vanishing deviation divides by one instead.
pub(crate) fn standardize(img: &mut DenseImage<f32>, valid_mask: &Mask) -> Result {
    let stats = img.mean_stddev(valid_mask)?;
    for c in 0..img.channels() {
        let (mean, stddev) = stats[c];
        if mean.is_nan() {
            continue;
        }
        let inv = if stddev == 0.0 { 1.0 } else { 1.0 / stddev };
        for y in 0..img.height() {
            for x in 0..img.width() {
                if mask::allows(valid_mask, x, y, c) {
                    let v = (img.at(x, y, c) as f64 - mean) * inv;
                    img.set(x, y, c, v as f32);
                }
            }
        }
    }
    Ok(())
}

/// Disturbance index brightness - greenness - wetness of a standardised
/// tasseled cap image.
pub(crate) fn disturbance_index(tc: &DenseImage<f32>) -> DenseImage<f32> {
    assert!(tc.channels() == 3, "The disturbance index needs brightness, greenness and wetness");
    let mut di = DenseImage::zeros(tc.width(), tc.height(), 1).expect("image geometry");
    for y in 0..tc.height() {
        for x in 0..tc.width() {
            di.set(x, y, 0, tc.at(x, y, 0) - tc.at(x, y, 1) - tc.at(x, y, 2));
        }
    }
    di
}

/// Counts 10 for a marked centre and 1 per marked neighbour, so a value of
/// 11 or more means "marked with at least one marked neighbour".
fn neighbor_counts(marked: &Mask, four_neighbors: bool) -> DenseImage<u8> {
    let width = marked.width();
    let height = marked.height();
    let mut counts = DenseImage::zeros(width, height, 1).expect("image geometry");
    for y in 0..height {
        for x in 0..width {
            if marked.at(x, y, 0) == 0 {
                continue;
            }
            let mut count = 10u8;
            let neighbors: &[(i64, i64)] = if four_neighbors {
                &[(0, -1), (0, 1), (-1, 0), (1, 0)]
            } else {
                &[(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)]
            };
            for (dx, dy) in neighbors {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height && marked.at(nx as usize, ny as usize, 0) != 0
                {
                    count += 1;
                }
            }
            counts.set(x, y, 0, count);
        }
    }
    counts
}

/// Pixels whose disturbance index lies in the range and that have at least
/// one neighbour whose index also lies in the range.
pub(crate) fn exceed_di_with_neighbor(di: &DenseImage<f32>, valid_mask: &Mask, range: Interval, four_neighbors: bool) -> Result<Mask> {
    let mut marked = di.create_single_channel_mask_from_range(&[IntervalSet::from(range)])?;
    if !valid_mask.is_empty() {
        marked = mask::and(&marked, valid_mask)?;
    }
    let counts = neighbor_counts(&marked, four_neighbors);
    counts.create_single_channel_mask_from_range(&[IntervalSet::from(Interval::closed(11.0, 255.0))])
}

/// Positive labels present in a cluster image; negative labels mark invalid
/// pixels and are dropped.
pub(crate) fn unique_land_classes(labels: &DenseImage<i32>) -> Vec<i32> {
    labels.unique().into_iter().filter(|&l| l >= 0).collect()
}

/// Moving average over the disturbance index stack. The denominator counts
/// only contributing (valid) steps; the per-date masks are combined with OR
/// over the window, an absent mask absorbing the combination.
pub(crate) fn moving_average(
    stack: &mut [DenseImage<f32>],
    masks: &mut [Mask],
    n: usize,
    alignment: MovingAverageAlignment,
) -> Result {
    if stack.len() != masks.len() {
        return Err(Error::Logic("Every averaged image needs its mask slot".to_string()));
    }
    if n <= 1 || (n == 2 && alignment == MovingAverageAlignment::Center) {
        return Ok(());
    }
    if stack.is_empty() {
        return Ok(());
    }

    let len = stack.len() as i64;
    let sources: Vec<DenseImage<f32>> = stack.to_vec();
    let source_masks: Vec<Mask> = masks.to_vec();
    let (width, height) = stack[0].size();

    let window = |i: i64| -> (i64, i64) {
        match alignment {
            MovingAverageAlignment::Forward => (i, i + n as i64 - 1),
            MovingAverageAlignment::Backward => (i - n as i64 + 1, i),
            MovingAverageAlignment::Center => (i - (n / 2) as i64, i + (n / 2) as i64),
        }
    };

    for i in 0..len {
        let (j0, j1) = window(i);
        let j0 = j0.max(0) as usize;
        let j1 = j1.min(len - 1) as usize;

        for y in 0..height {
            for x in 0..width {
                let mut sum = 0.0f64;
                let mut count = 0usize;
                for j in j0..=j1 {
                    if mask::allows(&source_masks[j], x, y, 0) {
                        sum += sources[j].at(x, y, 0) as f64;
                        count += 1;
                    }
                }
                if count > 0 {
                    stack[i as usize].set(x, y, 0, (sum / count as f64) as f32);
                }
            }
        }

        if !source_masks[i as usize].is_empty() {
            let mut combined = source_masks[i as usize].clone();
            for j in j0..=j1 {
                if j == i as usize {
                    continue;
                }
                combined = mask::or(&combined, &source_masks[j])?;
                if combined.is_empty() {
                    break;
                }
            }
            masks[i as usize] = combined;
        }
    }
    Ok(())
}

/// Pixel-wise threshold `min + ratio (max - min)` between the temporal
/// extremes of the averaged disturbance index. Locations that are invalid at
/// every date keep infinite bounds and never qualify downstream.
pub(crate) fn di_threshold(stack: &[DenseImage<f32>], masks: &[Mask], ratio: f64) -> Result<DenseImage<f32>> {
    let (width, height) = stack
        .first()
        .map(|img| img.size())
        .ok_or_else(|| Error::InvalidArgument("The disturbance index stack is empty".to_string()))?;

    let mut minimum = DenseImage::filled_with(f32::INFINITY, width, height, 1)?;
    let mut maximum = DenseImage::filled_with(f32::NEG_INFINITY, width, height, 1)?;
    for (di, m) in stack.iter().zip(masks.iter()) {
        minimum = minimum.minimum(di, m)?;
        maximum = maximum.maximum(di, m)?;
    }

    let mut threshold = DenseImage::zeros(width, height, 1)?;
    for y in 0..height {
        for x in 0..width {
            let lo = minimum.at(x, y, 0) as f64;
            let hi = maximum.at(x, y, 0) as f64;
            threshold.set(x, y, 0, (lo + ratio * (hi - lo)) as f32);
        }
    }
    Ok(threshold)
}

/// A new image holding the listed channels of the source, in list order.
fn extract_channels(img: &AnyImage, channels: &[usize]) -> Result<AnyImage> {
    fn typed<T: PixelNum>(img: &DenseImage<T>, channels: &[usize]) -> Result<DenseImage<T>> {
        for &c in channels {
            if c >= img.channels() {
                return Err(Error::ImageType(format!(
                    "Channel {c} does not exist in an image with {} channels",
                    img.channels()
                )));
            }
        }
        let mut out = DenseImage::zeros(img.width(), img.height(), channels.len())?;
        for y in 0..img.height() {
            for x in 0..img.width() {
                for (slot, &c) in channels.iter().enumerate() {
                    out.set(x, y, slot, img.at(x, y, c));
                }
            }
        }
        Ok(out)
    }

    Ok(match img {
        AnyImage::U8(i) => AnyImage::U8(typed(i, channels)?),
        AnyImage::I8(i) => AnyImage::I8(typed(i, channels)?),
        AnyImage::U16(i) => AnyImage::U16(typed(i, channels)?),
        AnyImage::I16(i) => AnyImage::I16(typed(i, channels)?),
        AnyImage::U32(i) => AnyImage::U32(typed(i, channels)?),
        AnyImage::I32(i) => AnyImage::I32(typed(i, channels)?),
        AnyImage::F32(i) => AnyImage::F32(typed(i, channels)?),
        AnyImage::F64(i) => AnyImage::F64(typed(i, channels)?),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn interval_dates_must_be_ordered() {
        let mut opt = StaarchOptions::default();
        assert!(opt.set_interval_dates(5, 5).is_err());
        assert!(opt.set_interval_dates(7, 5).is_err());
        assert!(opt.set_interval_dates(5, 7).is_ok());
    }

    #[test]
    fn di_ratio_must_be_a_proper_fraction() {
        let mut opt = StaarchOptions::default();
        assert!(opt.set_low_res_di_ratio(0.0).is_err());
        assert!(opt.set_low_res_di_ratio(1.0).is_err());
        assert!(opt.set_low_res_di_ratio(0.5).is_ok());
    }

    #[test]
    fn mask_tags_default_to_suffixed_resolution_tags() {
        let mut opt = StaarchOptions::default();
        opt.set_high_res_tag("fine");
        opt.set_low_res_tag("coarse");
        assert_eq!(opt.high_res_mask_tag(), "fine_mask");
        assert_eq!(opt.low_res_mask_tag(), "coarse_mask");
        opt.set_low_res_mask_tag("quality");
        assert_eq!(opt.low_res_mask_tag(), "quality");
    }

    #[test]
    fn source_channel_order_length_is_validated() {
        let mut opt = StaarchOptions::default();
        opt.set_interval_dates(1, 5).unwrap();
        opt.set_high_res_sensor(SensorType::Landsat);
        opt.set_high_res_source_channels(vec![0, 1, 2]);
        let err = StaarchFusor::new(Arc::new(ImageCollection::new()), opt).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn standardize_centres_and_scales() {
        let mut img = DenseImage::<f32>::from_vec(4, 1, 1, vec![2.0, 4.0, 6.0, 8.0]).unwrap();
        standardize(&mut img, &Mask::none()).unwrap();
        let mean: f32 = img.as_slice().iter().sum::<f32>() / 4.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(img.at(0, 0, 0), -img.at(3, 0, 0), epsilon = 1e-6);

        // constant channels divide by one instead of zero
        let mut flat = DenseImage::<f32>::from_vec(3, 1, 1, vec![5.0, 5.0, 5.0]).unwrap();
        standardize(&mut flat, &Mask::none()).unwrap();
        assert_eq!(flat.as_slice(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn standardize_leaves_masked_pixels_alone() {
        let mut img = DenseImage::<f32>::from_vec(3, 1, 1, vec![1.0, 100.0, 3.0]).unwrap();
        let m = Mask::from_vec(3, 1, 1, vec![255, 0, 255]).unwrap();
        standardize(&mut img, &m).unwrap();
        assert_eq!(img.at(1, 0, 0), 100.0);
        assert!((img.at(0, 0, 0) + 1.0).abs() < 1e-6);
        assert!((img.at(2, 0, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn neighbor_requirement() {
        // two adjacent marked pixels survive, an isolated one does not
        let di = DenseImage::<f32>::from_vec(4, 2, 1, vec![5.0, 5.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let range = Interval::closed(2.0, f64::INFINITY);
        let result = exceed_di_with_neighbor(&di, &Mask::none(), range, true).unwrap();
        assert_eq!(result.at(0, 0, 0), 255);
        assert_eq!(result.at(1, 0, 0), 255);
        assert_eq!(result.at(3, 0, 0), 0);
    }

    #[test]
    fn diagonal_neighbors_only_count_for_square_shape() {
        let di = DenseImage::<f32>::from_vec(2, 2, 1, vec![5.0, 0.0, 0.0, 5.0]).unwrap();
        let range = Interval::closed(2.0, f64::INFINITY);
        let cross = exceed_di_with_neighbor(&di, &Mask::none(), range, true).unwrap();
        assert_eq!(cross.at(0, 0, 0), 0);
        let square = exceed_di_with_neighbor(&di, &Mask::none(), range, false).unwrap();
        assert_eq!(square.at(0, 0, 0), 255);
        assert_eq!(square.at(1, 1, 0), 255);
    }

    #[test]
    fn forward_average_with_invalid_steps() {
        let mut stack = vec![
            DenseImage::<f32>::from_vec(1, 1, 1, vec![3.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![6.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![9.0]).unwrap(),
        ];
        let mut masks = vec![
            Mask::from_vec(1, 1, 1, vec![255]).unwrap(),
            Mask::from_vec(1, 1, 1, vec![0]).unwrap(),
            Mask::from_vec(1, 1, 1, vec![255]).unwrap(),
        ];
        moving_average(&mut stack, &mut masks, 3, MovingAverageAlignment::Forward).unwrap();

        // the invalid middle step drops out of the denominator
        assert_eq!(stack[0].at(0, 0, 0), 6.0);
        assert_eq!(stack[1].at(0, 0, 0), 9.0);
        assert_eq!(stack[2].at(0, 0, 0), 9.0);
        // a pixel of the averaged stack is valid if any contributor was
        assert_eq!(masks[0].at(0, 0, 0), 255);
        assert_eq!(masks[1].at(0, 0, 0), 255);
        assert_eq!(masks[2].at(0, 0, 0), 255);
    }

    #[test]
    fn absent_mask_absorbs_the_window_combination() {
        let mut stack = vec![
            DenseImage::<f32>::from_vec(1, 1, 1, vec![1.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![2.0]).unwrap(),
        ];
        let mut masks = vec![Mask::from_vec(1, 1, 1, vec![0]).unwrap(), Mask::none()];
        moving_average(&mut stack, &mut masks, 2, MovingAverageAlignment::Forward).unwrap();
        assert!(masks[0].is_empty());
        assert_eq!(stack[0].at(0, 0, 0), 2.0);
    }

    #[test]
    fn centered_average() {
        let mut stack = vec![
            DenseImage::<f32>::from_vec(1, 1, 1, vec![3.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![6.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![12.0]).unwrap(),
        ];
        let mut masks = vec![Mask::none(), Mask::none(), Mask::none()];
        moving_average(&mut stack, &mut masks, 3, MovingAverageAlignment::Center).unwrap();
        assert_eq!(stack[0].at(0, 0, 0), 4.5);
        assert_eq!(stack[1].at(0, 0, 0), 7.0);
        assert_eq!(stack[2].at(0, 0, 0), 9.0);
    }

    #[test]
    fn width_one_window_changes_nothing() {
        let mut stack = vec![
            DenseImage::<f32>::from_vec(1, 1, 1, vec![3.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![6.0]).unwrap(),
        ];
        let mut masks = vec![Mask::none(), Mask::none()];
        moving_average(&mut stack, &mut masks, 1, MovingAverageAlignment::Forward).unwrap();
        assert_eq!(stack[0].at(0, 0, 0), 3.0);
        assert_eq!(stack[1].at(0, 0, 0), 6.0);
    }

    #[test]
    fn threshold_between_extremes() {
        let stack = vec![
            DenseImage::<f32>::from_vec(1, 1, 1, vec![1.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![7.0]).unwrap(),
            DenseImage::<f32>::from_vec(1, 1, 1, vec![4.0]).unwrap(),
        ];
        let masks = vec![Mask::none(), Mask::none(), Mask::none()];
        let threshold = di_threshold(&stack, &masks, 2.0 / 3.0).unwrap();
        assert_abs_diff_eq!(threshold.at(0, 0, 0), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn land_class_filtering_ignores_invalid_labels() {
        let labels = DenseImage::<i32>::from_vec(4, 1, 1, vec![-1, 2, 0, 2]).unwrap();
        assert_eq!(unique_land_classes(&labels), vec![0, 2]);
    }

    #[test]
    fn extract_channels_reorders() {
        let img = AnyImage::U8(DenseImage::from_vec(1, 1, 3, vec![10, 20, 30]).unwrap());
        let out = extract_channels(&img, &[2, 0]).unwrap();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.at_f64(0, 0, 0), 30.0);
        assert_eq!(out.at_f64(0, 0, 1), 10.0);
        assert!(extract_channels(&img, &[3]).is_err());
    }
}
