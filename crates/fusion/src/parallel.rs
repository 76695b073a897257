//! Striped data-parallel execution of a fusion algorithm.
//!
//! The prediction rectangle is divided into horizontal stripes, one
//! independent estimator per stripe over the shared read-only collection.
//! Stripes are disjoint, so the assembled output never aliases; the first
//! error raised by any stripe aborts the prediction.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use raster::{AnyImage, Error, ImageCollection, Mask, Rect, Result};

use crate::{Algorithm, StarfmFusor, StarfmOptions};

#[derive(Debug, Clone)]
pub struct ParallelizerOptions {
    number_threads: usize,
    prediction_area: Option<Rect>,
}

impl Default for ParallelizerOptions {
    fn default() -> Self {
        ParallelizerOptions {
            number_threads: std::thread::available_parallelism().map(usize::from).unwrap_or(1),
            prediction_area: None,
        }
    }
}

impl ParallelizerOptions {
    /// Worker count; clamped to at least one.
    pub fn set_number_threads(&mut self, threads: usize) {
        self.number_threads = threads.max(1);
    }

    pub fn number_threads(&self) -> usize {
        self.number_threads
    }

    /// The rectangle to predict. Nested algorithm options carry their own
    /// prediction area, but under the parallelizer only this one counts.
    pub fn set_prediction_area(&mut self, area: Option<Rect>) {
        self.prediction_area = area;
    }

    pub fn prediction_area(&self) -> Option<Rect> {
        self.prediction_area
    }
}

/// Runs a fusion algorithm striped over a worker pool.
pub struct Parallelizer {
    opt: ParallelizerOptions,
}

impl Parallelizer {
    pub fn new(opt: ParallelizerOptions) -> Self {
        Parallelizer { opt }
    }

    pub fn options(&self) -> &ParallelizerOptions {
        &self.opt
    }

    /// Predicts `date2` with the given algorithm over the collection.
    ///
    /// The change-aware outer loop parallelises its inner calls itself and is
    /// therefore refused here.
    pub fn predict(
        &self,
        algorithm: &Algorithm,
        imgs: &Arc<ImageCollection>,
        date2: i32,
        valid_mask: &Mask,
        pred_mask: &Mask,
    ) -> Result<AnyImage> {
        match algorithm {
            Algorithm::Staarch(_) => Err(Error::InvalidArgument(
                "The change-aware fusor is internally parallel and cannot run under the parallelizer".to_string(),
            )),
            Algorithm::Starfm(opt) => self.predict_starfm(opt, imgs, date2, valid_mask, pred_mask),
        }
    }

    fn predict_starfm(
        &self,
        alg_opt: &StarfmOptions,
        imgs: &Arc<ImageCollection>,
        date2: i32,
        valid_mask: &Mask,
        pred_mask: &Mask,
    ) -> Result<AnyImage> {
        let dates = alg_opt.pair_dates()?.dates();
        let probe = imgs.get(alg_opt.high_res_tag(), dates[0])?;
        let full = probe.full_rect();
        let pred_area = self
            .opt
            .prediction_area
            .map(|r| r.intersection(&full))
            .filter(|r| !r.is_empty())
            .unwrap_or(full);

        let stripes = split_into_stripes(pred_area, self.opt.number_threads);
        debug!(
            "parallelizer: predicting date {date2} over {}x{} pixels in {} stripe(s)",
            pred_area.width,
            pred_area.height,
            stripes.len()
        );

        let results: Vec<Result<(Rect, AnyImage)>> = stripes
            .into_par_iter()
            .map(|stripe| {
                let mut opt = alg_opt.clone();
                opt.set_prediction_area(Some(stripe));
                let mut fusor = StarfmFusor::new(imgs.clone(), opt)?;
                fusor.predict(date2, valid_mask, pred_mask)?;
                let output = fusor
                    .into_output()
                    .ok_or_else(|| Error::Logic("A stripe prediction finished without an output".to_string()))?;
                Ok((stripe, output))
            })
            .collect();

        // funnel the first stripe error back to the caller
        let mut assembled: Option<AnyImage> = None;
        for result in results {
            let (stripe, stripe_output) = result?;
            match &mut assembled {
                None => assembled = Some(stripe_output),
                Some(out) => out.copy_rect_from(&stripe_output, stripe)?,
            }
        }
        assembled.ok_or_else(|| Error::InvalidArgument("The prediction area is empty".to_string()))
    }
}

/// Divides a rectangle into `count` non-overlapping horizontal stripes; the
/// last stripe absorbs the remainder rows. Fewer stripes are returned when
/// there are not enough rows.
fn split_into_stripes(area: Rect, count: usize) -> Vec<Rect> {
    let count = (count.max(1) as i32).min(area.height.max(1));
    let stripe_height = area.height / count;
    (0..count)
        .map(|i| {
            let y = area.y + i * stripe_height;
            let height = if i == count - 1 { area.bottom() - y } else { stripe_height };
            Rect::new(area.x, y, area.width, height)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaarchOptions;
    use raster::DenseImage;

    #[test]
    fn stripes_cover_without_overlap() {
        let area = Rect::new(3, 10, 7, 23);
        let stripes = split_into_stripes(area, 4);
        assert_eq!(stripes.len(), 4);
        assert_eq!(stripes.iter().map(|s| s.height).sum::<i32>(), 23);
        for pair in stripes.windows(2) {
            assert_eq!(pair[0].bottom(), pair[1].y);
        }
        assert_eq!(stripes.last().unwrap().bottom(), area.bottom());
    }

    #[test]
    fn more_workers_than_rows() {
        let stripes = split_into_stripes(Rect::with_size(5, 2), 8);
        assert_eq!(stripes.len(), 2);
        assert!(stripes.iter().all(|s| s.height == 1));
    }

    #[test]
    fn staarch_is_refused() {
        let parallelizer = Parallelizer::new(ParallelizerOptions::default());
        let imgs = Arc::new(ImageCollection::new());
        let err = parallelizer
            .predict(
                &Algorithm::Staarch(Box::new(StaarchOptions::default())),
                &imgs,
                2,
                &Mask::none(),
                &Mask::none(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn stripe_errors_reach_the_caller() {
        let mut col = ImageCollection::new();
        col.set("high", 1, AnyImage::U8(DenseImage::zeros(4, 4, 1).unwrap()));
        // low resolution images missing entirely
        let imgs = Arc::new(col);

        let mut opt = StarfmOptions::default();
        opt.set_single_pair_date(1);
        let parallelizer = Parallelizer::new(ParallelizerOptions::default());
        let err = parallelizer
            .predict(&Algorithm::Starfm(opt), &imgs, 2, &Mask::none(), &Mask::none())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
