//! Spatio-temporal fusion algorithms over the raster primitives: the STARFM
//! reflectance estimator, a striped parallel executor and the change-aware
//! STAARCH outer loop.

pub use raster::{Error, Result};

mod kmeans;
mod parallel;
mod staarch;
mod starfm;

#[doc(inline)]
pub use {
    parallel::Parallelizer,
    parallel::ParallelizerOptions,
    staarch::MovingAverageAlignment,
    staarch::NEVER_DISTURBED,
    staarch::NeighborShape,
    staarch::SensorType,
    staarch::StaarchFusor,
    staarch::StaarchOptions,
    starfm::PairDates,
    starfm::StarfmFusor,
    starfm::StarfmOptions,
    starfm::TempDiffWeighting,
};

/// The fusion algorithms exposed by this crate, with their options.
#[derive(Debug, Clone)]
pub enum Algorithm {
    Starfm(StarfmOptions),
    Staarch(Box<StaarchOptions>),
}
