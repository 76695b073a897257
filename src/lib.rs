//! Spatio-temporal fusion of multi-resolution remote sensing imagery.
//!
//! The [`raster`] crate provides the pixel-buffer primitives (typed images,
//! masks, value intervals, geo registration, the tagged image collection).
//! The [`fusion`] crate implements the STARFM estimator, the striped parallel
//! executor and the change-aware STAARCH outer loop on top of it.

pub use fusion;
pub use raster;

pub use fusion::{Algorithm, Parallelizer, ParallelizerOptions, StaarchFusor, StaarchOptions, StarfmFusor, StarfmOptions};
pub use raster::{AnyImage, DenseImage, Error, GeoInfo, ImageCollection, Mask, Result};
