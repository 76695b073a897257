//! Raster primitives for spatio-temporal image fusion: typed pixel buffers
//! with masked arithmetic, value-range masks, geo registration and the tagged
//! multi-resolution image collection.

pub type Result<T = ()> = std::result::Result<T, Error>;

mod anyimage;
mod collection;
mod color;
mod datatype;
mod error;
pub mod geo;
mod image;
mod imageops;
mod interval;
pub mod mask;
mod pixel;
mod rect;

#[doc(inline)]
pub use {
    anyimage::AnyImage, collection::ImageCollection, color::ColorMapping, datatype::PixelDataType, error::Error, geo::GeoInfo,
    geo::GeoTransform, image::DenseImage, image::ImageView, image::ImageViewMut, image::Mask, interval::Interval,
    interval::IntervalSet, pixel::PixelInt, pixel::PixelNum, rect::Rect,
};
