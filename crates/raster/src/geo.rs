//! Geo registration: per-raster affine transforms and metadata, plus the
//! cross-raster area math used to crop inputs to a common region.
//!
//! The fusion core never crosses coordinate reference systems in its inner
//! loops; the registry only maps rectangles for area calculations and rejects
//! mismatched CRSs up front.

use std::collections::BTreeMap;
use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{Error, Rect, Result};

pub type ProjPoint = geo_types::Point<f64>;
pub type ProjRect = geo_types::Rect<f64>;

pub const DEFAULT_EDGE_SAMPLES: usize = 4;

/// Affine image-to-projection transform stored as six coefficients:
///
/// ```text
/// x_proj = offset_x + x_to_x * x_img + y_to_x * y_img
/// y_proj = offset_y + x_to_y * x_img + y_to_y * y_img
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub offset_x: f64,
    pub offset_y: f64,
    pub x_to_x: f64,
    pub y_to_x: f64,
    pub x_to_y: f64,
    pub y_to_y: f64,
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::identity()
    }
}

impl GeoTransform {
    pub const fn new(offset_x: f64, offset_y: f64, x_to_x: f64, y_to_x: f64, x_to_y: f64, y_to_y: f64) -> Self {
        GeoTransform {
            offset_x,
            offset_y,
            x_to_x,
            y_to_x,
            x_to_y,
            y_to_y,
        }
    }

    pub const fn identity() -> Self {
        GeoTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0)
    }

    pub fn from_origin_and_cell_size(origin: ProjPoint, cell_x: f64, cell_y: f64) -> Self {
        GeoTransform::new(origin.x(), origin.y(), cell_x, 0.0, 0.0, cell_y)
    }

    pub fn img_to_proj(&self, x: f64, y: f64) -> ProjPoint {
        ProjPoint::new(
            self.offset_x + self.x_to_x * x + self.y_to_x * y,
            self.offset_y + self.x_to_y * x + self.y_to_y * y,
        )
    }

    pub fn proj_to_img(&self, p: ProjPoint) -> Result<(f64, f64)> {
        let inv = self.invert()?;
        let q = inv.img_to_proj(p.x(), p.y());
        Ok((q.x(), q.y()))
    }

    /// Maps an image-space rectangle and returns the axis-aligned bounding
    /// box of its corners in projection space.
    pub fn img_rect_to_proj(&self, rect: Rect) -> ProjRect {
        let corners = [
            self.img_to_proj(rect.x as f64, rect.y as f64),
            self.img_to_proj(rect.right() as f64, rect.y as f64),
            self.img_to_proj(rect.x as f64, rect.bottom() as f64),
            self.img_to_proj(rect.right() as f64, rect.bottom() as f64),
        ];
        bounding_box(&corners)
    }

    /// Maps a projection-space rectangle into image space and returns the
    /// axis-aligned integer bounding box of its corners.
    pub fn proj_rect_to_img(&self, rect: ProjRect) -> Result<Rect> {
        let inv = self.invert()?;
        let corners = [
            inv.img_to_proj(rect.min().x, rect.min().y),
            inv.img_to_proj(rect.max().x, rect.min().y),
            inv.img_to_proj(rect.min().x, rect.max().y),
            inv.img_to_proj(rect.max().x, rect.max().y),
        ];
        Ok(integer_bounding_box(&corners))
    }

    pub fn determinant(&self) -> f64 {
        self.x_to_x * self.y_to_y - self.y_to_x * self.x_to_y
    }

    pub fn invert(&self) -> Result<GeoTransform> {
        if self.y_to_x == 0.0 && self.x_to_y == 0.0 && self.x_to_x != 0.0 && self.y_to_y != 0.0 {
            // No rotation or shear: avoid the determinant division for precision.
            return Ok(GeoTransform::new(
                -self.offset_x / self.x_to_x,
                -self.offset_y / self.y_to_y,
                1.0 / self.x_to_x,
                0.0,
                0.0,
                1.0 / self.y_to_y,
            ));
        }

        let det = self.determinant();
        let magnitude = self
            .x_to_x
            .abs()
            .max(self.y_to_x.abs())
            .max(self.x_to_y.abs())
            .max(self.y_to_y.abs());
        if det.abs() <= 1e-10 * magnitude * magnitude {
            return Err(Error::InvalidArgument(
                "GeoTransform is not invertible, the determinant vanishes".to_string(),
            ));
        }

        let inv_det = 1.0 / det;
        let x_to_x = self.y_to_y * inv_det;
        let y_to_x = -self.y_to_x * inv_det;
        let x_to_y = -self.x_to_y * inv_det;
        let y_to_y = self.x_to_x * inv_det;
        Ok(GeoTransform::new(
            -(x_to_x * self.offset_x + y_to_x * self.offset_y),
            -(x_to_y * self.offset_x + y_to_y * self.offset_y),
            x_to_x,
            y_to_x,
            x_to_y,
            y_to_y,
        ))
    }

    //
    // Pure mutators: each returns the transform describing the image after
    // the named manipulation, leaving this one untouched.
    //

    pub fn translate_image(&self, tx: f64, ty: f64) -> GeoTransform {
        let mut out = *self;
        out.offset_x += self.x_to_x * tx + self.y_to_x * ty;
        out.offset_y += self.x_to_y * tx + self.y_to_y * ty;
        out
    }

    pub fn translate_projection(&self, tx: f64, ty: f64) -> GeoTransform {
        let mut out = *self;
        out.offset_x += tx;
        out.offset_y += ty;
        out
    }

    pub fn scale_image(&self, sx: f64, sy: f64) -> GeoTransform {
        let mut out = *self;
        out.x_to_x *= sx;
        out.x_to_y *= sx;
        out.y_to_x *= sy;
        out.y_to_y *= sy;
        out
    }

    pub fn scale_projection(&self, sx: f64, sy: f64) -> GeoTransform {
        let mut out = *self;
        out.offset_x *= sx;
        out.x_to_x *= sx;
        out.y_to_x *= sx;
        out.offset_y *= sy;
        out.x_to_y *= sy;
        out.y_to_y *= sy;
        out
    }

    pub fn shear_x_image(&self, s: f64) -> GeoTransform {
        let mut out = *self;
        out.y_to_x += self.x_to_x * s;
        out.y_to_y += self.x_to_y * s;
        out
    }

    pub fn shear_y_image(&self, s: f64) -> GeoTransform {
        let mut out = *self;
        out.x_to_x += self.y_to_x * s;
        out.x_to_y += self.y_to_y * s;
        out
    }

    pub fn shear_x_projection(&self, s: f64) -> GeoTransform {
        let mut out = *self;
        out.offset_x += self.offset_y * s;
        out.x_to_x += self.x_to_y * s;
        out.y_to_x += self.y_to_y * s;
        out
    }

    pub fn shear_y_projection(&self, s: f64) -> GeoTransform {
        let mut out = *self;
        out.offset_y += self.offset_x * s;
        out.x_to_y += self.x_to_x * s;
        out.y_to_y += self.y_to_x * s;
        out
    }

    pub fn rotate_image(&self, angle: f64) -> GeoTransform {
        let (sin, cos) = angle.sin_cos();
        let mut out = *self;
        out.x_to_x = self.x_to_x * cos + self.y_to_x * sin;
        out.x_to_y = self.x_to_y * cos + self.y_to_y * sin;
        out.y_to_x = -self.x_to_x * sin + self.y_to_x * cos;
        out.y_to_y = -self.x_to_y * sin + self.y_to_y * cos;
        out
    }

    pub fn rotate_projection(&self, angle: f64) -> GeoTransform {
        let (sin, cos) = angle.sin_cos();
        let rotate = |x: f64, y: f64| (x * cos - y * sin, x * sin + y * cos);
        let mut out = *self;
        (out.offset_x, out.offset_y) = rotate(self.offset_x, self.offset_y);
        (out.x_to_x, out.x_to_y) = rotate(self.x_to_x, self.x_to_y);
        (out.y_to_x, out.y_to_y) = rotate(self.y_to_x, self.y_to_y);
        out
    }

    pub fn flip_image_horizontally(&self) -> GeoTransform {
        self.scale_image(-1.0, 1.0)
    }

    pub fn flip_image_vertically(&self) -> GeoTransform {
        self.scale_image(1.0, -1.0)
    }

    pub fn flip_projection_horizontally(&self) -> GeoTransform {
        self.scale_projection(-1.0, 1.0)
    }

    pub fn flip_projection_vertically(&self) -> GeoTransform {
        self.scale_projection(1.0, -1.0)
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(offset: ({}, {}), x: ({}, {}), y: ({}, {}))",
            self.offset_x, self.offset_y, self.x_to_x, self.x_to_y, self.y_to_x, self.y_to_y
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.offset_x.abs_diff_eq(&other.offset_x, epsilon)
            && self.offset_y.abs_diff_eq(&other.offset_y, epsilon)
            && self.x_to_x.abs_diff_eq(&other.x_to_x, epsilon)
            && self.y_to_x.abs_diff_eq(&other.y_to_x, epsilon)
            && self.x_to_y.abs_diff_eq(&other.x_to_y, epsilon)
            && self.y_to_y.abs_diff_eq(&other.y_to_y, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.offset_x.relative_eq(&other.offset_x, epsilon, max_relative)
            && self.offset_y.relative_eq(&other.offset_y, epsilon, max_relative)
            && self.x_to_x.relative_eq(&other.x_to_x, epsilon, max_relative)
            && self.y_to_x.relative_eq(&other.y_to_x, epsilon, max_relative)
            && self.x_to_y.relative_eq(&other.x_to_y, epsilon, max_relative)
            && self.y_to_y.relative_eq(&other.y_to_y, epsilon, max_relative)
    }
}

fn bounding_box(points: &[ProjPoint]) -> ProjRect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x());
        min_y = min_y.min(p.y());
        max_x = max_x.max(p.x());
        max_y = max_y.max(p.y());
    }
    ProjRect::new((min_x, min_y), (max_x, max_y))
}

fn integer_bounding_box(points: &[ProjPoint]) -> Rect {
    let bb = bounding_box(points);
    let x = bb.min().x.floor() as i32;
    let y = bb.min().y.floor() as i32;
    Rect::new(x, y, (bb.max().x.ceil() as i32 - x).max(0), (bb.max().y.ceil() as i32 - y).max(0))
}

/// A ground control point tying an image position to a projected position.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundControlPoint {
    pub id: String,
    pub pixel: (f64, f64),
    pub projected: ProjPoint,
}

/// Per-raster geo metadata. Its lifetime follows the raster it describes;
/// the registry itself holds no pixel data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub geo_transform: Option<GeoTransform>,
    /// Opaque CRS descriptor; equality is what the core cares about.
    pub crs: Option<String>,
    pub ground_control_points: Vec<GroundControlPoint>,
    /// Colour table mapping pixel index to RGBA.
    pub color_table: Option<Vec<[u8; 4]>>,
    /// Per-channel nodata sentinel values.
    pub nodata: Vec<Option<f64>>,
    /// Free-form metadata grouped by domain.
    pub metadata: BTreeMap<String, BTreeMap<String, String>>,
}

impl GeoInfo {
    pub fn with_transform(geo_transform: GeoTransform) -> Self {
        GeoInfo {
            geo_transform: Some(geo_transform),
            ..GeoInfo::default()
        }
    }

    pub fn set_metadata_item(&mut self, domain: &str, key: &str, value: &str) {
        self.metadata
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn metadata_item(&self, domain: &str, key: &str) -> Option<&str> {
        self.metadata.get(domain)?.get(key).map(String::as_str)
    }

    /// Whether two rasters live on the same grid: equal transform and CRS.
    pub fn same_grid(&self, other: &GeoInfo) -> bool {
        self.geo_transform == other.geo_transform && self.crs == other.crs
    }

    fn transform(&self) -> Result<&GeoTransform> {
        self.geo_transform
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("The raster has no geo transform".to_string()))
    }
}

fn check_same_crs(src: &GeoInfo, dst: &GeoInfo) -> Result<()> {
    if src.crs != dst.crs {
        return Err(Error::InvalidArgument(format!(
            "Rasters have different coordinate reference systems ({:?} <-> {:?})",
            src.crs, dst.crs
        )));
    }
    Ok(())
}

/// Maps a rectangle from the pixel space of one raster to the pixel space of
/// another by sampling `samples_per_edge` points along each edge and taking
/// the bounding box of the transformed samples.
pub fn project_rect(src: &GeoInfo, src_rect: Rect, dst: &GeoInfo, samples_per_edge: usize) -> Result<Rect> {
    check_same_crs(src, dst)?;
    if samples_per_edge < 2 {
        return Err(Error::InvalidArgument(format!(
            "At least two samples per edge are required, got {samples_per_edge}"
        )));
    }

    let src_transform = src.transform()?;
    let dst_inverse = dst.transform()?.invert()?;

    let mut samples = Vec::with_capacity(4 * samples_per_edge);
    let steps = (samples_per_edge - 1) as f64;
    for i in 0..samples_per_edge {
        let t = i as f64 / steps;
        let x = src_rect.x as f64 + t * src_rect.width as f64;
        let y = src_rect.y as f64 + t * src_rect.height as f64;
        samples.push((x, src_rect.y as f64));
        samples.push((x, src_rect.bottom() as f64));
        samples.push((src_rect.x as f64, y));
        samples.push((src_rect.right() as f64, y));
    }

    let mapped: Vec<ProjPoint> = samples
        .into_iter()
        .map(|(x, y)| {
            let p = src_transform.img_to_proj(x, y);
            dst_inverse.img_to_proj(p.x(), p.y())
        })
        .collect();
    Ok(integer_bounding_box(&mapped))
}

/// The common area of two georeferenced rasters, expressed in each raster's
/// own pixel space. Used to shrink inputs to their intersection.
pub fn intersect_rect(a: &GeoInfo, a_size: (usize, usize), b: &GeoInfo, b_size: (usize, usize)) -> Result<(Rect, Rect)> {
    check_same_crs(a, b)?;

    let a_full = Rect::with_size(a_size.0 as i32, a_size.1 as i32);
    let b_full = Rect::with_size(b_size.0 as i32, b_size.1 as i32);

    let b_in_a = project_rect(b, b_full, a, DEFAULT_EDGE_SAMPLES)?;
    let common_a = a_full.intersection(&b_in_a);
    let a_in_b = project_rect(a, common_a, b, DEFAULT_EDGE_SAMPLES)?;
    Ok((common_a, a_in_b.intersection(&b_full)))
}
