use crate::{DenseImage, Error, IntervalSet, Mask, PixelDataType, PixelNum, Rect, Result};

/// Type erased [`DenseImage`].
/// The public fusion API moves images across this boundary and dispatches
/// internally to a monomorphised loop per element type.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyImage {
    U8(DenseImage<u8>),
    I8(DenseImage<i8>),
    U16(DenseImage<u16>),
    I16(DenseImage<i16>),
    U32(DenseImage<u32>),
    I32(DenseImage<i32>),
    F32(DenseImage<f32>),
    F64(DenseImage<f64>),
}

macro_rules! unerase_image_op {
    ( $op:ident, $ret:ty ) => {
        pub fn $op(&self) -> $ret {
            match self {
                AnyImage::U8(img) => img.$op(),
                AnyImage::I8(img) => img.$op(),
                AnyImage::U16(img) => img.$op(),
                AnyImage::I16(img) => img.$op(),
                AnyImage::U32(img) => img.$op(),
                AnyImage::I32(img) => img.$op(),
                AnyImage::F32(img) => img.$op(),
                AnyImage::F64(img) => img.$op(),
            }
        }
    };
}

macro_rules! unerase_binary_op {
    ( $op:ident ) => {
        /// See [`DenseImage`] for the element semantics; the result element
        /// type is promoted so differences and sums stay representable.
        pub fn $op(&self, other: &AnyImage, mask: &Mask) -> Result<AnyImage> {
            if self.data_type() != other.data_type() {
                return Err(Error::ImageType(format!(
                    "Operands have different element types: {} <-> {}",
                    self.data_type(),
                    other.data_type()
                )));
            }

            match self.data_type().promoted() {
                PixelDataType::Uint8 => Ok(AnyImage::U8(self.cast_to::<u8>().$op(&other.cast_to::<u8>(), mask)?)),
                PixelDataType::Int8 => Ok(AnyImage::I8(self.cast_to::<i8>().$op(&other.cast_to::<i8>(), mask)?)),
                PixelDataType::Uint16 => Ok(AnyImage::U16(self.cast_to::<u16>().$op(&other.cast_to::<u16>(), mask)?)),
                PixelDataType::Int16 => Ok(AnyImage::I16(self.cast_to::<i16>().$op(&other.cast_to::<i16>(), mask)?)),
                PixelDataType::Uint32 => Ok(AnyImage::U32(self.cast_to::<u32>().$op(&other.cast_to::<u32>(), mask)?)),
                PixelDataType::Int32 => Ok(AnyImage::I32(self.cast_to::<i32>().$op(&other.cast_to::<i32>(), mask)?)),
                PixelDataType::Float32 => Ok(AnyImage::F32(self.cast_to::<f32>().$op(&other.cast_to::<f32>(), mask)?)),
                PixelDataType::Float64 => Ok(AnyImage::F64(self.cast_to::<f64>().$op(&other.cast_to::<f64>(), mask)?)),
            }
        }
    };
}

macro_rules! unerase_integer_binary_op {
    ( $op:ident ) => {
        /// Integer element types only; floating point operands are an
        /// image-type error. The element type is kept.
        pub fn $op(&self, other: &AnyImage, mask: &Mask) -> Result<AnyImage> {
            if self.data_type() != other.data_type() {
                return Err(Error::ImageType(format!(
                    "Operands have different element types: {} <-> {}",
                    self.data_type(),
                    other.data_type()
                )));
            }

            match (self, other) {
                (AnyImage::U8(a), AnyImage::U8(b)) => Ok(AnyImage::U8(a.$op(b, mask)?)),
                (AnyImage::I8(a), AnyImage::I8(b)) => Ok(AnyImage::I8(a.$op(b, mask)?)),
                (AnyImage::U16(a), AnyImage::U16(b)) => Ok(AnyImage::U16(a.$op(b, mask)?)),
                (AnyImage::I16(a), AnyImage::I16(b)) => Ok(AnyImage::I16(a.$op(b, mask)?)),
                (AnyImage::U32(a), AnyImage::U32(b)) => Ok(AnyImage::U32(a.$op(b, mask)?)),
                (AnyImage::I32(a), AnyImage::I32(b)) => Ok(AnyImage::I32(a.$op(b, mask)?)),
                _ => Err(Error::ImageType(format!(
                    "Bitwise operations require an integer element type, got {}",
                    self.data_type()
                ))),
            }
        }
    };
}

impl AnyImage {
    unerase_image_op!(width, usize);
    unerase_image_op!(height, usize);
    unerase_image_op!(channels, usize);
    unerase_image_op!(len, usize);
    unerase_image_op!(is_empty, bool);
    unerase_image_op!(full_rect, Rect);

    pub fn data_type(&self) -> PixelDataType {
        match self {
            AnyImage::U8(_) => PixelDataType::Uint8,
            AnyImage::I8(_) => PixelDataType::Int8,
            AnyImage::U16(_) => PixelDataType::Uint16,
            AnyImage::I16(_) => PixelDataType::Int16,
            AnyImage::U32(_) => PixelDataType::Uint32,
            AnyImage::I32(_) => PixelDataType::Int32,
            AnyImage::F32(_) => PixelDataType::Float32,
            AnyImage::F64(_) => PixelDataType::Float64,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn zeros(data_type: PixelDataType, width: usize, height: usize, channels: usize) -> Result<AnyImage> {
        Ok(match data_type {
            PixelDataType::Uint8 => AnyImage::U8(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Int8 => AnyImage::I8(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Uint16 => AnyImage::U16(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Int16 => AnyImage::I16(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Uint32 => AnyImage::U32(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Int32 => AnyImage::I32(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Float32 => AnyImage::F32(DenseImage::zeros(width, height, channels)?),
            PixelDataType::Float64 => AnyImage::F64(DenseImage::zeros(width, height, channels)?),
        })
    }

    pub fn at_f64(&self, x: usize, y: usize, c: usize) -> f64 {
        match self {
            AnyImage::U8(img) => img.at(x, y, c).as_f64(),
            AnyImage::I8(img) => img.at(x, y, c).as_f64(),
            AnyImage::U16(img) => img.at(x, y, c).as_f64(),
            AnyImage::I16(img) => img.at(x, y, c).as_f64(),
            AnyImage::U32(img) => img.at(x, y, c).as_f64(),
            AnyImage::I32(img) => img.at(x, y, c).as_f64(),
            AnyImage::F32(img) => img.at(x, y, c).as_f64(),
            AnyImage::F64(img) => img.at(x, y, c).as_f64(),
        }
    }

    pub fn cast(&self, data_type: PixelDataType) -> AnyImage {
        match data_type {
            PixelDataType::Uint8 => AnyImage::U8(self.cast_to::<u8>()),
            PixelDataType::Int8 => AnyImage::I8(self.cast_to::<i8>()),
            PixelDataType::Uint16 => AnyImage::U16(self.cast_to::<u16>()),
            PixelDataType::Int16 => AnyImage::I16(self.cast_to::<i16>()),
            PixelDataType::Uint32 => AnyImage::U32(self.cast_to::<u32>()),
            PixelDataType::Int32 => AnyImage::I32(self.cast_to::<i32>()),
            PixelDataType::Float32 => AnyImage::F32(self.cast_to::<f32>()),
            PixelDataType::Float64 => AnyImage::F64(self.cast_to::<f64>()),
        }
    }

    pub fn cast_to<T: PixelNum>(&self) -> DenseImage<T> {
        match self {
            AnyImage::U8(img) => img.cast_to::<T>(),
            AnyImage::I8(img) => img.cast_to::<T>(),
            AnyImage::U16(img) => img.cast_to::<T>(),
            AnyImage::I16(img) => img.cast_to::<T>(),
            AnyImage::U32(img) => img.cast_to::<T>(),
            AnyImage::I32(img) => img.cast_to::<T>(),
            AnyImage::F32(img) => img.cast_to::<T>(),
            AnyImage::F64(img) => img.cast_to::<T>(),
        }
    }

    pub fn crop(&self, rect: Rect) -> Result<AnyImage> {
        Ok(match self {
            AnyImage::U8(img) => AnyImage::U8(img.crop(rect)?),
            AnyImage::I8(img) => AnyImage::I8(img.crop(rect)?),
            AnyImage::U16(img) => AnyImage::U16(img.crop(rect)?),
            AnyImage::I16(img) => AnyImage::I16(img.crop(rect)?),
            AnyImage::U32(img) => AnyImage::U32(img.crop(rect)?),
            AnyImage::I32(img) => AnyImage::I32(img.crop(rect)?),
            AnyImage::F32(img) => AnyImage::F32(img.crop(rect)?),
            AnyImage::F64(img) => AnyImage::F64(img.crop(rect)?),
        })
    }

    pub fn copy_values_from(&mut self, other: &AnyImage, mask: &Mask) -> Result<()> {
        match (self, other) {
            (AnyImage::U8(a), AnyImage::U8(b)) => a.copy_values_from(b, mask),
            (AnyImage::I8(a), AnyImage::I8(b)) => a.copy_values_from(b, mask),
            (AnyImage::U16(a), AnyImage::U16(b)) => a.copy_values_from(b, mask),
            (AnyImage::I16(a), AnyImage::I16(b)) => a.copy_values_from(b, mask),
            (AnyImage::U32(a), AnyImage::U32(b)) => a.copy_values_from(b, mask),
            (AnyImage::I32(a), AnyImage::I32(b)) => a.copy_values_from(b, mask),
            (AnyImage::F32(a), AnyImage::F32(b)) => a.copy_values_from(b, mask),
            (AnyImage::F64(a), AnyImage::F64(b)) => a.copy_values_from(b, mask),
            (a, b) => Err(Error::ImageType(format!(
                "Cannot copy between element types {} <-> {}",
                a.data_type(),
                b.data_type()
            ))),
        }
    }

    pub fn copy_rect_from(&mut self, other: &AnyImage, rect: Rect) -> Result<()> {
        match (self, other) {
            (AnyImage::U8(a), AnyImage::U8(b)) => a.copy_rect_from(b, rect),
            (AnyImage::I8(a), AnyImage::I8(b)) => a.copy_rect_from(b, rect),
            (AnyImage::U16(a), AnyImage::U16(b)) => a.copy_rect_from(b, rect),
            (AnyImage::I16(a), AnyImage::I16(b)) => a.copy_rect_from(b, rect),
            (AnyImage::U32(a), AnyImage::U32(b)) => a.copy_rect_from(b, rect),
            (AnyImage::I32(a), AnyImage::I32(b)) => a.copy_rect_from(b, rect),
            (AnyImage::F32(a), AnyImage::F32(b)) => a.copy_rect_from(b, rect),
            (AnyImage::F64(a), AnyImage::F64(b)) => a.copy_rect_from(b, rect),
            (a, b) => Err(Error::ImageType(format!(
                "Cannot copy between element types {} <-> {}",
                a.data_type(),
                b.data_type()
            ))),
        }
    }

    unerase_binary_op!(add);
    unerase_binary_op!(subtract);
    unerase_binary_op!(multiply);
    unerase_binary_op!(minimum);
    unerase_binary_op!(maximum);

    unerase_integer_binary_op!(bitwise_and);
    unerase_integer_binary_op!(bitwise_or);

    pub fn bitwise_not(&self, mask: &Mask) -> Result<AnyImage> {
        match self {
            AnyImage::U8(img) => Ok(AnyImage::U8(img.bitwise_not(mask)?)),
            AnyImage::I8(img) => Ok(AnyImage::I8(img.bitwise_not(mask)?)),
            AnyImage::U16(img) => Ok(AnyImage::U16(img.bitwise_not(mask)?)),
            AnyImage::I16(img) => Ok(AnyImage::I16(img.bitwise_not(mask)?)),
            AnyImage::U32(img) => Ok(AnyImage::U32(img.bitwise_not(mask)?)),
            AnyImage::I32(img) => Ok(AnyImage::I32(img.bitwise_not(mask)?)),
            _ => Err(Error::ImageType(format!(
                "Bitwise operations require an integer element type, got {}",
                self.data_type()
            ))),
        }
    }

    pub fn abs(&self, mask: &Mask) -> Result<AnyImage> {
        Ok(match self {
            AnyImage::U8(img) => AnyImage::U8(img.abs(mask)?),
            AnyImage::I8(img) => AnyImage::I8(img.abs(mask)?),
            AnyImage::U16(img) => AnyImage::U16(img.abs(mask)?),
            AnyImage::I16(img) => AnyImage::I16(img.abs(mask)?),
            AnyImage::U32(img) => AnyImage::U32(img.abs(mask)?),
            AnyImage::I32(img) => AnyImage::I32(img.abs(mask)?),
            AnyImage::F32(img) => AnyImage::F32(img.abs(mask)?),
            AnyImage::F64(img) => AnyImage::F64(img.abs(mask)?),
        })
    }

    pub fn mean_stddev(&self, mask: &Mask) -> Result<Vec<(f64, f64)>> {
        match self {
            AnyImage::U8(img) => img.mean_stddev(mask),
            AnyImage::I8(img) => img.mean_stddev(mask),
            AnyImage::U16(img) => img.mean_stddev(mask),
            AnyImage::I16(img) => img.mean_stddev(mask),
            AnyImage::U32(img) => img.mean_stddev(mask),
            AnyImage::I32(img) => img.mean_stddev(mask),
            AnyImage::F32(img) => img.mean_stddev(mask),
            AnyImage::F64(img) => img.mean_stddev(mask),
        }
    }

    /// Sorted distinct values. Floating point images are rejected.
    pub fn unique(&self) -> Result<Vec<i64>> {
        match self {
            AnyImage::U8(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            AnyImage::I8(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            AnyImage::U16(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            AnyImage::I16(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            AnyImage::U32(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            AnyImage::I32(img) => Ok(img.unique().into_iter().map(i64::from).collect()),
            _ => Err(Error::ImageType(format!(
                "unique() requires an integer element type, got {}",
                self.data_type()
            ))),
        }
    }

    pub fn create_single_channel_mask_from_range(&self, sets: &[IntervalSet]) -> Result<Mask> {
        match self {
            AnyImage::U8(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::I8(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::U16(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::I16(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::U32(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::I32(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::F32(img) => img.create_single_channel_mask_from_range(sets),
            AnyImage::F64(img) => img.create_single_channel_mask_from_range(sets),
        }
    }

    pub fn create_multi_channel_mask_from_range(&self, sets: &[IntervalSet]) -> Result<Mask> {
        match self {
            AnyImage::U8(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::I8(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::U16(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::I16(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::U32(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::I32(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::F32(img) => img.create_multi_channel_mask_from_range(sets),
            AnyImage::F64(img) => img.create_multi_channel_mask_from_range(sets),
        }
    }

    pub fn create_mask_from_bits(&self, bits: &[i32], set: &IntervalSet) -> Result<Mask> {
        match self {
            AnyImage::U8(img) => img.create_mask_from_bits(bits, set),
            AnyImage::I8(img) => img.create_mask_from_bits(bits, set),
            AnyImage::U16(img) => img.create_mask_from_bits(bits, set),
            AnyImage::I16(img) => img.create_mask_from_bits(bits, set),
            AnyImage::U32(img) => img.create_mask_from_bits(bits, set),
            AnyImage::I32(img) => img.create_mask_from_bits(bits, set),
            _ => Err(Error::ImageType(format!(
                "Bit extraction requires an integer element type, got {}",
                self.data_type()
            ))),
        }
    }
}

fn image_as_ref<T: PixelNum, U: PixelNum>(img: &DenseImage<U>) -> Result<&DenseImage<T>> {
    if T::TYPE == U::TYPE {
        let ptr = (img as *const DenseImage<U>).cast::<DenseImage<T>>();
        // SAFETY: T and U were just checked to be the same type
        Ok(unsafe { &*ptr })
    } else {
        Err(Error::ImageType(format!("Expected element type {}, got {}", T::TYPE, U::TYPE)))
    }
}

impl<'a, T: PixelNum> TryFrom<&'a AnyImage> for &'a DenseImage<T> {
    type Error = Error;

    fn try_from(value: &'a AnyImage) -> Result<Self> {
        match value {
            AnyImage::U8(img) => image_as_ref::<T, _>(img),
            AnyImage::I8(img) => image_as_ref::<T, _>(img),
            AnyImage::U16(img) => image_as_ref::<T, _>(img),
            AnyImage::I16(img) => image_as_ref::<T, _>(img),
            AnyImage::U32(img) => image_as_ref::<T, _>(img),
            AnyImage::I32(img) => image_as_ref::<T, _>(img),
            AnyImage::F32(img) => image_as_ref::<T, _>(img),
            AnyImage::F64(img) => image_as_ref::<T, _>(img),
        }
    }
}

macro_rules! impl_from_dense_image {
    ( $t:ty, $variant:ident ) => {
        impl From<DenseImage<$t>> for AnyImage {
            fn from(img: DenseImage<$t>) -> AnyImage {
                AnyImage::$variant(img)
            }
        }

        impl TryFrom<AnyImage> for DenseImage<$t> {
            type Error = Error;

            fn try_from(value: AnyImage) -> Result<Self> {
                match value {
                    AnyImage::$variant(img) => Ok(img),
                    other => Err(Error::ImageType(format!(
                        "Expected element type {}, got {}",
                        stringify!($t),
                        other.data_type()
                    ))),
                }
            }
        }
    };
}

impl_from_dense_image!(u8, U8);
impl_from_dense_image!(i8, I8);
impl_from_dense_image!(u16, U16);
impl_from_dense_image!(i16, I16);
impl_from_dense_image!(u32, U32);
impl_from_dense_image!(i32, I32);
impl_from_dense_image!(f32, F32);
impl_from_dense_image!(f64, F64);
