use crate::{Error, PixelNum, Rect, Result, mask};

/// Pixel buffer with interleaved channels in row-major order.
///
/// The element type never changes after construction. Out-of-range pixel
/// access is a programming error and panics; all user-reachable misuse
/// (size or channel mismatches) surfaces as [`Error`].
#[derive(Debug, Clone, PartialEq)]
pub struct DenseImage<T: PixelNum> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

/// An 8-bit image holding only 0 (invalid) or 255 (valid). An empty mask
/// stands for "no mask" and is treated as all-valid.
pub type Mask = DenseImage<u8>;

impl<T: PixelNum> DenseImage<T> {
    pub fn zeros(width: usize, height: usize, channels: usize) -> Result<Self> {
        Self::filled_with(T::zero(), width, height, channels)
    }

    pub fn filled_with(value: T, width: usize, height: usize, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidArgument("An image needs at least one channel".to_string()));
        }

        Ok(DenseImage {
            width,
            height,
            channels,
            data: vec![value; width * height * channels],
        })
    }

    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<T>) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidArgument("An image needs at least one channel".to_string()));
        }

        if data.len() != width * height * channels {
            return Err(Error::InvalidArgument(format!(
                "Data length does not match the image dimensions: {} != {}x{}x{}",
                data.len(),
                width,
                height,
                channels
            )));
        }

        Ok(DenseImage {
            width,
            height,
            channels,
            data,
        })
    }

    /// Copies pixels out of a borrowed buffer.
    pub fn from_slice(width: usize, height: usize, channels: usize, data: &[T]) -> Result<Self> {
        Self::from_vec(width, height, channels, data.to_vec())
    }

    /// The 0x0 image, used to represent an absent mask.
    pub fn empty() -> Self {
        DenseImage {
            width: 0,
            height: 0,
            channels: 1,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn full_rect(&self) -> Rect {
        Rect::with_size(self.width as i32, self.height as i32)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn index(&self, x: usize, y: usize, c: usize) -> usize {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "Pixel access out of range: ({x}, {y}, {c}) in {}x{}x{}",
            self.width,
            self.height,
            self.channels
        );
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, c: usize) -> T {
        self.data[self.index(x, y, c)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: T) {
        let index = self.index(x, y, c);
        self.data[index] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Writes a constant at every location the mask allows.
    pub fn set_masked(&mut self, value: T, mask: &Mask) -> Result<()> {
        if mask.is_empty() {
            self.fill(value);
            return Ok(());
        }
        mask::check_compatibility(self.width, self.height, self.channels, mask)?;

        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..self.channels {
                    if mask::allows(mask, x, y, c) {
                        let index = (y * self.width + x) * self.channels + c;
                        self.data[index] = value;
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies pixels from an image of equal geometry, optionally gated by a
    /// mask. Locations the mask forbids keep their current value.
    pub fn copy_values_from(&mut self, other: &Self, mask: &Mask) -> Result<()> {
        self.check_same_geometry(other, "copy_values_from")?;
        if mask.is_empty() {
            self.data.copy_from_slice(&other.data);
            return Ok(());
        }
        mask::check_compatibility(self.width, self.height, self.channels, mask)?;

        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..self.channels {
                    if mask::allows(mask, x, y, c) {
                        let index = (y * self.width + x) * self.channels + c;
                        self.data[index] = other.data[index];
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the pixels inside `rect` from an image of equal geometry.
    pub fn copy_rect_from(&mut self, other: &Self, rect: Rect) -> Result<()> {
        self.check_same_geometry(other, "copy_rect_from")?;
        let rect = rect.intersection(&self.full_rect());
        for y in rect.y..rect.bottom() {
            let row_start = (y as usize * self.width + rect.x as usize) * self.channels;
            let row_end = row_start + rect.width as usize * self.channels;
            self.data[row_start..row_end].copy_from_slice(&other.data[row_start..row_end]);
        }
        Ok(())
    }

    /// Pastes `src` into this image with its top-left corner at (x, y).
    /// The source must fit entirely and match the channel count.
    pub fn paste(&mut self, src: &Self, x: usize, y: usize) -> Result<()> {
        if src.channels != self.channels {
            return Err(Error::ImageType(format!(
                "Cannot paste an image with {} channels into an image with {} channels",
                src.channels, self.channels
            )));
        }
        if x + src.width > self.width || y + src.height > self.height {
            return Err(Error::size_mismatch("paste target", (self.width, self.height), (src.width, src.height)));
        }

        for sy in 0..src.height {
            let dst_start = ((y + sy) * self.width + x) * self.channels;
            let src_start = sy * src.width * src.channels;
            let count = src.width * src.channels;
            self.data[dst_start..dst_start + count].copy_from_slice(&src.data[src_start..src_start + count]);
        }
        Ok(())
    }

    /// Deep copy of a sub-rectangle.
    pub fn crop(&self, rect: Rect) -> Result<Self> {
        self.check_view_rect(rect)?;
        let mut data = Vec::with_capacity(rect.width as usize * rect.height as usize * self.channels);
        for y in 0..rect.height as usize {
            let start = ((rect.y as usize + y) * self.width + rect.x as usize) * self.channels;
            data.extend_from_slice(&self.data[start..start + rect.width as usize * self.channels]);
        }
        DenseImage::from_vec(rect.width as usize, rect.height as usize, self.channels, data)
    }

    /// Read-only view of a sub-rectangle, borrowing this image's storage.
    pub fn view(&self, rect: Rect) -> Result<ImageView<'_, T>> {
        self.check_view_rect(rect)?;
        Ok(ImageView { image: self, rect })
    }

    /// Exclusive view of a sub-rectangle.
    pub fn view_mut(&mut self, rect: Rect) -> Result<ImageViewMut<'_, T>> {
        self.check_view_rect(rect)?;
        Ok(ImageViewMut { image: self, rect })
    }

    fn check_view_rect(&self, rect: Rect) -> Result<()> {
        if rect.is_empty() {
            return Err(Error::InvalidArgument("View rectangle is empty".to_string()));
        }
        if rect.x < 0 || rect.y < 0 || rect.right() > self.width as i32 || rect.bottom() > self.height as i32 {
            return Err(Error::size_mismatch(
                "view rectangle exceeds the image extent",
                (self.width, self.height),
                (rect.right().max(0) as usize, rect.bottom().max(0) as usize),
            ));
        }
        Ok(())
    }

    pub fn cast_to<U: PixelNum>(&self) -> DenseImage<U> {
        DenseImage {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.iter().map(|&v| U::from_f64_clamped(v.as_f64())).collect(),
        }
    }

    pub(crate) fn check_same_geometry(&self, other: &Self, what: &str) -> Result<()> {
        if self.size() != other.size() {
            return Err(Error::size_mismatch(what, self.size(), other.size()));
        }
        if self.channels != other.channels {
            return Err(Error::ImageType(format!(
                "{}: channel counts do not match ({} <-> {})",
                what, self.channels, other.channels
            )));
        }
        Ok(())
    }
}

impl Mask {
    /// The absent mask; every location counts as valid.
    pub fn none() -> Mask {
        DenseImage::empty()
    }

    pub fn all_valid(width: usize, height: usize) -> Mask {
        DenseImage::filled_with(255, width, height, 1).expect("mask geometry")
    }
}

/// Read-only borrow of a sub-rectangle of a [`DenseImage`].
pub struct ImageView<'a, T: PixelNum> {
    image: &'a DenseImage<T>,
    rect: Rect,
}

impl<T: PixelNum> ImageView<'_, T> {
    pub fn width(&self) -> usize {
        self.rect.width as usize
    }

    pub fn height(&self) -> usize {
        self.rect.height as usize
    }

    pub fn channels(&self) -> usize {
        self.image.channels()
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, c: usize) -> T {
        assert!(x < self.width() && y < self.height(), "View access out of range: ({x}, {y})");
        self.image.at(self.rect.x as usize + x, self.rect.y as usize + y, c)
    }

    pub fn to_image(&self) -> DenseImage<T> {
        self.image.crop(self.rect).expect("view rectangle was validated")
    }
}

/// Exclusive borrow of a sub-rectangle of a [`DenseImage`].
pub struct ImageViewMut<'a, T: PixelNum> {
    image: &'a mut DenseImage<T>,
    rect: Rect,
}

impl<T: PixelNum> ImageViewMut<'_, T> {
    pub fn width(&self) -> usize {
        self.rect.width as usize
    }

    pub fn height(&self) -> usize {
        self.rect.height as usize
    }

    pub fn channels(&self) -> usize {
        self.image.channels()
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, c: usize) -> T {
        assert!(x < self.width() && y < self.height(), "View access out of range: ({x}, {y})");
        self.image.at(self.rect.x as usize + x, self.rect.y as usize + y, c)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: T) {
        assert!(x < self.width() && y < self.height(), "View access out of range: ({x}, {y})");
        self.image.set(self.rect.x as usize + x, self.rect.y as usize + y, c, value);
    }

    /// Overwrites the viewed rectangle with the pixels of `src`, which must
    /// have the view's geometry.
    pub fn copy_from(&mut self, src: &DenseImage<T>) -> Result<()> {
        if src.size() != (self.width(), self.height()) || src.channels() != self.channels() {
            return Err(Error::size_mismatch("view copy_from", (self.width(), self.height()), src.size()));
        }

        self.image.paste(src, self.rect.x as usize, self.rect.y as usize)
    }
}
