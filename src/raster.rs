//! Owns a decoded RGBA frame and its dimensions (C1).

use image::RgbaImage;

use crate::error::StackError;

/// An owned H·W·4 byte RGBA buffer in row-major order.
///
/// Backed by [`image::RgbaImage`] so external decoders that already produce
/// one can hand it over without a copy, and so the warp/reduce stages can
/// reuse the same pixel container the rest of the ambient stack understands.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    inner: RgbaImage,
}

impl Raster {
    /// A zeroed raster of the given dimensions (alpha 0 everywhere).
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: RgbaImage::new(width, height),
        }
    }

    /// Builds a raster from an existing RGBA byte buffer, validating that its
    /// length matches `4 * width * height` exactly.
    pub fn from_rgba(bytes: Vec<u8>, width: u32, height: u32) -> Result<Self, StackError> {
        let expected = 4usize
            .checked_mul(width as usize)
            .and_then(|v| v.checked_mul(height as usize))
            .ok_or_else(|| StackError::InvalidInput("raster dimensions overflow".into()))?;
        if bytes.len() != expected {
            return Err(StackError::InvalidInput(format!(
                "expected {} bytes for {}x{} raster, got {}",
                expected,
                width,
                height,
                bytes.len()
            )));
        }
        let inner = RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| StackError::InvalidInput("failed to build raster buffer".into()))?;
        Ok(Self { inner })
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.inner.width(), self.inner.height())
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_raw()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_raw()
    }

    #[inline]
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        self.inner.get_pixel(x, y).0
    }

    #[inline]
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.inner.get_pixel(x, y).0[3]
    }

    #[inline]
    pub fn set_rgba(&mut self, x: u32, y: u32, px: [u8; 4]) {
        self.inner.get_pixel_mut(x, y).0 = px;
    }

    /// `true` when this pixel counts as a contributing sample downstream
    /// (alpha strictly above the 128 validity threshold used throughout §4.5).
    #[inline]
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        self.alpha(x, y) > 128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_zeroed() {
        let r = Raster::new(4, 3);
        assert_eq!(r.dims(), (4, 3));
        assert_eq!(r.as_bytes().len(), 4 * 4 * 3);
        assert!(r.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_rgba_validates_length() {
        let bytes = vec![0u8; 4 * 2 * 2];
        assert!(Raster::from_rgba(bytes.clone(), 2, 2).is_ok());
        assert!(Raster::from_rgba(bytes, 3, 2).is_err());
    }

    #[test]
    fn rgba_roundtrip() {
        let mut r = Raster::new(2, 2);
        r.set_rgba(1, 0, [10, 20, 30, 255]);
        assert_eq!(r.rgba(1, 0), [10, 20, 30, 255]);
        assert_eq!(r.alpha(1, 0), 255);
        assert!(r.is_valid(1, 0));
        assert!(!r.is_valid(0, 0));
    }
}
