//! Resource limits.

use crate::error::CodecError;

/// Resource limits for decode/encode operations.
///
/// Guards against hostile headers that claim huge dimensions. All limits are optional.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,
    /// Maximum image height in pixels.
    pub max_height: Option<u32>,
    /// Maximum total pixels (width x height).
    pub max_pixels: Option<u64>,
    /// Maximum size of any single pixel buffer the engine allocates.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    /// Create a new Limits with no restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Check if dimensions are within limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), CodecError> {
        if let Some(max_width) = self.max_width
            && width > max_width
        {
            return Err(CodecError::LimitExceeded("width exceeds limit"));
        }

        if let Some(max_height) = self.max_height
            && height > max_height
        {
            return Err(CodecError::LimitExceeded("height exceeds limit"));
        }

        if let Some(max_pixels) = self.max_pixels {
            let pixels = u64::from(width) * u64::from(height);
            if pixels > max_pixels {
                return Err(CodecError::LimitExceeded("pixel count exceeds limit"));
            }
        }

        Ok(())
    }

    /// Check if a memory allocation is within limits.
    pub fn check_memory(&self, bytes: usize) -> Result<(), CodecError> {
        if let Some(max_memory) = self.max_memory_bytes
            && bytes as u64 > max_memory
        {
            return Err(CodecError::LimitExceeded("memory allocation exceeds limit"));
        }
        Ok(())
    }
}
