//! Image metadata produced by opening a decode session.

use crate::error::CodecError;
use crate::format::FileFormat;
use crate::pixel::{BitDepth, NumericKind, PixelFormat};

/// Profile name used when a file carries no name, or the caller supplied an
/// empty one. Decoded profile names are never empty.
pub const DEFAULT_PROFILE_NAME: &str = "empty";

/// Longest accepted colour profile name, in bytes.
pub const MAX_PROFILE_NAME_LEN: usize = 30;

/// Header-derived facts about an image.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub file_format: FileFormat,
    /// Pixel format the codec produces without conversion.
    pub pixel_format: PixelFormat,
    /// Never empty; [`DEFAULT_PROFILE_NAME`] when the file names none.
    pub profile_name: String,
    /// Embedded ICC profile bytes; empty if the file has none.
    pub colour_profile: Vec<u8>,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32, file_format: FileFormat, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            file_format,
            pixel_format,
            profile_name: DEFAULT_PROFILE_NAME.to_owned(),
            colour_profile: Vec::new(),
        }
    }

    /// Attach a colour profile. An empty name becomes [`DEFAULT_PROFILE_NAME`].
    pub fn with_colour_profile(mut self, name: &str, data: Vec<u8>) -> Self {
        self.profile_name = resolve_profile_name(name).to_owned();
        self.colour_profile = data;
        self
    }

    /// Remove any colour profile, restoring the default name.
    pub fn without_colour_profile(mut self) -> Self {
        self.profile_name = DEFAULT_PROFILE_NAME.to_owned();
        self.colour_profile.clear();
        self
    }

    pub fn has_colour_profile(&self) -> bool {
        !self.colour_profile.is_empty()
    }

    pub fn num_channels(&self) -> usize {
        self.pixel_format.num_channels()
    }

    pub fn bytes_per_channel(&self) -> usize {
        self.pixel_format.bytes_per_channel()
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.pixel_format.bit_depth()
    }

    pub fn numeric_kind(&self) -> NumericKind {
        self.pixel_format.numeric_kind()
    }

    /// Destination size for decoding into `format`.
    pub fn buffer_size(&self, format: PixelFormat) -> Result<usize, CodecError> {
        format
            .buffer_size(self.width, self.height)
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))
    }
}

/// Substitute the placeholder for an empty profile name.
pub fn resolve_profile_name(name: &str) -> &str {
    if name.is_empty() { DEFAULT_PROFILE_NAME } else { name }
}

/// Names must fit [`MAX_PROFILE_NAME_LEN`] and be printable ASCII, which keeps
/// them storable as a PNG keyword.
pub(crate) fn validate_profile_name(name: &str) -> Result<(), CodecError> {
    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(CodecError::InvalidInput(format!(
            "colour profile name is {} bytes, at most {MAX_PROFILE_NAME_LEN} allowed",
            name.len()
        )));
    }
    if !name.bytes().all(|b| (b' '..=b'~').contains(&b)) {
        return Err(CodecError::InvalidInput(
            "colour profile name must be printable ASCII".into(),
        ));
    }
    if name.starts_with(' ') || name.ends_with(' ') || name.contains("  ") {
        return Err(CodecError::InvalidInput(
            "colour profile name has leading, trailing or repeated spaces".into(),
        ));
    }
    Ok(())
}
