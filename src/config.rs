//! Format-specific encode options.
//!
//! [`EncodeOptions`] is a tagged union with one variant per file format. An
//! encode request carrying options for a different format, or values out of
//! range, fails with [`CodecError::InvalidEncodeOptions`].

use crate::error::CodecError;
use crate::format::FileFormat;

/// PNG row filter applied before deflate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PngFilter {
    None,
    Sub,
    Up,
    Average,
    Paeth,
    /// Choose per row.
    #[default]
    Adaptive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PngOptions {
    /// zlib level, 0 (store) through 9 (smallest).
    pub compression_level: u8,
    pub filter: PngFilter,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            filter: PngFilter::default(),
        }
    }
}

impl PngOptions {
    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_filter(mut self, filter: PngFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Chroma subsampling for JPEG colour images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChromaSubsampling {
    /// 4:4:4
    None,
    /// 4:2:2
    Half,
    /// 4:2:0
    #[default]
    Quarter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JpegOptions {
    /// 1 (worst) through 100 (best).
    pub quality: u8,
    pub subsampling: ChromaSubsampling,
    pub progressive: bool,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            quality: 90,
            subsampling: ChromaSubsampling::default(),
            progressive: false,
        }
    }
}

impl JpegOptions {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_subsampling(mut self, subsampling: ChromaSubsampling) -> Self {
        self.subsampling = subsampling;
        self
    }

    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TgaOptions {
    /// Run-length encode pixel packets.
    pub rle: bool,
}

/// Radiance HDR has no tunables: scanlines 8 to 32767 pixels wide are always
/// written with adaptive run-length encoding, others flat.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HdrOptions {}

/// Lossless block compression for OpenEXR scanlines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExrCompression {
    None,
    Rle,
    /// zlib over 16-line blocks.
    #[default]
    Zip,
    /// Wavelet, good for noisy photographic data.
    Piz,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExrOptions {
    pub compression: ExrCompression,
}

impl ExrOptions {
    pub fn with_compression(mut self, compression: ExrCompression) -> Self {
        self.compression = compression;
        self
    }
}

/// Encoder settings for one file format.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeOptions {
    Png(PngOptions),
    Jpeg(JpegOptions),
    Tga(TgaOptions),
    Hdr(HdrOptions),
    Exr(ExrOptions),
}

impl EncodeOptions {
    /// Defaults for `format`.
    pub fn default_for(format: FileFormat) -> Self {
        match format {
            FileFormat::Png => EncodeOptions::Png(PngOptions::default()),
            FileFormat::Jpeg => EncodeOptions::Jpeg(JpegOptions::default()),
            FileFormat::Tga => EncodeOptions::Tga(TgaOptions::default()),
            FileFormat::Hdr => EncodeOptions::Hdr(HdrOptions::default()),
            FileFormat::Exr => EncodeOptions::Exr(ExrOptions::default()),
        }
    }

    /// The format these options belong to.
    pub fn format(&self) -> FileFormat {
        match self {
            EncodeOptions::Png(_) => FileFormat::Png,
            EncodeOptions::Jpeg(_) => FileFormat::Jpeg,
            EncodeOptions::Tga(_) => FileFormat::Tga,
            EncodeOptions::Hdr(_) => FileFormat::Hdr,
            EncodeOptions::Exr(_) => FileFormat::Exr,
        }
    }

    /// Check that the options target `format` and hold in-range values.
    pub fn validate_for(&self, format: FileFormat) -> Result<(), CodecError> {
        let invalid = |detail: String| CodecError::InvalidEncodeOptions { format, detail };
        if self.format() != format {
            return Err(invalid(format!("options are for {}", self.format())));
        }
        match self {
            EncodeOptions::Png(png) if png.compression_level > 9 => Err(invalid(format!(
                "compression level {} outside 0..=9",
                png.compression_level
            ))),
            EncodeOptions::Jpeg(jpeg) if !(1..=100).contains(&jpeg.quality) => Err(invalid(format!(
                "quality {} outside 1..=100",
                jpeg.quality
            ))),
            _ => Ok(()),
        }
    }
}

impl From<PngOptions> for EncodeOptions {
    fn from(options: PngOptions) -> Self {
        EncodeOptions::Png(options)
    }
}

impl From<JpegOptions> for EncodeOptions {
    fn from(options: JpegOptions) -> Self {
        EncodeOptions::Jpeg(options)
    }
}

impl From<TgaOptions> for EncodeOptions {
    fn from(options: TgaOptions) -> Self {
        EncodeOptions::Tga(options)
    }
}

impl From<HdrOptions> for EncodeOptions {
    fn from(options: HdrOptions) -> Self {
        EncodeOptions::Hdr(options)
    }
}

impl From<ExrOptions> for EncodeOptions {
    fn from(options: ExrOptions) -> Self {
        EncodeOptions::Exr(options)
    }
}
