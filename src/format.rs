//! Container file formats handled by the engine.

use core::fmt;

/// Supported image file formats.
///
/// Detection from stream content lives in [`CodecRegistry::detect`](crate::CodecRegistry::detect),
/// since each codec owns its own signature check.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Png,
    Jpeg,
    /// Radiance RGBE (`.hdr`).
    Hdr,
    /// Truevision TGA.
    Tga,
    /// OpenEXR.
    Exr,
}

impl FileFormat {
    /// Every format known to the engine, whether or not its codec is compiled in.
    pub const ALL: [FileFormat; 5] = [
        FileFormat::Png,
        FileFormat::Jpeg,
        FileFormat::Hdr,
        FileFormat::Tga,
        FileFormat::Exr,
    ];

    /// Detect format from file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(FileFormat::Png),
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(FileFormat::Jpeg),
            "hdr" | "rgbe" | "pic" => Some(FileFormat::Hdr),
            "tga" | "icb" | "vda" | "vst" => Some(FileFormat::Tga),
            "exr" => Some(FileFormat::Exr),
            _ => None,
        }
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Png => "PNG",
            FileFormat::Jpeg => "JPEG",
            FileFormat::Hdr => "Radiance HDR",
            FileFormat::Tga => "TGA",
            FileFormat::Exr => "OpenEXR",
        }
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            FileFormat::Png => "image/png",
            FileFormat::Jpeg => "image/jpeg",
            FileFormat::Hdr => "image/vnd.radiance",
            FileFormat::Tga => "image/x-tga",
            FileFormat::Exr => "image/x-exr",
        }
    }

    /// Common file extensions.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileFormat::Png => &["png"],
            FileFormat::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            FileFormat::Hdr => &["hdr", "rgbe", "pic"],
            FileFormat::Tga => &["tga", "icb", "vda", "vst"],
            FileFormat::Exr => &["exr"],
        }
    }

    /// Whether encoding to this format discards information.
    ///
    /// Radiance HDR counts as lossy: the shared exponent keeps roughly
    /// 8 bits of mantissa per channel.
    pub fn is_lossy(self) -> bool {
        match self {
            FileFormat::Png => false,
            FileFormat::Jpeg => true,
            FileFormat::Hdr => true,
            FileFormat::Tga => false,
            FileFormat::Exr => false,
        }
    }

    /// Whether the container can carry an embedded colour profile.
    pub fn supports_colour_profile(self) -> bool {
        match self {
            FileFormat::Png => true,
            FileFormat::Jpeg => true,
            FileFormat::Hdr => false,
            FileFormat::Tga => false,
            FileFormat::Exr => false,
        }
    }

    /// Whether the format can store an alpha channel.
    pub fn supports_alpha(self) -> bool {
        match self {
            FileFormat::Png => true,
            FileFormat::Jpeg => false,
            FileFormat::Hdr => false,
            FileFormat::Tga => true,
            FileFormat::Exr => true,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
