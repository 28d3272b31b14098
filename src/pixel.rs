//! Pixel format descriptors.
//!
//! A [`PixelFormat`] is a channel layout paired with a sample depth and a
//! numeric kind. 8 bit samples are unsigned integers, 16 bit samples are
//! unsigned integers or IEEE half floats ([`half::f16`]), 32 bit samples are
//! IEEE floats. Buffers are tightly packed, row-major, with native-endian
//! multi-byte samples.

/// Channel arrangement within a pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// Single channel (grey or red).
    R,
    /// Two channels (grey + alpha is not implied; stored as red, green).
    Rg,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    /// Number of channels per pixel.
    pub const fn channels(self) -> usize {
        match self {
            ChannelLayout::R => 1,
            ChannelLayout::Rg => 2,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }

    /// Layout with the given channel count.
    pub const fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::R),
            2 => Some(ChannelLayout::Rg),
            3 => Some(ChannelLayout::Rgb),
            4 => Some(ChannelLayout::Rgba),
            _ => None,
        }
    }
}

/// Bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BitDepth {
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl BitDepth {
    /// Bytes used by one sample.
    pub const fn bytes(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
            BitDepth::ThirtyTwo => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Numeric interpretation used when only the depth is known. 16 bits
    /// defaults to integer.
    pub const fn numeric_kind(self) -> NumericKind {
        match self {
            BitDepth::Eight | BitDepth::Sixteen => NumericKind::Integer,
            BitDepth::ThirtyTwo => NumericKind::Float,
        }
    }

    /// Whether samples of this depth can hold `kind`.
    pub const fn supports(self, kind: NumericKind) -> bool {
        !matches!(
            (self, kind),
            (BitDepth::Eight, NumericKind::Float) | (BitDepth::ThirtyTwo, NumericKind::Integer)
        )
    }
}

/// How a sample's bits are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// Unsigned normalised integer.
    Integer,
    Float,
}

/// In-memory pixel format: layout and depth.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8U,
    Rg8U,
    Rgb8U,
    Rgba8U,
    R16U,
    Rg16U,
    Rgb16U,
    Rgba16U,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
}

impl PixelFormat {
    /// All pixel formats, ordered by depth, then numeric kind, then channel count.
    pub const ALL: [PixelFormat; 16] = [
        PixelFormat::R8U,
        PixelFormat::Rg8U,
        PixelFormat::Rgb8U,
        PixelFormat::Rgba8U,
        PixelFormat::R16U,
        PixelFormat::Rg16U,
        PixelFormat::Rgb16U,
        PixelFormat::Rgba16U,
        PixelFormat::R16F,
        PixelFormat::Rg16F,
        PixelFormat::Rgb16F,
        PixelFormat::Rgba16F,
        PixelFormat::R32F,
        PixelFormat::Rg32F,
        PixelFormat::Rgb32F,
        PixelFormat::Rgba32F,
    ];

    /// Compose a format from layout and depth, using the depth's default
    /// numeric kind.
    pub const fn new(layout: ChannelLayout, depth: BitDepth) -> Self {
        use ChannelLayout as L;
        match (depth, layout) {
            (BitDepth::Eight, L::R) => PixelFormat::R8U,
            (BitDepth::Eight, L::Rg) => PixelFormat::Rg8U,
            (BitDepth::Eight, L::Rgb) => PixelFormat::Rgb8U,
            (BitDepth::Eight, L::Rgba) => PixelFormat::Rgba8U,
            (BitDepth::Sixteen, L::R) => PixelFormat::R16U,
            (BitDepth::Sixteen, L::Rg) => PixelFormat::Rg16U,
            (BitDepth::Sixteen, L::Rgb) => PixelFormat::Rgb16U,
            (BitDepth::Sixteen, L::Rgba) => PixelFormat::Rgba16U,
            (BitDepth::ThirtyTwo, L::R) => PixelFormat::R32F,
            (BitDepth::ThirtyTwo, L::Rg) => PixelFormat::Rg32F,
            (BitDepth::ThirtyTwo, L::Rgb) => PixelFormat::Rgb32F,
            (BitDepth::ThirtyTwo, L::Rgba) => PixelFormat::Rgba32F,
        }
    }

    /// Compose a format from all three attributes.
    ///
    /// Returns `None` for combinations that have no representation, such as
    /// 8-bit float or 32-bit integer.
    pub const fn from_parts(layout: ChannelLayout, depth: BitDepth, kind: NumericKind) -> Option<Self> {
        use ChannelLayout as L;
        match (depth, kind) {
            (BitDepth::Sixteen, NumericKind::Float) => Some(match layout {
                L::R => PixelFormat::R16F,
                L::Rg => PixelFormat::Rg16F,
                L::Rgb => PixelFormat::Rgb16F,
                L::Rgba => PixelFormat::Rgba16F,
            }),
            _ if depth.supports(kind) => Some(Self::new(layout, depth)),
            _ => None,
        }
    }

    pub const fn layout(self) -> ChannelLayout {
        use PixelFormat::*;
        match self {
            R8U | R16U | R16F | R32F => ChannelLayout::R,
            Rg8U | Rg16U | Rg16F | Rg32F => ChannelLayout::Rg,
            Rgb8U | Rgb16U | Rgb16F | Rgb32F => ChannelLayout::Rgb,
            Rgba8U | Rgba16U | Rgba16F | Rgba32F => ChannelLayout::Rgba,
        }
    }

    /// The depth component of the format.
    pub const fn bit_depth(self) -> BitDepth {
        use PixelFormat::*;
        match self {
            R8U | Rg8U | Rgb8U | Rgba8U => BitDepth::Eight,
            R16U | Rg16U | Rgb16U | Rgba16U => BitDepth::Sixteen,
            R16F | Rg16F | Rgb16F | Rgba16F => BitDepth::Sixteen,
            R32F | Rg32F | Rgb32F | Rgba32F => BitDepth::ThirtyTwo,
        }
    }

    pub const fn numeric_kind(self) -> NumericKind {
        use PixelFormat::*;
        match self {
            R16F | Rg16F | Rgb16F | Rgba16F => NumericKind::Float,
            _ => self.bit_depth().numeric_kind(),
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self.numeric_kind(), NumericKind::Float)
    }

    pub const fn num_channels(self) -> usize {
        self.layout().channels()
    }

    pub const fn bytes_per_channel(self) -> usize {
        self.bit_depth().bytes()
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.num_channels() * self.bytes_per_channel()
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self.layout(), ChannelLayout::Rgba)
    }

    /// Same layout at a different depth.
    ///
    /// The numeric kind is kept when the new depth can hold it, so float
    /// formats stay float at 16 bits. 8 bits is always integer and 32 bits
    /// always float.
    pub const fn change_bit_depth(self, depth: BitDepth) -> Self {
        let kind = if depth.supports(self.numeric_kind()) {
            self.numeric_kind()
        } else {
            depth.numeric_kind()
        };
        match Self::from_parts(self.layout(), depth, kind) {
            Some(format) => format,
            None => Self::new(self.layout(), depth),
        }
    }

    /// Same depth and numeric kind with a different layout.
    pub const fn with_layout(self, layout: ChannelLayout) -> Self {
        match Self::from_parts(layout, self.bit_depth(), self.numeric_kind()) {
            Some(format) => format,
            None => Self::new(layout, self.bit_depth()),
        }
    }

    /// Bytes needed for a tightly packed `width` x `height` buffer.
    ///
    /// Returns `None` on arithmetic overflow.
    pub fn buffer_size(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }

    /// Bytes in one row.
    pub fn row_bytes(self, width: u32) -> Option<usize> {
        (width as usize).checked_mul(self.bytes_per_pixel())
    }
}
