//! Truevision TGA codec.
//!
//! Decodes colour-mapped, true-colour and greyscale images, raw or
//! run-length encoded, in any of the four origins. Encodes 8-bit grey, RGB
//! and RGBA with a TGA 2.0 footer.

use std::io::{BufReader, Read, Write};

use super::{Codec, DecoderContext, EncodeJob, nearest_8bit};
use crate::config::EncodeOptions;
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::ImageInfo;
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::stream::{StreamReader, StreamWriter};

const HEADER_LEN: usize = 18;
const FOOTER_SIGNATURE: &[u8; 18] = b"TRUEVISION-XFILE.\0";

const SUPPORTED: [PixelFormat; 3] = [PixelFormat::R8U, PixelFormat::Rgb8U, PixelFormat::Rgba8U];

const DESC_RIGHT_TO_LEFT: u8 = 0x10;
const DESC_TOP_TO_BOTTOM: u8 = 0x20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Mapped,
    TrueColour,
    Grey,
}

#[derive(Clone, Copy, Debug)]
struct Header {
    id_len: u8,
    cmap_type: u8,
    image_type: u8,
    cmap_first: u16,
    cmap_len: u16,
    cmap_depth: u8,
    width: u16,
    height: u16,
    depth: u8,
    descriptor: u8,
}

impl Header {
    fn parse(b: &[u8; HEADER_LEN]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            id_len: b[0],
            cmap_type: b[1],
            image_type: b[2],
            cmap_first: u16_at(3),
            cmap_len: u16_at(5),
            cmap_depth: b[7],
            width: u16_at(12),
            height: u16_at(14),
            depth: b[16],
            descriptor: b[17],
        }
    }

    fn kind(&self) -> Option<Kind> {
        match self.image_type {
            1 | 9 => Some(Kind::Mapped),
            2 | 10 => Some(Kind::TrueColour),
            3 | 11 => Some(Kind::Grey),
            _ => None,
        }
    }

    fn is_rle(&self) -> bool {
        self.image_type >= 9
    }

    fn validate(&self) -> Result<Kind, &'static str> {
        let kind = self.kind().ok_or("unsupported image type")?;
        if self.cmap_type > 1 {
            return Err("bad colour map type");
        }
        if self.width == 0 || self.height == 0 {
            return Err("zero dimensions");
        }
        if self.descriptor & 0xC0 != 0 {
            return Err("interleaved images are not supported");
        }
        let colour_depth = |d: u8| matches!(d, 15 | 16 | 24 | 32);
        match kind {
            Kind::Mapped => {
                if self.cmap_type != 1 || self.cmap_len == 0 {
                    return Err("colour-mapped image without a colour map");
                }
                if self.depth != 8 || !colour_depth(self.cmap_depth) {
                    return Err("unsupported colour map depth");
                }
            }
            Kind::TrueColour if !colour_depth(self.depth) => return Err("unsupported pixel depth"),
            Kind::Grey if self.depth != 8 => return Err("unsupported grey depth"),
            _ => {}
        }
        if self.cmap_type == 1 && !colour_depth(self.cmap_depth) {
            return Err("unsupported colour map depth");
        }
        Ok(kind)
    }

    /// Bits of one stored colour, after colour map lookup.
    fn colour_bits(&self, kind: Kind) -> u8 {
        match kind {
            Kind::Mapped => self.cmap_depth,
            _ => self.depth,
        }
    }

    fn alpha_bits(&self) -> u8 {
        self.descriptor & 0x0F
    }

    fn pixel_format(&self, kind: Kind) -> PixelFormat {
        if kind == Kind::Grey {
            return PixelFormat::R8U;
        }
        match self.colour_bits(kind) {
            16 | 32 if self.alpha_bits() > 0 => PixelFormat::Rgba8U,
            _ => PixelFormat::Rgb8U,
        }
    }

    /// Size of the stored pixel data once run-length packets are expanded.
    fn data_len(&self) -> Option<usize> {
        usize::from(self.width)
            .checked_mul(usize::from(self.height))?
            .checked_mul(bytes_for(self.depth))
    }
}

fn bytes_for(bits: u8) -> usize {
    usize::from(bits).div_ceil(8)
}

pub(crate) struct TgaCodec;

impl Codec for TgaCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Tga
    }

    fn signature_len(&self) -> usize {
        HEADER_LEN
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        match header.first_chunk::<HEADER_LEN>() {
            Some(h) => Header::parse(h).validate().is_ok(),
            None => false,
        }
    }

    fn is_supported(&self, format: PixelFormat) -> bool {
        SUPPORTED.contains(&format)
    }

    fn resulting_pixel_format(&self, input: PixelFormat, requested: PixelFormat) -> PixelFormat {
        if self.is_supported(requested) {
            return requested;
        }
        nearest_8bit(input, &SUPPORTED)
    }

    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        let parsed = read_header(reader);
        let (header, kind) = parsed.map_err(|e| reader.classify(FileFormat::Tga, e))?;
        let pixel_format = header.pixel_format(kind);
        log::trace!(
            "tga: type {} depth {} descriptor {:#04x} -> {pixel_format:?}",
            header.image_type,
            header.depth,
            header.descriptor
        );
        Ok(Box::new(TgaContext {
            info: ImageInfo::new(
                u32::from(header.width),
                u32::from(header.height),
                FileFormat::Tga,
                pixel_format,
            ),
            header,
            kind,
        }))
    }

    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        let EncodeOptions::Tga(options) = job.options else {
            return Err(CodecError::InvalidEncodeOptions {
                format: FileFormat::Tga,
                detail: "options are not TGA options".into(),
            });
        };
        let (image_type, depth, descriptor) = match job.pixel_format {
            PixelFormat::R8U => (3u8, 8u8, DESC_TOP_TO_BOTTOM),
            PixelFormat::Rgb8U => (2, 24, DESC_TOP_TO_BOTTOM),
            PixelFormat::Rgba8U => (2, 32, DESC_TOP_TO_BOTTOM | 8),
            other => {
                return Err(CodecError::InvalidInput(format!("TGA cannot store {other:?}")));
            }
        };
        let (Ok(width), Ok(height)) = (u16::try_from(job.width), u16::try_from(job.height)) else {
            return Err(CodecError::InvalidInput(
                "TGA dimensions are limited to 65535".into(),
            ));
        };
        let image_type = if options.rle { image_type + 8 } else { image_type };

        let mut header = [0u8; HEADER_LEN];
        header[2] = image_type;
        header[12..14].copy_from_slice(&width.to_le_bytes());
        header[14..16].copy_from_slice(&height.to_le_bytes());
        header[16] = depth;
        header[17] = descriptor;
        writer
            .write_all(&header)
            .map_err(|e| writer.io_failure(FileFormat::Tga, e))?;

        let bpp = job.pixel_format.bytes_per_pixel();
        let mut swapped = Vec::with_capacity(usize::from(width) * bpp);
        let mut packed = Vec::new();
        for row in job.pixels.chunks_exact(usize::from(width) * bpp) {
            swapped.clear();
            swapped.extend_from_slice(row);
            if bpp >= 3 {
                for px in swapped.chunks_exact_mut(bpp) {
                    px.swap(0, 2);
                }
            }
            let out = if options.rle {
                packed.clear();
                write_rle_row(&mut packed, &swapped, bpp);
                &packed
            } else {
                &swapped
            };
            writer
                .write_all(out)
                .map_err(|e| writer.io_failure(FileFormat::Tga, e))?;
        }

        let mut footer = [0u8; 8 + FOOTER_SIGNATURE.len()];
        footer[8..].copy_from_slice(FOOTER_SIGNATURE);
        writer
            .write_all(&footer)
            .map_err(|e| writer.io_failure(FileFormat::Tga, e))
    }
}

fn read_header<R: Read>(r: &mut R) -> Result<(Header, Kind), String> {
    let mut raw = [0u8; HEADER_LEN];
    r.read_exact(&mut raw).map_err(|e| e.to_string())?;
    let header = Header::parse(&raw);
    let kind = header.validate()?;
    Ok((header, kind))
}

struct TgaContext {
    info: ImageInfo,
    header: Header,
    kind: Kind,
}

impl DecoderContext for TgaContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError> {
        let scratch = self
            .header
            .data_len()
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
        limits.check_memory(scratch)?;
        let result = read_image(&mut BufReader::new(&mut *reader), self.kind, dest);
        result.map_err(|e| reader.classify(FileFormat::Tga, e))
    }
}

fn read_image<R: Read>(r: &mut R, kind: Kind, dest: &mut [u8]) -> Result<(), String> {
    let (header, reread) = read_header(r)?;
    if reread != kind {
        return Err("header changed between reads".into());
    }

    let mut id = vec![0u8; usize::from(header.id_len)];
    r.read_exact(&mut id).map_err(|e| e.to_string())?;

    let palette: Vec<[u8; 4]> = if header.cmap_type == 1 {
        let entry = bytes_for(header.cmap_depth);
        let mut map = vec![0u8; usize::from(header.cmap_len) * entry];
        r.read_exact(&mut map).map_err(|e| e.to_string())?;
        map.chunks_exact(entry)
            .map(|c| expand(c, header.cmap_depth, header.alpha_bits() > 0))
            .collect()
    } else {
        Vec::new()
    };

    let width = usize::from(header.width);
    let height = usize::from(header.height);
    let elem = bytes_for(header.depth);
    let count = width * height;
    let data = if header.is_rle() {
        unpack_rle(r, elem, count)?
    } else {
        let mut data = vec![0u8; count * elem];
        r.read_exact(&mut data).map_err(|e| e.to_string())?;
        data
    };

    let channels = header.pixel_format(kind).num_channels();
    let alpha = header.alpha_bits() > 0;
    let top_down = header.descriptor & DESC_TOP_TO_BOTTOM != 0;
    let right_to_left = header.descriptor & DESC_RIGHT_TO_LEFT != 0;

    for (i, raw) in data.chunks_exact(elem).enumerate() {
        let rgba = match kind {
            Kind::Mapped => {
                let index = usize::from(raw[0])
                    .checked_sub(usize::from(header.cmap_first))
                    .and_then(|i| palette.get(i))
                    .ok_or("colour map index out of range")?;
                *index
            }
            Kind::TrueColour => expand(raw, header.depth, alpha),
            Kind::Grey => [raw[0]; 4],
        };
        let (x, y) = (i % width, i / width);
        let x = if right_to_left { width - 1 - x } else { x };
        let y = if top_down { y } else { height - 1 - y };
        let at = (y * width + x) * channels;
        dest[at..at + channels].copy_from_slice(&rgba[..channels]);
    }
    Ok(())
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, String> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(|e| e.to_string())?;
    Ok(b[0])
}

fn unpack_rle<R: Read>(r: &mut R, elem: usize, count: usize) -> Result<Vec<u8>, String> {
    let total = count * elem;
    let mut out = Vec::with_capacity(total);
    let mut px = [0u8; 4];
    while out.len() < total {
        let head = read_u8(r)?;
        let n = usize::from(head & 0x7F) + 1;
        if head & 0x80 != 0 {
            r.read_exact(&mut px[..elem]).map_err(|e| e.to_string())?;
            for _ in 0..n {
                out.extend_from_slice(&px[..elem]);
            }
        } else {
            let start = out.len();
            out.resize(start + n * elem, 0);
            r.read_exact(&mut out[start..]).map_err(|e| e.to_string())?;
        }
    }
    // The last packet may run past the image.
    out.truncate(total);
    Ok(out)
}

/// One stored BGR(A) colour as RGBA.
fn expand(px: &[u8], bits: u8, alpha: bool) -> [u8; 4] {
    match bits {
        15 | 16 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            let c = |shift: u16| {
                let x = ((v >> shift) & 0x1F) as u8;
                (x << 3) | (x >> 2)
            };
            let a = if bits == 16 && alpha && v & 0x8000 == 0 { 0 } else { 255 };
            [c(10), c(5), c(0), a]
        }
        24 => [px[2], px[1], px[0], 255],
        _ if alpha => [px[2], px[1], px[0], px[3]],
        _ => [px[2], px[1], px[0], 255],
    }
}

fn write_rle_row(out: &mut Vec<u8>, row: &[u8], bpp: usize) {
    let pixels: Vec<&[u8]> = row.chunks_exact(bpp).collect();
    let mut i = 0;
    while i < pixels.len() {
        let run = pixels[i..]
            .iter()
            .take(128)
            .take_while(|p| **p == pixels[i])
            .count();
        if run >= 2 {
            out.push(0x80 | (run - 1) as u8);
            out.extend_from_slice(pixels[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < pixels.len()
            && i - start < 128
            && !(i + 1 < pixels.len() && pixels[i] == pixels[i + 1])
        {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        for p in &pixels[start..i] {
            out.extend_from_slice(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::stream::SliceStream;

    fn header(image_type: u8, depth: u8, descriptor: u8, w: u16, h: u16) -> Vec<u8> {
        let mut b = vec![0u8; HEADER_LEN];
        b[2] = image_type;
        b[12..14].copy_from_slice(&w.to_le_bytes());
        b[14..16].copy_from_slice(&h.to_le_bytes());
        b[16] = depth;
        b[17] = descriptor;
        b
    }

    fn decode(file: &[u8]) -> (ImageInfo, Vec<u8>) {
        let mut stream = SliceStream::new(file);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = TgaCodec.open(&mut reader).unwrap();
        let info = ctx.info().clone();
        let mut out = vec![0u8; info.buffer_size(info.pixel_format).unwrap()];
        let mut stream = SliceStream::new(file);
        ctx.decode(&mut StreamReader::new(&mut stream), &mut out, &Limits::none())
            .unwrap();
        (info, out)
    }

    #[test]
    fn signature_heuristic() {
        assert!(TgaCodec.matches_signature(&header(2, 24, 0x20, 4, 4)));
        assert!(TgaCodec.matches_signature(&header(11, 8, 0, 1, 1)));
        assert!(!TgaCodec.matches_signature(&header(2, 24, 0x20, 0, 4)));
        assert!(!TgaCodec.matches_signature(&header(4, 24, 0x20, 4, 4)));
        assert!(!TgaCodec.matches_signature(&header(2, 12, 0x20, 4, 4)));
        assert!(!TgaCodec.matches_signature(&header(1, 8, 0x20, 4, 4)));
        assert!(!TgaCodec.matches_signature(&header(2, 24, 0x20, 4, 4)[..10]));
        assert!(!TgaCodec.matches_signature(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01"));
    }

    #[test]
    fn bottom_up_bgr_is_flipped() {
        let mut file = header(2, 24, 0, 1, 2);
        // Bottom row first: blue, then red on top.
        file.extend_from_slice(&[255, 0, 0, 0, 0, 255]);
        let (info, out) = decode(&file);
        assert_eq!(info.pixel_format, PixelFormat::Rgb8U);
        assert_eq!(out, [255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn rle_grey_with_right_to_left() {
        let mut file = header(11, 8, 0x30, 3, 1);
        file.extend_from_slice(&[0x81, 10, 0x00, 20]);
        let (info, out) = decode(&file);
        assert_eq!(info.pixel_format, PixelFormat::R8U);
        assert_eq!(out, [20, 10, 10]);
    }

    #[test]
    fn colour_mapped_image() {
        let mut file = header(1, 8, 0x20, 2, 1);
        file[1] = 1;
        file[3..5].copy_from_slice(&1u16.to_le_bytes());
        file[5..7].copy_from_slice(&2u16.to_le_bytes());
        file[7] = 24;
        file.extend_from_slice(&[0, 0, 255, 0, 255, 0]);
        file.extend_from_slice(&[2, 1]);
        let (_, out) = decode(&file);
        assert_eq!(out, [0, 255, 0, 255, 0, 0]);

        let mut bad = file.clone();
        let last = bad.len() - 1;
        bad[last] = 0;
        let mut stream = SliceStream::new(&bad);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = TgaCodec.open(&mut reader).unwrap();
        let mut stream = SliceStream::new(&bad);
        let mut out = vec![0u8; 6];
        assert!(matches!(
            ctx.decode(&mut StreamReader::new(&mut stream), &mut out, &Limits::none()),
            Err(CodecError::CorruptImage { .. })
        ));
    }

    #[test]
    fn sixteen_bit_colours() {
        assert_eq!(expand(&0xFFFFu16.to_le_bytes(), 16, true), [255; 4]);
        assert_eq!(expand(&0x7C00u16.to_le_bytes(), 16, true), [255, 0, 0, 0]);
        assert_eq!(expand(&0x7C00u16.to_le_bytes(), 15, false), [255, 0, 0, 255]);
    }

    #[test]
    fn rle_row_packets() {
        let row = [1u8, 1, 1, 2, 3, 4, 4];
        let mut out = Vec::new();
        write_rle_row(&mut out, &row, 1);
        assert_eq!(out, [0x82, 1, 0x01, 2, 3, 0x81, 4]);
        let unpacked = unpack_rle(&mut Cursor::new(out), 1, row.len()).unwrap();
        assert_eq!(unpacked, row);
    }

    #[test]
    fn truncated_pixels_are_corrupt() {
        let mut file = header(2, 32, 0x28, 2, 2);
        file.extend_from_slice(&[0; 5]);
        let mut stream = SliceStream::new(&file);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = TgaCodec.open(&mut reader).unwrap();
        assert_eq!(ctx.info().pixel_format, PixelFormat::Rgba8U);
        let mut out = vec![0u8; 16];
        let mut stream = SliceStream::new(&file);
        assert!(ctx.decode(&mut StreamReader::new(&mut stream), &mut out, &Limits::none()).is_err());
    }

    #[test]
    fn thirty_two_bit_without_alpha_bits_is_opaque_rgb() {
        let mut file = header(2, 32, 0x20, 2, 1);
        file.extend_from_slice(&[10, 20, 30, 0, 40, 50, 60, 7]);
        let (info, out) = decode(&file);
        assert_eq!(info.pixel_format, PixelFormat::Rgb8U);
        assert_eq!(out, [30, 20, 10, 60, 50, 40]);

        assert_eq!(expand(&[1, 2, 3, 0], 32, false), [3, 2, 1, 255]);
        assert_eq!(expand(&[1, 2, 3, 0], 32, true), [3, 2, 1, 0]);
    }

    #[test]
    fn oversized_rle_header_hits_memory_limit() {
        let mut file = header(10, 32, 0x28, u16::MAX, u16::MAX);
        file.extend_from_slice(&[0xFF, 1, 2, 3, 4]);
        let mut stream = SliceStream::new(&file);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = TgaCodec.open(&mut reader).unwrap();
        let limits = Limits::none().with_max_memory(1 << 20);
        let mut stream = SliceStream::new(&file);
        let mut out = [0u8; 4];
        assert!(matches!(
            ctx.decode(&mut StreamReader::new(&mut stream), &mut out, &limits),
            Err(CodecError::LimitExceeded(_))
        ));
    }
}
