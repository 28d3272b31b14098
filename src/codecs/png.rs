//! PNG codec adapter using the png crate.
//!
//! The png crate does not expose the iCCP profile name, so colour profiles are
//! read by walking chunks directly and written as a raw chunk, with
//! miniz_oxide doing the zlib work.

use std::borrow::Cow;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use super::{Codec, DecoderContext, EncodeJob, same_colour_channels, swap_be16_in_place};
use crate::config::{EncodeOptions, PngFilter, PngOptions};
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::{ImageInfo, resolve_profile_name};
use crate::limits::Limits;
use crate::pixel::{BitDepth, ChannelLayout, PixelFormat};
use crate::stream::{StreamReader, StreamWriter};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const SUPPORTED: [PixelFormat; 6] = [
    PixelFormat::R8U,
    PixelFormat::Rgb8U,
    PixelFormat::Rgba8U,
    PixelFormat::R16U,
    PixelFormat::Rgb16U,
    PixelFormat::Rgba16U,
];

pub(crate) struct PngCodec;

impl Codec for PngCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Png
    }

    fn signature_len(&self) -> usize {
        SIGNATURE.len()
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(&SIGNATURE)
    }

    fn is_supported(&self, format: PixelFormat) -> bool {
        SUPPORTED.contains(&format)
    }

    fn resulting_pixel_format(&self, input: PixelFormat, requested: PixelFormat) -> PixelFormat {
        if self.is_supported(requested) {
            return requested;
        }
        let layout = match input.layout() {
            ChannelLayout::Rg => ChannelLayout::Rgb,
            other => other,
        };
        let depth = match input.bit_depth() {
            BitDepth::ThirtyTwo => BitDepth::Sixteen,
            other => other,
        };
        PixelFormat::new(layout, depth)
    }

    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        let profile = read_iccp(reader)?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| reader.classify(FileFormat::Png, e))?;

        let header = start_decoder(reader, false).map(|png| {
            let info = png.info();
            let (color, depth) = png.output_color_type();
            (info.width, info.height, color, depth)
        });
        let (width, height, color, depth) = header.map_err(|e| reader.classify(FileFormat::Png, e))?;

        let layout = match color {
            png::ColorType::Grayscale => ChannelLayout::R,
            png::ColorType::Rgb => ChannelLayout::Rgb,
            png::ColorType::GrayscaleAlpha | png::ColorType::Rgba => ChannelLayout::Rgba,
            png::ColorType::Indexed => {
                return Err(CodecError::corrupt(FileFormat::Png, "palette was not expanded"));
            }
        };
        let bit_depth = match depth {
            png::BitDepth::Sixteen => BitDepth::Sixteen,
            _ => BitDepth::Eight,
        };

        let mut info = ImageInfo::new(width, height, FileFormat::Png, PixelFormat::new(layout, bit_depth));
        if let Some((name, data)) = profile {
            // Grey + alpha (or grey + tRNS) is widened to RGBA; a grey profile
            // no longer describes the output.
            if color == png::ColorType::GrayscaleAlpha {
                log::debug!("png: dropping colour profile {name:?}, grey image widened to RGBA");
            } else {
                info = info.with_colour_profile(&name, data);
            }
        }

        Ok(Box::new(PngContext { info, color }))
    }

    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        let EncodeOptions::Png(options) = job.options else {
            return Err(CodecError::InvalidEncodeOptions {
                format: FileFormat::Png,
                detail: "options are not PNG options".into(),
            });
        };

        let color = match job.pixel_format.layout() {
            ChannelLayout::R => png::ColorType::Grayscale,
            ChannelLayout::Rgb => png::ColorType::Rgb,
            ChannelLayout::Rgba => png::ColorType::Rgba,
            ChannelLayout::Rg => {
                return Err(CodecError::InvalidInput("PNG cannot store two-channel images".into()));
            }
        };
        let (depth, data) = match job.pixel_format.bit_depth() {
            BitDepth::Eight => (png::BitDepth::Eight, Cow::Borrowed(job.pixels)),
            BitDepth::Sixteen => {
                let mut be = job.pixels.to_vec();
                swap_be16_in_place(&mut be);
                (png::BitDepth::Sixteen, Cow::Owned(be))
            }
            BitDepth::ThirtyTwo => {
                return Err(CodecError::InvalidInput("PNG cannot store float samples".into()));
            }
        };

        let iccp = job
            .colour_profile
            .map(|profile| iccp_payload(job.profile_name, profile));

        let result = write_png(&mut *writer, job, color, depth, options, iccp.as_deref(), &data);
        result.map_err(|e| writer.classify(FileFormat::Png, e))
    }

    fn keeps_profile(&self, source: PixelFormat, written: PixelFormat) -> bool {
        same_colour_channels(source, written)
    }
}

struct PngContext {
    info: ImageInfo,
    /// Colour type after palette and tRNS expansion.
    color: png::ColorType,
}

impl PngContext {
    fn decode_into(
        &self,
        reader: &mut StreamReader<'_>,
        dest: &mut [u8],
        strip16: bool,
        limits: &Limits,
    ) -> Result<(), CodecError> {
        limits.check_memory(self.frame_len(strip16)?)?;
        let frame = read_frame(reader, strip16);
        let frame = frame.map_err(|detail| reader.classify(FileFormat::Png, detail))?;
        write_output(&frame, dest)
    }

    /// Bytes the png crate needs for one expanded frame.
    fn frame_len(&self, strip16: bool) -> Result<usize, CodecError> {
        let sample = match self.info.pixel_format.bit_depth() {
            BitDepth::Sixteen if !strip16 => 2,
            _ => 1,
        };
        let pixels = u64::from(self.info.width) * u64::from(self.info.height);
        usize::try_from(pixels)
            .ok()
            .and_then(|n| n.checked_mul(self.color.samples() * sample))
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))
    }
}

impl DecoderContext for PngContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError> {
        self.decode_into(reader, dest, false, limits)
    }

    fn can_decode_as(&self, format: PixelFormat) -> bool {
        let native = self.info.pixel_format;
        native.bit_depth() == BitDepth::Sixteen && format == native.change_bit_depth(BitDepth::Eight)
    }

    fn decode_as(
        &mut self,
        reader: &mut StreamReader<'_>,
        dest: &mut [u8],
        format: PixelFormat,
        limits: &Limits,
    ) -> Result<(), CodecError> {
        if !self.can_decode_as(format) {
            return Err(CodecError::UnsupportedConversion {
                format: FileFormat::Png,
                from: self.info.pixel_format,
                to: format,
            });
        }
        self.decode_into(reader, dest, true, limits)
    }
}

type PngReader<'r, 's> = png::Reader<BufReader<&'r mut StreamReader<'s>>>;

fn start_decoder<'r, 's>(reader: &'r mut StreamReader<'s>, strip16: bool) -> Result<PngReader<'r, 's>, png::DecodingError> {
    let mut decoder = png::Decoder::new(BufReader::new(reader));
    let mut transformations = png::Transformations::EXPAND;
    if strip16 {
        transformations |= png::Transformations::STRIP_16;
    }
    decoder.set_transformations(transformations);
    decoder.read_info()
}

struct Frame {
    raw: Vec<u8>,
    color: png::ColorType,
    depth: png::BitDepth,
}

fn read_frame(reader: &mut StreamReader<'_>, strip16: bool) -> Result<Frame, String> {
    let mut png = start_decoder(reader, strip16).map_err(|e| e.to_string())?;
    let size = png
        .output_buffer_size()
        .ok_or("cannot determine PNG output buffer size")?;
    let mut raw = vec![0u8; size];
    let output = png.next_frame(&mut raw).map_err(|e| e.to_string())?;
    raw.truncate(output.buffer_size());
    let (color, depth) = png.output_color_type();
    Ok(Frame { raw, color, depth })
}

fn write_output(frame: &Frame, dest: &mut [u8]) -> Result<(), CodecError> {
    let sample = if frame.depth == png::BitDepth::Sixteen { 2 } else { 1 };
    let mismatch = || CodecError::corrupt(FileFormat::Png, "decoded size does not match header");

    if frame.color == png::ColorType::GrayscaleAlpha {
        if frame.raw.len() / 2 * 4 != dest.len() {
            return Err(mismatch());
        }
        for (ga, out) in frame
            .raw
            .chunks_exact(2 * sample)
            .zip(dest.chunks_exact_mut(4 * sample))
        {
            let (grey, alpha) = ga.split_at(sample);
            out[..sample].copy_from_slice(grey);
            out[sample..2 * sample].copy_from_slice(grey);
            out[2 * sample..3 * sample].copy_from_slice(grey);
            out[3 * sample..].copy_from_slice(alpha);
        }
    } else {
        if frame.raw.len() != dest.len() {
            return Err(mismatch());
        }
        dest.copy_from_slice(&frame.raw);
    }

    if sample == 2 {
        swap_be16_in_place(dest);
    }
    Ok(())
}

/// Find the iCCP chunk, which must precede PLTE and IDAT.
fn read_iccp(reader: &mut StreamReader<'_>) -> Result<Option<(String, Vec<u8>)>, CodecError> {
    let mut signature = [0u8; 8];
    reader
        .read_exact(&mut signature)
        .map_err(|e| reader.classify(FileFormat::Png, e))?;
    if signature != SIGNATURE {
        return Err(CodecError::corrupt(FileFormat::Png, "missing PNG signature"));
    }

    loop {
        let mut head = [0u8; 8];
        reader
            .read_exact(&mut head)
            .map_err(|e| reader.classify(FileFormat::Png, format!("truncated chunk header: {e}")))?;
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        if len > 0x7FFF_FFFF {
            return Err(CodecError::corrupt(FileFormat::Png, "chunk length out of range"));
        }
        match &head[4..] {
            b"iCCP" => {
                let mut body = Vec::new();
                let read = (&mut *reader).take(u64::from(len)).read_to_end(&mut body);
                read.map_err(|e| reader.classify(FileFormat::Png, e))?;
                if body.len() != len as usize {
                    return Err(CodecError::corrupt(FileFormat::Png, "truncated iCCP chunk"));
                }
                log::trace!("png: iCCP chunk, {len} bytes");
                return parse_iccp(&body);
            }
            b"PLTE" | b"IDAT" | b"IEND" => return Ok(None),
            _ => {
                reader
                    .seek(SeekFrom::Current(i64::from(len) + 4))
                    .map_err(|e| reader.classify(FileFormat::Png, e))?;
            }
        }
    }
}

fn parse_iccp(body: &[u8]) -> Result<Option<(String, Vec<u8>)>, CodecError> {
    let nul = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| CodecError::corrupt(FileFormat::Png, "iCCP name is not terminated"))?;
    // Keywords are Latin-1.
    let name: String = body[..nul].iter().map(|&b| char::from(b)).collect();
    match body.get(nul + 1) {
        Some(0) => {}
        _ => return Err(CodecError::corrupt(FileFormat::Png, "unknown iCCP compression method")),
    }
    let profile = miniz_oxide::inflate::decompress_to_vec_zlib(&body[nul + 2..])
        .map_err(|e| CodecError::corrupt(FileFormat::Png, format!("iCCP profile: {e:?}")))?;
    if profile.is_empty() {
        return Ok(None);
    }
    Ok(Some((resolve_profile_name(&name).to_owned(), profile)))
}

fn iccp_payload(name: &str, profile: &[u8]) -> Vec<u8> {
    let compressed = miniz_oxide::deflate::compress_to_vec_zlib(profile, 6);
    let mut payload = Vec::with_capacity(name.len() + 2 + compressed.len());
    payload.extend_from_slice(name.as_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&compressed);
    payload
}

fn compression_for(level: u8) -> png::Compression {
    match level {
        0 => png::Compression::NoCompression,
        1..=2 => png::Compression::Fast,
        3..=7 => png::Compression::Balanced,
        _ => png::Compression::High,
    }
}

fn filter_for(filter: PngFilter) -> png::Filter {
    match filter {
        PngFilter::None => png::Filter::NoFilter,
        PngFilter::Sub => png::Filter::Sub,
        PngFilter::Up => png::Filter::Up,
        PngFilter::Average => png::Filter::Avg,
        PngFilter::Paeth => png::Filter::Paeth,
        PngFilter::Adaptive => png::Filter::Adaptive,
    }
}

fn write_png<W: Write>(
    out: W,
    job: &EncodeJob<'_>,
    color: png::ColorType,
    depth: png::BitDepth,
    options: &PngOptions,
    iccp: Option<&[u8]>,
    data: &[u8],
) -> Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(out, job.width, job.height);
    encoder.set_color(color);
    encoder.set_depth(depth);
    encoder.set_compression(compression_for(options.compression_level));
    encoder.set_filter(filter_for(options.filter));

    let mut png = encoder.write_header()?;
    if let Some(chunk) = iccp {
        png.write_chunk(png::chunk::iCCP, chunk)?;
    }
    png.write_image_data(data)?;
    png.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn encode_raw(color: png::ColorType, depth: png::BitDepth, w: u32, h: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(color);
        encoder.set_depth(depth);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
        writer.finish().unwrap();
        out
    }

    fn open_and_decode(bytes: Vec<u8>) -> (ImageInfo, Vec<u8>) {
        let mut stream = MemoryStream::from_vec(bytes);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = PngCodec.open(&mut reader).unwrap();
        let info = ctx.info().clone();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut out = vec![0u8; info.buffer_size(info.pixel_format).unwrap()];
        ctx.decode(&mut reader, &mut out, &Limits::none()).unwrap();
        (info, out)
    }

    #[test]
    fn resulting_formats() {
        let c = PngCodec;
        assert_eq!(
            c.resulting_pixel_format(PixelFormat::Rgba8U, PixelFormat::Rgb16U),
            PixelFormat::Rgb16U
        );
        assert_eq!(
            c.resulting_pixel_format(PixelFormat::Rgb32F, PixelFormat::Rgb32F),
            PixelFormat::Rgb16U
        );
        assert_eq!(
            c.resulting_pixel_format(PixelFormat::Rg32F, PixelFormat::Rg32F),
            PixelFormat::Rgb16U
        );
        assert_eq!(
            c.resulting_pixel_format(PixelFormat::Rg8U, PixelFormat::Rg8U),
            PixelFormat::Rgb8U
        );
        assert_eq!(
            c.resulting_pixel_format(PixelFormat::R8U, PixelFormat::R32F),
            PixelFormat::R8U
        );
        for format in PixelFormat::ALL {
            assert!(c.is_supported(c.resulting_pixel_format(format, format)));
        }
    }

    #[test]
    fn grey_alpha_widens_to_rgba() {
        let bytes = encode_raw(png::ColorType::GrayscaleAlpha, png::BitDepth::Eight, 2, 1, &[10, 20, 30, 40]);
        let (info, pixels) = open_and_decode(bytes);
        assert_eq!(info.pixel_format, PixelFormat::Rgba8U);
        assert_eq!(pixels, [10, 10, 10, 20, 30, 30, 30, 40]);
    }

    #[test]
    fn sixteen_bit_is_native_endian() {
        let be: Vec<u8> = [0x0102u16, 0xFFFE].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = encode_raw(png::ColorType::Grayscale, png::BitDepth::Sixteen, 2, 1, &be);
        let (info, pixels) = open_and_decode(bytes);
        assert_eq!(info.pixel_format, PixelFormat::R16U);
        let values: Vec<u16> = pixels
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, [0x0102, 0xFFFE]);
    }

    #[test]
    fn strips_sixteen_bits_natively() {
        let be: Vec<u8> = [0xFF00u16, 0x1234, 0x0000].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = encode_raw(png::ColorType::Rgb, png::BitDepth::Sixteen, 1, 1, &be);
        let mut stream = MemoryStream::from_vec(bytes);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = PngCodec.open(&mut reader).unwrap();
        assert!(ctx.can_decode_as(PixelFormat::Rgb8U));
        assert!(!ctx.can_decode_as(PixelFormat::Rgba8U));
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut out = [0u8; 3];
        ctx.decode_as(&mut reader, &mut out, PixelFormat::Rgb8U, &Limits::none()).unwrap();
        assert_eq!(out, [0xFF, 0x12, 0x00]);
    }

    #[test]
    fn iccp_payload_parses_back() {
        let profile: Vec<u8> = (0..200u8).collect();
        let payload = iccp_payload("Display P3", &profile);
        let (name, data) = parse_iccp(&payload).unwrap().unwrap();
        assert_eq!(name, "Display P3");
        assert_eq!(data, profile);
    }

    #[test]
    fn unnamed_iccp_gets_placeholder() {
        let payload = iccp_payload("", &[1, 2, 3]);
        let (name, _) = parse_iccp(&payload).unwrap().unwrap();
        assert_eq!(name, crate::info::DEFAULT_PROFILE_NAME);
    }

    #[test]
    fn frame_buffer_respects_memory_limit() {
        let bytes = encode_raw(png::ColorType::Rgb, png::BitDepth::Eight, 4, 4, &[7u8; 48]);
        let mut stream = MemoryStream::from_vec(bytes);
        let mut reader = StreamReader::new(&mut stream);
        let mut ctx = PngCodec.open(&mut reader).unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut out = [0u8; 48];
        assert!(matches!(
            ctx.decode(&mut reader, &mut out, &Limits::none().with_max_memory(47)),
            Err(CodecError::LimitExceeded(_))
        ));
        ctx.decode(&mut reader, &mut out, &Limits::none().with_max_memory(48))
            .unwrap();
        assert_eq!(out, [7u8; 48]);
    }

    #[test]
    fn level_zero_stores_uncompressed() {
        assert!(matches!(compression_for(0), png::Compression::NoCompression));
        assert!(matches!(compression_for(1), png::Compression::Fast));

        let pixels = vec![7u8; 64 * 64 * 3];
        let encoded_len = |level: u8| {
            let options = EncodeOptions::Png(PngOptions::default().with_compression_level(level));
            let job = EncodeJob {
                pixels: &pixels,
                width: 64,
                height: 64,
                pixel_format: PixelFormat::Rgb8U,
                source_format: PixelFormat::Rgb8U,
                profile_name: crate::info::DEFAULT_PROFILE_NAME,
                colour_profile: None,
                options: &options,
            };
            let mut stream = MemoryStream::new();
            PngCodec
                .encode(&job, &mut StreamWriter::new(&mut stream))
                .unwrap();
            stream.into_inner().len()
        };
        // 64 rows of a filter byte plus 192 samples, before any framing.
        assert!(encoded_len(0) > 64 * 193);
        assert!(encoded_len(6) < 1024);
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let mut bytes = encode_raw(png::ColorType::Rgb, png::BitDepth::Eight, 4, 4, &[7u8; 48]);
        bytes.truncate(20);
        let mut stream = MemoryStream::from_vec(bytes);
        let mut reader = StreamReader::new(&mut stream);
        let err = PngCodec.open(&mut reader).err().unwrap();
        assert!(matches!(err, CodecError::CorruptImage { .. }));
    }
}
