//! Radiance RGBE (`.hdr`) codec adapter using zune-hdr.
//!
//! zune-hdr reads flat and adaptive run-length scanlines and writes
//! run-length scanlines wherever the format allows them. Pixels are always
//! exchanged as RGB 32-bit float.

use std::borrow::Cow;
use std::io::{BufReader, Write};

use zune_core::bit_depth::BitDepth as SampleDepth;
use zune_core::colorspace::ColorSpace;
use zune_core::options::{DecoderOptions, EncoderOptions};
use zune_hdr::{HdrDecodeErrors, HdrDecoder, HdrEncoder};

use super::{Codec, DecoderContext, EncodeJob};
use crate::config::EncodeOptions;
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::ImageInfo;
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::stream::{StreamReader, StreamWriter};

const SIGNATURES: [&[u8]; 2] = [b"#?RADIANCE", b"#?RGBE"];

pub(crate) struct HdrCodec;

impl Codec for HdrCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Hdr
    }

    fn signature_len(&self) -> usize {
        SIGNATURES.iter().map(|s| s.len()).max().unwrap_or(0)
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        SIGNATURES.iter().any(|s| header.starts_with(s))
    }

    fn is_supported(&self, format: PixelFormat) -> bool {
        format == PixelFormat::Rgb32F
    }

    fn resulting_pixel_format(&self, _input: PixelFormat, _requested: PixelFormat) -> PixelFormat {
        PixelFormat::Rgb32F
    }

    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        let dimensions = {
            let mut decoder = HdrDecoder::new_with_options(BufReader::new(&mut *reader), decoder_options());
            decoder.decode_headers().map(|()| decoder.dimensions())
        };
        let dimensions = dimensions.map_err(|e| reader.classify(FileFormat::Hdr, describe(&e)))?;
        let (width, height) = dimensions
            .and_then(|(w, h)| Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?)))
            .ok_or_else(|| CodecError::corrupt(FileFormat::Hdr, "image dimensions out of range"))?;
        Ok(Box::new(HdrContext {
            info: ImageInfo::new(width, height, FileFormat::Hdr, PixelFormat::Rgb32F),
        }))
    }

    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        let EncodeOptions::Hdr(_) = job.options else {
            return Err(CodecError::InvalidEncodeOptions {
                format: FileFormat::Hdr,
                detail: "options are not HDR options".into(),
            });
        };
        if job.pixel_format != PixelFormat::Rgb32F {
            return Err(CodecError::InvalidInput(format!(
                "Radiance HDR cannot store {:?}",
                job.pixel_format
            )));
        }

        let samples: Cow<'_, [f32]> = match bytemuck::try_cast_slice(job.pixels) {
            Ok(samples) => Cow::Borrowed(samples),
            Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(job.pixels)),
        };
        let options = EncoderOptions::new(
            job.width as usize,
            job.height as usize,
            ColorSpace::RGB,
            SampleDepth::Float32,
        );
        let encoder = HdrEncoder::new(&samples, options);
        let mut encoded = Vec::with_capacity(encoder.expected_buffer_size().unwrap_or(0));
        encoder
            .encode(&mut encoded)
            .map_err(|e| CodecError::from_codec(FileFormat::Hdr, e))?;
        writer
            .write_all(&encoded)
            .map_err(|e| writer.io_failure(FileFormat::Hdr, e))
    }
}

/// Dimension checks belong to [`Limits`], not to the decoder's defaults.
fn decoder_options() -> DecoderOptions {
    DecoderOptions::default()
        .set_max_width(u32::MAX as usize)
        .set_max_height(u32::MAX as usize)
}

/// zune error messages end in a newline.
fn describe(error: &HdrDecodeErrors) -> String {
    error.to_string().trim_end().to_owned()
}

struct HdrContext {
    info: ImageInfo,
}

impl DecoderContext for HdrContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError> {
        let expected = Some((self.info.width as usize, self.info.height as usize));
        let len = dest.len();

        // Decode in place when `dest` is f32-aligned.
        let mut scratch = Vec::new();
        let samples: &mut [f32] = match bytemuck::try_cast_slice_mut(&mut *dest) {
            Ok(samples) => samples,
            Err(_) => {
                limits.check_memory(len)?;
                scratch = vec![0f32; len / 4];
                &mut scratch
            }
        };

        let decoded = {
            let mut decoder = HdrDecoder::new_with_options(BufReader::new(&mut *reader), decoder_options());
            decoder.decode_headers().and_then(|()| {
                if decoder.dimensions() != expected {
                    return Err(HdrDecodeErrors::Generic("header changed between reads"));
                }
                decoder.decode_into(samples)
            })
        };
        decoded.map_err(|e| reader.classify(FileFormat::Hdr, describe(&e)))?;

        if !scratch.is_empty() {
            dest.copy_from_slice(bytemuck::cast_slice(&scratch));
        }
        Ok(())
    }
}
