//! JPEG codec adapter: jpeg-decoder for reading, jpeg-encoder for writing.
//!
//! JPEG has no notion of a profile name, so decoded profiles always carry the
//! placeholder name.

use std::io::BufReader;

use super::{Codec, DecoderContext, EncodeJob, nearest_8bit, same_colour_channels, swap_be16_in_place};
use crate::config::{ChromaSubsampling, EncodeOptions, JpegOptions};
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::{DEFAULT_PROFILE_NAME, ImageInfo};
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::stream::{StreamReader, StreamWriter};

const SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

const SUPPORTED: [PixelFormat; 2] = [PixelFormat::R8U, PixelFormat::Rgb8U];

pub(crate) struct JpegCodec;

impl Codec for JpegCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Jpeg
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
        nearest_8bit(input, &SUPPORTED)
    }

    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        let header = read_header(reader);
        let (info, icc) = header.map_err(|e| reader.classify(FileFormat::Jpeg, e))?;

        let pixel_format = match info.pixel_format {
            jpeg_decoder::PixelFormat::L8 => PixelFormat::R8U,
            jpeg_decoder::PixelFormat::L16 => PixelFormat::R16U,
            jpeg_decoder::PixelFormat::RGB24 | jpeg_decoder::PixelFormat::CMYK32 => PixelFormat::Rgb8U,
        };
        let mut image = ImageInfo::new(
            u32::from(info.width),
            u32::from(info.height),
            FileFormat::Jpeg,
            pixel_format,
        );
        if let Some(icc) = icc.filter(|p| !p.is_empty()) {
            if info.pixel_format == jpeg_decoder::PixelFormat::CMYK32 {
                log::debug!("jpeg: dropping CMYK colour profile, pixels converted to RGB");
            } else {
                image = image.with_colour_profile(DEFAULT_PROFILE_NAME, icc);
            }
        }

        Ok(Box::new(JpegContext {
            info: image,
            source: info.pixel_format,
        }))
    }

    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        let EncodeOptions::Jpeg(options) = job.options else {
            return Err(CodecError::InvalidEncodeOptions {
                format: FileFormat::Jpeg,
                detail: "options are not JPEG options".into(),
            });
        };
        let color = match job.pixel_format {
            PixelFormat::R8U => jpeg_encoder::ColorType::Luma,
            PixelFormat::Rgb8U => jpeg_encoder::ColorType::Rgb,
            other => {
                return Err(CodecError::InvalidInput(format!("JPEG cannot store {other:?}")));
            }
        };
        let (Ok(width), Ok(height)) = (u16::try_from(job.width), u16::try_from(job.height)) else {
            return Err(CodecError::InvalidInput(
                "JPEG dimensions are limited to 65535".into(),
            ));
        };

        let result = write_jpeg(&mut *writer, job, options, width, height, color);
        result.map_err(|e| writer.classify(FileFormat::Jpeg, e))
    }

    fn keeps_profile(&self, source: PixelFormat, written: PixelFormat) -> bool {
        same_colour_channels(source, written)
    }
}

fn read_header(
    reader: &mut StreamReader<'_>,
) -> Result<(jpeg_decoder::ImageInfo, Option<Vec<u8>>), jpeg_decoder::Error> {
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(reader));
    decoder.read_info()?;
    let info = decoder
        .info()
        .ok_or_else(|| jpeg_decoder::Error::Format("missing frame header".into()))?;
    Ok((info, decoder.icc_profile()))
}

fn write_jpeg(
    out: &mut StreamWriter<'_>,
    job: &EncodeJob<'_>,
    options: &JpegOptions,
    width: u16,
    height: u16,
    color: jpeg_encoder::ColorType,
) -> Result<(), jpeg_encoder::EncodingError> {
    let mut encoder = jpeg_encoder::Encoder::new(out, options.quality);
    encoder.set_sampling_factor(match options.subsampling {
        ChromaSubsampling::None => jpeg_encoder::SamplingFactor::F_1_1,
        ChromaSubsampling::Half => jpeg_encoder::SamplingFactor::F_2_1,
        ChromaSubsampling::Quarter => jpeg_encoder::SamplingFactor::F_2_2,
    });
    encoder.set_progressive(options.progressive);
    if let Some(profile) = job.colour_profile {
        encoder.add_icc_profile(profile)?;
    }
    encoder.encode(job.pixels, width, height, color)
}

struct JpegContext {
    info: ImageInfo,
    source: jpeg_decoder::PixelFormat,
}

impl DecoderContext for JpegContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError> {
        let pixels = u64::from(self.info.width) * u64::from(self.info.height);
        let scratch = usize::try_from(pixels)
            .ok()
            .and_then(|n| n.checked_mul(self.source.pixel_bytes()))
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
        limits.check_memory(scratch)?;

        let pixels = {
            let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(&mut *reader));
            decoder.decode()
        };
        let pixels = pixels.map_err(|e| reader.classify(FileFormat::Jpeg, e))?;

        let mismatch = || CodecError::corrupt(FileFormat::Jpeg, "decoded size does not match header");
        match self.source {
            jpeg_decoder::PixelFormat::CMYK32 => {
                if pixels.len() / 4 * 3 != dest.len() {
                    return Err(mismatch());
                }
                cmyk_to_rgb(&pixels, dest);
            }
            jpeg_decoder::PixelFormat::L16 => {
                if pixels.len() != dest.len() {
                    return Err(mismatch());
                }
                // Lossless 16-bit samples arrive big-endian.
                dest.copy_from_slice(&pixels);
                swap_be16_in_place(dest);
            }
            _ => {
                if pixels.len() != dest.len() {
                    return Err(mismatch());
                }
                dest.copy_from_slice(&pixels);
            }
        }
        Ok(())
    }
}

fn cmyk_to_rgb(cmyk: &[u8], rgb: &mut [u8]) {
    for (px, out) in cmyk.chunks_exact(4).zip(rgb.chunks_exact_mut(3)) {
        let k = 1.0 - f32::from(px[3]) / 255.0;
        for (c, o) in px[..3].iter().zip(out.iter_mut()) {
            let v = (1.0 - f32::from(*c) / 255.0) * k;
            *o = (v * 255.0).round() as u8;
        }
    }
}
