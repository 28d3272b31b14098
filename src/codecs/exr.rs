//! OpenEXR codec adapter using the exr crate.
//!
//! Reads the first flat layer at its largest resolution level. When every
//! channel is named R, G, B or A they are returned in that order; otherwise
//! the first four channels are taken as stored. All-half files decode as
//! 16-bit float, anything else as 32-bit float. Writes scanline images with
//! `Y` for one channel and `R`, `G`, `B`, `A` otherwise.

use std::io::{BufReader, Cursor, Write};

use exr::meta::MetaData;
use exr::meta::attribute::SampleType;
use exr::prelude::{
    AnyChannel, AnyChannels, Blocks, Encoding, FlatSamples, Image, Layer, LayerAttributes, LineOrder,
    ReadChannels, ReadLayers, WritableImage,
};
use half::f16;

use super::{Codec, DecoderContext, EncodeJob};
use crate::config::{EncodeOptions, ExrCompression};
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::ImageInfo;
use crate::limits::Limits;
use crate::pixel::{BitDepth, ChannelLayout, NumericKind, PixelFormat};
use crate::stream::{StreamReader, StreamWriter};

const MAGIC: [u8; 4] = [0x76, 0x2F, 0x31, 0x01];

const RGBA_NAMES: [&str; 4] = ["R", "G", "B", "A"];

pub(crate) struct ExrCodec;

impl Codec for ExrCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Exr
    }

    fn signature_len(&self) -> usize {
        MAGIC.len()
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(&MAGIC)
    }

    fn is_supported(&self, format: PixelFormat) -> bool {
        format.is_float()
    }

    /// A float request is honoured; otherwise the input keeps its channels
    /// and becomes 32-bit float if it had more than 16 bits, 16-bit otherwise.
    fn resulting_pixel_format(&self, input: PixelFormat, requested: PixelFormat) -> PixelFormat {
        if self.is_supported(requested) {
            return requested;
        }
        if self.is_supported(input) {
            return input;
        }
        let depth = match input.bit_depth() {
            BitDepth::ThirtyTwo => BitDepth::ThirtyTwo,
            _ => BitDepth::Sixteen,
        };
        PixelFormat::from_parts(input.layout(), depth, NumericKind::Float)
            .unwrap_or(PixelFormat::Rgba32F)
    }

    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        let meta = MetaData::read_from_buffered(BufReader::new(&mut *reader), false);
        let meta = meta.map_err(|e| reader.classify(FileFormat::Exr, e))?;
        let header = meta
            .headers
            .iter()
            .find(|header| !header.deep)
            .ok_or_else(|| CodecError::corrupt(FileFormat::Exr, "no flat image layer"))?;

        let names: Vec<String> = header
            .channels
            .list
            .iter()
            .map(|channel| channel.name.to_string())
            .collect();
        let order = channel_order(&names);
        let layout = ChannelLayout::from_channels(order.len())
            .ok_or_else(|| CodecError::corrupt(FileFormat::Exr, "image has no channels"))?;
        if header.channels.list.iter().any(|c| c.sampling.x() != 1 || c.sampling.y() != 1) {
            return Err(CodecError::corrupt(FileFormat::Exr, "subsampled channels are not supported"));
        }
        let all_half = order
            .iter()
            .all(|&i| header.channels.list[i].sample_type == SampleType::F16);
        let depth = if all_half { BitDepth::Sixteen } else { BitDepth::ThirtyTwo };
        let pixel_format = PixelFormat::from_parts(layout, depth, NumericKind::Float)
            .unwrap_or(PixelFormat::Rgba32F);

        let (Ok(width), Ok(height)) = (
            u32::try_from(header.layer_size.width()),
            u32::try_from(header.layer_size.height()),
        ) else {
            return Err(CodecError::corrupt(FileFormat::Exr, "image dimensions out of range"));
        };
        log::trace!("exr: channels {names:?} -> {pixel_format:?}");

        Ok(Box::new(ExrContext {
            info: ImageInfo::new(width, height, FileFormat::Exr, pixel_format),
            names,
            bytes_per_pixel: header.channels.bytes_per_pixel,
        }))
    }

    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        let EncodeOptions::Exr(options) = job.options else {
            return Err(CodecError::InvalidEncodeOptions {
                format: FileFormat::Exr,
                detail: "options are not OpenEXR options".into(),
            });
        };
        if !job.pixel_format.is_float() {
            return Err(CodecError::InvalidInput(format!(
                "OpenEXR cannot store {:?}",
                job.pixel_format
            )));
        }

        let channels = job.pixel_format.num_channels();
        let bytes = job.pixel_format.bytes_per_channel();
        let pixel = job.pixel_format.bytes_per_pixel();
        let list: Vec<AnyChannel<FlatSamples>> = (0..channels)
            .map(|c| {
                let name = if channels == 1 { "Y" } else { RGBA_NAMES[c] };
                let samples = job.pixels.chunks_exact(pixel).map(|px| &px[c * bytes..][..bytes]);
                let data = if bytes == 2 {
                    FlatSamples::F16(samples.map(bytemuck::pod_read_unaligned::<f16>).collect())
                } else {
                    FlatSamples::F32(samples.map(bytemuck::pod_read_unaligned::<f32>).collect())
                };
                AnyChannel::new(name, data)
            })
            .collect();

        let encoding = Encoding {
            compression: compression_for(options.compression),
            blocks: Blocks::ScanLines,
            line_order: LineOrder::Increasing,
        };
        let layer = Layer::new(
            (job.width as usize, job.height as usize),
            LayerAttributes::default(),
            encoding,
            AnyChannels::sort(list.into()),
        );

        let mut encoded = Vec::new();
        Image::from_layer(layer)
            .write()
            .to_buffered(Cursor::new(&mut encoded))
            .map_err(|e| CodecError::from_codec(FileFormat::Exr, e))?;
        writer
            .write_all(&encoded)
            .map_err(|e| writer.io_failure(FileFormat::Exr, e))
    }
}

fn compression_for(compression: ExrCompression) -> exr::compression::Compression {
    use exr::compression::Compression;

    match compression {
        ExrCompression::None => Compression::Uncompressed,
        ExrCompression::Rle => Compression::RLE,
        ExrCompression::Zip => Compression::ZIP16,
        ExrCompression::Piz => Compression::PIZ,
    }
}

/// Indices into `names` of the channels to return, at most four.
fn channel_order(names: &[String]) -> Vec<usize> {
    let position = |wanted: &str| names.iter().position(|n| n == wanted);
    if names.iter().all(|n| RGBA_NAMES.contains(&n.as_str())) {
        RGBA_NAMES.iter().filter_map(|n| position(n)).collect()
    } else {
        (0..names.len().min(4)).collect()
    }
}

struct ExrContext {
    info: ImageInfo,
    /// Channel names in file order.
    names: Vec<String>,
    /// Stored bytes per pixel across every channel, used or not.
    bytes_per_pixel: usize,
}

impl DecoderContext for ExrContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError> {
        let pixels = u64::from(self.info.width) * u64::from(self.info.height);
        let scratch = usize::try_from(pixels)
            .ok()
            .and_then(|n| n.checked_mul(self.bytes_per_pixel))
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
        limits.check_memory(scratch)?;

        let image = exr::prelude::read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .first_valid_layer()
            .all_attributes()
            .from_buffered(BufReader::new(&mut *reader));
        let image = image.map_err(|e| reader.classify(FileFormat::Exr, e))?;
        let layer = image.layer_data;

        let size = (self.info.width as usize, self.info.height as usize);
        let names: Vec<String> = layer
            .channel_data
            .list
            .iter()
            .map(|channel| channel.name.to_string())
            .collect();
        if (layer.size.width(), layer.size.height()) != size || names != self.names {
            return Err(CodecError::corrupt(FileFormat::Exr, "header changed between reads"));
        }

        let format = self.info.pixel_format;
        let stride = format.bytes_per_pixel();
        let bytes = format.bytes_per_channel();
        for (slot, index) in channel_order(&names).into_iter().enumerate() {
            let samples = &layer.channel_data.list[index].sample_data;
            let outputs = dest.chunks_exact_mut(stride).map(|px| &mut px[slot * bytes..][..bytes]);
            match (samples, format.bit_depth()) {
                (FlatSamples::F16(values), BitDepth::Sixteen) => {
                    for (out, v) in outputs.zip(values) {
                        out.copy_from_slice(&v.to_ne_bytes());
                    }
                }
                (FlatSamples::F16(values), _) => {
                    for (out, v) in outputs.zip(values) {
                        out.copy_from_slice(&v.to_f32().to_ne_bytes());
                    }
                }
                (FlatSamples::F32(values), _) => {
                    for (out, v) in outputs.zip(values) {
                        out.copy_from_slice(&v.to_ne_bytes());
                    }
                }
                (FlatSamples::U32(values), _) => {
                    for (out, v) in outputs.zip(values) {
                        out.copy_from_slice(&(*v as f32).to_ne_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}
