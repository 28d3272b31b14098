//! End-to-end behaviour through the public API.

#![cfg(all(feature = "png", feature = "jpeg", feature = "hdr", feature = "exr", feature = "tga"))]

use std::io::{self, Cursor};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use imgstream::stream::{
    CallbackStream, MemoryStream, ReadStream, SliceStream, StreamReader, StreamWriter, WriteStream,
};
use imgstream::{
    BitDepth, ByteStream, ChromaSubsampling, Codec, CodecError, CodecRegistry, ConversionPath,
    DEFAULT_PROFILE_NAME, DecodedVia, DecoderContext, EncodeJob, EncodeRequest,
    ErrorCategory, ExrCompression, ExrOptions, FileFormat, ImageInfo, JpegOptions, Limits, OpenOptions, PixelFormat,
    SessionState, Whence, write_image,
};
use rayon::prelude::*;

const W: u32 = 16;
const H: u32 = 12;

/// Smooth gradient so lossy codecs stay close.
fn sample_image(format: PixelFormat, w: u32, h: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for y in 0..h {
        for x in 0..w {
            for c in 0..format.num_channels() as u32 {
                let t = (x * 4 + y * 3 + c * 20) as f32 / 255.0;
                match (format.bit_depth(), format.is_float()) {
                    (BitDepth::Eight, _) => out.push((t * 255.0).round() as u8),
                    (BitDepth::Sixteen, false) => {
                        out.extend_from_slice(&((t * 65535.0) as u16).to_ne_bytes())
                    }
                    (BitDepth::Sixteen, true) => {
                        out.extend_from_slice(&half::f16::from_f32(t * 2.0).to_ne_bytes())
                    }
                    (BitDepth::ThirtyTwo, _) => out.extend_from_slice(&(t * 2.0).to_ne_bytes()),
                }
            }
        }
    }
    out
}

fn encode_to_vec(format: FileFormat, pixels: &[u8], pf: PixelFormat) -> Vec<u8> {
    let mut request = EncodeRequest::new(format).with_output_format(pf);
    if format == FileFormat::Jpeg {
        request = request.with_options(
            JpegOptions::default()
                .with_quality(95)
                .with_subsampling(ChromaSubsampling::None),
        );
    }
    let mut out = MemoryStream::new();
    let written = request.encode(pixels, W, H, pf, &mut out).unwrap();
    assert_eq!(written.pixel_format, pf, "{format} {pf:?}");
    assert_eq!(written.bytes_written, out.len() as u64);
    out.into_inner()
}

fn decode_native(file: &[u8]) -> (ImageInfo, Vec<u8>) {
    let mut session = imgstream::open(SliceStream::new(file)).unwrap();
    let info = session.info().unwrap().clone();
    let mut out = vec![0u8; session.required_buffer_size(None).unwrap()];
    session.decode(&mut out).unwrap();
    (info, out)
}

fn assert_close(format: FileFormat, pf: PixelFormat, expected: &[u8], actual: &[u8]) {
    assert_eq!(expected.len(), actual.len());
    match (format, pf.bit_depth()) {
        (FileFormat::Jpeg, _) => {
            let max = expected
                .iter()
                .zip(actual)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                .unwrap_or(0);
            assert!(max <= 24, "{pf:?} max diff {max}");
        }
        (FileFormat::Hdr, _) => {
            for (a, b) in expected.chunks_exact(4).zip(actual.chunks_exact(4)) {
                let a = f32::from_ne_bytes(a.try_into().unwrap());
                let b = f32::from_ne_bytes(b.try_into().unwrap());
                assert!((a - b).abs() <= 0.02, "{a} vs {b}");
            }
        }
        _ => assert_eq!(expected, actual, "{format} {pf:?}"),
    }
}

#[test]
fn round_trip_every_supported_pair() {
    let mut pairs = 0;
    for format in FileFormat::ALL {
        for pf in PixelFormat::ALL {
            if !imgstream::is_format_supported(format, pf) {
                continue;
            }
            pairs += 1;
            let pixels = sample_image(pf, W, H);
            let file = encode_to_vec(format, &pixels, pf);
            assert_eq!(
                imgstream::detect(&mut SliceStream::new(&file)).unwrap(),
                Some(format)
            );
            let (info, decoded) = decode_native(&file);
            assert_eq!((info.width, info.height), (W, H));
            assert_eq!(info.file_format, format);
            assert_eq!(info.pixel_format, pf);
            assert_eq!(info.num_channels(), pf.num_channels());
            assert_eq!(info.bytes_per_channel(), pf.bytes_per_channel());
            assert_close(format, pf, &pixels, &decoded);
        }
    }
    // PNG 6, JPEG 2, HDR 1, EXR 8, TGA 3.
    assert_eq!(pairs, 20);
}

#[test]
fn tga_rle_round_trip() {
    let pixels = sample_image(PixelFormat::Rgba8U, W, H);
    let mut out = MemoryStream::new();
    EncodeRequest::new(FileFormat::Tga)
        .with_options(imgstream::TgaOptions { rle: true })
        .encode(&pixels, W, H, PixelFormat::Rgba8U, &mut out)
        .unwrap();
    let (_, decoded) = decode_native(out.as_slice());
    assert_eq!(decoded, pixels);
}

#[test]
fn hdr_widens_half_float_input() {
    let pixels = sample_image(PixelFormat::Rgba16F, W, H);
    let mut out = MemoryStream::new();
    let written = EncodeRequest::new(FileFormat::Hdr)
        .with_options(imgstream::HdrOptions::default())
        .encode(&pixels, W, H, PixelFormat::Rgba16F, &mut out)
        .unwrap();
    assert_eq!(written.pixel_format, PixelFormat::Rgb32F);

    let (_, decoded) = decode_native(out.as_slice());
    let expected =
        imgstream::convert::convert_to_vec(&pixels, PixelFormat::Rgba16F, PixelFormat::Rgb32F, W, H)
            .unwrap();
    assert_close(FileFormat::Hdr, PixelFormat::Rgb32F, &expected, &decoded);
}

#[test]
fn exr_stores_integer_input_as_half_float() {
    let pixels = sample_image(PixelFormat::Rgb8U, W, H);
    let mut out = MemoryStream::new();
    let written = EncodeRequest::new(FileFormat::Exr)
        .with_options(ExrOptions::default().with_compression(ExrCompression::Piz))
        .with_colour_profile("dropped", &[9; 16])
        .encode(&pixels, W, H, PixelFormat::Rgb8U, &mut out)
        .unwrap();
    assert_eq!(written.pixel_format, PixelFormat::Rgb16F);
    assert!(!written.profile_written);

    let mut session = imgstream::open(SliceStream::new(out.as_slice())).unwrap();
    let info = session.info().unwrap().clone();
    assert_eq!(info.file_format, FileFormat::Exr);
    assert_eq!(info.pixel_format, PixelFormat::Rgb16F);
    assert_eq!(info.profile_name, DEFAULT_PROFILE_NAME);
    assert!(!info.has_colour_profile());

    let mut back = vec![0u8; session.required_buffer_size(Some(PixelFormat::Rgb8U)).unwrap()];
    session.decode_as(&mut back, PixelFormat::Rgb8U).unwrap();
    assert_eq!(back, pixels);
}

#[test]
fn decode_is_idempotent() {
    for format in [FileFormat::Png, FileFormat::Jpeg, FileFormat::Tga] {
        let file = encode_to_vec(format, &sample_image(PixelFormat::Rgb8U, W, H), PixelFormat::Rgb8U);
        let mut session = imgstream::open(SliceStream::new(&file)).unwrap();
        let size = session.required_buffer_size(None).unwrap();
        let mut first = vec![0u8; size];
        let mut second = vec![0xFFu8; size];
        session.decode(&mut first).unwrap();
        session.decode(&mut second).unwrap();
        assert_eq!(first, second, "{format}");
    }
}

#[test]
fn small_buffer_fails_without_writing() {
    let file = encode_to_vec(FileFormat::Png, &sample_image(PixelFormat::Rgba16U, W, H), PixelFormat::Rgba16U);
    let mut session = imgstream::open(SliceStream::new(&file)).unwrap();
    for target in [PixelFormat::Rgba16U, PixelFormat::Rgb8U, PixelFormat::Rgba32F] {
        let required = session.required_buffer_size(Some(target)).unwrap();
        let mut dest = vec![0x5Au8; required - 1];
        let err = session.decode_as(&mut dest, target).unwrap_err();
        assert!(matches!(err, CodecError::BufferTooSmall { .. }));
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
        assert!(dest.iter().all(|&b| b == 0x5A));
    }
    assert_eq!(session.state(), SessionState::Opened);
}

#[test]
fn detection_leaves_position_and_open_rereads() {
    let mut data = vec![0xEE; 5];
    data.extend_from_slice(&encode_to_vec(
        FileFormat::Png,
        &sample_image(PixelFormat::Rgb8U, W, H),
        PixelFormat::Rgb8U,
    ));
    let mut stream = MemoryStream::from_vec(data);
    stream.seek(5, Whence::Begin).unwrap();

    assert_eq!(imgstream::detect(&mut stream).unwrap(), Some(FileFormat::Png));
    assert_eq!(stream.tell().unwrap(), 5);
    assert_eq!(imgstream::detect(&mut stream).unwrap(), Some(FileFormat::Png));

    let mut session = imgstream::open(&mut stream).unwrap();
    let mut out = vec![0u8; session.required_buffer_size(None).unwrap()];
    session.decode(&mut out).unwrap();
    assert_eq!(out, sample_image(PixelFormat::Rgb8U, W, H));
}

#[test]
fn profile_round_trip() {
    let profile: Vec<u8> = (0..128u8).collect();
    let pixels = sample_image(PixelFormat::Rgb8U, W, H);
    let mut out = MemoryStream::new();
    let written = EncodeRequest::new(FileFormat::Png)
        .with_colour_profile("sRGB-ish", &profile)
        .encode(&pixels, W, H, PixelFormat::Rgb8U, &mut out)
        .unwrap();
    assert!(written.profile_written);

    let (info, _) = decode_native(out.as_slice());
    assert_eq!(info.profile_name, "sRGB-ish");
    assert_eq!(info.colour_profile, profile);
}

#[test]
fn jpeg_profile_round_trip() {
    let profile = vec![7u8; 128];
    let mut out = MemoryStream::new();
    EncodeRequest::new(FileFormat::Jpeg)
        .with_colour_profile("sRGB-ish", &profile)
        .encode(&sample_image(PixelFormat::R8U, W, H), W, H, PixelFormat::R8U, &mut out)
        .unwrap();
    let (info, _) = decode_native(out.as_slice());
    assert_eq!(info.colour_profile, profile);
    assert_eq!(info.profile_name, DEFAULT_PROFILE_NAME);
}

#[test]
fn jpeg_keeps_profile_when_alpha_is_dropped() {
    let profile: Vec<u8> = (0..128u8).rev().collect();
    let mut out = MemoryStream::new();
    let written = EncodeRequest::new(FileFormat::Jpeg)
        .with_colour_profile("display", &profile)
        .encode(&sample_image(PixelFormat::Rgba8U, W, H), W, H, PixelFormat::Rgba8U, &mut out)
        .unwrap();
    assert_eq!(written.pixel_format, PixelFormat::Rgb8U);
    assert!(written.profile_written);

    let (info, _) = decode_native(out.as_slice());
    assert_eq!(info.pixel_format, PixelFormat::Rgb8U);
    assert_eq!(info.colour_profile, profile);
}

#[test]
fn empty_profile_name_is_substituted() {
    let profile = vec![1u8; 64];
    let mut out = MemoryStream::new();
    write_image(
        FileFormat::Png,
        &sample_image(PixelFormat::Rgb8U, W, H),
        W,
        H,
        PixelFormat::Rgb8U,
        PixelFormat::Rgb8U,
        "",
        &profile,
        &mut out,
        None,
    )
    .unwrap();
    let bytes = out.as_slice();
    assert!(bytes.windows(10).any(|w| w == b"iCCPempty\0"));

    let (info, _) = decode_native(bytes);
    assert!(!info.profile_name.is_empty());
    assert_eq!(info.profile_name, DEFAULT_PROFILE_NAME);
    assert_eq!(info.colour_profile, profile);
}

#[test]
fn profile_dropped_when_channels_change() {
    let mut out = MemoryStream::new();
    let written = EncodeRequest::new(FileFormat::Png)
        .with_output_format(PixelFormat::R8U)
        .with_colour_profile("rgb", &[3; 32])
        .encode(&sample_image(PixelFormat::Rgb8U, W, H), W, H, PixelFormat::Rgb8U, &mut out)
        .unwrap();
    assert_eq!(written.pixel_format, PixelFormat::R8U);
    assert!(!written.profile_written);
    let (info, _) = decode_native(out.as_slice());
    assert!(!info.has_colour_profile());
}

#[test]
fn unusable_streams_rejected_before_io() {
    let calls = AtomicUsize::new(0);
    let write_only = CallbackStream::new().on_write(|buf| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(buf.len())
    });
    let err = imgstream::open(write_only).err().unwrap();
    assert!(matches!(err, CodecError::UnusableStream(_)));

    let no_seek = CallbackStream::new().on_read(|_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    });
    assert!(matches!(
        imgstream::open(no_seek).err(),
        Some(CodecError::UnusableStream(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn closed_session_rejects_everything() {
    let file = encode_to_vec(FileFormat::Tga, &sample_image(PixelFormat::R8U, W, H), PixelFormat::R8U);
    let mut session = imgstream::open(SliceStream::new(&file)).unwrap();
    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    let err = session.info().unwrap_err();
    assert!(matches!(err, CodecError::UseAfterClose));
    assert_eq!(err.category(), ErrorCategory::Lifecycle);
    assert!(matches!(
        session.required_buffer_size(None),
        Err(CodecError::UseAfterClose)
    ));
    let mut out = vec![0u8; (W * H) as usize];
    assert!(matches!(session.decode(&mut out), Err(CodecError::UseAfterClose)));
}

#[test]
fn conversion_paths() {
    let file = encode_to_vec(FileFormat::Png, &sample_image(PixelFormat::Rgb16U, W, H), PixelFormat::Rgb16U);
    let mut session = imgstream::open(SliceStream::new(&file)).unwrap();
    let size = session.required_buffer_size(Some(PixelFormat::Rgb8U)).unwrap();

    let mut by_codec = vec![0u8; size];
    let mut by_utility = vec![0u8; size];
    assert_eq!(
        session.decode_as(&mut by_codec, PixelFormat::Rgb8U).unwrap(),
        DecodedVia::Codec
    );
    assert_eq!(
        session
            .decode_with(&mut by_utility, PixelFormat::Rgb8U, ConversionPath::Utility)
            .unwrap(),
        DecodedVia::Utility
    );
    assert!(by_codec.iter().zip(&by_utility).all(|(a, b)| a.abs_diff(*b) <= 1));

    let mut grey = vec![0u8; session.required_buffer_size(Some(PixelFormat::R8U)).unwrap()];
    assert!(matches!(
        session.decode_with(&mut grey, PixelFormat::R8U, ConversionPath::Codec),
        Err(CodecError::UnsupportedConversion { .. })
    ));
    assert_eq!(
        session.decode_as(&mut grey, PixelFormat::R8U).unwrap(),
        DecodedVia::Utility
    );
}

#[test]
fn corrupt_and_failed_streams_are_distinguished() {
    let mut truncated = encode_to_vec(FileFormat::Png, &sample_image(PixelFormat::Rgb8U, W, H), PixelFormat::Rgb8U);
    truncated.truncate(40);
    let err = match imgstream::open(SliceStream::new(&truncated)) {
        Err(e) => e,
        Ok(mut session) => {
            let mut out = vec![0u8; session.required_buffer_size(None).unwrap()];
            session.decode(&mut out).unwrap_err()
        }
    };
    assert_eq!(err.category(), ErrorCategory::CorruptData);

    let file = encode_to_vec(FileFormat::Png, &sample_image(PixelFormat::Rgb8U, W, H), PixelFormat::Rgb8U);
    let pos = AtomicU64::new(0);
    let reads = AtomicUsize::new(0);
    let flaky = CallbackStream::new()
        .on_read(|buf| {
            if reads.fetch_add(1, Ordering::SeqCst) >= 3 {
                return Err(io::Error::other("connection reset"));
            }
            let start = (pos.load(Ordering::SeqCst) as usize).min(file.len());
            let n = buf.len().min(file.len() - start);
            buf[..n].copy_from_slice(&file[start..start + n]);
            pos.fetch_add(n as u64, Ordering::SeqCst);
            Ok(n)
        })
        .on_tell(|| Ok(pos.load(Ordering::SeqCst)))
        .on_seek(|offset, whence| {
            let base = match whence {
                Whence::Begin => 0,
                Whence::Current => pos.load(Ordering::SeqCst),
                Whence::End => file.len() as u64,
            };
            let next = base
                .checked_add_signed(offset)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "negative seek"))?;
            pos.store(next, Ordering::SeqCst);
            Ok(next)
        });
    let err = match imgstream::open(flaky) {
        Err(e) => e,
        Ok(mut session) => {
            let mut out = vec![0u8; session.required_buffer_size(None).unwrap()];
            session.decode(&mut out).unwrap_err()
        }
    };
    assert_eq!(err.category(), ErrorCategory::Stream, "{err}");
}

#[test]
fn std_io_adapters() {
    let pixels = sample_image(PixelFormat::Rgba8U, W, H);
    let mut sink = WriteStream::new(Cursor::new(Vec::new()));
    EncodeRequest::new(FileFormat::Png)
        .encode(&pixels, W, H, PixelFormat::Rgba8U, &mut sink)
        .unwrap();
    let bytes = sink.into_inner().unwrap().into_inner();

    let mut session = imgstream::open(ReadStream::new(Cursor::new(bytes))).unwrap();
    let mut out = vec![0u8; pixels.len()];
    session.decode(&mut out).unwrap();
    assert_eq!(out, pixels);
    let reader = session.into_stream().unwrap().into_inner();
    assert!(reader.position() > 0);
}

#[test]
fn parallel_sessions_are_independent() {
    let files: Vec<(PixelFormat, Vec<u8>)> = [PixelFormat::R8U, PixelFormat::Rgb8U, PixelFormat::Rgba8U]
        .into_iter()
        .cycle()
        .take(12)
        .map(|pf| (pf, encode_to_vec(FileFormat::Png, &sample_image(pf, W, H), pf)))
        .collect();

    files.par_iter().for_each(|(pf, file)| {
        let mut session = imgstream::open(MemoryStream::from_vec(file.clone())).unwrap();
        let mut out = vec![0u8; session.required_buffer_size(Some(PixelFormat::Rgba8U)).unwrap()];
        session.decode_as(&mut out, PixelFormat::Rgba8U).unwrap();
        let native = sample_image(*pf, W, H);
        let expected =
            imgstream::convert::convert_to_vec(&native, *pf, PixelFormat::Rgba8U, W, H).unwrap();
        assert_eq!(out, expected);
    });
}

struct CountingCodec {
    releases: Arc<AtomicUsize>,
}

struct CountingContext {
    info: ImageInfo,
    releases: Arc<AtomicUsize>,
}

impl Codec for CountingCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Tga
    }
    fn signature_len(&self) -> usize {
        4
    }
    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(b"CNT!")
    }
    fn is_supported(&self, format: PixelFormat) -> bool {
        format == PixelFormat::R8U
    }
    fn resulting_pixel_format(&self, _input: PixelFormat, _requested: PixelFormat) -> PixelFormat {
        PixelFormat::R8U
    }
    fn open(&self, _reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError> {
        Ok(Box::new(CountingContext {
            info: ImageInfo::new(1, 1, FileFormat::Tga, PixelFormat::R8U),
            releases: Arc::clone(&self.releases),
        }))
    }
    fn encode(&self, _job: &EncodeJob<'_>, _writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        Ok(())
    }
}

impl DecoderContext for CountingContext {
    fn info(&self) -> &ImageInfo {
        &self.info
    }
    fn decode(&mut self, _reader: &mut StreamReader<'_>, dest: &mut [u8], _limits: &Limits) -> Result<(), CodecError> {
        dest.fill(42);
        Ok(())
    }
    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn codec_context_released_exactly_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    let registry = CodecRegistry::empty().with_codec(Box::new(CountingCodec {
        releases: Arc::clone(&releases),
    }));
    let options = OpenOptions::new().with_registry(&registry);

    let mut session = options.open(SliceStream::new(b"CNT!")).unwrap();
    let mut out = [0u8; 1];
    session.decode(&mut out).unwrap();
    assert_eq!(out, [42]);
    session.close();
    session.close();
    drop(session);
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    // Abandoned without close.
    drop(options.open(SliceStream::new(b"CNT!")).unwrap());
    assert_eq!(releases.load(Ordering::SeqCst), 2);

    let session = options.open(SliceStream::new(b"CNT!")).unwrap();
    assert!(session.into_stream().is_some());
    assert_eq!(releases.load(Ordering::SeqCst), 3);
}
