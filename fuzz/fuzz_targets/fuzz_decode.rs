#![no_main]

use arbitrary::Arbitrary;
use imgstream::stream::SliceStream;
use imgstream::{Limits, OpenOptions, PixelFormat};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    target: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let limits = Limits::none()
        .with_max_pixels(1 << 20)
        .with_max_memory(64 << 20);
    let Ok(mut session) = OpenOptions::new()
        .with_limits(&limits)
        .open(SliceStream::new(&input.data))
    else {
        return;
    };
    let target = PixelFormat::ALL[usize::from(input.target) % PixelFormat::ALL.len()];
    let Ok(size) = session.required_buffer_size(Some(target)) else {
        return;
    };
    let mut out = vec![0u8; size];
    let first = session.decode_as(&mut out, target).is_ok();
    if first {
        let mut again = vec![0u8; size];
        session.decode_as(&mut again, target).unwrap();
        assert_eq!(out, again);
    }
    session.close();
});
