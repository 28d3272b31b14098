#![no_main]

use imgstream::stream::SliceStream;
use imgstream::{ByteStream, CodecRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut stream = SliceStream::new(data);
    let _ = CodecRegistry::global().detect(&mut stream);
    assert_eq!(stream.tell().ok(), Some(0));
});
