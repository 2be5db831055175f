#![no_main]

use libfuzzer_sys::fuzz_target;
use monoio_ws_session::FrameReader;

fuzz_target!(|data: &[u8]| {
    // The first byte picks where the input is split in two deliveries.
    let Some((split, data)) = data.split_first() else {
        return;
    };
    let (head, tail) = data.split_at((*split as usize).min(data.len()));

    let mut reader = FrameReader::default();
    if reader.decode(head).is_ok() {
        reader.decode(tail).ok();
    }
});
