#![no_main]

use libfuzzer_sys::fuzz_target;
use monoio_ws_session::{ConnectionId, Session};

fuzz_target!(|chunks: Vec<Vec<u8>>| {
    let mut session = Session::new(ConnectionId::from(1), None);
    for chunk in chunks {
        if session.on_data(&chunk).is_err() {
            break;
        }
    }
});
