//! Fuzz target for control frame parsing
//!
//! Arbitrary text must parse to a frame or a protocol error, never panic.

#![no_main]

use ferry_core::{ControlFrame, ServerMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(frame) = ControlFrame::parse(text) {
            let _ = frame.frame_type();
        }
        let _ = ServerMessage::from_text(text);
    }
});
