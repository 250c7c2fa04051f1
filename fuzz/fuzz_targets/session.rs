//! Fuzz target for the transfer session state machine
//!
//! Drives a session with an arbitrary frame sequence and checks the payload
//! bookkeeping: filled never runs past the declared count, and a completed
//! transfer carries exactly the declared number of payloads.

#![no_main]

use ferry_core::{ControlFrame, Step, TransferSession};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut session = TransferSession::new();

    for chunk in data.chunks(3) {
        let step = match chunk {
            [0, rest @ ..] => {
                let count = rest.first().map_or(0, |n| usize::from(*n % 8));
                session.apply(ControlFrame::FilesLength(count))
            }
            [1, n, ..] => session.apply(ControlFrame::Recipient(format!("10.0.0.1:{n}").into())),
            [2, n, ..] => session.apply(ControlFrame::MetaData((*n).into())),
            _ => session.push_payload(chunk.to_vec()),
        };

        if let Step::Ready(transfer) = step {
            let payloads = transfer.files.iter().filter(|u| u.has_payload()).count();
            assert_eq!(payloads, transfer.expected);
        }
        assert!(session.filled_count() <= session.expected_count());
    }
});
