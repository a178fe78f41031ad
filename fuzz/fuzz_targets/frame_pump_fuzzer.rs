//! Fuzz target for the frame pump read path
//!
//! # Strategy
//!
//! - Inbound bytes: arbitrary, so length headers are zero, oversized,
//!   truncated or valid
//! - Read plan: arbitrary chunk sizes, spurious wakeups, interrupts, EOF and
//!   hard errors
//! - Close: optionally after a log-off, optionally with the inbound side shut
//!
//! # Invariants
//!
//! - `offset <= expected_len` after every read
//! - `Partial::remaining` equals `expected_len - offset`
//! - Zero and oversized lengths MUST return `PumpError::InvalidFrameLength`
//! - EOF without a log-off MUST return `PumpError::UnexpectedEof`
//! - Never panics, never reads past the frame being assembled

#![no_main]

use std::io::ErrorKind;

use arbitrary::Arbitrary;
use cmlink_core::{
    PumpError,
    protocol::ProtocolSession,
    pump::{FramePump, PumpConfig, ReadProgress},
};
use cmlink_harness::{ChunkedSocket, ReadStep, ScriptedProtocol};
use libfuzzer_sys::fuzz_target;

const MAX_FRAME_LEN: usize = 4096;
const MAX_READS: usize = 10_000;

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Chunk(u8),
    WouldBlock,
    Interrupted,
    Eof,
    Reset,
}

#[derive(Debug, Clone, Arbitrary)]
struct PumpInput {
    inbound: Vec<u8>,
    steps: Vec<Step>,
    log_off: bool,
    close_inbound: bool,
}

fuzz_target!(|input: PumpInput| {
    let mut protocol = ScriptedProtocol::new();
    let mut socket = ChunkedSocket::new();
    socket.push_inbound(&input.inbound);
    socket.plan(input.steps.iter().map(|step| match step {
        Step::Chunk(n) => ReadStep::Chunk(usize::from(*n).max(1)),
        Step::WouldBlock => ReadStep::WouldBlock,
        Step::Interrupted => ReadStep::Error(ErrorKind::Interrupted),
        Step::Eof => ReadStep::Eof,
        Step::Reset => ReadStep::Error(ErrorKind::ConnectionReset),
    }));
    if input.close_inbound {
        socket.close_inbound();
    }

    let config = PumpConfig { max_frame_len: MAX_FRAME_LEN, ..PumpConfig::default() };
    let mut pump = FramePump::new(config);
    if pump.start(protocol.connected()).is_err() {
        return;
    }
    if input.log_off {
        pump.expect_close();
    }

    for _ in 0..MAX_READS {
        if !socket.is_readable() {
            break;
        }

        match pump.on_readable(&mut socket, &mut protocol) {
            Ok(ReadProgress::Partial { remaining, .. }) => {
                assert_eq!(remaining, pump.expected_len() - pump.offset());
            },
            Ok(ReadProgress::Frame { next_len, .. }) => {
                assert_eq!(pump.expected_len(), next_len);
                assert_eq!(pump.offset(), 0);
            },
            Ok(ReadProgress::WouldBlock) => {},
            Ok(ReadProgress::Closed) => {
                assert!(input.log_off, "orderly close without a log-off");
                break;
            },
            Err(PumpError::InvalidFrameLength { len, max }) => {
                assert!(len == 0 || len > max);
                break;
            },
            Err(PumpError::UnexpectedEof { offset, expected }) => {
                assert!(!input.log_off);
                assert!(offset <= expected);
                break;
            },
            Err(_) => break,
        }
        assert!(pump.offset() <= pump.expected_len());
    }
});
