//! Non-blocking frame pump.
//!
//! Reads exactly as many bytes as the protocol session expects for the next
//! frame, no more. The protocol session decides every frame's length after
//! processing the previous one, so the pump has no length-prefix parser of its
//! own: it is a single "awaiting N bytes" state that is re-armed with a new N
//! after each completed frame.
//!
//! Writes go through an explicit outbound queue. Only the frame at the head of
//! the queue is ever written, so a frame that was partially accepted by the
//! socket is always finished before the next one starts.
//!
//! # Read cycle
//!
//! ```text
//!           start(n)                    offset == n
//! ┌──────┐ ─────────> ┌──────────────┐ ─────────────> frame_complete(buf)
//! │ Idle │            │ awaiting n   │                      │
//! └──────┘            │ offset < n   │ <────────────────────┘
//!                     └──────────────┘   resize to next n, offset = 0
//! ```

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{error::PumpError, protocol::ProtocolSession};

/// Largest frame the pump will buffer by default (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Read buffer capacity reserved when the pump is created.
pub const DEFAULT_INITIAL_READ_CAPACITY: usize = 4096;

/// Frame pump configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Frame lengths above this are a protocol fault
    pub max_frame_len: usize,
    /// Capacity reserved for the read buffer up front
    pub initial_read_capacity: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            initial_read_capacity: DEFAULT_INITIAL_READ_CAPACITY,
        }
    }
}

/// Outcome of one [`FramePump::on_readable`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// Spurious wakeup; nothing was read.
    WouldBlock,
    /// Bytes arrived but the frame is still incomplete.
    Partial {
        /// Bytes read by this call
        received: usize,
        /// Bytes still missing from the current frame
        remaining: usize,
    },
    /// A frame completed and was handed to the protocol session.
    Frame {
        /// Length of the completed frame
        len: usize,
        /// Length the protocol session expects next
        next_len: usize,
    },
    /// Orderly close after a log-off.
    Closed,
}

/// Outcome of one [`FramePump::flush`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushProgress {
    /// Outbound queue is empty.
    Flushed,
    /// Socket stopped accepting bytes; wait for writability.
    Pending {
        /// Frames still queued, including a partially written head
        queued: usize,
    },
}

/// Read buffer and outbound queue for one connection.
///
/// # Invariants
///
/// - `offset <= expected_len()` at all times
/// - the read buffer length equals the last length the protocol session
///   requested
#[derive(Debug, Clone)]
pub struct FramePump {
    config: PumpConfig,
    read_buf: Vec<u8>,
    offset: usize,
    started: bool,
    closing: bool,
    outbound: VecDeque<Bytes>,
    write_offset: usize,
}

impl FramePump {
    /// Create an idle pump.
    pub fn new(config: PumpConfig) -> Self {
        Self {
            config,
            read_buf: Vec::with_capacity(config.initial_read_capacity),
            offset: 0,
            started: false,
            closing: false,
            outbound: VecDeque::new(),
            write_offset: 0,
        }
    }

    /// Arm the pump for the first frame of a fresh connection.
    ///
    /// # Errors
    ///
    /// - `PumpError::InvalidFrameLength` if `first_len` is zero or too large
    pub fn start(&mut self, first_len: usize) -> Result<(), PumpError> {
        self.check_len(first_len)?;
        self.resize(first_len);
        self.started = true;
        self.closing = false;
        tracing::debug!(len = first_len, "frame pump started");
        Ok(())
    }

    /// Length of the frame currently being read.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.read_buf.len()
    }

    /// Bytes of the current frame already received.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether [`FramePump::start`] was called since the last reset.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether an orderly close is expected.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Treat the next end-of-stream as an orderly close instead of a fault.
    pub fn expect_close(&mut self) {
        self.closing = true;
    }

    /// Perform exactly one read from `src`.
    ///
    /// When the read completes the current frame, the frame goes to
    /// `protocol`, and the buffer is resized to the length it asks for next.
    ///
    /// # Errors
    ///
    /// - `PumpError::NotStarted` before [`FramePump::start`]
    /// - `PumpError::UnexpectedEof` if the peer closes without a log-off
    /// - `PumpError::Io` on any socket error besides `WouldBlock`/`Interrupted`
    /// - `PumpError::Protocol` if the protocol session rejects the frame
    /// - `PumpError::InvalidFrameLength` if the next length is zero or too
    ///   large
    pub fn on_readable<R, P>(
        &mut self,
        src: &mut R,
        protocol: &mut P,
    ) -> Result<ReadProgress, PumpError>
    where
        R: Read + ?Sized,
        P: ProtocolSession + ?Sized,
    {
        if !self.started {
            return Err(PumpError::NotStarted);
        }

        let expected = self.read_buf.len();
        let received = match src.read(&mut self.read_buf[self.offset..]) {
            Ok(n) => n,
            Err(e) if is_retry(&e) => return Ok(ReadProgress::WouldBlock),
            Err(e) => return Err(PumpError::Io(e.to_string())),
        };

        if received == 0 {
            if self.closing {
                tracing::debug!("stream closed after log-off");
                return Ok(ReadProgress::Closed);
            }
            return Err(PumpError::UnexpectedEof { offset: self.offset, expected });
        }

        debug_assert!(received <= expected - self.offset, "reader overran the buffer");
        self.offset = (self.offset + received).min(expected);
        tracing::trace!(received, offset = self.offset, expected, "read");

        if self.offset < expected {
            return Ok(ReadProgress::Partial { received, remaining: expected - self.offset });
        }

        let next_len = protocol.frame_complete(&self.read_buf)?;
        self.check_len(next_len)?;
        self.resize(next_len);
        tracing::debug!(len = expected, next_len, "frame complete");

        Ok(ReadProgress::Frame { len: expected, next_len })
    }

    /// Append a complete frame to the outbound queue. Empty frames are
    /// dropped.
    pub fn queue(&mut self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.outbound.push_back(frame);
    }

    /// Frames waiting to be written, including a partially written head.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Write queued frames in order until the queue is empty or the socket
    /// stops accepting bytes.
    ///
    /// # Errors
    ///
    /// - `PumpError::WriteZero` if the socket accepts zero bytes
    /// - `PumpError::Io` on any socket error besides `WouldBlock`/`Interrupted`
    pub fn flush<W>(&mut self, dst: &mut W) -> Result<FlushProgress, PumpError>
    where
        W: Write + ?Sized,
    {
        while let Some(frame) = self.outbound.front() {
            let frame_len = frame.len();
            match dst.write(&frame[self.write_offset..]) {
                Ok(0) => return Err(PumpError::WriteZero),
                Ok(n) => {
                    self.write_offset += n;
                    if self.write_offset >= frame_len {
                        self.outbound.pop_front();
                        self.write_offset = 0;
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushProgress::Pending { queued: self.outbound.len() });
                },
                Err(e) => return Err(PumpError::Io(e.to_string())),
            }
        }

        Ok(FlushProgress::Flushed)
    }

    /// Release both buffers and return to idle.
    pub fn reset(&mut self) {
        self.read_buf = Vec::new();
        self.offset = 0;
        self.started = false;
        self.closing = false;
        self.outbound.clear();
        self.write_offset = 0;
    }

    fn check_len(&self, len: usize) -> Result<(), PumpError> {
        if len == 0 || len > self.config.max_frame_len {
            return Err(PumpError::InvalidFrameLength { len, max: self.config.max_frame_len });
        }
        Ok(())
    }

    fn resize(&mut self, len: usize) {
        self.read_buf.clear();
        self.read_buf.resize(len, 0);
        self.offset = 0;
    }
}

fn is_retry(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        error::ProtocolError, identity::Identity, presence::PresenceState,
        protocol::{LogOnRequest, ProtocolOutput},
    };

    /// Protocol that records frames and asks for a fixed sequence of lengths.
    struct Lengths {
        next: Vec<usize>,
        frames: Vec<Vec<u8>>,
    }

    impl Lengths {
        fn new(next: &[usize]) -> Self {
            Self { next: next.iter().rev().copied().collect(), frames: Vec::new() }
        }
    }

    impl ProtocolSession for Lengths {
        fn connected(&mut self) -> usize {
            self.next.pop().unwrap_or(0)
        }

        fn frame_complete(&mut self, frame: &[u8]) -> Result<usize, ProtocolError> {
            if frame.first() == Some(&0xFF) {
                return Err(ProtocolError::Malformed("poison".to_string()));
            }
            self.frames.push(frame.to_vec());
            Ok(self.next.pop().unwrap_or(0))
        }

        fn take_outputs(&mut self) -> Vec<ProtocolOutput> {
            Vec::new()
        }

        fn log_on(&mut self, _: &LogOnRequest) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn log_off(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn set_presence(&mut self, _: PresenceState) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn request_user_info(&mut self, _: &[Identity]) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn send_private_message(&mut self, _: Identity, _: &str) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn send_typing(&mut self, _: Identity) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn send_chat_message(&mut self, _: Identity, _: &str) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn join_room(&mut self, _: Identity) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn leave_room(&mut self, _: Identity) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn heartbeat(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    /// Writer that accepts at most `step` bytes per call, then blocks once
    /// `budget` is spent.
    struct Choke {
        written: Vec<u8>,
        step: usize,
        budget: usize,
    }

    impl Write for Choke {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.step).min(self.budget);
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn started(protocol: &mut Lengths) -> FramePump {
        let mut pump = FramePump::new(PumpConfig::default());
        pump.start(protocol.connected()).unwrap();
        pump
    }

    #[test]
    fn byte_at_a_time_delivers_one_frame() {
        let mut protocol = Lengths::new(&[4, 2]);
        let mut pump = started(&mut protocol);
        let mut src = Trickle { data: Cursor::new(vec![1, 2, 3, 4]), step: 1 };

        for remaining in [3, 2, 1] {
            assert_eq!(
                pump.on_readable(&mut src, &mut protocol).unwrap(),
                ReadProgress::Partial { received: 1, remaining }
            );
        }
        assert_eq!(
            pump.on_readable(&mut src, &mut protocol).unwrap(),
            ReadProgress::Frame { len: 4, next_len: 2 }
        );

        assert_eq!(protocol.frames, vec![vec![1, 2, 3, 4]]);
        assert_eq!(pump.expected_len(), 2);
        assert_eq!(pump.offset(), 0);
    }

    #[test]
    fn read_never_crosses_a_frame_boundary() {
        let mut protocol = Lengths::new(&[3, 2, 5]);
        let mut pump = started(&mut protocol);
        let mut src = Trickle { data: Cursor::new(vec![1, 2, 3, 4, 5]), step: 64 };

        pump.on_readable(&mut src, &mut protocol).unwrap();
        pump.on_readable(&mut src, &mut protocol).unwrap();

        assert_eq!(protocol.frames, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn would_block_is_a_no_op() {
        struct Blocked;
        impl Read for Blocked {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }
        }

        let mut protocol = Lengths::new(&[4]);
        let mut pump = started(&mut protocol);

        assert_eq!(pump.on_readable(&mut Blocked, &mut protocol).unwrap(), ReadProgress::WouldBlock);
        assert_eq!(pump.offset(), 0);
        assert_eq!(pump.expected_len(), 4);
    }

    #[test]
    fn eof_is_a_fault_unless_closing() {
        let mut protocol = Lengths::new(&[4]);
        let mut pump = started(&mut protocol);
        let mut src = Trickle { data: Cursor::new(vec![1]), step: 8 };

        pump.on_readable(&mut src, &mut protocol).unwrap();
        assert_eq!(
            pump.on_readable(&mut src, &mut protocol),
            Err(PumpError::UnexpectedEof { offset: 1, expected: 4 })
        );

        pump.expect_close();
        assert_eq!(pump.on_readable(&mut src, &mut protocol).unwrap(), ReadProgress::Closed);
    }

    #[test]
    fn zero_next_length_is_rejected() {
        let mut protocol = Lengths::new(&[2]);
        let mut pump = started(&mut protocol);
        let mut src = Trickle { data: Cursor::new(vec![1, 2]), step: 8 };

        assert_eq!(
            pump.on_readable(&mut src, &mut protocol),
            Err(PumpError::InvalidFrameLength { len: 0, max: DEFAULT_MAX_FRAME_LEN })
        );
    }

    #[test]
    fn oversized_first_length_is_rejected() {
        let mut pump = FramePump::new(PumpConfig { max_frame_len: 8, ..PumpConfig::default() });
        assert_eq!(pump.start(9), Err(PumpError::InvalidFrameLength { len: 9, max: 8 }));
        assert!(!pump.is_started());
    }

    #[test]
    fn protocol_rejection_propagates() {
        let mut protocol = Lengths::new(&[1, 1]);
        let mut pump = started(&mut protocol);
        let mut src = Trickle { data: Cursor::new(vec![0xFF]), step: 1 };

        assert!(matches!(
            pump.on_readable(&mut src, &mut protocol),
            Err(PumpError::Protocol(ProtocolError::Malformed(_)))
        ));
    }

    #[test]
    fn read_before_start_is_rejected() {
        let mut protocol = Lengths::new(&[]);
        let mut pump = FramePump::new(PumpConfig::default());
        let mut src = Trickle { data: Cursor::new(vec![1]), step: 1 };

        assert_eq!(pump.on_readable(&mut src, &mut protocol), Err(PumpError::NotStarted));
    }

    #[test]
    fn partial_write_finishes_head_before_next_frame() {
        let mut pump = FramePump::new(PumpConfig::default());
        pump.queue(Bytes::from_static(b"abcd"));
        pump.queue(Bytes::from_static(b"ef"));

        let mut dst = Choke { written: Vec::new(), step: 3, budget: 3 };
        assert_eq!(pump.flush(&mut dst).unwrap(), FlushProgress::Pending { queued: 2 });
        assert_eq!(dst.written, b"abc");

        dst.budget = 16;
        assert_eq!(pump.flush(&mut dst).unwrap(), FlushProgress::Flushed);
        assert_eq!(dst.written, b"abcdef");
        assert_eq!(pump.queued(), 0);
    }

    #[test]
    fn zero_byte_write_is_a_fault() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut pump = FramePump::new(PumpConfig::default());
        pump.queue(Bytes::from_static(b"x"));
        assert_eq!(pump.flush(&mut Full), Err(PumpError::WriteZero));
    }

    #[test]
    fn reset_releases_everything() {
        let mut protocol = Lengths::new(&[4]);
        let mut pump = started(&mut protocol);
        pump.queue(Bytes::from_static(b"pending"));
        pump.expect_close();

        pump.reset();

        assert!(!pump.is_started());
        assert!(!pump.is_closing());
        assert_eq!(pump.expected_len(), 0);
        assert_eq!(pump.queued(), 0);
    }
}
