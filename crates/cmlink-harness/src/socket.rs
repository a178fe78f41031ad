//! In-memory socket with scripted read chunking.
//!
//! `ChunkedSocket` serves the bytes a test pushed as "from the backend",
//! in chunk sizes the test chooses, and can inject `WouldBlock`, end of
//! stream and hard errors between them. Writes land in an outbound buffer,
//! optionally capped by a byte budget to simulate a full send buffer.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// One scripted step for the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    /// Serve at most this many bytes.
    Chunk(usize),
    /// Report `WouldBlock` once.
    WouldBlock,
    /// Report end of stream once.
    Eof,
    /// Fail once with this error kind.
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<u8>,
    plan: VecDeque<ReadStep>,
    closed: bool,
    outbound: Vec<u8>,
    write_budget: Option<usize>,
    write_error: Option<io::ErrorKind>,
    reads: usize,
}

/// In-memory `Read + Write` socket.
///
/// Clones share the same wire. The session owns one clone, the test keeps
/// another to feed bytes in and inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct ChunkedSocket {
    wire: Arc<Mutex<Wire>>,
}

impl ChunkedSocket {
    /// Open socket with nothing to read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes the backend sent.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes);
    }

    /// Append read steps. Without a plan every read serves as much as fits.
    pub fn plan(&self, steps: impl IntoIterator<Item = ReadStep>) {
        self.lock().plan.extend(steps);
    }

    /// Close the backend side: once inbound bytes run out, reads see EOF.
    pub fn close_inbound(&self) {
        self.lock().closed = true;
    }

    /// Cap how many more bytes writes accept; `None` removes the cap.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.lock().write_budget = budget;
    }

    /// Make every write fail with `kind` until cleared.
    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        self.lock().write_error = kind;
    }

    /// Take everything written so far.
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().outbound)
    }

    /// Inbound bytes not yet read.
    pub fn inbound_len(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Whether a read would make progress (data, EOF or a scripted step).
    pub fn is_readable(&self) -> bool {
        let wire = self.lock();
        !wire.inbound.is_empty() || wire.closed || !wire.plan.is_empty()
    }

    /// Whether a write would accept at least one byte.
    pub fn is_writable(&self) -> bool {
        let wire = self.lock();
        wire.write_error.is_none() && wire.write_budget != Some(0)
    }

    /// Reads performed so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Number of live handles to this wire, this one included.
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.wire)
    }

    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for ChunkedSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.lock();
        wire.reads += 1;

        let limit = match wire.plan.pop_front() {
            Some(ReadStep::Chunk(n)) => n,
            Some(ReadStep::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Eof) => return Ok(0),
            Some(ReadStep::Error(kind)) => return Err(kind.into()),
            None => usize::MAX,
        };

        if wire.inbound.is_empty() {
            if wire.closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let n = limit.min(buf.len()).min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ChunkedSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.lock();
        if let Some(kind) = wire.write_error {
            return Err(kind.into());
        }

        let n = match wire.write_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => {
                let n = budget.min(buf.len());
                wire.write_budget = Some(budget - n);
                n
            },
            None => buf.len(),
        };
        wire.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_limit_each_read() {
        let mut socket = ChunkedSocket::new();
        socket.push_inbound(b"abcdef");
        socket.plan([ReadStep::Chunk(2), ReadStep::WouldBlock, ReadStep::Chunk(10)]);

        let mut buf = [0u8; 6];
        assert_eq!(socket.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ab");
        assert_eq!(socket.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(socket.read(&mut buf[2..]).unwrap(), 4);
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn empty_inbound_blocks_until_closed() {
        let mut socket = ChunkedSocket::new();
        let mut buf = [0u8; 4];

        assert_eq!(socket.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        socket.close_inbound();
        assert_eq!(socket.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_budget_caps_accepted_bytes() {
        let mut socket = ChunkedSocket::new();
        socket.set_write_budget(Some(3));

        assert_eq!(socket.write(b"hello").unwrap(), 3);
        assert_eq!(socket.write(b"lo").unwrap_err().kind(), io::ErrorKind::WouldBlock);

        socket.set_write_budget(None);
        assert_eq!(socket.write(b"lo").unwrap(), 2);
        assert_eq!(socket.take_outbound(), b"hello");
    }
}
