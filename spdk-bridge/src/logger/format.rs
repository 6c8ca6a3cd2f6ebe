//! Bounded message formatting
//!
//! `BoundedWriter` behaves like `vsnprintf`: it copies as much of the message
//! as fits (always leaving room for a NUL terminator) and counts how many bytes
//! the full message needs. `format_message` turns that count into one of three
//! outcomes, each of which knows how long it is and what it owns.

use std::fmt::{self, Write};
use std::os::raw::c_int;

/// A formatter sink over a fixed byte slice that keeps counting past the end
pub struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
    required: usize,
}

impl<'a> BoundedWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            written: 0,
            required: 0,
        }
    }

    /// Bytes actually copied into the buffer (excluding the terminator)
    pub fn written(&self) -> usize {
        self.written
    }

    /// Bytes the complete message needs (excluding the terminator)
    pub fn required(&self) -> usize {
        self.required
    }

    /// Write the terminator right after the copied bytes
    fn terminate(&mut self) {
        if let Some(byte) = self.buf.get_mut(self.written) {
            *byte = 0;
        }
    }
}

impl BoundedWriter<'_> {
    /// Append raw bytes, which need not be UTF-8
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let room = self
            .buf
            .len()
            .saturating_sub(1)
            .saturating_sub(self.written);
        let n = bytes.len().min(room);
        self.buf[self.written..self.written + n].copy_from_slice(&bytes[..n]);
        self.written += n;
        self.required += bytes.len();
    }
}

impl Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

fn render_into<R>(buf: &mut [u8], render: &R) -> (usize, usize)
where
    R: Fn(&mut BoundedWriter<'_>) -> fmt::Result,
{
    let mut writer = BoundedWriter::new(buf);
    if render(&mut writer).is_err() {
        writer.required = writer.written;
    }
    writer.terminate();
    (writer.written, writer.required)
}

/// Format `args` into `buf`, NUL-terminate, and return `(written, required)`
///
/// A `Display` impl that reports an error stops formatting early; whatever
/// was produced up to that point is what gets reported.
pub fn format_into(buf: &mut [u8], args: fmt::Arguments<'_>) -> (usize, usize) {
    render_into(buf, &|w: &mut BoundedWriter<'_>| w.write_fmt(args))
}

/// Source of temporary buffers for messages that overflow the stack buffer
pub trait ScratchAllocator {
    /// Return a zeroed buffer of exactly `len` bytes, or `None` if memory is
    /// not available. Must not abort the process.
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;
}

/// Fallible allocation from the global heap
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl ScratchAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        buf.resize(len, 0);
        Some(buf)
    }
}

/// An allocator that never has memory; forces the truncation path
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScratch;

impl ScratchAllocator for NoScratch {
    fn allocate(&self, _len: usize) -> Option<Vec<u8>> {
        None
    }
}

/// Outcome of formatting one message
///
/// Each variant carries exactly the bytes the callback may read. Dropping a
/// `Heap` message releases its allocation.
#[derive(Debug)]
pub enum FormattedMessage<'a> {
    /// The message fit in the stack buffer
    Inline(&'a [u8]),
    /// The message was re-rendered into a scratch allocation; `.1` is the
    /// number of message bytes in `.0` (which also holds a terminator)
    Heap(Vec<u8>, usize),
    /// The message did not fit and no scratch memory was available; the whole
    /// stack buffer, with its last byte forced to NUL
    Truncated(&'a [u8]),
}

impl FormattedMessage<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FormattedMessage::Inline(bytes) => bytes,
            FormattedMessage::Heap(buf, len) => &buf[..*len],
            FormattedMessage::Truncated(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, FormattedMessage::Truncated(_))
    }
}

/// Render `args` according to the stack/heap/truncate policy
///
/// `stack` must be non-empty. Its contents on entry are irrelevant; only the
/// bytes covered by the returned message are ever exposed.
pub fn format_message<'a, A>(
    stack: &'a mut [u8],
    alloc: &A,
    args: fmt::Arguments<'_>,
) -> FormattedMessage<'a>
where
    A: ScratchAllocator + ?Sized,
{
    render_message(stack, alloc, |w| w.write_fmt(args))
}

/// Place already-rendered bytes under the same policy, byte for byte
pub fn format_bytes<'a, A>(stack: &'a mut [u8], alloc: &A, bytes: &[u8]) -> FormattedMessage<'a>
where
    A: ScratchAllocator + ?Sized,
{
    render_message(stack, alloc, |w| {
        w.write_bytes(bytes);
        Ok(())
    })
}

fn render_message<'a, A, R>(stack: &'a mut [u8], alloc: &A, render: R) -> FormattedMessage<'a>
where
    A: ScratchAllocator + ?Sized,
    R: Fn(&mut BoundedWriter<'_>) -> fmt::Result,
{
    let cap = stack.len();
    let (written, required) = render_into(stack, &render);

    if required < cap {
        return FormattedMessage::Inline(&stack[..written]);
    }

    // the callback takes a C int length; anything longer is truncated too
    if c_int::try_from(required).is_ok() {
        if let Some(mut heap) = required.checked_add(1).and_then(|n| alloc.allocate(n)) {
            let (written, _) = render_into(&mut heap, &render);
            return FormattedMessage::Heap(heap, written);
        }
    }

    stack[cap - 1] = 0;
    FormattedMessage::Truncated(stack)
}
