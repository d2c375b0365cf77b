use crate::stream::StorageStream;
use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum BufferError {
    #[snafu(display("requested {requested} bytes, only {buffered} buffered after refill"))]
    Shortage { requested: usize, buffered: usize },
}

/// Result of [`FileBuffer::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The buffer is full.
    Filled,
    /// The stream ran out, either with a short read or with a read ending exactly at its end.
    /// Whatever could be read was kept, and the stream was rewound to the position it had when
    /// the buffer was created, so the next fill continues from there.
    ResetToStart,
}

/// A fixed-capacity ring buffer that prefetches from a [`StorageStream`].
///
/// The buffer captures the stream position on construction. Whenever a refill hits the end of
/// the stream, the stream is seeked back to that position: the bytes following the end of the
/// stream in the ring are the bytes from the start position again. For a QOIF2 file created
/// right after the file header this means the trailer is directly followed by the first block.
///
/// `N` must be larger than the biggest single request made against the buffer.
pub struct FileBuffer<S, const N: usize> {
    buf: [u8; N],
    /// Write position.
    head: usize,
    /// Read position.
    tail: usize,
    size: usize,
    stream: S,
    reset_pos: u64,
}

impl<S: StorageStream, const N: usize> FileBuffer<S, N> {
    pub fn new(stream: S) -> Self {
        debug_assert!(N > 0, "FileBuffer needs a non-zero capacity");

        let reset_pos = stream.position();
        let mut this = Self {
            buf: [0; N],
            head: 0,
            tail: 0,
            size: 0,
            stream,
            reset_pos,
        };
        this.fill();
        this
    }

    /// Tops up the buffer from the stream.
    pub fn fill(&mut self) -> FillOutcome {
        while self.size < N {
            let max_read = if self.tail <= self.head {
                // up to the end of the buffer
                (N - self.size).min(N - self.head)
            } else {
                self.tail - self.head
            };

            let read = self
                .stream
                .read(&mut self.buf[self.head..self.head + max_read]);
            self.size += read;
            self.head = (self.head + read) % N;

            if read < max_read || !self.stream.available() {
                log::debug!(
                    "file buffer: end of stream, rewinding to {} ({} bytes buffered)",
                    self.reset_pos,
                    self.size
                );
                self.stream.seek(self.reset_pos);
                return FillOutcome::ResetToStart;
            }
        }

        FillOutcome::Filled
    }

    fn ensure_buffered(&mut self, requested: usize) -> Result<(), BufferError> {
        if self.size < requested {
            self.fill();
            ensure!(
                self.size >= requested,
                buffer_error::ShortageSnafu {
                    requested,
                    buffered: self.size
                }
            );
        }
        Ok(())
    }

    /// Copies `dest.len()` bytes out of the buffer, refilling once if needed. On shortage nothing
    /// is consumed.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), BufferError> {
        let n = dest.len();
        self.ensure_buffered(n)?;

        let first = n.min(N - self.tail);
        let (a, b) = dest.split_at_mut(first);
        a.copy_from_slice(&self.buf[self.tail..self.tail + first]);
        b.copy_from_slice(&self.buf[..b.len()]);

        self.tail = (self.tail + n) % N;
        self.size -= n;
        Ok(())
    }

    pub fn read_array<const M: usize>(&mut self) -> Result<[u8; M], BufferError> {
        let mut out = [0; M];
        self.read(&mut out)?;
        Ok(out)
    }

    #[inline]
    pub fn read_byte(&mut self) -> Result<u8, BufferError> {
        self.ensure_buffered(1)?;
        let b = self.buf[self.tail];
        self.tail = (self.tail + 1) % N;
        self.size -= 1;
        Ok(b)
    }

    /// Discards `n` bytes, refilling once if needed. On shortage nothing is consumed.
    pub fn skip(&mut self, n: usize) -> Result<(), BufferError> {
        self.ensure_buffered(n)?;
        self.tail = (self.tail + n) % N;
        self.size -= n;
        Ok(())
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.size
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn reset_pos(&self) -> u64 {
        self.reset_pos
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
