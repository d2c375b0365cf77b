//! Seekable byte sources the decoders read from.

/// A seekable, readable byte stream, usually a file on removable storage.
///
/// Decoders borrow the stream for the duration of a decode session and never close it.
pub trait StorageStream {
    /// Reads up to `buf.len()` bytes, returning how many were read. A short read means the end of
    /// the stream was reached.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Moves the cursor to an absolute offset.
    fn seek(&mut self, pos: u64);

    /// Current absolute offset of the cursor.
    fn position(&self) -> u64;

    /// Whether unread bytes remain after the cursor.
    fn available(&mut self) -> bool;

    /// Reads exactly `buf.len()` bytes. Returns `false` on a short read; `buf` is then partially
    /// overwritten.
    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> bool {
        self.read(buf) == buf.len()
    }
}

impl<T: StorageStream + ?Sized> StorageStream for &mut T {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    #[inline]
    fn seek(&mut self, pos: u64) {
        (**self).seek(pos)
    }

    #[inline]
    fn position(&self) -> u64 {
        (**self).position()
    }

    #[inline]
    fn available(&mut self) -> bool {
        (**self).available()
    }
}

/// An in-memory stream over a byte slice, e.g. an asset linked into flash.
#[derive(Debug, Clone)]
pub struct SliceStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceStream<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn into_inner(self) -> &'a [u8] {
        self.data
    }
}

impl StorageStream for SliceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.data.get(self.pos..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        n
    }

    fn seek(&mut self, pos: u64) {
        self.pos = usize::try_from(pos).unwrap_or(usize::MAX);
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn available(&mut self) -> bool {
        self.pos < self.data.len()
    }
}

#[cfg(feature = "std")]
pub use io_stream::IoStream;

#[cfg(feature = "std")]
mod io_stream {
    use super::StorageStream;
    use std::io::{ErrorKind, Read, Seek, SeekFrom};

    /// Adapts any [`Read`] + [`Seek`] source, such as a [`std::fs::File`].
    ///
    /// I/O errors are logged and reported to the decoders as a short read.
    #[derive(Debug)]
    pub struct IoStream<R> {
        inner: R,
        pos: u64,
        len: u64,
    }

    impl<R: Read + Seek> IoStream<R> {
        pub fn new(mut inner: R) -> std::io::Result<Self> {
            let pos = inner.stream_position()?;
            let len = inner.seek(SeekFrom::End(0))?;
            inner.seek(SeekFrom::Start(pos))?;
            Ok(Self { inner, pos, len })
        }

        pub fn into_inner(self) -> R {
            self.inner
        }
    }

    impl<R: Read + Seek> StorageStream for IoStream<R> {
        fn read(&mut self, mut buf: &mut [u8]) -> usize {
            let mut total = 0;
            while !buf.is_empty() {
                match self.inner.read(buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n;
                        buf = &mut buf[n..];
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        log::warn!("stream: read failed at {}: {}", self.pos, e);
                        break;
                    }
                }
            }
            self.pos += total as u64;
            total
        }

        fn seek(&mut self, pos: u64) {
            match self.inner.seek(SeekFrom::Start(pos)) {
                Ok(pos) => self.pos = pos,
                Err(e) => log::warn!("stream: seek to {} failed: {}", pos, e),
            }
        }

        fn position(&self) -> u64 {
            self.pos
        }

        fn available(&mut self) -> bool {
            self.pos < self.len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_stream_reads_short_at_the_end() {
        let mut s = SliceStream::new(&[1, 2, 3, 4, 5]);
        let mut buf = [0; 3];
        assert_eq!(s.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert!(s.available());
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(!s.available());
        assert_eq!(s.read(&mut buf), 0);

        s.seek(1);
        assert_eq!(s.position(), 1);
        assert!(s.read_exact(&mut buf));
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn slice_stream_seek_past_end() {
        let mut s = SliceStream::new(&[1, 2]);
        s.seek(10);
        assert!(!s.available());
        assert_eq!(s.read(&mut [0; 4]), 0);
    }

    #[cfg(feature = "std")]
    #[test]
    fn io_stream_tracks_position_and_length() {
        let mut s = IoStream::new(std::io::Cursor::new(vec![9u8; 10])).unwrap();
        assert_eq!(s.position(), 0);
        let mut buf = [0; 8];
        assert_eq!(s.read(&mut buf), 8);
        assert!(s.available());
        assert_eq!(s.read(&mut buf), 2);
        assert!(!s.available());
        s.seek(4);
        assert_eq!(s.position(), 4);
        assert!(s.available());
    }
}
