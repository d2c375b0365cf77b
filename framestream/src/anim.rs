//! The ANIM (`.sda`) container.
//!
//! ```plain
//! FileHeader  (8 bytes)   magic, version, header offset
//! ImageHeader (8 bytes)   width, height, bpp, reserved, flags
//! at header offset, repeat {
//!     FrameHeader (15 bytes)
//!     repeat { ChunkHeader (3 bytes), payload } until an END chunk
//! }
//! ```
//!
//! If the image has a thumbnail, it is the first frame. All fields are little-endian and packed.

use crate::{clock::Clock, consts::*, stream::StorageStream};
use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum AnimError {
    #[snafu(display("bad magic {found:#010x}"))]
    BadMagic { found: u32 },
    #[snafu(display("unsupported version {version}"))]
    BadVersion { version: u16 },
    #[snafu(display("{bpp} bits per pixel, only 16 are supported"))]
    BadBitsPerPixel { bpp: u8 },
    #[snafu(display("image has no thumbnail"))]
    NoThumbnail,
    #[snafu(display("unknown chunk command {command}"))]
    UnknownCommand { command: u8 },
    #[snafu(display("chunk of {needed} pixels does not fit a buffer of {len}"))]
    OutputTooSmall { needed: usize, len: usize },
    #[snafu(display("unexpected end of stream"))]
    UnexpectedEof,
}

impl AnimError {
    /// The numeric error code of the firmware: magic 1, version 2, no thumbnail 3, bpp 4. Decode
    /// faults are -1.
    pub fn code(&self) -> i32 {
        match self {
            AnimError::BadMagic { .. } => 1,
            AnimError::BadVersion { .. } => 2,
            AnimError::NoThumbnail => 3,
            AnimError::BadBitsPerPixel { .. } => 4,
            AnimError::UnknownCommand { .. }
            | AnimError::OutputTooSmall { .. }
            | AnimError::UnexpectedEof => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u16,
    /// Absolute offset of the first frame.
    pub header_offset: u16,
}

impl FileHeader {
    pub const SIZE: usize = 8;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&b[0..4]),
            version: LittleEndian::read_u16(&b[4..6]),
            header_offset: LittleEndian::read_u16(&b[6..8]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        LittleEndian::write_u32(&mut b[0..4], self.magic);
        LittleEndian::write_u16(&mut b[4..6], self.version);
        LittleEndian::write_u16(&mut b[6..8], self.header_offset);
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
    pub reserved: u8,
    pub flags: u16,
}

impl ImageHeader {
    pub const SIZE: usize = 8;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            width: LittleEndian::read_u16(&b[0..2]),
            height: LittleEndian::read_u16(&b[2..4]),
            bpp: b[4],
            reserved: b[5],
            flags: LittleEndian::read_u16(&b[6..8]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        LittleEndian::write_u16(&mut b[0..2], self.width);
        LittleEndian::write_u16(&mut b[2..4], self.height);
        b[4] = self.bpp;
        b[5] = self.reserved;
        LittleEndian::write_u16(&mut b[6..8], self.flags);
        b
    }
}

/// Header of one frame: a window of the image and the chunks filling it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Milliseconds; only meaningful on a frame with [`ANIM_FF_END`].
    pub duration_ms: u16,
    pub flags: u8,
    /// Length of the chunk stream, excluding this header.
    pub data_len: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 15;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            x: LittleEndian::read_u16(&b[0..2]),
            y: LittleEndian::read_u16(&b[2..4]),
            width: LittleEndian::read_u16(&b[4..6]),
            height: LittleEndian::read_u16(&b[6..8]),
            duration_ms: LittleEndian::read_u16(&b[8..10]),
            flags: b[10],
            data_len: LittleEndian::read_u32(&b[11..15]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        LittleEndian::write_u16(&mut b[0..2], self.x);
        LittleEndian::write_u16(&mut b[2..4], self.y);
        LittleEndian::write_u16(&mut b[4..6], self.width);
        LittleEndian::write_u16(&mut b[6..8], self.height);
        LittleEndian::write_u16(&mut b[8..10], self.duration_ms);
        b[10] = self.flags;
        LittleEndian::write_u32(&mut b[11..15], self.data_len);
        b
    }

    /// First frame of a logical frame.
    pub fn is_begin(&self) -> bool {
        self.flags & ANIM_FF_BEGIN != 0
    }

    /// Last frame of a logical frame; carries the duration.
    pub fn is_end(&self) -> bool {
        self.flags & ANIM_FF_END != 0
    }

    /// Number of pixels covered by the frame window.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub command: u8,
    /// Pixel count for RAW and RLE.
    pub len: u16,
}

impl ChunkHeader {
    pub const SIZE: usize = 3;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            command: b[0],
            len: LittleEndian::read_u16(&b[1..3]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        b[0] = self.command;
        LittleEndian::write_u16(&mut b[1..3], self.len);
        b
    }
}

/// Result of [`AnimDecoder::read_pixel_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// This many pixels were written to the start of the buffer.
    Pixels(usize),
    /// The frame has no more chunks. `looped` is set when this was the last frame of an
    /// animation and the stream was rewound to the first frame.
    End { looped: bool },
}

/// Reads an ANIM file frame by frame.
///
/// ```ignore
/// let mut anim = AnimDecoder::open(stream, clock)?;
/// anim.begin_frames()?;
/// loop {
///     let frame = anim.read_frame_header()?;
///     while let Chunk::Pixels(n) = anim.read_pixel_chunk(&mut buf)? {
///         // draw buf[..n] into the frame window
///     }
///     if frame.is_end() {
///         anim.wait_for_frame_duration(&mut delay);
///     }
/// }
/// ```
pub struct AnimDecoder<S, C> {
    stream: S,
    clock: C,
    file_header: FileHeader,
    image_header: ImageHeader,
    frame_header: FrameHeader,
    frame_start_ms: u64,
    loop_start: u64,
}

impl<S: StorageStream, C: Clock> AnimDecoder<S, C> {
    /// Reads and validates the file and image headers.
    pub fn open(mut stream: S, clock: C) -> Result<Self, AnimError> {
        let mut b = [0; FileHeader::SIZE];
        ensure!(stream.read_exact(&mut b), anim_error::UnexpectedEofSnafu);
        let file_header = FileHeader::parse(&b);

        let result = validate_file_header(&file_header).and_then(|()| {
            let mut b = [0; ImageHeader::SIZE];
            ensure!(stream.read_exact(&mut b), anim_error::UnexpectedEofSnafu);
            let image_header = ImageHeader::parse(&b);
            ensure!(
                image_header.bpp == 16,
                anim_error::BadBitsPerPixelSnafu {
                    bpp: image_header.bpp
                }
            );
            Ok(image_header)
        });
        let image_header = match result {
            Ok(h) => h,
            Err(e) => {
                log::warn!("anim: {}", e);
                return Err(e);
            }
        };

        log::debug!(
            "anim: {}x{}, flags {:#x}, frames at {}",
            image_header.width,
            image_header.height,
            image_header.flags,
            file_header.header_offset
        );

        Ok(Self {
            stream,
            clock,
            file_header,
            image_header,
            frame_header: FrameHeader::default(),
            frame_start_ms: 0,
            loop_start: u64::from(file_header.header_offset),
        })
    }

    pub fn is_animated(&self) -> bool {
        self.image_header.flags & ANIM_IF_IS_ANIM != 0
    }

    pub fn has_thumbnail(&self) -> bool {
        self.image_header.flags & ANIM_IF_HAS_THUMB != 0
    }

    pub fn width(&self) -> u16 {
        self.image_header.width
    }

    pub fn height(&self) -> u16 {
        self.image_header.height
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn image_header(&self) -> &ImageHeader {
        &self.image_header
    }

    /// Positions the stream at the thumbnail frame. Read it like any other frame.
    pub fn seek_thumbnail(&mut self) -> Result<(), AnimError> {
        ensure!(self.has_thumbnail(), anim_error::NoThumbnailSnafu);
        self.stream.seek(u64::from(self.file_header.header_offset));
        Ok(())
    }

    /// Positions the stream at the first frame after the thumbnail, and makes that the point
    /// the animation loops back to.
    pub fn begin_frames(&mut self) -> Result<(), AnimError> {
        self.stream.seek(u64::from(self.file_header.header_offset));
        if self.has_thumbnail() {
            let thumb = self.read_header()?;
            let pos = self.stream.position() + u64::from(thumb.data_len);
            self.stream.seek(pos);
        }
        self.loop_start = self.stream.position();
        log::debug!("anim: frames start at {}", self.loop_start);
        Ok(())
    }

    fn read_header(&mut self) -> Result<FrameHeader, AnimError> {
        let mut b = [0; FrameHeader::SIZE];
        ensure!(self.stream.read_exact(&mut b), anim_error::UnexpectedEofSnafu);
        Ok(FrameHeader::parse(&b))
    }

    /// Reads the next frame header and starts its pacing timer. A width or height of 0 is
    /// resolved to the image size.
    pub fn read_frame_header(&mut self) -> Result<FrameHeader, AnimError> {
        let mut fh = self.read_header()?;
        if fh.width == 0 {
            fh.width = self.image_header.width;
        }
        if fh.height == 0 {
            fh.height = self.image_header.height;
        }
        self.frame_start_ms = self.clock.now_ms();
        self.frame_header = fh;
        log::trace!("anim: frame {:?}", fh);
        Ok(fh)
    }

    /// The header returned by the last [`read_frame_header`](Self::read_frame_header).
    pub fn frame_header(&self) -> &FrameHeader {
        &self.frame_header
    }

    /// Expands the next chunk of the current frame into `buf`.
    pub fn read_pixel_chunk(&mut self, buf: &mut [u16]) -> Result<Chunk, AnimError> {
        let mut b = [0; ChunkHeader::SIZE];
        ensure!(self.stream.read_exact(&mut b), anim_error::UnexpectedEofSnafu);
        let chunk = ChunkHeader::parse(&b);
        let len = usize::from(chunk.len);

        match chunk.command {
            ANIM_C_RAW => {
                let out = output(buf, len)?;
                let mut scratch = [0u8; 128];
                for out in out.chunks_mut(scratch.len() / 2) {
                    let bytes = &mut scratch[..out.len() * 2];
                    ensure!(self.stream.read_exact(bytes), anim_error::UnexpectedEofSnafu);
                    LittleEndian::read_u16_into(bytes, out);
                }
                Ok(Chunk::Pixels(len))
            }
            ANIM_C_RLE => {
                let out = output(buf, len)?;
                let mut px = [0; 2];
                ensure!(self.stream.read_exact(&mut px), anim_error::UnexpectedEofSnafu);
                out.fill(u16::from_le_bytes(px));
                Ok(Chunk::Pixels(len))
            }
            ANIM_C_END => {
                let looped = self.is_animated() && !self.stream.available();
                if looped {
                    log::debug!("anim: looping back to {}", self.loop_start);
                    self.stream.seek(self.loop_start);
                }
                Ok(Chunk::End { looped })
            }
            command => anim_error::UnknownCommandSnafu { command }.fail(),
        }
    }

    /// Milliseconds left of the current frame's duration; negative when running late.
    pub fn remaining_frame_time(&self) -> i64 {
        let elapsed = self.clock.now_ms().saturating_sub(self.frame_start_ms);
        i64::from(self.frame_header.duration_ms) - elapsed as i64
    }

    /// Blocks until the current frame's duration has passed since its header was read. Frames
    /// running late are not skipped.
    pub fn wait_for_frame_duration(&self, delay: &mut impl DelayNs) {
        let remaining = self.remaining_frame_time();
        if remaining > 0 {
            delay.delay_ms(remaining as u32);
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn output(buf: &mut [u16], needed: usize) -> Result<&mut [u16], AnimError> {
    let len = buf.len();
    buf.get_mut(..needed)
        .ok_or(AnimError::OutputTooSmall { needed, len })
}

fn validate_file_header(header: &FileHeader) -> Result<(), AnimError> {
    ensure!(
        header.magic == ANIM_MAGIC,
        anim_error::BadMagicSnafu {
            found: header.magic
        }
    );
    ensure!(
        header.version == ANIM_VERSION,
        anim_error::BadVersionSnafu {
            version: header.version
        }
    );
    Ok(())
}
