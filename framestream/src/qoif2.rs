//! The QOIF2 container: a QOI-derived RGB565 codec split into blocks that each target a window
//! of the display.
//!
//! ```plain
//! FileHeader (15 bytes)
//! repeat {
//!     BlockHeader1 (7 bytes)
//!     BlockHeader2 (8 bytes) | BlockHeader2Big (16 bytes)
//!     op-stream (datalen bytes)
//! }
//! Trailer (00 00 00 00 00 00 00 01)
//! ```
//!
//! All fields are little-endian and packed.

use crate::{
    clock::Clock,
    consts::*,
    file_buffer::{BufferError, FileBuffer},
    sink::DisplaySink,
    stream::StorageStream,
    SCREEN_HEIGHT, SCREEN_WIDTH,
};
use byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, ResultExt, Snafu};

mod double_buffer;
pub mod ops;

use double_buffer::PixelBuffers;
use ops::{Decoded, Qoif2PixelContext};

/// Default capacity of the read-ahead ring buffer, in bytes.
pub const READ_BUF_SIZE: usize = 10000;
/// Default capacity of each of the two pixel buffers, in pixels.
pub const PIXEL_BUF_SIZE: usize = 10000;

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum Qoif2Error {
    #[snafu(display("bad magic {found:#010x}"))]
    BadMagic { found: u32 },
    #[snafu(display(
        "image is {width}x{height}, but the display is {expected_width}x{expected_height}"
    ))]
    BadDimensions {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[snafu(display("{channels} channels, only 2 (RGB565) are supported"))]
    BadChannels { channels: u8 },
    #[snafu(display("unsupported version {version}"))]
    BadVersion { version: u8 },
    #[snafu(display("corrupt trailer, ends in {found:#04x}"))]
    Trailer { found: u8 },
    #[snafu(display("file header is truncated"))]
    UnexpectedEof,
    #[snafu(display("block stream ran dry"))]
    Shortage { source: BufferError },
}

impl Qoif2Error {
    /// The numeric error code of the firmware: magic 1, dimensions 2, channels 3, version 4,
    /// trailer 5. Stream shortage is -1.
    pub fn code(&self) -> i32 {
        match self {
            Qoif2Error::BadMagic { .. } => 1,
            Qoif2Error::BadDimensions { .. } => 2,
            Qoif2Error::BadChannels { .. } => 3,
            Qoif2Error::BadVersion { .. } => 4,
            Qoif2Error::Trailer { .. } => 5,
            Qoif2Error::UnexpectedEof | Qoif2Error::Shortage { .. } => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub colorspace: u8,
    pub version: u8,
}

impl FileHeader {
    pub const SIZE: usize = 15;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&b[0..4]),
            width: LittleEndian::read_u32(&b[4..8]),
            height: LittleEndian::read_u32(&b[8..12]),
            channels: b[12],
            colorspace: b[13],
            version: b[14],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        LittleEndian::write_u32(&mut b[0..4], self.magic);
        LittleEndian::write_u32(&mut b[4..8], self.width);
        LittleEndian::write_u32(&mut b[8..12], self.height);
        b[12] = self.channels;
        b[13] = self.colorspace;
        b[14] = self.version;
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub flags: u8,
    /// Milliseconds; only meaningful on a block with [`QOIF2_F_END`].
    pub duration_ms: u16,
    /// Length of the op-stream, excluding both headers.
    pub data_len: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 7;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            flags: b[0],
            duration_ms: LittleEndian::read_u16(&b[1..3]),
            data_len: LittleEndian::read_u32(&b[3..7]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0; Self::SIZE];
        b[0] = self.flags;
        LittleEndian::write_u16(&mut b[1..3], self.duration_ms);
        LittleEndian::write_u32(&mut b[3..7], self.data_len);
        b
    }

    /// The first seven bytes of the trailer. A real block never has zero flags, duration and
    /// length at the same time.
    pub fn is_trailer(&self) -> bool {
        self.flags == 0 && self.duration_ms == 0 && self.data_len == 0
    }

    pub fn is_start(&self) -> bool {
        self.flags & QOIF2_F_START != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & QOIF2_F_END != 0
    }

    pub fn is_big(&self) -> bool {
        self.flags & QOIF2_F_BIG != 0
    }
}

/// Destination rectangle of a block, from `BlockHeader2` or `BlockHeader2Big`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Window {
    pub const SIZE: usize = 8;
    pub const BIG_SIZE: usize = 16;

    pub fn parse(b: &[u8; Self::SIZE]) -> Self {
        Self {
            width: u32::from(LittleEndian::read_u16(&b[0..2])),
            height: u32::from(LittleEndian::read_u16(&b[2..4])),
            x: u32::from(LittleEndian::read_u16(&b[4..6])),
            y: u32::from(LittleEndian::read_u16(&b[6..8])),
        }
    }

    pub fn parse_big(b: &[u8; Self::BIG_SIZE]) -> Self {
        Self {
            width: LittleEndian::read_u32(&b[0..4]),
            height: LittleEndian::read_u32(&b[4..8]),
            x: LittleEndian::read_u32(&b[8..12]),
            y: LittleEndian::read_u32(&b[12..16]),
        }
    }

    /// Whether every field fits the small header.
    pub fn fits_small(&self) -> bool {
        [self.width, self.height, self.x, self.y]
            .iter()
            .all(|&v| v <= u32::from(u16::MAX))
    }
}

/// Target display configuration validated by [`Qoif2Decoder::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qoif2Options {
    pub display_width: u32,
    pub display_height: u32,
}

impl Default for Qoif2Options {
    fn default() -> Self {
        Self {
            display_width: SCREEN_WIDTH,
            display_height: SCREEN_HEIGHT,
        }
    }
}

/// What the caller should do after [`Qoif2Decoder::read_and_render_block`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockOutcome {
    /// The logical frame continues; call again right away.
    Continue,
    /// A logical frame is complete. Wait `delay_ms` (may be negative when running late) before
    /// the next call. `fraction` is `delay_ms / duration`.
    Delay { delay_ms: i64, fraction: f32 },
    /// The trailer was reached and the file holds a single logical frame: a still image.
    OneFrame,
    /// The trailer was reached after an animation. Calling again restarts at the first block.
    End,
}

/// Streams a QOIF2 file onto a [`DisplaySink`], one block per call.
///
/// `R` is the ring buffer capacity in bytes and must exceed the largest header (16 bytes), which
/// is checked at compile time. `P` is the capacity of each of the two pixel buffers.
pub struct Qoif2Decoder<
    S: StorageStream,
    D: DisplaySink,
    C: Clock,
    const R: usize = READ_BUF_SIZE,
    const P: usize = PIXEL_BUF_SIZE,
> {
    read_buf: FileBuffer<S, R>,
    display: D,
    clock: C,
    header: FileHeader,
    blocks_start: u64,
    ctx: Qoif2PixelContext,
    buffers: PixelBuffers<P>,
    frame_count: u32,
    frame_start: u64,
    last_block: BlockHeader,
}

impl<S, D, C, const R: usize, const P: usize> Qoif2Decoder<S, D, C, R, P>
where
    S: StorageStream,
    D: DisplaySink,
    C: Clock,
{
    const READ_BUF_HOLDS_HEADERS: () = assert!(
        R > Window::BIG_SIZE,
        "the read buffer must be larger than a BIG window header"
    );

    /// Reads and validates the file header, then starts buffering the block stream.
    pub fn open(
        mut stream: S,
        display: D,
        clock: C,
        options: &Qoif2Options,
    ) -> Result<Self, Qoif2Error> {
        let () = Self::READ_BUF_HOLDS_HEADERS;

        let mut b = [0; FileHeader::SIZE];
        ensure!(stream.read_exact(&mut b), qoif2_error::UnexpectedEofSnafu);
        let header = FileHeader::parse(&b);

        if let Err(e) = validate(&header, options) {
            log::warn!("qoif2: {}", e);
            return Err(e);
        }

        let blocks_start = stream.position();
        log::debug!(
            "qoif2: {}x{}, blocks start at {}",
            header.width,
            header.height,
            blocks_start
        );

        Ok(Self {
            read_buf: FileBuffer::new(stream),
            display,
            clock,
            header,
            blocks_start,
            ctx: Qoif2PixelContext::new(),
            buffers: PixelBuffers::new(),
            frame_count: 0,
            frame_start: 0,
            last_block: BlockHeader::default(),
        })
    }

    /// Decodes one block onto the display.
    pub fn read_and_render_block(&mut self) -> Result<BlockOutcome, Qoif2Error> {
        let bh: [u8; BlockHeader::SIZE] = self
            .read_buf
            .read_array()
            .context(qoif2_error::ShortageSnafu)?;
        let bh = BlockHeader::parse(&bh);
        self.last_block = bh;

        if bh.is_trailer() {
            let found = self.read_buf.read_byte().context(qoif2_error::ShortageSnafu)?;
            ensure!(found == 1, qoif2_error::TrailerSnafu { found });

            // the next block is the first one again, decoded from a fresh state
            self.ctx = Qoif2PixelContext::new();
            log::debug!("qoif2: trailer after {} frames", self.frame_count);
            return Ok(if self.frame_count < 2 {
                BlockOutcome::OneFrame
            } else {
                BlockOutcome::End
            });
        }

        if bh.is_start() {
            self.frame_start = self.clock.now_ms();
            self.frame_count = self.frame_count.saturating_add(1);
        }

        let window = if bh.is_big() {
            Window::parse_big(&self.read_buf.read_array().context(qoif2_error::ShortageSnafu)?)
        } else {
            Window::parse(&self.read_buf.read_array().context(qoif2_error::ShortageSnafu)?)
        };
        log::trace!("qoif2: block {:?} {:?}", bh, window);

        self.buffers.wait(&mut self.display);
        self.display.end_transfer();
        self.display.begin_transfer();
        self.display
            .set_window(window.x, window.y, window.width, window.height);

        self.render_ops(bh.data_len)?;
        self.buffers.flush(&mut self.display);

        if bh.is_end() {
            self.buffers.wait(&mut self.display);
            self.display.end_transfer();

            if bh.duration_ms != 0 {
                // read ahead while the caller waits
                self.read_buf.fill();

                let elapsed = self.clock.now_ms().saturating_sub(self.frame_start);
                let delay_ms = i64::from(bh.duration_ms) - elapsed as i64;
                let fraction = delay_ms as f32 / f32::from(bh.duration_ms);
                return Ok(BlockOutcome::Delay { delay_ms, fraction });
            }
        }

        Ok(BlockOutcome::Continue)
    }

    fn render_ops(&mut self, data_len: u32) -> Result<(), Qoif2Error> {
        let data_len = u64::from(data_len);
        let mut consumed = 0u64;

        while consumed < data_len {
            let tag = self.read_buf.read_byte().context(qoif2_error::ShortageSnafu)?;
            consumed += 1;

            let read_buf = &mut self.read_buf;
            let decoded = self
                .ctx
                .decode_op(tag, || {
                    consumed += 1;
                    read_buf.read_byte()
                })
                .context(qoif2_error::ShortageSnafu)?;

            match decoded {
                Decoded::Run { color, count } if count > 1 => {
                    self.buffers.flush(&mut self.display);
                    self.buffers.wait(&mut self.display);
                    self.display.write_solid_run(color, usize::from(count));
                }
                Decoded::Pixel(pixel) | Decoded::Run { color: pixel, .. } => {
                    if self.buffers.is_full() {
                        self.buffers.flush(&mut self.display);
                    }
                    self.buffers.push(pixel);
                }
                Decoded::Discarded => {}
            }
        }

        Ok(())
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Offset of the first block in the stream.
    pub fn blocks_start(&self) -> u64 {
        self.blocks_start
    }

    /// Header of the block read by the last [`read_and_render_block`](Self::read_and_render_block)
    /// call. Tells where logical frames end even when their duration is 0 and no delay is
    /// reported.
    pub fn last_block(&self) -> &BlockHeader {
        &self.last_block
    }

    /// Number of logical frames started so far, counting repeats after a loop.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }
}

impl<S, D, C, const R: usize, const P: usize> Drop for Qoif2Decoder<S, D, C, R, P>
where
    S: StorageStream,
    D: DisplaySink,
    C: Clock,
{
    fn drop(&mut self) {
        // the display may still be reading from one of our pixel buffers
        self.buffers.wait(&mut self.display);
    }
}

fn validate(header: &FileHeader, options: &Qoif2Options) -> Result<(), Qoif2Error> {
    ensure!(
        header.magic == QOIF2_MAGIC,
        qoif2_error::BadMagicSnafu {
            found: header.magic
        }
    );
    ensure!(
        header.width == options.display_width && header.height == options.display_height,
        qoif2_error::BadDimensionsSnafu {
            width: header.width,
            height: header.height,
            expected_width: options.display_width,
            expected_height: options.display_height,
        }
    );
    ensure!(
        header.channels == QOIF2_CHANNELS_RGB565,
        qoif2_error::BadChannelsSnafu {
            channels: header.channels
        }
    );
    ensure!(
        header.version == QOIF2_VERSION,
        qoif2_error::BadVersionSnafu {
            version: header.version
        }
    );
    Ok(())
}
