//! Streaming decoders for the ANIM (`.sda`) and QOIF2 (`.qox`) animation formats.
//!
//! Both formats carry 16-bit RGB565 pixels only and are designed to be played back on a small
//! display straight from removable storage, without a heap and with a small RAM budget.
//!
//! - [`anim::AnimDecoder`] reads the ANIM container: a file header, an image header, then a
//!   sequence of frames made of RAW/RLE pixel chunks. Pixels are expanded into a caller supplied
//!   buffer.
//! - [`qoif2::Qoif2Decoder`] reads the QOIF2 container: a QOI-derived byte oriented codec split
//!   into blocks, each targeting a window of the display. Pixels are written through a pair of
//!   fixed-size buffers to a [`DisplaySink`], so that decoding overlaps the (asynchronous) display
//!   transfer.
//! - [`FileBuffer`] is the ring buffer between the storage and the QOIF2 decoder. It rewinds the
//!   storage to the start of the block stream when it runs dry, which is what makes QOIF2
//!   animations loop seamlessly.
//!
//! # QOIF2 differences from QOI
//!
//! - 4-byte magic `qoiF`, u32le width and height, channels (must be `2` for RGB565), colorspace
//!   and a version byte (must be `2`).
//! - Each run of pixel data is preceded by two block headers: flags, duration and data length,
//!   then the target window in either 2-byte or 4-byte ([`consts::QOIF2_F_BIG`]) fields.
//! - The color array index of a pixel is `(pixel * 6311) % 64`.
//! - [`consts::QOIF2_OP_RGB565`] is followed by the raw little-endian RGB565 value.
//! - The stream ends with `00 00 00 00 00 00 00 01`.
//!
//! # Op-codes
//!
//! See [consts] for the different operation types.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "alloc")]
pub mod encode;

pub mod anim;
pub mod clock;
pub mod file_buffer;
pub mod qoif2;
pub mod sink;
pub mod stream;
pub mod utils;

pub use anim::AnimDecoder;
pub use clock::Clock;
pub use file_buffer::{FileBuffer, FillOutcome};
pub use qoif2::{BlockOutcome, Qoif2Decoder, Qoif2Options};
pub use sink::DisplaySink;
pub use stream::StorageStream;

#[cfg(feature = "alloc")]
pub use encode::{AnimEncoder, Qoif2Encoder};

/// Width of the display the firmware drives.
pub const SCREEN_WIDTH: u32 = 240;
/// Height of the display the firmware drives.
pub const SCREEN_HEIGHT: u32 = 320;

pub mod consts {
    /// Re-emit a pixel from the color array.
    ///
    /// ```plain
    /// .- QOIF2_OP_INDEX --------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------|
    /// |  0  0 |     index       |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b00
    /// - 6-bit index into the color array: 0..63
    pub const QOIF2_OP_INDEX: u8 = 0b0000_0000;

    /// Calculate a pixel based on a 2-bit difference from the previous pixel.
    ///
    /// ```plain
    /// .- QOIF2_OP_DIFF ---------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----+-----+-----|
    /// |  0  1 |  dr |  dg |  db |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b01
    /// - 2-bit red, green and blue channel differences from the previous pixel between -2..1,
    ///   each stored with a bias of 2
    pub const QOIF2_OP_DIFF: u8 = 0b0100_0000;

    /// Calculate a pixel based on a 6-bit green-channel difference from the previous pixel, and
    /// differences to the green-channel difference for red and blue.
    ///
    ///  ```plain
    /// .- QOIF2_OP_LUMA -----------------------------------.
    /// |         Byte[0]         |         Byte[1]         |
    /// |  7  6  5  4  3  2  1  0 |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------+-------------+-----------|
    /// |  1  0 |   green diff    |   dr - dg   |  db - dg  |
    /// `---------------------------------------------------`
    /// ```
    ///
    /// - 2-bit tag b10
    /// - 6-bit green channel difference from the previous pixel (`-32..31`), stored with a bias of
    ///   32
    /// - 4-bit red channel difference minus green channel difference (`-8..7`), stored with a bias
    ///   of 8
    /// - 4-bit blue channel difference minus green channel difference (`-8..7`), stored with a bias
    ///   of 8
    pub const QOIF2_OP_LUMA: u8 = 0b1000_0000;

    /// Repeats the last pixel.
    ///
    /// ```plain
    /// .- QOIF2_OP_RUN ----------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------|
    /// |  1  1 |       run       |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b11
    /// - 6-bit run-length repeating the previous pixel: 1..62, stored with a bias of -1. The
    ///   values 63 and 64 are occupied by the RGB565 and RGBA tags.
    pub const QOIF2_OP_RUN: u8 = 0b1100_0000;

    /// Emits a full raw pixel.
    ///
    /// ```plain
    /// .- QOIF2_OP_RGB565 ---------------------------.
    /// |         Byte[0]         | Byte[1] | Byte[2] |
    /// |  7  6  5  4  3  2  1  0 | 7 .. 0  | 7 .. 0  |
    /// |-------------------------+---------+---------|
    /// |  1  1  1  1  1  1  1  0 | RGB565LE          |
    /// `---------------------------------------------`
    /// ```
    pub const QOIF2_OP_RGB565: u8 = 0b1111_1110;

    /// A full RGBA8888 pixel. Only valid in 4-channel files, which are not supported: the four
    /// bytes are consumed and no pixel is emitted.
    pub const QOIF2_OP_RGBA: u8 = 0b1111_1111;

    pub const QOIF2_MASK_2: u8 = 0b1100_0000;

    /// `qoiF` read as a little-endian u32.
    pub const QOIF2_MAGIC: u32 = 0x4669_6f71;
    pub const QOIF2_VERSION: u8 = 2;
    pub const QOIF2_CHANNELS_RGB565: u8 = 2;
    pub const QOIF2_TRAILER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

    /// Block is a thumbnail.
    pub const QOIF2_F_THUMB: u8 = 1;
    /// Block starts a logical frame.
    pub const QOIF2_F_START: u8 = 2;
    /// Block ends a logical frame; the only block that carries a duration.
    pub const QOIF2_F_END: u8 = 4;
    /// The second block header uses 4-byte fields.
    pub const QOIF2_F_BIG: u8 = 8;

    /// `AImg` read as a little-endian u32.
    pub const ANIM_MAGIC: u32 = 0x676d_4941;
    pub const ANIM_VERSION: u16 = 4;

    pub const ANIM_IF_IS_ANIM: u16 = 1;
    pub const ANIM_IF_HAS_THUMB: u16 = 2;

    pub const ANIM_FF_BEGIN: u8 = 1;
    pub const ANIM_FF_END: u8 = 128;

    pub const ANIM_C_RAW: u8 = 1;
    pub const ANIM_C_RLE: u8 = 2;
    pub const ANIM_C_END: u8 = 255;
}
