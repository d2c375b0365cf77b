use super::{delta_block_pixels, encode_error, ensure_frame_size, Block, EncodeError, Rect};
use crate::{
    anim::{ChunkHeader, FileHeader, FrameHeader, ImageHeader},
    consts::*,
};
use alloc::vec::Vec;
use itertools::Itertools;
use snafu::ensure;

/// Largest RAW or RLE chunk written, in pixels. The decoder needs a buffer this large.
pub const MAX_CHUNK_PIXELS: usize = 5000;

/// Runs of at least this many pixels are written as RLE chunks.
const MIN_RLE_RUN: usize = 4;

/// A reduced copy of the image, stored as the first frame.
#[derive(Debug, Clone, Copy)]
pub struct Thumbnail<'a> {
    pub width: u16,
    pub height: u16,
    pub pixels: &'a [u16],
}

/// Writes an ANIM file frame by frame.
///
/// The animation flag is set on [`finish`](Self::finish) once more than one logical frame was
/// written.
#[derive(Debug, Clone)]
pub struct AnimEncoder {
    out: Vec<u8>,
    width: u16,
    height: u16,
    frames: usize,
}

impl AnimEncoder {
    pub fn new(width: u16, height: u16, thumbnail: Option<Thumbnail>) -> Result<Self, EncodeError> {
        let header_offset = (FileHeader::SIZE + ImageHeader::SIZE) as u16;
        let mut out = FileHeader {
            magic: ANIM_MAGIC,
            version: ANIM_VERSION,
            header_offset,
        }
        .to_bytes()
        .to_vec();
        out.extend_from_slice(
            &ImageHeader {
                width,
                height,
                bpp: 16,
                reserved: 0,
                flags: if thumbnail.is_some() {
                    ANIM_IF_HAS_THUMB
                } else {
                    0
                },
            }
            .to_bytes(),
        );

        let mut this = Self {
            out,
            width,
            height,
            frames: 0,
        };

        if let Some(thumb) = thumbnail {
            ensure!(
                thumb.width > 0 && thumb.height > 0,
                encode_error::EmptyBlockSnafu {
                    x: 0u32,
                    y: 0u32,
                    width: u32::from(thumb.width),
                    height: u32::from(thumb.height)
                }
            );
            ensure_frame_size(thumb.width.into(), thumb.height.into(), thumb.pixels)?;
            this.write_frame(
                FrameHeader {
                    width: thumb.width,
                    height: thumb.height,
                    ..Default::default()
                },
                thumb.pixels,
            );
        }

        Ok(this)
    }

    /// Appends a logical frame covering the whole image.
    pub fn push_frame(&mut self, pixels: &[u16], duration_ms: u16) -> Result<(), EncodeError> {
        self.push_block(&Block::full_frame(
            self.width.into(),
            self.height.into(),
            pixels,
            duration_ms,
        ))
    }

    /// Appends a logical frame holding only the window in which `cur` differs from `prev`.
    pub fn push_frame_delta(
        &mut self,
        prev: &[u16],
        cur: &[u16],
        duration_ms: u16,
    ) -> Result<(), EncodeError> {
        let (rect, pixels) =
            delta_block_pixels(self.width.into(), self.height.into(), prev, cur)?;
        self.push_block(&Block {
            rect,
            pixels: &pixels,
            start: true,
            end: true,
            duration_ms,
        })
    }

    pub fn push_block(&mut self, block: &Block) -> Result<(), EncodeError> {
        block.validate(self.width.into(), self.height.into())?;

        let mut flags = 0;
        if block.start {
            flags |= ANIM_FF_BEGIN;
        }
        if block.end {
            flags |= ANIM_FF_END;
            self.frames += 1;
        }

        // in bounds of a u16 sized image
        let Rect {
            x,
            y,
            width,
            height,
        } = block.rect;
        self.write_frame(
            FrameHeader {
                x: x as u16,
                y: y as u16,
                width: width as u16,
                height: height as u16,
                duration_ms: if block.end { block.duration_ms } else { 0 },
                flags,
                data_len: 0,
            },
            block.pixels,
        );
        Ok(())
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.frames > 1 {
            let flags_at = FileHeader::SIZE + 6;
            let flags = u16::from_le_bytes([self.out[flags_at], self.out[flags_at + 1]]);
            self.out[flags_at..flags_at + 2]
                .copy_from_slice(&(flags | ANIM_IF_IS_ANIM).to_le_bytes());
        }
        self.out
    }

    fn write_frame(&mut self, mut header: FrameHeader, pixels: &[u16]) {
        let data = encode_chunks(pixels);
        header.data_len = data.len() as u32;
        self.out.extend_from_slice(&header.to_bytes());
        self.out.extend_from_slice(&data);
    }
}

/// RLE chunks for runs of [`MIN_RLE_RUN`] or more pixels, RAW chunks for the rest, then END.
fn encode_chunks(pixels: &[u16]) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, command: u8, len: usize) {
        let header = ChunkHeader {
            command,
            len: len as u16,
        };
        out.extend_from_slice(&header.to_bytes());
    }

    fn flush_raw(out: &mut Vec<u8>, raw: &mut Vec<u16>) {
        for part in raw.chunks(MAX_CHUNK_PIXELS) {
            chunk(out, ANIM_C_RAW, part.len());
            for px in part {
                out.extend_from_slice(&px.to_le_bytes());
            }
        }
        raw.clear();
    }

    let mut out = Vec::new();
    let mut raw = Vec::new();

    for (count, &pixel) in pixels.iter().dedup_with_count() {
        if count < MIN_RLE_RUN {
            raw.extend(core::iter::repeat(pixel).take(count));
            continue;
        }

        flush_raw(&mut out, &mut raw);
        let mut left = count;
        while left > 0 {
            let n = left.min(MAX_CHUNK_PIXELS);
            chunk(&mut out, ANIM_C_RLE, n);
            out.extend_from_slice(&pixel.to_le_bytes());
            left -= n;
        }
    }
    flush_raw(&mut out, &mut raw);

    chunk(&mut out, ANIM_C_END, 0);
    out
}
