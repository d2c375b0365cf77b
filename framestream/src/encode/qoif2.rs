use super::{delta_block_pixels, ensure_frame_size, Block, EncodeError};
use crate::{
    consts::*,
    qoif2::{BlockHeader, FileHeader, Window},
    utils::{cache_index, decode_565},
};
use alloc::vec::Vec;
use itertools::Itertools;

const MAX_RUN: usize = 62;

/// Writes a QOIF2 file block by block.
///
/// The codec state carries over from one block to the next, exactly like in the decoder, and is
/// only reset by the trailer.
#[derive(Debug, Clone)]
pub struct Qoif2Encoder {
    out: Vec<u8>,
    width: u32,
    height: u32,
    prev: u16,
    arr: [u16; 64],
}

impl Qoif2Encoder {
    pub fn new(width: u32, height: u32) -> Self {
        let header = FileHeader {
            magic: QOIF2_MAGIC,
            width,
            height,
            channels: QOIF2_CHANNELS_RGB565,
            colorspace: 1,
            version: QOIF2_VERSION,
        };
        Self {
            out: header.to_bytes().to_vec(),
            width,
            height,
            prev: 0,
            arr: [0; 64],
        }
    }

    /// Appends a logical frame covering the whole image.
    pub fn push_frame(&mut self, pixels: &[u16], duration_ms: u16) -> Result<(), EncodeError> {
        ensure_frame_size(self.width, self.height, pixels)?;
        self.push_block(&Block::full_frame(self.width, self.height, pixels, duration_ms))
    }

    /// Appends a logical frame holding only the window in which `cur` differs from `prev`.
    pub fn push_frame_delta(
        &mut self,
        prev: &[u16],
        cur: &[u16],
        duration_ms: u16,
    ) -> Result<(), EncodeError> {
        let (rect, pixels) = delta_block_pixels(self.width, self.height, prev, cur)?;
        self.push_block(&Block {
            rect,
            pixels: &pixels,
            start: true,
            end: true,
            duration_ms,
        })
    }

    /// Appends a block. The big header is used when a window field does not fit 16 bits.
    pub fn push_block(&mut self, block: &Block) -> Result<(), EncodeError> {
        block.validate(self.width, self.height)?;

        let window = Window {
            width: block.rect.width,
            height: block.rect.height,
            x: block.rect.x,
            y: block.rect.y,
        };

        let mut flags = 0;
        if block.start {
            flags |= QOIF2_F_START;
        }
        if block.end {
            flags |= QOIF2_F_END;
        }
        if !window.fits_small() {
            flags |= QOIF2_F_BIG;
        }

        let mut data = Vec::new();
        self.encode_pixels(block.pixels, &mut data);

        let header = BlockHeader {
            flags,
            duration_ms: if block.end { block.duration_ms } else { 0 },
            data_len: data.len() as u32,
        };
        self.out.extend_from_slice(&header.to_bytes());

        if flags & QOIF2_F_BIG != 0 {
            for v in [window.width, window.height, window.x, window.y] {
                self.out.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            for v in [window.width, window.height, window.x, window.y] {
                self.out.extend_from_slice(&(v as u16).to_le_bytes());
            }
        }
        self.out.extend_from_slice(&data);

        Ok(())
    }

    /// Appends the trailer and returns the file.
    pub fn finish(mut self) -> Vec<u8> {
        self.out.extend_from_slice(&QOIF2_TRAILER);
        self.out
    }

    fn push_run(w: &mut Vec<u8>, mut count: usize) {
        while count > 0 {
            let n = count.min(MAX_RUN);
            w.push(QOIF2_OP_RUN | (n - 1) as u8);
            count -= n;
        }
    }

    fn encode_pixels(&mut self, pixels: &[u16], w: &mut Vec<u8>) {
        for (count, &pixel) in pixels.iter().dedup_with_count() {
            if pixel == self.prev {
                Self::push_run(w, count);
                continue;
            }

            self.encode_pixel(pixel, w);
            Self::push_run(w, count - 1);
        }
    }

    fn encode_pixel(&mut self, pixel: u16, w: &mut Vec<u8>) {
        let index = cache_index(pixel);
        let prev = core::mem::replace(&mut self.prev, pixel);
        let slot = &mut self.arr[usize::from(index)];

        if *slot == pixel {
            w.push(QOIF2_OP_INDEX | index);
            return;
        }
        *slot = pixel;

        // plain differences: a channel never over- or underflows while decoding
        let [r, g, b] = decode_565(pixel);
        let [r_prev, g_prev, b_prev] = decode_565(prev);
        let (r_diff, g_diff, b_diff) = (
            r as i8 - r_prev as i8,
            g as i8 - g_prev as i8,
            b as i8 - b_prev as i8,
        );

        if matches!((r_diff, g_diff, b_diff), (-2..=1, -2..=1, -2..=1)) {
            let mut b = QOIF2_OP_DIFF;
            b |= ((r_diff + 2) << 4) as u8;
            b |= ((g_diff + 2) << 2) as u8;
            b |= (b_diff + 2) as u8;
            w.push(b);
            return;
        }

        let rg_diff = r_diff - g_diff;
        let bg_diff = b_diff - g_diff;
        if matches!((rg_diff, g_diff, bg_diff), (-8..=7, -32..=31, -8..=7)) {
            w.extend_from_slice(&[
                QOIF2_OP_LUMA | (g_diff + 32) as u8,
                ((rg_diff + 8) as u8) << 4 | (bg_diff + 8) as u8,
            ]);
            return;
        }

        let [lo, hi] = pixel.to_le_bytes();
        w.extend_from_slice(&[QOIF2_OP_RGB565, lo, hi]);
    }
}
