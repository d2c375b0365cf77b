use crate::{
    consts::*,
    utils::{apply_diff, cache_index},
};

/// One decoded op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Pixel(u16),
    /// The previous pixel, repeated `count` (1..=62) times.
    Run { color: u16, count: u8 },
    /// An RGBA literal; its bytes were consumed but there is no RGB565 color to emit.
    Discarded,
}

/// Pixel codec state: the previous pixel and the 64-entry color array. Both start zeroed
/// (black), also on slots that were never written.
#[derive(Debug, Clone, Copy)]
pub struct Qoif2PixelContext {
    pub prev: u16,
    pub arr: [u16; 64],
}

impl Qoif2PixelContext {
    pub const fn new() -> Self {
        Self {
            prev: 0,
            arr: [0; 64],
        }
    }

    /// Decodes the op starting with `tag`, pulling any further bytes from `next`.
    ///
    /// Every emitted color, runs included, becomes the previous pixel and is stored in its color
    /// array slot.
    #[inline]
    pub fn decode_op<E>(
        &mut self,
        tag: u8,
        mut next: impl FnMut() -> Result<u8, E>,
    ) -> Result<Decoded, E> {
        let decoded = match tag {
            QOIF2_OP_RGBA => {
                for _ in 0..4 {
                    next()?;
                }
                return Ok(Decoded::Discarded);
            }
            QOIF2_OP_RGB565 => Decoded::Pixel(u16::from_le_bytes([next()?, next()?])),
            _ => match tag & QOIF2_MASK_2 {
                QOIF2_OP_INDEX => Decoded::Pixel(self.arr[usize::from(tag)]),
                QOIF2_OP_DIFF => Decoded::Pixel(direct_small_diff(self.prev, tag)),
                QOIF2_OP_LUMA => Decoded::Pixel(luma_diff(self.prev, tag, next()?)),
                _ => Decoded::Run {
                    color: self.prev,
                    count: (tag & 0b0011_1111) + 1,
                },
            },
        };

        let pixel = match decoded {
            Decoded::Pixel(pixel) | Decoded::Run { color: pixel, .. } => pixel,
            Decoded::Discarded => return Ok(decoded),
        };
        self.prev = pixel;
        self.arr[usize::from(cache_index(pixel))] = pixel;

        Ok(decoded)
    }
}

impl Default for Qoif2PixelContext {
    fn default() -> Self {
        Self::new()
    }
}

// OP: 0b01
#[inline(always)]
pub(crate) const fn direct_small_diff(prev: u16, byte: u8) -> u16 {
    let (r_diff, g_diff, b_diff) = (
        ((byte >> 4) & 0b11) as i8 - 2,
        ((byte >> 2) & 0b11) as i8 - 2,
        (byte & 0b11) as i8 - 2,
    );

    apply_diff(prev, r_diff, g_diff, b_diff)
}

// OP: 0b10
#[inline(always)]
pub(crate) const fn luma_diff(prev: u16, byte: u8, rg_bg_diffs: u8) -> u16 {
    let g_diff = (byte & 0b0011_1111) as i8 - 32;
    let (rg_diff, bg_diff) = (
        (rg_bg_diffs >> 4) as i8 - 8,
        (rg_bg_diffs & 0b1111) as i8 - 8,
    );
    let (r_diff, b_diff) = (rg_diff + g_diff, bg_diff + g_diff);

    apply_diff(prev, r_diff, g_diff, b_diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encode_rgb565_unchecked as rgb;
    use core::convert::Infallible;

    fn decode_all(ctx: &mut Qoif2PixelContext, bytes: &[u8]) -> Vec<u16> {
        let mut input = bytes.iter().copied();
        let mut out = Vec::new();
        while let Some(tag) = input.next() {
            let decoded = ctx
                .decode_op::<Infallible>(tag, || Ok(input.next().unwrap()))
                .unwrap();
            match decoded {
                Decoded::Pixel(p) => out.push(p),
                Decoded::Run { color, count } => {
                    out.extend(core::iter::repeat(color).take(count.into()))
                }
                Decoded::Discarded => {}
            }
        }
        out
    }

    #[test]
    fn hand_built_stream() {
        let mut ctx = Qoif2PixelContext::new();
        let red = 0xF800;
        let bytes = [
            // literal red
            QOIF2_OP_RGB565,
            0x00,
            0xF8,
            // diff: r -1, g +1, b 0
            QOIF2_OP_DIFF | (1 << 4) | (3 << 2) | 2,
            // run of 3
            QOIF2_OP_RUN | 2,
            // back to red through the color array
            QOIF2_OP_INDEX | cache_index(red),
            // luma: g +10, r = g - 3, b = g + 2
            QOIF2_OP_LUMA | (10 + 32),
            ((-3i8 + 8) as u8) << 4 | (2 + 8),
        ];
        let diffed = rgb([30, 1, 0]);
        assert_eq!(
            decode_all(&mut ctx, &bytes),
            [
                red,
                diffed,
                diffed,
                diffed,
                diffed,
                red,
                rgb([31u8.wrapping_add(7) & 31, 10, 12])
            ]
        );
    }

    #[test]
    fn diff_wraps_at_channel_boundaries() {
        let mut ctx = Qoif2PixelContext::new();
        // from black: r -2, g -2, b +1
        let out = decode_all(&mut ctx, &[QOIF2_OP_DIFF | (0 << 4) | (0 << 2) | 3]);
        assert_eq!(out, [rgb([30, 62, 1])]);

        let mut ctx = Qoif2PixelContext::new();
        // white + 1 on every channel
        let out = decode_all(
            &mut ctx,
            &[QOIF2_OP_RGB565, 0xFF, 0xFF, QOIF2_OP_DIFF | (3 << 4) | (3 << 2) | 3],
        );
        assert_eq!(out, [0xFFFF, 0x0000]);
    }

    #[test]
    fn luma_wraps_green_at_six_bits() {
        let mut ctx = Qoif2PixelContext::new();
        ctx.prev = rgb([0, 60, 0]);
        // g +31, r = g - 8, b = g + 7
        let out = decode_all(&mut ctx, &[QOIF2_OP_LUMA | 63, 0x0F]);
        assert_eq!(out, [rgb([23, 27, 38 & 31])]);
    }

    #[test]
    fn every_pixel_lands_in_its_slot() {
        let mut ctx = Qoif2PixelContext::new();
        let bytes = [
            QOIF2_OP_RGB565,
            0x34,
            0x12,
            QOIF2_OP_DIFF | 0b01_0101,
            QOIF2_OP_RGB565,
            0xE0,
            0x07,
            QOIF2_OP_RUN,
        ];
        let mut input = bytes.iter().copied();
        while let Some(tag) = input.next() {
            let decoded = ctx
                .decode_op::<Infallible>(tag, || Ok(input.next().unwrap()))
                .unwrap();
            if let Decoded::Pixel(p) | Decoded::Run { color: p, .. } = decoded {
                assert_eq!(ctx.prev, p);
                assert_eq!(ctx.arr[usize::from(cache_index(p))], p);
            }
        }
    }

    #[test]
    fn unwritten_slots_are_black() {
        let mut ctx = Qoif2PixelContext::new();
        assert_eq!(decode_all(&mut ctx, &[QOIF2_OP_INDEX | 17]), [0]);
    }

    #[test]
    fn rgba_is_consumed_without_a_pixel() {
        let mut ctx = Qoif2PixelContext::new();
        let out = decode_all(
            &mut ctx,
            &[QOIF2_OP_RGBA, 1, 2, 3, 4, QOIF2_OP_RUN | 1],
        );
        assert_eq!(out, [0, 0]);
        assert_eq!(ctx.prev, 0);
    }
}
