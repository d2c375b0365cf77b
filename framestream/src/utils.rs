pub use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

/// Color array slot for a pixel: `(pixel * 6311) % 64`.
#[inline]
pub const fn cache_index(pixel: u16) -> u8 {
    ((pixel as u32 * 6311) % 64) as u8
}

/// Applies an signed difference to a number, wrapping around at N bits.
#[inline]
pub const fn sum_n<const N: u8>(a: u8, d: i8) -> u8 {
    (((a as i8).wrapping_add(d)) << (8 - N)) as u8 >> (8 - N)
}

/// Splits a RGB565 pixel into its components.
#[inline]
pub const fn decode_565(pixel: u16) -> [u8; 3] {
    let r = (pixel & 0b1111_1000_0000_0000) >> 11;
    let g = (pixel & 0b0000_0111_1110_0000) >> 5;
    let b = pixel & 0b0000_0000_0001_1111;

    [r as u8, g as u8, b as u8]
}

/// Compose the 5-bit R, 6-bit G, and 5-bit B values into a RGB565 u16 pixel. Does not mask off
/// higher bits if they are set.
#[inline]
pub const fn encode_rgb565_unchecked([r, g, b]: [u8; 3]) -> u16 {
    ((r as u16) << 11) | ((g as u16) << 5) | (b as u16)
}

/// Applies per-channel differences to a pixel. Each channel wraps around within its own width.
#[inline]
pub const fn apply_diff(prev: u16, r_diff: i8, g_diff: i8, b_diff: i8) -> u16 {
    let [r, g, b] = decode_565(prev);
    encode_rgb565_unchecked([
        sum_n::<5>(r, r_diff),
        sum_n::<6>(g, g_diff),
        sum_n::<5>(b, b_diff),
    ])
}

/// Converts an RGB888 pixel into an RGB565 pixel.
#[inline]
pub const fn rgb888_to_rgb565([r, g, b]: [u8; 3]) -> u16 {
    // https://stackoverflow.com/questions/2442576/how-does-one-convert-16-bit-rgb565-to-24-bit-rgb888
    let r = (r as u32 * 249 + 1014) >> 11;
    let g = (g as u32 * 253 + 505) >> 10;
    let b = (b as u32 * 249 + 1014) >> 11;

    encode_rgb565_unchecked([r as u8, g as u8, b as u8])
}

/// Converts an RGB565 pixel into an RGB888 pixel.
#[inline]
pub const fn rgb565_to_rgb888(pixel: u16) -> [u8; 3] {
    let [r, g, b] = decode_565(pixel);

    let r = (r as u32 * 527 + 23) >> 6;
    let g = (g as u32 * 259 + 33) >> 6;
    let b = (b as u32 * 527 + 23) >> 6;

    [r as u8, g as u8, b as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_index_matches_reference_formula() {
        for pixel in [0u16, 1, 0x07E0, 0xF800, 0xFFFF, 0x1234] {
            assert_eq!(u32::from(cache_index(pixel)), (u32::from(pixel) * 6311) % 64);
        }
        assert_eq!(cache_index(0), 0);
        // 0xF800 * 6311 is a multiple of 64
        assert_eq!(cache_index(0xF800), 0);
        assert_eq!(cache_index(1), (6311 % 64) as u8);
    }

    #[test]
    fn sum_wraps_within_channel_width() {
        assert_eq!(sum_n::<5>(0, -2), 30);
        assert_eq!(sum_n::<5>(31, 1), 0);
        assert_eq!(sum_n::<6>(63, 1), 0);
        assert_eq!(sum_n::<6>(1, -2), 63);
        assert_eq!(sum_n::<6>(10, 31), 41);
    }

    #[test]
    fn diff_does_not_bleed_into_neighbouring_channels() {
        // green at its ceiling, +1 must not carry into red
        let px = encode_rgb565_unchecked([3, 63, 4]);
        assert_eq!(apply_diff(px, 0, 1, 0), encode_rgb565_unchecked([3, 0, 4]));
        // blue at zero, -1 must not borrow from green
        let px = encode_rgb565_unchecked([3, 5, 0]);
        assert_eq!(apply_diff(px, 0, 0, -1), encode_rgb565_unchecked([3, 5, 31]));
    }

    #[test]
    fn split_and_compose() {
        assert_eq!(decode_565(0xF800), [31, 0, 0]);
        assert_eq!(decode_565(0x07E0), [0, 63, 0]);
        assert_eq!(decode_565(0x001F), [0, 0, 31]);
        assert_eq!(encode_rgb565_unchecked([31, 63, 31]), 0xFFFF);
    }

    #[test]
    fn rgb888_conversions_hit_the_extremes() {
        assert_eq!(rgb888_to_rgb565([255, 255, 255]), 0xFFFF);
        assert_eq!(rgb888_to_rgb565([0, 0, 0]), 0);
        assert_eq!(rgb888_to_rgb565([255, 0, 0]), 0xF800);
        assert_eq!(rgb565_to_rgb888(0xFFFF), [255, 255, 255]);
        assert_eq!(rgb565_to_rgb888(0x07E0), [0, 255, 0]);
    }
}
