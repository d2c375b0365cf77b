//! Encoders for both containers. Mainly used by the CLI and the tests; the decoders never
//! allocate, these do.

use alloc::vec::Vec;
use snafu::{ensure, Snafu};

mod anim;
mod qoif2;

pub use self::anim::{AnimEncoder, Thumbnail, MAX_CHUNK_PIXELS};
pub use self::qoif2::Qoif2Encoder;

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum EncodeError {
    #[snafu(display(
        "Specified dimensions don't match the number of pixels: {width} * {height} == {} pixels, but {pixel_count} pixels were given",
        *width as u64 * *height as u64
    ))]
    InvalidDimensions {
        width: u32,
        height: u32,
        pixel_count: usize,
    },
    #[snafu(display(
        "block {width}x{height} at ({x}, {y}) exceeds the {image_width}x{image_height} image"
    ))]
    BlockOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[snafu(display("block {width}x{height} at ({x}, {y}) holds no pixels"))]
    EmptyBlock {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl EncodeError {
    /// Encoding has no firmware error codes; always -1.
    pub fn code(&self) -> i32 {
        -1
    }
}

/// A rectangle of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pixels for one window of the image, part of a logical frame.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub rect: Rect,
    /// Row-major, `rect.width * rect.height` pixels.
    pub pixels: &'a [u16],
    /// First block of a logical frame.
    pub start: bool,
    /// Last block of a logical frame.
    pub end: bool,
    /// Only written when `end` is set.
    pub duration_ms: u16,
}

impl<'a> Block<'a> {
    /// A block covering a whole `width` x `height` image, starting and ending a logical frame.
    pub fn full_frame(width: u32, height: u32, pixels: &'a [u16], duration_ms: u16) -> Self {
        Self {
            rect: Rect {
                x: 0,
                y: 0,
                width,
                height,
            },
            pixels,
            start: true,
            end: true,
            duration_ms,
        }
    }

    pub(crate) fn validate(&self, image_width: u32, image_height: u32) -> Result<(), EncodeError> {
        let Rect {
            x,
            y,
            width,
            height,
        } = self.rect;
        // an empty QOIF2 block header reads as the trailer, an empty ANIM frame as a full one
        ensure!(
            self.rect.area() > 0,
            encode_error::EmptyBlockSnafu {
                x,
                y,
                width,
                height
            }
        );
        ensure!(
            self.rect.area() == self.pixels.len(),
            encode_error::InvalidDimensionsSnafu {
                width,
                height,
                pixel_count: self.pixels.len()
            }
        );
        ensure!(
            u64::from(x) + u64::from(width) <= u64::from(image_width)
                && u64::from(y) + u64::from(height) <= u64::from(image_height),
            encode_error::BlockOutOfBoundsSnafu {
                x,
                y,
                width,
                height,
                image_width,
                image_height
            }
        );
        Ok(())
    }
}

pub(crate) fn ensure_frame_size(
    width: u32,
    height: u32,
    pixels: &[u16],
) -> Result<(), EncodeError> {
    ensure!(
        width as usize * height as usize == pixels.len(),
        encode_error::InvalidDimensionsSnafu {
            width,
            height,
            pixel_count: pixels.len()
        }
    );
    Ok(())
}

/// Bounding box of the pixels that differ between two frames of a `width` wide image. `None` if
/// the frames are identical.
pub fn changed_rect(width: u32, prev: &[u16], cur: &[u16]) -> Option<Rect> {
    let width = width as usize;
    if width == 0 {
        return None;
    }

    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for (i, _) in prev
        .iter()
        .zip(cur)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
    {
        let (x, y) = (i % width, i / width);
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    bounds.map(|(x0, y0, x1, y1)| Rect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0 + 1) as u32,
        height: (y1 - y0 + 1) as u32,
    })
}

/// Copies `rect` out of a `width` wide image.
pub fn crop(pixels: &[u16], width: u32, rect: Rect) -> Vec<u16> {
    let width = width as usize;
    let mut out = Vec::with_capacity(rect.area());
    for row in 0..rect.height as usize {
        let start = (rect.y as usize + row) * width + rect.x as usize;
        out.extend_from_slice(&pixels[start..start + rect.width as usize]);
    }
    out
}

/// The block that turns `prev` into `cur`. Identical frames still produce a single pixel block so
/// the frame's duration is kept.
pub(crate) fn delta_block_pixels(
    width: u32,
    height: u32,
    prev: &[u16],
    cur: &[u16],
) -> Result<(Rect, Vec<u16>), EncodeError> {
    ensure_frame_size(width, height, prev)?;
    ensure_frame_size(width, height, cur)?;

    let rect = changed_rect(width, prev, cur).unwrap_or(Rect {
        x: 0,
        y: 0,
        width: width.min(1),
        height: height.min(1),
    });
    Ok((rect, crop(cur, width, rect)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_rect_bounds_all_differences() {
        let prev = [0u16; 16];
        let mut cur = prev;
        assert_eq!(changed_rect(4, &prev, &cur), None);

        cur[5] = 1; // (1, 1)
        cur[14] = 1; // (2, 3)
        assert_eq!(
            changed_rect(4, &prev, &cur),
            Some(Rect {
                x: 1,
                y: 1,
                width: 2,
                height: 3
            })
        );
    }

    #[test]
    fn crop_copies_rows() {
        let pixels: Vec<u16> = (0..12).collect();
        let rect = Rect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };
        assert_eq!(crop(&pixels, 4, rect), [5, 6, 9, 10]);
    }

    #[test]
    fn identical_frames_keep_one_pixel() {
        let frame = [7u16; 6];
        let (rect, pixels) = delta_block_pixels(3, 2, &frame, &frame).unwrap();
        assert_eq!(rect.area(), 1);
        assert_eq!(pixels, [7]);
    }

    #[test]
    fn block_validation() {
        let pixels = [0u16; 4];
        let mut block = Block::full_frame(2, 2, &pixels, 0);
        assert!(block.validate(2, 2).is_ok());
        assert!(matches!(
            block.validate(2, 1),
            Err(EncodeError::BlockOutOfBounds { .. })
        ));
        block.rect.width = 3;
        assert!(matches!(
            block.validate(8, 8),
            Err(EncodeError::InvalidDimensions { pixel_count: 4, .. })
        ));

        let empty = Block {
            rect: Rect {
                x: 0,
                y: 0,
                width: 0,
                height: 2,
            },
            pixels: &[],
            start: false,
            end: false,
            duration_ms: 0,
        };
        assert!(matches!(
            empty.validate(2, 2),
            Err(EncodeError::EmptyBlock { height: 2, .. })
        ));
    }
}
