//! Pixel outputs the QOIF2 decoder writes to.

/// An addressable-window RGB565 pixel writer, like an SPI/parallel TFT controller.
///
/// `write_pixels` and `write_solid_run` may return before the transfer has finished (e.g. when
/// driven by DMA). The caller must not modify the slice passed to `write_pixels` until
/// `wait_transfer_complete` has returned; the QOIF2 decoder guarantees this.
pub trait DisplaySink {
    /// Brackets a batch of writes, e.g. asserting chip select.
    fn begin_transfer(&mut self);
    fn end_transfer(&mut self);

    /// Selects the destination rectangle of subsequent pixel writes. Pixels fill the window
    /// row by row.
    fn set_window(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Streams `pixels` into the window. `is_last` hints that no more pixels follow in this
    /// batch.
    fn write_pixels(&mut self, pixels: &[u16], is_last: bool);

    /// Writes `count` pixels of a single color into the window.
    fn write_solid_run(&mut self, color: u16, count: usize);

    /// Blocks until the most recent asynchronous write has finished.
    fn wait_transfer_complete(&mut self);
}

impl<T: DisplaySink + ?Sized> DisplaySink for &mut T {
    #[inline]
    fn begin_transfer(&mut self) {
        (**self).begin_transfer()
    }

    #[inline]
    fn end_transfer(&mut self) {
        (**self).end_transfer()
    }

    #[inline]
    fn set_window(&mut self, x: u32, y: u32, width: u32, height: u32) {
        (**self).set_window(x, y, width, height)
    }

    #[inline]
    fn write_pixels(&mut self, pixels: &[u16], is_last: bool) {
        (**self).write_pixels(pixels, is_last)
    }

    #[inline]
    fn write_solid_run(&mut self, color: u16, count: usize) {
        (**self).write_solid_run(color, count)
    }

    #[inline]
    fn wait_transfer_complete(&mut self) {
        (**self).wait_transfer_complete()
    }
}

/// Write position inside the current window. Wraps back to the window origin once the window is
/// full, like the display controllers do.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowCursor {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    offset: u64,
}

impl WindowCursor {
    pub fn set_window(&mut self, x: u32, y: u32, width: u32, height: u32) {
        *self = Self {
            x,
            y,
            width,
            height,
            offset: 0,
        };
    }

    /// Returns the absolute position of the next pixel and advances. `None` for an empty window.
    #[inline]
    pub fn next_position(&mut self) -> Option<(u32, u32)> {
        let area = u64::from(self.width) * u64::from(self.height);
        if area == 0 {
            return None;
        }
        let offset = self.offset % area;
        self.offset = offset + 1;
        let dx = (offset % u64::from(self.width)) as u32;
        let dy = (offset / u64::from(self.width)) as u32;
        Some((self.x.saturating_add(dx), self.y.saturating_add(dy)))
    }
}

/// A display sink backed by a plain RGB565 framebuffer. Writes are synchronous; pixels outside
/// the framebuffer are clipped.
pub struct FrameBuffer<'a> {
    pixels: &'a mut [u16],
    width: u32,
    height: u32,
    cursor: WindowCursor,
}

impl<'a> FrameBuffer<'a> {
    /// Panics if `pixels` is smaller than `width * height`.
    pub fn new(pixels: &'a mut [u16], width: u32, height: u32) -> Self {
        assert!(pixels.len() >= width as usize * height as usize);
        Self {
            pixels,
            width,
            height,
            cursor: WindowCursor::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels[..self.width as usize * self.height as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[(y * self.width + x) as usize])
    }

    #[inline]
    fn put(&mut self, color: u16) {
        if let Some((x, y)) = self.cursor.next_position() {
            if x < self.width && y < self.height {
                self.pixels[(y * self.width + x) as usize] = color;
            }
        }
    }
}

impl DisplaySink for FrameBuffer<'_> {
    fn begin_transfer(&mut self) {}

    fn end_transfer(&mut self) {}

    fn set_window(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.cursor.set_window(x, y, width, height);
    }

    fn write_pixels(&mut self, pixels: &[u16], _is_last: bool) {
        for &color in pixels {
            self.put(color);
        }
    }

    fn write_solid_run(&mut self, color: u16, count: usize) {
        for _ in 0..count {
            self.put(color);
        }
    }

    fn wait_transfer_complete(&mut self) {}
}

#[cfg(feature = "embedded-graphics")]
pub use draw_target::DrawTargetSink;

#[cfg(feature = "embedded-graphics")]
mod draw_target {
    use super::{DisplaySink, WindowCursor};
    use embedded_graphics_core::{
        draw_target::DrawTarget,
        geometry::Point,
        pixelcolor::{raw::RawU16, Rgb565},
        Pixel,
    };

    /// Adapts an `embedded-graphics` [`DrawTarget`] to a [`DisplaySink`].
    ///
    /// The first draw error is kept and can be retrieved with [`DrawTargetSink::take_error`];
    /// later writes are dropped until then.
    pub struct DrawTargetSink<T: DrawTarget<Color = Rgb565>> {
        target: T,
        cursor: WindowCursor,
        error: Option<T::Error>,
    }

    impl<T: DrawTarget<Color = Rgb565>> DrawTargetSink<T> {
        pub fn new(target: T) -> Self {
            Self {
                target,
                cursor: WindowCursor::default(),
                error: None,
            }
        }

        pub fn take_error(&mut self) -> Option<T::Error> {
            self.error.take()
        }

        pub fn into_inner(self) -> T {
            self.target
        }

        fn draw(&mut self, colors: impl Iterator<Item = u16>) {
            if self.error.is_some() {
                return;
            }
            let cursor = &mut self.cursor;
            let pixels = colors.filter_map(|color| {
                let (x, y) = cursor.next_position()?;
                Some(Pixel(
                    Point::new(x as i32, y as i32),
                    Rgb565::from(RawU16::new(color)),
                ))
            });
            if let Err(e) = self.target.draw_iter(pixels) {
                self.error = Some(e);
            }
        }
    }

    impl<T: DrawTarget<Color = Rgb565>> DisplaySink for DrawTargetSink<T> {
        fn begin_transfer(&mut self) {}

        fn end_transfer(&mut self) {}

        fn set_window(&mut self, x: u32, y: u32, width: u32, height: u32) {
            self.cursor.set_window(x, y, width, height);
        }

        fn write_pixels(&mut self, pixels: &[u16], _is_last: bool) {
            self.draw(pixels.iter().copied());
        }

        fn write_solid_run(&mut self, color: u16, count: usize) {
            self.draw(core::iter::repeat(color).take(count));
        }

        fn wait_transfer_complete(&mut self) {}
    }
}
