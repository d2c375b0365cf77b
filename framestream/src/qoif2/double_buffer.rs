use crate::sink::DisplaySink;

/// Two fixed-size pixel slots handed back and forth between the decoder and the display
/// transfer.
///
/// At any time one slot is being filled by the decoder. The other one is either idle or owned by
/// an in-flight transfer, and is only touched again after the sink reported the transfer
/// complete. Flushing hands the filling slot over to the transfer and continues in the other
/// one, so pixel order is preserved.
pub(crate) struct PixelBuffers<const P: usize> {
    slots: [[u16; P]; 2],
    filling: usize,
    len: usize,
    in_flight: Option<usize>,
}

impl<const P: usize> PixelBuffers<P> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [[0; P]; 2],
            filling: 0,
            len: 0,
            in_flight: None,
        }
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len >= P
    }

    #[inline]
    pub(crate) fn push(&mut self, pixel: u16) {
        debug_assert_ne!(self.in_flight, Some(self.filling));
        self.slots[self.filling][self.len] = pixel;
        self.len += 1;
    }

    /// Waits for the in-flight transfer, if any, taking the slot back.
    #[inline]
    pub(crate) fn wait(&mut self, sink: &mut impl DisplaySink) {
        sink.wait_transfer_complete();
        self.in_flight = None;
    }

    /// Hands the filled slot to the sink and switches to the other one.
    pub(crate) fn flush(&mut self, sink: &mut impl DisplaySink) {
        if self.len == 0 {
            return;
        }

        self.wait(sink);
        sink.write_pixels(&self.slots[self.filling][..self.len], false);
        self.in_flight = Some(self.filling);
        self.filling ^= 1;
        self.len = 0;
    }
}
