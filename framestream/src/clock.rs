//! Wall-clock time for frame pacing.
//!
//! Blocking waits go through [`embedded_hal::delay::DelayNs`], so any HAL delay provider can be
//! passed to [`AnimDecoder::wait_for_frame_duration`](crate::AnimDecoder::wait_for_frame_duration).

/// A monotonic millisecond counter, like Arduino's `millis()`.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[cfg(feature = "std")]
pub use std_clock::{StdClock, StdDelay};

#[cfg(feature = "std")]
mod std_clock {
    use super::Clock;
    use embedded_hal::delay::DelayNs;
    use std::time::{Duration, Instant};

    /// Milliseconds since the clock was created.
    #[derive(Debug, Clone, Copy)]
    pub struct StdClock {
        epoch: Instant,
    }

    impl StdClock {
        pub fn new() -> Self {
            Self {
                epoch: Instant::now(),
            }
        }
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for StdClock {
        fn now_ms(&self) -> u64 {
            self.epoch.elapsed().as_millis() as u64
        }
    }

    /// Sleeps the current thread.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct StdDelay;

    impl DelayNs for StdDelay {
        fn delay_ns(&mut self, ns: u32) {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }

        fn delay_ms(&mut self, ms: u32) {
            std::thread::sleep(Duration::from_millis(u64::from(ms)));
        }
    }
}
