//! Time sources used while waiting on the converter
//!
//! Every operation that waits for the hardware (enable, disable, stop, calibration,
//! conversion polling) takes a `&mut impl Timebase`, the same way the clock and bus
//! handles are passed explicitly to peripheral constructors.

use crate::time::{Instant, MicroSeconds, MilliSeconds};

mod delay;
pub use delay::{DelayTimebase, SysTimebase};

/// Millisecond tick source plus a short busy delay
pub trait Timebase {
    /// Current tick. Must be monotonic between two calls made by one wait.
    fn now(&mut self) -> Instant;

    /// Busy-waits at least `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Busy-waits at least `duration`
    fn delay(&mut self, duration: MicroSeconds) {
        self.delay_us(duration.ticks())
    }
}

impl<T: Timebase + ?Sized> Timebase for &mut T {
    fn now(&mut self) -> Instant {
        (**self).now()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Wait ended without the condition becoming true
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

/// Polls `done` until it returns `true` or `timeout` has elapsed.
///
/// When the deadline is found expired, `done` is evaluated one last time before
/// giving up, so a wait preempted right at the boundary is not reported as a timeout.
pub fn wait_until<T, F>(tb: &mut T, timeout: MilliSeconds, mut done: F) -> Result<(), TimedOut>
where
    T: Timebase + ?Sized,
    F: FnMut() -> bool,
{
    let start = tb.now();
    loop {
        if done() {
            return Ok(());
        }
        if elapsed(start, tb.now()) > timeout {
            return if done() { Ok(()) } else { Err(TimedOut) };
        }
    }
}

fn elapsed(start: Instant, now: Instant) -> MilliSeconds {
    MilliSeconds::from_ticks(now.ticks().wrapping_sub(start.ticks()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::SimClock;
    use fugit::ExtU32;

    #[test]
    fn wait_until_reports_timeout() {
        let mut clock = SimClock::new();
        assert_eq!(wait_until(&mut clock, 2.millis(), || false), Err(TimedOut));
        assert!(clock.elapsed_ms() > 2);
    }

    #[test]
    fn wait_until_rechecks_after_deadline() {
        let mut clock = SimClock::new();
        let mut polls = 0;
        // Condition turns true exactly on the re-check that follows the expiry
        let res = wait_until(&mut clock, 3.millis(), || {
            polls += 1;
            polls == 5
        });
        assert_eq!(res, Ok(()));
    }

    #[test]
    fn elapsed_survives_tick_wrap() {
        let start = Instant::from_ticks(u32::MAX - 1);
        let now = Instant::from_ticks(3);
        assert_eq!(elapsed(start, now), 5.millis::<1, 1000>());
    }
}
