//! Delays

use super::Timebase;
use crate::time::{Hertz, Instant};
use cortex_m::peripheral::{syst::SystClkSource, SYST};
use embedded_hal::delay::DelayNs;

/// SysTick running a 1 kHz tick, as a timebase
///
/// The tick count advances on each observed wrap, so `now()` has to be sampled at
/// least once per millisecond for the count to stay exact. The driver's waits sample
/// it in a tight loop.
pub struct SysTimebase {
    syst: SYST,
    sysclk: Hertz,
    ticks: u32,
}

impl SysTimebase {
    /// Configures SysTick on the core clock and starts it
    pub fn new(mut syst: SYST, sysclk: Hertz) -> Self {
        // The SysTick Reload Value register supports values between 1 and 0x00FFFFFF.
        const MAX_RVR: u32 = 0x00FF_FFFF;

        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload((sysclk.raw() / 1_000).saturating_sub(1).clamp(1, MAX_RVR));
        syst.clear_current();
        syst.enable_counter();
        Self {
            syst,
            sysclk,
            ticks: 0,
        }
    }

    /// Stops the counter and releases the SysTick resource
    pub fn release(mut self) -> SYST {
        self.syst.disable_counter();
        self.syst
    }
}

impl Timebase for SysTimebase {
    fn now(&mut self) -> Instant {
        if self.syst.has_wrapped() {
            self.ticks = self.ticks.wrapping_add(1);
        }
        Instant::from_ticks(self.ticks)
    }

    fn delay_us(&mut self, us: u32) {
        let cycles = us.saturating_mul(self.sysclk.raw() / 1_000_000);
        cortex_m::asm::delay(cycles.max(1));
    }
}

/// Timebase built on any `embedded-hal` delay provider
///
/// There is no free-running counter behind it: each `now()` spends [`Self::STEP_US`]
/// in the delay provider and advances the tick count by that amount, so a wait of
/// `n` ms polls the hardware at least `n * 1000 / STEP_US` times.
pub struct DelayTimebase<D> {
    delay: D,
    elapsed_us: u64,
}

impl<D: DelayNs> DelayTimebase<D> {
    /// Polling granularity
    pub const STEP_US: u32 = 50;

    pub fn new(delay: D) -> Self {
        Self {
            delay,
            elapsed_us: 0,
        }
    }

    /// Releases the delay provider
    pub fn release(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> Timebase for DelayTimebase<D> {
    fn now(&mut self) -> Instant {
        self.delay.delay_us(Self::STEP_US);
        self.elapsed_us += u64::from(Self::STEP_US);
        Instant::from_ticks((self.elapsed_us / 1_000) as u32)
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
        self.elapsed_us += u64::from(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spin(u32);

    impl DelayNs for Spin {
        fn delay_ns(&mut self, ns: u32) {
            self.0 += ns;
        }
    }

    #[test]
    fn delay_timebase_counts_polling_steps() {
        let mut tb = DelayTimebase::new(Spin(0));
        for _ in 0..40 {
            tb.now();
        }
        assert_eq!(tb.now().ticks(), 2);
        tb.delay_us(1_000);
        assert_eq!(tb.now().ticks(), 3);
        assert!(tb.release().0 >= 41 * 50_000);
    }
}
