//! # Reset & Control Clock
//!
//! Only the part of the clock tree the ADC needs: the frozen core clocks and the
//! ADCDAC kernel clock selection shared by ADC1, ADC2 and ADC4.

use crate::time::Hertz;

const HSI16: Hertz = Hertz::from_raw(16_000_000);

/// ADCDAC kernel clock source (`RCC_CCIPR3.ADCDACSEL`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelClock {
    /// AHB clock
    Hclk,
    /// System clock
    Sysclk,
    /// PLL2 R output running at the given frequency
    Pll2R(Hertz),
    /// External oscillator running at the given frequency
    Hse(Hertz),
    /// 16 MHz internal oscillator
    Hsi16,
    /// MSIK running at the given frequency
    Msik(Hertz),
}

impl Default for KernelClock {
    fn default() -> Self {
        KernelClock::Hclk
    }
}

impl From<KernelClock> for u8 {
    fn from(val: KernelClock) -> Self {
        match val {
            KernelClock::Hclk => 0,
            KernelClock::Sysclk => 1,
            KernelClock::Pll2R(_) => 2,
            KernelClock::Hse(_) => 3,
            KernelClock::Hsi16 => 4,
            KernelClock::Msik(_) => 5,
        }
    }
}

/// Frozen clock frequencies
///
/// Built once the application has configured RCC:
///
/// ```rust
/// use stm32u5xx_adc::rcc::{Clocks, KernelClock};
/// use fugit::RateExtU32;
///
/// let clocks = Clocks::new(160.MHz()).hclk(80.MHz()).adcdac(KernelClock::Hsi16);
/// assert_eq!(clocks.adcdacclk(), 16.MHz::<1, 1>());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    sysclk: Hertz,
    hclk: Hertz,
    adcdac: KernelClock,
}

impl Clocks {
    /// Clocks with AHB running at `sysclk` and the ADC kernel clocked from AHB
    pub const fn new(sysclk: Hertz) -> Self {
        Self {
            sysclk,
            hclk: sysclk,
            adcdac: KernelClock::Hclk,
        }
    }

    /// Sets the AHB frequency
    pub const fn hclk(mut self, freq: Hertz) -> Self {
        self.hclk = freq;
        self
    }

    /// Sets the ADCDAC kernel clock source
    pub const fn adcdac(mut self, source: KernelClock) -> Self {
        self.adcdac = source;
        self
    }

    /// Returns the system clock frequency
    pub const fn sysclk(&self) -> Hertz {
        self.sysclk
    }

    /// Returns the AHB frequency
    pub const fn hclk_freq(&self) -> Hertz {
        self.hclk
    }

    /// Returns the selected ADCDAC kernel clock source
    pub const fn adcdac_source(&self) -> KernelClock {
        self.adcdac
    }

    /// Returns the ADCDAC kernel clock frequency, before the ADC prescaler
    pub const fn adcdacclk(&self) -> Hertz {
        match self.adcdac {
            KernelClock::Hclk => self.hclk,
            KernelClock::Sysclk => self.sysclk,
            KernelClock::Hsi16 => HSI16,
            KernelClock::Pll2R(f) | KernelClock::Hse(f) | KernelClock::Msik(f) => f,
        }
    }
}

#[test]
fn rcc_adc_kernel_clock() {
    use fugit::RateExtU32;

    let clocks = Clocks::new(160.MHz());
    assert_eq!(clocks.adcdacclk(), 160.MHz::<1, 1>());
    assert_eq!(u8::from(clocks.adcdac_source()), 0);

    let clocks = clocks.hclk(80.MHz()).adcdac(KernelClock::Sysclk);
    assert_eq!(clocks.adcdacclk(), 160.MHz::<1, 1>());

    let clocks = clocks.adcdac(KernelClock::Pll2R(48.MHz()));
    assert_eq!(clocks.adcdacclk(), 48.MHz::<1, 1>());
    assert_eq!(u8::from(clocks.adcdac_source()), 2);
}
