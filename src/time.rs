//! Time units
//!
//! Frequencies and durations are [`fugit`] types. [`Instant`] is the millisecond tick
//! sampled by a [`Timebase`](crate::timer::Timebase) while the driver waits on hardware.
//!
//! ```rust
//! use stm32u5xx_adc::time::{Hertz, MilliSeconds};
//! use fugit::{ExtU32, RateExtU32};
//!
//! let kernel: Hertz = 160.MHz();
//! let timeout: MilliSeconds = 10.millis();
//! assert_eq!(kernel.raw(), 160_000_000);
//! assert_eq!(timeout.ticks(), 10);
//! ```

pub use fugit::{
    HertzU32 as Hertz, KilohertzU32 as KiloHertz, MegahertzU32 as MegaHertz,
    MicrosDurationU32 as MicroSeconds, MillisDurationU32 as MilliSeconds,
};

/// Millisecond tick instant
pub type Instant = fugit::TimerInstantU32<1_000>;

/// Timeout waiting for the ADC to report ready after enable
pub const ENABLE_TIMEOUT: MilliSeconds = MilliSeconds::from_ticks(2);
/// Timeout waiting for the ADC enable bit to drop after a disable request
pub const DISABLE_TIMEOUT: MilliSeconds = MilliSeconds::from_ticks(2);
/// Timeout waiting for an ongoing conversion to stop
pub const CONV_STOP_TIMEOUT: MilliSeconds = MilliSeconds::from_ticks(2);
/// Timeout of a self-calibration.
///
/// Worst case is 1 ms at the lowest ADC clock with the largest prescaler (4096 ADC
/// clock cycles at 55 kHz / 256), kept with margin.
pub const CALIBRATION_TIMEOUT: MilliSeconds = MilliSeconds::from_ticks(228);

/// Internal voltage regulator start-up time
pub const REGULATOR_STAB: MicroSeconds = MicroSeconds::from_ticks(20);
/// VrefInt buffer settling time after the ADC is enabled
pub const VREFINT_STAB: MicroSeconds = MicroSeconds::from_ticks(15);
/// Temperature sensor settling time; covers VrefInt as well
pub const TEMPSENSOR_STAB: MicroSeconds = MicroSeconds::from_ticks(25);
/// Minimum gap between the end of a calibration and the next enable
pub const CALIB_ENABLE_STAB: MicroSeconds = MicroSeconds::from_ticks(1);
