//! # ADC driver for the STM32U5 family of microcontrollers
//!
//! Driver core for the analog to digital converters of the STM32U5: ADC1 and ADC2
//! (14-bit, dual mode capable) and ADC4 (12-bit). It covers instance and channel
//! configuration, regular and injected conversions (polled, interrupt driven or
//! transferred by DMA), calibration, analog watchdogs, oversampling, offsets, the
//! ADC4 low power features and the ADC1/ADC2 multimode.
//!
//! The driver does not own a PAC. Registers are reached through the
//! [`pacext::adc::RegisterAccess`] trait, implemented for memory mapped instances
//! ([`pacext::adc::Mmio`]) and, with the `sim` feature, for the simulated converter
//! in [`adc::sim`]. DMA channels plug in through [`dma::DmaChannel`] and waits are
//! timed by a [`timer::Timebase`].
//!
//! # Usage
//!
//! ```toml
//! [dependencies.stm32u5xx-adc]
//! version = "0.1.0"
//! features = ["defmt"]
//! ```
//!
//! See the [`adc`] module for a conversion walk-through.

#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod dma;
pub mod pacext;
pub mod rcc;
pub mod time;
pub mod timer;
