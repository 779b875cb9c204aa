//! Self-calibration
//!
//! A calibration runs with the converter disabled but its regulator on, so it is
//! entered from `Active` and returns there. Standard instances calibrate offset and
//! linearity; devices from the later revisions first latch extended calibration
//! settings. ADC4 only calibrates its offset, with auto power-off and DMA requests
//! held off so the calibration factor does not land in a conversion buffer.

use super::{cr_clear, cr_set, Adc, Error, ErrorCodes, GroupState, Result, State, CR_RS, INJECTED, REGULAR};
use crate::dma::DmaChannel;
use crate::pacext::adc::{calfact, cfgr1, cr, pwrr, Reg, RegisterAccess};
use crate::time::{CALIBRATION_TIMEOUT, CALIB_ENABLE_STAB};
use crate::timer::{wait_until, Timebase};

/// Linearity words of the calibration buffer, read through `CALFACT2`
const LINEARITY_WORDS: usize = 8;
/// Buffer index selecting the extended calibration settings
const EXTENDED_INDEX: u32 = 9;
const EXTENDED_SETTINGS: u32 = 0x0302_1100;

/// Calibration buffer
///
/// Standard instances use all nine words: eight linearity words and the offset
/// factor last. ADC4 uses the first word for its offset factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationFactors {
    pub factors: [u32; 9],
}

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    fn debug_assert_groups_quiet(&self) {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[REGULAR],
            GroupState::Reset | GroupState::Idle
        ));
        debug_assert!(matches!(
            self.group_state[INJECTED],
            GroupState::Reset | GroupState::Idle
        ));
    }

    /// Runs a self-calibration: `Active` to `Calibrating` and back
    ///
    /// On failure the handle stays `Calibrating` with the `INTERNAL` error recorded.
    pub fn calibrate(&mut self, tb: &mut impl Timebase) -> Result<()> {
        self.debug_assert_groups_quiet();
        self.check_update_state(State::Active, State::Calibrating)?;
        self.run_calibration(tb)?;
        self.state = State::Active;
        Ok(())
    }

    pub(crate) fn run_calibration(&mut self, tb: &mut impl Timebase) -> Result<()> {
        let res = self.calibration_sequence(tb);
        match res {
            Ok(()) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("{} calibrated", self.instance());
            }
            Err(_) => {
                self.errors |= ErrorCodes::INTERNAL;
                #[cfg(feature = "defmt")]
                defmt::warn!("{} calibration failed", self.instance());
            }
        }
        res.map_err(|_| Error::Calibration)
    }

    fn calibration_sequence(&mut self, tb: &mut impl Timebase) -> Result<()> {
        self.deactivate(tb)?;

        if self.is_reduced() {
            let auto_off = self.regs.read_field(pwrr::AUTOFF);
            let transfer = self.regs.read_field(cfgr1::DMNGT);
            self.regs.write_field(pwrr::AUTOFF, 0);
            self.regs.write_field(cfgr1::DMNGT, 0);

            let res = self.wait_calibration(tb, cr::ADCAL.mask());

            self.regs.write_field(pwrr::AUTOFF, auto_off);
            self.regs.write_field(cfgr1::DMNGT, transfer);
            res?;
        } else if self.has_extended_calibration() {
            self.activate(tb)?;
            self.select_calibration_word(EXTENDED_INDEX);
            self.regs
                .modify(Reg::Calfact2, |r| (r & 0xFF) | EXTENDED_SETTINGS);
            self.regs.write_field(calfact::LATCH_COEF, 1);
            // ADCAL is only written with the converter disabled
            self.deactivate(tb)?;

            self.wait_calibration(tb, cr::ADCALLIN.mask() | cr::ADCAL.mask())?;
        } else {
            let res = self.wait_calibration(tb, cr::ADCALLIN.mask() | cr::ADCAL.mask());
            cr_clear(&mut self.regs, cr::ADCALLIN.mask());
            res?;
        }

        tb.delay(CALIB_ENABLE_STAB);
        self.activate(tb)
    }

    fn wait_calibration(&mut self, tb: &mut impl Timebase, start: u32) -> Result<()> {
        cr_set(&mut self.regs, start);
        let regs = &self.regs;
        wait_until(tb, CALIBRATION_TIMEOUT, || !regs.is_set(cr::ADCAL))
            .map_err(|_| Error::Calibration)
    }

    fn select_calibration_word(&mut self, index: u32) {
        self.regs.modify(Reg::Cr, |r| {
            (r & !CR_RS & !cr::CALINDEX.mask()) | cr::CALINDEX.bits(index)
        });
    }

    /// Reads the calibration buffer
    pub fn calibration_factors(&mut self) -> Result<CalibrationFactors> {
        self.debug_assert_groups_quiet();
        self.check_update_state(State::Active, State::Calibrating)?;

        let mut cal = CalibrationFactors::default();
        if self.is_reduced() {
            cal.factors[0] = self.regs.read_field(calfact::CALFACT);
        } else {
            self.regs.write_field(calfact::CAPTURE_COEF, 1);
            for (i, word) in cal.factors[..LINEARITY_WORDS].iter_mut().enumerate() {
                self.select_calibration_word(i as u32);
                *word = self.regs.read(Reg::Calfact2);
            }
            cal.factors[LINEARITY_WORDS] = self.regs.read_field(calfact::CALFACT);
            self.regs.write_field(calfact::CAPTURE_COEF, 0);
        }

        self.state = State::Active;
        Ok(cal)
    }

    /// Loads a calibration buffer saved by [`Adc::calibration_factors`]
    pub fn set_calibration_factors(&mut self, cal: &CalibrationFactors) -> Result<()> {
        self.debug_assert_groups_quiet();
        self.check_update_state(State::Active, State::Calibrating)?;

        if self.is_reduced() {
            self.regs.write_field(calfact::CALFACT, cal.factors[0]);
        } else {
            for (i, word) in cal.factors[..LINEARITY_WORDS].iter().enumerate() {
                self.select_calibration_word(i as u32);
                self.regs.write(Reg::Calfact2, *word);
            }
            self.regs.modify(Reg::Calfact, |r| {
                (r & !calfact::CALFACT.mask())
                    | calfact::CALFACT.bits(cal.factors[LINEARITY_WORDS])
                    | calfact::LATCH_COEF.mask()
            });
            self.regs.write_field(calfact::LATCH_COEF, 0);
        }

        self.state = State::Active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{idle_handle, SimAdc, SimClock, SimCommon};
    use crate::adc::{Instance, LowPowerConfig};
    use crate::pacext::adc::Mmio;

    #[test]
    fn offset_and_linearity_calibration() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        assert!(!adc.has_extended_calibration());
        adc.start(&mut tb).unwrap();

        adc.calibrate(&mut tb).unwrap();
        assert_eq!(adc.state(), State::Active);
        assert_eq!(hw.calibrations(), 1);
        let cr = hw.peek(Reg::Cr);
        assert_eq!(cr & cr::ADCALLIN.mask(), 0);
        assert_ne!(cr & cr::ADEN.mask(), 0);
        // Regulator kept on across the calibration
        assert_ne!(cr & cr::ADVREGEN.mask(), 0);
        assert!(tb.delayed_us() >= CALIB_ENABLE_STAB.ticks());
        assert!(adc.error_codes().is_empty());
    }

    #[test]
    fn extended_calibration_on_later_revisions() {
        let common = SimCommon::new(0x482, 0x3000);
        let hw = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc2);
        assert!(adc.has_extended_calibration());
        adc.start(&mut tb).unwrap();

        adc.calibrate(&mut tb).unwrap();
        assert_eq!(hw.calibration_word(9), EXTENDED_SETTINGS);
        assert_ne!(hw.peek(Reg::Calfact) & calfact::LATCH_COEF.mask(), 0);
        assert_eq!(hw.calibrations(), 1);
        assert_eq!(adc.state(), State::Active);
    }

    #[test]
    fn calibration_not_started_on_enabled_converter() {
        let common = SimCommon::new(0x482, 0x3000);
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        assert!(adc.has_extended_calibration());
        adc.start(&mut tb).unwrap();
        hw.set_disable_hangs(true);

        assert_eq!(adc.calibrate(&mut tb), Err(Error::Calibration));
        assert_eq!(hw.calibrations(), 0);
        assert_eq!(hw.peek(Reg::Cr) & cr::ADCAL.mask(), 0);
        assert_eq!(adc.state(), State::Calibrating);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
    }

    #[test]
    fn extended_calibration_device_table() {
        let cases = [
            (0x455, 0x1000, true),
            (0x476, 0x1000, true),
            (0x481, 0x2000, false),
            (0x481, 0x3000, true),
            (0x482, 0x2001, false),
        ];
        for (dev, rev, extended) in cases {
            let common = SimCommon::new(dev, rev);
            let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
            let adc = idle_handle(&hw, Instance::Adc1);
            assert_eq!(adc.has_extended_calibration(), extended, "{:x}", dev);

            let hw4 = SimAdc::new(&common, Mmio::ADC4 as u32);
            assert!(!idle_handle(&hw4, Instance::Adc4).has_extended_calibration());
        }
    }

    #[test]
    fn adc4_calibration_restores_power_and_dma_settings() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc4);
        adc.set_low_power(&LowPowerConfig {
            auto_power_off: true,
            ..LowPowerConfig::default()
        })
        .unwrap();
        hw.poke(Reg::Cfgr1, hw.peek(Reg::Cfgr1) | cfgr1::DMNGT.bits(3));
        adc.start(&mut tb).unwrap();
        hw.clear_log();

        adc.calibrate(&mut tb).unwrap();
        let log = hw.written();
        let cal_at = log
            .iter()
            .position(|(r, v)| *r == Reg::Cr && v & cr::ADCAL.mask() != 0)
            .unwrap();
        let pwrr_before = log[..cal_at].iter().rev().find(|(r, _)| *r == Reg::Pwrr);
        assert_eq!(pwrr_before.map(|(_, v)| v & pwrr::AUTOFF.mask()), Some(0));
        assert_eq!(log[cal_at].1 & cr::ADCALLIN.mask(), 0);

        assert_ne!(hw.peek(Reg::Pwrr) & pwrr::AUTOFF.mask(), 0);
        assert_eq!(adc.regs.read_field(cfgr1::DMNGT), 3);
    }

    #[test]
    fn calibration_timeout_is_sticky() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();
        hw.set_calibration_hangs(true);

        assert_eq!(adc.calibrate(&mut tb), Err(Error::Calibration));
        assert_eq!(adc.state(), State::Calibrating);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
        assert!(tb.elapsed_ms() > CALIBRATION_TIMEOUT.ticks());

        adc.clear_error_codes();
        assert!(adc.error_codes().is_empty());
    }

    #[test]
    fn calibration_buffer_round_trip() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();

        let cal = CalibrationFactors {
            factors: [11, 22, 33, 44, 55, 66, 77, 88, 0x5A],
        };
        adc.set_calibration_factors(&cal).unwrap();
        assert_eq!(adc.state(), State::Active);
        assert_eq!(adc.calibration_factors(), Ok(cal));
        assert_eq!(hw.peek(Reg::Calfact) & calfact::CAPTURE_COEF.mask(), 0);

        let hw4 = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut adc4 = idle_handle(&hw4, Instance::Adc4);
        adc4.start(&mut tb).unwrap();
        let cal = CalibrationFactors {
            factors: [0x3F, 1, 2, 3, 4, 5, 6, 7, 8],
        };
        adc4.set_calibration_factors(&cal).unwrap();
        let read = adc4.calibration_factors().unwrap();
        assert_eq!(read.factors[0], 0x3F);
        assert_eq!(read.factors[1..], [0; 8]);
    }

    #[test]
    #[should_panic]
    fn calibration_requires_active() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        let _ = adc.calibrate(&mut tb);
    }
}
