//! Converter enable and disable

use super::{cr_set, Adc, Error, ErrorCodes, Event, GroupState, Interrupts, Result, State, CR_RS, INJECTED};
use crate::dma::DmaChannel;
use crate::pacext::adc::{ccr, cr, isr, pwrr, Reg, RegisterAccess};
use crate::time::{
    MilliSeconds, DISABLE_TIMEOUT, ENABLE_TIMEOUT, REGULATOR_STAB, TEMPSENSOR_STAB, VREFINT_STAB,
};
use crate::timer::{wait_until, Timebase};

/// Every `ISR` flag
pub(crate) const ALL_FLAGS: u32 = 0x0000_1FFF;

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Powers up and enables the converter, waiting for it to be ready
    ///
    /// Does nothing if the converter is already enabled.
    pub(crate) fn activate(&mut self, tb: &mut impl Timebase) -> Result<()> {
        if self.regs.is_set(cr::ADEN) {
            return Ok(());
        }

        if !self.regs.is_set(cr::ADVREGEN) {
            if !self.is_reduced() {
                super::cr_clear(&mut self.regs, cr::DEEPPWD.mask());
            }
            cr_set(&mut self.regs, cr::ADVREGEN.mask());
            tb.delay(REGULATOR_STAB);
        }

        let res = if self.regs.read(Reg::Cr) & CR_RS != 0 {
            Err(Error::NotReady)
        } else {
            self.regs.write(Reg::Isr, isr::ADRDY.mask());
            cr_set(&mut self.regs, cr::ADEN.mask());

            // Ready is never flagged while ADC4 powers itself off between conversions
            if self.is_reduced() && self.regs.is_set(pwrr::AUTOFF) {
                Ok(())
            } else {
                let regs = &mut self.regs;
                // A calibration ending less than 4 ADC cycles before the enable clears ADEN
                let ready = wait_until(tb, ENABLE_TIMEOUT, || {
                    if !regs.is_set(cr::ADEN) {
                        cr_set(regs, cr::ADEN.mask());
                    }
                    regs.is_set(isr::ADRDY)
                });

                if self.regs.is_set(ccr::VSENSESEL) {
                    tb.delay(TEMPSENSOR_STAB);
                } else if self.regs.is_set(ccr::VREFEN) {
                    tb.delay(VREFINT_STAB);
                }
                ready.map_err(|_| Error::NotReady)
            }
        };

        if res.is_err() {
            self.errors |= ErrorCodes::INTERNAL;
            #[cfg(feature = "defmt")]
            defmt::warn!("{} not ready after enable", self.instance());
        }
        res
    }

    /// Disables the converter, then powers it down unless a calibration is running
    ///
    /// Does nothing if the converter is disabled or a disable is already in progress.
    pub(crate) fn deactivate(&mut self, tb: &mut impl Timebase) -> Result<()> {
        if !self.regs.is_set(cr::ADEN) || self.regs.is_set(cr::ADDIS) {
            return Ok(());
        }

        let busy = cr::JADSTART.mask() | cr::ADSTART.mask() | cr::ADEN.mask();
        let res = if self.regs.read(Reg::Cr) & busy != cr::ADEN.mask() {
            Err(Error::DisableFailed)
        } else {
            cr_set(&mut self.regs, cr::ADDIS.mask());
            self.regs.write(Reg::Isr, isr::ADRDY.mask());
            let regs = &self.regs;
            wait_until(tb, DISABLE_TIMEOUT, || !regs.is_set(cr::ADEN))
                .map_err(|_| Error::DisableFailed)
        };

        match res {
            Ok(()) => {
                if self.state != State::Calibrating {
                    super::cr_clear(&mut self.regs, cr::ADVREGEN.mask());
                    if !self.is_reduced() {
                        cr_set(&mut self.regs, cr::DEEPPWD.mask());
                    }
                }
            }
            Err(_) => {
                self.errors |= ErrorCodes::INTERNAL;
                #[cfg(feature = "defmt")]
                defmt::warn!("{} failed to disable", self.instance());
            }
        }
        res
    }

    /// Activates the instance: `Idle` to `Active`
    ///
    /// With injected conversions chained to the regular ones, the injected group turns
    /// `Active` as well. When the converter fails to get ready, `NotReady` is returned
    /// and the handle stays `Active`, with the `INTERNAL` error recorded.
    pub fn start(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Idle);

        if self.group_state[INJECTED] == GroupState::Idle
            && self.sampling_mode() != super::SamplingMode::Normal
        {
            return Err(Error::SamplingMode);
        }

        self.check_update_state(State::Idle, State::Active)?;
        if self.inj_auto() {
            self.check_update_group(INJECTED, GroupState::Idle, GroupState::Active)?;
        }

        self.activate(tb)
    }

    /// Deactivates the instance: `Active` to `Idle`
    ///
    /// Flags and interrupts are cleared and the handle returns to `Idle` even when the
    /// converter fails to disable.
    pub fn stop(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[super::REGULAR],
            GroupState::Reset | GroupState::Idle
        ));
        debug_assert!(
            self.inj_auto()
                || matches!(
                    self.group_state[INJECTED],
                    GroupState::Reset | GroupState::Idle
                )
        );

        let res = self.deactivate(tb);

        self.regs.write(Reg::Isr, ALL_FLAGS);
        self.disable_interrupts(Interrupts::all());

        if self.inj_auto() {
            self.group_state[INJECTED] = GroupState::Idle;
        }
        self.state = State::Idle;
        res
    }

    /// Waits for `event` and clears its flag. Group states are left untouched.
    pub fn poll_for_event(
        &mut self,
        event: Event,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        debug_assert!(matches!(self.state, State::Idle | State::Active));

        let flag = Interrupts::from(event);
        let regs = &self.regs;
        wait_until(tb, timeout, || regs.read(Reg::Isr) & flag.bits() != 0)
            .map_err(|_| Error::Timeout)?;
        self.clear_flags(flag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{idle_handle as idle, SimAdc, SimClock, SimCommon};
    use crate::adc::{
        Channel, ChannelConfig, Config, ConvGroup, InjectedConfig, InjectedTrigger, Instance,
        LowPowerConfig, SamplingMode,
    };
    use crate::pacext::adc::Mmio;
    use fugit::ExtU32;

    #[test]
    fn start_powers_up_and_stop_powers_down() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        hw.poke(Reg::Cr, cr::DEEPPWD.mask());
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);

        adc.start(&mut tb).unwrap();
        assert_eq!(adc.state(), State::Active);
        let cr = hw.peek(Reg::Cr);
        assert_ne!(cr & cr::ADEN.mask(), 0);
        assert_ne!(cr & cr::ADVREGEN.mask(), 0);
        assert_eq!(cr & cr::DEEPPWD.mask(), 0);
        assert_eq!(tb.delayed_us(), REGULATOR_STAB.ticks());

        adc.stop(&mut tb).unwrap();
        assert_eq!(adc.state(), State::Idle);
        let cr = hw.peek(Reg::Cr);
        assert_eq!(cr & cr::ADEN.mask(), 0);
        assert_eq!(cr & cr::ADVREGEN.mask(), 0);
        assert_ne!(cr & cr::DEEPPWD.mask(), 0);
        assert_eq!(hw.peek(Reg::Isr), 0);
    }

    #[test]
    #[should_panic]
    fn start_requires_idle() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc2);
        adc.start(&mut tb).unwrap();
        let _ = adc.start(&mut tb);
    }

    #[test]
    fn enable_timeout_records_internal_error() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        hw.set_never_ready(true);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);

        assert_eq!(adc.start(&mut tb), Err(Error::NotReady));
        assert_eq!(adc.state(), State::Active);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
        assert!(tb.elapsed_ms() > ENABLE_TIMEOUT.ticks());
    }

    #[test]
    fn disable_timeout_still_returns_to_idle() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();

        hw.set_disable_hangs(true);
        hw.raise(isr::EOC.mask());
        adc.enable_interrupts(Interrupts::EOC);
        assert_eq!(adc.stop(&mut tb), Err(Error::DisableFailed));
        assert_eq!(adc.state(), State::Idle);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
        assert_eq!(hw.peek(Reg::Isr), 0);
        assert_eq!(hw.peek(Reg::Ier), 0);
    }

    #[test]
    fn internal_channel_settling_delay() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);
        adc.set_channel_config(Channel::TempSensor, &ChannelConfig::default())
            .unwrap();

        adc.start(&mut tb).unwrap();
        assert_eq!(
            tb.delayed_us(),
            REGULATOR_STAB.ticks() + TEMPSENSOR_STAB.ticks()
        );
    }

    #[test]
    fn adc4_auto_power_off_skips_ready_wait() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        hw.set_never_ready(true);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc4);
        adc.set_low_power(&LowPowerConfig {
            auto_power_off: true,
            ..LowPowerConfig::default()
        })
        .unwrap();

        adc.start(&mut tb).unwrap();
        assert_eq!(tb.elapsed_ms(), 0);
        // ADC4 has no deep power-down bit
        adc.stop(&mut tb).unwrap();
        assert_eq!(hw.peek(Reg::Cr) & cr::DEEPPWD.mask(), 0);
    }

    #[test]
    fn trigger_controlled_sampling_forbids_injected_group() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);
        adc.set_config(&Config {
            sampling_mode: SamplingMode::TriggerControlled,
            ..Config::default()
        })
        .unwrap();
        adc.inj_set_config(&InjectedConfig::default()).unwrap();
        hw.clear_log();

        assert_eq!(adc.start(&mut tb), Err(Error::SamplingMode));
        assert_eq!(adc.state(), State::Idle);
        assert_eq!(hw.writes(), 0);
    }

    #[test]
    fn auto_injected_follows_instance() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);
        adc.inj_set_config(&InjectedConfig {
            trigger_source: InjectedTrigger::FromRegular,
            ..InjectedConfig::default()
        })
        .unwrap();

        adc.start(&mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Active);
        adc.stop(&mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Idle);
    }

    #[test]
    fn poll_for_event_clears_flag() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle(&hw, Instance::Adc1);

        assert_eq!(
            adc.poll_for_event(Event::Awd2, 3.millis(), &mut tb),
            Err(Error::Timeout)
        );
        hw.raise(isr::AWD2.mask() | isr::EOC.mask());
        adc.poll_for_event(Event::Awd2, 3.millis(), &mut tb).unwrap();
        assert_eq!(hw.peek(Reg::Isr), isr::EOC.mask());
        assert_eq!(adc.state(), State::Idle);
    }
}
