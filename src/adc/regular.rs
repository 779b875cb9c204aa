//! Regular group conversions: polling and interrupt modes

use super::{cr_set, Adc, ConvPerStart, Error, ErrorCodes, GroupState, Interrupts, Result, State, REGULAR};
use crate::dma::DmaChannel;
use crate::pacext::adc::{cr, Field, Reg, RegisterAccess};
use crate::time::{MilliSeconds, CONV_STOP_TIMEOUT};
use crate::timer::{wait_until, Timebase};

/// Start bit, stop bit and end of conversion flag of a group
#[derive(Clone, Copy)]
pub(crate) struct GroupBits {
    pub start: Field,
    pub stop: Field,
    pub eoc: Interrupts,
}

pub(crate) const GROUP_BITS: [GroupBits; 2] = [
    GroupBits {
        start: cr::ADSTART,
        stop: cr::ADSTP,
        eoc: Interrupts::EOC,
    },
    GroupBits {
        start: cr::JADSTART,
        stop: cr::JADSTP,
        eoc: Interrupts::JEOC,
    },
];

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Requests a stop of `group` and waits for its conversions to end
    pub(crate) fn stop_group(&mut self, group: usize, tb: &mut impl Timebase) -> Result<()> {
        let bits = GROUP_BITS[group];
        cr_set(&mut self.regs, bits.stop.mask());

        let regs = &self.regs;
        let res = wait_until(tb, CONV_STOP_TIMEOUT, || !regs.is_set(bits.start));
        if res.is_err() {
            self.errors |= ErrorCodes::INTERNAL;
            #[cfg(feature = "defmt")]
            defmt::warn!("{} conversion did not stop", self.instance());
            return Err(Error::StopTimeout);
        }
        Ok(())
    }

    /// Moves `group` from `Idle` to `Active` and sets its start bit
    pub(crate) fn start_group(&mut self, group: usize, it: Interrupts) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);

        self.check_update_group(group, GroupState::Idle, GroupState::Active)?;
        if !it.is_empty() {
            self.clear_flags(it);
            self.enable_interrupts(it);
        }
        cr_set(&mut self.regs, GROUP_BITS[group].start.mask());
        Ok(())
    }

    pub(crate) fn trigger_group(&mut self, group: usize) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);

        let start = GROUP_BITS[group].start;
        if self.regs.is_set(start) {
            return Err(Error::ConversionOngoing);
        }
        if self.group_state[group] == GroupState::Idle {
            self.check_update_group(group, GroupState::Idle, GroupState::Active)?;
        }
        cr_set(&mut self.regs, start.mask());
        Ok(())
    }

    pub(crate) fn poll_group(
        &mut self,
        group: usize,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);

        let eoc = GROUP_BITS[group].eoc;
        let regs = &self.regs;
        wait_until(tb, timeout, || regs.read(Reg::Isr) & eoc.bits() != 0)
            .map_err(|_| Error::Timeout)?;
        self.end_of_conversion(group);
        Ok(())
    }

    /// Clears the end of conversion flag, ending a single-conversion start
    pub(crate) fn end_of_conversion(&mut self, group: usize) {
        self.clear_flags(GROUP_BITS[group].eoc);
        if self.conv_per_start[group] == ConvPerStart::Unit {
            self.group_state[group] = GroupState::Idle;
        }
    }

    /// Starts regular conversions, completion polled by the caller
    pub fn reg_start_conversion(&mut self) -> Result<()> {
        self.start_group(REGULAR, Interrupts::empty())
    }

    /// Starts regular conversions with the end of conversion and overrun interrupts
    pub fn reg_start_conversion_it(&mut self) -> Result<()> {
        self.reg_start_conversion_it_with(Interrupts::EOC | Interrupts::OVR)
    }

    /// Starts regular conversions with the given regular group and watchdog interrupts
    pub fn reg_start_conversion_it_with(&mut self, it: Interrupts) -> Result<()> {
        debug_assert!((Interrupts::REGULAR | Interrupts::AWD).contains(it));
        self.start_group(REGULAR, it)
    }

    /// Software trigger of the next conversion of a started sequence
    ///
    /// Fails with `ConversionOngoing` while the previous conversion is running.
    pub fn reg_trigger_next_conversion(&mut self) -> Result<()> {
        self.trigger_group(REGULAR)
    }

    /// Stops regular conversions. The group is `Idle` afterwards, even on timeout.
    pub fn reg_stop_conversion(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[REGULAR],
            GroupState::Idle | GroupState::Active
        ));

        let res = self.stop_group(REGULAR, tb);
        self.group_state[REGULAR] = GroupState::Idle;
        res
    }

    /// Stops regular conversions and disables the regular group interrupts
    ///
    /// Watchdog interrupts stay enabled; [`Adc::stop`] disables them.
    pub fn reg_stop_conversion_it(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[REGULAR],
            GroupState::Idle | GroupState::Active
        ));

        let res = self.stop_group(REGULAR, tb);
        self.disable_interrupts(Interrupts::REGULAR);
        self.group_state[REGULAR] = GroupState::Idle;
        res
    }

    /// Waits for the end of a regular conversion
    ///
    /// With a single conversion per start the group returns to `Idle`.
    pub fn reg_poll_for_conversion(
        &mut self,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.poll_group(REGULAR, timeout, tb)
    }

    /// Non-blocking check for the end of a regular conversion
    ///
    /// ```rust,ignore
    /// adc.reg_start_conversion()?;
    /// nb::block!(adc.reg_try_conversion())?;
    /// let sample = adc.reg_value();
    /// ```
    pub fn reg_try_conversion(&mut self) -> nb::Result<(), Error> {
        debug_assert_eq!(self.state, State::Active);

        if self.flags().contains(Interrupts::EOC) {
            self.end_of_conversion(REGULAR);
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Last regular conversion data
    ///
    /// Signed: an offset can take it below zero.
    pub fn reg_value(&self) -> i32 {
        debug_assert_ne!(self.state, State::Reset);
        self.regs.read(Reg::Dr) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{idle_handle, SimAdc, SimClock, SimCommon};
    use crate::adc::{ConvGroup, Instance, RegularConfig};
    use crate::pacext::adc::Mmio;
    use fugit::ExtU32;

    #[test]
    fn second_start_is_busy_without_register_writes() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        hw.set_hold_conversions(true);

        adc.start(&mut tb).unwrap();
        adc.reg_start_conversion().unwrap();
        hw.clear_log();
        assert_eq!(adc.reg_start_conversion(), Err(Error::Busy));
        assert_eq!(adc.reg_start_conversion_it(), Err(Error::Busy));
        assert_eq!(hw.writes(), 0);
    }

    #[test]
    fn trigger_next_refused_while_converting() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();

        hw.set_hold_conversions(true);
        adc.reg_start_conversion().unwrap();
        hw.clear_log();
        assert_eq!(adc.reg_trigger_next_conversion(), Err(Error::ConversionOngoing));
        assert_eq!(hw.writes(), 0);

        adc.reg_stop_conversion(&mut tb).unwrap();
        hw.set_hold_conversions(false);
        adc.reg_trigger_next_conversion().unwrap();
        assert!(adc.flags().contains(Interrupts::EOC));
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Active);
        adc.reg_poll_for_conversion(10.millis(), &mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
    }

    #[test]
    fn interrupt_start_and_stop() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();
        hw.set_hold_conversions(true);

        hw.raise(Interrupts::OVR.bits());
        adc.reg_start_conversion_it().unwrap();
        assert_eq!(
            hw.peek(Reg::Ier),
            (Interrupts::EOC | Interrupts::OVR).bits()
        );
        // Stale flags of the requested interrupts are cleared before the start
        assert!(!adc.flags().contains(Interrupts::OVR));

        adc.reg_stop_conversion_it(&mut tb).unwrap();
        assert_eq!(hw.peek(Reg::Ier), 0);
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
        assert_eq!(hw.peek(Reg::Cr) & cr::ADSTART.mask(), 0);

        adc.reg_start_conversion_it_with(Interrupts::EOS | Interrupts::AWD1)
            .unwrap();
        assert_eq!(
            hw.peek(Reg::Ier),
            (Interrupts::EOS | Interrupts::AWD1).bits()
        );
        adc.reg_stop_conversion_it(&mut tb).unwrap();
        assert_eq!(hw.peek(Reg::Ier), Interrupts::AWD1.bits());
    }

    #[test]
    fn stop_timeout_still_idles_group() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();
        hw.set_hold_conversions(true);
        hw.set_stop_hangs(true);

        adc.reg_start_conversion().unwrap();
        assert_eq!(adc.reg_stop_conversion(&mut tb), Err(Error::StopTimeout));
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
        assert!(tb.elapsed_ms() > CONV_STOP_TIMEOUT.ticks());
    }

    #[test]
    fn poll_timeout_leaves_group_active() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.start(&mut tb).unwrap();
        hw.set_hold_conversions(true);

        adc.reg_start_conversion().unwrap();
        assert_eq!(
            adc.reg_poll_for_conversion(5.millis(), &mut tb),
            Err(Error::Timeout)
        );
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Active);
        assert!(adc.error_codes().is_empty());
    }

    #[test]
    fn continuous_conversions_keep_group_active() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        adc.reg_set_config(&RegularConfig {
            continuous: true,
            ..RegularConfig::default()
        })
        .unwrap();
        adc.start(&mut tb).unwrap();

        adc.reg_start_conversion().unwrap();
        adc.reg_poll_for_conversion(10.millis(), &mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Active);
        adc.reg_stop_conversion(&mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
    }

    #[test]
    fn non_blocking_poll() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc4);
        adc.start(&mut tb).unwrap();

        hw.set_hold_conversions(true);
        adc.reg_start_conversion().unwrap();
        assert!(matches!(adc.reg_try_conversion(), Err(nb::Error::WouldBlock)));

        hw.poke(Reg::Dr, 0x0ABC);
        hw.raise(Interrupts::EOC.bits());
        assert_eq!(nb::block!(adc.reg_try_conversion()), Ok(()));
        assert_eq!(adc.reg_value(), 0x0ABC);
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
    }

    #[test]
    fn concrete_scenario() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc1);
        assert_eq!(adc.state(), State::Idle);
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);

        adc.start(&mut tb).unwrap();
        assert_eq!(adc.state(), State::Active);

        assert_eq!(adc.calibrate(&mut tb), Ok(()));
        assert_eq!(hw.calibrations(), 1);
        assert_eq!(adc.state(), State::Active);
        assert!(adc.error_codes().is_empty());

        hw.set_next_sample(2048);
        adc.reg_start_conversion().unwrap();
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Active);
        adc.reg_poll_for_conversion(10.millis(), &mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);
        assert_eq!(adc.reg_value(), 2048);

        adc.stop(&mut tb).unwrap();
        assert_eq!(adc.state(), State::Idle);
        assert_eq!(hw.peek(Reg::Cr) & cr::ADEN.mask(), 0);
        assert!(adc.error_codes().is_empty());
    }

    #[test]
    #[should_panic]
    fn conversion_requires_active_instance() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = idle_handle(&hw, Instance::Adc1);
        let _ = adc.reg_start_conversion();
    }
}
