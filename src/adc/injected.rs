//! Injected group conversions
//!
//! Standard instances only. ADC4 leaves its injected group in `Reset`, so every
//! start on it is refused with `Busy`.

use super::{Adc, GroupState, Interrupts, Result, State, INJECTED};
use crate::dma::DmaChannel;
use crate::pacext::adc::{Reg, RegisterAccess};
use crate::time::MilliSeconds;
use crate::timer::Timebase;

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Starts injected conversions, completion polled by the caller
    ///
    /// Not for a group triggered from the regular one; that group starts with the instance.
    pub fn inj_start_conversion(&mut self) -> Result<()> {
        self.inj_start_conversion_it_with(Interrupts::empty())
    }

    /// Starts injected conversions with the end of conversion interrupt
    pub fn inj_start_conversion_it(&mut self) -> Result<()> {
        self.inj_start_conversion_it_with(Interrupts::JEOC)
    }

    /// Starts injected conversions with the given injected group and watchdog interrupts
    pub fn inj_start_conversion_it_with(&mut self, it: Interrupts) -> Result<()> {
        debug_assert!((Interrupts::INJECTED | Interrupts::AWD).contains(it));
        debug_assert!(!self.inj_auto());
        self.start_group(INJECTED, it)
    }

    pub fn inj_trigger_next_conversion(&mut self) -> Result<()> {
        self.trigger_group(INJECTED)
    }

    /// Stops injected conversions. The group is `Idle` afterwards, even on timeout.
    pub fn inj_stop_conversion(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[INJECTED],
            GroupState::Idle | GroupState::Active
        ));

        let res = self.stop_group(INJECTED, tb);
        self.group_state[INJECTED] = GroupState::Idle;
        res
    }

    /// Stops injected conversions and disables the injected group interrupts
    pub fn inj_stop_conversion_it(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);
        debug_assert!(matches!(
            self.group_state[INJECTED],
            GroupState::Idle | GroupState::Active
        ));

        let res = self.stop_group(INJECTED, tb);
        self.disable_interrupts(Interrupts::INJECTED);
        self.group_state[INJECTED] = GroupState::Idle;
        res
    }

    pub fn inj_poll_for_conversion(
        &mut self,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.poll_group(INJECTED, timeout, tb)
    }

    /// Conversion data of injected sequence `rank` (1 to 4)
    pub fn inj_value(&self, rank: u8) -> i32 {
        debug_assert!((1..=4).contains(&rank));
        debug_assert_ne!(self.state, State::Reset);
        self.regs.read(Reg::JDR[usize::from(rank.wrapping_sub(1)) & 3]) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{idle_handle, SimAdc, SimClock, SimCommon, SimHandle};
    use crate::adc::{
        Channel, ChannelConfig, ConvGroup, Error, ErrorCodes, Group, InjectedConfig,
        InjectedTrigger, Instance, SamplingTime,
    };
    use crate::pacext::adc::{cr, Mmio};
    use fugit::ExtU32;

    fn injected<'a, 'c>(hw: &'a SimAdc<'c>, trigger_source: InjectedTrigger) -> SimHandle<'a, 'c> {
        let mut adc = idle_handle(hw, Instance::Adc1);
        adc.inj_set_config(&InjectedConfig {
            trigger_source,
            sequencer_length: 2,
            ..InjectedConfig::default()
        })
        .unwrap();
        for (rank, ch) in [(1, 4), (2, 5)] {
            let cfg = ChannelConfig {
                group: Group::Injected,
                sequencer_rank: rank,
                sampling_time: SamplingTime::Cycles20,
                ..ChannelConfig::default()
            };
            adc.set_channel_config(Channel::In(ch), &cfg).unwrap();
        }
        adc
    }

    #[test]
    fn polled_injected_sequence() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = injected(&hw, InjectedTrigger::Software);
        adc.start(&mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Idle);

        hw.set_next_sample(100);
        adc.inj_start_conversion().unwrap();
        adc.inj_poll_for_conversion(10.millis(), &mut tb).unwrap();
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Idle);
        assert_eq!(adc.inj_value(1), 100);
        assert_eq!(adc.inj_value(2), 101);
        // Regular group untouched
        assert_eq!(adc.group_state(ConvGroup::Regular), GroupState::Idle);

        adc.stop(&mut tb).unwrap();
    }

    #[test]
    fn injected_interrupts() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = injected(&hw, InjectedTrigger::Software);
        adc.start(&mut tb).unwrap();
        hw.set_hold_conversions(true);

        adc.inj_start_conversion_it().unwrap();
        assert_eq!(hw.peek(Reg::Ier), Interrupts::JEOC.bits());
        hw.clear_log();
        assert_eq!(adc.inj_start_conversion_it(), Err(Error::Busy));
        assert_eq!(hw.writes(), 0);

        adc.inj_stop_conversion_it(&mut tb).unwrap();
        assert_eq!(hw.peek(Reg::Ier), 0);
        assert_eq!(hw.peek(Reg::Cr) & cr::JADSTART.mask(), 0);
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Idle);
    }

    #[test]
    fn injected_trigger_next_and_stop_timeout() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = injected(&hw, InjectedTrigger::Software);
        adc.start(&mut tb).unwrap();
        hw.set_hold_conversions(true);

        adc.inj_trigger_next_conversion().unwrap();
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Active);
        assert_eq!(
            adc.inj_trigger_next_conversion(),
            Err(Error::ConversionOngoing)
        );

        hw.set_stop_hangs(true);
        assert_eq!(adc.inj_stop_conversion(&mut tb), Err(Error::StopTimeout));
        assert_eq!(adc.group_state(ConvGroup::Injected), GroupState::Idle);
        assert!(adc.error_codes().contains(ErrorCodes::INTERNAL));
    }

    #[test]
    fn adc4_has_no_injected_group() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut tb = SimClock::new();
        let mut adc = idle_handle(&hw, Instance::Adc4);
        assert_eq!(
            adc.inj_set_config(&InjectedConfig::default()),
            Err(Error::InvalidParam)
        );
        adc.start(&mut tb).unwrap();
        hw.clear_log();
        assert_eq!(adc.inj_start_conversion(), Err(Error::Busy));
        assert_eq!(hw.writes(), 0);
    }

    #[test]
    #[should_panic]
    fn auto_injected_group_cannot_be_started() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut tb = SimClock::new();
        let mut adc = injected(&hw, InjectedTrigger::FromRegular);
        adc.start(&mut tb).unwrap();
        let _ = adc.inj_start_conversion();
    }
}
