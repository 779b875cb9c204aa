//! Instance, group and channel configuration

use super::{Adc, CommonState, ConvPerStart, Error, GroupState, Profile, Result, State, INJECTED, REGULAR};
use crate::dma::DmaChannel;
use crate::pacext::adc::{
    ccr, cfgr1, cfgr2, chselr_rank, jsqr, jsqr_rank, or, smpr4, smpr_channel, sqr1, sqr_rank, Field,
    Reg, RegisterAccess,
};
use crate::rcc::Clocks;
use crate::time::Hertz;

/// Asynchronous clock prescaler of the common block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPrescaler {
    Div1,
    Div2,
    Div4,
    Div6,
    Div8,
    Div10,
    Div12,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
}

impl ClockPrescaler {
    const ALL: [ClockPrescaler; 12] = [
        ClockPrescaler::Div1,
        ClockPrescaler::Div2,
        ClockPrescaler::Div4,
        ClockPrescaler::Div6,
        ClockPrescaler::Div8,
        ClockPrescaler::Div10,
        ClockPrescaler::Div12,
        ClockPrescaler::Div16,
        ClockPrescaler::Div32,
        ClockPrescaler::Div64,
        ClockPrescaler::Div128,
        ClockPrescaler::Div256,
    ];

    pub const fn divisor(self) -> u32 {
        use ClockPrescaler::*;
        match self {
            Div1 => 1,
            Div2 => 2,
            Div4 => 4,
            Div6 => 6,
            Div8 => 8,
            Div10 => 10,
            Div12 => 12,
            Div16 => 16,
            Div32 => 32,
            Div64 => 64,
            Div128 => 128,
            Div256 => 256,
        }
    }

    fn from_code(code: u32) -> Self {
        Self::ALL
            .get(code as usize)
            .copied()
            .unwrap_or(ClockPrescaler::Div256)
    }
}

impl Default for ClockPrescaler {
    /// Kernel clock divided by 4
    fn default() -> Self {
        ClockPrescaler::Div4
    }
}

impl From<ClockPrescaler> for u8 {
    fn from(val: ClockPrescaler) -> Self {
        val as u8
    }
}

/// Conversion resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// Standard instances only
    Bits14,
    Bits12,
    Bits10,
    Bits8,
    /// ADC4 only
    Bits6,
}

impl Resolution {
    /// `RES` encoding
    pub(crate) fn code(self, profile: Profile) -> Result<u32> {
        use Resolution::*;
        match (profile, self) {
            (Profile::Standard, Bits14) => Ok(0),
            (Profile::Standard, Bits12) => Ok(1),
            (Profile::Standard, Bits10) => Ok(2),
            (Profile::Standard, Bits8) => Ok(3),
            (Profile::Reduced, Bits12) => Ok(0),
            (Profile::Reduced, Bits10) => Ok(1),
            (Profile::Reduced, Bits8) => Ok(2),
            (Profile::Reduced, Bits6) => Ok(3),
            _ => Err(Error::InvalidParam),
        }
    }

    pub(crate) fn from_code(code: u32, profile: Profile) -> Self {
        use Resolution::*;
        match (profile, code & 0b11) {
            (Profile::Standard, 0) => Bits14,
            (Profile::Standard, 1) | (Profile::Reduced, 0) => Bits12,
            (Profile::Standard, 2) | (Profile::Reduced, 1) => Bits10,
            (Profile::Standard, _) | (Profile::Reduced, 2) => Bits8,
            (Profile::Reduced, _) => Bits6,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Resolution::Bits14 => 14,
            Resolution::Bits12 => 12,
            Resolution::Bits10 => 10,
            Resolution::Bits8 => 8,
            Resolution::Bits6 => 6,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Bits12
    }
}

/// Trigger frequency mode (`LFTRIG`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerFreqMode {
    High,
    /// Required when triggers are more than 100 µs apart. ADC4 always runs in this mode.
    Low,
}

impl Default for TriggerFreqMode {
    fn default() -> Self {
        TriggerFreqMode::High
    }
}

/// Sampling phase control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplingMode {
    /// Sampling lasts the programmed sampling time
    Normal,
    /// Sampling starts right after the previous conversion (`BULB`)
    Bulb,
    /// Sampling lasts as long as the trigger is high (`SMPTRIG`)
    TriggerControlled,
}

impl Default for SamplingMode {
    fn default() -> Self {
        SamplingMode::Normal
    }
}

/// ADC4 sampling times shared by groups of channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommonSamplingTime {
    Cycles1_5,
    Cycles3_5,
    Cycles7_5,
    Cycles12_5,
    Cycles19_5,
    Cycles39_5,
    Cycles79_5,
    Cycles814_5,
}

impl CommonSamplingTime {
    const ALL: [CommonSamplingTime; 8] = [
        CommonSamplingTime::Cycles1_5,
        CommonSamplingTime::Cycles3_5,
        CommonSamplingTime::Cycles7_5,
        CommonSamplingTime::Cycles12_5,
        CommonSamplingTime::Cycles19_5,
        CommonSamplingTime::Cycles39_5,
        CommonSamplingTime::Cycles79_5,
        CommonSamplingTime::Cycles814_5,
    ];

    fn from_code(code: u32) -> Self {
        Self::ALL[(code & 0b111) as usize]
    }
}

impl Default for CommonSamplingTime {
    fn default() -> Self {
        CommonSamplingTime::Cycles1_5
    }
}

impl From<CommonSamplingTime> for u8 {
    fn from(val: CommonSamplingTime) -> Self {
        val as u8
    }
}

/// Sampling time of a channel
///
/// Standard instances program a time per channel. ADC4 channels select one of the two
/// [`CommonSamplingTime`]s set in [`Config`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplingTime {
    Cycles5,
    Cycles6,
    Cycles12,
    Cycles20,
    Cycles36,
    Cycles68,
    Cycles391,
    Cycles814,
    Common1,
    Common2,
}

impl SamplingTime {
    const CYCLES: [SamplingTime; 8] = [
        SamplingTime::Cycles5,
        SamplingTime::Cycles6,
        SamplingTime::Cycles12,
        SamplingTime::Cycles20,
        SamplingTime::Cycles36,
        SamplingTime::Cycles68,
        SamplingTime::Cycles391,
        SamplingTime::Cycles814,
    ];

    /// `SMPx` encoding on standard instances, `SMPSEL` bit on ADC4
    fn code(self, profile: Profile) -> Result<u32> {
        use SamplingTime::*;
        match (profile, self) {
            (Profile::Reduced, Common1) => Ok(0),
            (Profile::Reduced, Common2) => Ok(1),
            (Profile::Standard, Common1 | Common2) | (Profile::Reduced, _) => Err(Error::InvalidParam),
            (Profile::Standard, t) => Ok(t as u32),
        }
    }
}

impl Default for SamplingTime {
    fn default() -> Self {
        SamplingTime::Cycles5
    }
}

/// Instance configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Shared by every instance of the common block
    pub clock: ClockPrescaler,
    pub resolution: Resolution,
    /// Standard instances only
    pub trigger_freq_mode: TriggerFreqMode,
    /// Standard instances only
    pub sampling_mode: SamplingMode,
    /// ADC4 only
    pub sampling_time_common1: CommonSamplingTime,
    /// ADC4 only
    pub sampling_time_common2: CommonSamplingTime,
}

/// Regular group trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegularTrigger {
    Software,
    Tim1Trgo2,
    Tim2Trgo,
    Tim6Trgo,
    Tim15Trgo,
    Lptim1Ch1,
    Exti15,
    Tim1Trgo,
    Tim1Ch1,
    Tim1Ch2,
    Tim1Ch3,
    Tim2Ch2,
    Tim3Trgo,
    Tim4Ch4,
    Exti11,
    Tim8Trgo,
    Tim8Trgo2,
    Tim4Trgo,
    Tim3Ch4,
    Lptim2Ch1,
    Lptim3Ch1,
    Lptim4Out,
    /// ADC4 only
    Tim1Ch4,
    /// ADC4 only
    Lptim3Ch2,
}

impl RegularTrigger {
    /// ADC1/ADC2 `EXTSEL` table, indexed by code
    const STANDARD: [RegularTrigger; 21] = {
        use RegularTrigger::*;
        [
            Tim1Ch1, Tim1Ch2, Tim1Ch3, Tim2Ch2, Tim3Trgo, Tim4Ch4, Exti11, Tim8Trgo, Tim8Trgo2,
            Tim1Trgo, Tim1Trgo2, Tim2Trgo, Tim4Trgo, Tim6Trgo, Tim15Trgo, Tim3Ch4, Exti15,
            Lptim1Ch1, Lptim2Ch1, Lptim3Ch1, Lptim4Out,
        ]
    };

    /// ADC4 `EXTSEL` table, indexed by code
    const REDUCED: [RegularTrigger; 8] = {
        use RegularTrigger::*;
        [
            Tim1Trgo2, Tim1Ch4, Tim2Trgo, Tim15Trgo, Tim6Trgo, Lptim1Ch1, Lptim3Ch2, Exti15,
        ]
    };

    fn table(profile: Profile) -> &'static [RegularTrigger] {
        match profile {
            Profile::Standard => &Self::STANDARD,
            Profile::Reduced => &Self::REDUCED,
        }
    }

    /// `EXTSEL` encoding; `None` for the software trigger
    fn extsel(self, profile: Profile) -> Result<Option<u32>> {
        if self == RegularTrigger::Software {
            return Ok(None);
        }
        Self::table(profile)
            .iter()
            .position(|t| *t == self)
            .map(|code| Some(code as u32))
            .ok_or(Error::InvalidParam)
    }

    fn from_extsel(code: u32, profile: Profile) -> Self {
        Self::table(profile)
            .get(code as usize)
            .copied()
            .unwrap_or(RegularTrigger::Software)
    }
}

impl Default for RegularTrigger {
    fn default() -> Self {
        RegularTrigger::Software
    }
}

/// Active edge of an external trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerEdge {
    /// Reported for software triggers
    None,
    Rising,
    Falling,
    Both,
}

impl TriggerEdge {
    fn from_code(code: u32) -> Self {
        match code & 0b11 {
            0 => TriggerEdge::None,
            1 => TriggerEdge::Rising,
            2 => TriggerEdge::Falling,
            _ => TriggerEdge::Both,
        }
    }
}

impl Default for TriggerEdge {
    fn default() -> Self {
        TriggerEdge::Rising
    }
}

impl From<TriggerEdge> for u8 {
    fn from(val: TriggerEdge) -> Self {
        val as u8
    }
}

/// Regular sequence split in bursts of ranks, one burst per trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegularDiscont {
    Disabled,
    /// Burst of 1 to 8 ranks
    Ranks(u8),
}

impl Default for RegularDiscont {
    fn default() -> Self {
        RegularDiscont::Disabled
    }
}

/// ADC4 sequencer mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerMode {
    /// Channels converted in ascending order of channel number
    Fixed,
    /// Channels converted in descending order of channel number
    FixedBackward,
    /// Up to 8 ranks in any order
    Configurable,
}

impl Default for SequencerMode {
    fn default() -> Self {
        SequencerMode::Configurable
    }
}

/// Behavior on regular overrun
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverrunMode {
    DataPreserved,
    DataOverwritten,
}

impl Default for OverrunMode {
    fn default() -> Self {
        OverrunMode::DataPreserved
    }
}

/// Transfer of regular conversion data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataTransfer {
    /// Data stays in the data register
    None,
    /// DMA requests stop after the last transfer of the channel
    DmaLimited,
    /// Data sent to the multi-function digital filter
    Mdf,
    /// DMA requests keep flowing, for circular channels
    DmaUnlimited,
}

impl DataTransfer {
    /// `DMNGT` encoding; `DMACFG`/`DMAEN` on ADC4
    pub(crate) const fn code(self) -> u32 {
        match self {
            DataTransfer::None => 0,
            DataTransfer::DmaLimited => 1,
            DataTransfer::Mdf => 2,
            DataTransfer::DmaUnlimited => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code & 0b11 {
            0 => DataTransfer::None,
            1 => DataTransfer::DmaLimited,
            2 => DataTransfer::Mdf,
            _ => DataTransfer::DmaUnlimited,
        }
    }
}

impl Default for DataTransfer {
    fn default() -> Self {
        DataTransfer::None
    }
}

/// Regular group configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegularConfig {
    pub trigger_source: RegularTrigger,
    /// Ignored for the software trigger
    pub trigger_edge: TriggerEdge,
    /// 1 to 16 ranks; 1 to 8 on ADC4 in configurable mode
    pub sequencer_length: u8,
    pub sequencer_discont: RegularDiscont,
    /// ADC4 only
    pub sequencer_mode: SequencerMode,
    pub continuous: bool,
    pub overrun: OverrunMode,
    /// Standard instances only; ADC4 selects its DMA mode when a transfer starts
    pub data_transfer: DataTransfer,
}

impl Default for RegularConfig {
    fn default() -> Self {
        Self {
            trigger_source: RegularTrigger::Software,
            trigger_edge: TriggerEdge::Rising,
            sequencer_length: 1,
            sequencer_discont: RegularDiscont::Disabled,
            sequencer_mode: SequencerMode::Configurable,
            continuous: false,
            overrun: OverrunMode::DataPreserved,
            data_transfer: DataTransfer::None,
        }
    }
}

/// Injected group trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InjectedTrigger {
    Software,
    /// Injected sequence runs after each regular sequence (`JAUTO`)
    FromRegular,
    Tim1Trgo,
    Tim1Ch4,
    Tim2Trgo,
    Tim2Ch1,
    Tim3Ch4,
    Tim4Trgo,
    Exti15,
    Tim8Ch4,
    Tim1Trgo2,
    Tim8Trgo,
    Tim8Trgo2,
    Tim3Ch3,
    Tim3Trgo,
    Tim3Ch1,
    Tim6Trgo,
    Tim15Trgo,
    Lptim1Ch2,
    Lptim2Ch2,
    Lptim3Ch1,
    Lptim4Out,
}

impl InjectedTrigger {
    /// `JEXTSEL` table, indexed by code
    const TABLE: [InjectedTrigger; 20] = {
        use InjectedTrigger::*;
        [
            Tim1Trgo, Tim1Ch4, Tim2Trgo, Tim2Ch1, Tim3Ch4, Tim4Trgo, Exti15, Tim8Ch4, Tim1Trgo2,
            Tim8Trgo, Tim8Trgo2, Tim3Ch3, Tim3Trgo, Tim3Ch1, Tim6Trgo, Tim15Trgo, Lptim1Ch2,
            Lptim2Ch2, Lptim3Ch1, Lptim4Out,
        ]
    };

    fn jextsel(self) -> Option<u32> {
        Self::TABLE.iter().position(|t| *t == self).map(|c| c as u32)
    }
}

impl Default for InjectedTrigger {
    fn default() -> Self {
        InjectedTrigger::Software
    }
}

/// Injected group configuration. Standard instances only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InjectedConfig {
    pub trigger_source: InjectedTrigger,
    /// Ignored for the software and from-regular triggers
    pub trigger_edge: TriggerEdge,
    /// 1 to 4 ranks
    pub sequencer_length: u8,
    /// One rank converted per trigger
    pub discontinuous: bool,
}

impl Default for InjectedConfig {
    fn default() -> Self {
        Self {
            trigger_source: InjectedTrigger::Software,
            trigger_edge: TriggerEdge::Rising,
            sequencer_length: 1,
            discontinuous: false,
        }
    }
}

/// Converter input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Input channel by number
    In(u8),
    VrefInt,
    TempSensor,
    VBat,
    /// ADC4 only
    Dac1Ch1,
    /// ADC4 only
    Dac1Ch2,
    /// ADC4 only
    VddCore,
}

impl Channel {
    /// Channel number on the given instance profile
    pub fn number(self, profile: Profile) -> Result<u8> {
        use Channel::*;
        match (profile, self) {
            (Profile::Standard, In(n)) if n <= 19 => Ok(n),
            (Profile::Reduced, In(n)) if n <= 23 => Ok(n),
            (_, VrefInt) => Ok(0),
            (Profile::Standard, TempSensor) => Ok(19),
            (Profile::Standard, VBat) => Ok(18),
            (Profile::Reduced, TempSensor) => Ok(13),
            (Profile::Reduced, VBat) => Ok(14),
            (Profile::Reduced, VddCore) => Ok(12),
            (Profile::Reduced, Dac1Ch1 | Dac1Ch2) => Ok(21),
            _ => Err(Error::InvalidParam),
        }
    }

    /// Channel wired to number `n`. Channel 21 of ADC4 is resolved to DAC1 output 1.
    pub(crate) fn from_number(n: u8, profile: Profile) -> Self {
        use Channel::*;
        match (profile, n) {
            (_, 0) => VrefInt,
            (Profile::Standard, 18) => VBat,
            (Profile::Standard, 19) => TempSensor,
            (Profile::Reduced, 12) => VddCore,
            (Profile::Reduced, 13) => TempSensor,
            (Profile::Reduced, 14) => VBat,
            (Profile::Reduced, 21) => Dac1Ch1,
            (_, n) => In(n),
        }
    }

    /// Internal measurement path rather than a pin
    pub const fn is_internal(self) -> bool {
        !matches!(self, Channel::In(_))
    }
}

/// Sequencer placement of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Group {
    /// Removes the channel from an ADC4 fixed sequence
    None,
    Regular,
    Injected,
    /// Reported when the channel appears in both sequences
    RegularInjected,
}

impl Default for Group {
    fn default() -> Self {
        Group::Regular
    }
}

/// Input mode of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputMode {
    SingleEnded,
    /// Negative input on the next channel. Standard instances only.
    Differential,
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::SingleEnded
    }
}

/// Channel configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    pub group: Group,
    /// Rank in the group sequence, from 1. Unused by ADC4 fixed sequences.
    pub sequencer_rank: u8,
    pub sampling_time: SamplingTime,
    pub input_mode: InputMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            group: Group::Regular,
            sequencer_rank: 1,
            sampling_time: SamplingTime::default(),
            input_mode: InputMode::SingleEnded,
        }
    }
}

/// End of sequence marker in ADC4 `CHSELR`
const CHSELR_END: u32 = 0xF;

const fn chselr_bit(channel: u8) -> Field {
    Field::new(Reg::Chselr, channel, 1)
}

const fn smpsel_bit(channel: u8) -> Field {
    Field::new(Reg::Smpr1, smpr4::SMPSEL.shift + channel, 1)
}

const fn difsel_bit(channel: u8) -> Field {
    Field::new(Reg::Difsel, channel, 1)
}

const fn pcsel_bit(channel: u8) -> Field {
    Field::new(Reg::Pcsel, channel, 1)
}

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Configures the instance
    ///
    /// The clock prescaler is shared with the other instances of the common block. A
    /// different prescaler is only applied while the instance is unlinked; linked
    /// handles go through [`Adcs::set_config`](super::Adcs::set_config). When the
    /// prescaler cannot change, the rest of the configuration is still applied and
    /// `ClockLocked` is returned.
    pub fn set_config(&mut self, config: &Config) -> Result<()> {
        let clock_free = self.common_state == CommonState::Independent;
        self.apply_config(config, clock_free)
    }

    pub(crate) fn apply_config(&mut self, config: &Config, clock_free: bool) -> Result<()> {
        debug_assert!(matches!(
            self.state,
            State::Init | State::Configuring | State::Idle
        ));
        let profile = self.profile();
        let res = config.resolution.code(profile)?;

        let mut status = Ok(());
        let presc = u32::from(u8::from(config.clock));
        if self.regs.read_field(ccr::PRESC) != presc {
            if clock_free {
                self.regs.write_field(ccr::PRESC, presc);
            } else {
                status = Err(Error::ClockLocked);
            }
        }

        self.regs.write_field(cfgr1::RES, res);

        if self.is_reduced() {
            self.regs
                .write_field(smpr4::SMP1, u8::from(config.sampling_time_common1).into());
            self.regs
                .write_field(smpr4::SMP2, u8::from(config.sampling_time_common2).into());
            self.regs.write_field(cfgr2::LFTRIG4, 1);
        } else {
            let lftrig = config.trigger_freq_mode == TriggerFreqMode::Low;
            let bulb = config.sampling_mode == SamplingMode::Bulb;
            let smptrig = config.sampling_mode == SamplingMode::TriggerControlled;
            self.regs.modify(Reg::Cfgr2, |r| {
                let r = r & !(cfgr2::LFTRIG.mask() | cfgr2::BULB.mask() | cfgr2::SMPTRIG.mask());
                r | cfgr2::LFTRIG.bits(lftrig as u32)
                    | cfgr2::BULB.bits(bulb as u32)
                    | cfgr2::SMPTRIG.bits(smptrig as u32)
            });
        }

        if self.state == State::Init {
            self.state = State::Configuring;
        }
        status
    }

    /// Current instance configuration
    pub fn config(&self) -> Config {
        let profile = self.profile();
        let mut config = Config {
            clock: ClockPrescaler::from_code(self.regs.read_field(ccr::PRESC)),
            resolution: Resolution::from_code(self.regs.read_field(cfgr1::RES), profile),
            ..Config::default()
        };
        if self.is_reduced() {
            config.trigger_freq_mode = TriggerFreqMode::Low;
            config.sampling_time_common1 =
                CommonSamplingTime::from_code(self.regs.read_field(smpr4::SMP1));
            config.sampling_time_common2 =
                CommonSamplingTime::from_code(self.regs.read_field(smpr4::SMP2));
        } else {
            config.trigger_freq_mode = if self.regs.is_set(cfgr2::LFTRIG) {
                TriggerFreqMode::Low
            } else {
                TriggerFreqMode::High
            };
            config.sampling_mode = self.sampling_mode();
        }
        config
    }

    pub(crate) fn sampling_mode(&self) -> SamplingMode {
        if self.is_reduced() {
            SamplingMode::Normal
        } else if self.regs.is_set(cfgr2::BULB) {
            SamplingMode::Bulb
        } else if self.regs.is_set(cfgr2::SMPTRIG) {
            SamplingMode::TriggerControlled
        } else {
            SamplingMode::Normal
        }
    }

    /// Converter clock: the ADCDAC kernel clock divided by the prescaler
    pub fn clock_freq(&self, clocks: &Clocks) -> Hertz {
        let presc = ClockPrescaler::from_code(self.regs.read_field(ccr::PRESC));
        Hertz::from_raw(clocks.adcdacclk().raw() / presc.divisor())
    }

    /// Configures the regular group; the group becomes `Idle`
    pub fn reg_set_config(&mut self, config: &RegularConfig) -> Result<()> {
        debug_assert!(matches!(self.state, State::Configuring | State::Idle));
        let profile = self.profile();
        let extsel = config.trigger_source.extsel(profile)?;
        let max_len = if self.is_reduced() { 8 } else { 16 };
        if config.sequencer_length == 0 || config.sequencer_length > max_len {
            return Err(Error::InvalidParam);
        }
        let discont = match config.sequencer_discont {
            RegularDiscont::Disabled => None,
            RegularDiscont::Ranks(n @ 1..=8) => Some(u32::from(n) - 1),
            RegularDiscont::Ranks(_) => return Err(Error::InvalidParam),
        };
        if self.is_reduced() && config.data_transfer == DataTransfer::Mdf {
            return Err(Error::InvalidParam);
        }

        match extsel {
            None => self.regs.write_field(cfgr1::EXTEN, 0),
            Some(code) => {
                self.regs.modify(Reg::Cfgr1, |r| {
                    (r & !(cfgr1::EXTSEL.mask() | cfgr1::EXTEN.mask()))
                        | cfgr1::EXTSEL.bits(code)
                        | cfgr1::EXTEN.bits(u8::from(config.trigger_edge).into())
                });
            }
        }

        if self.is_reduced() {
            match config.sequencer_mode {
                SequencerMode::Configurable => {
                    self.regs.write_field(cfgr1::CHSELRMOD, 1);
                    self.adc4_set_sequence_length(config.sequencer_length);
                }
                mode => {
                    self.regs.modify(Reg::Cfgr1, |r| {
                        (r & !(cfgr1::CHSELRMOD.mask() | cfgr1::SCANDIR.mask()))
                            | cfgr1::SCANDIR.bits((mode == SequencerMode::FixedBackward) as u32)
                    });
                    self.regs.write(Reg::Chselr, 0);
                }
            }
        } else {
            self.regs
                .write_field(sqr1::L, u32::from(config.sequencer_length) - 1);
            self.regs
                .write_field(cfgr1::DMNGT, config.data_transfer.code());
        }

        self.regs.modify(Reg::Cfgr1, |r| {
            let r = r
                & !(cfgr1::CONT.mask()
                    | cfgr1::DISCEN.mask()
                    | cfgr1::DISCNUM.mask()
                    | cfgr1::OVRMOD.mask());
            let r = r
                | cfgr1::CONT.bits(config.continuous as u32)
                | cfgr1::OVRMOD.bits((config.overrun == OverrunMode::DataOverwritten) as u32);
            match discont {
                Some(n) => r | cfgr1::DISCEN.mask() | cfgr1::DISCNUM.bits(n),
                None => r,
            }
        });

        self.conv_per_start[REGULAR] =
            if config.trigger_source == RegularTrigger::Software && !config.continuous {
                ConvPerStart::Unit
            } else {
                ConvPerStart::Multiple
            };
        self.group_state[REGULAR] = GroupState::Idle;
        Ok(())
    }

    /// Current regular group configuration
    pub fn reg_config(&self) -> RegularConfig {
        let profile = self.profile();
        let cfgr1 = self.regs.read(Reg::Cfgr1);
        let exten = cfgr1::EXTEN.extract(cfgr1);
        let (trigger_source, trigger_edge) = if exten == 0 {
            (RegularTrigger::Software, TriggerEdge::None)
        } else {
            (
                RegularTrigger::from_extsel(cfgr1::EXTSEL.extract(cfgr1), profile),
                TriggerEdge::from_code(exten),
            )
        };

        let mut config = RegularConfig {
            trigger_source,
            trigger_edge,
            sequencer_discont: if cfgr1::DISCEN.extract(cfgr1) != 0 {
                RegularDiscont::Ranks(cfgr1::DISCNUM.extract(cfgr1) as u8 + 1)
            } else {
                RegularDiscont::Disabled
            },
            continuous: cfgr1::CONT.extract(cfgr1) != 0,
            overrun: if cfgr1::OVRMOD.extract(cfgr1) != 0 {
                OverrunMode::DataOverwritten
            } else {
                OverrunMode::DataPreserved
            },
            data_transfer: DataTransfer::from_code(cfgr1::DMNGT.extract(cfgr1)),
            ..RegularConfig::default()
        };

        if self.is_reduced() {
            if cfgr1::CHSELRMOD.extract(cfgr1) != 0 {
                config.sequencer_mode = SequencerMode::Configurable;
                config.sequencer_length = self.adc4_sequence_length();
            } else {
                config.sequencer_mode = if cfgr1::SCANDIR.extract(cfgr1) != 0 {
                    SequencerMode::FixedBackward
                } else {
                    SequencerMode::Fixed
                };
                config.sequencer_length = self.regs.read(Reg::Chselr).count_ones() as u8;
            }
        } else {
            config.sequencer_mode = SequencerMode::Fixed;
            config.sequencer_length = self.regs.read_field(sqr1::L) as u8 + 1;
        }
        config
    }

    fn adc4_set_sequence_length(&mut self, len: u8) {
        self.regs.modify(Reg::Chselr, |mut r| {
            for rank in 1..=8 {
                let f = chselr_rank(rank);
                if rank > len {
                    r = (r & !f.mask()) | f.bits(CHSELR_END);
                } else if f.extract(r) == CHSELR_END {
                    r &= !f.mask();
                }
            }
            r
        });
    }

    fn adc4_sequence_length(&self) -> u8 {
        let chselr = self.regs.read(Reg::Chselr);
        (1..=8u8)
            .find(|rank| chselr_rank(*rank).extract(chselr) == CHSELR_END)
            .map_or(8, |rank| rank - 1)
    }

    /// Configures the injected group; the group becomes `Idle`
    pub fn inj_set_config(&mut self, config: &InjectedConfig) -> Result<()> {
        debug_assert!(matches!(self.state, State::Configuring | State::Idle));
        if self.is_reduced() || !(1..=4).contains(&config.sequencer_length) {
            return Err(Error::InvalidParam);
        }

        let (jextsel, jexten, jauto) = match config.trigger_source {
            InjectedTrigger::Software => (0, 0, false),
            InjectedTrigger::FromRegular => (0, 0, true),
            t => (
                t.jextsel().unwrap_or(0),
                u8::from(config.trigger_edge).into(),
                false,
            ),
        };
        self.regs.modify(Reg::Jsqr, |r| {
            (r & !(jsqr::JEXTSEL.mask() | jsqr::JEXTEN.mask() | jsqr::JL.mask()))
                | jsqr::JEXTSEL.bits(jextsel)
                | jsqr::JEXTEN.bits(jexten)
                | jsqr::JL.bits(u32::from(config.sequencer_length) - 1)
        });
        self.regs.modify(Reg::Cfgr1, |r| {
            (r & !(cfgr1::JAUTO.mask() | cfgr1::JDISCEN.mask()))
                | cfgr1::JAUTO.bits(jauto as u32)
                | cfgr1::JDISCEN.bits(config.discontinuous as u32)
        });

        self.conv_per_start[INJECTED] = if config.trigger_source == InjectedTrigger::Software {
            ConvPerStart::Unit
        } else {
            ConvPerStart::Multiple
        };
        self.group_state[INJECTED] = GroupState::Idle;
        Ok(())
    }

    /// Current injected group configuration
    pub fn inj_config(&self) -> InjectedConfig {
        let jsqr = self.regs.read(Reg::Jsqr);
        let jexten = jsqr::JEXTEN.extract(jsqr);
        let (trigger_source, trigger_edge) = if jexten == 0 {
            let src = if self.inj_auto() {
                InjectedTrigger::FromRegular
            } else {
                InjectedTrigger::Software
            };
            (src, TriggerEdge::None)
        } else {
            let code = jsqr::JEXTSEL.extract(jsqr) as usize;
            (
                InjectedTrigger::TABLE
                    .get(code)
                    .copied()
                    .unwrap_or(InjectedTrigger::Software),
                TriggerEdge::from_code(jexten),
            )
        };
        InjectedConfig {
            trigger_source,
            trigger_edge,
            sequencer_length: jsqr::JL.extract(jsqr) as u8 + 1,
            discontinuous: self.regs.is_set(cfgr1::JDISCEN),
        }
    }

    /// Places `channel` in a group sequence and sets its sampling and input mode
    ///
    /// On ADC4 in configurable mode, a rank beyond the sequence length is not written
    /// and `RankOutOfRange` is returned once the rest of the configuration is applied.
    pub fn set_channel_config(&mut self, channel: Channel, config: &ChannelConfig) -> Result<()> {
        debug_assert!(matches!(self.state, State::Configuring | State::Idle));
        let profile = self.profile();
        let ch = channel.number(profile)?;
        let smp = config.sampling_time.code(profile)?;
        let differential = config.input_mode == InputMode::Differential;
        if self.is_reduced() && (differential || config.group == Group::Injected) {
            return Err(Error::InvalidParam);
        }

        let mut status = Ok(());
        if self.is_reduced() {
            if self.regs.is_set(cfgr1::CHSELRMOD) {
                let rank = config.sequencer_rank;
                if ch >= CHSELR_END as u8 {
                    return Err(Error::InvalidParam);
                }
                if rank == 0 || rank > self.adc4_sequence_length() {
                    status = Err(Error::RankOutOfRange);
                } else {
                    self.regs.write_field(chselr_rank(rank), ch.into());
                }
            } else {
                let add = config.group != Group::None;
                self.regs.write_field(chselr_bit(ch), add as u32);
            }
            self.regs.write_field(smpsel_bit(ch), smp);
        } else {
            match config.group {
                Group::Injected => {
                    if !(1..=4).contains(&config.sequencer_rank) {
                        return Err(Error::InvalidParam);
                    }
                    self.regs
                        .write_field(jsqr_rank(config.sequencer_rank), ch.into());
                }
                _ => {
                    if !(1..=16).contains(&config.sequencer_rank) {
                        return Err(Error::InvalidParam);
                    }
                    self.regs
                        .write_field(sqr_rank(config.sequencer_rank), ch.into());
                }
            }
            self.regs.write_field(smpr_channel(ch), smp);
            self.regs.write_field(difsel_bit(ch), differential as u32);
        }

        match channel {
            Channel::VrefInt => self.regs.write_field(ccr::VREFEN, 1),
            Channel::TempSensor => self.regs.write_field(ccr::VSENSESEL, 1),
            Channel::VBat => self.regs.write_field(ccr::VBATEN, 1),
            Channel::Dac1Ch1 => self.regs.write_field(or::CHN21SEL, 0),
            Channel::Dac1Ch2 => self.regs.write_field(or::CHN21SEL, 1),
            Channel::VddCore => {}
            Channel::In(_) => {
                if !self.is_reduced() {
                    self.regs.write_field(pcsel_bit(ch), 1);
                    if differential && ch < 19 {
                        self.regs.write_field(pcsel_bit(ch + 1), 1);
                    }
                }
            }
        }

        self.state = State::Idle;
        status
    }

    /// Current configuration of `channel`
    ///
    /// `group` is `None` and `sequencer_rank` is 0 for a channel in no sequence. A
    /// channel found in both sequences reports `RegularInjected` with its regular rank.
    pub fn channel_config(&self, channel: Channel) -> Result<ChannelConfig> {
        let profile = self.profile();
        let ch = u32::from(channel.number(profile)?);
        let mut config = ChannelConfig {
            group: Group::None,
            sequencer_rank: 0,
            ..ChannelConfig::default()
        };

        if self.is_reduced() {
            if self.regs.is_set(cfgr1::CHSELRMOD) {
                let found = (1..=self.adc4_sequence_length())
                    .find(|rank| self.regs.read_field(chselr_rank(*rank)) == ch);
                if let Some(rank) = found {
                    config.group = Group::Regular;
                    config.sequencer_rank = rank;
                }
            } else if self.regs.is_set(chselr_bit(ch as u8)) {
                config.group = Group::Regular;
            }
            config.sampling_time = if self.regs.is_set(smpsel_bit(ch as u8)) {
                SamplingTime::Common2
            } else {
                SamplingTime::Common1
            };
        } else {
            let reg_len = self.regs.read_field(sqr1::L) as u8 + 1;
            if let Some(rank) = (1..=reg_len).find(|r| self.regs.read_field(sqr_rank(*r)) == ch) {
                config.group = Group::Regular;
                config.sequencer_rank = rank;
            }
            let inj_len = self.regs.read_field(jsqr::JL) as u8 + 1;
            if let Some(rank) = (1..=inj_len).find(|r| self.regs.read_field(jsqr_rank(*r)) == ch) {
                if config.group == Group::Regular {
                    config.group = Group::RegularInjected;
                } else {
                    config.group = Group::Injected;
                    config.sequencer_rank = rank;
                }
            }
            let smp = self.regs.read_field(smpr_channel(ch as u8));
            config.sampling_time = SamplingTime::CYCLES[(smp & 0b111) as usize];
            config.input_mode = if self.regs.is_set(difsel_bit(ch as u8)) {
                InputMode::Differential
            } else {
                InputMode::SingleEnded
            };
        }
        Ok(config)
    }

    /// Channel wired to number `n`, resolving the ADC4 DAC selection
    pub(crate) fn channel_from_number(&self, n: u8) -> Channel {
        match Channel::from_number(n, self.profile()) {
            Channel::Dac1Ch1 if self.regs.is_set(or::CHN21SEL) => Channel::Dac1Ch2,
            c => c,
        }
    }
}
