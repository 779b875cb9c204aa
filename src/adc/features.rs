//! Data post-processing, power saving, analog watchdogs, oversampling and offsets

use super::{Adc, AwdInstance, Channel, Error, Group, Result, State};
use crate::dma::DmaChannel;
use crate::pacext::adc::{cfgr1, cfgr2, gcomp, htr1, ofr, pwrr, Reg, RegisterAccess};

/// Threshold and offset registers hold 25-bit values
const DATA_MASK: u32 = 0x01FF_FFFF;
/// Gain compensation coefficient of a unity gain
const GAIN_UNITY: u32 = 4096;
/// Largest gain, ×1000
const GAIN_MAX: u16 = 3999;
/// Bits of `AWDxCR` selecting every channel
const AWD_ALL_CHANNELS: u32 = 0x00FF_FFFF;
/// ADC4 oversampled data is 16 bits wide against 12-bit thresholds
const ADC4_OVS_SCALE: u32 = 16;

/// Data post-processing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PostProcessingConfig {
    /// Left shift of the conversion data, 0 to 15. ADC4 only shifts by 0 or 15.
    pub left_bit_shift: u8,
    /// Gain ×1000, 0 to 3999. Standard instances only.
    pub gain_compensation_x1000: u16,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            left_bit_shift: 0,
            gain_compensation_x1000: 1000,
        }
    }
}

/// Power saving options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LowPowerConfig {
    /// Next conversion waits for the data register to be read
    pub auto_wait: bool,
    /// ADC4 only
    pub auto_power_off: bool,
    /// Deep power-down while auto powered off. ADC4 only.
    pub autonomous_dpd: bool,
}

/// ADC4 VREF+ protection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VrefProtection {
    Disable,
    /// VREF+ released during the first sampling cycle
    FirstSample,
    /// VREF+ released during the second sampling cycle
    SecondSample,
}

impl Default for VrefProtection {
    fn default() -> Self {
        VrefProtection::Disable
    }
}

/// Channels monitored by a watchdog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AwdChannel {
    /// Watchdog disabled
    None,
    All,
    Single(Channel),
}

impl Default for AwdChannel {
    fn default() -> Self {
        AwdChannel::None
    }
}

/// Consecutive out-of-window samples before AWD1 fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AwdFiltering {
    None,
    Samples2,
    Samples3,
    Samples4,
    Samples5,
    Samples6,
    Samples7,
    Samples8,
}

impl AwdFiltering {
    const ALL: [AwdFiltering; 8] = [
        AwdFiltering::None,
        AwdFiltering::Samples2,
        AwdFiltering::Samples3,
        AwdFiltering::Samples4,
        AwdFiltering::Samples5,
        AwdFiltering::Samples6,
        AwdFiltering::Samples7,
        AwdFiltering::Samples8,
    ];
}

impl Default for AwdFiltering {
    fn default() -> Self {
        AwdFiltering::None
    }
}

impl From<AwdFiltering> for u8 {
    fn from(val: AwdFiltering) -> Self {
        val as u8
    }
}

/// Analog watchdog configuration
///
/// Thresholds are in units of the configured resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AwdConfig {
    /// Groups monitored. AWD2 and AWD3 always monitor both groups once enabled.
    pub group: Group,
    pub channel: AwdChannel,
    pub threshold_high: u32,
    pub threshold_low: u32,
    /// AWD1 of standard instances only
    pub filtering: AwdFiltering,
}

impl Default for AwdConfig {
    fn default() -> Self {
        Self {
            group: Group::None,
            channel: AwdChannel::None,
            threshold_high: DATA_MASK,
            threshold_low: 0,
            filtering: AwdFiltering::None,
        }
    }
}

/// Conversions an oversampling applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OversamplingScope {
    Disable,
    /// Regular group; accumulation continues across injected conversions
    RegContinued,
    /// Regular group; accumulation restarts after injected conversions. Standard only.
    RegResumed,
    /// Injected group only. Standard only.
    Inj,
    /// Both groups. Standard only.
    InjRegResumed,
}

impl Default for OversamplingScope {
    fn default() -> Self {
        OversamplingScope::Disable
    }
}

/// Oversampling configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OversamplingConfig {
    pub scope: OversamplingScope,
    /// One trigger per oversampled conversion (`TROVS`)
    pub discont: bool,
    /// 1 to 1024 on standard instances; a power of two from 2 to 256 on ADC4
    pub ratio: u16,
    /// Right shift of the accumulated data: 0 to 10, or 0 to 8 on ADC4
    pub shift: u8,
}

impl Default for OversamplingConfig {
    fn default() -> Self {
        Self {
            scope: OversamplingScope::Disable,
            discont: false,
            ratio: 2,
            shift: 1,
        }
    }
}

/// Right shift keeping the converter resolution for an oversampling ratio
pub const fn oversampling_shift_keep_res(ratio: u16) -> u8 {
    if ratio == 0 {
        0
    } else {
        (15 - ratio.leading_zeros()) as u8
    }
}

/// Offset correction slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OffsetInstance {
    Offset1 = 0,
    Offset2 = 1,
    Offset3 = 2,
    Offset4 = 3,
}

impl OffsetInstance {
    fn reg(self) -> Reg {
        Reg::OFR[self as usize]
    }
}

/// Offset correction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffsetConfig {
    /// Corrected channel; `None` disables the slot
    pub channel: Option<Channel>,
    /// Signed offset, in units of the configured resolution
    pub level: i32,
    pub saturation_signed: bool,
    pub saturation_unsigned: bool,
}

fn awd_cr(awd: AwdInstance) -> Reg {
    if awd == AwdInstance::Awd2 {
        Reg::Awd2cr
    } else {
        Reg::Awd3cr
    }
}

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Shift between data in the configured resolution and threshold or offset registers
    pub(crate) fn resolution_shift(&self) -> u32 {
        2 * self.regs.read_field(cfgr1::RES)
    }

    fn debug_assert_configurable(&self) {
        debug_assert!(matches!(self.state, State::Configuring | State::Idle));
    }

    /// Sets the data left shift and gain compensation
    pub fn set_post_processing(&mut self, config: &PostProcessingConfig) -> Result<()> {
        self.debug_assert_configurable();
        if config.left_bit_shift > 15 {
            return Err(Error::InvalidParam);
        }
        if self.is_reduced() {
            if !matches!(config.left_bit_shift, 0 | 15) {
                return Err(Error::InvalidParam);
            }
            self.regs
                .write_field(cfgr1::ALIGN4, (config.left_bit_shift == 15) as u32);
            return Ok(());
        }
        if config.gain_compensation_x1000 > GAIN_MAX {
            return Err(Error::InvalidParam);
        }

        self.regs
            .write_field(cfgr2::LSHIFT, config.left_bit_shift.into());
        let coeff = u32::from(config.gain_compensation_x1000) * GAIN_UNITY / 1000;
        self.regs.write(
            Reg::Gcomp,
            gcomp::GCOMPCOEFF.bits(coeff) | gcomp::GCOMP.bits((coeff != 0) as u32),
        );
        Ok(())
    }

    /// Post-processing settings. The gain reads back at most 1 above the value set.
    pub fn post_processing(&self) -> PostProcessingConfig {
        if self.is_reduced() {
            return PostProcessingConfig {
                left_bit_shift: if self.regs.is_set(cfgr1::ALIGN4) { 15 } else { 0 },
                gain_compensation_x1000: 1000,
            };
        }
        let left_bit_shift = self.regs.read_field(cfgr2::LSHIFT) as u8;
        let gain_compensation_x1000 = match self.regs.read_field(gcomp::GCOMPCOEFF) {
            GAIN_UNITY => 1000,
            c => (c * 1000 / GAIN_UNITY + (c != 0) as u32) as u16,
        };
        PostProcessingConfig {
            left_bit_shift,
            gain_compensation_x1000,
        }
    }

    pub fn set_low_power(&mut self, config: &LowPowerConfig) -> Result<()> {
        self.debug_assert_configurable();
        if !self.is_reduced() && (config.auto_power_off || config.autonomous_dpd) {
            return Err(Error::InvalidParam);
        }
        self.regs.write_field(cfgr1::AUTDLY, config.auto_wait as u32);
        if self.is_reduced() {
            self.regs.modify(Reg::Pwrr, |r| {
                (r & !(pwrr::AUTOFF.mask() | pwrr::DPD.mask()))
                    | pwrr::AUTOFF.bits(config.auto_power_off as u32)
                    | pwrr::DPD.bits(config.autonomous_dpd as u32)
            });
        }
        Ok(())
    }

    pub fn low_power(&self) -> LowPowerConfig {
        let reduced = self.is_reduced();
        LowPowerConfig {
            auto_wait: self.regs.is_set(cfgr1::AUTDLY),
            auto_power_off: reduced && self.regs.is_set(pwrr::AUTOFF),
            autonomous_dpd: reduced && self.regs.is_set(pwrr::DPD),
        }
    }

    pub fn set_vref_protection(&mut self, prot: VrefProtection) -> Result<()> {
        self.debug_assert_configurable();
        if !self.is_reduced() {
            return Err(Error::InvalidParam);
        }
        let (en, second) = match prot {
            VrefProtection::Disable => (0, 0),
            VrefProtection::FirstSample => (1, 0),
            VrefProtection::SecondSample => (1, 1),
        };
        self.regs.modify(Reg::Pwrr, |r| {
            (r & !(pwrr::VREFPROT.mask() | pwrr::VREFSECSMP.mask()))
                | pwrr::VREFPROT.bits(en)
                | pwrr::VREFSECSMP.bits(second)
        });
        Ok(())
    }

    pub fn vref_protection(&self) -> VrefProtection {
        if !self.is_reduced() || !self.regs.is_set(pwrr::VREFPROT) {
            VrefProtection::Disable
        } else if self.regs.is_set(pwrr::VREFSECSMP) {
            VrefProtection::SecondSample
        } else {
            VrefProtection::FirstSample
        }
    }

    /// Configures an analog watchdog
    ///
    /// A watchdog with no channel or no group is disabled.
    pub fn set_awd_config(&mut self, awd: AwdInstance, config: &AwdConfig) -> Result<()> {
        self.debug_assert_configurable();
        if config.filtering != AwdFiltering::None
            && (awd != AwdInstance::Awd1 || self.is_reduced())
        {
            return Err(Error::InvalidParam);
        }
        self.write_awd_scope(awd, config.group, config.channel)?;
        self.set_awd_threshold(awd, config.threshold_high, config.threshold_low)?;
        if awd == AwdInstance::Awd1 && !self.is_reduced() {
            self.regs
                .write_field(htr1::AWDFILT, u8::from(config.filtering).into());
        }
        Ok(())
    }

    pub fn awd_config(&self, awd: AwdInstance) -> AwdConfig {
        let (group, channel) = self.awd_scope(awd);
        let (threshold_high, threshold_low) = self.awd_threshold(awd);
        let filtering = if awd == AwdInstance::Awd1 && !self.is_reduced() {
            AwdFiltering::ALL[(self.regs.read_field(htr1::AWDFILT) & 0b111) as usize]
        } else {
            AwdFiltering::None
        };
        AwdConfig {
            group,
            channel,
            threshold_high,
            threshold_low,
            filtering,
        }
    }

    fn write_awd_scope(&mut self, awd: AwdInstance, group: Group, channel: AwdChannel) -> Result<()> {
        if self.is_reduced() && matches!(group, Group::Injected | Group::RegularInjected) {
            return Err(Error::InvalidParam);
        }
        let ch = match channel {
            AwdChannel::Single(c) => Some(c.number(self.profile())?),
            _ => None,
        };
        let off = group == Group::None || channel == AwdChannel::None;

        match awd {
            AwdInstance::Awd1 => {
                let (reg, inj) = match group {
                    _ if off => (false, false),
                    Group::Regular => (true, false),
                    Group::Injected => (false, true),
                    _ => (true, true),
                };
                self.regs.modify(Reg::Cfgr1, |r| {
                    let r = r
                        & !(cfgr1::AWD1SGL.mask()
                            | cfgr1::AWD1EN.mask()
                            | cfgr1::JAWD1EN.mask()
                            | cfgr1::AWD1CH.mask());
                    r | cfgr1::AWD1EN.bits(reg as u32)
                        | cfgr1::JAWD1EN.bits(inj as u32)
                        | cfgr1::AWD1SGL.bits(ch.is_some() as u32)
                        | cfgr1::AWD1CH.bits(ch.map_or(0, u32::from))
                });
            }
            awd => {
                let mask = match ch {
                    _ if off => 0,
                    Some(n) => 1 << n,
                    None => AWD_ALL_CHANNELS,
                };
                self.regs.write(awd_cr(awd), mask);
            }
        }
        Ok(())
    }

    fn awd_scope(&self, awd: AwdInstance) -> (Group, AwdChannel) {
        match awd {
            AwdInstance::Awd1 => {
                let cfgr1 = self.regs.read(Reg::Cfgr1);
                let reg = cfgr1::AWD1EN.extract(cfgr1) != 0;
                let inj = cfgr1::JAWD1EN.extract(cfgr1) != 0;
                let group = match (reg, inj) {
                    (false, false) => return (Group::None, AwdChannel::None),
                    (true, false) => Group::Regular,
                    (false, true) => Group::Injected,
                    (true, true) => Group::RegularInjected,
                };
                let channel = if cfgr1::AWD1SGL.extract(cfgr1) != 0 {
                    AwdChannel::Single(
                        self.channel_from_number(cfgr1::AWD1CH.extract(cfgr1) as u8),
                    )
                } else {
                    AwdChannel::All
                };
                (group, channel)
            }
            awd => {
                let mask = self.regs.read(awd_cr(awd)) & AWD_ALL_CHANNELS;
                let group = if self.is_reduced() {
                    Group::Regular
                } else {
                    Group::RegularInjected
                };
                match mask.count_ones() {
                    0 => (Group::None, AwdChannel::None),
                    1 => (
                        group,
                        AwdChannel::Single(self.channel_from_number(mask.trailing_zeros() as u8)),
                    ),
                    _ => (group, AwdChannel::All),
                }
            }
        }
    }

    /// Sets the thresholds of a watchdog, in units of the configured resolution
    pub fn set_awd_threshold(&mut self, awd: AwdInstance, high: u32, low: u32) -> Result<()> {
        debug_assert!(self.state != State::Reset);
        let scale = |v: u32| -> Result<u32> {
            let raw = if self.is_reduced() && self.regs.is_set(cfgr2::ROVSE) {
                v / ADC4_OVS_SCALE
            } else {
                v.checked_shl(self.resolution_shift())
                    .filter(|r| r >> self.resolution_shift() == v)
                    .ok_or(Error::InvalidParam)?
            };
            if raw > DATA_MASK {
                Err(Error::InvalidParam)
            } else {
                Ok(raw)
            }
        };
        let high = scale(high)?;
        let low = scale(low)?;

        let i = awd as usize;
        self.regs.write(Reg::LTR[i], low);
        self.regs
            .modify(Reg::HTR[i], |r| (r & !DATA_MASK) | high);
        Ok(())
    }

    /// Thresholds of a watchdog as `(high, low)`
    pub fn awd_threshold(&self, awd: AwdInstance) -> (u32, u32) {
        let i = awd as usize;
        let high = self.regs.read(Reg::HTR[i]) & DATA_MASK;
        let low = self.regs.read(Reg::LTR[i]) & DATA_MASK;
        if self.is_reduced() && self.regs.is_set(cfgr2::ROVSE) {
            (high * ADC4_OVS_SCALE, low * ADC4_OVS_SCALE)
        } else {
            let shift = self.resolution_shift();
            (high >> shift, low >> shift)
        }
    }

    /// Changes the monitored channels. `AwdChannel::None` also disables the groups.
    pub fn set_awd_channel(&mut self, awd: AwdInstance, channel: AwdChannel) -> Result<()> {
        self.debug_assert_configurable();
        let (group, _) = self.awd_scope(awd);
        let group = match (awd, channel) {
            (_, AwdChannel::None) => Group::None,
            (AwdInstance::Awd1, _) => group,
            _ => Group::RegularInjected,
        };
        let group = if self.is_reduced() && group != Group::None {
            Group::Regular
        } else {
            group
        };
        self.write_awd_scope(awd, group, channel)
    }

    pub fn awd_channel(&self, awd: AwdInstance) -> AwdChannel {
        self.awd_scope(awd).1
    }

    /// Configures oversampling
    pub fn set_oversampling(&mut self, config: &OversamplingConfig) -> Result<()> {
        self.debug_assert_configurable();
        use OversamplingScope::*;
        let enable = match config.scope {
            Disable => 0,
            RegContinued => cfgr2::ROVSE.mask(),
            RegResumed => cfgr2::ROVSE.mask() | cfgr2::ROVSM.mask(),
            Inj => cfgr2::JOVSE.mask(),
            InjRegResumed => cfgr2::ROVSE.mask() | cfgr2::JOVSE.mask(),
        };
        let enable_mask = cfgr2::ROVSE.mask() | cfgr2::ROVSM.mask() | cfgr2::JOVSE.mask();

        if config.scope == Disable {
            self.regs.clear_bits(Reg::Cfgr2, enable_mask);
            return Ok(());
        }

        let ratio = if self.is_reduced() {
            if !matches!(config.scope, RegContinued)
                || !config.ratio.is_power_of_two()
                || !(2..=256).contains(&config.ratio)
                || config.shift > 8
            {
                return Err(Error::InvalidParam);
            }
            cfgr2::OVSR4.bits(config.ratio.trailing_zeros() - 1)
        } else {
            if !(1..=1024).contains(&config.ratio) || config.shift > 10 {
                return Err(Error::InvalidParam);
            }
            cfgr2::OVSR.bits(u32::from(config.ratio) - 1)
        };
        let ratio_mask = if self.is_reduced() {
            cfgr2::OVSR4.mask()
        } else {
            cfgr2::OVSR.mask()
        };

        self.regs.modify(Reg::Cfgr2, |r| {
            (r & !(enable_mask | ratio_mask | cfgr2::OVSS.mask() | cfgr2::TROVS.mask()))
                | enable
                | ratio
                | cfgr2::OVSS.bits(config.shift.into())
                | cfgr2::TROVS.bits(config.discont as u32)
        });
        Ok(())
    }

    pub fn oversampling(&self) -> OversamplingConfig {
        let cfgr2 = self.regs.read(Reg::Cfgr2);
        let rovse = cfgr2::ROVSE.extract(cfgr2) != 0;
        let jovse = cfgr2::JOVSE.extract(cfgr2) != 0;
        let rovsm = cfgr2::ROVSM.extract(cfgr2) != 0;
        let scope = match (rovse, jovse, rovsm) {
            (false, false, _) => OversamplingScope::Disable,
            (true, false, false) => OversamplingScope::RegContinued,
            (true, false, true) => OversamplingScope::RegResumed,
            (false, true, _) => OversamplingScope::Inj,
            (true, true, _) => OversamplingScope::InjRegResumed,
        };
        let ratio = if self.is_reduced() {
            2u16 << cfgr2::OVSR4.extract(cfgr2)
        } else {
            cfgr2::OVSR.extract(cfgr2) as u16 + 1
        };
        OversamplingConfig {
            scope,
            discont: cfgr2::TROVS.extract(cfgr2) != 0,
            ratio,
            shift: cfgr2::OVSS.extract(cfgr2) as u8,
        }
    }

    fn offset_raw(&self, level: i32) -> Result<(u32, bool)> {
        let magnitude = level.unsigned_abs();
        let raw = magnitude
            .checked_shl(self.resolution_shift())
            .filter(|r| *r <= ofr::offset(Reg::Ofr1).mask() && r >> self.resolution_shift() == magnitude)
            .ok_or(Error::InvalidParam)?;
        Ok((raw, level > 0))
    }

    /// Configures an offset slot. Standard instances only.
    pub fn set_offset(&mut self, slot: OffsetInstance, config: &OffsetConfig) -> Result<()> {
        self.debug_assert_configurable();
        if self.is_reduced() {
            return Err(Error::InvalidParam);
        }
        let reg = slot.reg();
        let channel = match config.channel {
            Some(channel) => channel,
            None => {
                self.regs.write(reg, 0);
                return Ok(());
            }
        };
        let ch = channel.number(self.profile())?;
        let (raw, positive) = self.offset_raw(config.level)?;

        self.regs.write(
            reg,
            ofr::offset(reg).bits(raw)
                | ofr::posoff(reg).bits(positive as u32)
                | ofr::ssat(reg).bits(config.saturation_signed as u32)
                | ofr::usat(reg).bits(config.saturation_unsigned as u32)
                | ofr::channel(reg).bits(ch.into()),
        );
        Ok(())
    }

    pub fn offset(&self, slot: OffsetInstance) -> OffsetConfig {
        if self.is_reduced() {
            return OffsetConfig::default();
        }
        let reg = slot.reg();
        let v = self.regs.read(reg);
        let ch = ofr::channel(reg).extract(v);
        let raw = ofr::offset(reg).extract(v);
        if ch == 0 && raw == 0 {
            return OffsetConfig::default();
        }
        OffsetConfig {
            channel: Some(self.channel_from_number(ch as u8)),
            level: self.offset_level(slot),
            saturation_signed: ofr::ssat(reg).extract(v) != 0,
            saturation_unsigned: ofr::usat(reg).extract(v) != 0,
        }
    }

    /// Changes the level of an offset slot, keeping its channel and saturation
    pub fn set_offset_level(&mut self, slot: OffsetInstance, level: i32) -> Result<()> {
        self.debug_assert_configurable();
        if self.is_reduced() {
            return Err(Error::InvalidParam);
        }
        let reg = slot.reg();
        let (raw, positive) = self.offset_raw(level)?;
        self.regs.modify(reg, |r| {
            (r & !(ofr::offset(reg).mask() | ofr::posoff(reg).mask()))
                | ofr::offset(reg).bits(raw)
                | ofr::posoff(reg).bits(positive as u32)
        });
        Ok(())
    }

    /// Signed level of an offset slot, in units of the configured resolution
    pub fn offset_level(&self, slot: OffsetInstance) -> i32 {
        if self.is_reduced() {
            return 0;
        }
        let reg = slot.reg();
        let v = self.regs.read(reg);
        let magnitude = (ofr::offset(reg).extract(v) >> self.resolution_shift()) as i32;
        if ofr::posoff(reg).extract(v) != 0 {
            magnitude
        } else {
            -magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{SimAdc, SimCommon, SimDma};
    use crate::adc::{Config, Instance, Resolution};
    use crate::pacext::adc::Mmio;

    type Handle<'a, 'c> = Adc<&'a SimAdc<'c>, &'a SimDma>;

    fn configured<'a, 'c>(hw: &'a SimAdc<'c>, instance: Instance, resolution: Resolution) -> Handle<'a, 'c> {
        let mut adc: Handle = Adc::new(hw, instance);
        adc.set_config(&Config {
            resolution,
            ..Config::default()
        })
        .unwrap();
        adc
    }

    #[test]
    fn gain_compensation_rounds_up_by_one() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = configured(&hw, Instance::Adc1, Resolution::Bits14);

        for gain in [0u16, 1, 999, 1000, 1234, 3999] {
            let cfg = PostProcessingConfig {
                left_bit_shift: 3,
                gain_compensation_x1000: gain,
            };
            adc.set_post_processing(&cfg).unwrap();
            let read = adc.post_processing();
            assert_eq!(read.left_bit_shift, 3);
            let g = read.gain_compensation_x1000;
            assert!(g == gain || g == gain + 1, "{} read back as {}", gain, g);
        }
        adc.set_post_processing(&PostProcessingConfig::default()).unwrap();
        assert_eq!(hw.peek(Reg::Gcomp) & gcomp::GCOMPCOEFF.mask(), 4096);
        assert_eq!(adc.post_processing().gain_compensation_x1000, 1000);

        let cfg = PostProcessingConfig {
            gain_compensation_x1000: 4000,
            ..PostProcessingConfig::default()
        };
        assert_eq!(adc.set_post_processing(&cfg), Err(Error::InvalidParam));
    }

    #[test]
    fn adc4_post_processing_and_power() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut adc = configured(&hw, Instance::Adc4, Resolution::Bits12);

        let cfg = PostProcessingConfig {
            left_bit_shift: 4,
            ..PostProcessingConfig::default()
        };
        assert_eq!(adc.set_post_processing(&cfg), Err(Error::InvalidParam));
        let cfg = PostProcessingConfig {
            left_bit_shift: 15,
            gain_compensation_x1000: 2000,
        };
        adc.set_post_processing(&cfg).unwrap();
        assert_eq!(
            adc.post_processing(),
            PostProcessingConfig {
                left_bit_shift: 15,
                gain_compensation_x1000: 1000,
            }
        );

        let lp = LowPowerConfig {
            auto_wait: true,
            auto_power_off: true,
            autonomous_dpd: true,
        };
        adc.set_low_power(&lp).unwrap();
        assert_eq!(adc.low_power(), lp);

        adc.set_vref_protection(VrefProtection::SecondSample).unwrap();
        assert_eq!(adc.vref_protection(), VrefProtection::SecondSample);
        adc.set_vref_protection(VrefProtection::FirstSample).unwrap();
        assert_eq!(adc.vref_protection(), VrefProtection::FirstSample);
    }

    #[test]
    fn standard_rejects_adc4_power_options() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut adc = configured(&hw, Instance::Adc2, Resolution::Bits12);

        let lp = LowPowerConfig {
            auto_wait: true,
            ..LowPowerConfig::default()
        };
        adc.set_low_power(&lp).unwrap();
        assert_eq!(adc.low_power(), lp);
        let lp = LowPowerConfig {
            auto_power_off: true,
            ..LowPowerConfig::default()
        };
        assert_eq!(adc.set_low_power(&lp), Err(Error::InvalidParam));
        assert_eq!(
            adc.set_vref_protection(VrefProtection::FirstSample),
            Err(Error::InvalidParam)
        );
        assert_eq!(adc.vref_protection(), VrefProtection::Disable);
    }

    #[test]
    fn awd_thresholds_scale_with_resolution() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = configured(&hw, Instance::Adc1, Resolution::Bits12);

        let cfg = AwdConfig {
            group: Group::Regular,
            channel: AwdChannel::Single(Channel::In(4)),
            threshold_high: 3000,
            threshold_low: 100,
            filtering: AwdFiltering::Samples4,
        };
        adc.set_awd_config(AwdInstance::Awd1, &cfg).unwrap();
        assert_eq!(hw.peek(Reg::Htr1) & DATA_MASK, 3000 << 2);
        assert_eq!(hw.peek(Reg::Ltr1), 100 << 2);
        assert_eq!(adc.awd_config(AwdInstance::Awd1), cfg);

        // Filtering is an AWD1 feature
        let cfg2 = AwdConfig {
            channel: AwdChannel::All,
            ..cfg
        };
        assert_eq!(
            adc.set_awd_config(AwdInstance::Awd2, &cfg2),
            Err(Error::InvalidParam)
        );
        let cfg2 = AwdConfig {
            filtering: AwdFiltering::None,
            ..cfg2
        };
        adc.set_awd_config(AwdInstance::Awd2, &cfg2).unwrap();
        assert_eq!(hw.peek(Reg::Awd2cr), AWD_ALL_CHANNELS);
        let read = adc.awd_config(AwdInstance::Awd2);
        assert_eq!(read.channel, AwdChannel::All);
        assert_eq!(read.group, Group::RegularInjected);
        assert_eq!(adc.awd_threshold(AwdInstance::Awd2), (3000, 100));
    }

    #[test]
    fn awd_channel_keeps_group() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = configured(&hw, Instance::Adc1, Resolution::Bits14);

        let cfg = AwdConfig {
            group: Group::RegularInjected,
            channel: AwdChannel::All,
            ..AwdConfig::default()
        };
        adc.set_awd_config(AwdInstance::Awd1, &cfg).unwrap();
        adc.set_awd_channel(AwdInstance::Awd1, AwdChannel::Single(Channel::VBat))
            .unwrap();
        assert_eq!(
            adc.awd_channel(AwdInstance::Awd1),
            AwdChannel::Single(Channel::VBat)
        );
        assert_eq!(adc.awd_config(AwdInstance::Awd1).group, Group::RegularInjected);

        adc.set_awd_channel(AwdInstance::Awd1, AwdChannel::None).unwrap();
        assert_eq!(adc.awd_config(AwdInstance::Awd1).group, Group::None);
        assert_eq!(adc.awd_channel(AwdInstance::Awd1), AwdChannel::None);

        adc.set_awd_channel(AwdInstance::Awd3, AwdChannel::Single(Channel::In(7)))
            .unwrap();
        assert_eq!(hw.peek(Reg::Awd3cr), 1 << 7);
        assert_eq!(
            adc.awd_channel(AwdInstance::Awd3),
            AwdChannel::Single(Channel::In(7))
        );
    }

    #[test]
    fn adc4_awd_thresholds_follow_oversampling() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut adc = configured(&hw, Instance::Adc4, Resolution::Bits12);

        adc.set_oversampling(&OversamplingConfig {
            scope: OversamplingScope::RegContinued,
            discont: false,
            ratio: 16,
            shift: 0,
        })
        .unwrap();
        adc.set_awd_threshold(AwdInstance::Awd1, 0xFFF0, 0x100).unwrap();
        assert_eq!(hw.peek(Reg::Htr1), 0xFFF);
        assert_eq!(hw.peek(Reg::Ltr1), 0x10);
        assert_eq!(adc.awd_threshold(AwdInstance::Awd1), (0xFFF0, 0x100));

        let cfg = AwdConfig {
            group: Group::Injected,
            channel: AwdChannel::All,
            ..AwdConfig::default()
        };
        assert_eq!(
            adc.set_awd_config(AwdInstance::Awd1, &cfg),
            Err(Error::InvalidParam)
        );
    }

    #[test]
    fn oversampling_encodings() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = configured(&hw, Instance::Adc1, Resolution::Bits14);

        let cfg = OversamplingConfig {
            scope: OversamplingScope::InjRegResumed,
            discont: true,
            ratio: 1000,
            shift: 10,
        };
        adc.set_oversampling(&cfg).unwrap();
        assert_eq!(adc.oversampling(), cfg);
        assert_eq!(adc.regs.read_field(cfgr2::OVSR), 999);

        let cfg = OversamplingConfig {
            scope: OversamplingScope::RegResumed,
            ..cfg
        };
        adc.set_oversampling(&cfg).unwrap();
        assert_eq!(adc.oversampling().scope, OversamplingScope::RegResumed);

        adc.set_oversampling(&OversamplingConfig::default()).unwrap();
        assert_eq!(adc.oversampling().scope, OversamplingScope::Disable);

        let bad = OversamplingConfig {
            scope: OversamplingScope::Inj,
            ratio: 1025,
            ..OversamplingConfig::default()
        };
        assert_eq!(adc.set_oversampling(&bad), Err(Error::InvalidParam));

        let common4 = SimCommon::default();
        let hw4 = SimAdc::new(&common4, Mmio::ADC4 as u32);
        let mut adc4 = configured(&hw4, Instance::Adc4, Resolution::Bits12);
        let cfg = OversamplingConfig {
            scope: OversamplingScope::RegContinued,
            discont: false,
            ratio: 256,
            shift: 8,
        };
        adc4.set_oversampling(&cfg).unwrap();
        assert_eq!(adc4.regs.read_field(cfgr2::OVSR4), 7);
        assert_eq!(adc4.oversampling(), cfg);
        for scope in [OversamplingScope::Inj, OversamplingScope::RegResumed] {
            let cfg = OversamplingConfig { scope, ..cfg };
            assert_eq!(adc4.set_oversampling(&cfg), Err(Error::InvalidParam));
        }
        let cfg = OversamplingConfig { ratio: 24, ..cfg };
        assert_eq!(adc4.set_oversampling(&cfg), Err(Error::InvalidParam));
    }

    #[test]
    fn shift_keeping_resolution() {
        assert_eq!(oversampling_shift_keep_res(1), 0);
        assert_eq!(oversampling_shift_keep_res(16), 4);
        assert_eq!(oversampling_shift_keep_res(256), 8);
        assert_eq!(oversampling_shift_keep_res(1024), 10);
    }

    #[test]
    fn offsets_are_signed_and_scaled() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adc = configured(&hw, Instance::Adc1, Resolution::Bits12);

        let cfg = OffsetConfig {
            channel: Some(Channel::In(3)),
            level: -200,
            saturation_signed: true,
            saturation_unsigned: false,
        };
        adc.set_offset(OffsetInstance::Offset2, &cfg).unwrap();
        let raw = hw.peek(Reg::Ofr2);
        assert_eq!(raw & 0x00FF_FFFF, 200 << 2);
        assert_eq!(raw & ofr::posoff(Reg::Ofr2).mask(), 0);
        assert_eq!(adc.offset(OffsetInstance::Offset2), cfg);

        adc.set_offset_level(OffsetInstance::Offset2, 55).unwrap();
        assert_eq!(adc.offset_level(OffsetInstance::Offset2), 55);
        assert_eq!(
            adc.offset(OffsetInstance::Offset2).channel,
            Some(Channel::In(3))
        );

        adc.set_offset(OffsetInstance::Offset2, &OffsetConfig::default())
            .unwrap();
        assert_eq!(hw.peek(Reg::Ofr2), 0);
        assert_eq!(adc.offset(OffsetInstance::Offset2), OffsetConfig::default());

        let huge = OffsetConfig {
            channel: Some(Channel::In(3)),
            level: 1 << 24,
            ..OffsetConfig::default()
        };
        assert_eq!(
            adc.set_offset(OffsetInstance::Offset1, &huge),
            Err(Error::InvalidParam)
        );
    }

    #[test]
    fn adc4_has_no_offsets() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC4 as u32);
        let mut adc = configured(&hw, Instance::Adc4, Resolution::Bits8);
        let cfg = OffsetConfig {
            channel: Some(Channel::In(1)),
            level: 1,
            ..OffsetConfig::default()
        };
        assert_eq!(
            adc.set_offset(OffsetInstance::Offset1, &cfg),
            Err(Error::InvalidParam)
        );
        assert_eq!(adc.offset_level(OffsetInstance::Offset1), 0);
    }
}
