//! # Analog to Digital Converter
//!
//! Driver core for the STM32U5 converters: ADC1 and ADC2 (14-bit, sharing the ADC12
//! common block, usable as a dual-mode pair) and ADC4 (12-bit, reduced feature set).
//!
//! An [`Adc`] handle owns the registers of one instance through a [`RegisterAccess`]
//! backend and tracks the instance state machine:
//!
//! ```text
//! Reset -> Init -> Configuring -> Idle <-> Active <-> Calibrating
//! ```
//!
//! Conversions run on two groups, regular and injected, each with its own state
//! (`Idle`, `Active`, or `ActiveSilent` for a DMA transfer without interrupts).
//! Handles sharing a common block can be linked in an [`Adcs`] arena, which also
//! drives ADC1 and ADC2 as a multimode pair.
//!
//! ```rust,ignore
//! use stm32u5xx_adc::adc::{sim::{SimAdc, SimClock, SimCommon}, Adc, Channel, ChannelConfig, Config, Instance, RegularConfig};
//! use stm32u5xx_adc::dma::NoDma;
//! use stm32u5xx_adc::pacext::adc::Mmio;
//! use fugit::ExtU32;
//!
//! let common = SimCommon::default();
//! let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
//! let mut tb = SimClock::new();
//!
//! let mut adc: Adc<_, NoDma> = Adc::new(&hw, Instance::Adc1);
//! adc.set_config(&Config::default()).unwrap();
//! adc.reg_set_config(&RegularConfig::default()).unwrap();
//! adc.set_channel_config(Channel::In(3), &ChannelConfig::default()).unwrap();
//!
//! adc.start(&mut tb).unwrap();
//! adc.reg_start_conversion().unwrap();
//! adc.reg_poll_for_conversion(10.millis(), &mut tb).unwrap();
//! let _sample = adc.reg_value();
//! adc.stop(&mut tb).unwrap();
//! ```

use core::any::Any;

use crate::dma::{DmaChannel, NoDma};
use crate::pacext::adc::{cr, idcode, Reg, RegisterAccess};

mod activation;
mod calibration;
mod config;
mod dma;
mod features;
mod injected;
mod irq;
mod multimode;
mod registry;
mod regular;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use calibration::CalibrationFactors;
pub use config::*;
pub use dma::DmaOptions;
pub use features::*;
pub use multimode::{MmDataFormat, MmInstance, MmMode, MmPacking, MultimodeConfig};
pub use registry::{Adcs, HandleId, LinkRegistry};

/// ADC error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// State guard refused the operation
    Busy,
    /// Caller supplied wait expired
    Timeout,
    /// Parameter not supported by the instance or the chain
    InvalidParam,
    /// Converter did not report ready after enable
    NotReady,
    /// Converter could not be disabled
    DisableFailed,
    /// A conversion is still in progress
    ConversionOngoing,
    /// An ongoing conversion did not stop in time
    StopTimeout,
    /// Calibration failed or timed out
    Calibration,
    /// DMA channel refused the transfer
    Dma,
    /// Common clock in use by a linked instance
    ClockLocked,
    /// Sampling mode incompatible with injected conversions
    SamplingMode,
    /// Sequencer rank beyond the configured length
    RankOutOfRange,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Converter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Adc1,
    Adc2,
    Adc4,
}

impl Instance {
    /// Common block the instance belongs to
    pub const fn common(self) -> CommonBlock {
        match self {
            Instance::Adc1 | Instance::Adc2 => CommonBlock::Adc12,
            Instance::Adc4 => CommonBlock::Adc4,
        }
    }

    pub const fn profile(self) -> Profile {
        match self {
            Instance::Adc4 => Profile::Reduced,
            _ => Profile::Standard,
        }
    }

    /// Master of a multimode pair
    pub const fn is_mm_master(self) -> bool {
        matches!(self, Instance::Adc1)
    }
}

/// Common block shared by instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommonBlock {
    Adc12,
    Adc4,
}

impl CommonBlock {
    pub(crate) const COUNT: usize = 2;

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Feature set of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// 14-bit converter with injected group, offsets and gain compensation
    Standard,
    /// 12-bit converter with the channel-selection sequencer
    Reduced,
}

/// Instance state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Reset,
    Init,
    Configuring,
    Idle,
    Active,
    Calibrating,
}

/// Conversion group state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GroupState {
    Reset,
    Idle,
    Active,
    /// DMA transfer running with every interrupt disabled
    ActiveSilent,
}

/// Relation of the instance with the other instances of its common block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommonState {
    Independent,
    Linked,
    Multimode,
}

/// Number of conversions one start produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConvPerStart {
    Unit,
    Multiple,
}

/// Conversion group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConvGroup {
    Regular = 0,
    Injected = 1,
}

impl ConvGroup {
    #[inline(always)]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

bitflags::bitflags! {
    /// Sticky error codes
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ErrorCodes: u32 {
        /// Enable, disable, stop or calibration failure
        const INTERNAL = 1 << 0;
        /// Regular group overrun
        const REG_OVR = 1 << 1;
        /// Regular group DMA transfer failure
        const REG_DMA = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Converter interrupts, bit-aligned with `ISR` and `IER`
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Interrupts: u32 {
        const EOSMP = 1 << 1;
        const EOC = 1 << 2;
        const EOS = 1 << 3;
        const OVR = 1 << 4;
        const JEOC = 1 << 5;
        const JEOS = 1 << 6;
        const AWD1 = 1 << 7;
        const AWD2 = 1 << 8;
        const AWD3 = 1 << 9;
    }
}

impl Interrupts {
    /// Regular group events
    pub const REGULAR: Self = Self::from_bits_truncate(
        Self::EOSMP.bits | Self::EOC.bits | Self::EOS.bits | Self::OVR.bits,
    );
    /// Injected group events
    pub const INJECTED: Self = Self::from_bits_truncate(Self::JEOC.bits | Self::JEOS.bits);
    /// Analog watchdog events
    pub const AWD: Self =
        Self::from_bits_truncate(Self::AWD1.bits | Self::AWD2.bits | Self::AWD3.bits);
}

/// Event flag waited on by [`Adc::poll_for_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    EndOfSampling,
    EndOfConversion,
    EndOfSequence,
    Overrun,
    InjEndOfConversion,
    InjEndOfSequence,
    Awd1,
    Awd2,
    Awd3,
}

impl From<Event> for Interrupts {
    fn from(val: Event) -> Self {
        use Event::*;
        match val {
            EndOfSampling => Interrupts::EOSMP,
            EndOfConversion => Interrupts::EOC,
            EndOfSequence => Interrupts::EOS,
            Overrun => Interrupts::OVR,
            InjEndOfConversion => Interrupts::JEOC,
            InjEndOfSequence => Interrupts::JEOS,
            Awd1 => Interrupts::AWD1,
            Awd2 => Interrupts::AWD2,
            Awd3 => Interrupts::AWD3,
        }
    }
}

/// Analog watchdog instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AwdInstance {
    Awd1 = 0,
    Awd2 = 1,
    Awd3 = 2,
}

/// Callback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallbackKind {
    Error,
    RegEndOfSampling,
    RegEoc,
    RegEos,
    RegXferHalf,
    RegXferCplt,
    RegXferStop,
    InjEoc,
    InjEos,
}

impl CallbackKind {
    pub const COUNT: usize = 9;
}

pub type Callback<R, D> = fn(&mut Adc<R, D>);
pub type AwdCallback<R, D> = fn(&mut Adc<R, D>, AwdInstance);

fn nop<R, D>(_: &mut Adc<R, D>) {}
fn awd_nop<R, D>(_: &mut Adc<R, D>, _: AwdInstance) {}

/// Completion routine run when a DMA abort request completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopMode {
    Single,
    Multimode,
}

pub(crate) const REGULAR: usize = ConvGroup::Regular.index();
pub(crate) const INJECTED: usize = ConvGroup::Injected.index();

/// `CR` bits that read back as set while the hardware processes them. A
/// read-modify-write must not write them back.
pub(crate) const CR_RS: u32 = cr::ADCAL.mask()
    | cr::JADSTP.mask()
    | cr::ADSTP.mask()
    | cr::JADSTART.mask()
    | cr::ADSTART.mask()
    | cr::ADDIS.mask()
    | cr::ADEN.mask();

#[inline(always)]
pub(crate) fn cr_set<R: RegisterAccess>(regs: &mut R, mask: u32) {
    regs.modify(Reg::Cr, |r| (r & !CR_RS) | mask);
}

#[inline(always)]
pub(crate) fn cr_clear<R: RegisterAccess>(regs: &mut R, mask: u32) {
    regs.modify(Reg::Cr, |r| r & !CR_RS & !mask);
}

/// Converter handle
pub struct Adc<R, D = NoDma> {
    pub(crate) regs: R,
    instance: Instance,
    extended_calibration: bool,
    pub(crate) state: State,
    pub(crate) group_state: [GroupState; 2],
    pub(crate) common_state: CommonState,
    pub(crate) conv_per_start: [ConvPerStart; 2],
    pub(crate) errors: ErrorCodes,
    pub(crate) dma: Option<D>,
    pub(crate) mm_packing: MmPacking,
    pub(crate) stop_mode: StopMode,
    callbacks: [Callback<R, D>; CallbackKind::COUNT],
    awd_callback: AwdCallback<R, D>,
    user_data: Option<&'static (dyn Any + Sync)>,
}

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Takes ownership of the instance registers and initializes the handle
    pub fn new(regs: R, instance: Instance) -> Self {
        let dev_id = regs.read_field(idcode::DEV_ID);
        let rev_id = regs.read_field(idcode::REV_ID);
        let extended_calibration = instance.profile() == Profile::Standard
            && (matches!(dev_id, 0x455 | 0x476)
                || (matches!(dev_id, 0x481 | 0x482) && rev_id >= 0x3000));

        let mut adc = Self {
            regs,
            instance,
            extended_calibration,
            state: State::Reset,
            group_state: [GroupState::Reset; 2],
            common_state: CommonState::Independent,
            conv_per_start: [ConvPerStart::Unit; 2],
            errors: ErrorCodes::empty(),
            dma: None,
            mm_packing: MmPacking::Pack,
            stop_mode: StopMode::Single,
            callbacks: [nop::<R, D> as Callback<R, D>; CallbackKind::COUNT],
            awd_callback: awd_nop::<R, D>,
            user_data: None,
        };
        adc.reinit();
        adc
    }

    /// Re-initializes a handle left in `Reset` by [`Adc::deinit`]
    pub fn init(&mut self) -> Result<()> {
        if self.state != State::Reset {
            return Err(Error::Busy);
        }
        self.reinit();
        Ok(())
    }

    fn reinit(&mut self) {
        self.dma = None;
        self.mm_packing = MmPacking::Pack;
        self.user_data = None;
        self.callbacks = [nop::<R, D> as Callback<R, D>; CallbackKind::COUNT];
        self.awd_callback = awd_nop::<R, D>;
        self.errors = ErrorCodes::empty();
        self.stop_mode = StopMode::Single;
        self.group_state = [GroupState::Reset; 2];
        self.common_state = CommonState::Independent;
        self.state = State::Init;

        #[cfg(feature = "defmt")]
        defmt::debug!("{} initialized", self.instance);
    }

    /// Stops ongoing conversions, disables the converter and resets the handle
    ///
    /// A handle linked in an [`Adcs`] chain must be reset through [`Adcs::deinit`],
    /// which also repairs the chain.
    pub fn deinit(&mut self, tb: &mut impl crate::timer::Timebase) {
        if self.state == State::Active {
            if self.group_state[REGULAR] == GroupState::Active {
                let _ = self.reg_stop_conversion(tb);
            }
            if self.group_state[INJECTED] == GroupState::Active {
                let _ = self.inj_stop_conversion(tb);
            }
            let _ = self.stop(tb);
        }

        self.dma = None;
        self.user_data = None;
        self.state = State::Reset;
        self.group_state = [GroupState::Reset; 2];
        self.common_state = CommonState::Independent;

        #[cfg(feature = "defmt")]
        defmt::debug!("{} reset", self.instance);
    }

    /// Releases the registers and the DMA channel
    pub fn release(self) -> (R, Option<D>) {
        (self.regs, self.dma)
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    pub fn profile(&self) -> Profile {
        self.instance.profile()
    }

    /// Whether the device runs the extended linearity calibration
    pub fn has_extended_calibration(&self) -> bool {
        self.extended_calibration
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn group_state(&self, group: ConvGroup) -> GroupState {
        self.group_state[group.index()]
    }

    pub fn common_state(&self) -> CommonState {
        self.common_state
    }

    pub fn conv_per_start(&self, group: ConvGroup) -> ConvPerStart {
        self.conv_per_start[group.index()]
    }

    /// Errors accumulated since init or the last [`Adc::clear_error_codes`]
    pub fn error_codes(&self) -> ErrorCodes {
        self.errors
    }

    pub fn clear_error_codes(&mut self) {
        self.errors = ErrorCodes::empty();
    }

    pub fn register_callback(&mut self, kind: CallbackKind, cb: Callback<R, D>) {
        self.callbacks[kind as usize] = cb;
    }

    /// Callback of the analog watchdog out-of-window events
    pub fn register_awd_callback(&mut self, cb: AwdCallback<R, D>) {
        self.awd_callback = cb;
    }

    pub fn set_user_data(&mut self, data: &'static (dyn Any + Sync)) {
        self.user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<&'static (dyn Any + Sync)> {
        self.user_data
    }

    /// DMA channel assigned to the regular group
    pub fn dma(&self) -> Option<&D> {
        self.dma.as_ref()
    }

    #[inline(always)]
    pub(crate) fn is_reduced(&self) -> bool {
        self.instance == Instance::Adc4
    }

    pub(crate) fn call(&mut self, kind: CallbackKind) {
        let cb = self.callbacks[kind as usize];
        cb(self);
    }

    pub(crate) fn call_awd(&mut self, awd: AwdInstance) {
        let cb = self.awd_callback;
        cb(self, awd);
    }

    /// Moves `group` from `from` to `to`, or fails with `Busy` touching nothing
    pub(crate) fn check_update_group(
        &mut self,
        group: usize,
        from: GroupState,
        to: GroupState,
    ) -> Result<()> {
        if self.group_state[group] != from {
            return Err(Error::Busy);
        }
        self.group_state[group] = to;
        Ok(())
    }

    pub(crate) fn check_update_state(&mut self, from: State, to: State) -> Result<()> {
        if self.state != from {
            return Err(Error::Busy);
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn clear_flags(&mut self, flags: Interrupts) {
        self.regs.write(Reg::Isr, flags.bits());
    }

    pub(crate) fn enable_interrupts(&mut self, it: Interrupts) {
        self.regs.set_bits(Reg::Ier, it.bits());
    }

    pub(crate) fn disable_interrupts(&mut self, it: Interrupts) {
        self.regs.clear_bits(Reg::Ier, it.bits());
    }

    pub(crate) fn flags(&self) -> Interrupts {
        Interrupts::from_bits_truncate(self.regs.read(Reg::Isr))
    }

    /// Injected conversions chained to the regular ones (`JAUTO`)
    pub(crate) fn inj_auto(&self) -> bool {
        !self.is_reduced() && self.regs.is_set(crate::pacext::adc::cfgr1::JAUTO)
    }
}
