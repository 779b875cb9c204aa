//! Dual mode: ADC1 and ADC2 converting together
//!
//! The pair is a two-member chain led by ADC1, the master. Every operation takes the
//! master's [`HandleId`] and fails with `InvalidParam` for any other handle or for an
//! unlinked one. Conversions are started and stopped on the master and the slave
//! follows in hardware; the handle states of both members move together.

use core::mem::size_of;
use core::sync::atomic::{self, Ordering};

use embedded_dma::WriteBuffer;

use super::activation::ALL_FLAGS;
use super::regular::GROUP_BITS;
use super::{
    cr_set, Adc, Adcs, CommonState, ConvPerStart, DataTransfer, DmaOptions, Error, ErrorCodes,
    GroupState, HandleId, Interrupts, Resolution, Result, SamplingMode, State, StopMode,
    INJECTED, REGULAR,
};
use crate::dma::{self, DmaChannel, DmaIt, DmaNotify};
use crate::pacext::adc::{ccr, cdr, cfgr1, cr, Reg, RegisterAccess};
use crate::time::MilliSeconds;
use crate::timer::{wait_until, Timebase};

/// Dual mode (`CCR.DUAL`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MmMode {
    Independent,
    RegSimult,
    RegInterleaved,
    InjSimult,
    /// Works with external triggers only
    InjAlternate,
    RegSimultInjSimult,
    RegSimultInjAlternate,
    RegInterleavedInjSimult,
}

impl MmMode {
    const fn code(self) -> u32 {
        use MmMode::*;
        match self {
            Independent => 0,
            RegSimultInjSimult => 1,
            RegSimultInjAlternate => 2,
            RegInterleavedInjSimult => 3,
            InjSimult => 5,
            RegSimult => 6,
            RegInterleaved => 7,
            InjAlternate => 9,
        }
    }

    fn from_code(code: u32) -> Self {
        use MmMode::*;
        match code {
            1 => RegSimultInjSimult,
            2 => RegSimultInjAlternate,
            3 => RegInterleavedInjSimult,
            5 => InjSimult,
            6 => RegSimult,
            7 => RegInterleaved,
            9 => InjAlternate,
            _ => Independent,
        }
    }

    /// Regular conversions are synchronized
    const fn has_regular(self) -> bool {
        !matches!(
            self,
            MmMode::Independent | MmMode::InjSimult | MmMode::InjAlternate
        )
    }

    const fn is_interleaved(self) -> bool {
        matches!(self, MmMode::RegInterleaved | MmMode::RegInterleavedInjSimult)
    }
}

impl Default for MmMode {
    fn default() -> Self {
        MmMode::Independent
    }
}

/// Regular data format of the common data register (`CCR.DAMDF`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MmDataFormat {
    /// No packing, each instance delivers its own data
    EachAdc,
    /// Master in bits 15:0, slave in bits 31:16
    Pack32Bits,
    /// Master in bits 7:0, slave in bits 15:8
    Pack16Bits,
}

impl MmDataFormat {
    const fn code(self) -> u32 {
        match self {
            MmDataFormat::EachAdc => 0,
            MmDataFormat::Pack32Bits => 2,
            MmDataFormat::Pack16Bits => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code {
            2 => MmDataFormat::Pack32Bits,
            3 => MmDataFormat::Pack16Bits,
            _ => MmDataFormat::EachAdc,
        }
    }
}

impl Default for MmDataFormat {
    fn default() -> Self {
        MmDataFormat::EachAdc
    }
}

/// DMA transfer of the data of both instances through one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MmPacking {
    /// One transfer per conversion pair, from `CDR`
    Pack,
    /// One transfer per conversion, master and slave in turn, from `CDR2`
    Unpack,
}

impl MmPacking {
    const fn data_register(self) -> Reg {
        match self {
            MmPacking::Pack => Reg::Cdr,
            MmPacking::Unpack => Reg::Cdr2,
        }
    }
}

impl Default for MmPacking {
    fn default() -> Self {
        MmPacking::Pack
    }
}

/// Instance addressed by a dual mode data read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MmInstance {
    Master,
    Slave,
    /// Master in bits 15:0, slave in bits 31:16
    Packed,
}

/// Dual mode configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MultimodeConfig {
    pub mode: MmMode,
    /// Modes with synchronized regular conversions only
    pub data_format: MmDataFormat,
    /// Data formats other than `EachAdc` only
    pub packing: MmPacking,
    /// Interleaved modes only. Delay between the two sampling phases, 1 to 16 ADC
    /// clock cycles; at most 15 at 10-bit and 13 at 8-bit resolution.
    pub interleave_delay: u8,
}

impl Default for MultimodeConfig {
    fn default() -> Self {
        Self {
            mode: MmMode::Independent,
            data_format: MmDataFormat::EachAdc,
            packing: MmPacking::Pack,
            interleave_delay: 1,
        }
    }
}

fn debug_assert_pair<R, D>(m: &Adc<R, D>, s: &Adc<R, D>, state: State) {
    debug_assert!(
        m.common_state == CommonState::Multimode && s.common_state == CommonState::Multimode
    );
    debug_assert!(m.state == state && s.state == state);
}

/// Moves `group` of both members from `from` to `to`, or fails with `Busy` touching
/// neither
fn check_update_pair<R, D>(
    m: &mut Adc<R, D>,
    s: &mut Adc<R, D>,
    group: usize,
    from: GroupState,
    to: GroupState,
) -> Result<()> {
    if m.group_state[group] != from || s.group_state[group] != from {
        return Err(Error::Busy);
    }
    m.group_state[group] = to;
    s.group_state[group] = to;
    Ok(())
}

/// Clears the regular flags, enables overrun on both members and starts the master
fn start_regular_pair<R: RegisterAccess, D: DmaChannel>(
    m: &mut Adc<R, D>,
    s: &mut Adc<R, D>,
    it: Interrupts,
) {
    for adc in [&mut *m, &mut *s] {
        adc.clear_flags(Interrupts::EOC | Interrupts::EOS | Interrupts::OVR);
        adc.enable_interrupts(Interrupts::OVR);
    }
    if !it.is_empty() {
        m.clear_flags(it);
        m.enable_interrupts(it);
    }
    cr_set(&mut m.regs, cr::ADSTART.mask());
}

/// Enables one member; it turns `Active` on success only
fn activate_member<R: RegisterAccess, D: DmaChannel>(
    adc: &mut Adc<R, D>,
    inj_auto: bool,
    tb: &mut impl Timebase,
) -> Result<()> {
    match adc.activate(tb) {
        Ok(()) => {
            adc.state = State::Active;
            Ok(())
        }
        Err(e) => {
            if inj_auto {
                adc.group_state[INJECTED] = GroupState::Idle;
            }
            #[cfg(feature = "defmt")]
            defmt::warn!("dual mode start stopped at {}", adc.instance());
            Err(e)
        }
    }
}

impl<R: RegisterAccess, D: DmaChannel, const N: usize> Adcs<R, D, N> {
    fn mm_slave(&self, master: HandleId) -> Result<HandleId> {
        if !self.handle(master)?.instance().is_mm_master() {
            return Err(Error::InvalidParam);
        }
        self.links.successor(master).ok_or(Error::InvalidParam)
    }

    fn mm_pair(&mut self, master: HandleId) -> Result<(&mut Adc<R, D>, &mut Adc<R, D>)> {
        let slave = self.mm_slave(master)?;
        self.pair_mut(master, slave)
    }

    /// Configures dual mode on the common block of a linked pair
    ///
    /// Both members turn `Multimode`, or back to `Linked` for [`MmMode::Independent`].
    pub fn mm_set_config(&mut self, master: HandleId, config: &MultimodeConfig) -> Result<()> {
        if !(1..=16).contains(&config.interleave_delay) {
            return Err(Error::InvalidParam);
        }
        let (m, s) = self.mm_pair(master)?;
        debug_assert!(m.common_state != CommonState::Independent);
        debug_assert!(m.state == State::Idle && s.state == State::Idle);

        if config.mode.is_interleaved() {
            let max = match Resolution::from_code(m.regs.read_field(cfgr1::RES), m.profile()) {
                Resolution::Bits10 => 15,
                Resolution::Bits8 => 13,
                _ => 16,
            };
            debug_assert!(config.interleave_delay <= max);
        }

        m.regs.write_field(ccr::DUAL, config.mode.code());
        if config.mode.has_regular() {
            m.regs.write_field(ccr::DAMDF, config.data_format.code());
            if config.data_format != MmDataFormat::EachAdc {
                m.mm_packing = config.packing;
            }
        }
        if config.mode.is_interleaved() {
            m.regs
                .write_field(ccr::DELAY, u32::from(config.interleave_delay - 1));
        }

        let common_state = if config.mode == MmMode::Independent {
            CommonState::Linked
        } else {
            CommonState::Multimode
        };
        for adc in [m, s] {
            adc.common_state = common_state;
            adc.state = State::Idle;
        }
        Ok(())
    }

    pub fn mm_config(&self, master: HandleId) -> Result<MultimodeConfig> {
        self.mm_slave(master)?;
        let m = self.handle(master)?;
        Ok(MultimodeConfig {
            mode: MmMode::from_code(m.regs.read_field(ccr::DUAL)),
            data_format: MmDataFormat::from_code(m.regs.read_field(ccr::DAMDF)),
            packing: m.mm_packing,
            interleave_delay: m.regs.read_field(ccr::DELAY) as u8 + 1,
        })
    }

    /// Activates both members, master first
    ///
    /// Each handle turns `Active` once its converter is ready. The walk stops at the
    /// first converter failing to get ready and nothing is rolled back: the master
    /// may be `Active` while the slave stays `Idle`.
    pub fn mm_start(&mut self, master: HandleId, tb: &mut impl Timebase) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Idle);

        if m.group_state[INJECTED] == GroupState::Idle && m.sampling_mode() != SamplingMode::Normal
        {
            return Err(Error::SamplingMode);
        }
        if m.state != State::Idle || s.state != State::Idle {
            return Err(Error::Busy);
        }
        let inj_auto = m.inj_auto();
        if inj_auto {
            check_update_pair(m, s, INJECTED, GroupState::Idle, GroupState::Active)?;
        }

        if let Err(e) = activate_member(m, inj_auto, tb) {
            if inj_auto {
                s.group_state[INJECTED] = GroupState::Idle;
            }
            return Err(e);
        }
        activate_member(s, inj_auto, tb)
    }

    /// Deactivates both members, master first
    ///
    /// The walk stops at the first converter failing to disable. Both handles are
    /// `Idle` afterwards.
    pub fn mm_stop(&mut self, master: HandleId, tb: &mut impl Timebase) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);
        debug_assert!(matches!(
            m.group_state[REGULAR],
            GroupState::Reset | GroupState::Idle
        ));

        let inj_auto = m.inj_auto();
        let mut res = Ok(());
        for adc in [&mut *m, &mut *s] {
            res = adc.deactivate(tb);
            adc.regs.write(Reg::Isr, ALL_FLAGS);
            adc.disable_interrupts(Interrupts::all());
            if res.is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("dual mode stop stopped at {}", adc.instance());
                break;
            }
        }

        for adc in [m, s] {
            adc.state = State::Idle;
            if inj_auto {
                adc.group_state[INJECTED] = GroupState::Idle;
            }
        }
        res
    }

    /// Calibrates both members, master first
    ///
    /// The walk stops at the first failure. Both handles are `Active` afterwards.
    pub fn mm_calibrate(&mut self, master: HandleId, tb: &mut impl Timebase) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let mut res = Ok(());
        for adc in [&mut *m, &mut *s] {
            res = adc.check_update_state(State::Active, State::Calibrating);
            if res.is_ok() {
                res = adc.run_calibration(tb);
            }
            if res.is_err() {
                break;
            }
        }

        m.state = State::Active;
        s.state = State::Active;
        res
    }

    fn mm_start_group(&mut self, master: HandleId, group: usize, it: Interrupts) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        check_update_pair(m, s, group, GroupState::Idle, GroupState::Active)?;
        if !it.is_empty() {
            m.clear_flags(it);
            s.clear_flags(it);
            m.enable_interrupts(it);
        }
        cr_set(&mut m.regs, GROUP_BITS[group].start.mask());
        Ok(())
    }

    fn mm_trigger_group(&mut self, master: HandleId, group: usize) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let start = GROUP_BITS[group].start;
        if m.regs.is_set(start) {
            return Err(Error::ConversionOngoing);
        }
        if m.group_state[group] == GroupState::Idle {
            check_update_pair(m, s, group, GroupState::Idle, GroupState::Active)?;
        }
        cr_set(&mut m.regs, start.mask());
        Ok(())
    }

    /// Stops `group` on the master; both groups are `Idle` afterwards, even on timeout
    fn mm_stop_group(
        &mut self,
        master: HandleId,
        group: usize,
        master_it: Interrupts,
        slave_it: Interrupts,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let res = m.stop_group(group, tb);
        m.disable_interrupts(master_it);
        if !slave_it.is_empty() {
            s.disable_interrupts(slave_it);
        }
        m.group_state[group] = GroupState::Idle;
        s.group_state[group] = GroupState::Idle;
        res
    }

    /// Waits for the end of conversion flag of either member, then clears both
    fn mm_poll_group(
        &mut self,
        master: HandleId,
        group: usize,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let eoc = GROUP_BITS[group].eoc;
        let (mr, sr) = (&m.regs, &s.regs);
        wait_until(tb, timeout, || {
            (mr.read(Reg::Isr) | sr.read(Reg::Isr)) & eoc.bits() != 0
        })
        .map_err(|_| Error::Timeout)?;

        m.clear_flags(eoc);
        s.clear_flags(eoc);
        if m.conv_per_start[group] == ConvPerStart::Unit {
            m.group_state[group] = GroupState::Idle;
            s.group_state[group] = GroupState::Idle;
        }
        Ok(())
    }

    pub fn mm_reg_start_conversion(&mut self, master: HandleId) -> Result<()> {
        self.mm_start_group(master, REGULAR, Interrupts::empty())
    }

    /// Starts dual regular conversions with the master's end of conversion and
    /// overrun interrupts
    pub fn mm_reg_start_conversion_it(&mut self, master: HandleId) -> Result<()> {
        self.mm_reg_start_conversion_it_with(master, Interrupts::EOC | Interrupts::OVR)
    }

    pub fn mm_reg_start_conversion_it_with(
        &mut self,
        master: HandleId,
        it: Interrupts,
    ) -> Result<()> {
        debug_assert!((Interrupts::REGULAR | Interrupts::AWD).contains(it));
        self.mm_start_group(master, REGULAR, it)
    }

    /// Starts dual regular conversions, the data of both instances transferred by the
    /// master's channel, with the half transfer interrupt
    ///
    /// # Safety
    ///
    /// See [`Adc::reg_start_conversion_dma_with`].
    pub unsafe fn mm_reg_start_conversion_dma<B: WriteBuffer>(
        &mut self,
        master: HandleId,
        buffer: B,
    ) -> Result<()> {
        self.mm_reg_start_conversion_dma_with(master, buffer, DmaOptions::default())
    }

    /// Starts dual regular conversions, the data of both instances transferred by the
    /// master's channel into `buffer`
    ///
    /// The channel reads `CDR` with [`MmPacking::Pack`], `CDR2` with
    /// [`MmPacking::Unpack`]. If the channel refuses the transfer, both groups return
    /// to `Idle`, `REG_DMA` is recorded on the master and `Dma` is returned.
    ///
    /// # Safety
    ///
    /// See [`Adc::reg_start_conversion_dma_with`].
    pub unsafe fn mm_reg_start_conversion_dma_with<B: WriteBuffer>(
        &mut self,
        master: HandleId,
        mut buffer: B,
        options: DmaOptions,
    ) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let (notify, adc_it, running) = options.split();
        check_update_pair(m, s, REGULAR, GroupState::Idle, running)?;

        let (ptr, len) = buffer.write_buffer();
        let size_bytes = (len * size_of::<B::Word>()) as u32;
        let src = m.regs.data_address(m.mm_packing.data_register());

        atomic::compiler_fence(Ordering::Release);

        let started = match m.dma.as_mut() {
            Some(ch) => ch.start(src, ptr as u32, size_bytes, notify),
            None => Err(dma::Error::Unavailable),
        };
        if let Err(_e) = started {
            m.group_state[REGULAR] = GroupState::Idle;
            s.group_state[REGULAR] = GroupState::Idle;
            m.errors |= ErrorCodes::REG_DMA;
            #[cfg(feature = "defmt")]
            defmt::warn!("dual mode DMA start failed: {}", _e);
            return Err(Error::Dma);
        }

        let circular = m.dma.as_ref().map_or(false, |ch| ch.is_circular());
        m.set_transfer_mode(if circular {
            DataTransfer::DmaUnlimited
        } else {
            DataTransfer::DmaLimited
        });
        start_regular_pair(m, s, adc_it);
        Ok(())
    }

    /// Starts the transfer of the regular data of `id` by its own channel, into its
    /// own buffer
    ///
    /// Done for both members before [`Adcs::mm_reg_start_conv_multi_dma`]. The data
    /// format becomes [`MmDataFormat::EachAdc`]. Only transfer complete and error
    /// interrupts are enabled on the channel.
    ///
    /// # Safety
    ///
    /// See [`Adc::reg_start_conversion_dma_with`].
    pub unsafe fn mm_reg_set_multi_dma<B: WriteBuffer>(
        &mut self,
        id: HandleId,
        mut buffer: B,
    ) -> Result<()> {
        let adc = self.handle_mut(id)?;
        debug_assert_eq!(adc.common_state, CommonState::Multimode);
        debug_assert_eq!(adc.group_state[REGULAR], GroupState::Idle);

        let (ptr, len) = buffer.write_buffer();
        let size_bytes = (len * size_of::<B::Word>()) as u32;
        let src = adc.regs.data_address(Reg::Dr);

        atomic::compiler_fence(Ordering::Release);

        let started = match adc.dma.as_mut() {
            Some(ch) => ch.start(
                src,
                ptr as u32,
                size_bytes,
                DmaNotify::Interrupts(DmaIt::empty()),
            ),
            None => Err(dma::Error::Unavailable),
        };
        adc.regs
            .write_field(ccr::DAMDF, MmDataFormat::EachAdc.code());

        if let Err(_e) = started {
            adc.errors |= ErrorCodes::REG_DMA;
            #[cfg(feature = "defmt")]
            defmt::warn!("{} DMA start failed: {}", adc.instance(), _e);
            return Err(Error::Dma);
        }
        Ok(())
    }

    /// Starts dual regular conversions on transfers prepared by
    /// [`Adcs::mm_reg_set_multi_dma`], leaving the channel interrupts as they are
    pub fn mm_reg_start_conv_multi_dma(&mut self, master: HandleId) -> Result<()> {
        let options = DmaOptions::Interrupts {
            dma: DmaIt::empty(),
            adc: Interrupts::empty(),
        };
        self.mm_reg_start_conv_multi_dma_with(master, options)
    }

    /// Starts dual regular conversions on transfers prepared by
    /// [`Adcs::mm_reg_set_multi_dma`]
    ///
    /// Optional DMA interrupts given in `options` are enabled on both channels.
    pub fn mm_reg_start_conv_multi_dma_with(
        &mut self,
        master: HandleId,
        options: DmaOptions,
    ) -> Result<()> {
        let (m, s) = self.mm_pair(master)?;
        debug_assert_pair(m, s, State::Active);

        let (_, adc_it, running) = options.split();
        check_update_pair(m, s, REGULAR, GroupState::Idle, running)?;

        if let DmaOptions::Interrupts { dma, .. } = options {
            if !dma.is_empty() {
                for adc in [&mut *m, &mut *s] {
                    if let Some(ch) = adc.dma.as_mut() {
                        ch.set_interrupts(dma);
                    }
                }
            }
        }

        let circular = m.dma.as_ref().map_or(false, |ch| ch.is_circular());
        let mode = if circular {
            DataTransfer::DmaUnlimited
        } else {
            DataTransfer::DmaLimited
        };
        m.set_transfer_mode(mode);
        s.set_transfer_mode(mode);
        start_regular_pair(m, s, adc_it);
        Ok(())
    }

    /// Software trigger of the next dual regular conversion
    ///
    /// Not for the interleaved modes. Fails with `ConversionOngoing` while the master
    /// converts.
    pub fn mm_reg_trigger_next_conversion(&mut self, master: HandleId) -> Result<()> {
        self.mm_trigger_group(master, REGULAR)
    }

    /// Stops dual regular conversions. Both groups are `Idle` afterwards.
    pub fn mm_reg_stop_conversion(&mut self, master: HandleId, tb: &mut impl Timebase) -> Result<()> {
        self.mm_stop_group(
            master,
            REGULAR,
            Interrupts::EOC | Interrupts::EOS,
            Interrupts::empty(),
            tb,
        )
    }

    /// Stops dual regular conversions and disables the regular group interrupts
    pub fn mm_reg_stop_conversion_it(
        &mut self,
        master: HandleId,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.mm_stop_group(master, REGULAR, Interrupts::REGULAR, Interrupts::OVR, tb)
    }

    /// Stops dual regular conversions and their DMA transfers
    ///
    /// With one channel per member, the master's channel is aborted in place and the
    /// slave's channel completes the stop. Both members' regular groups turn `Idle`
    /// when the completing channel reports [`DmaEvent::AbortComplete`] through
    /// [`Adcs::on_dma_event`], or right away for a silent transfer or a refused abort
    /// request.
    ///
    /// [`DmaEvent::AbortComplete`]: crate::dma::DmaEvent::AbortComplete
    pub fn mm_reg_stop_conversion_dma(
        &mut self,
        master: HandleId,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        let slave = self.mm_slave(master)?;
        let (m, s) = self.pair_mut(master, slave)?;
        debug_assert_pair(m, s, State::Active);

        let res = m.stop_group(REGULAR, tb);
        m.set_transfer_mode(DataTransfer::None);
        s.set_transfer_mode(DataTransfer::None);
        m.disable_interrupts(Interrupts::REGULAR);
        s.disable_interrupts(Interrupts::OVR);

        let multi = s.dma.is_some();
        if multi {
            if let Some(ch) = m.dma.as_mut() {
                let _ = ch.abort();
            }
        }
        let (last_id, last) = if multi { (slave, s) } else { (master, m) };
        last.stop_mode = StopMode::Multimode;
        if !last.abort_transfer() {
            self.complete_mm_dma_stop(last_id);
        }
        res
    }

    pub fn mm_reg_poll_for_conversion(
        &mut self,
        master: HandleId,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.mm_poll_group(master, REGULAR, timeout, tb)
    }

    /// Regular data from the common data register
    ///
    /// Requires a packed data format.
    pub fn mm_reg_value(&self, master: HandleId, inst: MmInstance) -> Result<u32> {
        self.mm_slave(master)?;
        let m = self.handle(master)?;
        debug_assert_ne!(m.state, State::Reset);
        debug_assert_ne!(m.regs.read_field(ccr::DAMDF), MmDataFormat::EachAdc.code());

        let data = m.regs.read(Reg::Cdr);
        Ok(match inst {
            MmInstance::Master => cdr::RDATA_MST.extract(data),
            MmInstance::Slave => cdr::RDATA_SLV.extract(data),
            MmInstance::Packed => data,
        })
    }

    pub fn mm_inj_start_conversion(&mut self, master: HandleId) -> Result<()> {
        self.mm_start_group(master, INJECTED, Interrupts::empty())
    }

    /// Starts dual injected conversions with the master's end of conversion interrupt
    pub fn mm_inj_start_conversion_it(&mut self, master: HandleId) -> Result<()> {
        self.mm_inj_start_conversion_it_with(master, Interrupts::JEOC)
    }

    pub fn mm_inj_start_conversion_it_with(
        &mut self,
        master: HandleId,
        it: Interrupts,
    ) -> Result<()> {
        debug_assert!((Interrupts::INJECTED | Interrupts::AWD).contains(it));
        self.mm_start_group(master, INJECTED, it)
    }

    pub fn mm_inj_trigger_next_conversion(&mut self, master: HandleId) -> Result<()> {
        self.mm_trigger_group(master, INJECTED)
    }

    pub fn mm_inj_stop_conversion(&mut self, master: HandleId, tb: &mut impl Timebase) -> Result<()> {
        self.mm_stop_group(
            master,
            INJECTED,
            Interrupts::empty(),
            Interrupts::empty(),
            tb,
        )
    }

    pub fn mm_inj_stop_conversion_it(
        &mut self,
        master: HandleId,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.mm_stop_group(
            master,
            INJECTED,
            Interrupts::INJECTED,
            Interrupts::empty(),
            tb,
        )
    }

    pub fn mm_inj_poll_for_conversion(
        &mut self,
        master: HandleId,
        timeout: MilliSeconds,
        tb: &mut impl Timebase,
    ) -> Result<()> {
        self.mm_poll_group(master, INJECTED, timeout, tb)
    }

    /// Injected data of sequence `rank` (1 to 4)
    pub fn mm_inj_value(&self, master: HandleId, inst: MmInstance, rank: u8) -> Result<u32> {
        debug_assert!((1..=4).contains(&rank));
        let slave = self.mm_slave(master)?;
        let (m, s) = (self.handle(master)?, self.handle(slave)?);
        debug_assert_ne!(m.state, State::Reset);

        let jdr = Reg::JDR[usize::from(rank.wrapping_sub(1)) & 3];
        Ok(match inst {
            MmInstance::Master => m.regs.read(jdr),
            MmInstance::Slave => s.regs.read(jdr),
            MmInstance::Packed => (m.regs.read(jdr) & 0xFFFF) | (s.regs.read(jdr) << 16),
        })
    }
}
