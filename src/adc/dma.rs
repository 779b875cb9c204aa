//! Regular group conversions with data transfer by DMA
//!
//! The handle drives the channel given to [`Adc::reg_set_dma`]. Channel events come
//! back through [`Adc::on_dma_event`], which the application calls from the DMA
//! interrupt.

use core::mem::size_of;
use core::sync::atomic::{self, Ordering};

use embedded_dma::WriteBuffer;

use super::{
    cr_set, Adc, CallbackKind, DataTransfer, Error, ErrorCodes, GroupState, Interrupts, Result,
    State, StopMode, REGULAR,
};
use crate::dma::{self, DmaChannel, DmaEvent, DmaIt, DmaNotify};
use crate::pacext::adc::{cfgr1, cr, Reg, RegisterAccess};
use crate::timer::Timebase;

/// Interrupts of a regular DMA transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaOptions {
    /// DMA transfer complete and error interrupts, the optional DMA interrupts and
    /// the ADC interrupts given. `EOC` is consumed by the DMA and `OVR` is always
    /// enabled, so neither belongs in `adc`.
    Interrupts { dma: DmaIt, adc: Interrupts },
    /// Every DMA and ADC interrupt disabled except overrun. The group reports
    /// `ActiveSilent` until stopped.
    Silent,
}

impl Default for DmaOptions {
    fn default() -> Self {
        Self::Interrupts {
            dma: DmaIt::HALF_TRANSFER,
            adc: Interrupts::empty(),
        }
    }
}

impl DmaOptions {
    /// Channel notification, ADC interrupts and running group state
    pub(crate) fn split(self) -> (DmaNotify, Interrupts, GroupState) {
        match self {
            DmaOptions::Interrupts { dma, adc } => {
                debug_assert!((Interrupts::EOSMP | Interrupts::EOS | Interrupts::AWD).contains(adc));
                (DmaNotify::Interrupts(dma), adc, GroupState::Active)
            }
            DmaOptions::Silent => (DmaNotify::Silent, Interrupts::empty(), GroupState::ActiveSilent),
        }
    }
}

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Assigns the DMA channel of the regular group
    pub fn reg_set_dma(&mut self, channel: D) {
        debug_assert!(matches!(
            self.state,
            State::Init | State::Configuring | State::Idle
        ));
        debug_assert!(matches!(
            self.group_state[REGULAR],
            GroupState::Reset | GroupState::Idle
        ));
        self.dma = Some(channel);
    }

    /// Starts regular conversions transferred by DMA into `buffer`, with the
    /// half transfer interrupt
    ///
    /// # Safety
    ///
    /// See [`Adc::reg_start_conversion_dma_with`].
    pub unsafe fn reg_start_conversion_dma<B: WriteBuffer>(&mut self, buffer: B) -> Result<()> {
        self.reg_start_conversion_dma_with(buffer, DmaOptions::default())
    }

    /// Starts regular conversions transferred by DMA into `buffer`
    ///
    /// The transfer mode follows the channel: unlimited requests for a circular
    /// channel, limited otherwise. If the channel refuses the transfer, the group
    /// returns to `Idle`, `REG_DMA` is recorded and `Dma` is returned.
    ///
    /// # Safety
    ///
    /// The memory behind `buffer` must stay valid, and must not be accessed other
    /// than through volatile reads, until the transfer is stopped.
    pub unsafe fn reg_start_conversion_dma_with<B: WriteBuffer>(
        &mut self,
        mut buffer: B,
        options: DmaOptions,
    ) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);

        let (notify, adc_it, running) = options.split();
        self.check_update_group(REGULAR, GroupState::Idle, running)?;

        let (ptr, len) = buffer.write_buffer();
        let size_bytes = (len * size_of::<B::Word>()) as u32;
        let src = self.regs.data_address(Reg::Dr);

        atomic::compiler_fence(Ordering::Release);

        let started = match self.dma.as_mut() {
            Some(ch) => ch.start(src, ptr as u32, size_bytes, notify),
            None => Err(dma::Error::Unavailable),
        };
        if let Err(_e) = started {
            self.group_state[REGULAR] = GroupState::Idle;
            self.errors |= ErrorCodes::REG_DMA;
            #[cfg(feature = "defmt")]
            defmt::warn!("{} DMA start failed: {}", self.instance(), _e);
            return Err(Error::Dma);
        }

        let circular = self.dma.as_ref().map_or(false, |ch| ch.is_circular());
        self.set_transfer_mode(if circular {
            DataTransfer::DmaUnlimited
        } else {
            DataTransfer::DmaLimited
        });

        self.clear_flags(Interrupts::EOC | Interrupts::EOS | Interrupts::OVR);
        self.enable_interrupts(Interrupts::OVR);
        if !adc_it.is_empty() {
            self.clear_flags(adc_it);
            self.enable_interrupts(adc_it);
        }

        cr_set(&mut self.regs, cr::ADSTART.mask());
        Ok(())
    }

    /// Stops regular conversions and the DMA transfer
    ///
    /// A silent transfer is aborted in place and the group is `Idle` on return.
    /// Otherwise the group turns `Idle` when the channel reports
    /// [`DmaEvent::AbortComplete`], or right away if the abort request fails.
    pub fn reg_stop_conversion_dma(&mut self, tb: &mut impl Timebase) -> Result<()> {
        debug_assert_eq!(self.state, State::Active);

        let res = self.stop_group(REGULAR, tb);
        self.set_transfer_mode(DataTransfer::None);
        self.stop_mode = StopMode::Single;
        if !self.abort_transfer() {
            self.complete_dma_stop();
        }
        self.disable_interrupts(Interrupts::REGULAR);
        res
    }

    /// Aborts a silent transfer in place, otherwise requests an abort
    ///
    /// Returns `true` when the stop is left to the [`DmaEvent::AbortComplete`] event.
    pub(crate) fn abort_transfer(&mut self) -> bool {
        let silent = self.group_state[REGULAR] == GroupState::ActiveSilent;
        match self.dma.as_mut() {
            Some(ch) if silent => {
                let _ = ch.abort();
                false
            }
            Some(ch) => ch.abort_it().is_ok(),
            None => false,
        }
    }

    /// Data register transfer mode; encodings match on both profiles
    pub(crate) fn set_transfer_mode(&mut self, mode: DataTransfer) {
        self.regs.write_field(cfgr1::DMNGT, mode.code());
    }

    /// Ends a stopped transfer of this handle only
    fn complete_dma_stop(&mut self) {
        self.group_state[REGULAR] = GroupState::Idle;
        self.stop_mode = StopMode::Single;
        self.call(CallbackKind::RegXferStop);
    }

    /// Handles an event of the regular group DMA channel
    ///
    /// Handles linked in an [`Adcs`](super::Adcs) chain take their events through
    /// [`Adcs::on_dma_event`](super::Adcs::on_dma_event), which completes a multimode
    /// stop on every member.
    pub fn on_dma_event(&mut self, event: DmaEvent) {
        match event {
            DmaEvent::HalfTransfer => self.call(CallbackKind::RegXferHalf),
            DmaEvent::TransferComplete => self.call(CallbackKind::RegXferCplt),
            DmaEvent::TransferError => {
                self.errors |= ErrorCodes::REG_DMA;
                self.call(CallbackKind::Error);
            }
            DmaEvent::AbortComplete => self.complete_dma_stop(),
        }
    }
}
