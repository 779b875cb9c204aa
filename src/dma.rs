//! # Direct Memory Access
//!
//! The ADC driver does not own a DMA engine. It drives one through [`DmaChannel`],
//! and the application forwards the channel's interrupt events back to the ADC handle
//! as [`DmaEvent`]s.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Channel is already running a transfer
    Busy,
    /// Transfer parameters rejected by the channel
    Config,
    /// No channel behind this handle
    Unavailable,
}

bitflags::bitflags! {
    /// Optional DMA channel interrupts, bit-aligned with `GPDMA_CxCR`
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct DmaIt: u32 {
        const HALF_TRANSFER = 1 << 9;
        const TRIGGER_OVERRUN = 1 << 14;
        const DEFAULT = Self::HALF_TRANSFER.bits | Self::TRIGGER_OVERRUN.bits;
    }
}

/// Interrupt selection for a transfer start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaNotify {
    /// Transfer complete and error interrupts plus the optional ones given
    Interrupts(DmaIt),
    /// Every channel interrupt disabled
    Silent,
}

/// Channel events forwarded to the ADC handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaEvent {
    HalfTransfer,
    TransferComplete,
    TransferError,
    /// Completion of an [`DmaChannel::abort_it`] request
    AbortComplete,
}

/// DMA channel capability used by the ADC
pub trait DmaChannel {
    /// Starts a peripheral-to-memory transfer of `size_bytes` from `src` to `dst`
    fn start(&mut self, src: u32, dst: u32, size_bytes: u32, notify: DmaNotify) -> Result<(), Error>;

    /// Aborts the transfer and waits for the channel to be idle
    fn abort(&mut self) -> Result<(), Error>;

    /// Requests an abort. Completion is reported as [`DmaEvent::AbortComplete`].
    fn abort_it(&mut self) -> Result<(), Error>;

    /// Whether the channel restarts from the buffer start when it reaches its end
    fn is_circular(&self) -> bool;

    /// Updates the optional interrupts of a started transfer
    fn set_interrupts(&mut self, it: DmaIt);
}

/// Placeholder for handles that never use DMA
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDma;

impl DmaChannel for NoDma {
    fn start(&mut self, _: u32, _: u32, _: u32, _: DmaNotify) -> Result<(), Error> {
        Err(Error::Unavailable)
    }

    fn abort(&mut self) -> Result<(), Error> {
        Err(Error::Unavailable)
    }

    fn abort_it(&mut self) -> Result<(), Error> {
        Err(Error::Unavailable)
    }

    fn is_circular(&self) -> bool {
        false
    }

    fn set_interrupts(&mut self, _: DmaIt) {}
}
