//! Simulated converter, DMA channel and clock
//!
//! Register files use interior mutability, so a test keeps a shared reference to the
//! simulated hardware while the driver owns a `&SimAdc` port to it. The simulation
//! reacts to control bits the way the converter does: enable raises `ADRDY`, a start
//! completes immediately with fresh data unless conversions are held, stop requests
//! clear the start bits, and `ISR` is write-1-to-clear.

use core::cell::{Cell, RefCell};

use heapless::Vec;

use super::{Adc, Adcs};
use crate::dma::{self, DmaChannel, DmaIt, DmaNotify};
use crate::pacext::adc::{cr, isr, Reg, RegisterAccess};
use crate::time::Instant;
use crate::timer::Timebase;

/// Number of writes kept in a [`SimAdc`] log
pub const LOG_DEPTH: usize = 256;

/// Bits of `CR` that software can only set
const CR_RS: u32 = cr::ADCAL.mask()
    | cr::JADSTP.mask()
    | cr::ADSTP.mask()
    | cr::JADSTART.mask()
    | cr::ADSTART.mask()
    | cr::ADDIS.mask()
    | cr::ADEN.mask();

/// Common block shared by the instances attached to it
pub struct SimCommon {
    csr: Cell<u32>,
    ccr: Cell<u32>,
    cdr: Cell<u32>,
    cdr2: Cell<u32>,
    idcode: Cell<u32>,
}

impl SimCommon {
    /// Common block of a device reporting `dev_id` and `rev_id`
    pub const fn new(dev_id: u16, rev_id: u16) -> Self {
        Self {
            csr: Cell::new(0),
            ccr: Cell::new(0),
            cdr: Cell::new(0),
            cdr2: Cell::new(0),
            idcode: Cell::new(((rev_id as u32) << 16) | (dev_id as u32 & 0xFFF)),
        }
    }

    fn cell(&self, reg: Reg) -> &Cell<u32> {
        match reg {
            Reg::Csr => &self.csr,
            Reg::Ccr => &self.ccr,
            Reg::Cdr => &self.cdr,
            Reg::Cdr2 => &self.cdr2,
            _ => &self.idcode,
        }
    }

    pub fn read(&self, reg: Reg) -> u32 {
        self.cell(reg).get()
    }

    pub fn write(&self, reg: Reg, value: u32) {
        self.cell(reg).set(value)
    }
}

impl Default for SimCommon {
    fn default() -> Self {
        // STM32U575 rev X
        Self::new(0x482, 0x2001)
    }
}

/// Handle driving simulated hardware
pub type SimHandle<'a, 'c> = Adc<&'a SimAdc<'c>, &'a SimDma>;

/// Arena of simulated handles
pub type SimAdcs<'a, 'c> = Adcs<&'a SimAdc<'c>, &'a SimDma>;

/// Converter instance register file
///
/// `CALFACT2` is banked by `CR.CALINDEX`, like the calibration buffer it exposes.
pub struct SimAdc<'c> {
    common: &'c SimCommon,
    base: u32,
    regs: [Cell<u32>; Reg::COUNT],
    calfact2: [Cell<u32>; 16],
    log: RefCell<Vec<(Reg, u32), LOG_DEPTH>>,
    next_sample: Cell<u32>,
    never_ready: Cell<bool>,
    disable_hangs: Cell<bool>,
    calibration_hangs: Cell<bool>,
    hold_conversions: Cell<bool>,
    stop_hangs: Cell<bool>,
    calibrations: Cell<u32>,
}

impl<'c> SimAdc<'c> {
    /// Instance at bus address `base`, attached to `common`
    pub fn new(common: &'c SimCommon, base: u32) -> Self {
        Self {
            common,
            base,
            regs: core::array::from_fn(|_| Cell::new(0)),
            calfact2: core::array::from_fn(|_| Cell::new(0)),
            log: RefCell::new(Vec::new()),
            next_sample: Cell::new(1),
            never_ready: Cell::new(false),
            disable_hangs: Cell::new(false),
            calibration_hangs: Cell::new(false),
            hold_conversions: Cell::new(false),
            stop_hangs: Cell::new(false),
            calibrations: Cell::new(0),
        }
    }

    /// Enable requests never report ready
    pub fn set_never_ready(&self, on: bool) {
        self.never_ready.set(on)
    }

    /// Disable requests leave `ADEN` set
    pub fn set_disable_hangs(&self, on: bool) {
        self.disable_hangs.set(on)
    }

    /// `ADCAL` never clears
    pub fn set_calibration_hangs(&self, on: bool) {
        self.calibration_hangs.set(on)
    }

    /// Started conversions stay in progress until stopped
    pub fn set_hold_conversions(&self, on: bool) {
        self.hold_conversions.set(on)
    }

    /// Stop requests are ignored
    pub fn set_stop_hangs(&self, on: bool) {
        self.stop_hangs.set(on)
    }

    /// Value loaded in the data register by the next conversion
    pub fn set_next_sample(&self, value: u32) {
        self.next_sample.set(value)
    }

    /// Forces status flags, as the converter would
    pub fn raise(&self, flags: u32) {
        let c = &self.regs[Reg::Isr.index()];
        c.set(c.get() | flags);
    }

    /// Sets register bits without going through the write log
    pub fn poke(&self, reg: Reg, value: u32) {
        if reg.is_common() || reg == Reg::DbgIdcode {
            self.common.write(reg, value)
        } else if reg == Reg::Calfact2 {
            self.calfact2_bank().set(value)
        } else {
            self.regs[reg.index()].set(value)
        }
    }

    pub fn peek(&self, reg: Reg) -> u32 {
        if reg.is_common() || reg == Reg::DbgIdcode {
            self.common.read(reg)
        } else if reg == Reg::Calfact2 {
            self.calfact2_bank().get()
        } else {
            self.regs[reg.index()].get()
        }
    }

    /// Number of writes performed so far
    pub fn writes(&self) -> usize {
        self.log.borrow().len()
    }

    /// Writes performed so far, oldest first
    pub fn written(&self) -> Vec<(Reg, u32), LOG_DEPTH> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear()
    }

    /// Number of calibrations run
    pub fn calibrations(&self) -> u32 {
        self.calibrations.get()
    }

    /// `CALFACT2` entry `index` of the calibration buffer
    pub fn calibration_word(&self, index: usize) -> u32 {
        self.calfact2[index].get()
    }

    fn calfact2_bank(&self) -> &Cell<u32> {
        let index = cr::CALINDEX.extract(self.regs[Reg::Cr.index()].get());
        &self.calfact2[index as usize]
    }

    fn sample(&self) -> u32 {
        let v = self.next_sample.get();
        self.next_sample.set(v.wrapping_add(1));
        v
    }

    fn write_cr(&self, value: u32) {
        let old = self.regs[Reg::Cr.index()].get();
        let mut cr = (value & !CR_RS) | (old & CR_RS) | (value & CR_RS);
        let mut flags = 0;

        if cr & cr::ADDIS.mask() != 0 {
            if !self.disable_hangs.get() {
                cr &= !(cr::ADEN.mask() | cr::ADDIS.mask());
            }
        } else if value & cr::ADEN.mask() != 0 && !self.never_ready.get() {
            flags |= isr::ADRDY.mask();
        }
        if value & cr::ADCAL.mask() != 0 {
            self.calibrations.set(self.calibrations.get() + 1);
            if !self.calibration_hangs.get() {
                cr &= !cr::ADCAL.mask();
                flags |= isr::EOCAL.mask();
            }
        }
        if cr & cr::ADSTP.mask() != 0 && !self.stop_hangs.get() {
            cr &= !(cr::ADSTP.mask() | cr::ADSTART.mask());
        }
        if cr & cr::JADSTP.mask() != 0 && !self.stop_hangs.get() {
            cr &= !(cr::JADSTP.mask() | cr::JADSTART.mask());
        }
        if value & cr::ADSTART.mask() != 0 && !self.hold_conversions.get() {
            cr &= !cr::ADSTART.mask();
            let sample = self.sample();
            self.regs[Reg::Dr.index()].set(sample);
            // Slave instance sits 0x100 above its master
            let cdr = self.common.read(Reg::Cdr);
            let cdr = if self.base & 0x300 == 0x100 {
                (cdr & 0x0000_FFFF) | (sample << 16)
            } else {
                (cdr & 0xFFFF_0000) | (sample & 0xFFFF)
            };
            self.common.write(Reg::Cdr, cdr);
            flags |= isr::EOSMP.mask() | isr::EOC.mask() | isr::EOS.mask();
        }
        if value & cr::JADSTART.mask() != 0 && !self.hold_conversions.get() {
            cr &= !cr::JADSTART.mask();
            for jdr in Reg::JDR {
                let sample = self.sample();
                self.regs[jdr.index()].set(sample);
            }
            flags |= isr::JEOC.mask() | isr::JEOS.mask();
        }

        self.regs[Reg::Cr.index()].set(cr);
        self.raise(flags);
    }
}

impl RegisterAccess for &SimAdc<'_> {
    fn read(&self, reg: Reg) -> u32 {
        self.peek(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        let _ = self.log.borrow_mut().push((reg, value));
        match reg {
            Reg::Cr => self.write_cr(value),
            Reg::Isr => {
                let c = &self.regs[Reg::Isr.index()];
                c.set(c.get() & !value);
            }
            _ => self.poke(reg, value),
        }
    }

    fn data_address(&self, reg: Reg) -> u32 {
        if reg.is_common() {
            (self.base & !0xFF) + 0x300 + reg.offset() as u32
        } else {
            self.base + reg.offset() as u32
        }
    }
}

/// A transfer start seen by [`SimDma`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTransfer {
    pub src: u32,
    pub dst: u32,
    pub size_bytes: u32,
    pub notify: DmaNotify,
}

/// Scripted DMA channel
#[derive(Default)]
pub struct SimDma {
    circular: Cell<bool>,
    fail_start: Cell<bool>,
    fail_abort_it: Cell<bool>,
    last: Cell<Option<SimTransfer>>,
    interrupts: Cell<Option<DmaIt>>,
    aborts: Cell<u32>,
    abort_requests: Cell<u32>,
}

impl SimDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_circular(&self, on: bool) {
        self.circular.set(on)
    }

    pub fn set_fail_start(&self, on: bool) {
        self.fail_start.set(on)
    }

    pub fn set_fail_abort_it(&self, on: bool) {
        self.fail_abort_it.set(on)
    }

    /// Last transfer started
    pub fn last(&self) -> Option<SimTransfer> {
        self.last.get()
    }

    /// Interrupts set on a running transfer
    pub fn interrupts(&self) -> Option<DmaIt> {
        self.interrupts.get()
    }

    /// Synchronous aborts
    pub fn aborts(&self) -> u32 {
        self.aborts.get()
    }

    /// Asynchronous abort requests
    pub fn abort_requests(&self) -> u32 {
        self.abort_requests.get()
    }
}

impl DmaChannel for &SimDma {
    fn start(&mut self, src: u32, dst: u32, size_bytes: u32, notify: DmaNotify) -> Result<(), dma::Error> {
        if self.fail_start.get() {
            return Err(dma::Error::Busy);
        }
        self.last.set(Some(SimTransfer {
            src,
            dst,
            size_bytes,
            notify,
        }));
        Ok(())
    }

    fn abort(&mut self) -> Result<(), dma::Error> {
        self.aborts.set(self.aborts.get() + 1);
        Ok(())
    }

    fn abort_it(&mut self) -> Result<(), dma::Error> {
        if self.fail_abort_it.get() {
            return Err(dma::Error::Config);
        }
        self.abort_requests.set(self.abort_requests.get() + 1);
        Ok(())
    }

    fn is_circular(&self) -> bool {
        self.circular.get()
    }

    fn set_interrupts(&mut self, it: DmaIt) {
        self.interrupts.set(Some(it))
    }
}

/// Clock advancing one millisecond per `now()` sample
#[derive(Debug, Default)]
pub struct SimClock {
    ms: u32,
    delayed_us: u32,
}

impl SimClock {
    pub const fn new() -> Self {
        Self { ms: 0, delayed_us: 0 }
    }

    /// Milliseconds consumed by polling so far
    pub fn elapsed_ms(&self) -> u32 {
        self.ms
    }

    /// Total busy delay requested
    pub fn delayed_us(&self) -> u32 {
        self.delayed_us
    }
}

impl Timebase for SimClock {
    fn now(&mut self) -> Instant {
        let now = Instant::from_ticks(self.ms);
        self.ms = self.ms.wrapping_add(1);
        now
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us = self.delayed_us.saturating_add(us);
    }
}

/// Buffer living as long as the test process, as DMA buffers must
#[cfg(test)]
pub(crate) fn dma_buffer<T>(buf: T) -> &'static mut T {
    Box::leak(Box::new(buf))
}

/// Handle configured for single conversions of input 1, left `Idle`
#[cfg(test)]
pub(crate) fn idle_handle<'a, 'c>(hw: &'a SimAdc<'c>, instance: super::Instance) -> SimHandle<'a, 'c> {
    use super::{Channel, ChannelConfig, Config, RegularConfig, SamplingTime};

    let mut adc: SimHandle = Adc::new(hw, instance);
    adc.set_config(&Config::default()).unwrap();
    adc.reg_set_config(&RegularConfig::default()).unwrap();
    let sampling_time = if instance == super::Instance::Adc4 {
        SamplingTime::Common1
    } else {
        SamplingTime::Cycles12
    };
    let ch = ChannelConfig {
        sampling_time,
        ..ChannelConfig::default()
    };
    adc.set_channel_config(Channel::In(1), &ch).unwrap();
    adc
}
