//! Interrupt dispatch
//!
//! `ISR` and `IER` are bit-aligned, so the pending events are the enabled flags.
//! Events are served in a fixed order: regular group first, then injected group, then
//! the analog watchdogs.

use super::{Adc, AwdInstance, CallbackKind, ErrorCodes, Interrupts, INJECTED, REGULAR};
use crate::dma::DmaChannel;
use crate::pacext::adc::{Reg, RegisterAccess};

impl<R: RegisterAccess, D: DmaChannel> Adc<R, D> {
    /// Serves every pending converter event
    pub fn irq_handler(&mut self) {
        self.dispatch(Interrupts::all());
    }

    /// Serves the pending regular group events only
    pub fn irq_handler_regular(&mut self) {
        self.dispatch(Interrupts::REGULAR);
    }

    /// Serves the pending injected group events only
    pub fn irq_handler_injected(&mut self) {
        self.dispatch(Interrupts::INJECTED);
    }

    /// Serves the pending analog watchdog events only
    pub fn irq_handler_awd(&mut self) {
        self.dispatch(Interrupts::AWD);
    }

    fn dispatch(&mut self, scope: Interrupts) {
        let isr = self.regs.read(Reg::Isr);
        let ier = self.regs.read(Reg::Ier);
        let pending = Interrupts::from_bits_truncate(isr & ier) & scope;

        if pending.contains(Interrupts::EOC) {
            self.end_of_conversion(REGULAR);
            self.call(CallbackKind::RegEoc);
        }
        if pending.contains(Interrupts::EOS) {
            self.clear_flags(Interrupts::EOS);
            self.call(CallbackKind::RegEos);
        }
        if pending.contains(Interrupts::OVR) {
            self.clear_flags(Interrupts::OVR);
            self.errors |= ErrorCodes::REG_OVR;
            self.call(CallbackKind::Error);
        }
        if pending.contains(Interrupts::EOSMP) {
            self.clear_flags(Interrupts::EOSMP);
            self.call(CallbackKind::RegEndOfSampling);
        }
        if pending.contains(Interrupts::JEOC) {
            self.end_of_conversion(INJECTED);
            self.call(CallbackKind::InjEoc);
        }
        if pending.contains(Interrupts::JEOS) {
            self.clear_flags(Interrupts::JEOS);
            self.call(CallbackKind::InjEos);
        }
        for (flag, awd) in [
            (Interrupts::AWD1, AwdInstance::Awd1),
            (Interrupts::AWD2, AwdInstance::Awd2),
            (Interrupts::AWD3, AwdInstance::Awd3),
        ] {
            if pending.contains(flag) {
                self.clear_flags(flag);
                self.call_awd(awd);
            }
        }
    }
}
