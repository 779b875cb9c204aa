//! ADC registers, bitfields and the register access capability

use super::fields;
use vcell::VolatileCell;

/// ADC instance, common and device identification registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    Isr,
    Ier,
    Cr,
    Cfgr1,
    Cfgr2,
    Smpr1,
    Smpr2,
    Pcsel,
    /// ADC4 channel selection
    Chselr,
    Sqr1,
    Sqr2,
    Sqr3,
    Sqr4,
    Dr,
    /// ADC4 power register
    Pwrr,
    Jsqr,
    Ofr1,
    Ofr2,
    Ofr3,
    Ofr4,
    Gcomp,
    Jdr1,
    Jdr2,
    Jdr3,
    Jdr4,
    Awd2cr,
    Awd3cr,
    Ltr1,
    Htr1,
    Ltr2,
    Htr2,
    Ltr3,
    Htr3,
    Difsel,
    Calfact,
    Calfact2,
    Or,
    /// Common status
    Csr,
    /// Common control
    Ccr,
    /// Common regular data for dual mode
    Cdr,
    /// Common regular data, master and slave in turn
    Cdr2,
    /// `DBGMCU_IDCODE`
    DbgIdcode,
}

impl Reg {
    pub const COUNT: usize = Reg::DbgIdcode as usize + 1;

    pub const SQR: [Reg; 4] = [Reg::Sqr1, Reg::Sqr2, Reg::Sqr3, Reg::Sqr4];
    pub const OFR: [Reg; 4] = [Reg::Ofr1, Reg::Ofr2, Reg::Ofr3, Reg::Ofr4];
    pub const JDR: [Reg; 4] = [Reg::Jdr1, Reg::Jdr2, Reg::Jdr3, Reg::Jdr4];
    pub const LTR: [Reg; 3] = [Reg::Ltr1, Reg::Ltr2, Reg::Ltr3];
    pub const HTR: [Reg; 3] = [Reg::Htr1, Reg::Htr2, Reg::Htr3];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Register of the common block shared by the instances
    pub const fn is_common(self) -> bool {
        matches!(self, Reg::Csr | Reg::Ccr | Reg::Cdr | Reg::Cdr2)
    }

    /// Offset from the instance base, or from the common base for common registers
    pub const fn offset(self) -> usize {
        use Reg::*;
        match self {
            Isr => 0x00,
            Ier => 0x04,
            Cr => 0x08,
            Cfgr1 => 0x0C,
            Cfgr2 => 0x10,
            Smpr1 => 0x14,
            Smpr2 => 0x18,
            Pcsel => 0x1C,
            Chselr => 0x28,
            Sqr1 => 0x30,
            Sqr2 => 0x34,
            Sqr3 => 0x38,
            Sqr4 => 0x3C,
            Dr => 0x40,
            Pwrr => 0x44,
            Jsqr => 0x4C,
            Ofr1 => 0x60,
            Ofr2 => 0x64,
            Ofr3 => 0x68,
            Ofr4 => 0x6C,
            Gcomp => 0x70,
            Jdr1 => 0x80,
            Jdr2 => 0x84,
            Jdr3 => 0x88,
            Jdr4 => 0x8C,
            Awd2cr => 0xA0,
            Awd3cr => 0xA4,
            Ltr1 => 0xA8,
            Htr1 => 0xAC,
            Ltr2 => 0xB0,
            Htr2 => 0xB4,
            Ltr3 => 0xB8,
            Htr3 => 0xBC,
            Difsel => 0xC0,
            Calfact => 0xC4,
            Calfact2 => 0xC8,
            Or => 0xD0,
            Csr => 0x00,
            Ccr => 0x08,
            Cdr => 0x0C,
            Cdr2 => 0x10,
            DbgIdcode => 0x00,
        }
    }
}

fields! {
    /// Interrupt and status register; write 1 to clear
    pub mod isr: Reg::Isr {
        ADRDY: 0;
        EOSMP: 1;
        EOC: 2;
        EOS: 3;
        OVR: 4;
        JEOC: 5;
        JEOS: 6;
        AWD1: 7;
        AWD2: 8;
        AWD3: 9;
        EOCAL: 11;
        LDORDY: 12;
    }

    pub mod ier: Reg::Ier {
        ADRDYIE: 0;
        EOSMPIE: 1;
        EOCIE: 2;
        EOSIE: 3;
        OVRIE: 4;
        JEOCIE: 5;
        JEOSIE: 6;
        AWD1IE: 7;
        AWD2IE: 8;
        AWD3IE: 9;
    }

    pub mod cr: Reg::Cr {
        ADEN: 0;
        ADDIS: 1;
        ADSTART: 2;
        JADSTART: 3;
        ADSTP: 4;
        JADSTP: 5;
        ADCALLIN: 16;
        CALINDEX: 24, 4;
        ADVREGEN: 28;
        DEEPPWD: 29;
        ADCAL: 31;
    }

    pub mod cfgr1: Reg::Cfgr1 {
        /// Data management; `DMAEN`/`DMACFG` on ADC4
        DMNGT: 0, 2;
        RES: 2, 2;
        /// ADC4 fixed sequencer scan direction
        SCANDIR: 4;
        EXTSEL: 5, 5;
        EXTEN: 10, 2;
        OVRMOD: 12;
        CONT: 13;
        AUTDLY: 14;
        /// ADC4 left alignment
        ALIGN4: 15;
        DISCEN: 16;
        DISCNUM: 17, 3;
        JDISCEN: 20;
        /// ADC4 configurable sequencer
        CHSELRMOD: 21;
        AWD1SGL: 22;
        AWD1EN: 23;
        JAWD1EN: 24;
        JAUTO: 25;
        AWD1CH: 26, 5;
    }

    pub mod cfgr2: Reg::Cfgr2 {
        ROVSE: 0;
        JOVSE: 1;
        /// ADC4 oversampling ratio code
        OVSR4: 2, 3;
        OVSS: 5, 4;
        TROVS: 9;
        ROVSM: 10;
        BULB: 13;
        SWTRIG: 14;
        SMPTRIG: 15;
        OVSR: 16, 10;
        LFTRIG: 27;
        LSHIFT: 28, 4;
        /// ADC4 low frequency trigger
        LFTRIG4: 29;
    }

    /// ADC4 sampling time register
    pub mod smpr4: Reg::Smpr1 {
        SMP1: 0, 3;
        SMP2: 4, 3;
        SMPSEL: 8, 24;
    }

    pub mod sqr1: Reg::Sqr1 {
        L: 0, 4;
    }

    pub mod pwrr: Reg::Pwrr {
        AUTOFF: 0;
        DPD: 1;
        VREFPROT: 2;
        VREFSECSMP: 3;
    }

    pub mod jsqr: Reg::Jsqr {
        JL: 0, 2;
        JEXTSEL: 2, 5;
        JEXTEN: 7, 2;
    }

    pub mod gcomp: Reg::Gcomp {
        GCOMPCOEFF: 0, 14;
        GCOMP: 31;
    }

    pub mod htr1: Reg::Htr1 {
        AWDFILT: 29, 3;
    }

    pub mod calfact: Reg::Calfact {
        CALFACT: 0, 7;
        LATCH_COEF: 24;
        CAPTURE_COEF: 25;
    }

    pub mod or: Reg::Or {
        CHN21SEL: 0;
    }

    pub mod ccr: Reg::Ccr {
        DUAL: 0, 5;
        DELAY: 8, 4;
        DAMDF: 14, 2;
        PRESC: 18, 4;
        VREFEN: 22;
        VSENSESEL: 23;
        VBATEN: 24;
    }

    pub mod cdr: Reg::Cdr {
        RDATA_MST: 0, 16;
        RDATA_SLV: 16, 16;
    }

    pub mod idcode: Reg::DbgIdcode {
        DEV_ID: 0, 12;
        REV_ID: 16, 16;
    }
}

/// Field of any register
pub type Field = super::Field<Reg>;

/// `OFRx` fields
pub mod ofr {
    use super::{Field, Reg};

    pub const fn offset(ofr: Reg) -> Field {
        Field::new(ofr, 0, 24)
    }
    pub const fn posoff(ofr: Reg) -> Field {
        Field::new(ofr, 24, 1)
    }
    pub const fn usat(ofr: Reg) -> Field {
        Field::new(ofr, 25, 1)
    }
    pub const fn ssat(ofr: Reg) -> Field {
        Field::new(ofr, 26, 1)
    }
    pub const fn channel(ofr: Reg) -> Field {
        Field::new(ofr, 27, 5)
    }
}

/// Regular sequence rank `rank` (1..=16) in `SQRx`
pub const fn sqr_rank(rank: u8) -> Field {
    let r = rank as usize - 1;
    if r < 4 {
        Field::new(Reg::Sqr1, (6 * (r + 1)) as u8, 5)
    } else {
        let r = r - 4;
        Field::new(Reg::SQR[1 + r / 5], (6 * (r % 5)) as u8, 5)
    }
}

/// Injected sequence rank `rank` (1..=4) in `JSQR`
pub const fn jsqr_rank(rank: u8) -> Field {
    Field::new(Reg::Jsqr, 9 + 6 * (rank - 1), 5)
}

/// ADC4 configurable sequence rank `rank` (1..=8) in `CHSELR`
pub const fn chselr_rank(rank: u8) -> Field {
    Field::new(Reg::Chselr, 4 * (rank - 1), 4)
}

/// Sampling time of `channel` on a standard instance
pub const fn smpr_channel(channel: u8) -> Field {
    if channel < 10 {
        Field::new(Reg::Smpr1, 3 * channel, 3)
    } else {
        Field::new(Reg::Smpr2, 3 * (channel - 10), 3)
    }
}

/// Raw access to the ADC registers
///
/// Clearing `ISR` flags is done by writing ones, as on hardware.
pub trait RegisterAccess {
    fn read(&self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);

    /// Bus address of `reg`, used as DMA source
    fn data_address(&self, reg: Reg) -> u32;

    #[inline(always)]
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let v = self.read(reg);
        self.write(reg, f(v));
    }

    #[inline(always)]
    fn set_bits(&mut self, reg: Reg, mask: u32) {
        self.modify(reg, |r| r | mask);
    }

    #[inline(always)]
    fn clear_bits(&mut self, reg: Reg, mask: u32) {
        self.modify(reg, |r| r & !mask);
    }

    #[inline(always)]
    fn read_field(&self, field: Field) -> u32 {
        field.extract(self.read(field.reg))
    }

    #[inline(always)]
    fn write_field(&mut self, field: Field, value: u32) {
        self.modify(field.reg, |r| (r & !field.mask()) | field.bits(value));
    }

    #[inline(always)]
    fn is_set(&self, field: Field) -> bool {
        self.read_field(field) != 0
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }

    fn data_address(&self, reg: Reg) -> u32 {
        (**self).data_address(reg)
    }
}

/// Memory mapped ADC registers
pub struct Mmio {
    base: usize,
    common: usize,
}

impl Mmio {
    pub const ADC1: usize = 0x4202_8000;
    pub const ADC2: usize = 0x4202_8100;
    pub const ADC12_COMMON: usize = 0x4202_8300;
    pub const ADC4: usize = 0x4602_1000;
    pub const ADC4_COMMON: usize = 0x4602_1300;
    pub const DBGMCU_IDCODE: usize = 0xE004_4000;

    /// Registers of the instance at `base`, sharing the common block at `common`
    ///
    /// # Safety
    ///
    /// Both addresses must point at ADC register blocks, and no other owner may
    /// access the instance registers while this value exists.
    pub const unsafe fn new(base: usize, common: usize) -> Self {
        Self { base, common }
    }

    /// # Safety
    ///
    /// See [`Mmio::new`].
    pub const unsafe fn adc1() -> Self {
        Self::new(Self::ADC1, Self::ADC12_COMMON)
    }

    /// # Safety
    ///
    /// See [`Mmio::new`].
    pub const unsafe fn adc2() -> Self {
        Self::new(Self::ADC2, Self::ADC12_COMMON)
    }

    /// # Safety
    ///
    /// See [`Mmio::new`].
    pub const unsafe fn adc4() -> Self {
        Self::new(Self::ADC4, Self::ADC4_COMMON)
    }

    fn address(&self, reg: Reg) -> usize {
        if reg == Reg::DbgIdcode {
            Self::DBGMCU_IDCODE
        } else if reg.is_common() {
            self.common + reg.offset()
        } else {
            self.base + reg.offset()
        }
    }

    fn cell(&self, reg: Reg) -> &VolatileCell<u32> {
        // Valid register address by the contract of `new`
        unsafe { &*(self.address(reg) as *const VolatileCell<u32>) }
    }
}

impl RegisterAccess for Mmio {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u32 {
        self.cell(reg).get()
    }

    #[inline(always)]
    fn write(&mut self, reg: Reg, value: u32) {
        self.cell(reg).set(value)
    }

    fn data_address(&self, reg: Reg) -> u32 {
        self.address(reg) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_rank_fields() {
        assert_eq!(sqr_rank(1), Field::new(Reg::Sqr1, 6, 5));
        assert_eq!(sqr_rank(4), Field::new(Reg::Sqr1, 24, 5));
        assert_eq!(sqr_rank(5), Field::new(Reg::Sqr2, 0, 5));
        assert_eq!(sqr_rank(10), Field::new(Reg::Sqr3, 0, 5));
        assert_eq!(sqr_rank(16), Field::new(Reg::Sqr4, 6, 5));
        assert_eq!(jsqr_rank(4), Field::new(Reg::Jsqr, 27, 5));
        assert_eq!(smpr_channel(19), Field::new(Reg::Smpr2, 27, 3));
    }

    #[test]
    fn common_registers() {
        assert!(Reg::Ccr.is_common());
        assert!(!Reg::Dr.is_common());
        assert_eq!(Reg::COUNT, 42);
        assert_eq!(cr::ADCAL.mask(), 1 << 31);
        assert_eq!(ccr::PRESC.mask(), 0xF << 18);
    }
}
