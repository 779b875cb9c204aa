//! Register access layer
//!
//! Registers are addressed by name ([`adc::Reg`]) and bitfields by [`Field`], so the
//! driver never touches memory directly and any backend implementing
//! [`adc::RegisterAccess`] can sit underneath it.

pub mod adc;

/// Bitfield of a register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field<R> {
    pub reg: R,
    pub shift: u8,
    pub width: u8,
}

impl<R> Field<R> {
    pub const fn new(reg: R, shift: u8, width: u8) -> Self {
        Self { reg, shift, width }
    }

    /// Mask of the field in register position
    #[inline(always)]
    pub const fn mask(&self) -> u32 {
        (u32::MAX >> (32 - self.width as u32)) << self.shift
    }

    /// Places `value` in register position, dropping bits wider than the field
    #[inline(always)]
    pub const fn bits(&self, value: u32) -> u32 {
        (value << self.shift) & self.mask()
    }

    /// Extracts the field from a register value
    #[inline(always)]
    pub const fn extract(&self, reg_value: u32) -> u32 {
        (reg_value & self.mask()) >> self.shift
    }
}

macro_rules! fields {
    ($(
        $(#[$attr:meta])*
        pub mod $m:ident: $Reg:ident::$reg:ident {
            $($(#[$fattr:meta])* $f:ident: $shift:literal $(, $width:literal)?;)*
        }
    )*) => {
        $(
            $(#[$attr])*
            pub mod $m {
                use super::$Reg;
                pub type Field = $crate::pacext::Field<$Reg>;
                $(
                    $(#[$fattr])*
                    pub const $f: Field = Field::new($Reg::$reg, $shift, $crate::pacext::fields!(@width $($width)?));
                )*
            }
        )*
    };
    (@width) => { 1 };
    (@width $w:literal) => { $w };
}
pub(crate) use fields;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_masks() {
        let f = Field::new((), 5, 5);
        assert_eq!(f.mask(), 0b11111 << 5);
        assert_eq!(f.bits(0x3F), 0b11111 << 5);
        assert_eq!(f.extract(0xFFFF_FFFF), 0b11111);

        let full = Field::new((), 0, 32);
        assert_eq!(full.mask(), u32::MAX);
        let top = Field::new((), 28, 4);
        assert_eq!(top.mask(), 0xF000_0000);
    }
}
