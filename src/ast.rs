//! The abstract syntax trees used to represent assembly programs.
//!
//! The building blocks in this module are shared between:
//! - [`asm::AsmInstr`] and [`asm::Directive`]: source-level statements, and
//! - [`sim::SimInstr`]: decoded bytecode instructions.

pub mod asm;
pub mod sim;

use std::fmt::Write as _;
use offset_base::OffsetBacking;

/// One of the eight general-purpose registers (`R0`-`R7`).
///
/// Constructed with [`Reg::new`] or by picking a constant out of
/// [`reg_consts`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Constants for each of the eight general-purpose registers.
pub mod reg_consts {
    use super::Reg;

    #[allow(missing_docs)]
    pub const R0: Reg = Reg(0);
    #[allow(missing_docs)]
    pub const R1: Reg = Reg(1);
    #[allow(missing_docs)]
    pub const R2: Reg = Reg(2);
    #[allow(missing_docs)]
    pub const R3: Reg = Reg(3);
    #[allow(missing_docs)]
    pub const R4: Reg = Reg(4);
    #[allow(missing_docs)]
    pub const R5: Reg = Reg(5);
    #[allow(missing_docs)]
    pub const R6: Reg = Reg(6);
    #[allow(missing_docs)]
    pub const R7: Reg = Reg(7);
}
impl Reg {
    /// Creates a register from its number, failing if the number is not 0-7.
    pub fn new(no: u8) -> Option<Reg> {
        (no < 8).then_some(Reg(no))
    }

    /// The register's number (always 0-7).
    pub fn reg_no(self) -> u8 {
        self.0
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
impl From<Reg> for usize {
    // register file indexing
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}

/// A `BR` condition code (bits: n, z, p). `0b111` is the unconditional branch.
pub type CondCode = u8;

/// A signed offset or immediate, fitting in `N` bits.
///
/// Used for `ADD`/`AND`'s imm5, `LDR`/`STR`'s offset6,
/// and numeric PC offsets written directly in source.
pub type IOffset<const N: u32> = Offset<i16, N>;

/// The unsigned 8-bit vector operand of `TRAP`.
pub type TrapVect8 = Offset<u16, 8>;

/// An operand which may be either an immediate value or a register
/// (the last operand of `ADD` and `AND`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ImmOrReg<const N: u32> {
    #[allow(missing_docs)]
    Imm(IOffset<N>),
    #[allow(missing_docs)]
    Reg(Reg)
}
impl<const N: u32> std::fmt::Display for ImmOrReg<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImmOrReg::Imm(imm) => imm.fmt(f),
            ImmOrReg::Reg(reg) => reg.fmt(f),
        }
    }
}

/// An integer value guaranteed to fit within `N` bits of its backing.
///
/// The signedness follows the backing type: `Offset<i16, N>` holds
/// sign-extended values (see [`IOffset`]), `Offset<u16, N>` zero-extended
/// ones (see [`TrapVect8`]).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Offset<OFF, const N: u32>(OFF);

impl<OFF: std::fmt::Display, const N: u32> std::fmt::Display for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('#')?;
        self.0.fmt(f)
    }
}
impl<OFF: std::fmt::LowerHex, const N: u32> std::fmt::LowerHex for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('x')?;
        self.0.fmt(f)
    }
}
impl<OFF: std::fmt::UpperHex, const N: u32> std::fmt::UpperHex for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('x')?;
        self.0.fmt(f)
    }
}

/// The error raised when a value does not fit in an [`Offset`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum OffsetNewErr {
    /// The value does not fit an unsigned integer of the given bit size.
    CannotFitUnsigned(u32),
    /// The value does not fit a signed integer of the given bit size.
    CannotFitSigned(u32)
}
impl std::fmt::Display for OffsetNewErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetNewErr::CannotFitUnsigned(n) => write!(f, "value does not fit in an unsigned {n}-bit integer"),
            OffsetNewErr::CannotFitSigned(n)   => write!(f, "value does not fit in a signed {n}-bit integer"),
        }
    }
}
impl std::error::Error for OffsetNewErr {}
impl crate::err::Error for OffsetNewErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        let msg = match self {
            OffsetNewErr::CannotFitUnsigned(n) => format!("the accepted range is [0, {}]", (1u32 << n) - 1),
            OffsetNewErr::CannotFitSigned(n)   => format!("the accepted range is [{}, {}]", -(1i32 << (n - 1)), (1i32 << (n - 1)) - 1),
        };
        Some(msg.into())
    }
}

mod offset_base {
    use super::OffsetNewErr;

    /// An integer type that can back an [`Offset`].
    ///
    /// [`Offset`]: super::Offset
    pub trait OffsetBacking: Copy + Eq {
        /// Number of bits in this backing (16 for `u16`/`i16`).
        const BITS: u32;

        /// Truncates this value to `bit_size` bits and extends it back out
        /// (sign-extending for signed backings, zero-extending for unsigned).
        fn truncate(self, bit_size: u32) -> Self;

        /// The error raised when a value cannot fit in `bit_size` bits.
        fn does_not_fit(bit_size: u32) -> OffsetNewErr;
    }

    macro_rules! impl_offset_backing {
        ($($Int:ty => $Err:ident),*) => {$(
            impl OffsetBacking for $Int {
                const BITS: u32 = Self::BITS;

                fn truncate(self, bit_size: u32) -> Self {
                    (self << (Self::BITS - bit_size)) >> (Self::BITS - bit_size)
                }
                fn does_not_fit(bit_size: u32) -> OffsetNewErr {
                    OffsetNewErr::$Err(bit_size)
                }
            }
        )*}
    }
    impl_offset_backing! {
        u16 => CannotFitUnsigned,
        i16 => CannotFitSigned
    }
}

impl<OFF: OffsetBacking, const N: u32> Offset<OFF, N> {
    /// Creates a new offset, verifying the value fits within `N` bits.
    ///
    /// # Panics
    ///
    /// Panics if `N` exceeds the bit width of the backing type.
    pub fn new(n: OFF) -> Result<Self, OffsetNewErr> {
        assert!(N <= OFF::BITS, "bit size {N} exceeds size of backing ({})", OFF::BITS);
        match n == n.truncate(N) {
            true  => Ok(Offset(n)),
            false => Err(OFF::does_not_fit(N)),
        }
    }

    /// Creates a new offset from the low `N` bits of the value,
    /// discarding the rest (sign- or zero-extending per the backing).
    ///
    /// # Panics
    ///
    /// Panics if `N` exceeds the bit width of the backing type.
    pub fn new_trunc(n: OFF) -> Self {
        assert!(N <= OFF::BITS, "bit size {N} exceeds size of backing ({})", OFF::BITS);
        Self(n.truncate(N))
    }

    /// The contained value.
    pub fn get(&self) -> OFF {
        self.0
    }
}

/// A PC-relative operand, either numeric or a label awaiting resolution.
///
/// Label operands are resolved to plain [`Offset`] values against the
/// symbol table during the second assembly pass.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum PCOffset<OFF, const N: u32> {
    #[allow(missing_docs)]
    Offset(Offset<OFF, N>),
    #[allow(missing_docs)]
    Label(Label)
}
impl<OFF, const N: u32> std::fmt::Display for PCOffset<OFF, N>
    where Offset<OFF, N>: std::fmt::Display
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PCOffset::Offset(off)  => off.fmt(f),
            PCOffset::Label(label) => label.fmt(f),
        }
    }
}

/// A label: its identifier plus where it starts in source.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Label {
    /// The identifier.
    pub name: String,

    // The end of the span is recoverable from the name's length,
    // so only the start needs to be kept.
    start: usize
}
impl Label {
    /// Creates a new label from its name and source span.
    pub fn new(name: String, span: std::ops::Range<usize>) -> Self {
        debug_assert_eq!(span.start + name.len(), span.end, "label span length should match name length");
        Label { name, start: span.start }
    }

    /// The label's span in source.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..(self.start + self.name.len())
    }
}
impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}
