//! Decoded bytecode instructions.
//!
//! [`SimInstr`] is a closed enum over the fifteen defined LC-3 opcodes.
//! Every machine word is decoded into it exactly once per fetch
//! ([`SimInstr::decode`]), executed by exhaustive match, and can be
//! re-encoded ([`SimInstr::encode`]) or formatted for disassembly views.

use crate::sim::SimErr;

use super::{CondCode, IOffset, ImmOrReg, Offset, Reg, TrapVect8};

const OP_BR:   u16 = 0b0000;
const OP_ADD:  u16 = 0b0001;
const OP_LD:   u16 = 0b0010;
const OP_ST:   u16 = 0b0011;
const OP_JSR:  u16 = 0b0100;
const OP_AND:  u16 = 0b0101;
const OP_LDR:  u16 = 0b0110;
const OP_STR:  u16 = 0b0111;
const OP_RTI:  u16 = 0b1000;
const OP_NOT:  u16 = 0b1001;
const OP_LDI:  u16 = 0b1010;
const OP_STI:  u16 = 0b1011;
const OP_JMP:  u16 = 0b1100;
// 0b1101 is the reserved opcode
const OP_LEA:  u16 = 0b1110;
const OP_TRAP: u16 = 0b1111;

/// A fully decoded instruction.
///
/// Unlike [`AsmInstr`], all label operands have been resolved to numeric
/// offsets and every alias has been lowered to its base instruction
/// (`RET` to `JMP R7`, `HALT` to `TRAP x25`, and so on).
///
/// [`AsmInstr`]: crate::ast::asm::AsmInstr
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimInstr {
    #[allow(missing_docs)]
    Br(CondCode, IOffset<9>),
    #[allow(missing_docs)]
    Add(Reg, Reg, ImmOrReg<5>),
    #[allow(missing_docs)]
    Ld(Reg, IOffset<9>),
    #[allow(missing_docs)]
    St(Reg, IOffset<9>),
    /// Either `JSR pcoffset11` (`Imm`) or `JSRR baseR` (`Reg`).
    Jsr(ImmOrReg<11>),
    #[allow(missing_docs)]
    And(Reg, Reg, ImmOrReg<5>),
    #[allow(missing_docs)]
    Ldr(Reg, Reg, IOffset<6>),
    #[allow(missing_docs)]
    Str(Reg, Reg, IOffset<6>),
    #[allow(missing_docs)]
    Rti,
    #[allow(missing_docs)]
    Not(Reg, Reg),
    #[allow(missing_docs)]
    Ldi(Reg, IOffset<9>),
    #[allow(missing_docs)]
    Sti(Reg, IOffset<9>),
    #[allow(missing_docs)]
    Jmp(Reg),
    #[allow(missing_docs)]
    Lea(Reg, IOffset<9>),
    #[allow(missing_docs)]
    Trap(TrapVect8),
}

/// Reads the bit range `[lo, lo + len)` out of a word.
fn bits(word: u16, lo: u32, len: u32) -> u16 {
    (word >> lo) & ((1 << len) - 1)
}
fn reg(word: u16, lo: u32) -> Reg {
    Reg(bits(word, lo, 3) as u8)
}

impl SimInstr {
    /// The instruction's 4-bit opcode.
    pub fn opcode(&self) -> u16 {
        match self {
            SimInstr::Br(..)   => OP_BR,
            SimInstr::Add(..)  => OP_ADD,
            SimInstr::Ld(..)   => OP_LD,
            SimInstr::St(..)   => OP_ST,
            SimInstr::Jsr(..)  => OP_JSR,
            SimInstr::And(..)  => OP_AND,
            SimInstr::Ldr(..)  => OP_LDR,
            SimInstr::Str(..)  => OP_STR,
            SimInstr::Rti      => OP_RTI,
            SimInstr::Not(..)  => OP_NOT,
            SimInstr::Ldi(..)  => OP_LDI,
            SimInstr::Sti(..)  => OP_STI,
            SimInstr::Jmp(..)  => OP_JMP,
            SimInstr::Lea(..)  => OP_LEA,
            SimInstr::Trap(..) => OP_TRAP,
        }
    }

    /// Encodes this instruction into its machine word.
    pub fn encode(&self) -> u16 {
        let op = self.opcode() << 12;
        match *self {
            SimInstr::Br(cc, off) =>
                op | (u16::from(cc) << 9) | (off.get() as u16 & 0x1FF),
            SimInstr::Add(dr, sr1, sr2) | SimInstr::And(dr, sr1, sr2) => {
                let tail = match sr2 {
                    ImmOrReg::Imm(imm) => (1 << 5) | (imm.get() as u16 & 0x1F),
                    ImmOrReg::Reg(r)   => u16::from(r.0),
                };
                op | (u16::from(dr.0) << 9) | (u16::from(sr1.0) << 6) | tail
            },
            SimInstr::Ld(dr, off) | SimInstr::Ldi(dr, off) | SimInstr::Lea(dr, off) =>
                op | (u16::from(dr.0) << 9) | (off.get() as u16 & 0x1FF),
            SimInstr::St(sr, off) | SimInstr::Sti(sr, off) =>
                op | (u16::from(sr.0) << 9) | (off.get() as u16 & 0x1FF),
            SimInstr::Jsr(target) => match target {
                ImmOrReg::Imm(off) => op | (1 << 11) | (off.get() as u16 & 0x7FF),
                ImmOrReg::Reg(br)  => op | (u16::from(br.0) << 6),
            },
            SimInstr::Ldr(dr, br, off) =>
                op | (u16::from(dr.0) << 9) | (u16::from(br.0) << 6) | (off.get() as u16 & 0x3F),
            SimInstr::Str(sr, br, off) =>
                op | (u16::from(sr.0) << 9) | (u16::from(br.0) << 6) | (off.get() as u16 & 0x3F),
            SimInstr::Rti => op,
            SimInstr::Not(dr, sr) =>
                op | (u16::from(dr.0) << 9) | (u16::from(sr.0) << 6) | 0x3F,
            SimInstr::Jmp(br) =>
                op | (u16::from(br.0) << 6),
            SimInstr::Trap(vect) =>
                op | vect.get(),
        }
    }

    /// Decodes a machine word.
    ///
    /// Fails with [`SimErr::IllegalOpcode`] on the reserved opcode `0b1101`,
    /// and [`SimErr::InvalidInstrFormat`] when reserved operand bits are set.
    pub fn decode(word: u16) -> Result<Self, SimErr> {
        let instr = match bits(word, 12, 4) {
            OP_BR => Self::Br(
                bits(word, 9, 3) as u8,
                Offset::new_trunc(word as i16)
            ),
            OP_ADD | OP_AND => {
                let dr = reg(word, 9);
                let sr1 = reg(word, 6);
                let sr2 = match bits(word, 5, 1) {
                    0 if bits(word, 3, 2) != 0 => return Err(SimErr::InvalidInstrFormat),
                    0 => ImmOrReg::Reg(reg(word, 0)),
                    _ => ImmOrReg::Imm(Offset::new_trunc(word as i16)),
                };
                match bits(word, 12, 4) {
                    OP_ADD => Self::Add(dr, sr1, sr2),
                    _      => Self::And(dr, sr1, sr2),
                }
            },
            OP_LD  => Self::Ld(reg(word, 9), Offset::new_trunc(word as i16)),
            OP_ST  => Self::St(reg(word, 9), Offset::new_trunc(word as i16)),
            OP_JSR => match bits(word, 11, 1) {
                1 => Self::Jsr(ImmOrReg::Imm(Offset::new_trunc(word as i16))),
                _ if bits(word, 9, 2) != 0 || bits(word, 0, 6) != 0 => return Err(SimErr::InvalidInstrFormat),
                _ => Self::Jsr(ImmOrReg::Reg(reg(word, 6))),
            },
            OP_LDR => Self::Ldr(reg(word, 9), reg(word, 6), Offset::new_trunc(word as i16)),
            OP_STR => Self::Str(reg(word, 9), reg(word, 6), Offset::new_trunc(word as i16)),
            OP_RTI => match bits(word, 0, 12) {
                0 => Self::Rti,
                _ => return Err(SimErr::InvalidInstrFormat),
            },
            OP_NOT => match bits(word, 0, 6) {
                0x3F => Self::Not(reg(word, 9), reg(word, 6)),
                _    => return Err(SimErr::InvalidInstrFormat),
            },
            OP_LDI => Self::Ldi(reg(word, 9), Offset::new_trunc(word as i16)),
            OP_STI => Self::Sti(reg(word, 9), Offset::new_trunc(word as i16)),
            OP_JMP => match bits(word, 9, 3) == 0 && bits(word, 0, 6) == 0 {
                true  => Self::Jmp(reg(word, 6)),
                false => return Err(SimErr::InvalidInstrFormat),
            },
            OP_LEA => Self::Lea(reg(word, 9), Offset::new_trunc(word as i16)),
            OP_TRAP => match bits(word, 8, 4) {
                0 => Self::Trap(Offset::new_trunc(word)),
                _ => return Err(SimErr::InvalidInstrFormat),
            },
            _ => return Err(SimErr::IllegalOpcode),
        };

        Ok(instr)
    }
}
impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Br(cc, off) => {
                // BR with no conditions cannot be reached, so render it as NOP
                if cc == 0b000 { return f.write_str("NOP"); }
                write!(f, "BR")?;
                if cc & 0b100 != 0 { write!(f, "n")?; }
                if cc & 0b010 != 0 { write!(f, "z")?; }
                if cc & 0b001 != 0 { write!(f, "p")?; }
                write!(f, " {off}")
            },
            Self::Add(dr, sr1, sr2) => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            Self::Ld(dr, off) => write!(f, "LD {dr}, {off}"),
            Self::St(sr, off) => write!(f, "ST {sr}, {off}"),
            Self::Jsr(ImmOrReg::Imm(off)) => write!(f, "JSR {off}"),
            Self::Jsr(ImmOrReg::Reg(br)) => write!(f, "JSRR {br}"),
            Self::And(dr, sr1, sr2) => write!(f, "AND {dr}, {sr1}, {sr2}"),
            Self::Ldr(dr, br, off) => write!(f, "LDR {dr}, {br}, {off}"),
            Self::Str(sr, br, off) => write!(f, "STR {sr}, {br}, {off}"),
            Self::Rti => f.write_str("RTI"),
            Self::Not(dr, sr) => write!(f, "NOT {dr}, {sr}"),
            Self::Ldi(dr, off) => write!(f, "LDI {dr}, {off}"),
            Self::Sti(sr, off) => write!(f, "STI {sr}, {off}"),
            Self::Jmp(Reg(7)) => f.write_str("RET"),
            Self::Jmp(br) => write!(f, "JMP {br}"),
            Self::Lea(dr, off) => write!(f, "LEA {dr}, {off}"),
            Self::Trap(vect) => write!(f, "TRAP {vect:X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{R0, R1, R6, R7};
    use crate::ast::{ImmOrReg, Offset};
    use crate::sim::SimErr;

    use super::SimInstr;

    #[test]
    fn test_encode_known_words() {
        // AND R0, R0, #0
        assert_eq!(SimInstr::And(R0, R0, ImmOrReg::Imm(Offset::new_trunc(0))).encode(), 0x5020);
        // ADD R1, R1, R6
        assert_eq!(SimInstr::Add(R1, R1, ImmOrReg::Reg(R6)).encode(), 0x1246);
        // BRnp #-5
        assert_eq!(SimInstr::Br(0b101, Offset::new_trunc(-5)).encode(), 0x0BFB);
        // JSR #36
        assert_eq!(SimInstr::Jsr(ImmOrReg::Imm(Offset::new_trunc(36))).encode(), 0x4824);
        // NOT R0, R1
        assert_eq!(SimInstr::Not(R0, R1).encode(), 0x907F);
        // STR R0, R6, #-1
        assert_eq!(SimInstr::Str(R0, R6, Offset::new_trunc(-1)).encode(), 0x71BF);
    }

    #[test]
    fn test_decode_known_words() {
        // ADD R0, R0, #5
        assert_eq!(
            SimInstr::decode(0x1025),
            Ok(SimInstr::Add(R0, R0, ImmOrReg::Imm(Offset::new_trunc(5))))
        );
        // HALT
        assert_eq!(SimInstr::decode(0xF025), Ok(SimInstr::Trap(Offset::new_trunc(0x25))));
        // RET
        assert_eq!(SimInstr::decode(0xC1C0), Ok(SimInstr::Jmp(R7)));
    }

    #[test]
    fn test_decode_illegal() {
        // the reserved opcode
        assert_eq!(SimInstr::decode(0xD000), Err(SimErr::IllegalOpcode));
        assert_eq!(SimInstr::decode(0xDFFF), Err(SimErr::IllegalOpcode));

        // RTI with operand bits set
        assert_eq!(SimInstr::decode(0x8001), Err(SimErr::InvalidInstrFormat));
        // NOT without the trailing ones
        assert_eq!(SimInstr::decode(0x903E), Err(SimErr::InvalidInstrFormat));
        // TRAP with the high vector bits set
        assert_eq!(SimInstr::decode(0xFF25), Err(SimErr::InvalidInstrFormat));
    }
}
