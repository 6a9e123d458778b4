//! Source-level statements: instructions as written (labels unresolved)
//! and assembler directives.
//!
//! These are produced by [`parse_ast`] and consumed by the assembler,
//! which lowers [`AsmInstr`] into [`SimInstr`] once labels are known.
//!
//! [`parse_ast`]: crate::parse::parse_ast
//! [`SimInstr`]: crate::ast::sim::SimInstr

use std::ops::Range;

use super::{CondCode, IOffset, ImmOrReg, Label, Offset, PCOffset, Reg, TrapVect8};

/// A 9-bit PC-relative operand (`BR`, `LD`, `ST`, `LDI`, `STI`, `LEA`).
pub type PCOffset9 = PCOffset<i16, 9>;
/// An 11-bit PC-relative operand (`JSR`).
pub type PCOffset11 = PCOffset<i16, 11>;

/// One statement of an assembly program: any labels on the line,
/// followed by an instruction or directive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Stmt {
    /// Labels defined at this statement's address.
    pub labels: Vec<Label>,
    /// The instruction or directive.
    pub nucleus: StmtKind,
    /// The span of the statement (not including its labels).
    pub span: Range<usize>
}

/// Either an instruction or a directive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StmtKind {
    #[allow(missing_docs)]
    Instr(AsmInstr),
    #[allow(missing_docs)]
    Directive(Directive)
}

/// An instruction as written in source.
///
/// Unlike [`SimInstr`], operands here may be unresolved labels, and the
/// trap aliases (`GETC`, `HALT`, ...) and `RET`/`NOP` are still distinct.
///
/// [`SimInstr`]: crate::ast::sim::SimInstr
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AsmInstr {
    /// `ADD DR, SR1, SR2` or `ADD DR, SR1, imm5`
    Add(Reg, Reg, ImmOrReg<5>),
    /// `AND DR, SR1, SR2` or `AND DR, SR1, imm5`
    And(Reg, Reg, ImmOrReg<5>),
    /// `BR*`, with its condition code
    Br(CondCode, PCOffset9),
    /// `JMP BR`
    Jmp(Reg),
    /// `JSR LABEL`
    Jsr(PCOffset11),
    /// `JSRR BR`
    Jsrr(Reg),
    /// `LD DR, LABEL`
    Ld(Reg, PCOffset9),
    /// `LDI DR, LABEL`
    Ldi(Reg, PCOffset9),
    /// `LDR DR, BR, offset6`
    Ldr(Reg, Reg, IOffset<6>),
    /// `LEA DR, LABEL`
    Lea(Reg, PCOffset9),
    /// `NOT DR, SR`
    Not(Reg, Reg),
    /// `RET` (alias of `JMP R7`)
    Ret,
    /// `RTI`
    Rti,
    /// `ST SR, LABEL`
    St(Reg, PCOffset9),
    /// `STI SR, LABEL`
    Sti(Reg, PCOffset9),
    /// `STR SR, BR, offset6`
    Str(Reg, Reg, IOffset<6>),
    /// `TRAP vect8`
    Trap(TrapVect8),

    // Aliases and traps:
    /// `NOP` (encodes as `BR` with no conditions set)
    Nop,
    /// `GETC` (alias of `TRAP x20`)
    Getc,
    /// `OUT`/`PUTC` (alias of `TRAP x21`)
    Out,
    /// `PUTS` (alias of `TRAP x22`)
    Puts,
    /// `IN` (alias of `TRAP x23`)
    In,
    /// `PUTSP` (alias of `TRAP x24`)
    Putsp,
    /// `HALT` (alias of `TRAP x25`)
    Halt
}
impl std::fmt::Display for AsmInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add(dr, sr1, sr2) => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            Self::And(dr, sr1, sr2) => write!(f, "AND {dr}, {sr1}, {sr2}"),
            Self::Br(cc, off) => {
                write!(f, "BR")?;
                if cc & 0b100 != 0 { write!(f, "n")?; }
                if cc & 0b010 != 0 { write!(f, "z")?; }
                if cc & 0b001 != 0 { write!(f, "p")?; }
                write!(f, " {off}")
            },
            Self::Jmp(br) => write!(f, "JMP {br}"),
            Self::Jsr(off) => write!(f, "JSR {off}"),
            Self::Jsrr(br) => write!(f, "JSRR {br}"),
            Self::Ld(dr, off) => write!(f, "LD {dr}, {off}"),
            Self::Ldi(dr, off) => write!(f, "LDI {dr}, {off}"),
            Self::Ldr(dr, br, off) => write!(f, "LDR {dr}, {br}, {off}"),
            Self::Lea(dr, off) => write!(f, "LEA {dr}, {off}"),
            Self::Not(dr, sr) => write!(f, "NOT {dr}, {sr}"),
            Self::Ret => f.write_str("RET"),
            Self::Rti => f.write_str("RTI"),
            Self::St(sr, off) => write!(f, "ST {sr}, {off}"),
            Self::Sti(sr, off) => write!(f, "STI {sr}, {off}"),
            Self::Str(sr, br, off) => write!(f, "STR {sr}, {br}, {off}"),
            Self::Trap(vect) => write!(f, "TRAP {vect:X}"),
            Self::Nop => f.write_str("NOP"),
            Self::Getc => f.write_str("GETC"),
            Self::Out => f.write_str("OUT"),
            Self::Puts => f.write_str("PUTS"),
            Self::In => f.write_str("IN"),
            Self::Putsp => f.write_str("PUTSP"),
            Self::Halt => f.write_str("HALT"),
        }
    }
}

/// An assembler directive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Directive {
    /// `.orig ADDR`: opens a region starting at the given address.
    Orig(Offset<u16, 16>),
    /// `.fill VALUE` or `.fill LABEL`: emits one word.
    Fill(PCOffset<u16, 16>),
    /// `.blkw N`: reserves `N` words without writing them.
    Blkw(Offset<u16, 16>),
    /// `.stringz "..."`: emits a NUL-terminated string.
    Stringz(String),
    /// `.external LABEL`: declares a label defined in another object file.
    External(Label),
    /// `.end`: closes the current region.
    End
}
impl Directive {
    /// How many words of the current region this directive occupies.
    pub(crate) fn word_len(&self) -> u16 {
        match self {
            Directive::Orig(_)     => 0,
            Directive::Fill(_)     => 1,
            Directive::Blkw(n)     => n.get(),
            // string bytes + NUL terminator
            Directive::Stringz(s)  => (s.len() as u16).wrapping_add(1),
            Directive::External(_) => 0,
            Directive::End         => 0,
        }
    }
}
impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::Orig(addr)   => write!(f, ".orig {addr:X}"),
            Directive::Fill(val)    => write!(f, ".fill {val}"),
            Directive::Blkw(n)      => write!(f, ".blkw {n}"),
            Directive::Stringz(s)   => write!(f, ".stringz {s:?}"),
            Directive::External(lb) => write!(f, ".external {lb}"),
            Directive::End          => f.write_str(".end"),
        }
    }
}
