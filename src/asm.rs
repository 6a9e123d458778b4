//! Assembling statement ASTs into object files.
//!
//! Assembly is two passes:
//! 1. [`SymbolTable::new`]: walk the statements with a location counter,
//!    defining labels and validating region layout (`.orig`/`.end`
//!    nesting, wraparound, the memory-mapped I/O page), and
//! 2. pass 2 (via [`assemble`]/[`assemble_debug`]): encode each
//!    statement into words, resolving label operands against the
//!    symbol table.
//!
//! [`assemble_debug`] additionally attaches debug symbols (a line ↔
//! address map and the original source) so a debugger can map addresses
//! back to source positions.
//!
//! ```
//! use lc3_forge::parse::parse_ast;
//! use lc3_forge::asm::assemble;
//!
//! let ast = parse_ast(".orig x3000\nAND R0, R0, #0\nHALT\n.end").unwrap();
//! let obj = assemble(ast).unwrap();
//! assert_eq!(obj.addr_iter().next(), Some((0x3000, Some(0x5020))));
//! ```

pub mod bin;
pub mod encoding;

use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::ast::asm::{AsmInstr, Directive, Stmt, StmtKind};
use crate::ast::sim::SimInstr;
use crate::ast::{IOffset, ImmOrReg, Label, Offset, OffsetNewErr, PCOffset, Reg};
use crate::err::ErrSpan;

/// Start of the memory-mapped I/O page. Object files may not write here.
const IO_START: u16 = 0xFE00;

/// The kinds of errors that can occur during assembly.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AsmErrKind {
    /// A statement appeared outside of a `.orig`/`.end` region.
    OutsideRegion,
    /// A label was attached to an address-less statement (e.g. `.orig`).
    UndetLabelAddr,
    /// A `.orig` appeared inside an open region.
    NestedRegions,
    /// A `.end` appeared with no open region.
    DanglingEnd,
    /// A region was opened but never closed with `.end`.
    UnclosedRegion,
    /// A region extends past address `xFFFF`.
    WrappingRegion,
    /// A region writes into the memory-mapped I/O page.
    RegionInIO,
    /// Two regions in the same file claim overlapping address ranges.
    OverlappingRegions,
    /// The same label was defined more than once.
    DuplicateLabel(String),
    /// A label operand is not defined anywhere in the file.
    CouldNotFindLabel(String),
    /// An external label was used as a PC-relative operand.
    ExternalOffset(String),
    /// A resolved label operand does not fit in its offset field.
    OffsetRange(OffsetNewErr),
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideRegion        => f.write_str("statement is outside of a region"),
            Self::UndetLabelAddr       => f.write_str("label has no determinable address"),
            Self::NestedRegions        => f.write_str(".orig directive inside of a region"),
            Self::DanglingEnd          => f.write_str(".end directive without an open region"),
            Self::UnclosedRegion       => f.write_str("region does not have an .end directive"),
            Self::WrappingRegion       => f.write_str("region extends past the end of memory"),
            Self::RegionInIO           => f.write_str("region writes into the memory-mapped I/O page"),
            Self::OverlappingRegions   => f.write_str("regions overlap in memory"),
            Self::DuplicateLabel(lb)   => write!(f, "label {lb} is defined multiple times"),
            Self::CouldNotFindLabel(lb) => write!(f, "label {lb} could not be found"),
            Self::ExternalOffset(lb)   => write!(f, "external label {lb} cannot be used as an offset"),
            Self::OffsetRange(e)       => e.fmt(f),
        }
    }
}

/// An error that occurred during assembly, with its source location(s).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErr {
    /// What went wrong.
    pub kind: AsmErrKind,
    span: ErrSpan
}
impl AsmErr {
    pub(crate) fn new(kind: AsmErrKind, span: impl Into<ErrSpan>) -> Self {
        AsmErr { kind, span: span.into() }
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone())
    }
    fn help(&self) -> Option<Cow<str>> {
        let msg: Cow<str> = match &self.kind {
            AsmErrKind::OutsideRegion      => "wrap this statement between .orig and .end directives".into(),
            AsmErrKind::UndetLabelAddr     => "move this label inside of a region".into(),
            AsmErrKind::NestedRegions      => "close the previous region with .end first".into(),
            AsmErrKind::DanglingEnd        => "open a region with .orig first".into(),
            AsmErrKind::UnclosedRegion     => "add an .end directive after this region".into(),
            AsmErrKind::WrappingRegion     => format!("regions must fit within addresses x0000 to x{:04X}", u16::MAX).into(),
            AsmErrKind::RegionInIO         => format!("addresses x{IO_START:04X} and above are reserved for I/O").into(),
            AsmErrKind::OverlappingRegions => "change the .orig of one of these regions".into(),
            AsmErrKind::CouldNotFindLabel(_) => "a label must be defined somewhere in the file (or declared .external)".into(),
            AsmErrKind::DuplicateLabel(_)  => "remove one of these definitions".into(),
            AsmErrKind::ExternalOffset(_)  => "external labels can only be referenced with .fill".into(),
            AsmErrKind::OffsetRange(e)     => return crate::err::Error::help(e),
        };
        Some(msg)
    }
}

/* SOURCE INFO */

/// Position data about the original source of an object file.
///
/// This enables byte span ↔ (line, column) conversions, which debuggers
/// use to report source ranges.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceInfo {
    src: String,
    /// Byte index of every `\n` in `src`.
    nl_indices: Vec<usize>
}
impl SourceInfo {
    fn new(src: &str) -> Self {
        let nl_indices = src.char_indices()
            .filter_map(|(i, c)| (c == '\n').then_some(i))
            .collect();
        SourceInfo { src: src.to_string(), nl_indices }
    }

    /// The full original source.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.nl_indices.len() + 1
    }

    /// The byte span of the given (0-indexed) line,
    /// excluding its line terminator.
    pub fn line_span(&self, line: usize) -> Option<Range<usize>> {
        let start = match line.checked_sub(1) {
            Some(prev) => self.nl_indices.get(prev)? + 1,
            None => 0,
        };
        let mut end = self.nl_indices.get(line).copied().unwrap_or(self.src.len());
        if self.src[start..end].ends_with('\r') {
            end -= 1;
        }
        Some(start..end)
    }

    /// Converts a byte index into a (line, column) pair (both 0-indexed).
    pub fn get_pos_pair(&self, index: usize) -> (usize, usize) {
        let line = self.nl_indices.partition_point(|&nl| nl < index);
        let line_start = match line.checked_sub(1) {
            Some(prev) => self.nl_indices[prev] + 1,
            None => 0,
        };
        (line, index - line_start)
    }

    /// The (0-indexed) line containing the given byte index.
    fn line_of(&self, index: usize) -> usize {
        self.nl_indices.partition_point(|&nl| nl < index)
    }
}

/// Mapping between source lines and the contiguous run of addresses
/// each line assembled into.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub(crate) struct LineSymbolMap {
    /// line → (first address, number of words)
    map: BTreeMap<usize, (u16, u16)>
}
impl LineSymbolMap {
    fn insert(&mut self, line: usize, addr: u16, len: u16) {
        if len != 0 {
            self.map.insert(line, (addr, len));
        }
    }

    fn lookup_line(&self, line: usize) -> Option<u16> {
        self.map.get(&line).map(|&(addr, _)| addr)
    }
    fn rev_lookup_line(&self, addr: u16) -> Option<usize> {
        self.map.iter()
            .find(|(_, &(start, len))| (start..start.wrapping_add(len)).contains(&addr))
            .map(|(&line, _)| line)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, u16, u16)> + '_ {
        self.map.iter().map(|(&line, &(addr, len))| (line, addr, len))
    }

    pub(crate) fn from_iter(it: impl IntoIterator<Item = (usize, u16, u16)>) -> Self {
        let map = it.into_iter()
            .filter(|&(_, _, len)| len != 0)
            .map(|(line, addr, len)| (line, (addr, len)))
            .collect();
        LineSymbolMap { map }
    }
}

/// Debug symbols: line mapping plus the original source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct DebugSymbols {
    pub(crate) line_map: LineSymbolMap,
    pub(crate) src_info: SourceInfo
}

/// Data about one defined (or externally declared) label.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct SymbolData {
    /// The label's address. Meaningless while `external` is set.
    pub(crate) addr: u16,
    /// Where the label's definition starts in source.
    pub(crate) src_start: usize,
    /// Whether this label is defined in another object file.
    pub(crate) external: bool
}

/// The symbol table of one object file (or one linked image).
///
/// Maps labels to addresses (and back), tracks `.external` declarations
/// and the relocation sites that reference them, and optionally carries
/// debug symbols for source mapping.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SymbolTable {
    pub(crate) label_map: BTreeMap<String, SymbolData>,
    /// address of a `.fill` site → the external label written there.
    pub(crate) rel_map: BTreeMap<u16, String>,
    pub(crate) debug_symbols: Option<DebugSymbols>
}
impl SymbolTable {
    /// Runs the first assembly pass over the statements.
    ///
    /// If `debug_src` is provided, line debug symbols are also computed.
    pub fn new(stmts: &[Stmt], debug_src: Option<&str>) -> Result<Self, AsmErr> {
        let mut table = SymbolTable::default();
        let src_info = debug_src.map(SourceInfo::new);
        let mut line_map = LineSymbolMap::default();

        let mut lc: Option<LocCtr> = None;
        // .fill LABEL sites, checked once all .external declarations
        // have been seen
        let mut fills: Vec<(u16, Label)> = vec![];

        for stmt in stmts {
            match &stmt.nucleus {
                StmtKind::Directive(Directive::Orig(addr)) => {
                    if lc.is_some() {
                        return Err(AsmErr::new(AsmErrKind::NestedRegions, stmt.span.clone()));
                    }
                    if let Some(label) = stmt.labels.first() {
                        return Err(AsmErr::new(AsmErrKind::UndetLabelAddr, label.span()));
                    }
                    lc = Some(LocCtr::new(addr.get()));
                },
                StmtKind::Directive(Directive::End) => {
                    let Some(ctr) = lc.take() else {
                        return Err(AsmErr::new(AsmErrKind::DanglingEnd, stmt.span.clone()));
                    };
                    // labels on .end mark the end of the region
                    for label in &stmt.labels {
                        table.define_label(label, ctr.addr())?;
                    }
                },
                StmtKind::Directive(Directive::External(label)) => {
                    if let Some(label) = stmt.labels.first() {
                        return Err(AsmErr::new(AsmErrKind::UndetLabelAddr, label.span()));
                    }
                    table.declare_external(label)?;
                },
                nucleus => {
                    let Some(ctr) = lc.as_mut() else {
                        return Err(AsmErr::new(AsmErrKind::OutsideRegion, stmt.span.clone()));
                    };
                    let addr = ctr.addr();

                    for label in &stmt.labels {
                        table.define_label(label, addr)?;
                    }

                    let len = match nucleus {
                        StmtKind::Instr(_) => 1,
                        StmtKind::Directive(d) => d.word_len(),
                    };
                    if let StmtKind::Directive(Directive::Fill(PCOffset::Label(label))) = nucleus {
                        fills.push((addr, label.clone()));
                    }
                    ctr.advance(len, &stmt.span)?;

                    if let Some(info) = &src_info {
                        line_map.insert(info.line_of(stmt.span.start), addr, len);
                    }
                }
            }
        }
        if lc.is_some() {
            // point at the end of the source
            let end = stmts.last().map_or(0, |s| s.span.end);
            return Err(AsmErr::new(AsmErrKind::UnclosedRegion, end..end));
        }

        for (addr, label) in fills {
            match table.label_map.get(&label.name) {
                Some(data) if data.external => {
                    table.rel_map.insert(addr, label.name);
                },
                // locally defined, resolved in pass 2
                Some(_) => {},
                None => return Err(AsmErr::new(AsmErrKind::CouldNotFindLabel(label.name.clone()), label.span())),
            }
        }

        table.debug_symbols = src_info.map(|src_info| DebugSymbols { line_map, src_info });
        Ok(table)
    }

    fn define_label(&mut self, label: &Label, addr: u16) -> Result<(), AsmErr> {
        match self.label_map.entry(label.name.clone()) {
            Entry::Vacant(e) => {
                e.insert(SymbolData { addr, src_start: label.span().start, external: false });
                Ok(())
            },
            Entry::Occupied(e) => {
                let prev = *e.get();
                let prev_span = prev.src_start..(prev.src_start + label.name.len());
                Err(AsmErr::new(
                    AsmErrKind::DuplicateLabel(label.name.clone()),
                    (prev_span, label.span())
                ))
            }
        }
    }

    fn declare_external(&mut self, label: &Label) -> Result<(), AsmErr> {
        match self.label_map.entry(label.name.clone()) {
            Entry::Vacant(e) => {
                e.insert(SymbolData { addr: 0, src_start: label.span().start, external: true });
                Ok(())
            },
            // repeating a declaration is harmless
            Entry::Occupied(e) if e.get().external => Ok(()),
            Entry::Occupied(e) => {
                let prev = *e.get();
                let prev_span = prev.src_start..(prev.src_start + label.name.len());
                Err(AsmErr::new(
                    AsmErrKind::DuplicateLabel(label.name.clone()),
                    (prev_span, label.span())
                ))
            }
        }
    }

    /// The address of a label, if it is defined in this file.
    pub fn lookup_label(&self, label: &str) -> Option<u16> {
        self.label_map.get(label)
            .filter(|data| !data.external)
            .map(|data| data.addr)
    }

    /// The label defined at the given address, if any.
    pub fn rev_lookup_label(&self, addr: u16) -> Option<&str> {
        self.label_map.iter()
            .find(|(_, data)| !data.external && data.addr == addr)
            .map(|(name, _)| &**name)
    }

    /// Whether the given label was declared `.external`
    /// (and has not been resolved by linking).
    pub fn is_external(&self, label: &str) -> bool {
        self.label_map.get(label).is_some_and(|data| data.external)
    }

    /// The source span of a label's definition.
    pub fn get_label_source(&self, label: &str) -> Option<Range<usize>> {
        let data = self.label_map.get(label)?;
        Some(data.src_start..(data.src_start + label.len()))
    }

    /// Iterates over all labels: `(name, address, is_external)`.
    pub fn label_iter(&self) -> impl Iterator<Item = (&str, u16, bool)> + '_ {
        self.label_map.iter()
            .map(|(name, data)| (&**name, data.addr, data.external))
    }

    /// The first address assembled from the given (0-indexed) source line.
    pub fn lookup_line(&self, line: usize) -> Option<u16> {
        self.debug_symbols.as_ref()?.line_map.lookup_line(line)
    }

    /// The (0-indexed) source line that assembled into the given address.
    pub fn rev_lookup_line(&self, addr: u16) -> Option<usize> {
        self.debug_symbols.as_ref()?.line_map.rev_lookup_line(addr)
    }

    /// Position data about the original source, if this table was
    /// produced with debug symbols.
    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.debug_symbols.as_ref().map(|d| &d.src_info)
    }
}

/// Location counter for one region.
struct LocCtr {
    start: u16,
    /// One past the last reserved address. Kept as u32 so wraparound
    /// is detectable.
    end: u32
}
impl LocCtr {
    fn new(start: u16) -> Self {
        LocCtr { start, end: u32::from(start) }
    }

    fn addr(&self) -> u16 {
        self.end as u16
    }

    fn advance(&mut self, words: u16, span: &Range<usize>) -> Result<(), AsmErr> {
        if words == 0 { return Ok(()) }

        let end = self.end + u32::from(words);
        if end > 0x1_0000 {
            return Err(AsmErr::new(AsmErrKind::WrappingRegion, span.clone()));
        }
        if end > u32::from(IO_START) {
            return Err(AsmErr::new(AsmErrKind::RegionInIO, span.clone()));
        }
        self.end = end;
        Ok(())
    }
}

/* PASS 2 */

/// Assembles statements into an object file without debug symbols.
pub fn assemble(ast: Vec<Stmt>) -> Result<ObjectFile, AsmErr> {
    ObjectFile::new(ast, None)
}

/// Assembles statements into an object file, attaching debug symbols
/// computed from the original source.
pub fn assemble_debug(ast: Vec<Stmt>, src: &str) -> Result<ObjectFile, AsmErr> {
    ObjectFile::new(ast, Some(src))
}

/// An assembled (or linked) program image.
///
/// Holds a map of contiguous memory regions (`None` words are reserved
/// by `.blkw` but never written) and the symbol table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectFile {
    /// region start → the words of the region.
    pub(crate) block_map: BTreeMap<u16, Vec<Option<u16>>>,
    pub(crate) sym: SymbolTable
}
impl ObjectFile {
    fn new(ast: Vec<Stmt>, debug_src: Option<&str>) -> Result<Self, AsmErr> {
        let sym = SymbolTable::new(&ast, debug_src)?;

        // (orig span, start, words)
        let mut blocks: Vec<(Range<usize>, u16, Vec<Option<u16>>)> = vec![];
        let mut current: Option<(Range<usize>, u16, Vec<Option<u16>>)> = None;

        for stmt in ast {
            match stmt.nucleus {
                StmtKind::Directive(Directive::Orig(addr)) => {
                    current = Some((stmt.span, addr.get(), vec![]));
                },
                StmtKind::Directive(Directive::End) => {
                    if let Some(block) = current.take() {
                        if !block.2.is_empty() {
                            blocks.push(block);
                        }
                    }
                },
                StmtKind::Directive(Directive::External(_)) => {},
                nucleus => {
                    // pass 1 verified statements only occur within regions
                    let Some((_, start, words)) = current.as_mut() else {
                        return Err(AsmErr::new(AsmErrKind::OutsideRegion, stmt.span));
                    };
                    let lc = start.wrapping_add(words.len() as u16);

                    match nucleus {
                        StmtKind::Instr(instr) => {
                            // PC-relative operands are measured from the incremented PC
                            let sim = instr.into_sim_instr(lc.wrapping_add(1), &sym)?;
                            words.push(Some(sim.encode()));
                        },
                        StmtKind::Directive(directive) => directive.write_words(lc, &sym, words)?,
                    }
                }
            }
        }

        // within-file overlap check
        blocks.sort_by_key(|&(_, start, _)| start);
        for pair in blocks.windows(2) {
            let [(span_a, start_a, words_a), (span_b, start_b, _)] = pair else { continue };
            let end_a = u32::from(*start_a) + words_a.len() as u32;
            if u32::from(*start_b) < end_a {
                return Err(AsmErr::new(AsmErrKind::OverlappingRegions, (span_a.clone(), span_b.clone())));
            }
        }

        let block_map = blocks.into_iter()
            .map(|(_, start, words)| (start, words))
            .collect();
        Ok(ObjectFile { block_map, sym })
    }

    /// This object file's symbol table.
    pub fn symbol_table(&self) -> &SymbolTable {
        &self.sym
    }

    /// Iterates over the regions of this object file: `(start, words)`.
    pub fn block_iter(&self) -> impl Iterator<Item = (u16, &[Option<u16>])> + '_ {
        self.block_map.iter().map(|(&start, words)| (start, &**words))
    }

    /// Iterates over every reserved address: `(addr, word)`,
    /// where the word is `None` for unwritten `.blkw` slots.
    pub fn addr_iter(&self) -> impl Iterator<Item = (u16, Option<u16>)> + '_ {
        self.block_map.iter().flat_map(|(&start, words)| {
            words.iter().enumerate()
                .map(move |(i, &w)| (start.wrapping_add(i as u16), w))
        })
    }

    /// The names of external labels which have not yet been resolved
    /// by linking.
    pub fn unresolved_externals(&self) -> impl Iterator<Item = &str> + '_ {
        self.sym.label_map.iter()
            .filter(|(_, data)| data.external)
            .map(|(name, _)| &**name)
    }
}

impl AsmInstr {
    /// Lowers a source instruction into bytecode, resolving label
    /// operands against the symbol table.
    ///
    /// `pc` is the incremented program counter (the instruction's
    /// address plus one), which PC-relative operands are measured from.
    pub(crate) fn into_sim_instr(self, pc: u16, sym: &SymbolTable) -> Result<SimInstr, AsmErr> {
        match self {
            AsmInstr::Add(dr, sr1, sr2) => Ok(SimInstr::Add(dr, sr1, sr2)),
            AsmInstr::And(dr, sr1, sr2) => Ok(SimInstr::And(dr, sr1, sr2)),
            AsmInstr::Br(cc, off)   => Ok(SimInstr::Br(cc, resolve_offset(off, pc, sym)?)),
            AsmInstr::Jmp(br)       => Ok(SimInstr::Jmp(br)),
            AsmInstr::Jsr(off)      => Ok(SimInstr::Jsr(ImmOrReg::Imm(resolve_offset(off, pc, sym)?))),
            AsmInstr::Jsrr(br)      => Ok(SimInstr::Jsr(ImmOrReg::Reg(br))),
            AsmInstr::Ld(dr, off)   => Ok(SimInstr::Ld(dr, resolve_offset(off, pc, sym)?)),
            AsmInstr::Ldi(dr, off)  => Ok(SimInstr::Ldi(dr, resolve_offset(off, pc, sym)?)),
            AsmInstr::Ldr(dr, br, off) => Ok(SimInstr::Ldr(dr, br, off)),
            AsmInstr::Lea(dr, off)  => Ok(SimInstr::Lea(dr, resolve_offset(off, pc, sym)?)),
            AsmInstr::Not(dr, sr)   => Ok(SimInstr::Not(dr, sr)),
            AsmInstr::Ret           => Ok(SimInstr::Jmp(Reg(7))),
            AsmInstr::Rti           => Ok(SimInstr::Rti),
            AsmInstr::St(sr, off)   => Ok(SimInstr::St(sr, resolve_offset(off, pc, sym)?)),
            AsmInstr::Sti(sr, off)  => Ok(SimInstr::Sti(sr, resolve_offset(off, pc, sym)?)),
            AsmInstr::Str(sr, br, off) => Ok(SimInstr::Str(sr, br, off)),
            AsmInstr::Trap(vect)    => Ok(SimInstr::Trap(vect)),
            AsmInstr::Nop           => Ok(SimInstr::Br(0b000, Offset::new_trunc(0))),
            AsmInstr::Getc          => Ok(SimInstr::Trap(Offset::new_trunc(0x20))),
            AsmInstr::Out           => Ok(SimInstr::Trap(Offset::new_trunc(0x21))),
            AsmInstr::Puts          => Ok(SimInstr::Trap(Offset::new_trunc(0x22))),
            AsmInstr::In            => Ok(SimInstr::Trap(Offset::new_trunc(0x23))),
            AsmInstr::Putsp         => Ok(SimInstr::Trap(Offset::new_trunc(0x24))),
            AsmInstr::Halt          => Ok(SimInstr::Trap(Offset::new_trunc(0x25))),
        }
    }
}

/// Resolves a PC-relative operand into a concrete offset.
fn resolve_offset<const N: u32>(off: PCOffset<i16, N>, pc: u16, sym: &SymbolTable) -> Result<IOffset<N>, AsmErr> {
    match off {
        PCOffset::Offset(off) => Ok(off),
        PCOffset::Label(label) => {
            if sym.is_external(&label.name) {
                return Err(AsmErr::new(AsmErrKind::ExternalOffset(label.name.clone()), label.span()));
            }
            let Some(addr) = sym.lookup_label(&label.name) else {
                return Err(AsmErr::new(AsmErrKind::CouldNotFindLabel(label.name.clone()), label.span()));
            };

            IOffset::new(addr.wrapping_sub(pc) as i16)
                .map_err(|e| AsmErr::new(AsmErrKind::OffsetRange(e), label.span()))
        }
    }
}

impl Directive {
    /// Emits this directive's words into the current region
    /// (pass 2; `.orig`, `.end`, and `.external` are handled by the caller).
    fn write_words(self, lc: u16, sym: &SymbolTable, words: &mut Vec<Option<u16>>) -> Result<(), AsmErr> {
        match self {
            Directive::Fill(PCOffset::Offset(value)) => words.push(Some(value.get())),
            Directive::Fill(PCOffset::Label(label)) => {
                if sym.rel_map.contains_key(&lc) {
                    // external reference: placeholder until the linker patches it
                    words.push(Some(0));
                } else {
                    let Some(addr) = sym.lookup_label(&label.name) else {
                        return Err(AsmErr::new(AsmErrKind::CouldNotFindLabel(label.name.clone()), label.span()));
                    };
                    words.push(Some(addr));
                }
            },
            Directive::Blkw(n) => words.extend(std::iter::repeat(None).take(usize::from(n.get()))),
            Directive::Stringz(s) => {
                words.extend(s.bytes().map(|b| Some(u16::from(b))));
                words.push(Some(0));
            },
            Directive::Orig(_) | Directive::External(_) | Directive::End => {},
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::parse::parse_ast;

    use super::{assemble, assemble_debug, AsmErr, AsmErrKind, ObjectFile};

    pub(crate) fn assemble_src(src: &str) -> Result<ObjectFile, AsmErr> {
        let ast = parse_ast(src).unwrap_or_else(|e| panic!("{src:?} should have parsed: {e}"));
        assemble(ast)
    }
    fn assemble_src_debug(src: &str) -> Result<ObjectFile, AsmErr> {
        let ast = parse_ast(src).unwrap_or_else(|e| panic!("{src:?} should have parsed: {e}"));
        assemble_debug(ast, src)
    }
    fn assert_asm_fail(result: Result<ObjectFile, AsmErr>, kind: AsmErrKind) {
        match result {
            Ok(_) => panic!("program unexpectedly assembled"),
            Err(e) => assert_eq!(e.kind, kind),
        }
    }

    #[test]
    fn test_basic_assemble() {
        let obj = assemble_src("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #5
                HALT
            .end
        ").unwrap();

        let words: Vec<_> = obj.addr_iter().collect();
        assert_eq!(words, vec![
            (0x3000, Some(0x5020)),
            (0x3001, Some(0x1025)),
            (0x3002, Some(0xF025)),
        ]);
    }

    #[test]
    fn test_label_resolution() {
        let obj = assemble_src("
            .orig x3000
                LD R0, VALUE
                BRz SKIP
                ADD R0, R0, #-1
                SKIP: HALT
                VALUE: .fill #100
            .end
        ").unwrap();

        let sym = obj.symbol_table();
        assert_eq!(sym.lookup_label("SKIP"), Some(0x3003));
        assert_eq!(sym.lookup_label("VALUE"), Some(0x3004));
        assert_eq!(sym.rev_lookup_label(0x3004), Some("VALUE"));

        let words: Vec<_> = obj.addr_iter().collect();
        // LD R0, VALUE: offset = x3004 - x3001 = 3
        assert_eq!(words[0], (0x3000, Some(0x2003)));
        // BRz SKIP: offset = x3003 - x3002 = 1
        assert_eq!(words[1], (0x3001, Some(0x0401)));
        assert_eq!(words[4], (0x3004, Some(100)));
    }

    #[test]
    fn test_directives_emit() {
        let obj = assemble_src(r#"
            .orig x4000
                .fill x1234
                .blkw 3
                .stringz "hi"
            .end
        "#).unwrap();

        let words: Vec<_> = obj.addr_iter().collect();
        assert_eq!(words, vec![
            (0x4000, Some(0x1234)),
            (0x4001, None),
            (0x4002, None),
            (0x4003, None),
            (0x4004, Some(u16::from(b'h'))),
            (0x4005, Some(u16::from(b'i'))),
            (0x4006, Some(0)),
        ]);
    }

    #[test]
    fn test_region_errors() {
        assert_asm_fail(assemble_src("AND R0, R0, #0"), AsmErrKind::OutsideRegion);
        assert_asm_fail(assemble_src(".orig x3000\n.orig x4000\n.end"), AsmErrKind::NestedRegions);
        assert_asm_fail(assemble_src(".end"), AsmErrKind::DanglingEnd);
        assert_asm_fail(assemble_src(".orig x3000\nHALT"), AsmErrKind::UnclosedRegion);
        assert_asm_fail(
            assemble_src("LABEL: .orig x3000\n.end"),
            AsmErrKind::UndetLabelAddr
        );
    }

    #[test]
    fn test_duplicate_label() {
        let src = "
            .orig x3000
                A: HALT
                A: HALT
            .end
        ";
        assert_asm_fail(assemble_src(src), AsmErrKind::DuplicateLabel("A".to_string()));

        // across regions too
        let src = "
            .orig x3000
                A: HALT
            .end
            .orig x4000
                A: HALT
            .end
        ";
        assert_asm_fail(assemble_src(src), AsmErrKind::DuplicateLabel("A".to_string()));
    }

    #[test]
    fn test_missing_label() {
        let src = "
            .orig x3000
                BR NOWHERE
            .end
        ";
        assert_asm_fail(assemble_src(src), AsmErrKind::CouldNotFindLabel("NOWHERE".to_string()));
    }

    #[test]
    fn test_region_overlap() {
        let src = "
            .orig x3000
                .blkw 16
            .end
            .orig x300F
                HALT
            .end
        ";
        assert_asm_fail(assemble_src(src), AsmErrKind::OverlappingRegions);

        // contiguous is fine
        let src = "
            .orig x3000
                .blkw 16
            .end
            .orig x3010
                HALT
            .end
        ";
        assemble_src(src).unwrap();
    }

    #[test]
    fn test_region_wrap_and_io() {
        assert_asm_fail(
            assemble_src(".orig xFFFF\n.blkw 2\n.end"),
            AsmErrKind::WrappingRegion
        );
        assert_asm_fail(
            assemble_src(".orig x3000\n.blkw xFFFF\n.end"),
            AsmErrKind::WrappingRegion
        );
        assert_asm_fail(
            assemble_src(".orig xFE00\nAND R0, R0, #0\n.end"),
            AsmErrKind::RegionInIO
        );
        assert_asm_fail(
            assemble_src(".orig xFFFF\n.blkw 1\n.end"),
            AsmErrKind::RegionInIO
        );
        assert_asm_fail(
            assemble_src(".orig x3000\n.blkw xD000\n.end"),
            AsmErrKind::RegionInIO
        );

        // empty regions at the edge of the I/O page are harmless
        assemble_src(".orig xFE00\n.end").unwrap();
        // filling right up to the I/O page is fine
        assemble_src(".orig xFDFF\n.blkw 1\n.end").unwrap();
    }

    #[test]
    fn test_external_fill() {
        let obj = assemble_src("
            .external SUBR
            .orig x3000
                SUBR_ADDR: .fill SUBR
            .end
        ").unwrap();

        assert!(obj.unresolved_externals().any(|name| name == "SUBR"));
        // placeholder until linked
        assert_eq!(obj.addr_iter().next(), Some((0x3000, Some(0))));
    }

    #[test]
    fn test_external_offset_misuse() {
        for src in [
            ".external X\n.orig x3000\nLD R0, X\n.end",
            ".external X\n.orig x3000\nJSR X\n.end",
            ".external X\n.orig x3000\nBR X\n.end",
        ] {
            assert_asm_fail(assemble_src(src), AsmErrKind::ExternalOffset("X".to_string()));
        }

        // .fill is the one allowed use
        assemble_src(".external X\n.orig x3000\n.fill X\n.end").unwrap();
    }

    #[test]
    fn test_offset_out_of_range() {
        let src = "
            .orig x3000
                BR FAR
                .blkw 300
                FAR: HALT
            .end
        ";
        assert_asm_fail(
            assemble_src(src),
            AsmErrKind::OffsetRange(crate::ast::OffsetNewErr::CannotFitSigned(9))
        );
    }

    #[test]
    fn test_debug_symbols() {
        let src = ".orig x3000\nSTART: AND R0, R0, #0\nLOOP: ADD R0, R0, #1\nHALT\n.end";
        let obj = assemble_src_debug(src).unwrap();
        let sym = obj.symbol_table();

        // label -> source span
        let span = sym.get_label_source("LOOP").unwrap();
        assert_eq!(&src[span], "LOOP");

        // line <-> addr
        assert_eq!(sym.lookup_line(1), Some(0x3000));
        assert_eq!(sym.lookup_line(2), Some(0x3001));
        assert_eq!(sym.rev_lookup_line(0x3002), Some(3));
        assert_eq!(sym.rev_lookup_line(0x5000), None);

        // line span <-> position pairs
        let info = sym.source_info().unwrap();
        assert_eq!(&src[info.line_span(3).unwrap()], "HALT");
        assert_eq!(info.get_pos_pair(src.find("LOOP").unwrap()), (2, 0));
    }

    #[test]
    fn test_stringz_line_map() {
        let src = ".orig x3000\nMSG: .stringz \"ab\"\nHALT\n.end";
        let obj = assemble_src_debug(src).unwrap();
        let sym = obj.symbol_table();

        // all three words of the string map back to its line
        assert_eq!(sym.rev_lookup_line(0x3000), Some(1));
        assert_eq!(sym.rev_lookup_line(0x3002), Some(1));
        assert_eq!(sym.rev_lookup_line(0x3003), Some(2));
    }
}
