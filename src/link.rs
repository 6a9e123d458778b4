//! Linking multiple object files into one.
//!
//! [`link`] merges the memory regions and symbol tables of several
//! separately assembled object files, then patches every relocation
//! site (a `.fill` of an `.external` label) with the label's address
//! from whichever file defines it.
//!
//! ```
//! use lc3_forge::parse::parse_ast;
//! use lc3_forge::asm::assemble;
//! use lc3_forge::link::link;
//!
//! let main = assemble(parse_ast("
//!     .external SUBR
//!     .orig x3000
//!         LDI R7, SUBR_PTR
//!         JSRR R7
//!         HALT
//!         SUBR_PTR: .fill SUBR
//!     .end
//! ").unwrap()).unwrap();
//! let lib = assemble(parse_ast("
//!     .orig x4000
//!         SUBR: ADD R0, R0, #1
//!         RET
//!     .end
//! ").unwrap()).unwrap();
//!
//! let image = link([main, lib]).unwrap();
//! assert_eq!(image.symbol_table().lookup_label("SUBR"), Some(0x4000));
//! ```

use std::collections::btree_map::Entry;

use crate::asm::{ObjectFile, SymbolTable};

/// The errors that can occur during linking.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LinkErr {
    /// An external label is not defined by any of the object files.
    UnresolvedExternal(String),
    /// The same label is defined by more than one object file.
    DuplicateDefinition(String),
    /// Two object files claim overlapping memory regions.
    OverlappingRegion(u16),
}
impl std::fmt::Display for LinkErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedExternal(lb)  => write!(f, "external label {lb} is not defined by any object file"),
            Self::DuplicateDefinition(lb) => write!(f, "label {lb} is defined by multiple object files"),
            Self::OverlappingRegion(addr) => write!(f, "object files overlap at address x{addr:04X}"),
        }
    }
}
impl std::error::Error for LinkErr {}
impl crate::err::Error for LinkErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        let msg = match self {
            Self::UnresolvedExternal(_)  => "define this label in one of the linked object files",
            Self::DuplicateDefinition(_) => "remove all but one of the definitions",
            Self::OverlappingRegion(_)   => "change the .orig of one of the regions",
        };
        Some(msg.into())
    }
}

/// Links object files into a single image.
///
/// The result is order-independent: regions are merged, every label
/// defined by any input becomes defined in the output, and relocation
/// sites are patched with the defining file's address. Debug symbols
/// are carried over only when exactly one input has them (after
/// linking, line numbers from multiple sources would be ambiguous).
pub fn link(objs: impl IntoIterator<Item = ObjectFile>) -> Result<ObjectFile, LinkErr> {
    let mut out = ObjectFile {
        block_map: Default::default(),
        sym: SymbolTable::default()
    };
    let mut debug = None;
    let mut debug_count = 0usize;

    for obj in objs {
        for (start, words) in obj.block_map {
            match out.block_map.entry(start) {
                Entry::Vacant(e) => { e.insert(words); },
                Entry::Occupied(_) => return Err(LinkErr::OverlappingRegion(start)),
            }
        }

        for (name, data) in obj.sym.label_map {
            match out.sym.label_map.entry(name) {
                Entry::Vacant(e) => { e.insert(data); },
                Entry::Occupied(mut e) => {
                    let prev = e.get_mut();
                    match (prev.external, data.external) {
                        // a definition resolves any number of declarations
                        (true, false) => *prev = data,
                        (false, true) | (true, true) => {},
                        (false, false) => return Err(LinkErr::DuplicateDefinition(e.key().clone())),
                    }
                }
            }
        }
        out.sym.rel_map.extend(obj.sym.rel_map);

        if let Some(d) = obj.sym.debug_symbols {
            debug = Some(d);
            debug_count += 1;
        }
    }
    out.sym.debug_symbols = debug.filter(|_| debug_count == 1);

    // now that every definition is known, patch the relocation sites
    let rel_map = std::mem::take(&mut out.sym.rel_map);
    for (site, name) in rel_map {
        let Some(addr) = out.sym.lookup_label(&name) else {
            // still external: keep the site for a later link step
            out.sym.rel_map.insert(site, name);
            continue;
        };
        patch_word(&mut out, site, addr);
    }

    // full-range overlap check (starts being distinct is not enough)
    let mut prev_end: u32 = 0;
    for (&start, words) in out.block_map.iter() {
        if u32::from(start) < prev_end {
            return Err(LinkErr::OverlappingRegion(start));
        }
        prev_end = u32::from(start) + words.len() as u32;
    }

    Ok(out)
}

/// Links object files, requiring that no external labels remain.
pub fn link_complete(objs: impl IntoIterator<Item = ObjectFile>) -> Result<ObjectFile, LinkErr> {
    let out = link(objs)?;
    if let Some(name) = out.unresolved_externals().next() {
        return Err(LinkErr::UnresolvedExternal(name.to_string()));
    }
    Ok(out)
}

fn patch_word(obj: &mut ObjectFile, site: u16, value: u16) {
    let block = obj.block_map.range_mut(..=site).next_back();
    if let Some((&start, words)) = block {
        if let Some(word) = words.get_mut(usize::from(site.wrapping_sub(start))) {
            *word = Some(value);
        }
    }
}
