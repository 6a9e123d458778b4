//! Reading and writing object files to disk.
//!
//! The [`ObjFileFormat`] trait describes a serialization of object file
//! data. Two implementations are provided:
//! - [`BinaryFormat`]: a compact binary representation
//! - [`TextFormat`]: a human-readable text representation

use std::collections::BTreeMap;

use crate::asm::{DebugSymbols, LineSymbolMap, SourceInfo, SymbolData, SymbolTable};

use super::ObjectFile;

/// A serialization format for object files.
pub trait ObjFileFormat {
    /// Representation of the serialized data:
    /// `[u8]` for binary formats, `str` for text formats.
    type Stream: ToOwned + ?Sized;

    /// Serializes an object file into the stream format.
    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned;

    /// Deserializes an object file, returning `None` if the data
    /// is malformed.
    fn deserialize(i: &Self::Stream) -> Option<ObjectFile>;
}

/* BINARY */

/// The binary object file format.
///
/// The layout is a magic number and version, followed by a sequence of
/// self-describing chunks (memory regions, labels, relocation entries,
/// line map entries, and the debug source).
pub struct BinaryFormat;

const BFMT_MAGIC: &[u8] = b"lc3f";
const BFMT_VER: &[u8] = &[0x00, 0x02];

const CHUNK_BLOCK: u8 = 0x00;
const CHUNK_LABEL: u8 = 0x01;
const CHUNK_RELOC: u8 = 0x02;
const CHUNK_LINE:  u8 = 0x03;
const CHUNK_SRC:   u8 = 0x04;

impl ObjFileFormat for BinaryFormat {
    type Stream = [u8];

    fn serialize(o: &ObjectFile) -> Vec<u8> {
        // Chunk layouts (all integers little-endian):
        //
        // CHUNK_BLOCK: start addr (2), word count (2),
        //     then 3 bytes per word (init flag + value)
        // CHUNK_LABEL: addr (2), external flag (1), source start (8),
        //     name length (8), name bytes
        // CHUNK_RELOC: site addr (2), name length (8), name bytes
        // CHUNK_LINE:  line number (8), start addr (2), word count (2)
        // CHUNK_SRC:   source length (8), source bytes

        let mut bytes = BFMT_MAGIC.to_vec();
        bytes.extend_from_slice(BFMT_VER);

        for (addr, words) in o.block_iter() {
            bytes.push(CHUNK_BLOCK);
            bytes.extend(u16::to_le_bytes(addr));
            bytes.extend(u16::to_le_bytes(words.len() as u16));
            for &word in words {
                match word {
                    Some(val) => {
                        bytes.push(0x01);
                        bytes.extend(u16::to_le_bytes(val));
                    },
                    None => bytes.extend([0x00; 3]),
                }
            }
        }

        for (label, data) in o.sym.label_map.iter() {
            bytes.push(CHUNK_LABEL);
            bytes.extend(u16::to_le_bytes(data.addr));
            bytes.push(u8::from(data.external));
            bytes.extend(u64::to_le_bytes(data.src_start as u64));
            bytes.extend(u64::to_le_bytes(label.len() as u64));
            bytes.extend_from_slice(label.as_bytes());
        }
        for (&addr, label) in o.sym.rel_map.iter() {
            bytes.push(CHUNK_RELOC);
            bytes.extend(u16::to_le_bytes(addr));
            bytes.extend(u64::to_le_bytes(label.len() as u64));
            bytes.extend_from_slice(label.as_bytes());
        }

        if let Some(debug) = &o.sym.debug_symbols {
            for (line, addr, len) in debug.line_map.iter() {
                bytes.push(CHUNK_LINE);
                bytes.extend(u64::to_le_bytes(line as u64));
                bytes.extend(u16::to_le_bytes(addr));
                bytes.extend(u16::to_le_bytes(len));
            }

            bytes.push(CHUNK_SRC);
            let src = debug.src_info.source();
            bytes.extend(u64::to_le_bytes(src.len() as u64));
            bytes.extend_from_slice(src.as_bytes());
        }

        bytes
    }

    fn deserialize(mut data: &Self::Stream) -> Option<ObjectFile> {
        let mut block_map = BTreeMap::new();
        let mut label_map = BTreeMap::new();
        let mut rel_map   = BTreeMap::new();
        let mut lines     = vec![];
        let mut src: Option<String> = None;

        data = data.strip_prefix(BFMT_MAGIC)?
            .strip_prefix(BFMT_VER)?;

        while let Some((&chunk, rest)) = data.split_first() {
            data = rest;
            match chunk {
                CHUNK_BLOCK => {
                    let addr = u16::from_le_bytes(take::<2>(&mut data)?);
                    let len  = u16::from_le_bytes(take::<2>(&mut data)?);

                    let raw = take_slice(&mut data, 3 * usize::from(len))?;
                    let words = raw.chunks_exact(3)
                        .map(|c| (c[0] == 0x01).then(|| u16::from_le_bytes([c[1], c[2]])))
                        .collect();
                    block_map.insert(addr, words);
                },
                CHUNK_LABEL => {
                    let addr      = u16::from_le_bytes(take::<2>(&mut data)?);
                    let external  = take::<1>(&mut data)?[0] != 0;
                    let src_start = u64::from_le_bytes(take::<8>(&mut data)?) as usize;
                    let name      = take_str(&mut data)?;

                    label_map.insert(name, SymbolData { addr, src_start, external });
                },
                CHUNK_RELOC => {
                    let addr = u16::from_le_bytes(take::<2>(&mut data)?);
                    let name = take_str(&mut data)?;
                    rel_map.insert(addr, name);
                },
                CHUNK_LINE => {
                    let line = u64::from_le_bytes(take::<8>(&mut data)?) as usize;
                    let addr = u16::from_le_bytes(take::<2>(&mut data)?);
                    let len  = u16::from_le_bytes(take::<2>(&mut data)?);
                    lines.push((line, addr, len));
                },
                CHUNK_SRC => {
                    let text = take_str(&mut data)?;
                    src.get_or_insert_with(String::new).push_str(&text);
                },
                _ => return None
            }
        }

        let debug_symbols = match (src, lines.is_empty()) {
            (Some(src), _) => Some(DebugSymbols {
                line_map: LineSymbolMap::from_iter(lines),
                src_info: SourceInfo::new(&src),
            }),
            // line entries without a source chunk are malformed
            (None, false) => return None,
            (None, true) => None,
        };

        Some(ObjectFile {
            block_map,
            sym: SymbolTable { label_map, rel_map, debug_symbols }
        })
    }
}

fn take<const N: usize>(data: &mut &[u8]) -> Option<[u8; N]> {
    take_slice(data, N).map(|slice| <[_; N]>::try_from(slice).unwrap_or([0; N]))
}
fn take_slice<'a>(data: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if n > data.len() { return None }
    let (left, right) = data.split_at(n);
    *data = right;
    Some(left)
}
/// Takes a u64 length followed by that many bytes of UTF-8.
fn take_str(data: &mut &[u8]) -> Option<String> {
    let len = u64::from_le_bytes(take::<8>(data)?) as usize;
    let bytes = take_slice(data, len)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/* TEXT */

/// The text object file format.
///
/// This format is line-based and designed to be human-inspectable:
/// a `.TEXT` section of hex words per region, `.SYMBOL`/`.RELOC`/`.LINEMAP`
/// tables, and finally the raw debug source after a `.SOURCE` marker.
pub struct TextFormat;

const TFMT_MAGIC: &str = "LC3F OBJ v2";
const TFMT_UNINIT: &str = "????";
const TABLE_DIV: &str = " | ";
const SRC_MARKER: &str = "\n.SOURCE\n";

impl ObjFileFormat for TextFormat {
    type Stream = str;

    fn serialize(o: &ObjectFile) -> String {
        use std::fmt::Write;

        // writing to a String cannot fail
        fn ser(o: &ObjectFile) -> Result<String, std::fmt::Error> {
            let mut buf = String::new();
            writeln!(buf, "{TFMT_MAGIC}")?;

            writeln!(buf, ".TEXT")?;
            for (addr, words) in o.block_iter() {
                writeln!(buf, "{addr:04X}")?;
                writeln!(buf, "{}", words.len())?;
                for &word in words {
                    match word {
                        Some(val) => writeln!(buf, "{val:04X}")?,
                        None => writeln!(buf, "{TFMT_UNINIT}")?,
                    }
                }
            }

            writeln!(buf, ".SYMBOL")?;
            for (label, data) in o.sym.label_map.iter() {
                writeln!(buf, "{:04X}{TABLE_DIV}{}{TABLE_DIV}{}{TABLE_DIV}{label}",
                    data.addr, u8::from(data.external), data.src_start)?;
            }

            writeln!(buf, ".RELOC")?;
            for (addr, label) in o.sym.rel_map.iter() {
                writeln!(buf, "{addr:04X}{TABLE_DIV}{label}")?;
            }

            if let Some(debug) = &o.sym.debug_symbols {
                writeln!(buf, ".LINEMAP")?;
                for (line, addr, len) in debug.line_map.iter() {
                    writeln!(buf, "{line}{TABLE_DIV}{addr:04X}{TABLE_DIV}{len}")?;
                }

                // raw source goes last, after the marker line
                write!(buf, ".SOURCE\n{}", debug.src_info.source())?;
            }

            Ok(buf)
        }

        ser(o).unwrap_or_default()
    }

    fn deserialize(text: &Self::Stream) -> Option<ObjectFile> {
        let mut block_map = BTreeMap::new();
        let mut label_map = BTreeMap::new();
        let mut rel_map   = BTreeMap::new();
        let mut lines     = vec![];

        // the source (if present) is everything after the marker, verbatim
        let (head, src) = match text.find(SRC_MARKER) {
            Some(i) => (&text[..i], Some(&text[i + SRC_MARKER.len()..])),
            None => (text, None),
        };

        let mut it = head.lines().filter(|l| !l.trim().is_empty());
        if it.next()? != TFMT_MAGIC { return None }

        let mut section = "";
        let mut text_words: Vec<&str> = vec![];
        for line in it {
            if let s @ (".TEXT" | ".SYMBOL" | ".RELOC" | ".LINEMAP") = line.trim() {
                section = s;
                continue;
            }
            match section {
                ".TEXT" => text_words.push(line.trim()),
                ".SYMBOL" => {
                    let [addr, ext, start, label] = split_row(line)?;
                    label_map.insert(label.to_string(), SymbolData {
                        addr: hex2u16(addr)?,
                        external: ext.parse::<u8>().ok()? != 0,
                        src_start: start.parse().ok()?,
                    });
                },
                ".RELOC" => {
                    let [addr, label] = split_row(line)?;
                    rel_map.insert(hex2u16(addr)?, label.to_string());
                },
                ".LINEMAP" => {
                    let [line_no, addr, len] = split_row(line)?;
                    lines.push((line_no.parse().ok()?, hex2u16(addr)?, len.parse().ok()?));
                },
                _ => return None
            }
        }

        // .TEXT section: alternating (origin, count, count words)
        let mut words_it = text_words.into_iter();
        while let Some(origin) = words_it.next() {
            let origin = hex2u16(origin)?;
            let count = words_it.next()?.parse::<u16>().ok()?;
            let words: Vec<_> = words_it.by_ref()
                .take(usize::from(count))
                .map(maybe_hex2u16)
                .collect::<Option<_>>()?;
            if words.len() != usize::from(count) { return None }
            block_map.insert(origin, words);
        }

        let debug_symbols = match (src, lines.is_empty()) {
            (Some(src), _) => Some(DebugSymbols {
                line_map: LineSymbolMap::from_iter(lines),
                src_info: SourceInfo::new(src),
            }),
            (None, false) => return None,
            (None, true) => None,
        };

        Some(ObjectFile {
            block_map,
            sym: SymbolTable { label_map, rel_map, debug_symbols }
        })
    }
}

fn hex2u16(s: &str) -> Option<u16> {
    (s.len() == 4).then(|| u16::from_str_radix(s, 16).ok())?
}
fn maybe_hex2u16(s: &str) -> Option<Option<u16>> {
    match s {
        TFMT_UNINIT => Some(None),
        s => hex2u16(s).map(Some),
    }
}
fn split_row<const N: usize>(line: &str) -> Option<[&str; N]> {
    let cols: Vec<_> = line.splitn(N, TABLE_DIV).map(str::trim).collect();
    <[&str; N]>::try_from(cols).ok()
}
