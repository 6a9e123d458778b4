//! Converting raw binary listings into object files.
//!
//! A binary listing is a text file where each significant line is
//! exactly 16 `0`/`1` characters. The first such line is the origin
//! address and the rest are the words stored starting there. Blank
//! lines and `;` comments are ignored.
//!
//! ```
//! use lc3_forge::asm::bin::convert_bin;
//!
//! let obj = convert_bin("
//!     ; origin
//!     0011000000000000
//!     0101000000100000 ; AND R0, R0, #0
//!     1111000000100101 ; HALT
//! ").unwrap();
//! assert_eq!(obj.addr_iter().count(), 2);
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::err::ErrSpan;

use super::{ObjectFile, SymbolTable};

/// The kinds of errors that can occur while converting a binary listing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BinErrKind {
    /// A significant line is not exactly 16 characters long.
    WrongLineLength(usize),
    /// A significant line contains a character other than `0` or `1`.
    InvalidBit(char),
    /// The listing has no significant lines at all.
    NoOrigin,
    /// The words extend past the end of memory.
    TooManyWords,
}
impl std::fmt::Display for BinErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongLineLength(n) => write!(f, "line has {n} digits, expected 16"),
            Self::InvalidBit(c)      => write!(f, "invalid character {c:?} in binary line"),
            Self::NoOrigin           => f.write_str("listing does not declare an origin"),
            Self::TooManyWords       => f.write_str("words extend past the end of memory"),
        }
    }
}

/// An error that occurred while converting a binary listing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BinErr {
    /// What went wrong.
    pub kind: BinErrKind,
    span: Range<usize>
}
impl std::fmt::Display for BinErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for BinErr {}
impl crate::err::Error for BinErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone().into())
    }
    fn help(&self) -> Option<Cow<str>> {
        let msg = match self.kind {
            BinErrKind::WrongLineLength(_) => "each line must hold one full 16-bit word",
            BinErrKind::InvalidBit(_)      => "binary lines may only contain the digits 0 and 1",
            BinErrKind::NoOrigin           => "the first significant line is the origin address",
            BinErrKind::TooManyWords       => "the listing must fit between its origin and xFFFF",
        };
        Some(msg.into())
    }
}

/// Converts a binary listing into an object file.
///
/// The resulting object file holds one block and an empty symbol table.
pub fn convert_bin(src: &str) -> Result<ObjectFile, BinErr> {
    let mut origin: Option<u16> = None;
    let mut words: Vec<Option<u16>> = vec![];

    let mut pos = 0;
    for line in src.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();

        // strip comment and surrounding whitespace, tracking the
        // span of what remains
        let significant = line.split(';').next().unwrap_or(line);
        let trimmed = significant.trim();
        if trimmed.is_empty() { continue }
        let start = line_start + (trimmed.as_ptr() as usize - line.as_ptr() as usize);
        let span = start..(start + trimmed.len());

        let word = parse_word(trimmed, span)?;
        match origin {
            None => origin = Some(word),
            Some(_) => words.push(Some(word)),
        }
    }

    let Some(origin) = origin else {
        return Err(BinErr { kind: BinErrKind::NoOrigin, span: 0..src.len() });
    };
    if u32::from(origin) + words.len() as u32 > 0x1_0000 {
        return Err(BinErr { kind: BinErrKind::TooManyWords, span: 0..src.len() });
    }

    let mut block_map = BTreeMap::new();
    if !words.is_empty() {
        block_map.insert(origin, words);
    }
    Ok(ObjectFile { block_map, sym: SymbolTable::default() })
}

fn parse_word(digits: &str, span: Range<usize>) -> Result<u16, BinErr> {
    if digits.chars().count() != 16 {
        return Err(BinErr { kind: BinErrKind::WrongLineLength(digits.chars().count()), span });
    }
    let mut word = 0u16;
    for c in digits.chars() {
        let bit = match c {
            '0' => 0,
            '1' => 1,
            c => return Err(BinErr { kind: BinErrKind::InvalidBit(c), span }),
        };
        word = (word << 1) | bit;
    }
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::{convert_bin, BinErrKind};

    #[test]
    fn test_convert_basic() {
        let obj = convert_bin("
            0011000000000000
            0101000000100000
            0001000000100101
            1111000000100101
        ").unwrap();

        let words: Vec<_> = obj.addr_iter().collect();
        assert_eq!(words, vec![
            (0x3000, Some(0x5020)),
            (0x3001, Some(0x1025)),
            (0x3002, Some(0xF025)),
        ]);
    }

    #[test]
    fn test_convert_comments_and_blanks() {
        let obj = convert_bin("
            ; program origin
            0011000000000000

            1111000000100101 ; HALT
        ").unwrap();

        assert_eq!(obj.addr_iter().collect::<Vec<_>>(), vec![(0x3000, Some(0xF025))]);
    }

    #[test]
    fn test_convert_errors() {
        assert_eq!(convert_bin("").unwrap_err().kind, BinErrKind::NoOrigin);
        assert_eq!(convert_bin("; nothing\n\n").unwrap_err().kind, BinErrKind::NoOrigin);
        assert_eq!(
            convert_bin("0011000000000000\n01010\n").unwrap_err().kind,
            BinErrKind::WrongLineLength(5)
        );
        assert_eq!(
            convert_bin("0011000000000000\n0101000000100002\n").unwrap_err().kind,
            BinErrKind::InvalidBit('2')
        );
        assert_eq!(
            convert_bin("1111111111111111\n0000000000000000\n0000000000000000\n").unwrap_err().kind,
            BinErrKind::TooManyWords
        );
    }

    #[test]
    fn test_error_span_points_at_line() {
        use crate::err::Error as _;

        let src = "0011000000000000\n011100\n";
        let err = convert_bin(src).unwrap_err();
        let span = err.span().unwrap().first().clone();
        assert_eq!(&src[span], "011100");
    }
}
