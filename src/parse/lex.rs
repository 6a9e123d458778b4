//! Tokenizing LC-3 assembly source.
//!
//! The [`Token`] enum lists every token of LC-3 assembly; the parser walks
//! a stream of these (with spans) to build the statement AST.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

/// A unit of LC-3 assembly source.
///
/// Numeric and register tokens are validated by their lexer callbacks, so
/// the regexes deliberately overmatch (e.g. `23abc` lexes as one numeric
/// token and is then rejected) to produce errors over the whole unit.
#[derive(Debug, Logos, PartialEq, Eq)]
#[logos(skip r"[ \t]+", error = LexErr)]
pub enum Token {
    /// An unsigned numeric literal (`9`, `#14`, `x7F`, `b1011`, ...).
    #[regex(r"\d\w*", lex_unsigned_dec)]
    #[regex(r"#\d?\w*", lex_unsigned_dec)]
    #[regex(r"[Xx][\dA-Fa-f]\w*", lex_unsigned_hex)]
    #[regex(r"[Bb][01]\w*", lex_unsigned_bin)]
    Unsigned(u16),

    /// A signed numeric literal (`-9`, `#-14`, `x-7F`, ...).
    #[regex(r"-\w*", lex_signed_dec)]
    #[regex(r"#-\w*", lex_signed_dec)]
    #[regex(r"[Xx]-\w*", lex_signed_hex)]
    Signed(i16),

    /// A register (`R0`-`R7`).
    #[regex(r"[Rr]\d+", lex_reg)]
    Reg(u8),

    /// A case-insensitive identifier: an instruction keyword or a label.
    #[regex(r"[A-Za-z_]\w*", |lx| lx.slice().parse::<Ident>().ok())]
    Ident(Ident),

    /// A directive (`.orig`, `.end`, ...), stored without its leading dot.
    #[regex(r"\.[A-Za-z_]\w*", |lx| lx.slice()[1..].to_string())]
    Directive(String),

    /// A string literal.
    #[token(r#"""#, lex_str_literal)]
    String(String),

    /// A colon, optionally following a label definition.
    #[token(":")]
    Colon,

    /// A comma between instruction operands.
    #[token(",")]
    Comma,

    /// A comment: `;` through the end of the line.
    #[regex(r";.*")]
    Comment,

    /// A line break.
    #[regex(r"\r?\n")]
    NewLine
}

macro_rules! keyword_idents {
    ($($kw:ident),+) => {
        /// An identifier: either an instruction keyword or a free-form label.
        ///
        /// Matching against keywords is case-insensitive.
        #[derive(Debug, PartialEq, Eq, Clone)]
        pub enum Ident {
            $(
                #[allow(missing_docs)]
                $kw
            ),+,
            #[allow(missing_docs)]
            Label(String)
        }

        impl std::str::FromStr for Ident {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match &*s.to_uppercase() {
                    $(stringify!($kw) => Ok(Self::$kw)),*,
                    _ => Ok(Self::Label(s.to_string()))
                }
            }
        }
        impl std::fmt::Display for Ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$kw => f.write_str(stringify!($kw))),*,
                    Self::Label(id) => f.write_str(id)
                }
            }
        }
    };
}
keyword_idents! {
    ADD, AND, NOT, BR, BRP, BRZ, BRZP, BRN, BRNP, BRNZ, BRNZP,
    JMP, JSR, JSRR, LD, LDI, LDR, LEA, ST, STI, STR, TRAP, NOP,
    RET, RTI, GETC, OUT, PUTC, PUTS, IN, PUTSP, HALT
}

/// An error found while tokenizing.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// An unsigned literal too large for 16 bits.
    DoesNotFitU16,
    /// A signed literal outside the 16-bit range.
    DoesNotFitI16,
    /// A numeric literal with digits invalid for its base (10, 16, or 2).
    InvalidDigits(u32),
    /// A numeric literal with no digits at all (e.g. a lone `#` or `x-`).
    EmptyNumeric(u32),
    /// `R` followed by a number outside 0-7.
    InvalidReg,
    /// A string literal missing its closing quote.
    UnclosedStrLit,
    /// A string literal too long to fit in one memory region.
    StrLitTooBig,
    /// Integer parsing failed for an unanticipated reason.
    UnknownIntErr,
    /// A character that occurs in no LC-3 token.
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFitU16    => f.write_str("numeric token does not fit 16-bit unsigned integer"),
            LexErr::DoesNotFitI16    => f.write_str("numeric token does not fit 16-bit signed integer"),
            LexErr::InvalidDigits(2)  => f.write_str("invalid binary literal"),
            LexErr::InvalidDigits(16) => f.write_str("invalid hex literal"),
            LexErr::InvalidDigits(_)  => f.write_str("invalid decimal literal"),
            LexErr::EmptyNumeric(2)  => f.write_str("binary literal is missing digits"),
            LexErr::EmptyNumeric(16) => f.write_str("hex literal is missing digits"),
            LexErr::EmptyNumeric(_)  => f.write_str("decimal literal is missing digits"),
            LexErr::InvalidReg       => f.write_str("invalid register"),
            LexErr::UnclosedStrLit   => f.write_str("unclosed string literal"),
            LexErr::StrLitTooBig     => f.write_str("string literal is too large"),
            LexErr::UnknownIntErr    => f.write_str("could not parse integer"),
            LexErr::InvalidSymbol    => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        let msg: std::borrow::Cow<str> = match self {
            LexErr::DoesNotFitU16    => format!("the range for a 16-bit unsigned integer is [0, {}]", u16::MAX).into(),
            LexErr::DoesNotFitI16    => format!("the range for a 16-bit signed integer is [{}, {}]", i16::MIN, i16::MAX).into(),
            LexErr::InvalidDigits(2)  => "a binary literal starts with 'b' and consists of 0s and 1s".into(),
            LexErr::InvalidDigits(16) => "a hex literal starts with 'x' and consists of 0-9, A-F".into(),
            LexErr::InvalidDigits(_)  => "a decimal literal only consists of digits 0-9".into(),
            LexErr::EmptyNumeric(b)  => format!("there should be base-{b} digits here").into(),
            LexErr::InvalidReg       => "this must be R0-R7".into(),
            LexErr::UnclosedStrLit   => "add a quote to the end of the string literal".into(),
            LexErr::StrLitTooBig     => format!("string literals are limited to at most {} characters", u16::MAX - 1).into(),
            LexErr::UnknownIntErr    => return None,
            LexErr::InvalidSymbol    => "this char does not occur in any token in LC-3 assembly".into(),
        };
        Some(msg)
    }
}

/// Maps an int parse failure to its [`LexErr`], given the base and the
/// overflow variant for the literal's signedness.
fn int_err(e: &IntErrorKind, base: u32, overflow: LexErr, src: &str) -> LexErr {
    match e {
        IntErrorKind::Empty => LexErr::EmptyNumeric(base),
        IntErrorKind::InvalidDigit if src == "-" => LexErr::EmptyNumeric(base),
        IntErrorKind::InvalidDigit => LexErr::InvalidDigits(base),
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => overflow,
        _ => LexErr::UnknownIntErr,
    }
}

fn lex_unsigned_dec(lx: &Lexer<'_, Token>) -> Result<u16, LexErr> {
    let src = lx.slice().strip_prefix('#').unwrap_or(lx.slice());
    src.parse::<u16>()
        .map_err(|e| int_err(e.kind(), 10, LexErr::DoesNotFitU16, src))
}
fn lex_signed_dec(lx: &Lexer<'_, Token>) -> Result<i16, LexErr> {
    let src = lx.slice().strip_prefix('#').unwrap_or(lx.slice());
    src.parse::<i16>()
        .map_err(|e| int_err(e.kind(), 10, LexErr::DoesNotFitI16, src))
}
fn lex_unsigned_hex(lx: &Lexer<'_, Token>) -> Result<u16, LexErr> {
    let src = &lx.slice()[1..];
    u16::from_str_radix(src, 16)
        .map_err(|e| int_err(e.kind(), 16, LexErr::DoesNotFitU16, src))
}
fn lex_signed_hex(lx: &Lexer<'_, Token>) -> Result<i16, LexErr> {
    let src = &lx.slice()[1..];
    i16::from_str_radix(src, 16)
        .map_err(|e| int_err(e.kind(), 16, LexErr::DoesNotFitI16, src))
}
fn lex_unsigned_bin(lx: &Lexer<'_, Token>) -> Result<u16, LexErr> {
    let src = &lx.slice()[1..];
    u16::from_str_radix(src, 2)
        .map_err(|e| int_err(e.kind(), 2, LexErr::DoesNotFitU16, src))
}
fn lex_reg(lx: &Lexer<'_, Token>) -> Result<u8, LexErr> {
    lx.slice()[1..].parse::<u8>().ok()
        .filter(|&r| r < 8)
        .ok_or(LexErr::InvalidReg)
}

fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // find the closing quote (skipping escaped ones) and consume through it
    let close = rem.match_indices('"')
        .map(|(n, _)| n)
        .find(|&n| !matches!(rem.get((n.wrapping_sub(1))..(n + 1)), Some("\\\"")));
    match close {
        Some(n) => lx.bump(n + 1),
        None => {
            lx.bump(rem.len());
            return Err(LexErr::UnclosedStrLit);
        }
    }

    // resolve the small escape set inside the quotes
    let mut remaining = &lx.slice()[1..(lx.slice().len() - 1)];
    let mut buf = String::with_capacity(remaining.len());
    while let Some((left, right)) = remaining.split_once('\\') {
        buf.push_str(left);

        // the closing quote is unescaped, so a character always follows
        let Some(&esc) = right.as_bytes().first() else {
            return Err(LexErr::UnclosedStrLit);
        };
        match esc {
            b'n'  => buf.push('\n'),
            b'r'  => buf.push('\r'),
            b't'  => buf.push('\t'),
            b'\\' => buf.push('\\'),
            b'0'  => buf.push('\0'),
            b'"'  => buf.push('\"'),
            c => {
                buf.push('\\');
                buf.push(char::from(c));
            }
        }
        remaining = &right[1..];
    }
    buf.push_str(remaining);

    match buf.len() < usize::from(u16::MAX) {
        true  => Ok(buf),
        false => Err(LexErr::StrLitTooBig),
    }
}

#[cfg(test)]
mod tests {
    use logos::Logos;

    use crate::err::LexErr;
    use crate::parse::lex::{Ident, Token};

    fn label(s: &str) -> Token {
        Token::Ident(Ident::Label(s.to_string()))
    }
    fn str_literal(s: &str) -> Token {
        Token::String(s.to_string())
    }
    fn lex_all(s: &str) -> Vec<Result<Token, LexErr>> {
        Token::lexer(s).collect()
    }

    #[test]
    fn test_dec() {
        assert_eq!(lex_all("0 123 #456 #-789 -12"), vec![
            Ok(Token::Unsigned(0)),
            Ok(Token::Unsigned(123)),
            Ok(Token::Unsigned(456)),
            Ok(Token::Signed(-789)),
            Ok(Token::Signed(-12)),
        ]);

        // boundaries
        assert_eq!(lex_all("65535 -32768"), vec![
            Ok(Token::Unsigned(65535)),
            Ok(Token::Signed(-32768)),
        ]);
        assert_eq!(Token::lexer("65536").next(), Some(Err(LexErr::DoesNotFitU16)));
        assert_eq!(Token::lexer("-32769").next(), Some(Err(LexErr::DoesNotFitI16)));

        // malformed
        assert_eq!(Token::lexer("3Q").next(), Some(Err(LexErr::InvalidDigits(10))));
        assert_eq!(Token::lexer("#").next(), Some(Err(LexErr::EmptyNumeric(10))));
        assert_eq!(Token::lexer("#-").next(), Some(Err(LexErr::EmptyNumeric(10))));
    }

    #[test]
    fn test_hex() {
        assert_eq!(lex_all("x2110 XABCD xabcd x-7F X-1"), vec![
            Ok(Token::Unsigned(0x2110)),
            Ok(Token::Unsigned(0xABCD)),
            Ok(Token::Unsigned(0xABCD)),
            Ok(Token::Signed(-0x7F)),
            Ok(Token::Signed(-0x1)),
        ]);

        assert_eq!(Token::lexer("xFFFF").next(), Some(Ok(Token::Unsigned(0xFFFF))));
        assert_eq!(Token::lexer("x10000").next(), Some(Err(LexErr::DoesNotFitU16)));
        assert_eq!(Token::lexer("x-8001").next(), Some(Err(LexErr::DoesNotFitI16)));
        assert_eq!(Token::lexer("x0Q").next(), Some(Err(LexErr::InvalidDigits(16))));
        assert_eq!(Token::lexer("x-").next(), Some(Err(LexErr::EmptyNumeric(16))));
    }

    #[test]
    fn test_bin() {
        assert_eq!(lex_all("b0 b1011"), vec![
            Ok(Token::Unsigned(0)),
            Ok(Token::Unsigned(0b1011)),
        ]);
        assert_eq!(Token::lexer("b1111111111111111").next(), Some(Ok(Token::Unsigned(0xFFFF))));
        assert_eq!(Token::lexer("b11111111111111111").next(), Some(Err(LexErr::DoesNotFitU16)));
        assert_eq!(Token::lexer("b012").next(), Some(Err(LexErr::InvalidDigits(2))));

        // without binary digits after it, this is just a label
        assert_eq!(Token::lexer("b").next(), Some(Ok(label("b"))));
    }

    #[test]
    fn test_regs() {
        assert_eq!(lex_all("R0 r3 R7"), vec![
            Ok(Token::Reg(0)),
            Ok(Token::Reg(3)),
            Ok(Token::Reg(7)),
        ]);
        assert_eq!(Token::lexer("R8").next(), Some(Err(LexErr::InvalidReg)));
        assert_eq!(Token::lexer("R99").next(), Some(Err(LexErr::InvalidReg)));

        // R followed by a sign is not a register token
        assert_eq!(lex_all("R-1"), vec![Ok(label("R")), Ok(Token::Signed(-1))]);
    }

    #[test]
    fn test_str() {
        assert_eq!(lex_all(r#" "" " " "abc" "!@#$%^&*()" "#), vec![
            Ok(str_literal("")),
            Ok(str_literal(" ")),
            Ok(str_literal("abc")),
            Ok(str_literal("!@#$%^&*()")),
        ]);
    }

    #[test]
    fn test_str_escape() {
        assert_eq!(lex_all(r#" "\n" "\t" "\\" "\"" "\0" "\e" "#), vec![
            Ok(str_literal("\n")),
            Ok(str_literal("\t")),
            Ok(str_literal("\\")),
            Ok(str_literal("\"")),
            Ok(str_literal("\0")),
            Ok(str_literal("\\e")),
        ]);
    }

    #[test]
    fn test_str_unclosed() {
        assert_eq!(Token::lexer(r#"""#).next(), Some(Err(LexErr::UnclosedStrLit)));
        assert_eq!(Token::lexer("\"abc\ndef\"").next(), Some(Err(LexErr::UnclosedStrLit)));
    }

    #[test]
    fn test_str_too_big() {
        let large = "0".repeat(usize::from(u16::MAX) - 2);
        assert_eq!(Token::lexer(&format!(r#""{large}""#)).next(), Some(Ok(str_literal(&large))));

        let large = "0".repeat(usize::from(u16::MAX) - 1);
        assert_eq!(Token::lexer(&format!(r#""{large}""#)).next(), Some(Err(LexErr::StrLitTooBig)));
    }

    #[test]
    fn test_keywords_labels() {
        let mut tokens = Token::lexer("ADD add aDd");
        assert_eq!(tokens.next(), Some(Ok(Token::Ident(Ident::ADD))));
        assert_eq!(tokens.next(), Some(Ok(Token::Ident(Ident::ADD))));
        assert_eq!(tokens.next(), Some(Ok(Token::Ident(Ident::ADD))));
        assert_eq!(tokens.next(), None);

        assert_eq!(lex_all("LOOP _start halts"), vec![
            Ok(label("LOOP")),
            Ok(label("_start")),
            Ok(label("halts")),
        ]);
    }

    #[test]
    fn test_directive() {
        assert_eq!(lex_all(".orig .fill .blkw .stringz .external .end"), vec![
            Ok(Token::Directive("orig".to_string())),
            Ok(Token::Directive("fill".to_string())),
            Ok(Token::Directive("blkw".to_string())),
            Ok(Token::Directive("stringz".to_string())),
            Ok(Token::Directive("external".to_string())),
            Ok(Token::Directive("end".to_string())),
        ]);
    }

    #[test]
    fn test_punct() {
        assert_eq!(lex_all("0\n1,2:3 ; comment"), vec![
            Ok(Token::Unsigned(0)),
            Ok(Token::NewLine),
            Ok(Token::Unsigned(1)),
            Ok(Token::Comma),
            Ok(Token::Unsigned(2)),
            Ok(Token::Colon),
            Ok(Token::Unsigned(3)),
            Ok(Token::Comment),
        ]);
    }

    #[test]
    fn test_invalid_symbol() {
        for s in ["@", "$", "&", "?", "{"] {
            assert_eq!(Token::lexer(s).next(), Some(Err(LexErr::InvalidSymbol)), "expected {s:?} to be invalid");
        }
    }
}
