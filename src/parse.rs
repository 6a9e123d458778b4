//! Parsing LC-3 assembly source into statement ASTs.
//!
//! The entry points are [`parse_ast`] (strict grammar) and
//! [`parse_ast_with`], which takes [`ParseOpts`] to enable the liberal
//! grammar. Strict mode requires commas between instruction operands;
//! liberal mode accepts whitespace-separated operands, matching the laxer
//! sources some courses distribute.
//!
//! ```
//! use lc3_forge::parse::parse_ast;
//!
//! let ast = parse_ast("
//!     .orig x3000
//!     LOOP: ADD R0, R0, #-1
//!     BRp LOOP
//!     HALT
//!     .end
//! ").unwrap();
//! assert_eq!(ast.len(), 5);
//! ```

pub mod lex;

use std::borrow::Cow;
use std::collections::VecDeque;
use std::ops::Range;

use logos::Logos;

use crate::ast::asm::{AsmInstr, Directive, Stmt, StmtKind};
use crate::ast::{IOffset, ImmOrReg, Label, Offset, OffsetNewErr, PCOffset, Reg, TrapVect8};
use crate::err::ErrSpan;
use lex::{Ident, LexErr, Token};

/// Configuration for the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOpts {
    /// Accept the liberal grammar: operands may be separated by
    /// whitespace alone, without commas.
    pub liberal: bool
}

/// Parses source with the strict grammar.
pub fn parse_ast(src: &str) -> Result<Vec<Stmt>, ParseErr> {
    parse_ast_with(src, ParseOpts::default())
}

/// Parses source with the given grammar options.
pub fn parse_ast_with(src: &str, opts: ParseOpts) -> Result<Vec<Stmt>, ParseErr> {
    let mut parser = Parser::new(src, opts)?;

    let mut stmts = vec![];
    parser.skip_line_breaks();
    while !parser.is_done() {
        stmts.push(parser.parse_stmt()?);
        parser.skip_line_breaks();
    }
    Ok(stmts)
}

/// An error found while parsing tokens into statements.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseErr {
    /// What went wrong.
    pub kind: ParseErrKind,
    /// Where it went wrong.
    span: Range<usize>
}
impl ParseErr {
    fn new(kind: ParseErrKind, span: Range<usize>) -> Self {
        ParseErr { kind, span }
    }
}

/// The kinds of [`ParseErr`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrKind {
    /// The tokenizer rejected part of the source.
    Lex(LexErr),
    /// A numeric operand does not fit its operand slot.
    Offset(OffsetNewErr),
    /// Something else was expected at this position.
    Expected(&'static str),
    /// A directive this assembler does not know.
    UnknownDirective(String),
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrKind::Lex(e)    => e.fmt(f),
            ParseErrKind::Offset(e) => e.fmt(f),
            ParseErrKind::Expected(what) => write!(f, "expected {what}"),
            ParseErrKind::UnknownDirective(d) => write!(f, "unrecognized directive '.{d}'"),
        }
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(ErrSpan::from(self.span.clone()))
    }
    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            ParseErrKind::Lex(e)    => crate::err::Error::help(e),
            ParseErrKind::Offset(e) => crate::err::Error::help(e),
            ParseErrKind::Expected(_) => None,
            ParseErrKind::UnknownDirective(_) =>
                Some("the recognized directives are .orig, .fill, .blkw, .stringz, .external, and .end".into()),
        }
    }
}

struct Parser {
    tokens: VecDeque<(Token, Range<usize>)>,
    opts: ParseOpts,
    /// End of the most recently consumed token (used to close statement spans).
    cursor: usize,
    src_len: usize
}
impl Parser {
    fn new(src: &str, opts: ParseOpts) -> Result<Self, ParseErr> {
        let tokens = Token::lexer(src).spanned()
            .filter(|(t, _)| !matches!(t, Ok(Token::Comment)))
            .map(|(t, span)| match t {
                Ok(token) => Ok((token, span)),
                Err(err)  => Err(ParseErr::new(ParseErrKind::Lex(err), span)),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { tokens, opts, cursor: 0, src_len: src.len() })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.front().map(|(t, _)| t)
    }
    fn advance(&mut self) -> Option<(Token, Range<usize>)> {
        let pair = self.tokens.pop_front();
        if let Some((_, span)) = &pair {
            self.cursor = span.end;
        }
        pair
    }
    /// The span the next error should point at.
    fn here(&self) -> Range<usize> {
        match self.tokens.front() {
            Some((_, span)) => span.clone(),
            None => self.src_len..self.src_len,
        }
    }

    fn is_done(&self) -> bool {
        self.tokens.is_empty()
    }
    fn skip_line_breaks(&mut self) {
        while matches!(self.peek(), Some(Token::NewLine)) {
            self.advance();
        }
    }

    /// Consumes the operand separator: a comma in strict mode,
    /// an optional comma in liberal mode.
    fn separator(&mut self) -> Result<(), ParseErr> {
        match self.peek() {
            Some(Token::Comma) => {
                self.advance();
                Ok(())
            },
            _ if self.opts.liberal => Ok(()),
            _ => Err(ParseErr::new(ParseErrKind::Expected("comma"), self.here())),
        }
    }

    fn expect_line_end(&mut self) -> Result<(), ParseErr> {
        match self.peek() {
            None => Ok(()),
            Some(Token::NewLine) => {
                self.advance();
                Ok(())
            },
            _ => Err(ParseErr::new(ParseErrKind::Expected("end of line"), self.here())),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseErr> {
        let mut labels = vec![];
        while matches!(self.peek(), Some(Token::Ident(Ident::Label(_)))) {
            let Some((Token::Ident(Ident::Label(name)), span)) = self.advance() else {
                unreachable!("peek guaranteed a label token");
            };
            labels.push(Label::new(name, span));

            if matches!(self.peek(), Some(Token::Colon)) {
                self.advance();
            }
            // labels may sit on their own line, above their statement
            self.skip_line_breaks();
        }

        let start = self.here().start;
        let nucleus = match self.peek() {
            Some(Token::Ident(_))     => StmtKind::Instr(self.parse_instr()?),
            Some(Token::Directive(_)) => StmtKind::Directive(self.parse_directive()?),
            _ => return Err(ParseErr::new(ParseErrKind::Expected("an instruction or directive"), self.here())),
        };
        let span = start..self.cursor;

        self.expect_line_end()?;
        Ok(Stmt { labels, nucleus, span })
    }

    fn parse_instr(&mut self) -> Result<AsmInstr, ParseErr> {
        let Some((Token::Ident(ident), span)) = self.advance() else {
            unreachable!("caller guaranteed an ident token");
        };

        let instr = match ident {
            Ident::ADD => {
                let dr = self.parse_reg()?;
                self.separator()?;
                let sr1 = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Add(dr, sr1, self.parse_imm_or_reg()?)
            },
            Ident::AND => {
                let dr = self.parse_reg()?;
                self.separator()?;
                let sr1 = self.parse_reg()?;
                self.separator()?;
                AsmInstr::And(dr, sr1, self.parse_imm_or_reg()?)
            },
            Ident::NOT => {
                let dr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Not(dr, self.parse_reg()?)
            },
            Ident::BR    => AsmInstr::Br(0b111, self.parse_pc_offset()?),
            Ident::BRNZP => AsmInstr::Br(0b111, self.parse_pc_offset()?),
            Ident::BRN   => AsmInstr::Br(0b100, self.parse_pc_offset()?),
            Ident::BRZ   => AsmInstr::Br(0b010, self.parse_pc_offset()?),
            Ident::BRP   => AsmInstr::Br(0b001, self.parse_pc_offset()?),
            Ident::BRNZ  => AsmInstr::Br(0b110, self.parse_pc_offset()?),
            Ident::BRNP  => AsmInstr::Br(0b101, self.parse_pc_offset()?),
            Ident::BRZP  => AsmInstr::Br(0b011, self.parse_pc_offset()?),
            Ident::JMP   => AsmInstr::Jmp(self.parse_reg()?),
            Ident::JSR   => AsmInstr::Jsr(self.parse_pc_offset()?),
            Ident::JSRR  => AsmInstr::Jsrr(self.parse_reg()?),
            Ident::LD => {
                let dr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Ld(dr, self.parse_pc_offset()?)
            },
            Ident::LDI => {
                let dr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Ldi(dr, self.parse_pc_offset()?)
            },
            Ident::LDR => {
                let dr = self.parse_reg()?;
                self.separator()?;
                let br = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Ldr(dr, br, self.parse_signed()?)
            },
            Ident::LEA => {
                let dr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Lea(dr, self.parse_pc_offset()?)
            },
            Ident::ST => {
                let sr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::St(sr, self.parse_pc_offset()?)
            },
            Ident::STI => {
                let sr = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Sti(sr, self.parse_pc_offset()?)
            },
            Ident::STR => {
                let sr = self.parse_reg()?;
                self.separator()?;
                let br = self.parse_reg()?;
                self.separator()?;
                AsmInstr::Str(sr, br, self.parse_signed()?)
            },
            Ident::TRAP => AsmInstr::Trap(self.parse_trap_vect()?),
            Ident::NOP   => AsmInstr::Nop,
            Ident::RET   => AsmInstr::Ret,
            Ident::RTI   => AsmInstr::Rti,
            Ident::GETC  => AsmInstr::Getc,
            Ident::OUT | Ident::PUTC => AsmInstr::Out,
            Ident::PUTS  => AsmInstr::Puts,
            Ident::IN    => AsmInstr::In,
            Ident::PUTSP => AsmInstr::Putsp,
            Ident::HALT  => AsmInstr::Halt,
            Ident::Label(_) => return Err(ParseErr::new(ParseErrKind::Expected("an instruction"), span)),
        };

        Ok(instr)
    }

    fn parse_reg(&mut self) -> Result<Reg, ParseErr> {
        match self.peek() {
            Some(&Token::Reg(no)) => {
                self.advance();
                Ok(Reg(no))
            },
            _ => Err(ParseErr::new(ParseErrKind::Expected("a register"), self.here())),
        }
    }

    /// Parses a numeric token as a signed `N`-bit value.
    fn parse_signed<const N: u32>(&mut self) -> Result<IOffset<N>, ParseErr> {
        let off = match self.peek() {
            Some(&Token::Unsigned(n)) => {
                i16::try_from(n)
                    .map_err(|_| OffsetNewErr::CannotFitSigned(N))
                    .and_then(IOffset::<N>::new)
            },
            Some(&Token::Signed(n)) => IOffset::<N>::new(n),
            _ => return Err(ParseErr::new(ParseErrKind::Expected("an immediate value"), self.here())),
        };
        let span = self.here();
        self.advance();
        off.map_err(|e| ParseErr::new(ParseErrKind::Offset(e), span))
    }

    fn parse_imm_or_reg<const N: u32>(&mut self) -> Result<ImmOrReg<N>, ParseErr> {
        match self.peek() {
            Some(Token::Reg(_)) => Ok(ImmOrReg::Reg(self.parse_reg()?)),
            Some(Token::Unsigned(_) | Token::Signed(_)) => Ok(ImmOrReg::Imm(self.parse_signed()?)),
            _ => Err(ParseErr::new(ParseErrKind::Expected("a register or immediate value"), self.here())),
        }
    }

    /// Parses a PC-relative operand: a label or a signed `N`-bit offset.
    fn parse_pc_offset<const N: u32>(&mut self) -> Result<PCOffset<i16, N>, ParseErr> {
        match self.peek() {
            Some(Token::Ident(Ident::Label(_))) => {
                let Some((Token::Ident(Ident::Label(name)), span)) = self.advance() else {
                    unreachable!("peek guaranteed a label token");
                };
                Ok(PCOffset::Label(Label::new(name, span)))
            },
            Some(Token::Unsigned(_) | Token::Signed(_)) => Ok(PCOffset::Offset(self.parse_signed()?)),
            _ => Err(ParseErr::new(ParseErrKind::Expected("a label or offset"), self.here())),
        }
    }

    fn parse_trap_vect(&mut self) -> Result<TrapVect8, ParseErr> {
        match self.peek() {
            Some(&Token::Unsigned(n)) => {
                let span = self.here();
                self.advance();
                TrapVect8::new(n).map_err(|e| ParseErr::new(ParseErrKind::Offset(e), span))
            },
            _ => Err(ParseErr::new(ParseErrKind::Expected("a trap vector"), self.here())),
        }
    }

    fn parse_directive(&mut self) -> Result<Directive, ParseErr> {
        let Some((Token::Directive(name), span)) = self.advance() else {
            unreachable!("caller guaranteed a directive token");
        };

        let directive = match &*name.to_lowercase() {
            "orig" => Directive::Orig(self.parse_addr()?),
            "fill" => {
                let operand = match self.peek() {
                    Some(Token::Ident(Ident::Label(_))) => {
                        let Some((Token::Ident(Ident::Label(name)), span)) = self.advance() else {
                            unreachable!("peek guaranteed a label token");
                        };
                        PCOffset::Label(Label::new(name, span))
                    },
                    Some(&Token::Unsigned(n)) => {
                        self.advance();
                        PCOffset::Offset(Offset::new_trunc(n))
                    },
                    Some(&Token::Signed(n)) => {
                        self.advance();
                        PCOffset::Offset(Offset::new_trunc(n as u16))
                    },
                    _ => return Err(ParseErr::new(ParseErrKind::Expected("a value or label"), self.here())),
                };
                Directive::Fill(operand)
            },
            "blkw" => Directive::Blkw(self.parse_addr()?),
            "stringz" => match self.advance() {
                Some((Token::String(s), _)) => Directive::Stringz(s),
                Some((_, span)) => return Err(ParseErr::new(ParseErrKind::Expected("a string literal"), span)),
                None => return Err(ParseErr::new(ParseErrKind::Expected("a string literal"), self.here())),
            },
            "external" => match self.advance() {
                Some((Token::Ident(Ident::Label(name)), span)) => Directive::External(Label::new(name, span)),
                Some((_, span)) => return Err(ParseErr::new(ParseErrKind::Expected("a label"), span)),
                None => return Err(ParseErr::new(ParseErrKind::Expected("a label"), self.here())),
            },
            "end" => Directive::End,
            _ => return Err(ParseErr::new(ParseErrKind::UnknownDirective(name), span)),
        };

        Ok(directive)
    }

    /// Parses an unsigned 16-bit operand (for `.orig` and `.blkw`).
    fn parse_addr(&mut self) -> Result<Offset<u16, 16>, ParseErr> {
        match self.peek() {
            Some(&Token::Unsigned(n)) => {
                self.advance();
                Ok(Offset::new_trunc(n))
            },
            _ => Err(ParseErr::new(ParseErrKind::Expected("an address"), self.here())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::asm::{AsmInstr, Directive, Stmt, StmtKind};
    use crate::ast::reg_consts::{R0, R1, R2};
    use crate::ast::{ImmOrReg, Offset, PCOffset};

    use super::{parse_ast, parse_ast_with, ParseErrKind, ParseOpts};

    fn nuclei(stmts: Vec<Stmt>) -> Vec<StmtKind> {
        stmts.into_iter().map(|s| s.nucleus).collect()
    }

    #[test]
    fn test_basic_program() {
        let ast = parse_ast("
            .orig x3000
            AND R0, R0, #0
            ADD R0, R0, #5
            HALT
            .end
        ").unwrap();

        assert_eq!(nuclei(ast), vec![
            StmtKind::Directive(Directive::Orig(Offset::new_trunc(0x3000))),
            StmtKind::Instr(AsmInstr::And(R0, R0, ImmOrReg::Imm(Offset::new_trunc(0)))),
            StmtKind::Instr(AsmInstr::Add(R0, R0, ImmOrReg::Imm(Offset::new_trunc(5)))),
            StmtKind::Instr(AsmInstr::Halt),
            StmtKind::Directive(Directive::End),
        ]);
    }

    #[test]
    fn test_labels() {
        let ast = parse_ast("
            .orig x3000
            LOOP ADD R1, R1, #-1
            BRp LOOP
            DONE: HALT
            VALUE
            .fill x1234
            .end
        ").unwrap();

        let labels: Vec<Vec<String>> = ast.iter()
            .map(|s| s.labels.iter().map(|l| l.name.clone()).collect())
            .collect();
        assert_eq!(labels, vec![
            Vec::<String>::new(),
            vec!["LOOP".to_string()],
            vec![],
            vec!["DONE".to_string()],
            vec!["VALUE".to_string()],
            vec![],
        ]);

        // label spans point at the label text
        let src = "\n.orig x3000\nLOOP ADD R1, R1, #-1\nBR LOOP\n.end\n";
        let ast = parse_ast(src).unwrap();
        let span = ast[1].labels[0].span();
        assert_eq!(&src[span], "LOOP");
    }

    #[test]
    fn test_operand_forms() {
        let ast = parse_ast("
            .orig x3000
            ADD R0, R1, R2
            LDR R0, R1, #-3
            STR R0, R1, x-3
            TRAP x25
            JSR SUBR
            .end
        ").unwrap();

        assert_eq!(nuclei(ast)[1..5], [
            StmtKind::Instr(AsmInstr::Add(R0, R1, ImmOrReg::Reg(R2))),
            StmtKind::Instr(AsmInstr::Ldr(R0, R1, Offset::new_trunc(-3))),
            StmtKind::Instr(AsmInstr::Str(R0, R1, Offset::new_trunc(-3))),
            StmtKind::Instr(AsmInstr::Trap(Offset::new_trunc(0x25))),
        ]);
    }

    #[test]
    fn test_strict_commas() {
        // strict mode requires commas
        let result = parse_ast(".orig x3000\nADD R0 R0 #0\n.end");
        assert!(matches!(result, Err(e) if e.kind == ParseErrKind::Expected("comma")));

        // liberal mode does not
        let liberal = ParseOpts { liberal: true };
        let ast = parse_ast_with(".orig x3000\nADD R0 R0 #0\nAND R1, R1 #7\n.end", liberal).unwrap();
        assert_eq!(nuclei(ast)[1..3], [
            StmtKind::Instr(AsmInstr::Add(R0, R0, ImmOrReg::Imm(Offset::new_trunc(0)))),
            StmtKind::Instr(AsmInstr::And(R1, R1, ImmOrReg::Imm(Offset::new_trunc(7)))),
        ]);
    }

    #[test]
    fn test_operand_range() {
        // imm5 holds [-16, 15]
        let result = parse_ast(".orig x3000\nADD R0, R0, #16\n.end");
        assert!(matches!(result, Err(e) if matches!(e.kind, ParseErrKind::Offset(_))));

        let result = parse_ast(".orig x3000\nADD R0, R0, #-17\n.end");
        assert!(matches!(result, Err(e) if matches!(e.kind, ParseErrKind::Offset(_))));

        assert!(parse_ast(".orig x3000\nADD R0, R0, #15\n.end").is_ok());
    }

    #[test]
    fn test_bad_directive() {
        let result = parse_ast(".orig x3000\n.word 5\n.end");
        assert!(matches!(result, Err(e) if e.kind == ParseErrKind::UnknownDirective("word".to_string())));
    }

    #[test]
    fn test_trailing_garbage() {
        let result = parse_ast(".orig x3000\nHALT HALT\n.end");
        assert!(matches!(result, Err(e) if e.kind == ParseErrKind::Expected("end of line")));
    }

    #[test]
    fn test_fill_forms() {
        let ast = parse_ast("
            .orig x3000
            A .fill 5
            B .fill x8000
            C .fill #-2
            D .fill SOMEWHERE
            .end
        ").unwrap();

        assert_eq!(nuclei(ast)[1..4], [
            StmtKind::Directive(Directive::Fill(PCOffset::Offset(Offset::new_trunc(5)))),
            StmtKind::Directive(Directive::Fill(PCOffset::Offset(Offset::new_trunc(0x8000)))),
            StmtKind::Directive(Directive::Fill(PCOffset::Offset(Offset::new_trunc(0xFFFE)))),
        ]);
        assert!(matches!(
            &nuclei(parse_ast(".external X\n.orig x3000\n.fill X\n.end").unwrap())[2],
            StmtKind::Directive(Directive::Fill(PCOffset::Label(lb))) if lb.name == "X"
        ));
    }
}
