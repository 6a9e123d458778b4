//! Error reporting for the toolchain.
//!
//! Every user-facing error in this crate (lexing, parsing, assembling,
//! `.bin` conversion, linking, simulation) implements the [`Error`] trait,
//! which extends [`std::error::Error`] with two reporting hooks:
//! - [`Error::span`]: where in the source the error occurred, and
//! - [`Error::help`]: a hint on how to fix it.
//!
//! Frontends can use these to render diagnostics with source underlines
//! without knowing which phase of the toolchain produced the error.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::AsmErr;
pub use crate::asm::bin::BinErr;
pub use crate::ctrl::ExecErr;
pub use crate::engine::EngineErr;
pub use crate::link::LinkErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::ParseErr;
pub use crate::sim::SimErr;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The segment(s) of source code which caused this error.
    ///
    /// If this is `None`, the error is not tied to a location in source
    /// (e.g., runtime faults, link conflicts between files).
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A hint describing how the error could be resolved, if one is available.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// One or more byte ranges into the source text tied to an error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrSpan {
    /// One contiguous span.
    One(Range<usize>),
    /// Exactly two spans (e.g., both definitions of a duplicate label).
    Two([Range<usize>; 2]),
    /// Three or more spans.
    Many(Vec<Range<usize>>)
}
impl ErrSpan {
    /// The first span (in argument order, not necessarily source order).
    pub fn first(&self) -> Range<usize> {
        match self {
            ErrSpan::One(r)   => r.clone(),
            ErrSpan::Two([r, _]) => r.clone(),
            ErrSpan::Many(rs) => rs.first().cloned().unwrap_or(0..0),
        }
    }

    /// Iterates over all spans.
    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        match self {
            ErrSpan::One(r)   => std::slice::from_ref(r).iter(),
            ErrSpan::Two(rs)  => rs.iter(),
            ErrSpan::Many(rs) => rs.iter(),
        }
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl From<[Range<usize>; 2]> for ErrSpan {
    fn from(value: [Range<usize>; 2]) -> Self {
        ErrSpan::Two(value)
    }
}
impl From<(Range<usize>, Range<usize>)> for ErrSpan {
    fn from((a, b): (Range<usize>, Range<usize>)) -> Self {
        ErrSpan::Two([a, b])
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(mut value: Vec<Range<usize>>) -> Self {
        match value.len() {
            1 => ErrSpan::One(value.swap_remove(0)),
            2 => {
                let b = value.swap_remove(1);
                let a = value.swap_remove(0);
                ErrSpan::Two([a, b])
            },
            _ => ErrSpan::Many(value),
        }
    }
}
