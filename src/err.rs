//! Error types and diagnostic reporting.
//!
//! All of the fallible stages of the pipeline produce errors implementing
//! the [`Error`] trait of this module, which extends [`std::error::Error`]
//! with two optional pieces of diagnostic information:
//! - [`Error::span`]: where in the offending source line the error occurred
//! - [`Error::help`]: a suggestion on how to resolve the error
//!
//! The interpreter is the single recovery boundary of the crate and uses
//! [`report`] to render these diagnostics.
//!
//! The error types themselves are defined in the module that raises them
//! and re-exported here for convenience:
//! - [`LexErr`]: tokenization errors
//! - [`ParseErr`]: statement parsing errors
//! - [`AsmErr`]: assembly and label resolution errors
//! - [`SimErr`]: runtime (execution) errors

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::{AsmErr, AsmErrKind};
pub use crate::parse::lex::LexErr;
pub use crate::parse::{ParseErr, ParseErrKind};
pub use crate::sim::SimErr;

/// Unified error interface for all of this crate's error types.
pub trait Error: std::error::Error {
    /// The space in source code where this error occurs.
    ///
    /// If `None`, the error does not point to a specific place
    /// in the source line (e.g., a segment overflow).
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A simple help message that can be displayed alongside the error.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// The possible source ranges an error can point at:
/// one contiguous range of a line, or several.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrSpan {
    /// One contiguous range.
    One(Range<usize>),
    /// Several ranges (e.g., both definitions of a duplicated label).
    Many(Vec<Range<usize>>)
}
impl ErrSpan {
    /// The first range of this span.
    pub fn first(&self) -> Range<usize> {
        match self {
            ErrSpan::One(r) => r.clone(),
            ErrSpan::Many(rs) => rs.first().cloned().unwrap_or(0..0),
        }
    }

    /// Iterates over all ranges of this span.
    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let (one, many): (Option<Range<usize>>, &[Range<usize>]) = match self {
            ErrSpan::One(r)    => (Some(r.clone()), &[]),
            ErrSpan::Many(rs)  => (None, rs.as_slice()),
        };

        one.into_iter().chain(many.iter().cloned())
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(mut value: Vec<Range<usize>>) -> Self {
        match value.len() {
            1 => ErrSpan::One(value.swap_remove(0)),
            _ => ErrSpan::Many(value),
        }
    }
}

/// Renders a diagnostic for an error raised while processing `line`.
///
/// The rendering consists of the error's message, the offending line with
/// a `~~~` underline beneath the spans the error points at (if any), and
/// the error's help message (if any):
///
/// ```text
/// error: immediate out of 16-bit signed range
///    3 | addi $t0, $zero, 0x8000
///      |                  ~~~~~~
/// help: the range for a 16-bit signed immediate is [-32768, 32767]
/// ```
pub fn report(err: &dyn Error, line: &str, line_no: u32) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "error: {err}");

    if let Some(span) = err.span() {
        let gutter = format!("{line_no:>4}");
        let _ = writeln!(out, "{gutter} | {line}");

        let mut underline: Vec<u8> = vec![b' '; line.len()];
        for range in span.iter() {
            for cell in underline.iter_mut().take(range.end.min(line.len())).skip(range.start) {
                *cell = b'~';
            }
        }
        // Spans at end-of-line (e.g., a missing operand) still get one marker.
        if span.first().start >= line.len() {
            underline.push(b'~');
        }

        let underline = String::from_utf8(underline).unwrap_or_default();
        let _ = writeln!(out, "{:>4} | {}", "", underline.trim_end());
    }

    if let Some(help) = err.help() {
        let _ = writeln!(out, "help: {help}");
    }

    out
}
