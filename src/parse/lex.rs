//! Tokenizing MIPS assembly.
//!
//! This module holds the tokens that characterize a line of MIPS
//! assembly ([`Token`]). It is used by the parser to convert source
//! lines into statements.
//!
//! Lexing is line-at-a-time: `#` comments and horizontal whitespace are
//! skipped, and malformed lexemes become [`LexErr`] items in the token
//! stream rather than aborting the lexer.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::Reg;

/// A unit of information in a line of MIPS source code.
#[derive(Debug, Logos, PartialEq, Clone)]
#[logos(skip r"([ \t\r]+|#[^\n]*)", error = LexErr)]
pub enum Token {
    // These regexes span over lexemes that are technically invalid
    // (e.g., 23trst matches as an integer even though it shouldn't).
    // This is intended: the regex collects one discernable unit and the
    // callback validates it.

    /// A register operand (e.g., `$t0`, `$sp`, `$29`), resolved to its number.
    #[regex(r"\$[A-Za-z0-9]*", lex_reg)]
    Reg(Reg),

    /// An identifier: a mnemonic, a label, or a directive (e.g., `add`,
    /// `loop`, `.word`).
    #[regex(r"[A-Za-z_.][A-Za-z0-9_.]*", |lx| lx.slice().to_string())]
    Ident(String),

    /// An integer literal.
    ///
    /// Accepted forms are decimal (`42`, `-7`), hex (`0x1F`), octal
    /// (`0755`), and character literals (`'a'`, `'\n'`). The value must
    /// fit in `[-2^31, 2^32)`.
    #[regex(r"-?[0-9][0-9A-Za-z]*", lex_int)]
    #[token("'", lex_char_literal)]
    Int(i64),

    /// A string literal (e.g., `"Hello, world!\n"`), with escapes processed.
    #[token("\"", lex_str_literal)]
    String(String),

    /// A comma, which separates operands.
    #[token(",")]
    Comma,

    /// An opening parenthesis (the base register of a load/store).
    #[token("(")]
    LParen,

    /// A closing parenthesis.
    #[token(")")]
    RParen,

    /// A colon, which follows a label definition.
    #[token(":")]
    Colon,

    /// The end-of-line sentinel.
    ///
    /// Never produced by the lexer itself (input lines contain no `\n`);
    /// [`tokenize`] appends it after the last lexeme.
    ///
    /// [`tokenize`]: crate::parse::tokenize
    #[token("\n")]
    Eol,
}

/// Any errors raised in attempting to tokenize a line.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Integer literal does not fit in `[-2^31, 2^32)`.
    IntOutOfRange,
    /// Integer literal has a digit invalid for its base (or trailing junk).
    InvalidDigit,
    /// Integer literal has a base prefix but no digits (e.g. `0x`).
    EmptyInt,
    /// A `$` lexeme that names no register.
    UnknownReg,
    /// String literal is missing its closing quote.
    UnclosedString,
    /// Char literal is missing its closing quote (or is empty).
    UnclosedChar,
    /// A symbol was used which no MIPS token starts with.
    #[default]
    InvalidSymbol,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::IntOutOfRange  => f.write_str("integer literal out of range"),
            LexErr::InvalidDigit   => f.write_str("invalid digit in integer literal"),
            LexErr::EmptyInt       => f.write_str("integer literal has no digits"),
            LexErr::UnknownReg     => f.write_str("unknown register"),
            LexErr::UnclosedString => f.write_str("unclosed string literal"),
            LexErr::UnclosedChar   => f.write_str("unclosed char literal"),
            LexErr::InvalidSymbol  => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::IntOutOfRange  => Some(format!("integer literals must fit in [{}, {}]", i32::MIN, u32::MAX).into()),
            LexErr::InvalidDigit   => Some("integer literals are decimal, hex (0x1F), or octal (0755)".into()),
            LexErr::EmptyInt       => Some("there should be digits here".into()),
            LexErr::UnknownReg     => Some("registers are $zero, $at, $v0-$v1, $a0-$a3, $t0-$t9, $s0-$s8, $k0-$k1, $gp, $sp, $fp, $ra, or $0-$31".into()),
            LexErr::UnclosedString => Some("add a quote to the end of the string literal".into()),
            LexErr::UnclosedChar   => Some("char literals hold one character, like 'a' or '\\n'".into()),
            LexErr::InvalidSymbol  => Some("this char does not occur in any MIPS assembly token".into()),
        }
    }
}

fn lex_reg(lx: &Lexer<'_, Token>) -> Result<Reg, LexErr> {
    Reg::from_name(&lx.slice()[1..]).ok_or(LexErr::UnknownReg)
}

fn lex_int(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    let slice = lx.slice();
    let (neg, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None       => (false, slice),
    };

    // Base detection: 0x/0X is hex, a leading 0 followed by more digits
    // is octal, anything else is decimal.
    let (base, body) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if body.is_empty() {
        return Err(LexErr::EmptyInt);
    }

    let magnitude = u64::from_str_radix(body, base).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => LexErr::IntOutOfRange,
        _ => LexErr::InvalidDigit,
    })?;

    let value = match neg {
        true  => -(magnitude as i128),
        false => magnitude as i128,
    };
    match (i64::from(i32::MIN) as i128 ..= i64::from(u32::MAX) as i128).contains(&value) {
        true  => Ok(value as i64),
        false => Err(LexErr::IntOutOfRange),
    }
}

fn lex_char_literal(lx: &mut Lexer<'_, Token>) -> Result<i64, LexErr> {
    let rem = lx.remainder();
    let mut chars = rem.char_indices();

    let body = match chars.next() {
        Some((_, '\\')) => match chars.next() {
            Some((_, esc)) => unescape(esc),
            None => {
                lx.bump(rem.len());
                return Err(LexErr::UnclosedChar);
            }
        },
        // '' and a stray ' are both malformed
        Some((_, '\'')) | None => {
            lx.bump(rem.len().min(1));
            return Err(LexErr::UnclosedChar);
        }
        Some((_, c)) => c,
    };

    match chars.next() {
        Some((i, '\'')) => {
            lx.bump(i + 1);
            Ok(i64::from(u32::from(body)))
        }
        _ => {
            lx.bump(rem.len());
            Err(LexErr::UnclosedChar)
        }
    }
}

fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    let rem = lx.remainder();
    let mut buf = String::new();
    let mut chars = rem.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                lx.bump(i + 1);
                return Ok(buf);
            }
            '\\' => match chars.next() {
                Some((_, esc)) => {
                    if !matches!(esc, 'n' | 'r' | 't' | '0' | '\\' | '"') {
                        buf.push('\\');
                    }
                    buf.push(unescape(esc));
                }
                None => break,
            },
            c => buf.push(c),
        }
    }

    lx.bump(rem.len());
    Err(LexErr::UnclosedString)
}

/// Resolves the character following a backslash.
/// Unknown escapes resolve to the escaped character itself.
fn unescape(c: char) -> char {
    match c {
        'n'  => '\n',
        'r'  => '\r',
        't'  => '\t',
        '0'  => '\0',
        c    => c,
    }
}
