//! Parsing a tokenized line into a statement.
//!
//! This module is used to convert one line of source code into a
//! [`Stmt`] (an optional label binding plus an optional instruction or
//! directive).
//!
//! The parsing process is:
//! 1. [`tokenize`] the line (tokens and spans, ending with an EOL sentinel);
//! 2. bind a leading `label:` if present;
//! 3. resolve the mnemonic against the pseudo table, the instruction
//!    table, or the directive set;
//! 4. validate the remaining tokens against the shape's expected pattern
//!    and extract the operands, range-checking immediates.

pub mod lex;

use std::borrow::Cow;
use std::ops::Range;

use logos::Logos;

use crate::ast::asm::{instr_info, pseudo_op, AsmInstr, Directive, InstrInfo, Pseudo, Shape, Stmt, StmtKind};
use crate::ast::{Label, Reg};
use crate::err::{ErrSpan, Error as _};
use crate::inst::{OP_ANDI, OP_LUI, OP_ORI};

use self::lex::{LexErr, Token};

/// One lexed token (or lexical error) with its span in the line.
#[derive(Debug, PartialEq, Clone)]
pub struct TokenAt {
    /// The token, or the lexical error that its lexeme produced.
    pub tok: Result<Token, LexErr>,
    /// The byte range of the lexeme within the line.
    pub span: Range<usize>,
}

/// Lexes one line into a token vector ending with an EOL sentinel.
///
/// This never fails: malformed lexemes appear as `Err` items which the
/// parser rejects when it reaches them.
pub fn tokenize(line: &str) -> Vec<TokenAt> {
    let mut toks: Vec<_> = Token::lexer(line)
        .spanned()
        .map(|(tok, span)| TokenAt { tok, span })
        .collect();

    toks.push(TokenAt { tok: Ok(Token::Eol), span: line.len()..line.len() });
    toks
}

/// The kind of a token, used for pattern validation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum TokenKind {
    Ident,
    Reg,
    Int,
    Str,
    Comma,
    LParen,
    RParen,
    Colon,
    Error,
    Eol,
}
impl TokenAt {
    fn kind(&self) -> TokenKind {
        match &self.tok {
            Ok(Token::Ident(_))  => TokenKind::Ident,
            Ok(Token::Reg(_))    => TokenKind::Reg,
            Ok(Token::Int(_))    => TokenKind::Int,
            Ok(Token::String(_)) => TokenKind::Str,
            Ok(Token::Comma)     => TokenKind::Comma,
            Ok(Token::LParen)    => TokenKind::LParen,
            Ok(Token::RParen)    => TokenKind::RParen,
            Ok(Token::Colon)     => TokenKind::Colon,
            Ok(Token::Eol)       => TokenKind::Eol,
            Err(_)               => TokenKind::Error,
        }
    }
}

/// Kinds of errors that can occur from parsing a line.
///
/// See [`ParseErr`] for this error type with span information included.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrKind {
    /// A lexeme could not be tokenized.
    Lex(LexErr),
    /// The line does not start with a mnemonic or directive.
    ExpectedMnemonic,
    /// The mnemonic names no known instruction or pseudo-instruction.
    UnknownMnemonic(String),
    /// The directive is not supported.
    UnknownDirective(String),
    /// The operand tokens do not match the mnemonic's expected pattern.
    UnknownPattern,
    /// Immediate out of 16-bit signed range.
    ImmSignedRange,
    /// Immediate out of 16-bit unsigned range.
    ImmUnsignedRange,
    /// Shift amount outside 0..=31.
    ShamtRange,
    /// `.byte` value outside [-128, 255].
    ByteRange,
    /// `.half` value outside [-32768, 65535].
    HalfRange,
    /// A directive that requires values got none.
    EmptyDirective,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)              => e.fmt(f),
            Self::ExpectedMnemonic    => f.write_str("expected instruction mnemonic at start of line"),
            Self::UnknownMnemonic(m)  => write!(f, "unknown instruction: {m}"),
            Self::UnknownDirective(d) => write!(f, "unknown directive: {d}"),
            Self::UnknownPattern      => f.write_str("unknown assembly pattern"),
            Self::ImmSignedRange      => f.write_str("immediate out of 16-bit signed range"),
            Self::ImmUnsignedRange    => f.write_str("immediate out of 16-bit unsigned range"),
            Self::ShamtRange          => f.write_str("shift amount out of range 0..=31"),
            Self::ByteRange           => f.write_str(".byte value out of range"),
            Self::HalfRange           => f.write_str(".half value out of range"),
            Self::EmptyDirective      => f.write_str("directive requires at least one value"),
        }
    }
}

/// Error from parsing a line.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The span in the line associated with this error.
    pub span: ErrSpan,
}
impl ParseErr {
    fn new<S: Into<ErrSpan>>(kind: ParseErrKind, span: S) -> Self {
        ParseErr { kind, span: span.into() }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Lex(e) => Some(e),
            _ => None,
        }
    }
}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone())
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            ParseErrKind::Lex(e)             => e.help(),
            ParseErrKind::ExpectedMnemonic   => Some("a line is `[label:] [mnemonic operands | .directive ...]`".into()),
            ParseErrKind::UnknownMnemonic(_) => None,
            ParseErrKind::UnknownDirective(_) => Some("supported directives are .text, .data, .word, .half, .byte, .ascii, .asciiz".into()),
            ParseErrKind::UnknownPattern     => None,
            ParseErrKind::ImmSignedRange     => Some(format!("the range for a 16-bit signed immediate is [{}, {}]", i16::MIN, i16::MAX).into()),
            ParseErrKind::ImmUnsignedRange   => Some(format!("the range for a 16-bit unsigned immediate is [0, {}]", u16::MAX).into()),
            ParseErrKind::ShamtRange         => Some("shift amounts are 0 through 31".into()),
            ParseErrKind::ByteRange          => Some("the range for a byte is [-128, 255]".into()),
            ParseErrKind::HalfRange          => Some(format!("the range for a half-word is [{}, {}]", i16::MIN, u16::MAX).into()),
            ParseErrKind::EmptyDirective     => None,
        }
    }
}

// Expected operand patterns after the mnemonic, per shape.
const PAT_R3: &[TokenKind]       = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Eol];
const PAT_RSHIFT: &[TokenKind]   = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Comma, TokenKind::Int, TokenKind::Eol];
const PAT_I_ARITH: &[TokenKind]  = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Comma, TokenKind::Int, TokenKind::Eol];
const PAT_LUI: &[TokenKind]      = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Int, TokenKind::Eol];
const PAT_I_LS: &[TokenKind]     = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Int, TokenKind::LParen, TokenKind::Reg, TokenKind::RParen, TokenKind::Eol];
const PAT_LS_LABEL: &[TokenKind] = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Ident, TokenKind::Eol];
const PAT_I_BRANCH: &[TokenKind] = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Comma, TokenKind::Ident, TokenKind::Eol];
const PAT_I_BRANCH1: &[TokenKind] = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Ident, TokenKind::Eol];
const PAT_JUMP: &[TokenKind]     = &[TokenKind::Ident, TokenKind::Eol];
const PAT_SYSCALL: &[TokenKind]  = &[TokenKind::Eol];
const PAT_ONE_REG: &[TokenKind]  = &[TokenKind::Reg, TokenKind::Eol];
const PAT_TWO_REG: &[TokenKind]  = &[TokenKind::Reg, TokenKind::Comma, TokenKind::Reg, TokenKind::Eol];

/// A cursor over the tokens of one line.
struct LineParser<'t> {
    toks: &'t [TokenAt],
    idx: usize,
}
impl<'t> LineParser<'t> {
    fn new(toks: &'t [TokenAt]) -> Self {
        LineParser { toks, idx: 0 }
    }

    /// The token at the cursor. The EOL sentinel makes running past the
    /// end impossible for well-formed token vectors.
    fn peek(&self) -> &'t TokenAt {
        self.toks.get(self.idx).unwrap_or_else(|| {
            self.toks.last().unwrap_or_else(|| unreachable!("token vector should end with EOL"))
        })
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind()
    }

    fn span(&self) -> Range<usize> {
        self.peek().span.clone()
    }

    fn bump(&mut self) -> &'t TokenAt {
        let t = self.peek();
        self.idx += 1;
        t
    }

    /// Rejects the line if it contains any lexical error, pointing at the
    /// first offending lexeme.
    fn reject_lex_errors(&self) -> Result<(), ParseErr> {
        for t in self.toks {
            if let Err(e) = &t.tok {
                return Err(ParseErr::new(ParseErrKind::Lex(*e), t.span.clone()));
            }
        }
        Ok(())
    }

    /// Validates that the remaining tokens match `pattern` exactly.
    fn check_pattern(&self, pattern: &[TokenKind]) -> Result<(), ParseErr> {
        let mut i = self.idx;
        for &expected in pattern {
            let Some(t) = self.toks.get(i) else {
                return Err(ParseErr::new(ParseErrKind::UnknownPattern, self.end_span()));
            };
            if t.kind() != expected {
                return Err(ParseErr::new(ParseErrKind::UnknownPattern, t.span.clone()));
            }
            i += 1;
        }
        Ok(())
    }

    /// Whether the remaining tokens match `pattern` (without erroring).
    fn matches_pattern(&self, pattern: &[TokenKind]) -> bool {
        self.check_pattern(pattern).is_ok()
    }

    fn end_span(&self) -> Range<usize> {
        self.toks.last().map(|t| t.span.clone()).unwrap_or(0..0)
    }

    // The extractors below are called after pattern validation,
    // so the token kinds are already known to line up.

    fn reg(&mut self) -> Reg {
        match &self.bump().tok {
            Ok(Token::Reg(r)) => *r,
            t => unreachable!("pattern should have checked for register, found {t:?}"),
        }
    }

    fn int(&mut self) -> i64 {
        match &self.bump().tok {
            Ok(Token::Int(v)) => *v,
            t => unreachable!("pattern should have checked for integer, found {t:?}"),
        }
    }

    fn int_span(&mut self) -> (i64, Range<usize>) {
        let span = self.span();
        (self.int(), span)
    }

    fn label(&mut self) -> Label {
        let span = self.span();
        match &self.bump().tok {
            Ok(Token::Ident(name)) => Label::new(name.clone(), span),
            t => unreachable!("pattern should have checked for identifier, found {t:?}"),
        }
    }

    fn comma(&mut self) {
        self.idx += 1;
    }
}

/// Parses one tokenized line into a [`Stmt`].
///
/// ## Example
/// ```
/// use mipsim::parse::{parse_stmt, tokenize};
///
/// let stmt = parse_stmt(&tokenize("loop: addi $t0, $t0, 1")).unwrap();
/// assert_eq!(stmt.label.unwrap().name, "loop");
/// assert!(stmt.kind.is_some());
/// ```
pub fn parse_stmt(toks: &[TokenAt]) -> Result<Stmt, ParseErr> {
    let mut p = LineParser::new(toks);
    p.reject_lex_errors()?;

    // Leading `label:` binding.
    let label = match (p.kind(), toks.get(p.idx + 1).map(TokenAt::kind)) {
        (TokenKind::Ident, Some(TokenKind::Colon)) => {
            let label = p.label();
            p.comma(); // the colon
            Some(label)
        }
        _ => None,
    };

    // Empty or label-only line.
    if p.kind() == TokenKind::Eol {
        return Ok(Stmt { label, kind: None });
    }

    if p.kind() != TokenKind::Ident {
        return Err(ParseErr::new(ParseErrKind::ExpectedMnemonic, p.span()));
    }
    let mnemonic_span = p.span();
    let mnemonic = match &p.bump().tok {
        Ok(Token::Ident(m)) => m.clone(),
        _ => unreachable!("kind was checked to be an identifier"),
    };

    let kind = if mnemonic.starts_with('.') {
        StmtKind::Directive(parse_directive(&mnemonic, mnemonic_span, &mut p)?)
    } else if let Some(pseudo) = pseudo_op(&mnemonic) {
        StmtKind::Instr(parse_pseudo(pseudo, &mut p)?)
    } else if let Some(info) = instr_info(&mnemonic) {
        StmtKind::Instr(parse_real(info, &mut p)?)
    } else {
        return Err(ParseErr::new(ParseErrKind::UnknownMnemonic(mnemonic), mnemonic_span));
    };

    Ok(Stmt { label, kind: Some(kind) })
}

/// Parses the operands of a real instruction according to its shape.
fn parse_real(info: InstrInfo, p: &mut LineParser) -> Result<AsmInstr, ParseErr> {
    let instr = match info.shape {
        Shape::R3 => {
            p.check_pattern(PAT_R3)?;
            let rd = p.reg(); p.comma();
            let rs = p.reg(); p.comma();
            let rt = p.reg();
            AsmInstr::R3 { info, rd, rs, rt }
        }
        Shape::RShift => {
            p.check_pattern(PAT_RSHIFT)?;
            let rd = p.reg(); p.comma();
            let rt = p.reg(); p.comma();
            let (sh, span) = p.int_span();
            if !(0..=31).contains(&sh) {
                return Err(ParseErr::new(ParseErrKind::ShamtRange, span));
            }
            AsmInstr::RShift { info, rd, rt, shamt: sh as u8 }
        }
        Shape::IArith if info.opcode == OP_LUI => {
            // lui takes no rs operand.
            p.check_pattern(PAT_LUI)?;
            let rt = p.reg(); p.comma();
            let imm = parse_imm16(info, p)?;
            AsmInstr::IArith { info, rt, rs: crate::ast::reg_consts::ZERO, imm }
        }
        Shape::IArith => {
            p.check_pattern(PAT_I_ARITH)?;
            let rt = p.reg(); p.comma();
            let rs = p.reg(); p.comma();
            let imm = parse_imm16(info, p)?;
            AsmInstr::IArith { info, rt, rs, imm }
        }
        Shape::ILs if p.matches_pattern(PAT_LS_LABEL) => {
            // Label-addressed form: `lw $t0, msg`.
            let rt = p.reg(); p.comma();
            let target = p.label();
            AsmInstr::LsLabel { info, rt, target }
        }
        Shape::ILs => {
            p.check_pattern(PAT_I_LS)?;
            let rt = p.reg(); p.comma();
            let (off, span) = p.int_span();
            if !(i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&off) {
                return Err(ParseErr::new(ParseErrKind::ImmSignedRange, span));
            }
            p.comma(); // the lparen
            let base = p.reg();
            AsmInstr::ILs { info, rt, offset: off as i16, base }
        }
        Shape::IBranch => {
            p.check_pattern(PAT_I_BRANCH)?;
            let rs = p.reg(); p.comma();
            let rt = p.reg(); p.comma();
            let target = p.label();
            AsmInstr::IBranch { info, rs, rt, target }
        }
        Shape::IBranch1 => {
            p.check_pattern(PAT_I_BRANCH1)?;
            let rs = p.reg(); p.comma();
            let target = p.label();
            AsmInstr::IBranch1 { info, rs, target }
        }
        Shape::Jump => {
            p.check_pattern(PAT_JUMP)?;
            AsmInstr::Jump { info, target: p.label() }
        }
        Shape::Syscall => {
            p.check_pattern(PAT_SYSCALL)?;
            AsmInstr::Syscall
        }
        Shape::JrJalr => {
            p.check_pattern(PAT_ONE_REG)?;
            AsmInstr::JrJalr { info, rs: p.reg() }
        }
        Shape::RHilo1 => {
            p.check_pattern(PAT_ONE_REG)?;
            AsmInstr::RHilo1 { info, reg: p.reg() }
        }
        Shape::RHilo2 => {
            p.check_pattern(PAT_TWO_REG)?;
            let rs = p.reg(); p.comma();
            let rt = p.reg();
            AsmInstr::RHilo2 { info, rs, rt }
        }
    };

    Ok(instr)
}

/// Range-checks and masks a 16-bit immediate operand.
///
/// `andi`/`ori`/`lui` zero-extend at execution, so their operands are
/// unsigned; every other I-arithmetic immediate is sign-extended and its
/// operand is signed.
fn parse_imm16(info: InstrInfo, p: &mut LineParser) -> Result<u16, ParseErr> {
    let (v, span) = p.int_span();
    let zero_extending = matches!(info.opcode, OP_ANDI | OP_ORI | OP_LUI);

    if zero_extending {
        match (0..=i64::from(u16::MAX)).contains(&v) {
            true  => Ok(v as u16),
            false => Err(ParseErr::new(ParseErrKind::ImmUnsignedRange, span)),
        }
    } else {
        match (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&v) {
            true  => Ok(v as i16 as u16),
            false => Err(ParseErr::new(ParseErrKind::ImmSignedRange, span)),
        }
    }
}

/// Parses the operands of a pseudo-instruction.
fn parse_pseudo(pseudo: Pseudo, p: &mut LineParser) -> Result<AsmInstr, ParseErr> {
    let instr = match pseudo {
        Pseudo::Abs | Pseudo::Neg | Pseudo::Negu | Pseudo::Not | Pseudo::Move => {
            p.check_pattern(PAT_TWO_REG)?;
            let rd = p.reg(); p.comma();
            let rs = p.reg();
            match pseudo {
                Pseudo::Abs  => AsmInstr::Abs { rd, rs },
                Pseudo::Neg  => AsmInstr::Neg { rd, rs, trapping: true },
                Pseudo::Negu => AsmInstr::Neg { rd, rs, trapping: false },
                Pseudo::Not  => AsmInstr::Not { rd, rs },
                _            => AsmInstr::Move { rd, rs },
            }
        }
        Pseudo::Mul | Pseudo::Sge | Pseudo::Sgt => {
            p.check_pattern(PAT_R3)?;
            let rd = p.reg(); p.comma();
            let rs = p.reg(); p.comma();
            let rt = p.reg();
            match pseudo {
                Pseudo::Mul => AsmInstr::Mul { rd, rs, rt },
                op          => AsmInstr::SetCmp { op, rd, rs, rt },
            }
        }
        Pseudo::Blt | Pseudo::Ble | Pseudo::Bgt | Pseudo::Bge => {
            p.check_pattern(PAT_I_BRANCH)?;
            let rs = p.reg(); p.comma();
            let rt = p.reg(); p.comma();
            let target = p.label();
            AsmInstr::BranchCmp { op: pseudo, rs, rt, target }
        }
        Pseudo::B => {
            p.check_pattern(PAT_JUMP)?;
            AsmInstr::B { target: p.label() }
        }
        Pseudo::Li => {
            p.check_pattern(PAT_LUI)?;
            let rt = p.reg(); p.comma();
            // The lexer bounds integer literals to [-2^31, 2^32),
            // which is exactly li's domain.
            AsmInstr::Li { rt, imm: p.int() }
        }
        Pseudo::La => {
            p.check_pattern(PAT_LS_LABEL)?;
            let rt = p.reg(); p.comma();
            AsmInstr::La { rt, target: p.label() }
        }
    };

    Ok(instr)
}

/// Parses a directive and its operands.
fn parse_directive(name: &str, name_span: Range<usize>, p: &mut LineParser) -> Result<Directive, ParseErr> {
    match name {
        ".text" => {
            p.check_pattern(PAT_SYSCALL)?; // just EOL
            Ok(Directive::Text)
        }
        ".data" => {
            p.check_pattern(PAT_SYSCALL)?;
            Ok(Directive::Data)
        }
        ".word" => Ok(Directive::Word(parse_int_list(p, |v, _| Ok(v as u32))?)),
        ".half" => Ok(Directive::Half(parse_int_list(p, |v, span| {
            match (i64::from(i16::MIN)..=i64::from(u16::MAX)).contains(&v) {
                true  => Ok(v as u16),
                false => Err(ParseErr::new(ParseErrKind::HalfRange, span)),
            }
        })?)),
        ".byte" => Ok(Directive::Byte(parse_int_list(p, |v, span| {
            match (i64::from(i8::MIN)..=i64::from(u8::MAX)).contains(&v) {
                true  => Ok(v as u8),
                false => Err(ParseErr::new(ParseErrKind::ByteRange, span)),
            }
        })?)),
        ".ascii" | ".asciiz" => {
            if p.kind() != TokenKind::Str {
                return Err(ParseErr::new(ParseErrKind::UnknownPattern, p.span()));
            }
            let s = match &p.bump().tok {
                Ok(Token::String(s)) => s.clone(),
                _ => unreachable!("kind was checked to be a string"),
            };
            if p.kind() != TokenKind::Eol {
                return Err(ParseErr::new(ParseErrKind::UnknownPattern, p.span()));
            }
            Ok(match name {
                ".ascii" => Directive::Ascii(s),
                _        => Directive::Asciiz(s),
            })
        }
        _ => Err(ParseErr::new(ParseErrKind::UnknownDirective(name.to_string()), name_span)),
    }
}

/// Parses `.word`/`.half`/`.byte` operands: one or more integers,
/// optionally comma-separated.
fn parse_int_list<T>(
    p: &mut LineParser,
    convert: impl Fn(i64, Range<usize>) -> Result<T, ParseErr>,
) -> Result<Vec<T>, ParseErr> {
    let mut values = vec![];

    loop {
        match p.kind() {
            TokenKind::Int => {
                let (v, span) = p.int_span();
                values.push(convert(v, span)?);
            }
            TokenKind::Eol if !values.is_empty() => return Ok(values),
            TokenKind::Eol => return Err(ParseErr::new(ParseErrKind::EmptyDirective, p.span())),
            _ => return Err(ParseErr::new(ParseErrKind::UnknownPattern, p.span())),
        }

        // Optional separator between values.
        if p.kind() == TokenKind::Comma {
            p.comma();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::*;
    use crate::inst::{FUNCT_ADD, OP_ADDI, OP_BEQ, OP_RTYPE};

    fn parse(line: &str) -> Result<Stmt, ParseErr> {
        parse_stmt(&tokenize(line))
    }

    #[test]
    fn test_empty_lines() {
        assert_eq!(parse(""), Ok(Stmt::default()));
        assert_eq!(parse("   "), Ok(Stmt::default()));
        assert_eq!(parse("# just a comment"), Ok(Stmt::default()));
    }

    #[test]
    fn test_label_only() {
        let stmt = parse("main:").unwrap();
        assert_eq!(stmt.label.unwrap().name, "main");
        assert_eq!(stmt.kind, None);

        let stmt = parse("end:   # trailing comment").unwrap();
        assert_eq!(stmt.label.unwrap().name, "end");
    }

    #[test]
    fn test_label_span() {
        let stmt = parse("  loop: add $t0, $t1, $t2").unwrap();
        let label = stmt.label.unwrap();
        assert_eq!(label.name, "loop");
        assert_eq!(label.span(), 2..6);
    }

    #[test]
    fn test_r3() {
        let stmt = parse("add $t0, $t1, $t2").unwrap();
        let Some(StmtKind::Instr(AsmInstr::R3 { info, rd, rs, rt })) = stmt.kind else {
            panic!("expected R3 instruction, got {stmt:?}");
        };
        assert_eq!((info.opcode, info.funct), (OP_RTYPE, FUNCT_ADD));
        assert_eq!((rd, rs, rt), (T0, T1, T2));
    }

    #[test]
    fn test_i_arith() {
        let stmt = parse("addi $t0, $zero, -7").unwrap();
        let Some(StmtKind::Instr(AsmInstr::IArith { info, rt, rs, imm })) = stmt.kind else {
            panic!("expected IArith instruction, got {stmt:?}");
        };
        assert_eq!(info.opcode, OP_ADDI);
        assert_eq!((rt, rs), (T0, ZERO));
        assert_eq!(imm, (-7i16) as u16);
    }

    #[test]
    fn test_imm_ranges() {
        // signed boundary
        assert!(parse("addi $t0, $zero, 0x7FFF").is_ok());
        assert_eq!(parse("addi $t0, $zero, 0x8000").unwrap_err().kind, ParseErrKind::ImmSignedRange);
        assert!(parse("addi $t0, $zero, -32768").is_ok());
        assert_eq!(parse("addi $t0, $zero, -32769").unwrap_err().kind, ParseErrKind::ImmSignedRange);

        // unsigned boundary
        assert!(parse("ori $t0, $zero, 0xFFFF").is_ok());
        assert_eq!(parse("ori $t0, $zero, 0x10000").unwrap_err().kind, ParseErrKind::ImmUnsignedRange);
        assert_eq!(parse("ori $t0, $zero, -1").unwrap_err().kind, ParseErrKind::ImmUnsignedRange);
    }

    #[test]
    fn test_lui() {
        let stmt = parse("lui $t0, 0x1234").unwrap();
        let Some(StmtKind::Instr(AsmInstr::IArith { rt, rs, imm, .. })) = stmt.kind else {
            panic!("expected IArith instruction, got {stmt:?}");
        };
        assert_eq!((rt, rs, imm), (T0, ZERO, 0x1234));

        // three-operand lui is not a thing
        assert_eq!(parse("lui $t0, $t1, 4").unwrap_err().kind, ParseErrKind::UnknownPattern);
    }

    #[test]
    fn test_ls() {
        let stmt = parse("lw $t0, 4($sp)").unwrap();
        let Some(StmtKind::Instr(AsmInstr::ILs { rt, offset, base, .. })) = stmt.kind else {
            panic!("expected ILs instruction, got {stmt:?}");
        };
        assert_eq!((rt, offset, base), (T0, 4, SP));

        let stmt = parse("sw $t1, -8($fp)").unwrap();
        let Some(StmtKind::Instr(AsmInstr::ILs { rt, offset, base, .. })) = stmt.kind else {
            panic!("expected ILs instruction, got {stmt:?}");
        };
        assert_eq!((rt, offset, base), (T1, -8, FP));
    }

    #[test]
    fn test_ls_label_form() {
        let stmt = parse("lw $t0, msg").unwrap();
        let Some(StmtKind::Instr(AsmInstr::LsLabel { rt, target, .. })) = stmt.kind else {
            panic!("expected label-addressed load, got {stmt:?}");
        };
        assert_eq!(rt, T0);
        assert_eq!(target.name, "msg");
    }

    #[test]
    fn test_branch_and_jump() {
        let stmt = parse("beq $t0, $t1, loop").unwrap();
        let Some(StmtKind::Instr(AsmInstr::IBranch { info, rs, rt, target })) = stmt.kind else {
            panic!("expected IBranch instruction, got {stmt:?}");
        };
        assert_eq!(info.opcode, OP_BEQ);
        assert_eq!((rs, rt), (T0, T1));
        assert_eq!(target.name, "loop");

        let stmt = parse("bltz $t0, neg_case").unwrap();
        assert!(matches!(stmt.kind, Some(StmtKind::Instr(AsmInstr::IBranch1 { .. }))));

        let stmt = parse("jal func").unwrap();
        assert!(matches!(stmt.kind, Some(StmtKind::Instr(AsmInstr::Jump { .. }))));
    }

    #[test]
    fn test_specials() {
        assert!(matches!(parse("syscall").unwrap().kind, Some(StmtKind::Instr(AsmInstr::Syscall))));
        assert!(matches!(parse("jr $ra").unwrap().kind, Some(StmtKind::Instr(AsmInstr::JrJalr { .. }))));
        assert!(matches!(parse("mfhi $t0").unwrap().kind, Some(StmtKind::Instr(AsmInstr::RHilo1 { .. }))));
        assert!(matches!(parse("mult $t0, $t1").unwrap().kind, Some(StmtKind::Instr(AsmInstr::RHilo2 { .. }))));
    }

    #[test]
    fn test_shamt_range() {
        assert!(parse("sll $t0, $t0, 31").is_ok());
        assert_eq!(parse("sll $t0, $t0, 32").unwrap_err().kind, ParseErrKind::ShamtRange);
        assert_eq!(parse("sll $t0, $t0, -1").unwrap_err().kind, ParseErrKind::ShamtRange);
    }

    #[test]
    fn test_pseudos() {
        assert!(matches!(parse("move $t0, $t1").unwrap().kind, Some(StmtKind::Instr(AsmInstr::Move { .. }))));
        assert!(matches!(parse("li $t0, 0x12345678").unwrap().kind, Some(StmtKind::Instr(AsmInstr::Li { imm: 0x12345678, .. }))));
        assert!(matches!(parse("la $a0, msg").unwrap().kind, Some(StmtKind::Instr(AsmInstr::La { .. }))));
        assert!(matches!(parse("blt $t0, $t1, loop").unwrap().kind, Some(StmtKind::Instr(AsmInstr::BranchCmp { op: Pseudo::Blt, .. }))));
        assert!(matches!(parse("b done").unwrap().kind, Some(StmtKind::Instr(AsmInstr::B { .. }))));
        assert!(matches!(parse("neg $t0, $t1").unwrap().kind, Some(StmtKind::Instr(AsmInstr::Neg { trapping: true, .. }))));
        assert!(matches!(parse("negu $t0, $t1").unwrap().kind, Some(StmtKind::Instr(AsmInstr::Neg { trapping: false, .. }))));
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(
            parse("frobnicate $t0").unwrap_err().kind,
            ParseErrKind::UnknownMnemonic("frobnicate".to_string())
        );
    }

    #[test]
    fn test_pattern_mismatches() {
        assert_eq!(parse("add $t0, $t1").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(parse("add $t0, $t1, 4").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(parse("add $t0, $t1, $t2, $t3").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(parse("lw $t0, 4 $sp").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(parse("beq $t0, $t1, 8").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(parse("j $t0").unwrap_err().kind, ParseErrKind::UnknownPattern);
    }

    #[test]
    fn test_lex_error_rejected() {
        let err = parse("addi $t9, $t9, 5000000000").unwrap_err();
        assert_eq!(err.kind, ParseErrKind::Lex(LexErr::IntOutOfRange));

        let err = parse("add $q0, $t1, $t2").unwrap_err();
        assert_eq!(err.kind, ParseErrKind::Lex(LexErr::UnknownReg));
    }

    #[test]
    fn test_directives() {
        assert_eq!(parse(".text").unwrap().kind, Some(StmtKind::Directive(Directive::Text)));
        assert_eq!(parse(".data").unwrap().kind, Some(StmtKind::Directive(Directive::Data)));

        let stmt = parse(".word 1 2 3 4").unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Word(vec![1, 2, 3, 4]))));

        let stmt = parse(".word 0x10, 0xff, -3").unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Word(vec![0x10, 0xff, 0xFFFF_FFFD]))));

        let stmt = parse(".byte 1 2 3").unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Byte(vec![1, 2, 3]))));

        let stmt = parse(".byte 0xFF -128").unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Byte(vec![0xFF, 0x80]))));

        let stmt = parse(".half 0xFFFF").unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Half(vec![0xFFFF]))));

        let stmt = parse(r#"msg: .asciiz "Hi""#).unwrap();
        assert_eq!(stmt.label.unwrap().name, "msg");
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Asciiz("Hi".to_string()))));

        let stmt = parse(r#".ascii "ab""#).unwrap();
        assert_eq!(stmt.kind, Some(StmtKind::Directive(Directive::Ascii("ab".to_string()))));
    }

    #[test]
    fn test_directive_errors() {
        assert_eq!(parse(".byte 256").unwrap_err().kind, ParseErrKind::ByteRange);
        assert_eq!(parse(".byte -129").unwrap_err().kind, ParseErrKind::ByteRange);
        assert_eq!(parse(".half 0x10000").unwrap_err().kind, ParseErrKind::HalfRange);
        assert_eq!(parse(".word").unwrap_err().kind, ParseErrKind::EmptyDirective);
        assert_eq!(parse(".asciiz 42").unwrap_err().kind, ParseErrKind::UnknownPattern);
        assert_eq!(
            parse(".space 32").unwrap_err().kind,
            ParseErrKind::UnknownDirective(".space".to_string())
        );
    }
}
