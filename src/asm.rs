//! Assembling source lines into the machine.
//!
//! This module holds [`Machine`]: the simulator plus everything the
//! single-pass assembler needs around it — the text and data cursors,
//! the symbol table, and the fixup lists.
//!
//! # Single-pass assembly with fixups
//!
//! There is no second pass. When a line references a label that is not
//! yet defined, the assembler still emits a word — with its offset or
//! target bits zeroed — and records a fixup carrying the emit address.
//! Defining the label later patches every word that was waiting on it
//! and removes the fixups. A program is runnable exactly when
//! [`Machine::has_unresolved_fixups`] is false.
//!
//! ```
//! use mipsim::asm::Machine;
//!
//! let mut machine = Machine::new(Default::default());
//! machine.assemble_line("beq $zero, $zero, end").unwrap();
//! assert!(machine.has_unresolved_fixups());
//!
//! machine.assemble_line("addi $t0, $zero, 99").unwrap();
//! machine.assemble_line("end: addi $t0, $zero, 7").unwrap();
//! assert!(!machine.has_unresolved_fixups());
//! ```

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ast::asm::{AsmInstr, Directive, Pseudo, Stmt, StmtKind};
use crate::ast::reg_consts::{AT, ZERO};
use crate::ast::{Label, Reg};
use crate::err::{ErrSpan, Error as _};
use crate::inst::*;
use crate::parse::{self, ParseErr};
use crate::sim::mem::{DATA_BASE, DATA_LIMIT, TEXT_BASE, TEXT_LIMIT};
use crate::sim::Simulator;

/// Kinds of errors that can occur from assembling a line.
///
/// See [`AsmErr`] for this error type with span information included.
#[derive(Debug)]
pub enum AsmErrKind {
    /// The line failed to parse.
    Parse(ParseErr),
    /// The label is already bound to an address.
    LabelRedefined(String),
    /// A branch target is farther than a signed 16-bit word offset.
    BranchOffsetRange,
    /// A branch target is not word-aligned.
    BranchTargetUnaligned,
    /// A jump target does not fit in the 26-bit target field.
    JumpTargetRange,
    /// A jump target is not word-aligned.
    JumpTargetUnaligned,
    /// The text cursor would pass the end of the text segment.
    TextOverflow,
    /// The text cursor is not word-aligned.
    TextMisaligned,
    /// The data cursor would pass the end of the data segment.
    DataOverflow,
    /// `.word`/`.half` with a misaligned data cursor.
    DataMisaligned,
    /// An instruction was assembled while in `.data` mode.
    InstrOutsideText,
    /// A data directive was assembled while in `.text` mode.
    DataOutsideData,
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e)              => e.fmt(f),
            Self::LabelRedefined(name)  => write!(f, "label {name} is already defined"),
            Self::BranchOffsetRange     => f.write_str("branch target out of range"),
            Self::BranchTargetUnaligned => f.write_str("branch target not word-aligned"),
            Self::JumpTargetRange       => f.write_str("jump target out of range"),
            Self::JumpTargetUnaligned   => f.write_str("jump target not word-aligned"),
            Self::TextOverflow          => f.write_str("text segment overflow"),
            Self::TextMisaligned        => f.write_str("text cursor not word-aligned"),
            Self::DataOverflow          => f.write_str("data segment overflow"),
            Self::DataMisaligned        => f.write_str("data cursor not aligned for this directive"),
            Self::InstrOutsideText      => f.write_str("instructions can only be assembled in the text segment"),
            Self::DataOutsideData       => f.write_str("data directives can only be assembled in the data segment"),
        }
    }
}

/// Error from assembling a line.
#[derive(Debug)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The span in the line associated with this error, if it points at
    /// a specific lexeme.
    pub span: Option<ErrSpan>,
}
impl AsmErr {
    fn new(kind: AsmErrKind) -> Self {
        AsmErr { kind, span: None }
    }
    fn spanned<S: Into<ErrSpan>>(kind: AsmErrKind, span: S) -> Self {
        AsmErr { kind, span: Some(span.into()) }
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AsmErrKind::Parse(e) => Some(e),
            _ => None,
        }
    }
}
impl crate::err::Error for AsmErr {
    fn span(&self) -> Option<ErrSpan> {
        match &self.kind {
            AsmErrKind::Parse(e) => crate::err::Error::span(e),
            _ => self.span.clone(),
        }
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            AsmErrKind::Parse(e)             => e.help(),
            AsmErrKind::LabelRedefined(_)    => Some("labels are bound once; use reset to start over".into()),
            AsmErrKind::BranchOffsetRange    => Some("branches reach +/-32 KB; use j for farther targets".into()),
            AsmErrKind::InstrOutsideText     => Some("switch back with .text first".into()),
            AsmErrKind::DataOutsideData      => Some("switch with .data first".into()),
            _ => None,
        }
    }
}
impl From<ParseErr> for AsmErr {
    fn from(value: ParseErr) -> Self {
        AsmErr::new(AsmErrKind::Parse(value))
    }
}

/// A deferred patch for a conditional branch whose target label was
/// undefined at emit time.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BranchFixup {
    /// Address of the placeholder word in the text segment.
    pub instr_addr: u32,
    /// The branch's opcode (kept for integrity checks and rebuilds).
    pub opcode: u8,
    /// The encoded rs field.
    pub rs: u8,
    /// The encoded rt field (or REGIMM subcode).
    pub rt: u8,
    /// The awaited label.
    pub label: String,
}

/// A deferred patch for a `j`/`jal` whose target label was undefined at
/// emit time.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JumpFixup {
    /// Address of the placeholder word in the text segment.
    pub instr_addr: u32,
    /// The jump's opcode.
    pub opcode: u8,
    /// The awaited label.
    pub label: String,
}

/// A deferred patch for the two-word `la` (or label-addressed load/store)
/// expansion.
///
/// Resolution writes the high half of the label's address into the low 16
/// bits of the word at `instr_addr` (the `lui`) and the low half into the
/// low 16 bits of the word at `instr_addr + 4`. The halves come from
/// [`address_halves`], so the high half carries the adjustment for a
/// sign-extending second word.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LaFixup {
    /// Address of the `lui` placeholder word.
    pub instr_addr: u32,
    /// The destination register of the expansion.
    pub rt: u8,
    /// Whether the word at `instr_addr + 4` sign-extends its immediate
    /// at execution (a load/store) rather than zero-extending (`ori`).
    pub sign_extends: bool,
    /// The awaited label.
    pub label: String,
}

/// The machine: the simulator plus the assembler state around it.
///
/// The assembler state consists of the segment cursors (the next free
/// address in the text and data segments), the current assembly target
/// (`.text` or `.data`), the symbol table, and the fixup lists.
#[derive(Debug)]
pub struct Machine {
    /// The simulator this machine assembles into.
    pub sim: Simulator,

    text_cursor: u32,
    data_cursor: u32,
    in_text: bool,

    labels: HashMap<String, u32>,

    branch_fixups: Vec<BranchFixup>,
    jump_fixups: Vec<JumpFixup>,
    la_fixups: Vec<LaFixup>,
}

impl Machine {
    /// Creates a machine in its reset state, with the given IO device
    /// backing the simulator's syscalls.
    pub fn new(io: crate::sim::io::SimIO) -> Self {
        Machine {
            sim: Simulator::new(io),
            text_cursor: TEXT_BASE,
            data_cursor: DATA_BASE,
            in_text: true,
            labels: HashMap::new(),
            branch_fixups: vec![],
            jump_fixups: vec![],
            la_fixups: vec![],
        }
    }

    /// Resets everything: memory, registers, PC, cursors, the assembly
    /// target, the symbol table, and all fixups.
    pub fn reset(&mut self) {
        self.sim.reset();
        self.text_cursor = TEXT_BASE;
        self.data_cursor = DATA_BASE;
        self.in_text = true;
        self.labels.clear();
        self.branch_fixups.clear();
        self.jump_fixups.clear();
        self.la_fixups.clear();
    }

    /// The next free address in the text segment.
    pub fn text_cursor(&self) -> u32 {
        self.text_cursor
    }
    /// The next free address in the data segment.
    pub fn data_cursor(&self) -> u32 {
        self.data_cursor
    }
    /// Whether the current assembly target is the text segment.
    pub fn in_text(&self) -> bool {
        self.in_text
    }
    /// The cursor of the current assembly target.
    pub fn cursor(&self) -> u32 {
        match self.in_text {
            true  => self.text_cursor,
            false => self.data_cursor,
        }
    }

    /// Rolls the cursors back (after a failed line) and clamps the PC so
    /// it cannot sit beyond the text cursor.
    ///
    /// Fixups recorded for words beyond the restored text cursor are
    /// dropped: those words no longer exist and will be overwritten.
    pub fn rollback(&mut self, text_cursor: u32, data_cursor: u32) {
        self.text_cursor = text_cursor;
        self.data_cursor = data_cursor;
        self.branch_fixups.retain(|f| f.instr_addr < text_cursor);
        self.jump_fixups.retain(|f| f.instr_addr < text_cursor);
        self.la_fixups.retain(|f| f.instr_addr < text_cursor);
        if self.sim.pc > text_cursor {
            self.sim.pc = text_cursor;
        }
    }

    /// Assembles one line of source: tokenize, parse, bind the label,
    /// encode and emit, record fixups, and resolve any fixups a newly
    /// defined label satisfies.
    ///
    /// On error the machine's cursors may have advanced; the caller (the
    /// interpreter) restores them with [`Machine::rollback`].
    pub fn assemble_line(&mut self, line: &str) -> Result<(), AsmErr> {
        let stmt = parse::parse_stmt(&parse::tokenize(line))?;
        self.assemble_stmt(stmt)
    }

    /// Assembles one parsed statement.
    pub fn assemble_stmt(&mut self, stmt: Stmt) -> Result<(), AsmErr> {
        if let Some(label) = &stmt.label {
            self.define_label(label, self.cursor())?;
        }

        match stmt.kind {
            Some(StmtKind::Instr(instr))  => self.assemble_instr(instr),
            Some(StmtKind::Directive(d))  => self.assemble_directive(d),
            None => Ok(()),
        }
    }

    //==========================================================
    // Labels and fixups
    //==========================================================

    /// Binds `label` to `addr`, then patches every fixup waiting on it.
    ///
    /// Fails if the label is already bound; labels are never redefined.
    pub fn define_label(&mut self, label: &Label, addr: u32) -> Result<(), AsmErr> {
        match self.labels.entry(label.name.clone()) {
            Entry::Occupied(_) => {
                Err(AsmErr::spanned(AsmErrKind::LabelRedefined(label.name.clone()), label.span()))
            }
            Entry::Vacant(e) => {
                e.insert(addr);
                self.resolve_fixups(&label.name, addr)
            }
        }
    }

    /// Gets the address a label is bound to (if it is defined).
    pub fn lookup_label(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Whether a label is defined.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// An iterator over the defined labels and their addresses.
    pub fn label_iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.labels.iter().map(|(name, &addr)| (name.as_str(), addr))
    }

    /// Whether any emitted word is still waiting on an undefined label.
    ///
    /// The interpreter refuses to execute while this is true, since a
    /// placeholder word would run with zeroed target bits.
    pub fn has_unresolved_fixups(&self) -> bool {
        !(self.branch_fixups.is_empty() && self.jump_fixups.is_empty() && self.la_fixups.is_empty())
    }

    /// The labels that unresolved fixups are waiting on, sorted and
    /// deduplicated.
    pub fn unresolved_labels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = (self.branch_fixups.iter().map(|f| f.label.as_str()))
            .chain(self.jump_fixups.iter().map(|f| f.label.as_str()))
            .chain(self.la_fixups.iter().map(|f| f.label.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Records a branch fixup for the placeholder word at `instr_addr`.
    pub fn add_branch_fixup(&mut self, fixup: BranchFixup) {
        self.branch_fixups.push(fixup);
    }
    /// Records a jump fixup for the placeholder word at `instr_addr`.
    pub fn add_jump_fixup(&mut self, fixup: JumpFixup) {
        self.jump_fixups.push(fixup);
    }
    /// Records a `la`-shaped fixup for the placeholder pair at `instr_addr`.
    pub fn add_la_fixup(&mut self, fixup: LaFixup) {
        self.la_fixups.push(fixup);
    }

    /// Patches every fixup waiting on `name`, now bound to `addr`.
    ///
    /// Resolved fixups are removed by swap-remove; the relative order of
    /// the remaining fixups is immaterial.
    fn resolve_fixups(&mut self, name: &str, addr: u32) -> Result<(), AsmErr> {
        let mut i = 0;
        while i < self.branch_fixups.len() {
            if self.branch_fixups[i].label != name {
                i += 1;
                continue;
            }
            let fixup = self.branch_fixups.swap_remove(i);
            let offset = branch_offset(fixup.instr_addr, addr)?;
            let word = self.sim.mem.peek32(fixup.instr_addr);
            self.sim.mem.poke32(fixup.instr_addr, patch_imm16(word, offset as u16));
        }

        let mut i = 0;
        while i < self.jump_fixups.len() {
            if self.jump_fixups[i].label != name {
                i += 1;
                continue;
            }
            let fixup = self.jump_fixups.swap_remove(i);
            let target = jump_target(addr)?;
            let word = self.sim.mem.peek32(fixup.instr_addr);
            self.sim.mem.poke32(fixup.instr_addr, patch_target26(word, target));
        }

        let mut i = 0;
        while i < self.la_fixups.len() {
            if self.la_fixups[i].label != name {
                i += 1;
                continue;
            }
            let fixup = self.la_fixups.swap_remove(i);
            let (hi, lo) = address_halves(addr, fixup.sign_extends);
            let lui = self.sim.mem.peek32(fixup.instr_addr);
            self.sim.mem.poke32(fixup.instr_addr, patch_imm16(lui, hi));
            let second = self.sim.mem.peek32(fixup.instr_addr + 4);
            self.sim.mem.poke32(fixup.instr_addr + 4, patch_imm16(second, lo));
        }

        Ok(())
    }

    //==========================================================
    // Emission
    //==========================================================

    /// Appends a 32-bit instruction word to the text segment at the text
    /// cursor. Fails if the cursor is misaligned or the segment is full.
    pub fn emit_text_word(&mut self, word: u32) -> Result<(), AsmErr> {
        if self.text_cursor % 4 != 0 {
            return Err(AsmErr::new(AsmErrKind::TextMisaligned));
        }
        if self.text_cursor.wrapping_add(4) > TEXT_LIMIT {
            return Err(AsmErr::new(AsmErrKind::TextOverflow));
        }
        self.sim.mem.poke32(self.text_cursor, word);
        self.text_cursor += 4;
        Ok(())
    }

    /// Appends a 32-bit value to the data segment. The data cursor must
    /// be word-aligned at the point of emission.
    pub fn emit_data_word(&mut self, value: u32) -> Result<(), AsmErr> {
        if self.data_cursor % 4 != 0 {
            return Err(AsmErr::new(AsmErrKind::DataMisaligned));
        }
        self.check_data_room(4)?;
        self.sim.mem.poke32(self.data_cursor, value);
        self.data_cursor += 4;
        Ok(())
    }

    /// Appends a 16-bit value to the data segment. The data cursor must
    /// be half-aligned at the point of emission.
    pub fn emit_data_half(&mut self, value: u16) -> Result<(), AsmErr> {
        if self.data_cursor % 2 != 0 {
            return Err(AsmErr::new(AsmErrKind::DataMisaligned));
        }
        self.check_data_room(2)?;
        self.sim.mem.poke8(self.data_cursor, (value >> 8) as u8);
        self.sim.mem.poke8(self.data_cursor + 1, value as u8);
        self.data_cursor += 2;
        Ok(())
    }

    /// Appends a byte to the data segment.
    pub fn emit_data_byte(&mut self, value: u8) -> Result<(), AsmErr> {
        self.check_data_room(1)?;
        self.sim.mem.poke8(self.data_cursor, value);
        self.data_cursor += 1;
        Ok(())
    }

    /// Appends a string's bytes to the data segment, without a terminator.
    pub fn emit_data_ascii(&mut self, s: &str) -> Result<(), AsmErr> {
        for byte in s.bytes() {
            self.emit_data_byte(byte)?;
        }
        Ok(())
    }

    /// Appends a string's bytes plus a NUL terminator to the data segment.
    pub fn emit_data_asciiz(&mut self, s: &str) -> Result<(), AsmErr> {
        self.emit_data_ascii(s)?;
        self.emit_data_byte(0)
    }

    fn check_data_room(&self, n: u32) -> Result<(), AsmErr> {
        match self.data_cursor.wrapping_add(n) <= DATA_LIMIT {
            true  => Ok(()),
            false => Err(AsmErr::new(AsmErrKind::DataOverflow)),
        }
    }

    //==========================================================
    // Encoding
    //==========================================================

    fn assemble_directive(&mut self, directive: Directive) -> Result<(), AsmErr> {
        match directive {
            Directive::Text => {
                self.in_text = true;
                return Ok(());
            }
            Directive::Data => {
                self.in_text = false;
                return Ok(());
            }
            _ => {}
        }

        if self.in_text {
            return Err(AsmErr::new(AsmErrKind::DataOutsideData));
        }

        match directive {
            Directive::Word(values)  => values.into_iter().try_for_each(|v| self.emit_data_word(v)),
            Directive::Half(values)  => values.into_iter().try_for_each(|v| self.emit_data_half(v)),
            Directive::Byte(values)  => values.into_iter().try_for_each(|v| self.emit_data_byte(v)),
            Directive::Ascii(s)      => self.emit_data_ascii(&s),
            Directive::Asciiz(s)     => self.emit_data_asciiz(&s),
            Directive::Text | Directive::Data => unreachable!("handled above"),
        }
    }

    /// Encodes and emits one instruction (expanding pseudos), recording
    /// fixups for undefined labels.
    fn assemble_instr(&mut self, instr: AsmInstr) -> Result<(), AsmErr> {
        if !self.in_text {
            return Err(AsmErr::new(AsmErrKind::InstrOutsideText));
        }

        match instr {
            AsmInstr::R3 { info, rd, rs, rt } => {
                self.emit_text_word(r_type(info.opcode, rs, rt, rd, 0, info.funct))
            }
            AsmInstr::RShift { info, rd, rt, shamt } => {
                self.emit_text_word(r_type(info.opcode, ZERO, rt, rd, shamt, info.funct))
            }
            AsmInstr::IArith { info, rt, rs, imm } => {
                self.emit_text_word(i_type(info.opcode, rs, rt, imm))
            }
            AsmInstr::ILs { info, rt, offset, base } => {
                self.emit_text_word(i_type(info.opcode, base, rt, offset as u16))
            }
            AsmInstr::LsLabel { info, rt, target } => {
                // the memory access sign-extends its offset
                self.emit_address_pair(target, |lo| i_type(info.opcode, AT, rt, lo), rt, true)
            }
            AsmInstr::IBranch { info, rs, rt, target } => {
                self.emit_branch(info.opcode, rs, rt, &target)
            }
            AsmInstr::IBranch1 { info, rs, target } => {
                // For REGIMM branches the rt slot carries the subcode;
                // blez/bgtz encode rt = 0.
                let rt_slot = match info.opcode {
                    OP_REGIMM => Reg(info.funct),
                    _         => ZERO,
                };
                self.emit_branch(info.opcode, rs, rt_slot, &target)
            }
            AsmInstr::Jump { info, target } => match self.lookup_label(&target.name) {
                Some(addr) => {
                    let encoded = jump_target(addr)
                        .map_err(|e| AsmErr::spanned(e.kind, target.span()))?;
                    self.emit_text_word(j_type(info.opcode, encoded))
                }
                None => {
                    let instr_addr = self.text_cursor;
                    self.emit_text_word(j_type(info.opcode, 0))?;
                    self.add_jump_fixup(JumpFixup {
                        instr_addr,
                        opcode: info.opcode,
                        label: target.name,
                    });
                    Ok(())
                }
            },
            AsmInstr::Syscall => {
                self.emit_text_word(r_type(OP_RTYPE, ZERO, ZERO, ZERO, 0, FUNCT_SYSCALL))
            }
            AsmInstr::JrJalr { info, rs } => {
                // jalr's implicit link register is $ra
                let rd = match info.funct {
                    FUNCT_JALR => crate::ast::reg_consts::RA,
                    _          => ZERO,
                };
                self.emit_text_word(r_type(OP_RTYPE, rs, ZERO, rd, 0, info.funct))
            }
            AsmInstr::RHilo1 { info, reg } => {
                // moves *from* HI/LO name a destination; moves *to* name a source
                let word = match info.funct {
                    FUNCT_MFHI | FUNCT_MFLO => r_type(OP_RTYPE, ZERO, ZERO, reg, 0, info.funct),
                    _                       => r_type(OP_RTYPE, reg, ZERO, ZERO, 0, info.funct),
                };
                self.emit_text_word(word)
            }
            AsmInstr::RHilo2 { info, rs, rt } => {
                self.emit_text_word(r_type(OP_RTYPE, rs, rt, ZERO, 0, info.funct))
            }

            // Pseudo-instruction expansions. Every expansion emits words
            // one at a time, so branch fixups inside an expansion carry
            // the exact address of their placeholder word.
            AsmInstr::Move { rd, rs } => {
                // addu rd, rs, $zero
                self.emit_text_word(r_type(OP_RTYPE, rs, ZERO, rd, 0, FUNCT_ADDU))
            }
            AsmInstr::Neg { rd, rs, trapping } => {
                // sub/subu rd, $zero, rs
                let funct = match trapping {
                    true  => FUNCT_SUB,
                    false => FUNCT_SUBU,
                };
                self.emit_text_word(r_type(OP_RTYPE, ZERO, rs, rd, 0, funct))
            }
            AsmInstr::Not { rd, rs } => {
                // nor rd, rs, $zero
                self.emit_text_word(r_type(OP_RTYPE, rs, ZERO, rd, 0, FUNCT_NOR))
            }
            AsmInstr::Abs { rd, rs } => {
                // branchless: sra $at, rs, 31; xor rd, rs, $at; subu rd, rd, $at
                self.emit_text_word(r_type(OP_RTYPE, ZERO, rs, AT, 31, FUNCT_SRA))?;
                self.emit_text_word(r_type(OP_RTYPE, rs, AT, rd, 0, FUNCT_XOR))?;
                self.emit_text_word(r_type(OP_RTYPE, rd, AT, rd, 0, FUNCT_SUBU))
            }
            AsmInstr::Mul { rd, rs, rt } => {
                // mult rs, rt; mflo rd
                self.emit_text_word(r_type(OP_RTYPE, rs, rt, ZERO, 0, FUNCT_MULT))?;
                self.emit_text_word(r_type(OP_RTYPE, ZERO, ZERO, rd, 0, FUNCT_MFLO))
            }
            AsmInstr::SetCmp { op, rd, rs, rt } => match op {
                // sgt rd, rs, rt -> slt rd, rt, rs
                Pseudo::Sgt => self.emit_text_word(r_type(OP_RTYPE, rt, rs, rd, 0, FUNCT_SLT)),
                // sge rd, rs, rt -> slt rd, rs, rt; xori rd, rd, 1
                _ => {
                    self.emit_text_word(r_type(OP_RTYPE, rs, rt, rd, 0, FUNCT_SLT))?;
                    self.emit_text_word(i_type(OP_XORI, rd, rd, 1))
                }
            },
            AsmInstr::BranchCmp { op, rs, rt, target } => {
                // slt $at with the operand order picking <1 vs >, then
                // branch on $at against zero.
                let (slt_rs, slt_rt, branch_op) = match op {
                    Pseudo::Blt => (rs, rt, OP_BNE),
                    Pseudo::Bgt => (rt, rs, OP_BNE),
                    Pseudo::Ble => (rt, rs, OP_BEQ),
                    _           => (rs, rt, OP_BEQ), // bge
                };
                self.emit_text_word(r_type(OP_RTYPE, slt_rs, slt_rt, AT, 0, FUNCT_SLT))?;
                self.emit_branch(branch_op, AT, ZERO, &target)
            }
            AsmInstr::B { target } => {
                // beq $zero, $zero, target
                self.emit_branch(OP_BEQ, ZERO, ZERO, &target)
            }
            AsmInstr::Li { rt, imm } => {
                if (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&imm) {
                    // addi rt, $zero, imm
                    self.emit_text_word(i_type(OP_ADDI, ZERO, rt, imm as i16 as u16))
                } else {
                    // lui $at, hi; ori rt, $at, lo
                    self.emit_text_word(i_type(OP_LUI, ZERO, AT, (imm >> 16) as u16))?;
                    self.emit_text_word(i_type(OP_ORI, AT, rt, imm as u16))
                }
            }
            AsmInstr::La { rt, target } => {
                self.emit_address_pair(target, |lo| i_type(OP_ORI, AT, rt, lo), rt, false)
            }
        }
    }

    /// Emits a conditional branch, either resolved against a known label
    /// or as a placeholder with a [`BranchFixup`].
    fn emit_branch(&mut self, opcode: u8, rs: Reg, rt: Reg, target: &Label) -> Result<(), AsmErr> {
        match self.lookup_label(&target.name) {
            Some(addr) => {
                let offset = branch_offset(self.text_cursor, addr)
                    .map_err(|e| AsmErr::spanned(e.kind, target.span()))?;
                self.emit_text_word(i_type(opcode, rs, rt, offset as u16))
            }
            None => {
                let instr_addr = self.text_cursor;
                self.emit_text_word(i_type(opcode, rs, rt, 0))?;
                self.add_branch_fixup(BranchFixup {
                    instr_addr,
                    opcode,
                    rs: rs.num(),
                    rt: rt.num(),
                    label: target.name.clone(),
                });
                Ok(())
            }
        }
    }

    /// Emits the `lui $at, hi(target)` / second-word pair shared by `la`
    /// and the label-addressed loads and stores. The second word is built
    /// by `second` from the low half of the address; `sign_extends` says
    /// whether that word sign-extends the half at execution, which decides
    /// how the address is split (see [`address_halves`]).
    fn emit_address_pair(
        &mut self,
        target: Label,
        second: impl FnOnce(u16) -> u32,
        rt: Reg,
        sign_extends: bool,
    ) -> Result<(), AsmErr> {
        match self.lookup_label(&target.name) {
            Some(addr) => {
                let (hi, lo) = address_halves(addr, sign_extends);
                self.emit_text_word(i_type(OP_LUI, ZERO, AT, hi))?;
                self.emit_text_word(second(lo))
            }
            None => {
                let instr_addr = self.text_cursor;
                self.emit_text_word(i_type(OP_LUI, ZERO, AT, 0))?;
                self.emit_text_word(second(0))?;
                self.add_la_fixup(LaFixup {
                    instr_addr,
                    rt: rt.num(),
                    sign_extends,
                    label: target.name,
                });
                Ok(())
            }
        }
    }
}

impl Default for Machine {
    /// A machine whose syscalls perform no IO.
    fn default() -> Self {
        Machine::new(crate::sim::io::SimIO::Empty)
    }
}

/// Computes the encoded offset of a branch at `instr_addr` targeting
/// `target`: `(target - (instr_addr + 4)) >> 2`.
///
/// The target must be word-aligned and the byte displacement must fit in
/// signed 16 bits, so branches reach +/-32 KB around the instruction.
fn branch_offset(instr_addr: u32, target: u32) -> Result<i32, AsmErr> {
    if target % 4 != 0 {
        return Err(AsmErr::new(AsmErrKind::BranchTargetUnaligned));
    }
    let diff = target.wrapping_sub(instr_addr.wrapping_add(4)) as i32;
    match (i32::from(i16::MIN)..=i32::from(i16::MAX)).contains(&diff) {
        true  => Ok(diff >> 2),
        false => Err(AsmErr::new(AsmErrKind::BranchOffsetRange)),
    }
}

/// Splits an address into the halves a `lui`-plus-second-word pair
/// encodes.
///
/// When the second word sign-extends its 16-bit immediate at execution
/// (a load/store offset), a low half with bit 15 set subtracts 0x1_0000
/// from the reconstructed address, so the high half absorbs the carry:
/// `hi = (addr + 0x8000) >> 16`. When the second word zero-extends
/// (`ori`), the plain split is the correct one.
fn address_halves(addr: u32, sign_extends: bool) -> (u16, u16) {
    let hi = match sign_extends {
        true  => (addr.wrapping_add(0x8000) >> 16) as u16,
        false => (addr >> 16) as u16,
    };
    (hi, addr as u16)
}

/// Computes the encoded 26-bit target of a jump to `target`, which must
/// be aligned and fit in the field.
fn jump_target(target: u32) -> Result<u32, AsmErr> {
    if target % 4 != 0 {
        return Err(AsmErr::new(AsmErrKind::JumpTargetUnaligned));
    }
    let encoded = target >> 2;
    match encoded <= 0x03FF_FFFF {
        true  => Ok(encoded),
        false => Err(AsmErr::new(AsmErrKind::JumpTargetRange)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::*;

    fn machine() -> Machine {
        Machine::default()
    }

    fn asm(m: &mut Machine, lines: &[&str]) {
        for line in lines {
            m.assemble_line(line).unwrap_or_else(|e| panic!("failed to assemble {line:?}: {e}"));
        }
    }

    #[test]
    fn test_emit_advances_cursor() {
        let mut m = machine();
        asm(&mut m, &["add $t0, $t1, $t2"]);
        assert_eq!(m.text_cursor(), TEXT_BASE + 4);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x012A_4020);
    }

    #[test]
    fn test_encodings() {
        let mut m = machine();
        asm(&mut m, &[
            "sll $t0, $t1, 4",
            "addi $t0, $t1, -1",
            "ori $t0, $t1, 0xFFFF",
            "lw $t0, 8($sp)",
            "sw $t0, -4($fp)",
            "jr $ra",
            "jalr $t9",
            "syscall",
            "mfhi $t0",
            "mtlo $t1",
            "mult $t0, $t1",
        ]);

        let words: Vec<u32> = (0..11).map(|i| m.sim.mem.peek32(TEXT_BASE + 4 * i)).collect();
        assert_eq!(words[0], 0x0009_4100); // sll
        assert_eq!(words[1], 0x2128_FFFF); // addi
        assert_eq!(words[2], 0x3528_FFFF); // ori
        assert_eq!(words[3], 0x8FA8_0008); // lw
        assert_eq!(words[4], 0xAFC8_FFFC); // sw
        assert_eq!(words[5], 0x03E0_0008); // jr
        assert_eq!(words[6], 0x0320_F809); // jalr $t9 -> rd=$ra
        assert_eq!(words[7], 0x0000_000C); // syscall
        assert_eq!(words[8], 0x0000_4010); // mfhi $t0
        assert_eq!(words[9], 0x0120_0013); // mtlo $t1
        assert_eq!(words[10], 0x0109_0018); // mult $t0, $t1
    }

    #[test]
    fn test_backward_branch_resolved_immediately() {
        let mut m = machine();
        asm(&mut m, &[
            "loop: addi $t0, $t0, 1",
            "bne $t0, $t1, loop",
        ]);
        assert!(!m.has_unresolved_fixups());
        // offset = (loop - (branch + 4)) >> 2 = -2
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4) & 0xFFFF, 0xFFFE);
    }

    #[test]
    fn test_forward_branch_fixup() {
        let mut m = machine();
        asm(&mut m, &["beq $zero, $zero, end"]);
        assert!(m.has_unresolved_fixups());
        assert_eq!(m.unresolved_labels(), vec!["end"]);
        // placeholder word: beq with zeroed offset
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x1000_0000);

        asm(&mut m, &["addi $t0, $zero, 99", "end: addi $t0, $zero, 7"]);
        assert!(!m.has_unresolved_fixups());
        // offset patched to skip one word
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x1000_0001);
    }

    #[test]
    fn test_forward_jump_fixup() {
        let mut m = machine();
        asm(&mut m, &["j end", "add $t0, $t0, $t1", "end:"]);
        assert!(!m.has_unresolved_fixups());
        let end = TEXT_BASE + 8;
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), (u32::from(OP_J) << 26) | (end >> 2));
    }

    #[test]
    fn test_la_fixup_two_words() {
        let mut m = machine();
        asm(&mut m, &["la $a0, msg"]);
        assert!(m.has_unresolved_fixups());
        assert_eq!(m.text_cursor(), TEXT_BASE + 8);

        asm(&mut m, &[".data", "msg: .asciiz \"Hi\"", ".text"]);
        assert!(!m.has_unresolved_fixups());
        // lui $at, hi(DATA_BASE); ori $a0, $at, lo(DATA_BASE)
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x3424_0000);
    }

    #[test]
    fn test_la_resolved_label() {
        let mut m = machine();
        asm(&mut m, &[".data", "msg: .byte 1", ".text", "la $a0, msg"]);
        assert!(!m.has_unresolved_fixups());
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x3424_0000);
    }

    #[test]
    fn test_ls_label_expansion() {
        let mut m = machine();
        asm(&mut m, &[
            ".data",
            ".byte 0 0 0 0", // push the label off the segment base
            "val: .word 7",
            ".text",
            "lw $t0, val",
        ]);
        assert!(!m.has_unresolved_fixups());
        // lui $at, 0x1000; lw $t0, 4($at)
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x8C28_0004);
    }

    #[test]
    fn test_ls_label_carry_adjustment() {
        // a label whose low half has bit 15 set: the load's offset is
        // sign-extended at execution, so the lui half must absorb the
        // carry. la reconstructs with ori and keeps the plain split.
        let far = Label::new("far".to_string(), 0..3);
        let mut m = machine();
        m.define_label(&far, DATA_BASE + 0x8000).unwrap();
        asm(&mut m, &["lw $t0, far", "la $a0, far"]);

        // lui $at, 0x1001; lw $t0, -0x8000($at)
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1001);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x8C28_8000);
        // lui $at, 0x1000; ori $a0, $at, 0x8000
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 8), 0x3C01_1000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 12), 0x3424_8000);

        // executing both pairs reaches the intended address
        m.sim.mem.poke32(DATA_BASE + 0x8000, 7);
        m.sim.run_until(TEXT_BASE + 16, 10).unwrap();
        assert_eq!(m.sim.reg_file.read_u(T0), 7);
        assert_eq!(m.sim.reg_file.read_u(A0), DATA_BASE + 0x8000);
    }

    #[test]
    fn test_ls_label_carry_adjustment_fixup() {
        // same split through the forward-reference patch path
        let mut m = machine();
        asm(&mut m, &["lw $t0, far", "la $a0, far"]);
        assert!(m.has_unresolved_fixups());

        let far = Label::new("far".to_string(), 0..3);
        m.define_label(&far, DATA_BASE + 0x8000).unwrap();
        assert!(!m.has_unresolved_fixups());

        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1001);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x8C28_8000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 8), 0x3C01_1000);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 12), 0x3424_8000);
    }

    #[test]
    fn test_address_halves() {
        assert_eq!(address_halves(0x1000_0004, false), (0x1000, 0x0004));
        assert_eq!(address_halves(0x1000_0004, true), (0x1000, 0x0004));
        // bit 15 of the low half set: only the sign-extending split carries
        assert_eq!(address_halves(0x1000_8000, false), (0x1000, 0x8000));
        assert_eq!(address_halves(0x1000_8000, true), (0x1001, 0x8000));
        assert_eq!(address_halves(0x1003_FFFC, true), (0x1004, 0xFFFC));
    }

    #[test]
    fn test_label_redefinition_fails() {
        let mut m = machine();
        asm(&mut m, &["here: add $t0, $t0, $t1"]);
        let err = m.assemble_line("here: sub $t0, $t0, $t1").unwrap_err();
        assert!(matches!(err.kind, AsmErrKind::LabelRedefined(name) if name == "here"));
    }

    #[test]
    fn test_label_in_data_segment() {
        let mut m = machine();
        asm(&mut m, &[".data", ".byte 1 2 3", "tail: .byte 4"]);
        assert_eq!(m.lookup_label("tail"), Some(DATA_BASE + 3));
    }

    #[test]
    fn test_pseudo_expansions() {
        let mut m = machine();
        asm(&mut m, &[
            "move $t0, $t1",
            "neg $t2, $t3",
            "negu $t2, $t3",
            "not $t4, $t5",
            "sgt $t0, $t1, $t2",
        ]);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x0120_4021);      // addu $t0, $t1, $zero
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x000B_5022);  // sub $t2, $zero, $t3
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 8), 0x000B_5023);  // subu
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 12), 0x01A0_6027); // nor $t4, $t5, $zero
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 16), 0x0149_402A); // slt $t0, $t2, $t1
    }

    #[test]
    fn test_li_small_one_word() {
        let mut m = machine();
        asm(&mut m, &["li $t0, 42", "li $t1, -5"]);
        assert_eq!(m.text_cursor(), TEXT_BASE + 8);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x2008_002A);     // addi $t0, $zero, 42
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x2009_FFFB); // addi $t1, $zero, -5
    }

    #[test]
    fn test_li_large_two_words() {
        let mut m = machine();
        asm(&mut m, &["li $t0, 0x12345678"]);
        assert_eq!(m.text_cursor(), TEXT_BASE + 8);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x3C01_1234);     // lui $at, 0x1234
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x3428_5678); // ori $t0, $at, 0x5678
    }

    #[test]
    fn test_blt_expansion_fixup_addr() {
        let mut m = machine();
        // the branch inside the expansion is the second word, so its
        // fixup must target TEXT_BASE + 4
        asm(&mut m, &["blt $t0, $t1, done"]);
        assert_eq!(m.text_cursor(), TEXT_BASE + 8);
        asm(&mut m, &["done: syscall"]);
        assert!(!m.has_unresolved_fixups());

        // slt $at, $t0, $t1
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x0109_082A);
        // bne $at, $zero, +0
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x1420_0000);
    }

    #[test]
    fn test_branch_offset_range() {
        // exactly reachable: target = instr + 4 + 0x7FFC
        assert_eq!(branch_offset(TEXT_BASE, TEXT_BASE + 4 + 0x7FFC).unwrap(), 0x1FFF);
        // one word farther fails
        assert!(branch_offset(TEXT_BASE, TEXT_BASE + 4 + 0x8000).is_err());
        // backwards boundary: byte displacement of exactly -32768
        assert_eq!(branch_offset(TEXT_BASE + 0x8000, TEXT_BASE + 4).unwrap(), -0x2000);
        assert!(branch_offset(TEXT_BASE + 0x8004, TEXT_BASE + 4).is_err());
    }

    #[test]
    fn test_segment_modes() {
        let mut m = machine();
        let err = m.assemble_line(".word 1").unwrap_err();
        assert!(matches!(err.kind, AsmErrKind::DataOutsideData));

        asm(&mut m, &[".data"]);
        let err = m.assemble_line("add $t0, $t0, $t1").unwrap_err();
        assert!(matches!(err.kind, AsmErrKind::InstrOutsideText));
    }

    #[test]
    fn test_data_directives() {
        let mut m = machine();
        asm(&mut m, &[
            ".data",
            ".word 0x11223344",
            ".half 0x5566",
            ".byte 0x77",
            ".asciiz \"ab\"",
        ]);
        assert_eq!(m.sim.mem.peek32(DATA_BASE), 0x1122_3344);
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 4), 0x55);
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 5), 0x66);
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 6), 0x77);
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 7), b'a');
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 8), b'b');
        assert_eq!(m.sim.mem.peek8(DATA_BASE + 9), 0);
        assert_eq!(m.data_cursor(), DATA_BASE + 10);
    }

    #[test]
    fn test_data_alignment_enforced() {
        let mut m = machine();
        asm(&mut m, &[".data", ".byte 1"]);
        let err = m.assemble_line(".word 2").unwrap_err();
        assert!(matches!(err.kind, AsmErrKind::DataMisaligned));
        let err = m.assemble_line(".half 2").unwrap_err();
        assert!(matches!(err.kind, AsmErrKind::DataMisaligned));
        // bytes need no alignment
        asm(&mut m, &[".byte 2"]);
    }

    #[test]
    fn test_rollback_drops_fixups() {
        let mut m = machine();
        let text = m.text_cursor();
        let data = m.data_cursor();
        asm(&mut m, &["beq $t0, $t1, nowhere"]);
        assert!(m.has_unresolved_fixups());

        m.rollback(text, data);
        assert_eq!(m.text_cursor(), text);
        assert!(!m.has_unresolved_fixups());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut m = machine();
        asm(&mut m, &["x: addi $t0, $zero, 1", "j nowhere"]);
        m.sim.reg_file.write_u(T0, 5);
        m.reset();

        assert_eq!(m.text_cursor(), TEXT_BASE);
        assert_eq!(m.data_cursor(), DATA_BASE);
        assert!(m.in_text());
        assert!(!m.has_label("x"));
        assert!(!m.has_unresolved_fixups());
        assert_eq!(m.sim.reg_file.read_u(T0), 0);
        assert_eq!(m.sim.reg_file.read_u(SP), crate::sim::mem::STACK_INIT);
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0);
    }

    #[test]
    fn test_placeholder_opcode_invariant() {
        // every unresolved fixup's placeholder word carries its opcode
        let mut m = machine();
        asm(&mut m, &["bne $t3, $t4, a", "j b", "la $t5, c"]);

        for f in &m.branch_fixups {
            assert_eq!(crate::inst::op(m.sim.mem.peek32(f.instr_addr)), f.opcode);
            assert_eq!(crate::inst::rs(m.sim.mem.peek32(f.instr_addr)).num(), f.rs);
            assert_eq!(crate::inst::rt(m.sim.mem.peek32(f.instr_addr)).num(), f.rt);
        }
        for f in &m.jump_fixups {
            assert_eq!(crate::inst::op(m.sim.mem.peek32(f.instr_addr)), f.opcode);
        }
        for f in &m.la_fixups {
            assert_eq!(crate::inst::op(m.sim.mem.peek32(f.instr_addr)), OP_LUI);
        }
    }

    #[test]
    fn test_bltz_bgez_regimm_encoding() {
        let mut m = machine();
        asm(&mut m, &["top: bltz $t0, top", "bgez $t1, top"]);
        // bltz: opcode 1, rt slot 0; offset -1
        assert_eq!(m.sim.mem.peek32(TEXT_BASE), 0x0500_FFFF);
        // bgez: opcode 1, rt slot 1; offset -2
        assert_eq!(m.sim.mem.peek32(TEXT_BASE + 4), 0x0521_FFFE);
    }
}
