//! The data structures representing one parsed line of assembly.
//!
//! The key types are:
//! - [`Stmt`]: an optional label binding plus an optional body,
//! - [`AsmInstr`]: an instruction (real or pseudo) with its operands,
//! - [`Directive`]: an assembler directive (`.text`, `.word`, `.asciiz`, ...).
//!
//! Real instructions are described by [`InstrInfo`] descriptors, looked up
//! by mnemonic in a static table ([`instr_info`]). The descriptor's
//! [`Shape`] decides both the operand pattern the parser expects and the
//! bit layout the assembler encodes.

use crate::inst::*;
use crate::ast::{Label, Reg};

/// The operand-pattern family of a mnemonic.
///
/// Each shape corresponds to exactly one operand syntax and one
/// encoding layout (see the table in the crate documentation).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Shape {
    /// `rd, rs, rt` (add, sub, and, or, slt, sllv, ...)
    R3,
    /// `rd, rt, shamt` (sll, srl, sra)
    RShift,
    /// `rt, rs, imm` (addi, andi, ori, slti, ...) and `rt, imm` for lui
    IArith,
    /// `rt, imm(rs)` (lw, sw, lb, sb, ...)
    ILs,
    /// `rs, rt, label` (beq, bne)
    IBranch,
    /// `rs, label` (bgtz, blez, bltz, bgez)
    IBranch1,
    /// `label` (j, jal)
    Jump,
    /// no operands (syscall)
    Syscall,
    /// `rs` (jr, jalr)
    JrJalr,
    /// `rd` or `rs` (mfhi, mflo, mthi, mtlo)
    RHilo1,
    /// `rs, rt` (mult, multu, div, divu)
    RHilo2,
}

/// Descriptor of a real instruction mnemonic.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct InstrInfo {
    /// The operand/encoding shape.
    pub shape: Shape,
    /// The 6-bit opcode field.
    pub opcode: u8,
    /// The 6-bit funct field for R-type words; the REGIMM rt subcode for
    /// `bltz`/`bgez`; zero otherwise.
    pub funct: u8,
}

impl InstrInfo {
    const fn new(shape: Shape, opcode: u8, funct: u8) -> Self {
        InstrInfo { shape, opcode, funct }
    }
}

/// Looks up the descriptor for a real instruction mnemonic.
///
/// Mnemonics are matched case-sensitively in lowercase, matching the
/// usual way MIPS assembly is written.
pub fn instr_info(mnemonic: &str) -> Option<InstrInfo> {
    use Shape::*;

    let info = match mnemonic {
        // R-type arithmetic / logical: rd, rs, rt
        "add"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_ADD),
        "addu"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_ADDU),
        "sub"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_SUB),
        "subu"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_SUBU),
        "and"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_AND),
        "or"    => InstrInfo::new(R3, OP_RTYPE, FUNCT_OR),
        "xor"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_XOR),
        "nor"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_NOR),
        "slt"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_SLT),
        "sltu"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_SLTU),
        "seq"   => InstrInfo::new(R3, OP_RTYPE, FUNCT_SEQ),

        // Variable shifts share the R3 operand order.
        "sllv"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_SLLV),
        "srlv"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_SRLV),
        "srav"  => InstrInfo::new(R3, OP_RTYPE, FUNCT_SRAV),

        // Shifts with an immediate amount: rd, rt, shamt
        "sll"   => InstrInfo::new(RShift, OP_RTYPE, FUNCT_SLL),
        "srl"   => InstrInfo::new(RShift, OP_RTYPE, FUNCT_SRL),
        "sra"   => InstrInfo::new(RShift, OP_RTYPE, FUNCT_SRA),

        // Multiply/divide into HI/LO, and the HI/LO moves.
        "mult"  => InstrInfo::new(RHilo2, OP_RTYPE, FUNCT_MULT),
        "multu" => InstrInfo::new(RHilo2, OP_RTYPE, FUNCT_MULTU),
        "div"   => InstrInfo::new(RHilo2, OP_RTYPE, FUNCT_DIV),
        "divu"  => InstrInfo::new(RHilo2, OP_RTYPE, FUNCT_DIVU),
        "mfhi"  => InstrInfo::new(RHilo1, OP_RTYPE, FUNCT_MFHI),
        "mthi"  => InstrInfo::new(RHilo1, OP_RTYPE, FUNCT_MTHI),
        "mflo"  => InstrInfo::new(RHilo1, OP_RTYPE, FUNCT_MFLO),
        "mtlo"  => InstrInfo::new(RHilo1, OP_RTYPE, FUNCT_MTLO),

        // Register jumps and syscall.
        "jr"      => InstrInfo::new(JrJalr, OP_RTYPE, FUNCT_JR),
        "jalr"    => InstrInfo::new(JrJalr, OP_RTYPE, FUNCT_JALR),
        "syscall" => InstrInfo::new(Syscall, OP_RTYPE, FUNCT_SYSCALL),

        // I-type arithmetic / logical: rt, rs, imm
        "addi"  => InstrInfo::new(IArith, OP_ADDI, 0),
        "addiu" => InstrInfo::new(IArith, OP_ADDIU, 0),
        "slti"  => InstrInfo::new(IArith, OP_SLTI, 0),
        "sltiu" => InstrInfo::new(IArith, OP_SLTIU, 0),
        "andi"  => InstrInfo::new(IArith, OP_ANDI, 0),
        "ori"   => InstrInfo::new(IArith, OP_ORI, 0),
        "xori"  => InstrInfo::new(IArith, OP_XORI, 0),
        "lui"   => InstrInfo::new(IArith, OP_LUI, 0), // rt, imm (rs = $zero)

        // Loads and stores: rt, offset(rs)
        "lb"    => InstrInfo::new(ILs, OP_LB, 0),
        "lh"    => InstrInfo::new(ILs, OP_LH, 0),
        "lw"    => InstrInfo::new(ILs, OP_LW, 0),
        "lbu"   => InstrInfo::new(ILs, OP_LBU, 0),
        "lhu"   => InstrInfo::new(ILs, OP_LHU, 0),
        "sb"    => InstrInfo::new(ILs, OP_SB, 0),
        "sh"    => InstrInfo::new(ILs, OP_SH, 0),
        "sw"    => InstrInfo::new(ILs, OP_SW, 0),

        // Branches.
        "beq"   => InstrInfo::new(IBranch, OP_BEQ, 0),
        "bne"   => InstrInfo::new(IBranch, OP_BNE, 0),
        "blez"  => InstrInfo::new(IBranch1, OP_BLEZ, 0),
        "bgtz"  => InstrInfo::new(IBranch1, OP_BGTZ, 0),
        // REGIMM family: the funct slot carries the rt subcode.
        "bltz"  => InstrInfo::new(IBranch1, OP_REGIMM, RT_BLTZ),
        "bgez"  => InstrInfo::new(IBranch1, OP_REGIMM, RT_BGEZ),

        // Jumps.
        "j"     => InstrInfo::new(Jump, OP_J, 0),
        "jal"   => InstrInfo::new(Jump, OP_JAL, 0),

        _ => return None,
    };

    Some(info)
}

/// A pseudo-instruction mnemonic.
///
/// Pseudo-instructions are not encoded directly; the assembler expands
/// each into one to three real instructions (possibly clobbering `$at`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Pseudo {
    /// `abs rd, rs`
    Abs,
    /// `neg rd, rs`
    Neg,
    /// `negu rd, rs`
    Negu,
    /// `not rd, rs`
    Not,
    /// `mul rd, rs, rt`
    Mul,
    /// `sge rd, rs, rt`
    Sge,
    /// `sgt rd, rs, rt`
    Sgt,
    /// `blt rs, rt, label`
    Blt,
    /// `ble rs, rt, label`
    Ble,
    /// `bgt rs, rt, label`
    Bgt,
    /// `bge rs, rt, label`
    Bge,
    /// `b label`
    B,
    /// `li rt, imm32`
    Li,
    /// `la rt, label`
    La,
    /// `move rd, rs`
    Move,
}

/// Looks up a pseudo-instruction mnemonic.
///
/// The load/store label form (`lw rt, label`) is not listed here; it is
/// recognized by its operand pattern, not by its mnemonic.
pub fn pseudo_op(mnemonic: &str) -> Option<Pseudo> {
    let p = match mnemonic {
        "abs"  => Pseudo::Abs,
        "neg"  => Pseudo::Neg,
        "negu" => Pseudo::Negu,
        "not"  => Pseudo::Not,
        "mul"  => Pseudo::Mul,
        "sge"  => Pseudo::Sge,
        "sgt"  => Pseudo::Sgt,
        "blt"  => Pseudo::Blt,
        "ble"  => Pseudo::Ble,
        "bgt"  => Pseudo::Bgt,
        "bge"  => Pseudo::Bge,
        "b"    => Pseudo::B,
        "li"   => Pseudo::Li,
        "la"   => Pseudo::La,
        "move" => Pseudo::Move,
        _ => return None,
    };

    Some(p)
}

/// An instruction with its operands, as parsed from one source line.
///
/// The first group of variants carries real instructions grouped by
/// [`Shape`]; immediates are already range-checked and masked by the
/// parser. The second group carries pseudo-instructions, which the
/// assembler expands.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AsmInstr {
    /// `op rd, rs, rt`
    R3 { info: InstrInfo, rd: Reg, rs: Reg, rt: Reg },
    /// `op rd, rt, shamt`
    RShift { info: InstrInfo, rd: Reg, rt: Reg, shamt: u8 },
    /// `op rt, rs, imm` (for `lui`: `rs` is `$zero`)
    IArith { info: InstrInfo, rt: Reg, rs: Reg, imm: u16 },
    /// `op rt, offset(base)`
    ILs { info: InstrInfo, rt: Reg, offset: i16, base: Reg },
    /// `op rt, label`; expands to `lui $at` + the memory access
    LsLabel { info: InstrInfo, rt: Reg, target: Label },
    /// `op rs, rt, label`
    IBranch { info: InstrInfo, rs: Reg, rt: Reg, target: Label },
    /// `op rs, label`
    IBranch1 { info: InstrInfo, rs: Reg, target: Label },
    /// `op label`
    Jump { info: InstrInfo, target: Label },
    /// `syscall`
    Syscall,
    /// `jr rs` / `jalr rs`
    JrJalr { info: InstrInfo, rs: Reg },
    /// `mfhi rd` / `mflo rd` / `mthi rs` / `mtlo rs`
    RHilo1 { info: InstrInfo, reg: Reg },
    /// `mult rs, rt` and friends
    RHilo2 { info: InstrInfo, rs: Reg, rt: Reg },

    /// `abs rd, rs`
    Abs { rd: Reg, rs: Reg },
    /// `neg rd, rs` (trapping) / `negu rd, rs` (non-trapping)
    Neg { rd: Reg, rs: Reg, trapping: bool },
    /// `not rd, rs`
    Not { rd: Reg, rs: Reg },
    /// `mul rd, rs, rt`
    Mul { rd: Reg, rs: Reg, rt: Reg },
    /// `sge rd, rs, rt` / `sgt rd, rs, rt`
    SetCmp { op: Pseudo, rd: Reg, rs: Reg, rt: Reg },
    /// `blt`/`ble`/`bgt`/`bge rs, rt, label`
    BranchCmp { op: Pseudo, rs: Reg, rt: Reg, target: Label },
    /// `b label`
    B { target: Label },
    /// `li rt, imm32`
    Li { rt: Reg, imm: i64 },
    /// `la rt, label`
    La { rt: Reg, target: Label },
    /// `move rd, rs`
    Move { rd: Reg, rs: Reg },
}

/// An assembler directive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Directive {
    /// `.text`: switch the assembly target to the text segment.
    Text,
    /// `.data`: switch the assembly target to the data segment.
    Data,
    /// `.word n, ...`: emit 32-bit values at the data cursor.
    Word(Vec<u32>),
    /// `.half n, ...`: emit 16-bit values at the data cursor.
    Half(Vec<u16>),
    /// `.byte n, ...`: emit bytes at the data cursor.
    Byte(Vec<u8>),
    /// `.ascii "s"`: emit the string's bytes, no terminator.
    Ascii(String),
    /// `.asciiz "s"`: emit the string's bytes plus a NUL terminator.
    Asciiz(String),
}

/// The body of a statement.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StmtKind {
    /// A real or pseudo instruction.
    Instr(AsmInstr),
    /// An assembler directive.
    Directive(Directive),
}

/// One fully parsed source line.
///
/// Either field may be absent: `loop:` alone binds a label, a bare
/// instruction has no label, and a blank or comment-only line has neither.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Stmt {
    /// The label bound at the start of the line, if any.
    pub label: Option<Label>,
    /// The instruction or directive on the line, if any.
    pub kind: Option<StmtKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_table() {
        let add = instr_info("add").unwrap();
        assert_eq!(add.shape, Shape::R3);
        assert_eq!((add.opcode, add.funct), (OP_RTYPE, FUNCT_ADD));

        let sll = instr_info("sll").unwrap();
        assert_eq!(sll.shape, Shape::RShift);
        assert_eq!((sll.opcode, sll.funct), (OP_RTYPE, FUNCT_SLL));

        let bgez = instr_info("bgez").unwrap();
        assert_eq!(bgez.shape, Shape::IBranch1);
        assert_eq!((bgez.opcode, bgez.funct), (OP_REGIMM, RT_BGEZ));

        let lw = instr_info("lw").unwrap();
        assert_eq!(lw.shape, Shape::ILs);
        assert_eq!(lw.opcode, OP_LW);

        assert_eq!(instr_info("mov"), None);
        assert_eq!(instr_info("ADD"), None); // mnemonics are lowercase
    }

    #[test]
    fn test_pseudo_table() {
        assert_eq!(pseudo_op("li"), Some(Pseudo::Li));
        assert_eq!(pseudo_op("move"), Some(Pseudo::Move));
        assert_eq!(pseudo_op("bge"), Some(Pseudo::Bge));
        // real mnemonics are not pseudos
        assert_eq!(pseudo_op("add"), None);
        assert_eq!(pseudo_op("lw"), None);
    }
}
