//! The 32-bit machine word layout.
//!
//! This module pins down the bit-level encoding shared by the assembler
//! (which builds words) and the simulator (which picks them apart):
//!
//! ```text
//! R-type: [opcode:6][rs:5][rt:5][rd:5][shamt:5][funct:6]
//! I-type: [opcode:6][rs:5][rt:5][imm:16]
//! J-type: [opcode:6][target:26]
//! ```
//!
//! Opcode, funct, and REGIMM subcode values live here as constants; the
//! field accessors mask their values, so they are total functions over
//! arbitrary words.
#![allow(missing_docs)] // the opcode/funct constants are their own names

use crate::ast::Reg;

const MASK5: u32 = (1 << 5) - 1;
const MASK6: u32 = (1 << 6) - 1;
const MASK16: u32 = (1 << 16) - 1;
const MASK26: u32 = (1 << 26) - 1;

// Opcodes (bits 31..26).
pub const OP_RTYPE: u8 = 0x00;
pub const OP_REGIMM: u8 = 0x01;
pub const OP_J: u8 = 0x02;
pub const OP_JAL: u8 = 0x03;
pub const OP_BEQ: u8 = 0x04;
pub const OP_BNE: u8 = 0x05;
pub const OP_BLEZ: u8 = 0x06;
pub const OP_BGTZ: u8 = 0x07;
pub const OP_ADDI: u8 = 0x08;
pub const OP_ADDIU: u8 = 0x09;
pub const OP_SLTI: u8 = 0x0A;
pub const OP_SLTIU: u8 = 0x0B;
pub const OP_ANDI: u8 = 0x0C;
pub const OP_ORI: u8 = 0x0D;
pub const OP_XORI: u8 = 0x0E;
pub const OP_LUI: u8 = 0x0F;
pub const OP_LB: u8 = 0x20;
pub const OP_LH: u8 = 0x21;
pub const OP_LW: u8 = 0x23;
pub const OP_LBU: u8 = 0x24;
pub const OP_LHU: u8 = 0x25;
pub const OP_SB: u8 = 0x28;
pub const OP_SH: u8 = 0x29;
pub const OP_SW: u8 = 0x2B;

// Functs for R-type words (bits 5..0).
// FUNCT_SLL doubles as the "no funct" value of non-R descriptors;
// the shape of the descriptor disambiguates.
pub const FUNCT_SLL: u8 = 0x00;
pub const FUNCT_SRL: u8 = 0x02;
pub const FUNCT_SRA: u8 = 0x03;
pub const FUNCT_SLLV: u8 = 0x04;
pub const FUNCT_SRLV: u8 = 0x06;
pub const FUNCT_SRAV: u8 = 0x07;
pub const FUNCT_JR: u8 = 0x08;
pub const FUNCT_JALR: u8 = 0x09;
pub const FUNCT_SYSCALL: u8 = 0x0C;
pub const FUNCT_MFHI: u8 = 0x10;
pub const FUNCT_MTHI: u8 = 0x11;
pub const FUNCT_MFLO: u8 = 0x12;
pub const FUNCT_MTLO: u8 = 0x13;
pub const FUNCT_MULT: u8 = 0x18;
pub const FUNCT_MULTU: u8 = 0x19;
pub const FUNCT_DIV: u8 = 0x1A;
pub const FUNCT_DIVU: u8 = 0x1B;
pub const FUNCT_ADD: u8 = 0x20;
pub const FUNCT_ADDU: u8 = 0x21;
pub const FUNCT_SUB: u8 = 0x22;
pub const FUNCT_SUBU: u8 = 0x23;
pub const FUNCT_AND: u8 = 0x24;
pub const FUNCT_OR: u8 = 0x25;
pub const FUNCT_XOR: u8 = 0x26;
pub const FUNCT_NOR: u8 = 0x27;
/// Set-if-equal. Nonstandard, kept for SPIM-flavored source compatibility.
pub const FUNCT_SEQ: u8 = 0x28;
pub const FUNCT_SLT: u8 = 0x2A;
pub const FUNCT_SLTU: u8 = 0x2B;

// REGIMM subcodes, carried in the rt field of opcode-0x01 words.
pub const RT_BLTZ: u8 = 0x00;
pub const RT_BGEZ: u8 = 0x01;

/// Extracts the opcode field (bits 31..26).
pub fn op(word: u32) -> u8 {
    (word >> 26) as u8
}
/// Extracts the rs field (bits 25..21).
pub fn rs(word: u32) -> Reg {
    Reg((word >> 21 & MASK5) as u8)
}
/// Extracts the rt field (bits 20..16).
pub fn rt(word: u32) -> Reg {
    Reg((word >> 16 & MASK5) as u8)
}
/// Extracts the rd field (bits 15..11).
pub fn rd(word: u32) -> Reg {
    Reg((word >> 11 & MASK5) as u8)
}
/// Extracts the shift-amount field (bits 10..6).
pub fn shamt(word: u32) -> u8 {
    (word >> 6 & MASK5) as u8
}
/// Extracts the funct field (bits 5..0).
pub fn funct(word: u32) -> u8 {
    (word & MASK6) as u8
}
/// Extracts the 16-bit immediate field of an I-type word.
pub fn imm16(word: u32) -> u16 {
    (word & MASK16) as u16
}
/// Extracts the 26-bit target field of a J-type word.
pub fn target26(word: u32) -> u32 {
    word & MASK26
}

/// Sign-extends a 16-bit immediate to 32 bits.
pub fn sext16(imm: u16) -> i32 {
    imm as i16 as i32
}

/// Builds an R-type word.
pub fn r_type(opcode: u8, rs: Reg, rt: Reg, rd: Reg, shamt: u8, funct: u8) -> u32 {
    (u32::from(opcode) & MASK6) << 26
        | u32::from(rs.num()) << 21
        | u32::from(rt.num()) << 16
        | u32::from(rd.num()) << 11
        | (u32::from(shamt) & MASK5) << 6
        | u32::from(funct) & MASK6
}

/// Builds an I-type word.
pub fn i_type(opcode: u8, rs: Reg, rt: Reg, imm: u16) -> u32 {
    (u32::from(opcode) & MASK6) << 26
        | u32::from(rs.num()) << 21
        | u32::from(rt.num()) << 16
        | u32::from(imm)
}

/// Builds a J-type word from a 26-bit word-index target.
pub fn j_type(opcode: u8, target: u32) -> u32 {
    (u32::from(opcode) & MASK6) << 26 | target & MASK26
}

/// Overlays the low 16 bits of a word, keeping bits 31..16 intact.
///
/// This is the patch applied by branch and `la` fixup resolution.
pub fn patch_imm16(word: u32, imm: u16) -> u32 {
    word & !MASK16 | u32::from(imm)
}

/// Overlays the low 26 bits of a word, keeping the opcode intact.
///
/// This is the patch applied by jump fixup resolution.
pub fn patch_target26(word: u32, target: u32) -> u32 {
    word & !MASK26 | target & MASK26
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::{T0, T1, T2, ZERO};

    #[test]
    fn test_r_type_round_trip() {
        // add $t0, $t1, $t2
        let word = r_type(OP_RTYPE, T1, T2, T0, 0, FUNCT_ADD);
        assert_eq!(word, 0x012A_4020);
        assert_eq!(op(word), OP_RTYPE);
        assert_eq!(rs(word), T1);
        assert_eq!(rt(word), T2);
        assert_eq!(rd(word), T0);
        assert_eq!(shamt(word), 0);
        assert_eq!(funct(word), FUNCT_ADD);
    }

    #[test]
    fn test_i_type_round_trip() {
        // addi $t0, $zero, -7
        let word = i_type(OP_ADDI, ZERO, T0, (-7i16) as u16);
        assert_eq!(op(word), OP_ADDI);
        assert_eq!(rs(word), ZERO);
        assert_eq!(rt(word), T0);
        assert_eq!(sext16(imm16(word)), -7);
    }

    #[test]
    fn test_j_type_round_trip() {
        let word = j_type(OP_J, 0x0040_0000 >> 2);
        assert_eq!(op(word), OP_J);
        assert_eq!(target26(word), 0x0010_0000);
    }

    #[test]
    fn test_patches() {
        let word = i_type(OP_BEQ, T0, T1, 0);
        let patched = patch_imm16(word, 0xFFFC);
        assert_eq!(op(patched), OP_BEQ);
        assert_eq!(rs(patched), T0);
        assert_eq!(rt(patched), T1);
        assert_eq!(sext16(imm16(patched)), -4);

        let word = j_type(OP_JAL, 0);
        let patched = patch_target26(word, 0x0010_0004);
        assert_eq!(op(patched), OP_JAL);
        assert_eq!(target26(patched), 0x0010_0004);
    }

    #[test]
    fn test_sext16() {
        assert_eq!(sext16(0x7FFF), 32767);
        assert_eq!(sext16(0x8000), -32768);
        assert_eq!(sext16(0xFFFF), -1);
    }
}
