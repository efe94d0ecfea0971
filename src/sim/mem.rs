//! Memory handling for the simulator.
//!
//! This module consists of:
//! - [`Mem`]: the sparse byte-addressed memory,
//! - [`RegFile`]: the register file,
//! - the segment layout constants and predicates.
//!
//! # Address space
//!
//! The 32-bit address space is partitioned into three disjoint regions:
//!
//! | segment | range |
//! |---------|-------|
//! | text    | `0x0040_0000 .. 0x1000_0000` |
//! | data    | `0x1000_0000 .. 0x1004_0000` |
//! | stack   | `0x1004_0000 .. 0x8000_0000` |
//!
//! Any address outside the union of these regions is invalid for loads
//! and stores. Unwritten bytes inside a valid region read as zero.
//! Multi-byte accesses are big-endian.

use std::collections::BTreeMap;

use crate::ast::{reg_consts, Reg};

/// Lowest text segment address; also the initial PC.
pub const TEXT_BASE: u32 = 0x0040_0000;
/// One past the highest text segment address.
pub const TEXT_LIMIT: u32 = 0x1000_0000;
/// Lowest data segment address.
pub const DATA_BASE: u32 = 0x1000_0000;
/// One past the highest data segment address.
pub const DATA_LIMIT: u32 = 0x1004_0000;
/// Lowest stack segment address.
pub const STACK_BASE: u32 = DATA_LIMIT;
/// One past the highest stack segment address.
pub const STACK_LIMIT: u32 = 0x8000_0000;
/// Initial value of `$sp`.
pub const STACK_INIT: u32 = 0x7FFF_EFFC;

/// Errors that can occur from a checked memory access.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MemErr {
    /// The address is outside every segment (or the access straddles a
    /// segment's end).
    OutOfBounds(u32),
    /// The address does not have the alignment the access requires.
    Unaligned {
        /// The offending address.
        addr: u32,
        /// The alignment the access requires, in bytes.
        required: u32
    },
}
impl std::fmt::Display for MemErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemErr::OutOfBounds(addr) => write!(f, "memory address 0x{addr:08x} out of bounds"),
            MemErr::Unaligned { addr, required } => {
                write!(f, "memory address 0x{addr:08x} not aligned to {required} bytes")
            }
        }
    }
}
impl std::error::Error for MemErr {}
impl crate::err::Error for MemErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            MemErr::OutOfBounds(_) => Some(format!(
                "valid addresses are text [0x{TEXT_BASE:08x}, 0x{TEXT_LIMIT:08x}), data [0x{DATA_BASE:08x}, 0x{DATA_LIMIT:08x}), stack [0x{STACK_BASE:08x}, 0x{STACK_LIMIT:08x})"
            ).into()),
            MemErr::Unaligned { .. } => None,
        }
    }
}

/// Whether the address is in the text segment.
pub fn is_text(addr: u32) -> bool {
    (TEXT_BASE..TEXT_LIMIT).contains(&addr)
}
/// Whether the address is in the data segment.
pub fn is_data(addr: u32) -> bool {
    (DATA_BASE..DATA_LIMIT).contains(&addr)
}
/// Whether the address is in the stack segment.
pub fn is_stack(addr: u32) -> bool {
    (STACK_BASE..STACK_LIMIT).contains(&addr)
}
/// Whether the address is in any segment.
pub fn is_valid(addr: u32) -> bool {
    is_text(addr) || is_data(addr) || is_stack(addr)
}

/// The memory: a sparse map from 32-bit addresses to bytes.
///
/// Two access layers are provided:
/// - [`Mem::load8`]..[`Mem::store32`]: checked accesses that enforce the
///   segment bounds and alignment rules. These are what the CPU uses.
/// - [`Mem::peek32`]/[`Mem::poke32`] (and byte variants): raw accesses
///   with no checks, for the assembler (which performs its own cursor
///   checks before writing) and for state inspection (dumps, fixup
///   patching).
///
/// ```
/// use mipsim::sim::mem::{Mem, DATA_BASE};
///
/// let mut mem = Mem::new();
/// mem.store32(DATA_BASE, 0xDEAD_BEEF).unwrap();
/// assert_eq!(mem.load32(DATA_BASE), Ok(0xDEAD_BEEF));
/// // byte order is big-endian
/// assert_eq!(mem.load8(DATA_BASE), Ok(0xDE));
/// assert_eq!(mem.load8(DATA_BASE + 3), Ok(0xEF));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Mem {
    bytes: BTreeMap<u32, u8>,
}

impl Mem {
    /// Creates an empty memory.
    pub fn new() -> Self {
        Mem::default()
    }

    /// Clears all memory contents.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    fn check_bounds(&self, addr: u32, size: u32) -> Result<(), MemErr> {
        // A valid access never straddles a segment boundary: every
        // aligned 2- or 4-byte group lies within one segment, so
        // checking the first and last byte suffices.
        let last = addr.wrapping_add(size - 1);
        match is_valid(addr) && is_valid(last) {
            true  => Ok(()),
            false => Err(MemErr::OutOfBounds(addr)),
        }
    }

    fn check_align(&self, addr: u32, align: u32) -> Result<(), MemErr> {
        match addr % align == 0 {
            true  => Ok(()),
            false => Err(MemErr::Unaligned { addr, required: align }),
        }
    }

    /// Loads a byte. Requires only that the address is in a segment.
    pub fn load8(&self, addr: u32) -> Result<u8, MemErr> {
        self.check_bounds(addr, 1)?;
        Ok(self.peek8(addr))
    }

    /// Loads a half-word (big-endian). Requires 2-byte alignment.
    pub fn load16(&self, addr: u32) -> Result<u16, MemErr> {
        self.check_align(addr, 2)?;
        self.check_bounds(addr, 2)?;
        Ok(u16::from(self.peek8(addr)) << 8 | u16::from(self.peek8(addr + 1)))
    }

    /// Loads a word (big-endian). Requires 4-byte alignment.
    pub fn load32(&self, addr: u32) -> Result<u32, MemErr> {
        self.check_align(addr, 4)?;
        self.check_bounds(addr, 4)?;
        Ok(self.peek32(addr))
    }

    /// Stores a byte. Requires only that the address is in a segment.
    pub fn store8(&mut self, addr: u32, value: u8) -> Result<(), MemErr> {
        self.check_bounds(addr, 1)?;
        self.poke8(addr, value);
        Ok(())
    }

    /// Stores a half-word (big-endian). Requires 2-byte alignment.
    pub fn store16(&mut self, addr: u32, value: u16) -> Result<(), MemErr> {
        self.check_align(addr, 2)?;
        self.check_bounds(addr, 2)?;
        self.poke8(addr, (value >> 8) as u8);
        self.poke8(addr + 1, value as u8);
        Ok(())
    }

    /// Stores a word (big-endian). Requires 4-byte alignment.
    pub fn store32(&mut self, addr: u32, value: u32) -> Result<(), MemErr> {
        self.check_align(addr, 4)?;
        self.check_bounds(addr, 4)?;
        self.poke32(addr, value);
        Ok(())
    }

    /// Reads a byte with no checks. Unmapped bytes read as zero.
    ///
    /// This is **only** meant for querying the machine's state (dumps,
    /// fixup patching); a simulated load should use [`Mem::load8`].
    pub fn peek8(&self, addr: u32) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }

    /// Reads a big-endian word with no checks.
    ///
    /// This is **only** meant for querying the machine's state; a
    /// simulated load should use [`Mem::load32`].
    pub fn peek32(&self, addr: u32) -> u32 {
        u32::from(self.peek8(addr)) << 24
            | u32::from(self.peek8(addr.wrapping_add(1))) << 16
            | u32::from(self.peek8(addr.wrapping_add(2))) << 8
            | u32::from(self.peek8(addr.wrapping_add(3)))
    }

    /// Writes a byte with no checks.
    ///
    /// This is **only** meant for editing the machine's state (the
    /// assembler checks its cursors itself); a simulated store should
    /// use [`Mem::store8`].
    pub fn poke8(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }

    /// Writes a big-endian word with no checks.
    ///
    /// This is **only** meant for editing the machine's state; a
    /// simulated store should use [`Mem::store32`].
    pub fn poke32(&mut self, addr: u32, value: u32) {
        self.poke8(addr, (value >> 24) as u8);
        self.poke8(addr.wrapping_add(1), (value >> 16) as u8);
        self.poke8(addr.wrapping_add(2), (value >> 8) as u8);
        self.poke8(addr.wrapping_add(3), value as u8);
    }

    /// The aligned word addresses in `[start, limit)` with at least one
    /// mapped byte, in ascending order.
    ///
    /// This is what the segment dumps iterate over.
    pub fn mapped_words(&self, start: u32, limit: u32) -> Vec<u32> {
        let mut words = vec![];
        let mut last = None;

        for (&addr, _) in self.bytes.range(start..limit) {
            let word_addr = addr & !0x3;
            if last == Some(word_addr) {
                continue;
            }
            last = Some(word_addr);

            // don't cross the region limit
            if word_addr < start || word_addr.wrapping_add(3) >= limit {
                continue;
            }
            words.push(word_addr);
        }

        words
    }
}

/// The register file: 32 general-purpose registers plus HI and LO.
///
/// Each register can be read as unsigned or as two's-complement signed.
/// Register 0 (`$zero`) is hard-wired: writes to it are silent no-ops.
///
/// # Example
///
/// ```
/// use mipsim::sim::mem::RegFile;
/// use mipsim::ast::reg_consts::{T0, ZERO};
///
/// let mut regs = RegFile::new();
/// regs.write_u(T0, 0xFFFF_FFFF);
/// assert_eq!(regs.read_u(T0), 0xFFFF_FFFF);
/// assert_eq!(regs.read_s(T0), -1);
///
/// regs.write_u(ZERO, 99);
/// assert_eq!(regs.read_u(ZERO), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegFile {
    regs: [u32; 32],
    hi: u32,
    lo: u32,
}

impl RegFile {
    /// Creates a register file with all registers zero.
    pub fn new() -> Self {
        RegFile::default()
    }

    /// Zeroes every register, including HI and LO.
    pub fn reset(&mut self) {
        *self = RegFile::default();
    }

    /// Reads a register as unsigned.
    pub fn read_u(&self, reg: Reg) -> u32 {
        self.regs[usize::from(reg)]
    }

    /// Reads a register as two's-complement signed.
    pub fn read_s(&self, reg: Reg) -> i32 {
        self.read_u(reg) as i32
    }

    /// Writes a register. Writing `$zero` is a no-op.
    pub fn write_u(&mut self, reg: Reg, value: u32) {
        if reg != reg_consts::ZERO {
            self.regs[usize::from(reg)] = value;
        }
    }

    /// Writes a register with a signed value. Writing `$zero` is a no-op.
    pub fn write_s(&mut self, reg: Reg, value: i32) {
        self.write_u(reg, value as u32);
    }

    /// Reads the HI register.
    pub fn hi(&self) -> u32 {
        self.hi
    }
    /// Writes the HI register.
    pub fn set_hi(&mut self, value: u32) {
        self.hi = value;
    }
    /// Reads the LO register.
    pub fn lo(&self) -> u32 {
        self.lo
    }
    /// Writes the LO register.
    pub fn set_lo(&mut self, value: u32) {
        self.lo = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::{T0, ZERO};

    #[test]
    fn test_unmapped_reads_zero() {
        let mem = Mem::new();
        assert_eq!(mem.load8(DATA_BASE), Ok(0));
        assert_eq!(mem.load16(DATA_BASE), Ok(0));
        assert_eq!(mem.load32(TEXT_BASE), Ok(0));
    }

    #[test]
    fn test_big_endian() {
        let mut mem = Mem::new();
        mem.store32(DATA_BASE, 0x1234_5678).unwrap();
        assert_eq!(mem.load8(DATA_BASE), Ok(0x12));
        assert_eq!(mem.load8(DATA_BASE + 1), Ok(0x34));
        assert_eq!(mem.load8(DATA_BASE + 2), Ok(0x56));
        assert_eq!(mem.load8(DATA_BASE + 3), Ok(0x78));
        assert_eq!(mem.load16(DATA_BASE), Ok(0x1234));
        assert_eq!(mem.load16(DATA_BASE + 2), Ok(0x5678));

        mem.store16(DATA_BASE + 4, 0xBEEF).unwrap();
        assert_eq!(mem.load8(DATA_BASE + 4), Ok(0xBE));
        assert_eq!(mem.load8(DATA_BASE + 5), Ok(0xEF));
    }

    #[test]
    fn test_alignment() {
        let mut mem = Mem::new();
        assert_eq!(mem.load32(DATA_BASE + 2), Err(MemErr::Unaligned { addr: DATA_BASE + 2, required: 4 }));
        assert_eq!(mem.load16(DATA_BASE + 1), Err(MemErr::Unaligned { addr: DATA_BASE + 1, required: 2 }));
        assert_eq!(mem.store32(DATA_BASE + 1, 0), Err(MemErr::Unaligned { addr: DATA_BASE + 1, required: 4 }));
        assert_eq!(mem.store16(DATA_BASE + 3, 0), Err(MemErr::Unaligned { addr: DATA_BASE + 3, required: 2 }));
        // byte access needs no alignment
        assert!(mem.store8(DATA_BASE + 3, 1).is_ok());
    }

    #[test]
    fn test_bounds() {
        let mut mem = Mem::new();
        assert_eq!(mem.load8(0), Err(MemErr::OutOfBounds(0)));
        assert_eq!(mem.load8(TEXT_BASE - 1), Err(MemErr::OutOfBounds(TEXT_BASE - 1)));
        assert_eq!(mem.load32(STACK_LIMIT), Err(MemErr::OutOfBounds(STACK_LIMIT)));
        assert_eq!(mem.store8(0xFFFF_FFFF, 1), Err(MemErr::OutOfBounds(0xFFFF_FFFF)));

        // segment edges
        assert!(mem.load32(TEXT_BASE).is_ok());
        assert!(mem.load32(STACK_LIMIT - 4).is_ok());
        assert!(mem.load8(DATA_LIMIT).is_ok()); // first stack byte
    }

    #[test]
    fn test_segment_predicates() {
        assert!(is_text(TEXT_BASE) && !is_text(TEXT_LIMIT));
        assert!(is_data(DATA_BASE) && !is_data(DATA_LIMIT));
        assert!(is_stack(STACK_BASE) && !is_stack(STACK_LIMIT));
        assert!(!is_valid(0) && !is_valid(STACK_LIMIT) && is_valid(STACK_INIT));
    }

    #[test]
    fn test_mapped_words() {
        let mut mem = Mem::new();
        mem.store32(DATA_BASE + 8, 5).unwrap();
        mem.store8(DATA_BASE + 1, 7).unwrap(); // partial word
        mem.store8(DATA_BASE + 13, 9).unwrap();

        assert_eq!(mem.mapped_words(DATA_BASE, DATA_LIMIT), vec![DATA_BASE, DATA_BASE + 8, DATA_BASE + 12]);
        assert_eq!(mem.mapped_words(DATA_BASE, DATA_BASE + 12), vec![DATA_BASE, DATA_BASE + 8]);
        assert_eq!(mem.mapped_words(STACK_BASE, STACK_LIMIT), vec![]);
    }

    #[test]
    fn test_reset() {
        let mut mem = Mem::new();
        mem.store32(DATA_BASE, 0x1234_5678).unwrap();
        mem.reset();
        assert_eq!(mem.load32(DATA_BASE), Ok(0));
    }

    #[test]
    fn test_reg_zero_hardwired() {
        let mut regs = RegFile::new();
        regs.write_u(ZERO, 0xFFFF_FFFF);
        assert_eq!(regs.read_u(ZERO), 0);
        regs.write_s(ZERO, -1);
        assert_eq!(regs.read_s(ZERO), 0);
    }

    #[test]
    fn test_reg_signed_unsigned() {
        let mut regs = RegFile::new();
        regs.write_s(T0, -2);
        assert_eq!(regs.read_u(T0), 0xFFFF_FFFE);
        regs.write_u(T0, 0x8000_0000);
        assert_eq!(regs.read_s(T0), i32::MIN);
    }

    #[test]
    fn test_hi_lo() {
        let mut regs = RegFile::new();
        regs.set_hi(1);
        regs.set_lo(2);
        assert_eq!((regs.hi(), regs.lo()), (1, 2));
        regs.reset();
        assert_eq!((regs.hi(), regs.lo()), (0, 0));
    }
}
