//! Executing machine code.
//!
//! This module is focused on executing words that the assembler has
//! placed in the text segment.
//!
//! This module consists of:
//! - [`Simulator`]: the CPU state (registers, PC, HI/LO, halt flag)
//!   together with the memory it executes against,
//! - [`mem`]: the memory and register file,
//! - [`io`]: the IO devices backing the syscall services.
//!
//! One instruction is executed per [`Simulator::step`]: the word at the
//! PC is fetched, the PC advances by 4, and the word is decoded by its
//! opcode (and funct field, for R-type words) and executed. There are no
//! delay slots. Errors abort the step without advancing the PC past the
//! faulting instruction.

pub mod io;
pub mod mem;

use crate::ast::reg_consts::{A0, A1, RA, V0};
use crate::err::Error as _;
use crate::inst;
use crate::inst::*;

use self::io::{IODevice, SimIO};
use self::mem::{Mem, MemErr, RegFile, STACK_INIT, TEXT_BASE};

/// Errors that can occur during execution.
///
/// Any of these aborts the current [`Simulator::step`]; the word that
/// raised it stays in memory and the PC stays at the faulting
/// instruction.
#[derive(Debug)]
pub enum SimErr {
    /// Word was fetched, but its opcode is not recognized.
    IllegalOpcode(u8),
    /// An R-type word's funct field is not recognized.
    IllegalFunct(u8),
    /// A REGIMM word's rt subcode is not recognized.
    IllegalRegimm(u8),
    /// Two's-complement overflow on `add`, `sub`, or `addi`.
    IntegerOverflow,
    /// `div`/`divu` with a zero divisor.
    DivideByZero,
    /// `syscall` with an unknown service number in `$v0`.
    UnknownSyscall(u32),
    /// Syscall 5 read something that isn't an integer.
    InputNotInteger(String),
    /// A memory access failed (bounds or alignment).
    Mem(MemErr),
    /// A syscall's IO failed.
    Io(std::io::Error),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::IllegalOpcode(op)   => write!(f, "illegal opcode 0x{op:02x}"),
            SimErr::IllegalFunct(fu)    => write!(f, "illegal funct 0x{fu:02x}"),
            SimErr::IllegalRegimm(rt)   => write!(f, "illegal REGIMM subcode 0x{rt:02x}"),
            SimErr::IntegerOverflow     => f.write_str("integer overflow"),
            SimErr::DivideByZero        => f.write_str("division by zero"),
            SimErr::UnknownSyscall(n)   => write!(f, "unknown syscall {n}"),
            SimErr::InputNotInteger(s)  => write!(f, "input {s:?} is not an integer"),
            SimErr::Mem(e)              => e.fmt(f),
            SimErr::Io(e)               => write!(f, "io error: {e}"),
        }
    }
}
impl std::error::Error for SimErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimErr::Mem(e) => Some(e),
            SimErr::Io(e)  => Some(e),
            _ => None,
        }
    }
}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SimErr::IntegerOverflow    => Some("addu/subu/addiu wrap instead of trapping".into()),
            SimErr::UnknownSyscall(_)  => Some("supported syscalls are 1, 4, 5, 8, 10, 11, 12".into()),
            SimErr::InputNotInteger(_) => Some("syscall 5 expects a decimal or 0x-prefixed integer".into()),
            SimErr::Mem(e)             => e.help(),
            _ => None,
        }
    }
}
impl From<MemErr> for SimErr {
    fn from(value: MemErr) -> Self {
        SimErr::Mem(value)
    }
}
impl From<std::io::Error> for SimErr {
    fn from(value: std::io::Error) -> Self {
        SimErr::Io(value)
    }
}

/// Executes machine code against a memory and register file.
#[derive(Debug)]
pub struct Simulator {
    /// The memory.
    pub mem: Mem,

    /// The register file.
    pub reg_file: RegFile,

    /// The program counter.
    pub pc: u32,

    /// Set by syscall 10. While set, the step loops stop executing.
    pub halted: bool,

    /// The number of instructions successfully run since the last reset.
    pub instructions_run: u64,

    /// The IO device backing the syscall services.
    io: SimIO,
}

impl Simulator {
    /// Creates a simulator with empty memory and the registers in their
    /// initial state (PC at the text base, `$sp` at the top of the stack).
    pub fn new(io: SimIO) -> Self {
        let mut sim = Simulator {
            mem: Mem::new(),
            reg_file: RegFile::new(),
            pc: TEXT_BASE,
            halted: false,
            instructions_run: 0,
            io,
        };
        sim.reset();
        sim
    }

    /// Resets memory, registers, PC, and the halt flag.
    ///
    /// The IO device is preserved.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.reg_file.reset();
        self.reg_file.write_u(crate::ast::reg_consts::SP, STACK_INIT);
        self.pc = TEXT_BASE;
        self.halted = false;
        self.instructions_run = 0;
    }

    /// Replaces the IO device backing the syscall services.
    pub fn open_io<IO: Into<SimIO>>(&mut self, io: IO) {
        self.io = io.into();
    }

    /// Executes one instruction: fetch the word at the PC, advance the
    /// PC by 4, then execute.
    ///
    /// On error the PC is restored to the faulting instruction's address;
    /// no destination register is written.
    pub fn step(&mut self) -> Result<(), SimErr> {
        let fetch_pc = self.pc;

        let result = self.fetch_execute();
        match result {
            Ok(()) => self.instructions_run += 1,
            Err(_) => self.pc = fetch_pc,
        }
        result
    }

    fn fetch_execute(&mut self) -> Result<(), SimErr> {
        let word = self.mem.load32(self.pc)?;
        self.pc = self.pc.wrapping_add(4);
        self.execute(word)
    }

    /// Runs until the PC reaches `limit`, the machine halts, an error
    /// occurs, or `max_steps` instructions have executed.
    ///
    /// Returns `true` if the run stopped because the step cap was hit.
    pub fn run_until(&mut self, limit: u32, max_steps: u64) -> Result<bool, SimErr> {
        let mut steps = 0;
        while self.pc < limit && !self.halted {
            if steps >= max_steps {
                return Ok(true);
            }
            self.step()?;
            steps += 1;
        }
        Ok(false)
    }

    /// Decodes and executes one word.
    fn execute(&mut self, word: u32) -> Result<(), SimErr> {
        match op(word) {
            OP_RTYPE  => self.execute_rtype(word),
            OP_REGIMM => {
                let cond = match rt(word).num() {
                    RT_BLTZ => self.reg_file.read_s(rs(word)) < 0,
                    RT_BGEZ => self.reg_file.read_s(rs(word)) >= 0,
                    sub => return Err(SimErr::IllegalRegimm(sub)),
                };
                self.branch_if(cond, imm16(word));
                Ok(())
            }

            OP_J | OP_JAL => {
                if op(word) == OP_JAL {
                    self.reg_file.write_u(RA, self.pc);
                }
                self.pc = (self.pc & 0xF000_0000) | (target26(word) << 2);
                Ok(())
            }

            OP_BEQ => {
                let cond = self.reg_file.read_u(rs(word)) == self.reg_file.read_u(rt(word));
                self.branch_if(cond, imm16(word));
                Ok(())
            }
            OP_BNE => {
                let cond = self.reg_file.read_u(rs(word)) != self.reg_file.read_u(rt(word));
                self.branch_if(cond, imm16(word));
                Ok(())
            }
            OP_BLEZ => {
                self.branch_if(self.reg_file.read_s(rs(word)) <= 0, imm16(word));
                Ok(())
            }
            OP_BGTZ => {
                self.branch_if(self.reg_file.read_s(rs(word)) > 0, imm16(word));
                Ok(())
            }

            OP_ADDI => {
                let sum = i64::from(self.reg_file.read_s(rs(word))) + i64::from(sext16(imm16(word)));
                let sum = check_overflow(sum)?;
                self.reg_file.write_s(rt(word), sum);
                Ok(())
            }
            OP_ADDIU => {
                let value = self.reg_file.read_u(rs(word)).wrapping_add_signed(sext16(imm16(word)));
                self.reg_file.write_u(rt(word), value);
                Ok(())
            }
            OP_SLTI => {
                let value = self.reg_file.read_s(rs(word)) < sext16(imm16(word));
                self.reg_file.write_u(rt(word), u32::from(value));
                Ok(())
            }
            OP_SLTIU => {
                // the immediate is sign-extended, then compared unsigned
                let value = self.reg_file.read_u(rs(word)) < sext16(imm16(word)) as u32;
                self.reg_file.write_u(rt(word), u32::from(value));
                Ok(())
            }
            OP_ANDI => {
                let value = self.reg_file.read_u(rs(word)) & u32::from(imm16(word));
                self.reg_file.write_u(rt(word), value);
                Ok(())
            }
            OP_ORI => {
                let value = self.reg_file.read_u(rs(word)) | u32::from(imm16(word));
                self.reg_file.write_u(rt(word), value);
                Ok(())
            }
            OP_XORI => {
                let value = self.reg_file.read_u(rs(word)) ^ u32::from(imm16(word));
                self.reg_file.write_u(rt(word), value);
                Ok(())
            }
            OP_LUI => {
                self.reg_file.write_u(rt(word), u32::from(imm16(word)) << 16);
                Ok(())
            }

            OP_LB => {
                let value = self.mem.load8(self.effective_addr(word))?;
                self.reg_file.write_s(rt(word), i32::from(value as i8));
                Ok(())
            }
            OP_LBU => {
                let value = self.mem.load8(self.effective_addr(word))?;
                self.reg_file.write_u(rt(word), u32::from(value));
                Ok(())
            }
            OP_LH => {
                let value = self.mem.load16(self.effective_addr(word))?;
                self.reg_file.write_s(rt(word), i32::from(value as i16));
                Ok(())
            }
            OP_LHU => {
                let value = self.mem.load16(self.effective_addr(word))?;
                self.reg_file.write_u(rt(word), u32::from(value));
                Ok(())
            }
            OP_LW => {
                let value = self.mem.load32(self.effective_addr(word))?;
                self.reg_file.write_u(rt(word), value);
                Ok(())
            }
            OP_SB => {
                self.mem.store8(self.effective_addr(word), self.reg_file.read_u(rt(word)) as u8)?;
                Ok(())
            }
            OP_SH => {
                self.mem.store16(self.effective_addr(word), self.reg_file.read_u(rt(word)) as u16)?;
                Ok(())
            }
            OP_SW => {
                self.mem.store32(self.effective_addr(word), self.reg_file.read_u(rt(word)))?;
                Ok(())
            }

            opcode => Err(SimErr::IllegalOpcode(opcode)),
        }
    }

    /// Executes an opcode-0 word, dispatching on its funct field.
    fn execute_rtype(&mut self, word: u32) -> Result<(), SimErr> {
        let (rs, rt, rd) = (inst::rs(word), inst::rt(word), inst::rd(word));

        match funct(word) {
            FUNCT_SLL => {
                let value = self.reg_file.read_u(rt) << shamt(word);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SRL => {
                let value = self.reg_file.read_u(rt) >> shamt(word);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SRA => {
                let value = self.reg_file.read_s(rt) >> shamt(word);
                self.reg_file.write_s(rd, value);
            }
            FUNCT_SLLV => {
                let value = self.reg_file.read_u(rt) << (self.reg_file.read_u(rs) & 0x1F);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SRLV => {
                let value = self.reg_file.read_u(rt) >> (self.reg_file.read_u(rs) & 0x1F);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SRAV => {
                let value = self.reg_file.read_s(rt) >> (self.reg_file.read_u(rs) & 0x1F);
                self.reg_file.write_s(rd, value);
            }

            FUNCT_JR => self.pc = self.reg_file.read_u(rs),
            FUNCT_JALR => {
                let target = self.reg_file.read_u(rs);
                self.reg_file.write_u(rd, self.pc);
                self.pc = target;
            }

            FUNCT_SYSCALL => self.syscall()?,

            FUNCT_MFHI => self.reg_file.write_u(rd, self.reg_file.hi()),
            FUNCT_MTHI => self.reg_file.set_hi(self.reg_file.read_u(rs)),
            FUNCT_MFLO => self.reg_file.write_u(rd, self.reg_file.lo()),
            FUNCT_MTLO => self.reg_file.set_lo(self.reg_file.read_u(rs)),

            FUNCT_MULT => {
                let product = i64::from(self.reg_file.read_s(rs)) * i64::from(self.reg_file.read_s(rt));
                self.reg_file.set_hi((product as u64 >> 32) as u32);
                self.reg_file.set_lo(product as u32);
            }
            FUNCT_MULTU => {
                let product = u64::from(self.reg_file.read_u(rs)) * u64::from(self.reg_file.read_u(rt));
                self.reg_file.set_hi((product >> 32) as u32);
                self.reg_file.set_lo(product as u32);
            }
            FUNCT_DIV => {
                let (n, d) = (self.reg_file.read_s(rs), self.reg_file.read_s(rt));
                if d == 0 {
                    return Err(SimErr::DivideByZero);
                }
                // i32::MIN / -1 wraps, as the hardware does
                self.reg_file.set_lo(n.wrapping_div(d) as u32);
                self.reg_file.set_hi(n.wrapping_rem(d) as u32);
            }
            FUNCT_DIVU => {
                let (n, d) = (self.reg_file.read_u(rs), self.reg_file.read_u(rt));
                if d == 0 {
                    return Err(SimErr::DivideByZero);
                }
                self.reg_file.set_lo(n / d);
                self.reg_file.set_hi(n % d);
            }

            FUNCT_ADD => {
                let sum = i64::from(self.reg_file.read_s(rs)) + i64::from(self.reg_file.read_s(rt));
                self.reg_file.write_s(rd, check_overflow(sum)?);
            }
            FUNCT_ADDU => {
                let value = self.reg_file.read_u(rs).wrapping_add(self.reg_file.read_u(rt));
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SUB => {
                let diff = i64::from(self.reg_file.read_s(rs)) - i64::from(self.reg_file.read_s(rt));
                self.reg_file.write_s(rd, check_overflow(diff)?);
            }
            FUNCT_SUBU => {
                let value = self.reg_file.read_u(rs).wrapping_sub(self.reg_file.read_u(rt));
                self.reg_file.write_u(rd, value);
            }
            FUNCT_AND => {
                let value = self.reg_file.read_u(rs) & self.reg_file.read_u(rt);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_OR => {
                let value = self.reg_file.read_u(rs) | self.reg_file.read_u(rt);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_XOR => {
                let value = self.reg_file.read_u(rs) ^ self.reg_file.read_u(rt);
                self.reg_file.write_u(rd, value);
            }
            FUNCT_NOR => {
                let value = !(self.reg_file.read_u(rs) | self.reg_file.read_u(rt));
                self.reg_file.write_u(rd, value);
            }
            FUNCT_SEQ => {
                let value = self.reg_file.read_u(rs) == self.reg_file.read_u(rt);
                self.reg_file.write_u(rd, u32::from(value));
            }
            FUNCT_SLT => {
                let value = self.reg_file.read_s(rs) < self.reg_file.read_s(rt);
                self.reg_file.write_u(rd, u32::from(value));
            }
            FUNCT_SLTU => {
                let value = self.reg_file.read_u(rs) < self.reg_file.read_u(rt);
                self.reg_file.write_u(rd, u32::from(value));
            }

            fu => return Err(SimErr::IllegalFunct(fu)),
        }

        Ok(())
    }

    /// The effective address of a load/store: `rs + sign_extend(imm)`.
    fn effective_addr(&self, word: u32) -> u32 {
        self.reg_file.read_u(rs(word)).wrapping_add_signed(sext16(imm16(word)))
    }

    /// Applies a taken/not-taken branch: `pc += sign_extend(imm) << 2`.
    ///
    /// The PC has already advanced past the branch word, so the offset is
    /// relative to the instruction after it.
    fn branch_if(&mut self, cond: bool, imm: u16) {
        if cond {
            self.pc = self.pc.wrapping_add_signed(sext16(imm) << 2);
        }
    }

    /// Dispatches a syscall on the service number in `$v0`.
    fn syscall(&mut self) -> Result<(), SimErr> {
        match self.reg_file.read_u(V0) {
            // print integer
            1 => {
                let value = self.reg_file.read_s(A0);
                self.io.write_bytes(value.to_string().as_bytes())?;
            }
            // print NUL-terminated string
            4 => {
                let mut addr = self.reg_file.read_u(A0);
                let mut bytes = vec![];
                loop {
                    let byte = self.mem.load8(addr)?;
                    if byte == 0 {
                        break;
                    }
                    bytes.push(byte);
                    addr = addr.wrapping_add(1);
                }
                self.io.write_bytes(&bytes)?;
            }
            // read integer
            5 => {
                let line = self.io.read_line()?;
                let text = line.trim();
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16).map(|v| v as i32),
                    None      => text.parse::<i32>(),
                };
                match parsed {
                    Ok(value) => self.reg_file.write_s(V0, value),
                    Err(_)    => return Err(SimErr::InputNotInteger(line)),
                }
            }
            // read string: up to max-1 bytes, then NUL
            8 => {
                let buf = self.reg_file.read_u(A0);
                let max = self.reg_file.read_u(A1);
                if max == 0 {
                    return Ok(());
                }
                let line = self.io.read_line()?;
                let take = line.len().min(max as usize - 1);
                for (i, &byte) in line.as_bytes()[..take].iter().enumerate() {
                    self.mem.store8(buf.wrapping_add(i as u32), byte)?;
                }
                self.mem.store8(buf.wrapping_add(take as u32), 0)?;
            }
            // exit
            10 => self.halted = true,
            // print char
            11 => {
                let byte = self.reg_file.read_u(A0) as u8;
                self.io.write_bytes(&[byte])?;
            }
            // read char
            12 => {
                let byte = self.io.read_byte()?.unwrap_or(0);
                self.reg_file.write_u(V0, u32::from(byte));
            }
            service => return Err(SimErr::UnknownSyscall(service)),
        }

        Ok(())
    }
}

/// Verifies that a 64-bit intermediate fits in 32-bit two's complement.
fn check_overflow(value: i64) -> Result<i32, SimErr> {
    i32::try_from(value).map_err(|_| SimErr::IntegerOverflow)
}
