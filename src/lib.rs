//! An interactive assembler and simulator for a 32-bit MIPS subset,
//! in the spirit of SPIM.
//!
//! Lines of assembly are lexed, parsed, encoded to 32-bit machine words,
//! written into a simulated address space, and — as soon as no
//! unresolved label references remain — executed on a simulated CPU.
//! Forward references are handled without a second pass: the assembler
//! emits placeholder words and back-patches them when the label is
//! defined.
//!
//! # Usage
//!
//! The lowest-friction entry point is [`asm::Machine`], which assembles
//! lines and owns the simulator:
//!
//! ```
//! use mipsim::asm::Machine;
//! use mipsim::ast::reg_consts::T0;
//!
//! let mut machine = Machine::new(Default::default());
//! machine.assemble_line("li $t0, 7").unwrap();
//!
//! // nothing is waiting on a label, so the program can run
//! assert!(!machine.has_unresolved_fixups());
//! let limit = machine.text_cursor();
//! machine.sim.run_until(limit, 1_000).unwrap();
//! assert_eq!(machine.sim.reg_file.read_u(T0), 7);
//! ```
//!
//! For the full interactive experience (commands, dumps, file loading,
//! history), use [`interp::Interpreter`]:
//!
//! ```
//! use std::io::Cursor;
//! use mipsim::interp::Interpreter;
//! use mipsim::sim::io::{BufferedIO, SimIO};
//!
//! let io = BufferedIO::new();
//! let mut interp = Interpreter::new(SimIO::from(io.clone()));
//!
//! let script = Cursor::new("li $v0, 11\nli $a0, 33\nsyscall\nexit\n");
//! interp.repl(script, &mut Vec::new()).unwrap();
//! assert_eq!(io.output_string(), "!");
//! ```
#![warn(missing_docs)]

pub mod asm;
pub mod ast;
pub mod err;
pub mod inst;
pub mod interp;
pub mod parse;
pub mod sim;
