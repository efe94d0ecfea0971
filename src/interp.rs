//! The interactive interpreter.
//!
//! [`Interpreter`] glues the pipeline together: each input line is either
//! a command (`regs`, `run`, `save`, ...) or assembly for the current
//! segment. Assembly is handed to the [`Machine`]; as soon as no
//! unresolved fixups remain, the CPU steps until it catches up with the
//! text cursor, so a line executes the moment it can.
//!
//! The interpreter is also the crate's single error-recovery boundary:
//! a failed line is reported, the segment cursors are rolled back to
//! their values before the line, and the session continues.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::asm::Machine;
use crate::err;
use crate::sim::mem::{DATA_BASE, DATA_LIMIT, STACK_BASE, STACK_LIMIT, TEXT_BASE};

/// Safety cap on `run`, so an infinite loop cannot wedge the session.
const MAX_RUN_STEPS: u64 = 1_000_000;

/// What the caller of [`Interpreter::handle_line`] should do next.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Control {
    /// Keep reading lines.
    Continue,
    /// The user asked to quit.
    Exit,
}

/// One successfully assembled source line.
#[derive(Debug, Clone)]
struct HistoryEntry {
    /// The line as typed.
    text: String,
    /// Whether the text segment was the assembly target after the line.
    in_text: bool,
    /// PC before and after the line's catch-up execution.
    pc_before: u32,
    pc_after: u32,
}

/// The interactive interpreter: a [`Machine`] plus the program history.
#[derive(Debug, Default)]
pub struct Interpreter {
    /// The machine lines are assembled into.
    pub machine: Machine,
    history: Vec<HistoryEntry>,
    line_number: u32,
}

impl Interpreter {
    /// Creates an interpreter whose machine uses the given IO device.
    pub fn new(io: crate::sim::io::SimIO) -> Self {
        Interpreter {
            machine: Machine::new(io),
            history: vec![],
            line_number: 0,
        }
    }

    /// The prompt for the next line, showing the current segment and its
    /// cursor.
    pub fn prompt(&self) -> String {
        match self.machine.in_text() {
            true  => format!("TEXT:0x{:08x} > ", self.machine.text_cursor()),
            false => format!("DATA:0x{:08x} > ", self.machine.data_cursor()),
        }
    }

    /// Runs the read-eval-print loop until `exit`/`quit` or end of input.
    pub fn repl(&mut self, input: impl BufRead, out: &mut impl Write) -> io::Result<()> {
        let mut lines = input.lines();
        loop {
            write!(out, "{}", self.prompt())?;
            out.flush()?;

            let Some(line) = lines.next().transpose()? else {
                writeln!(out)?;
                break;
            };
            if self.handle_line(&line, out)? == Control::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Processes one input line: a command, a segment switch, or assembly.
    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> io::Result<Control> {
        self.line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            return Ok(Control::Continue);
        }

        match line {
            "?" | "help" => {
                self.print_help(out)?;
                return Ok(Control::Continue);
            }
            "regs" => {
                self.print_registers(out)?;
                return Ok(Control::Continue);
            }
            "labels" => {
                self.print_labels(out)?;
                return Ok(Control::Continue);
            }
            "data" => {
                self.print_region(out, "DATA SEGMENT", DATA_BASE, DATA_LIMIT)?;
                return Ok(Control::Continue);
            }
            "stack" => {
                self.print_region(out, "STACK SEGMENT", STACK_BASE, STACK_LIMIT)?;
                return Ok(Control::Continue);
            }
            "run" => {
                self.run_program(out)?;
                return Ok(Control::Continue);
            }
            "reset" => {
                self.machine.reset();
                self.history.clear();
                writeln!(out, "Machine reset.")?;
                return Ok(Control::Continue);
            }
            "exit" | "quit" => {
                writeln!(out, "exiting...")?;
                return Ok(Control::Exit);
            }
            "save" | "read" | "load" => {
                writeln!(out, "usage: {line} \"FILE\"")?;
                return Ok(Control::Continue);
            }
            _ => {}
        }

        // Commands with a file argument.
        if let Some((cmd, arg)) = line.split_once(char::is_whitespace) {
            let arg = unquote(arg.trim());
            match cmd {
                "read" | "load" => {
                    return match self.load_file(arg.as_ref(), out) {
                        Ok(control) => Ok(control),
                        Err(e) => {
                            writeln!(out, "error: cannot read {arg}: {e}")?;
                            Ok(Control::Continue)
                        }
                    };
                }
                "save" => {
                    match self.save_history(arg.as_ref()) {
                        Ok(count) => writeln!(out, "saved {count} lines to {arg}")?,
                        Err(e)    => writeln!(out, "error: cannot write {arg}: {e}")?,
                    }
                    return Ok(Control::Continue);
                }
                _ => {}
            }
        }

        self.handle_assembly(line, out)?;
        Ok(Control::Continue)
    }

    /// Assembles one line and, when possible, executes up to the text
    /// cursor. On failure the cursors are rolled back and the line is
    /// not recorded in the history.
    fn handle_assembly(&mut self, line: &str, out: &mut impl Write) -> io::Result<()> {
        let text0 = self.machine.text_cursor();
        let data0 = self.machine.data_cursor();
        let pc0 = self.machine.sim.pc;

        if let Err(e) = self.machine.assemble_line(line) {
            write!(out, "{}", err::report(&e, line, self.line_number))?;
            self.machine.rollback(text0, data0);
            return Ok(());
        }

        match self.catch_up() {
            Ok(false) => {}
            Ok(true) => {
                writeln!(out, "stopped after {MAX_RUN_STEPS} steps (possible infinite loop)")?;
            }
            Err(e) => {
                writeln!(out, "runtime error: {e}")?;
                if let Some(help) = err::Error::help(&e) {
                    writeln!(out, "help: {help}")?;
                }
                self.machine.rollback(text0, data0);
                return Ok(());
            }
        }

        self.history.push(HistoryEntry {
            text: line.to_string(),
            in_text: self.machine.in_text(),
            pc_before: pc0,
            pc_after: self.machine.sim.pc,
        });
        Ok(())
    }

    /// Steps the CPU until it reaches the text cursor, unless execution
    /// has to wait (unresolved fixups, data mode, or a halted machine).
    ///
    /// Returns `true` if the safety cap cut the execution short.
    fn catch_up(&mut self) -> Result<bool, crate::sim::SimErr> {
        if !self.machine.in_text() || self.machine.has_unresolved_fixups() {
            return Ok(false);
        }
        self.machine.sim.run_until(self.machine.text_cursor(), MAX_RUN_STEPS)
    }

    /// The `run` command: execute from the start of the text segment.
    fn run_program(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.machine.has_unresolved_fixups() {
            writeln!(
                out,
                "cannot run: unresolved labels: {}",
                self.machine.unresolved_labels().join(", ")
            )?;
            return Ok(());
        }

        self.machine.sim.pc = TEXT_BASE;
        self.machine.sim.halted = false;

        match self.machine.sim.run_until(self.machine.text_cursor(), MAX_RUN_STEPS) {
            Ok(true) => writeln!(out, "run: stopped after {MAX_RUN_STEPS} steps (possible infinite loop)")?,
            Ok(false) => {}
            Err(e) => {
                writeln!(out, "runtime error: {e}")?;
                if let Some(help) = err::Error::help(&e) {
                    writeln!(out, "help: {help}")?;
                }
            }
        }
        Ok(())
    }

    /// Loads a source file, feeding each line through [`Interpreter::handle_line`].
    pub fn load_file(&mut self, path: &Path, out: &mut impl Write) -> io::Result<Control> {
        let source = std::fs::read_to_string(path)?;
        for line in source.lines() {
            if self.handle_line(line, out)? == Control::Exit {
                return Ok(Control::Exit);
            }
        }
        Ok(Control::Continue)
    }

    /// Writes the successfully assembled lines, in order, to a file.
    /// Segment-switch directives were recorded as ordinary lines, so
    /// re-loading the file reproduces the program.
    fn save_history(&self, path: &Path) -> io::Result<usize> {
        let mut contents = String::new();
        for entry in &self.history {
            contents.push_str(&entry.text);
            contents.push('\n');
        }
        std::fs::write(path, contents)?;
        Ok(self.history.len())
    }

    /// The pc range the recorded program covered, if any line executed.
    pub fn history_pc_range(&self) -> Option<(u32, u32)> {
        let first = self.history.iter().find(|e| e.in_text)?;
        let last = self.history.iter().rev().find(|e| e.in_text)?;
        Some((first.pc_before, last.pc_after))
    }

    fn print_help(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(
            b"Commands:\n\
              \x20 ?/help      - show this help\n\
              \x20 .text       - switch to text segment\n\
              \x20 .data       - switch to data segment\n\
              \x20 regs        - show register file\n\
              \x20 labels      - show defined labels\n\
              \x20 data        - dump the data segment\n\
              \x20 stack       - dump the stack segment\n\
              \x20 run         - run program from the start of the text segment\n\
              \x20 reset       - reset machine (regs, pc, cursors, memory)\n\
              \x20 save \"F\"    - save the program entered so far to a file\n\
              \x20 read \"F\"    - load and assemble a file (load also works)\n\
              \x20 exit/quit   - quit interpreter\n\
              Anything else is assembled into the current segment.\n",
        )
    }

    fn print_registers(&self, out: &mut impl Write) -> io::Result<()> {
        let regs = &self.machine.sim.reg_file;
        let mut table = String::new();

        banner(&mut table, "REGISTERS");
        let _ = writeln!(
            table,
            "{:>12}|{:>12}|{:>12}|{:>12}|{:>12}",
            "reg number", "reg name", "value (int)", "value (hex)", "value (char)"
        );
        rule(&mut table);

        for i in 0..32u8 {
            let reg = crate::ast::Reg::try_from(i).unwrap_or_else(|_| unreachable!("0..32 are registers"));
            push_value_row(&mut table, &format!("${i}"), &reg.to_string(), regs.read_u(reg));
        }
        push_value_row(&mut table, "N/A", "$hi", regs.hi());
        push_value_row(&mut table, "N/A", "$lo", regs.lo());
        rule(&mut table);

        out.write_all(table.as_bytes())
    }

    fn print_labels(&self, out: &mut impl Write) -> io::Result<()> {
        let mut labels: Vec<_> = self.machine.label_iter().collect();
        labels.sort_by_key(|&(_, addr)| addr);

        let mut table = String::new();
        banner(&mut table, "LABELS");
        match labels.is_empty() {
            true => table.push_str("  (no labels defined)\n"),
            false => {
                for (name, addr) in labels {
                    let _ = writeln!(table, "  0x{addr:08x}  {name}");
                }
            }
        }

        out.write_all(table.as_bytes())
    }

    /// Dumps every mapped word of `[start, limit)` in address order.
    fn print_region(&self, out: &mut impl Write, title: &str, start: u32, limit: u32) -> io::Result<()> {
        let mem = &self.machine.sim.mem;
        let mut table = String::new();

        banner(&mut table, title);
        let _ = writeln!(
            table,
            "{:>12}|{:>12}|{:>12}|{:>12}|{:>12}",
            "addr (int)", "addr (hex)", "value (int)", "value (hex)", "value (char)"
        );
        rule(&mut table);

        let words = mem.mapped_words(start, limit);
        match words.is_empty() {
            true => table.push_str("  (no mapped words in region)\n"),
            false => {
                for addr in words {
                    let word = mem.peek32(addr);
                    let bytes = word.to_be_bytes();
                    let hex = format!("{:02x} {:02x} {:02x} {:02x}", bytes[0], bytes[1], bytes[2], bytes[3]);
                    let chars = bytes.map(|b| pad2(&show_char(b))).join(" ");
                    let _ = writeln!(
                        table,
                        "{:>12}|{:>12x}|{:>12}|{:>12}|{:>12}",
                        addr, addr, word as i32, hex, chars
                    );
                }
            }
        }
        rule(&mut table);

        out.write_all(table.as_bytes())
    }
}

fn banner(table: &mut String, title: &str) {
    let _ = writeln!(table, "{}", "=".repeat(64));
    let _ = writeln!(table, "{title}");
    let _ = writeln!(table, "{}", "=".repeat(64));
}

fn rule(table: &mut String) {
    let _ = writeln!(table, "{}", format!("{}+", "-".repeat(12)).repeat(4) + &"-".repeat(12));
}

fn push_value_row(table: &mut String, number: &str, name: &str, value: u32) {
    let _ = writeln!(
        table,
        "{:>12}|{:>12}|{:>12}|  0x{:08x}|{:>12}",
        number, name, value as i32, value,
        format!("'{}'", pad_char(value as u8))
    );
}

/// A register's low byte as a display character.
fn pad_char(byte: u8) -> char {
    match byte.is_ascii_graphic() || byte == b' ' {
        true  => char::from(byte),
        false => '.',
    }
}

/// A memory byte as a display string, with the common escapes spelled out.
fn show_char(byte: u8) -> String {
    match byte {
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        0     => "\\0".to_string(),
        b'"'  => "\\\"".to_string(),
        b'\\' => "\\\\".to_string(),
        32..=126 => char::from(byte).to_string(),
        _ => ".".to_string(),
    }
}

/// Pads or truncates to exactly two characters.
fn pad2(s: &str) -> String {
    let mut cell: String = s.chars().take(2).collect();
    while cell.len() < 2 {
        cell.push(' ');
    }
    cell
}

/// Strips one layer of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}
