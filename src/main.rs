use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mipsim::interp::{Control, Interpreter};
use mipsim::sim::io::StdIO;

/// An interactive assembler and simulator for a 32-bit MIPS subset.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Source files to assemble before the prompt appears.
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut interp = Interpreter::new(StdIO.into());
    let mut out = io::stdout();

    for path in &args.files {
        let control = interp
            .load_file(path, &mut out)
            .with_context(|| format!("cannot load {}", path.display()))?;
        if control == Control::Exit {
            return Ok(());
        }
    }
    out.flush()?;

    interp.repl(io::stdin().lock(), &mut out)?;
    Ok(())
}
