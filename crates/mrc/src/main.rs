//! mrc CLI - MIPS to C static recompiler.

use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mrc")]
#[command(about = "MIPS recompiler - lifts IDO O32 ELF executables to C")]
#[command(version)]
struct Cli {
    /// Reserve s0..s7 and fp as file-scope storage and keep dead
    /// instructions (their values escape across calls)
    #[arg(long)]
    conservative: bool,

    /// Instrument the emitted program with per-pc prints and a retire
    /// counter
    #[arg(long)]
    trace: bool,

    /// Print the lifted instruction listing instead of emitting C
    #[arg(long)]
    disasm: bool,

    /// Input ELF executable
    #[arg(value_name = "ELF")]
    input: PathBuf,
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let stdout = BufWriter::new(io::stdout().lock());

    if cli.disasm {
        mrc::disassemble(&cli.input, stdout)
    } else {
        mrc::recompile(
            &cli.input,
            mrc::Options {
                conservative: cli.conservative,
                trace: cli.trace,
            },
            stdout,
        )
    }
    .with_context(|| format!("failed to recompile {}", cli.input.display()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
