//! mrc - static recompiler for IDO-compiled big-endian MIPS executables.
//!
//! The pipeline reads one ELF, lifts the instruction stream through the
//! analysis passes of `mrc-cfg`, and prints a C translation unit on the
//! output sink. One shot, no retries: any hard error aborts the compile.

mod error;

pub use error::{Error, Result};

use std::fs;
use std::io::Write;
use std::path::Path;

use mrc_cfg::{Analysis, AnalysisOptions};
use mrc_elf::Binary;
use mrc_emit::{EmitOptions, Emitter};
use tracing::info;

/// Pipeline options, straight off the command line.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    pub conservative: bool,
    pub trace: bool,
}

fn analyze(input: &Path) -> Result<Analysis> {
    let data = fs::read(input)?;
    let binary = Binary::parse(&data)?;
    info!(
        text_len = binary.text_len(),
        functions = binary.text_functions.len(),
        "parsed {}",
        input.display()
    );
    let mut analysis = Analysis::new(binary, AnalysisOptions::default());
    analysis.run()?;
    Ok(analysis)
}

/// Recompile `input` and write the emitted program to `out`.
pub fn recompile<W: Write>(input: &Path, options: Options, out: W) -> Result<()> {
    let analysis = analyze(input)?;
    let mut emitter = Emitter::new(
        &analysis,
        EmitOptions {
            conservative: options.conservative,
            trace: options.trace,
        },
        out,
    );
    emitter.emit()?;
    Ok(())
}

/// Print the lifted instruction listing after idiom recovery; a debugging
/// view of what the emitter will consume.
pub fn disassemble<W: Write>(input: &Path, mut out: W) -> Result<()> {
    let data = fs::read(input)?;
    let binary = Binary::parse(&data)?;
    let mut analysis = Analysis::new(binary, AnalysisOptions::default());
    analysis.disassemble();
    analysis.harvest_pointers();
    analysis.rewrite_idioms()?;

    for (i, insn) in analysis.insns.iter().enumerate() {
        let vaddr = analysis.addr_of(i);
        if analysis.label_addresses.contains(&vaddr) {
            match analysis.symbol_name(vaddr) {
                Some(name) => writeln!(out, "L{vaddr:08x}: //{name}")?,
                None => writeln!(out, "L{vaddr:08x}:")?,
            }
        }
        write!(out, "\t{}", insn.instr)?;
        if insn.patched {
            write!(out, "\t[patched, immediate now 0x{:X}]", insn.patched_addr)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
