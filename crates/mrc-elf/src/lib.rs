//! ELF parser for big-endian MIPS (O32) executables.
//!
//! The loader targets IDO-compiled PIC executables: it requires `.text`,
//! `.dynsym`, `.reginfo`, `.dynamic` and `.got`, and resolves the GOT layout
//! the recompiler's idiom rewriter depends on.

mod binary;
mod constants;

pub use binary::{Binary, Section};
pub use constants::*;

use thiserror::Error;

/// ELF parsing errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("not an ELF file")]
    NotElf,
    #[error("not big-endian MIPS")]
    NotBigEndianMips,
    #[error("missing section headers; stripped binaries are not supported")]
    Stripped,
    #[error("missing {0} section")]
    MissingSection(&'static str),
    #[error("missing .symtab or .dynsym section")]
    MissingSymbolTable,
    #[error(".symtab not supported - use a program with .dynsym instead")]
    SymtabUnsupported,
    #[error("no DT_PLTGOT entry in .dynamic")]
    MissingGotStart,
    #[error("gp adjustment 0x{0:x} does not fit a 16-bit displacement")]
    GpAdjustTooLarge(u32),
    #[error("dynamic symbol count {dynsym_no} below first GOT symbol {first_got_sym}")]
    BadDynamic { dynsym_no: u32, first_got_sym: u32 },
    #[error("file truncated at offset 0x{0:x}")]
    Truncated(usize),
}

pub type Result<T> = std::result::Result<T, ElfError>;
