//! C code emission from the finished analysis.
//!
//! The emitted translation unit targets the runtime contract of
//! `header.h`: a flat `mem` byte array with `MEM_*` accessors,
//! `wrapper_<name>` shims for every extern, a `trampoline` dispatcher for
//! indirect calls, and the float-register helpers.

mod bootstrap;
mod emitter;
mod regs;

pub use emitter::{EmitOptions, Emitter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("missing symbol `{0}` required by the bootstrap")]
    MissingSymbol(&'static str),
    #[error("call to undiscovered function 0x{addr:08x}")]
    UnknownFunction { addr: u32 },
}

pub type Result<T> = std::result::Result<T, EmitError>;
