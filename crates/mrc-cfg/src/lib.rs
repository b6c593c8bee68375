//! The analysis core of the recompiler.
//!
//! Lifts the raw instruction stream into an annotated program: address
//! materialization idioms recovered, jump tables bounded, functions
//! discovered, a delay-slot-aware control-flow graph built, and forward and
//! backward liveness solved so that function signatures can be inferred.
//!
//! Pass order is fixed: [`Analysis::disassemble`],
//! [`Analysis::harvest_pointers`], [`Analysis::rewrite_idioms`],
//! [`Analysis::finalize_functions`], [`Analysis::build_graph`],
//! [`Analysis::forward_liveness`], [`Analysis::backward_liveness`],
//! [`Analysis::infer_signatures`]. [`Analysis::run`] does all of it.

mod analysis;
pub mod externs;
mod functions;
mod graph;
mod insn;
mod liveness;
mod options;
mod pointers;
mod rewrite;
mod signature;
mod stream;

#[cfg(test)]
mod tests;

pub use analysis::{Analysis, Function};
pub use insn::{Edge, Insn};
pub use options::AnalysisOptions;

use thiserror::Error;

/// Hard analysis failures: either the input is outside the supported IDO
/// shape, or an idiom that must be recognized was not.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("jump table at 0x{addr:08x} falls outside .rodata")]
    JumpTableOutOfRodata { addr: u32 },
    #[error("unsupported instruction pairs with an address load at 0x{vram:08x}")]
    UnsupportedHiLoPartner { vram: u32 },
    #[error("global GOT access at 0x{vram:08x} is not a word load")]
    GlobalGotMemopNotLw { vram: u32 },
    #[error("no ret: 0x{addr:x}")]
    MissingReturn { addr: u32 },
    #[error("return at 0x{addr:08x} belongs to no discovered function")]
    OrphanReturn { addr: u32 },
    #[error("expected {expected} while rewriting the stub at 0x{addr:08x}")]
    WrapperShape {
        addr: u32,
        expected: &'static str,
    },
    #[error("control transfer at 0x{vram:08x} targets 0x{target:08x}, outside .text")]
    TargetOutOfText { vram: u32, target: u32 },
    #[error("call at 0x{vram:08x} targets 0x{target:08x}, which is no discovered function")]
    UnknownCallee { vram: u32, target: u32 },
    #[error("jump to address in register at 0x{vram:08x} is not supported")]
    UnsupportedRegisterJump { vram: u32 },
    #[error("missing extern function: {name}")]
    UnknownExtern { name: String },
    #[error("indirect call at 0x{vram:08x} resolves to no named symbol")]
    UnnamedExternTarget { vram: u32 },
    #[error("no `main` symbol to seed the dataflow from")]
    MissingMain,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
