//! MIPS-I/II instruction set support for the mrc recompiler.
//!
//! One decoded [`Instr`] per 4-byte big-endian word, the O32 register model,
//! and the per-opcode operand/liveness classification shared by the dataflow
//! passes and the C emitter.

mod decode;
mod display;
mod encode;
mod instr;
mod opcode;
mod registers;

pub use decode::decode;
pub use instr::Instr;
pub use opcode::{LivenessClass, Op};
pub use registers::{Gpr, RegMask};
