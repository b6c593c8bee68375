//! Assembly-style rendering of decoded instructions, used by the
//! `--disasm` listing.

use std::fmt;

use crate::{Instr, LivenessClass, Op};

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.op.mnemonic();
        match self.op {
            Op::Nop => write!(f, "nop"),
            Op::Li => write!(f, "li ${}, 0x0", self.rt),
            Op::Lui => write!(f, "lui ${}, 0x{:x}", self.rt, self.uimm()),
            Op::Move | Op::Not => write!(f, "{} ${}, ${}", m, self.rd, self.rs),
            Op::Negu => write!(f, "{} ${}, ${}", m, self.rd, self.rt),
            Op::Mfhi | Op::Mflo => write!(f, "{} ${}", m, self.rd),
            Op::Sll | Op::Srl | Op::Sra => {
                write!(f, "{} ${}, ${}, {}", m, self.rd, self.rt, self.sa)
            }
            Op::Sllv | Op::Srlv | Op::Srav => {
                write!(f, "{} ${}, ${}, ${}", m, self.rd, self.rt, self.rs)
            }
            Op::Add
            | Op::Addu
            | Op::Sub
            | Op::Subu
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Nor
            | Op::Slt
            | Op::Sltu => write!(f, "{} ${}, ${}, ${}", m, self.rd, self.rs, self.rt),
            Op::Mult | Op::Multu | Op::Div | Op::Divu => {
                write!(f, "{} ${}, ${}", m, self.rs, self.rt)
            }
            Op::Addi | Op::Addiu | Op::Slti => {
                write!(f, "{} ${}, ${}, {}", m, self.rt, self.rs, self.simm())
            }
            Op::Sltiu | Op::Andi | Op::Ori | Op::Xori => {
                write!(f, "{} ${}, ${}, 0x{:x}", m, self.rt, self.rs, self.uimm())
            }
            Op::Lb | Op::Lbu | Op::Lh | Op::Lhu | Op::Lw | Op::Lwl | Op::Lwr | Op::Sb | Op::Sh
            | Op::Sw | Op::Swl | Op::Swr => {
                write!(f, "{} ${}, {}(${})", m, self.rt, self.simm(), self.rs)
            }
            Op::Lwc1 | Op::Ldc1 | Op::Swc1 | Op::Sdc1 => {
                write!(f, "{} $f{}, {}(${})", m, self.ft, self.simm(), self.rs)
            }
            Op::B => write!(f, "b 0x{:x}", self.branch_target()),
            Op::Beqz | Op::Bnez | Op::Blez | Op::Bgtz | Op::Bltz | Op::Bgez | Op::Blezl
            | Op::Bgtzl | Op::Bltzl | Op::Bgezl | Op::Bgezal => {
                write!(f, "{} ${}, 0x{:x}", m, self.rs, self.branch_target())
            }
            Op::Beq | Op::Bne | Op::Beql | Op::Bnel => write!(
                f,
                "{} ${}, ${}, 0x{:x}",
                m,
                self.rs,
                self.rt,
                self.branch_target()
            ),
            Op::Bc1f | Op::Bc1t | Op::Bc1fl | Op::Bc1tl => {
                write!(f, "{} 0x{:x}", m, self.branch_target())
            }
            Op::J | Op::Jal => write!(f, "{} 0x{:x}", m, self.jump_target()),
            Op::Jr => write!(f, "jr ${}", self.rs),
            Op::Jalr => write!(f, "jalr ${}", self.rs),
            Op::Mfc1 | Op::Cfc1 => write!(f, "{} ${}, $f{}", m, self.rt, self.fs),
            Op::Mtc1 | Op::Ctc1 => write!(f, "{} ${}, $f{}", m, self.rt, self.fs),
            Op::Teq | Op::Tne | Op::Tge | Op::Tgeu | Op::Tlt => {
                write!(f, "{} ${}, ${}", m, self.rs, self.rt)
            }
            Op::Break => write!(f, "break"),
            Op::Unknown => write!(f, "??? 0x{:08x}", self.raw),
            // FP arithmetic
            _ => match self.op.liveness_class() {
                LivenessClass::Nop => {
                    write!(f, "{} $f{}, $f{}, $f{}", m, self.fd, self.fs, self.ft)
                }
                _ => write!(f, "{} 0x{:08x}", m, self.raw),
            },
        }
    }
}
