//! Big-endian MIPS-I/II word decoder.
//!
//! Pseudo forms the analysis keys on are normalized here (`move`, `b`,
//! `beqz`/`bnez`, `negu`, `not`, `nop`), the way the IDO toolchain's
//! disassembly presents them. The raw word is kept on the record.

use crate::{Gpr, Instr, Op};

#[inline]
fn gpr(word: u32, shift: u32) -> Gpr {
    Gpr::from_index(((word >> shift) & 0x1f) as u8)
}

/// Decode one 4-byte word at `vram`.
pub fn decode(word: u32, vram: u32) -> Instr {
    let rs = gpr(word, 21);
    let rt = gpr(word, 16);
    let rd = gpr(word, 11);
    let sa = ((word >> 6) & 0x1f) as u8;
    let ft = ((word >> 16) & 0x1f) as u8;
    let fs = ((word >> 11) & 0x1f) as u8;
    let fd = ((word >> 6) & 0x1f) as u8;
    let imm = (word & 0xffff) as u16;

    let op = decode_op(word, rs, rt);

    Instr {
        op,
        raw: word,
        vram,
        rs,
        rt,
        rd,
        sa,
        ft,
        fs,
        fd,
        imm,
    }
}

fn decode_op(word: u32, rs: Gpr, rt: Gpr) -> Op {
    if word == 0 {
        return Op::Nop;
    }

    match word >> 26 {
        0x00 => decode_special(word, rs, rt),
        0x01 => decode_regimm(word),
        0x02 => Op::J,
        0x03 => Op::Jal,
        0x04 => {
            if rs == Gpr::Zero && rt == Gpr::Zero {
                Op::B
            } else if rt == Gpr::Zero {
                Op::Beqz
            } else {
                Op::Beq
            }
        }
        0x05 => {
            if rt == Gpr::Zero {
                Op::Bnez
            } else {
                Op::Bne
            }
        }
        0x06 => Op::Blez,
        0x07 => Op::Bgtz,
        0x08 => Op::Addi,
        0x09 => Op::Addiu,
        0x0a => Op::Slti,
        0x0b => Op::Sltiu,
        0x0c => Op::Andi,
        0x0d => Op::Ori,
        0x0e => Op::Xori,
        0x0f => Op::Lui,
        0x11 => decode_cop1(word),
        0x14 => Op::Beql,
        0x15 => Op::Bnel,
        0x16 => Op::Blezl,
        0x17 => Op::Bgtzl,
        0x20 => Op::Lb,
        0x21 => Op::Lh,
        0x22 => Op::Lwl,
        0x23 => Op::Lw,
        0x24 => Op::Lbu,
        0x25 => Op::Lhu,
        0x26 => Op::Lwr,
        0x28 => Op::Sb,
        0x29 => Op::Sh,
        0x2a => Op::Swl,
        0x2b => Op::Sw,
        0x2e => Op::Swr,
        0x31 => Op::Lwc1,
        0x35 => Op::Ldc1,
        0x39 => Op::Swc1,
        0x3d => Op::Sdc1,
        _ => Op::Unknown,
    }
}

fn decode_special(word: u32, rs: Gpr, rt: Gpr) -> Op {
    match word & 0x3f {
        0x00 => Op::Sll,
        0x02 => Op::Srl,
        0x03 => Op::Sra,
        0x04 => Op::Sllv,
        0x06 => Op::Srlv,
        0x07 => Op::Srav,
        0x08 => Op::Jr,
        0x09 => Op::Jalr,
        0x0d => Op::Break,
        0x10 => Op::Mfhi,
        0x12 => Op::Mflo,
        0x18 => Op::Mult,
        0x19 => Op::Multu,
        0x1a => Op::Div,
        0x1b => Op::Divu,
        0x20 => Op::Add,
        0x21 => {
            if rt == Gpr::Zero {
                Op::Move
            } else {
                Op::Addu
            }
        }
        0x22 => Op::Sub,
        0x23 => {
            if rs == Gpr::Zero {
                Op::Negu
            } else {
                Op::Subu
            }
        }
        0x24 => Op::And,
        0x25 => {
            if rt == Gpr::Zero {
                Op::Move
            } else {
                Op::Or
            }
        }
        0x26 => Op::Xor,
        0x27 => {
            if rt == Gpr::Zero {
                Op::Not
            } else {
                Op::Nor
            }
        }
        0x2a => Op::Slt,
        0x2b => Op::Sltu,
        0x30 => Op::Tge,
        0x31 => Op::Tgeu,
        0x32 => Op::Tlt,
        0x34 => Op::Teq,
        0x36 => Op::Tne,
        _ => Op::Unknown,
    }
}

fn decode_regimm(word: u32) -> Op {
    match (word >> 16) & 0x1f {
        0x00 => Op::Bltz,
        0x01 => Op::Bgez,
        0x02 => Op::Bltzl,
        0x03 => Op::Bgezl,
        0x11 => Op::Bgezal,
        _ => Op::Unknown,
    }
}

fn decode_cop1(word: u32) -> Op {
    match (word >> 21) & 0x1f {
        0x00 => Op::Mfc1,
        0x02 => Op::Cfc1,
        0x04 => Op::Mtc1,
        0x06 => Op::Ctc1,
        0x08 => match (word >> 16) & 0x3 {
            0x0 => Op::Bc1f,
            0x1 => Op::Bc1t,
            0x2 => Op::Bc1fl,
            _ => Op::Bc1tl,
        },
        0x10 => decode_fmt_s(word),
        0x11 => decode_fmt_d(word),
        0x14 => match word & 0x3f {
            0x20 => Op::CvtSW,
            0x21 => Op::CvtDW,
            _ => Op::Unknown,
        },
        0x15 => match word & 0x3f {
            0x20 => Op::CvtSL,
            0x21 => Op::CvtDL,
            _ => Op::Unknown,
        },
        _ => Op::Unknown,
    }
}

fn decode_fmt_s(word: u32) -> Op {
    match word & 0x3f {
        0x00 => Op::AddS,
        0x01 => Op::SubS,
        0x02 => Op::MulS,
        0x03 => Op::DivS,
        0x04 => Op::SqrtS,
        0x06 => Op::MovS,
        0x07 => Op::NegS,
        0x09 => Op::TruncLS,
        0x0d => Op::TruncWS,
        0x21 => Op::CvtDS,
        0x24 => Op::CvtWS,
        0x25 => Op::CvtLS,
        0x32 => Op::CEqS,
        0x3c => Op::CLtS,
        0x3e => Op::CLeS,
        _ => Op::Unknown,
    }
}

fn decode_fmt_d(word: u32) -> Op {
    match word & 0x3f {
        0x00 => Op::AddD,
        0x01 => Op::SubD,
        0x02 => Op::MulD,
        0x03 => Op::DivD,
        0x06 => Op::MovD,
        0x07 => Op::NegD,
        0x09 => Op::TruncLD,
        0x0d => Op::TruncWD,
        0x20 => Op::CvtSD,
        0x24 => Op::CvtWD,
        0x25 => Op::CvtLD,
        0x32 => Op::CEqD,
        0x3c => Op::CLtD,
        0x3e => Op::CLeD,
        _ => Op::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lui() {
        // lui $t0, 0x40
        let i = decode(0x3c08_0040, 0x0040_0000);
        assert_eq!(i.op, Op::Lui);
        assert_eq!(i.rt, Gpr::T0);
        assert_eq!(i.uimm(), 0x40);
    }

    #[test]
    fn test_decode_addiu() {
        // addiu $t0, $t0, 0x1234
        let i = decode(0x2508_1234, 0x0040_0004);
        assert_eq!(i.op, Op::Addiu);
        assert_eq!(i.rs, Gpr::T0);
        assert_eq!(i.rt, Gpr::T0);
        assert_eq!(i.simm(), 0x1234);
    }

    #[test]
    fn test_decode_jr_jalr() {
        // jr $ra
        let i = decode(0x03e0_0008, 0);
        assert_eq!(i.op, Op::Jr);
        assert_eq!(i.rs, Gpr::Ra);

        // jalr $t9 (rd = $ra implicit)
        let i = decode(0x0320_f809, 0);
        assert_eq!(i.op, Op::Jalr);
        assert_eq!(i.rs, Gpr::T9);
        assert_eq!(i.rd, Gpr::Ra);
    }

    #[test]
    fn test_decode_pseudo_move() {
        // addu $a1, $s0, $zero
        let i = decode(0x0200_2821, 0);
        assert_eq!(i.op, Op::Move);
        assert_eq!(i.rd, Gpr::A1);
        assert_eq!(i.rs, Gpr::S0);

        // or $v0, $a0, $zero
        let i = decode(0x0080_1025, 0);
        assert_eq!(i.op, Op::Move);
        assert_eq!(i.rd, Gpr::V0);
        assert_eq!(i.rs, Gpr::A0);
    }

    #[test]
    fn test_decode_pseudo_negu_not() {
        // subu $v0, $zero, $a0
        let i = decode(0x0004_1023, 0);
        assert_eq!(i.op, Op::Negu);
        assert_eq!(i.rt, Gpr::A0);

        // nor $v0, $a0, $zero
        let i = decode(0x0080_1027, 0);
        assert_eq!(i.op, Op::Not);
        assert_eq!(i.rs, Gpr::A0);
    }

    #[test]
    fn test_decode_nop() {
        assert_eq!(decode(0, 0).op, Op::Nop);
        // sll $zero, $zero, 1 is not a nop
        assert_eq!(decode(0x0000_0040, 0).op, Op::Sll);
    }

    #[test]
    fn test_decode_sltiu() {
        // sltiu $at, $v0, 5
        let i = decode(0x2c41_0005, 0);
        assert_eq!(i.op, Op::Sltiu);
        assert_eq!(i.rs, Gpr::V0);
        assert_eq!(i.rt, Gpr::At);
        assert_eq!(i.uimm(), 5);
    }

    #[test]
    fn test_decode_bgezal() {
        // bgezal $zero, +4
        let i = decode(0x0411_0001, 0x0040_0000);
        assert_eq!(i.op, Op::Bgezal);
        assert_eq!(i.rs, Gpr::Zero);
        assert_eq!(i.branch_target(), 0x0040_0008);
    }

    #[test]
    fn test_decode_cop1() {
        // mtc1 $a0, $f12
        let i = decode(0x4484_6000, 0);
        assert_eq!(i.op, Op::Mtc1);
        assert_eq!(i.rt, Gpr::A0);
        assert_eq!(i.fs, 12);

        // add.s $f0, $f2, $f4
        let i = decode(0x4604_1000, 0);
        assert_eq!(i.op, Op::AddS);
        assert_eq!(i.fd, 0);
        assert_eq!(i.fs, 2);
        assert_eq!(i.ft, 4);

        // cvt.d.w $f4, $f0
        let i = decode(0x4680_0121, 0);
        assert_eq!(i.op, Op::CvtDW);
        assert_eq!(i.fd, 4);
        assert_eq!(i.fs, 0);
    }

    #[test]
    fn test_decode_memops() {
        // lw $t9, 8($gp)
        let i = decode(0x8f99_0008, 0);
        assert_eq!(i.op, Op::Lw);
        assert_eq!(i.rs, Gpr::Gp);
        assert_eq!(i.rt, Gpr::T9);
        assert_eq!(i.simm(), 8);

        // swc1 $f0, -4($sp)
        let i = decode(0xe7a0_fffc, 0);
        assert_eq!(i.op, Op::Swc1);
        assert_eq!(i.rs, Gpr::Sp);
        assert_eq!(i.ft, 0);
        assert_eq!(i.simm(), -4);
    }
}
