//! Instruction re-encoding.
//!
//! Real opcodes are reassembled from the decoded fields; pseudo-normalized
//! forms (whose underlying encoding is ambiguous) and unknown words fall back
//! to the preserved raw word. Patched records are excluded from the
//! round-trip property by the callers.

use crate::{Instr, Op};

#[inline]
fn r_type(rs: u8, rt: u8, rd: u8, sa: u8, funct: u32) -> u32 {
    ((rs as u32) << 21) | ((rt as u32) << 16) | ((rd as u32) << 11) | ((sa as u32) << 6) | funct
}

#[inline]
fn i_type(op: u32, rs: u8, rt: u8, imm: u16) -> u32 {
    (op << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | imm as u32
}

#[inline]
fn regimm(rs: u8, sel: u32, imm: u16) -> u32 {
    (0x01 << 26) | ((rs as u32) << 21) | (sel << 16) | imm as u32
}

#[inline]
fn cop1_fmt(fmt: u32, ft: u8, fs: u8, fd: u8, funct: u32) -> u32 {
    (0x11 << 26) | (fmt << 21) | ((ft as u32) << 16) | ((fs as u32) << 11) | ((fd as u32) << 6)
        | funct
}

const FMT_S: u32 = 0x10;
const FMT_D: u32 = 0x11;
const FMT_W: u32 = 0x14;
const FMT_L: u32 = 0x15;

impl Instr {
    /// Re-encode the instruction as a big-endian word.
    pub fn encode(&self) -> u32 {
        let rs = self.rs.index();
        let rt = self.rt.index();
        let rd = self.rd.index();

        match self.op {
            Op::Sll => r_type(0, rt, rd, self.sa, 0x00),
            Op::Srl => r_type(0, rt, rd, self.sa, 0x02),
            Op::Sra => r_type(0, rt, rd, self.sa, 0x03),
            Op::Sllv => r_type(rs, rt, rd, 0, 0x04),
            Op::Srlv => r_type(rs, rt, rd, 0, 0x06),
            Op::Srav => r_type(rs, rt, rd, 0, 0x07),
            Op::Jr => r_type(rs, 0, 0, 0, 0x08),
            Op::Jalr => r_type(rs, 0, rd, 0, 0x09),
            Op::Break => (self.raw & 0x03ff_ffc0) | 0x0d,
            Op::Mfhi => r_type(0, 0, rd, 0, 0x10),
            Op::Mflo => r_type(0, 0, rd, 0, 0x12),
            Op::Mult => r_type(rs, rt, 0, 0, 0x18),
            Op::Multu => r_type(rs, rt, 0, 0, 0x19),
            Op::Div => r_type(rs, rt, 0, 0, 0x1a),
            Op::Divu => r_type(rs, rt, 0, 0, 0x1b),
            Op::Add => r_type(rs, rt, rd, 0, 0x20),
            Op::Addu => r_type(rs, rt, rd, 0, 0x21),
            Op::Sub => r_type(rs, rt, rd, 0, 0x22),
            Op::Subu => r_type(rs, rt, rd, 0, 0x23),
            Op::And => r_type(rs, rt, rd, 0, 0x24),
            Op::Or => r_type(rs, rt, rd, 0, 0x25),
            Op::Xor => r_type(rs, rt, rd, 0, 0x26),
            Op::Nor => r_type(rs, rt, rd, 0, 0x27),
            Op::Slt => r_type(rs, rt, rd, 0, 0x2a),
            Op::Sltu => r_type(rs, rt, rd, 0, 0x2b),
            Op::Tge => r_type(rs, rt, rd, self.sa, 0x30),
            Op::Tgeu => r_type(rs, rt, rd, self.sa, 0x31),
            Op::Tlt => r_type(rs, rt, rd, self.sa, 0x32),
            Op::Teq => r_type(rs, rt, rd, self.sa, 0x34),
            Op::Tne => r_type(rs, rt, rd, self.sa, 0x36),

            Op::Bltz => regimm(rs, 0x00, self.imm),
            Op::Bgez => regimm(rs, 0x01, self.imm),
            Op::Bltzl => regimm(rs, 0x02, self.imm),
            Op::Bgezl => regimm(rs, 0x03, self.imm),
            Op::Bgezal => regimm(rs, 0x11, self.imm),

            Op::J => (0x02 << 26) | (self.raw & 0x03ff_ffff),
            Op::Jal => (0x03 << 26) | (self.raw & 0x03ff_ffff),

            Op::Beq => i_type(0x04, rs, rt, self.imm),
            Op::Bne => i_type(0x05, rs, rt, self.imm),
            Op::Blez => i_type(0x06, rs, 0, self.imm),
            Op::Bgtz => i_type(0x07, rs, 0, self.imm),
            Op::Addi => i_type(0x08, rs, rt, self.imm),
            Op::Addiu => i_type(0x09, rs, rt, self.imm),
            Op::Slti => i_type(0x0a, rs, rt, self.imm),
            Op::Sltiu => i_type(0x0b, rs, rt, self.imm),
            Op::Andi => i_type(0x0c, rs, rt, self.imm),
            Op::Ori => i_type(0x0d, rs, rt, self.imm),
            Op::Xori => i_type(0x0e, rs, rt, self.imm),
            Op::Lui => i_type(0x0f, 0, rt, self.imm),
            Op::Beql => i_type(0x14, rs, rt, self.imm),
            Op::Bnel => i_type(0x15, rs, rt, self.imm),
            Op::Blezl => i_type(0x16, rs, 0, self.imm),
            Op::Bgtzl => i_type(0x17, rs, 0, self.imm),
            Op::Lb => i_type(0x20, rs, rt, self.imm),
            Op::Lh => i_type(0x21, rs, rt, self.imm),
            Op::Lwl => i_type(0x22, rs, rt, self.imm),
            Op::Lw => i_type(0x23, rs, rt, self.imm),
            Op::Lbu => i_type(0x24, rs, rt, self.imm),
            Op::Lhu => i_type(0x25, rs, rt, self.imm),
            Op::Lwr => i_type(0x26, rs, rt, self.imm),
            Op::Sb => i_type(0x28, rs, rt, self.imm),
            Op::Sh => i_type(0x29, rs, rt, self.imm),
            Op::Swl => i_type(0x2a, rs, rt, self.imm),
            Op::Sw => i_type(0x2b, rs, rt, self.imm),
            Op::Swr => i_type(0x2e, rs, rt, self.imm),
            Op::Lwc1 => i_type(0x31, rs, self.ft, self.imm),
            Op::Ldc1 => i_type(0x35, rs, self.ft, self.imm),
            Op::Swc1 => i_type(0x39, rs, self.ft, self.imm),
            Op::Sdc1 => i_type(0x3d, rs, self.ft, self.imm),

            Op::Mfc1 => cop1_fmt(0x00, rt, self.fs, 0, 0),
            Op::Cfc1 => cop1_fmt(0x02, rt, self.fs, 0, 0),
            Op::Mtc1 => cop1_fmt(0x04, rt, self.fs, 0, 0),
            Op::Ctc1 => cop1_fmt(0x06, rt, self.fs, 0, 0),
            Op::Bc1f => i_type(0x11, 0x08, 0x00, self.imm),
            Op::Bc1t => i_type(0x11, 0x08, 0x01, self.imm),
            Op::Bc1fl => i_type(0x11, 0x08, 0x02, self.imm),
            Op::Bc1tl => i_type(0x11, 0x08, 0x03, self.imm),

            Op::AddS => cop1_fmt(FMT_S, self.ft, self.fs, self.fd, 0x00),
            Op::SubS => cop1_fmt(FMT_S, self.ft, self.fs, self.fd, 0x01),
            Op::MulS => cop1_fmt(FMT_S, self.ft, self.fs, self.fd, 0x02),
            Op::DivS => cop1_fmt(FMT_S, self.ft, self.fs, self.fd, 0x03),
            Op::SqrtS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x04),
            Op::MovS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x06),
            Op::NegS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x07),
            Op::TruncLS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x09),
            Op::TruncWS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x0d),
            Op::CvtDS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x21),
            Op::CvtWS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x24),
            Op::CvtLS => cop1_fmt(FMT_S, 0, self.fs, self.fd, 0x25),
            Op::CEqS => cop1_fmt(FMT_S, self.ft, self.fs, 0, 0x32),
            Op::CLtS => cop1_fmt(FMT_S, self.ft, self.fs, 0, 0x3c),
            Op::CLeS => cop1_fmt(FMT_S, self.ft, self.fs, 0, 0x3e),
            Op::AddD => cop1_fmt(FMT_D, self.ft, self.fs, self.fd, 0x00),
            Op::SubD => cop1_fmt(FMT_D, self.ft, self.fs, self.fd, 0x01),
            Op::MulD => cop1_fmt(FMT_D, self.ft, self.fs, self.fd, 0x02),
            Op::DivD => cop1_fmt(FMT_D, self.ft, self.fs, self.fd, 0x03),
            Op::MovD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x06),
            Op::NegD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x07),
            Op::TruncLD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x09),
            Op::TruncWD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x0d),
            Op::CvtSD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x20),
            Op::CvtWD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x24),
            Op::CvtLD => cop1_fmt(FMT_D, 0, self.fs, self.fd, 0x25),
            Op::CEqD => cop1_fmt(FMT_D, self.ft, self.fs, 0, 0x32),
            Op::CLtD => cop1_fmt(FMT_D, self.ft, self.fs, 0, 0x3c),
            Op::CLeD => cop1_fmt(FMT_D, self.ft, self.fs, 0, 0x3e),
            Op::CvtSW => cop1_fmt(FMT_W, 0, self.fs, self.fd, 0x20),
            Op::CvtDW => cop1_fmt(FMT_W, 0, self.fs, self.fd, 0x21),
            Op::CvtSL => cop1_fmt(FMT_L, 0, self.fs, self.fd, 0x20),
            Op::CvtDL => cop1_fmt(FMT_L, 0, self.fs, self.fd, 0x21),

            // Underlying encoding is ambiguous or unknown; the raw word is
            // authoritative.
            Op::Nop
            | Op::Move
            | Op::Negu
            | Op::Not
            | Op::B
            | Op::Beqz
            | Op::Bnez
            | Op::Li
            | Op::Unknown => self.raw,
        }
    }
}
