//! Opcode identities and the shared liveness classification table.

/// Decoded mnemonic, including the pseudo forms the analysis matches on and
/// the synthetic `Li` produced when an idiom rewrite materializes a full
/// 32-bit immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    // Integer arithmetic and logic
    Add,
    Addu,
    Addi,
    Addiu,
    Sub,
    Subu,
    And,
    Andi,
    Or,
    Ori,
    Xor,
    Xori,
    Nor,
    Slt,
    Sltu,
    Slti,
    Sltiu,
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Lui,
    Mult,
    Multu,
    Div,
    Divu,
    Mfhi,
    Mflo,
    // Pseudo forms
    Nop,
    Move,
    Negu,
    Not,
    B,
    Beqz,
    Bnez,
    /// Synthetic full-immediate load installed by the idiom rewriter.
    Li,
    // Branches
    Beq,
    Bne,
    Blez,
    Bgtz,
    Bltz,
    Bgez,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,
    Bltzl,
    Bgezl,
    Bgezal,
    // Jumps
    J,
    Jal,
    Jr,
    Jalr,
    // Memory
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwl,
    Lwr,
    Sb,
    Sh,
    Sw,
    Swl,
    Swr,
    // Coprocessor 1 transfers and memory
    Lwc1,
    Ldc1,
    Swc1,
    Sdc1,
    Mfc1,
    Mtc1,
    Cfc1,
    Ctc1,
    // FP branches
    Bc1f,
    Bc1t,
    Bc1fl,
    Bc1tl,
    // FP arithmetic
    AddS,
    AddD,
    SubS,
    SubD,
    MulS,
    MulD,
    DivS,
    DivD,
    SqrtS,
    MovS,
    MovD,
    NegS,
    NegD,
    CvtSW,
    CvtDW,
    CvtDS,
    CvtSD,
    CvtWS,
    CvtWD,
    CvtLS,
    CvtLD,
    CvtSL,
    CvtDL,
    TruncWS,
    TruncWD,
    TruncLS,
    TruncLD,
    CLtS,
    CLeS,
    CEqS,
    CLtD,
    CLeD,
    CEqD,
    // Traps
    Teq,
    Tne,
    Tge,
    Tgeu,
    Tlt,
    Break,
    Unknown,
}

/// How an instruction participates in the register dataflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LivenessClass {
    /// No tracked register effect.
    Nop,
    /// One source, no definition.
    OneSrc,
    /// One source carried in the operand-1 slot (FP load/store base).
    OneSrcPos1,
    /// Two sources, no definition.
    TwoSrc,
    /// Pure definition.
    OneDst,
    /// Definition conditioned on one live source.
    DstSrc,
    /// Definition conditioned on two live sources.
    DstTwoSrc,
    /// Multiply/divide: defines HI and LO from two sources.
    DivMult,
}

impl Op {
    /// Dataflow class, shared by the forward/backward liveness passes and the
    /// emitter's dead-instruction annotations.
    pub fn liveness_class(self) -> LivenessClass {
        use LivenessClass::*;
        match self {
            Op::Add | Op::Addu | Op::Addi | Op::Addiu | Op::Andi | Op::Ori | Op::Xori => DstSrc,
            Op::Lb | Op::Lbu | Op::Lh | Op::Lhu | Op::Lw | Op::Lwl => DstSrc,
            Op::Move | Op::Negu | Op::Not => DstSrc,
            Op::Sll | Op::Srl | Op::Sra | Op::Slti | Op::Sltiu => DstSrc,
            Op::Mfhi | Op::Mflo => DstSrc,
            Op::And | Op::Or | Op::Nor | Op::Xor => DstTwoSrc,
            Op::Slt | Op::Sltu | Op::Subu => DstTwoSrc,
            Op::Sllv | Op::Srlv | Op::Srav => DstTwoSrc,
            Op::Cfc1 | Op::Mfc1 | Op::Lui | Op::Li => OneDst,
            Op::Ctc1 | Op::Mtc1 => OneSrc,
            Op::Bgez | Op::Bgezl | Op::Bgtz | Op::Bgtzl => OneSrc,
            Op::Blez | Op::Blezl | Op::Bltz | Op::Bltzl => OneSrc,
            Op::Beqz | Op::Bnez => OneSrc,
            Op::Jr | Op::Jalr => OneSrc,
            Op::Beq | Op::Beql | Op::Bne | Op::Bnel => TwoSrc,
            Op::Sb | Op::Sh | Op::Sw | Op::Swl => TwoSrc,
            Op::Teq | Op::Tne | Op::Tge | Op::Tgeu | Op::Tlt => TwoSrc,
            Op::Div | Op::Divu | Op::Mult | Op::Multu => DivMult,
            Op::Lwc1 | Op::Ldc1 | Op::Swc1 | Op::Sdc1 => OneSrcPos1,
            _ => Nop,
        }
    }

    /// The instruction writes its `rt` field.
    pub fn modifies_rt(self) -> bool {
        matches!(
            self,
            Op::Addi
                | Op::Addiu
                | Op::Andi
                | Op::Ori
                | Op::Xori
                | Op::Slti
                | Op::Sltiu
                | Op::Lui
                | Op::Li
                | Op::Lb
                | Op::Lbu
                | Op::Lh
                | Op::Lhu
                | Op::Lw
                | Op::Lwl
                | Op::Lwr
                | Op::Mfc1
                | Op::Cfc1
        )
    }

    /// The instruction writes its `rd` field.
    pub fn modifies_rd(self) -> bool {
        matches!(
            self,
            Op::Add
                | Op::Addu
                | Op::Sub
                | Op::Subu
                | Op::And
                | Op::Or
                | Op::Xor
                | Op::Nor
                | Op::Slt
                | Op::Sltu
                | Op::Sll
                | Op::Srl
                | Op::Sra
                | Op::Sllv
                | Op::Srlv
                | Op::Srav
                | Op::Mfhi
                | Op::Mflo
                | Op::Move
                | Op::Negu
                | Op::Not
                | Op::Jalr
        )
    }

    /// Conditional branch with an always-executed delay slot.
    pub fn is_cond_branch(self) -> bool {
        matches!(
            self,
            Op::Beq
                | Op::Bne
                | Op::Beqz
                | Op::Bnez
                | Op::Bgez
                | Op::Bgtz
                | Op::Blez
                | Op::Bltz
                | Op::Bc1f
                | Op::Bc1t
        )
    }

    /// Branch-likely: the delay slot executes only on the taken path.
    pub fn is_branch_likely(self) -> bool {
        matches!(
            self,
            Op::Beql
                | Op::Bnel
                | Op::Bgezl
                | Op::Bgtzl
                | Op::Blezl
                | Op::Bltzl
                | Op::Bc1fl
                | Op::Bc1tl
        )
    }

    /// Any branch (conditional, likely or the unconditional `b`).
    pub fn is_branch(self) -> bool {
        self.is_cond_branch() || self.is_branch_likely() || self == Op::B || self == Op::Bgezal
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Addu => "addu",
            Op::Addi => "addi",
            Op::Addiu => "addiu",
            Op::Sub => "sub",
            Op::Subu => "subu",
            Op::And => "and",
            Op::Andi => "andi",
            Op::Or => "or",
            Op::Ori => "ori",
            Op::Xor => "xor",
            Op::Xori => "xori",
            Op::Nor => "nor",
            Op::Slt => "slt",
            Op::Sltu => "sltu",
            Op::Slti => "slti",
            Op::Sltiu => "sltiu",
            Op::Sll => "sll",
            Op::Srl => "srl",
            Op::Sra => "sra",
            Op::Sllv => "sllv",
            Op::Srlv => "srlv",
            Op::Srav => "srav",
            Op::Lui => "lui",
            Op::Mult => "mult",
            Op::Multu => "multu",
            Op::Div => "div",
            Op::Divu => "divu",
            Op::Mfhi => "mfhi",
            Op::Mflo => "mflo",
            Op::Nop => "nop",
            Op::Move => "move",
            Op::Negu => "negu",
            Op::Not => "not",
            Op::B => "b",
            Op::Beqz => "beqz",
            Op::Bnez => "bnez",
            Op::Li => "li",
            Op::Beq => "beq",
            Op::Bne => "bne",
            Op::Blez => "blez",
            Op::Bgtz => "bgtz",
            Op::Bltz => "bltz",
            Op::Bgez => "bgez",
            Op::Beql => "beql",
            Op::Bnel => "bnel",
            Op::Blezl => "blezl",
            Op::Bgtzl => "bgtzl",
            Op::Bltzl => "bltzl",
            Op::Bgezl => "bgezl",
            Op::Bgezal => "bgezal",
            Op::J => "j",
            Op::Jal => "jal",
            Op::Jr => "jr",
            Op::Jalr => "jalr",
            Op::Lb => "lb",
            Op::Lbu => "lbu",
            Op::Lh => "lh",
            Op::Lhu => "lhu",
            Op::Lw => "lw",
            Op::Lwl => "lwl",
            Op::Lwr => "lwr",
            Op::Sb => "sb",
            Op::Sh => "sh",
            Op::Sw => "sw",
            Op::Swl => "swl",
            Op::Swr => "swr",
            Op::Lwc1 => "lwc1",
            Op::Ldc1 => "ldc1",
            Op::Swc1 => "swc1",
            Op::Sdc1 => "sdc1",
            Op::Mfc1 => "mfc1",
            Op::Mtc1 => "mtc1",
            Op::Cfc1 => "cfc1",
            Op::Ctc1 => "ctc1",
            Op::Bc1f => "bc1f",
            Op::Bc1t => "bc1t",
            Op::Bc1fl => "bc1fl",
            Op::Bc1tl => "bc1tl",
            Op::AddS => "add.s",
            Op::AddD => "add.d",
            Op::SubS => "sub.s",
            Op::SubD => "sub.d",
            Op::MulS => "mul.s",
            Op::MulD => "mul.d",
            Op::DivS => "div.s",
            Op::DivD => "div.d",
            Op::SqrtS => "sqrt.s",
            Op::MovS => "mov.s",
            Op::MovD => "mov.d",
            Op::NegS => "neg.s",
            Op::NegD => "neg.d",
            Op::CvtSW => "cvt.s.w",
            Op::CvtDW => "cvt.d.w",
            Op::CvtDS => "cvt.d.s",
            Op::CvtSD => "cvt.s.d",
            Op::CvtWS => "cvt.w.s",
            Op::CvtWD => "cvt.w.d",
            Op::CvtLS => "cvt.l.s",
            Op::CvtLD => "cvt.l.d",
            Op::CvtSL => "cvt.s.l",
            Op::CvtDL => "cvt.d.l",
            Op::TruncWS => "trunc.w.s",
            Op::TruncWD => "trunc.w.d",
            Op::TruncLS => "trunc.l.s",
            Op::TruncLD => "trunc.l.d",
            Op::CLtS => "c.lt.s",
            Op::CLeS => "c.le.s",
            Op::CEqS => "c.eq.s",
            Op::CLtD => "c.lt.d",
            Op::CLeD => "c.le.d",
            Op::CEqD => "c.eq.d",
            Op::Teq => "teq",
            Op::Tne => "tne",
            Op::Tge => "tge",
            Op::Tgeu => "tgeu",
            Op::Tlt => "tlt",
            Op::Break => "break",
            Op::Unknown => "???",
        }
    }
}
