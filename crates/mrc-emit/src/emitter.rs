//! Statement emission: one C statement stream per discovered function.

use std::collections::BTreeSet;
use std::io::Write;

use mrc_cfg::externs::{find_extern, ArgLoc, ExternFunction, O32ArgAllocator};
use mrc_cfg::{Analysis, Function};
use mrc_isa::{Gpr, LivenessClass, Op, RegMask};
use tracing::debug;

use crate::regs::{dr, fr, r, wr, FP_ARG_BASE, FP_RET};
use crate::{EmitError, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct EmitOptions {
    /// Keep dead instructions and host `s0..s7`/`fp` in file scope.
    pub conservative: bool,
    /// Instrument the output with per-pc prints and a retire counter.
    pub trace: bool,
}

pub struct Emitter<'a, W: Write> {
    pub(crate) analysis: &'a Analysis,
    pub(crate) options: EmitOptions,
    /// Label set extended with the call/likely-branch resume slots the
    /// statement stream jumps to.
    pub(crate) labels: BTreeSet<u32>,
    pub(crate) out: W,
}

impl<'a, W: Write> Emitter<'a, W> {
    pub fn new(analysis: &'a Analysis, options: EmitOptions, out: W) -> Self {
        Emitter {
            analysis,
            options,
            labels: BTreeSet::new(),
            out,
        }
    }

    /// Emit the whole translation unit.
    pub fn emit(&mut self) -> Result<()> {
        self.collect_emit_labels();
        self.emit_prelude()?;
        self.emit_prototypes()?;
        self.emit_trampoline()?;
        self.emit_run()?;
        self.emit_functions()?;
        debug!(functions = self.analysis.functions.len(), "emission done");
        Ok(())
    }

    /// Resume-slot labels: every call and likely branch jumps to `i + 2`.
    fn collect_emit_labels(&mut self) {
        self.labels = self.analysis.label_addresses.clone();
        for (i, insn) in self.analysis.insns.iter().enumerate() {
            let op = insn.op();
            if op == Op::Jal || op == Op::Jalr || op.is_branch_likely() {
                self.labels.insert(self.analysis.addr_of(i) + 8);
            }
        }
    }

    pub(crate) fn function_c_name(&self, addr: u32) -> String {
        match self.analysis.symbol_name(addr) {
            Some(name) => format!("f_{name}"),
            None => format!("func_{addr:x}"),
        }
    }

    pub(crate) fn emit_function_signature(&mut self, f: &Function, vaddr: u32) -> Result<()> {
        let ret = match f.nret {
            0 => "void",
            1 => "uint32_t",
            _ => "uint64_t",
        };
        write!(self.out, "static {} {}(uint8_t *mem, uint32_t sp", ret, self.function_c_name(vaddr))?;
        if f.v0_in {
            write!(self.out, ", uint32_t v0")?;
        }
        for n in 0..f.nargs {
            write!(self.out, ", uint32_t {}", r(Gpr::arg(n as usize)))?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn emit_prototypes(&mut self) -> Result<()> {
        for (&addr, f) in &self.analysis.functions {
            let reachable = self
                .analysis
                .index_of(addr)
                .map(|i| !self.analysis.insns[i].f_livein.is_empty())
                .unwrap_or(false);
            if reachable {
                let f = f.clone();
                self.emit_function_signature(&f, addr)?;
                writeln!(self.out, ";")?;
            }
        }
        Ok(())
    }

    fn emit_functions(&mut self) -> Result<()> {
        let funcs: Vec<(u32, Function)> = self
            .analysis
            .functions
            .iter()
            .map(|(&a, f)| (a, f.clone()))
            .collect();
        for (addr, f) in funcs {
            let Some(start) = self.analysis.index_of(addr) else {
                continue;
            };
            if self.analysis.insns[start].f_livein.is_empty() {
                // Unreachable function, elided.
                continue;
            }
            self.emit_function(addr, &f, start)?;
        }
        Ok(())
    }

    fn emit_function(&mut self, addr: u32, f: &Function, start: usize) -> Result<()> {
        writeln!(self.out)?;
        self.emit_function_signature(f, addr)?;
        writeln!(self.out, " {{")?;
        writeln!(self.out, "const uint32_t zero = 0;")?;

        if !self.options.conservative {
            writeln!(self.out, "uint32_t at = 0, v1 = 0, t0 = 0, t1 = 0, t2 = 0,")?;
            writeln!(
                self.out,
                "t3 = 0, t4 = 0, t5 = 0, t6 = 0, t7 = 0, s0 = 0, s1 = 0, s2 = 0, s3 = 0, s4 = 0, s5 = 0,"
            )?;
            writeln!(self.out, "s6 = 0, s7 = 0, t8 = 0, t9 = 0, gp = 0, fp = 0, s8 = 0, ra = 0;")?;
        } else {
            writeln!(self.out, "uint32_t at = 0, v1 = 0, t0 = 0, t1 = 0, t2 = 0,")?;
            writeln!(
                self.out,
                "t3 = 0, t4 = 0, t5 = 0, t6 = 0, t7 = 0, t8 = 0, t9 = 0, gp = 0x10000, ra = 0x10000;"
            )?;
        }
        writeln!(self.out, "uint32_t lo = 0, hi = 0;")?;
        writeln!(self.out, "int cf = 0;")?;
        writeln!(self.out, "uint64_t temp64;")?;
        writeln!(self.out, "double tempf64;")?;
        writeln!(self.out, "uint32_t fp_dest;")?;
        writeln!(self.out, "void *dest;")?;
        if !f.v0_in {
            writeln!(self.out, "uint32_t v0 = 0;")?;
        }
        for n in f.nargs as usize..4 {
            writeln!(self.out, "uint32_t {} = 0;", r(Gpr::arg(n)))?;
        }

        let text_vaddr = self.analysis.binary.text_vaddr;
        let end = ((f.end_addr - text_vaddr) / 4) as usize;
        for i in start..end.min(self.analysis.insns.len()) {
            let vaddr = self.analysis.addr_of(i);
            if self.labels.contains(&vaddr) {
                writeln!(self.out, "L{vaddr:x}:")?;
            }
            self.emit_instr(i)?;
        }

        writeln!(self.out, "}}")?;
        Ok(())
    }

    /// `// fdead` / `// bdead` prefixes comment out instructions whose
    /// sources never carry live values or whose results nothing reads.
    fn emit_dead_comment(&mut self, i: usize) -> Result<()> {
        let insn = &self.analysis.insns[i];
        let op = insn.op();
        let control = matches!(op, Op::J | Op::Jal | Op::Jr | Op::Jalr | Op::B) || op.is_branch();
        if control || self.options.conservative {
            return Ok(());
        }

        let f_livein = insn.f_livein;
        let b_liveout = insn.b_liveout;
        let fdead = |out: &mut W| write!(out, "// fdead {:x} ", f_livein.0);
        let bdead = |out: &mut W| write!(out, "// bdead {:x} ", b_liveout.0);

        match op.liveness_class() {
            LivenessClass::OneSrc | LivenessClass::OneSrcPos1 => {
                if !f_livein.intersects(insn.single_source_mask()) {
                    fdead(&mut self.out)?;
                }
            }
            LivenessClass::TwoSrc => {
                if !f_livein.contains_all(insn.instr.all_source_mask()) {
                    fdead(&mut self.out)?;
                }
            }
            LivenessClass::DstTwoSrc => {
                if !f_livein.intersects(RegMask::of(insn.instr.rt)) {
                    fdead(&mut self.out)?;
                } else if !f_livein.intersects(insn.single_source_mask()) {
                    fdead(&mut self.out)?;
                } else if !b_liveout.intersects(insn.instr.dest_mask()) {
                    bdead(&mut self.out)?;
                }
            }
            LivenessClass::DstSrc => {
                if !f_livein.intersects(insn.single_source_mask()) {
                    fdead(&mut self.out)?;
                } else if !b_liveout.intersects(insn.instr.dest_mask()) {
                    bdead(&mut self.out)?;
                }
            }
            LivenessClass::OneDst => {
                if !b_liveout.intersects(insn.instr.dest_mask()) {
                    bdead(&mut self.out)?;
                }
            }
            LivenessClass::DivMult => {
                if !f_livein.contains_all(insn.instr.all_source_mask()) {
                    fdead(&mut self.out)?;
                } else if !b_liveout.intersects(RegMask::HI | RegMask::LO) {
                    bdead(&mut self.out)?;
                }
            }
            LivenessClass::Nop => {}
        }
        Ok(())
    }

    fn emit_cond_branch(&mut self, i: usize, lhs: &str, op: &str, rhs: &str) -> Result<()> {
        let signed = op != "==" && op != "!=";
        let cast1 = if signed { "(int)" } else { "" };
        let cast2 = if signed && rhs != "0" { "(int)" } else { "" };
        write!(self.out, "if ({cast1}{lhs} {op} {cast2}{rhs}) {{")?;
        self.emit_instr(i + 1)?;
        let addr = self.analysis.insns[i].branch_dest();
        writeln!(self.out, "goto L{addr:x};}}")?;
        Ok(())
    }

    fn emit_cond_branch_likely(&mut self, i: usize, lhs: &str, op: &str, rhs: &str) -> Result<()> {
        let target = self.analysis.addr_of(i + 2);
        self.emit_cond_branch(i, lhs, op, rhs)?;
        if !self.options.trace {
            writeln!(self.out, "else goto L{target:x};")?;
        } else {
            writeln!(
                self.out,
                "else {{printf(\"pc=0x{:08x} (ignored)\\n\"); goto L{target:x};}}",
                self.analysis.addr_of(i + 1)
            )?;
        }
        Ok(())
    }

    fn emit_fp_cond_branch(&mut self, i: usize, cond: &str, likely: bool) -> Result<()> {
        write!(self.out, "if ({cond}) {{")?;
        self.emit_instr(i + 1)?;
        let addr = self.analysis.insns[i].branch_dest();
        writeln!(self.out, "goto L{addr:x};}}")?;
        if likely {
            let target = self.analysis.addr_of(i + 2);
            if !self.options.trace {
                writeln!(self.out, "else goto L{target:x};")?;
            } else {
                writeln!(
                    self.out,
                    "else {{printf(\"pc=0x{:08x} (ignored)\\n\"); goto L{target:x};}}",
                    self.analysis.addr_of(i + 1)
                )?;
            }
        }
        Ok(())
    }

    /// Emit a call: delay slot first, then the wrapper or sibling function
    /// invocation, then the jump to the resume slot.
    fn emit_jal(&mut self, i: usize, imm: u32) -> Result<()> {
        let found_fn = self
            .analysis
            .symbol_name(imm)
            .and_then(find_extern);

        self.emit_instr(i + 1)?;

        match found_fn {
            Some(f) => self.emit_extern_call(f)?,
            None => self.emit_internal_call(i, imm)?,
        }

        let resume = self.analysis.addr_of(i + 2);
        writeln!(self.out, "goto L{resume:x};")?;
        Ok(())
    }

    fn emit_extern_call(&mut self, f: &'static ExternFunction) -> Result<()> {
        if f.is_vararg() {
            for n in 0..4 {
                writeln!(self.out, "MEM_U32(sp + {}) = {};", n * 4, r(Gpr::arg(n)))?;
            }
        }

        match f.return_type() {
            b'v' => {}
            b'i' | b'u' | b'p' => write!(self.out, "{} = ", r(Gpr::V0))?,
            b'f' => write!(self.out, "{} = ", fr(FP_RET))?,
            b'd' => write!(self.out, "tempf64 = ")?,
            b'l' | b'j' => write!(self.out, "temp64 = ")?,
            _ => {}
        }

        let mut args: Vec<String> = Vec::new();
        if f.takes_mem() {
            args.push("mem".to_string());
        }
        let mut alloc = O32ArgAllocator::new();
        let mut needs_sp = false;
        for &ty in f.arg_types() {
            if ty == b't' {
                args.push("trampoline".to_string());
                needs_sp = true;
            }
            let arg = match alloc.alloc(ty) {
                ArgLoc::Gpr(n) => match ty {
                    b'f' => format!("BITCAST_U32_TO_F32({})", r(Gpr::arg(n))),
                    _ => r(Gpr::arg(n)).to_string(),
                },
                ArgLoc::Stack(n) => match ty {
                    b'f' => format!("BITCAST_U32_TO_F32(MEM_U32(sp + {}))", n * 4),
                    b'i' => format!("MEM_S32(sp + {})", n * 4),
                    _ => format!("MEM_U32(sp + {})", n * 4),
                },
                ArgLoc::FpReg(n) => match ty {
                    b'f' => fr(FP_ARG_BASE + n as u8),
                    _ => format!("double_from_FloatReg({})", dr(FP_ARG_BASE + n as u8)),
                },
                ArgLoc::GprPair(n) => {
                    let pair = format!(
                        "(((uint64_t){} << 32) | (uint64_t){})",
                        r(Gpr::arg(n)),
                        r(Gpr::arg(n + 1))
                    );
                    match ty {
                        b'd' => format!("BITCAST_U64_TO_F64{pair}"),
                        b'l' => format!("(int64_t){pair}"),
                        _ => pair,
                    }
                }
                ArgLoc::StackPair(n) => {
                    let pair = format!(
                        "(((uint64_t)MEM_U32(sp + {}) << 32) | (uint64_t)MEM_U32(sp + {}))",
                        n * 4,
                        (n + 1) * 4
                    );
                    match ty {
                        b'd' => format!("BITCAST_U64_TO_F64{pair}"),
                        b'l' => format!("(int64_t){pair}"),
                        _ => pair,
                    }
                }
            };
            args.push(arg);
        }
        if f.is_vararg() || needs_sp {
            args.push(r(Gpr::Sp).to_string());
        }

        writeln!(self.out, "wrapper_{}({});", f.name, args.join(", "))?;

        match f.return_type() {
            b'l' | b'j' => {
                writeln!(self.out, "{} = (uint32_t)(temp64 >> 32);", r(Gpr::V0))?;
                writeln!(self.out, "{} = (uint32_t)temp64;", r(Gpr::V1))?;
            }
            b'd' => {
                writeln!(self.out, "{} = FloatReg_from_double(tempf64);", dr(FP_RET))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn emit_internal_call(&mut self, _i: usize, imm: u32) -> Result<()> {
        let f = self
            .analysis
            .functions
            .get(&imm)
            .ok_or(EmitError::UnknownFunction { addr: imm })?
            .clone();

        if f.nret == 1 {
            write!(self.out, "v0 = ")?;
        } else if f.nret == 2 {
            write!(self.out, "temp64 = ")?;
        }
        write!(self.out, "{}(mem, sp", self.function_c_name(imm))?;
        if f.v0_in {
            write!(self.out, ", {}", r(Gpr::V0))?;
        }
        for n in 0..f.nargs as usize {
            write!(self.out, ", {}", r(Gpr::arg(n)))?;
        }
        writeln!(self.out, ");")?;
        if f.nret == 2 {
            writeln!(self.out, "{} = (uint32_t)(temp64 >> 32);", r(Gpr::V0))?;
            writeln!(self.out, "{} = (uint32_t)temp64;", r(Gpr::V1))?;
        }
        Ok(())
    }

    /// One statement per instruction; branch delay slots are re-emitted
    /// inside the owning branch and reached textually on the fall-through
    /// path.
    pub(crate) fn emit_instr(&mut self, i: usize) -> Result<()> {
        let insn = &self.analysis.insns[i];
        let instr = insn.instr;
        let vaddr = self.analysis.addr_of(i);

        let symbol = self.analysis.symbol_name(vaddr).map(str::to_owned);
        if let Some(name) = &symbol {
            writeln!(self.out, "//{name}:")?;
        }
        if self.options.trace {
            write!(
                self.out,
                "++cnt; printf(\"pc=0x{:08x}{}{}\\n\"); ",
                vaddr,
                if symbol.is_some() { " " } else { "" },
                symbol.as_deref().unwrap_or("")
            )?;
        }

        self.emit_dead_comment(i)?;

        let rs = r(instr.rs);
        let rt = r(instr.rt);
        let rd = r(instr.rd);
        let imm_u = if insn.patched {
            insn.patched_addr
        } else {
            instr.uimm()
        };
        let imm_s = if insn.patched {
            insn.patched_addr
        } else {
            instr.simm() as u32
        };
        let mem_off = insn.mem_offset();

        match insn.op() {
            Op::Add | Op::Addu => writeln!(self.out, "{rd} = {rs} + {rt};")?,
            Op::Addi | Op::Addiu => writeln!(self.out, "{rt} = {rs} + 0x{imm_s:x};")?,
            Op::And => writeln!(self.out, "{rd} = {rs} & {rt};")?,
            Op::Andi => writeln!(self.out, "{rt} = {rs} & 0x{imm_u:x};")?,
            Op::Or => writeln!(self.out, "{rd} = {rs} | {rt};")?,
            Op::Ori => writeln!(self.out, "{rt} = {rs} | 0x{imm_u:x};")?,
            Op::Xor => writeln!(self.out, "{rd} = {rs} ^ {rt};")?,
            Op::Xori => writeln!(self.out, "{rt} = {rs} ^ 0x{imm_u:x};")?,
            Op::Nor => writeln!(self.out, "{rd} = ~({rs} | {rt});")?,
            Op::Not => writeln!(self.out, "{rd} = ~{rs};")?,
            Op::Move => writeln!(self.out, "{rd} = {rs};")?,
            Op::Negu => writeln!(self.out, "{rd} = -{rt};")?,
            Op::Li => writeln!(self.out, "{rt} = 0x{:x};", insn.patched_addr)?,
            Op::Lui => writeln!(self.out, "{rt} = 0x{:x};", imm_u << 16)?,

            Op::Slt => writeln!(self.out, "{rd} = (int){rs} < (int){rt};")?,
            Op::Slti => writeln!(self.out, "{rt} = (int){rs} < (int)0x{imm_s:x};")?,
            Op::Sltiu => writeln!(self.out, "{rt} = {rs} < 0x{imm_s:x};")?,
            Op::Sltu => writeln!(self.out, "{rd} = {rs} < {rt};")?,

            Op::Sll => writeln!(self.out, "{rd} = {rt} << {};", instr.sa)?,
            Op::Srl => writeln!(self.out, "{rd} = {rt} >> {};", instr.sa)?,
            Op::Sra => writeln!(self.out, "{rd} = (int){rt} >> {};", instr.sa)?,
            Op::Sllv => writeln!(self.out, "{rd} = {rt} << ({rs} & 0x1f);")?,
            Op::Srlv => writeln!(self.out, "{rd} = {rt} >> ({rs} & 0x1f);")?,
            Op::Srav => writeln!(self.out, "{rd} = (int){rt} >> ({rs} & 0x1f);")?,
            Op::Subu => writeln!(self.out, "{rd} = {rs} - {rt};")?,

            Op::Mult => {
                writeln!(self.out, "lo = {rs} * {rt};")?;
                writeln!(
                    self.out,
                    "hi = (uint32_t)((int64_t)(int){rs} * (int64_t)(int){rt} >> 32);"
                )?;
            }
            Op::Multu => {
                writeln!(self.out, "lo = {rs} * {rt};")?;
                writeln!(
                    self.out,
                    "hi = (uint32_t)((uint64_t){rs} * (uint64_t){rt} >> 32);"
                )?;
            }
            Op::Div => {
                write!(self.out, "lo = (int){rs} / (int){rt}; ")?;
                writeln!(self.out, "hi = (int){rs} % (int){rt};")?;
            }
            Op::Divu => {
                write!(self.out, "lo = {rs} / {rt}; ")?;
                writeln!(self.out, "hi = {rs} % {rt};")?;
            }
            Op::Mfhi => writeln!(self.out, "{rd} = hi;")?,
            Op::Mflo => writeln!(self.out, "{rd} = lo;")?,

            // Branches
            Op::Beq => self.emit_cond_branch(i, rs, "==", rt)?,
            Op::Beql => self.emit_cond_branch_likely(i, rs, "==", rt)?,
            Op::Bne => self.emit_cond_branch(i, rs, "!=", rt)?,
            Op::Bnel => self.emit_cond_branch_likely(i, rs, "!=", rt)?,
            Op::Beqz => self.emit_cond_branch(i, rs, "==", "0")?,
            Op::Bnez => self.emit_cond_branch(i, rs, "!=", "0")?,
            Op::Bgez => self.emit_cond_branch(i, rs, ">=", "0")?,
            Op::Bgezl => self.emit_cond_branch_likely(i, rs, ">=", "0")?,
            Op::Bgtz => self.emit_cond_branch(i, rs, ">", "0")?,
            Op::Bgtzl => self.emit_cond_branch_likely(i, rs, ">", "0")?,
            Op::Blez => self.emit_cond_branch(i, rs, "<=", "0")?,
            Op::Blezl => self.emit_cond_branch_likely(i, rs, "<=", "0")?,
            Op::Bltz => self.emit_cond_branch(i, rs, "<", "0")?,
            Op::Bltzl => self.emit_cond_branch_likely(i, rs, "<", "0")?,
            Op::Bc1f => self.emit_fp_cond_branch(i, "!cf", false)?,
            Op::Bc1t => self.emit_fp_cond_branch(i, "cf", false)?,
            Op::Bc1fl => self.emit_fp_cond_branch(i, "!cf", true)?,
            Op::Bc1tl => self.emit_fp_cond_branch(i, "cf", true)?,

            Op::B => {
                self.emit_instr(i + 1)?;
                writeln!(self.out, "goto L{:x};", self.analysis.insns[i].branch_dest())?;
            }
            Op::J => {
                self.emit_instr(i + 1)?;
                writeln!(self.out, "goto L{:x};", self.analysis.insns[i].jump_dest())?;
            }
            Op::Jal => {
                let imm = insn.jump_dest();
                self.emit_jal(i, imm)?;
            }
            Op::Jalr => {
                writeln!(self.out, "fp_dest = {rs};")?;
                self.emit_instr(i + 1)?;
                writeln!(
                    self.out,
                    "temp64 = trampoline(mem, sp, {}, {}, {}, {}, fp_dest);",
                    r(Gpr::A0),
                    r(Gpr::A1),
                    r(Gpr::A2),
                    r(Gpr::A3)
                )?;
                writeln!(self.out, "{} = (uint32_t)(temp64 >> 32);", r(Gpr::V0))?;
                writeln!(self.out, "{} = (uint32_t)temp64;", r(Gpr::V1))?;
                writeln!(self.out, "goto L{:x};", self.analysis.addr_of(i + 2))?;
            }
            Op::Jr => self.emit_jr(i)?,

            // Memory
            Op::Lb => writeln!(self.out, "{rt} = MEM_S8({rs} + {mem_off});")?,
            Op::Lbu => writeln!(self.out, "{rt} = MEM_U8({rs} + {mem_off});")?,
            Op::Lh => writeln!(self.out, "{rt} = MEM_S16({rs} + {mem_off});")?,
            Op::Lhu => writeln!(self.out, "{rt} = MEM_U16({rs} + {mem_off});")?,
            Op::Lw => writeln!(self.out, "{rt} = MEM_U32({rs} + {mem_off});")?,
            Op::Sb => writeln!(self.out, "MEM_U8({rs} + {mem_off}) = (uint8_t){rt};")?,
            Op::Sh => writeln!(self.out, "MEM_U16({rs} + {mem_off}) = (uint16_t){rt};")?,
            Op::Sw => writeln!(self.out, "MEM_U32({rs} + {mem_off}) = {rt};")?,
            Op::Lwc1 => {
                writeln!(self.out, "{} = MEM_U32({rs} + {mem_off});", wr(instr.ft))?;
            }
            Op::Swc1 => {
                writeln!(self.out, "MEM_U32({rs} + {mem_off}) = {};", wr(instr.ft))?;
            }
            Op::Ldc1 => {
                debug_assert!(instr.ft % 2 == 0);
                writeln!(self.out, "{} = MEM_U32({rs} + {mem_off});", wr(instr.ft + 1))?;
                writeln!(self.out, "{} = MEM_U32({rs} + {mem_off} + 4);", wr(instr.ft))?;
            }
            Op::Sdc1 => {
                debug_assert!(instr.ft % 2 == 0);
                writeln!(self.out, "MEM_U32({rs} + {mem_off}) = {};", wr(instr.ft + 1))?;
                writeln!(self.out, "MEM_U32({rs} + {mem_off} + 4) = {};", wr(instr.ft))?;
            }
            Op::Lwl => {
                write!(self.out, "{rt} = {rs} + {mem_off}; ")?;
                writeln!(
                    self.out,
                    "{rt} = (MEM_U8({rt}) << 24) | (MEM_U8({rt} + 1) << 16) | (MEM_U8({rt} + 2) << 8) | MEM_U8({rt} + 3);"
                )?;
            }
            Op::Swl => {
                for n in 0..4 {
                    writeln!(
                        self.out,
                        "MEM_U8({rs} + {mem_off} + {n}) = (uint8_t)({rt} >> {});",
                        (3 - n) * 8
                    )?;
                }
            }
            Op::Lwr => {
                // Unsupported by the runtime contract; the paired lwl does
                // the whole unaligned load.
            }
            Op::Swr => writeln!(self.out, "//swr {rt}, {mem_off}({rs})")?,

            // Coprocessor transfers
            Op::Mfc1 => writeln!(self.out, "{rt} = {};", wr(instr.fs))?,
            Op::Mtc1 => writeln!(self.out, "{} = {rt};", wr(instr.fs))?,
            Op::Cfc1 => writeln!(self.out, "{rt} = fcsr;")?,
            Op::Ctc1 => writeln!(self.out, "fcsr = {rt};")?,

            // FP arithmetic
            Op::AddS => {
                writeln!(self.out, "{} = {} + {};", fr(instr.fd), fr(instr.fs), fr(instr.ft))?;
            }
            Op::SubS => {
                writeln!(self.out, "{} = {} - {};", fr(instr.fd), fr(instr.fs), fr(instr.ft))?;
            }
            Op::MulS => {
                writeln!(self.out, "{} = {} * {};", fr(instr.fd), fr(instr.fs), fr(instr.ft))?;
            }
            Op::DivS => {
                writeln!(self.out, "{} = {} / {};", fr(instr.fd), fr(instr.fs), fr(instr.ft))?;
            }
            Op::SqrtS => {
                writeln!(self.out, "{} = sqrtf({});", fr(instr.fd), fr(instr.fs))?;
            }
            Op::MovS => writeln!(self.out, "{} = {};", fr(instr.fd), fr(instr.fs))?,
            Op::NegS => writeln!(self.out, "{} = -{};", fr(instr.fd), fr(instr.fs))?,
            Op::AddD => self.emit_fp_double_binop(instr.fd, instr.fs, instr.ft, "+")?,
            Op::SubD => self.emit_fp_double_binop(instr.fd, instr.fs, instr.ft, "-")?,
            Op::MulD => self.emit_fp_double_binop(instr.fd, instr.fs, instr.ft, "*")?,
            Op::DivD => self.emit_fp_double_binop(instr.fd, instr.fs, instr.ft, "/")?,
            Op::MovD => writeln!(self.out, "{} = {};", dr(instr.fd), dr(instr.fs))?,
            Op::NegD => {
                writeln!(
                    self.out,
                    "{} = FloatReg_from_double(-double_from_FloatReg({}));",
                    dr(instr.fd),
                    dr(instr.fs)
                )?;
            }
            Op::CLtS => {
                writeln!(self.out, "cf = {} < {};", fr(instr.fs), fr(instr.ft))?;
            }
            Op::CLeS => {
                writeln!(self.out, "cf = {} <= {};", fr(instr.fs), fr(instr.ft))?;
            }
            Op::CEqS => {
                writeln!(self.out, "cf = {} == {};", fr(instr.fs), fr(instr.ft))?;
            }
            Op::CLtD => self.emit_fp_double_compare(instr.fs, instr.ft, "<")?,
            Op::CLeD => self.emit_fp_double_compare(instr.fs, instr.ft, "<=")?,
            Op::CEqD => self.emit_fp_double_compare(instr.fs, instr.ft, "==")?,
            Op::CvtSW => {
                writeln!(self.out, "{} = (int){};", fr(instr.fd), wr(instr.fs))?;
            }
            Op::CvtDW => {
                writeln!(
                    self.out,
                    "{} = FloatReg_from_double((int){});",
                    dr(instr.fd),
                    wr(instr.fs)
                )?;
            }
            Op::CvtDS => {
                writeln!(
                    self.out,
                    "{} = FloatReg_from_double({});",
                    dr(instr.fd),
                    fr(instr.fs)
                )?;
            }
            Op::CvtSD => {
                writeln!(
                    self.out,
                    "{} = double_from_FloatReg({});",
                    fr(instr.fd),
                    dr(instr.fs)
                )?;
            }
            Op::CvtWD => {
                writeln!(
                    self.out,
                    "{} = cvt_w_d(double_from_FloatReg({}));",
                    wr(instr.fd),
                    dr(instr.fs)
                )?;
            }
            Op::CvtWS => {
                writeln!(self.out, "{} = cvt_w_s({});", wr(instr.fd), fr(instr.fs))?;
            }
            Op::TruncWS => {
                writeln!(self.out, "{} = (int){};", wr(instr.fd), fr(instr.fs))?;
            }
            Op::TruncWD => {
                writeln!(
                    self.out,
                    "{} = (int)double_from_FloatReg({});",
                    wr(instr.fd),
                    dr(instr.fs)
                )?;
            }

            // Traps model aborts; the condition is the trap's negation.
            Op::Tne => {
                writeln!(self.out, "assert({rs} == {rt} && \"tne {}\");", instr.simm())?;
            }
            Op::Teq => {
                writeln!(self.out, "assert({rs} != {rt} && \"teq {}\");", instr.simm())?;
            }
            Op::Tge => {
                writeln!(
                    self.out,
                    "assert((int){rs} < (int){rt} && \"tge {}\");",
                    instr.simm()
                )?;
            }
            Op::Tgeu => {
                writeln!(self.out, "assert({rs} < {rt} && \"tgeu {}\");", instr.simm())?;
            }
            Op::Tlt => {
                writeln!(
                    self.out,
                    "assert((int){rs} >= (int){rt} && \"tlt {}\");",
                    instr.simm()
                )?;
            }
            Op::Break => writeln!(self.out, "abort();")?,

            Op::Nop => writeln!(self.out, "//nop;")?,

            _ => {
                writeln!(
                    self.out,
                    "UNIMPLEMENTED 0x{:X} : {}",
                    instr.raw, instr
                )?;
            }
        }
        Ok(())
    }

    fn emit_fp_double_binop(&mut self, fd: u8, fs: u8, ft: u8, op: &str) -> Result<()> {
        writeln!(
            self.out,
            "{} = FloatReg_from_double(double_from_FloatReg({}) {} double_from_FloatReg({}));",
            dr(fd),
            dr(fs),
            op,
            dr(ft)
        )?;
        Ok(())
    }

    fn emit_fp_double_compare(&mut self, fs: u8, ft: u8, op: &str) -> Result<()> {
        writeln!(
            self.out,
            "cf = double_from_FloatReg({}) {} double_from_FloatReg({});",
            dr(fs),
            op,
            dr(ft)
        )?;
        Ok(())
    }

    fn emit_jr(&mut self, i: usize) -> Result<()> {
        let insn = &self.analysis.insns[i];
        if insn.jtbl_addr != 0 {
            let jtbl_addr = insn.jtbl_addr;
            let num_cases = insn.num_cases;
            let index_reg = insn.index_reg;
            let rodata = self.analysis.binary.rodata.as_ref().unwrap();
            writeln!(self.out, ";static void *const Lswitch{jtbl_addr:x}[] = {{")?;
            for case in 0..num_cases {
                let dest = rodata
                    .word_at(jtbl_addr + case * 4)
                    .wrapping_add(self.analysis.binary.gp_value);
                writeln!(self.out, "&&L{dest:x},")?;
            }
            writeln!(self.out, "}};")?;
            writeln!(self.out, "dest = Lswitch{jtbl_addr:x}[{}];", r(index_reg))?;
            self.emit_instr(i + 1)?;
            writeln!(self.out, "goto *dest;")?;
        } else if insn.instr.rs != Gpr::Ra {
            writeln!(
                self.out,
                "UNSUPPORTED JR {}    (no jumptable available)",
                r(insn.instr.rs)
            )?;
        } else {
            self.emit_instr(i + 1)?;
            let nret = self
                .analysis
                .find_function(self.analysis.addr_of(i))
                .map(|(_, f)| f.nret)
                .unwrap_or(0);
            match nret {
                0 => writeln!(self.out, "return;")?,
                1 => writeln!(self.out, "return v0;")?,
                _ => writeln!(self.out, "return ((uint64_t)v0 << 32) | v1;")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrc_cfg::AnalysisOptions;
    use mrc_elf::{Binary, Section};

    const TEXT_VADDR: u32 = 0x0040_0000;

    fn be_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    fn base_binary(words: &[u32]) -> Binary {
        let mut binary = Binary {
            text_vaddr: TEXT_VADDR,
            text: be_bytes(words),
            ..Binary::default()
        };
        binary.main_addr = TEXT_VADDR;
        binary.text_functions.push(TEXT_VADDR);
        binary.symbol_names.insert(TEXT_VADDR, "main".to_string());
        binary.data = Some(Section {
            vaddr: 0x0041_0000,
            data: be_bytes(&[0, 0]),
        });
        binary.symbol_names.insert(0x0041_0000, "__Argc".to_string());
        binary.symbol_names.insert(0x0041_0004, "__Argv".to_string());
        binary
    }

    fn emit_with(binary: Binary, options: EmitOptions) -> String {
        let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
        analysis.run().unwrap();
        let mut emitter = Emitter::new(&analysis, options, Vec::new());
        emitter.emit().unwrap();
        String::from_utf8(emitter.out).unwrap()
    }

    fn simple_main() -> Binary {
        base_binary(&[
            0x0085_1024, // and $v0, $a0, $a1
            0x03e0_0008, // jr $ra
            0x0000_0000,
        ])
    }

    #[test]
    fn test_emit_simple_function() {
        let out = emit_with(simple_main(), EmitOptions::default());

        assert!(out.contains("#include \"header.h\""));
        assert!(out.contains(
            "static uint32_t f_main(uint8_t *mem, uint32_t sp, uint32_t a0, uint32_t a1);"
        ));
        assert!(out.contains("v0 = a0 & a1;"));
        assert!(out.contains("return v0;"));
        assert!(out.contains("int run(uint8_t *mem, int argc, char *argv[]) {"));
        assert!(out.contains("mmap_initial_data_range(mem, 0x310000, 0x411000);"));
        assert!(out.contains("MEM_S32(0x410000) = argc;"));
        assert!(out.contains("int ret = f_main(mem, 0x40fff0, argc, arg_addr);"));
        assert!(out.contains("setup_libc_data(mem);"));
        assert!(!out.contains("trampoline"));
    }

    #[test]
    fn test_emit_conservative() {
        let out = emit_with(
            simple_main(),
            EmitOptions {
                conservative: true,
                trace: false,
            },
        );
        assert!(out.contains("static uint32_t s0, s1, s2, s3, s4, s5, s6, s7, fp;"));
        assert!(out.contains("gp = 0x10000, ra = 0x10000;"));
        assert!(!out.contains("// fdead"));
        assert!(!out.contains("// bdead"));
    }

    #[test]
    fn test_emit_trace() {
        let out = emit_with(
            simple_main(),
            EmitOptions {
                conservative: false,
                trace: true,
            },
        );
        assert!(out.contains("static unsigned long long int cnt = 0;"));
        assert!(out.contains("++cnt; printf(\"pc=0x00400000 main\\n\"); "));
        assert!(out.contains("fprintf(stderr, \"cnt: %llu\\n\", cnt);"));
    }

    #[test]
    fn test_emit_dead_instruction_commented() {
        // addu $t2, $t1, $at has no live sources at entry.
        let out = emit_with(
            base_binary(&[
                0x0121_5021, // addu $t2, $t1, $at
                0x03e0_0008, // jr $ra
                0x0000_0000,
            ]),
            EmitOptions::default(),
        );
        assert!(out.contains("// fdead"));
    }

    #[test]
    fn test_emit_trampoline_and_two_word_return() {
        let mut binary = base_binary(&[
            0x03e0_0008, // main: jr $ra
            0x0000_0000,
            0x0080_1021, // f: move $v0, $a0
            0x00a0_1821, // move $v1, $a1
            0x03e0_0008, // jr $ra
            0x0000_0000,
        ]);
        binary.data = Some(Section {
            vaddr: 0x0041_0000,
            data: be_bytes(&[TEXT_VADDR + 8, 0]),
        });
        let out = emit_with(binary, EmitOptions::default());

        assert!(out.contains(
            "uint64_t trampoline(uint8_t *mem, uint32_t sp, uint32_t a0, uint32_t a1, uint32_t a2, uint32_t a3, uint32_t fp_dest) {"
        ));
        assert!(out.contains("case 0x400008: return func_400008(mem, sp, a0, a1);"));
        assert!(out.contains("default: abort();"));
        assert!(out.contains("return ((uint64_t)v0 << 32) | v1;"));
    }

    #[test]
    fn test_emit_extern_call() {
        let mut binary = base_binary(&[
            0x8f99_0008, // lw $t9, 8($gp)
            0x0320_f809, // jalr $t9
            0x0000_0000,
            0x03e0_0008, // jr $ra
            0x0000_0000,
        ]);
        binary.gp_value_adj = 0;
        binary.got_locals = vec![0, 0];
        binary.got_globals = vec![0x0f00_0000];
        binary.symbol_names.insert(0x0f00_0000, "memcpy".to_string());
        let out = emit_with(binary, EmitOptions::default());

        assert!(out.contains("v0 = wrapper_memcpy(mem, a0, a1, a2);"));
        assert!(out.contains("goto L40000c;"));
        assert!(out.contains("L40000c:"));
    }

    #[test]
    fn test_emit_vararg_spills_and_sp() {
        let mut binary = base_binary(&[
            0x8f99_0008, // lw $t9, 8($gp)
            0x0320_f809, // jalr $t9
            0x0000_0000,
            0x03e0_0008, // jr $ra
            0x0000_0000,
        ]);
        binary.gp_value_adj = 0;
        binary.got_locals = vec![0, 0];
        binary.got_globals = vec![0x0f00_0000];
        binary.symbol_names.insert(0x0f00_0000, "printf".to_string());
        let out = emit_with(binary, EmitOptions::default());

        assert!(out.contains("MEM_U32(sp + 0) = a0;"));
        assert!(out.contains("MEM_U32(sp + 12) = a3;"));
        assert!(out.contains("v0 = wrapper_printf(mem, a0, sp);"));
    }

    #[test]
    fn test_emit_jump_table_computed_goto() {
        let mut binary = base_binary(&[
            0x2c41_0003, // sltiu $at, $v0, 3
            0x1020_0006, // beqz $at, default
            0x0000_0000,
            0x3c01_0041, // lui $at, %hi(jtbl)
            0x0002_1880, // sll $v1, $v0, 2
            0x0023_0821, // addu $at, $at, $v1
            0x8c23_0000, // lw $v1, %lo(jtbl)($at)
            0x0060_0008, // jr $v1
            0x0000_0000,
            0x03e0_0008, // case target: jr $ra
            0x0000_0000,
        ]);
        // Case entries are gp-relative words, as in PIC binaries; all three
        // cases land on the nop after the default beqz.
        binary.gp_value = 0x1001_0000;
        let case = (TEXT_VADDR + 8).wrapping_sub(binary.gp_value);
        binary.rodata = Some(Section {
            vaddr: 0x0041_0000,
            data: be_bytes(&[case, case, case]),
        });
        let out = emit_with(binary, EmitOptions::default());

        assert!(out.contains(";static void *const Lswitch410000[] = {"));
        assert!(out.contains("&&L400008,"));
        assert!(out.contains("dest = Lswitch410000[v0];"));
        assert!(out.contains("goto *dest;"));
        assert!(out.contains("L400008:"));
    }
}
