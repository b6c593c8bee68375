//! Pass 1: compiler-idiom recovery over the linear stream.
//!
//! Rewrites fuse an instruction pair into one logical assignment and patch
//! one or both records; the original bit patterns stay in place so later
//! passes can still inspect operand fields. Bounded backward searches that
//! miss leave the instructions untouched.

use mrc_isa::{Gpr, Op};
use tracing::debug;

use crate::{Analysis, AnalysisError, Result};

const MAX_LOOKBACK: usize = 128;

impl Analysis {
    /// Recognize and patch HI/LO pairs, GOT accesses, `jalr $t9` sequences,
    /// `bgezal $zero`, jump-table prologues, float materializations and the
    /// PIC `$gp` preamble. Populates the label and function sets.
    pub fn rewrite_idioms(&mut self) -> Result<()> {
        for i in 0..self.insns.len() {
            if self.insns[i].op() == Op::Bgezal && self.insns[i].instr.rs == Gpr::Zero {
                let target = self.insns[i].instr.branch_target();
                self.insns[i].patch(Op::Jal, target);
            }

            match self.insns[i].op() {
                Op::Jal | Op::J => {
                    let target = self.insns[i].jump_dest();
                    self.label_addresses.insert(target);
                    self.add_function(target);
                }
                Op::Jr => self.match_jump_table(i)?,
                op if op.is_branch() => {
                    let target = self.insns[i].branch_dest();
                    self.label_addresses.insert(target);
                }
                _ => {}
            }

            match self.insns[i].op() {
                Op::Mtc1 => self.link_float_lui(i),
                Op::Sw
                | Op::Sh
                | Op::Sb
                | Op::Lb
                | Op::Lbu
                | Op::Lh
                | Op::Lhu
                | Op::Lw
                | Op::Ldc1
                | Op::Lwc1
                | Op::Swc1 => {
                    let base = self.insns[i].instr.rs;
                    let imm = self.insns[i].instr.simm();
                    if base == Gpr::Gp {
                        self.rewrite_global_got_memop(i)?;
                    } else {
                        self.link_with_lui(i, base, imm)?;
                    }
                }
                Op::Addiu | Op::Ori => {
                    let rs = self.insns[i].instr.rs;
                    if rs != Gpr::Zero && rs != Gpr::Gp {
                        let imm = self.insns[i].instr.simm();
                        self.link_with_lui(i, rs, imm)?;
                    }
                }
                Op::Jalr => {
                    if self.insns[i].instr.rs == Gpr::T9 {
                        self.link_with_jalr(i);
                        if self.insns[i].linked_insn.is_some() {
                            let callee = self.insns[i].linked_value;
                            self.insns[i].patch(Op::Jal, callee);
                            self.label_addresses.insert(callee);
                            self.add_function(callee);
                        }
                    }
                }
                _ => {}
            }

            // PIC $gp re-establishment preamble: lui/addiu/addu over $gp and
            // $t9. The flat-memory runtime never consults $gp.
            let insn = &self.insns[i];
            if insn.op() == Op::Addu
                && insn.instr.rd == Gpr::Gp
                && insn.instr.rs == Gpr::Gp
                && insn.instr.rt == Gpr::T9
                && i >= 2
            {
                for j in i - 2..=i {
                    self.insns[j].patch_nop();
                }
            }
        }
        Ok(())
    }

    /// `lw rt, d($gp)` indexing the global GOT: rewrite to a full immediate
    /// load of the resolved symbol address.
    fn rewrite_global_got_memop(&mut self, i: usize) -> Result<()> {
        let imm = self.insns[i].instr.simm();
        let entry = (imm as i64 + self.binary.gp_value_adj as i64) / 4;
        if entry < 0 {
            return Ok(());
        }
        let locals = self.binary.got_locals.len();
        let Some(global) = (entry as usize).checked_sub(locals) else {
            return Ok(());
        };
        if global >= self.binary.got_globals.len() {
            return Ok(());
        }
        if self.insns[i].op() != Op::Lw {
            return Err(AnalysisError::GlobalGotMemopNotLw {
                vram: self.insns[i].instr.vram,
            });
        }

        let dest = self.binary.got_globals[global];
        let insn = &mut self.insns[i];
        insn.is_global_got_memop = true;
        insn.linked_value = dest;
        insn.patch(Op::Li, dest);
        Ok(())
    }

    /// Find the defining instruction for `reg` and fuse the pair: either a
    /// plain `lui` upper half, or a local-GOT word load off `$gp`.
    fn link_with_lui(&mut self, offset: usize, reg: Gpr, mem_imm: i32) -> Result<()> {
        let end = offset.saturating_sub(MAX_LOOKBACK);
        for search in (end..offset).rev() {
            match self.insns[search].op() {
                Op::Lui => {
                    if self.insns[search].instr.rt == reg {
                        let addr =
                            (self.insns[search].instr.uimm() << 16).wrapping_add(mem_imm as u32);
                        return self.fuse_pair(search, offset, addr, false);
                    }
                }
                // addu is deliberately absent: jump tables add the scaled
                // index between the lui and the load.
                Op::Lw | Op::Addiu | Op::Add | Op::Sub | Op::Subu => {
                    if self.insns[search].instr.dest_gpr() == Some(reg) {
                        if self.insns[search].op() == Op::Lw
                            && self.insns[search].instr.rs == Gpr::Gp
                        {
                            let imm0 = self.insns[search].instr.simm();
                            let entry = (imm0 as i64 + self.binary.gp_value_adj as i64) / 4;
                            if entry >= 0 && (entry as usize) < self.binary.got_locals.len() {
                                // Static functions and data reached through
                                // the local GOT.
                                let addr = self.binary.got_locals[entry as usize]
                                    .wrapping_add(mem_imm as u32);
                                return self.fuse_pair(search, offset, addr, true);
                            }
                        }
                        // reg is an ordinary pointer; the displacement is
                        // probably a struct member.
                        return Ok(());
                    }
                }
                Op::Jr => {
                    // Stop at the previous function's return, unless
                    // `offset` sits in its delay slot.
                    if self.insns[search].instr.rs == Gpr::Ra && offset - search >= 2 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Install the fused form: the definer becomes a 32-bit immediate load,
    /// the user a register move (addiu/ori) or a zero-displacement access.
    fn fuse_pair(
        &mut self,
        search: usize,
        offset: usize,
        addr: u32,
        from_got_local: bool,
    ) -> Result<()> {
        self.insns[search].linked_insn = Some(offset);
        self.insns[search].linked_value = addr;
        self.insns[offset].linked_insn = Some(search);
        self.insns[offset].linked_value = addr;
        self.insns[search].patch(Op::Li, addr);

        match self.insns[offset].op() {
            Op::Addiu | Op::Ori => {
                let rt = self.insns[offset].instr.rt;
                self.insns[offset].patch(Op::Move, 0);
                self.insns[offset].instr.rd = rt;
                if from_got_local && self.binary.text_range().contains(&addr) {
                    self.add_function(addr);
                }
                Ok(())
            }
            Op::Lb
            | Op::Lbu
            | Op::Sb
            | Op::Lh
            | Op::Lhu
            | Op::Sh
            | Op::Lw
            | Op::Sw
            | Op::Ldc1
            | Op::Lwc1
            | Op::Swc1 => {
                // Displacement folded into the materialized address.
                self.insns[offset].patched = true;
                self.insns[offset].patched_addr = 0;
                Ok(())
            }
            _ => Err(AnalysisError::UnsupportedHiLoPartner {
                vram: self.insns[offset].instr.vram,
            }),
        }
    }

    /// For a `jalr $t9`, find the matching `$t9` load and bind the call.
    fn link_with_jalr(&mut self, offset: usize) {
        let end = offset.saturating_sub(MAX_LOOKBACK);
        for search in (end..offset).rev() {
            if self.insns[search].instr.dest_gpr() == Some(Gpr::T9) {
                match self.insns[search].op() {
                    // A GOT load or an already-materialized li resolves the
                    // callee; the loader itself becomes dead.
                    Op::Li => {
                        let callee = self.insns[search].linked_value;
                        self.insns[search].linked_insn = Some(offset);
                        self.insns[offset].linked_insn = Some(search);
                        self.insns[offset].linked_value = callee;
                        self.insns[search].patch_nop();
                        self.insns[search].is_global_got_memop = false;
                        return;
                    }
                    Op::Addiu => {
                        if let Some(first) = self.insns[search].linked_insn {
                            // Thread the existing HI link through without
                            // rewriting the addiu.
                            let value = self.insns[search].linked_value;
                            self.insns[search].linked_insn = Some(offset);
                            self.insns[offset].linked_insn = Some(first);
                            self.insns[offset].linked_value = value;
                        }
                        return;
                    }
                    Op::Lw | Op::Ori | Op::Addu | Op::Add | Op::Sub | Op::Subu => return,
                    _ => {}
                }
            } else if self.insns[search].op() == Op::Jr
                && self.insns[search].instr.rs == Gpr::Ra
            {
                return;
            }
        }
    }

    /// Floating-point LI: an `mtc1` from `r` pairs with the `lui` that
    /// loaded `r`, which then carries the 32-bit float pattern.
    fn link_float_lui(&mut self, i: usize) {
        let rt = self.insns[i].instr.rt;
        for s in (0..i).rev() {
            match self.insns[s].op() {
                Op::Lui => {
                    if self.insns[s].instr.rt == rt {
                        let bits = self.insns[s].instr.uimm() << 16;
                        self.insns[s].linked_insn = Some(i);
                        self.insns[s].linked_value = bits;
                        self.insns[s].patch(Op::Li, bits);
                    }
                    return;
                }
                Op::Lw
                | Op::Lh
                | Op::Lhu
                | Op::Lb
                | Op::Lbu
                | Op::Addiu
                | Op::Add
                | Op::Sub
                | Op::Subu => {
                    if self.insns[s].instr.dest_gpr() == Some(rt) {
                        return;
                    }
                }
                Op::Jr => {
                    if self.insns[s].instr.rs == Gpr::Ra {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Match the IDO 5.3/7.1 switch prologue ending in `jr rx`.
    ///
    /// ```text
    /// sltiu $at, $idx, N      (or andi $masked, $idx, N-1)
    /// beqz  $at, default
    ///  filler
    /// lui   $at, %hi(jtbl)    (fused; lw $at, d($gp) in PIC code)
    /// sll   $tmp, $idx, 2
    /// addu  $at, $at, $tmp
    /// lw    $tgt, %lo(jtbl)($at)
    ///  nop                    (5.3)
    /// addu  $tgt, $tgt, $gp   (PIC)
    /// jr    $tgt
    /// ```
    fn match_jump_table(&mut self, i: usize) -> Result<()> {
        if i < 7 || self.binary.rodata.is_none() {
            return Ok(());
        }
        if self.insns[i].instr.rs == Gpr::Ra {
            return Ok(());
        }

        let is_pic = self.insns[i - 1].op() == Op::Addu && self.insns[i - 1].instr.rt == Gpr::Gp;
        let pic = is_pic as usize;
        let has_nop = (self.insns[i - pic - 1].op() == Op::Nop) as usize;
        let Some(probe) = i.checked_sub(pic + has_nop + 5) else {
            return Ok(());
        };
        let has_extra = (self.insns[probe].op() != Op::Beqz) as usize;

        let mut lw = i - pic - has_nop - 1;
        if self.insns[lw].op() != Op::Lw {
            let Some(prev) = lw.checked_sub(1) else {
                return Ok(());
            };
            lw = prev;
        }
        if self.insns[lw].op() != Op::Lw || self.insns[lw].linked_insn.is_none() {
            return Ok(());
        }

        let mut addu_index = lw - 1;
        if self.insns[addu_index].op() != Op::Addu {
            let Some(prev) = addu_index.checked_sub(1) else {
                return Ok(());
            };
            addu_index = prev;
        }
        if addu_index == 0 || self.insns[addu_index].op() != Op::Addu {
            return Ok(());
        }
        if self.insns[addu_index - 1].op() != Op::Sll {
            return Ok(());
        }
        if self.insns[addu_index - 1].instr.dest_gpr() != Some(self.insns[i].instr.rs) {
            return Ok(());
        }
        let index_reg = self.insns[addu_index - 1].instr.rt;

        let mut andi_index = None;
        for j in 3..=4usize {
            let Some(k) = lw.checked_sub(j) else { break };
            if self.insns[k].op() == Op::Andi {
                andi_index = Some(k);
                break;
            }
        }

        let window_end = self
            .options
            .extended_sltiu_search
            .get(&i)
            .copied()
            .unwrap_or(14);
        let mut sltiu_index = None;
        for j in 5..=window_end {
            let Some(k) = (lw - has_extra).checked_sub(j) else {
                break;
            };
            if self.insns[k].op() == Op::Sltiu && self.insns[k].instr.rt == Gpr::At {
                sltiu_index = Some(k);
                break;
            }
            if self.insns[k].op() == Op::Jr {
                // Do not walk into a previous switch.
                break;
            }
        }
        if sltiu_index.is_some() {
            andi_index = None;
        }

        let (num_cases, and_variant) = if let Some(k) = sltiu_index {
            (self.insns[k].instr.uimm(), false)
        } else if let Some(k) = andi_index {
            (self.insns[k].instr.uimm() + 1, true)
        } else if let Some(&forced) = self.options.forced_jump_tables.get(&i) {
            // The bounding sltiu sits in another basic block; the case count
            // comes from the options.
            (forced, false)
        } else {
            return Ok(());
        };

        let jtbl_addr = self.insns[lw].linked_value;
        debug!(
            jtbl = format_args!("0x{jtbl_addr:08x}"),
            num_cases,
            at = format_args!("0x{:08x}", self.insns[i].instr.vram),
            "jump table"
        );

        if is_pic {
            self.insns[i - 1].patch_nop();
        }
        self.insns[i].jtbl_addr = jtbl_addr;
        self.insns[i].num_cases = num_cases;
        self.insns[i].index_reg = index_reg;
        self.insns[lw].patch_nop();
        self.insns[addu_index].patch_nop();
        self.insns[addu_index - 1].patch_nop();
        if !and_variant {
            // The materializing lui/li; the bounding sltiu stays, the
            // default-case beqz consumes it.
            if let Some(k) = addu_index.checked_sub(2) {
                self.insns[k].patch_nop();
            }
        }

        let rodata = self.binary.rodata.as_ref().unwrap();
        if jtbl_addr < rodata.vaddr
            || jtbl_addr + num_cases * 4 > rodata.vaddr + rodata.len()
        {
            return Err(AnalysisError::JumpTableOutOfRodata { addr: jtbl_addr });
        }
        for case in 0..num_cases {
            let target = rodata
                .word_at(jtbl_addr + case * 4)
                .wrapping_add(self.binary.gp_value);
            self.label_addresses.insert(target);
        }
        Ok(())
    }
}
