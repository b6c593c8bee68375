//! Pass 2: return discovery, wrapper-stub synthesis and function extents.

use mrc_isa::{Gpr, Op};
use tracing::debug;

use crate::{Analysis, AnalysisError, Insn, Result};

impl Analysis {
    /// Attach every `jr $ra` to its owning function, synthesize returns for
    /// the allocator wrapper stubs, and compute each function's end address.
    pub fn finalize_functions(&mut self) -> Result<()> {
        for i in 0..self.insns.len() {
            let addr = self.addr_of(i);

            if self.insns[i].op() == Op::Jr && self.insns[i].instr.rs == Gpr::Ra {
                let (entry, _) = self
                    .find_function(addr)
                    .ok_or(AnalysisError::OrphanReturn { addr })?;
                self.functions
                    .get_mut(&entry)
                    .unwrap()
                    .returns
                    .push(addr + 4);
            }

            if self.insns[i].is_global_got_memop {
                let target = self.insns[i].linked_value;
                if self.binary.text_range().contains(&target) {
                    debug!(
                        target = format_args!("0x{target:08x}"),
                        at = format_args!("0x{addr:08x}"),
                        "li function pointer"
                    );
                    self.li_function_pointers.insert(target);
                    self.functions
                        .entry(target)
                        .or_default()
                        .referenced_by_function_pointer = true;
                }
            }
        }

        let entries: Vec<u32> = self.functions.keys().copied().collect();
        for &addr in &entries {
            if !self.functions[&addr].returns.is_empty() {
                continue;
            }
            match self.symbol_name(addr) {
                Some("__start") => {
                    // The bootstrap never returns.
                }
                Some("xmalloc") => self.rewrite_xmalloc(addr)?,
                Some("xfree") => self.rewrite_xfree(addr)?,
                _ => {
                    let is_rld_stub = self.index_of(addr).is_some_and(|i| {
                        i + 2 < self.insns.len()
                            && self.insns[i].op() == Op::Lw
                            && self.insns[i + 1].op() == Op::Move
                            && self.insns[i + 2].op() == Op::Jalr
                    });
                    if is_rld_stub {
                        // lw $t9, d($gp); move $t7, $ra; jalr $t9: a tail
                        // dispatch into the runtime loader, no local return.
                    } else if addr > self.binary.mcount_addr {
                        return Err(AnalysisError::MissingReturn { addr });
                    }
                }
            }
        }

        // end_addr: next entry, or the end of .text for the last function.
        let text_end = self.binary.text_vaddr + self.binary.text_len();
        for pair in entries.windows(2) {
            self.functions.get_mut(&pair[0]).unwrap().end_addr = pair[1];
        }
        if let Some(&last) = entries.last() {
            self.functions.get_mut(&last).unwrap().end_addr = text_end;
        }

        Ok(())
    }

    /// `xmalloc` tail-calls into the allocator with a preamble the analysis
    /// cannot follow; rewrite it in place to
    /// `jal alloc_new; <li $a1, scb>; jr $ra; nop...`.
    fn rewrite_xmalloc(&mut self, addr: u32) -> Result<()> {
        let i0 = self.index_of(addr).ok_or(AnalysisError::WrapperShape {
            addr,
            expected: "an in-text entry",
        })?;
        if i0 + 7 >= self.insns.len() {
            return Err(AnalysisError::WrapperShape {
                addr,
                expected: "eight instructions of stub body",
            });
        }

        let alloc_new_addr = self.addr_of(i0 + 7);
        if self.symbol_name(alloc_new_addr) != Some("alloc_new") {
            return Err(AnalysisError::WrapperShape {
                addr,
                expected: "alloc_new at the stub's end",
            });
        }
        self.insns[i0].patch(Op::Jal, alloc_new_addr);

        // The allocator descriptor load: at +6 for 7.1 shapes, +4 for 5.3.
        let li = if matches!(
            self.insns[i0 + 6].op(),
            Op::Ori | Op::Addiu | Op::Li | Op::Move
        ) {
            i0 + 6
        } else {
            i0 + 4
        };
        let li_insn = self.insns[li].clone();
        self.insns[i0 + 1] = li_insn;

        let ret_vram = self.insns[i0 + 2].instr.vram;
        self.insns[i0 + 2] = Insn::synthetic(0x03e0_0008, ret_vram); // jr $ra
        let ret_addr = self.addr_of(i0 + 2) + 4;
        self.functions.get_mut(&addr).unwrap().returns.push(ret_addr);

        for j in i0 + 3..=i0 + 6 {
            let vram = self.insns[j].instr.vram;
            self.insns[j] = Insn::synthetic(0, vram);
        }
        Ok(())
    }

    /// Same treatment for `xfree`, dispatching to `alloc_dispose`.
    fn rewrite_xfree(&mut self, addr: u32) -> Result<()> {
        let i0 = self.index_of(addr).ok_or(AnalysisError::WrapperShape {
            addr,
            expected: "an in-text entry",
        })?;
        if i0 + 4 >= self.insns.len() {
            return Err(AnalysisError::WrapperShape {
                addr,
                expected: "five instructions of stub body",
            });
        }

        let mut alloc_dispose_addr = self.addr_of(i0 + 4);
        if self.symbol_name(alloc_dispose_addr + 4) == Some("alloc_dispose") {
            alloc_dispose_addr += 4;
        }
        if self.symbol_name(alloc_dispose_addr) != Some("alloc_dispose") {
            return Err(AnalysisError::WrapperShape {
                addr,
                expected: "alloc_dispose at the stub's end",
            });
        }
        self.insns[i0].patch(Op::Jal, alloc_dispose_addr);

        let arg_insn = self.insns[i0 + 3].clone();
        self.insns[i0 + 1] = arg_insn;

        let ret_vram = self.insns[i0 + 2].instr.vram;
        self.insns[i0 + 2] = Insn::synthetic(0x03e0_0008, ret_vram); // jr $ra
        let ret_addr = self.addr_of(i0 + 2) + 4;
        self.functions.get_mut(&addr).unwrap().returns.push(ret_addr);

        let vram = self.insns[i0 + 3].instr.vram;
        self.insns[i0 + 3] = Insn::synthetic(0, vram);
        Ok(())
    }
}
