//! Passes 4 and 5: forward and backward register liveness.
//!
//! Both are monotone worklist fixpoints over per-instruction 64-bit masks.
//! Call-shaped edges mask the propagated set according to the O32 convention
//! and, for externs, the declared wrapper signature; an extra "skip" edge
//! across each call keeps callee-saved liveness flowing in the caller.

use mrc_isa::{Gpr, LivenessClass, Op, RegMask};

use crate::externs::find_extern;
use crate::{Analysis, AnalysisError, Result};

fn entry_mask_forward() -> RegMask {
    RegMask::REACHED
        | RegMask::of(Gpr::V0)
        | RegMask::of(Gpr::A0)
        | RegMask::of(Gpr::A1)
        | RegMask::of(Gpr::A2)
        | RegMask::of(Gpr::A3)
        | RegMask::of(Gpr::Sp)
        | RegMask::of(Gpr::Zero)
}

fn entry_mask_backward() -> RegMask {
    RegMask::REACHED
        | RegMask::of(Gpr::V0)
        | RegMask::of(Gpr::A0)
        | RegMask::of(Gpr::A1)
        | RegMask::of(Gpr::A2)
        | RegMask::of(Gpr::A3)
        | RegMask::of(Gpr::Sp)
}

impl Analysis {
    /// The extern callee for the call edge hanging off instruction `jal_i`.
    fn extern_for_call(&self, jal_i: usize) -> Result<&'static crate::externs::ExternFunction> {
        let target = self.insns[jal_i].jump_dest();
        let name = self
            .symbol_name(target)
            .ok_or(AnalysisError::UnnamedExternTarget {
                vram: self.insns[jal_i].instr.vram,
            })?;
        find_extern(name).ok_or_else(|| AnalysisError::UnknownExtern {
            name: name.to_string(),
        })
    }

    /// Pass 4: propagate live-in masks forward from `main` and every
    /// function-pointer target.
    pub fn forward_liveness(&mut self) -> Result<()> {
        let livein_func_start = RegMask::REACHED
            | RegMask::of(Gpr::Zero)
            | RegMask::of(Gpr::Sp)
            | RegMask::of(Gpr::A0)
            | RegMask::of(Gpr::A1);
        // qsort-like callbacks may take up to four arguments.
        let livein_fn_pointer =
            livein_func_start | RegMask::of(Gpr::A2) | RegMask::of(Gpr::A3);

        let mut q: Vec<usize> = Vec::new();

        let main_i = self
            .index_of(self.binary.main_addr)
            .ok_or(AnalysisError::MissingMain)?;
        self.insns[main_i].f_livein = livein_func_start;
        q.push(main_i);

        let mut seeds: Vec<u32> = self.data_function_pointers.iter().map(|&(_, t)| t).collect();
        seeds.extend(self.li_function_pointers.iter().copied());
        for addr in seeds {
            if let Some(i) = self.index_of(addr) {
                self.insns[i].f_livein = self.insns[i].f_livein | livein_fn_pointer;
                q.push(i);
            }
        }

        while let Some(i) = q.pop() {
            let insn = &self.insns[i];
            let mut live = insn.f_livein | RegMask::REACHED;

            match insn.op().liveness_class() {
                LivenessClass::OneDst => {
                    live |= insn.instr.dest_mask();
                }
                LivenessClass::DstSrc => {
                    if live.intersects(insn.single_source_mask()) {
                        live |= insn.instr.dest_mask();
                    }
                }
                LivenessClass::DstTwoSrc => {
                    if live.contains_all(insn.instr.all_source_mask()) {
                        live |= insn.instr.dest_mask();
                    }
                }
                LivenessClass::DivMult => {
                    if live.contains_all(insn.instr.all_source_mask()) {
                        live |= RegMask::HI | RegMask::LO;
                    }
                }
                _ => {}
            }

            if self.insns[i].f_liveout.contains_all(live) {
                continue;
            }
            live |= self.insns[i].f_liveout;
            self.insns[i].f_liveout = live;

            let successors = self.insns[i].successors.clone();
            let mut crosses_entry = false;

            for e in &successors {
                let mut new_live = live;
                if e.function_exit {
                    new_live = new_live
                        & (RegMask::REACHED
                            | RegMask::of(Gpr::V0)
                            | RegMask::of(Gpr::V1)
                            | RegMask::of(Gpr::Zero));
                } else if e.function_entry {
                    new_live = new_live & entry_mask_forward();
                    crosses_entry = true;
                } else if e.extern_function {
                    // `i` is the delay slot; the jal sits right before it.
                    let f = self.extern_for_call(i - 1)?;
                    new_live = new_live & !RegMask::caller_saved();
                    new_live |= f.return_mask();
                } else if e.function_pointer {
                    new_live = new_live & !RegMask::caller_saved();
                    new_live |= RegMask::of(Gpr::V0) | RegMask::of(Gpr::V1);
                }

                if !self.insns[e.i].f_livein.contains_all(new_live) {
                    self.insns[e.i].f_livein |= new_live;
                    q.push(e.i);
                }
            }

            if crosses_entry && i + 1 < self.insns.len() {
                // Skip edge across the call: callee-saved registers stay
                // live in the caller's resume slot.
                let skip = live & !RegMask::caller_saved();
                if !self.insns[i + 1].f_livein.contains_all(skip) {
                    self.insns[i + 1].f_livein |= skip;
                    q.push(i + 1);
                }
            }
        }

        Ok(())
    }

    /// Pass 5: propagate live-out masks backward from every reachable
    /// function's returns.
    pub fn backward_liveness(&mut self) -> Result<()> {
        let mut q: Vec<usize> = Vec::new();

        let main_returns = self
            .functions
            .get(&self.binary.main_addr)
            .ok_or(AnalysisError::MissingMain)?
            .returns
            .clone();
        for addr in main_returns {
            if let Some(i) = self.index_of(addr) {
                self.insns[i].b_liveout = RegMask::REACHED | RegMask::of(Gpr::V0);
                q.push(i);
            }
        }

        // Functions called through pointers may also return a second word.
        let pointer_ret = RegMask::REACHED | RegMask::of(Gpr::V0) | RegMask::of(Gpr::V1);
        let mut seeds: Vec<u32> = self.data_function_pointers.iter().map(|&(_, t)| t).collect();
        seeds.extend(self.li_function_pointers.iter().copied());
        for addr in seeds {
            let Some(f) = self.functions.get(&addr) else {
                continue;
            };
            for ret in f.returns.clone() {
                if let Some(i) = self.index_of(ret) {
                    self.insns[i].b_liveout |= pointer_ret;
                    q.push(i);
                }
            }
        }

        // Regions reachable only through indirect entries still need masks.
        for i in 0..self.insns.len() {
            if !self.insns[i].f_livein.is_empty() {
                q.push(i);
            }
        }

        while let Some(i) = q.pop() {
            let insn = &self.insns[i];
            let mut live = insn.b_liveout | RegMask::REACHED;

            match insn.op().liveness_class() {
                LivenessClass::OneSrc | LivenessClass::OneSrcPos1 => {
                    live |= insn.single_source_mask();
                }
                LivenessClass::TwoSrc => {
                    live |= insn.instr.all_source_mask();
                }
                LivenessClass::OneDst => {
                    live = live & !insn.instr.dest_mask();
                }
                LivenessClass::DstSrc => {
                    if live.intersects(insn.instr.dest_mask()) {
                        live = live & !insn.instr.dest_mask();
                        live |= insn.single_source_mask();
                    }
                }
                LivenessClass::DstTwoSrc => {
                    if live.intersects(insn.instr.dest_mask()) {
                        live = live & !insn.instr.dest_mask();
                        live |= insn.instr.all_source_mask();
                    }
                }
                LivenessClass::DivMult => {
                    let used = live.intersects(RegMask::HI | RegMask::LO);
                    live = live & !(RegMask::HI | RegMask::LO);
                    if used {
                        live |= insn.instr.all_source_mask();
                    }
                }
                LivenessClass::Nop => {}
            }

            if self.insns[i].b_livein.contains_all(live) {
                continue;
            }
            live |= self.insns[i].b_livein;
            self.insns[i].b_livein = live;

            let predecessors = self.insns[i].predecessors.clone();
            let mut crosses_exit = false;

            for e in &predecessors {
                let mut new_live = live;
                if e.function_exit {
                    new_live = new_live
                        & (RegMask::REACHED | RegMask::of(Gpr::V0) | RegMask::of(Gpr::V1));
                    crosses_exit = true;
                } else if e.function_entry {
                    new_live = new_live & entry_mask_backward();
                } else if e.extern_function {
                    // `i` is the caller's resume slot; the jal sits two back.
                    let f = self.extern_for_call(i - 2)?;
                    new_live = new_live & !RegMask::caller_saved();
                    new_live |= f.arg_mask();
                } else if e.function_pointer {
                    new_live = new_live & !RegMask::caller_saved();
                    new_live |= RegMask::of(Gpr::A0)
                        | RegMask::of(Gpr::A1)
                        | RegMask::of(Gpr::A2)
                        | RegMask::of(Gpr::A3);
                }

                if !self.insns[e.i].b_liveout.contains_all(new_live) {
                    self.insns[e.i].b_liveout |= new_live;
                    q.push(e.i);
                }
            }

            if crosses_exit {
                // Mirror of the forward skip edge, into the call's delay
                // slot.
                let skip = live & !RegMask::caller_saved();
                if i >= 1 && !self.insns[i - 1].b_liveout.contains_all(skip) {
                    self.insns[i - 1].b_liveout |= skip;
                    q.push(i - 1);
                }
            }
        }

        Ok(())
    }
}
