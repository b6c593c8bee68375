//! Pass 3: control-flow edges with delay-slot semantics.
//!
//! Every branch contributes two edges, one into the delay slot and one from
//! the delay slot onward, so the dataflow passes treat the slot as executed
//! on the way to the target. Delay slots are flagged `no_following_successor`;
//! their fall-through edge, where one exists, is added here explicitly.

use mrc_isa::Op;

use crate::{Analysis, AnalysisError, Edge, Result};

#[derive(Clone, Copy, Default)]
struct EdgeKind {
    function_entry: bool,
    function_exit: bool,
    extern_function: bool,
    function_pointer: bool,
}

impl EdgeKind {
    const PLAIN: EdgeKind = EdgeKind {
        function_entry: false,
        function_exit: false,
        extern_function: false,
        function_pointer: false,
    };
}

impl Analysis {
    /// Build forward and backward edge lists over the instruction vector.
    pub fn build_graph(&mut self) -> Result<()> {
        for i in 0..self.insns.len() {
            if self.insns[i].no_following_successor {
                continue;
            }

            let op = self.insns[i].op();
            match op {
                _ if op.is_cond_branch() => {
                    let target = self.target_index(i)?;
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    self.add_edge(i + 1, target, EdgeKind::PLAIN);
                    self.add_edge(i + 1, i + 2, EdgeKind::PLAIN);
                    self.insns[i + 1].no_following_successor = true;
                }
                _ if op.is_branch_likely() => {
                    // The delay slot executes on the taken path only.
                    let target = self.target_index(i)?;
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    self.add_edge(i, i + 2, EdgeKind::PLAIN);
                    self.add_edge(i + 1, target, EdgeKind::PLAIN);
                    self.insns[i + 1].no_following_successor = true;
                }
                Op::B | Op::J => {
                    let target = self.target_index(i)?;
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    self.add_edge(i + 1, target, EdgeKind::PLAIN);
                    self.insns[i + 1].no_following_successor = true;
                }
                Op::Jr => {
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    if self.insns[i].jtbl_addr != 0 {
                        let jtbl_addr = self.insns[i].jtbl_addr;
                        let num_cases = self.insns[i].num_cases;
                        for case in 0..num_cases {
                            let rodata = self.binary.rodata.as_ref().unwrap();
                            let dest = rodata
                                .word_at(jtbl_addr + case * 4)
                                .wrapping_add(self.binary.gp_value);
                            let target =
                                self.index_of(dest).ok_or(AnalysisError::TargetOutOfText {
                                    vram: self.insns[i].instr.vram,
                                    target: dest,
                                })?;
                            self.add_edge(i + 1, target, EdgeKind::PLAIN);
                        }
                    } else if self.insns[i].instr.rs != mrc_isa::Gpr::Ra {
                        return Err(AnalysisError::UnsupportedRegisterJump {
                            vram: self.insns[i].instr.vram,
                        });
                    }
                    // Return edges are added at the call sites.
                    self.insns[i + 1].no_following_successor = true;
                }
                Op::Jal => {
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    let dest = self.insns[i].jump_dest();

                    let internal = dest > self.binary.mcount_addr
                        && self.binary.text_range().contains(&dest);
                    if internal {
                        let target = self.index_of(dest).unwrap();
                        self.add_edge(
                            i + 1,
                            target,
                            EdgeKind {
                                function_entry: true,
                                ..EdgeKind::PLAIN
                            },
                        );
                        let returns = self
                            .functions
                            .get(&dest)
                            .ok_or(AnalysisError::UnknownCallee {
                                vram: self.insns[i].instr.vram,
                                target: dest,
                            })?
                            .returns
                            .clone();
                        for ret in returns {
                            let ret_i =
                                self.index_of(ret).ok_or(AnalysisError::TargetOutOfText {
                                    vram: self.insns[i].instr.vram,
                                    target: ret,
                                })?;
                            self.add_edge(
                                ret_i,
                                i + 2,
                                EdgeKind {
                                    function_exit: true,
                                    ..EdgeKind::PLAIN
                                },
                            );
                        }
                    } else {
                        self.add_edge(
                            i + 1,
                            i + 2,
                            EdgeKind {
                                extern_function: true,
                                ..EdgeKind::PLAIN
                            },
                        );
                    }
                    self.insns[i + 1].no_following_successor = true;
                }
                Op::Jalr => {
                    // Unresolved indirect call through the trampoline.
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                    self.add_edge(
                        i + 1,
                        i + 2,
                        EdgeKind {
                            function_pointer: true,
                            ..EdgeKind::PLAIN
                        },
                    );
                    self.insns[i + 1].no_following_successor = true;
                }
                _ => {
                    self.add_edge(i, i + 1, EdgeKind::PLAIN);
                }
            }
        }
        Ok(())
    }

    fn target_index(&self, i: usize) -> Result<usize> {
        let insn = &self.insns[i];
        let dest = match insn.op() {
            Op::J => insn.jump_dest(),
            _ => insn.branch_dest(),
        };
        self.index_of(dest).ok_or(AnalysisError::TargetOutOfText {
            vram: insn.instr.vram,
            target: dest,
        })
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        if from >= self.insns.len() || to >= self.insns.len() {
            return;
        }
        let forward = Edge {
            i: to,
            function_entry: kind.function_entry,
            function_exit: kind.function_exit,
            extern_function: kind.extern_function,
            function_pointer: kind.function_pointer,
        };
        let backward = Edge { i: from, ..forward };
        self.insns[from].successors.push(forward);
        self.insns[to].predecessors.push(backward);
    }
}
