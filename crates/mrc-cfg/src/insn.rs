//! Per-instruction analysis record and CFG edges.

use mrc_isa::{decode, Gpr, Instr, Op, RegMask};

/// Directed CFG edge. The flags are set by the graph builder and steer the
/// edge masking in the liveness passes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Edge {
    /// Index of the other endpoint in the instruction vector.
    pub i: usize,
    /// Caller delay slot to callee entry.
    pub function_entry: bool,
    /// Callee return slot to the caller's resume slot.
    pub function_exit: bool,
    /// Call whose target lies outside the analyzed text.
    pub extern_function: bool,
    /// Unresolved indirect call.
    pub function_pointer: bool,
}

/// One analyzed `.text` word: the decoded instruction plus everything the
/// passes annotate onto it.
#[derive(Clone, Debug)]
pub struct Insn {
    pub instr: Instr,

    /// Idiom rewrites replace `op` and set this; the raw word stays intact.
    pub patched: bool,
    /// Replacement immediate/target when `patched` is set.
    pub patched_addr: u32,
    /// Partner instruction of a recovered idiom (HI<->LO, jalr<->loader).
    pub linked_insn: Option<usize>,
    /// Materialized 32-bit address or float bit pattern of the idiom.
    pub linked_value: u32,
    /// The load reads a global GOT slot.
    pub is_global_got_memop: bool,

    /// Jump-table collateral, populated on the realizing `jr` only.
    pub jtbl_addr: u32,
    pub num_cases: u32,
    pub index_reg: Gpr,

    /// The fall-through edge out of this instruction is suppressed
    /// (delay-slot sentinel).
    pub no_following_successor: bool,
    pub successors: Vec<Edge>,
    pub predecessors: Vec<Edge>,

    pub f_livein: RegMask,
    pub f_liveout: RegMask,
    pub b_livein: RegMask,
    pub b_liveout: RegMask,
}

impl Insn {
    pub fn new(instr: Instr) -> Insn {
        Insn {
            instr,
            patched: false,
            patched_addr: 0,
            linked_insn: None,
            linked_value: 0,
            is_global_got_memop: false,
            jtbl_addr: 0,
            num_cases: 0,
            index_reg: Gpr::Zero,
            no_following_successor: false,
            successors: Vec::new(),
            predecessors: Vec::new(),
            f_livein: RegMask::EMPTY,
            f_liveout: RegMask::EMPTY,
            b_livein: RegMask::EMPTY,
            b_liveout: RegMask::EMPTY,
        }
    }

    /// Fresh record for a synthesized word, marked patched.
    pub fn synthetic(word: u32, vram: u32) -> Insn {
        let mut insn = Insn::new(decode(word, vram));
        insn.patched = true;
        insn
    }

    #[inline]
    pub fn op(&self) -> Op {
        self.instr.op
    }

    /// Install a rewritten opcode with its materialized address.
    pub fn patch(&mut self, op: Op, addr: u32) {
        self.patched = true;
        self.patched_addr = addr;
        self.instr.op = op;
    }

    pub fn patch_nop(&mut self) {
        self.patch(Op::Nop, 0);
    }

    /// Branch target honoring a patch.
    pub fn branch_dest(&self) -> u32 {
        if self.patched {
            self.patched_addr
        } else {
            self.instr.branch_target()
        }
    }

    /// J-type target honoring a patch.
    pub fn jump_dest(&self) -> u32 {
        if self.patched {
            self.patched_addr
        } else {
            self.instr.jump_target()
        }
    }

    /// Signed memory displacement honoring a patch (fused accesses carry 0).
    pub fn mem_offset(&self) -> i32 {
        if self.patched {
            self.patched_addr as i32
        } else {
            self.instr.simm()
        }
    }

    /// The single-source mask, with the jump-table `jr` reading its
    /// recovered index register.
    pub fn single_source_mask(&self) -> RegMask {
        if self.op() == Op::Jr && self.jtbl_addr != 0 {
            RegMask::of(self.index_reg)
        } else {
            self.instr.single_source_mask()
        }
    }
}
