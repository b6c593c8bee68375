//! Pass 6: signature inference from the liveness fixpoints.

use mrc_isa::{Gpr, RegMask};

use crate::Analysis;

impl Analysis {
    /// Intersect forward and backward liveness at entries and returns to
    /// derive `nargs`, `nret` and `v0_in` per function.
    pub fn infer_signatures(&mut self) {
        let entries: Vec<u32> = self.functions.keys().copied().collect();
        for addr in entries {
            let returns = self.functions[&addr].returns.clone();

            let mut nret = 0u32;
            for ret in returns {
                let Some(i) = self.index_of(ret) else { continue };
                let live = self.insns[i].f_liveout & self.insns[i].b_liveout;
                if live.contains(Gpr::V1) {
                    nret = 2;
                } else if live.contains(Gpr::V0) && nret == 0 {
                    nret = 1;
                }
            }

            let Some(entry_i) = self.index_of(addr) else {
                continue;
            };
            let live_in = self.insns[entry_i].f_livein & self.insns[entry_i].b_livein;

            let mut nargs = 0u32;
            for n in 0..4 {
                if live_in.intersects(RegMask::arg(n)) {
                    nargs = n as u32 + 1;
                }
            }

            let f = self.functions.get_mut(&addr).unwrap();
            f.nret = nret;
            f.nargs = nargs;
            // A live-in $v0 only becomes part of the signature when the
            // function is never pointer-addressed; the common caller surface
            // must not grow a v0 slot.
            f.v0_in = live_in.contains(Gpr::V0) && !f.referenced_by_function_pointer;
        }
    }
}
