//! The analysis context: one object owning the instruction vector and every
//! table the passes share.

use std::collections::{BTreeMap, BTreeSet};

use mrc_elf::Binary;
use tracing::debug;

use crate::{AnalysisOptions, Insn, Result};

/// A discovered function, keyed by its entry VA in [`Analysis::functions`].
#[derive(Clone, Debug, Default)]
pub struct Function {
    /// VAs of the instruction after each `jr $ra` (the slot reached on
    /// return).
    pub returns: Vec<u32>,
    /// Exclusive end address.
    pub end_addr: u32,
    pub nargs: u32,
    pub nret: u32,
    /// Reads `$v0` on entry.
    pub v0_in: bool,
    pub referenced_by_function_pointer: bool,
}

/// Analysis state for one executable.
pub struct Analysis {
    pub binary: Binary,
    pub options: AnalysisOptions,

    /// One record per `.text` word, plus the trailing guard NOP.
    pub insns: Vec<Insn>,
    /// Every branch/jump target, jump-table entry and function entry.
    pub label_addresses: BTreeSet<u32>,
    pub functions: BTreeMap<u32, Function>,
    /// (location in data/rodata, text target) pairs found by the harvester.
    pub data_function_pointers: Vec<(u32, u32)>,
    /// Text addresses materialized via rewritten GOT loads.
    pub li_function_pointers: BTreeSet<u32>,
}

impl Analysis {
    /// Wrap a parsed binary; function entries and labels known from the
    /// symbol/GOT tables are seeded here.
    pub fn new(binary: Binary, options: AnalysisOptions) -> Analysis {
        let mut analysis = Analysis {
            insns: Vec::new(),
            label_addresses: binary.got_labels.iter().copied().collect(),
            functions: BTreeMap::new(),
            data_function_pointers: Vec::new(),
            li_function_pointers: BTreeSet::new(),
            binary,
            options,
        };
        for addr in analysis.binary.text_functions.clone() {
            analysis.add_function(addr);
        }
        analysis
    }

    /// Instruction index for a text VA, when in range and aligned.
    pub fn index_of(&self, addr: u32) -> Option<usize> {
        if self.binary.text_range().contains(&addr) && addr % 4 == 0 {
            Some(((addr - self.binary.text_vaddr) / 4) as usize)
        } else {
            None
        }
    }

    /// VA of instruction `i`.
    pub fn addr_of(&self, i: usize) -> u32 {
        self.binary.text_vaddr + (i as u32) * 4
    }

    /// Register `addr` as a function entry if it lies in `.text`.
    pub fn add_function(&mut self, addr: u32) {
        if self.binary.text_range().contains(&addr) {
            self.functions.entry(addr).or_default();
        }
    }

    /// Owning function: largest entry at or below `addr`.
    pub fn find_function(&self, addr: u32) -> Option<(u32, &Function)> {
        self.functions
            .range(..=addr)
            .next_back()
            .map(|(&entry, f)| (entry, f))
    }

    pub fn symbol_name(&self, addr: u32) -> Option<&str> {
        self.binary.symbol_names.get(&addr).map(String::as_str)
    }

    /// Run the whole pipeline in pass order.
    pub fn run(&mut self) -> Result<()> {
        self.disassemble();
        self.harvest_pointers();
        self.rewrite_idioms()?;
        self.finalize_functions()?;
        self.build_graph()?;
        self.forward_liveness()?;
        self.backward_liveness()?;
        self.infer_signatures();
        debug!(
            insns = self.insns.len(),
            functions = self.functions.len(),
            labels = self.label_addresses.len(),
            "analysis complete"
        );
        Ok(())
    }
}
