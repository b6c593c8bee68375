//! Binary-specific analysis knobs.

use rustc_hash::{FxHashMap, FxHashSet};

/// Parameterized quirks of the supported binaries.
///
/// The defaults reproduce the contract for the IDO 5.3/7.1 tool binaries:
/// a small deny list of data words that look like text pointers but are not,
/// and two `copt` switch statements whose bounding `sltiu` sits in another
/// basic block and thus evades the pattern matcher.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    /// Data words never treated as function pointers.
    pub pointer_deny_list: FxHashSet<u32>,
    /// Instruction index of a `jr` -> case count, for jump tables the
    /// matcher cannot bound on its own.
    pub forced_jump_tables: FxHashMap<usize, u32>,
    /// Instruction index of a `jr` -> widened backward search window for the
    /// bounding `sltiu`.
    pub extended_sltiu_search: FxHashMap<usize, usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        // In as1 the first two words are ordinary integers; the third is in
        // copt.
        let pointer_deny_list = [0x0043_0b00, 0x0043_3b00, 0x004a_0000]
            .into_iter()
            .collect();
        let forced_jump_tables = [(219_382usize, 13u32), (370_995usize, 12u32)]
            .into_iter()
            .collect();
        let extended_sltiu_search = [(368_393usize, 18usize)].into_iter().collect();
        AnalysisOptions {
            pointer_deny_list,
            forced_jump_tables,
            extended_sltiu_search,
        }
    }
}

impl AnalysisOptions {
    /// Options with every binary-specific quirk disabled.
    pub fn clean() -> Self {
        AnalysisOptions {
            pointer_deny_list: FxHashSet::default(),
            forced_jump_tables: FxHashMap::default(),
            extended_sltiu_search: FxHashMap::default(),
        }
    }
}
