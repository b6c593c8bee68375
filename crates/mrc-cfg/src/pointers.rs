//! Function-pointer harvesting over `.rodata` and `.data`.

use tracing::debug;

use crate::Analysis;

impl Analysis {
    /// Scan the data sections for words that plausibly point into `.text`.
    ///
    /// A word is accepted iff it lies in the text range and is 4-aligned;
    /// the deny list and the `_procedure_table` region (a linking table of
    /// all functions in the 5.3 assembler) suppress known false positives.
    pub fn harvest_pointers(&mut self) {
        let text_range = self.binary.text_range();
        let proc_start = self.binary.procedure_table_start;
        let proc_end = proc_start.wrapping_add(self.binary.procedure_table_len);

        let mut found = Vec::new();
        for section in [self.binary.rodata.as_ref(), self.binary.data.as_ref()]
            .into_iter()
            .flatten()
        {
            let len = section.len() & !3;
            for off in (0..len).step_by(4) {
                let site = section.vaddr + off;
                let addr = section.word_at(site);

                if self.options.pointer_deny_list.contains(&addr) {
                    continue;
                }
                if proc_start != 0 && site >= proc_start && site < proc_end {
                    continue;
                }
                if text_range.contains(&addr) && addr % 4 == 0 {
                    found.push((site, addr));
                }
            }
        }

        for (site, addr) in found {
            debug!(addr = format_args!("0x{addr:08x}"), at = format_args!("0x{site:08x}"),
                "assuming function pointer");
            self.data_function_pointers.push((site, addr));
            self.label_addresses.insert(addr);
            self.functions
                .entry(addr)
                .or_default()
                .referenced_by_function_pointer = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::fixtures::{binary_with_text, section};
    use crate::{Analysis, AnalysisOptions};

    #[test]
    fn test_harvest_accepts_aligned_text_words() {
        let mut binary = binary_with_text(&[0, 0, 0, 0]);
        // One valid pointer, one unaligned, one outside text.
        binary.data = Some(section(
            0x0041_0000,
            &[0x0040_0008, 0x0040_0003, 0x0050_0000],
        ));
        let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
        analysis.disassemble();
        analysis.harvest_pointers();

        assert_eq!(analysis.data_function_pointers, vec![(0x0041_0000, 0x0040_0008)]);
        assert!(analysis.label_addresses.contains(&0x0040_0008));
        assert!(
            analysis.functions[&0x0040_0008].referenced_by_function_pointer
        );
    }

    #[test]
    fn test_harvest_deny_list() {
        let mut binary = binary_with_text(&[0; 0x40]);
        // 0x430b00 would land in text if text were that large; use the
        // default deny list with a text range that contains it.
        binary.text_vaddr = 0x0043_0000;
        binary.text = vec![0; 0x4000];
        binary.data = Some(section(0x0050_0000, &[0x0043_0b00, 0x0043_0b04]));

        let mut analysis = Analysis::new(binary, AnalysisOptions::default());
        analysis.disassemble();
        analysis.harvest_pointers();

        assert_eq!(
            analysis.data_function_pointers,
            vec![(0x0050_0004, 0x0043_0b04)]
        );
    }

    #[test]
    fn test_harvest_skips_procedure_table() {
        let mut binary = binary_with_text(&[0, 0]);
        binary.data = Some(section(0x0041_0000, &[0x0040_0000, 0x0040_0004]));
        binary.procedure_table_start = 0x0041_0000;
        binary.procedure_table_len = 4;

        let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
        analysis.disassemble();
        analysis.harvest_pointers();

        assert_eq!(
            analysis.data_function_pointers,
            vec![(0x0041_0004, 0x0040_0004)]
        );
    }
}
