//! Translation-unit scaffolding: data images, the indirect-call trampoline
//! and the `run` entry that boots the recompiled program.

use std::io::Write;

use mrc_elf::Section;

use crate::emitter::Emitter;
use crate::{EmitError, Result};

/// The emitted program pads its mapped range to this; the target binaries
/// assume 4 KiB pages.
const PAGE_SIZE: u32 = 0x1000;
const STACK_SIZE: u32 = 1024 * 1024;

/// Big-endian words of a section, zero-length when absent.
fn section_words(section: Option<&Section>) -> Vec<u32> {
    let Some(section) = section else {
        return Vec::new();
    };
    (0..section.len() & !3)
        .step_by(4)
        .map(|off| section.word_at(section.vaddr + off))
        .collect()
}

impl<W: Write> Emitter<'_, W> {
    pub(crate) fn emit_prelude(&mut self) -> Result<()> {
        writeln!(self.out, "#include \"header.h\"")?;
        if self.options.conservative {
            writeln!(
                self.out,
                "static uint32_t s0, s1, s2, s3, s4, s5, s6, s7, fp;"
            )?;
        }

        self.emit_word_array("rodata", self.analysis.binary.rodata.as_ref())?;
        self.emit_word_array("data", self.analysis.binary.data.as_ref())?;

        if self.options.trace {
            writeln!(self.out, "static unsigned long long int cnt = 0;")?;
        }
        Ok(())
    }

    fn emit_word_array(&mut self, name: &str, section: Option<&Section>) -> Result<()> {
        writeln!(self.out, "static const uint32_t {name}[] = {{")?;
        for (n, word) in section_words(section).into_iter().enumerate() {
            write!(self.out, "0x{word:x},")?;
            if n % 8 == 7 {
                writeln!(self.out)?;
            }
        }
        writeln!(self.out, "}};")?;
        Ok(())
    }

    pub(crate) fn emit_trampoline(&mut self) -> Result<()> {
        if self.analysis.data_function_pointers.is_empty()
            && self.analysis.li_function_pointers.is_empty()
        {
            return Ok(());
        }

        writeln!(
            self.out,
            "uint64_t trampoline(uint8_t *mem, uint32_t sp, uint32_t a0, uint32_t a1, uint32_t a2, uint32_t a3, uint32_t fp_dest) {{"
        )?;
        writeln!(self.out, "switch (fp_dest) {{")?;

        let cases: Vec<(u32, u32, u32)> = self
            .analysis
            .functions
            .iter()
            .filter(|(_, f)| f.referenced_by_function_pointer)
            .map(|(&addr, f)| (addr, f.nret, f.nargs))
            .collect();
        for (addr, nret, nargs) in cases {
            write!(self.out, "case 0x{addr:x}: ")?;
            match nret {
                1 => write!(self.out, "return (uint64_t)")?,
                2 => write!(self.out, "return ")?,
                _ => {}
            }
            write!(self.out, "{}(mem, sp", self.function_c_name(addr))?;
            for n in 0..nargs {
                write!(self.out, ", a{n}")?;
            }
            write!(self.out, ")")?;
            if nret == 1 {
                write!(self.out, " << 32")?;
            }
            write!(self.out, ";")?;
            if nret == 0 {
                write!(self.out, " return 0;")?;
            }
            writeln!(self.out)?;
        }

        writeln!(self.out, "default: abort();")?;
        writeln!(self.out, "}}")?;
        writeln!(self.out, "}}")?;
        Ok(())
    }

    fn data_symbol(&self, name: &'static str) -> Result<u32> {
        self.analysis
            .binary
            .symbol_names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(&addr, _)| addr)
            .ok_or(EmitError::MissingSymbol(name))
    }

    pub(crate) fn emit_run(&mut self) -> Result<()> {
        let binary = &self.analysis.binary;

        let mut min_addr = u32::MAX;
        let mut max_addr = 0u32;
        for section in [binary.rodata.as_ref(), binary.data.as_ref()]
            .into_iter()
            .flatten()
        {
            if !section.is_empty() {
                min_addr = min_addr.min(section.vaddr);
                max_addr = max_addr.max(section.vaddr + section.len());
            }
        }
        if binary.bss_len > 0 {
            min_addr = min_addr.min(binary.bss_vaddr);
            max_addr = max_addr.max(binary.bss_vaddr + binary.bss_len);
        }
        if max_addr == 0 {
            // Nothing mapped; park the stack somewhere sane.
            min_addr = 0x1000_0000;
            max_addr = 0x1000_0000;
        }
        min_addr &= !(PAGE_SIZE - 1);
        max_addr = (max_addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);

        let mut stack_bottom = min_addr;
        min_addr -= STACK_SIZE;
        stack_bottom -= 16; // room for main's frame

        let argc_addr = self.data_symbol("__Argc")?;
        let argv_addr = self.data_symbol("__Argv")?;

        writeln!(self.out, "int run(uint8_t *mem, int argc, char *argv[]) {{")?;
        writeln!(
            self.out,
            "mmap_initial_data_range(mem, 0x{min_addr:x}, 0x{max_addr:x});"
        )?;
        if let Some(rodata) = &binary.rodata {
            writeln!(
                self.out,
                "memcpy(mem + 0x{:x}, rodata, 0x{:x});",
                rodata.vaddr,
                rodata.len()
            )?;
        }
        if let Some(data) = &binary.data {
            writeln!(
                self.out,
                "memcpy(mem + 0x{:x}, data, 0x{:x});",
                data.vaddr,
                data.len()
            )?;
        }

        writeln!(self.out, "MEM_S32(0x{argc_addr:x}) = argc;")?;
        writeln!(self.out, "MEM_S32(0x{stack_bottom:x}) = argc;")?;
        writeln!(
            self.out,
            "uint32_t al = argc * 4; for (int i = 0; i < argc; i++) al += strlen(argv[i]) + 1;"
        )?;
        writeln!(self.out, "uint32_t arg_addr = wrapper_malloc(mem, al);")?;
        writeln!(self.out, "MEM_U32(0x{argv_addr:x}) = arg_addr;")?;
        writeln!(self.out, "MEM_U32(0x{:x}) = arg_addr;", stack_bottom + 4)?;
        writeln!(self.out, "uint32_t arg_strpos = arg_addr + argc * 4;")?;
        writeln!(
            self.out,
            "for (int i = 0; i < argc; i++) {{MEM_U32(arg_addr + i * 4) = arg_strpos; uint32_t p = 0; do {{ MEM_S8(arg_strpos) = argv[i][p]; ++arg_strpos; }} while (argv[i][p++] != '\\0');}}"
        )?;
        writeln!(self.out, "setup_libc_data(mem);")?;

        let main_addr = binary.main_addr;
        let main_nargs = self
            .analysis
            .functions
            .get(&main_addr)
            .map(|f| f.nargs)
            .unwrap_or(0);
        write!(
            self.out,
            "int ret = {}(mem, 0x{stack_bottom:x}",
            self.function_c_name(main_addr)
        )?;
        if main_nargs >= 1 {
            write!(self.out, ", argc")?;
        }
        if main_nargs >= 2 {
            write!(self.out, ", arg_addr")?;
        }
        writeln!(self.out, ");")?;

        if self.options.trace {
            writeln!(self.out, "fprintf(stderr, \"cnt: %llu\\n\", cnt);")?;
        }
        writeln!(self.out, "return ret;")?;
        writeln!(self.out, "}}")?;
        Ok(())
    }
}
