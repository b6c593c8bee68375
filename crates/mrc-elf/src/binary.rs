//! ELF image parsing.

use std::collections::BTreeMap;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};

use crate::constants::*;
use crate::{ElfError, Result};

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .ok_or(ElfError::Truncated(offset))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(BigEndian::read_u32)
        .ok_or(ElfError::Truncated(offset))
}

fn read_str(data: &[u8], offset: usize) -> &str {
    let tail = match data.get(offset..) {
        Some(t) => t,
        None => return "",
    };
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end]).unwrap_or("")
}

/// A loaded allocatable section.
#[derive(Clone, Debug)]
pub struct Section {
    pub vaddr: u32,
    pub data: Vec<u8>,
}

impl Section {
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn range(&self) -> Range<u32> {
        self.vaddr..self.vaddr + self.len()
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.range().contains(&addr)
    }

    /// Big-endian word at virtual address `addr`; `addr` must be in range.
    pub fn word_at(&self, addr: u32) -> u32 {
        let off = (addr - self.vaddr) as usize;
        BigEndian::read_u32(&self.data[off..off + 4])
    }
}

#[derive(Clone, Copy, Debug)]
struct SectionHeader {
    name: u32,
    sh_type: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
}

/// Parsed image: sections, GOT layout, and the symbol collateral the
/// analysis passes consume.
#[derive(Clone, Debug, Default)]
pub struct Binary {
    pub text_vaddr: u32,
    pub text: Vec<u8>,
    pub rodata: Option<Section>,
    pub data: Option<Section>,
    pub bss_vaddr: u32,
    pub bss_len: u32,

    /// `$gp` through the program run, from `.reginfo`.
    pub gp_value: u32,
    /// `gp_value - got_start`; added to a `$gp` displacement it yields a GOT
    /// byte offset.
    pub gp_value_adj: u32,
    pub got_locals: Vec<u32>,
    pub got_globals: Vec<u32>,

    pub symbol_names: BTreeMap<u32, String>,
    /// `STT_FUNC` symbols in `SHN_MIPS_TEXT`.
    pub text_functions: Vec<u32>,
    /// Addresses of text function symbols reachable through the global GOT.
    pub got_labels: Vec<u32>,

    pub main_addr: u32,
    pub mcount_addr: u32,
    pub procedure_table_start: u32,
    pub procedure_table_len: u32,
}

impl Binary {
    pub fn text_len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn text_range(&self) -> Range<u32> {
        self.text_vaddr..self.text_vaddr + self.text_len()
    }

    /// Parse a big-endian MIPS ELF executable.
    pub fn parse(data: &[u8]) -> Result<Binary> {
        if data.len() < 4 || data[0..4] != ELF_MAGIC {
            return Err(ElfError::NotElf);
        }
        if data.len() < EHDR_SIZE {
            return Err(ElfError::Truncated(data.len()));
        }
        if data[5] != ELF_DATA_MSB || read_u16(data, 18)? != EM_MIPS {
            return Err(ElfError::NotBigEndianMips);
        }

        let shoff = read_u32(data, 32)? as usize;
        let shentsize = read_u16(data, 46)? as usize;
        let shnum = read_u16(data, 48)? as usize;
        let shstrndx = read_u16(data, 50)? as usize;
        if shstrndx == 0 {
            // We could look at program headers instead in this case.
            return Err(ElfError::Stripped);
        }

        let section = |index: usize| -> Result<SectionHeader> {
            let base = shoff + index * shentsize;
            Ok(SectionHeader {
                name: read_u32(data, base)?,
                sh_type: read_u32(data, base + 4)?,
                addr: read_u32(data, base + 12)?,
                offset: read_u32(data, base + 16)?,
                size: read_u32(data, base + 20)?,
                link: read_u32(data, base + 24)?,
            })
        };

        let str_shdr = section(shstrndx)?;
        let name_of =
            |shdr: &SectionHeader| read_str(data, str_shdr.offset as usize + shdr.name as usize);

        let mut text_index = None;
        let mut symtab_index = None;
        let mut dynsym_index = None;
        let mut reginfo_index = None;
        let mut dynamic_index = None;
        let mut got_index = None;
        let mut rodata_index = None;
        let mut data_index = None;
        let mut bss_index = None;

        for i in 0..shnum {
            let shdr = section(i)?;
            match name_of(&shdr) {
                ".text" => text_index = Some(i),
                ".got" => got_index = Some(i),
                ".rodata" => rodata_index = Some(i),
                ".data" => data_index = Some(i),
                ".bss" => bss_index = Some(i),
                _ => {}
            }
            match shdr.sh_type {
                SHT_SYMTAB => symtab_index = Some(i),
                SHT_DYNSYM => dynsym_index = Some(i),
                SHT_MIPS_REGINFO => reginfo_index = Some(i),
                SHT_DYNAMIC => dynamic_index = Some(i),
                _ => {}
            }
        }

        let text_index = text_index.ok_or(ElfError::MissingSection(".text"))?;
        if symtab_index.is_none() && dynsym_index.is_none() {
            return Err(ElfError::MissingSymbolTable);
        }
        if symtab_index.is_some() {
            return Err(ElfError::SymtabUnsupported);
        }
        let dynsym_index = dynsym_index.ok_or(ElfError::MissingSection(".dynsym"))?;
        let reginfo_index = reginfo_index.ok_or(ElfError::MissingSection(".reginfo"))?;
        let dynamic_index = dynamic_index.ok_or(ElfError::MissingSection(".dynamic"))?;
        let got_index = got_index.ok_or(ElfError::MissingSection(".got"))?;

        let load = |shdr: &SectionHeader| -> Result<Vec<u8>> {
            let start = shdr.offset as usize;
            let end = start + shdr.size as usize;
            data.get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or(ElfError::Truncated(start))
        };

        let mut binary = Binary::default();

        let text_shdr = section(text_index)?;
        binary.text_vaddr = text_shdr.addr;
        binary.text = load(&text_shdr)?;

        if let Some(i) = rodata_index {
            let shdr = section(i)?;
            binary.rodata = Some(Section {
                vaddr: shdr.addr,
                data: load(&shdr)?,
            });
        }
        if let Some(i) = data_index {
            let shdr = section(i)?;
            binary.data = Some(Section {
                vaddr: shdr.addr,
                data: load(&shdr)?,
            });
        }
        if let Some(i) = bss_index {
            let shdr = section(i)?;
            binary.bss_vaddr = shdr.addr;
            binary.bss_len = shdr.size;
        }

        binary.parse_dynamic(
            data,
            &section(dynsym_index)?,
            &section(section(dynsym_index)?.link as usize)?,
            &section(reginfo_index)?,
            &section(dynamic_index)?,
            &section(got_index)?,
        )?;

        Ok(binary)
    }

    fn parse_dynamic(
        &mut self,
        data: &[u8],
        dynsym: &SectionHeader,
        dynstr: &SectionHeader,
        reginfo: &SectionHeader,
        dynamic: &SectionHeader,
        got: &SectionHeader,
    ) -> Result<()> {
        let gp_base = read_u32(data, reginfo.offset as usize + REGINFO_GP_VALUE_OFFSET)?;

        let mut got_start = 0u32;
        let mut local_got_no = 0u32;
        let mut first_got_sym = 0u32;
        let mut dynsym_no = 0u32;

        for off in (0..dynamic.size as usize).step_by(DYN_SIZE) {
            let base = dynamic.offset as usize + off;
            let tag = read_u32(data, base)?;
            let value = read_u32(data, base + 4)?;
            match tag {
                DT_PLTGOT => got_start = value,
                DT_MIPS_LOCAL_GOTNO => local_got_no = value,
                DT_MIPS_GOTSYM => first_got_sym = value,
                DT_MIPS_SYMTABNO => dynsym_no = value,
                _ => {}
            }
        }

        if got_start == 0 {
            return Err(ElfError::MissingGotStart);
        }

        // Value to add to an asm gp offset: -32752($gp) refers to the first
        // GOT entry when this is 32752.
        let gp_adj = gp_base.wrapping_sub(got_start);
        if gp_adj >= 0x10000 {
            return Err(ElfError::GpAdjustTooLarge(gp_adj));
        }
        if dynsym_no < first_got_sym {
            return Err(ElfError::BadDynamic {
                dynsym_no,
                first_got_sym,
            });
        }

        self.gp_value = gp_base;
        self.gp_value_adj = gp_adj;
        self.got_globals = vec![0; (dynsym_no - first_got_sym) as usize];

        for i in 0..dynsym_no {
            let base = dynsym.offset as usize + i as usize * SYM_SIZE;
            let name_off = read_u32(data, base)?;
            let addr = read_u32(data, base + 4)?;
            let info = *data.get(base + 12).ok_or(ElfError::Truncated(base + 12))?;
            let shndx = read_u16(data, base + 14)?;
            let sym_type = info & 0xf;
            let name = read_str(data, dynstr.offset as usize + name_off as usize);

            if name == "_procedure_table" {
                self.procedure_table_start = addr;
            } else if name == "_procedure_table_size" {
                // Entries are 40 bytes; st_value holds the entry count.
                self.procedure_table_len = 40 * addr;
            }

            if shndx == SHN_MIPS_TEXT && sym_type == STT_FUNC {
                self.text_functions.push(addr);
                if name == "main" {
                    self.main_addr = addr;
                } else if name == "_mcount" {
                    self.mcount_addr = addr;
                }
                self.symbol_names.insert(addr, name.to_string());
            }

            if i >= first_got_sym {
                let idx = (i - first_got_sym) as usize;
                let got_word = read_u32(
                    data,
                    got.offset as usize + (local_got_no + i - first_got_sym) as usize * 4,
                )?;

                if shndx == SHN_MIPS_TEXT && sym_type == STT_FUNC {
                    // The symbol address rather than the GOT word, so that the
                    // 3-instruction gp preamble stays inside the callee.
                    self.got_globals[idx] = addr;
                    self.got_labels.push(addr);
                } else if sym_type == STT_OBJECT && (shndx == SHN_UNDEF || shndx == SHN_COMMON) {
                    // Defined externally, for example in libc.
                    self.got_globals[idx] = got_word;
                } else {
                    self.got_globals[idx] = addr;
                }
                self.symbol_names
                    .insert(self.got_globals[idx], name.to_string());
            }
        }

        self.got_locals = (0..local_got_no)
            .map(|i| read_u32(data, got.offset as usize + i as usize * 4))
            .collect::<Result<Vec<u32>>>()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assembles a minimal big-endian MIPS ELF with the sections the loader
    /// requires.
    struct ImageBuilder {
        sections: Vec<(String, u32, u32, u32, Vec<u8>)>, // name, type, addr, link, data
    }

    impl ImageBuilder {
        fn new() -> Self {
            Self {
                sections: vec![(String::new(), 0, 0, 0, Vec::new())],
            }
        }

        fn section(mut self, name: &str, sh_type: u32, addr: u32, link: u32, data: Vec<u8>) -> Self {
            self.sections.push((name.to_string(), sh_type, addr, link, data));
            self
        }

        fn build(self) -> Vec<u8> {
            let mut shstrtab = vec![0u8];
            let mut name_offsets = Vec::new();
            for (name, ..) in &self.sections {
                if name.is_empty() {
                    name_offsets.push(0u32);
                } else {
                    name_offsets.push(shstrtab.len() as u32);
                    shstrtab.extend_from_slice(name.as_bytes());
                    shstrtab.push(0);
                }
            }
            let shstrtab_name = shstrtab.len() as u32;
            shstrtab.extend_from_slice(b".shstrtab\0");

            let mut sections = self.sections;
            sections.push((".shstrtab".into(), 3, 0, 0, shstrtab));
            name_offsets.push(shstrtab_name);

            // Section data straight after the header, headers at the end.
            let mut image = vec![0u8; EHDR_SIZE];
            let mut offsets = Vec::new();
            for (_, _, _, _, data) in &sections {
                offsets.push(image.len() as u32);
                image.extend_from_slice(data);
            }
            while image.len() % 4 != 0 {
                image.push(0);
            }
            let shoff = image.len() as u32;
            for (i, (_, sh_type, addr, link, data)) in sections.iter().enumerate() {
                let mut shdr = [0u8; SHDR_SIZE];
                BigEndian::write_u32(&mut shdr[0..], name_offsets[i]);
                BigEndian::write_u32(&mut shdr[4..], *sh_type);
                BigEndian::write_u32(&mut shdr[12..], *addr);
                BigEndian::write_u32(&mut shdr[16..], offsets[i]);
                BigEndian::write_u32(&mut shdr[20..], data.len() as u32);
                BigEndian::write_u32(&mut shdr[24..], *link);
                image.extend_from_slice(&shdr);
            }

            image[0..4].copy_from_slice(&ELF_MAGIC);
            image[4] = 1; // ELFCLASS32
            image[5] = ELF_DATA_MSB;
            BigEndian::write_u16(&mut image[18..], EM_MIPS);
            BigEndian::write_u32(&mut image[32..], shoff);
            BigEndian::write_u16(&mut image[46..], SHDR_SIZE as u16);
            BigEndian::write_u16(&mut image[48..], sections.len() as u16);
            BigEndian::write_u16(&mut image[50..], sections.len() as u16 - 1);
            image
        }
    }

    fn be_words(words: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(words.len() * 4);
        for &w in words {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    fn sym(name_off: u32, value: u32, info: u8, shndx: u16) -> Vec<u8> {
        let mut s = vec![0u8; SYM_SIZE];
        BigEndian::write_u32(&mut s[0..], name_off);
        BigEndian::write_u32(&mut s[4..], value);
        s[12] = info;
        BigEndian::write_u16(&mut s[14..], shndx);
        s
    }

    fn sample_image() -> Vec<u8> {
        const TEXT_VADDR: u32 = 0x0040_0000;
        const GOT_VADDR: u32 = 0x1000_8000;

        // dynstr: \0 main\0 errno\0
        let dynstr = b"\0main\0errno\0".to_vec();
        let mut dynsym = sym(0, 0, 0, 0);
        dynsym.extend(sym(6, 0, (1 << 4) | STT_OBJECT, SHN_UNDEF)); // errno, global GOT sym 1
        dynsym.extend(sym(1, TEXT_VADDR, (1 << 4) | STT_FUNC, SHN_MIPS_TEXT)); // main, global GOT sym 2

        let dynamic = be_words(&[
            DT_PLTGOT,
            GOT_VADDR,
            DT_MIPS_LOCAL_GOTNO,
            2,
            DT_MIPS_GOTSYM,
            1,
            DT_MIPS_SYMTABNO,
            3,
        ]);
        // 2 locals, then errno's and main's global entries.
        let got = be_words(&[0, TEXT_VADDR, 0x1001_0040, 0xdead_beef]);
        let mut reginfo = vec![0u8; 24];
        BigEndian::write_u32(&mut reginfo[REGINFO_GP_VALUE_OFFSET..], GOT_VADDR + 0x7ff0);

        ImageBuilder::new()
            .section(".text", 1, TEXT_VADDR, 0, be_words(&[0x03e0_0008, 0]))
            .section(".rodata", 1, 0x0041_0000, 0, be_words(&[1, 2]))
            .section(".dynstr", 3, 0, 0, dynstr)
            .section(".dynsym", SHT_DYNSYM, 0, 3, dynsym)
            .section(".reginfo", SHT_MIPS_REGINFO, 0, 0, reginfo)
            .section(".dynamic", SHT_DYNAMIC, 0, 0, dynamic)
            .section(".got", 1, GOT_VADDR, 0, got)
            .build()
    }

    #[test]
    fn test_rejects_non_elf() {
        assert!(matches!(Binary::parse(b"plain"), Err(ElfError::NotElf)));
    }

    #[test]
    fn test_rejects_wrong_endian_or_machine() {
        let mut image = sample_image();
        image[5] = 1; // little endian
        assert!(matches!(
            Binary::parse(&image),
            Err(ElfError::NotBigEndianMips)
        ));

        let mut image = sample_image();
        image[18] = 0;
        image[19] = 62; // x86-64
        assert!(matches!(
            Binary::parse(&image),
            Err(ElfError::NotBigEndianMips)
        ));
    }

    #[test]
    fn test_rejects_stripped() {
        let mut image = sample_image();
        image[50] = 0;
        image[51] = 0;
        assert!(matches!(Binary::parse(&image), Err(ElfError::Stripped)));
    }

    #[test]
    fn test_parses_sample() {
        let binary = Binary::parse(&sample_image()).unwrap();
        assert_eq!(binary.text_vaddr, 0x0040_0000);
        assert_eq!(binary.text_len(), 8);
        assert_eq!(binary.main_addr, 0x0040_0000);
        assert_eq!(binary.got_locals, vec![0, 0x0040_0000]);
        // errno resolves to its GOT word, main to its symbol address.
        assert_eq!(binary.got_globals, vec![0x1001_0040, 0x0040_0000]);
        assert_eq!(binary.gp_value_adj, 0x7ff0);
        assert_eq!(
            binary.symbol_names.get(&0x0040_0000).map(String::as_str),
            Some("main")
        );
        assert_eq!(binary.got_labels, vec![0x0040_0000]);
        let rodata = binary.rodata.as_ref().unwrap();
        assert_eq!(rodata.word_at(0x0041_0004), 2);
    }

    #[test]
    fn test_requires_dynsym_companions() {
        // Same image without .reginfo.
        const TEXT_VADDR: u32 = 0x0040_0000;
        let image = ImageBuilder::new()
            .section(".text", 1, TEXT_VADDR, 0, be_words(&[0]))
            .section(".dynstr", 3, 0, 0, b"\0".to_vec())
            .section(".dynsym", SHT_DYNSYM, 0, 2, sym(0, 0, 0, 0))
            .build();
        assert!(matches!(
            Binary::parse(&image),
            Err(ElfError::MissingSection(".reginfo"))
        ));
    }

    #[test]
    fn test_rejects_symtab_only() {
        let image = ImageBuilder::new()
            .section(".text", 1, 0x0040_0000, 0, be_words(&[0]))
            .section(".symtab", SHT_SYMTAB, 0, 0, sym(0, 0, 0, 0))
            .build();
        assert!(matches!(
            Binary::parse(&image),
            Err(ElfError::SymtabUnsupported)
        ));
    }
}
