//! Linear layout of the instruction stream.

use byteorder::{BigEndian, ByteOrder};
use mrc_isa::decode;

use crate::{Analysis, Insn};

impl Analysis {
    /// Decode one record per `.text` word and append the guard NOP that
    /// keeps branch-delay handling in bounds at the section end.
    pub fn disassemble(&mut self) {
        let text_len = self.binary.text.len() & !3;
        self.insns.reserve(text_len / 4 + 1);
        for off in (0..text_len).step_by(4) {
            let word = BigEndian::read_u32(&self.binary.text[off..]);
            let vram = self.binary.text_vaddr + off as u32;
            self.insns.push(Insn::new(decode(word, vram)));
        }

        let mut guard = Insn::new(decode(0, self.binary.text_vaddr + text_len as u32));
        guard.no_following_successor = true;
        self.insns.push(guard);
    }
}
