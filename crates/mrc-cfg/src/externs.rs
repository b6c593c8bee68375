//! The extern-function contract and the O32 argument model.
//!
//! Every call leaving the analyzed text resolves against this table. The
//! param string's first character is the return type, the rest the argument
//! types: `v` void, `i` int32, `u` uint32, `p` pointer, `f` float, `d`
//! double, `l` int64, `j` uint64, `t` trampoline (a function-pointer
//! argument routed through the runtime dispatcher).

use mrc_isa::{Gpr, RegMask};

/// The wrapper takes no `mem` argument.
pub const FLAG_NO_MEM: u32 = 1;
/// Vararg callee: the first four argument words are also spilled to the
/// stack.
pub const FLAG_VARARG: u32 = 2;

#[derive(Clone, Copy, Debug)]
pub struct ExternFunction {
    pub name: &'static str,
    pub params: &'static str,
    pub flags: u32,
}

const fn e(name: &'static str, params: &'static str, flags: u32) -> ExternFunction {
    ExternFunction {
        name,
        params,
        flags,
    }
}

/// libc, libgen, SGI helpers, long-long soft math, locale and signal
/// surfaces used by the IDO tool binaries.
pub static EXTERN_FUNCTIONS: &[ExternFunction] = &[
    e("exit", "vi", 0), // override exit from application
    e("abort", "v", 0),
    e("sbrk", "pi", 0),
    e("malloc", "pu", 0),
    e("calloc", "puu", 0),
    e("realloc", "ppu", 0),
    e("free", "vp", 0),
    e("fscanf", "ipp", FLAG_VARARG),
    e("printf", "ip", FLAG_VARARG),
    e("sprintf", "ipp", FLAG_VARARG),
    e("fprintf", "ipp", FLAG_VARARG),
    e("_doprnt", "ippp", 0),
    e("strlen", "up", 0),
    e("open", "ipii", 0),
    e("creat", "ipi", 0),
    e("access", "ipi", 0),
    e("rename", "ipp", 0),
    e("utime", "ipp", 0),
    e("flock", "iii", 0),
    e("chmod", "ipu", 0),
    e("umask", "ii", FLAG_NO_MEM),
    e("ecvt", "pdipp", 0),
    e("fcvt", "pdipp", 0),
    e("sqrt", "dd", FLAG_NO_MEM),
    e("sqrtf", "ff", FLAG_NO_MEM),
    e("atoi", "ip", 0),
    e("atol", "ip", 0),
    e("atof", "dp", 0),
    e("strtol", "ippi", 0),
    e("strtoul", "uppi", 0),
    e("strtoll", "lppi", 0),
    e("strtoull", "jppi", 0),
    e("strtod", "dpp", 0),
    e("strchr", "ppi", 0),
    e("strrchr", "ppi", 0),
    e("strcspn", "upp", 0),
    e("strpbrk", "ppp", 0),
    e("fstat", "iip", 0),
    e("stat", "ipp", 0),
    e("ftruncate", "iii", 0),
    e("bcopy", "vppu", 0),
    e("memcpy", "pppu", 0),
    e("memccpy", "pppiu", 0),
    e("read", "iipu", 0),
    e("write", "iipu", 0),
    e("fopen", "ppp", 0),
    e("freopen", "pppp", 0),
    e("fclose", "ip", 0),
    e("ftell", "ip", 0),
    e("rewind", "vp", 0),
    e("fseek", "ipii", 0),
    e("lseek", "iiii", 0),
    e("fflush", "ip", 0),
    e("dup", "ii", 0),
    e("dup2", "iii", 0),
    e("pipe", "ip", 0),
    e("perror", "vp", 0),
    e("fdopen", "iip", 0),
    e("memset", "ppiu", 0),
    e("bcmp", "ippu", 0),
    e("memcmp", "ippu", 0),
    e("getpid", "i", FLAG_NO_MEM),
    e("getpgrp", "i", 0),
    e("remove", "ip", 0),
    e("unlink", "ip", 0),
    e("close", "ii", 0),
    e("strcmp", "ipp", 0),
    e("strncmp", "ippu", 0),
    e("strcpy", "ppp", 0),
    e("strncpy", "pppu", 0),
    e("strcat", "ppp", 0),
    e("strncat", "pppu", 0),
    e("strtok", "ppp", 0),
    e("strstr", "ppp", 0),
    e("strdup", "pp", 0),
    e("toupper", "ii", FLAG_NO_MEM),
    e("tolower", "ii", FLAG_NO_MEM),
    e("gethostname", "ipu", 0),
    e("isatty", "ii", 0),
    e("strftime", "upupp", 0),
    e("times", "ip", 0),
    e("clock", "i", FLAG_NO_MEM),
    e("ctime", "pp", 0),
    e("localtime", "pp", 0),
    e("setvbuf", "ippiu", 0),
    e("__semgetc", "ip", 0),
    e("__semputc", "iip", 0),
    e("fgetc", "ip", 0),
    e("fgets", "ipip", 0),
    e("__filbuf", "ip", 0),
    e("__flsbuf", "iip", 0),
    e("ungetc", "iip", 0),
    e("gets", "pp", 0),
    e("fread", "upuup", 0),
    e("fwrite", "upuup", 0),
    e("fputs", "ipp", 0),
    e("puts", "ip", 0),
    e("getcwd", "ppu", 0),
    e("time", "ip", 0),
    e("bzero", "vpu", 0),
    e("fp_class_d", "id", FLAG_NO_MEM),
    e("ldexp", "ddi", FLAG_NO_MEM),
    e("__ll_mul", "lll", FLAG_NO_MEM),
    e("__ll_div", "lll", FLAG_NO_MEM),
    e("__ll_rem", "ljl", FLAG_NO_MEM),
    e("__ll_lshift", "llj", FLAG_NO_MEM),
    e("__ll_rshift", "llj", FLAG_NO_MEM),
    e("__ull_div", "jjj", FLAG_NO_MEM),
    e("__ull_rem", "jjj", FLAG_NO_MEM),
    e("__ull_rshift", "jjj", FLAG_NO_MEM),
    e("__d_to_ull", "jd", FLAG_NO_MEM),
    e("__d_to_ll", "ld", FLAG_NO_MEM),
    e("__f_to_ull", "jf", FLAG_NO_MEM),
    e("__f_to_ll", "lf", FLAG_NO_MEM),
    e("__ull_to_f", "fj", FLAG_NO_MEM),
    e("__ll_to_f", "fl", FLAG_NO_MEM),
    e("__ull_to_d", "dj", FLAG_NO_MEM),
    e("__ll_to_d", "dl", FLAG_NO_MEM),
    e("_exit", "vi", 0),
    e("_cleanup", "v", 0),
    e("_rld_new_interface", "pu", FLAG_VARARG),
    e("_exithandle", "v", 0),
    e("_prctl", "ii", FLAG_VARARG),
    e("_atod", "dpii", 0),
    e("pathconf", "ipi", 0),
    e("getenv", "pp", 0),
    e("gettxt", "ppp", 0),
    e("setlocale", "pip", 0),
    e("mmap", "ppuiiii", 0),
    e("munmap", "ipu", 0),
    e("mprotect", "ipui", 0),
    e("sysconf", "ii", 0),
    e("getpagesize", "i", 0),
    e("strerror", "pi", 0),
    e("ioctl", "iiu", FLAG_VARARG),
    e("fcntl", "iii", FLAG_VARARG),
    e("signal", "pit", 0),
    e("sigset", "pit", 0),
    e("get_fpc_csr", "i", 0),
    e("set_fpc_csr", "ii", 0),
    e("setjmp", "ip", 0),
    e("longjmp", "vpi", 0),
    e("tempnam", "ppp", 0),
    e("tmpnam", "pp", 0),
    e("mktemp", "pp", 0),
    e("mkstemp", "ip", 0),
    e("tmpfile", "p", 0),
    e("wait", "ip", 0),
    e("kill", "iii", 0),
    e("execlp", "ip", FLAG_VARARG),
    e("execv", "ipp", 0),
    e("execvp", "ipp", 0),
    e("fork", "i", 0),
    e("system", "ip", 0),
    e("tsearch", "pppp", 0),
    e("tfind", "pppp", 0),
    e("qsort", "vpuut", 0),
    e("regcmp", "pp", FLAG_VARARG),
    e("regex", "ppp", FLAG_VARARG),
    e("__assert", "vppi", 0),
];

pub fn find_extern(name: &str) -> Option<&'static ExternFunction> {
    EXTERN_FUNCTIONS.iter().find(|f| f.name == name)
}

impl ExternFunction {
    pub fn return_type(&self) -> u8 {
        self.params.as_bytes()[0]
    }

    pub fn arg_types(&self) -> &'static [u8] {
        &self.params.as_bytes()[1..]
    }

    pub fn is_vararg(&self) -> bool {
        self.flags & FLAG_VARARG != 0
    }

    pub fn takes_mem(&self) -> bool {
        self.flags & FLAG_NO_MEM == 0
    }

    /// GPRs set by the wrapper on return.
    pub fn return_mask(&self) -> RegMask {
        match self.return_type() {
            b'i' | b'u' | b'p' => RegMask::of(Gpr::V0),
            b'l' | b'j' => RegMask::of(Gpr::V0) | RegMask::of(Gpr::V1),
            _ => RegMask::EMPTY,
        }
    }

    /// GPRs the callee consumes, per the O32 allocation of its parameter
    /// list. A trailing `$sp` is always included; varargs pessimistically
    /// take all four argument registers.
    pub fn arg_mask(&self) -> RegMask {
        let mut args = RegMask::REACHED;
        if self.is_vararg() {
            for n in 0..4 {
                args |= RegMask::arg(n);
            }
        }
        let mut alloc = O32ArgAllocator::new();
        for &ty in self.arg_types() {
            match alloc.alloc(ty) {
                ArgLoc::Gpr(n) => args |= RegMask::arg(n),
                ArgLoc::GprPair(n) => args |= RegMask::arg(n) | RegMask::arg(n + 1),
                ArgLoc::FpReg(_) | ArgLoc::Stack(_) | ArgLoc::StackPair(_) => {}
            }
        }
        args | RegMask::of(Gpr::Sp)
    }
}

/// Where one argument lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgLoc {
    /// `$a0 + n`.
    Gpr(usize),
    /// `$a0 + n` and `$a0 + n + 1` (64-bit value, high word first).
    GprPair(usize),
    /// `$fa0 + n` (n is 0 or 2).
    FpReg(usize),
    /// Stack word `sp + 4n`.
    Stack(usize),
    /// Stack words `sp + 4n` and `sp + 4n + 4`.
    StackPair(usize),
}

/// O32 argument slot allocator, shared by the backward liveness pass and the
/// emitter. Floats ride the FP argument registers only while no integer
/// argument has been seen; 64-bit values align to an even slot.
#[derive(Clone, Debug)]
pub struct O32ArgAllocator {
    pos: usize,
    float_pos: usize,
    only_floats_so_far: bool,
}

impl Default for O32ArgAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl O32ArgAllocator {
    pub fn new() -> Self {
        O32ArgAllocator {
            pos: 0,
            float_pos: 0,
            only_floats_so_far: true,
        }
    }

    /// Current argument slot index (also the stack word index past slot 3).
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn alloc(&mut self, ty: u8) -> ArgLoc {
        match ty {
            b'f' => {
                let loc = if self.only_floats_so_far && self.float_pos < 4 {
                    let l = ArgLoc::FpReg(self.float_pos);
                    self.float_pos += 2;
                    l
                } else if self.pos < 4 {
                    ArgLoc::Gpr(self.pos)
                } else {
                    ArgLoc::Stack(self.pos)
                };
                self.pos += 1;
                loc
            }
            b'd' => {
                if self.pos % 2 != 0 {
                    self.pos += 1;
                }
                let loc = if self.only_floats_so_far && self.float_pos < 4 {
                    let l = ArgLoc::FpReg(self.float_pos);
                    self.float_pos += 2;
                    l
                } else if self.pos < 4 {
                    ArgLoc::GprPair(self.pos)
                } else {
                    ArgLoc::StackPair(self.pos)
                };
                self.pos += 2;
                loc
            }
            b'l' | b'j' => {
                if self.pos % 2 != 0 {
                    self.pos += 1;
                }
                self.only_floats_so_far = false;
                let loc = if self.pos < 4 {
                    ArgLoc::GprPair(self.pos)
                } else {
                    ArgLoc::StackPair(self.pos)
                };
                self.pos += 2;
                loc
            }
            // 'i', 'u', 'p', 't'
            _ => {
                self.only_floats_so_far = false;
                let loc = if self.pos < 4 {
                    ArgLoc::Gpr(self.pos)
                } else {
                    ArgLoc::Stack(self.pos)
                };
                self.pos += 1;
                loc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrc_isa::Gpr;

    #[test]
    fn test_find_extern() {
        assert_eq!(find_extern("qsort").unwrap().params, "vpuut");
        assert!(find_extern("no_such_fn").is_none());
    }

    #[test]
    fn test_return_masks() {
        assert_eq!(
            find_extern("malloc").unwrap().return_mask(),
            RegMask::of(Gpr::V0)
        );
        assert_eq!(
            find_extern("__ll_mul").unwrap().return_mask(),
            RegMask::of(Gpr::V0) | RegMask::of(Gpr::V1)
        );
        assert_eq!(find_extern("free").unwrap().return_mask(), RegMask::EMPTY);
        assert_eq!(find_extern("sqrt").unwrap().return_mask(), RegMask::EMPTY);
    }

    #[test]
    fn test_arg_alloc_ints() {
        let mut a = O32ArgAllocator::new();
        assert_eq!(a.alloc(b'p'), ArgLoc::Gpr(0));
        assert_eq!(a.alloc(b'i'), ArgLoc::Gpr(1));
        assert_eq!(a.alloc(b'u'), ArgLoc::Gpr(2));
        assert_eq!(a.alloc(b'i'), ArgLoc::Gpr(3));
        assert_eq!(a.alloc(b'i'), ArgLoc::Stack(4));
    }

    #[test]
    fn test_arg_alloc_leading_floats() {
        // dd -> both in FP registers
        let mut a = O32ArgAllocator::new();
        assert_eq!(a.alloc(b'd'), ArgLoc::FpReg(0));
        assert_eq!(a.alloc(b'd'), ArgLoc::FpReg(2));

        // idi -> double after an int goes to GPR pair, aligned
        let mut a = O32ArgAllocator::new();
        assert_eq!(a.alloc(b'i'), ArgLoc::Gpr(0));
        assert_eq!(a.alloc(b'd'), ArgLoc::GprPair(2));
        assert_eq!(a.alloc(b'i'), ArgLoc::Stack(4));
    }

    #[test]
    fn test_arg_alloc_long_long_alignment() {
        let mut a = O32ArgAllocator::new();
        assert_eq!(a.alloc(b'i'), ArgLoc::Gpr(0));
        assert_eq!(a.alloc(b'l'), ArgLoc::GprPair(2));
        let mut a = O32ArgAllocator::new();
        assert_eq!(a.alloc(b'l'), ArgLoc::GprPair(0));
        assert_eq!(a.alloc(b'j'), ArgLoc::GprPair(2));
        assert_eq!(a.alloc(b'l'), ArgLoc::StackPair(4));
    }

    #[test]
    fn test_extern_arg_masks() {
        // strcmp(p, p) -> a0, a1, sp
        let m = find_extern("strcmp").unwrap().arg_mask();
        assert!(m.contains(Gpr::A0));
        assert!(m.contains(Gpr::A1));
        assert!(!m.contains(Gpr::A2));
        assert!(m.contains(Gpr::Sp));

        // sqrt(d) -> FP only, sp still added
        let m = find_extern("sqrt").unwrap().arg_mask();
        assert!(!m.contains(Gpr::A0));
        assert!(m.contains(Gpr::Sp));

        // printf is vararg -> all four argument registers
        let m = find_extern("printf").unwrap().arg_mask();
        for n in 0..4 {
            assert!(m.contains(Gpr::arg(n)));
        }
    }
}
