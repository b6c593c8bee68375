//! O32 general-purpose registers and liveness register masks.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// General-purpose register, O32 naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Gpr {
    Zero = 0,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    T8,
    T9,
    K0,
    K1,
    Gp,
    Sp,
    Fp,
    Ra,
}

const GPR_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp",
    "ra",
];

const GPR_TABLE: [Gpr; 32] = [
    Gpr::Zero,
    Gpr::At,
    Gpr::V0,
    Gpr::V1,
    Gpr::A0,
    Gpr::A1,
    Gpr::A2,
    Gpr::A3,
    Gpr::T0,
    Gpr::T1,
    Gpr::T2,
    Gpr::T3,
    Gpr::T4,
    Gpr::T5,
    Gpr::T6,
    Gpr::T7,
    Gpr::S0,
    Gpr::S1,
    Gpr::S2,
    Gpr::S3,
    Gpr::S4,
    Gpr::S5,
    Gpr::S6,
    Gpr::S7,
    Gpr::T8,
    Gpr::T9,
    Gpr::K0,
    Gpr::K1,
    Gpr::Gp,
    Gpr::Sp,
    Gpr::Fp,
    Gpr::Ra,
];

impl Gpr {
    /// Register for a 5-bit instruction field.
    #[inline]
    pub fn from_index(idx: u8) -> Gpr {
        GPR_TABLE[(idx & 0x1f) as usize]
    }

    /// Argument register `$a0 + n`; `n` must be below 4.
    #[inline]
    pub fn arg(n: usize) -> Gpr {
        debug_assert!(n < 4);
        GPR_TABLE[Gpr::A0 as usize + n]
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// O32 ABI name without the `$` sigil.
    #[inline]
    pub fn name(self) -> &'static str {
        GPR_NAMES[self as usize]
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Liveness register set.
///
/// Bit 0 marks the instruction as reached at all, bits 1..=32 are the GPRs in
/// index order, followed by the HI and LO multiply/divide results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegMask(pub u64);

impl RegMask {
    pub const EMPTY: RegMask = RegMask(0);
    /// The "alive at all" bit carried through every propagation.
    pub const REACHED: RegMask = RegMask(1);
    pub const HI: RegMask = RegMask(1 << 33);
    pub const LO: RegMask = RegMask(1 << 34);

    #[inline]
    pub const fn of(reg: Gpr) -> RegMask {
        RegMask(1 << (reg as u64 + 1))
    }

    /// `$a0 + n` for O32 argument slot `n` (< 4).
    #[inline]
    pub fn arg(n: usize) -> RegMask {
        RegMask::of(Gpr::arg(n))
    }

    /// The temporary registers `$t0..$t9`.
    pub fn temporaries() -> RegMask {
        RegMask::of(Gpr::T0)
            | RegMask::of(Gpr::T1)
            | RegMask::of(Gpr::T2)
            | RegMask::of(Gpr::T3)
            | RegMask::of(Gpr::T4)
            | RegMask::of(Gpr::T5)
            | RegMask::of(Gpr::T6)
            | RegMask::of(Gpr::T7)
            | RegMask::of(Gpr::T8)
            | RegMask::of(Gpr::T9)
    }

    /// Everything a call boundary clobbers: return, argument and temporary
    /// registers.
    pub fn caller_saved() -> RegMask {
        RegMask::of(Gpr::V0)
            | RegMask::of(Gpr::V1)
            | RegMask::of(Gpr::A0)
            | RegMask::of(Gpr::A1)
            | RegMask::of(Gpr::A2)
            | RegMask::of(Gpr::A3)
            | RegMask::temporaries()
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, reg: Gpr) -> bool {
        self.0 & RegMask::of(reg).0 != 0
    }

    /// True when every bit of `other` is present.
    #[inline]
    pub fn contains_all(self, other: RegMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is present.
    #[inline]
    pub fn intersects(self, other: RegMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for RegMask {
    type Output = RegMask;
    #[inline]
    fn bitor(self, rhs: RegMask) -> RegMask {
        RegMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for RegMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: RegMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RegMask {
    type Output = RegMask;
    #[inline]
    fn bitand(self, rhs: RegMask) -> RegMask {
        RegMask(self.0 & rhs.0)
    }
}

impl Not for RegMask {
    type Output = RegMask;
    #[inline]
    fn not(self) -> RegMask {
        RegMask(!self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpr_names() {
        assert_eq!(Gpr::Zero.name(), "zero");
        assert_eq!(Gpr::V0.name(), "v0");
        assert_eq!(Gpr::A0.name(), "a0");
        assert_eq!(Gpr::T9.name(), "t9");
        assert_eq!(Gpr::Ra.name(), "ra");
    }

    #[test]
    fn test_gpr_from_index_roundtrip() {
        for idx in 0..32u8 {
            assert_eq!(Gpr::from_index(idx).index(), idx);
        }
    }

    #[test]
    fn test_mask_bits() {
        assert_eq!(RegMask::of(Gpr::Zero).0, 1 << 1);
        assert_eq!(RegMask::of(Gpr::Ra).0, 1 << 32);
        assert!(RegMask::HI.0 > RegMask::of(Gpr::Ra).0);
    }

    #[test]
    fn test_mask_ops() {
        let m = RegMask::of(Gpr::A0) | RegMask::of(Gpr::A1);
        assert!(m.contains(Gpr::A0));
        assert!(!m.contains(Gpr::A2));
        assert!(m.contains_all(RegMask::of(Gpr::A1)));
        assert!(!m.contains_all(m | RegMask::of(Gpr::A2)));
        assert!((m & RegMask::of(Gpr::A1)) == RegMask::of(Gpr::A1));
    }

    #[test]
    fn test_caller_saved_excludes_callee_saved() {
        let m = RegMask::caller_saved();
        assert!(m.contains(Gpr::V0));
        assert!(m.contains(Gpr::T9));
        assert!(!m.contains(Gpr::S0));
        assert!(!m.contains(Gpr::Sp));
        assert!(!m.contains(Gpr::Ra));
    }
}
