use bitflags::bitflags;

bitflags! {
    /// EFLAGS/FLAGS bits an instruction may test, modify, define, leave
    /// undefined, set unconditionally, or unset unconditionally.
    ///
    /// Bit positions follow spec.md §3.2 exactly; they are not the real
    /// architectural EFLAGS layout re-derived, they *are* it (CF=0, PF=2,
    /// AF=4, ZF=6, SF=7, TF=8, IF=9, DF=10, OF=11, IOPL=12-13, NT=14,
    /// RF=16, VM=17, AC=18, VIF=19, VIP=20, ID=21).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flag: u32 {
        const C     = 1 << 0;
        const P     = 1 << 2;
        const A     = 1 << 4;
        const Z     = 1 << 6;
        const S     = 1 << 7;
        const T     = 1 << 8;
        const I     = 1 << 9;
        const D     = 1 << 10;
        const O     = 1 << 11;
        const IOPL1 = 1 << 12;
        const IOPL2 = 1 << 13;
        const NT    = 1 << 14;
        const RF    = 1 << 16;
        const VM    = 1 << 17;
        const AC    = 1 << 18;
        const VIF   = 1 << 19;
        const VIP   = 1 << 20;
        const ID    = 1 << 21;
    }
}

impl Flag {
    /// Case-normalising lookup by the flag's letter code, e.g. `"c"`/`"C"`
    /// both resolve to [`Flag::C`]. Used by `f_vals` parsing, where flag
    /// letters appear inline in a single string.
    #[must_use]
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_uppercase().as_str() {
            "C" => Some(Self::C),
            "P" => Some(Self::P),
            "A" => Some(Self::A),
            "Z" => Some(Self::Z),
            "S" => Some(Self::S),
            "T" => Some(Self::T),
            "I" => Some(Self::I),
            "D" => Some(Self::D),
            "O" => Some(Self::O),
            "IOPL1" => Some(Self::IOPL1),
            "IOPL2" => Some(Self::IOPL2),
            "NT" => Some(Self::NT),
            "RF" => Some(Self::RF),
            "VM" => Some(Self::VM),
            "AC" => Some(Self::AC),
            "VIF" => Some(Self::VIF),
            "VIP" => Some(Self::VIP),
            "ID" => Some(Self::ID),
            _ => None,
        }
    }
}

bitflags! {
    /// x87 FPU condition-code flags (C0-C3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FpuFlag: u8 {
        const C0 = 1 << 0;
        const C1 = 1 << 1;
        const C2 = 1 << 2;
        const C3 = 1 << 3;
    }
}

impl FpuFlag {
    #[must_use]
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_uppercase().as_str() {
            "C0" => Some(Self::C0),
            "C1" => Some(Self::C1),
            "C2" => Some(Self::C2),
            "C3" => Some(Self::C3),
            _ => None,
        }
    }
}

/// The six independent subsets describing how an instruction affects a
/// flag register: which bits it reads (`tested`), which it may change in
/// some unspecified way (`modified`), which it sets to a well-defined
/// result (`defined`), which it leaves architecturally undefined
/// (`undefined`), and which it unconditionally sets (`set`) or clears
/// (`unset`).
///
/// Per spec.md §3.3, these subsets are not required to be disjoint: a flag
/// in both `tested` and `undefined` signals conditional semantics the
/// reference does not fully describe (spec.md §7), and is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSet<T> {
    pub tested: T,
    pub modified: T,
    pub defined: T,
    pub undefined: T,
    pub set: T,
    pub unset: T,
}

impl<T: Default> FlagSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[test]
fn test_flag_from_letter_case_insensitive() {
    assert_eq!(Flag::from_letter("c"), Some(Flag::C));
    assert_eq!(Flag::from_letter("Z"), Some(Flag::Z));
    assert_eq!(Flag::from_letter("nt"), Some(Flag::NT));
    assert_eq!(Flag::from_letter("?"), None);
}

#[test]
fn test_flag_set_overlap_is_allowed() {
    let mut fs: FlagSet<Flag> = FlagSet::new();
    fs.tested = Flag::Z;
    fs.undefined = Flag::Z;
    assert!(fs.tested.contains(Flag::Z));
    assert!(fs.undefined.contains(Flag::Z));
}

#[test]
fn test_fpu_flag_from_letter() {
    assert_eq!(FpuFlag::from_letter("C0"), Some(FpuFlag::C0));
    assert_eq!(FpuFlag::from_letter("c3"), Some(FpuFlag::C3));
    assert_eq!(FpuFlag::from_letter("C4"), None);
}
