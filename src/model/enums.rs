//! Closed enumerations from spec.md §3.2, parsed case-insensitively from
//! the XML-derived text the loader sees (spec.md §3.3: "Enumerated
//! parsing is case-normalising (upper-case on lookup). An unrecognised
//! enumerated value is a loader failure, not a silent null.").

use std::{error, fmt, str::FromStr};

/// Raised when an enumerated attribute/element value doesn't match any
/// variant of the closed set it is meant to belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnumerant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownEnumerant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised {} value: {:?}", self.kind, self.value)
    }
}

impl error::Error for UnknownEnumerant {}

fn unknown(kind: &'static str, value: &str) -> UnknownEnumerant {
    UnknownEnumerant {
        kind,
        value: value.to_string(),
    }
}

/// Processor-support range endpoint (spec.md §3.1 `processor_start`/`processor_end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProcessorCode {
    P8086 = 0,
    P80186 = 1,
    P80286 = 2,
    P80386 = 3,
    P80486 = 4,
    P1 = 5,
    P1Mmx = 6,
    PPro = 7,
    PII = 8,
    PIII = 9,
    P4 = 10,
    Core1 = 11,
    Core2 = 12,
    CoreI7 = 13,
    Itanium = 14,
}

impl ProcessorCode {
    /// Ordinal used to compare `processor_start.value() <= processor_end.value()`.
    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl FromStr for ProcessorCode {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "8086" => Self::P8086,
            "80186" => Self::P80186,
            "80286" => Self::P80286,
            "80386" => Self::P80386,
            "80486" => Self::P80486,
            "P1" => Self::P1,
            "P1MMX" => Self::P1Mmx,
            "PPRO" => Self::PPro,
            "PII" => Self::PII,
            "PIII" => Self::PIII,
            "P4" => Self::P4,
            "CORE1" => Self::Core1,
            "CORE2" => Self::Core2,
            "COREI7" => Self::CoreI7,
            "ITANIUM" => Self::Itanium,
            other => return Err(unknown("processor code", other)),
        })
    }
}

/// `instruction_extension` (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Mmx,
    Sse1,
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Vmx,
    Smx,
}

impl FromStr for Extension {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "MMX" => Self::Mmx,
            "SSE1" => Self::Sse1,
            "SSE2" => Self::Sse2,
            "SSE3" => Self::Sse3,
            "SSSE3" => Self::Ssse3,
            "SSE41" => Self::Sse41,
            "SSE42" => Self::Sse42,
            "VMX" => Self::Vmx,
            "SMX" => Self::Smx,
            other => return Err(unknown("instruction extension", other)),
        })
    }
}

/// Operational mode validity (spec.md §3.1 `mode`). Defaults to [`Mode::R`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Real, protected, and 64-bit mode.
    #[default]
    R,
    /// Protected and 64-bit mode only.
    P,
    /// 64-bit mode only.
    E,
    /// SMM only.
    S,
}

impl FromStr for Mode {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "R" => Self::R,
            "P" => Self::P,
            "E" => Self::E,
            "S" => Self::S,
            other => return Err(unknown("mode", other)),
        })
    }
}

/// Privilege ring requirement (spec.md §3.1 `ring`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    R0,
    R1,
    R2,
    R3,
    /// Privilege requirement depends on other instruction state ("f" in the source).
    Floating,
}

impl FromStr for Ring {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "0" => Self::R0,
            "1" => Self::R1,
            "2" => Self::R2,
            "3" => Self::R3,
            "F" => Self::Floating,
            other => return Err(unknown("ring", other)),
        })
    }
}

/// Documentation status (spec.md §3.1 `documentation`). Defaults to [`Documentation::Documented`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Documentation {
    #[default]
    Documented,
    Marginal,
    Undocumented,
}

impl FromStr for Documentation {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "D" => Self::Documented,
            "M" => Self::Marginal,
            "U" => Self::Undocumented,
            other => return Err(unknown("documentation", other)),
        })
    }
}

/// Entry-level attribute tag (spec.md §3.1 `attr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Invd,
    Undef,
    Null,
    Nop,
    Acc,
    Serial,
    SerialCond,
    Delaysint,
    DelaysintCond,
}

impl FromStr for Attr {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "INVD" => Self::Invd,
            "UNDEF" => Self::Undef,
            "NULL" => Self::Null,
            "NOP" => Self::Nop,
            "ACC" => Self::Acc,
            "SERIAL" => Self::Serial,
            "SERIAL_COND" => Self::SerialCond,
            "DELAYSINT" => Self::Delaysint,
            "DELAYSINT_COND" => Self::DelaysintCond,
            other => return Err(unknown("attr", other)),
        })
    }
}

/// ModR/M.mod constraint (spec.md §3.1 `Entry.mod` and `Syntax.mod`).
/// Defaults to [`ModConstraint::Unspecified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModConstraint {
    /// ModR/M.mod must not select a memory operand.
    NoMem,
    /// ModR/M.mod must select a memory operand.
    Mem,
    #[default]
    Unspecified,
}

impl FromStr for ModConstraint {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "NOMEM" => Self::NoMem,
            "MEM" => Self::Mem,
            other => return Err(unknown("mod constraint", other)),
        })
    }
}

bitflags::bitflags! {
    /// Which low-order opcode bits vary for a given entry (spec.md §3.2
    /// `Entry.BitFields`). Membership is set whenever the corresponding
    /// XML attribute is present (spec.md §4.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitFieldSet: u8 {
        /// `w` - operand-size bit (`op_size` attribute).
        const OPERAND_SIZE = 1 << 0;
        /// `s` - sign-extend bit (`sign-ext` attribute).
        const SIGN_EXTEND  = 1 << 1;
        /// `d` - direction bit (`direction` attribute).
        const DIRECTION    = 1 << 2;
        /// `tttn` - condition field (`tttn` attribute).
        const CONDITION    = 1 << 3;
        /// `mf` - memory-format field (`mem_format` attribute).
        const MEMORY_FORMAT = 1 << 4;
    }
}

/// Tier of a semantic group tag: how broad vs. specific the classification
/// is, numbered by the `<grp1>`/`<grp2>`/`<grp3>` child index the loader
/// walks (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Tier {
    /// From a `<grp1>` child - broad category (e.g. "gen", "arith").
    Broad = 0,
    /// From a `<grp2>` child - subcategory.
    Sub = 1,
    /// From a `<grp3>` child - leaf classification.
    Leaf = 2,
}

/// Semantic classification tag (spec.md §3.1 `groups`, §3.2 `Entry.Group`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupTag {
    Gen,
    Arith,
    Logical,
    Trans,
    Branch,
    Stack,
    Segop,
    Prot,
    System,
    String,
    Bit,
    Flag,
    Fpu,
    Mmx,
    Sse1,
    Sse2,
    Sse3,
    Ssse3,
    Sse4,
    Shift,
    Rotate,
    Bcd,
    Conver,
    Cachect,
    Undoc,
    Obsol,
}

impl FromStr for GroupTag {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GEN" => Self::Gen,
            "ARITH" => Self::Arith,
            "LOGICAL" => Self::Logical,
            "TRANS" => Self::Trans,
            "BRANCH" => Self::Branch,
            "STACK" => Self::Stack,
            "SEGOP" => Self::Segop,
            "PROT" => Self::Prot,
            "SYSTEM" => Self::System,
            "STRING" => Self::String,
            "BIT" => Self::Bit,
            "FLAG" => Self::Flag,
            "FPU" => Self::Fpu,
            "MMX" => Self::Mmx,
            "SSE1" => Self::Sse1,
            "SSE2" => Self::Sse2,
            "SSE3" => Self::Sse3,
            "SSSE3" => Self::Ssse3,
            "SSE4" => Self::Sse4,
            "SHIFT" => Self::Shift,
            "ROTATE" => Self::Rotate,
            "BCD" => Self::Bcd,
            "CONVER" => Self::Conver,
            "CACHECT" => Self::Cachect,
            "UNDOC" => Self::Undoc,
            "OBSOL" => Self::Obsol,
            other => return Err(unknown("group tag", other)),
        })
    }
}

/// One semantic group tag together with the tier it was declared at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub tag: GroupTag,
    pub tier: Tier,
}

/// Intel SDM addressing method (spec.md §3.2 `Operand.Address`, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    A,
    Ba,
    Bb,
    Bd,
    C,
    D,
    E,
    Es,
    Est,
    F,
    G,
    H,
    I,
    J,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    Sc,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    S2,
    S30,
    S33,
}

impl FromStr for Address {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "BA" => Self::Ba,
            "BB" => Self::Bb,
            "BD" => Self::Bd,
            "C" => Self::C,
            "D" => Self::D,
            "E" => Self::E,
            "ES" => Self::Es,
            "EST" => Self::Est,
            "F" => Self::F,
            "G" => Self::G,
            "H" => Self::H,
            "I" => Self::I,
            "J" => Self::J,
            "M" => Self::M,
            "N" => Self::N,
            "O" => Self::O,
            "P" => Self::P,
            "Q" => Self::Q,
            "R" => Self::R,
            "S" => Self::S,
            "SC" => Self::Sc,
            "T" => Self::T,
            "U" => Self::U,
            "V" => Self::V,
            "W" => Self::W,
            "X" => Self::X,
            "Y" => Self::Y,
            "Z" => Self::Z,
            "S2" => Self::S2,
            "S30" => Self::S30,
            "S33" => Self::S33,
            other => return Err(unknown("addressing method", other)),
        })
    }
}

impl Address {
    /// Whether this addressing method requires a ModR/M byte to be read
    /// (spec.md §4.4's length table: `V, G, E, M` add one ModR/M byte).
    /// Extended here with the remaining ModR/M-encoded forms (`N`, `P`,
    /// `Q`, `R`, `S`, `U`, `W`) so the decoder's ModR/M/SIB/displacement
    /// resolution (SPEC_FULL.md §4.4) applies to every form that actually
    /// carries a ModR/M byte, not only the four spec.md names explicitly.
    #[must_use]
    pub fn requires_modrm(self) -> bool {
        matches!(
            self,
            Self::E
                | Self::G
                | Self::M
                | Self::V
                | Self::N
                | Self::P
                | Self::Q
                | Self::R
                | Self::S
                | Self::U
                | Self::W
        )
    }

    /// Whether this addressing method consumes a 4-byte relative
    /// displacement (spec.md §4.4: `J`).
    #[must_use]
    pub fn is_relative_jump(self) -> bool {
        matches!(self, Self::J)
    }

    /// Whether this addressing method reads a trailing immediate/offset
    /// sized from the operand's [`OperandType`] (spec.md §4.4 closing
    /// paragraph).
    #[must_use]
    pub fn has_sized_immediate(self) -> bool {
        matches!(self, Self::I | Self::O)
    }
}

/// Operand size/shape code (spec.md §3.2 `Operand.Type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    A,
    B,
    Bcd,
    Bs,
    Bsq,
    Bss,
    C,
    D,
    Di,
    Dq,
    Dqp,
    Dr,
    Ds,
    E,
    Er,
    P,
    Pi,
    Pd,
    Ps,
    Psq,
    Pt,
    Ptp,
    Q,
    Qi,
    Qp,
    S,
    Sd,
    Si,
    Sr,
    Ss,
    St,
    Stx,
    T,
    V,
    Vds,
    Vq,
    Vqp,
    Vs,
    W,
    Wi,
    Va,
    Dqa,
    Wa,
    Wo,
    Ws,
    Da,
    Do,
    Qa,
    Qs,
}

impl FromStr for OperandType {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "B" => Self::B,
            "BCD" => Self::Bcd,
            "BS" => Self::Bs,
            "BSQ" => Self::Bsq,
            "BSS" => Self::Bss,
            "C" => Self::C,
            "D" => Self::D,
            "DI" => Self::Di,
            "DQ" => Self::Dq,
            "DQP" => Self::Dqp,
            "DR" => Self::Dr,
            "DS" => Self::Ds,
            "E" => Self::E,
            "ER" => Self::Er,
            "P" => Self::P,
            "PI" => Self::Pi,
            "PD" => Self::Pd,
            "PS" => Self::Ps,
            "PSQ" => Self::Psq,
            "PT" => Self::Pt,
            "PTP" => Self::Ptp,
            "Q" => Self::Q,
            "QI" => Self::Qi,
            "QP" => Self::Qp,
            "S" => Self::S,
            "SD" => Self::Sd,
            "SI" => Self::Si,
            "SR" => Self::Sr,
            "SS" => Self::Ss,
            "ST" => Self::St,
            "STX" => Self::Stx,
            "T" => Self::T,
            "V" => Self::V,
            "VDS" => Self::Vds,
            "VQ" => Self::Vq,
            "VQP" => Self::Vqp,
            "VS" => Self::Vs,
            "W" => Self::W,
            "WI" => Self::Wi,
            "VA" => Self::Va,
            "DQA" => Self::Dqa,
            "WA" => Self::Wa,
            "WO" => Self::Wo,
            "WS" => Self::Ws,
            "DA" => Self::Da,
            "DO" => Self::Do,
            "QA" => Self::Qa,
            "QS" => Self::Qs,
            other => return Err(unknown("operand type", other)),
        })
    }
}

impl OperandType {
    /// Size in bytes of an immediate/offset encoded with this operand
    /// type, given whether a REX.W prefix and/or the 0x66 operand-size
    /// override were consumed. Returns `None` for operand types that
    /// don't denote an immediate-sized scalar (e.g. packed/FPU forms) -
    /// the decoder treats those as unsupported for method `I`/`O`
    /// (spec.md §4.4: "the implementation must reject").
    #[must_use]
    pub fn immediate_size_bytes(self, rex_w: bool, operand_size_override: bool) -> Option<u8> {
        match self {
            Self::B => Some(1),
            Self::W => Some(2),
            Self::D | Self::Di => Some(4),
            Self::Q | Self::Qi => Some(8),
            Self::V | Self::Vqp | Self::Vds | Self::Vs => Some(if rex_w {
                8
            } else if operand_size_override {
                2
            } else {
                4
            }),
            Self::Vq => Some(8),
            _ => None,
        }
    }
}

/// Register class an [`Operand`](super::entry::Operand) names a member of
/// (spec.md §3.1 `Operand.group`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandGroup {
    Gen,
    Mmx,
    Xmm,
    Seg,
    X87Fpu,
    Ctrl,
    Systabp,
    Msr,
    Debug,
    Xcr,
}

impl FromStr for OperandGroup {
    type Err = UnknownEnumerant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GEN" => Self::Gen,
            "MMX" => Self::Mmx,
            "XMM" => Self::Xmm,
            "SEG" => Self::Seg,
            "X87FPU" => Self::X87Fpu,
            "CTRL" => Self::Ctrl,
            "SYSTABP" => Self::Systabp,
            "MSR" => Self::Msr,
            "DEBUG" => Self::Debug,
            "XCR" => Self::Xcr,
            other => return Err(unknown("operand group", other)),
        })
    }
}

/// Register index referenced by an operand (spec.md §3.1 `register_number`).
/// General-purpose/SSE/etc. register slots are small sequential numbers
/// (0-15); MSR indices are sparse hex values, hence a raw numeric newtype
/// rather than a closed enum (spec.md §3.2 does not list this among the
/// "must be implemented verbatim" enumerations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterNumber(pub u32);

impl RegisterNumber {
    pub const STAR: Self = Self(0xC000_0081);
    pub const LSTAR: Self = Self(0xC000_0082);
    pub const SFMASK: Self = Self(0xC000_0084);
    pub const FS_BASE: Self = Self(0xC000_0100 + 2);
    pub const GS_BASE: Self = Self(0xC000_0100 + 3);

    /// Parses the attribute's raw hex text (e.g. `"0"`, `"8B"`, `"c0000081"`).
    pub fn parse(s: &str) -> Result<Self, UnknownEnumerant> {
        crate::hex::parse_hex_bytes(&format!(
            "{}{}",
            if s.len() % 2 == 0 { "" } else { "0" },
            s
        ))
        .ok()
        .map(|bytes| {
            bytes
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
        })
        .map(Self)
        .ok_or_else(|| unknown("register number", s))
    }
}

#[test]
fn test_processor_code_ordering() {
    assert!(ProcessorCode::P8086.value() < ProcessorCode::P4.value());
    assert_eq!("P1MMX".parse::<ProcessorCode>().unwrap(), ProcessorCode::P1Mmx);
}

#[test]
fn test_mode_default_and_parse() {
    assert_eq!(Mode::default(), Mode::R);
    assert_eq!("e".parse::<Mode>().unwrap(), Mode::E);
    assert!("Q".parse::<Mode>().is_err());
}

#[test]
fn test_address_from_str_case_insensitive() {
    assert_eq!("e".parse::<Address>().unwrap(), Address::E);
    assert_eq!("sc".parse::<Address>().unwrap(), Address::Sc);
    assert_eq!("s30".parse::<Address>().unwrap(), Address::S30);
    assert!("zz".parse::<Address>().is_err());
}

#[test]
fn test_address_requires_modrm() {
    assert!(Address::E.requires_modrm());
    assert!(Address::G.requires_modrm());
    assert!(!Address::Z.requires_modrm());
    assert!(!Address::J.requires_modrm());
    assert!(Address::J.is_relative_jump());
}

#[test]
fn test_operand_type_immediate_size() {
    assert_eq!(OperandType::B.immediate_size_bytes(false, false), Some(1));
    assert_eq!(OperandType::V.immediate_size_bytes(false, false), Some(4));
    assert_eq!(OperandType::V.immediate_size_bytes(true, false), Some(8));
    assert_eq!(OperandType::V.immediate_size_bytes(false, true), Some(2));
    assert_eq!(OperandType::Ps.immediate_size_bytes(false, false), None);
}

#[test]
fn test_register_number_parse() {
    assert_eq!(RegisterNumber::parse("0").unwrap(), RegisterNumber(0));
    assert_eq!(RegisterNumber::parse("8B").unwrap(), RegisterNumber(0x8B));
    assert_eq!(
        RegisterNumber::parse("C0000081").unwrap(),
        RegisterNumber::STAR
    );
}

#[test]
fn test_group_tag_parse() {
    assert_eq!("arith".parse::<GroupTag>().unwrap(), GroupTag::Arith);
    assert!("nonsense".parse::<GroupTag>().is_err());
}
