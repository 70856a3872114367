//! Opcode decode tables.
//!
//! The 8080 opcode map is not orthogonal: within each top-2-bit quadrant,
//! some instructions occupy a single full byte, some are parameterized by a
//! register pair field in bits 4-5, and some by a register field in bits 0-2
//! or 3-5. Decode is therefore an ordered rule list per quadrant, widest
//! masks first, so a narrow rule can never claim an opcode a full-byte rule
//! already owns. The same table keys the opcode-name lookup, which keeps
//! dispatch and diagnostics from drifting apart.

/// What an opcode does, before operands are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    // Quadrant 00, full-byte.
    Nop,
    MoveToMemoryImmediate,
    LoadAccumulatorDirect,
    StoreAccumulatorDirect,
    LoadHlDirect,
    StoreHlDirect,
    IncrementMemory,
    DecrementMemory,
    DecimalAdjust,
    RotateLeft,
    RotateRight,
    RotateLeftThroughCarry,
    RotateRightThroughCarry,
    ComplementAccumulator,
    ComplementCarry,
    SetCarry,
    // Quadrant 00, register-pair field.
    LoadPairImmediate,
    LoadAccumulatorIndirect,
    StoreAccumulatorIndirect,
    IncrementPair,
    DecrementPair,
    AddPairToHl,
    // Quadrant 00, register field.
    MoveImmediate,
    IncrementRegister,
    DecrementRegister,
    // Quadrant 01.
    Halt,
    MoveFromMemory,
    MoveToMemory,
    MoveRegister,
    // Quadrant 10, memory operand.
    AddMemory,
    AddMemoryWithCarry,
    SubtractMemory,
    SubtractMemoryWithBorrow,
    AndMemory,
    XorMemory,
    OrMemory,
    CompareMemory,
    // Quadrant 10, register operand.
    AddRegister,
    AddRegisterWithCarry,
    SubtractRegister,
    SubtractRegisterWithBorrow,
    AndRegister,
    XorRegister,
    OrRegister,
    CompareRegister,
    // Quadrant 11, full-byte.
    AddImmediate,
    AddImmediateWithCarry,
    SubtractImmediate,
    SubtractImmediateWithBorrow,
    AndImmediate,
    XorImmediate,
    OrImmediate,
    CompareImmediate,
    Jump,
    Call,
    Return,
    JumpHlIndirect,
    PushStatusWord,
    PopStatusWord,
    ExchangeStackTop,
    MoveHlToSp,
    ExchangeHlDe,
    Input,
    Output,
    EnableInterrupts,
    DisableInterrupts,
    // Quadrant 11, condition / restart / pair fields.
    ConditionalJump,
    ConditionalCall,
    ConditionalReturn,
    Restart,
    Push,
    Pop,
}

impl Kind {
    /// Total encoded instruction length in bytes, immediates included.
    pub const fn length(self) -> u16 {
        match self {
            Kind::LoadAccumulatorDirect
            | Kind::StoreAccumulatorDirect
            | Kind::LoadHlDirect
            | Kind::StoreHlDirect
            | Kind::LoadPairImmediate
            | Kind::Jump
            | Kind::ConditionalJump
            | Kind::Call
            | Kind::ConditionalCall => 3,
            Kind::MoveToMemoryImmediate
            | Kind::MoveImmediate
            | Kind::AddImmediate
            | Kind::AddImmediateWithCarry
            | Kind::SubtractImmediate
            | Kind::SubtractImmediateWithBorrow
            | Kind::AndImmediate
            | Kind::XorImmediate
            | Kind::OrImmediate
            | Kind::CompareImmediate
            | Kind::Input
            | Kind::Output => 2,
            _ => 1,
        }
    }
}

/// A single decode rule: an opcode matches when `opcode & mask == pattern`.
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    pub mask: u8,
    pub pattern: u8,
    pub kind: Kind,
    pub name: &'static str,
}

const fn rule(mask: u8, pattern: u8, kind: Kind, name: &'static str) -> Rule {
    Rule {
        mask,
        pattern,
        kind,
        name,
    }
}

const QUADRANT_00: &[Rule] = &[
    rule(0xff, 0x00, Kind::Nop, "NOP"),
    rule(0xff, 0x36, Kind::MoveToMemoryImmediate, "MVI M"),
    rule(0xff, 0x3a, Kind::LoadAccumulatorDirect, "LDA"),
    rule(0xff, 0x32, Kind::StoreAccumulatorDirect, "STA"),
    rule(0xff, 0x2a, Kind::LoadHlDirect, "LHLD"),
    rule(0xff, 0x22, Kind::StoreHlDirect, "SHLD"),
    rule(0xff, 0x34, Kind::IncrementMemory, "INR M"),
    rule(0xff, 0x35, Kind::DecrementMemory, "DCR M"),
    rule(0xff, 0x27, Kind::DecimalAdjust, "DAA"),
    rule(0xff, 0x07, Kind::RotateLeft, "RLC"),
    rule(0xff, 0x0f, Kind::RotateRight, "RRC"),
    rule(0xff, 0x17, Kind::RotateLeftThroughCarry, "RAL"),
    rule(0xff, 0x1f, Kind::RotateRightThroughCarry, "RAR"),
    rule(0xff, 0x2f, Kind::ComplementAccumulator, "CMA"),
    rule(0xff, 0x3f, Kind::ComplementCarry, "CMC"),
    rule(0xff, 0x37, Kind::SetCarry, "STC"),
    rule(0xcf, 0x01, Kind::LoadPairImmediate, "LXI"),
    rule(0xcf, 0x0a, Kind::LoadAccumulatorIndirect, "LDAX"),
    rule(0xcf, 0x02, Kind::StoreAccumulatorIndirect, "STAX"),
    rule(0xcf, 0x03, Kind::IncrementPair, "INX"),
    rule(0xcf, 0x0b, Kind::DecrementPair, "DCX"),
    rule(0xcf, 0x09, Kind::AddPairToHl, "DAD"),
    rule(0xc7, 0x06, Kind::MoveImmediate, "MVI"),
    rule(0xc7, 0x04, Kind::IncrementRegister, "INR"),
    rule(0xc7, 0x05, Kind::DecrementRegister, "DCR"),
];

const QUADRANT_01: &[Rule] = &[
    rule(0xff, 0x76, Kind::Halt, "HLT"),
    rule(0xc7, 0x46, Kind::MoveFromMemory, "MOV r,M"),
    rule(0xf8, 0x70, Kind::MoveToMemory, "MOV M,r"),
    rule(0xc0, 0x40, Kind::MoveRegister, "MOV"),
];

const QUADRANT_10: &[Rule] = &[
    rule(0xff, 0x86, Kind::AddMemory, "ADD M"),
    rule(0xff, 0x8e, Kind::AddMemoryWithCarry, "ADC M"),
    rule(0xff, 0x96, Kind::SubtractMemory, "SUB M"),
    rule(0xff, 0x9e, Kind::SubtractMemoryWithBorrow, "SBB M"),
    rule(0xff, 0xa6, Kind::AndMemory, "ANA M"),
    rule(0xff, 0xae, Kind::XorMemory, "XRA M"),
    rule(0xff, 0xb6, Kind::OrMemory, "ORA M"),
    rule(0xff, 0xbe, Kind::CompareMemory, "CMP M"),
    rule(0xf8, 0x80, Kind::AddRegister, "ADD"),
    rule(0xf8, 0x88, Kind::AddRegisterWithCarry, "ADC"),
    rule(0xf8, 0x90, Kind::SubtractRegister, "SUB"),
    rule(0xf8, 0x98, Kind::SubtractRegisterWithBorrow, "SBB"),
    rule(0xf8, 0xa0, Kind::AndRegister, "ANA"),
    rule(0xf8, 0xa8, Kind::XorRegister, "XRA"),
    rule(0xf8, 0xb0, Kind::OrRegister, "ORA"),
    rule(0xf8, 0xb8, Kind::CompareRegister, "CMP"),
];

const QUADRANT_11: &[Rule] = &[
    rule(0xff, 0xc6, Kind::AddImmediate, "ADI"),
    rule(0xff, 0xce, Kind::AddImmediateWithCarry, "ACI"),
    rule(0xff, 0xd6, Kind::SubtractImmediate, "SUI"),
    rule(0xff, 0xde, Kind::SubtractImmediateWithBorrow, "SBI"),
    rule(0xff, 0xe6, Kind::AndImmediate, "ANI"),
    rule(0xff, 0xee, Kind::XorImmediate, "XRI"),
    rule(0xff, 0xf6, Kind::OrImmediate, "ORI"),
    rule(0xff, 0xfe, Kind::CompareImmediate, "CPI"),
    rule(0xff, 0xc3, Kind::Jump, "JMP"),
    rule(0xff, 0xcd, Kind::Call, "CALL"),
    rule(0xff, 0xc9, Kind::Return, "RET"),
    rule(0xff, 0xe9, Kind::JumpHlIndirect, "PCHL"),
    rule(0xff, 0xf5, Kind::PushStatusWord, "PUSH PSW"),
    rule(0xff, 0xf1, Kind::PopStatusWord, "POP PSW"),
    rule(0xff, 0xe3, Kind::ExchangeStackTop, "XTHL"),
    rule(0xff, 0xf9, Kind::MoveHlToSp, "SPHL"),
    rule(0xff, 0xeb, Kind::ExchangeHlDe, "XCHG"),
    rule(0xff, 0xdb, Kind::Input, "IN"),
    rule(0xff, 0xd3, Kind::Output, "OUT"),
    rule(0xff, 0xfb, Kind::EnableInterrupts, "EI"),
    rule(0xff, 0xf3, Kind::DisableInterrupts, "DI"),
    rule(0xc7, 0xc2, Kind::ConditionalJump, "Jcond"),
    rule(0xc7, 0xc4, Kind::ConditionalCall, "Ccond"),
    rule(0xc7, 0xc0, Kind::ConditionalReturn, "Rcond"),
    rule(0xc7, 0xc7, Kind::Restart, "RST"),
    rule(0xcf, 0xc5, Kind::Push, "PUSH"),
    rule(0xcf, 0xc1, Kind::Pop, "POP"),
];

/// Find the rule an opcode matches, if any.
///
/// Returns `None` for the twelve undocumented opcode holes; the CPU core
/// turns that into a fatal decode error.
pub fn decode(opcode: u8) -> Option<&'static Rule> {
    let quadrant = match opcode & 0xc0 {
        0x00 => QUADRANT_00,
        0x40 => QUADRANT_01,
        0x80 => QUADRANT_10,
        _ => QUADRANT_11,
    };
    quadrant
        .iter()
        .find(|rule| opcode & rule.mask == rule.pattern)
}

/// Mnemonic for an opcode, for diagnostics only.
pub fn name(opcode: u8) -> &'static str {
    decode(opcode).map_or("???", |rule| rule.name)
}

/// The eight branch conditions, in encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NoCarry,
    Carry,
    ParityOdd,
    ParityEven,
    Plus,
    Minus,
}

impl Condition {
    /// Decode a 3-bit condition field. The order is the canonical 8080
    /// condition table and is fixed.
    pub fn from_encoded(value: u8) -> Condition {
        match value & 0x07 {
            0 => Condition::NotZero,
            1 => Condition::Zero,
            2 => Condition::NoCarry,
            3 => Condition::Carry,
            4 => Condition::ParityOdd,
            5 => Condition::ParityEven,
            6 => Condition::Plus,
            _ => Condition::Minus,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::NotZero => "NZ",
            Condition::Zero => "Z",
            Condition::NoCarry => "NC",
            Condition::Carry => "C",
            Condition::ParityOdd => "PO",
            Condition::ParityEven => "PE",
            Condition::Plus => "P",
            Condition::Minus => "M",
        }
    }
}
