use crate::registers::RegisterPair;
use thiserror::Error;

/// Fatal interpreter errors.
///
/// Address arithmetic never fails: PC, SP and every memory access wrap to
/// 16 bits, which is the defined hardware behavior. What remains are the
/// cases where continuing would silently desynchronize control flow, so
/// `step` stops and surfaces them instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The fetched opcode matched no decode rule.
    #[error("no instruction matches opcode {opcode:#04x} at pc {pc:#06x}")]
    Decode { opcode: u8, pc: u16 },

    /// An indirect accumulator load/store named a pair other than BC or DE.
    #[error("indirect load/store through {pair:?} is not a valid encoding (opcode {opcode:#04x})")]
    IndirectPair { pair: RegisterPair, opcode: u8 },

    /// The ALU carry self-check failed at construction; no arithmetic result
    /// can be trusted, so no instruction may execute.
    #[error("ALU carry self-test failed")]
    SelfTest,
}
