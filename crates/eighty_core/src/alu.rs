use crate::error::CoreError;
use bitflags::bitflags;
use std::ops::{BitAnd, BitOr, BitXor, Shl, Shr};

bitflags! {
    /// The five 8080 condition flags.
    ///
    /// The same type doubles as the "flags to exclude" mask passed to
    /// [`Alu::operate`]: a flag named in the mask keeps its prior value
    /// instead of being recomputed.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FlagMask: u8 {
        const ZERO = 1 << 0;
        const SIGN = 1 << 1;
        const PARITY = 1 << 2;
        const CARRY = 1 << 3;
        const AUX_CARRY = 1 << 4;
    }
}

impl FlagMask {
    /// Carry and auxiliary carry together; the logical instructions clear
    /// both.
    pub const CARRIES: FlagMask = FlagMask::CARRY.union(FlagMask::AUX_CARRY);

    /// Everything except carry. Rotates and DAD recompute carry only.
    pub const ALL_BUT_CARRY: FlagMask = FlagMask::ZERO
        .union(FlagMask::SIGN)
        .union(FlagMask::PARITY)
        .union(FlagMask::AUX_CARRY);
}

// Bit positions in the packed processor status word (PUSH/POP PSW).
const STATUS_CARRY: u8 = 1 << 0;
const STATUS_PARITY: u8 = 1 << 2;
const STATUS_AUX_CARRY: u8 = 1 << 4;
const STATUS_FIXED_ONE: u8 = 1 << 5;
const STATUS_ZERO: u8 = 1 << 6;
const STATUS_SIGN: u8 = 1 << 7;

/// ALU operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    And,
    Or,
    Xor,
    RotateRight,
    RotateLeft,
}

/// Unsigned operand widths the ALU works over (u8 and u16).
pub trait Operand:
    Copy
    + Eq
    + Ord
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    const BITS: u32;
    const ZERO: Self;
    const ONE: Self;

    /// Sum with carry-in, reduced to the operand width, plus whether the
    /// unreduced sum overflowed it.
    fn add_with_carry(self, rhs: Self, carry: bool) -> (Self, bool);
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn count_ones(self) -> u32;
}

macro_rules! impl_operand {
    ($narrow:ty, $wide:ty) => {
        impl Operand for $narrow {
            const BITS: u32 = <$narrow>::BITS;
            const ZERO: $narrow = 0;
            const ONE: $narrow = 1;

            fn add_with_carry(self, rhs: $narrow, carry: bool) -> ($narrow, bool) {
                let sum = self as $wide + rhs as $wide + carry as $wide;
                (sum as $narrow, sum > <$narrow>::MAX as $wide)
            }

            fn wrapping_add(self, rhs: $narrow) -> $narrow {
                <$narrow>::wrapping_add(self, rhs)
            }

            fn wrapping_sub(self, rhs: $narrow) -> $narrow {
                <$narrow>::wrapping_sub(self, rhs)
            }

            fn count_ones(self) -> u32 {
                <$narrow>::count_ones(self)
            }
        }
    };
}

impl_operand!(u8, u16);
impl_operand!(u16, u32);

/// The arithmetic/logic unit: computes results and condition flags
/// together, so a flag can never reflect anything but the most recent
/// non-excluded operation.
#[derive(Clone, Copy, Debug)]
pub struct Alu {
    flags: FlagMask,
}

impl Alu {
    /// Build the ALU and run the carry self-test.
    ///
    /// Every carry and borrow in the core rests on the overflow check in
    /// `add_with_carry`; if a known-overflowing add does not raise carry,
    /// construction fails and no instruction may execute.
    pub fn new() -> Result<Alu, CoreError> {
        let mut alu = Alu {
            flags: FlagMask::empty(),
        };
        alu.operate::<u8>(0xff, 0xff, Operation::Add, FlagMask::empty(), false);
        if !alu.flag(FlagMask::CARRY) {
            return Err(CoreError::SelfTest);
        }
        alu.flags = FlagMask::empty();
        Ok(alu)
    }

    #[inline]
    pub fn flag(&self, flag: FlagMask) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn set_flag(&mut self, flags: FlagMask, value: bool) {
        self.flags.set(flags, value);
    }

    /// Pack the flags into the processor status word used by PUSH PSW.
    ///
    /// Layout: bit 0 carry, bit 2 parity, bit 4 aux carry, bit 6 zero,
    /// bit 7 sign, bit 5 fixed to one, the rest zero.
    pub fn status_byte(&self) -> u8 {
        let mut byte = STATUS_FIXED_ONE;
        if self.flag(FlagMask::CARRY) {
            byte |= STATUS_CARRY;
        }
        if self.flag(FlagMask::PARITY) {
            byte |= STATUS_PARITY;
        }
        if self.flag(FlagMask::AUX_CARRY) {
            byte |= STATUS_AUX_CARRY;
        }
        if self.flag(FlagMask::ZERO) {
            byte |= STATUS_ZERO;
        }
        if self.flag(FlagMask::SIGN) {
            byte |= STATUS_SIGN;
        }
        byte
    }

    /// Restore the flags from a processor status word (POP PSW). Fixed and
    /// unused bits are ignored.
    pub fn set_from_status_byte(&mut self, byte: u8) {
        self.set_flag(FlagMask::CARRY, byte & STATUS_CARRY != 0);
        self.set_flag(FlagMask::PARITY, byte & STATUS_PARITY != 0);
        self.set_flag(FlagMask::AUX_CARRY, byte & STATUS_AUX_CARRY != 0);
        self.set_flag(FlagMask::ZERO, byte & STATUS_ZERO != 0);
        self.set_flag(FlagMask::SIGN, byte & STATUS_SIGN != 0);
    }

    /// Perform one ALU operation and update every flag not named in
    /// `exclude`.
    ///
    /// `use_carry` threads the current carry flag in as the third operand
    /// (ADC/SBB/RAL/RAR); the flag value captured before the operation is
    /// the one that participates.
    pub fn operate<T: Operand>(
        &mut self,
        first: T,
        second: T,
        op: Operation,
        exclude: FlagMask,
        use_carry: bool,
    ) -> T {
        let carry_in = self.flag(FlagMask::CARRY);

        let result = match op {
            Operation::Add => {
                let (result, carry) = first.add_with_carry(second, use_carry && carry_in);
                if !exclude.contains(FlagMask::CARRY) {
                    self.set_flag(FlagMask::CARRY, carry);
                }
                result
            }
            Operation::Subtract => {
                if use_carry {
                    let borrow = if carry_in { T::ONE } else { T::ZERO };
                    if !exclude.contains(FlagMask::CARRY) {
                        // Borrow detection checks the incoming borrow against
                        // the subtrahend first; this ordering is the hardware
                        // contract.
                        self.set_flag(
                            FlagMask::CARRY,
                            borrow > second || second.wrapping_sub(borrow) > first,
                        );
                    }
                    first.wrapping_sub(second).wrapping_sub(borrow)
                } else {
                    if !exclude.contains(FlagMask::CARRY) {
                        self.set_flag(FlagMask::CARRY, second > first);
                    }
                    first.wrapping_sub(second)
                }
            }
            // The logical family never touches carry here; instructions that
            // require a cleared carry do that themselves.
            Operation::And => first & second,
            Operation::Or => first | second,
            Operation::Xor => first ^ second,
            Operation::RotateRight => {
                let exiting = first & T::ONE != T::ZERO;
                let entering = if use_carry { carry_in } else { exiting };
                let mut result = first >> 1;
                if entering {
                    result = result | (T::ONE << (T::BITS - 1));
                }
                if !exclude.contains(FlagMask::CARRY) {
                    self.set_flag(FlagMask::CARRY, exiting);
                }
                result
            }
            Operation::RotateLeft => {
                let exiting = (first >> (T::BITS - 1)) & T::ONE != T::ZERO;
                let entering = if use_carry { carry_in } else { exiting };
                let mut result = first << 1;
                if entering {
                    result = result | T::ONE;
                }
                if !exclude.contains(FlagMask::CARRY) {
                    self.set_flag(FlagMask::CARRY, exiting);
                }
                result
            }
        };

        if !exclude.contains(FlagMask::AUX_CARRY) {
            // Carry out of bit 3, recovered from the operand and result bit
            // patterns rather than re-simulated nibble arithmetic.
            let carry_bits = result ^ first ^ second;
            self.set_flag(FlagMask::AUX_CARRY, (carry_bits >> 4) & T::ONE != T::ZERO);
        }
        if !exclude.contains(FlagMask::ZERO) {
            self.set_flag(FlagMask::ZERO, result == T::ZERO);
        }
        if !exclude.contains(FlagMask::SIGN) {
            self.set_flag(FlagMask::SIGN, (result >> (T::BITS - 1)) & T::ONE != T::ZERO);
        }
        if !exclude.contains(FlagMask::PARITY) {
            self.set_flag(FlagMask::PARITY, result.count_ones() % 2 == 0);
        }

        result
    }
}
