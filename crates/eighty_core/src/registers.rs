/// Register file for the Intel 8080.
///
/// Nine 8-bit cells plus a dedicated 16-bit stack pointer. W and Z are the
/// internal scratch pair the hardware uses while forming addresses; no
/// instruction register field can name them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    B,
    C,
    D,
    E,
    H,
    L,
    W,
    Z,
    A,
}

/// A 16-bit view over two adjacent registers, or the stack pointer.
///
/// The pair's first-named register holds the high-order byte; every opcode
/// handler relies on that ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterPair {
    BC,
    DE,
    HL,
    SP,
}

impl Register {
    /// Decode a 3-bit register field from an opcode.
    ///
    /// Values 0-5 name B, C, D, E, H, L and 7 names A. The encoding 6
    /// selects the memory operand, which has no register; the CPU core
    /// handles that case before consulting this table.
    pub fn from_encoded(value: u8) -> Option<Register> {
        match value & 0x07 {
            0 => Some(Register::B),
            1 => Some(Register::C),
            2 => Some(Register::D),
            3 => Some(Register::E),
            4 => Some(Register::H),
            5 => Some(Register::L),
            7 => Some(Register::A),
            _ => None,
        }
    }
}

impl RegisterPair {
    /// Decode a 2-bit register pair field from an opcode.
    pub fn from_encoded(value: u8) -> RegisterPair {
        match value & 0x03 {
            0 => RegisterPair::BC,
            1 => RegisterPair::DE,
            2 => RegisterPair::HL,
            _ => RegisterPair::SP,
        }
    }

    /// Component registers as (high, low). SP is a dedicated 16-bit store
    /// and never reaches this.
    fn registers(self) -> (Register, Register) {
        match self {
            RegisterPair::BC => (Register::B, Register::C),
            RegisterPair::DE => (Register::D, Register::E),
            RegisterPair::HL => (Register::H, Register::L),
            RegisterPair::SP => unreachable!("SP has no component registers"),
        }
    }
}

/// The register cells themselves, zero-initialized at CPU construction and
/// only mutated through `set`/`set_pair`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterSet {
    cells: [u8; 9],
    stack_pointer: u16,
}

impl RegisterSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u8 {
        self.cells[reg as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u8) {
        self.cells[reg as usize] = value;
    }

    /// Compose a pair into its 16-bit value.
    pub fn pair(&self, pair: RegisterPair) -> u16 {
        if pair == RegisterPair::SP {
            return self.stack_pointer;
        }
        let (high, low) = pair.registers();
        u16::from_be_bytes([self.get(high), self.get(low)])
    }

    /// Decompose a 16-bit value into a pair.
    pub fn set_pair(&mut self, pair: RegisterPair, value: u16) {
        if pair == RegisterPair::SP {
            self.stack_pointer = value;
            return;
        }
        let (high_reg, low_reg) = pair.registers();
        let [high, low] = value.to_be_bytes();
        self.set(high_reg, high);
        self.set(low_reg, low);
    }

    /// Set a pair from explicit high and low bytes.
    pub fn set_pair_bytes(&mut self, pair: RegisterPair, high: u8, low: u8) {
        self.set_pair(pair, u16::from_be_bytes([high, low]));
    }
}

#[cfg(test)]
mod tests {
    use super::{Register, RegisterPair, RegisterSet};

    #[test]
    fn registers_start_zeroed() {
        let regs = RegisterSet::new();
        for reg in [
            Register::B,
            Register::C,
            Register::D,
            Register::E,
            Register::H,
            Register::L,
            Register::W,
            Register::Z,
            Register::A,
        ] {
            assert_eq!(regs.get(reg), 0);
        }
        assert_eq!(regs.pair(RegisterPair::SP), 0);
    }

    #[test]
    fn pair_round_trips_for_all_byte_pairs() {
        let mut regs = RegisterSet::new();
        for pair in [RegisterPair::BC, RegisterPair::DE, RegisterPair::HL] {
            for high in [0x00u8, 0x01, 0x7f, 0x80, 0xff] {
                for low in [0x00u8, 0x01, 0x7f, 0x80, 0xff] {
                    regs.set_pair_bytes(pair, high, low);
                    assert_eq!(regs.pair(pair), u16::from(high) << 8 | u16::from(low));
                }
            }
        }
    }

    #[test]
    fn first_named_register_is_the_high_byte() {
        let mut regs = RegisterSet::new();
        regs.set_pair(RegisterPair::BC, 0x1234);
        assert_eq!(regs.get(Register::B), 0x12);
        assert_eq!(regs.get(Register::C), 0x34);

        regs.set(Register::D, 0xab);
        regs.set(Register::E, 0xcd);
        assert_eq!(regs.pair(RegisterPair::DE), 0xabcd);
    }

    #[test]
    fn stack_pointer_round_trips() {
        let mut regs = RegisterSet::new();
        for value in [0x0000u16, 0x0001, 0x7fff, 0x8000, 0xfffe, 0xffff] {
            regs.set_pair(RegisterPair::SP, value);
            assert_eq!(regs.pair(RegisterPair::SP), value);
        }
        // SP never aliases the 8-bit cells.
        assert_eq!(regs.get(Register::H), 0);
        assert_eq!(regs.get(Register::L), 0);
    }

    #[test]
    fn register_encoding_matches_the_8080_table() {
        assert_eq!(Register::from_encoded(0), Some(Register::B));
        assert_eq!(Register::from_encoded(1), Some(Register::C));
        assert_eq!(Register::from_encoded(2), Some(Register::D));
        assert_eq!(Register::from_encoded(3), Some(Register::E));
        assert_eq!(Register::from_encoded(4), Some(Register::H));
        assert_eq!(Register::from_encoded(5), Some(Register::L));
        assert_eq!(Register::from_encoded(6), None);
        assert_eq!(Register::from_encoded(7), Some(Register::A));
    }

    #[test]
    fn pair_encoding_matches_the_8080_table() {
        assert_eq!(RegisterPair::from_encoded(0), RegisterPair::BC);
        assert_eq!(RegisterPair::from_encoded(1), RegisterPair::DE);
        assert_eq!(RegisterPair::from_encoded(2), RegisterPair::HL);
        assert_eq!(RegisterPair::from_encoded(3), RegisterPair::SP);
    }
}
