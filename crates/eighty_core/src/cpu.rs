use crate::alu::{Alu, FlagMask, Operation};
use crate::decode::{self, Condition, Kind};
use crate::error::CoreError;
use crate::registers::{Register, RegisterPair, RegisterSet};
use std::fmt::Write as _;

/// Total addressable memory (64 KiB).
pub const MEMORY_SIZE: usize = 0x10000;

/// Host side of the IN/OUT instructions.
///
/// The CPU knows nothing about port semantics; the machine built around it
/// decides what lives behind each port number. Calls are synchronous from
/// inside instruction execution and must not mutate CPU-owned state.
pub trait PortIo {
    fn read_port(&mut self, port: u8) -> u8;
    fn write_port(&mut self, port: u8, value: u8);
}

/// Intel 8080 interpreter core.
///
/// Owns the register file, the flag engine and the full 64 KiB address
/// space; code and data share the same array. The host seeds memory with
/// [`Cpu::load`], points the program counter at the entry, then calls
/// [`Cpu::step`] repeatedly.
pub struct Cpu<P: PortIo> {
    memory: Box<[u8; MEMORY_SIZE]>,
    regs: RegisterSet,
    alu: Alu,
    pc: u16,
    current_opcode: u8,
    halted: bool,
    interrupts_enabled: bool,
    ports: P,
}

impl<P: PortIo> Cpu<P> {
    /// Build a CPU around a port collaborator.
    ///
    /// Fails only if the ALU carry self-test fails.
    pub fn new(ports: P) -> Result<Self, CoreError> {
        Ok(Self {
            memory: Box::new([0; MEMORY_SIZE]),
            regs: RegisterSet::new(),
            alu: Alu::new()?,
            pc: 0,
            current_opcode: 0,
            halted: false,
            interrupts_enabled: false,
            ports,
        })
    }

    /// Seed memory with program bytes. Addresses wrap like every other
    /// memory access.
    pub fn load(&mut self, origin: u16, bytes: &[u8]) {
        for (offset, &byte) in bytes.iter().enumerate() {
            self.mem_write(origin.wrapping_add(offset as u16), byte);
        }
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline]
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    #[inline]
    pub fn registers(&self) -> &RegisterSet {
        &self.regs
    }

    #[inline]
    pub fn registers_mut(&mut self) -> &mut RegisterSet {
        &mut self.regs
    }

    #[inline]
    pub fn alu(&self) -> &Alu {
        &self.alu
    }

    #[inline]
    pub fn ports(&self) -> &P {
        &self.ports
    }

    #[inline]
    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    #[inline]
    pub fn memory(&self) -> &[u8] {
        &self.memory[..]
    }

    #[inline]
    pub fn mem_read(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    #[inline]
    pub fn mem_write(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }

    /// Run one fetch/decode/execute cycle.
    ///
    /// A halted CPU does nothing: no fetch, no side effects. A decode
    /// failure aborts the cycle before the instruction mutates any state.
    pub fn step(&mut self) -> Result<(), CoreError> {
        if self.halted {
            return Ok(());
        }
        self.current_opcode = self.mem_read(self.pc);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}", self.snapshot());
        }
        self.execute(false)
    }

    /// Inject an opcode from outside, bypassing the ordinary fetch.
    ///
    /// This models the hardware interrupt sequence: the device places an
    /// instruction (normally RST n) on the bus and the CPU executes it in
    /// place of a fetch, so a restart pushes the unadvanced program counter
    /// as the resume address. Ignored while interrupts are disabled;
    /// accepting an interrupt disables further ones and leaves the halted
    /// state. Returns whether the opcode was accepted.
    pub fn interrupt(&mut self, opcode: u8) -> Result<bool, CoreError> {
        if !self.interrupts_enabled {
            return Ok(false);
        }
        self.interrupts_enabled = false;
        self.halted = false;
        self.current_opcode = opcode;
        self.execute(true)?;
        Ok(true)
    }

    /// Read-only snapshot of the latched instruction and machine state.
    pub fn snapshot(&self) -> String {
        let rule = decode::decode(self.current_opcode);
        let name = rule.map_or("???", |r| r.name);
        let length = rule.map_or(1, |r| r.kind.length());
        let mut operands = String::new();
        for offset in 1..length {
            let _ = write!(
                operands,
                " {:02x}",
                self.mem_read(self.pc.wrapping_add(offset))
            );
        }
        let flags = self.alu;
        format!(
            "pc={:04x} op={:02x}{} [{}] a={:02x} b={:02x} c={:02x} d={:02x} e={:02x} \
             h={:02x} l={:02x} wz={:02x}{:02x} sp={:04x} \
             z={} s={} p={} cy={} ac={}",
            self.pc,
            self.current_opcode,
            operands,
            name,
            self.regs.get(Register::A),
            self.regs.get(Register::B),
            self.regs.get(Register::C),
            self.regs.get(Register::D),
            self.regs.get(Register::E),
            self.regs.get(Register::H),
            self.regs.get(Register::L),
            self.regs.get(Register::W),
            self.regs.get(Register::Z),
            self.regs.pair(RegisterPair::SP),
            u8::from(flags.flag(FlagMask::ZERO)),
            u8::from(flags.flag(FlagMask::SIGN)),
            u8::from(flags.flag(FlagMask::PARITY)),
            u8::from(flags.flag(FlagMask::CARRY)),
            u8::from(flags.flag(FlagMask::AUX_CARRY)),
        )
    }

    // ---- operand helpers -------------------------------------------------

    fn decode_failure(&self) -> CoreError {
        CoreError::Decode {
            opcode: self.current_opcode,
            pc: self.pc,
        }
    }

    /// Destination register from bits 3-5 of the latched opcode.
    fn dest_register(&self) -> Result<Register, CoreError> {
        Register::from_encoded((self.current_opcode >> 3) & 0x07).ok_or_else(|| self.decode_failure())
    }

    /// Source register from bits 0-2 of the latched opcode.
    fn src_register(&self) -> Result<Register, CoreError> {
        Register::from_encoded(self.current_opcode & 0x07).ok_or_else(|| self.decode_failure())
    }

    /// Register pair from bits 4-5 of the latched opcode.
    fn register_pair(&self) -> RegisterPair {
        RegisterPair::from_encoded((self.current_opcode >> 4) & 0x03)
    }

    /// Immediate data byte following the opcode.
    fn data_byte(&self) -> u8 {
        self.mem_read(self.pc.wrapping_add(1))
    }

    /// 16-bit address from the two bytes following the opcode, low byte
    /// first. ROM images encode addresses little-endian; inverting this is
    /// a correctness bug, not a style choice.
    fn address_in_data_bytes(&self) -> u16 {
        let low = self.mem_read(self.pc.wrapping_add(1));
        let high = self.mem_read(self.pc.wrapping_add(2));
        u16::from_le_bytes([low, high])
    }

    fn advance(&mut self, length: u16) {
        self.pc = self.pc.wrapping_add(length);
    }

    fn condition_holds(&self) -> bool {
        match Condition::from_encoded((self.current_opcode >> 3) & 0x07) {
            Condition::NotZero => !self.alu.flag(FlagMask::ZERO),
            Condition::Zero => self.alu.flag(FlagMask::ZERO),
            Condition::NoCarry => !self.alu.flag(FlagMask::CARRY),
            Condition::Carry => self.alu.flag(FlagMask::CARRY),
            Condition::ParityOdd => !self.alu.flag(FlagMask::PARITY),
            Condition::ParityEven => self.alu.flag(FlagMask::PARITY),
            Condition::Plus => !self.alu.flag(FlagMask::SIGN),
            Condition::Minus => self.alu.flag(FlagMask::SIGN),
        }
    }

    // ---- stack discipline ------------------------------------------------

    /// Push a 16-bit value: high byte at SP-1, low byte at SP-2.
    fn push_word(&mut self, value: u16) {
        let [high, low] = value.to_be_bytes();
        let mut sp = self.regs.pair(RegisterPair::SP);
        sp = sp.wrapping_sub(1);
        self.mem_write(sp, high);
        sp = sp.wrapping_sub(1);
        self.mem_write(sp, low);
        self.regs.set_pair(RegisterPair::SP, sp);
    }

    /// Pop a 16-bit value in the byte order `push_word` wrote it.
    fn pop_word(&mut self) -> u16 {
        let sp = self.regs.pair(RegisterPair::SP);
        let low = self.mem_read(sp);
        let high = self.mem_read(sp.wrapping_add(1));
        self.regs.set_pair(RegisterPair::SP, sp.wrapping_add(2));
        u16::from_be_bytes([high, low])
    }

    /// Push the address of the instruction after the call, then jump to the
    /// call target.
    fn call(&mut self) {
        let target = self.address_in_data_bytes();
        let resume = self.pc.wrapping_add(3);
        self.push_word(resume);
        self.pc = target;
    }

    fn ret(&mut self) {
        self.pc = self.pop_word();
    }

    // ---- accumulator ALU families ---------------------------------------

    /// ADD/ADC/SUB/SBB against the accumulator, all flags recomputed.
    fn accumulator_arithmetic(&mut self, value: u8, op: Operation, use_carry: bool) {
        let a = self.regs.get(Register::A);
        let result = self
            .alu
            .operate::<u8>(a, value, op, FlagMask::empty(), use_carry);
        self.regs.set(Register::A, result);
    }

    /// ANA against a register or memory operand: carry excluded and then
    /// cleared, aux carry recomputed from the operand bit patterns. The
    /// immediate form (ANI) clears aux carry instead and goes through
    /// `accumulator_logical`.
    fn accumulator_and(&mut self, value: u8) {
        let a = self.regs.get(Register::A);
        let result = self
            .alu
            .operate::<u8>(a, value, Operation::And, FlagMask::CARRY, false);
        self.alu.set_flag(FlagMask::CARRY, false);
        self.regs.set(Register::A, result);
    }

    /// ORA/XRA/ANI and the or/xor immediates: both carries excluded, then
    /// cleared.
    fn accumulator_logical(&mut self, value: u8, op: Operation) {
        let a = self.regs.get(Register::A);
        let result = self
            .alu
            .operate::<u8>(a, value, op, FlagMask::CARRIES, false);
        self.alu.set_flag(FlagMask::CARRIES, false);
        self.regs.set(Register::A, result);
    }

    /// CMP/CPI: subtraction flags, but Zero and Carry re-derived from a
    /// direct operand comparison, which is what the hardware documents.
    fn compare(&mut self, value: u8) {
        let a = self.regs.get(Register::A);
        self.alu.operate::<u8>(
            a,
            value,
            Operation::Subtract,
            FlagMask::ZERO | FlagMask::CARRY,
            false,
        );
        self.alu.set_flag(FlagMask::ZERO, a == value);
        self.alu.set_flag(FlagMask::CARRY, a < value);
    }

    /// Accumulator rotate; only carry is recomputed.
    fn rotate(&mut self, op: Operation, through_carry: bool) {
        let a = self.regs.get(Register::A);
        let result = self
            .alu
            .operate::<u8>(a, 0, op, FlagMask::ALL_BUT_CARRY, through_carry);
        self.regs.set(Register::A, result);
    }

    fn memory_operand(&self) -> u8 {
        self.mem_read(self.regs.pair(RegisterPair::HL))
    }

    /// LDAX/STAX address; the encoding only supports BC and DE, anything
    /// else is a decode error.
    fn indirect_address(&self) -> Result<u16, CoreError> {
        let pair = self.register_pair();
        if pair != RegisterPair::BC && pair != RegisterPair::DE {
            return Err(CoreError::IndirectPair {
                pair,
                opcode: self.current_opcode,
            });
        }
        Ok(self.regs.pair(pair))
    }

    // ---- decode/execute --------------------------------------------------

    /// Execute the latched opcode.
    ///
    /// `injected` marks an interrupt injection: the opcode did not come from
    /// `memory[pc]`, so a restart must push the unadvanced program counter.
    fn execute(&mut self, injected: bool) -> Result<(), CoreError> {
        let kind = decode::decode(self.current_opcode)
            .ok_or_else(|| self.decode_failure())?
            .kind;

        match kind {
            Kind::Nop => self.advance(1),

            // -- moves and loads --
            Kind::MoveToMemoryImmediate => {
                let addr = self.regs.pair(RegisterPair::HL);
                let value = self.data_byte();
                self.mem_write(addr, value);
                self.advance(2);
            }
            Kind::MoveImmediate => {
                let dest = self.dest_register()?;
                let value = self.data_byte();
                self.regs.set(dest, value);
                self.advance(2);
            }
            Kind::LoadAccumulatorDirect => {
                let value = self.mem_read(self.address_in_data_bytes());
                self.regs.set(Register::A, value);
                self.advance(3);
            }
            Kind::StoreAccumulatorDirect => {
                let addr = self.address_in_data_bytes();
                self.mem_write(addr, self.regs.get(Register::A));
                self.advance(3);
            }
            Kind::LoadHlDirect => {
                let addr = self.address_in_data_bytes();
                let low = self.mem_read(addr);
                let high = self.mem_read(addr.wrapping_add(1));
                self.regs.set(Register::L, low);
                self.regs.set(Register::H, high);
                self.advance(3);
            }
            Kind::StoreHlDirect => {
                let addr = self.address_in_data_bytes();
                self.mem_write(addr, self.regs.get(Register::L));
                self.mem_write(addr.wrapping_add(1), self.regs.get(Register::H));
                self.advance(3);
            }
            Kind::LoadAccumulatorIndirect => {
                let addr = self.indirect_address()?;
                let value = self.mem_read(addr);
                self.regs.set(Register::A, value);
                self.advance(1);
            }
            Kind::StoreAccumulatorIndirect => {
                let addr = self.indirect_address()?;
                self.mem_write(addr, self.regs.get(Register::A));
                self.advance(1);
            }
            Kind::LoadPairImmediate => {
                let pair = self.register_pair();
                let low = self.mem_read(self.pc.wrapping_add(1));
                let high = self.mem_read(self.pc.wrapping_add(2));
                self.regs.set_pair_bytes(pair, high, low);
                self.advance(3);
            }
            Kind::MoveFromMemory => {
                let dest = self.dest_register()?;
                let value = self.memory_operand();
                self.regs.set(dest, value);
                self.advance(1);
            }
            Kind::MoveToMemory => {
                let src = self.src_register()?;
                let addr = self.regs.pair(RegisterPair::HL);
                self.mem_write(addr, self.regs.get(src));
                self.advance(1);
            }
            Kind::MoveRegister => {
                let dest = self.dest_register()?;
                let src = self.src_register()?;
                let value = self.regs.get(src);
                self.regs.set(dest, value);
                self.advance(1);
            }

            // -- increments, decrements, pair arithmetic --
            Kind::IncrementRegister | Kind::DecrementRegister => {
                let op = if kind == Kind::IncrementRegister {
                    Operation::Add
                } else {
                    Operation::Subtract
                };
                let dest = self.dest_register()?;
                let value = self.regs.get(dest);
                let result = self.alu.operate::<u8>(value, 1, op, FlagMask::CARRY, false);
                self.regs.set(dest, result);
                self.advance(1);
            }
            Kind::IncrementMemory | Kind::DecrementMemory => {
                let op = if kind == Kind::IncrementMemory {
                    Operation::Add
                } else {
                    Operation::Subtract
                };
                let addr = self.regs.pair(RegisterPair::HL);
                let value = self.mem_read(addr);
                let result = self.alu.operate::<u8>(value, 1, op, FlagMask::CARRY, false);
                self.mem_write(addr, result);
                self.advance(1);
            }
            Kind::IncrementPair => {
                let pair = self.register_pair();
                let value = self.regs.pair(pair).wrapping_add(1);
                self.regs.set_pair(pair, value);
                self.advance(1);
            }
            Kind::DecrementPair => {
                let pair = self.register_pair();
                let value = self.regs.pair(pair).wrapping_sub(1);
                self.regs.set_pair(pair, value);
                self.advance(1);
            }
            Kind::AddPairToHl => {
                let hl = self.regs.pair(RegisterPair::HL);
                let other = self.regs.pair(self.register_pair());
                let result = self.alu.operate::<u16>(
                    hl,
                    other,
                    Operation::Add,
                    FlagMask::ALL_BUT_CARRY,
                    false,
                );
                self.regs.set_pair(RegisterPair::HL, result);
                self.advance(1);
            }

            // -- accumulator arithmetic and logic --
            Kind::AddRegister => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_arithmetic(value, Operation::Add, false);
                self.advance(1);
            }
            Kind::AddRegisterWithCarry => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_arithmetic(value, Operation::Add, true);
                self.advance(1);
            }
            Kind::SubtractRegister => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_arithmetic(value, Operation::Subtract, false);
                self.advance(1);
            }
            Kind::SubtractRegisterWithBorrow => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_arithmetic(value, Operation::Subtract, true);
                self.advance(1);
            }
            Kind::AndRegister => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_and(value);
                self.advance(1);
            }
            Kind::XorRegister => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_logical(value, Operation::Xor);
                self.advance(1);
            }
            Kind::OrRegister => {
                let value = self.regs.get(self.src_register()?);
                self.accumulator_logical(value, Operation::Or);
                self.advance(1);
            }
            Kind::CompareRegister => {
                let value = self.regs.get(self.src_register()?);
                self.compare(value);
                self.advance(1);
            }

            Kind::AddMemory => {
                let value = self.memory_operand();
                self.accumulator_arithmetic(value, Operation::Add, false);
                self.advance(1);
            }
            Kind::AddMemoryWithCarry => {
                let value = self.memory_operand();
                self.accumulator_arithmetic(value, Operation::Add, true);
                self.advance(1);
            }
            Kind::SubtractMemory => {
                let value = self.memory_operand();
                self.accumulator_arithmetic(value, Operation::Subtract, false);
                self.advance(1);
            }
            Kind::SubtractMemoryWithBorrow => {
                let value = self.memory_operand();
                self.accumulator_arithmetic(value, Operation::Subtract, true);
                self.advance(1);
            }
            Kind::AndMemory => {
                let value = self.memory_operand();
                self.accumulator_and(value);
                self.advance(1);
            }
            Kind::XorMemory => {
                let value = self.memory_operand();
                self.accumulator_logical(value, Operation::Xor);
                self.advance(1);
            }
            Kind::OrMemory => {
                let value = self.memory_operand();
                self.accumulator_logical(value, Operation::Or);
                self.advance(1);
            }
            Kind::CompareMemory => {
                let value = self.memory_operand();
                self.compare(value);
                self.advance(1);
            }

            Kind::AddImmediate => {
                let value = self.data_byte();
                self.accumulator_arithmetic(value, Operation::Add, false);
                self.advance(2);
            }
            Kind::AddImmediateWithCarry => {
                let value = self.data_byte();
                self.accumulator_arithmetic(value, Operation::Add, true);
                self.advance(2);
            }
            Kind::SubtractImmediate => {
                let value = self.data_byte();
                self.accumulator_arithmetic(value, Operation::Subtract, false);
                self.advance(2);
            }
            Kind::SubtractImmediateWithBorrow => {
                let value = self.data_byte();
                self.accumulator_arithmetic(value, Operation::Subtract, true);
                self.advance(2);
            }
            Kind::AndImmediate => {
                let value = self.data_byte();
                self.accumulator_logical(value, Operation::And);
                self.advance(2);
            }
            Kind::XorImmediate => {
                let value = self.data_byte();
                self.accumulator_logical(value, Operation::Xor);
                self.advance(2);
            }
            Kind::OrImmediate => {
                let value = self.data_byte();
                self.accumulator_logical(value, Operation::Or);
                self.advance(2);
            }
            Kind::CompareImmediate => {
                let value = self.data_byte();
                self.compare(value);
                self.advance(2);
            }

            // -- rotates and flag/accumulator specials --
            Kind::RotateLeft => {
                self.rotate(Operation::RotateLeft, false);
                self.advance(1);
            }
            Kind::RotateRight => {
                self.rotate(Operation::RotateRight, false);
                self.advance(1);
            }
            Kind::RotateLeftThroughCarry => {
                self.rotate(Operation::RotateLeft, true);
                self.advance(1);
            }
            Kind::RotateRightThroughCarry => {
                self.rotate(Operation::RotateRight, true);
                self.advance(1);
            }
            Kind::DecimalAdjust => {
                let a = self.regs.get(Register::A);
                let low = a & 0x0f;
                let high = a >> 4;
                let mut carry = self.alu.flag(FlagMask::CARRY);
                let mut adjust = 0u8;
                if low > 9 || self.alu.flag(FlagMask::AUX_CARRY) {
                    adjust |= 0x06;
                }
                if high > 9 || carry || (high >= 9 && low > 9) {
                    adjust |= 0x60;
                    carry = true;
                }
                let result =
                    self.alu
                        .operate::<u8>(a, adjust, Operation::Add, FlagMask::empty(), false);
                // Carry out of the decimal adjust is sticky: a set carry is
                // never cleared by DAA.
                self.alu.set_flag(FlagMask::CARRY, carry);
                self.regs.set(Register::A, result);
                self.advance(1);
            }
            Kind::ComplementAccumulator => {
                let a = self.regs.get(Register::A);
                self.regs.set(Register::A, !a);
                self.advance(1);
            }
            Kind::ComplementCarry => {
                let carry = self.alu.flag(FlagMask::CARRY);
                self.alu.set_flag(FlagMask::CARRY, !carry);
                self.advance(1);
            }
            Kind::SetCarry => {
                self.alu.set_flag(FlagMask::CARRY, true);
                self.advance(1);
            }

            // -- control flow --
            Kind::Jump => {
                self.pc = self.address_in_data_bytes();
            }
            Kind::ConditionalJump => {
                if self.condition_holds() {
                    self.pc = self.address_in_data_bytes();
                } else {
                    self.advance(3);
                }
            }
            Kind::Call => self.call(),
            Kind::ConditionalCall => {
                if self.condition_holds() {
                    self.call();
                } else {
                    self.advance(3);
                }
            }
            Kind::Return => self.ret(),
            Kind::ConditionalReturn => {
                if self.condition_holds() {
                    self.ret();
                } else {
                    self.advance(1);
                }
            }
            Kind::JumpHlIndirect => {
                self.pc = self.regs.pair(RegisterPair::HL);
            }
            Kind::Restart => {
                // A fetched RST resumes after its single byte; an injected
                // one resumes at the interrupted instruction.
                let resume = if injected {
                    self.pc
                } else {
                    self.pc.wrapping_add(1)
                };
                self.push_word(resume);
                self.pc = u16::from(self.current_opcode & 0x38);
            }

            // -- stack and pair exchanges --
            Kind::Push => {
                let value = self.regs.pair(self.register_pair());
                self.push_word(value);
                self.advance(1);
            }
            Kind::Pop => {
                let pair = self.register_pair();
                let value = self.pop_word();
                self.regs.set_pair(pair, value);
                self.advance(1);
            }
            Kind::PushStatusWord => {
                let a = self.regs.get(Register::A);
                let status = self.alu.status_byte();
                self.push_word(u16::from_be_bytes([a, status]));
                self.advance(1);
            }
            Kind::PopStatusWord => {
                let value = self.pop_word();
                let [a, status] = value.to_be_bytes();
                self.alu.set_from_status_byte(status);
                self.regs.set(Register::A, a);
                self.advance(1);
            }
            Kind::ExchangeStackTop => {
                let sp = self.regs.pair(RegisterPair::SP);
                let low = self.mem_read(sp);
                let high = self.mem_read(sp.wrapping_add(1));
                let hl = self.regs.pair(RegisterPair::HL);
                let [hl_high, hl_low] = hl.to_be_bytes();
                self.mem_write(sp, hl_low);
                self.mem_write(sp.wrapping_add(1), hl_high);
                self.regs.set_pair_bytes(RegisterPair::HL, high, low);
                self.advance(1);
            }
            Kind::MoveHlToSp => {
                let hl = self.regs.pair(RegisterPair::HL);
                self.regs.set_pair(RegisterPair::SP, hl);
                self.advance(1);
            }
            Kind::ExchangeHlDe => {
                let hl = self.regs.pair(RegisterPair::HL);
                let de = self.regs.pair(RegisterPair::DE);
                self.regs.set_pair(RegisterPair::HL, de);
                self.regs.set_pair(RegisterPair::DE, hl);
                self.advance(1);
            }

            // -- halt, ports, interrupts --
            Kind::Halt => {
                // The program counter stays on the halt instruction; only an
                // injected interrupt resumes execution.
                self.halted = true;
            }
            Kind::Input => {
                let port = self.data_byte();
                let value = self.ports.read_port(port);
                self.regs.set(Register::A, value);
                self.advance(2);
            }
            Kind::Output => {
                let port = self.data_byte();
                let value = self.regs.get(Register::A);
                self.ports.write_port(port, value);
                self.advance(2);
            }
            Kind::EnableInterrupts => {
                self.interrupts_enabled = true;
                self.advance(1);
            }
            Kind::DisableInterrupts => {
                self.interrupts_enabled = false;
                self.advance(1);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cpu, PortIo};
    use crate::alu::FlagMask;
    use crate::error::CoreError;
    use crate::registers::{Register, RegisterPair};

    /// Recording port collaborator for IN/OUT tests.
    struct TestPorts {
        input: [u8; 256],
        written: Vec<(u8, u8)>,
    }

    impl Default for TestPorts {
        fn default() -> Self {
            Self {
                input: [0; 256],
                written: Vec::new(),
            }
        }
    }

    impl PortIo for TestPorts {
        fn read_port(&mut self, port: u8) -> u8 {
            self.input[port as usize]
        }

        fn write_port(&mut self, port: u8, value: u8) {
            self.written.push((port, value));
        }
    }

    fn cpu_with(program: &[u8]) -> Cpu<TestPorts> {
        let mut cpu = Cpu::new(TestPorts::default()).expect("self-test");
        cpu.load(0, program);
        cpu
    }

    fn run_until_halt(cpu: &mut Cpu<TestPorts>) {
        for _ in 0..10_000 {
            cpu.step().expect("step");
            if cpu.halted() {
                return;
            }
        }
        panic!("program did not halt");
    }

    #[test]
    fn increment_program_leaves_six_in_the_accumulator() {
        // MVI A,5 / INR A / HLT
        let mut cpu = cpu_with(&[0x3e, 0x05, 0x3c, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 6);
        assert!(!cpu.alu().flag(FlagMask::ZERO));
        assert!(cpu.halted());
        // HLT does not advance past itself.
        assert_eq!(cpu.pc(), 3);
    }

    #[test]
    fn add_immediate_wraps_and_raises_all_three_carries() {
        // MVI A,0xFF / ADI 1 / HLT
        let mut cpu = cpu_with(&[0x3e, 0xff, 0xc6, 0x01, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0);
        assert!(cpu.alu().flag(FlagMask::ZERO));
        assert!(cpu.alu().flag(FlagMask::CARRY));
        assert!(cpu.alu().flag(FlagMask::AUX_CARRY));
    }

    #[test]
    fn push_writes_high_then_low_below_the_stack_pointer() {
        // LXI SP,0xFFFE / LXI B,0x1234 / PUSH B / HLT
        let mut cpu = cpu_with(&[0x31, 0xfe, 0xff, 0x01, 0x34, 0x12, 0xc5, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.mem_read(0xfffd), 0x12);
        assert_eq!(cpu.mem_read(0xfffc), 0x34);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0xfffc);
    }

    #[test]
    fn push_pop_round_trips_a_pair() {
        // LXI SP,0x4000 / LXI D,0xBEEF / PUSH D / POP H / HLT
        let mut cpu = cpu_with(&[0x31, 0x00, 0x40, 0x11, 0xef, 0xbe, 0xd5, 0xe1, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0xbeef);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0x4000);
    }

    #[test]
    fn call_pushes_the_return_address_and_ret_restores_it() {
        // 0000 LXI SP,0x4000
        // 0003 CALL 0x0010
        // 0006 HLT
        // 0010 RET
        let mut cpu = cpu_with(&[0x31, 0x00, 0x40, 0xcd, 0x10, 0x00, 0x76]);
        cpu.load(0x0010, &[0xc9]);

        cpu.step().expect("lxi");
        cpu.step().expect("call");
        assert_eq!(cpu.pc(), 0x0010);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0x3ffe);
        assert_eq!(cpu.mem_read(0x3ffe), 0x06);
        assert_eq!(cpu.mem_read(0x3fff), 0x00);

        cpu.step().expect("ret");
        assert_eq!(cpu.pc(), 0x0006);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0x4000);
    }

    #[test]
    fn conditional_jump_only_branches_when_the_condition_holds() {
        // MVI A,1 / DCR A / JNZ 0x0010 / HLT  (falls through, A reached 0)
        let mut cpu = cpu_with(&[0x3e, 0x01, 0x3d, 0xc2, 0x10, 0x00, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.pc(), 6);

        // MVI A,2 / DCR A / JNZ 0x0010, with HLT at the target.
        let mut cpu = cpu_with(&[0x3e, 0x02, 0x3d, 0xc2, 0x10, 0x00, 0x76]);
        cpu.load(0x0010, &[0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.pc(), 0x0010);
    }

    #[test]
    fn memory_operand_instructions_go_through_hl() {
        // LXI H,0x2000 / MVI M,0x41 / ADD M / MOV B,M / HLT  with A starting 0
        let mut cpu = cpu_with(&[0x21, 0x00, 0x20, 0x36, 0x41, 0x86, 0x46, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.mem_read(0x2000), 0x41);
        assert_eq!(cpu.registers().get(Register::A), 0x41);
        assert_eq!(cpu.registers().get(Register::B), 0x41);
    }

    #[test]
    fn direct_addresses_are_little_endian() {
        // MVI A,0x99 / STA 0x1234 / LDA 0x1234 into a zeroed A via XRA A first
        let mut cpu = cpu_with(&[
            0x3e, 0x99, // MVI A,0x99
            0x32, 0x34, 0x12, // STA 0x1234
            0xaf, // XRA A
            0x3a, 0x34, 0x12, // LDA 0x1234
            0x76,
        ]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.mem_read(0x1234), 0x99);
        assert_eq!(cpu.registers().get(Register::A), 0x99);
    }

    #[test]
    fn exchange_stack_top_swaps_hl_with_the_stack_without_moving_sp() {
        // LXI SP,0x3000 / LXI H,0xABCD / PUSH H / LXI H,0x1122 / XTHL / HLT
        let mut cpu = cpu_with(&[
            0x31, 0x00, 0x30, 0x21, 0xcd, 0xab, 0xe5, 0x21, 0x22, 0x11, 0xe3, 0x76,
        ]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0xabcd);
        assert_eq!(cpu.mem_read(0x2ffe), 0x22);
        assert_eq!(cpu.mem_read(0x2fff), 0x11);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0x2ffe);
    }

    #[test]
    fn push_psw_packs_the_status_byte_and_pop_restores_it() {
        // LXI SP,0x3000 / MVI A,0xFF / ADI 1 / PUSH PSW
        // MVI A,0x12 / ORA A (clears carry) / POP PSW / HLT
        let mut cpu = cpu_with(&[
            0x31, 0x00, 0x30, 0x3e, 0xff, 0xc6, 0x01, 0xf5, 0x3e, 0x12, 0xb7, 0xf1, 0x76,
        ]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x00);
        assert!(cpu.alu().flag(FlagMask::ZERO));
        assert!(cpu.alu().flag(FlagMask::CARRY));
        // The pushed status byte carries the fixed bit 5.
        assert_eq!(cpu.mem_read(0x2ffe) & 0x20, 0x20);
    }

    #[test]
    fn rotate_right_moves_bit_zero_into_carry_and_bit_seven() {
        // MVI A,0x01 / RRC / HLT
        let mut cpu = cpu_with(&[0x3e, 0x01, 0x0f, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x80);
        assert!(cpu.alu().flag(FlagMask::CARRY));
    }

    #[test]
    fn decimal_adjust_corrects_a_bcd_sum() {
        // MVI A,0x38 / ADI 0x45 -> 0x7D / DAA -> 0x83 / HLT
        let mut cpu = cpu_with(&[0x3e, 0x38, 0xc6, 0x45, 0x27, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x83);
        assert!(!cpu.alu().flag(FlagMask::CARRY));

        // 0x99 + 0x01 = 0x9A -> DAA 0x00 with carry out.
        let mut cpu = cpu_with(&[0x3e, 0x99, 0xc6, 0x01, 0x27, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x00);
        assert!(cpu.alu().flag(FlagMask::CARRY));
    }

    #[test]
    fn compare_sets_flags_without_touching_the_accumulator() {
        // MVI A,0x05 / CPI 0x07 / HLT
        let mut cpu = cpu_with(&[0x3e, 0x05, 0xfe, 0x07, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x05);
        assert!(cpu.alu().flag(FlagMask::CARRY));
        assert!(!cpu.alu().flag(FlagMask::ZERO));
    }

    #[test]
    fn undocumented_opcode_is_a_fatal_decode_error() {
        let mut cpu = cpu_with(&[0x08]);
        assert_eq!(
            cpu.step(),
            Err(CoreError::Decode {
                opcode: 0x08,
                pc: 0
            })
        );
        // Nothing advanced.
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn halted_cpu_ignores_step() {
        let mut cpu = cpu_with(&[0x76]);
        run_until_halt(&mut cpu);
        let pc = cpu.pc();
        cpu.step().expect("step while halted");
        assert_eq!(cpu.pc(), pc);
        assert!(cpu.halted());
    }

    #[test]
    fn input_and_output_go_through_the_port_collaborator() {
        // IN 3 / OUT 5 / HLT
        let mut cpu = cpu_with(&[0xdb, 0x03, 0xd3, 0x05, 0x76]);
        cpu.ports_mut().input[3] = 0xa7;
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0xa7);
        assert_eq!(cpu.ports().written, vec![(5, 0xa7)]);
    }

    #[test]
    fn injected_restart_pushes_the_unadvanced_program_counter() {
        // LXI SP,0x4000 / EI / HLT, with RET at the RST 1 vector.
        let mut cpu = cpu_with(&[0x31, 0x00, 0x40, 0xfb, 0x76]);
        cpu.load(0x0008, &[0xc9]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.pc(), 4);

        let accepted = cpu.interrupt(0xcf).expect("interrupt");
        assert!(accepted);
        assert!(!cpu.halted());
        assert!(!cpu.interrupts_enabled());
        assert_eq!(cpu.pc(), 0x0008);
        // The resume address is the halt instruction itself.
        assert_eq!(cpu.mem_read(0x3ffe), 0x04);
        assert_eq!(cpu.mem_read(0x3fff), 0x00);

        cpu.step().expect("ret");
        assert_eq!(cpu.pc(), 4);
    }

    #[test]
    fn interrupt_is_ignored_while_interrupts_are_disabled() {
        let mut cpu = cpu_with(&[0x76]);
        run_until_halt(&mut cpu);
        let accepted = cpu.interrupt(0xcf).expect("interrupt");
        assert!(!accepted);
        assert!(cpu.halted());
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn fetched_restart_pushes_the_following_address() {
        // LXI SP,0x4000 / RST 2, with HLT at the vector.
        let mut cpu = cpu_with(&[0x31, 0x00, 0x40, 0xd7]);
        cpu.load(0x0010, &[0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.pc(), 0x0010);
        assert_eq!(cpu.mem_read(0x3ffe), 0x04);
    }

    #[test]
    fn indirect_accumulator_loads_use_bc_and_de_only() {
        // LXI B,0x2000 / MVI A,0x55 / STAX B / LDAX B moves it back.
        let mut cpu = cpu_with(&[0x01, 0x00, 0x20, 0x3e, 0x55, 0x02, 0x0a, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.mem_read(0x2000), 0x55);
        assert_eq!(cpu.registers().get(Register::A), 0x55);
    }

    #[test]
    fn exchange_swaps_hl_and_de() {
        // LXI H,0x1111 / LXI D,0x2222 / XCHG / HLT
        let mut cpu = cpu_with(&[0x21, 0x11, 0x11, 0x11, 0x22, 0x22, 0xeb, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0x2222);
        assert_eq!(cpu.registers().pair(RegisterPair::DE), 0x1111);
    }

    #[test]
    fn dad_adds_into_hl_and_only_touches_carry() {
        // LXI H,0xFFFF / LXI B,0x0001 / DAD B / HLT
        let mut cpu = cpu_with(&[0x21, 0xff, 0xff, 0x01, 0x01, 0x00, 0x09, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0x0000);
        assert!(cpu.alu().flag(FlagMask::CARRY));
        assert!(!cpu.alu().flag(FlagMask::ZERO));
    }

    #[test]
    fn pchl_jumps_to_the_address_in_hl() {
        // LXI H,0x0010 / PCHL, with HLT at the target.
        let mut cpu = cpu_with(&[0x21, 0x10, 0x00, 0xe9]);
        cpu.load(0x0010, &[0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.pc(), 0x0010);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0x0010);
    }

    #[test]
    fn sphl_loads_the_stack_pointer_from_hl() {
        // LXI H,0x3FFE / SPHL / LXI B,0x1234 / PUSH B lands on the new stack.
        let mut cpu = cpu_with(&[0x21, 0xfe, 0x3f, 0xf9, 0x01, 0x34, 0x12, 0xc5, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().pair(RegisterPair::SP), 0x3ffc);
        assert_eq!(cpu.mem_read(0x3ffd), 0x12);
        assert_eq!(cpu.mem_read(0x3ffc), 0x34);
        // HL itself is unchanged.
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0x3ffe);
    }

    #[test]
    fn register_and_recomputes_aux_carry_but_immediate_and_clears_it() {
        // MVI A,0x1F / MOV B,A / ANA B: bit 4 of (result ^ a ^ b) is set.
        let mut cpu = cpu_with(&[0x3e, 0x1f, 0x47, 0xa0, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x1f);
        assert!(cpu.alu().flag(FlagMask::AUX_CARRY));
        assert!(!cpu.alu().flag(FlagMask::CARRY));

        // The same operands through ANI leave both carries cleared.
        let mut cpu = cpu_with(&[0x3e, 0x1f, 0xe6, 0x1f, 0x76]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.registers().get(Register::A), 0x1f);
        assert!(!cpu.alu().flag(FlagMask::AUX_CARRY));
        assert!(!cpu.alu().flag(FlagMask::CARRY));
    }

    #[test]
    fn lhld_and_shld_move_both_bytes() {
        // LXI H,0xDEAD / SHLD 0x2100 / LXI H,0 / LHLD 0x2100 / HLT
        let mut cpu = cpu_with(&[
            0x21, 0xad, 0xde, 0x22, 0x00, 0x21, 0x21, 0x00, 0x00, 0x2a, 0x00, 0x21, 0x76,
        ]);
        run_until_halt(&mut cpu);
        assert_eq!(cpu.mem_read(0x2100), 0xad);
        assert_eq!(cpu.mem_read(0x2101), 0xde);
        assert_eq!(cpu.registers().pair(RegisterPair::HL), 0xdead);
    }
}
