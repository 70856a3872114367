use eighty_core::{Cpu, PortIo};

/// Start of video RAM.
///
/// The original hardware maps the frame buffer at 0x2400–0x3fff.
const VRAM_START: usize = 0x2400;
/// Size of video RAM in bytes (0x1c00 = 7168 bytes = 224x256 bits).
const VRAM_SIZE: usize = 0x1c00;

/// 8080 clock and frame timing for the arcade board.
pub const CPU_CLOCK_HZ: u32 = 2_000_000;
pub const FRAME_RATE_HZ: u32 = 60;
pub const CYCLES_PER_FRAME: u32 = CPU_CLOCK_HZ / FRAME_RATE_HZ;

/// Rough average cycles per 8080 instruction, used to turn the frame's
/// cycle budget into an instruction budget. The core does not track cycle
/// counts, so frame pacing is approximate by construction.
const AVG_CYCLES_PER_INSTRUCTION: u32 = 9;
pub const INSTRUCTIONS_PER_FRAME: u32 = CYCLES_PER_FRAME / AVG_CYCLES_PER_INSTRUCTION;

/// Bit positions for input port 1 (IN 1).
///
/// These constants follow the commonly documented Space Invaders layout.
const IN1_BIT_COIN: u8 = 0;
const IN1_BIT_P2_START: u8 = 1;
const IN1_BIT_P1_START: u8 = 2;
const IN1_BIT_ALWAYS_ONE: u8 = 3;
const IN1_BIT_P1_SHOOT: u8 = 4;
const IN1_BIT_P1_LEFT: u8 = 5;
const IN1_BIT_P1_RIGHT: u8 = 6;

/// Bit positions for input port 2 (IN 2).
///
/// Port 2 carries player 2 controls, tilt, and the DIP switch inputs:
///
/// - bits 0–1: number of ships per credit (DIP)
/// - bit 2:    tilt input
/// - bits 4–6: player 2 controls
/// - bit 7:    "display coin info" DIP (0 = show, 1 = hide)
const IN2_BIT_TILT: u8 = 2;
const IN2_BIT_P2_SHOOT: u8 = 4;
const IN2_BIT_P2_LEFT: u8 = 5;
const IN2_BIT_P2_RIGHT: u8 = 6;
const IN2_BIT_COIN_INFO: u8 = 7;

const IN2_MASK_SHIPS_PER_CREDIT: u8 = 0x03;

/// Logical machine inputs, mapped from whatever frontend drives us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Coin,
    Start1P,
    Start2P,
    P1Left,
    P1Right,
    P1Shoot,
    P2Left,
    P2Right,
    P2Shoot,
    Tilt,
}

/// DIP switch configuration for the switches we model.
///
/// - `ships_per_credit`: number of ships per game (3–6), encoded in bits
///   0–1 of port 2 as `value - 3`.
/// - `show_coin_info`: whether to show the coin/credit info line in attract
///   mode. The original ROM treats bit 7 = 1 as "hide coin info".
#[derive(Clone, Copy, Debug)]
pub struct DipConfig {
    pub ships_per_credit: u8,
    pub show_coin_info: bool,
}

impl Default for DipConfig {
    fn default() -> Self {
        Self {
            ships_per_credit: 3,
            show_coin_info: true,
        }
    }
}

impl DipConfig {
    fn apply_to_port2(&self, in_port2: &mut u8) {
        *in_port2 &= !IN2_MASK_SHIPS_PER_CREDIT;
        *in_port2 &= !(1 << IN2_BIT_COIN_INFO);

        let ships = self.ships_per_credit.clamp(3, 6);
        let encoded = ships - 3;
        *in_port2 |= encoded & IN2_MASK_SHIPS_PER_CREDIT;

        if !self.show_coin_info {
            *in_port2 |= 1 << IN2_BIT_COIN_INFO;
        }
    }
}

/// Port-mapped hardware around the CPU: inputs, sound latches, and the
/// position-addressable 16-bit shift register the game uses to slide
/// sprites across byte boundaries.
pub struct InvadersPorts {
    in_port1: u8,
    in_port2: u8,
    out_port3: u8,
    out_port5: u8,
    shift_register: u16,
    shift_offset: u8,
}

impl Default for InvadersPorts {
    fn default() -> Self {
        let mut in_port1 = 0u8;
        in_port1 |= 1 << IN1_BIT_ALWAYS_ONE;
        Self {
            in_port1,
            in_port2: 0,
            out_port3: 0,
            out_port5: 0,
            shift_register: 0,
            shift_offset: 0,
        }
    }
}

impl PortIo for InvadersPorts {
    fn read_port(&mut self, port: u8) -> u8 {
        match port {
            1 => self.in_port1,
            2 => self.in_port2,
            3 => {
                let shift = 8 - (self.shift_offset & 0x7);
                (self.shift_register >> shift) as u8
            }
            _ => 0,
        }
    }

    fn write_port(&mut self, port: u8, value: u8) {
        match port {
            2 => {
                self.shift_offset = value & 0x7;
            }
            3 => {
                self.out_port3 = value;
            }
            4 => {
                // New data enters as the high byte; the previous high byte
                // slides down.
                self.shift_register = (self.shift_register >> 8) | (u16::from(value) << 8);
            }
            5 => {
                self.out_port5 = value;
            }
            6 => {
                // watchdog, ignore
            }
            _ => {}
        }
    }
}

/// The Space Invaders machine: the CPU core plus its port hardware and the
/// frame/interrupt cadence of the arcade board.
pub struct InvadersMachine {
    cpu: Cpu<InvadersPorts>,
    dip_config: DipConfig,
}

impl InvadersMachine {
    /// Construct a machine in a powered-up but reset state.
    pub fn new() -> Result<Self, eighty_core::CoreError> {
        Self::with_dip_config(DipConfig::default())
    }

    /// Construct a machine with an explicit DIP switch configuration.
    pub fn with_dip_config(dip_config: DipConfig) -> Result<Self, eighty_core::CoreError> {
        let mut machine = Self {
            cpu: Cpu::new(InvadersPorts::default())?,
            dip_config,
        };
        machine.apply_dip_config();
        Ok(machine)
    }

    /// Load the combined ROM image. The board maps it from 0x0000 and
    /// execution starts there.
    pub fn load_rom(&mut self, rom: &[u8]) {
        self.cpu.load(0x0000, rom);
        self.cpu.set_pc(0x0000);
        log::info!("loaded {} byte rom image", rom.len());
    }

    /// Step the machine for one video frame worth of time.
    ///
    /// The arcade runs a 2 MHz CPU at 60 Hz with two interrupts per frame:
    /// RST 1 when the beam reaches mid-screen and RST 2 at vertical blank.
    pub fn step_frame(&mut self) -> Result<(), eighty_core::CoreError> {
        let half_frame = INSTRUCTIONS_PER_FRAME / 2;

        self.run_instructions(half_frame)?;
        self.cpu.interrupt(0xcf)?; // RST 1

        self.run_instructions(INSTRUCTIONS_PER_FRAME - half_frame)?;
        self.cpu.interrupt(0xd7)?; // RST 2
        Ok(())
    }

    fn run_instructions(&mut self, budget: u32) -> Result<(), eighty_core::CoreError> {
        for _ in 0..budget {
            if self.cpu.halted() {
                // Nothing to do until the next interrupt.
                break;
            }
            self.cpu.step()?;
        }
        Ok(())
    }

    fn apply_dip_config(&mut self) {
        self.dip_config
            .apply_to_port2(&mut self.cpu.ports_mut().in_port2);
    }

    /// Handle a logical button event.
    ///
    /// Tilt is latched on press and only cleared by the game; every other
    /// input tracks the pressed state.
    pub fn handle_button(&mut self, button: Button, pressed: bool) {
        let ports = self.cpu.ports_mut();
        match button {
            Button::Coin => set_input_bit(&mut ports.in_port1, IN1_BIT_COIN, pressed),
            Button::Start1P => set_input_bit(&mut ports.in_port1, IN1_BIT_P1_START, pressed),
            Button::Start2P => set_input_bit(&mut ports.in_port1, IN1_BIT_P2_START, pressed),
            Button::P1Left => set_input_bit(&mut ports.in_port1, IN1_BIT_P1_LEFT, pressed),
            Button::P1Right => set_input_bit(&mut ports.in_port1, IN1_BIT_P1_RIGHT, pressed),
            Button::P1Shoot => set_input_bit(&mut ports.in_port1, IN1_BIT_P1_SHOOT, pressed),
            Button::P2Left => set_input_bit(&mut ports.in_port2, IN2_BIT_P2_LEFT, pressed),
            Button::P2Right => set_input_bit(&mut ports.in_port2, IN2_BIT_P2_RIGHT, pressed),
            Button::P2Shoot => set_input_bit(&mut ports.in_port2, IN2_BIT_P2_SHOOT, pressed),
            Button::Tilt => {
                if pressed {
                    set_input_bit(&mut ports.in_port2, IN2_BIT_TILT, true);
                }
            }
        }
    }

    /// The raw video RAM window used by a renderer: 0x1c00 bytes at 0x2400.
    pub fn video_ram(&self) -> &[u8] {
        &self.cpu.memory()[VRAM_START..VRAM_START + VRAM_SIZE]
    }

    /// Current values of the sound latch ports (OUT 3 and OUT 5).
    pub fn outputs(&self) -> (u8, u8) {
        let ports = self.cpu.ports();
        (ports.out_port3, ports.out_port5)
    }

    pub fn cpu(&self) -> &Cpu<InvadersPorts> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu<InvadersPorts> {
        &mut self.cpu
    }
}

fn set_input_bit(port: &mut u8, bit: u8, pressed: bool) {
    let mask = 1 << bit;
    if pressed {
        *port |= mask;
    } else {
        *port &= !mask;
    }
}
