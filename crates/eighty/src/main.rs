use anyhow::{bail, Context};
use eighty_core::{Cpu, PortIo, Register, RegisterPair};
use std::io::Write;

/// CP/M program origin and the BDOS entry the diagnostics call into.
const COM_ORIGIN: u16 = 0x0100;
const BDOS_ENTRY: u16 = 0x0005;

struct Options {
    rom_path: String,
    origin: u16,
    com: bool,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut rom_path = None;
    let mut origin = None;
    let mut com = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--com" => com = true,
            "--org" => {
                let value = args.next().context("--org requires a hex address")?;
                let value = value.trim_start_matches("0x");
                origin = Some(
                    u16::from_str_radix(value, 16)
                        .with_context(|| format!("invalid --org address '{value}'"))?,
                );
            }
            "--help" | "-h" => {
                eprintln!("usage: eighty <rom> [--org <hex>] [--com]");
                std::process::exit(0);
            }
            other if rom_path.is_none() => rom_path = Some(other.to_string()),
            other => bail!("unexpected argument '{other}'"),
        }
    }

    let rom_path = rom_path.context("usage: eighty <rom> [--org <hex>] [--com]")?;
    let origin = origin.unwrap_or(if com { COM_ORIGIN } else { 0x0000 });
    Ok(Options {
        rom_path,
        origin,
        com,
    })
}

/// Console-backed ports: port 0 signals that a diagnostic binary is done,
/// port 1 writes go to stdout. Reads float to zero.
///
/// In CP/M mode port 1 is only the return path of the injected BDOS stub;
/// the host prints the real console output when it intercepts the BDOS
/// entry, so the stub's accumulator byte is discarded.
struct ConsolePorts {
    finished: bool,
    com: bool,
}

impl PortIo for ConsolePorts {
    fn read_port(&mut self, _port: u8) -> u8 {
        0
    }

    fn write_port(&mut self, port: u8, value: u8) {
        match port {
            0 => self.finished = true,
            1 if !self.com => {
                print!("{}", value as char);
                let _ = std::io::stdout().flush();
            }
            _ => {}
        }
    }
}

/// Emulate the two BDOS console calls the CP/M diagnostics use: C=2 prints
/// the character in E, C=9 prints the $-terminated string at DE.
fn bdos_console_call(cpu: &Cpu<ConsolePorts>) {
    let mut out = std::io::stdout();
    match cpu.registers().get(Register::C) {
        2 => {
            let _ = write!(out, "{}", cpu.registers().get(Register::E) as char);
        }
        9 => {
            let mut addr = cpu.registers().pair(RegisterPair::DE);
            loop {
                let byte = cpu.mem_read(addr);
                if byte == b'$' {
                    break;
                }
                let _ = write!(out, "{}", byte as char);
                addr = addr.wrapping_add(1);
            }
        }
        other => log::warn!("unhandled bdos call c={other:#04x}"),
    }
    let _ = out.flush();
}

fn run(options: &Options) -> anyhow::Result<()> {
    let image = std::fs::read(&options.rom_path)
        .with_context(|| format!("failed to read '{}'", options.rom_path))?;

    let mut cpu = Cpu::new(ConsolePorts {
        finished: false,
        com: options.com,
    })?;
    cpu.load(options.origin, &image);
    cpu.set_pc(options.origin);
    log::info!(
        "loaded {} bytes at {:#06x}{}",
        image.len(),
        options.origin,
        if options.com { " (cp/m mode)" } else { "" }
    );

    if options.com {
        // A jump to 0x0000 is a CP/M warm boot; OUT 0 tells us the program
        // is done. The BDOS entry prints through the host and returns.
        cpu.load(0x0000, &[0xd3, 0x00]); // OUT 0
        cpu.load(BDOS_ENTRY, &[0xd3, 0x01, 0xc9]); // OUT 1 / RET
    }

    loop {
        if cpu.ports().finished {
            log::info!("diagnostic signaled completion");
            return Ok(());
        }
        if cpu.halted() {
            log::info!("cpu halted at {:#06x}", cpu.pc());
            return Ok(());
        }
        if options.com && cpu.pc() == BDOS_ENTRY {
            bdos_console_call(&cpu);
        }
        cpu.step()?;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let options = parse_args()?;
    run(&options)
}
