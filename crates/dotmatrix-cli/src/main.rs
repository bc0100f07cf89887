mod config;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use dotmatrix_core::breakpoints::{Breakpoint, BreakpointHit};
use dotmatrix_core::error::Opcode;
use dotmatrix_core::instructions;
use dotmatrix_core::ppu::palette::PaletteStrategy;
use dotmatrix_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use dotmatrix_core::{Cartridge, GameBoy, Model, RunOutcome};

use config::{Config, EmulationMode};

#[derive(Parser)]
#[command(name = "dotmatrix", version, about = "Headless Game Boy / Game Boy Color runner")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Number of CPU cycles to run (overrides --frames)
    #[arg(long)]
    cycles: Option<u64>,

    /// Stop at this hex address (repeatable)
    #[arg(long = "break", value_name = "HEX", value_parser = config::parse_address)]
    breakpoints: Vec<u16>,

    /// Write the last frame to a PNG file
    #[arg(long, value_name = "PNG")]
    screenshot: Option<PathBuf>,

    /// Print bytes sent over the serial port
    #[arg(long)]
    serial: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/dotmatrix/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

const DEFAULT_FRAMES: u64 = 600;

fn select_model(args: &Args, cfg: &Config, cart: &Cartridge) -> Model {
    if args.dmg {
        return Model::Dmg;
    }
    if args.cgb {
        return Model::Cgb;
    }
    match cfg.emulation_mode {
        EmulationMode::ForceDmg => Model::Dmg,
        EmulationMode::ForceCgb => Model::Cgb,
        EmulationMode::Auto if cart.cgb() => Model::Cgb,
        EmulationMode::Auto => Model::Dmg,
    }
}

fn build_gameboy(args: &Args, cfg: &Config) -> Result<GameBoy> {
    let cart = Cartridge::from_file(&args.rom)
        .with_context(|| format!("failed to load ROM {}", args.rom.display()))?;
    let model = select_model(args, cfg, &cart);

    let boot_path = args.bootrom.as_ref().or(cfg.boot_rom.as_ref());
    let mut gb = match boot_path {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read boot ROM {}", path.display()))?;
            GameBoy::with_boot_rom(model, data)
        }
        None => GameBoy::new(model),
    };
    gb.load_cartridge(cart);

    if let Some(shades) = cfg.palette {
        if model.is_cgb() {
            warn!("custom palette ignored in CGB mode");
        } else {
            gb.mmu
                .ppu_mut()
                .set_palette_strategy(PaletteStrategy::DmgMonochrome { shades });
        }
    }

    for addr in args.breakpoints.iter().copied().chain(cfg.breakpoint_addresses()) {
        gb.add_breakpoint(Breakpoint::at(0, addr));
    }

    info!(
        "running in {} mode{}",
        if model.is_cgb() { "CGB" } else { "DMG" },
        if boot_path.is_some() { " with boot ROM" } else { "" }
    );
    Ok(gb)
}

fn disassemble_at(gb: &GameBoy, pc: u16) -> String {
    let code = gb.mmu.peek(pc);
    let opcode = if code == 0xCB {
        Opcode::prefixed(gb.mmu.peek(pc.wrapping_add(1)))
    } else {
        Opcode::base(code)
    };
    match instructions::decode(opcode) {
        Ok(instruction) => instruction.to_string(),
        Err(e) => e.to_string(),
    }
}

fn report_breakpoint(gb: &GameBoy, hit: &BreakpointHit) {
    let snap = gb.snapshot();
    match hit.value {
        Some(value) => println!(
            "breakpoint {}: write {value:02X} to {:04X} from PC={:04X}",
            hit.id, hit.addr, hit.pc
        ),
        None => println!("breakpoint {}: PC={:04X}", hit.id, hit.pc),
    }
    println!(
        "  {} | IME={} LY={} IE={:02X} IF={:02X} cycles={}",
        snap.regs,
        u8::from(snap.ime),
        snap.ly,
        snap.ie,
        snap.if_,
        snap.cycles
    );
    println!("  next: {}", disassemble_at(gb, snap.regs.pc));
}

fn print_serial(gb: &mut GameBoy) -> Result<()> {
    let bytes = gb.take_serial();
    if bytes.is_empty() {
        return Ok(());
    }
    let mut out = std::io::stdout().lock();
    for b in &bytes {
        if b.is_ascii_graphic() || b.is_ascii_whitespace() {
            write!(out, "{}", *b as char)?;
        } else {
            write!(out, "\\x{b:02X}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn save_screenshot(gb: &GameBoy, path: &Path) -> Result<()> {
    let mut pixels = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 3);
    for c in gb.framebuffer().iter() {
        pixels.push(((c >> 16) & 0xFF) as u8);
        pixels.push(((c >> 8) & 0xFF) as u8);
        pixels.push((c & 0xFF) as u8);
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&pixels)?;
    writer.finish()?;
    info!("screenshot written to {}", path.display());
    Ok(())
}

/// Run until the frame or cycle budget is spent, or something stops the CPU.
fn run(gb: &mut GameBoy, args: &Args, frame_budget: u64) -> Result<()> {
    let mut frames = 0u64;
    loop {
        let outcome = match args.cycles {
            Some(cycles) => {
                let remaining = cycles.saturating_sub(gb.cpu.cycles);
                if remaining == 0 {
                    break;
                }
                gb.run_cycles(remaining)?
            }
            None if frames >= frame_budget => break,
            None => gb.run_frame()?,
        };
        if args.serial {
            print_serial(gb)?;
        }
        match outcome {
            RunOutcome::FrameComplete => frames += 1,
            RunOutcome::CyclesElapsed => break,
            RunOutcome::Breakpoint(hit) => {
                report_breakpoint(gb, &hit);
                break;
            }
            RunOutcome::Paused => break,
            RunOutcome::Stopped => {
                warn!("CPU entered STOP with no input source; ending run");
                break;
            }
        }
    }
    info!("ran {frames} frames, {} cycles", gb.cpu.cycles);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    if args.config.is_some() && !config_path.exists() {
        bail!("config file {} does not exist", config_path.display());
    }
    let cfg = config::load_from_file(&config_path);

    let mut gb = build_gameboy(&args, &cfg)?;
    let frame_budget = args.frames.or(cfg.frames).unwrap_or(DEFAULT_FRAMES);

    let result = run(&mut gb, &args, frame_budget);
    if let Err(e) = &result {
        report_core_error(&gb, e);
    }
    if let Some(path) = &args.screenshot {
        save_screenshot(&gb, path)?;
    }
    result
}

fn report_core_error(gb: &GameBoy, err: &anyhow::Error) {
    if let Some(core) = err.downcast_ref::<dotmatrix_core::CoreError>() {
        if let Some(opcode) = core.opcode() {
            eprintln!("halted on opcode {opcode}; state: {}", gb.snapshot().regs);
        }
    }
}
