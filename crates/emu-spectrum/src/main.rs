//! Headless ZX Spectrum 48K.
//!
//! Boots a ROM, optionally restores a snapshot or drops a binary into RAM,
//! and runs until a frame count is reached or the CPU stops. Hitting a
//! breakpoint drops into a line-based stepper on stdin, which can also
//! rewind the machine using the once-a-second snapshot history.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result};
use clap::Parser;
use emu_core::Speed;
use emu_spectrum::{Program, Spectrum, SpectrumConfig, parse_address};
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;
use zilog_z80::{CpuEvent, disassemble};

#[derive(Parser, Debug)]
#[command(name = "emu-spectrum", version, about = "Headless ZX Spectrum 48K")]
struct Cli {
    /// 16K ROM image.
    #[arg(long, value_name = "FILE")]
    rom: PathBuf,

    /// 48K .sna snapshot to restore after power-on.
    #[arg(long, value_name = "FILE", conflicts_with = "bin")]
    sna: Option<PathBuf>,

    /// Raw binary to load into RAM and jump to.
    #[arg(long, value_name = "FILE")]
    bin: Option<PathBuf>,

    /// Load address and entry point for --bin.
    #[arg(long, value_name = "ADDR", default_value = "0x8000", value_parser = parse_address)]
    bin_addr: u16,

    /// actual, fast, maximum or paused.
    #[arg(long, default_value_t = Speed::Actual)]
    speed: Speed,

    /// Power off after this many frame interrupts.
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Write a snapshot here once the CPU has stopped.
    #[arg(long, value_name = "FILE")]
    save_sna: Option<PathBuf>,

    /// Stop at this address. Repeatable.
    #[arg(long = "break", value_name = "ADDR", value_parser = parse_address)]
    breakpoints: Vec<u16>,

    /// Log every executed instruction.
    #[arg(long)]
    trace: bool,

    #[arg(short, long)]
    verbose: bool,
}

/// What the CPU thread tells the main thread.
enum HostEvent {
    FrameLimit(u64),
    Paused(u16),
    HistoryDue,
    PoweredOff,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let spectrum = Spectrum::new(config_from(&cli)?).context("building the machine")?;
    for &addr in &cli.breakpoints {
        spectrum.breakpoints().add(addr);
    }
    let events = watch(&spectrum, &cli);

    spectrum.start().context("starting the machine")?;
    run(&spectrum, &events)?;
    spectrum.stop();

    if let Some(path) = &cli.save_sna {
        fs::write(path, spectrum.save_snapshot())
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
    }
    if let Some(err) = spectrum.take_error() {
        return Err(err).context("CPU stopped");
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn config_from(cli: &Cli) -> Result<SpectrumConfig> {
    let rom = fs::read(&cli.rom).with_context(|| format!("reading ROM {}", cli.rom.display()))?;
    let mut config = SpectrumConfig::new(rom);
    config.speed = cli.speed;

    if let Some(path) = &cli.sna {
        let data = fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))?;
        config.program = Some(Program::Snapshot(data));
    } else if let Some(path) = &cli.bin {
        let data = fs::read(path).with_context(|| format!("reading binary {}", path.display()))?;
        config.program = Some(Program::Binary {
            data,
            addr: cli.bin_addr,
        });
    }
    Ok(config)
}

fn watch(spectrum: &Spectrum, cli: &Cli) -> Receiver<HostEvent> {
    let (tx, rx) = mpsc::channel();
    let history_tx = tx.clone();
    spectrum.track_history(move || {
        history_tx.send(HostEvent::HistoryDue).ok();
    });

    let switch = spectrum.runner().debug_switch();
    let limit = cli.frames;
    let mut frames = 0u64;
    spectrum.subscribe(move |event, _| {
        let message = match event {
            CpuEvent::InterruptFired => {
                frames += 1;
                (Some(frames) == limit).then_some(HostEvent::FrameLimit(frames))
            }
            CpuEvent::Ticked { pc, .. } if switch.is_on() => Some(HostEvent::Paused(*pc)),
            CpuEvent::PoweredOff => Some(HostEvent::PoweredOff),
            _ => None,
        };
        if let Some(message) = message {
            // The receiver is gone once main is shutting down.
            let _ = tx.send(message);
        }
    });

    if cli.trace {
        spectrum.subscribe(|event, memory| {
            if let CpuEvent::Ticked { prev_pc, .. } = event {
                trace!("{}", disassemble(memory, *prev_pc));
            }
        });
    }
    rx
}

fn run(spectrum: &Spectrum, events: &Receiver<HostEvent>) -> Result<()> {
    let mut lines = io::stdin().lock().lines();
    for event in events {
        match event {
            HostEvent::FrameLimit(frames) => {
                info!(frames, "frame limit reached");
                break;
            }
            HostEvent::PoweredOff => break,
            HostEvent::HistoryDue => {
                spectrum.record_history();
            }
            HostEvent::Paused(pc) => {
                if !prompt(spectrum, pc, &mut lines)? {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Show the paused CPU and act on one command. Returns false to quit.
fn prompt(
    spectrum: &Spectrum,
    pc: u16,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<bool> {
    {
        let cpu = spectrum.runner().lock();
        println!("{}", cpu.registers());
        println!("{}", disassemble(cpu.memory(), pc));
    }
    loop {
        print!("[s]tep [c]ontinue [r]ewind SECS [q]uit> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            return Ok(false);
        };
        let line = line.context("reading stdin")?;
        if let Some(seconds) = line.trim().strip_prefix('r') {
            rewind(spectrum, seconds.trim());
            continue;
        }
        match line.trim() {
            "" | "s" => {
                spectrum.runner().debugger_step();
                return Ok(true);
            }
            "c" => {
                spectrum.runner().set_debugging(false);
                return Ok(true);
            }
            "q" => return Ok(false),
            other => warn!(command = other, "unknown command"),
        }
    }
}

fn rewind(spectrum: &Spectrum, seconds: &str) {
    let seconds = if seconds.is_empty() {
        Ok(1)
    } else {
        seconds.parse::<usize>()
    };
    match seconds {
        Ok(seconds) => match spectrum.rewind(seconds) {
            Ok(()) => {
                let cpu = spectrum.runner().lock();
                println!("{}", cpu.registers());
                println!("{}", disassemble(cpu.memory(), cpu.registers().pc));
            }
            Err(err) => warn!(%err, "rewind failed"),
        },
        Err(err) => warn!(%err, "rewind takes a number of seconds"),
    }
}
