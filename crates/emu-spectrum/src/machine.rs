//! The 48K machine: CPU, ROM, ULA ports and frame timing on one runner.

use std::io;

use emu_core::{Memory, MemoryError, Speed};
use format_sna::{CpuHistory, HistoryError, SnaError, load_sna, save_sna};
use thiserror::Error;
use tracing::{debug, error, info};
use zilog_z80::{Breakpoints, CpuConfig, CpuError, CpuEvent, CpuRunner, Z80};

use crate::config::{Program, SpectrumConfig};
use crate::ports::UlaPorts;

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("ROM rejected")]
    Rom(#[from] MemoryError),
    #[error("snapshot rejected")]
    Snapshot(#[from] SnaError),
    #[error("rewind failed")]
    History(#[from] HistoryError),
    #[error("failed to start the CPU thread")]
    Thread(#[from] io::Error),
}

/// A ZX Spectrum 48K running on its own CPU thread.
pub struct Spectrum {
    runner: CpuRunner,
    ports: UlaPorts,
    breakpoints: Breakpoints,
    history: CpuHistory,
    program: Option<Program>,
    speed: Speed,
}

impl Spectrum {
    /// Build the machine with `config.rom` in place. Nothing runs until
    /// [`Spectrum::start`].
    ///
    /// # Errors
    ///
    /// Fails if the ROM is larger than the address space.
    pub fn new(config: SpectrumConfig) -> Result<Self, SpectrumError> {
        let mut cpu = Z80::with_config(CpuConfig::spectrum_48k());
        if let Err(err) = cpu.memory_mut().load_rom(&config.rom) {
            cpu.log_sink().in_scope(|| error!(%err, "ROM rejected"));
            return Err(err.into());
        }
        cpu.log_sink()
            .in_scope(|| debug!(rom_size = config.rom.len(), "ROM loaded"));

        let ports = UlaPorts::new();
        cpu.set_ports(ports.clone());
        cpu.subscribe(|event, _| {
            if *event == CpuEvent::LoadRequested {
                debug!("ROM tape loader entered with no tape attached");
            }
        });

        let history = CpuHistory::new(cpu.config().t_states_per_second);
        let runner = CpuRunner::new(cpu);
        let breakpoints = Breakpoints::new(runner.debug_switch());
        runner.lock().subscribe(breakpoints.observer());

        Ok(Self {
            runner,
            ports,
            breakpoints,
            history,
            program: config.program,
            speed: config.speed,
        })
    }

    /// Power on, load the configured program, then let the CPU run.
    ///
    /// # Errors
    ///
    /// Fails if the thread can't be spawned or the snapshot is invalid. The
    /// CPU is powered off again in the second case.
    pub fn start(&self) -> Result<(), SpectrumError> {
        // The new thread idles in step mode until the program is in memory.
        self.runner.set_debugging(true);
        if let Err(err) = self.runner.power_on() {
            self.runner.set_debugging(false);
            return Err(err.into());
        }

        let loaded = self.load_program();
        if loaded.is_err() {
            self.runner.power_off();
        }
        self.runner.set_speed(self.speed);
        self.runner.set_debugging(false);
        loaded
    }

    fn load_program(&self) -> Result<(), SpectrumError> {
        let Some(program) = &self.program else {
            return Ok(());
        };
        let mut cpu = self.runner.pause();
        self.history.clear();
        match program {
            Program::Snapshot(data) => {
                let sna = load_sna(&mut cpu, data)?;
                self.ports.set_border(sna.border);
                info!(
                    pc = format_args!("{:04X}", cpu.registers().pc),
                    "snapshot loaded"
                );
            }
            Program::Binary { data, addr } => {
                cpu.memory_mut().load_data(data, *addr);
                cpu.registers_mut().pc = *addr;
                info!(
                    addr = format_args!("{addr:04X}"),
                    len = data.len(),
                    "binary loaded"
                );
            }
        }
        Ok(())
    }

    /// Stop the CPU thread.
    pub fn stop(&self) {
        self.runner.power_off();
    }

    /// Capture the machine as a 48K snapshot with the current border.
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        let mut cpu = self.runner.pause();
        save_sna(&mut cpu, self.ports.border())
    }

    /// Start sampling the machine into its history once a second. `on_due`
    /// runs on the CPU thread when a sample is wanted; the host answers with
    /// [`Spectrum::record_history`].
    pub fn track_history(&self, on_due: impl FnMut() + Send + 'static) {
        self.runner.lock().subscribe(self.history.observer(on_due));
    }

    /// Take the pending history sample, if one is due.
    pub fn record_history(&self) -> bool {
        let mut cpu = self.runner.pause();
        self.history.record_if_due(&mut cpu, self.ports.border())
    }

    /// Wind the machine back about `seconds` of emulated time.
    ///
    /// # Errors
    ///
    /// Fails if no history has been recorded yet.
    pub fn rewind(&self, seconds: usize) -> Result<(), SpectrumError> {
        let mut cpu = self.runner.pause();
        let sna = self.history.restore_seconds_ago(&mut cpu, seconds)?;
        self.ports.set_border(sna.border);
        Ok(())
    }

    #[must_use]
    pub fn history(&self) -> &CpuHistory {
        &self.history
    }

    /// Register a callback for CPU notifications.
    pub fn subscribe(&self, observer: impl FnMut(&CpuEvent, &Memory) + Send + 'static) {
        self.runner.lock().subscribe(observer);
    }

    #[must_use]
    pub fn runner(&self) -> &CpuRunner {
        &self.runner
    }

    #[must_use]
    pub fn ports(&self) -> &UlaPorts {
        &self.ports
    }

    #[must_use]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    /// The error that stopped the CPU, if any.
    pub fn take_error(&self) -> Option<CpuError> {
        self.runner.take_error()
    }
}
