//! Machine-level tests with tiny inline ROMs. No real ROM image is needed.

use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use emu_core::Speed;
use emu_spectrum::{Program, Spectrum, SpectrumConfig, SpectrumError};
use format_sna::{HistoryError, SNA_48K_SIZE, SnaError, save_sna};
use zilog_z80::{CpuEvent, CpuState, Z80};

const TIMEOUT: Duration = Duration::from_secs(5);

/// DI; LD A,2; OUT (FEh),A; IM 1; EI; HALT; JR -3, with EI; RETI at 0038h.
fn frame_loop_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    rom[..11].copy_from_slice(&[0xF3, 0x3E, 0x02, 0xD3, 0xFE, 0xED, 0x56, 0xFB, 0x76, 0x18, 0xFD]);
    rom[0x38..0x3B].copy_from_slice(&[0xFB, 0xED, 0x4D]);
    rom
}

fn config(rom: Vec<u8>, program: Option<Program>) -> SpectrumConfig {
    SpectrumConfig {
        rom,
        program,
        speed: Speed::Maximum,
    }
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn rom_runs_frames() {
    let spectrum = Spectrum::new(config(frame_loop_rom(), None)).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut frames = 0;
    spectrum.subscribe(move |event, _| {
        if *event == CpuEvent::InterruptFired {
            frames += 1;
            if frames == 3 {
                let _ = tx.send(());
            }
        }
    });

    spectrum.start().unwrap();
    rx.recv_timeout(TIMEOUT).unwrap();
    spectrum.stop();

    assert_eq!(spectrum.ports().border(), 2);
    assert_eq!(spectrum.runner().state(), CpuState::Idle);
    assert!(spectrum.runner().lock().t_states() >= 3 * 69_888);
    assert!(spectrum.take_error().is_none());
}

#[test]
fn binary_loads_and_starts_at_its_address() {
    // LD A,5; OUT (FEh),A; HALT
    let program = Program::Binary {
        data: vec![0x3E, 0x05, 0xD3, 0xFE, 0x76],
        addr: 0x8000,
    };
    let spectrum = Spectrum::new(config(vec![0; 0x4000], Some(program))).unwrap();
    spectrum.start().unwrap();

    assert!(wait_for(|| spectrum.ports().border() == 5));
    assert!(wait_for(|| spectrum.runner().lock().is_halted()));
    spectrum.stop();
    assert_eq!(spectrum.runner().lock().registers().pc, 0x8004);
}

#[test]
fn snapshot_restores_state_and_border() {
    // LD A,3; OUT (FEh),A; HALT
    let mut source = Z80::new();
    source.memory_mut().load_data(&[0x3E, 0x03, 0xD3, 0xFE, 0x76], 0x9000);
    source.registers_mut().pc = 0x9000;
    source.registers_mut().sp = 0xFF00;
    source.registers_mut().ix = 0x1234;
    let sna = save_sna(&mut source, 6);

    let spectrum =
        Spectrum::new(config(vec![0; 0x4000], Some(Program::Snapshot(sna)))).unwrap();
    spectrum.start().unwrap();
    assert!(wait_for(|| spectrum.ports().border() == 3));
    assert!(wait_for(|| spectrum.runner().lock().is_halted()));
    spectrum.stop();

    let cpu = spectrum.runner().lock();
    assert_eq!(cpu.registers().ix, 0x1234);
    assert_eq!(cpu.registers().sp, 0xFF00);
    assert_eq!(cpu.registers().pc, 0x9004);
}

#[test]
fn bad_snapshot_leaves_machine_off() {
    let program = Program::Snapshot(vec![0; 1000]);
    let spectrum = Spectrum::new(config(vec![0; 0x4000], Some(program))).unwrap();
    let err = spectrum.start().unwrap_err();
    assert!(matches!(
        err,
        SpectrumError::Snapshot(SnaError::WrongLength(1000))
    ));
    assert_eq!(spectrum.runner().state(), CpuState::Idle);
}

#[test]
fn oversized_rom_is_rejected() {
    let result = Spectrum::new(config(vec![0; 0x1_0001], None));
    assert!(matches!(result, Err(SpectrumError::Rom(_))));
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn oversized_rom_is_logged() {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        Spectrum::new(config(vec![0; 0x1_0001], None))
    });
    assert!(result.is_err());
    let text = String::from_utf8_lossy(&capture.0.lock().unwrap()).into_owned();
    assert!(text.contains("ROM rejected"), "{text}");
    assert!(text.contains("65537"), "{text}");
}

#[test]
fn save_snapshot_after_stop() {
    let program = Program::Binary {
        data: vec![0x3E, 0x04, 0xD3, 0xFE, 0x76],
        addr: 0x8000,
    };
    let spectrum = Spectrum::new(config(vec![0; 0x4000], Some(program))).unwrap();
    spectrum.start().unwrap();
    assert!(wait_for(|| spectrum.runner().lock().is_halted()));
    spectrum.stop();

    let data = spectrum.save_snapshot();
    assert_eq!(data.len(), SNA_48K_SIZE);
    assert_eq!(data[26], 4);
    // SP is back where it was after the save.
    assert_eq!(spectrum.runner().lock().registers().sp, 0xFFFF);
}

#[test]
fn breakpoint_switches_to_stepping() {
    // NOP; NOP; NOP; JR -2
    let program = Program::Binary {
        data: vec![0x00, 0x00, 0x00, 0x18, 0xFE],
        addr: 0x8000,
    };
    let spectrum = Spectrum::new(config(vec![0; 0x4000], Some(program))).unwrap();
    spectrum.breakpoints().add(0x8002);
    spectrum.start().unwrap();

    assert!(wait_for(|| spectrum.runner().is_debugging()));
    assert_eq!(spectrum.runner().state(), CpuState::DebugStepping);
    assert_eq!(spectrum.runner().lock().registers().pc, 0x8002);

    spectrum.runner().debugger_step();
    assert!(wait_for(|| spectrum.runner().lock().registers().pc == 0x8003));
    spectrum.stop();
}

#[test]
fn keyboard_is_visible_to_in() {
    // LD A,FDh; IN A,(FEh); LD (9000h),A; HALT
    let program = Program::Binary {
        data: vec![0x3E, 0xFD, 0xDB, 0xFE, 0x32, 0x00, 0x90, 0x76],
        addr: 0x8000,
    };
    let spectrum = Spectrum::new(config(vec![0; 0x4000], Some(program))).unwrap();
    spectrum.ports().keyboard().set_named("S", true);
    spectrum.start().unwrap();
    assert!(wait_for(|| spectrum.runner().lock().is_halted()));
    spectrum.stop();
    assert_eq!(spectrum.runner().lock().memory().peek(0x9000), 0xBD);
}

#[test]
fn history_samples_each_second_and_rewinds() {
    let spectrum = Spectrum::new(config(frame_loop_rom(), None)).unwrap();
    let (tx, rx) = mpsc::channel();
    spectrum.track_history(move || {
        tx.send(()).ok();
    });

    spectrum.start().unwrap();
    while spectrum.history().len() < 3 {
        rx.recv_timeout(TIMEOUT).unwrap();
        spectrum.record_history();
    }
    spectrum.stop();

    let second = spectrum.runner().lock().config().t_states_per_second as u64;
    let history = spectrum.history();
    let first = history.t_states_at(0).unwrap();
    assert!(first >= 2 * second, "first sample at {first}");
    assert!(history.t_states_at(1).unwrap() > first);

    spectrum.rewind(2).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(spectrum.ports().border(), 2);
    assert_eq!(spectrum.runner().lock().registers().im, 1);

    spectrum.rewind(60).unwrap();
    assert!(history.is_empty());
    assert!(matches!(
        spectrum.rewind(1),
        Err(SpectrumError::History(HistoryError::OutOfRange { index: 0, len: 0 }))
    ));
}
