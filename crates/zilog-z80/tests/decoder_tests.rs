//! Opcode-space coverage and the fallback warning.

use std::io;
use std::sync::Arc;

use emu_core::Memory;
use parking_lot::Mutex;
use zilog_z80::{Decoder, InstructionTable, LogSink, Resolved, Z80};

/// In-memory log destination for a `fmt` subscriber.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn sink(&self) -> LogSink {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        LogSink::new(tracing::Dispatch::new(subscriber))
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn every_two_byte_sequence_decodes() {
    let mut decoder = Decoder::new(LogSink::global());
    let mut memory = Memory::new();
    for first in 0..=255u8 {
        for second in 0..=255u8 {
            memory.load_data(&[first, second, 0x12, second], 0x8000);
            let instruction = decoder
                .decode(&memory, 0x8000)
                .unwrap_or_else(|e| panic!("{first:02X} {second:02X}: {e}"));
            assert!(instruction.byte_count() >= 1);
        }
    }
}

#[test]
fn indexed_bit_ops_resolve_by_final_byte() {
    let table = InstructionTable::global();
    let mut memory = Memory::new();
    memory.load_data(&[0xFD, 0xCB, 0x7F, 0xBE], 0);
    match table.resolve(&memory, 0) {
        Resolved::Exact(instruction) => {
            assert_eq!(instruction.mnemonic(), "RES 7,(IY+d)");
            assert_eq!(instruction.render(&memory, 0), "RES 7,(IY+7Fh)");
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn fallback_warning_is_logged_once() {
    let capture = Capture::default();
    let mut cpu = Z80::new();
    cpu.set_log_sink(capture.sink());
    // ED 77; DD 00 (ignored prefix + NOP); ED 7F; FD 04 (INC B)
    cpu.memory_mut()
        .load_data(&[0xED, 0x77, 0xDD, 0x00, 0xED, 0x7F, 0xFD, 0x04], 0);
    cpu.registers_mut().r = 0;

    assert_eq!(cpu.step().unwrap(), 8);
    assert_eq!(cpu.registers().r, 2);
    assert_eq!(cpu.step().unwrap(), 8);
    assert_eq!(cpu.registers().pc, 4);
    assert_eq!(cpu.step().unwrap(), 8);
    assert_eq!(cpu.step().unwrap(), 8);
    assert_eq!(cpu.registers().pc, 8);
    assert_eq!(cpu.registers().get8(zilog_z80::Reg8::B), 0x00);

    let text = capture.text();
    assert_eq!(text.matches("unsupported prefix combination").count(), 1, "{text}");
    assert!(text.contains("WARN"));
    assert!(cpu.decoder().has_warned());
}

#[test]
fn table_lists_documented_and_undocumented_forms() {
    let mnemonics: Vec<&str> = InstructionTable::global()
        .iter()
        .map(|i| i.mnemonic())
        .collect();
    for expected in [
        "SLL B",
        "IN F,(C)",
        "OUT (C),0",
        "LD IYL,n",
        "SRA (IX+d),E",
        "SET 4,(IY+d),A",
        "OTDR",
        "LD A,R",
    ] {
        assert!(mnemonics.contains(&expected), "{expected} missing");
    }
}
