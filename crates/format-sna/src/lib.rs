//! ZX Spectrum 48K SNA snapshots.
//!
//! A 48K snapshot is 49,179 bytes: a 27-byte register header followed by
//! the 48K of RAM from $4000. PC isn't in the header. It sits on the stack,
//! so saving pushes it and loading finishes with a RETN.

use thiserror::Error;
use tracing::debug;
use zilog_z80::Z80;

mod history;

pub use history::{CpuHistory, HISTORY_CAPACITY, HistoryError};

/// Size of a 48K SNA snapshot file.
pub const SNA_48K_SIZE: usize = HEADER_SIZE + RAM_SIZE;

const HEADER_SIZE: usize = 27;

/// RAM dump size ($4000-$FFFF).
const RAM_SIZE: usize = 49_152;
const RAM_START: u16 = 0x4000;

/// Header byte 19 holds IFF2 in this bit.
const IFF2_BIT: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnaError {
    #[error("SNA file must be {SNA_48K_SIZE} bytes, got {0}")]
    WrongLength(usize),
    #[error("SNA stack pointer {0:04X}h points into ROM, cannot pop PC")]
    StackInRom(u16),
    #[error("SNA interrupt mode {0} is not 0, 1 or 2")]
    InvalidInterruptMode(u8),
}

/// What a snapshot carries besides CPU state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnaInfo {
    /// Border colour, 0-7.
    pub border: u8,
}

fn word(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Restore a 48K snapshot into `cpu`.
///
/// Registers are cleared first, RAM is written with
/// [`Memory::load_data`](emu_core::Memory::load_data) so listeners see it,
/// and PC comes off the stack by RETN.
///
/// # Errors
///
/// Fails before touching the CPU if the data is the wrong size, SP points
/// into ROM, or the IM byte is out of range.
pub fn load_sna(cpu: &mut Z80, data: &[u8]) -> Result<SnaInfo, SnaError> {
    if data.len() != SNA_48K_SIZE {
        return Err(SnaError::WrongLength(data.len()));
    }
    let sp = word(data, 23);
    if sp < RAM_START {
        return Err(SnaError::StackInRom(sp));
    }
    let im = data[25];
    if im > 2 {
        return Err(SnaError::InvalidInterruptMode(im));
    }

    cpu.reset();
    let regs = cpu.registers_mut();
    regs.i = data[0];

    let alt = regs.alt_mut();
    alt.l = data[1];
    alt.h = data[2];
    alt.e = data[3];
    alt.d = data[4];
    alt.c = data[5];
    alt.b = data[6];
    alt.f = data[7];
    alt.a = data[8];

    let main = regs.main_mut();
    main.l = data[9];
    main.h = data[10];
    main.e = data[11];
    main.d = data[12];
    main.c = data[13];
    main.b = data[14];
    main.f = data[21];
    main.a = data[22];

    regs.iy = word(data, 15);
    regs.ix = word(data, 17);
    regs.iff2 = data[19] & IFF2_BIT != 0;
    regs.r = data[20];
    regs.sp = sp;
    regs.im = im;

    cpu.memory_mut().load_data(&data[HEADER_SIZE..], RAM_START);
    cpu.retn();

    let pc = cpu.registers().pc;
    cpu.log_sink().in_scope(|| debug!(pc, sp, "SNA loaded"));
    Ok(SnaInfo {
        border: data[26] & 0x07,
    })
}

/// Capture `cpu` as a 48K snapshot.
///
/// PC is pushed onto the stack for the dump and SP is put back afterwards,
/// so the two RAM bytes below SP end up holding PC.
pub fn save_sna(cpu: &mut Z80, border: u8) -> Vec<u8> {
    let pc = cpu.registers().pc;
    cpu.push_word(pc);

    let regs = cpu.registers();
    let alt = regs.alt();
    let main = regs.main();
    let mut data = Vec::with_capacity(SNA_48K_SIZE);
    data.push(regs.i);
    data.extend_from_slice(&[alt.l, alt.h, alt.e, alt.d, alt.c, alt.b, alt.f, alt.a]);
    data.extend_from_slice(&[main.l, main.h, main.e, main.d, main.c, main.b]);
    data.extend_from_slice(&regs.iy.to_le_bytes());
    data.extend_from_slice(&regs.ix.to_le_bytes());
    data.push(if regs.iff2 { IFF2_BIT } else { 0 });
    data.push(regs.r);
    data.extend_from_slice(&[main.f, main.a]);
    data.extend_from_slice(&regs.sp.to_le_bytes());
    data.push(regs.im);
    data.push(border & 0x07);
    data.extend_from_slice(&cpu.memory().as_slice()[usize::from(RAM_START)..]);

    let regs = cpu.registers_mut();
    regs.sp = regs.sp.wrapping_add(2);
    cpu.log_sink().in_scope(|| debug!(pc, "SNA saved"));
    data
}
