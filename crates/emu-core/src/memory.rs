//! Flat 64K memory with a write-protected ROM region.
//!
//! Everything below `rom_size` rejects writes from the CPU. Snapshot and tape
//! loaders go through [`Memory::load_data`], which bypasses the protection and
//! tells any registered viewers that a region changed underneath them.

use std::fmt;

use thiserror::Error;

/// Size of the Z80 address space.
pub const MEMORY_SIZE: usize = 0x1_0000;

type DataLoadedListener = Box<dyn FnMut(u16, usize) + Send>;

/// Memory errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The ROM image does not fit in the 64K address space.
    #[error("ROM image is {size} bytes, larger than the {MEMORY_SIZE}-byte address space")]
    RomTooLarge { size: usize },
}

/// 64K byte store.
pub struct Memory {
    data: Box<[u8; MEMORY_SIZE]>,
    rom_size: usize,
    listeners: Vec<DataLoadedListener>,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0; MEMORY_SIZE]),
            rom_size: 0,
            listeners: Vec::new(),
        }
    }

    /// Number of bytes at the bottom of memory that reject writes.
    #[must_use]
    pub fn rom_size(&self) -> usize {
        self.rom_size
    }

    /// Read a byte.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    /// Write a byte, returning the value now stored at `addr`.
    ///
    /// Writes into the ROM region are ignored and return the existing byte.
    pub fn poke(&mut self, addr: u16, value: u8) -> u8 {
        let slot = &mut self.data[addr as usize];
        if (addr as usize) >= self.rom_size {
            *slot = value;
        }
        *slot
    }

    /// Read a little-endian word. The high byte wraps to 0x0000 past 0xFFFF.
    #[must_use]
    pub fn peek_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.peek(addr), self.peek(addr.wrapping_add(1))])
    }

    /// Write a little-endian word, returning the word now stored.
    pub fn poke_word(&mut self, addr: u16, value: u16) -> u16 {
        let [lo, hi] = value.to_le_bytes();
        let lo = self.poke(addr, lo);
        let hi = self.poke(addr.wrapping_add(1), hi);
        u16::from_le_bytes([lo, hi])
    }

    /// Clear memory and install a ROM image at address 0.
    ///
    /// An image larger than the address space is rejected and memory is left
    /// exactly as it was. Logging the failure is up to the caller.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), MemoryError> {
        if rom.len() > MEMORY_SIZE {
            return Err(MemoryError::RomTooLarge { size: rom.len() });
        }

        self.data.fill(0);
        self.data[..rom.len()].copy_from_slice(rom);
        self.rom_size = rom.len();
        Ok(())
    }

    /// Bulk write that ignores ROM protection. Addresses wrap past 0xFFFF.
    pub fn load_data(&mut self, data: &[u8], addr: u16) {
        let start = addr as usize;
        let len = data.len().min(MEMORY_SIZE);
        let data = &data[..len];
        let first = len.min(MEMORY_SIZE - start);
        self.data[start..start + first].copy_from_slice(&data[..first]);
        self.data[..len - first].copy_from_slice(&data[first..]);

        for listener in &mut self.listeners {
            listener(addr, len);
        }
    }

    /// Register a callback fired after every [`Memory::load_data`] with the
    /// start address and length of the region written.
    pub fn on_data_loaded(&mut self, listener: impl FnMut(u16, usize) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Borrowed view of the whole address space.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    /// Copy `len` bytes starting at `addr`, wrapping past 0xFFFF.
    #[must_use]
    pub fn read_range(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.peek(addr.wrapping_add(i as u16)))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("rom_size", &self.rom_size)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn poke_below_rom_size_is_ignored() {
        let mut mem = Memory::new();
        mem.load_rom(&[0xF3, 0xAF, 0x11]).expect("rom fits");

        assert_eq!(mem.poke(0x0001, 0x55), 0xAF);
        assert_eq!(mem.peek(0x0001), 0xAF);
        assert_eq!(mem.poke(0x0003, 0x55), 0x55);
        assert_eq!(mem.peek(0x0003), 0x55);
    }

    #[test]
    fn load_rom_clears_previous_contents() {
        let mut mem = Memory::new();
        mem.poke(0x8000, 0x42);
        mem.load_rom(&[0x01]).expect("rom fits");
        assert_eq!(mem.peek(0x8000), 0x00);
        assert_eq!(mem.rom_size(), 1);
    }

    #[test]
    fn oversized_rom_leaves_memory_untouched() {
        let mut mem = Memory::new();
        mem.load_rom(&[0xAA; 0x4000]).expect("rom fits");
        mem.poke(0x8000, 0x42);

        let err = mem.load_rom(&vec![0; MEMORY_SIZE + 1]).unwrap_err();
        assert_eq!(err, MemoryError::RomTooLarge { size: MEMORY_SIZE + 1 });
        assert_eq!(mem.rom_size(), 0x4000);
        assert_eq!(mem.peek(0x8000), 0x42);
        assert_eq!(mem.peek(0x0000), 0xAA);
    }

    #[test]
    fn full_size_rom_is_accepted() {
        let mut mem = Memory::new();
        mem.load_rom(&vec![0x76; MEMORY_SIZE]).expect("rom fits");
        assert_eq!(mem.poke(0xFFFF, 0x00), 0x76);
    }

    #[test]
    fn words_are_little_endian_and_wrap() {
        let mut mem = Memory::new();
        mem.poke_word(0x4000, 0x1234);
        assert_eq!(mem.peek(0x4000), 0x34);
        assert_eq!(mem.peek(0x4001), 0x12);

        mem.poke_word(0xFFFF, 0xABCD);
        assert_eq!(mem.peek(0xFFFF), 0xCD);
        assert_eq!(mem.peek(0x0000), 0xAB);
        assert_eq!(mem.peek_word(0xFFFF), 0xABCD);
    }

    #[test]
    fn load_data_bypasses_rom_and_notifies() {
        let mut mem = Memory::new();
        mem.load_rom(&[0; 0x4000]).expect("rom fits");

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        mem.on_data_loaded(move |addr, len| {
            assert_eq!((addr, len), (0x3FFF, 2));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        mem.load_data(&[0x11, 0x22], 0x3FFF);
        assert_eq!(mem.peek(0x3FFF), 0x11);
        assert_eq!(mem.peek(0x4000), 0x22);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_data_wraps_at_top_of_memory() {
        let mut mem = Memory::new();
        mem.load_data(&[1, 2, 3], 0xFFFE);
        assert_eq!(mem.read_range(0xFFFE, 3), vec![1, 2, 3]);
        assert_eq!(mem.peek(0x0000), 3);
    }
}
