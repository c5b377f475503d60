//! The 40-key matrix behind port $FE.
//!
//! Eight half-rows of five keys. A read puts the half-row selection on the
//! high address byte, one line per half-row, active low. Pressed keys read
//! as 0 in bits 0-4; bits 5-7 read as 1.

/// Key names by half-row (A8 first) and column (bit 0 first).
const LAYOUT: [[&str; 5]; 8] = [
    ["CAPS", "Z", "X", "C", "V"],
    ["A", "S", "D", "F", "G"],
    ["Q", "W", "E", "R", "T"],
    ["1", "2", "3", "4", "5"],
    ["0", "9", "8", "7", "6"],
    ["P", "O", "I", "U", "Y"],
    ["ENTER", "L", "K", "J", "H"],
    ["SPACE", "SYM", "M", "N", "B"],
];

/// Pressed keys, one bitmask of columns per half-row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardState {
    rows: [u8; 8],
}

impl KeyboardState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Press or release the key at `row` (0-7), `column` (0-4). Out of
    /// range positions are ignored.
    pub fn set_key(&mut self, row: usize, column: u8, pressed: bool) {
        let Some(mask) = self.rows.get_mut(row) else {
            return;
        };
        if column < 5 {
            if pressed {
                *mask |= 1 << column;
            } else {
                *mask &= !(1 << column);
            }
        }
    }

    /// Press or release a key by its legend (`"Q"`, `"ENTER"`, `"SYM"`...).
    /// Returns false for an unknown name.
    pub fn set_named(&mut self, name: &str, pressed: bool) -> bool {
        match Self::position(name) {
            Some((row, column)) => {
                self.set_key(row, column, pressed);
                true
            }
            None => false,
        }
    }

    /// Half-row and column of a key legend.
    #[must_use]
    pub fn position(name: &str) -> Option<(usize, u8)> {
        LAYOUT.iter().enumerate().find_map(|(row, keys)| {
            keys.iter()
                .position(|key| key.eq_ignore_ascii_case(name))
                .map(|column| (row, column as u8))
        })
    }

    pub fn release_all(&mut self) {
        self.rows = [0; 8];
    }

    /// The byte an `IN` from port $FE returns for high address byte
    /// `addr_high`.
    ///
    /// The matrix has no diodes, so three pressed keys on the corners of a
    /// rectangle pull the fourth corner low too. Rows joined through a shared
    /// pressed column are added to the scan until nothing changes.
    #[must_use]
    pub fn read(&self, addr_high: u8) -> u8 {
        let mut selected = !addr_high;
        let columns = loop {
            let columns = self.columns_of(selected);
            let joined = self
                .rows
                .iter()
                .enumerate()
                .filter(|(_, mask)| *mask & columns != 0)
                .fold(selected, |rows, (row, _)| rows | (1 << row));
            if joined == selected {
                break columns;
            }
            selected = joined;
        };
        (!columns & 0x1F) | 0xE0
    }

    fn columns_of(&self, rows: u8) -> u8 {
        self.rows
            .iter()
            .enumerate()
            .filter(|(row, _)| rows & (1 << row) != 0)
            .fold(0, |columns, (_, mask)| columns | mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_matrix_reads_high() {
        let keyboard = KeyboardState::new();
        assert_eq!(keyboard.read(0x00), 0xFF);
    }

    #[test]
    fn key_only_visible_on_its_row() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_key(1, 0, true);
        assert_eq!(keyboard.read(0xFD), 0xFE);
        assert_eq!(keyboard.read(0xFE), 0xFF);

        keyboard.set_key(1, 0, false);
        assert_eq!(keyboard.read(0xFD), 0xFF);
    }

    #[test]
    fn named_keys() {
        let mut keyboard = KeyboardState::new();
        assert!(keyboard.set_named("enter", true));
        assert!(!keyboard.set_named("F1", true));
        assert_eq!(KeyboardState::position("SYM"), Some((7, 1)));
        assert_eq!(keyboard.read(0xBF), 0xFE);

        keyboard.release_all();
        assert_eq!(keyboard.read(0x00), 0xFF);
    }

    #[test]
    fn several_rows_combine() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_named("CAPS", true);
        keyboard.set_named("0", true);
        assert_eq!(keyboard.read(0xEE) & 0x1F, 0x1E);
    }

    #[test]
    fn three_corners_ghost_the_fourth() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_named("CAPS", true);
        keyboard.set_named("Z", true);
        keyboard.set_named("A", true);
        // S was never pressed.
        assert_eq!(keyboard.read(0xFD) & 0x1F, 0x1C);
    }

    #[test]
    fn diagonal_keys_do_not_ghost() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_key(0, 0, true);
        keyboard.set_key(1, 1, true);
        assert_eq!(keyboard.read(0xFE) & 0x1F, 0x1E);
        assert_eq!(keyboard.read(0xFD) & 0x1F, 0x1D);
    }
}
