//! Wire-level bus emulator.
//!
//! Resolves each cycle's sampled line state from the host drive, an
//! optional card-side drive, and the idle-high pull-ups. This is a model
//! of the wires only — card behavior is scripted by whoever sets the
//! card-side fields.

use crate::pads::{PadsIn, PadsOut};

/// An emulated SD bus with optional card-side drives.
#[derive(Debug)]
pub struct BusEmulator {
    /// Card-side command line drive; `None` leaves the line tristated.
    pub card_cmd: Option<bool>,
    /// Card-side data bus drive; `None` leaves the lines tristated.
    pub card_data: Option<u8>,
    /// Card-detect level.
    pub card_present: bool,
}

impl BusEmulator {
    pub fn new() -> Self {
        BusEmulator {
            card_cmd: None,
            card_data: None,
            card_present: true,
        }
    }

    pub fn with_card_absent() -> Self {
        BusEmulator {
            card_present: false,
            ..Self::new()
        }
    }

    /// Resolve the line state seen by the host for one cycle. The host
    /// drive wins whenever its output enable is asserted; otherwise the
    /// card drive applies, and an undriven line floats high.
    pub fn resolve(&self, drive: &PadsOut) -> PadsIn {
        PadsIn {
            cmd: if drive.cmd_oe {
                drive.cmd_o
            } else {
                self.card_cmd.unwrap_or(true)
            },
            data: if drive.data_oe {
                drive.data_o & 0b1111
            } else {
                self.card_data.unwrap_or(0b1111) & 0b1111
            },
            cd: self.card_present,
        }
    }
}

impl Default for BusEmulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undriven_bus_floats_high() {
        let emu = BusEmulator::new();
        let line = emu.resolve(&PadsOut::default());
        assert_eq!(line, PadsIn::idle());
    }

    #[test]
    fn test_host_drive_loops_back() {
        let emu = BusEmulator::new();
        let drive = PadsOut {
            clk: true,
            cmd_o: false,
            cmd_oe: true,
            data_o: 0b0101,
            data_oe: true,
        };
        let line = emu.resolve(&drive);
        assert!(!line.cmd);
        assert_eq!(line.data, 0b0101);
    }

    #[test]
    fn test_card_drive_applies_when_host_tristated() {
        let mut emu = BusEmulator::new();
        emu.card_cmd = Some(false);
        emu.card_data = Some(0b1110);
        let line = emu.resolve(&PadsOut::default());
        assert!(!line.cmd);
        assert_eq!(line.data, 0b1110);

        // Host drive overrides the card.
        let drive = PadsOut {
            cmd_o: true,
            cmd_oe: true,
            data_o: 0b1111,
            data_oe: true,
            ..PadsOut::default()
        };
        let line = emu.resolve(&drive);
        assert!(line.cmd);
        assert_eq!(line.data, 0b1111);
    }
}
