use log::trace;

/// Timing and framing configuration shared by the bus engines.
///
/// Written one byte lane at a time by config-mode requests (lane 0 is the
/// most significant byte) and read, never written, by the engines. There
/// is no transactional update: an engine running mid-transfer may observe
/// a partially updated timeout or block size while a multi-lane write
/// sequence is in flight.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Cycles to wait for a command response start bit.
    pub cmd_timeout: u32,
    /// Cycles to wait for a data start bit.
    pub data_timeout: u32,
    /// Data block size in bytes, excluding the CRC trailer.
    pub block_size: u16,
    /// Selected signaling voltage; stored only, never acted on here.
    pub voltage_select: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_cmd_timeout(&mut self, lane: u8, value: u8) {
        let shift = 24 - 8 * u32::from(lane & 0b11);
        self.cmd_timeout = (self.cmd_timeout & !(0xFF << shift)) | (u32::from(value) << shift);
        trace!("cmd_timeout lane {} <- {:#04x} (now {})", lane, value, self.cmd_timeout);
    }

    pub fn store_data_timeout(&mut self, lane: u8, value: u8) {
        let shift = 24 - 8 * u32::from(lane & 0b11);
        self.data_timeout = (self.data_timeout & !(0xFF << shift)) | (u32::from(value) << shift);
        trace!("data_timeout lane {} <- {:#04x} (now {})", lane, value, self.data_timeout);
    }

    pub fn store_block_size(&mut self, lane: u8, value: u8) {
        let shift = 8 - 8 * u16::from(lane & 0b1);
        self.block_size = (self.block_size & !(0xFF << shift)) | (u16::from(value) << shift);
        trace!("block_size lane {} <- {:#04x} (now {})", lane, value, self.block_size);
    }

    pub fn store_voltage_select(&mut self, value: u8) {
        self.voltage_select = value & 1 != 0;
        trace!("voltage_select <- {}", self.voltage_select);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lanes_are_big_endian() {
        let mut cfg = Config::new();
        cfg.store_cmd_timeout(0, 0xDE);
        cfg.store_cmd_timeout(1, 0xAD);
        cfg.store_cmd_timeout(2, 0xBE);
        cfg.store_cmd_timeout(3, 0xEF);
        assert_eq!(cfg.cmd_timeout, 0xDEADBEEF);

        cfg.store_data_timeout(3, 0x42);
        assert_eq!(cfg.data_timeout, 0x0000_0042);

        cfg.store_block_size(0, 0x02);
        cfg.store_block_size(1, 0x00);
        assert_eq!(cfg.block_size, 512);
    }

    #[test]
    fn test_partial_update_is_observable() {
        let mut cfg = Config::new();
        cfg.store_data_timeout(0, 0x11);
        cfg.store_data_timeout(1, 0x22);
        // Two of four lanes written: a reader sees the half-updated value.
        assert_eq!(cfg.data_timeout, 0x1122_0000);
    }

    #[test]
    fn test_lane_rewrite_leaves_others() {
        let mut cfg = Config::new();
        cfg.store_cmd_timeout(0, 0xAA);
        cfg.store_cmd_timeout(3, 0xBB);
        cfg.store_cmd_timeout(0, 0xCC);
        assert_eq!(cfg.cmd_timeout, 0xCC00_00BB);
    }

    #[test]
    fn test_voltage_select_stores_bit_zero() {
        let mut cfg = Config::new();
        cfg.store_voltage_select(0x01);
        assert!(cfg.voltage_select);
        cfg.store_voltage_select(0xFE);
        assert!(!cfg.voltage_select);
    }
}
