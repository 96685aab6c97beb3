use log::{debug, trace, warn};

use crate::crc::CrcDecoder;
use crate::pads::PadsIn;
use crate::stream::{EngineTick, TransferRequest};

/// Cycles to wait after the stop pattern before polling for busy release.
const RESPONSE_WINDOW: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Start,
    Data,
    Stop,
    Response,
}

/// Data-plane write engine.
///
/// A block is serialized as nibble pairs across the four data lines: the
/// all-zero start nibble, then high/low nibbles of every byte, then the
/// all-ones stop pattern. After the stop pattern the engine arms the CRC
/// decoder, waits a fixed window, and polls data line 0 until the card
/// releases busy (line high). CRC classification is diagnostic only: an
/// error is logged and counted but never blocks completion.
pub struct DataWriter {
    state: State,
    wrstarted: bool,
    count: u32,
    crc: CrcDecoder,
    crc_errors: u64,
    crc_tokens: u64,
}

impl DataWriter {
    pub fn new() -> Self {
        DataWriter {
            state: State::Idle,
            wrstarted: false,
            count: 0,
            crc: CrcDecoder::new(),
            crc_errors: 0,
            crc_tokens: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Total CRC status tokens that reported an error.
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    /// Total CRC status tokens observed.
    pub fn crc_tokens(&self) -> u64 {
        self.crc_tokens
    }

    /// Advance one bus cycle.
    pub fn tick(&mut self, req: Option<&TransferRequest>, line: &PadsIn) -> EngineTick {
        // The decoder watches data line 0 every cycle; it only reacts
        // between its arming at STOP and the token's completion.
        let crc = self.crc.tick(line.data & 1 != 0);
        if crc.error {
            self.crc_tokens += 1;
            self.crc_errors += 1;
            warn!("Card reported a CRC error for the written block.");
        } else if crc.valid {
            self.crc_tokens += 1;
            trace!("Card accepted the written block.");
        }

        let mut out = EngineTick::default();
        match self.state {
            State::Idle => {
                if let Some(req) = req {
                    out.pads.clk = true;
                    out.pads.data_oe = true;
                    if self.wrstarted {
                        out.pads.data_o = req.data >> 4;
                        self.state = State::Data;
                    } else {
                        // Start nibble: all four lines low for one cycle.
                        out.pads.data_o = 0b0000;
                        self.state = State::Start;
                    }
                }
            }
            State::Start => {
                if let Some(req) = req {
                    out.pads.clk = true;
                    out.pads.data_oe = true;
                    out.pads.data_o = req.data >> 4;
                    self.wrstarted = true;
                    self.state = State::Data;
                }
            }
            State::Data => {
                if let Some(req) = req {
                    out.pads.clk = true;
                    out.pads.data_oe = true;
                    out.pads.data_o = req.data & 0b1111;
                    if req.last {
                        self.state = State::Stop;
                    } else {
                        out.accepted = true;
                        self.state = State::Idle;
                    }
                }
            }
            State::Stop => {
                out.pads.clk = true;
                out.pads.data_oe = true;
                out.pads.data_o = 0b1111;
                self.wrstarted = false;
                self.crc.start();
                self.state = State::Response;
            }
            State::Response => {
                out.pads.clk = true;
                if self.count < RESPONSE_WINDOW {
                    self.count += 1;
                } else if line.data & 1 != 0 {
                    // Busy released: the card has committed the block.
                    debug!("Busy released after {} response cycles.", self.count);
                    self.count = 0;
                    out.accepted = true;
                    self.state = State::Idle;
                }
            }
        }
        out
    }
}

impl Default for DataWriter {
    fn default() -> Self {
        Self::new()
    }
}
