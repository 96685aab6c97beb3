use log::trace;

use crate::deframer::Deframer;

/// The CRC status token a card returns when the received block failed its
/// CRC check; any other token is treated as acceptance.
const CRC_STATUS_ERROR: u8 = 0b101;

/// Classification pulses for one cycle. Both flags are single-cycle: the
/// caller must sample them on the cycle they fire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrcTick {
    pub valid: bool,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    WaitCheck,
}

/// Decoder for the 3-bit CRC status token a card drives on data line 0
/// after a block write.
#[derive(Debug)]
pub struct CrcDecoder {
    state: State,
    deframer: Deframer,
}

impl CrcDecoder {
    pub fn new() -> Self {
        CrcDecoder {
            state: State::Idle,
            // The token's start bit is consumed by the deframer, not
            // packed: three status bits remain.
            deframer: Deframer::new(1, 3, true),
        }
    }

    /// Arm the decoder: begin watching data line 0 for the status token.
    pub fn start(&mut self) {
        self.deframer.reset();
        self.state = State::WaitCheck;
    }

    /// Advance one cycle with the sampled state of data line 0.
    pub fn tick(&mut self, dat0: bool) -> CrcTick {
        match self.state {
            State::Idle => CrcTick::default(),
            State::WaitCheck => match self.deframer.sample(u8::from(dat0)) {
                Some(token) => {
                    self.state = State::Idle;
                    let error = token == CRC_STATUS_ERROR;
                    trace!("CRC status token {:#05b}.", token);
                    CrcTick {
                        valid: !error,
                        error,
                    }
                }
                None => CrcTick::default(),
            },
        }
    }
}

impl Default for CrcDecoder {
    fn default() -> Self {
        Self::new()
    }
}
