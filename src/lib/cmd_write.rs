use log::{debug, info};

use crate::stream::{EngineTick, TransferRequest};

/// Length of the one-time card initialization pulse train.
const INIT_CYCLES: u32 = 80;
/// Trailing clocks emitted after the final command byte.
const TAIL_CLOCKS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Init,
    Write,
    Clk8,
}

/// Command-plane write engine.
///
/// The first activation drives the 80-cycle initialization pulse train
/// (clock running, command line and all four data lines held high), then
/// every routed request byte is serialized onto the command line MSB
/// first, one bit per cycle. The final byte of a command is followed by
/// 8 trailing clocks with the line idling high.
pub struct CmdWriter {
    state: State,
    count: u32,
    initialized: bool,
}

impl CmdWriter {
    pub fn new() -> Self {
        CmdWriter {
            state: State::Idle,
            count: 0,
            initialized: false,
        }
    }

    /// True once the initialization pulse train has run.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Advance one bus cycle. `req` is the routed head-of-stream element,
    /// re-presented every cycle until accepted.
    pub fn tick(&mut self, req: Option<&TransferRequest>) -> EngineTick {
        let mut out = EngineTick::default();
        match self.state {
            State::Idle => {
                if req.is_some() {
                    self.count = 0;
                    if self.initialized {
                        self.state = State::Write;
                    } else {
                        // Run once per engine lifetime, and only now:
                        // the pending request is serviced afterwards.
                        info!("Starting the card initialization pulse train.");
                        self.state = State::Init;
                    }
                }
            }
            State::Init => {
                out.pads.clk = true;
                out.pads.cmd_oe = true;
                out.pads.cmd_o = true;
                out.pads.data_oe = true;
                out.pads.data_o = 0b1111;
                if self.count == INIT_CYCLES - 1 {
                    info!("Card initialization pulse train complete.");
                    self.initialized = true;
                    self.count = 0;
                    self.state = State::Idle;
                } else {
                    self.count += 1;
                }
            }
            State::Write => {
                if let Some(req) = req {
                    out.pads.clk = true;
                    out.pads.cmd_oe = true;
                    out.pads.cmd_o = (req.data >> (7 - self.count)) & 1 != 0;
                    if self.count == 7 {
                        debug!("Serialized command byte {:#04x}.", req.data);
                        self.count = 0;
                        if req.last {
                            self.state = State::Clk8;
                        } else {
                            out.accepted = true;
                            self.state = State::Idle;
                        }
                    } else {
                        self.count += 1;
                    }
                }
            }
            State::Clk8 => {
                out.pads.clk = true;
                out.pads.cmd_oe = true;
                out.pads.cmd_o = true;
                if self.count == TAIL_CLOCKS - 1 {
                    self.count = 0;
                    out.accepted = true;
                    self.state = State::Idle;
                } else {
                    self.count += 1;
                }
            }
        }
        out
    }
}

impl Default for CmdWriter {
    fn default() -> Self {
        Self::new()
    }
}
