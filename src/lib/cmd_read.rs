use log::{debug, trace};

use crate::config::Config;
use crate::deframer::Deframer;
use crate::pads::PadsIn;
use crate::queue::TransferQueue;
use crate::stream::{EngineTick, ResponseEvent, ResponseStatus, TransferRequest};

/// Trailing clocks emitted after the final response byte.
const TAIL_CLOCKS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Wait,
    Cmd,
    Clk8,
    Timeout,
}

/// Command-plane read engine.
///
/// A routed request carries the expected response byte count in its
/// payload; the engine waits for the response start bit (bounded by the
/// configured command timeout), deframes `expected + 1` bytes off the
/// command line, and finishes with 8 trailing clocks when the request is
/// the last of its transfer. The start bit is part of the first response
/// byte, so the deframer runs start-gated.
pub struct CmdReader {
    state: State,
    count: u32,
    timeout: u32,
    deframer: Deframer,
    rx: TransferQueue,
}

impl CmdReader {
    pub fn new() -> Self {
        CmdReader {
            state: State::Idle,
            count: 0,
            timeout: 0,
            deframer: Deframer::new(1, 8, false),
            rx: TransferQueue::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Advance one bus cycle.
    pub fn tick(&mut self, req: Option<&TransferRequest>, line: &PadsIn, cfg: &Config) -> EngineTick {
        let mut out = EngineTick::default();
        match self.state {
            State::Idle => {
                if req.is_some() {
                    self.count = 0;
                    self.timeout = 0;
                    self.deframer.reset();
                    self.rx.clear();
                    self.state = State::Wait;
                }
            }
            State::Wait => {
                out.pads.clk = true;
                self.pump(line.cmd);
                self.timeout += 1;
                if !self.rx.is_empty() {
                    self.state = State::Cmd;
                } else if self.timeout > cfg.cmd_timeout {
                    debug!("No response start bit within {} cycles.", cfg.cmd_timeout);
                    self.state = State::Timeout;
                }
            }
            State::Cmd => {
                out.pads.clk = true;
                self.pump(line.cmd);
                if let Some(req) = req {
                    if let Some(data) = self.rx.pop() {
                        let last = self.count == u32::from(req.data);
                        trace!("Response byte {} = {:#04x}.", self.count, data);
                        out.response = Some(ResponseEvent {
                            data,
                            status: ResponseStatus::Ok,
                            last,
                        });
                        self.count += 1;
                        if last {
                            if req.last {
                                self.count = 0;
                                self.state = State::Clk8;
                            } else {
                                out.accepted = true;
                                self.state = State::Idle;
                            }
                        }
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
            State::Timeout => {
                out.response = Some(ResponseEvent {
                    data: 0,
                    status: ResponseStatus::Timeout,
                    last: true,
                });
                out.accepted = true;
                self.state = State::Idle;
            }
        }
        out
    }

    /// Receive-domain half of the cycle: sample the command line and relay
    /// completed bytes into the crossing queue. The deframer stalls while
    /// the queue is full, so no byte is dropped at the boundary.
    fn pump(&mut self, cmd_in: bool) {
        if self.rx.is_full() {
            return;
        }
        if let Some(byte) = self.deframer.sample(u8::from(cmd_in)) {
            self.rx.push(byte);
        }
    }
}

impl Default for CmdReader {
    fn default() -> Self {
        Self::new()
    }
}
