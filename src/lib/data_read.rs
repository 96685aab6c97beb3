use log::{debug, trace};

use crate::config::Config;
use crate::deframer::Deframer;
use crate::pads::PadsIn;
use crate::queue::TransferQueue;
use crate::stream::{EngineTick, ResponseEvent, ResponseStatus, TransferRequest};

/// Bytes of CRC trailer following every block (one 16-bit CRC per line).
const TRAILER_BYTES: u32 = 8;
/// Trailing clocks emitted after the final block byte.
const TAIL_CLOCKS: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Wait,
    Data,
    Clk40,
    Timeout,
}

/// Data-plane read engine.
///
/// Waits for the data start nibble (bounded by the configured data
/// timeout), then deframes `block_size + 8` bytes — the block plus its
/// CRC trailer — off the four data lines, two nibbles per byte. The
/// start nibble is not part of the data, so the deframer runs in
/// skip-start mode. The last block of a transfer is followed by 40
/// trailing clocks.
pub struct DataReader {
    state: State,
    count: u32,
    timeout: u32,
    deframer: Deframer,
    rx: TransferQueue,
}

impl DataReader {
    pub fn new() -> Self {
        DataReader {
            state: State::Idle,
            count: 0,
            timeout: 0,
            deframer: Deframer::new(4, 8, true),
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
                    out.pads.clk = true;
                    self.count = 0;
                    self.timeout = 0;
                    self.deframer.reset();
                    self.rx.clear();
                    self.state = State::Wait;
                }
            }
            State::Wait => {
                out.pads.clk = true;
                self.pump(line.data);
                self.timeout += 1;
                if !self.rx.is_empty() {
                    self.state = State::Data;
                } else if self.timeout > cfg.data_timeout {
                    debug!("No data start bit within {} cycles.", cfg.data_timeout);
                    self.state = State::Timeout;
                }
            }
            State::Data => {
                out.pads.clk = true;
                self.pump(line.data);
                if let Some(req) = req {
                    if let Some(data) = self.rx.pop() {
                        // Block size is read live each cycle; a
                        // mid-transfer config write is observable here.
                        let last = self.count == u32::from(cfg.block_size) + TRAILER_BYTES - 1;
                        trace!("Data byte {} = {:#04x}.", self.count, data);
                        out.response = Some(ResponseEvent {
                            data,
                            status: ResponseStatus::Ok,
                            last,
                        });
                        self.count += 1;
                        if last {
                            if req.last {
                                self.count = 0;
                                self.state = State::Clk40;
                            } else {
                                out.accepted = true;
                                self.state = State::Idle;
                            }
                        }
                    }
                }
            }
            State::Clk40 => {
                out.pads.clk = true;
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

    /// Receive-domain half of the cycle: sample the data lines and relay
    /// completed bytes into the crossing queue. The deframer stalls while
    /// the queue is full, so no byte is dropped at the boundary.
    fn pump(&mut self, data_in: u8) {
        if self.rx.is_full() {
            return;
        }
        if let Some(byte) = self.deframer.sample(data_in) {
            self.rx.push(byte);
        }
    }
}

impl Default for DataReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ntest::timeout;

    use crate::init_test_logging;
    use crate::stream::data_read_request;

    /// A scripted data bus: replays a fixed nibble sequence, then holds
    /// the lines idle-high.
    struct BusScript {
        nibbles: Vec<u8>,
        cursor: usize,
    }

    impl BusScript {
        /// Idle cycles, the start nibble, then `bytes` as nibble pairs.
        fn block(idle: usize, bytes: &[u8]) -> Self {
            let mut nibbles = vec![0b1111; idle];
            nibbles.push(0b0000);
            for &byte in bytes {
                nibbles.push(byte >> 4);
                nibbles.push(byte & 0b1111);
            }
            BusScript { nibbles, cursor: 0 }
        }

        fn next(&mut self) -> PadsIn {
            let data = self.nibbles.get(self.cursor).copied().unwrap_or(0b1111);
            self.cursor += 1;
            PadsIn {
                data,
                ..PadsIn::idle()
            }
        }
    }

    fn run_request(
        engine: &mut DataReader,
        req: &TransferRequest,
        bus: &mut BusScript,
        cfg: &Config,
    ) -> Vec<ResponseEvent> {
        let mut responses = Vec::new();
        let mut cycles = 0u32;
        loop {
            let tick = engine.tick(Some(req), &bus.next(), cfg);
            if let Some(resp) = tick.response {
                responses.push(resp);
            }
            cycles += 1;
            assert!(cycles < 100_000, "engine wedged");
            if tick.accepted {
                return responses;
            }
        }
    }

    /// A block plus a throwaway trailer, as the card would send it.
    fn with_trailer(block: &[u8]) -> Vec<u8> {
        let mut bytes = block.to_vec();
        bytes.extend(std::iter::repeat(0xCC).take(TRAILER_BYTES as usize));
        bytes
    }

    #[test]
    #[timeout(1000)]
    fn test_block_and_trailer_reconstructed_in_order() {
        init_test_logging();

        let mut engine = DataReader::new();
        let cfg = Config {
            data_timeout: 100,
            block_size: 4,
            ..Config::default()
        };
        let block = [0xDE, 0xAD, 0xBE, 0xEF];
        let wire = with_trailer(&block);
        let mut bus = BusScript::block(6, &wire);

        let events = run_request(&mut engine, &data_read_request(), &mut bus, &cfg);

        assert_eq!(events.len(), wire.len());
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.status, ResponseStatus::Ok);
            assert_eq!(event.data, wire[i]);
            assert_eq!(event.last, i == wire.len() - 1);
        }
        assert!(engine.is_idle());
    }

    #[test]
    #[timeout(1000)]
    fn test_tail_clocks_after_last_block() {
        init_test_logging();

        let mut engine = DataReader::new();
        let cfg = Config {
            data_timeout: 100,
            block_size: 1,
            ..Config::default()
        };
        let mut bus = BusScript::block(2, &with_trailer(&[0x7E]));

        let req = data_read_request();
        let mut tail_cycles = 0;
        let mut cycles = 0u32;
        loop {
            let state = engine.state;
            let tick = engine.tick(Some(&req), &bus.next(), &cfg);
            if state == State::Clk40 {
                tail_cycles += 1;
                assert!(tick.pads.clk);
            }
            cycles += 1;
            assert!(cycles < 10_000, "engine wedged");
            if tick.accepted {
                break;
            }
        }
        assert_eq!(tail_cycles, 40);
    }

    #[test]
    #[timeout(10000)]
    fn test_timeout_scenario() {
        init_test_logging();

        // A 1000-cycle window over a 512-byte block, with a silent bus.
        let mut engine = DataReader::new();
        let cfg = Config {
            data_timeout: 1000,
            block_size: 512,
            ..Config::default()
        };
        let mut bus = BusScript {
            nibbles: Vec::new(),
            cursor: 0,
        };

        let events = run_request(&mut engine, &data_read_request(), &mut bus, &cfg);
        assert_eq!(
            events,
            vec![ResponseEvent {
                data: 0,
                status: ResponseStatus::Timeout,
                last: true,
            }]
        );
        assert!(engine.is_idle());
    }

    #[test]
    #[timeout(1000)]
    fn test_non_last_request_skips_tail_clocks() {
        init_test_logging();

        let mut engine = DataReader::new();
        let cfg = Config {
            data_timeout: 100,
            block_size: 2,
            ..Config::default()
        };
        let mut bus = BusScript::block(3, &with_trailer(&[0x12, 0x34]));

        let req = TransferRequest {
            last: false,
            ..data_read_request()
        };
        let events = run_request(&mut engine, &req, &mut bus, &cfg);
        assert_eq!(events.len(), 10);
        assert!(events[9].last);
        assert!(engine.is_idle());
    }
}
