use log::debug;

use crate::cmd_read::CmdReader;
use crate::cmd_write::CmdWriter;
use crate::config::Config;
use crate::data_read::DataReader;
use crate::data_write::DataWriter;
use crate::pads::{PadsIn, PadsOut};
use crate::stream::{self, EngineTick, ResponseEvent, Target, TransferRequest};

/// Result of one bus cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhyTick {
    /// OR-combined line drive of every engine.
    pub pads: PadsOut,
    /// The head-of-stream request element was consumed this cycle.
    pub accepted: bool,
    /// At most one response element per cycle.
    pub response: Option<ResponseEvent>,
}

/// The SD bus PHY: request router, bus arbiter, and response merger.
///
/// Each cycle the caller presents the head of its request stream (the
/// same element every cycle until `accepted`) together with the sampled
/// line state, and receives the merged line drive plus at most one
/// response element. The control byte routes every request to exactly one
/// engine; the others are held idle, so at most one engine drives the
/// shared lines in any cycle and the drive contributions can simply be
/// OR-combined. Config-mode requests are applied to the register file
/// immediately and never touch the bus.
pub struct SdPhy {
    cfg: Config,
    cmdw: CmdWriter,
    cmdr: CmdReader,
    dataw: DataWriter,
    datar: DataReader,
    card_detect: bool,
}

impl SdPhy {
    pub fn new() -> Self {
        SdPhy {
            cfg: Config::new(),
            cmdw: CmdWriter::new(),
            cmdr: CmdReader::new(),
            dataw: DataWriter::new(),
            datar: DataReader::new(),
            card_detect: true,
        }
    }

    /// The current configuration registers.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Card-detect level latched from the last cycle's line sample.
    pub fn card_detect(&self) -> bool {
        self.card_detect
    }

    /// Total CRC status tokens that reported an error on data writes.
    /// Diagnostic only; completion is never blocked on CRC status.
    pub fn crc_errors(&self) -> u64 {
        self.dataw.crc_errors()
    }

    /// Advance the whole PHY one bus cycle.
    pub fn tick(&mut self, req: Option<&TransferRequest>, line: &PadsIn) -> PhyTick {
        self.card_detect = line.cd;

        let target = req.map(|r| stream::decode(r.ctrl));
        let route = |t: Target| if target == Some(t) { req } else { None };

        let cw = self.cmdw.tick(route(Target::CmdWrite));
        let cr = self.cmdr.tick(route(Target::CmdRead), line, &self.cfg);
        let dw = self.dataw.tick(route(Target::DataWrite), line);
        let dr = self.datar.tick(route(Target::DataRead), line, &self.cfg);
        debug_assert!(
            self.active_engines() <= 1,
            "bus mutual exclusion violated"
        );

        let mut out = PhyTick {
            pads: cw.pads | cr.pads | dw.pads | dr.pads,
            accepted: cw.accepted | cr.accepted | dw.accepted | dr.accepted,
            // Only one read engine can be mid-transfer, so the response
            // streams merge without arbitration.
            response: merge_responses(&cr, &dr),
        };

        // Config writes complete immediately, with no backpressure.
        if let (Some(req), Some(target)) = (req, target) {
            match target {
                Target::CfgCmdTimeout(lane) => {
                    self.cfg.store_cmd_timeout(lane, req.data);
                    out.accepted = true;
                }
                Target::CfgDataTimeout(lane) => {
                    self.cfg.store_data_timeout(lane, req.data);
                    out.accepted = true;
                }
                Target::CfgBlockSize(lane) => {
                    self.cfg.store_block_size(lane, req.data);
                    out.accepted = true;
                }
                Target::CfgVoltage => {
                    self.cfg.store_voltage_select(req.data);
                    out.accepted = true;
                }
                Target::Nop => {
                    debug!("Ignoring request with unknown control byte {:#04x}.", req.ctrl);
                    out.accepted = true;
                }
                _ => {}
            }
        }

        out
    }

    fn active_engines(&self) -> usize {
        usize::from(!self.cmdw.is_idle())
            + usize::from(!self.cmdr.is_idle())
            + usize::from(!self.dataw.is_idle())
            + usize::from(!self.datar.is_idle())
    }
}

fn merge_responses(cr: &EngineTick, dr: &EngineTick) -> Option<ResponseEvent> {
    cr.response.or(dr.response)
}

impl Default for SdPhy {
    fn default() -> Self {
        Self::new()
    }
}
