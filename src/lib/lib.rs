mod cmd_read;
mod cmd_write;
mod config;
mod crc;
mod data_read;
mod data_write;
mod deframer;
mod emulator;
mod pads;
mod phy;
mod queue;
mod stream;

pub use crate::config::Config;
pub use crate::emulator::BusEmulator;
pub use crate::pads::{PadsIn, PadsOut};
pub use crate::phy::{PhyTick, SdPhy};
pub use crate::stream::{
    block_size_requests, cmd_timeout_requests, command_read_request,
    command_write_requests, config_ctrl, data_read_request, data_timeout_requests,
    data_write_requests, transfer_ctrl, voltage_request, ResponseEvent,
    ResponseStatus, TransferRequest,
};

/// Initialise logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    // The logger can only be initialised once, but we don't know the order
    // of tests. Therefore we ignore the result.
    let _ = simplelog::TestLogger::init(
        log::LevelFilter::Trace,
        simplelog::Config::default(),
    );
}
