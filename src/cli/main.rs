use clap::{Parser, ValueEnum};
use simplelog::{ConfigBuilder, LevelFilter, LevelPadding, WriteLogger};
use std::fs::{self, File};
use std::path::PathBuf;
use time::macros::format_description;

use sdphy::{
    block_size_requests, cmd_timeout_requests, command_read_request,
    command_write_requests, data_read_request, data_timeout_requests,
    data_write_requests, voltage_request, BusEmulator, PadsOut, ResponseEvent,
    ResponseStatus, SdPhy, TransferRequest,
};

const AFTER_HELP: &str = "\
The script is a line-oriented list of bus operations, executed in order \
against the PHY engine with an emulated (empty) bus. '#' starts a comment. \
Available operations:

    cfg cmd-timeout <cycles>     set the command response timeout
    cfg data-timeout <cycles>    set the data start-bit timeout
    cfg block-size <bytes>       set the data block size
    cfg voltage <0|1>            store the voltage-select flag
    cmd-w <hex bytes...>         serialize a command onto the CMD line
    cmd-r <count>                read a response of <count>+1 bytes
    data-w <hex bytes...>        write one data block
    data-r                       read one data block plus CRC trailer

With no card attached, reads report a timeout once the configured window \
expires; set the timeouts first or the window is zero cycles.";

/// Possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
}

#[derive(Parser)]
#[command(version, about, max_term_width = 100, after_help = AFTER_HELP)]
struct Args {
    /// The path to the request script to execute.
    script: PathBuf,

    /// If set, a debug log will be written to the given path.
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Set the log level. Has no effect without specifying --log as well.
    #[arg(short = 'L', long, value_enum, default_value = "trace")]
    log_level: LogLevel,

    /// Abort if the script is still running after this many bus cycles.
    #[arg(long, default_value_t = 10_000_000)]
    max_cycles: u64,
}

/// Compile a request script into its transfer stream.
fn compile_script(text: &str) -> Result<Vec<TransferRequest>, String> {
    let mut requests = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let num = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        let op = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();
        match op {
            "cfg" => match args.as_slice() {
                ["cmd-timeout", value] => {
                    requests.extend(cmd_timeout_requests(parse_int(value, num)?));
                }
                ["data-timeout", value] => {
                    requests.extend(data_timeout_requests(parse_int(value, num)?));
                }
                ["block-size", value] => {
                    requests.extend(block_size_requests(parse_int(value, num)?));
                }
                ["voltage", value] => {
                    let select: u8 = parse_int(value, num)?;
                    requests.push(voltage_request(select != 0));
                }
                _ => return Err(format!("line {}: unknown cfg option", num)),
            },
            "cmd-w" => requests.extend(command_write_requests(&parse_bytes(&args, num)?)),
            "cmd-r" => match args.as_slice() {
                [count] => requests.push(command_read_request(parse_int(count, num)?)),
                _ => return Err(format!("line {}: cmd-r takes one byte count", num)),
            },
            "data-w" => requests.extend(data_write_requests(&parse_bytes(&args, num)?)),
            "data-r" => {
                if !args.is_empty() {
                    return Err(format!("line {}: data-r takes no arguments", num));
                }
                requests.push(data_read_request());
            }
            _ => return Err(format!("line {}: unknown operation '{}'", num, op)),
        }
    }
    Ok(requests)
}

fn parse_int<T: std::str::FromStr>(value: &str, num: usize) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("line {}: invalid number '{}'", num, value))
}

fn parse_bytes(args: &[&str], num: usize) -> Result<Vec<u8>, String> {
    if args.is_empty() {
        return Err(format!("line {}: expected at least one hex byte", num));
    }
    args.iter()
        .map(|tok| {
            u8::from_str_radix(tok, 16)
                .map_err(|_| format!("line {}: invalid hex byte '{}'", num, tok))
        })
        .collect()
}

struct RunSummary {
    cycles: u64,
    responses: Vec<(u64, ResponseEvent)>,
    crc_errors: u64,
}

/// Execute a transfer stream against the PHY with an emulated bus.
fn run_stream(requests: &[TransferRequest], max_cycles: u64) -> Result<RunSummary, String> {
    let mut phy = SdPhy::new();
    let emu = BusEmulator::new();
    let mut pads = PadsOut::default();
    let mut cycles = 0u64;
    let mut responses = Vec::new();

    for request in requests {
        loop {
            if cycles >= max_cycles {
                return Err(format!(
                    "script still running after {} bus cycles; check the configured timeouts",
                    max_cycles
                ));
            }
            let line = emu.resolve(&pads);
            let tick = phy.tick(Some(request), &line);
            pads = tick.pads;
            cycles += 1;
            if let Some(response) = tick.response {
                responses.push((cycles, response));
            }
            if tick.accepted {
                break;
            }
        }
    }

    Ok(RunSummary {
        cycles,
        responses,
        crc_errors: phy.crc_errors(),
    })
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"
        ))
        .build();

    WriteLogger::init(level, config, logfile).unwrap();
}

/// Main run function; returns an exit code.
fn run(args: Args) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: Args) -> Result<(), String> {
        // Initialise logging if configured.
        if let Some(log_path) = &args.log {
            let logfile = File::create(log_path)
                .map_err(|e| format!("Failed to create log file: {}", e))?;
            let level = match args.log_level {
                LogLevel::Trace => LevelFilter::Trace,
                LogLevel::Debug => LevelFilter::Debug,
                LogLevel::Info => LevelFilter::Info,
            };
            init_logging(logfile, level);
        }

        // Compile the script.
        let text = fs::read_to_string(&args.script)
            .map_err(|e| format!("Failed to read script file: {}", e))?;
        let requests = compile_script(&text)?;
        if requests.is_empty() {
            return Err("script contains no operations".to_string());
        }

        // Run it.
        let summary = run_stream(&requests, args.max_cycles)?;
        for (cycle, response) in &summary.responses {
            let status = match response.status {
                ResponseStatus::Ok => "OK",
                ResponseStatus::Timeout => "TIMEOUT",
            };
            println!(
                "[{:>9}] data={:#04x} status={}{}",
                cycle,
                response.data,
                status,
                if response.last { " last" } else { "" }
            );
        }
        println!(
            "{} requests completed in {} cycles ({} responses, {} CRC errors).",
            requests.len(),
            summary.cycles,
            summary.responses.len(),
            summary.crc_errors
        );

        Ok(())
    }
}

fn main() {
    let args = Args::parse();
    std::process::exit(run(args).into());
}

#[cfg(test)]
mod tests {
    use super::*;

    use ntest::timeout;
    use std::io::Write;

    #[test]
    fn test_compile_script() {
        let script = "\
            # configure, then send CMD0\n\
            cfg cmd-timeout 1000\n\
            cfg block-size 512\n\
            \n\
            cmd-w 40 00 00 00 00 95  # GO_IDLE_STATE\n\
            cmd-r 5\n";
        let requests = compile_script(script).unwrap();
        // 4 timeout lanes + 2 block-size lanes + 6 command bytes + 1 read.
        assert_eq!(requests.len(), 13);
        assert_eq!(requests[6].data, 0x40);
        assert!(requests[11].last);
        assert_eq!(requests[12].data, 5);
    }

    #[test]
    fn test_compile_rejects_bad_input() {
        assert!(compile_script("launch-missiles").is_err());
        assert!(compile_script("cfg cmd-timeout not-a-number").is_err());
        assert!(compile_script("cmd-w zz").is_err());
        assert!(compile_script("cmd-w").is_err());
        assert!(compile_script("data-r 5").is_err());
        assert!(compile_script("cfg voltage").is_err());
    }

    #[test]
    #[timeout(5000)]
    fn test_script_runs_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "cfg cmd-timeout 100\n\
             cfg data-timeout 100\n\
             cmd-w 40 00 00 00 00 95\n\
             cmd-r 5\n"
        )
        .unwrap();

        let text = fs::read_to_string(file.path()).unwrap();
        let requests = compile_script(&text).unwrap();
        let summary = run_stream(&requests, 1_000_000).unwrap();

        // No card: the read times out with a single terminal response.
        assert_eq!(summary.responses.len(), 1);
        assert_eq!(summary.responses[0].1.status, ResponseStatus::Timeout);
        assert!(summary.responses[0].1.last);
        assert_eq!(summary.crc_errors, 0);
    }

    #[test]
    #[timeout(5000)]
    fn test_max_cycles_bounds_the_run() {
        // Every request takes at least a few cycles; an absurdly low
        // limit must abort cleanly rather than hang.
        let requests = compile_script("cmd-w 40 95\ncmd-w 41 87").unwrap();
        assert!(run_stream(&requests, 10).is_err());
    }
}
