//! find-port - print the device node of a USB serial device
//!
//! Intended for scripts: `screen $(find-port -n FTDI) 115200`.

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use usb_ser_mon_core::cli::{format_devices, CliResult, ExitCodes, OutputFormat};
use usb_ser_mon_core::core::hotplug::{present_matches, UdevEnumerator, TTY_SUBSYSTEM};
use usb_ser_mon_core::core::matcher::{MatchCriteria, SerialFilter};

/// Find the device node of a USB serial device
#[derive(Parser, Debug)]
#[command(name = "find-port", version, about, long_about = None)]
struct Cli {
    /// USB vendor id, e.g. 0403
    #[arg(long)]
    vid: Option<String>,

    /// USB product id, e.g. 6001
    #[arg(long)]
    pid: Option<String>,

    /// Vendor name prefix
    #[arg(short = 'n', long)]
    vendor: Option<String>,

    /// Serial number prefix
    #[arg(short, long)]
    serial: Option<String>,

    /// Only this USB interface number
    #[arg(short, long)]
    interface: Option<String>,

    /// List every matching device instead of printing one path
    #[arg(short, long, conflicts_with = "json")]
    list: bool,

    /// Print matching devices as JSON
    #[arg(long)]
    json: bool,

    /// Diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn criteria(&self) -> MatchCriteria {
        MatchCriteria {
            vendor_prefix: self.vendor.clone(),
            serial: self.serial.clone().map(SerialFilter::Prefix),
            interface_number: self.interface.clone(),
            vendor_id: self.vid.clone(),
            product_id: self.pid.clone(),
            ..MatchCriteria::default()
        }
    }

    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.list {
            OutputFormat::List
        } else {
            OutputFormat::Path
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let criteria = cli.criteria();
    debug!("Looking for {:?}", criteria);

    let devices = present_matches(&UdevEnumerator::new(TTY_SUBSYSTEM), &criteria)?;
    let output = format_devices(&devices, cli.format()).context("cannot format device list")?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;

    if devices.is_empty() && cli.format() == OutputFormat::Path {
        return Ok(CliResult::error(ExitCodes::ERROR, ""));
    }
    Ok(CliResult::success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    let result = run(&cli).unwrap_or_else(|e| CliResult::from(&e));
    if let Some(message) = result.message().filter(|m| !m.is_empty()) {
        eprintln!("find-port: {}", message);
    }
    result.to_exit_code()
}
