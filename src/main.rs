//! usb-ser-mon - USB serial monitor
//!
//! Waits for a matching USB serial device, relays it to the console, and
//! goes back to waiting whenever the device is unplugged.

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use usb_ser_mon_core::cli::{raw_stdin, CliResult, PipeMode};
use usb_ser_mon_core::config::{FileConfig, MonitorConfig, Overrides};
use usb_ser_mon_core::core::hotplug::{HotplugWatcher, UdevEnumerator, TTY_SUBSYSTEM};
use usb_ser_mon_core::core::logger::SessionLogger;
use usb_ser_mon_core::core::session::OperatorInput;
use usb_ser_mon_core::core::terminal::RawModeGuard;
use usb_ser_mon_core::core::transport::SerialConnector;
use usb_ser_mon_core::utils::autoconnect::{list_devices, ConnectionSupervisor};

/// USB serial monitor
#[derive(Parser, Debug)]
#[command(
    name = "usb-ser-mon",
    version,
    about = "Monitor a USB serial device, reconnecting whenever it is replugged",
    long_about = None
)]
struct Cli {
    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Only connect to device paths containing this text
    #[arg(short, long)]
    port: Option<String>,

    /// Only connect to devices whose vendor name starts with this
    #[arg(short = 'n', long)]
    vendor: Option<String>,

    /// Only connect to the device with this serial number
    #[arg(short, long)]
    serial: Option<String>,

    /// Only connect to this USB interface number
    #[arg(short, long)]
    interface: Option<String>,

    /// Print a line for every byte read
    #[arg(short, long)]
    debug: bool,

    /// Echo typed characters locally
    #[arg(short, long)]
    echo: bool,

    /// Session transcript file
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Don't write a session transcript
    #[arg(long, conflicts_with = "log")]
    no_log: bool,

    /// Verbose messages
    #[arg(short, long)]
    verbose: bool,

    /// Exit with Control-Y instead of Control-X
    #[arg(short = 'y')]
    ctrl_y_exit: bool,

    /// List USB serial devices currently connected
    #[arg(short, long)]
    list: bool,

    /// Settings file
    #[arg(long, value_name = "PATH", env = "USB_SER_MON_CONFIG")]
    config: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    trace_log: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            baud: self.baud,
            port: self.port.clone(),
            vendor: self.vendor.clone(),
            serial: self.serial.clone(),
            interface: self.interface.clone(),
            echo: self.echo,
            debug: self.debug,
            ctrl_y_exit: self.ctrl_y_exit,
            log_file: self.log.clone(),
            no_log: self.no_log,
        }
    }
}

/// Diagnostics go to a file when asked, otherwise to stderr
fn init_tracing(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.trace_log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open trace log {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn open_logger(config: &MonitorConfig) -> anyhow::Result<SessionLogger<io::Stdout>> {
    match &config.log_file {
        Some(path) => SessionLogger::create(io::stdout(), path)
            .with_context(|| format!("cannot create log file {}", path.display())),
        None => Ok(SessionLogger::display_only(io::stdout())),
    }
}

fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path),
        None => FileConfig::load_default(),
    }
    .context("cannot load settings")?;
    let config = MonitorConfig::merge(file, cli.overrides()).context("invalid settings")?;
    debug!("Effective settings: {:?}", config);

    let mut logger = open_logger(&config)?;

    if cli.verbose {
        logger.println(&format!("usb-ser-mon version = {}", usb_ser_mon_core::VERSION))?;
        logger.println(&format!("echo = {}", u8::from(config.session.echo)))?;
    }

    if cli.list {
        list_devices(&UdevEnumerator::new(TTY_SUBSYSTEM), &mut logger)?;
        logger.finish()?;
        return Ok(CliResult::success());
    }

    let pipe_mode = PipeMode::detect();
    let interactive = pipe_mode.stdin_is_terminal();
    let stdin = raw_stdin().context("cannot access stdin")?;

    // Restored when dropped, on every path out of this function
    let _raw_mode = if interactive {
        Some(RawModeGuard::acquire(stdin.try_clone()?).context("cannot switch terminal to raw mode")?)
    } else {
        info!("stdin is not a terminal; leaving its mode alone");
        None
    };

    let hotplug = HotplugWatcher::subscribe(TTY_SUBSYSTEM).context("cannot watch for USB devices")?;

    let mut supervisor = ConnectionSupervisor::new(
        config.autoconnect(),
        SerialConnector,
        hotplug,
        OperatorInput::new(stdin, interactive),
        logger,
    );
    supervisor.run(&UdevEnumerator::new(TTY_SUBSYSTEM))?;

    Ok(CliResult::success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _trace_guard = match init_tracing(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("usb-ser-mon: {:#}", e);
            return ExitCode::from(usb_ser_mon_core::ExitCodes::ERROR);
        }
    };
    info!("Starting usb-ser-mon v{}", usb_ser_mon_core::VERSION);

    let result = run(&cli).unwrap_or_else(|e| CliResult::from(&e));

    if let CliResult::Error(_, message) = &result {
        let _ = io::stdout().flush();
        eprintln!("\r\nusb-ser-mon: {}", message);
    }
    result.to_exit_code()
}
