//! Session transcript
//!
//! Everything the operator sees goes through [`SessionLogger`]: status
//! messages via [`SessionLogger::print`], device output via
//! [`SessionLogger::display`]. The transcript file receives the same text
//! line by line, each line prefixed with the wall-clock time of its first
//! byte and with carriage returns removed.

use chrono::{DateTime, Local, TimeDelta, Timelike};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Source of wall-clock time for line timestamps
pub trait Clock: Send {
    /// Current local time
    fn now(&mut self) -> DateTime<Local>;
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> DateTime<Local> {
        Local::now()
    }
}

/// Format a line prefix: `HH:MM:SS.ffff: `
///
/// The fraction is rounded to four digits; `.99995` and above carries into
/// the next second.
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    let ticks = (time.nanosecond() % 1_000_000_000 + 50_000) / 100_000;
    let (time, ticks) = if ticks == 10_000 {
        (*time + TimeDelta::seconds(1), 0)
    } else {
        (*time, ticks)
    };
    format!("{}.{:04}: ", time.format("%H:%M:%S"), ticks)
}

/// Operator display plus optional timestamped transcript
pub struct SessionLogger<D: Write, S: Write = BufWriter<File>> {
    /// Operator display
    display: D,
    /// Transcript sink
    sink: Option<S>,
    /// Current, not yet terminated transcript line
    line: Vec<u8>,
    /// Timestamp of the previous line, for monotonic clamping
    last_stamp: Option<DateTime<Local>>,
    /// Time source
    clock: Box<dyn Clock>,
    /// Lines written to the sink
    lines_logged: usize,
}

impl<D: Write> SessionLogger<D> {
    /// Create a transcript file (truncating any previous one)
    pub fn create(display: D, path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_sink(display, BufWriter::new(file)))
    }
}

impl<D: Write, S: Write> SessionLogger<D, S> {
    /// Logger that only writes to the display
    pub fn display_only(display: D) -> Self {
        Self {
            display,
            sink: None,
            line: Vec::new(),
            last_stamp: None,
            clock: Box::new(SystemClock),
            lines_logged: 0,
        }
    }

    /// Logger writing the transcript to `sink`
    pub fn with_sink(display: D, sink: S) -> Self {
        Self {
            sink: Some(sink),
            ..Self::display_only(display)
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Is a transcript being written
    pub fn is_logging(&self) -> bool {
        self.sink.is_some()
    }

    /// Write text to the display and the transcript
    pub fn print(&mut self, text: &str) -> io::Result<()> {
        self.display(text.as_bytes())?;
        self.log_bytes(text.as_bytes())
    }

    /// `print` followed by CR LF
    pub fn println(&mut self, text: &str) -> io::Result<()> {
        self.print(text)?;
        self.print("\r\n")
    }

    /// Write bytes to the display only
    pub fn display(&mut self, data: &[u8]) -> io::Result<()> {
        self.display.write_all(data)?;
        self.display.flush()
    }

    /// Append bytes to the transcript only
    pub fn log_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }

        for &byte in data {
            if byte == b'\r' {
                continue;
            }
            if self.line.is_empty() {
                let stamp = self.next_stamp();
                self.line.extend_from_slice(format_timestamp(&stamp).as_bytes());
            }
            self.line.push(byte);
            if byte == b'\n' {
                self.flush_line()?;
            }
        }
        Ok(())
    }

    /// Terminate a pending partial line and flush the transcript
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.line.is_empty() {
            self.line.push(b'\n');
            self.flush_line()?;
        }
        if let Some(ref mut sink) = self.sink {
            sink.flush()?;
        }
        Ok(())
    }

    /// Number of complete lines written to the transcript
    pub fn lines_logged(&self) -> usize {
        self.lines_logged
    }

    /// Borrow the display writer
    pub fn display_writer(&self) -> &D {
        &self.display
    }

    /// Borrow the transcript writer
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    fn next_stamp(&mut self) -> DateTime<Local> {
        let now = self.clock.now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn flush_line(&mut self) -> io::Result<()> {
        if let Some(ref mut sink) = self.sink {
            sink.write_all(&self.line)?;
            sink.flush()?;
            self.lines_logged += 1;
        }
        self.line.clear();
        Ok(())
    }
}
