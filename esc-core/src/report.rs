//! Telemetry line output

use core::fmt::Write as _;
use heapless::String;

use crate::capture::SharedRpm;
use crate::hal::HalError;

/// Longest line: `4294967295;\n`
pub const REPORT_LINE_CAPACITY: usize = 16;

/// Format one telemetry line, `<rpm>;\n`
pub fn format_report_line(rpm: u32) -> String<REPORT_LINE_CAPACITY> {
    let mut line = String::new();
    // Ten digits plus terminator always fit
    write!(line, "{};\n", rpm).ok();
    line
}

/// Sink for RPM telemetry
pub trait RpmReporter {
    fn report(&mut self, rpm: u32) -> Result<(), HalError>;
}

/// Reporter writing ASCII lines to a byte stream
pub struct SerialReporter<W> {
    writer: W,
}

impl<W> SerialReporter<W>
where
    W: embedded_io::Write,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn free(self) -> W {
        self.writer
    }
}

impl<W> RpmReporter for SerialReporter<W>
where
    W: embedded_io::Write,
{
    fn report(&mut self, rpm: u32) -> Result<(), HalError> {
        let line = format_report_line(rpm);
        self.writer
            .write_all(line.as_bytes())
            .map_err(|_| HalError::GpioError)?;
        self.writer.flush().map_err(|_| HalError::GpioError)
    }
}

/// One main-loop iteration: snapshot the latest RPM and emit it
pub fn report_once<R: RpmReporter>(shared: &SharedRpm, reporter: &mut R) -> Result<u32, HalError> {
    let rpm = shared.load_or_zero();
    reporter.report(rpm)?;

    #[cfg(feature = "defmt")]
    defmt::trace!("RPM: {}", rpm);

    Ok(rpm)
}
