use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::TransportError;

// The monitor reports about every 10 s. A read that waits this long without
// data is retried rather than treated as the end of the feed.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Byte stream that retries reads which time out. Serial ports report an
/// idle line as `TimedOut`; only real errors and EOF reach the caller.
pub struct RetryOnTimeout<R> {
    inner: R,
}

impl<R: Read> RetryOnTimeout<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for RetryOnTimeout<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    debug!("No data from monitor within {:?}, still waiting", SERIAL_READ_TIMEOUT);
                }
                other => return other,
            }
        }
    }
}

/// Opens the monitor's tty at `baud`.
pub fn open_serial(port: &str, baud: u32) -> Result<Box<dyn BufRead + Send>, TransportError> {
    info!("Opening serial port {} at {} baud", port, baud);
    let serial = serialport::new(port, baud)
        .timeout(SERIAL_READ_TIMEOUT)
        .open()
        .map_err(|e| {
            error!("Could not connect to serial port {}: {}", port, e);
            e
        })?;
    info!("Serial port {} open", port);
    Ok(Box::new(BufReader::new(RetryOnTimeout::new(serial))))
}

/// Opens a captured trace of monitor output for replay.
pub fn open_replay(path: &Path) -> Result<Box<dyn BufRead + Send>, TransportError> {
    info!("Replaying monitor trace from {}", path.display());
    let file = File::open(path)?;
    Ok(Box::new(BufReader::new(file)))
}

/// The line source selected by `config`: a replay file if one is set,
/// otherwise the serial port.
pub fn open_source(config: &Config) -> Result<Box<dyn BufRead + Send>, TransportError> {
    match &config.replay {
        Some(path) => open_replay(path),
        None => open_serial(&config.serial_port, config.serial_baud),
    }
}
