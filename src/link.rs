// Newline-delimited JSON over a byte stream
//
// One message per line in each direction. The stream is normally a serial
// port opened with a read timeout; a timeout while waiting for a line just
// means the board had nothing to say this cycle.

use std::fmt::Debug;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use serde::Serialize;
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::messages::Feedback;

/// Opening the port failed. Fatal: the controller never starts.
#[derive(Debug, thiserror::Error)]
#[error("Failed to open serial port {port}: {source}")]
pub struct ConnectionError {
    pub port: String,
    #[source]
    pub source: serialport::Error,
}

/// Per-cycle failures. The control loop logs these and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to parse feedback: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Longest unterminated input kept across read timeouts
pub const MAX_PENDING: usize = 4096;

/// JSON line link over any byte stream
pub struct JsonLink<S: Read + Write> {
    reader: BufReader<S>,
    // bytes of a line cut short by a read timeout
    pending: Vec<u8>,
}

pub type SerialLink = JsonLink<Box<dyn SerialPort>>;

/// Open the serial port and wrap it in a JSON line link
pub fn open(
    port_name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> std::result::Result<SerialLink, ConnectionError> {
    info!("Opening serial port {} at {} baud", port_name, baud_rate);
    let port = serialport::new(port_name, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|source| ConnectionError {
            port: port_name.to_string(),
            source,
        })?;
    Ok(JsonLink::new(port))
}

impl<S: Read + Write> JsonLink<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            pending: Vec::new(),
        }
    }

    /// Serialize `message`, terminate it with a newline and write it out
    pub fn send<M: Serialize + Debug>(&mut self, message: &M) -> Result<()> {
        let mut line = serde_json::to_vec(message).map_err(LinkError::Encode)?;
        let text = String::from_utf8_lossy(&line).into_owned();
        line.push(b'\n');

        let port = self.reader.get_mut();
        port.write_all(&line)?;
        port.flush()?;
        debug!("Sent: {}", text);
        Ok(())
    }

    /// Wait for one line, up to the stream's read timeout
    ///
    /// Returns the line without its terminator, or `None` if nothing (or only
    /// a blank line) arrived in time.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                // wrong baud rate or a stuck stream never sends a newline
                if self.pending.len() > MAX_PENDING {
                    warn!(
                        "Discarding {} bytes of unterminated input",
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let mut line = std::mem::take(&mut self.pending);
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            return Ok(None);
        }
        debug!("Received: {}", String::from_utf8_lossy(&line));
        Ok(Some(line))
    }

    /// Release the underlying stream
    pub fn close(self) {
        drop(self);
    }
}

impl<S: Read + Write> Drop for JsonLink<S> {
    fn drop(&mut self) {
        debug!("Closing link");
    }
}

/// Parse one received line as board feedback
pub fn decode_feedback(line: &[u8]) -> Result<Feedback> {
    serde_json::from_slice(line).map_err(LinkError::Decode)
}
