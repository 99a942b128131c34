//! ---
//! vlink_section: "05-networking-external-interfaces"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Network connectivity and edge adapters."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Serial endpoint owning the UART link to the BLE co-processor.
//!
//! The receive side runs on a dedicated OS thread doing one-byte blocking
//! reads into the frame state machine; completed frames cross into the async
//! world over an unbounded channel. The send side serialises whole-frame
//! writes behind a mutex so concurrent senders can never interleave bytes.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use v_link_frame::{encode_frame, Frame, FrameDecoder, FrameError};

/// Read timeout on the port; doubles as the stop-flag polling interval for
/// the receive thread.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after the attribute-clearing open/close cycle.
const ATTRIBUTE_SETTLE: Duration = Duration::from_millis(100);

/// Back-off after a transient read error.
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Errors from the serial endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("serial io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Sink for outbound frames.
///
/// The router talks to this seam rather than the endpoint directly, so tests
/// can record frames in memory.
pub trait FrameSink: Send + Sync {
    /// Encode and emit one frame atomically.
    fn send_frame(&self, frame_id: u8, payload: &[u8]) -> Result<(), SerialError>;
}

/// Owns the serial handle and the receive thread.
pub struct SerialEndpoint {
    writer: Mutex<Box<dyn SerialPort>>,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SerialEndpoint {
    /// Open the device and start the receive loop.
    ///
    /// The port is first opened once at 9600 baud and immediately closed,
    /// followed by a short pause; this flushes latent line attributes left
    /// behind by earlier holders of the device. The real open is 8-N-1 at
    /// the requested baud rate.
    pub fn open(
        path: &str,
        baud_rate: u32,
        frames: mpsc::UnboundedSender<Frame>,
    ) -> Result<Self, SerialError> {
        clear_line_attributes(path)?;

        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!(device = %path, baud = baud_rate, "serial port opened");

        let reader_port = port.try_clone()?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("vlink-serial-rx".to_owned())
            .spawn(move || read_loop(reader_port, frames, stop_flag))?;

        Ok(Self {
            writer: Mutex::new(port),
            stop,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Stop the receive thread and wait for it to exit. The underlying
    /// handle closes when the endpoint is dropped.
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                warn!("serial receive thread panicked");
            }
        }
        info!("serial endpoint closed");
    }
}

impl FrameSink for SerialEndpoint {
    fn send_frame(&self, frame_id: u8, payload: &[u8]) -> Result<(), SerialError> {
        let buf = encode_frame(frame_id, payload)?;
        debug!(
            frame_id = %format_args!("0x{:02x}", frame_id),
            len = payload.len(),
            data = %hex(&buf),
            "tx frame"
        );
        let mut port = self.writer.lock();
        port.write_all(&buf)?;
        port.flush()?;
        Ok(())
    }
}

fn clear_line_attributes(path: &str) -> Result<(), SerialError> {
    let port = serialport::new(path, 9600)
        .timeout(Duration::from_millis(50))
        .open()?;
    drop(port);
    thread::sleep(ATTRIBUTE_SETTLE);
    Ok(())
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    frames: mpsc::UnboundedSender<Frame>,
    stop: Arc<AtomicBool>,
) {
    info!("serial receive loop started");
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1];

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => thread::sleep(READ_RETRY_DELAY),
            Ok(_) => {
                if let Some(frame) = decoder.feed(buf[0]) {
                    debug!(
                        frame_id = %format_args!("0x{:02x}", frame.id),
                        len = frame.payload.len(),
                        data = %hex(&frame.payload),
                        "rx frame"
                    );
                    if frames.send(frame).is_err() {
                        // Receiver side shut down; nothing left to feed.
                        break;
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(err) => {
                warn!(error = %err, "serial read error, retrying");
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
    info!("serial receive loop stopped");
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formats_lowercase_pairs() {
        assert_eq!(hex(&[0xF6, 0xD9, 0x00, 0x0A]), "f6d9000a");
        assert_eq!(hex(&[]), "");
    }
}
