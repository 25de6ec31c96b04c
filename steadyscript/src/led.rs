//! C9: LED gateway. Maps "inside circle?" booleans to a single byte write
//! on a serial device (spec.md §4.8).
//!
//! Grounded on the teacher's `strand-led-box-comms` in spirit only: that
//! crate models the real strand hardware's 4-channel device protocol
//! (`ToDevice`/`FromDevice`, `COMM_VERSION`), which has no counterpart in
//! spec.md's description of the link as "an opaque byte sink receiving
//! '0'/'1'". This gateway instead writes raw bytes directly over
//! `tokio-serial`, the pack's plain async-serial crate, already a teacher
//! workspace dependency.

use crate::error::{Error, Result};

const BAUD_RATE: u32 = 9600;

/// Sink for the `inside_circle` boolean stream (spec.md §4.8, §5 "LED
/// task"). Deduplicates: a write is only issued when the value changes.
pub trait LedGateway: Send {
    /// Reports the current "inside circle?" value. Implementations must
    /// not propagate transport errors to the caller -- failures are
    /// logged and the gateway silently no-ops (spec.md §7
    /// `LedTransportFailure`).
    fn set_inside(&mut self, inside: bool);
}

/// Default gateway when `LED_SERIAL_PATH` is unset (spec.md §4.8).
pub struct NoopGateway;

impl LedGateway for NoopGateway {
    fn set_inside(&mut self, _inside: bool) {}
}

#[cfg(feature = "led-serial")]
pub struct SerialGateway {
    port: Box<dyn std::io::Write + Send>,
    last_sent: Option<bool>,
    last_error_logged_at: Option<std::time::Instant>,
}

#[cfg(feature = "led-serial")]
impl SerialGateway {
    /// Opens `path` at 9600 baud (spec.md §4.8). Returns
    /// [`Error::LedTransportFailure`] if the device cannot be opened; the
    /// caller falls back to [`NoopGateway`] rather than treating this as
    /// fatal, since the LED link is an optional feedback channel.
    pub fn open(path: &str) -> Result<Self> {
        use tokio_serial::SerialPort;
        let port = tokio_serial::new(path, BAUD_RATE)
            .open()
            .map_err(|e| Error::LedTransportFailure(e.to_string()))?;
        Ok(Self {
            port: Box::new(port),
            last_sent: None,
            last_error_logged_at: None,
        })
    }

    fn write_byte(&mut self, byte: u8) {
        if let Err(e) = self.port.write_all(&[byte]) {
            let now = std::time::Instant::now();
            let should_log = match self.last_error_logged_at {
                Some(last) => now.duration_since(last).as_secs() >= 60,
                None => true,
            };
            if should_log {
                tracing::warn!("LED serial write failed, gateway silently no-ops: {e}");
                self.last_error_logged_at = Some(now);
            }
        }
    }
}

#[cfg(feature = "led-serial")]
impl LedGateway for SerialGateway {
    fn set_inside(&mut self, inside: bool) {
        if self.last_sent == Some(inside) {
            return;
        }
        self.last_sent = Some(inside);
        self.write_byte(if inside { b'1' } else { b'0' });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingGateway {
        writes: Vec<bool>,
        last_sent: Option<bool>,
    }

    impl LedGateway for RecordingGateway {
        fn set_inside(&mut self, inside: bool) {
            if self.last_sent == Some(inside) {
                return;
            }
            self.last_sent = Some(inside);
            self.writes.push(inside);
        }
    }

    #[test]
    fn noop_gateway_accepts_any_sequence() {
        let mut gw = NoopGateway;
        gw.set_inside(true);
        gw.set_inside(false);
    }

    #[test]
    fn deduplicates_repeated_values() {
        let mut gw = RecordingGateway {
            writes: Vec::new(),
            last_sent: None,
        };
        gw.set_inside(true);
        gw.set_inside(true);
        gw.set_inside(true);
        gw.set_inside(false);
        gw.set_inside(false);
        assert_eq!(gw.writes, vec![true, false]);
    }
}
