//! USB CDC ACM (Serial) Console Framing
//!
//! Line assembly for bytes arriving from the host and packet-sized draining
//! of formatted responses. Both buffers are plain data and testable on the host.

use core::fmt;

use heapless::{String, Vec};

use crate::config::CMD_BUFFER_SIZE;

/// Longest accepted console line
pub const LINE_MAX: usize = CMD_BUFFER_SIZE - 1;

/// One complete console line
pub type Line = String<LINE_MAX>;

/// Console line assembler
///
/// Accepts printable ASCII, terminates on CR or LF, ignores empty lines
/// (so CR+LF yields one line) and drops characters past [`LINE_MAX`].
pub struct LineBuffer {
    buffer: Vec<u8, LINE_MAX>,
    overflowed: bool,
}

impl LineBuffer {
    /// Create an empty line buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte; returns the line when a terminator completes it
    pub fn feed(&mut self, byte: u8) -> Option<Line> {
        match byte {
            b'\r' | b'\n' => {
                if self.buffer.is_empty() {
                    return None;
                }
                let mut line = Line::new();
                // Only printable ASCII is ever stored
                for &b in &self.buffer {
                    let _ = line.push(char::from(b));
                }
                if self.overflowed {
                    warn!("console line truncated to {} chars", LINE_MAX);
                }
                self.clear();
                Some(line)
            }
            0x20..=0x7E => {
                if self.buffer.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
            _ => None,
        }
    }

    /// Feed a USB packet, calling `on_line` for every completed line
    pub fn feed_all<F: FnMut(&str)>(&mut self, data: &[u8], mut on_line: F) {
        for &byte in data {
            if let Some(line) = self.feed(byte) {
                on_line(&line);
            }
        }
    }

    /// Discard a partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Characters buffered so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Response buffer drained in packet-sized chunks
///
/// Output beyond capacity is dropped rather than failing the command that
/// produced it.
pub struct ResponseBuffer<const N: usize> {
    buffer: Vec<u8, N>,
    truncated: bool,
}

impl<const N: usize> ResponseBuffer<N> {
    /// Create a new response buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            truncated: false,
        }
    }

    /// Append raw bytes; returns how many fit
    pub fn write(&mut self, data: &[u8]) -> usize {
        let space = N - self.buffer.len();
        let n = data.len().min(space);
        // Cannot fail: n fits the remaining capacity
        let _ = self.buffer.extend_from_slice(&data[..n]);
        if n < data.len() {
            self.truncated = true;
        }
        n
    }

    /// Buffer contents
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Contents split into chunks of at most `packet` bytes
    pub fn chunks(&self, packet: usize) -> core::slice::Chunks<'_, u8> {
        self.buffer.chunks(packet.max(1))
    }

    /// Whether output was dropped since the last clear
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.truncated = false;
    }

    /// Get used length
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<const N: usize> Default for ResponseBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for ResponseBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

/// USB device descriptor strings
pub struct UsbStrings {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Product name
    pub product: &'static str,
    /// Serial number
    pub serial: &'static str,
}

impl Default for UsbStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Clockgen Project",
            product: "Si5351A Clock Generator",
            serial: "0001",
        }
    }
}

/// USB device info for descriptor
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vid: u16,
    /// Product ID
    pub pid: u16,
    /// Device release number
    pub device_release: u16,
}

impl Default for UsbDeviceInfo {
    fn default() -> Self {
        Self {
            vid: crate::config::USB_VID,
            pid: crate::config::USB_PID,
            device_release: 0x0100,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for UsbDeviceInfo {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "USB({:04X}:{:04X})", self.vid, self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;

    fn feed_str(buf: &mut LineBuffer, s: &str) -> std::vec::Vec<Line> {
        s.bytes().filter_map(|b| buf.feed(b)).collect()
    }

    #[test]
    fn crlf_yields_one_line() {
        let mut buf = LineBuffer::new();
        let lines = feed_str(&mut buf, "clk0=100\r\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "clk0=100");
        assert!(buf.is_empty());
    }

    #[test]
    fn control_bytes_are_dropped() {
        let mut buf = LineBuffer::new();
        let lines = feed_str(&mut buf, "sc\x1b\x07an\x7f\n");
        assert_eq!(lines[0].as_str(), "scan");
    }

    #[test]
    fn overflow_keeps_first_chars() {
        let mut buf = LineBuffer::new();
        let long: std::string::String = "a".repeat(100);
        let lines = feed_str(&mut buf, &long);
        assert!(lines.is_empty());
        assert_eq!(buf.len(), LINE_MAX);
        let lines = feed_str(&mut buf, "\r");
        assert_eq!(lines[0].len(), LINE_MAX);
    }

    #[test]
    fn response_chunks() {
        let mut out: ResponseBuffer<16> = ResponseBuffer::new();
        write!(out, "0123456789ABCDEFXYZ").unwrap();
        assert!(out.truncated());
        assert_eq!(out.len(), 16);
        let sizes: std::vec::Vec<usize> = out.chunks(6).map(<[u8]>::len).collect();
        assert_eq!(sizes, [6, 6, 4]);
        out.clear();
        assert!(out.is_empty() && !out.truncated());
    }
}
