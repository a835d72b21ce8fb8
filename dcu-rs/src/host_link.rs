//! Host serial link: inbound ASCII command framing and outbound telemetry
//! frame encoding.
//!
//! Commands are CR/LF-terminated ASCII, at most 63 bytes; excess bytes are
//! dropped without any signal back to the sender. Telemetry frames are
//! tab-separated fields in the fixed order the host parser expects:
//! `voltage, [9 IMU fields or 9 empties], rpm, gear`, terminated by a single
//! zero byte.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::imu::ImuSample;

pub const COMMAND_CAPACITY: usize = 64;
pub const FRAME_CAPACITY: usize = 128;

const IMU_FIELD_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    BufferOverflow,
}

/// Inbound command reassembly plus connectivity tracking. One instance per
/// host link; a completed command is readable exactly once.
pub struct HostLink {
    buffer: [u8; COMMAND_CAPACITY],
    index: usize,
    ready: bool,
    ready_len: usize,
    last_rx_ms: u32,
}

impl HostLink {
    pub fn new() -> Self {
        Self {
            buffer: [0; COMMAND_CAPACITY],
            index: 0,
            ready: false,
            ready_len: 0,
            last_rx_ms: 0,
        }
    }

    /// Consume one byte from the host. Returns true when this byte completed
    /// a command.
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> bool {
        self.last_rx_ms = now_ms;

        if byte == b'\r' || byte == b'\n' {
            if self.index > 0 {
                self.ready = true;
                self.ready_len = self.index;
                self.index = 0;
                return true;
            }
            // Bare terminator: no-op
            return false;
        }

        if self.index < COMMAND_CAPACITY - 1 {
            self.buffer[self.index] = byte;
            self.index += 1;
        }
        // else: buffer full, drop the byte silently

        false
    }

    /// The completed command, cleared by this read. Commands are ASCII per
    /// the host protocol; a line that is not valid UTF-8 is treated as line
    /// noise and yields None.
    pub fn take_command(&mut self) -> Option<&str> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        core::str::from_utf8(&self.buffer[..self.ready_len]).ok()
    }

    /// True while the last inbound byte is younger than `timeout_ms`.
    pub fn is_connected(&self, now_ms: u32, timeout_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_rx_ms) < timeout_ms
    }
}

impl Default for HostLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one telemetry frame. `imu` of None emits nine consecutive empty
/// fields so the host parser sees the same field count and tab placement
/// whether or not the IMU is fresh.
pub fn encode_telemetry(
    voltage: f32,
    imu: Option<&ImuSample>,
    rpm: u16,
    gear: u8,
) -> Result<Vec<u8, FRAME_CAPACITY>, EncodeError> {
    let mut text: String<FRAME_CAPACITY> = String::new();

    write!(text, "{:.2}", voltage).map_err(|_| EncodeError::BufferOverflow)?;

    match imu {
        Some(sample) => {
            for value in sample.fields() {
                write!(text, "\t{:.2}", value).map_err(|_| EncodeError::BufferOverflow)?;
            }
        }
        None => {
            for _ in 0..IMU_FIELD_COUNT {
                text.push('\t').map_err(|_| EncodeError::BufferOverflow)?;
            }
        }
    }

    write!(text, "\t{}\t{}", rpm, gear).map_err(|_| EncodeError::BufferOverflow)?;

    let mut frame =
        Vec::from_slice(text.as_bytes()).map_err(|_| EncodeError::BufferOverflow)?;
    // Binary-safe frame boundary: the host resynchronizes on 0x00, never on
    // a newline
    frame.push(0).map_err(|_| EncodeError::BufferOverflow)?;

    Ok(frame)
}
