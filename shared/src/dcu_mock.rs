use core::any::Any;

use crate::dcu_hal::DcuDriver;

pub const MOCK_COMMAND_CAPACITY: usize = 16;

/// Deterministic driver stand-in for unit and integration tests. The clock
/// only moves when a test calls `advance_ms`, and sensor-link commands are
/// captured instead of transmitted.
#[derive(Debug)]
pub struct DcuDriverMock {
    now_ms: u32,
    battery_raw: u16,
    sensor_commands: [u8; MOCK_COMMAND_CAPACITY],
    sensor_commands_len: usize,
}

impl DcuDriver for DcuDriverMock {
    fn timestamp_ms(&self) -> u32 {
        self.now_ms
    }

    fn read_battery_raw(&mut self) -> u16 {
        self.battery_raw
    }

    fn send_sensor_command(&mut self, command: &[u8]) {
        for &byte in command {
            if self.sensor_commands_len < MOCK_COMMAND_CAPACITY {
                self.sensor_commands[self.sensor_commands_len] = byte;
                self.sensor_commands_len += 1;
            }
        }
    }

    fn as_mut_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl DcuDriverMock {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            battery_raw: 0,
            sensor_commands: [0; MOCK_COMMAND_CAPACITY],
            sensor_commands_len: 0,
        }
    }

    pub fn advance_ms(&mut self, ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(ms);
    }

    pub fn set_battery_raw(&mut self, raw: u16) {
        self.battery_raw = raw;
    }

    pub fn sensor_commands(&self) -> &[u8] {
        &self.sensor_commands[..self.sensor_commands_len]
    }

    pub fn clear_sensor_commands(&mut self) {
        self.sensor_commands_len = 0;
    }
}

impl Default for DcuDriverMock {
    fn default() -> Self {
        Self::new()
    }
}
