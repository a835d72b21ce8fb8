use core::any::Any;

use serde::{Deserialize, Serialize};

/// 10-bit ADC full-scale count.
pub const ADC_MAX_COUNTS: u16 = 1023;

/// Battery voltage divider and ADC reference constants.
///
/// The divider is 100k to Vin over 47k to ground, so the ADC sees
/// `Vin * 47 / 147`. At 12 V the ADC input is 3.84 V, at 14.4 V it is 4.60 V.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageCalibration {
    pub divider_ratio: f32,
    pub adc_ref: f32,
    pub adc_max: u16,
    pub offset: f32,
}

impl VoltageCalibration {
    pub const fn default() -> Self {
        Self {
            divider_ratio: 47.0 / (100.0 + 47.0),
            adc_ref: 5.0,
            adc_max: ADC_MAX_COUNTS,
            offset: 0.2,
        }
    }
}

/// Tunable constants for the telemetry core. All of these are fixed at
/// construction, never negotiated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcuConfig {
    /// Active voltage smoothing window, clamped to 1..=32 slots.
    pub smoothing_window: usize,
    /// Fresh orientation updates averaged into a calibration offset.
    pub calibration_samples: u32,
    /// Max age of the last orientation packet before the IMU reads stale.
    pub imu_fresh_timeout_ms: u32,
    /// Max silence on the host link before it reads disconnected.
    pub host_link_timeout_ms: u32,
    pub voltage_calibration: VoltageCalibration,
}

impl DcuConfig {
    pub const fn default() -> Self {
        Self {
            smoothing_window: 20,
            calibration_samples: 5,
            imu_fresh_timeout_ms: 200,
            host_link_timeout_ms: 5000,
            voltage_calibration: VoltageCalibration::default(),
        }
    }
}

/// Hardware seam for the telemetry core. The run loop, pin setup, and the
/// actual UART/ADC peripherals live behind this trait; the core only ever
/// sees timestamps, raw counts, and an outbound sensor command sink.
pub trait DcuDriver {
    /// Milliseconds since boot. Wraps at `u32::MAX`.
    fn timestamp_ms(&self) -> u32;

    /// One raw battery ADC conversion (0..=1023).
    fn read_battery_raw(&mut self) -> u16;

    /// Write a configuration command out the sensor link.
    fn send_sensor_command(&mut self, command: &[u8]);

    fn as_mut_any(&mut self) -> &mut dyn Any;
}
