#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

// Debug prints for host-side test runs; compiles to nothing in firmware
// builds
#[cfg(test)]
macro_rules! dcuprintln {
    () => { println!() };
    ($($arg:tt)*) => { println!($($arg)*) };
}

#[cfg(not(test))]
macro_rules! dcuprintln {
    () => {};
    ($($arg:tt)*) => {};
}

pub mod host_link;
pub mod imu;
pub mod voltage;

use heapless::Vec;
use shared::dcu_hal::{DcuConfig, DcuDriver};

use host_link::{EncodeError, HostLink, FRAME_CAPACITY};
use imu::{CalibrationAccumulator, FeedResult, ImuDecoder};
use voltage::SmoothingFilter;

/// Dashboard control unit telemetry core. Owns one decoder, one host link,
/// and one smoothing filter; the run loop, pins, and peripherals live behind
/// the driver. Every entry point here is non-blocking except
/// [`Dcu::calibrate_blocking`].
pub struct Dcu<'a> {
    config: DcuConfig,
    pub driver: &'a mut dyn DcuDriver,
    pub imu: ImuDecoder,
    pub host_link: HostLink,
    voltage_filter: SmoothingFilter,
}

impl<'a> Dcu<'a> {
    pub fn new(driver: &'a mut dyn DcuDriver, config: DcuConfig) -> Self {
        let seed = driver.read_battery_raw();
        let voltage_filter = SmoothingFilter::new(config.smoothing_window, seed);

        Self {
            config,
            driver,
            imu: ImuDecoder::new(),
            host_link: HostLink::new(),
            voltage_filter,
        }
    }

    pub fn config(&self) -> &DcuConfig {
        &self.config
    }

    /// Send the power-on configuration sequence out the sensor link: zero
    /// the yaw reference, select flat mounting, then 9600 baud at 20 Hz.
    pub fn init_sensor(&mut self) {
        for register in [
            imu::cfg::CMD_RESET_YAW,
            imu::cfg::CMD_MOUNT_HORIZONTAL,
            imu::cfg::CMD_RATE_20HZ,
        ] {
            self.driver.send_sensor_command(&imu::cfg::command(register));
        }
    }

    pub fn feed_sensor_byte(&mut self, byte: u8) -> FeedResult {
        let now_ms = self.driver.timestamp_ms();
        self.imu.feed(byte, now_ms)
    }

    pub fn feed_host_byte(&mut self, byte: u8) -> bool {
        let now_ms = self.driver.timestamp_ms();
        self.host_link.feed(byte, now_ms)
    }

    pub fn take_command(&mut self) -> Option<&str> {
        self.host_link.take_command()
    }

    pub fn imu_is_fresh(&self) -> bool {
        self.imu
            .is_fresh(self.driver.timestamp_ms(), self.config.imu_fresh_timeout_ms)
    }

    pub fn host_is_connected(&self) -> bool {
        self.host_link
            .is_connected(self.driver.timestamp_ms(), self.config.host_link_timeout_ms)
    }

    /// One raw ADC conversion, bypassing the smoothing filter.
    pub fn read_voltage_raw(&mut self) -> u16 {
        self.driver.read_battery_raw()
    }

    /// One smoothed battery reading in volts.
    pub fn read_voltage(&mut self) -> f32 {
        let raw = self.driver.read_battery_raw();
        let smoothed = self.voltage_filter.update(raw);
        voltage::counts_to_volts(smoothed, &self.config.voltage_calibration)
    }

    /// Resize the smoothing window (clamped to 1..=32), reseeding it with a
    /// fresh raw sample.
    pub fn set_smoothing_window(&mut self, window: usize) {
        let seed = self.driver.read_battery_raw();
        self.voltage_filter.set_window(window, seed);
    }

    /// Encode one outbound telemetry frame. A stale IMU produces the
    /// empty-field branch so the host parser never has to branch on
    /// validity.
    pub fn encode_telemetry(
        &mut self,
        rpm: u16,
        gear: u8,
    ) -> Result<Vec<u8, FRAME_CAPACITY>, EncodeError> {
        let voltage = self.read_voltage();
        let sample = self.imu.sample();
        let imu = if self.imu_is_fresh() {
            Some(&sample)
        } else {
            None
        };

        host_link::encode_telemetry(voltage, imu, rpm, gear)
    }

    /// Collect `config.calibration_samples` fresh orientation updates from
    /// the sensor link and install their mean as the calibration offset.
    ///
    /// This is the only blocking call in the core: it busy-waits on
    /// `next_sensor_byte` and never returns if the sensor stops producing
    /// orientation packets. There is no timeout and no cancellation; do not
    /// call it from a context that must keep servicing the host link,
    /// because nothing else runs while it waits. Callers that cannot afford
    /// that should drive an [`imu::CalibrationAccumulator`] from their own
    /// tick loop instead.
    ///
    /// The resulting offset spans all nine fields, acceleration included, so
    /// it removes the gravity reference from later accel readings. Kept
    /// as-is pending a mounting-orientation decision.
    pub fn calibrate_blocking<F>(&mut self, mut next_sensor_byte: F)
    where
        F: FnMut(&mut dyn DcuDriver) -> Option<u8>,
    {
        let mut accumulator =
            CalibrationAccumulator::new(self.config.calibration_samples, self.imu.raw_sample());

        while !accumulator.is_complete() {
            let byte = match next_sensor_byte(&mut *self.driver) {
                Some(byte) => byte,
                None => continue,
            };

            let now_ms = self.driver.timestamp_ms();
            self.imu.feed(byte, now_ms);
            accumulator.push(self.imu.raw_sample());
        }

        if let Some(offset) = accumulator.offset() {
            self.imu.set_offset(offset);
            dcuprintln!(
                "DCU: calibration complete after {} orientation updates",
                accumulator.count()
            );
        }
    }
}
