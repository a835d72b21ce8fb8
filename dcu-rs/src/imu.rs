//! WT61-family inertial sensor link: packet reassembly, physical-unit
//! decoding, and calibration offsets.
//!
//! Packet anatomy (11 bytes):
//! - byte 0: 0x55 header
//! - byte 1: kind tag (0x51 accel, 0x52 gyro, 0x53 angles)
//! - bytes 2-9: four little-endian i16 (three meaningful + temperature)
//! - byte 10: sum of bytes 0-9, lower 8 bits

use serde::{Deserialize, Serialize};
use strum_macros::{EnumCount as EnumCountMacro, EnumIter};

pub const PACKET_HEADER: u8 = 0x55;
pub const PACKET_SIZE: usize = 11;

const TAG_ACCEL: u8 = 0x51;
const TAG_GYRO: u8 = 0x52;
const TAG_ANGLE: u8 = 0x53;

// Scale factors from the sensor datasheet:
// accel raw/32768 * 16 g, gyro raw/32768 * 2000 deg/s, angle raw/32768 * 180 deg
const ACCEL_SCALE: f32 = 16.0 / 32768.0;
const GYRO_SCALE: f32 = 2000.0 / 32768.0;
const ANGLE_SCALE: f32 = 180.0 / 32768.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumCountMacro, EnumIter,
)]
pub enum PacketKind {
    Acceleration,
    AngularVelocity,
    Orientation,
}

impl PacketKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_ACCEL => Some(PacketKind::Acceleration),
            TAG_GYRO => Some(PacketKind::AngularVelocity),
            TAG_ANGLE => Some(PacketKind::Orientation),
            _ => None,
        }
    }
}

/// Latest decoded sensor state. Acceleration and angular velocity are only
/// touched by their own packet kinds; the orientation packet owns roll,
/// pitch, yaw, and the timestamp, which is the sole freshness anchor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration (g)
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    /// Angular velocity (deg/s)
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
    /// Euler angles (degrees)
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    /// Timestamp of the last valid orientation packet
    pub last_update_ms: u32,
}

impl ImuSample {
    /// The nine measurement fields in wire order: ax ay az gx gy gz roll
    /// pitch yaw.
    pub fn fields(&self) -> [f32; 9] {
        [
            self.ax, self.ay, self.az, self.gx, self.gy, self.gz, self.roll, self.pitch, self.yaw,
        ]
    }
}

/// Per-axis offsets subtracted from every read once `valid` is set. The raw
/// decoder state is never overwritten by calibration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffset {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    SeekHeader,
    Collecting,
}

/// Outcome of feeding one byte. Callers that only care about the side effect
/// on the sample may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedResult {
    NeedMoreData,
    Accepted(PacketKind),
    Rejected,
}

/// Byte-stream state machine for the sensor link. Owns its buffer, the
/// latest sample, and the calibration offset; construct one per sensor.
pub struct ImuDecoder {
    state: DecoderState,
    buffer: [u8; PACKET_SIZE],
    index: usize,
    sample: ImuSample,
    offset: CalibrationOffset,
}

impl ImuDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::SeekHeader,
            buffer: [0; PACKET_SIZE],
            index: 0,
            sample: ImuSample::default(),
            offset: CalibrationOffset::default(),
        }
    }

    /// Consume one byte of sensor-link input. `now_ms` stamps the sample if
    /// this byte completes a valid orientation packet.
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> FeedResult {
        match self.state {
            DecoderState::SeekHeader => {
                if byte == PACKET_HEADER {
                    self.buffer[0] = byte;
                    self.index = 1;
                    self.state = DecoderState::Collecting;
                }
                // Anything else is line noise between packets
                FeedResult::NeedMoreData
            }
            DecoderState::Collecting => {
                self.buffer[self.index] = byte;
                self.index += 1;

                if self.index < PACKET_SIZE {
                    return FeedResult::NeedMoreData;
                }

                // Back to hunting for a header no matter how this packet
                // turns out
                self.state = DecoderState::SeekHeader;
                self.index = 0;
                self.process_packet(now_ms)
            }
        }
    }

    fn process_packet(&mut self, now_ms: u32) -> FeedResult {
        let sum = self.buffer[..PACKET_SIZE - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != self.buffer[PACKET_SIZE - 1] {
            return FeedResult::Rejected;
        }

        let kind = match PacketKind::from_tag(self.buffer[1]) {
            Some(kind) => kind,
            None => return FeedResult::Rejected,
        };

        let v0 = i16::from_le_bytes([self.buffer[2], self.buffer[3]]);
        let v1 = i16::from_le_bytes([self.buffer[4], self.buffer[5]]);
        let v2 = i16::from_le_bytes([self.buffer[6], self.buffer[7]]);
        // Bytes 8-9 carry the sensor temperature, decoded and unused
        let _temperature = i16::from_le_bytes([self.buffer[8], self.buffer[9]]);

        match kind {
            PacketKind::Acceleration => {
                self.sample.ax = v0 as f32 * ACCEL_SCALE;
                self.sample.ay = v1 as f32 * ACCEL_SCALE;
                self.sample.az = v2 as f32 * ACCEL_SCALE;
            }
            PacketKind::AngularVelocity => {
                self.sample.gx = v0 as f32 * GYRO_SCALE;
                self.sample.gy = v1 as f32 * GYRO_SCALE;
                self.sample.gz = v2 as f32 * GYRO_SCALE;
            }
            PacketKind::Orientation => {
                self.sample.roll = v0 as f32 * ANGLE_SCALE;
                self.sample.pitch = v1 as f32 * ANGLE_SCALE;
                self.sample.yaw = v2 as f32 * ANGLE_SCALE;
                self.sample.last_update_ms = now_ms;
            }
        }

        FeedResult::Accepted(kind)
    }

    /// Latest sample, offset-corrected once calibration is valid.
    pub fn sample(&self) -> ImuSample {
        if !self.offset.valid {
            return self.sample;
        }

        ImuSample {
            ax: self.sample.ax - self.offset.ax,
            ay: self.sample.ay - self.offset.ay,
            az: self.sample.az - self.offset.az,
            gx: self.sample.gx - self.offset.gx,
            gy: self.sample.gy - self.offset.gy,
            gz: self.sample.gz - self.offset.gz,
            roll: self.sample.roll - self.offset.roll,
            pitch: self.sample.pitch - self.offset.pitch,
            yaw: self.sample.yaw - self.offset.yaw,
            last_update_ms: self.sample.last_update_ms,
        }
    }

    /// Latest sample with no offset correction applied.
    pub fn raw_sample(&self) -> &ImuSample {
        &self.sample
    }

    /// True while the last orientation packet is younger than `timeout_ms`.
    /// Uses wrapping arithmetic so the millis rollover reads correctly.
    pub fn is_fresh(&self, now_ms: u32, timeout_ms: u32) -> bool {
        now_ms.wrapping_sub(self.sample.last_update_ms) < timeout_ms
    }

    pub fn set_offset(&mut self, offset: CalibrationOffset) {
        self.offset = offset;
    }

    pub fn offset(&self) -> CalibrationOffset {
        self.offset
    }
}

impl Default for ImuDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll-style calibration: the caller decides whether to spin, poll from a
/// tick loop, or bail out. A sample is accepted only when its timestamp has
/// changed, i.e. once per fresh orientation packet.
pub struct CalibrationAccumulator {
    sums: [f32; 9],
    count: u32,
    target: u32,
    last_update_ms: u32,
}

impl CalibrationAccumulator {
    /// `current` seeds the timestamp gate so stale pre-existing data is not
    /// counted as the first observation.
    pub fn new(target: u32, current: &ImuSample) -> Self {
        Self {
            sums: [0.0; 9],
            count: 0,
            target: if target == 0 { 1 } else { target },
            last_update_ms: current.last_update_ms,
        }
    }

    /// Accumulate one observation. Returns true if the sample was counted,
    /// false if it was a duplicate of the last orientation update or the
    /// accumulator is already complete.
    pub fn push(&mut self, sample: &ImuSample) -> bool {
        if self.is_complete() || sample.last_update_ms == self.last_update_ms {
            return false;
        }

        for (sum, value) in self.sums.iter_mut().zip(sample.fields()) {
            *sum += value;
        }
        self.last_update_ms = sample.last_update_ms;
        self.count += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.count >= self.target
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Arithmetic mean of the accumulated observations, or None until the
    /// target count is reached.
    ///
    /// The mean spans all nine fields, acceleration included, so applying it
    /// zeroes the gravity reference out of subsequent accel readings. That
    /// matches the deployed firmware and stays until a mounting-orientation
    /// decision is made.
    pub fn offset(&self) -> Option<CalibrationOffset> {
        if !self.is_complete() {
            return None;
        }

        let n = self.count as f32;
        Some(CalibrationOffset {
            ax: self.sums[0] / n,
            ay: self.sums[1] / n,
            az: self.sums[2] / n,
            gx: self.sums[3] / n,
            gy: self.sums[4] / n,
            gz: self.sums[5] / n,
            roll: self.sums[6] / n,
            pitch: self.sums[7] / n,
            yaw: self.sums[8] / n,
            valid: true,
        })
    }
}

/// Sensor configuration commands: `FF AA <register>`, written out the sensor
/// link during bring-up.
pub mod cfg {
    /// Zero the yaw reference.
    pub const CMD_RESET_YAW: u8 = 0x52;
    /// Horizontal (flat) mounting mode.
    pub const CMD_MOUNT_HORIZONTAL: u8 = 0x65;
    /// 9600 baud, 20 Hz report rate.
    pub const CMD_RATE_20HZ: u8 = 0x64;

    pub fn command(register: u8) -> [u8; 3] {
        [0xFF, 0xAA, register]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    pub fn packet(tag: u8, v0: i16, v1: i16, v2: i16, temperature: i16) -> [u8; PACKET_SIZE] {
        let mut bytes = [0u8; PACKET_SIZE];
        bytes[0] = PACKET_HEADER;
        bytes[1] = tag;
        bytes[2..4].copy_from_slice(&v0.to_le_bytes());
        bytes[4..6].copy_from_slice(&v1.to_le_bytes());
        bytes[6..8].copy_from_slice(&v2.to_le_bytes());
        bytes[8..10].copy_from_slice(&temperature.to_le_bytes());
        bytes[10] = bytes[..10].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        bytes
    }

    fn feed_all(decoder: &mut ImuDecoder, bytes: &[u8], now_ms: u32) -> FeedResult {
        let mut last = FeedResult::NeedMoreData;
        for &byte in bytes {
            last = decoder.feed(byte, now_ms);
        }
        last
    }

    fn tag_for(kind: PacketKind) -> u8 {
        match kind {
            PacketKind::Acceleration => TAG_ACCEL,
            PacketKind::AngularVelocity => TAG_GYRO,
            PacketKind::Orientation => TAG_ANGLE,
        }
    }

    #[test]
    fn accel_packet_updates_only_accel_fields() {
        let mut decoder = ImuDecoder::new();

        let result = feed_all(&mut decoder, &packet(TAG_ACCEL, 2048, -2048, 4096, 0), 77);
        assert_eq!(result, FeedResult::Accepted(PacketKind::Acceleration));

        let sample = decoder.sample();
        assert_eq!(sample.ax, 1.0);
        assert_eq!(sample.ay, -1.0);
        assert_eq!(sample.az, 2.0);
        assert_eq!(sample.gx, 0.0);
        assert_eq!(sample.roll, 0.0);
        // Only the orientation packet refreshes the timestamp
        assert_eq!(sample.last_update_ms, 0);
    }

    #[test]
    fn gyro_packet_scales_to_degrees_per_second() {
        let mut decoder = ImuDecoder::new();

        let result = feed_all(&mut decoder, &packet(TAG_GYRO, 16384, -16384, 0, 0), 0);
        assert_eq!(result, FeedResult::Accepted(PacketKind::AngularVelocity));

        let sample = decoder.sample();
        assert_eq!(sample.gx, 1000.0);
        assert_eq!(sample.gy, -1000.0);
        assert_eq!(sample.gz, 0.0);
    }

    #[test]
    fn orientation_packet_stamps_timestamp() {
        let mut decoder = ImuDecoder::new();

        let result = feed_all(&mut decoder, &packet(TAG_ANGLE, 16384, -16384, 0, 25), 123);
        assert_eq!(result, FeedResult::Accepted(PacketKind::Orientation));

        let sample = decoder.sample();
        assert_eq!(sample.roll, 90.0);
        assert_eq!(sample.pitch, -90.0);
        assert_eq!(sample.yaw, 0.0);
        assert_eq!(sample.last_update_ms, 123);
        assert_eq!(sample.ax, 0.0);
    }

    #[test]
    fn each_packet_kind_leaves_other_fields_bit_identical() {
        for kind in PacketKind::iter() {
            let mut decoder = ImuDecoder::new();

            // Populate every field first
            feed_all(&mut decoder, &packet(TAG_ACCEL, 100, 200, 300, 0), 10);
            feed_all(&mut decoder, &packet(TAG_GYRO, 400, 500, 600, 0), 20);
            feed_all(&mut decoder, &packet(TAG_ANGLE, 700, 800, 900, 0), 30);

            let before = *decoder.raw_sample();
            let result = feed_all(&mut decoder, &packet(tag_for(kind), 1111, 2222, 3333, 0), 40);
            assert_eq!(result, FeedResult::Accepted(kind));
            let after = *decoder.raw_sample();

            let before_bits = before.fields().map(f32::to_bits);
            let after_bits = after.fields().map(f32::to_bits);

            for index in 0..9 {
                let owned = match kind {
                    PacketKind::Acceleration => index < 3,
                    PacketKind::AngularVelocity => (3..6).contains(&index),
                    PacketKind::Orientation => index >= 6,
                };
                if owned {
                    assert_ne!(before_bits[index], after_bits[index]);
                } else {
                    assert_eq!(before_bits[index], after_bits[index]);
                }
            }

            if kind == PacketKind::Orientation {
                assert_eq!(after.last_update_ms, 40);
            } else {
                assert_eq!(after.last_update_ms, before.last_update_ms);
            }
        }
    }

    #[test]
    fn any_single_bit_flip_in_payload_rejects_packet() {
        let valid = packet(TAG_ANGLE, 1200, -3400, 5600, 78);

        for byte_index in 1..PACKET_SIZE - 1 {
            for bit in 0..8 {
                let mut corrupted = valid;
                corrupted[byte_index] ^= 1 << bit;

                let mut decoder = ImuDecoder::new();
                let before = *decoder.raw_sample();
                let result = feed_all(&mut decoder, &corrupted, 50);

                assert_eq!(
                    result,
                    FeedResult::Rejected,
                    "byte {} bit {} should fail the checksum",
                    byte_index,
                    bit
                );
                assert_eq!(*decoder.raw_sample(), before);
            }
        }
    }

    #[test]
    fn unknown_kind_tag_is_rejected_even_with_valid_checksum() {
        let mut decoder = ImuDecoder::new();
        let result = feed_all(&mut decoder, &packet(0x54, 1, 2, 3, 4), 0);
        assert_eq!(result, FeedResult::Rejected);
        assert_eq!(*decoder.raw_sample(), ImuSample::default());
    }

    #[test]
    fn resynchronizes_after_noise_containing_header_byte() {
        let mut decoder = ImuDecoder::new();

        // 0x55 inside the noise starts a bogus collection that fails its
        // checksum and drops the decoder back to header hunting
        let noise = [
            0x01, PACKET_HEADER, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
        ];
        let result = feed_all(&mut decoder, &noise, 5);
        assert_eq!(result, FeedResult::Rejected);

        let result = feed_all(&mut decoder, &packet(TAG_ANGLE, 16384, 0, 0, 0), 60);
        assert_eq!(result, FeedResult::Accepted(PacketKind::Orientation));
        assert_eq!(decoder.sample().roll, 90.0);
        assert_eq!(decoder.sample().last_update_ms, 60);
    }

    #[test]
    fn freshness_tracks_orientation_timestamp() {
        let mut decoder = ImuDecoder::new();
        feed_all(&mut decoder, &packet(TAG_ANGLE, 0, 0, 0, 0), 1000);

        assert!(decoder.is_fresh(1100, 200));
        assert!(!decoder.is_fresh(1200, 200));

        // Accel packets do not refresh anything
        feed_all(&mut decoder, &packet(TAG_ACCEL, 1, 1, 1, 0), 1500);
        assert!(!decoder.is_fresh(1500, 200));
    }

    #[test]
    fn freshness_survives_millis_rollover() {
        let mut decoder = ImuDecoder::new();
        feed_all(&mut decoder, &packet(TAG_ANGLE, 0, 0, 0, 0), u32::MAX - 50);
        assert!(decoder.is_fresh(49, 200));
        assert!(!decoder.is_fresh(400, 200));
    }

    #[test]
    fn calibration_accumulator_gates_on_timestamp_change() {
        let mut sample = ImuSample {
            ax: 0.5,
            last_update_ms: 100,
            ..ImuSample::default()
        };
        let mut accumulator = CalibrationAccumulator::new(3, &ImuSample::default());

        assert!(accumulator.push(&sample));
        // Same timestamp: duplicate, not a fresh orientation update
        assert!(!accumulator.push(&sample));
        assert_eq!(accumulator.count(), 1);
        assert!(accumulator.offset().is_none());

        sample.last_update_ms = 150;
        assert!(accumulator.push(&sample));
        sample.last_update_ms = 200;
        assert!(accumulator.push(&sample));

        assert!(accumulator.is_complete());
        // Complete: further pushes are ignored
        sample.last_update_ms = 250;
        assert!(!accumulator.push(&sample));
    }

    #[test]
    fn calibration_offsets_all_nine_fields() {
        let mut decoder = ImuDecoder::new();
        let mut accumulator = CalibrationAccumulator::new(5, decoder.raw_sample());

        // Five fresh orientation updates alongside constant accel/gyro state
        feed_all(&mut decoder, &packet(TAG_ACCEL, 2048, 0, 2048, 0), 0);
        feed_all(&mut decoder, &packet(TAG_GYRO, 16384, 0, 0, 0), 0);
        for step in 1..=5u32 {
            let raw = (step * 1024) as i16;
            feed_all(&mut decoder, &packet(TAG_ANGLE, raw, 0, 0, 0), step * 50);
            assert!(accumulator.push(decoder.raw_sample()));
        }

        let offset = accumulator.offset().unwrap();
        assert!(offset.valid);
        // Mean of 1024..=5120 raw is 3072 raw = 16.875 degrees
        assert_eq!(offset.roll, 16.875);
        // Acceleration is averaged too: the gravity reference goes with it
        assert_eq!(offset.ax, 1.0);
        assert_eq!(offset.az, 1.0);
        assert_eq!(offset.gx, 1000.0);

        decoder.set_offset(offset);
        let corrected = decoder.sample();
        assert_eq!(corrected.ax, 0.0);
        assert_eq!(corrected.az, 0.0);
        assert_eq!(corrected.gx, 0.0);
        assert_eq!(corrected.roll, 28.125 - 16.875);
        // Raw state is preserved underneath
        assert_eq!(decoder.raw_sample().ax, 1.0);
    }

    #[test]
    fn cfg_commands_use_sensor_command_header() {
        assert_eq!(cfg::command(cfg::CMD_RESET_YAW), [0xFF, 0xAA, 0x52]);
        assert_eq!(cfg::command(cfg::CMD_MOUNT_HORIZONTAL), [0xFF, 0xAA, 0x65]);
        assert_eq!(cfg::command(cfg::CMD_RATE_20HZ), [0xFF, 0xAA, 0x64]);
    }
}
