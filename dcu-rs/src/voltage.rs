//! Battery voltage smoothing and divider conversion.

use shared::dcu_hal::VoltageCalibration;

/// Ring capacity; the active window can be anything from 1 up to this.
pub const MAX_WINDOW: usize = 32;

/// Fixed-capacity moving average over raw ADC counts. The running sum is
/// maintained incrementally: `sum` always equals the sum of the slots in the
/// active window, with no rescans.
pub struct SmoothingFilter {
    samples: [u16; MAX_WINDOW],
    window: usize,
    index: usize,
    sum: u32,
}

impl SmoothingFilter {
    /// `seed` should be one fresh raw sample; every slot starts at that value
    /// so the first reads are not dragged toward zero.
    pub fn new(window: usize, seed: u16) -> Self {
        let mut filter = Self {
            samples: [0; MAX_WINDOW],
            window: 1,
            index: 0,
            sum: 0,
        };
        filter.set_window(window, seed);
        filter
    }

    /// Resize the active window (clamped to 1..=32) and refill it with
    /// `seed`.
    pub fn set_window(&mut self, window: usize, seed: u16) {
        self.window = window.clamp(1, MAX_WINDOW);

        for slot in self.samples[..self.window].iter_mut() {
            *slot = seed;
        }
        self.sum = seed as u32 * self.window as u32;
        self.index = 0;
    }

    /// Push one raw sample, evicting the oldest, and return the smoothed
    /// count (integer floor of the window average).
    pub fn update(&mut self, raw: u16) -> u16 {
        self.sum -= self.samples[self.index] as u32;
        self.samples[self.index] = raw;
        self.sum += raw as u32;
        self.index = (self.index + 1) % self.window;

        (self.sum / self.window as u32) as u16
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

/// Smoothed ADC count to battery volts through the divider.
pub fn counts_to_volts(counts: u16, calibration: &VoltageCalibration) -> f32 {
    let divider_volts = (counts as f32 / calibration.adc_max as f32) * calibration.adc_ref;
    divider_volts / calibration.divider_ratio + calibration.offset
}
