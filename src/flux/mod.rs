/*
    fluxforge
    https://github.com/dbalsom/fluxforge

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! Flux-domain types shared by the PLL decoder, the flux encoder and the
//! adapter drivers: a captured stream of transition intervals with index
//! pulses, in the device timebase.

pub mod encoder;
pub mod pll;

use crate::{DataRate, DiskRpm, FloppyError};

#[doc(hidden)]
#[macro_export]
macro_rules! format_us {
    ($value:expr) => {
        format!("{:.4}μs", $value / 1_000.0)
    };
}

/// One track capture as delivered by an adapter: the gaps between successive
/// flux transitions in device sample ticks, the tick positions of the index
/// pulses seen during the capture, and the device sample frequency.
///
/// A capture normally spans two revolutions; decoding retains the span
/// between the first and second index pulse.
#[derive(Clone, Debug, Default)]
pub struct FluxCapture {
    /// Tick gaps between successive flux transitions.
    pub intervals: Vec<u32>,
    /// Tick positions of index pulses, measured from capture start.
    pub index: Vec<u64>,
    pub sample_freq_hz: f64,
}

impl FluxCapture {
    pub fn ns_per_tick(&self) -> f64 {
        1_000_000_000.0 / self.sample_freq_hz
    }

    /// Duration of the first full rotation in nanoseconds.
    pub fn rotation_ns(&self) -> Result<f64, FloppyError> {
        if self.index.len() < 2 {
            return Err(FloppyError::Format(format!(
                "capture carries {} index pulses, need 2 for a full rotation",
                self.index.len()
            )));
        }
        Ok((self.index[1] - self.index[0]) as f64 * self.ns_per_tick())
    }

    /// The transition intervals of the first full rotation, converted to
    /// nanoseconds. An interval belongs to the rotation when its transition
    /// falls at or after the first index pulse and before the second.
    pub fn revolution_intervals_ns(&self) -> Result<Vec<f64>, FloppyError> {
        self.rotation_ns()?;
        let ns_per_tick = self.ns_per_tick();
        let mut intervals = Vec::with_capacity(self.intervals.len() / 2);
        let mut position: u64 = 0;
        for &ticks in self.intervals.iter() {
            position += ticks as u64;
            if position >= self.index[0] && position < self.index[1] {
                intervals.push(ticks as f64 * ns_per_tick);
            }
        }
        Ok(intervals)
    }

    /// Estimate the rotation speed from the first index interval.
    pub fn estimate_rpm(&self) -> Result<DiskRpm, FloppyError> {
        let rotation_ns = self.rotation_ns()?;
        let rpm = 60_000_000_000.0 / rotation_ns;
        log::debug!("measured rotation {:.1}ms -> {:.2} RPM", rotation_ns / 1e6, rpm);
        Ok(DiskRpm::from_measured(rpm))
    }

    /// Estimate the data rate from the transition count of the first
    /// rotation.
    pub fn estimate_bit_rate(&self) -> Result<DataRate, FloppyError> {
        let rotation_ns = self.rotation_ns()?;
        let mut transitions: u64 = 0;
        let mut position: u64 = 0;
        for &ticks in self.intervals.iter() {
            position += ticks as u64;
            if position >= self.index[0] && position < self.index[1] {
                transitions += 1;
            }
        }
        let khz = transitions as f64 * 1_000_000.0 / rotation_ns;
        log::debug!("{} transitions in one rotation -> {:.1} kbit/s", transitions, khz);
        Ok(if khz < 375.0 {
            DataRate::Rate250Kbps
        }
        else if khz < 750.0 {
            DataRate::Rate500Kbps
        }
        else {
            DataRate::Rate1000Kbps
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_at(rpm_real: f64, transitions_per_rev: usize, sample_freq_hz: f64) -> FluxCapture {
        let rotation_ticks = (60.0 / rpm_real * sample_freq_hz) as u64;
        let gap = rotation_ticks / transitions_per_rev as u64;
        FluxCapture {
            intervals: vec![gap as u32; transitions_per_rev * 2],
            index: vec![0, rotation_ticks, rotation_ticks * 2],
            sample_freq_hz,
        }
    }

    #[test]
    fn test_rpm_estimate() {
        let capture = capture_at(301.5, 50_000, 24_000_000.0);
        assert_eq!(capture.estimate_rpm().unwrap(), DiskRpm::Rpm300);
        let capture = capture_at(358.9, 50_000, 24_000_000.0);
        assert_eq!(capture.estimate_rpm().unwrap(), DiskRpm::Rpm360);
    }

    #[test]
    fn test_bit_rate_estimate() {
        // A 250Kbps DD track carries on the order of 50k transitions per
        // 200ms rotation; 500Kbps doubles that.
        let capture = capture_at(300.0, 50_000, 24_000_000.0);
        assert_eq!(capture.estimate_bit_rate().unwrap(), DataRate::Rate250Kbps);
        let capture = capture_at(300.0, 100_000, 24_000_000.0);
        assert_eq!(capture.estimate_bit_rate().unwrap(), DataRate::Rate500Kbps);
        let capture = capture_at(300.0, 200_000, 24_000_000.0);
        assert_eq!(capture.estimate_bit_rate().unwrap(), DataRate::Rate1000Kbps);
    }

    #[test]
    fn test_rotation_window() {
        let capture = FluxCapture {
            intervals: vec![100; 10],
            index: vec![250, 750],
            sample_freq_hz: 1_000_000_000.0,
        };
        // Transitions land at 100, 200, ... 1000; those at 300..=700 fall
        // inside the index window.
        let window = capture.revolution_intervals_ns().unwrap();
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_rotation_requires_two_indices() {
        let capture = FluxCapture {
            intervals: vec![100; 10],
            index: vec![250],
            sample_freq_hz: 1_000_000.0,
        };
        assert!(capture.revolution_intervals_ns().is_err());
    }
}
